//! Wire protocol spoken with the synthesis service.
//!
//! Outbound messages are JSON text frames. Inbound audio arrives as binary
//! frames with a fixed little-endian header:
//!
//! ```text
//! ┌──────────────┬──────────────┬──────────────┬───────────────┐
//! │ requestId u32│ index u32    │ length u32   │ WAV bytes ... │
//! └──────────────┴──────────────┴──────────────┴───────────────┘
//! ```
//!
//! Inbound control messages (`done`, `error`) are JSON text frames. The
//! generation id travels on the wire as `requestId`.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Size of the binary audio frame header in bytes.
pub const AUDIO_HEADER_LEN: usize = 12;

/// Monotonically increasing request generation.
///
/// Everything produced for a superseded generation is discarded.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct GenerationId(pub u32);

impl GenerationId {
    /// The generation that supersedes this one. Saturates at `u32::MAX`,
    /// far beyond any single session.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }

    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for GenerationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One batch of sentences to synthesize.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SynthesisRequest {
    pub sentences: Vec<String>,
    pub voice: String,
    pub speed: f32,
    /// Session index of `sentences[0]`.
    pub start_index: usize,
    #[serde(rename = "requestId")]
    pub generation: GenerationId,
}

impl SynthesisRequest {
    /// Session index of the last sentence in the batch.
    #[must_use]
    pub fn last_index(&self) -> Option<usize> {
        self.sentences
            .len()
            .checked_sub(1)
            .map(|offset| self.start_index + offset)
    }
}

/// Client → service messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum OutboundMessage {
    SendSentences(SynthesisRequest),
    Cancel {
        #[serde(rename = "requestId")]
        generation: GenerationId,
    },
}

impl OutboundMessage {
    /// Generation the message was issued under.
    #[must_use]
    pub const fn generation(&self) -> GenerationId {
        match self {
            Self::SendSentences(request) => request.generation,
            Self::Cancel { generation } => *generation,
        }
    }

    /// Serialize as a JSON text frame.
    pub fn to_json(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Synthesized audio for one sentence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioChunk {
    pub generation: GenerationId,
    pub index: usize,
    /// Encoded WAV bytes.
    pub audio: Vec<u8>,
}

/// Service → client JSON control frames.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ControlFrame {
    /// Every sentence of the batch has been sent.
    Done {
        #[serde(rename = "requestId")]
        generation: GenerationId,
    },
    /// Synthesis failed. Service-level errors carry no generation.
    Error {
        #[serde(rename = "requestId", default, skip_serializing_if = "Option::is_none")]
        generation: Option<GenerationId>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        index: Option<usize>,
        message: String,
    },
}

/// Everything the session receives from the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundMessage {
    Chunk(AudioChunk),
    BatchComplete {
        generation: GenerationId,
    },
    Error {
        generation: Option<GenerationId>,
        index: Option<usize>,
        message: String,
    },
    /// A batch request never reached the server.
    Undelivered {
        generation: GenerationId,
        start_index: usize,
        message: String,
    },
    /// Connection state changed.
    Connection {
        connected: bool,
    },
}

impl From<ControlFrame> for InboundMessage {
    fn from(frame: ControlFrame) -> Self {
        match frame {
            ControlFrame::Done { generation } => Self::BatchComplete { generation },
            ControlFrame::Error {
                generation,
                index,
                message,
            } => Self::Error {
                generation,
                index,
                message,
            },
        }
    }
}

impl From<AudioChunk> for InboundMessage {
    fn from(chunk: AudioChunk) -> Self {
        Self::Chunk(chunk)
    }
}

/// Malformed frames.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Audio frame too short: {0} bytes, header needs {AUDIO_HEADER_LEN}")]
    FrameTooShort(usize),

    #[error("Audio frame declares {declared} bytes but carries {available}")]
    TruncatedAudio { declared: usize, available: usize },

    #[error("Audio payload of {0} bytes does not fit the frame header")]
    PayloadTooLarge(usize),

    #[error("Sentence index {0} does not fit the frame header")]
    IndexTooLarge(usize),

    #[error("Invalid JSON frame: {0}")]
    Json(#[from] serde_json::Error),
}

/// Encode a chunk as a binary frame.
pub fn encode_audio_frame(chunk: &AudioChunk) -> Result<Vec<u8>, ProtocolError> {
    let index = u32::try_from(chunk.index).map_err(|_| ProtocolError::IndexTooLarge(chunk.index))?;
    let len = u32::try_from(chunk.audio.len())
        .map_err(|_| ProtocolError::PayloadTooLarge(chunk.audio.len()))?;

    let mut frame = Vec::with_capacity(AUDIO_HEADER_LEN + chunk.audio.len());
    frame.extend_from_slice(&chunk.generation.get().to_le_bytes());
    frame.extend_from_slice(&index.to_le_bytes());
    frame.extend_from_slice(&len.to_le_bytes());
    frame.extend_from_slice(&chunk.audio);
    Ok(frame)
}

/// Decode a binary frame. Bytes past the declared length are ignored.
pub fn decode_audio_frame(frame: &[u8]) -> Result<AudioChunk, ProtocolError> {
    let Some((header, payload)) = frame.split_first_chunk::<AUDIO_HEADER_LEN>() else {
        return Err(ProtocolError::FrameTooShort(frame.len()));
    };

    let word = |at: usize| u32::from_le_bytes([header[at], header[at + 1], header[at + 2], header[at + 3]]);
    let generation = GenerationId(word(0));
    let index = word(4) as usize;
    let declared = word(8) as usize;

    let audio = payload
        .get(..declared)
        .ok_or(ProtocolError::TruncatedAudio {
            declared,
            available: payload.len(),
        })?
        .to_vec();

    Ok(AudioChunk {
        generation,
        index,
        audio,
    })
}

/// Parse a JSON control frame.
pub fn parse_text_frame(text: &str) -> Result<ControlFrame, ProtocolError> {
    Ok(serde_json::from_str(text)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_sentences_uses_wire_field_names() {
        let message = OutboundMessage::SendSentences(SynthesisRequest {
            sentences: vec!["One.".into(), "Two.".into()],
            voice: "af_sarah".into(),
            speed: 1.5,
            start_index: 5,
            generation: GenerationId(3),
        });
        let value: serde_json::Value = serde_json::from_str(&message.to_json().unwrap()).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "type": "send-sentences",
                "sentences": ["One.", "Two."],
                "voice": "af_sarah",
                "speed": 1.5,
                "startIndex": 5,
                "requestId": 3
            })
        );
    }

    #[test]
    fn cancel_carries_request_id() {
        let json = OutboundMessage::Cancel {
            generation: GenerationId(9),
        }
        .to_json()
        .unwrap();
        assert_eq!(json, r#"{"type":"cancel","requestId":9}"#);
    }

    #[test]
    fn audio_frame_header_is_little_endian() {
        let chunk = AudioChunk {
            generation: GenerationId(2),
            index: 258,
            audio: vec![0xAA, 0xBB],
        };
        let frame = encode_audio_frame(&chunk).unwrap();
        assert_eq!(frame, vec![2, 0, 0, 0, 2, 1, 0, 0, 2, 0, 0, 0, 0xAA, 0xBB]);
        assert_eq!(decode_audio_frame(&frame).unwrap(), chunk);
    }

    #[test]
    fn short_and_truncated_frames_are_rejected() {
        assert!(matches!(
            decode_audio_frame(&[1, 2, 3]),
            Err(ProtocolError::FrameTooShort(3))
        ));

        let mut frame = vec![0; AUDIO_HEADER_LEN];
        frame[8] = 10;
        frame.extend_from_slice(&[1, 2, 3]);
        assert!(matches!(
            decode_audio_frame(&frame),
            Err(ProtocolError::TruncatedAudio {
                declared: 10,
                available: 3
            })
        ));
    }

    #[test]
    fn trailing_bytes_past_declared_length_are_ignored() {
        let mut frame = vec![1, 0, 0, 0, 0, 0, 0, 0, 1, 0, 0, 0];
        frame.extend_from_slice(&[7, 8, 9]);
        assert_eq!(decode_audio_frame(&frame).unwrap().audio, vec![7]);
    }

    #[test]
    fn control_frames_parse() {
        assert_eq!(
            parse_text_frame(r#"{"type":"done","requestId":4}"#).unwrap(),
            ControlFrame::Done {
                generation: GenerationId(4)
            }
        );
        assert_eq!(
            parse_text_frame(r#"{"type":"error","requestId":4,"index":2,"message":"boom"}"#)
                .unwrap(),
            ControlFrame::Error {
                generation: Some(GenerationId(4)),
                index: Some(2),
                message: "boom".into()
            }
        );
        assert_eq!(
            InboundMessage::from(parse_text_frame(r#"{"type":"error","message":"No sentences"}"#).unwrap()),
            InboundMessage::Error {
                generation: None,
                index: None,
                message: "No sentences".into()
            }
        );
        assert!(parse_text_frame(r#"{"type":"bogus"}"#).is_err());
    }

    #[test]
    fn generation_never_goes_backwards() {
        let last = GenerationId(u32::MAX);
        assert_eq!(last.next(), last);
        assert!(GenerationId(u32::MAX - 1).next() > GenerationId(0));
        assert_eq!(GenerationId(1).next().to_string(), "2");
    }

    #[test]
    fn last_index_of_batch() {
        let request = SynthesisRequest {
            sentences: vec!["a".into(), "b".into(), "c".into()],
            voice: String::new(),
            speed: 1.0,
            start_index: 5,
            generation: GenerationId::default(),
        };
        assert_eq!(request.last_index(), Some(7));
    }
}

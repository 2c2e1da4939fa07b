//! Decoded PCM audio for one sentence.

use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use hound::{SampleFormat, WavReader};

/// Interleaved `f32` samples ready for playback.
///
/// Samples are shared, so handing a sentence to the output device never copies
/// the buffer held by the playback engine.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedAudio {
    pub samples: Arc<[f32]>,
    pub channels: u16,
    pub sample_rate: u32,
    pub duration: Duration,
}

impl DecodedAudio {
    /// Wrap raw samples, deriving the duration.
    #[must_use]
    pub fn new(samples: Vec<f32>, channels: u16, sample_rate: u32) -> Self {
        let duration = frames_to_duration(samples.len(), channels, sample_rate);
        Self {
            samples: samples.into(),
            channels,
            sample_rate,
            duration,
        }
    }

    /// Silent mono audio of the given length; handy for tests and fakes.
    #[must_use]
    pub fn silence(duration: Duration, sample_rate: u32) -> Self {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let frames = (duration.as_secs_f64() * f64::from(sample_rate)).round() as usize;
        Self::new(vec![0.0; frames], 1, sample_rate)
    }
}

fn frames_to_duration(samples: usize, channels: u16, sample_rate: u32) -> Duration {
    if channels == 0 || sample_rate == 0 {
        return Duration::ZERO;
    }
    let frames = samples / usize::from(channels);
    #[allow(clippy::cast_precision_loss)]
    Duration::from_secs_f64(frames as f64 / f64::from(sample_rate))
}

/// Decode a complete WAV file held in memory.
///
/// Integer PCM of any bit depth up to 32 and 32-bit float are supported.
pub fn decode_wav(bytes: &[u8]) -> Result<DecodedAudio, hound::Error> {
    let reader = WavReader::new(Cursor::new(bytes))?;
    let spec = reader.spec();

    let samples: Vec<f32> = match spec.sample_format {
        SampleFormat::Float => reader.into_samples::<f32>().collect::<Result<_, _>>()?,
        SampleFormat::Int => {
            #[allow(clippy::cast_precision_loss)]
            let scale = (1_i64 << (spec.bits_per_sample.saturating_sub(1))) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<Result<_, _>>()?
        }
    };

    Ok(DecodedAudio::new(samples, spec.channels, spec.sample_rate))
}

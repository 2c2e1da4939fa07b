//! Port definitions (trait abstractions) for external systems.
//!
//! Ports define the interfaces the reading pipeline expects from
//! infrastructure. They use only domain types: no socket, HTTP or audio types
//! appear in any signature.

pub mod catalog;
pub mod transport;

pub use catalog::{CatalogError, VoiceCatalog, VoiceCatalogPort, VoiceEntry};
pub use transport::{SynthesisTransport, TransportError};

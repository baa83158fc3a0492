//! parley-core — the transport-agnostic protocol layer of the parley chat
//! relay: frame model, the two wire codecs, chunked-transfer reassembly,
//! and voice accumulation.
//!
//! Nothing in this crate opens a socket. The relay and client crates own
//! the I/O loops and plug these pieces together.

pub mod chunk;
pub mod config;
pub mod datagram;
pub mod error;
pub mod frame;
pub mod stream;
pub mod voice;

pub use chunk::{CompletedTransfer, EndResult, Reassembler};
pub use error::ProtocolError;
pub use frame::{BinaryKind, Destination, Frame, VoiceFormat};
pub use voice::VoiceBank;

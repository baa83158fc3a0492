//! parley-client — participant client cores for both transports.
//!
//! Each client owns its socket, a background reader task, and an event
//! channel. The stream client talks to the stream relay (whole binary
//! payloads, reliable ordering); the datagram client talks to the
//! datagram relay and carries its own chunk reassembly and voice
//! accumulation, since the relay forwards chunk records untouched.

pub mod datagram_client;
pub mod error;
pub mod event;
pub mod stream_client;

pub use datagram_client::DatagramClient;
pub use error::ClientError;
pub use event::ClientEvent;
pub use stream_client::StreamClient;

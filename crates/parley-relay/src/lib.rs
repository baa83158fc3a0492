//! parley-relay — the server side of the parley chat relay: session
//! registry, destination router, and the stream (TCP) and datagram (UDP)
//! relay cores.
//!
//! Both cores share the same surface: `start(port)` / `stop()`,
//! `participants()`, `kick()`, and an event stream for admin frontends
//! via `subscribe()`.

pub mod datagram_server;
pub mod error;
pub mod registry;
pub mod router;
pub mod stream_server;

pub use datagram_server::DatagramRelay;
pub use error::RelayError;
pub use registry::{Registry, RegistryError};
pub use router::{Endpoint, Router};
pub use stream_server::StreamRelay;

/// Notifications for whoever is supervising the relay (the daemon's log
/// loop, an admin console). Lossy by design: a slow subscriber misses
/// events rather than stalling the relay.
#[derive(Debug, Clone)]
pub enum RelayEvent {
    /// The registry changed; carries the full sorted roster.
    RosterChanged(Vec<String>),
    /// Human-readable activity line (joins, leaves, kicks).
    Log(String),
}

/// Capacity of the event broadcast channel.
pub(crate) const EVENT_CAPACITY: usize = 64;

//! Router — resolves a frame's logical destination against the registry
//! and dispatches it to zero, one, or many endpoints.
//!
//! Resolution always happens at dispatch time; nothing is cached. There is
//! no retry and no queuing — a failed delivery to one endpoint is logged
//! and does not affect the others.

use std::future::Future;

use parley_core::frame::{target_offline_notice, Destination, Frame};
use parley_core::ProtocolError;

use crate::registry::Registry;

/// One deliverable transport endpoint. Stream endpoints serialize their
/// writes internally (a frame's header and payload must never interleave
/// with another frame's bytes); datagram endpoints send atomic packets
/// and need no lock.
pub trait Endpoint: Clone + Send + Sync + 'static {
    fn deliver(
        &self,
        frame: &Frame,
    ) -> impl Future<Output = Result<(), ProtocolError>> + Send;
}

pub struct Router<E> {
    registry: Registry<E>,
}

impl<E> Clone for Router<E> {
    fn clone(&self) -> Self {
        Self {
            registry: self.registry.clone(),
        }
    }
}

impl<E: Endpoint> Router<E> {
    pub fn new(registry: Registry<E>) -> Self {
        Self { registry }
    }

    /// Dispatch a participant-originated frame.
    ///
    /// Broadcast goes to every registered endpoint except the sender.
    /// Unicast goes to the target and is echoed back to the sender so the
    /// sending side observes its own private traffic; when the target is
    /// absent, the sender gets exactly one synthesized SERVER notice and
    /// nothing is delivered anywhere else.
    pub async fn route(&self, sender: &str, frame: &Frame) {
        match frame.destination() {
            Some(Destination::All) => self.broadcast_except(sender, frame).await,
            Some(Destination::Name(target)) => {
                let target = target.clone();
                self.unicast(sender, &target, frame).await;
            }
            None => {}
        }
    }

    /// Deliver to every registered endpoint, the sender's included. Used
    /// for relay-originated frames (roster updates).
    pub async fn broadcast_all(&self, frame: &Frame) {
        for (name, endpoint) in self.registry.snapshot() {
            deliver_logged(&name, &endpoint, frame).await;
        }
    }

    async fn broadcast_except(&self, sender: &str, frame: &Frame) {
        for (name, endpoint) in self.registry.snapshot() {
            if name == sender {
                continue;
            }
            deliver_logged(&name, &endpoint, frame).await;
        }
    }

    async fn unicast(&self, sender: &str, target: &str, frame: &Frame) {
        let Some(endpoint) = self.registry.lookup(target) else {
            tracing::debug!(sender, target, kind = frame.kind_str(), "unicast target offline");
            self.send_to(sender, &target_offline_notice(sender, target))
                .await;
            return;
        };
        deliver_logged(target, &endpoint, frame).await;

        // Echo to the sender's own endpoint (one endpoint per name, so
        // self-addressed frames were already delivered above).
        if sender != target {
            self.send_to(sender, frame).await;
        }
    }

    /// Deliver to one name if it is registered. Returns whether it was.
    pub async fn send_to(&self, name: &str, frame: &Frame) -> bool {
        match self.registry.lookup(name) {
            Some(endpoint) => {
                deliver_logged(name, &endpoint, frame).await;
                true
            }
            None => false,
        }
    }
}

async fn deliver_logged<E: Endpoint>(name: &str, endpoint: &E, frame: &Frame) {
    if let Err(e) = endpoint.deliver(frame).await {
        tracing::warn!(to = name, kind = frame.kind_str(), error = %e, "delivery failed");
    }
}

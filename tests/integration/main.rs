//! Parley integration test harness.
//!
//! End-to-end tests over real sockets on 127.0.0.1. Every test starts its
//! own relay on an ephemeral port, so tests are independent and safe to
//! run in parallel.

use std::time::Duration;

use tokio::sync::mpsc::UnboundedReceiver;

use parley_client::ClientEvent;

mod datagram;
mod stream;

// ── Harness ───────────────────────────────────────────────────────────────────

/// Per-event receive deadline. Loopback traffic arrives in milliseconds;
/// anything near this long is a hang.
pub const WAIT: Duration = Duration::from_secs(5);

/// Receive the next event or fail the test.
pub async fn next_event(rx: &mut UnboundedReceiver<ClientEvent>) -> ClientEvent {
    tokio::time::timeout(WAIT, rx.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event channel closed")
}

/// Drain events until one matches the predicate, failing on a hang.
pub async fn wait_for<F>(rx: &mut UnboundedReceiver<ClientEvent>, mut pred: F) -> ClientEvent
where
    F: FnMut(&ClientEvent) -> bool,
{
    loop {
        let event = next_event(rx).await;
        if pred(&event) {
            return event;
        }
    }
}

/// Wait until a roster event carries exactly these names.
pub async fn wait_for_roster(rx: &mut UnboundedReceiver<ClientEvent>, names: &[&str]) {
    wait_for(rx, |event| {
        matches!(event, ClientEvent::Roster(got)
            if got.iter().map(String::as_str).eq(names.iter().copied()))
    })
    .await;
}

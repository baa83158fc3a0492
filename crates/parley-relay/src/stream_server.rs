//! Stream relay core — accepts reliable ordered connections, performs the
//! join handshake, and routes frames between live sessions.
//!
//! One task per connection. A decode error or EOF is fatal only to that
//! connection: the session is unregistered and everyone else gets a fresh
//! roster.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, Mutex, Notify};

use parley_core::frame::{valid_name, SERVER_NAME};
use parley_core::stream;
use parley_core::{Destination, Frame, ProtocolError};

use crate::error::RelayError;
use crate::registry::Registry;
use crate::router::{Endpoint, Router};
use crate::{RelayEvent, EVENT_CAPACITY};

/// How long a fresh connection has to present its `HELLO`.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// One live stream session's write side. Writes are serialized by the
/// mutex so concurrent routed frames never interleave on the wire.
#[derive(Clone)]
pub struct StreamPeer {
    writer: Arc<Mutex<OwnedWriteHalf>>,
    closed: Arc<Notify>,
}

impl StreamPeer {
    /// Tell the session's connection task to tear the socket down.
    fn close(&self) {
        self.closed.notify_one();
    }
}

impl Endpoint for StreamPeer {
    async fn deliver(&self, frame: &Frame) -> Result<(), ProtocolError> {
        let mut writer = self.writer.lock().await;
        stream::write_frame(&mut *writer, frame).await
    }
}

pub struct StreamRelay {
    inner: Arc<Inner>,
}

struct Inner {
    registry: Registry<StreamPeer>,
    router: Router<StreamPeer>,
    events: broadcast::Sender<RelayEvent>,
    running: AtomicBool,
    shutdown: std::sync::Mutex<Option<broadcast::Sender<()>>>,
}

impl Default for StreamRelay {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamRelay {
    pub fn new() -> Self {
        let registry = Registry::new();
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                router: Router::new(registry.clone()),
                registry,
                events,
                running: AtomicBool::new(false),
                shutdown: std::sync::Mutex::new(None),
            }),
        }
    }

    /// Bind and start serving. Returns the actual listening port (useful
    /// when `port` is 0).
    pub async fn start(&self, port: u16) -> Result<u16, RelayError> {
        if self.inner.running.swap(true, Ordering::SeqCst) {
            return Err(RelayError::AlreadyRunning);
        }

        let listener = match TcpListener::bind(("0.0.0.0", port)).await {
            Ok(l) => l,
            Err(source) => {
                self.inner.running.store(false, Ordering::SeqCst);
                return Err(RelayError::Bind { port, source });
            }
        };
        let local_port = listener.local_addr()?.port();

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        *self.inner.shutdown.lock().unwrap_or_else(|e| e.into_inner()) = Some(shutdown_tx);

        tracing::info!(port = local_port, "stream relay listening");
        self.inner.emit_log(format!("stream relay listening on port {local_port}"));

        tokio::spawn(accept_loop(self.inner.clone(), listener, shutdown_rx));
        Ok(local_port)
    }

    /// Stop serving and drop every session. Idempotent.
    pub fn stop(&self) {
        if !self.inner.running.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Some(tx) = self
            .inner
            .shutdown
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            let _ = tx.send(());
        }
        self.inner.registry.clear();
        tracing::info!("stream relay stopped");
        self.inner.emit_log("stream relay stopped".to_string());
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    /// Sorted names of every live session.
    pub fn participants(&self) -> Vec<String> {
        self.inner.registry.list()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RelayEvent> {
        self.inner.events.subscribe()
    }

    /// Remove a participant: one `Kick` frame to them, then unregister
    /// and close their connection, then a roster broadcast. Returns false
    /// for an unknown name.
    pub async fn kick(&self, name: &str, reason: &str) -> bool {
        let Some(peer) = self.inner.registry.lookup(name) else {
            return false;
        };
        let frame = Frame::Kick {
            to: name.to_string(),
            reason: reason.to_string(),
        };
        if let Err(e) = peer.deliver(&frame).await {
            tracing::warn!(name, error = %e, "kick notice delivery failed");
        }
        self.inner.registry.unregister(name);
        peer.close();
        tracing::info!(name, reason, "participant kicked");
        self.inner.emit_log(format!("{name} kicked: {reason}"));
        self.inner.roster_changed().await;
        true
    }
}

impl Inner {
    /// Broadcast the current roster to everyone and notify subscribers.
    async fn roster_changed(&self) {
        let names = self.registry.list();
        self.router
            .broadcast_all(&Frame::Roster {
                names: names.clone(),
            })
            .await;
        let _ = self.events.send(RelayEvent::RosterChanged(names));
    }

    fn emit_log(&self, line: String) {
        let _ = self.events.send(RelayEvent::Log(line));
    }
}

async fn accept_loop(
    inner: Arc<Inner>,
    listener: TcpListener,
    mut shutdown: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((socket, addr)) => {
                    tracing::debug!(%addr, "inbound connection");
                    let inner = inner.clone();
                    let shutdown = shutdown.resubscribe();
                    tokio::spawn(handle_connection(inner, socket, shutdown));
                }
                Err(e) => {
                    tracing::warn!(error = %e, "accept failed");
                }
            },
            _ = shutdown.recv() => break,
        }
    }
}

async fn handle_connection(
    inner: Arc<Inner>,
    socket: TcpStream,
    mut shutdown: broadcast::Receiver<()>,
) {
    let (mut reader, mut writer) = socket.into_split();

    let name = match handshake(&inner, &mut reader, &mut writer).await {
        Some(name) => name,
        None => return,
    };

    let closed = Arc::new(Notify::new());
    let peer = StreamPeer {
        writer: Arc::new(Mutex::new(writer)),
        closed: closed.clone(),
    };
    if let Err(e) = inner.registry.register(&name, peer.clone()) {
        // Raced another connection for the same name.
        tracing::debug!(error = %e, "registration lost race");
        let _ = peer.deliver(&rejection(&name, "Name already in use")).await;
        return;
    }

    tracing::info!(name, "participant joined");
    inner.emit_log(format!("{name} joined"));
    inner.roster_changed().await;

    loop {
        tokio::select! {
            read = stream::read_frame(&mut reader) => match read {
                Ok(Some(frame)) => {
                    // A kicked session is already out of the registry; its
                    // remaining traffic is dropped and the socket torn down.
                    if inner.registry.lookup(&name).is_none() {
                        break;
                    }
                    if frame.destination().is_some() {
                        inner.router.route(&name, &frame).await;
                    }
                }
                Ok(None) => continue,
                Err(ProtocolError::TransportClosed) => {
                    tracing::debug!(name, "connection closed");
                    break;
                }
                Err(e) => {
                    tracing::warn!(name, error = %e, "session terminated");
                    break;
                }
            },
            _ = closed.notified() => break,
            // Relay shutting down; stop() clears the registry itself.
            _ = shutdown.recv() => return,
        }
    }

    if inner.registry.unregister(&name).is_some() {
        tracing::info!(name, "participant left");
        inner.emit_log(format!("{name} left"));
        inner.roster_changed().await;
    }
}

/// Read the `HELLO` (bounded by [`HANDSHAKE_TIMEOUT`]), validate the name,
/// and reply with the rejection notice when it cannot be granted. Returns
/// the accepted name. Registration itself happens in the caller so the
/// write half can move into the registered endpoint.
async fn handshake(
    inner: &Inner,
    reader: &mut OwnedReadHalf,
    writer: &mut OwnedWriteHalf,
) -> Option<String> {
    let first = tokio::time::timeout(HANDSHAKE_TIMEOUT, stream::read_frame(reader)).await;
    let name = match first {
        Ok(Ok(Some(Frame::Hello { name }))) => name,
        Ok(Ok(other)) => {
            tracing::debug!(?other, "expected HELLO, closing");
            return None;
        }
        Ok(Err(e)) => {
            tracing::debug!(error = %e, "handshake read failed");
            return None;
        }
        Err(_) => {
            tracing::debug!("handshake timed out");
            return None;
        }
    };

    if !valid_name(&name) {
        let _ = stream::write_frame(writer, &rejection(&name, "Invalid name")).await;
        return None;
    }
    if inner.registry.lookup(&name).is_some() {
        tracing::debug!(name, "name already in use");
        let _ = stream::write_frame(writer, &rejection(&name, "Name already in use")).await;
        return None;
    }
    Some(name)
}

fn rejection(name: &str, body: &str) -> Frame {
    Frame::Text {
        from: SERVER_NAME.to_string(),
        to: Destination::Name(name.to_string()),
        body: body.to_string(),
    }
}

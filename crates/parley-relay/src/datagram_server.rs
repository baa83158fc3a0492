//! Datagram relay core — one shared socket, one reader task.
//!
//! Sessions are (name → return address). The relay forwards chunked
//! transfer records as-is; reassembly is the receiving client's job.
//! Malformed records are dropped without comment, as befits a lossy
//! transport.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::net::UdpSocket;
use tokio::sync::broadcast;

use parley_core::datagram;
use parley_core::frame::{valid_name, SERVER_NAME};
use parley_core::{Destination, Frame, ProtocolError};

use crate::error::RelayError;
use crate::registry::Registry;
use crate::router::{Endpoint, Router};
use crate::{RelayEvent, EVENT_CAPACITY};

/// One live datagram session: the shared relay socket plus the
/// participant's return address. Packets are atomic; no write lock.
#[derive(Clone)]
pub struct DatagramPeer {
    socket: Arc<UdpSocket>,
    addr: SocketAddr,
}

impl DatagramPeer {
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }
}

impl Endpoint for DatagramPeer {
    async fn deliver(&self, frame: &Frame) -> Result<(), ProtocolError> {
        let record = datagram::encode(frame)?;
        self.socket.send_to(record.as_bytes(), self.addr).await?;
        Ok(())
    }
}

pub struct DatagramRelay {
    inner: Arc<Inner>,
}

struct Inner {
    registry: Registry<DatagramPeer>,
    router: Router<DatagramPeer>,
    events: broadcast::Sender<RelayEvent>,
    running: AtomicBool,
    shutdown: std::sync::Mutex<Option<broadcast::Sender<()>>>,
}

impl Default for DatagramRelay {
    fn default() -> Self {
        Self::new()
    }
}

impl DatagramRelay {
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

    /// Bind and start serving. Returns the actual bound port.
    pub async fn start(&self, port: u16) -> Result<u16, RelayError> {
        if self.inner.running.swap(true, Ordering::SeqCst) {
            return Err(RelayError::AlreadyRunning);
        }

        let socket = match UdpSocket::bind(("0.0.0.0", port)).await {
            Ok(s) => s,
            Err(source) => {
                self.inner.running.store(false, Ordering::SeqCst);
                return Err(RelayError::Bind { port, source });
            }
        };
        let local_port = socket.local_addr()?.port();

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        *self.inner.shutdown.lock().unwrap_or_else(|e| e.into_inner()) = Some(shutdown_tx);

        tracing::info!(port = local_port, "datagram relay listening");
        self.inner
            .emit_log(format!("datagram relay listening on port {local_port}"));

        tokio::spawn(read_loop(self.inner.clone(), Arc::new(socket), shutdown_rx));
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
        tracing::info!("datagram relay stopped");
        self.inner.emit_log("datagram relay stopped".to_string());
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    pub fn participants(&self) -> Vec<String> {
        self.inner.registry.list()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RelayEvent> {
        self.inner.events.subscribe()
    }

    /// Remove a participant: one `KICK` record to their address, then
    /// unregister, then a roster broadcast. Returns false for an unknown
    /// name.
    pub async fn kick(&self, name: &str, reason: &str) -> bool {
        if self.inner.registry.lookup(name).is_none() {
            return false;
        }
        let frame = Frame::Kick {
            to: name.to_string(),
            reason: reason.to_string(),
        };
        self.inner.router.send_to(name, &frame).await;
        self.inner.registry.unregister(name);
        tracing::info!(name, reason, "participant kicked");
        self.inner.emit_log(format!("{name} kicked: {reason}"));
        self.inner.roster_changed().await;
        true
    }
}

impl Inner {
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

    async fn handle_record(&self, socket: &Arc<UdpSocket>, src: SocketAddr, record: &str) {
        let Some(frame) = datagram::decode(record) else {
            tracing::trace!(%src, "malformed record dropped");
            return;
        };

        match frame {
            Frame::Hello { name } => self.handle_hello(socket, src, name).await,
            Frame::Leave { name } => self.handle_leave(src, name).await,
            Frame::Roster { .. } | Frame::Kick { .. } => {
                // Relay-originated kinds have no business arriving here.
                tracing::trace!(%src, "ignoring relay-only record from peer");
            }
            frame => {
                if let Some(sender) = frame.sender() {
                    let sender = sender.to_string();
                    self.router.route(&sender, &frame).await;
                }
            }
        }
    }

    async fn handle_hello(&self, socket: &Arc<UdpSocket>, src: SocketAddr, name: String) {
        if !valid_name(&name) {
            send_notice(socket, src, &name, "Invalid name").await;
            return;
        }

        let peer = DatagramPeer {
            socket: socket.clone(),
            addr: src,
        };
        match self.registry.lookup(&name) {
            // Same address re-announcing itself is a refresh, not a clash.
            Some(existing) if existing.addr == src => {
                self.registry.replace(&name, peer);
            }
            Some(_) => {
                tracing::debug!(name, %src, "name already in use");
                send_notice(socket, src, &name, "Name already in use").await;
            }
            None => {
                self.registry.replace(&name, peer);
                tracing::info!(name, %src, "participant joined");
                self.emit_log(format!("{name} joined"));
                self.roster_changed().await;
            }
        }
    }

    async fn handle_leave(&self, src: SocketAddr, name: String) {
        // Only the address that owns the session may release it.
        match self.registry.lookup(&name) {
            Some(existing) if existing.addr == src => {
                self.registry.unregister(&name);
                tracing::info!(name, %src, "participant left");
                self.emit_log(format!("{name} left"));
                self.roster_changed().await;
            }
            _ => tracing::debug!(name, %src, "leave from non-owner ignored"),
        }
    }
}

async fn send_notice(socket: &Arc<UdpSocket>, addr: SocketAddr, to: &str, body: &str) {
    let notice = Frame::Text {
        from: SERVER_NAME.to_string(),
        to: Destination::Name(to.to_string()),
        body: body.to_string(),
    };
    match datagram::encode(&notice) {
        Ok(record) => {
            if let Err(e) = socket.send_to(record.as_bytes(), addr).await {
                tracing::warn!(%addr, error = %e, "notice send failed");
            }
        }
        Err(e) => tracing::warn!(error = %e, "notice encode failed"),
    }
}

async fn read_loop(inner: Arc<Inner>, socket: Arc<UdpSocket>, mut shutdown: broadcast::Receiver<()>) {
    let mut buf = vec![0u8; 65_535];
    loop {
        tokio::select! {
            received = socket.recv_from(&mut buf) => match received {
                Ok((len, src)) => {
                    let Ok(record) = std::str::from_utf8(&buf[..len]) else {
                        tracing::trace!(%src, "non-UTF-8 record dropped");
                        continue;
                    };
                    inner.handle_record(&socket, src, record).await;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "recv failed");
                }
            },
            _ = shutdown.recv() => break,
        }
    }
}

//! Datagram client core — lossy transport to the datagram relay.
//!
//! `connect` is optimistic: the HELLO goes out and the call returns
//! without waiting for a verdict (the roster, or a rejection notice,
//! arrives as an event if and when it arrives). The client owns the
//! chunking discipline on send and the reassembly/accumulation tables on
//! receive; the relay only forwards records.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::net::{ToSocketAddrs, UdpSocket};
use tokio::sync::broadcast;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use parley_core::chunk::{
    self, new_transfer_id, DEFAULT_SWEEP_INTERVAL, DEFAULT_TRANSFER_MAX_AGE,
};
use parley_core::datagram::{
    self, CHUNK_SEND_GAP, CONTROL_REPEAT, CONTROL_REPEAT_GAP, DEFAULT_CHUNK_BYTES,
};
use parley_core::frame::SERVER_NAME;
use parley_core::{
    BinaryKind, CompletedTransfer, Destination, EndResult, Frame, Reassembler, VoiceBank,
    VoiceFormat,
};

use crate::error::ClientError;
use crate::event::ClientEvent;

pub struct DatagramClient {
    name: String,
    socket: Arc<UdpSocket>,
    connected: Arc<AtomicBool>,
    shutdown: broadcast::Sender<()>,
}

impl DatagramClient {
    /// Bind an ephemeral socket, announce ourselves, and return without
    /// waiting for the relay. Join confirmation is the first roster event.
    pub async fn connect(
        addr: impl ToSocketAddrs,
        name: &str,
    ) -> Result<(Self, UnboundedReceiver<ClientEvent>), ClientError> {
        let socket = Arc::new(UdpSocket::bind("0.0.0.0:0").await?);
        socket.connect(addr).await?;

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (shutdown, _) = broadcast::channel(1);
        let connected = Arc::new(AtomicBool::new(true));

        let tables = Arc::new(Tables {
            reassembler: Reassembler::new(),
            bank: VoiceBank::new(),
        });
        tokio::spawn(read_loop(
            name.to_string(),
            socket.clone(),
            events_tx,
            connected.clone(),
            tables.clone(),
            shutdown.subscribe(),
        ));
        tokio::spawn(sweep_loop(tables, shutdown.subscribe()));

        let client = Self {
            name: name.to_string(),
            socket,
            connected,
            shutdown,
        };
        client
            .send_record(&Frame::Hello {
                name: name.to_string(),
            })
            .await?;
        Ok((client, events_rx))
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn send_text(&self, to: Destination, body: &str) -> Result<(), ClientError> {
        self.send_record(&Frame::Text {
            from: self.name.clone(),
            to,
            body: body.to_string(),
        })
        .await
    }

    /// Send a binary payload as a chunked transfer: repeated START, paced
    /// data chunks, repeated END. Repetition covers control-record loss;
    /// receivers deduplicate.
    pub async fn send_binary(
        &self,
        kind: BinaryKind,
        to: Destination,
        filename: &str,
        bytes: &[u8],
    ) -> Result<(), ClientError> {
        let id = new_transfer_id();
        let chunks = chunk::split(bytes, DEFAULT_CHUNK_BYTES);

        self.send_control(&Frame::BinaryStart {
            from: self.name.clone(),
            to: to.clone(),
            id: id.clone(),
            kind,
            filename: filename.to_string(),
            total_chunks: chunks.len(),
        })
        .await?;

        for (index, part) in chunks.into_iter().enumerate() {
            self.send_record(&Frame::BinaryChunk {
                from: self.name.clone(),
                to: to.clone(),
                id: id.clone(),
                index,
                bytes: part,
            })
            .await?;
            tokio::time::sleep(CHUNK_SEND_GAP).await;
        }

        self.send_control(&Frame::BinaryEnd {
            from: self.name.clone(),
            to,
            id,
        })
        .await
    }

    /// Send a voice message with the same chunking discipline as binary
    /// transfers. Lost voice chunks are never retransmitted; the clip is
    /// simply shorter on the far side.
    pub async fn send_voice(
        &self,
        to: Destination,
        format: VoiceFormat,
        pcm: &[u8],
    ) -> Result<(), ClientError> {
        self.send_control(&Frame::VoiceStart {
            from: self.name.clone(),
            to: to.clone(),
            format,
        })
        .await?;

        for part in chunk::split(pcm, DEFAULT_CHUNK_BYTES) {
            self.send_record(&Frame::VoiceChunk {
                from: self.name.clone(),
                to: to.clone(),
                bytes: part,
            })
            .await?;
            tokio::time::sleep(CHUNK_SEND_GAP).await;
        }

        self.send_control(&Frame::VoiceEnd {
            from: self.name.clone(),
            to,
        })
        .await
    }

    /// Best-effort LEAVE, then tear down unconditionally.
    pub async fn disconnect(&self) {
        if !self.connected.swap(false, Ordering::SeqCst) {
            return;
        }
        let leave = Frame::Leave {
            name: self.name.clone(),
        };
        if let Ok(record) = datagram::encode(&leave) {
            if let Err(e) = self.socket.send(record.as_bytes()).await {
                tracing::debug!(error = %e, "leave send failed");
            }
        }
        let _ = self.shutdown.send(());
    }

    async fn send_record(&self, frame: &Frame) -> Result<(), ClientError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(ClientError::NotConnected);
        }
        let record = datagram::encode(frame)?;
        self.socket.send(record.as_bytes()).await?;
        Ok(())
    }

    async fn send_control(&self, frame: &Frame) -> Result<(), ClientError> {
        for repeat in 0..CONTROL_REPEAT {
            self.send_record(frame).await?;
            if repeat + 1 < CONTROL_REPEAT {
                tokio::time::sleep(CONTROL_REPEAT_GAP).await;
            }
        }
        Ok(())
    }
}

struct Tables {
    reassembler: Reassembler,
    bank: VoiceBank,
}

async fn read_loop(
    name: String,
    socket: Arc<UdpSocket>,
    events: UnboundedSender<ClientEvent>,
    connected: Arc<AtomicBool>,
    tables: Arc<Tables>,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut buf = vec![0u8; 65_535];
    loop {
        tokio::select! {
            received = socket.recv(&mut buf) => match received {
                Ok(len) => {
                    let Ok(record) = std::str::from_utf8(&buf[..len]) else {
                        continue;
                    };
                    let Some(frame) = datagram::decode(record) else {
                        continue;
                    };
                    if let Some(event) = handle_frame(&name, frame, &tables) {
                        let kicked = matches!(event, ClientEvent::Kicked { .. });
                        if events.send(event).is_err() || kicked {
                            break;
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "recv failed");
                    break;
                }
            },
            _ = shutdown.recv() => break,
        }
    }

    connected.store(false, Ordering::SeqCst);
    let _ = events.send(ClientEvent::Disconnected);
}

/// Evict transfers and voice takes whose END never arrived.
async fn sweep_loop(tables: Arc<Tables>, mut shutdown: broadcast::Receiver<()>) {
    let mut ticker = tokio::time::interval(DEFAULT_SWEEP_INTERVAL);
    ticker.tick().await; // first tick fires immediately
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let transfers = tables.reassembler.sweep(DEFAULT_TRANSFER_MAX_AGE);
                let takes = tables.bank.sweep(DEFAULT_TRANSFER_MAX_AGE);
                if transfers + takes > 0 {
                    tracing::debug!(transfers, takes, "evicted abandoned entries");
                }
            }
            _ = shutdown.recv() => break,
        }
    }
}

fn handle_frame(own_name: &str, frame: Frame, tables: &Tables) -> Option<ClientEvent> {
    match frame {
        Frame::Roster { names } => Some(ClientEvent::Roster(names)),
        Frame::Text { from, to, body } => {
            if from == SERVER_NAME {
                Some(ClientEvent::Notice { from, body })
            } else {
                Some(ClientEvent::Text { from, to, body })
            }
        }

        Frame::BinaryStart {
            from,
            to,
            id,
            kind,
            filename,
            total_chunks,
        } => {
            tables
                .reassembler
                .on_start(&id, &from, &to, kind, &filename, total_chunks);
            None
        }
        Frame::BinaryChunk {
            id, index, bytes, ..
        } => {
            tables.reassembler.on_chunk(&id, index, bytes);
            None
        }
        Frame::BinaryEnd { id, .. } => match tables.reassembler.on_end(&id) {
            EndResult::Complete(CompletedTransfer {
                from,
                to,
                kind,
                filename,
                bytes,
                ..
            }) => Some(ClientEvent::Binary {
                kind,
                from,
                to,
                filename,
                bytes,
            }),
            EndResult::Incomplete { from, missing, .. } => Some(ClientEvent::Notice {
                from: SERVER_NAME.to_string(),
                body: format!("Transfer from '{from}' incomplete: {missing} chunks missing."),
            }),
            EndResult::Unknown => None,
        },

        Frame::VoiceStart { from, to, format } => {
            tables.bank.start(&from, &to.to_string(), format);
            Some(ClientEvent::VoiceStart { from, to, format })
        }
        Frame::VoiceChunk { from, to, bytes } => {
            tables.bank.push(&from, &to.to_string(), &bytes);
            Some(ClientEvent::VoiceChunk { from, to, bytes })
        }
        Frame::VoiceEnd { from, to } => {
            // A repeated END already consumed the take; only surface once.
            let (format, pcm) = tables.bank.finish(&from, &to.to_string())?;
            Some(ClientEvent::VoiceEnd {
                from,
                to,
                format,
                pcm,
            })
        }

        Frame::Kick { to, reason } => {
            if to == own_name {
                Some(ClientEvent::Kicked { reason })
            } else {
                None
            }
        }

        Frame::Hello { .. } | Frame::Leave { .. } | Frame::Binary { .. } => None,
    }
}

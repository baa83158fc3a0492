//! Stream client core — reliable ordered connection to the stream relay.
//!
//! `connect` performs the join handshake synchronously: the first inbound
//! frame decides between success (a roster) and rejection (a SERVER
//! notice). After that a background reader task turns frames into
//! [`ClientEvent`]s until the connection dies.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::Mutex;

use parley_core::frame::SERVER_NAME;
use parley_core::stream::{self, VOICE_CHUNK_BYTES};
use parley_core::{chunk, BinaryKind, Destination, Frame, ProtocolError, VoiceBank, VoiceFormat};

use crate::error::ClientError;
use crate::event::ClientEvent;

/// How long `connect` waits for the relay's handshake verdict.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

pub struct StreamClient {
    name: String,
    writer: Arc<Mutex<OwnedWriteHalf>>,
    connected: Arc<AtomicBool>,
}

impl StreamClient {
    /// Connect, send `HELLO`, and wait for the verdict. On success the
    /// roster that sealed the handshake is re-emitted as the first event.
    pub async fn connect(
        addr: impl ToSocketAddrs,
        name: &str,
    ) -> Result<(Self, UnboundedReceiver<ClientEvent>), ClientError> {
        let socket = TcpStream::connect(addr).await?;
        let (mut reader, mut writer) = socket.into_split();

        stream::write_frame(
            &mut writer,
            &Frame::Hello {
                name: name.to_string(),
            },
        )
        .await?;

        let verdict = tokio::time::timeout(HANDSHAKE_TIMEOUT, async {
            loop {
                match stream::read_frame(&mut reader).await? {
                    Some(frame) => return Ok::<Frame, ProtocolError>(frame),
                    None => continue,
                }
            }
        })
        .await
        .map_err(|_| ClientError::HandshakeTimeout)??;

        let roster = match verdict {
            Frame::Roster { names } => names,
            Frame::Text { from, body, .. } if from == SERVER_NAME => {
                return Err(ClientError::HandshakeRejected(body));
            }
            other => {
                return Err(ClientError::HandshakeRejected(format!(
                    "unexpected first frame: {}",
                    other.kind_str()
                )));
            }
        };

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let _ = events_tx.send(ClientEvent::Roster(roster));

        let connected = Arc::new(AtomicBool::new(true));
        tokio::spawn(read_loop(
            name.to_string(),
            reader,
            events_tx,
            connected.clone(),
        ));

        let client = Self {
            name: name.to_string(),
            writer: Arc::new(Mutex::new(writer)),
            connected,
        };
        Ok((client, events_rx))
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn send_text(&self, to: Destination, body: &str) -> Result<(), ClientError> {
        self.send(&Frame::Text {
            from: self.name.clone(),
            to,
            body: body.to_string(),
        })
        .await
    }

    /// Send a whole binary payload in one frame. The stream transport is
    /// reliable; no chunking happens here.
    pub async fn send_binary(
        &self,
        kind: BinaryKind,
        to: Destination,
        filename: &str,
        bytes: bytes::Bytes,
    ) -> Result<(), ClientError> {
        self.send(&Frame::Binary {
            kind,
            from: self.name.clone(),
            to,
            filename: filename.to_string(),
            bytes,
        })
        .await
    }

    /// Send a voice message: START, the PCM in fixed-size chunks, END.
    pub async fn send_voice(
        &self,
        to: Destination,
        format: VoiceFormat,
        pcm: &[u8],
    ) -> Result<(), ClientError> {
        self.send(&Frame::VoiceStart {
            from: self.name.clone(),
            to: to.clone(),
            format,
        })
        .await?;
        for part in chunk::split(pcm, VOICE_CHUNK_BYTES) {
            self.send(&Frame::VoiceChunk {
                from: self.name.clone(),
                to: to.clone(),
                bytes: part,
            })
            .await?;
        }
        self.send(&Frame::VoiceEnd {
            from: self.name.clone(),
            to,
        })
        .await
    }

    /// Close the connection. The relay treats the EOF as our leave; the
    /// reader task emits [`ClientEvent::Disconnected`].
    pub async fn disconnect(&self) {
        if !self.connected.swap(false, Ordering::SeqCst) {
            return;
        }
        let mut writer = self.writer.lock().await;
        if let Err(e) = writer.shutdown().await {
            tracing::debug!(error = %e, "shutdown failed");
        }
    }

    async fn send(&self, frame: &Frame) -> Result<(), ClientError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(ClientError::NotConnected);
        }
        let mut writer = self.writer.lock().await;
        stream::write_frame(&mut *writer, frame).await?;
        Ok(())
    }
}

async fn read_loop(
    name: String,
    mut reader: OwnedReadHalf,
    events: UnboundedSender<ClientEvent>,
    connected: Arc<AtomicBool>,
) {
    let bank = VoiceBank::new();

    loop {
        match stream::read_frame(&mut reader).await {
            Ok(Some(frame)) => {
                if let Some(event) = frame_to_event(&name, frame, &bank) {
                    let kicked = matches!(event, ClientEvent::Kicked { .. });
                    if events.send(event).is_err() || kicked {
                        break;
                    }
                }
            }
            Ok(None) => continue,
            Err(ProtocolError::TransportClosed) => break,
            Err(e) => {
                tracing::warn!(error = %e, "read failed");
                break;
            }
        }
    }

    connected.store(false, Ordering::SeqCst);
    let _ = events.send(ClientEvent::Disconnected);
}

/// Translate an inbound frame into the event it surfaces, if any.
fn frame_to_event(own_name: &str, frame: Frame, bank: &VoiceBank) -> Option<ClientEvent> {
    match frame {
        Frame::Roster { names } => Some(ClientEvent::Roster(names)),
        Frame::Text { from, to, body } => {
            if from == SERVER_NAME {
                Some(ClientEvent::Notice { from, body })
            } else {
                Some(ClientEvent::Text { from, to, body })
            }
        }
        Frame::Binary {
            kind,
            from,
            to,
            filename,
            bytes,
        } => Some(ClientEvent::Binary {
            kind,
            from,
            to,
            filename,
            bytes,
        }),
        Frame::VoiceStart { from, to, format } => {
            bank.start(&from, &to.to_string(), format);
            Some(ClientEvent::VoiceStart { from, to, format })
        }
        Frame::VoiceChunk { from, to, bytes } => {
            bank.push(&from, &to.to_string(), &bytes);
            Some(ClientEvent::VoiceChunk { from, to, bytes })
        }
        Frame::VoiceEnd { from, to } => {
            let (format, pcm) = bank
                .finish(&from, &to.to_string())
                .unwrap_or_else(|| (VoiceFormat::default(), bytes::Bytes::new()));
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
        // Relay never sends these to a stream client.
        Frame::Hello { .. }
        | Frame::Leave { .. }
        | Frame::BinaryStart { .. }
        | Frame::BinaryChunk { .. }
        | Frame::BinaryEnd { .. } => None,
    }
}

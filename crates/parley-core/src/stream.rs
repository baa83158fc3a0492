//! Stream wire codec — length-prefixed text headers plus raw payload bytes.
//!
//! Every frame starts with a header string (u16 big-endian byte length,
//! then that many UTF-8 bytes). Frames that carry a payload (`BIN`,
//! `VOICE_CHUNK`) declare the byte count in the header and are followed by
//! exactly that many raw bytes. A header that cannot be parsed, or a
//! payload the connection ends inside of, is fatal for that connection —
//! the reader loop terminates and the session is torn down.

use std::io::ErrorKind;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::ProtocolError;
use crate::frame::{Destination, Frame, VoiceFormat};

/// Header ceiling — the u16 length prefix caps header strings (and with
/// them text bodies) at 64 KiB.
pub const MAX_HEADER_BYTES: usize = u16::MAX as usize;

/// Largest declared payload a reader will accept. Guards against a
/// corrupt or hostile size field allocating without bound.
pub const MAX_PAYLOAD_BYTES: usize = 256 * 1024 * 1024;

/// PCM bytes per `VOICE_CHUNK` frame on the stream path.
pub const VOICE_CHUNK_BYTES: usize = 1024;

/// Serialize one frame onto the stream. The caller is responsible for
/// serializing concurrent writers (one frame's header and payload must
/// never interleave with another's bytes).
pub async fn write_frame<W>(w: &mut W, frame: &Frame) -> Result<(), ProtocolError>
where
    W: AsyncWrite + Unpin,
{
    let (header, payload) = match frame {
        Frame::Hello { name } => (format!("HELLO:{name}"), None),
        Frame::Text { from, to, body } => (format!("TEXT:{from}:{to}:{body}"), None),
        Frame::Binary {
            kind,
            from,
            to,
            filename,
            bytes,
        } => (
            format!("BIN:{kind}:{from}:{to}:{filename}:{}", bytes.len()),
            Some(bytes),
        ),
        Frame::VoiceStart { from, to, format } => (
            format!(
                "VOICE_START:{from}:{to}:{}:{}:{}:{}:{}",
                format.sample_rate,
                format.channels,
                format.bits_per_sample,
                format.big_endian,
                format.signed
            ),
            None,
        ),
        Frame::VoiceChunk { from, to, bytes } => {
            (format!("VOICE_CHUNK:{from}:{to}:{}", bytes.len()), Some(bytes))
        }
        Frame::VoiceEnd { from, to } => (format!("VOICE_END:{from}:{to}"), None),
        Frame::Roster { names } => (format!("USER_LIST:{}", names.join(",")), None),
        Frame::Kick { to, reason } => (format!("KICK:SERVER:{to}:{reason}"), None),
        // Streams are reliable and ordered — binaries travel whole, and a
        // leave is just a close. Chunk frames belong to the datagram path.
        Frame::Leave { .. }
        | Frame::BinaryStart { .. }
        | Frame::BinaryChunk { .. }
        | Frame::BinaryEnd { .. } => return Err(ProtocolError::Unroutable(frame.kind_str())),
    };

    if header.len() > MAX_HEADER_BYTES {
        return Err(ProtocolError::PayloadTooLarge {
            got: header.len(),
            limit: MAX_HEADER_BYTES,
        });
    }

    w.write_all(&(header.len() as u16).to_be_bytes()).await?;
    w.write_all(header.as_bytes()).await?;
    if let Some(bytes) = payload {
        w.write_all(bytes).await?;
    }
    w.flush().await?;
    Ok(())
}

/// Read the next frame. `Ok(None)` means the header carried an unknown
/// type tag and was skipped; the reader loop should just continue.
///
/// # Errors
/// [`ProtocolError::TransportClosed`] on a clean close between frames;
/// [`ProtocolError::Malformed`] when the header does not parse or the
/// connection ends inside a declared payload (fatal — do not retry).
pub async fn read_frame<R>(r: &mut R) -> Result<Option<Frame>, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    let header = read_header(r).await?;
    let mut fields = header.splitn(2, ':');
    let tag = fields.next().unwrap_or_default();
    let rest = fields.next().unwrap_or_default();

    let frame = match tag {
        "HELLO" => Frame::Hello {
            name: rest.trim().to_string(),
        },
        "TEXT" => {
            let [from, to, body] = split_fields::<3>(rest, &header)?;
            Frame::Text {
                from: from.to_string(),
                to: Destination::from_wire(to),
                body: body.to_string(),
            }
        }
        "BIN" => {
            let [kind, from, to, filename, size] = split_fields::<5>(rest, &header)?;
            let bytes = read_payload(r, parse_size(size, &header)?).await?;
            Frame::Binary {
                kind: kind.parse()?,
                from: from.to_string(),
                to: Destination::from_wire(to),
                filename: filename.to_string(),
                bytes,
            }
        }
        "VOICE_START" => {
            let [from, to, rate, ch, bits, big_endian, signed] = split_fields::<7>(rest, &header)?;
            Frame::VoiceStart {
                from: from.to_string(),
                to: Destination::from_wire(to),
                format: VoiceFormat {
                    sample_rate: parse_field(rate, &header)?,
                    channels: parse_field(ch, &header)?,
                    bits_per_sample: parse_field(bits, &header)?,
                    big_endian: parse_field(big_endian, &header)?,
                    signed: parse_field(signed, &header)?,
                },
            }
        }
        "VOICE_CHUNK" => {
            let [from, to, size] = split_fields::<3>(rest, &header)?;
            let bytes = read_payload(r, parse_size(size, &header)?).await?;
            Frame::VoiceChunk {
                from: from.to_string(),
                to: Destination::from_wire(to),
                bytes,
            }
        }
        "VOICE_END" => {
            let [from, to] = split_fields::<2>(rest, &header)?;
            Frame::VoiceEnd {
                from: from.to_string(),
                to: Destination::from_wire(to),
            }
        }
        "USER_LIST" => Frame::Roster {
            names: if rest.is_empty() {
                Vec::new()
            } else {
                rest.split(',').map(str::to_string).collect()
            },
        },
        "KICK" => {
            // KICK:SERVER:<to>:<reason>
            let [_server, to, reason] = split_fields::<3>(rest, &header)?;
            Frame::Kick {
                to: to.to_string(),
                reason: reason.to_string(),
            }
        }
        _ => return Ok(None),
    };

    Ok(Some(frame))
}

// ── Low-level reads ───────────────────────────────────────────────────────────

async fn read_header<R>(r: &mut R) -> Result<String, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 2];
    match r.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
            return Err(ProtocolError::TransportClosed)
        }
        Err(e) => return Err(e.into()),
    }

    let len = u16::from_be_bytes(len_buf) as usize;
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf).await.map_err(truncated)?;
    String::from_utf8(buf).map_err(|_| ProtocolError::Malformed("header is not UTF-8".into()))
}

async fn read_payload<R>(r: &mut R, size: usize) -> Result<Bytes, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    if size > MAX_PAYLOAD_BYTES {
        return Err(ProtocolError::PayloadTooLarge {
            got: size,
            limit: MAX_PAYLOAD_BYTES,
        });
    }
    let mut buf = vec![0u8; size];
    r.read_exact(&mut buf).await.map_err(truncated)?;
    Ok(Bytes::from(buf))
}

/// EOF after the length prefix means the peer died mid-frame. That is a
/// decode failure, not a clean close.
fn truncated(e: std::io::Error) -> ProtocolError {
    if e.kind() == ErrorKind::UnexpectedEof {
        ProtocolError::Malformed("connection ended mid-frame".into())
    } else {
        ProtocolError::Io(e)
    }
}

// ── Field parsing ─────────────────────────────────────────────────────────────

fn split_fields<'a, const N: usize>(
    rest: &'a str,
    header: &str,
) -> Result<[&'a str; N], ProtocolError> {
    let mut out = [""; N];
    let mut parts = rest.splitn(N, ':');
    for slot in &mut out {
        *slot = parts
            .next()
            .ok_or_else(|| ProtocolError::Malformed(format!("short header: {header}")))?;
    }
    Ok(out)
}

fn parse_field<T: std::str::FromStr>(field: &str, header: &str) -> Result<T, ProtocolError> {
    field
        .trim()
        .parse()
        .map_err(|_| ProtocolError::Malformed(format!("bad field {field:?} in: {header}")))
}

fn parse_size(field: &str, header: &str) -> Result<usize, ProtocolError> {
    parse_field(field, header)
}

//! Datagram wire codec — one self-contained delimited record per packet.
//!
//! Record shape: `TYPE|FROM|TO|PAYLOAD` (split with limit 4, so payloads
//! may contain `|`). Binary and voice payloads are `;`-delimited
//! sub-records with raw bytes base64-encoded, because the wrapping record
//! is text-delimited. Malformed records are silently discarded — a lossy
//! transport never signals decode errors back to the sender.

use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use bytes::Bytes;

use crate::error::ProtocolError;
use crate::frame::{Destination, Frame, VoiceFormat};

/// Practical ceiling for one encoded record. Stays comfortably inside a
/// 64 KiB datagram after base64 and header overhead.
pub const MAX_RECORD_BYTES: usize = 60_000;

/// Default raw bytes per data chunk. Small enough that base64 expansion
/// keeps records far from the packet ceiling even on lossy links.
pub const DEFAULT_CHUNK_BYTES: usize = 400;

/// START and END control records are sent this many times to counteract
/// datagram loss. Receivers deduplicate.
pub const CONTROL_REPEAT: usize = 3;

/// Gap between repeated control records.
pub const CONTROL_REPEAT_GAP: Duration = Duration::from_millis(10);

/// Pacing gap between data chunks. Reduces burst loss on localhost.
pub const CHUNK_SEND_GAP: Duration = Duration::from_millis(2);

/// Format a raw record. Exposed for the chunked send path, which tracks
/// its own transfer ids and sequence numbers.
pub fn format_record(kind: &str, from: &str, to: &str, payload: &str) -> String {
    format!("{kind}|{from}|{to}|{payload}")
}

/// Encode one frame as a record string.
///
/// # Errors
/// [`ProtocolError::Unroutable`] for the whole-payload `Binary` frame
/// (datagram senders must split first) and [`ProtocolError::PayloadTooLarge`]
/// when the encoded record would exceed [`MAX_RECORD_BYTES`].
pub fn encode(frame: &Frame) -> Result<String, ProtocolError> {
    let record = match frame {
        Frame::Hello { name } => format_record("HELLO", name, "*", "hi"),
        Frame::Leave { name } => format_record("LEAVE", name, "*", "bye"),
        Frame::Text { from, to, body } => format_record("MSG", from, &to.to_string(), body),
        Frame::BinaryStart {
            from,
            to,
            id,
            kind,
            filename,
            total_chunks,
        } => format_record(
            "BIN_START",
            from,
            &to.to_string(),
            &format!("{id};{kind};{filename};{total_chunks}"),
        ),
        Frame::BinaryChunk {
            from,
            to,
            id,
            index,
            bytes,
        } => format_record(
            "BIN_CHUNK",
            from,
            &to.to_string(),
            &format!("{id};{index};{}", BASE64.encode(bytes)),
        ),
        Frame::BinaryEnd { from, to, id } => format_record("BIN_END", from, &to.to_string(), id),
        Frame::VoiceStart { from, to, format } => format_record(
            "VOICE_START",
            from,
            &to.to_string(),
            &format!(
                "{};{};{};{};{}",
                format.sample_rate,
                format.channels,
                format.bits_per_sample,
                format.big_endian,
                format.signed
            ),
        ),
        // Voice chunks are keyed by (from, to) on receive; the id/seq slots
        // exist for wire-shape parity with BIN_CHUNK and are not read back.
        Frame::VoiceChunk { from, to, bytes } => format_record(
            "VOICE_CHUNK",
            from,
            &to.to_string(),
            &format!("-;0;{}", BASE64.encode(bytes)),
        ),
        Frame::VoiceEnd { from, to } => format_record("VOICE_END", from, &to.to_string(), "-"),
        Frame::Roster { names } => format_record("CLIENTS", "SERVER", "*", &names.join(",")),
        Frame::Kick { to, reason } => format_record("KICK", "SERVER", to, reason),
        Frame::Binary { .. } => return Err(ProtocolError::Unroutable(frame.kind_str())),
    };

    if record.len() > MAX_RECORD_BYTES {
        return Err(ProtocolError::PayloadTooLarge {
            got: record.len(),
            limit: MAX_RECORD_BYTES,
        });
    }
    Ok(record)
}

/// Decode one record. Returns `None` for anything malformed — fewer than
/// four fields, an unknown type tag, a bad sub-record, or broken base64.
/// The datagram reader loop drops such packets without comment.
pub fn decode(record: &str) -> Option<Frame> {
    let mut parts = record.splitn(4, '|');
    let kind = parts.next()?;
    let from = parts.next()?;
    let to = parts.next()?;
    let payload = parts.next()?;

    let frame = match kind {
        "HELLO" => Frame::Hello {
            name: from.trim().to_string(),
        },
        "LEAVE" => Frame::Leave {
            name: from.trim().to_string(),
        },
        "MSG" => Frame::Text {
            from: from.to_string(),
            to: Destination::from_wire(to),
            body: payload.to_string(),
        },
        "BIN_START" => {
            // id;KIND;filename;totalChunks
            let mut sub = payload.splitn(4, ';');
            let id = sub.next()?.trim();
            let bin_kind = sub.next()?.parse().ok()?;
            let filename = sub.next()?;
            let total_chunks: usize = sub.next()?.trim().parse().ok()?;
            Frame::BinaryStart {
                from: from.to_string(),
                to: Destination::from_wire(to),
                id: id.to_string(),
                kind: bin_kind,
                filename: filename.to_string(),
                total_chunks,
            }
        }
        "BIN_CHUNK" => {
            // id;index;base64data
            let mut sub = payload.splitn(3, ';');
            let id = sub.next()?.trim();
            let index: usize = sub.next()?.trim().parse().ok()?;
            let bytes = BASE64.decode(sub.next()?).ok()?;
            Frame::BinaryChunk {
                from: from.to_string(),
                to: Destination::from_wire(to),
                id: id.to_string(),
                index,
                bytes: Bytes::from(bytes),
            }
        }
        "BIN_END" => Frame::BinaryEnd {
            from: from.to_string(),
            to: Destination::from_wire(to),
            id: payload.trim().to_string(),
        },
        "VOICE_START" => {
            // rate;ch;bits;bigEndian;signed
            let mut sub = payload.splitn(5, ';');
            Frame::VoiceStart {
                from: from.to_string(),
                to: Destination::from_wire(to),
                format: VoiceFormat {
                    sample_rate: sub.next()?.trim().parse().ok()?,
                    channels: sub.next()?.trim().parse().ok()?,
                    bits_per_sample: sub.next()?.trim().parse().ok()?,
                    big_endian: sub.next()?.trim().parse().ok()?,
                    signed: sub.next()?.trim().parse().ok()?,
                },
            }
        }
        "VOICE_CHUNK" => {
            // id;seq;base64data — id/seq ignored, accumulation keys on (from, to)
            let mut sub = payload.splitn(3, ';');
            let _id = sub.next()?;
            let _seq = sub.next()?;
            let bytes = BASE64.decode(sub.next()?).ok()?;
            Frame::VoiceChunk {
                from: from.to_string(),
                to: Destination::from_wire(to),
                bytes: Bytes::from(bytes),
            }
        }
        "VOICE_END" => Frame::VoiceEnd {
            from: from.to_string(),
            to: Destination::from_wire(to),
        },
        "CLIENTS" => Frame::Roster {
            names: if payload.trim().is_empty() {
                Vec::new()
            } else {
                payload.split(',').map(str::to_string).collect()
            },
        },
        "KICK" => Frame::Kick {
            to: to.to_string(),
            reason: payload.to_string(),
        },
        _ => return None,
    };

    Some(frame)
}

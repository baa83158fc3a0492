//! Frame model — the logical messages relayed between participants.
//!
//! Frames are transport-agnostic. The stream codec ([`crate::stream`]) and
//! the datagram codec ([`crate::datagram`]) each map them to their own
//! on-wire representation; this module has no opinion about bytes.

use std::fmt;
use std::str::FromStr;

use bytes::Bytes;

use crate::error::ProtocolError;

/// The wildcard target meaning "every currently registered participant".
pub const BROADCAST_WIRE: &str = "*";

/// Reserved sender name for relay-originated frames (kicks, notices,
/// roster updates). No participant may register under it.
pub const SERVER_NAME: &str = "SERVER";

// ── Destination ───────────────────────────────────────────────────────────────

/// Where a frame should be delivered: everyone, or one named participant.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Destination {
    /// Every registered participant (wire token `*`).
    All,
    /// One participant by name.
    Name(String),
}

impl Destination {
    /// Parse the wire `TO` field. `*` (or blank) is broadcast.
    pub fn from_wire(token: &str) -> Self {
        let token = token.trim();
        if token.is_empty() || token == BROADCAST_WIRE {
            Destination::All
        } else {
            Destination::Name(token.to_string())
        }
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            Destination::All => None,
            Destination::Name(n) => Some(n),
        }
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Destination::All => f.write_str(BROADCAST_WIRE),
            Destination::Name(n) => f.write_str(n),
        }
    }
}

// ── Binary kind ───────────────────────────────────────────────────────────────

/// What a chunked/whole binary payload represents. Carried on the wire so
/// receivers can pick a rendering path without sniffing content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryKind {
    Image,
    File,
    Generic,
}

impl BinaryKind {
    pub fn as_wire(&self) -> &'static str {
        match self {
            BinaryKind::Image => "IMAGE",
            BinaryKind::File => "FILE",
            BinaryKind::Generic => "GENERIC",
        }
    }
}

impl fmt::Display for BinaryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_wire())
    }
}

impl FromStr for BinaryKind {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "IMAGE" => Ok(BinaryKind::Image),
            "FILE" => Ok(BinaryKind::File),
            "GENERIC" => Ok(BinaryKind::Generic),
            other => Err(ProtocolError::UnknownKind(other.to_string())),
        }
    }
}

// ── Voice format ──────────────────────────────────────────────────────────────

/// PCM parameters announced with a voice stream. The payload bytes are raw
/// samples in exactly this format; the relay never inspects them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VoiceFormat {
    pub sample_rate: f32,
    pub channels: u16,
    pub bits_per_sample: u16,
    pub big_endian: bool,
    pub signed: bool,
}

impl Default for VoiceFormat {
    /// 16 kHz mono 16-bit signed little-endian — the shared capture format.
    fn default() -> Self {
        Self {
            sample_rate: 16_000.0,
            channels: 1,
            bits_per_sample: 16,
            big_endian: false,
            signed: true,
        }
    }
}

impl VoiceFormat {
    /// Bytes of PCM per second of audio, for duration estimates.
    pub fn bytes_per_second(&self) -> usize {
        (self.sample_rate as usize) * self.channels as usize * (self.bits_per_sample as usize / 8)
    }
}

// ── Frame ─────────────────────────────────────────────────────────────────────

/// One logical protocol message.
///
/// `Binary` carries a whole payload and exists only on the stream path;
/// `BinaryStart`/`BinaryChunk`/`BinaryEnd` are the datagram-path chunked
/// equivalent. Every other variant travels on both transports.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// Join announcement. First frame of every session.
    Hello { name: String },
    /// Leave notice (datagram path; stream sessions leave by closing).
    Leave { name: String },

    Text {
        from: String,
        to: Destination,
        body: String,
    },

    /// Whole binary payload (stream path).
    Binary {
        kind: BinaryKind,
        from: String,
        to: Destination,
        filename: String,
        bytes: Bytes,
    },

    /// Declares a chunked transfer: `total_chunks` chunks will follow.
    BinaryStart {
        from: String,
        to: Destination,
        id: String,
        kind: BinaryKind,
        filename: String,
        total_chunks: usize,
    },
    BinaryChunk {
        from: String,
        to: Destination,
        id: String,
        index: usize,
        bytes: Bytes,
    },
    BinaryEnd {
        from: String,
        to: Destination,
        id: String,
    },

    VoiceStart {
        from: String,
        to: Destination,
        format: VoiceFormat,
    },
    VoiceChunk {
        from: String,
        to: Destination,
        bytes: Bytes,
    },
    VoiceEnd {
        from: String,
        to: Destination,
    },

    /// Current participant roster, relay → everyone.
    Roster { names: Vec<String> },

    /// Administrative removal notice, relay → one participant.
    Kick { to: String, reason: String },
}

impl Frame {
    /// The originating participant, for frames that have one.
    pub fn sender(&self) -> Option<&str> {
        match self {
            Frame::Hello { name } | Frame::Leave { name } => Some(name),
            Frame::Text { from, .. }
            | Frame::Binary { from, .. }
            | Frame::BinaryStart { from, .. }
            | Frame::BinaryChunk { from, .. }
            | Frame::BinaryEnd { from, .. }
            | Frame::VoiceStart { from, .. }
            | Frame::VoiceChunk { from, .. }
            | Frame::VoiceEnd { from, .. } => Some(from),
            Frame::Roster { .. } | Frame::Kick { .. } => None,
        }
    }

    /// The routing destination, for frames the relay routes peer-to-peer.
    pub fn destination(&self) -> Option<&Destination> {
        match self {
            Frame::Text { to, .. }
            | Frame::Binary { to, .. }
            | Frame::BinaryStart { to, .. }
            | Frame::BinaryChunk { to, .. }
            | Frame::BinaryEnd { to, .. }
            | Frame::VoiceStart { to, .. }
            | Frame::VoiceChunk { to, .. }
            | Frame::VoiceEnd { to, .. } => Some(to),
            Frame::Hello { .. }
            | Frame::Leave { .. }
            | Frame::Roster { .. }
            | Frame::Kick { .. } => None,
        }
    }

    /// Short kind tag for logging.
    pub fn kind_str(&self) -> &'static str {
        match self {
            Frame::Hello { .. } => "hello",
            Frame::Leave { .. } => "leave",
            Frame::Text { .. } => "text",
            Frame::Binary { .. } => "binary",
            Frame::BinaryStart { .. } => "binary_start",
            Frame::BinaryChunk { .. } => "binary_chunk",
            Frame::BinaryEnd { .. } => "binary_end",
            Frame::VoiceStart { .. } => "voice_start",
            Frame::VoiceChunk { .. } => "voice_chunk",
            Frame::VoiceEnd { .. } => "voice_end",
            Frame::Roster { .. } => "roster",
            Frame::Kick { .. } => "kick",
        }
    }
}

/// A name is registrable when it is non-empty after trimming, is not the
/// reserved relay name, and contains none of the wire delimiters.
pub fn valid_name(name: &str) -> bool {
    let name = name.trim();
    !name.is_empty()
        && name != SERVER_NAME
        && name != BROADCAST_WIRE
        && !name.chars().any(|c| matches!(c, ':' | '|' | ';' | ',' | '*' | '\n' | '\r'))
}

/// Synthesized notice sent back to a sender whose unicast target is gone.
pub fn target_offline_notice(sender: &str, target: &str) -> Frame {
    Frame::Text {
        from: SERVER_NAME.to_string(),
        to: Destination::Name(sender.to_string()),
        body: format!("User '{target}' not online."),
    }
}

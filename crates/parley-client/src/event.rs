use bytes::Bytes;

use parley_core::{BinaryKind, Destination, VoiceFormat};

/// Everything a client surfaces to its owner, delivered in arrival order
/// on an unbounded channel. On the datagram path, `Binary` is emitted
/// only after full reassembly and `VoiceEnd` carries the accumulated clip.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    /// Current participant roster.
    Roster(Vec<String>),

    Text {
        from: String,
        to: Destination,
        body: String,
    },

    /// A complete binary payload (whole frame on stream, reassembled on
    /// datagram).
    Binary {
        kind: BinaryKind,
        from: String,
        to: Destination,
        filename: String,
        bytes: Bytes,
    },

    /// A voice message began; chunks will follow.
    VoiceStart {
        from: String,
        to: Destination,
        format: VoiceFormat,
    },
    /// Raw PCM as it arrives, for live playback.
    VoiceChunk {
        from: String,
        to: Destination,
        bytes: Bytes,
    },
    /// The voice message ended; `pcm` is the whole accumulated clip.
    VoiceEnd {
        from: String,
        to: Destination,
        format: VoiceFormat,
        pcm: Bytes,
    },

    /// The relay removed us.
    Kicked { reason: String },

    /// The session is over; no further events will arrive.
    Disconnected,

    /// Informational text from the relay itself.
    Notice { from: String, body: String },
}

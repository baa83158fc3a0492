//! Protocol-level errors shared by both transports.

use thiserror::Error;

/// Errors that can arise while encoding or decoding wire data.
///
/// Stream connections treat any decode failure as fatal for that
/// connection. The datagram path never surfaces decode failures at all —
/// malformed records are dropped before they become errors.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Frame header or payload did not match the wire grammar.
    #[error("malformed frame: {0}")]
    Malformed(String),

    /// A kind token outside IMAGE/FILE/GENERIC.
    #[error("unknown binary kind: {0:?}")]
    UnknownKind(String),

    /// Encoded size exceeds what the transport can carry.
    #[error("payload of {got} bytes exceeds the {limit}-byte transport ceiling")]
    PayloadTooLarge { got: usize, limit: usize },

    /// The frame kind has no representation on this transport.
    /// Whole-payload `Binary` never travels as a datagram; chunked
    /// `BinaryStart`/`BinaryChunk`/`BinaryEnd` never travel on a stream.
    #[error("frame kind {0} is not representable on this transport")]
    Unroutable(&'static str),

    /// The peer closed the connection between frames. Readers treat this
    /// as a normal terminal condition, not a failure.
    #[error("transport closed")]
    TransportClosed,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

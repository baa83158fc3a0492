use parley_core::ProtocolError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    /// A send was attempted on a client that is not connected.
    #[error("not connected")]
    NotConnected,

    /// The relay refused the join handshake.
    #[error("handshake rejected: {0}")]
    HandshakeRejected(String),

    /// The relay did not answer the join handshake in time.
    #[error("handshake timed out")]
    HandshakeTimeout,

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RelayError {
    /// `start` was called on an instance that is already serving.
    #[error("relay is already running")]
    AlreadyRunning,

    #[error("failed to bind port {port}")]
    Bind {
        port: u16,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

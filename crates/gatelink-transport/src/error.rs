use std::path::PathBuf;

use gatelink_config::TransportKind;
use gatelink_stream::StreamError;

/// Errors from transport driver operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Failed to open a device node, FIFO, or file.
    #[error("failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to bind to the specified address.
    #[error("failed to bind to {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },

    /// Failed to connect to the specified address.
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        source: std::io::Error,
    },

    /// Failed to accept an incoming connection.
    #[error("failed to accept connection: {0}")]
    Accept(std::io::Error),

    /// An I/O error occurred on the channel.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The peer closed the channel while a write was in progress.
    #[error("channel closed by peer")]
    Closed,

    /// The channel has no underlying device: the transport is fd-less, the
    /// context was already closed, or the kind is invalid.
    #[error("channel has no device")]
    NoDevice,

    /// The operation is not supported by this transport or the backing
    /// feature is compiled out.
    #[error("operation not implemented for {kind} channels")]
    NotImplemented { kind: TransportKind },

    /// A parameter failed validation at open time.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
}

impl From<StreamError> for TransportError {
    fn from(err: StreamError) -> Self {
        match err {
            StreamError::Io(io) => TransportError::Io(io),
            StreamError::Closed => TransportError::Closed,
        }
    }
}

pub type Result<T> = std::result::Result<T, TransportError>;

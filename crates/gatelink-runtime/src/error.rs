use gatelink_config::ConfigError;
use gatelink_transport::TransportError;

use crate::registry::ChannelDesc;

/// Errors surfaced by the channel registry and the cooperative scheduler.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// Bad option string, unknown key, or unresolvable enclave name.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Underlying transport failure, original cause intact.
    #[error("transport error: {0}")]
    Transport(TransportError),

    /// The descriptor is outside the registry's range.
    #[error("bad channel descriptor {0}")]
    BadDescriptor(ChannelDesc),

    /// The requested direction is not valid for this operation.
    #[error("invalid direction for this operation")]
    InvalidDirection,

    /// The descriptor table is exhausted.
    #[error("too many open channels (capacity {capacity})")]
    TooManyChannels { capacity: usize },

    /// No channel half is open here: never opened, closed already, or the
    /// transport kind is invalid.
    #[error("channel has no device")]
    NoDevice,

    /// A fixed-size payload arrived short.
    #[error("short read on listener channel (expected {expected} bytes, got {got})")]
    NoMessage { expected: usize, got: usize },

    /// Listeners on one channel must agree on the payload size.
    #[error("listener payload size mismatch (registered {registered}, new {new})")]
    ListenerSizeMismatch { registered: usize, new: usize },

    /// No write-side control channel targets the named enclave.
    #[error("no control channel targets enclave {enclave:?}")]
    NoControlChannel { enclave: String },

    /// Catch-all parameter validation failure.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
}

impl From<TransportError> for ChannelError {
    fn from(err: TransportError) -> Self {
        match err {
            // A double close or fd-less transport is the same no-device
            // condition whether the driver or the registry noticed it.
            TransportError::NoDevice => ChannelError::NoDevice,
            other => ChannelError::Transport(other),
        }
    }
}

impl From<std::io::Error> for ChannelError {
    fn from(err: std::io::Error) -> Self {
        ChannelError::Transport(TransportError::Io(err))
    }
}

pub type Result<T> = std::result::Result<T, ChannelError>;

use std::fmt;
use std::io;

use gatelink_config::ConfigError;
use gatelink_runtime::ChannelError;
use gatelink_transport::TransportError;

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::ConnectionRefused => FAILURE,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn config_error(context: &str, err: ConfigError) -> CliError {
    CliError::new(USAGE, format!("{context}: {err}"))
}

pub fn channel_error(context: &str, err: ChannelError) -> CliError {
    match err {
        ChannelError::Config(err) => config_error(context, err),
        ChannelError::Transport(TransportError::Io(source))
        | ChannelError::Transport(TransportError::Accept(source))
        | ChannelError::Transport(TransportError::Open { source, .. })
        | ChannelError::Transport(TransportError::Bind { source, .. })
        | ChannelError::Transport(TransportError::Connect { source, .. }) => {
            io_error(context, source)
        }
        ChannelError::Transport(other) => {
            CliError::new(TRANSPORT_ERROR, format!("{context}: {other}"))
        }
        ChannelError::NoMessage { .. } => CliError::new(DATA_INVALID, format!("{context}: {err}")),
        ChannelError::InvalidDirection
        | ChannelError::InvalidArgument(_)
        | ChannelError::ListenerSizeMismatch { .. } => {
            CliError::new(USAGE, format!("{context}: {err}"))
        }
        other => CliError::new(INTERNAL, format!("{context}: {other}")),
    }
}

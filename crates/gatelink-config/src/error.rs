/// Errors produced while parsing channel configuration or resolving enclaves.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The first token of the option string is not a known transport kind.
    #[error("unknown transport kind: {0:?}")]
    UnknownTransport(String),

    /// A required positional field is absent.
    #[error("{kind} channel is missing required field {field:?}")]
    MissingField {
        kind: &'static str,
        field: &'static str,
    },

    /// A key was given a value that does not parse.
    #[error("invalid value {value:?} for option {key:?}")]
    InvalidValue { key: String, value: String },

    /// A key/value token is not recognized for this transport.
    #[error("unknown option: {0:?}")]
    UnknownKey(String),

    /// `src=` or `dst=` named an enclave that was never declared.
    #[error("unknown enclave name: {0:?}")]
    UnknownEnclave(String),

    /// More enclaves were declared than the table can hold.
    #[error("too many enclaves ({count} declared, capacity {capacity})")]
    TooManyEnclaves { count: usize, capacity: usize },

    /// The enclave table is populated exactly once per process.
    #[error("enclave table already declared")]
    AlreadyDeclared,

    /// More message ids than the mercury session table can hold.
    #[error("too many message ids ({count} given, capacity {capacity})")]
    TooManyMessageIds { count: usize, capacity: usize },
}

pub type Result<T> = std::result::Result<T, ConfigError>;

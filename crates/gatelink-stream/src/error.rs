/// Errors from the stream read/write discipline.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    /// An I/O error occurred on the underlying stream.
    #[error("stream I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The peer closed the stream while a write was in progress.
    #[error("stream closed by peer")]
    Closed,
}

pub type Result<T> = std::result::Result<T, StreamError>;

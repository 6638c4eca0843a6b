//! Byte-stream read/write discipline shared by the stream transports.
//!
//! Every physical write is at least `min_tx` bytes (short user writes are
//! zero-padded; the pad is consumed and discarded by a matching-length read
//! on the other side), writes above the MTU are split into back-to-back
//! chunks, and both directions loop over short syscall returns.

pub mod error;
pub mod framing;

pub use error::{Result, StreamError};
pub use framing::{read_full, write_full, StreamFraming};

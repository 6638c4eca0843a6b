//! Transport drivers for the gatelink channel runtime.
//!
//! One driver per transport kind, each exposing the uniform operations
//! {open, close, read, write, raw-fd}. The four stream transports (device,
//! pipe, unix socket, tcp, serial) delegate their byte discipline to
//! `gatelink-stream`; datagram and specialized transports implement their
//! own read/write directly.

pub mod ctx;
pub mod device;
pub mod direction;
pub mod error;
pub mod ge_eth;
pub mod mercury;
pub mod pipe;
#[cfg(any(feature = "shmem", feature = "udp-shmem"))]
pub(crate) mod ring;
pub mod serial;
#[cfg(any(feature = "shmem", feature = "udp-shmem"))]
pub(crate) mod shm_map;
pub mod shmem;
pub mod sockopt;
pub mod tcp_socket;
pub mod udp_shmem;
pub mod udp_socket;
pub mod uio;
pub mod unix_socket;

pub use ctx::TransportCtx;
pub use direction::Direction;
pub use error::{Result, TransportError};

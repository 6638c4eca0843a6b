//! The gatelink channel runtime: a uniform, descriptor-style API over
//! heterogeneous transports, plus the cooperative yield/listen scheduler
//! that turns one-way channels into a turn-taking RPC-like loop.
//!
//! Channels are opened during a startup phase, in the same order in every
//! cooperating process, and named by small integer descriptors thereafter.

pub mod coop;
pub mod error;
pub mod registry;

pub use error::{ChannelError, Result};
pub use registry::{supports_pair_open, ChannelDesc, Registry, NUM_CHANNELS};

pub use gatelink_config::{ChannelParams, EnclaveTable, TransportKind, TransportParams};
pub use gatelink_transport::Direction;

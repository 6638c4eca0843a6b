//! Channel endpoint parameters and the textual configuration grammar.
//!
//! An endpoint is described by an option string of the form
//! `<kind>,<positional>*(,<key>=<value>)*`; the first token selects the
//! transport kind, the rest configure it. This crate is pure data and
//! parsing: no I/O happens here.

pub mod enclave;
pub mod error;
pub mod param;
pub mod parse;
pub mod unparse;

pub use enclave::EnclaveTable;
pub use error::{ConfigError, Result};
pub use param::{
    apply_defaults, ChannelParams, DeviceParams, GeEthParams, MercuryParams, PipeParams,
    SerialParams, ShmemParams, TcpSocketParams, TransportKind, TransportParams, UdpShmemParams,
    UdpSocketParams, UioParams, UnixSocketParams, DEFAULT_INET_ADDR, DEFAULT_MIN_TX,
    DEFAULT_SHMEM_BUFFER, DEFAULT_UDP_SHMEM_PACKET_COUNT, DEFAULT_UDP_SHMEM_PACKET_SIZE,
    DEFAULT_UIO_PATH, GE_ETH_DEFAULT_MTU, MERCURY_DEFAULT_MTU, MERCURY_MESSAGE_TABLE_LEN,
    MERCURY_ROOT_DEVICE, SERIAL_DEFAULT_BAUD, SERIAL_DEFAULT_MTU,
};
pub use parse::parse_channel_params;
pub use unparse::{unparse_channel_params, write_description};

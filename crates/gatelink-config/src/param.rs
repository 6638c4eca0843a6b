use serde::{Deserialize, Serialize};

/// Default minimum physical write size for stream transports, in bytes.
pub const DEFAULT_MIN_TX: u32 = 512;

/// Default address for TCP and UDP channels when the positional address is empty.
pub const DEFAULT_INET_ADDR: &str = "127.0.0.1";

/// Default shared-memory buffer size, in bytes.
pub const DEFAULT_SHMEM_BUFFER: u32 = 128 << 10;

/// Default packet size for the UDP-over-shared-memory transport.
pub const DEFAULT_UDP_SHMEM_PACKET_SIZE: u32 = 1024;

/// Default packet count for the UDP-over-shared-memory transport.
pub const DEFAULT_UDP_SHMEM_PACKET_COUNT: u32 = 1000;

/// Default userspace-I/O device path.
pub const DEFAULT_UIO_PATH: &str = "/dev/uio0";

/// Default serial line rate.
pub const SERIAL_DEFAULT_BAUD: u32 = 230_400;

/// Default serial transmit chunk, in bytes.
pub const SERIAL_DEFAULT_MTU: u32 = 1024;

/// Root device node for the mercury PCI-E bridge.
pub const MERCURY_ROOT_DEVICE: &str = "/dev/gaps_ilip_0_root";

/// Default mercury frame size, in bytes.
pub const MERCURY_DEFAULT_MTU: u32 = 256;

/// Capacity of the mercury per-session message-id table.
pub const MERCURY_MESSAGE_TABLE_LEN: usize = 16;

/// Default GE ethernet frame size, in bytes.
pub const GE_ETH_DEFAULT_MTU: u32 = 1454;

/// Closed enumeration of the supported transports.
///
/// `Invalid` is the zero value; a channel with this kind is unavailable for
/// every operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    #[default]
    Invalid,
    Device,
    Pipe,
    UnixSocket,
    TcpSocket,
    UdpSocket,
    Shmem,
    UdpShmem,
    Uio,
    Serial,
    Mercury,
    GeEth,
}

impl TransportKind {
    /// The option-string token naming this kind.
    pub fn token(self) -> &'static str {
        match self {
            TransportKind::Invalid => "invalid",
            TransportKind::Device => "device",
            TransportKind::Pipe => "pipe",
            TransportKind::UnixSocket => "unix_socket",
            TransportKind::TcpSocket => "tcp_socket",
            TransportKind::UdpSocket => "udp_socket",
            TransportKind::Shmem => "shmem",
            TransportKind::UdpShmem => "udp_shmem",
            TransportKind::Uio => "uio",
            TransportKind::Serial => "serial",
            TransportKind::Mercury => "mercury",
            TransportKind::GeEth => "ge_eth",
        }
    }

    /// Look up a kind by its option-string token.
    pub fn from_token(token: &str) -> Option<Self> {
        Some(match token {
            "device" => TransportKind::Device,
            "pipe" => TransportKind::Pipe,
            "unix_socket" => TransportKind::UnixSocket,
            "tcp_socket" => TransportKind::TcpSocket,
            "udp_socket" => TransportKind::UdpSocket,
            "shmem" => TransportKind::Shmem,
            "udp_shmem" => TransportKind::UdpShmem,
            "uio" => TransportKind::Uio,
            "serial" => TransportKind::Serial,
            "mercury" => TransportKind::Mercury,
            "ge_eth" => TransportKind::GeEth,
            _ => return None,
        })
    }
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.token())
    }
}

/// Character-device channel parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceParams {
    pub path: String,
    /// Vectored-I/O slice count; zero disables vectored reads/writes.
    pub iov_len: u32,
    pub min_tx: u32,
    pub mtu: u32,
}

/// Named-pipe (FIFO) channel parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipeParams {
    pub path: String,
    pub min_tx: u32,
    pub mtu: u32,
}

/// Unix domain socket channel parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnixSocketParams {
    pub path: String,
    pub buffer_size: u32,
    pub min_tx: u32,
    pub mtu: u32,
}

/// TCP socket channel parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TcpSocketParams {
    /// Reader-side address; empty means loopback.
    pub addr: String,
    pub port: u16,
    pub buffer_size: u32,
    pub min_tx: u32,
    pub mtu: u32,
}

/// UDP socket channel parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UdpSocketParams {
    /// Reader-side address; empty means loopback.
    pub addr: String,
    pub port: u16,
    pub buffer_size: u32,
    pub mtu: u32,
}

/// Shared-memory ring channel parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShmemParams {
    pub path: String,
    pub buffer_size: u32,
}

/// UDP-over-shared-memory channel parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UdpShmemParams {
    pub path: String,
    pub buffer_size: u32,
    pub packet_size: u32,
    pub packet_count: u32,
}

/// Userspace-I/O region channel parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UioParams {
    /// Device path; empty means `/dev/uio0`.
    pub path: String,
    pub region: u16,
}

/// Serial line channel parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerialParams {
    pub path: String,
    /// Line rate; zero means 230400.
    pub baud: u32,
    /// Transmit chunk; zero means 1024.
    pub mtu: u32,
}

/// Mercury PCI-E bridge channel parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MercuryParams {
    /// Sensitivity level of the session.
    pub level: u32,
    pub source_id: u32,
    pub destination_id: u32,
    /// Optional session message ids, at most [`MERCURY_MESSAGE_TABLE_LEN`].
    pub message_ids: Vec<u32>,
    pub mtu: u32,
}

/// GE ethernet gateway channel parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeEthParams {
    /// Reader-side address; empty means loopback.
    pub addr: String,
    pub port: u16,
    pub message_id: u32,
    pub mtu: u32,
}

/// Per-transport parameter record, tagged by [`TransportKind`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransportParams {
    #[default]
    Invalid,
    Device(DeviceParams),
    Pipe(PipeParams),
    UnixSocket(UnixSocketParams),
    TcpSocket(TcpSocketParams),
    UdpSocket(UdpSocketParams),
    Shmem(ShmemParams),
    UdpShmem(UdpShmemParams),
    Uio(UioParams),
    Serial(SerialParams),
    Mercury(MercuryParams),
    GeEth(GeEthParams),
}

impl TransportParams {
    /// Zero-valued record for the given kind.
    pub fn zeroed(kind: TransportKind) -> Self {
        match kind {
            TransportKind::Invalid => TransportParams::Invalid,
            TransportKind::Device => TransportParams::Device(DeviceParams::default()),
            TransportKind::Pipe => TransportParams::Pipe(PipeParams::default()),
            TransportKind::UnixSocket => TransportParams::UnixSocket(UnixSocketParams::default()),
            TransportKind::TcpSocket => TransportParams::TcpSocket(TcpSocketParams::default()),
            TransportKind::UdpSocket => TransportParams::UdpSocket(UdpSocketParams::default()),
            TransportKind::Shmem => TransportParams::Shmem(ShmemParams::default()),
            TransportKind::UdpShmem => TransportParams::UdpShmem(UdpShmemParams::default()),
            TransportKind::Uio => TransportParams::Uio(UioParams::default()),
            TransportKind::Serial => TransportParams::Serial(SerialParams::default()),
            TransportKind::Mercury => TransportParams::Mercury(MercuryParams::default()),
            TransportKind::GeEth => TransportParams::GeEth(GeEthParams::default()),
        }
    }

    /// Discriminator tag of this record.
    pub fn kind(&self) -> TransportKind {
        match self {
            TransportParams::Invalid => TransportKind::Invalid,
            TransportParams::Device(_) => TransportKind::Device,
            TransportParams::Pipe(_) => TransportKind::Pipe,
            TransportParams::UnixSocket(_) => TransportKind::UnixSocket,
            TransportParams::TcpSocket(_) => TransportKind::TcpSocket,
            TransportParams::UdpSocket(_) => TransportKind::UdpSocket,
            TransportParams::Shmem(_) => TransportKind::Shmem,
            TransportParams::UdpShmem(_) => TransportKind::UdpShmem,
            TransportParams::Uio(_) => TransportKind::Uio,
            TransportParams::Serial(_) => TransportKind::Serial,
            TransportParams::Mercury(_) => TransportKind::Mercury,
            TransportParams::GeEth(_) => TransportKind::GeEth,
        }
    }
}

/// Complete channel endpoint parameters: a transport record plus the
/// attributes shared by every transport.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelParams {
    #[serde(flatten)]
    pub transport: TransportParams,
    /// 1-based index into the enclave table; 0 means unspecified.
    pub src_enclave: usize,
    /// 1-based index into the enclave table; 0 means unspecified.
    pub dst_enclave: usize,
    /// Read end participates in cooperative listening.
    pub listener: bool,
    /// Channel carries the one-byte execution handoff.
    pub control: bool,
    /// Both halves live in this process (set by the pair-open primitive,
    /// never by the parser).
    #[serde(skip)]
    pub pipe: bool,
}

impl ChannelParams {
    /// Zero-initialized parameters stamped with the given kind.
    pub fn new(kind: TransportKind) -> Self {
        Self {
            transport: TransportParams::zeroed(kind),
            ..Self::default()
        }
    }

    pub fn kind(&self) -> TransportKind {
        self.transport.kind()
    }
}

/// Stamp concrete defaults into zero-valued fields.
///
/// Mirrors what each driver does on open; the stored copy of the parameters
/// reflects the values actually in effect.
pub fn apply_defaults(params: &mut ChannelParams) {
    match &mut params.transport {
        TransportParams::Invalid => {}
        TransportParams::Device(p) => {
            if p.min_tx == 0 {
                p.min_tx = DEFAULT_MIN_TX;
            }
        }
        TransportParams::Pipe(p) => {
            if p.min_tx == 0 {
                p.min_tx = DEFAULT_MIN_TX;
            }
        }
        TransportParams::UnixSocket(p) => {
            if p.min_tx == 0 {
                p.min_tx = DEFAULT_MIN_TX;
            }
        }
        TransportParams::TcpSocket(p) => {
            if p.addr.is_empty() {
                p.addr = DEFAULT_INET_ADDR.to_string();
            }
            if p.min_tx == 0 {
                p.min_tx = DEFAULT_MIN_TX;
            }
        }
        TransportParams::UdpSocket(p) => {
            if p.addr.is_empty() {
                p.addr = DEFAULT_INET_ADDR.to_string();
            }
        }
        TransportParams::Shmem(p) => {
            if p.buffer_size == 0 {
                p.buffer_size = DEFAULT_SHMEM_BUFFER;
            }
        }
        TransportParams::UdpShmem(p) => {
            if p.buffer_size == 0 {
                p.buffer_size = DEFAULT_SHMEM_BUFFER;
            }
            if p.packet_size == 0 {
                p.packet_size = DEFAULT_UDP_SHMEM_PACKET_SIZE;
            }
            if p.packet_count == 0 {
                p.packet_count = DEFAULT_UDP_SHMEM_PACKET_COUNT;
            }
        }
        TransportParams::Uio(p) => {
            if p.path.is_empty() {
                p.path = DEFAULT_UIO_PATH.to_string();
            }
        }
        TransportParams::Serial(p) => {
            if p.baud == 0 {
                p.baud = SERIAL_DEFAULT_BAUD;
            }
            if p.mtu == 0 {
                p.mtu = SERIAL_DEFAULT_MTU;
            }
        }
        TransportParams::Mercury(p) => {
            if p.mtu == 0 {
                p.mtu = MERCURY_DEFAULT_MTU;
            }
        }
        TransportParams::GeEth(p) => {
            if p.addr.is_empty() {
                p.addr = DEFAULT_INET_ADDR.to_string();
            }
            if p.mtu == 0 {
                p.mtu = GE_ETH_DEFAULT_MTU;
            }
        }
    }
}

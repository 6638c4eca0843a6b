use std::os::fd::RawFd;

use gatelink_config::{ChannelParams, TransportKind, TransportParams};

use crate::direction::Direction;
use crate::error::{Result, TransportError};
use crate::{
    device, ge_eth, mercury, pipe, serial, shmem, tcp_socket, udp_shmem, udp_socket, uio,
    unix_socket,
};

/// Per-channel transport state, tagged by kind.
///
/// Dispatch is a match on the tag; the uniform operations are
/// open/close/read/write plus the raw descriptor where one exists.
#[derive(Debug)]
pub enum TransportCtx {
    Device(device::DeviceCtx),
    Pipe(pipe::PipeCtx),
    UnixSocket(unix_socket::UnixSocketCtx),
    TcpSocket(tcp_socket::TcpSocketCtx),
    UdpSocket(udp_socket::UdpSocketCtx),
    Shmem(shmem::ShmemCtx),
    UdpShmem(udp_shmem::UdpShmemCtx),
    Uio(uio::UioCtx),
    Serial(serial::SerialCtx),
    Mercury(mercury::MercuryCtx),
    GeEth(ge_eth::GeEthCtx),
}

impl TransportCtx {
    /// Open one endpoint of the channel the parameters describe.
    ///
    /// `dir` must be `Read` or `Write`; defaults should already be stamped
    /// into `params` (see `gatelink_config::apply_defaults`).
    pub fn open(params: &ChannelParams, dir: Direction) -> Result<Self> {
        if matches!(dir, Direction::ReadWrite) {
            return Err(TransportError::InvalidArgument("direction"));
        }
        match &params.transport {
            TransportParams::Invalid => Err(TransportError::NoDevice),
            TransportParams::Device(p) => device::open(p, dir).map(TransportCtx::Device),
            TransportParams::Pipe(p) => pipe::open(p, dir).map(TransportCtx::Pipe),
            TransportParams::UnixSocket(p) => {
                unix_socket::open(p, dir).map(TransportCtx::UnixSocket)
            }
            TransportParams::TcpSocket(p) => tcp_socket::open(p, dir).map(TransportCtx::TcpSocket),
            TransportParams::UdpSocket(p) => udp_socket::open(p, dir).map(TransportCtx::UdpSocket),
            TransportParams::Shmem(p) => shmem::open(p, dir).map(TransportCtx::Shmem),
            TransportParams::UdpShmem(p) => udp_shmem::open(p, dir).map(TransportCtx::UdpShmem),
            TransportParams::Uio(p) => uio::open(p, dir).map(TransportCtx::Uio),
            TransportParams::Serial(p) => serial::open(p, dir).map(TransportCtx::Serial),
            TransportParams::Mercury(p) => mercury::open(p, dir).map(TransportCtx::Mercury),
            TransportParams::GeEth(p) => ge_eth::open(p, dir).map(TransportCtx::GeEth),
        }
    }

    /// Open both halves at once without a peer process. Only the pipe
    /// transport has a kernel primitive for this; other pair-capable
    /// transports are opened symmetrically by the registry instead.
    pub fn open_anonymous_pair(params: &ChannelParams) -> Result<(Self, Self)> {
        match &params.transport {
            TransportParams::Pipe(p) => {
                let (reader, writer) = pipe::open_pair(p)?;
                Ok((TransportCtx::Pipe(reader), TransportCtx::Pipe(writer)))
            }
            other => Err(TransportError::NotImplemented {
                kind: other.kind(),
            }),
        }
    }

    /// Whether the kind supports opening both halves from one process
    /// (the symmetric open cannot deadlock).
    pub fn pair_supported(kind: TransportKind) -> bool {
        match kind {
            TransportKind::Pipe
            | TransportKind::UnixSocket
            | TransportKind::TcpSocket
            | TransportKind::UdpSocket => true,
            TransportKind::Shmem => cfg!(feature = "shmem"),
            TransportKind::UdpShmem => cfg!(feature = "udp-shmem"),
            TransportKind::Invalid
            | TransportKind::Device
            | TransportKind::Uio
            | TransportKind::Serial
            | TransportKind::Mercury
            | TransportKind::GeEth => false,
        }
    }

    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        match self {
            TransportCtx::Device(ctx) => ctx.read(buf),
            TransportCtx::Pipe(ctx) => ctx.read(buf),
            TransportCtx::UnixSocket(ctx) => ctx.read(buf),
            TransportCtx::TcpSocket(ctx) => ctx.read(buf),
            TransportCtx::UdpSocket(ctx) => ctx.read(buf),
            TransportCtx::Shmem(ctx) => ctx.read(buf),
            TransportCtx::UdpShmem(ctx) => ctx.read(buf),
            TransportCtx::Uio(ctx) => ctx.read(buf),
            TransportCtx::Serial(ctx) => ctx.read(buf),
            TransportCtx::Mercury(ctx) => ctx.read(buf),
            TransportCtx::GeEth(ctx) => ctx.read(buf),
        }
    }

    pub fn write(&mut self, buf: &[u8]) -> Result<usize> {
        match self {
            TransportCtx::Device(ctx) => ctx.write(buf),
            TransportCtx::Pipe(ctx) => ctx.write(buf),
            TransportCtx::UnixSocket(ctx) => ctx.write(buf),
            TransportCtx::TcpSocket(ctx) => ctx.write(buf),
            TransportCtx::UdpSocket(ctx) => ctx.write(buf),
            TransportCtx::Shmem(ctx) => ctx.write(buf),
            TransportCtx::UdpShmem(ctx) => ctx.write(buf),
            TransportCtx::Uio(ctx) => ctx.write(buf),
            TransportCtx::Serial(ctx) => ctx.write(buf),
            TransportCtx::Mercury(ctx) => ctx.write(buf),
            TransportCtx::GeEth(ctx) => ctx.write(buf),
        }
    }

    pub fn close(&mut self) -> Result<()> {
        match self {
            TransportCtx::Device(ctx) => ctx.close(),
            TransportCtx::Pipe(ctx) => ctx.close(),
            TransportCtx::UnixSocket(ctx) => ctx.close(),
            TransportCtx::TcpSocket(ctx) => ctx.close(),
            TransportCtx::UdpSocket(ctx) => ctx.close(),
            TransportCtx::Shmem(ctx) => ctx.close(),
            TransportCtx::UdpShmem(ctx) => ctx.close(),
            TransportCtx::Uio(ctx) => ctx.close(),
            TransportCtx::Serial(ctx) => ctx.close(),
            TransportCtx::Mercury(ctx) => ctx.close(),
            TransportCtx::GeEth(ctx) => ctx.close(),
        }
    }

    pub fn raw_fd(&self) -> Result<RawFd> {
        match self {
            TransportCtx::Device(ctx) => ctx.raw_fd(),
            TransportCtx::Pipe(ctx) => ctx.raw_fd(),
            TransportCtx::UnixSocket(ctx) => ctx.raw_fd(),
            TransportCtx::TcpSocket(ctx) => ctx.raw_fd(),
            TransportCtx::UdpSocket(ctx) => ctx.raw_fd(),
            TransportCtx::Shmem(ctx) => ctx.raw_fd(),
            TransportCtx::UdpShmem(ctx) => ctx.raw_fd(),
            TransportCtx::Uio(ctx) => ctx.raw_fd(),
            TransportCtx::Serial(ctx) => ctx.raw_fd(),
            TransportCtx::Mercury(ctx) => ctx.raw_fd(),
            TransportCtx::GeEth(ctx) => ctx.raw_fd(),
        }
    }
}

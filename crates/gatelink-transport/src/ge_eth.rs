use std::net::{Ipv4Addr, SocketAddrV4, UdpSocket};
use std::os::fd::{AsRawFd, RawFd};

use bytes::{Buf, BufMut, BytesMut};
use gatelink_config::GeEthParams;
use tracing::debug;

use crate::direction::Direction;
use crate::error::{Result, TransportError};

/// Application header carried on every GE ethernet datagram:
/// message id (4 bytes BE) + payload length (2 bytes BE).
const HEADER_SIZE: usize = 6;

/// GE ethernet gateway channel context.
///
/// UDP datagrams tagged with the gateway's message id; the reader drops
/// datagrams whose id does not match its own. One datagram per message,
/// payload capped at the MTU.
#[derive(Debug)]
pub struct GeEthCtx {
    socket: Option<UdpSocket>,
    message_id: u32,
    mtu: usize,
    scratch: BytesMut,
}

pub fn open(params: &GeEthParams, dir: Direction) -> Result<GeEthCtx> {
    if params.port == 0 {
        return Err(TransportError::InvalidArgument("ge_eth port is zero"));
    }
    let ip: Ipv4Addr = params
        .addr
        .parse()
        .map_err(|_| TransportError::InvalidArgument("ge_eth address is not IPv4"))?;
    let addr = SocketAddrV4::new(ip, params.port);

    let socket = match dir {
        Direction::Read => UdpSocket::bind(addr).map_err(|e| TransportError::Bind {
            addr: addr.to_string(),
            source: e,
        })?,
        Direction::Write => {
            let socket =
                UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).map_err(TransportError::Io)?;
            socket.connect(addr).map_err(|e| TransportError::Connect {
                addr: addr.to_string(),
                source: e,
            })?;
            socket
        }
        Direction::ReadWrite => return Err(TransportError::InvalidArgument("direction")),
    };
    debug!(%addr, message_id = params.message_id, %dir, "opened ge_eth gateway channel");

    let mtu = params.mtu as usize;
    Ok(GeEthCtx {
        socket: Some(socket),
        message_id: params.message_id,
        mtu,
        scratch: BytesMut::with_capacity(HEADER_SIZE + mtu),
    })
}

impl GeEthCtx {
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let socket = self.socket.as_ref().ok_or(TransportError::NoDevice)?;
        loop {
            self.scratch.clear();
            self.scratch.resize(HEADER_SIZE + self.mtu, 0);
            let received = socket.recv(&mut self.scratch)?;
            if received < HEADER_SIZE {
                continue;
            }
            let mut header = &self.scratch[..HEADER_SIZE];
            let message_id = header.get_u32();
            let len = header.get_u16() as usize;
            if message_id != self.message_id || received < HEADER_SIZE + len {
                // Not ours, or mangled in transit.
                debug!(message_id, expected = self.message_id, "dropping datagram");
                continue;
            }
            let copied = len.min(buf.len());
            buf[..copied].copy_from_slice(&self.scratch[HEADER_SIZE..HEADER_SIZE + copied]);
            return Ok(copied);
        }
    }

    pub fn write(&mut self, buf: &[u8]) -> Result<usize> {
        let socket = self.socket.as_ref().ok_or(TransportError::NoDevice)?;
        if buf.len() > self.mtu {
            return Err(TransportError::InvalidArgument("message larger than mtu"));
        }
        self.scratch.clear();
        self.scratch.put_u32(self.message_id);
        self.scratch.put_u16(buf.len() as u16);
        self.scratch.put_slice(buf);
        socket.send(&self.scratch)?;
        Ok(buf.len())
    }

    pub fn close(&mut self) -> Result<()> {
        match self.socket.take() {
            Some(socket) => {
                drop(socket);
                Ok(())
            }
            None => Err(TransportError::NoDevice),
        }
    }

    pub fn raw_fd(&self) -> Result<RawFd> {
        self.socket
            .as_ref()
            .map(AsRawFd::as_raw_fd)
            .ok_or(TransportError::NoDevice)
    }
}

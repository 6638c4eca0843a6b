use std::net::{Ipv4Addr, SocketAddrV4, UdpSocket};
use std::os::fd::{AsRawFd, RawFd};

use gatelink_config::UdpSocketParams;
use tracing::debug;

use crate::direction::Direction;
use crate::error::{Result, TransportError};
use crate::sockopt;

/// UDP socket channel context. One send or recv per message; no framing.
#[derive(Debug)]
pub struct UdpSocketCtx {
    socket: Option<UdpSocket>,
    mtu: usize,
}

pub fn open(params: &UdpSocketParams, dir: Direction) -> Result<UdpSocketCtx> {
    if params.port == 0 {
        return Err(TransportError::InvalidArgument("udp port is zero"));
    }
    let ip: Ipv4Addr = params
        .addr
        .parse()
        .map_err(|_| TransportError::InvalidArgument("udp address is not IPv4"))?;
    let addr = SocketAddrV4::new(ip, params.port);

    let socket = match dir {
        Direction::Read => {
            let socket = UdpSocket::bind(addr).map_err(|e| TransportError::Bind {
                addr: addr.to_string(),
                source: e,
            })?;
            if params.buffer_size > 0 {
                sockopt::set_buffer_size(socket.as_raw_fd(), libc::SO_RCVBUF, params.buffer_size)?;
            }
            debug!(%addr, "bound udp socket");
            socket
        }
        Direction::Write => {
            let socket =
                UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).map_err(TransportError::Io)?;
            if params.buffer_size > 0 {
                sockopt::set_buffer_size(socket.as_raw_fd(), libc::SO_SNDBUF, params.buffer_size)?;
            }
            socket.connect(addr).map_err(|e| TransportError::Connect {
                addr: addr.to_string(),
                source: e,
            })?;
            debug!(%addr, "connected udp socket");
            socket
        }
        Direction::ReadWrite => return Err(TransportError::InvalidArgument("direction")),
    };

    Ok(UdpSocketCtx {
        socket: Some(socket),
        mtu: params.mtu as usize,
    })
}

impl UdpSocketCtx {
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let socket = self.socket.as_ref().ok_or(TransportError::NoDevice)?;
        Ok(socket.recv(buf)?)
    }

    pub fn write(&mut self, buf: &[u8]) -> Result<usize> {
        let socket = self.socket.as_ref().ok_or(TransportError::NoDevice)?;
        if self.mtu != 0 && buf.len() > self.mtu {
            return Err(TransportError::InvalidArgument("message larger than mtu"));
        }
        Ok(socket.send(buf)?)
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

#[cfg(test)]
mod tests {
    use super::*;

    fn free_udp_port() -> u16 {
        let socket = UdpSocket::bind("127.0.0.1:0").expect("probe bind");
        socket.local_addr().expect("local addr").port()
    }

    #[test]
    fn datagram_roundtrip() {
        let port = free_udp_port();
        let params = UdpSocketParams {
            addr: "127.0.0.1".to_string(),
            port,
            buffer_size: 0,
            mtu: 0,
        };

        let mut reader = open(&params, Direction::Read).expect("reader open");
        let mut writer = open(&params, Direction::Write).expect("writer open");

        writer.write(b"datagram one").expect("write");
        writer.write(b"two").expect("write");

        let mut buf = [0u8; 64];
        let got = reader.read(&mut buf).expect("read");
        assert_eq!(&buf[..got], b"datagram one");

        let got = reader.read(&mut buf).expect("read");
        assert_eq!(&buf[..got], b"two");
    }

    #[test]
    fn oversized_message_is_rejected() {
        let port = free_udp_port();
        let params = UdpSocketParams {
            addr: "127.0.0.1".to_string(),
            port,
            buffer_size: 0,
            mtu: 8,
        };
        let _reader = open(&params, Direction::Read).expect("reader open");
        let mut writer = open(&params, Direction::Write).expect("writer open");

        let err = writer.write(b"way past the mtu").unwrap_err();
        assert!(matches!(err, TransportError::InvalidArgument(_)));
    }

    #[test]
    fn zero_port_is_rejected() {
        let params = UdpSocketParams {
            addr: "127.0.0.1".to_string(),
            port: 0,
            buffer_size: 0,
            mtu: 0,
        };
        let err = open(&params, Direction::Read).unwrap_err();
        assert!(matches!(err, TransportError::InvalidArgument(_)));
    }
}

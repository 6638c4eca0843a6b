use std::net::{Ipv4Addr, SocketAddrV4, TcpListener, TcpStream};
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};

use gatelink_config::TcpSocketParams;
use gatelink_stream::StreamFraming;
use tracing::{debug, info};

use crate::direction::Direction;
use crate::error::{Result, TransportError};
use crate::sockopt;
use crate::unix_socket::CONNECT_RETRY_DELAY;

/// TCP socket channel context.
///
/// Same shape as the unix socket driver over AF_INET: the reader binds with
/// SO_REUSEADDR (and SO_RCVBUF when configured), accepts a single connection
/// and drops the listening socket; the writer sets SO_SNDBUF and connects
/// with 100 ms backoff while the reader is starting up.
#[derive(Debug)]
pub struct TcpSocketCtx {
    stream: Option<TcpStream>,
    framing: StreamFraming,
}

pub fn open(params: &TcpSocketParams, dir: Direction) -> Result<TcpSocketCtx> {
    if params.port == 0 {
        return Err(TransportError::InvalidArgument("tcp port is zero"));
    }
    let addr = socket_addr(&params.addr, params.port)?;
    let stream = match dir {
        Direction::Read => reader_open(params, addr)?,
        Direction::Write => writer_open(params, addr)?,
        Direction::ReadWrite => return Err(TransportError::InvalidArgument("direction")),
    };
    stream.set_nodelay(true).map_err(TransportError::Io)?;
    Ok(TcpSocketCtx {
        stream: Some(stream),
        framing: StreamFraming::new(params.min_tx, params.mtu),
    })
}

fn socket_addr(addr: &str, port: u16) -> Result<SocketAddrV4> {
    let ip: Ipv4Addr = addr
        .parse()
        .map_err(|_| TransportError::InvalidArgument("tcp address is not IPv4"))?;
    Ok(SocketAddrV4::new(ip, port))
}

fn reader_open(params: &TcpSocketParams, addr: SocketAddrV4) -> Result<TcpStream> {
    // Bind through a raw socket so the options land before bind, the way
    // the reader side must for SO_REUSEADDR to matter.
    let socket = RawSocket::stream()?;
    sockopt::set_reuse_addr(socket.fd())?;
    if params.buffer_size > 0 {
        sockopt::set_buffer_size(socket.fd(), libc::SO_RCVBUF, params.buffer_size)?;
    }
    socket.bind(addr).map_err(|e| TransportError::Bind {
        addr: addr.to_string(),
        source: e,
    })?;
    let listener = socket.into_listener()?;
    info!(%addr, "listening on tcp socket");

    let (stream, peer) = listener.accept().map_err(TransportError::Accept)?;
    debug!(%addr, %peer, "accepted tcp connection");
    Ok(stream)
}

fn writer_open(params: &TcpSocketParams, addr: SocketAddrV4) -> Result<TcpStream> {
    loop {
        match TcpStream::connect(addr) {
            Ok(stream) => {
                if params.buffer_size > 0 {
                    sockopt::set_buffer_size(
                        stream.as_raw_fd(),
                        libc::SO_SNDBUF,
                        params.buffer_size,
                    )?;
                }
                debug!(%addr, "connected to tcp socket");
                return Ok(stream);
            }
            Err(err)
                if matches!(
                    err.kind(),
                    std::io::ErrorKind::NotFound | std::io::ErrorKind::ConnectionRefused
                ) =>
            {
                std::thread::sleep(CONNECT_RETRY_DELAY);
            }
            Err(err) => {
                return Err(TransportError::Connect {
                    addr: addr.to_string(),
                    source: err,
                })
            }
        }
    }
}

/// A bare AF_INET stream socket for pre-bind option setting.
struct RawSocket {
    fd: OwnedFd,
}

impl RawSocket {
    fn stream() -> Result<Self> {
        // SAFETY: plain socket(2) call; the returned descriptor is wrapped
        // exactly once.
        let fd = unsafe { libc::socket(libc::AF_INET, libc::SOCK_STREAM, 0) };
        if fd < 0 {
            return Err(TransportError::Io(std::io::Error::last_os_error()));
        }
        // SAFETY: `fd` is open and owned here.
        Ok(Self {
            fd: unsafe { OwnedFd::from_raw_fd(fd) },
        })
    }

    fn fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }

    fn bind(&self, addr: SocketAddrV4) -> std::io::Result<()> {
        let sin = libc::sockaddr_in {
            sin_family: libc::AF_INET as libc::sa_family_t,
            sin_port: addr.port().to_be(),
            sin_addr: libc::in_addr {
                s_addr: u32::from_ne_bytes(addr.ip().octets()),
            },
            sin_zero: [0; 8],
        };
        // SAFETY: `sin` is a fully initialized sockaddr_in and the length
        // matches its size.
        let rc = unsafe {
            libc::bind(
                self.fd(),
                (&sin as *const libc::sockaddr_in).cast::<libc::sockaddr>(),
                std::mem::size_of::<libc::sockaddr_in>() as libc::socklen_t,
            )
        };
        if rc < 0 {
            return Err(std::io::Error::last_os_error());
        }
        Ok(())
    }

    fn into_listener(self) -> Result<TcpListener> {
        // SAFETY: the descriptor is bound and listen(2) is valid on it.
        let rc = unsafe { libc::listen(self.fd(), 1) };
        if rc < 0 {
            return Err(TransportError::Io(std::io::Error::last_os_error()));
        }
        Ok(TcpListener::from(self.fd))
    }
}

impl TcpSocketCtx {
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let stream = self.stream.as_mut().ok_or(TransportError::NoDevice)?;
        Ok(self.framing.read_from(stream, buf)?)
    }

    pub fn write(&mut self, buf: &[u8]) -> Result<usize> {
        let stream = self.stream.as_mut().ok_or(TransportError::NoDevice)?;
        Ok(self.framing.write_to(stream, buf)?)
    }

    pub fn close(&mut self) -> Result<()> {
        match self.stream.take() {
            Some(stream) => {
                drop(stream);
                Ok(())
            }
            None => Err(TransportError::NoDevice),
        }
    }

    pub fn raw_fd(&self) -> Result<RawFd> {
        self.stream
            .as_ref()
            .map(AsRawFd::as_raw_fd)
            .ok_or(TransportError::NoDevice)
    }

    #[cfg(test)]
    fn from_stream(stream: TcpStream, min_tx: u32, mtu: u32) -> Self {
        Self {
            stream: Some(stream),
            framing: StreamFraming::new(min_tx, mtu),
        }
    }
}

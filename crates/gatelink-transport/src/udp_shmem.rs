//! UDP-style packets over shared memory.
//!
//! Fixed-size packet slots in a shared ring, one slot per message. Like the
//! shmem transport this is compiled out by default and answers
//! `NotImplemented` without the `udp-shmem` cargo feature.

use std::os::fd::RawFd;

use gatelink_config::UdpShmemParams;

use crate::direction::Direction;
use crate::error::{Result, TransportError};

#[cfg(feature = "udp-shmem")]
mod enabled {
    use tracing::debug;

    use super::*;
    use crate::ring::{Ring, HEADER_SIZE};
    use crate::shm_map::ShmMapping;

    /// Per-slot length prefix.
    const SLOT_HEADER: usize = 2;

    pub struct UdpShmemCtx {
        inner: Option<Inner>,
        writer: bool,
        packet_size: usize,
    }

    struct Inner {
        ring: Ring,
        _mapping: ShmMapping,
    }

    pub fn open(params: &UdpShmemParams, dir: Direction) -> Result<UdpShmemCtx> {
        if params.path.is_empty() {
            return Err(TransportError::InvalidArgument("udp_shmem path is empty"));
        }
        let writer = match dir {
            Direction::Read => false,
            Direction::Write => true,
            Direction::ReadWrite => {
                return Err(TransportError::InvalidArgument("direction"))
            }
        };
        let packet_size = params.packet_size as usize;
        if packet_size <= SLOT_HEADER {
            return Err(TransportError::InvalidArgument("packet size too small"));
        }
        let map_len = HEADER_SIZE + packet_size * params.packet_count as usize;
        let mapping = ShmMapping::open_posix(&params.path, map_len)?;
        // SAFETY: the mapping is owned by the context alongside the ring and
        // each side attaches exactly one half.
        let ring = unsafe { Ring::attach(mapping.as_mut_ptr(), mapping.len()) }
            .map_err(TransportError::Io)?;
        debug!(path = %params.path, packet_size, writer, "attached udp_shmem ring");
        Ok(UdpShmemCtx {
            inner: Some(Inner {
                ring,
                _mapping: mapping,
            }),
            writer,
            packet_size,
        })
    }

    impl UdpShmemCtx {
        /// One slot per message; oversized payloads are rejected like a
        /// datagram that would not fit the wire.
        pub fn write(&mut self, buf: &[u8]) -> Result<usize> {
            let inner = self.inner.as_ref().ok_or(TransportError::NoDevice)?;
            let payload_max = self.packet_size - SLOT_HEADER;
            if buf.len() > payload_max {
                return Err(TransportError::InvalidArgument(
                    "message larger than packet size",
                ));
            }
            let mut slot = vec![0u8; self.packet_size];
            slot[..SLOT_HEADER].copy_from_slice(&(buf.len() as u16).to_be_bytes());
            slot[SLOT_HEADER..SLOT_HEADER + buf.len()].copy_from_slice(buf);
            inner.ring.write(&slot);
            Ok(buf.len())
        }

        pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
            let inner = self.inner.as_ref().ok_or(TransportError::NoDevice)?;
            let mut slot = vec![0u8; self.packet_size];
            let mut got = 0usize;
            while got < slot.len() {
                let n = inner.ring.read(&mut slot[got..]);
                if n == 0 {
                    // EOF between slots is clean; inside a slot it is not,
                    // but there is nobody left to resynchronize with.
                    return Ok(0);
                }
                got += n;
            }
            let len = u16::from_be_bytes([slot[0], slot[1]]) as usize;
            let copied = len.min(buf.len());
            buf[..copied].copy_from_slice(&slot[SLOT_HEADER..SLOT_HEADER + copied]);
            Ok(copied)
        }

        pub fn close(&mut self) -> Result<()> {
            match self.inner.take() {
                Some(inner) => {
                    if self.writer {
                        inner.ring.close_writer();
                    }
                    Ok(())
                }
                None => Err(TransportError::NoDevice),
            }
        }

        pub fn raw_fd(&self) -> Result<RawFd> {
            Err(TransportError::NoDevice)
        }
    }
}

#[cfg(feature = "udp-shmem")]
pub use enabled::{open, UdpShmemCtx};

#[cfg(not(feature = "udp-shmem"))]
#[derive(Debug)]
pub struct UdpShmemCtx;

#[cfg(not(feature = "udp-shmem"))]
pub fn open(_params: &UdpShmemParams, _dir: Direction) -> Result<UdpShmemCtx> {
    Err(TransportError::NotImplemented {
        kind: gatelink_config::TransportKind::UdpShmem,
    })
}

#[cfg(not(feature = "udp-shmem"))]
impl UdpShmemCtx {
    pub fn read(&mut self, _buf: &mut [u8]) -> Result<usize> {
        Err(TransportError::NotImplemented {
            kind: gatelink_config::TransportKind::UdpShmem,
        })
    }

    pub fn write(&mut self, _buf: &[u8]) -> Result<usize> {
        Err(TransportError::NotImplemented {
            kind: gatelink_config::TransportKind::UdpShmem,
        })
    }

    pub fn close(&mut self) -> Result<()> {
        Err(TransportError::NotImplemented {
            kind: gatelink_config::TransportKind::UdpShmem,
        })
    }

    pub fn raw_fd(&self) -> Result<RawFd> {
        Err(TransportError::NoDevice)
    }
}

#[cfg(all(test, feature = "udp-shmem"))]
mod tests {
    use super::*;

    fn unique_shm_path(tag: &str) -> String {
        format!(
            "/gatelink-udpshm-{tag}-{}-{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .expect("time should be after epoch")
                .as_nanos()
        )
    }

    #[test]
    fn packet_roundtrip() {
        let params = UdpShmemParams {
            path: unique_shm_path("roundtrip"),
            buffer_size: 0,
            packet_size: 64,
            packet_count: 8,
        };
        let mut writer = open(&params, Direction::Write).expect("writer open");
        let mut reader = open(&params, Direction::Read).expect("reader open");

        writer.write(b"first").expect("write");
        writer.write(b"second packet").expect("write");

        let mut buf = [0u8; 62];
        let got = reader.read(&mut buf).expect("read");
        assert_eq!(&buf[..got], b"first");
        let got = reader.read(&mut buf).expect("read");
        assert_eq!(&buf[..got], b"second packet");
    }
}

#[cfg(all(test, not(feature = "udp-shmem")))]
mod tests {
    use super::*;

    #[test]
    fn disabled_backend_answers_not_implemented() {
        let params = UdpShmemParams::default();
        let err = open(&params, Direction::Read).unwrap_err();
        assert!(matches!(err, TransportError::NotImplemented { .. }));
    }
}

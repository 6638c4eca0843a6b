//! Shared-memory ring transport.
//!
//! Compiled out by default: without the `shmem` cargo feature every
//! operation answers `NotImplemented` while the kind stays in the
//! enumeration, so callers can probe availability by attempting open.

use std::os::fd::RawFd;

use gatelink_config::ShmemParams;

use crate::direction::Direction;
use crate::error::{Result, TransportError};

#[cfg(feature = "shmem")]
mod enabled {
    use tracing::debug;

    use super::*;
    use crate::ring::{Ring, HEADER_SIZE};
    use crate::shm_map::ShmMapping;

    /// Shared-memory channel context: one ring half plus its mapping.
    pub struct ShmemCtx {
        inner: Option<Inner>,
        writer: bool,
    }

    struct Inner {
        ring: Ring,
        // Keeps the mapping alive for as long as the ring points into it.
        _mapping: ShmMapping,
    }

    pub fn open(params: &ShmemParams, dir: Direction) -> Result<ShmemCtx> {
        if params.path.is_empty() {
            return Err(TransportError::InvalidArgument("shmem path is empty"));
        }
        let writer = match dir {
            Direction::Read => false,
            Direction::Write => true,
            Direction::ReadWrite => {
                return Err(TransportError::InvalidArgument("direction"))
            }
        };
        let map_len = HEADER_SIZE + params.buffer_size as usize;
        let mapping = ShmMapping::open_posix(&params.path, map_len)?;
        // SAFETY: the mapping is owned by the context alongside the ring and
        // each side attaches exactly one half.
        let ring = unsafe { Ring::attach(mapping.as_mut_ptr(), mapping.len()) }
            .map_err(TransportError::Io)?;
        debug!(path = %params.path, map_len, writer, "attached shmem ring");
        Ok(ShmemCtx {
            inner: Some(Inner {
                ring,
                _mapping: mapping,
            }),
            writer,
        })
    }

    impl ShmemCtx {
        pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
            let inner = self.inner.as_ref().ok_or(TransportError::NoDevice)?;
            Ok(inner.ring.read(buf))
        }

        pub fn write(&mut self, buf: &[u8]) -> Result<usize> {
            let inner = self.inner.as_ref().ok_or(TransportError::NoDevice)?;
            Ok(inner.ring.write(buf))
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

#[cfg(feature = "shmem")]
pub use enabled::{open, ShmemCtx};

#[cfg(not(feature = "shmem"))]
#[derive(Debug)]
pub struct ShmemCtx;

#[cfg(not(feature = "shmem"))]
pub fn open(_params: &ShmemParams, _dir: Direction) -> Result<ShmemCtx> {
    Err(TransportError::NotImplemented {
        kind: gatelink_config::TransportKind::Shmem,
    })
}

#[cfg(not(feature = "shmem"))]
impl ShmemCtx {
    pub fn read(&mut self, _buf: &mut [u8]) -> Result<usize> {
        Err(TransportError::NotImplemented {
            kind: gatelink_config::TransportKind::Shmem,
        })
    }

    pub fn write(&mut self, _buf: &[u8]) -> Result<usize> {
        Err(TransportError::NotImplemented {
            kind: gatelink_config::TransportKind::Shmem,
        })
    }

    pub fn close(&mut self) -> Result<()> {
        Err(TransportError::NotImplemented {
            kind: gatelink_config::TransportKind::Shmem,
        })
    }

    pub fn raw_fd(&self) -> Result<RawFd> {
        Err(TransportError::NoDevice)
    }
}

#[cfg(all(test, feature = "shmem"))]
mod tests {
    use super::*;

    fn unique_shm_path(tag: &str) -> String {
        format!(
            "/gatelink-{tag}-{}-{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .expect("time should be after epoch")
                .as_nanos()
        )
    }

    #[test]
    fn ring_roundtrip_between_contexts() {
        let path = unique_shm_path("roundtrip");
        let params = ShmemParams {
            path: path.clone(),
            buffer_size: 4096,
        };
        let mut writer = open(&params, Direction::Write).expect("writer open");
        let mut reader = open(&params, Direction::Read).expect("reader open");

        writer.write(b"over shared memory").expect("write");
        let mut buf = [0u8; 18];
        let got = reader.read(&mut buf).expect("read");
        assert_eq!(&buf[..got], b"over shared memory");

        writer.close().expect("close writer");
        reader.close().expect("close reader");
    }
}

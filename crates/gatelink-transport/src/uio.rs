//! Userspace-I/O region transport.
//!
//! The gaps uio device driver exposes a shared region that carries the same
//! ring layout as the shmem transport; region N maps at page offset N. The
//! ring lives behind the `shmem` feature, so without it this driver opens
//! the device but answers `NotImplemented` for data transfer.

use std::ffi::CString;
use std::fs::File;
use std::os::fd::{AsRawFd, FromRawFd, RawFd};

use gatelink_config::UioParams;
use tracing::debug;

use crate::direction::Direction;
use crate::error::{Result, TransportError};

#[cfg(feature = "shmem")]
use gatelink_config::DEFAULT_SHMEM_BUFFER;
#[cfg(feature = "shmem")]
use crate::ring::{Ring, HEADER_SIZE};
#[cfg(feature = "shmem")]
use crate::shm_map::ShmMapping;

#[derive(Debug)]
pub struct UioCtx {
    file: Option<File>,
    #[cfg(feature = "shmem")]
    ring: Option<RingState>,
    #[cfg(feature = "shmem")]
    writer: bool,
}

#[cfg(feature = "shmem")]
struct RingState {
    ring: Ring,
    _mapping: ShmMapping,
}

pub fn open(params: &UioParams, dir: Direction) -> Result<UioCtx> {
    if matches!(dir, Direction::ReadWrite) {
        return Err(TransportError::InvalidArgument("direction"));
    }
    let c_path = CString::new(params.path.as_bytes())
        .map_err(|_| TransportError::InvalidArgument("uio path contains NUL"))?;
    // SAFETY: `c_path` is a valid NUL-terminated string for the call.
    let fd = unsafe { libc::open(c_path.as_ptr(), libc::O_RDWR) };
    if fd < 0 {
        return Err(TransportError::Open {
            path: params.path.clone().into(),
            source: std::io::Error::last_os_error(),
        });
    }
    // SAFETY: open(2) succeeded; the descriptor is wrapped exactly once.
    let file = unsafe { File::from_raw_fd(fd) };
    debug!(path = %params.path, region = params.region, %dir, "opened uio device");

    attach_region(file, params, dir)
}

#[cfg(feature = "shmem")]
fn attach_region(file: File, params: &UioParams, dir: Direction) -> Result<UioCtx> {
    let map_len = HEADER_SIZE + DEFAULT_SHMEM_BUFFER as usize;
    let page_size = 4096i64;
    let offset = i64::from(params.region) * page_size;
    // SAFETY: the uio driver exposes at least the default region size at
    // the region's page offset; the mapping is owned next to the ring.
    let mapping = unsafe { ShmMapping::map_fd(file.as_raw_fd(), map_len, offset) }?;
    let ring =
        unsafe { Ring::attach(mapping.as_mut_ptr(), mapping.len()) }.map_err(TransportError::Io)?;
    Ok(UioCtx {
        file: Some(file),
        ring: Some(RingState {
            ring,
            _mapping: mapping,
        }),
        writer: matches!(dir, Direction::Write),
    })
}

#[cfg(not(feature = "shmem"))]
fn attach_region(file: File, _params: &UioParams, _dir: Direction) -> Result<UioCtx> {
    Ok(UioCtx { file: Some(file) })
}

impl UioCtx {
    #[cfg(feature = "shmem")]
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let state = self.ring.as_ref().ok_or(TransportError::NoDevice)?;
        Ok(state.ring.read(buf))
    }

    #[cfg(feature = "shmem")]
    pub fn write(&mut self, buf: &[u8]) -> Result<usize> {
        let state = self.ring.as_ref().ok_or(TransportError::NoDevice)?;
        Ok(state.ring.write(buf))
    }

    #[cfg(not(feature = "shmem"))]
    pub fn read(&mut self, _buf: &mut [u8]) -> Result<usize> {
        Err(TransportError::NotImplemented {
            kind: gatelink_config::TransportKind::Uio,
        })
    }

    #[cfg(not(feature = "shmem"))]
    pub fn write(&mut self, _buf: &[u8]) -> Result<usize> {
        Err(TransportError::NotImplemented {
            kind: gatelink_config::TransportKind::Uio,
        })
    }

    pub fn close(&mut self) -> Result<()> {
        match self.file.take() {
            Some(file) => {
                #[cfg(feature = "shmem")]
                if let Some(state) = self.ring.take() {
                    if self.writer {
                        state.ring.close_writer();
                    }
                }
                drop(file);
                Ok(())
            }
            None => Err(TransportError::NoDevice),
        }
    }

    pub fn raw_fd(&self) -> Result<RawFd> {
        self.file
            .as_ref()
            .map(AsRawFd::as_raw_fd)
            .ok_or(TransportError::NoDevice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_uio_device_fails_open() {
        let params = UioParams {
            path: "/dev/gatelink-no-uio".to_string(),
            region: 0,
        };
        let err = open(&params, Direction::Read).unwrap_err();
        assert!(matches!(err, TransportError::Open { .. }));
    }
}

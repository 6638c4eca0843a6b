//! Shared-memory mapping helpers for the ring-backed transports.

use std::ffi::CString;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};

use crate::error::{Result, TransportError};

/// An mmap'd shared region. Unmapped on drop; the backing object (POSIX
/// shared memory or a device region) is never unlinked here.
pub struct ShmMapping {
    ptr: *mut u8,
    len: usize,
}

// The mapping is only shared through the ring's atomic protocol.
unsafe impl Send for ShmMapping {}

impl ShmMapping {
    /// Open (creating if needed) a POSIX shared-memory object and map it
    /// read/write at the requested length.
    pub fn open_posix(path: &str, len: usize) -> Result<Self> {
        let c_path = CString::new(path)
            .map_err(|_| TransportError::InvalidArgument("shmem path contains NUL"))?;
        // SAFETY: `c_path` is a valid NUL-terminated string for the call.
        let fd = unsafe { libc::shm_open(c_path.as_ptr(), libc::O_CREAT | libc::O_RDWR, 0o660) };
        if fd < 0 {
            return Err(TransportError::Open {
                path: path.into(),
                source: std::io::Error::last_os_error(),
            });
        }
        // SAFETY: shm_open succeeded; the descriptor is wrapped exactly once
        // and closed when this function returns (the mapping survives it).
        let fd = unsafe { OwnedFd::from_raw_fd(fd) };

        // SAFETY: `fd` is open and the length is the agreed region size;
        // growing an already-sized object is a no-op.
        if unsafe { libc::ftruncate(fd.as_raw_fd(), len as libc::off_t) } < 0 {
            return Err(TransportError::Io(std::io::Error::last_os_error()));
        }
        // SAFETY: all error paths are checked; drop of `fd` closes it.
        unsafe { Self::map_fd(fd.as_raw_fd(), len, 0) }
    }

    /// Map `len` bytes of an already-open descriptor at `offset`.
    ///
    /// # Safety
    ///
    /// `fd` must be a mappable descriptor whose object is at least
    /// `offset + len` bytes long.
    pub unsafe fn map_fd(fd: RawFd, len: usize, offset: i64) -> Result<Self> {
        let ptr = libc::mmap(
            std::ptr::null_mut(),
            len,
            libc::PROT_READ | libc::PROT_WRITE,
            libc::MAP_SHARED,
            fd,
            offset as libc::off_t,
        );
        if ptr == libc::MAP_FAILED {
            return Err(TransportError::Io(std::io::Error::last_os_error()));
        }
        Ok(Self {
            ptr: ptr.cast::<u8>(),
            len,
        })
    }

    pub fn as_mut_ptr(&self) -> *mut u8 {
        self.ptr
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Drop for ShmMapping {
    fn drop(&mut self) {
        // SAFETY: `ptr`/`len` describe exactly one live mapping created in
        // `map_fd`; unmap happens once.
        unsafe {
            libc::munmap(self.ptr.cast::<libc::c_void>(), self.len);
        }
    }
}

use std::os::fd::RawFd;

use crate::error::{Result, TransportError};

/// Set an integer socket option at SOL_SOCKET level.
pub fn set_int(fd: RawFd, option: libc::c_int, value: libc::c_int) -> Result<()> {
    // SAFETY: `value` is a valid int for the duration of the call and `fd`
    // is an open socket descriptor owned by the caller.
    let rc = unsafe {
        libc::setsockopt(
            fd,
            libc::SOL_SOCKET,
            option,
            (&value as *const libc::c_int).cast::<libc::c_void>(),
            std::mem::size_of::<libc::c_int>() as libc::socklen_t,
        )
    };
    if rc < 0 {
        return Err(TransportError::Io(std::io::Error::last_os_error()));
    }
    Ok(())
}

/// Set SO_RCVBUF or SO_SNDBUF on a socket.
pub fn set_buffer_size(fd: RawFd, option: libc::c_int, size: u32) -> Result<()> {
    set_int(fd, option, size as libc::c_int)
}

/// Enable SO_REUSEADDR so the reader can rebind a recently used address.
pub fn set_reuse_addr(fd: RawFd) -> Result<()> {
    set_int(fd, libc::SO_REUSEADDR, 1)
}

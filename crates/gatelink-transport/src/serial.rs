use std::ffi::CString;
use std::fs::File;
use std::mem::MaybeUninit;
use std::os::fd::{AsRawFd, FromRawFd, RawFd};

use gatelink_config::SerialParams;
use gatelink_stream::StreamFraming;
use tracing::debug;

use crate::direction::Direction;
use crate::error::{Result, TransportError};

/// Serial line channel context.
///
/// The TTY is put into raw mode at the configured rate and then treated as a
/// plain stream transport; the MTU keeps individual writes below the UART's
/// comfortable chunk size.
#[derive(Debug)]
pub struct SerialCtx {
    file: Option<File>,
    framing: StreamFraming,
}

pub fn open(params: &SerialParams, dir: Direction) -> Result<SerialCtx> {
    if params.path.is_empty() {
        return Err(TransportError::InvalidArgument("serial path is empty"));
    }
    let speed = baud_constant(params.baud)?;
    let mode = match dir {
        Direction::Read => libc::O_RDONLY,
        Direction::Write => libc::O_WRONLY,
        Direction::ReadWrite => return Err(TransportError::InvalidArgument("direction")),
    };

    let c_path = CString::new(params.path.as_bytes())
        .map_err(|_| TransportError::InvalidArgument("serial path contains NUL"))?;
    // SAFETY: `c_path` is a valid NUL-terminated string for the call.
    let fd = unsafe { libc::open(c_path.as_ptr(), mode | libc::O_NOCTTY) };
    if fd < 0 {
        return Err(TransportError::Open {
            path: params.path.clone().into(),
            source: std::io::Error::last_os_error(),
        });
    }
    // SAFETY: open(2) succeeded; the descriptor is wrapped exactly once and
    // closed on every error path below through File's Drop.
    let file = unsafe { File::from_raw_fd(fd) };

    configure_raw(file.as_raw_fd(), speed)?;
    debug!(path = %params.path, baud = params.baud, %dir, "opened serial line");

    Ok(SerialCtx {
        file: Some(file),
        framing: StreamFraming::new(0, params.mtu),
    })
}

fn baud_constant(baud: u32) -> Result<libc::speed_t> {
    Ok(match baud {
        4800 => libc::B4800,
        9600 => libc::B9600,
        19200 => libc::B19200,
        38400 => libc::B38400,
        57600 => libc::B57600,
        115_200 => libc::B115200,
        230_400 => libc::B230400,
        _ => return Err(TransportError::InvalidArgument("unsupported baud rate")),
    })
}

fn configure_raw(fd: RawFd, speed: libc::speed_t) -> Result<()> {
    let mut attrs = MaybeUninit::<libc::termios>::uninit();
    // SAFETY: `attrs` is a valid writable termios for tcgetattr to fill.
    if unsafe { libc::tcgetattr(fd, attrs.as_mut_ptr()) } < 0 {
        return Err(TransportError::Io(std::io::Error::last_os_error()));
    }
    // SAFETY: tcgetattr succeeded, so the struct is initialized.
    let mut attrs = unsafe { attrs.assume_init() };
    // SAFETY: `attrs` is a valid termios; cfmakeraw only mutates it.
    unsafe {
        libc::cfmakeraw(&mut attrs);
        libc::cfsetispeed(&mut attrs, speed);
        libc::cfsetospeed(&mut attrs, speed);
    }
    // SAFETY: `attrs` is fully initialized and `fd` is an open TTY.
    if unsafe { libc::tcsetattr(fd, libc::TCSANOW, &attrs) } < 0 {
        return Err(TransportError::Io(std::io::Error::last_os_error()));
    }
    Ok(())
}

impl SerialCtx {
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let file = self.file.as_mut().ok_or(TransportError::NoDevice)?;
        Ok(self.framing.read_from(file, buf)?)
    }

    pub fn write(&mut self, buf: &[u8]) -> Result<usize> {
        let file = self.file.as_mut().ok_or(TransportError::NoDevice)?;
        Ok(self.framing.write_to(file, buf)?)
    }

    pub fn close(&mut self) -> Result<()> {
        match self.file.take() {
            Some(file) => {
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
    fn supported_bauds_map_to_constants() {
        assert_eq!(baud_constant(230_400).unwrap(), libc::B230400);
        assert_eq!(baud_constant(115_200).unwrap(), libc::B115200);
        assert_eq!(baud_constant(9600).unwrap(), libc::B9600);
    }

    #[test]
    fn unsupported_baud_is_rejected() {
        let err = baud_constant(123).unwrap_err();
        assert!(matches!(err, TransportError::InvalidArgument(_)));
    }

    #[test]
    fn missing_tty_fails_open() {
        let params = SerialParams {
            path: "/dev/gatelink-no-such-tty".to_string(),
            baud: 230_400,
            mtu: 1024,
        };
        let err = open(&params, Direction::Read).unwrap_err();
        assert!(matches!(err, TransportError::Open { .. }));
    }
}

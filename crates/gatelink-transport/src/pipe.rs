use std::ffi::CString;
use std::fs::{File, OpenOptions};
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::path::Path;

use gatelink_config::PipeParams;
use gatelink_stream::StreamFraming;
use tracing::debug;

use crate::direction::Direction;
use crate::error::{Result, TransportError};

/// FIFO permission bits used when the special file has to be created.
const FIFO_MODE: libc::mode_t = 0o660;

/// Named-pipe channel context.
///
/// Plain opens go through a FIFO special file on disk, which is created on
/// demand and never removed. The pair-open path uses an anonymous kernel
/// pipe instead and touches no filesystem state.
#[derive(Debug)]
pub struct PipeCtx {
    file: Option<File>,
    framing: StreamFraming,
}

pub fn open(params: &PipeParams, dir: Direction) -> Result<PipeCtx> {
    if params.path.is_empty() {
        return Err(TransportError::InvalidArgument("pipe path is empty"));
    }
    let mut options = OpenOptions::new();
    match dir {
        Direction::Read => options.read(true),
        Direction::Write => options.write(true),
        Direction::ReadWrite => return Err(TransportError::InvalidArgument("direction")),
    };
    ensure_fifo(Path::new(&params.path))?;
    let file = options.open(&params.path).map_err(|e| TransportError::Open {
        path: params.path.clone().into(),
        source: e,
    })?;
    debug!(path = %params.path, %dir, "opened fifo");

    Ok(PipeCtx {
        file: Some(file),
        framing: StreamFraming::new(params.min_tx, params.mtu),
    })
}

/// Open both ends at once over an anonymous kernel pipe.
pub fn open_pair(params: &PipeParams) -> Result<(PipeCtx, PipeCtx)> {
    let mut fds = [0 as libc::c_int; 2];
    // SAFETY: `fds` is a valid writable array of two ints.
    let rc = unsafe { libc::pipe(fds.as_mut_ptr()) };
    if rc < 0 {
        return Err(TransportError::Io(std::io::Error::last_os_error()));
    }
    // SAFETY: pipe(2) succeeded, so both descriptors are open and owned by
    // this process; each is wrapped exactly once.
    let (read_fd, write_fd) = unsafe {
        (
            OwnedFd::from_raw_fd(fds[0]),
            OwnedFd::from_raw_fd(fds[1]),
        )
    };

    let reader = PipeCtx {
        file: Some(File::from(read_fd)),
        framing: StreamFraming::new(params.min_tx, params.mtu),
    };
    let writer = PipeCtx {
        file: Some(File::from(write_fd)),
        framing: StreamFraming::new(params.min_tx, params.mtu),
    };
    Ok((reader, writer))
}

fn ensure_fifo(path: &Path) -> Result<()> {
    let c_path = CString::new(path.as_os_str().as_encoded_bytes())
        .map_err(|_| TransportError::InvalidArgument("pipe path contains NUL"))?;
    // SAFETY: `c_path` is a valid NUL-terminated string for the duration of
    // the call.
    let rc = unsafe { libc::mkfifo(c_path.as_ptr(), FIFO_MODE) };
    if rc < 0 {
        let err = std::io::Error::last_os_error();
        // An existing node is accepted as-is; open will fail later if it is
        // not actually a FIFO we can use.
        if err.raw_os_error() != Some(libc::EEXIST) {
            return Err(TransportError::Open {
                path: path.to_path_buf(),
                source: err,
            });
        }
    }
    Ok(())
}

impl PipeCtx {
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

use std::fs::{File, OpenOptions};
use std::io::{IoSlice, IoSliceMut, Read, Write};
use std::os::fd::{AsRawFd, RawFd};

use gatelink_config::DeviceParams;
use gatelink_stream::StreamFraming;
use tracing::debug;

use crate::direction::Direction;
use crate::error::{Result, TransportError};

/// Character-device channel context.
///
/// Opens the path directly (no mkfifo step). With `iov_len` set, reads and
/// writes go through vectored I/O with the buffer cut into that many slices;
/// otherwise the common stream discipline applies.
#[derive(Debug)]
pub struct DeviceCtx {
    file: Option<File>,
    framing: StreamFraming,
    iov_len: usize,
}

pub fn open(params: &DeviceParams, dir: Direction) -> Result<DeviceCtx> {
    if params.path.is_empty() {
        return Err(TransportError::InvalidArgument("device path is empty"));
    }
    let mut options = OpenOptions::new();
    match dir {
        Direction::Read => options.read(true),
        Direction::Write => options.write(true),
        Direction::ReadWrite => return Err(TransportError::InvalidArgument("direction")),
    };
    let file = options.open(&params.path).map_err(|e| TransportError::Open {
        path: params.path.clone().into(),
        source: e,
    })?;
    debug!(path = %params.path, %dir, "opened device");

    Ok(DeviceCtx {
        file: Some(file),
        framing: StreamFraming::new(params.min_tx, params.mtu),
        iov_len: params.iov_len as usize,
    })
}

impl DeviceCtx {
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let file = self.file.as_mut().ok_or(TransportError::NoDevice)?;
        if self.iov_len > 1 {
            return read_vectored(file, buf, self.iov_len);
        }
        Ok(self.framing.read_from(file, buf)?)
    }

    pub fn write(&mut self, buf: &[u8]) -> Result<usize> {
        let file = self.file.as_mut().ok_or(TransportError::NoDevice)?;
        if self.iov_len > 1 {
            return write_vectored(file, buf, self.iov_len);
        }
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

fn chunk_len(total: usize, iov_len: usize) -> usize {
    total.div_ceil(iov_len).max(1)
}

fn write_vectored(file: &mut File, buf: &[u8], iov_len: usize) -> Result<usize> {
    let slices: Vec<IoSlice<'_>> = buf
        .chunks(chunk_len(buf.len(), iov_len))
        .map(IoSlice::new)
        .collect();
    let mut written = file.write_vectored(&slices)?;
    // A short vectored write falls back to plain writes for the remainder.
    while written < buf.len() {
        match file.write(&buf[written..]) {
            Ok(0) => return Err(TransportError::Closed),
            Ok(n) => written += n,
            Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(TransportError::Io(err)),
        }
    }
    Ok(buf.len())
}

fn read_vectored(file: &mut File, buf: &mut [u8], iov_len: usize) -> Result<usize> {
    let chunk = chunk_len(buf.len(), iov_len);
    let mut slices: Vec<IoSliceMut<'_>> = buf.chunks_mut(chunk).map(IoSliceMut::new).collect();
    let n = file.read_vectored(&mut slices)?;
    Ok(n)
}

use std::io::{ErrorKind, Read, Write};

use bytes::BytesMut;

use crate::error::{Result, StreamError};

/// Per-channel stream discipline: minimum-transmit padding on write, MTU
/// chunking, and matching-length consumption on read.
///
/// Stream transports carry opaque bytes with no per-message header, so both
/// sides must agree on `min_tx` for the padding to be consumed transparently.
/// The scratch buffer is owned here and reused across calls.
#[derive(Debug)]
pub struct StreamFraming {
    min_tx: usize,
    mtu: usize,
    scratch: BytesMut,
}

impl StreamFraming {
    pub fn new(min_tx: u32, mtu: u32) -> Self {
        Self {
            min_tx: min_tx as usize,
            mtu: mtu as usize,
            scratch: BytesMut::with_capacity(min_tx as usize),
        }
    }

    /// Minimum physical write size, in bytes.
    pub fn min_tx(&self) -> usize {
        self.min_tx
    }

    /// Maximum physical write size; zero means unlimited.
    pub fn mtu(&self) -> usize {
        self.mtu
    }

    /// Write `buf` to the stream, chunking to the MTU and padding any
    /// physical write below `min_tx` with zeros. Returns the number of user
    /// bytes written (`buf.len()`), never the padded count.
    pub fn write_to<W: Write>(&mut self, writer: &mut W, buf: &[u8]) -> Result<usize> {
        let chunk_len = if self.mtu == 0 { buf.len().max(1) } else { self.mtu };
        for chunk in buf.chunks(chunk_len) {
            if chunk.len() < self.min_tx {
                self.scratch.clear();
                self.scratch.resize(self.min_tx, 0);
                self.scratch[..chunk.len()].copy_from_slice(chunk);
                write_full(writer, &self.scratch)?;
            } else {
                write_full(writer, chunk)?;
            }
        }
        Ok(buf.len())
    }

    /// Read exactly `buf.len()` bytes, or fewer on EOF. A request below
    /// `min_tx` consumes a full `min_tx` frame and discards the padding tail.
    pub fn read_from<R: Read>(&mut self, reader: &mut R, buf: &mut [u8]) -> Result<usize> {
        if buf.len() < self.min_tx {
            self.scratch.clear();
            self.scratch.resize(self.min_tx, 0);
            let got = read_full(reader, &mut self.scratch)?;
            let copied = buf.len().min(got);
            buf[..copied].copy_from_slice(&self.scratch[..copied]);
            return Ok(copied);
        }
        read_full(reader, buf)
    }
}

/// Write all of `buf`, retrying interrupted syscalls. A zero-length write
/// reports the stream as closed.
pub fn write_full<W: Write>(writer: &mut W, buf: &[u8]) -> Result<()> {
    let mut offset = 0usize;
    while offset < buf.len() {
        match writer.write(&buf[offset..]) {
            Ok(0) => return Err(StreamError::Closed),
            Ok(n) => offset += n,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(StreamError::Io(err)),
        }
    }
    Ok(())
}

/// Read until `buf` is full or the stream reports EOF. Returns the number of
/// bytes obtained; interrupted syscalls retry.
pub fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<usize> {
    let mut offset = 0usize;
    while offset < buf.len() {
        match reader.read(&mut buf[offset..]) {
            Ok(0) => break,
            Ok(n) => offset += n,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(StreamError::Io(err)),
        }
    }
    Ok(offset)
}

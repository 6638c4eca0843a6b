use std::ffi::CString;
use std::fs::File;
use std::io::{Read, Write};
use std::os::fd::{AsRawFd, FromRawFd, RawFd};

use bytes::{Buf, BufMut, BytesMut};
use gatelink_config::{MercuryParams, MERCURY_ROOT_DEVICE};
use tracing::{debug, info};

use crate::direction::Direction;
use crate::error::{Result, TransportError};

/// Mercury PCI-E bridge channel context.
///
/// Session-oriented: opening writes the session header (level, source id,
/// destination id, message-id table) to the root device and reads back the
/// session id the bridge assigned. Reads and writes are then single
/// syscalls capped at the bridge MTU.
#[derive(Debug)]
pub struct MercuryCtx {
    file: Option<File>,
    session_id: u32,
    mtu: usize,
}

pub fn open(params: &MercuryParams, dir: Direction) -> Result<MercuryCtx> {
    if matches!(dir, Direction::ReadWrite) {
        return Err(TransportError::InvalidArgument("direction"));
    }
    let c_path = CString::new(MERCURY_ROOT_DEVICE)
        .expect("root device path contains no NUL");
    // Session establishment needs both directions on the root device even
    // for one-way channels.
    // SAFETY: `c_path` is a valid NUL-terminated string for the call.
    let fd = unsafe { libc::open(c_path.as_ptr(), libc::O_RDWR) };
    if fd < 0 {
        return Err(TransportError::Open {
            path: MERCURY_ROOT_DEVICE.into(),
            source: std::io::Error::last_os_error(),
        });
    }
    // SAFETY: open(2) succeeded; the descriptor is wrapped exactly once.
    let mut file = unsafe { File::from_raw_fd(fd) };

    let session_id = establish_session(&mut file, params)?;
    info!(
        level = params.level,
        source = params.source_id,
        destination = params.destination_id,
        session_id,
        "established mercury session"
    );

    Ok(MercuryCtx {
        file: Some(file),
        session_id,
        mtu: params.mtu as usize,
    })
}

fn establish_session(file: &mut File, params: &MercuryParams) -> Result<u32> {
    let mut header = BytesMut::with_capacity(16 + params.message_ids.len() * 4);
    header.put_u32_le(params.level);
    header.put_u32_le(params.source_id);
    header.put_u32_le(params.destination_id);
    header.put_u32_le(params.message_ids.len() as u32);
    for id in &params.message_ids {
        header.put_u32_le(*id);
    }
    file.write_all(&header)?;

    let mut reply = [0u8; 4];
    file.read_exact(&mut reply)?;
    Ok((&reply[..]).get_u32_le())
}

impl MercuryCtx {
    pub fn session_id(&self) -> u32 {
        self.session_id
    }

    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let file = self.file.as_mut().ok_or(TransportError::NoDevice)?;
        let limit = buf.len().min(self.mtu);
        Ok(file.read(&mut buf[..limit])?)
    }

    pub fn write(&mut self, buf: &[u8]) -> Result<usize> {
        let file = self.file.as_mut().ok_or(TransportError::NoDevice)?;
        if buf.len() > self.mtu {
            return Err(TransportError::InvalidArgument("message larger than mtu"));
        }
        let written = file.write(buf)?;
        debug!(session_id = self.session_id, written, "mercury write");
        Ok(written)
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
    fn open_fails_without_bridge_hardware() {
        let params = MercuryParams {
            level: 1,
            source_id: 1,
            destination_id: 2,
            message_ids: vec![],
            mtu: 256,
        };
        // No /dev/gaps_ilip_0_root on a development machine.
        let err = open(&params, Direction::Read).unwrap_err();
        assert!(matches!(err, TransportError::Open { .. }));
    }

    #[test]
    fn session_header_layout() {
        let params = MercuryParams {
            level: 1,
            source_id: 2,
            destination_id: 3,
            message_ids: vec![7, 8],
            mtu: 256,
        };
        let mut header = BytesMut::new();
        header.put_u32_le(params.level);
        header.put_u32_le(params.source_id);
        header.put_u32_le(params.destination_id);
        header.put_u32_le(params.message_ids.len() as u32);
        for id in &params.message_ids {
            header.put_u32_le(*id);
        }
        assert_eq!(header.len(), 24);
        assert_eq!(&header[..4], &1u32.to_le_bytes());
        assert_eq!(&header[12..16], &2u32.to_le_bytes());
    }
}

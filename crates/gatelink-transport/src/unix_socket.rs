use std::os::fd::{AsRawFd, RawFd};
use std::os::unix::fs::FileTypeExt;
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::Path;
use std::time::Duration;

use gatelink_config::UnixSocketParams;
use gatelink_stream::StreamFraming;
use tracing::{debug, info};

use crate::direction::Direction;
use crate::error::{Result, TransportError};
use crate::sockopt;

/// Delay between writer-side connect attempts while the reader is starting.
pub const CONNECT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Unix domain socket channel context.
///
/// The reader binds, listens and accepts exactly one connection; the writer
/// connects, retrying at 100 ms intervals while the socket node is absent or
/// nothing is accepting. The socket inode is left on the filesystem at close.
#[derive(Debug)]
pub struct UnixSocketCtx {
    stream: Option<UnixStream>,
    framing: StreamFraming,
}

pub fn open(params: &UnixSocketParams, dir: Direction) -> Result<UnixSocketCtx> {
    if params.path.is_empty() {
        return Err(TransportError::InvalidArgument("unix socket path is empty"));
    }
    let stream = match dir {
        Direction::Read => reader_open(params)?,
        Direction::Write => writer_open(params)?,
        Direction::ReadWrite => return Err(TransportError::InvalidArgument("direction")),
    };
    Ok(UnixSocketCtx {
        stream: Some(stream),
        framing: StreamFraming::new(params.min_tx, params.mtu),
    })
}

fn reader_open(params: &UnixSocketParams) -> Result<UnixStream> {
    let path = Path::new(&params.path);
    remove_stale_socket(path)?;

    let listener = UnixListener::bind(path).map_err(|e| TransportError::Bind {
        addr: params.path.clone(),
        source: e,
    })?;
    if params.buffer_size > 0 {
        sockopt::set_buffer_size(listener.as_raw_fd(), libc::SO_RCVBUF, params.buffer_size)?;
    }
    info!(path = %params.path, "listening on unix socket");

    let (stream, _addr) = listener.accept().map_err(TransportError::Accept)?;
    debug!(path = %params.path, "accepted unix socket connection");
    Ok(stream)
}

fn writer_open(params: &UnixSocketParams) -> Result<UnixStream> {
    loop {
        match UnixStream::connect(&params.path) {
            Ok(stream) => {
                if params.buffer_size > 0 {
                    sockopt::set_buffer_size(
                        stream.as_raw_fd(),
                        libc::SO_SNDBUF,
                        params.buffer_size,
                    )?;
                }
                debug!(path = %params.path, "connected to unix socket");
                return Ok(stream);
            }
            Err(err)
                if matches!(
                    err.kind(),
                    std::io::ErrorKind::NotFound | std::io::ErrorKind::ConnectionRefused
                ) =>
            {
                // The reader is still starting up.
                std::thread::sleep(CONNECT_RETRY_DELAY);
            }
            Err(err) => {
                return Err(TransportError::Connect {
                    addr: params.path.clone(),
                    source: err,
                })
            }
        }
    }
}

/// Remove a leftover socket inode from a previous run. Regular files are
/// never touched; bind reports the collision instead.
fn remove_stale_socket(path: &Path) -> Result<()> {
    match std::fs::symlink_metadata(path) {
        Ok(metadata) if metadata.file_type().is_socket() => {
            debug!(?path, "removing stale socket");
            std::fs::remove_file(path).map_err(|e| TransportError::Bind {
                addr: path.display().to_string(),
                source: e,
            })
        }
        _ => Ok(()),
    }
}

impl UnixSocketCtx {
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let stream = self.stream.as_mut().ok_or(TransportError::NoDevice)?;
        Ok(self.framing.read_from(stream, buf)?)
    }

    pub fn write(&mut self, buf: &[u8]) -> Result<usize> {
        let stream = self.stream.as_mut().ok_or(TransportError::NoDevice)?;
        Ok(self.framing.write_to(stream, buf)?)
    }

    pub fn close(&mut self) -> Result<()> {
        match self.stream.take() {
            Some(stream) => {
                drop(stream);
                Ok(())
            }
            None => Err(TransportError::NoDevice),
        }
    }

    pub fn raw_fd(&self) -> Result<RawFd> {
        self.stream
            .as_ref()
            .map(AsRawFd::as_raw_fd)
            .ok_or(TransportError::NoDevice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_path(tag: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "gatelink-uds-{tag}-{}-{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .expect("time should be after epoch")
                .as_nanos()
        ));
        std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
        dir.join("gl.sock")
    }

    fn params(path: &std::path::Path) -> UnixSocketParams {
        UnixSocketParams {
            path: path.to_str().expect("utf-8 path").to_string(),
            buffer_size: 0,
            min_tx: 32,
            mtu: 0,
        }
    }

    #[test]
    fn writer_retries_until_reader_binds() {
        let path = scratch_path("retry");
        let params = params(&path);

        let writer_params = params.clone();
        let writer = std::thread::spawn(move || {
            // Starts before the reader exists; must connect eventually.
            let mut ctx = open(&writer_params, Direction::Write).expect("writer open");
            ctx.write(b"late bind").expect("write");
        });

        // Give the writer a head start so the retry path is actually taken.
        std::thread::sleep(Duration::from_millis(150));

        let mut reader = open(&params, Direction::Read).expect("reader open");
        let mut buf = [0u8; 9];
        let got = reader.read(&mut buf).expect("read");
        assert_eq!(got, 9);
        assert_eq!(&buf, b"late bind");

        writer.join().expect("writer thread");
        if let Some(parent) = path.parent() {
            let _ = std::fs::remove_dir_all(parent);
        }
    }

    #[test]
    fn stale_socket_inode_is_replaced() {
        let path = scratch_path("stale");
        // Leave a dead socket inode behind.
        let stale = UnixListener::bind(&path).expect("stale bind");
        drop(stale);
        assert!(path.exists());

        let params = params(&path);
        let writer_params = params.clone();
        let writer = std::thread::spawn(move || {
            let mut ctx = open(&writer_params, Direction::Write).expect("writer open");
            ctx.write(b"x").expect("write");
        });

        let mut reader = open(&params, Direction::Read).expect("reader rebinds");
        let mut buf = [0u8; 1];
        assert_eq!(reader.read(&mut buf).expect("read"), 1);

        writer.join().expect("writer thread");
        if let Some(parent) = path.parent() {
            let _ = std::fs::remove_dir_all(parent);
        }
    }

    #[test]
    fn empty_path_is_rejected() {
        let params = UnixSocketParams::default();
        let err = open(&params, Direction::Read).unwrap_err();
        assert!(matches!(err, TransportError::InvalidArgument(_)));
    }
}

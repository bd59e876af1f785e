use std::io::ErrorKind;
use std::os::unix::fs::{FileTypeExt, MetadataExt};
use std::os::unix::net::UnixDatagram;
use std::path::{Path, PathBuf};
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tracing::{debug, info, trace};

use crate::error::{Result, TransportError};
use crate::traits::{FrameSink, TxFrame};

/// Unix datagram transport: one datagram carries exactly one link frame.
///
/// Turnaround metadata has no meaning on a socket; it is traced and dropped.
pub struct DatagramTransport {
    socket: UnixDatagram,
    path: Option<PathBuf>,
    created_inode: Option<(u64, u64)>,
}

impl DatagramTransport {
    /// Largest frame accepted in either direction (2048-byte data field plus headers).
    pub const MAX_FRAME_LEN: usize = 2048 + 64;
    /// Maximum socket path length.
    /// Unix `sockaddr_un.sun_path` is typically 108 bytes on Linux, 104 on macOS.
    #[cfg(target_os = "linux")]
    const MAX_PATH_LEN: usize = 108;
    #[cfg(not(target_os = "linux"))]
    const MAX_PATH_LEN: usize = 104;

    /// Create a connected, unnamed pair (loopback link).
    pub fn pair() -> Result<(Self, Self)> {
        let (left, right) = UnixDatagram::pair()?;
        Ok((Self::from_socket(left), Self::from_socket(right)))
    }

    /// Bind a datagram socket at `path`.
    ///
    /// A stale socket at `path` is removed first; any other file is left
    /// alone and the bind fails.
    pub fn bind(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let path_bytes = path.as_os_str().len();
        if path_bytes >= Self::MAX_PATH_LEN {
            return Err(TransportError::PathTooLong {
                path,
                len: path_bytes,
                max: Self::MAX_PATH_LEN,
            });
        }

        if path.exists() {
            let metadata = std::fs::symlink_metadata(&path).map_err(|e| TransportError::Bind {
                path: path.clone(),
                source: e,
            })?;
            if !metadata.file_type().is_socket() {
                return Err(TransportError::Bind {
                    path: path.clone(),
                    source: std::io::Error::new(
                        ErrorKind::AlreadyExists,
                        "existing path is not a unix socket",
                    ),
                });
            }
            debug!(?path, "removing stale socket");
            std::fs::remove_file(&path).map_err(|e| TransportError::Bind {
                path: path.clone(),
                source: e,
            })?;
        }

        let socket = UnixDatagram::bind(&path).map_err(|e| TransportError::Bind {
            path: path.clone(),
            source: e,
        })?;
        let created = std::fs::symlink_metadata(&path).map_err(|e| TransportError::Bind {
            path: path.clone(),
            source: e,
        })?;

        info!(?path, "bound unix datagram socket");

        Ok(Self {
            socket,
            created_inode: Some((created.dev(), created.ino())),
            path: Some(path),
        })
    }

    /// Direct subsequent transmissions at the socket bound at `path`.
    pub fn connect(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        self.socket
            .connect(path)
            .map_err(|e| TransportError::Connect {
                path: path.to_path_buf(),
                source: e,
            })?;
        debug!(?path, "connected unix datagram socket");
        Ok(())
    }

    /// Receive the next frame (blocking, subject to the read timeout).
    pub fn recv_frame(&self) -> Result<Bytes> {
        let mut buf = BytesMut::zeroed(Self::MAX_FRAME_LEN);
        loop {
            match self.socket.recv(&mut buf) {
                Ok(n) => {
                    buf.truncate(n);
                    trace!(len = n, "received frame");
                    return Ok(buf.freeze());
                }
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(TransportError::Io(err)),
            }
        }
    }

    /// Set the read timeout used by [`recv_frame`](Self::recv_frame).
    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        self.socket.set_read_timeout(timeout).map_err(Into::into)
    }

    /// The path this socket is bound to, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn from_socket(socket: UnixDatagram) -> Self {
        Self {
            socket,
            path: None,
            created_inode: None,
        }
    }
}

impl FrameSink for DatagramTransport {
    fn transmit(&mut self, frame: TxFrame) -> Result<()> {
        if frame.len() > Self::MAX_FRAME_LEN {
            return Err(TransportError::FrameTooLarge {
                size: frame.len(),
                max: Self::MAX_FRAME_LEN,
            });
        }
        trace!(
            len = frame.len(),
            mtt = frame.meta.mtt,
            xbofs = frame.meta.xbofs,
            xbofs_delay = frame.meta.xbofs_delay,
            "transmitting frame"
        );
        loop {
            match self.socket.send(&frame.data) {
                Ok(_) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(TransportError::Io(err)),
            }
        }
    }
}

impl Drop for DatagramTransport {
    fn drop(&mut self) {
        let (Some(path), Some((expected_dev, expected_ino))) = (&self.path, self.created_inode)
        else {
            return;
        };
        if let Ok(metadata) = std::fs::symlink_metadata(path) {
            if metadata.file_type().is_socket()
                && metadata.dev() == expected_dev
                && metadata.ino() == expected_ino
            {
                debug!(?path, "cleaning up socket file");
                let _ = std::fs::remove_file(path);
            } else {
                debug!(?path, "socket path identity changed; skipping cleanup");
            }
        }
    }
}

impl std::fmt::Debug for DatagramTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatagramTransport")
            .field("path", &self.path)
            .finish()
    }
}

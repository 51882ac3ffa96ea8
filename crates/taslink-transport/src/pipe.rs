use std::io::ErrorKind;
use std::os::unix::fs::{FileTypeExt, MetadataExt, PermissionsExt};
use std::os::unix::net::UnixListener;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::stream::PipeStream;

/// The well-known pipe name shared by both peers.
pub const PIPE_NAME: &str = "taslink.sock";

/// The fixed pipe path both peers agree on: `<tmp>/taslink.sock`.
///
/// The host binds here; the controller connects here. There is exactly
/// one channel per machine, matching the one-host-one-controller model.
pub fn default_pipe_path() -> PathBuf {
    std::env::temp_dir().join(PIPE_NAME)
}

/// The host end of the duplex pipe.
///
/// Binds a filesystem-path Unix domain socket and accepts one controller
/// connection at a time. A stale socket left behind by a crashed host is
/// removed on bind; the path is cleaned up on drop if it still refers to
/// the socket this listener created.
pub struct PipeListener {
    listener: UnixListener,
    path: PathBuf,
    created_inode: Option<(u64, u64)>,
    cleanup_on_drop: bool,
}

impl PipeListener {
    /// Default permission mode for created socket paths.
    pub const DEFAULT_SOCKET_MODE: u32 = 0o600;
    /// Maximum socket path length.
    /// Unix `sockaddr_un.sun_path` is typically 108 bytes on Linux, 104 on macOS.
    #[cfg(target_os = "linux")]
    const MAX_PATH_LEN: usize = 108;
    #[cfg(target_os = "macos")]
    const MAX_PATH_LEN: usize = 104;
    #[cfg(not(any(target_os = "linux", target_os = "macos")))]
    const MAX_PATH_LEN: usize = 104;

    /// Bind and listen at `path`.
    ///
    /// If a socket file already exists at `path` it is removed first
    /// (stale socket from a crashed host); any other kind of file is an
    /// error.
    pub fn bind(path: impl AsRef<Path>) -> Result<Self> {
        Self::bind_with_mode(path, Self::DEFAULT_SOCKET_MODE)
    }

    /// Bind and listen with an explicit permission mode.
    pub fn bind_with_mode(path: impl AsRef<Path>, mode: u32) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let path_bytes = path.as_os_str().len();
        if path_bytes >= Self::MAX_PATH_LEN {
            return Err(TransportError::PathTooLong {
                path,
                len: path_bytes,
                max: Self::MAX_PATH_LEN,
            });
        }

        // Remove a stale socket if it exists, but never remove non-socket files.
        if path.exists() {
            let metadata = std::fs::symlink_metadata(&path).map_err(|e| TransportError::Bind {
                path: path.clone(),
                source: e,
            })?;
            if metadata.file_type().is_socket() {
                debug!(?path, "removing stale pipe socket");
                std::fs::remove_file(&path).map_err(|e| TransportError::Bind {
                    path: path.clone(),
                    source: e,
                })?;
            } else {
                return Err(TransportError::Bind {
                    path: path.clone(),
                    source: std::io::Error::new(
                        ErrorKind::AlreadyExists,
                        "existing path is not a unix socket",
                    ),
                });
            }
        }

        let listener = UnixListener::bind(&path).map_err(|e| TransportError::Bind {
            path: path.clone(),
            source: e,
        })?;

        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(mode)).map_err(|e| {
            TransportError::Bind {
                path: path.clone(),
                source: e,
            }
        })?;
        let created_metadata =
            std::fs::symlink_metadata(&path).map_err(|e| TransportError::Bind {
                path: path.clone(),
                source: e,
            })?;
        let created_inode = Some((created_metadata.dev(), created_metadata.ino()));

        info!(?path, "listening for controller on pipe");

        Ok(Self {
            listener,
            path,
            created_inode,
            cleanup_on_drop: true,
        })
    }

    /// Accept the controller connection (blocking).
    pub fn accept(&self) -> Result<PipeStream> {
        self.listener
            .set_nonblocking(false)
            .map_err(TransportError::Io)?;
        let (stream, _addr) = self.listener.accept().map_err(TransportError::Accept)?;
        debug!("accepted controller connection");
        Ok(PipeStream::from_unix(stream))
    }

    /// Accept the controller connection, giving up after `timeout`.
    ///
    /// Returns `Ok(None)` when no controller connected within the window.
    /// The channel worker uses this so that a blocked accept cannot keep
    /// it from observing a shutdown request.
    pub fn accept_timeout(&self, timeout: Duration) -> Result<Option<PipeStream>> {
        self.listener
            .set_nonblocking(true)
            .map_err(TransportError::Io)?;

        let deadline = Instant::now() + timeout;
        loop {
            match self.listener.accept() {
                Ok((stream, _addr)) => {
                    stream.set_nonblocking(false).map_err(TransportError::Io)?;
                    debug!("accepted controller connection");
                    return Ok(Some(PipeStream::from_unix(stream)));
                }
                Err(err) if err.kind() == ErrorKind::WouldBlock => {
                    if Instant::now() >= deadline {
                        return Ok(None);
                    }
                    std::thread::sleep(Duration::from_millis(10));
                }
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(TransportError::Accept(err)),
            }
        }
    }

    /// Connect to a listening host (blocking).
    pub fn connect(path: impl AsRef<Path>) -> Result<PipeStream> {
        let path = path.as_ref();
        let stream =
            std::os::unix::net::UnixStream::connect(path).map_err(|e| TransportError::Connect {
                path: path.to_path_buf(),
                source: e,
            })?;
        debug!(?path, "connected to host pipe");
        Ok(PipeStream::from_unix(stream))
    }

    /// The path this pipe is bound to.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for PipeListener {
    fn drop(&mut self) {
        if self.cleanup_on_drop {
            if let Some((expected_dev, expected_ino)) = self.created_inode {
                if let Ok(metadata) = std::fs::symlink_metadata(&self.path) {
                    if metadata.file_type().is_socket()
                        && metadata.dev() == expected_dev
                        && metadata.ino() == expected_ino
                    {
                        debug!(path = ?self.path, "cleaning up pipe socket file");
                        let _ = std::fs::remove_file(&self.path);
                    } else {
                        debug!(
                            path = ?self.path,
                            "pipe path identity changed; skipping cleanup"
                        );
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};

    fn temp_pipe_path(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("taslink-{}-{}", tag, std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir.join("link.sock")
    }

    #[test]
    fn bind_accept_connect() {
        let sock_path = temp_pipe_path("bind");
        let listener = PipeListener::bind(&sock_path).unwrap();
        assert!(sock_path.exists());

        let path_clone = sock_path.clone();
        let handle = std::thread::spawn(move || {
            let mut client = PipeListener::connect(&path_clone).unwrap();
            client.write_all(b"hello").unwrap();
        });

        let mut server = listener.accept().unwrap();
        let mut buf = [0u8; 5];
        server.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"hello");

        handle.join().unwrap();

        drop(listener);
        assert!(!sock_path.exists(), "socket file should be cleaned up on drop");
        let _ = std::fs::remove_dir_all(sock_path.parent().unwrap());
    }

    #[test]
    fn accept_timeout_expires_without_peer() {
        let sock_path = temp_pipe_path("timeout");
        let listener = PipeListener::bind(&sock_path).unwrap();

        let start = Instant::now();
        let result = listener.accept_timeout(Duration::from_millis(50)).unwrap();
        assert!(result.is_none());
        assert!(start.elapsed() >= Duration::from_millis(50));

        let _ = std::fs::remove_dir_all(sock_path.parent().unwrap());
    }

    #[test]
    fn accept_timeout_returns_connecting_peer() {
        let sock_path = temp_pipe_path("timeout-ok");
        let listener = PipeListener::bind(&sock_path).unwrap();

        let path_clone = sock_path.clone();
        let handle = std::thread::spawn(move || PipeListener::connect(&path_clone).unwrap());

        let stream = listener.accept_timeout(Duration::from_secs(2)).unwrap();
        assert!(stream.is_some());

        let _client = handle.join().unwrap();
        let _ = std::fs::remove_dir_all(sock_path.parent().unwrap());
    }

    #[test]
    fn path_too_long() {
        let long_path = "/tmp/".to_string() + &"a".repeat(200) + ".sock";
        let result = PipeListener::bind(&long_path);
        assert!(matches!(result, Err(TransportError::PathTooLong { .. })));
    }

    #[test]
    fn bind_default_permissions_hardened() {
        let sock_path = temp_pipe_path("perms");
        let listener = PipeListener::bind(&sock_path).unwrap();
        let mode = std::fs::metadata(&sock_path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);

        drop(listener);
        let _ = std::fs::remove_dir_all(sock_path.parent().unwrap());
    }

    #[test]
    fn bind_rejects_existing_non_socket_file() {
        let sock_path = temp_pipe_path("file");
        std::fs::write(&sock_path, b"regular-file").unwrap();

        let result = PipeListener::bind(&sock_path);
        assert!(matches!(result, Err(TransportError::Bind { .. })));

        let _ = std::fs::remove_dir_all(sock_path.parent().unwrap());
    }

    #[test]
    fn bind_replaces_stale_socket() {
        let sock_path = temp_pipe_path("stale");
        let first = PipeListener::bind(&sock_path).unwrap();
        // Simulate a crashed host: forget the listener without cleanup.
        std::mem::forget(first);

        let second = PipeListener::bind(&sock_path);
        assert!(second.is_ok());

        drop(second);
        let _ = std::fs::remove_dir_all(sock_path.parent().unwrap());
    }

    #[test]
    fn drop_does_not_remove_replaced_path() {
        let sock_path = temp_pipe_path("drop-race");
        let listener = PipeListener::bind(&sock_path).unwrap();
        assert!(sock_path.exists());

        // Replace path while listener is alive.
        std::fs::remove_file(&sock_path).unwrap();
        std::fs::write(&sock_path, b"replacement-file").unwrap();

        drop(listener);
        assert!(
            sock_path.exists(),
            "drop must not remove path if inode identity changed"
        );

        let _ = std::fs::remove_dir_all(sock_path.parent().unwrap());
    }

    #[test]
    fn default_path_is_stable() {
        assert_eq!(default_pipe_path(), default_pipe_path());
        assert!(default_pipe_path().ends_with(PIPE_NAME));
    }
}

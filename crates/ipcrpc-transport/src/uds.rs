use std::cell::Cell;
use std::os::unix::fs::{DirBuilderExt, FileTypeExt, MetadataExt, PermissionsExt};
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::net::{UnixListener, UnixStream};
use tracing::{debug, info};

use crate::endpoint;
use crate::error::{Result, TransportError};
use crate::stream::IpcStream;

/// Unix domain socket transport.
///
/// Binds a filesystem-path socket inside a private directory and removes the
/// socket file on [`close`](Self::close) or drop, provided the path still
/// refers to the socket this listener created.
pub struct UnixDomainSocket {
    listener: UnixListener,
    path: PathBuf,
    created_inode: Option<(u64, u64)>,
    cleaned_up: Cell<bool>,
}

impl UnixDomainSocket {
    /// Default permission mode for created socket paths.
    pub const DEFAULT_SOCKET_MODE: u32 = 0o600;
    /// Permission mode for the endpoint directory.
    pub const DEFAULT_DIR_MODE: u32 = 0o700;
    /// Maximum socket path length.
    /// Unix `sockaddr_un.sun_path` is typically 108 bytes on Linux, 104 on macOS.
    #[cfg(target_os = "linux")]
    const MAX_PATH_LEN: usize = 108;
    #[cfg(not(target_os = "linux"))]
    const MAX_PATH_LEN: usize = 104;

    /// Bind a fresh `<name>_<random>.sock` endpoint inside `dir`.
    ///
    /// The directory is created with mode 0700 if missing and tightened if it
    /// already exists with group/other access.
    pub fn bind_endpoint(dir: &Path, name: &str) -> Result<Self> {
        ensure_private_dir(dir)?;
        let path = endpoint::socket_path(dir, name)?;
        Self::bind(path)
    }

    /// Bind and listen on a filesystem-path Unix domain socket.
    ///
    /// If the file already exists and is a socket, it is removed first (stale
    /// socket cleanup). Must be called from within a tokio runtime.
    pub fn bind(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let bind_err = |source| TransportError::Bind {
            path: path.clone(),
            source,
        };

        let path_bytes = path.as_os_str().len();
        if path_bytes >= Self::MAX_PATH_LEN {
            return Err(TransportError::PathTooLong {
                path,
                len: path_bytes,
                max: Self::MAX_PATH_LEN,
            });
        }

        // Remove stale socket if it exists, but never remove non-socket files.
        if let Ok(metadata) = std::fs::symlink_metadata(&path) {
            if metadata.file_type().is_socket() {
                debug!(?path, "removing stale socket");
                std::fs::remove_file(&path).map_err(bind_err)?;
            } else {
                return Err(bind_err(std::io::Error::new(
                    std::io::ErrorKind::AlreadyExists,
                    "existing path is not a unix socket",
                )));
            }
        }

        let listener = UnixListener::bind(&path).map_err(bind_err)?;

        std::fs::set_permissions(
            &path,
            std::fs::Permissions::from_mode(Self::DEFAULT_SOCKET_MODE),
        )
        .map_err(bind_err)?;
        let created = std::fs::symlink_metadata(&path).map_err(bind_err)?;

        info!(?path, "listening on unix domain socket");

        Ok(Self {
            listener,
            created_inode: Some((created.dev(), created.ino())),
            path,
            cleaned_up: Cell::new(false),
        })
    }

    /// Accept an incoming connection.
    pub async fn accept(&self) -> Result<IpcStream> {
        let (stream, _addr) = self
            .listener
            .accept()
            .await
            .map_err(TransportError::Accept)?;
        debug!(path = ?self.path, "accepted connection");
        Ok(IpcStream::from_unix(stream))
    }

    /// Connect to a listening Unix domain socket.
    pub async fn connect(path: impl AsRef<Path>, timeout: Duration) -> Result<IpcStream> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(TransportError::AddressNotFound(path.display().to_string()));
        }

        let stream = tokio::time::timeout(timeout, UnixStream::connect(path))
            .await
            .map_err(|_| TransportError::Timeout(timeout))?
            .map_err(|source| TransportError::Connect {
                address: path.display().to_string(),
                source,
            })?;
        debug!(?path, "connected to unix domain socket");
        Ok(IpcStream::from_unix(stream))
    }

    /// The path this socket is bound to.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove the socket file. Idempotent; also runs on drop.
    pub fn close(&self) {
        if self.cleaned_up.replace(true) {
            return;
        }
        let Some((expected_dev, expected_ino)) = self.created_inode else {
            return;
        };
        if let Ok(metadata) = std::fs::symlink_metadata(&self.path) {
            if metadata.file_type().is_socket()
                && metadata.dev() == expected_dev
                && metadata.ino() == expected_ino
            {
                debug!(path = ?self.path, "cleaning up socket file");
                let _ = std::fs::remove_file(&self.path);
            } else {
                debug!(
                    path = ?self.path,
                    "socket path identity changed; skipping cleanup"
                );
            }
        }
    }
}

impl Drop for UnixDomainSocket {
    fn drop(&mut self) {
        self.close();
    }
}

fn ensure_private_dir(dir: &Path) -> Result<()> {
    let bind_err = |source| TransportError::Bind {
        path: dir.to_path_buf(),
        source,
    };

    match std::fs::symlink_metadata(dir) {
        Ok(metadata) => {
            if !metadata.file_type().is_dir() {
                return Err(bind_err(std::io::Error::new(
                    std::io::ErrorKind::AlreadyExists,
                    "endpoint directory path is not a directory",
                )));
            }
            // SAFETY: geteuid has no preconditions and cannot fail.
            let euid = unsafe { libc::geteuid() };
            if metadata.uid() != euid {
                return Err(bind_err(std::io::Error::new(
                    std::io::ErrorKind::PermissionDenied,
                    "endpoint directory is owned by another user",
                )));
            }
            if metadata.permissions().mode() & 0o077 != 0 {
                debug!(?dir, "tightening endpoint directory permissions");
                std::fs::set_permissions(
                    dir,
                    std::fs::Permissions::from_mode(UnixDomainSocket::DEFAULT_DIR_MODE),
                )
                .map_err(bind_err)?;
            }
            Ok(())
        }
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => std::fs::DirBuilder::new()
            .recursive(true)
            .mode(UnixDomainSocket::DEFAULT_DIR_MODE)
            .create(dir)
            .map_err(bind_err),
        Err(err) => Err(bind_err(err)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    fn unique_dir(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "ipcrpc-{tag}-{}-{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .expect("time should be after epoch")
                .as_nanos()
        ))
    }

    #[tokio::test]
    async fn test_bind_accept_connect() {
        let dir = unique_dir("uds");
        let listener = UnixDomainSocket::bind_endpoint(&dir, "test").unwrap();
        let sock_path = listener.path().to_path_buf();
        assert!(sock_path.exists());

        let path_clone = sock_path.clone();
        let client = tokio::spawn(async move {
            let mut client = UnixDomainSocket::connect(&path_clone, Duration::from_secs(1))
                .await
                .unwrap();
            client.write_all(b"hello").await.unwrap();
        });

        let mut server = listener.accept().await.unwrap();
        let mut buf = [0u8; 5];
        server.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"hello");
        client.await.unwrap();

        drop(listener);
        assert!(
            !sock_path.exists(),
            "socket file should be cleaned up on drop"
        );
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_endpoint_permissions_hardened() {
        let dir = unique_dir("perms");
        let listener = UnixDomainSocket::bind_endpoint(&dir, "perm").unwrap();

        let sock_mode = std::fs::metadata(listener.path())
            .unwrap()
            .permissions()
            .mode()
            & 0o777;
        assert_eq!(sock_mode, 0o600);
        let dir_mode = std::fs::metadata(&dir).unwrap().permissions().mode() & 0o777;
        assert_eq!(dir_mode, 0o700);

        drop(listener);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_loose_directory_is_tightened() {
        let dir = unique_dir("loose");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::set_permissions(&dir, std::fs::Permissions::from_mode(0o755)).unwrap();

        let listener = UnixDomainSocket::bind_endpoint(&dir, "loose").unwrap();
        let dir_mode = std::fs::metadata(&dir).unwrap().permissions().mode() & 0o777;
        assert_eq!(dir_mode, 0o700);

        drop(listener);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_close_removes_socket_file() {
        let dir = unique_dir("close");
        let listener = UnixDomainSocket::bind_endpoint(&dir, "close").unwrap();
        let path = listener.path().to_path_buf();

        listener.close();
        assert!(!path.exists());
        listener.close();

        drop(listener);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_connect_missing_address() {
        let err = UnixDomainSocket::connect(
            "/tmp/ipcrpc-does-not-exist.sock",
            Duration::from_secs(1),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, TransportError::AddressNotFound(_)));
        assert!(err.to_string().contains("does not exist"));
    }

    #[tokio::test]
    async fn test_path_too_long() {
        let long_path = "/tmp/".to_string() + &"a".repeat(200) + ".sock";
        let result = UnixDomainSocket::bind(&long_path);
        assert!(matches!(result, Err(TransportError::PathTooLong { .. })));
    }

    #[tokio::test]
    async fn test_bind_rejects_existing_non_socket_file() {
        let dir = unique_dir("bind-file");
        std::fs::create_dir_all(&dir).unwrap();
        let sock_path = dir.join("not-a-socket.sock");
        std::fs::write(&sock_path, b"regular-file").unwrap();

        let result = UnixDomainSocket::bind(&sock_path);
        assert!(matches!(result, Err(TransportError::Bind { .. })));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_drop_does_not_remove_replaced_path() {
        let dir = unique_dir("drop-race");
        let listener = UnixDomainSocket::bind_endpoint(&dir, "drop").unwrap();
        let sock_path = listener.path().to_path_buf();

        // Replace path while listener is alive.
        std::fs::remove_file(&sock_path).unwrap();
        std::fs::write(&sock_path, b"replacement-file").unwrap();

        drop(listener);
        assert!(
            sock_path.exists(),
            "drop must not remove path if inode identity changed"
        );

        let _ = std::fs::remove_dir_all(&dir);
    }
}

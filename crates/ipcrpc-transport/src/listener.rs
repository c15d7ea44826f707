use std::time::Duration;

use crate::config::TransportConfig;
use crate::error::{Result, TransportError};
use crate::stream::IpcStream;

#[cfg(windows)]
use crate::pipe::NamedPipeListener;
#[cfg(unix)]
use crate::uds::UnixDomainSocket;

/// Transport implementation selected for the current platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    /// Unix domain socket under a private temp directory.
    UnixSocket,
    /// Windows named pipe.
    NamedPipe,
}

impl Transport {
    /// Pick the transport for the current platform.
    pub fn for_platform() -> Result<Self> {
        if cfg!(unix) {
            Ok(Self::UnixSocket)
        } else if cfg!(windows) {
            Ok(Self::NamedPipe)
        } else {
            Err(TransportError::Unsupported(std::env::consts::OS))
        }
    }

    /// Short name for diagnostics.
    pub fn name(self) -> &'static str {
        match self {
            Self::UnixSocket => "unix-domain-socket",
            Self::NamedPipe => "named-pipe",
        }
    }

    /// Bind a fresh endpoint for `config.name` and start listening.
    pub fn start_server(self, config: &TransportConfig) -> Result<IpcListener> {
        match self {
            #[cfg(unix)]
            Self::UnixSocket => {
                let dir = config
                    .directory
                    .clone()
                    .unwrap_or_else(crate::endpoint::default_endpoint_dir);
                let socket = UnixDomainSocket::bind_endpoint(&dir, &config.name)?;
                Ok(IpcListener {
                    inner: ListenerInner::Unix(socket),
                })
            }
            #[cfg(windows)]
            Self::NamedPipe => {
                let pipe = NamedPipeListener::bind_endpoint(&config.name)?;
                Ok(IpcListener {
                    inner: ListenerInner::Pipe(pipe),
                })
            }
            #[allow(unreachable_patterns)]
            _ => Err(TransportError::Unsupported(self.name())),
        }
    }

    /// Connect to an address produced by [`start_server`](Self::start_server).
    pub async fn connect(self, address: &str, timeout: Duration) -> Result<IpcStream> {
        match self {
            #[cfg(unix)]
            Self::UnixSocket => UnixDomainSocket::connect(address, timeout).await,
            #[cfg(windows)]
            Self::NamedPipe => NamedPipeListener::connect(address, timeout).await,
            #[allow(unreachable_patterns)]
            _ => Err(TransportError::Unsupported(self.name())),
        }
    }
}

/// A listening endpoint that keeps accepting peers until closed.
pub struct IpcListener {
    inner: ListenerInner,
}

enum ListenerInner {
    #[cfg(unix)]
    Unix(UnixDomainSocket),
    #[cfg(windows)]
    Pipe(NamedPipeListener),
}

impl IpcListener {
    /// The address peers pass to [`Transport::connect`].
    pub fn address(&self) -> String {
        match &self.inner {
            #[cfg(unix)]
            ListenerInner::Unix(socket) => socket.path().display().to_string(),
            #[cfg(windows)]
            ListenerInner::Pipe(pipe) => pipe.name().to_string(),
        }
    }

    /// Accept the next peer.
    pub async fn accept(&self) -> Result<IpcStream> {
        match &self.inner {
            #[cfg(unix)]
            ListenerInner::Unix(socket) => socket.accept().await,
            #[cfg(windows)]
            ListenerInner::Pipe(pipe) => pipe.accept().await,
        }
    }

    /// Stop listening and remove the endpoint. Idempotent.
    pub fn close(&self) {
        match &self.inner {
            #[cfg(unix)]
            ListenerInner::Unix(socket) => socket.close(),
            #[cfg(windows)]
            ListenerInner::Pipe(pipe) => pipe.close(),
        }
    }
}

impl std::fmt::Debug for IpcListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IpcListener")
            .field("address", &self.address())
            .finish()
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::path::Path;

    fn unique_dir(tag: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!(
            "ipcrpc-{tag}-{}-{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .expect("time should be after epoch")
                .as_nanos()
        ))
    }

    #[test]
    fn platform_transport_is_unix_socket() {
        assert_eq!(Transport::for_platform().unwrap(), Transport::UnixSocket);
    }

    #[tokio::test]
    async fn start_server_accepts_multiple_peers() {
        let dir = unique_dir("listener");
        let config = TransportConfig {
            directory: Some(dir.clone()),
            ..TransportConfig::new("multi")
        };
        let transport = Transport::for_platform().unwrap();
        let listener = transport.start_server(&config).unwrap();
        let address = listener.address();
        assert!(address.contains("multi_"));

        let first = transport.connect(&address, Duration::from_secs(1)).await.unwrap();
        let _a = listener.accept().await.unwrap();
        let second = transport.connect(&address, Duration::from_secs(1)).await.unwrap();
        let _b = listener.accept().await.unwrap();
        assert_eq!(first.transport_name(), "unix-domain-socket");
        drop(second);

        listener.close();
        assert!(!Path::new(&address).exists());
        let err = transport
            .connect(&address, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::AddressNotFound(_)));
        let _ = std::fs::remove_dir_all(&dir);
    }
}

//! Local duplex byte transport for ipcrpc.
//!
//! Provides a unified interface over the platform's local IPC mechanism:
//! - Unix domain sockets under a private `0700` directory (Linux/macOS)
//! - Named pipes (Windows)
//!
//! Endpoints carry a random suffix so their address cannot be guessed ahead of
//! time. This is the lowest layer of ipcrpc; framing lives in `ipcrpc-frame`.

pub mod config;
pub mod endpoint;
pub mod error;
pub mod listener;
pub mod stream;

#[cfg(windows)]
pub mod pipe;
#[cfg(unix)]
pub mod uds;

pub use config::TransportConfig;
pub use error::{Result, TransportError};
pub use listener::{IpcListener, Transport};
pub use stream::{IpcStream, PeerCredentials};

#[cfg(windows)]
pub use pipe::NamedPipeListener;
#[cfg(unix)]
pub use uds::UnixDomainSocket;

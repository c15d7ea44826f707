use std::cell::{Cell, RefCell};
use std::time::Duration;

use tokio::net::windows::named_pipe::{ClientOptions, NamedPipeServer, ServerOptions};
use tracing::{debug, info};

use crate::endpoint;
use crate::error::{Result, TransportError};
use crate::stream::IpcStream;

/// `ERROR_PIPE_BUSY`: every server instance is currently connected.
const ERROR_PIPE_BUSY: i32 = 231;
const BUSY_RETRY_DELAY: Duration = Duration::from_millis(50);

/// Windows named pipe transport.
///
/// One pipe instance is kept pending at all times; each accepted client
/// consumes it and a fresh instance is created for the next peer.
pub struct NamedPipeListener {
    name: String,
    next: RefCell<Option<NamedPipeServer>>,
    closed: Cell<bool>,
}

impl NamedPipeListener {
    /// Create a fresh `\\.\pipe\pyelectron_<name>_<random>` endpoint.
    pub fn bind_endpoint(name: &str) -> Result<Self> {
        let pipe = endpoint::pipe_name(name)?;
        Self::bind(pipe)
    }

    /// Create the first instance of a named pipe.
    ///
    /// Fails if another process already owns a pipe with this name.
    pub fn bind(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        let server = ServerOptions::new()
            .first_pipe_instance(true)
            .reject_remote_clients(true)
            .create(&name)
            .map_err(|source| TransportError::Bind {
                path: name.clone().into(),
                source,
            })?;
        info!(pipe = %name, "listening on named pipe");
        Ok(Self {
            name,
            next: RefCell::new(Some(server)),
            closed: Cell::new(false),
        })
    }

    /// Wait for a client to connect to the pending pipe instance.
    pub async fn accept(&self) -> Result<IpcStream> {
        if self.closed.get() {
            return Err(TransportError::Shutdown);
        }
        let server = match self.next.borrow_mut().take() {
            Some(server) => server,
            None => self.create_instance()?,
        };
        server.connect().await.map_err(TransportError::Accept)?;

        // Queue the next instance before handing this one out.
        if !self.closed.get() {
            *self.next.borrow_mut() = Some(self.create_instance()?);
        }
        debug!(pipe = %self.name, "accepted connection");
        Ok(IpcStream::from_pipe_server(server))
    }

    /// Connect to a named pipe, retrying while all instances are busy.
    pub async fn connect(name: &str, timeout: Duration) -> Result<IpcStream> {
        let attempt = async {
            loop {
                match ClientOptions::new().open(name) {
                    Ok(client) => return Ok(client),
                    Err(err) if err.raw_os_error() == Some(ERROR_PIPE_BUSY) => {
                        tokio::time::sleep(BUSY_RETRY_DELAY).await;
                    }
                    Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                        return Err(TransportError::AddressNotFound(name.to_string()));
                    }
                    Err(source) => {
                        return Err(TransportError::Connect {
                            address: name.to_string(),
                            source,
                        })
                    }
                }
            }
        };
        let client = tokio::time::timeout(timeout, attempt)
            .await
            .map_err(|_| TransportError::Timeout(timeout))??;
        debug!(pipe = %name, "connected to named pipe");
        Ok(IpcStream::from_pipe_client(client))
    }

    /// The pipe name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stop offering new pipe instances. Idempotent.
    pub fn close(&self) {
        if self.closed.replace(true) {
            return;
        }
        self.next.borrow_mut().take();
        debug!(pipe = %self.name, "closed named pipe listener");
    }

    fn create_instance(&self) -> Result<NamedPipeServer> {
        ServerOptions::new()
            .reject_remote_clients(true)
            .create(&self.name)
            .map_err(TransportError::Accept)
    }
}

impl Drop for NamedPipeListener {
    fn drop(&mut self) {
        self.close();
    }
}

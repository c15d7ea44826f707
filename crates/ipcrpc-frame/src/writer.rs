use std::time::Duration;

use futures_util::SinkExt;
use tokio::io::AsyncWrite;
use tokio_util::codec::FramedWrite;

use crate::codec::{FrameCodec, FrameConfig};
use crate::error::{FrameError, Result};

/// Writes length-prefixed frames to any `AsyncWrite` stream.
pub struct FrameWriter<W> {
    inner: FramedWrite<W, FrameCodec>,
    write_timeout: Option<Duration>,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    /// Create a new frame writer with default configuration.
    pub fn new(inner: W) -> Self {
        Self::with_config(inner, &FrameConfig::default())
    }

    /// Create a new frame writer with explicit configuration.
    pub fn with_config(inner: W, config: &FrameConfig) -> Self {
        Self {
            inner: FramedWrite::new(inner, FrameCodec::new(config.max_frame_len)),
            write_timeout: config.write_timeout,
        }
    }

    /// Write one frame and flush it.
    ///
    /// Header and payload are encoded into a single buffer, so a frame is
    /// never interleaved with another write on the same writer.
    pub async fn send(&mut self, payload: &[u8]) -> Result<()> {
        let send = self.inner.send(payload);
        match self.write_timeout {
            Some(timeout) => tokio::time::timeout(timeout, send)
                .await
                .map_err(|_| FrameError::Timeout(timeout))?,
            None => send.await,
        }
    }

    /// Flush and shut down the write half.
    pub async fn close(&mut self) -> Result<()> {
        SinkExt::<&[u8]>::close(&mut self.inner).await
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &W {
        self.inner.get_ref()
    }

    /// Consume the writer and return the inner stream.
    pub fn into_inner(self) -> W {
        self.inner.into_inner()
    }
}

use bytes::Bytes;
use futures_util::StreamExt;
use tokio::io::AsyncRead;
use tokio_util::codec::FramedRead;

use crate::codec::{FrameCodec, FrameConfig};
use crate::error::{FrameError, Result};

/// Reads complete frames from any `AsyncRead` stream.
///
/// Handles partial reads internally; callers always get complete payloads.
pub struct FrameReader<R> {
    inner: FramedRead<R, FrameCodec>,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    /// Create a new frame reader with default configuration.
    pub fn new(inner: R) -> Self {
        Self::with_config(inner, &FrameConfig::default())
    }

    /// Create a new frame reader with explicit configuration.
    pub fn with_config(inner: R, config: &FrameConfig) -> Self {
        Self {
            inner: FramedRead::new(inner, FrameCodec::new(config.max_frame_len)),
        }
    }

    /// Read the next complete frame payload.
    ///
    /// Returns `Err(FrameError::ConnectionClosed)` when the peer hangs up.
    pub async fn read_frame(&mut self) -> Result<Bytes> {
        match self.inner.next().await {
            Some(frame) => frame,
            None => Err(FrameError::ConnectionClosed),
        }
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &R {
        self.inner.get_ref()
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> R {
        self.inner.into_inner()
    }
}

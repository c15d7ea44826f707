use std::time::Duration;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use ipcrpc_transport::TransportConfig;
use tokio_util::codec::{Decoder, Encoder};
use tracing::debug;

use crate::error::{FrameError, Result};

/// Frame header: a 4-byte big-endian payload length.
pub const HEADER_SIZE: usize = 4;

/// Default maximum frame body: ten times the default transport buffer.
pub const DEFAULT_MAX_FRAME_LEN: usize = ipcrpc_transport::config::DEFAULT_BUFFER_SIZE * 10;

/// Configuration for framed streams.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum payload size in bytes, checked against the header before the
    /// body is read.
    pub max_frame_len: usize,
    /// Write timeout for a single frame (header, payload and flush).
    pub write_timeout: Option<Duration>,
}

impl FrameConfig {
    /// Derive frame limits from a transport configuration.
    pub fn from_transport(config: &TransportConfig) -> Self {
        Self {
            max_frame_len: config.max_frame_size(),
            write_timeout: Some(config.timeout),
        }
    }
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
            write_timeout: None,
        }
    }
}

/// Length-prefixed codec.
///
/// Wire format:
/// ```text
/// ┌──────────────┬─────────────────────┐
/// │ Length       │ Payload             │
/// │ (4B BE u32)  │ (Length bytes, JSON)│
/// └──────────────┴─────────────────────┘
/// ```
#[derive(Debug, Clone)]
pub struct FrameCodec {
    max_frame_len: usize,
}

impl FrameCodec {
    pub fn new(max_frame_len: usize) -> Self {
        Self { max_frame_len }
    }

    pub fn max_frame_len(&self) -> usize {
        self.max_frame_len
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_LEN)
    }
}

impl Decoder for FrameCodec {
    type Item = Bytes;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>> {
        if src.len() < HEADER_SIZE {
            return Ok(None);
        }

        let mut header = [0u8; HEADER_SIZE];
        header.copy_from_slice(&src[..HEADER_SIZE]);
        let payload_len = u32::from_be_bytes(header) as usize;

        if payload_len > self.max_frame_len {
            debug!(size = payload_len, max = self.max_frame_len, "frame header exceeds limit");
            return Err(FrameError::PayloadTooLarge {
                size: payload_len,
                max: self.max_frame_len,
            });
        }

        let total = HEADER_SIZE + payload_len;
        if src.len() < total {
            src.reserve(total - src.len());
            return Ok(None);
        }

        src.advance(HEADER_SIZE);
        Ok(Some(src.split_to(payload_len).freeze()))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>> {
        match self.decode(src)? {
            Some(frame) => Ok(Some(frame)),
            None if src.is_empty() => Ok(None),
            None => {
                debug!(buffered = src.len(), "stream closed mid-frame");
                Err(FrameError::ConnectionClosed)
            }
        }
    }
}

impl Encoder<&[u8]> for FrameCodec {
    type Error = FrameError;

    fn encode(&mut self, payload: &[u8], dst: &mut BytesMut) -> Result<()> {
        if payload.len() > self.max_frame_len || payload.len() > u32::MAX as usize {
            return Err(FrameError::PayloadTooLarge {
                size: payload.len(),
                max: self.max_frame_len.min(u32::MAX as usize),
            });
        }
        dst.reserve(HEADER_SIZE + payload.len());
        dst.put_u32(payload.len() as u32);
        dst.put_slice(payload);
        Ok(())
    }
}

//! Length-prefixed message framing for ipcrpc.
//!
//! Every message on the wire is a 4-byte big-endian length followed by that
//! many bytes of UTF-8 JSON. The declared length is checked against
//! [`FrameConfig::max_frame_len`] before any of the body is read, which bounds
//! the memory a peer can make us allocate with a forged header.
//!
//! No partial reads, no buffer management in user code.

pub mod codec;
pub mod error;
pub mod reader;
pub mod writer;

use ipcrpc_transport::IpcStream;
use tokio::io::{ReadHalf, WriteHalf};

pub use codec::{FrameCodec, FrameConfig, DEFAULT_MAX_FRAME_LEN, HEADER_SIZE};
pub use error::{FrameError, Result};
pub use reader::FrameReader;
pub use writer::FrameWriter;

/// Split a connected stream into independently owned frame reader and writer.
pub fn split(
    stream: IpcStream,
    config: &FrameConfig,
) -> (
    FrameReader<ReadHalf<IpcStream>>,
    FrameWriter<WriteHalf<IpcStream>>,
) {
    let (read, write) = tokio::io::split(stream);
    (
        FrameReader::with_config(read, config),
        FrameWriter::with_config(write, config),
    )
}

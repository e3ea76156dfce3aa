//! NDJSON line framing for the peer node's output streams.
//!
//! Wraps [`tokio_util::codec::LinesCodec`], which keeps any trailing partial
//! line in the read buffer until the rest of it arrives. A JSON object split
//! across two reads is therefore reassembled before it is decoded.
//!
//! On top of the inner codec, [`NodeCodec`] drops blank and whitespace-only
//! lines so every item it yields is a candidate for JSON decoding, and skips
//! oversized or non-UTF-8 lines instead of failing the stream.

use std::io::ErrorKind;

use bytes::BytesMut;
use tokio_util::codec::{Decoder, LinesCodec, LinesCodecError};
use tracing::warn;

use crate::node::LOG_NAMESPACE;
use crate::{AppError, Result};

/// Maximum line length accepted from the node: 1 MiB.
///
/// A longer line is logged and discarded up to its terminating newline;
/// framing resumes with the next line.
pub const MAX_LINE_BYTES: usize = 1_048_576;

/// Line framer for the node's stdout and stderr streams.
///
/// Use it as the codec parameter of [`tokio_util::codec::FramedRead`].
///
/// ```rust,ignore
/// use tokio_util::codec::FramedRead;
/// use peer_bridge::node::codec::NodeCodec;
///
/// let lines = FramedRead::new(child_stdout, NodeCodec::new());
/// ```
#[derive(Debug)]
pub struct NodeCodec(LinesCodec);

impl NodeCodec {
    /// Create a new `NodeCodec` with the default [`MAX_LINE_BYTES`] limit.
    #[must_use]
    pub fn new() -> Self {
        Self(LinesCodec::new_with_max_length(MAX_LINE_BYTES))
    }
}

impl Default for NodeCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for NodeCodec {
    type Item = String;
    type Error = AppError;

    /// Decode the next non-blank line from `src`.
    ///
    /// Returns `Ok(None)` while `src` holds no complete line; the partial
    /// fragment stays buffered for the next call.
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        loop {
            match self.0.decode(src) {
                Ok(Some(line)) if line.trim().is_empty() => {}
                Ok(other) => return Ok(other),
                Err(e) => skip_unreadable(e)?,
            }
        }
    }

    /// Decode remaining lines once the stream reaches EOF.
    ///
    /// A final fragment without a trailing newline is still yielded.
    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        loop {
            match self.0.decode_eof(src) {
                Ok(Some(line)) if line.trim().is_empty() => {}
                Ok(other) => return Ok(other),
                Err(e) => skip_unreadable(e)?,
            }
        }
    }
}

/// Log and swallow a line that cannot be framed; the inner codec has already
/// consumed it. Any other failure ends the stream.
fn skip_unreadable(e: LinesCodecError) -> Result<()> {
    match e {
        LinesCodecError::MaxLineLengthExceeded => {
            warn!(
                namespace = LOG_NAMESPACE,
                max_bytes = MAX_LINE_BYTES,
                "skipping oversized node output line"
            );
            Ok(())
        }
        LinesCodecError::Io(io_err) if io_err.kind() == ErrorKind::InvalidData => {
            warn!(namespace = LOG_NAMESPACE, error = %io_err, "skipping non-UTF-8 node output line");
            Ok(())
        }
        LinesCodecError::Io(io_err) => Err(AppError::Io(io_err.to_string())),
    }
}

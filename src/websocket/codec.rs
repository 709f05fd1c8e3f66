//! Frame codec for use with `tokio_util::codec::Framed`.
//!
//! The codec works at frame granularity: it turns raw bytes into validated [`Frame`]s and
//! back. Fragment reassembly and protocol state live in the message processor.

use bytes::{Buf, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use super::error::WebSocketError;
use super::frame::{DEFAULT_MAX_PAYLOAD_SIZE, Frame};

/// Codec implementing tokio_util's [`Decoder`] and [`Encoder`] for single frames.
#[derive(Debug, Clone)]
pub struct FrameCodec {
    max_payload_size: usize,
}

impl FrameCodec {
    /// Create a codec accepting payloads up to the default limit.
    pub fn new() -> Self {
        Self::with_max_payload_size(DEFAULT_MAX_PAYLOAD_SIZE)
    }

    /// Create a codec rejecting frames that declare more than `max_payload_size` bytes.
    pub fn with_max_payload_size(max_payload_size: usize) -> Self {
        Self { max_payload_size }
    }

    /// Largest accepted frame payload.
    pub fn max_payload_size(&self) -> usize {
        self.max_payload_size
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = WebSocketError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match Frame::parse(&src[..], self.max_payload_size) {
            Ok((frame, consumed)) => {
                src.advance(consumed);
                Ok(Some(frame))
            }
            Err(WebSocketError::IncompleteFrame) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = WebSocketError;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        frame.encode_into(dst);
        Ok(())
    }
}

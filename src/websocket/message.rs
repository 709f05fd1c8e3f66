//! Reassembly of fragmented WebSocket messages.

use bytes::{Buf, Bytes, BytesMut};

use super::error::WebSocketError;
use super::frame::{Frame, Opcode};

/// Default maximum number of frames one message may be split into.
pub const DEFAULT_FRAME_LIMIT: usize = 20;

/// One logical message, made of one or more frames.
///
/// Frames are appended in arrival order; the message is complete once a final frame has been
/// added. A message also owns the bytes received after its last frame that could not be
/// decoded yet, so assembly can resume when the next chunk arrives.
#[derive(Debug, Clone)]
pub struct Message {
    frames: Vec<Frame>,
    complete: bool,
    payload_len: usize,
    frame_limit: usize,
    buffer: BytesMut,
}

impl Default for Message {
    fn default() -> Self {
        Self::new()
    }
}

impl Message {
    /// Create an empty message accepting at most 20 frames.
    pub fn new() -> Self {
        Self::with_frame_limit(DEFAULT_FRAME_LIMIT)
    }

    /// Create an empty message accepting at most `frame_limit` frames.
    pub fn with_frame_limit(frame_limit: usize) -> Self {
        Message {
            frames: Vec::new(),
            complete: false,
            payload_len: 0,
            frame_limit,
            buffer: BytesMut::new(),
        }
    }

    /// Wrap a single control frame into a complete message.
    pub fn from_control(frame: Frame) -> Self {
        debug_assert!(frame.is_control());
        Message {
            complete: frame.is_final(),
            payload_len: frame.payload_len(),
            frames: vec![frame],
            frame_limit: 1,
            buffer: BytesMut::new(),
        }
    }

    /// Append a frame.
    ///
    /// Fails with [`WebSocketError::Limitation`] when the message already holds its maximum
    /// number of frames; the frame is not appended and the message cannot be completed.
    pub fn add_frame(&mut self, frame: Frame) -> Result<(), WebSocketError> {
        if self.frames.len() >= self.frame_limit {
            return Err(WebSocketError::Limitation(self.frame_limit));
        }
        self.complete = frame.is_final();
        self.payload_len += frame.payload_len();
        self.frames.push(frame);
        Ok(())
    }

    /// Whether the last appended frame was final.
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// Opcode of the message, taken from its first frame.
    pub fn opcode(&self) -> Option<Opcode> {
        self.frames.first().map(Frame::opcode)
    }

    /// First frame of the message, if any.
    pub fn first_frame(&self) -> Option<&Frame> {
        self.frames.first()
    }

    /// All frames in append order.
    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    /// Number of frames appended so far.
    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    /// Combined payload length of all frames.
    pub fn payload_len(&self) -> usize {
        self.payload_len
    }

    /// Concatenated payload of every frame.
    ///
    /// Fails with [`WebSocketError::MissingData`] if the message is not complete.
    pub fn content(&self) -> Result<Bytes, WebSocketError> {
        if !self.complete {
            return Err(WebSocketError::MissingData);
        }
        let mut content = BytesMut::with_capacity(self.payload_len);
        for frame in &self.frames {
            content.extend_from_slice(frame.payload());
        }
        Ok(content.freeze())
    }

    /// Content decoded as UTF-8.
    pub fn text(&self) -> Result<String, WebSocketError> {
        let content = self.content()?;
        String::from_utf8(content.to_vec()).map_err(|_| WebSocketError::InvalidUtf8)
    }

    /// Append bytes to the residual buffer.
    pub fn add_buffer(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Bytes received but not yet resolved into a frame.
    pub fn buffer(&self) -> &[u8] {
        &self.buffer
    }

    /// Drop the residual buffer.
    pub fn clear_buffer(&mut self) {
        self.buffer.clear();
    }

    /// Take the residual buffer out of the message, leaving it empty.
    pub fn take_buffer(&mut self) -> BytesMut {
        std::mem::take(&mut self.buffer)
    }

    /// Replace the residual buffer with `buffer`, taking ownership without copying.
    pub fn set_buffer(&mut self, buffer: BytesMut) {
        self.buffer = buffer;
    }

    /// Strip the bytes `frame` occupied from the head of the residual buffer.
    ///
    /// `frame` must have just been parsed from the start of [`Message::buffer`]. Returns what
    /// is left, which is where the next decode attempt starts.
    pub fn remove_consumed_bytes(&mut self, frame: &Frame) -> &[u8] {
        debug_assert!(
            frame.wire_len() <= self.buffer.len(),
            "frame was not parsed from this buffer"
        );
        let consumed = frame.wire_len().min(self.buffer.len());
        self.buffer.advance(consumed);
        &self.buffer
    }
}

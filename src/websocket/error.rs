//! Error taxonomy for frame decoding, message reassembly and stream processing.

use std::fmt;

use super::factory::CloseCode;
use super::frame::Opcode;

/// Errors that can occur while decoding, assembling or writing WebSocket frames.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebSocketError {
    /// Not enough bytes buffered to decode the next frame; retry once more arrive
    IncompleteFrame,
    /// Invalid opcode value
    InvalidOpcode(u8),
    /// Control frame exceeds maximum length (125 bytes)
    ControlFrameTooLarge,
    /// Control frame is fragmented (FIN=0)
    ControlFrameFragmented,
    /// Reserved bits are set without negotiated extension
    ReservedBitsSet,
    /// 64-bit payload length with the most significant bit set
    InvalidLength,
    /// Declared frame payload exceeds the configured maximum
    FrameTooLarge,
    /// Accumulated message payload exceeds the configured maximum
    MessageTooLarge,
    /// A message was given more frames than the given limit allows
    Limitation(usize),
    /// Content was requested from a message that is not complete
    MissingData,
    /// Continuation frame without a message in progress
    UnexpectedContinuation,
    /// New text/binary frame while a fragmented message is in progress
    UnexpectedDataFrame,
    /// Opcode not allowed in this position
    UnexpectedOpcode(Opcode),
    /// Invalid UTF-8 in text message or close reason
    InvalidUtf8,
    /// Close frame carried a status code that must not appear on the wire
    InvalidCloseCode(u16),
    /// I/O error
    IoError(String),
}

impl WebSocketError {
    /// The close code the processor answers this error with, if the error was caused by the peer.
    pub fn close_code(&self) -> Option<CloseCode> {
        match self {
            WebSocketError::InvalidOpcode(_)
            | WebSocketError::ControlFrameTooLarge
            | WebSocketError::ControlFrameFragmented
            | WebSocketError::ReservedBitsSet
            | WebSocketError::InvalidLength
            | WebSocketError::UnexpectedContinuation
            | WebSocketError::UnexpectedDataFrame
            | WebSocketError::InvalidCloseCode(_) => Some(CloseCode::ProtocolError),
            WebSocketError::FrameTooLarge | WebSocketError::MessageTooLarge => {
                Some(CloseCode::TooBigToProcess)
            }
            WebSocketError::InvalidUtf8 => Some(CloseCode::IncoherentData),
            WebSocketError::IncompleteFrame
            | WebSocketError::Limitation(_)
            | WebSocketError::MissingData
            | WebSocketError::UnexpectedOpcode(_)
            | WebSocketError::IoError(_) => None,
        }
    }

    /// Whether processing can resume once more data arrives.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, WebSocketError::IncompleteFrame)
    }
}

impl fmt::Display for WebSocketError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WebSocketError::IncompleteFrame => write!(f, "Incomplete WebSocket frame"),
            WebSocketError::InvalidOpcode(op) => write!(f, "Invalid WebSocket opcode: {:#x}", op),
            WebSocketError::ControlFrameTooLarge => {
                write!(f, "Control frame payload exceeds 125 bytes")
            }
            WebSocketError::ControlFrameFragmented => write!(f, "Control frame is fragmented"),
            WebSocketError::ReservedBitsSet => write!(f, "Reserved bits set without extension"),
            WebSocketError::InvalidLength => write!(f, "Invalid 64-bit payload length"),
            WebSocketError::FrameTooLarge => write!(f, "Frame too large"),
            WebSocketError::MessageTooLarge => write!(f, "Message too large"),
            WebSocketError::Limitation(limit) => {
                write!(f, "Message exceeds the limit of {} frames", limit)
            }
            WebSocketError::MissingData => write!(f, "Message is not complete yet"),
            WebSocketError::UnexpectedContinuation => {
                write!(f, "Continuation frame without a message in progress")
            }
            WebSocketError::UnexpectedDataFrame => {
                write!(f, "Data frame received while a fragmented message is in progress")
            }
            WebSocketError::UnexpectedOpcode(op) => write!(f, "Unexpected opcode: {:?}", op),
            WebSocketError::InvalidUtf8 => write!(f, "Invalid UTF-8 in text payload"),
            WebSocketError::InvalidCloseCode(code) => write!(f, "Invalid close code: {}", code),
            WebSocketError::IoError(msg) => write!(f, "I/O error: {}", msg),
        }
    }
}

impl std::error::Error for WebSocketError {}

impl From<std::io::Error> for WebSocketError {
    fn from(err: std::io::Error) -> Self {
        WebSocketError::IoError(err.to_string())
    }
}

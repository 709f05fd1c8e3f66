//! Construction of well-formed outgoing frames.

use super::error::WebSocketError;
use super::frame::{Frame, Opcode};

/// Close status codes defined by RFC 6455 Section 7.4.1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum CloseCode {
    /// Normal closure
    Normal = 1000,
    /// Endpoint is going away (e.g. server shutdown)
    GoingAway = 1001,
    /// Protocol error
    ProtocolError = 1002,
    /// Data type that cannot be accepted
    UnsupportedData = 1003,
    /// Payload inconsistent with the message type (e.g. non UTF-8 text)
    IncoherentData = 1007,
    /// Policy violation
    PolicyViolation = 1008,
    /// Message too big to process
    TooBigToProcess = 1009,
    /// Client expected an extension the server did not negotiate
    MissingExtension = 1010,
    /// Unexpected condition on the server
    UnexpectedCondition = 1011,
}

impl CloseCode {
    /// The numeric status code.
    pub fn as_u16(self) -> u16 {
        self as u16
    }

    /// Whether a peer may send `code` in a close frame.
    ///
    /// 1004-1006 and 1015 are reserved for local use, 1012-2999 are unassigned and
    /// 3000-4999 belong to libraries and applications.
    pub fn is_valid_received(code: u16) -> bool {
        matches!(code, 1000..=1003 | 1007..=1011 | 3000..=4999)
    }
}

impl From<CloseCode> for u16 {
    fn from(code: CloseCode) -> Self {
        code as u16
    }
}

/// Builds outgoing frames.
///
/// A masking factory (client role) generates a fresh random key for every control frame it
/// creates. Data frames take the masking decision from the caller.
#[derive(Debug, Clone, Default)]
pub struct FrameFactory {
    masked: bool,
}

impl FrameFactory {
    /// Create a factory producing unmasked control frames (server role).
    pub fn new() -> Self {
        Self { masked: false }
    }

    /// Create a factory producing masked control frames (client role).
    ///
    /// Masking keys come from `fastrand`, a fast PRNG that is not cryptographically secure.
    /// They are unpredictable enough to defeat naive cache poisoning but should not be relied
    /// on where RFC 6455 Section 10.3 requires a strong entropy source.
    pub fn masking() -> Self {
        Self { masked: true }
    }

    /// Whether control frames from this factory are masked.
    pub fn is_masking(&self) -> bool {
        self.masked
    }

    /// Create a single, final text or binary frame.
    ///
    /// No fragmentation is done here; callers wanting fragmented output build the
    /// individual frames with [`Frame::new`].
    pub fn create_data_frame(
        &self,
        opcode: Opcode,
        payload: impl Into<Vec<u8>>,
        masked: bool,
    ) -> Result<Frame, WebSocketError> {
        if !matches!(opcode, Opcode::Text | Opcode::Binary) {
            return Err(WebSocketError::UnexpectedOpcode(opcode));
        }
        Frame::new(true, opcode, payload.into(), mask_key(masked))
    }

    /// Create a close frame carrying `code` and a UTF-8 `reason`.
    pub fn create_close_frame(
        &self,
        code: CloseCode,
        reason: &str,
    ) -> Result<Frame, WebSocketError> {
        let mut payload = Vec::with_capacity(2 + reason.len());
        payload.extend_from_slice(&code.as_u16().to_be_bytes());
        payload.extend_from_slice(reason.as_bytes());
        Frame::new(true, Opcode::Close, payload, mask_key(self.masked))
    }

    /// Create a normal (1000) close frame without a reason.
    pub fn create_default_close_frame(&self) -> Result<Frame, WebSocketError> {
        self.create_close_frame(CloseCode::Normal, "")
    }

    /// Create a ping frame. The payload must not exceed 125 bytes; it is not truncated.
    pub fn create_ping_frame(&self, payload: impl Into<Vec<u8>>) -> Result<Frame, WebSocketError> {
        Frame::new(true, Opcode::Ping, payload.into(), mask_key(self.masked))
    }

    /// Create a pong frame. The payload must not exceed 125 bytes; it is not truncated.
    pub fn create_pong_frame(&self, payload: impl Into<Vec<u8>>) -> Result<Frame, WebSocketError> {
        Frame::new(true, Opcode::Pong, payload.into(), mask_key(self.masked))
    }
}

/// Random masking key, not cryptographically secure.
fn mask_key(masked: bool) -> Option<[u8; 4]> {
    masked.then(|| fastrand::u32(..).to_ne_bytes())
}

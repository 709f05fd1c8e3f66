//! Handlers reacting to completed messages.
//!
//! The processor keeps an ordered list of handlers and hands every message it emits to the
//! first one whose [`MessageHandler::supports`] returns true. Handlers registered by the user
//! are consulted before the built-in [`PingHandler`] and [`CloseHandler`], so they can
//! override the default replies.
//!
//! # Examples
//!
//! ```
//! use std::io::Write;
//! use websocket_framing::websocket::{
//!     Message, MessageHandler, MessageProcessor, Opcode, WebSocketError,
//! };
//!
//! // Echo every text message back to the peer
//! struct Echo;
//!
//! impl MessageHandler for Echo {
//!     fn supports(&self, message: &Message) -> bool {
//!         message.opcode() == Some(Opcode::Text)
//!     }
//!
//!     fn process(
//!         &self,
//!         message: &Message,
//!         processor: &MessageProcessor,
//!         connection: &mut dyn Write,
//!     ) -> Result<(), WebSocketError> {
//!         processor.write(message.text()?, connection)
//!     }
//! }
//!
//! let mut processor = MessageProcessor::new();
//! processor.add_handler(Echo);
//!
//! let mut socket: Vec<u8> = Vec::new();
//! let messages: Vec<Message> = processor
//!     .on_data(&[0x81, 0x02, b'h', b'i'], &mut socket)
//!     .collect::<Result<_, _>>()
//!     .unwrap();
//!
//! assert_eq!(messages.len(), 1);
//! assert_eq!(socket, vec![0x81, 0x02, b'h', b'i']);
//! ```

use std::io::Write;

use log::debug;

use super::error::WebSocketError;
use super::factory::CloseCode;
use super::frame::Opcode;
use super::message::Message;
use super::processor::MessageProcessor;

/// Reacts to messages emitted by a [`MessageProcessor`].
pub trait MessageHandler: Send + Sync {
    /// Whether this handler takes care of `message`.
    fn supports(&self, message: &Message) -> bool;

    /// Handle `message`. May write to the connection, directly or through the processor.
    fn process(
        &self,
        message: &Message,
        processor: &MessageProcessor,
        connection: &mut dyn Write,
    ) -> Result<(), WebSocketError>;
}

/// Answers every ping with a pong carrying the same payload (RFC 6455 Section 5.5.2).
#[derive(Debug, Clone, Copy, Default)]
pub struct PingHandler;

impl MessageHandler for PingHandler {
    fn supports(&self, message: &Message) -> bool {
        message.opcode() == Some(Opcode::Ping)
    }

    fn process(
        &self,
        message: &Message,
        processor: &MessageProcessor,
        connection: &mut dyn Write,
    ) -> Result<(), WebSocketError> {
        let pong = processor
            .frame_factory()
            .create_pong_frame(message.content()?.to_vec())?;
        processor.write(pong, connection)
    }
}

/// Acknowledges a close frame from the peer.
///
/// A well-formed close is answered with a normal closure. A status code the peer must not
/// send, or a one byte payload, is answered with a protocol error and a reason that is not
/// UTF-8 with an incoherent data error.
#[derive(Debug, Clone, Copy, Default)]
pub struct CloseHandler;

impl MessageHandler for CloseHandler {
    fn supports(&self, message: &Message) -> bool {
        message.opcode() == Some(Opcode::Close)
    }

    fn process(
        &self,
        message: &Message,
        processor: &MessageProcessor,
        connection: &mut dyn Write,
    ) -> Result<(), WebSocketError> {
        let frame = message.first_frame().ok_or(WebSocketError::MissingData)?;
        let reply = match frame.parse_close_payload() {
            Ok(None) => CloseCode::Normal,
            Ok(Some((code, _))) if CloseCode::is_valid_received(code) => CloseCode::Normal,
            Ok(Some((code, _))) => {
                debug!("peer sent invalid close code {}", code);
                CloseCode::ProtocolError
            }
            Err(err) => err.close_code().unwrap_or(CloseCode::ProtocolError),
        };

        debug!("acknowledging close with {}", reply.as_u16());
        let close = processor.frame_factory().create_close_frame(reply, "")?;
        processor.write(close, connection)
    }
}

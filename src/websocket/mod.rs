//! WebSocket framing conforming to RFC 6455.
//!
//! This module provides frame parsing and encoding, construction of outgoing frames,
//! reassembly of fragmented messages and a per-connection processor that dispatches
//! completed messages to handlers.

mod codec;
mod error;
mod factory;
mod frame;
mod handler;
mod message;
mod processor;

pub use codec::FrameCodec;
pub use error::WebSocketError;
pub use factory::{CloseCode, FrameFactory};
pub use frame::{DEFAULT_MAX_PAYLOAD_SIZE, Frame, MAX_CONTROL_PAYLOAD, Opcode, apply_mask};
pub use handler::{CloseHandler, MessageHandler, PingHandler};
pub use message::{DEFAULT_FRAME_LIMIT, Message};
pub use processor::{MessageProcessor, Messages, Outgoing, ProcessorConfig};

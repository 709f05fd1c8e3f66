//! RFC 6455 WebSocket framing: frame codec, frame factory, message reassembly and a
//! stream processor that turns chunked socket reads into complete messages.

#![warn(clippy::dbg_macro, clippy::print_stdout)]
#![warn(missing_docs)]

/// WebSocket frame codec and message processing
pub mod websocket;

pub use websocket::{
    CloseCode, Frame, FrameCodec, FrameFactory, Message, MessageHandler, MessageProcessor,
    Opcode, ProcessorConfig, WebSocketError,
};

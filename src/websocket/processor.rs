//! Per-connection stream processing.
//!
//! [`MessageProcessor`] turns an arbitrarily chunked byte stream into complete messages. It
//! keeps undecoded bytes and the fragmented message being assembled between calls, answers
//! protocol violations with the matching close frame, and runs the registered handlers for
//! every message it emits.

use std::io::Write;
use std::iter::FusedIterator;

use bytes::{Buf, BytesMut};
use log::{debug, error, trace, warn};

use super::error::WebSocketError;
use super::factory::{CloseCode, FrameFactory};
use super::frame::{DEFAULT_MAX_PAYLOAD_SIZE, Frame, Opcode};
use super::handler::{CloseHandler, MessageHandler, PingHandler};
use super::message::{DEFAULT_FRAME_LIMIT, Message};

/// Limits and behaviour of a [`MessageProcessor`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessorConfig {
    /// Largest payload accepted for a single frame and for a reassembled message
    pub max_message_size: usize,
    /// Largest number of frames a single message may be fragmented into
    pub max_frames_per_message: usize,
    /// Mask outgoing frames (client role)
    pub mask_outgoing: bool,
    /// Install the built-in ping and close handlers
    pub default_handlers: bool,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            max_message_size: DEFAULT_MAX_PAYLOAD_SIZE,
            max_frames_per_message: DEFAULT_FRAME_LIMIT,
            mask_outgoing: false,
            default_handlers: true,
        }
    }
}

impl ProcessorConfig {
    /// Set the largest accepted frame and message payload.
    pub fn with_max_message_size(mut self, max_message_size: usize) -> Self {
        self.max_message_size = max_message_size;
        self
    }

    /// Set the largest number of frames per message.
    pub fn with_max_frames_per_message(mut self, max_frames_per_message: usize) -> Self {
        self.max_frames_per_message = max_frames_per_message;
        self
    }

    /// Mask every outgoing frame, as required from clients.
    pub fn with_mask_outgoing(mut self, mask_outgoing: bool) -> Self {
        self.mask_outgoing = mask_outgoing;
        self
    }

    /// Enable or disable the built-in ping and close handlers.
    pub fn with_default_handlers(mut self, default_handlers: bool) -> Self {
        self.default_handlers = default_handlers;
        self
    }
}

/// Something [`MessageProcessor::write`] can send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outgoing {
    /// Sent as a single text frame
    Text(String),
    /// Sent as a single binary frame
    Binary(Vec<u8>),
    /// Sent as is
    Frame(Frame),
}

impl From<&str> for Outgoing {
    fn from(text: &str) -> Self {
        Outgoing::Text(text.to_string())
    }
}

impl From<String> for Outgoing {
    fn from(text: String) -> Self {
        Outgoing::Text(text)
    }
}

impl From<Vec<u8>> for Outgoing {
    fn from(data: Vec<u8>) -> Self {
        Outgoing::Binary(data)
    }
}

impl From<&[u8]> for Outgoing {
    fn from(data: &[u8]) -> Self {
        Outgoing::Binary(data.to_vec())
    }
}

impl From<Frame> for Outgoing {
    fn from(frame: Frame) -> Self {
        Outgoing::Frame(frame)
    }
}

/// Where the data message of the connection stands.
#[derive(Debug)]
enum DataState {
    /// No fragmented message in progress
    Idle,
    /// Fragments received so far; the message also holds the undecoded bytes
    Assembling(Message),
    /// The message hit the frame limit, its remaining fragments are skipped
    Discarding,
}

/// Stateful WebSocket stream processor for one connection.
///
/// Feed every chunk read from the transport to [`MessageProcessor::on_data`] and drain the
/// returned iterator. Frames split across chunks, fragmented messages and control frames
/// interleaved with fragments are handled internally.
///
/// # Examples
///
/// ```
/// use websocket_framing::websocket::MessageProcessor;
///
/// let mut processor = MessageProcessor::new();
/// let mut socket: Vec<u8> = Vec::new();
///
/// // "Hel" arrives first, the final "lo" fragment later
/// assert_eq!(processor.on_data(&[0x01, 0x03, b'H', b'e', b'l'], &mut socket).count(), 0);
///
/// let message = processor
///     .on_data(&[0x80, 0x02, b'l', b'o'], &mut socket)
///     .next()
///     .unwrap()
///     .unwrap();
/// assert_eq!(message.text().unwrap(), "Hello");
/// ```
pub struct MessageProcessor {
    config: ProcessorConfig,
    frame_factory: FrameFactory,
    handlers: Vec<Box<dyn MessageHandler>>,
    default_handlers: Vec<Box<dyn MessageHandler>>,
    pending: BytesMut,
    state: DataState,
    closed: bool,
}

impl Default for MessageProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageProcessor {
    /// Create a processor with the default configuration.
    pub fn new() -> Self {
        Self::with_config(ProcessorConfig::default())
    }

    /// Create a processor with the given configuration.
    pub fn with_config(config: ProcessorConfig) -> Self {
        let frame_factory = if config.mask_outgoing {
            FrameFactory::masking()
        } else {
            FrameFactory::new()
        };

        let mut default_handlers: Vec<Box<dyn MessageHandler>> = Vec::new();
        if config.default_handlers {
            default_handlers.push(Box::new(PingHandler));
            default_handlers.push(Box::new(CloseHandler));
        }

        MessageProcessor {
            config,
            frame_factory,
            handlers: Vec::new(),
            default_handlers,
            pending: BytesMut::new(),
            state: DataState::Idle,
            closed: false,
        }
    }

    /// Register a handler. Handlers are consulted in registration order, before the
    /// built-in ones.
    pub fn add_handler(&mut self, handler: impl MessageHandler + 'static) -> &mut Self {
        self.handlers.push(Box::new(handler));
        self
    }

    /// Builder variant of [`MessageProcessor::add_handler`].
    pub fn with_handler(mut self, handler: impl MessageHandler + 'static) -> Self {
        self.add_handler(handler);
        self
    }

    /// The factory used for the frames this processor writes.
    pub fn frame_factory(&self) -> &FrameFactory {
        &self.frame_factory
    }

    /// The configuration this processor was created with.
    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    /// The fragmented data message currently being assembled, if any.
    pub fn in_flight(&self) -> Option<&Message> {
        match &self.state {
            DataState::Assembling(message) => Some(message),
            _ => None,
        }
    }

    /// Whether the connection was closed, by a close frame or after a protocol violation.
    /// A closed processor discards all further input.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Number of received bytes not decoded into a frame yet.
    pub fn buffered_len(&self) -> usize {
        self.buffered().len()
    }

    /// Process newly received bytes.
    ///
    /// The returned iterator decodes lazily: frames are parsed, validated and handed to the
    /// handlers only as the iterator is advanced. Bytes left when the iterator is dropped
    /// stay buffered and are picked up by the next call.
    ///
    /// A protocol violation, an oversized frame or message, or a text message that is not
    /// UTF-8 is answered with the matching close frame on `connection`. The offending message
    /// and everything buffered behind it are dropped, the iterator ends and the processor is
    /// closed. Errors yielded by the iterator come from writing to `connection` or from a
    /// handler.
    pub fn on_data<'a>(&'a mut self, data: &[u8], connection: &'a mut dyn Write) -> Messages<'a> {
        if self.closed {
            trace!("discarding {} bytes received after close", data.len());
        } else {
            match &mut self.state {
                DataState::Assembling(message) => message.add_buffer(data),
                _ => self.pending.extend_from_slice(data),
            }
        }

        Messages {
            processor: self,
            connection,
            done: false,
        }
    }

    /// Frame `payload` and write it to `connection`.
    ///
    /// Text and binary payloads are sent as a single final frame, masked only if the processor
    /// is configured to mask outgoing frames. Frames are written as they are.
    pub fn write(
        &self,
        payload: impl Into<Outgoing>,
        connection: &mut dyn Write,
    ) -> Result<(), WebSocketError> {
        let frame = match payload.into() {
            Outgoing::Text(text) => self.frame_factory.create_data_frame(
                Opcode::Text,
                text,
                self.config.mask_outgoing,
            )?,
            Outgoing::Binary(data) => self.frame_factory.create_data_frame(
                Opcode::Binary,
                data,
                self.config.mask_outgoing,
            )?,
            Outgoing::Frame(frame) => frame,
        };

        connection.write_all(&frame.encode())?;
        Ok(())
    }

    fn buffered(&self) -> &[u8] {
        match &self.state {
            DataState::Assembling(message) => message.buffer(),
            _ => &self.pending,
        }
    }

    fn consume(&mut self, frame: &Frame) {
        match &mut self.state {
            DataState::Assembling(message) => {
                message.remove_consumed_bytes(frame);
            }
            _ => self.pending.advance(frame.wire_len()),
        }
    }

    fn discard(&mut self) {
        self.pending.clear();
        self.state = DataState::Idle;
    }

    /// Decode until a message can be emitted or the buffer runs dry.
    fn next_message(
        &mut self,
        connection: &mut dyn Write,
    ) -> Result<Option<Message>, WebSocketError> {
        loop {
            if self.closed {
                self.discard();
                return Ok(None);
            }

            let frame = match Frame::parse(self.buffered(), self.config.max_message_size) {
                Ok((frame, _)) => frame,
                Err(WebSocketError::IncompleteFrame) => return Ok(None),
                Err(err) => return self.fail(err, connection).map(|_| None),
            };
            self.consume(&frame);
            trace!(
                "decoded {:?} frame, fin={} len={}",
                frame.opcode(),
                frame.is_final(),
                frame.payload_len()
            );

            if frame.is_control() {
                let message = Message::from_control(frame);
                if message.opcode() == Some(Opcode::Close) {
                    self.closed = true;
                }
                self.dispatch(&message, connection)?;
                return Ok(Some(message));
            }

            match self.accept_data(frame) {
                Ok(Some(message)) => {
                    self.dispatch(&message, connection)?;
                    return Ok(Some(message));
                }
                Ok(None) => continue,
                Err(err) => return self.fail(err, connection).map(|_| None),
            }
        }
    }

    /// Feed a data frame into the message being assembled.
    fn accept_data(&mut self, frame: Frame) -> Result<Option<Message>, WebSocketError> {
        match (std::mem::replace(&mut self.state, DataState::Idle), frame.opcode()) {
            (DataState::Idle, Opcode::Continuation) => Err(WebSocketError::UnexpectedContinuation),
            (DataState::Idle, _) => {
                let mut message = Message::with_frame_limit(self.config.max_frames_per_message);
                message.set_buffer(std::mem::take(&mut self.pending));
                self.append_fragment(message, frame)
            }
            (DataState::Assembling(message), Opcode::Continuation) => {
                self.append_fragment(message, frame)
            }
            (DataState::Assembling(_), _)
            | (DataState::Discarding, Opcode::Text | Opcode::Binary) => {
                Err(WebSocketError::UnexpectedDataFrame)
            }
            (DataState::Discarding, _) => {
                if !frame.is_final() {
                    self.state = DataState::Discarding;
                }
                Ok(None)
            }
        }
    }

    fn append_fragment(
        &mut self,
        mut message: Message,
        frame: Frame,
    ) -> Result<Option<Message>, WebSocketError> {
        if message.payload_len() + frame.payload_len() > self.config.max_message_size {
            return Err(WebSocketError::MessageTooLarge);
        }

        let fin = frame.is_final();
        if let Err(err) = message.add_frame(frame) {
            warn!("abandoning {:?} message: {}", message.opcode(), err);
            self.pending = message.take_buffer();
            if !fin {
                self.state = DataState::Discarding;
            }
            return Ok(None);
        }

        if !message.is_complete() {
            self.state = DataState::Assembling(message);
            return Ok(None);
        }

        self.pending = message.take_buffer();
        if message.opcode() == Some(Opcode::Text) {
            let content = message.content()?;
            if std::str::from_utf8(&content).is_err() {
                return Err(WebSocketError::InvalidUtf8);
            }
        }
        Ok(Some(message))
    }

    /// Answer a violation with a close frame and stop accepting data.
    fn fail(
        &mut self,
        err: WebSocketError,
        connection: &mut dyn Write,
    ) -> Result<(), WebSocketError> {
        let code = err.close_code().unwrap_or(CloseCode::ProtocolError);
        warn!("closing connection with {}: {}", code.as_u16(), err);

        self.discard();
        self.closed = true;

        let close = self.frame_factory.create_close_frame(code, "")?;
        self.write(close, connection).inspect_err(|write_err| {
            error!("failed to send close frame {}: {}", code.as_u16(), write_err);
        })
    }

    fn dispatch(
        &self,
        message: &Message,
        connection: &mut dyn Write,
    ) -> Result<(), WebSocketError> {
        let handler = self
            .handlers
            .iter()
            .chain(self.default_handlers.iter())
            .find(|handler| handler.supports(message));

        match handler {
            Some(handler) => {
                debug!("dispatching {:?} message to handler", message.opcode());
                handler.process(message, self, connection)
            }
            None => Ok(()),
        }
    }
}

/// Lazily decoded messages returned by [`MessageProcessor::on_data`].
///
/// Messages are yielded in the order their final frame was decoded, so a control frame
/// arriving between two fragments comes out before the fragmented message.
pub struct Messages<'a> {
    processor: &'a mut MessageProcessor,
    connection: &'a mut dyn Write,
    done: bool,
}

impl Iterator for Messages<'_> {
    type Item = Result<Message, WebSocketError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        match self.processor.next_message(self.connection) {
            Ok(Some(message)) => Some(Ok(message)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}

impl FusedIterator for Messages<'_> {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    /// Records every write call made by the processor.
    #[derive(Default)]
    struct MockConnection {
        writes: usize,
        data: Vec<u8>,
    }

    impl Write for MockConnection {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.writes += 1;
            self.data.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    struct BrokenConnection;

    impl Write for BrokenConnection {
        fn write(&mut self, _: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "peer gone"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    /// Handles close frames by sending a normal close, nothing else.
    struct CustomCloseHandler;

    impl MessageHandler for CustomCloseHandler {
        fn supports(&self, message: &Message) -> bool {
            message.first_frame().map(Frame::opcode) == Some(Opcode::Close)
        }

        fn process(
            &self,
            _message: &Message,
            processor: &MessageProcessor,
            connection: &mut dyn Write,
        ) -> Result<(), WebSocketError> {
            processor.write(
                FrameFactory::new().create_default_close_frame()?,
                connection,
            )
        }
    }

    /// Swallows pings without answering.
    struct SilentPingHandler;

    impl MessageHandler for SilentPingHandler {
        fn supports(&self, message: &Message) -> bool {
            message.opcode() == Some(Opcode::Ping)
        }

        fn process(
            &self,
            _message: &Message,
            _processor: &MessageProcessor,
            _connection: &mut dyn Write,
        ) -> Result<(), WebSocketError> {
            Ok(())
        }
    }

    fn collect(
        processor: &mut MessageProcessor,
        data: &[u8],
        connection: &mut dyn Write,
    ) -> Vec<Message> {
        processor
            .on_data(data, connection)
            .collect::<Result<Vec<_>, _>>()
            .unwrap()
    }

    fn masked(fin: bool, opcode: Opcode, payload: &[u8]) -> Vec<u8> {
        Frame::new(fin, opcode, payload.to_vec(), Some([0x37, 0xfa, 0x21, 0x3d]))
            .unwrap()
            .encode()
    }

    fn close_frame(code: u16) -> Vec<u8> {
        let [high, low] = code.to_be_bytes();
        vec![0x88, 0x02, high, low]
    }

    #[test]
    fn test_builds_message_from_single_frame() {
        let mut processor = MessageProcessor::new();
        let mut socket = MockConnection::default();

        let messages = collect(
            &mut processor,
            &[0x81, 0x05, 0x48, 0x65, 0x6c, 0x6c, 0x6f],
            &mut socket,
        );

        assert_eq!(messages.len(), 1);
        assert!(messages[0].is_complete());
        assert_eq!(messages[0].text().unwrap(), "Hello");
        assert_eq!(socket.writes, 0);
    }

    #[test]
    fn test_builds_partial_message_across_calls() {
        let mut processor = MessageProcessor::new();
        let mut socket = MockConnection::default();

        let messages = collect(&mut processor, &[0x01, 0x03, 0x48, 0x65, 0x6c], &mut socket);
        assert!(messages.is_empty());
        let in_flight = processor.in_flight().unwrap();
        assert!(!in_flight.is_complete());
        assert_eq!(in_flight.frame_count(), 1);

        let messages = collect(&mut processor, &[0x80, 0x02, 0x6c, 0x6f], &mut socket);
        assert_eq!(messages.len(), 1);
        assert!(messages[0].is_complete());
        assert_eq!(messages[0].text().unwrap(), "Hello");
        assert!(processor.in_flight().is_none());
    }

    #[test]
    fn test_two_fragments_in_one_call_yield_one_message() {
        let mut processor = MessageProcessor::new();
        let mut socket = MockConnection::default();

        let mut data = vec![0x01, 0x03, b'H', b'e', b'l'];
        data.extend_from_slice(&[0x80, 0x02, b'l', b'o']);

        let messages = collect(&mut processor, &data, &mut socket);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].frame_count(), 2);
        assert_eq!(messages[0].text().unwrap(), "Hello");
    }

    #[test]
    fn test_split_at_every_offset_yields_same_messages() {
        let mut stream = masked(false, Opcode::Text, b"Hello ");
        stream.extend(masked(true, Opcode::Ping, b"ping"));
        stream.extend(masked(false, Opcode::Continuation, b"wor"));
        stream.extend(masked(true, Opcode::Continuation, b"ld"));
        stream.extend(masked(true, Opcode::Binary, &[0xAB; 300]));

        let mut whole_socket = MockConnection::default();
        let mut whole = MessageProcessor::new();
        let expected: Vec<_> = collect(&mut whole, &stream, &mut whole_socket)
            .into_iter()
            .map(|m| (m.opcode(), m.content().unwrap()))
            .collect();
        assert_eq!(expected.len(), 3);
        assert_eq!(expected[0].0, Some(Opcode::Ping));
        assert_eq!(expected[1].1.as_ref(), b"Hello world");
        assert_eq!(expected[2].1.len(), 300);

        for split in 0..=stream.len() {
            let mut processor = MessageProcessor::new();
            let mut socket = MockConnection::default();
            let (head, tail) = stream.split_at(split);

            let mut received = collect(&mut processor, head, &mut socket);
            received.extend(collect(&mut processor, tail, &mut socket));

            let received: Vec<_> = received
                .into_iter()
                .map(|m| (m.opcode(), m.content().unwrap()))
                .collect();
            assert_eq!(received, expected, "split at {}", split);
            assert_eq!(socket.data, whole_socket.data, "split at {}", split);
            assert_eq!(processor.buffered_len(), 0);
        }
    }

    #[test]
    fn test_byte_by_byte_feeding() {
        let stream = masked(true, Opcode::Text, b"one byte at a time");
        let mut processor = MessageProcessor::new();
        let mut socket = MockConnection::default();

        let mut received = Vec::new();
        for byte in &stream {
            received.extend(collect(&mut processor, std::slice::from_ref(byte), &mut socket));
        }

        assert_eq!(received.len(), 1);
        assert_eq!(received[0].text().unwrap(), "one byte at a time");
    }

    #[test]
    fn test_ping_between_fragments_is_yielded_first() {
        let mut processor = MessageProcessor::new();
        let mut socket = MockConnection::default();

        let mut data = vec![0x01, 0x03, b'H', b'e', b'l'];
        data.extend_from_slice(&[0x89, 0x00]);
        data.extend_from_slice(&[0x80, 0x02, b'l', b'o']);

        let messages = collect(&mut processor, &data, &mut socket);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].opcode(), Some(Opcode::Ping));
        assert_eq!(messages[1].opcode(), Some(Opcode::Text));
        assert_eq!(messages[1].frame_count(), 2);
        assert_eq!(messages[1].text().unwrap(), "Hello");

        // default handler answered the ping
        assert_eq!(socket.data, vec![0x8A, 0x00]);
    }

    #[test]
    fn test_custom_close_handler_writes_once() {
        let mut processor = MessageProcessor::new();
        processor.add_handler(CustomCloseHandler);

        let mut socket = MockConnection::default();
        let messages = collect(&mut processor, &[0x88, 0x02, 0x03, 0xE8], &mut socket);

        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].opcode(), Some(Opcode::Close));
        assert_eq!(socket.writes, 1);
        assert_eq!(socket.data, close_frame(1000));
        assert!(processor.is_closed());
    }

    #[test]
    fn test_default_close_handler_and_closed_session() {
        let mut processor = MessageProcessor::new();
        let mut socket = MockConnection::default();

        let mut data = vec![0x88, 0x02, 0x03, 0xE8];
        data.extend_from_slice(&[0x81, 0x02, b'h', b'i']);

        let messages = collect(&mut processor, &data, &mut socket);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].opcode(), Some(Opcode::Close));
        assert_eq!(socket.data, close_frame(1000));
        assert_eq!(processor.buffered_len(), 0);

        let messages = collect(&mut processor, &[0x81, 0x02, b'h', b'i'], &mut socket);
        assert!(messages.is_empty());
        assert_eq!(socket.writes, 1);
    }

    #[test]
    fn test_user_handlers_take_precedence() {
        let mut processor = MessageProcessor::new().with_handler(SilentPingHandler);
        let mut socket = MockConnection::default();

        let messages = collect(&mut processor, &[0x89, 0x01, b'x'], &mut socket);
        assert_eq!(messages.len(), 1);
        assert_eq!(socket.writes, 0);
    }

    #[test]
    fn test_without_default_handlers() {
        let config = ProcessorConfig::default().with_default_handlers(false);
        let mut processor = MessageProcessor::with_config(config);
        let mut socket = MockConnection::default();

        let messages = collect(&mut processor, &[0x89, 0x00, 0x88, 0x00], &mut socket);
        assert_eq!(messages.len(), 2);
        assert_eq!(socket.writes, 0);
    }

    #[test]
    fn test_huge_declared_length_closes_with_too_big() {
        let mut processor = MessageProcessor::new();
        let mut socket = MockConnection::default();

        let data = [0x81, 0x7F, 0x7F, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF];
        let messages = collect(&mut processor, &data, &mut socket);

        assert!(messages.is_empty());
        assert_eq!(socket.data, close_frame(1009));
        assert!(processor.is_closed());
        assert_eq!(processor.buffered_len(), 0);
    }

    #[test]
    fn test_oversized_control_frame_closes_with_protocol_error() {
        let mut processor = MessageProcessor::new();
        let mut socket = MockConnection::default();

        let mut data = vec![0x89, 0x7E, 0x00, 0x7E];
        data.extend_from_slice(&[0u8; 126]);
        let messages = collect(&mut processor, &data, &mut socket);

        assert!(messages.is_empty());
        assert_eq!(socket.data, close_frame(1002));
    }

    #[test]
    fn test_invalid_utf8_closes_with_incoherent_data() {
        let mut processor = MessageProcessor::new();
        let mut socket = MockConnection::default();

        let mut data = vec![0x01, 0x01, 0xC3];
        data.extend_from_slice(&[0x80, 0x01, 0x28]);
        let messages = collect(&mut processor, &data, &mut socket);

        assert!(messages.is_empty());
        assert_eq!(socket.data, close_frame(1007));
    }

    #[test]
    fn test_utf8_split_across_fragments_is_accepted() {
        let mut processor = MessageProcessor::new();
        let mut socket = MockConnection::default();

        // "é" is 0xC3 0xA9
        let mut data = vec![0x01, 0x01, 0xC3];
        data.extend_from_slice(&[0x80, 0x01, 0xA9]);
        let messages = collect(&mut processor, &data, &mut socket);

        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].text().unwrap(), "é");
    }

    #[test]
    fn test_binary_is_not_utf8_checked() {
        let mut processor = MessageProcessor::new();
        let mut socket = MockConnection::default();

        let messages = collect(&mut processor, &[0x82, 0x02, 0xC3, 0x28], &mut socket);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].content().unwrap().as_ref(), &[0xC3, 0x28]);
    }

    #[test]
    fn test_violation_drops_everything_behind_it() {
        let mut processor = MessageProcessor::new();
        let mut socket = MockConnection::default();

        let mut data = vec![0x81, 0x02, b'h', b'i'];
        data.extend_from_slice(&[0x80, 0x01, b'x']);
        data.extend_from_slice(&[0x81, 0x02, b'n', b'o']);

        let messages = collect(&mut processor, &data, &mut socket);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].text().unwrap(), "hi");
        assert_eq!(socket.data, close_frame(1002));

        let messages = collect(&mut processor, &[0x81, 0x02, b'h', b'i'], &mut socket);
        assert!(messages.is_empty());
        assert_eq!(socket.writes, 1);
    }

    #[test]
    fn test_new_data_frame_during_fragmentation_is_protocol_error() {
        let mut processor = MessageProcessor::new();
        let mut socket = MockConnection::default();

        let mut data = vec![0x01, 0x01, b'a'];
        data.extend_from_slice(&[0x82, 0x01, b'b']);
        let messages = collect(&mut processor, &data, &mut socket);

        assert!(messages.is_empty());
        assert_eq!(socket.data, close_frame(1002));
        assert!(processor.in_flight().is_none());
    }

    #[test]
    fn test_reserved_bits_are_protocol_error() {
        let mut processor = MessageProcessor::new();
        let mut socket = MockConnection::default();

        let messages = collect(&mut processor, &[0xC1, 0x00], &mut socket);
        assert!(messages.is_empty());
        assert_eq!(socket.data, close_frame(1002));
    }

    #[test]
    fn test_message_size_accumulates_over_fragments() {
        let config = ProcessorConfig::default().with_max_message_size(4);
        let mut processor = MessageProcessor::with_config(config);
        let mut socket = MockConnection::default();

        let mut data = vec![0x01, 0x03, b'H', b'e', b'l'];
        data.extend_from_slice(&[0x80, 0x02, b'l', b'o']);
        let messages = collect(&mut processor, &data, &mut socket);

        assert!(messages.is_empty());
        assert_eq!(socket.data, close_frame(1009));
    }

    #[test]
    fn test_too_many_frames_abandons_message_only() {
        let mut processor = MessageProcessor::new();
        let mut socket = MockConnection::default();

        let mut data = vec![0x01, 0x00];
        for _ in 0..20 {
            data.extend_from_slice(&[0x00, 0x00]);
        }
        data.extend_from_slice(&[0x80, 0x00]);
        data.extend_from_slice(&[0x81, 0x02, b'h', b'i']);

        let messages = collect(&mut processor, &data, &mut socket);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].text().unwrap(), "hi");
        assert!(socket.data.is_empty());
        assert!(!processor.is_closed());
    }

    #[test]
    fn test_many_tiny_frames_in_one_chunk() {
        let mut processor = MessageProcessor::new();
        let mut socket = MockConnection::default();

        let count = 50_000;
        let data = [0x82, 0x00].repeat(count);
        let messages = collect(&mut processor, &data, &mut socket);

        assert_eq!(messages.len(), count);
        assert!(messages.iter().all(|m| m.opcode() == Some(Opcode::Binary)));
        assert_eq!(processor.buffered_len(), 0);
        assert!(processor.in_flight().is_none());
    }

    #[test]
    fn test_pending_bytes_move_into_in_flight_message() {
        let mut processor = MessageProcessor::new();
        let mut socket = MockConnection::default();

        // an unfinished fragment followed by the head of the next frame
        let messages = collect(&mut processor, &[0x01, 0x01, b'a', 0x80], &mut socket);
        assert!(messages.is_empty());
        let in_flight = processor.in_flight().unwrap();
        assert_eq!(in_flight.buffer(), &[0x80]);
        assert_eq!(processor.buffered_len(), 1);

        let messages = collect(&mut processor, &[0x01, b'b'], &mut socket);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].text().unwrap(), "ab");
        assert_eq!(processor.buffered_len(), 0);
    }

    #[test]
    fn test_partially_drained_iterator_keeps_bytes() {
        let mut processor = MessageProcessor::new();
        let mut socket = MockConnection::default();

        let mut data = vec![0x81, 0x03, b'o', b'n', b'e'];
        data.extend_from_slice(&[0x81, 0x03, b't', b'w', b'o']);

        let first = processor.on_data(&data, &mut socket).next().unwrap().unwrap();
        assert_eq!(first.text().unwrap(), "one");
        assert_eq!(processor.buffered_len(), 5);

        let rest = collect(&mut processor, &[], &mut socket);
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].text().unwrap(), "two");
    }

    #[test]
    fn test_handler_write_failure_is_yielded() {
        let mut processor = MessageProcessor::new();
        let mut socket = BrokenConnection;

        let mut messages = processor.on_data(&[0x89, 0x00, 0x81, 0x00], &mut socket);
        assert_eq!(
            messages.next().unwrap().unwrap_err(),
            WebSocketError::IoError("peer gone".to_string())
        );
        assert!(messages.next().is_none());
    }

    #[test]
    fn test_writes_text_binary_and_frames() {
        let processor = MessageProcessor::new();
        let mut socket = MockConnection::default();

        processor.write("Hello", &mut socket).unwrap();
        assert_eq!(socket.data, vec![0x81, 0x05, 0x48, 0x65, 0x6c, 0x6c, 0x6f]);

        let mut socket = MockConnection::default();
        processor.write(vec![1u8, 2, 3], &mut socket).unwrap();
        assert_eq!(socket.data, vec![0x82, 0x03, 1, 2, 3]);

        let mut socket = MockConnection::default();
        let frame = processor.frame_factory().create_ping_frame(b"foo".to_vec()).unwrap();
        processor.write(frame.clone(), &mut socket).unwrap();
        assert_eq!(socket.data, frame.encode());
        assert_eq!(socket.writes, 1);
    }

    #[test]
    fn test_client_role_masks_outgoing_frames() {
        let config = ProcessorConfig::default().with_mask_outgoing(true);
        let client = MessageProcessor::with_config(config);
        let mut wire: Vec<u8> = Vec::new();
        client.write("masked", &mut wire).unwrap();
        assert_eq!(wire[1] & 0x80, 0x80);

        let mut server = MessageProcessor::new();
        let mut socket = MockConnection::default();
        let messages = collect(&mut server, &wire, &mut socket);
        assert_eq!(messages[0].text().unwrap(), "masked");
        assert!(messages[0].first_frame().unwrap().is_masked());
    }

    #[test]
    fn test_processor_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<MessageProcessor>();
    }

    #[tokio::test]
    async fn test_chunked_transport() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt, duplex};

        let mut stream = masked(false, Opcode::Text, b"streamed ");
        stream.extend(masked(true, Opcode::Ping, b""));
        stream.extend(masked(true, Opcode::Continuation, b"message"));
        stream.extend(masked(true, Opcode::Binary, &[7; 1000]));

        let (mut client, mut server) = duplex(7);
        let writer = tokio::spawn(async move {
            client.write_all(&stream).await.unwrap();
            client.shutdown().await.unwrap();
        });

        let mut processor = MessageProcessor::new();
        let mut socket = MockConnection::default();
        let mut received = Vec::new();
        let mut buf = [0u8; 5];
        loop {
            let n = server.read(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            for message in processor.on_data(&buf[..n], &mut socket) {
                received.push(message.unwrap());
            }
        }
        writer.await.unwrap();

        assert_eq!(received.len(), 3);
        assert_eq!(received[0].opcode(), Some(Opcode::Ping));
        assert_eq!(received[1].text().unwrap(), "streamed message");
        assert_eq!(received[2].payload_len(), 1000);
        assert_eq!(socket.data, vec![0x8A, 0x00]);
    }
}

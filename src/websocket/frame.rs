//! WebSocket frame parsing and encoding conforming to RFC 6455.

use bytes::{BufMut, BytesMut};

use super::error::WebSocketError;

/// Largest payload a control frame may carry (RFC 6455 Section 5.5).
pub const MAX_CONTROL_PAYLOAD: usize = 125;

/// Default limit for a single frame payload (16 MiB).
pub const DEFAULT_MAX_PAYLOAD_SIZE: usize = 16 * 1024 * 1024;

/// WebSocket opcodes as defined in RFC 6455 Section 5.2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    /// Continuation frame (0x0)
    Continuation = 0x0,
    /// Text data frame (0x1)
    Text = 0x1,
    /// Binary data frame (0x2)
    Binary = 0x2,
    /// Connection close frame (0x8)
    Close = 0x8,
    /// Ping frame (0x9)
    Ping = 0x9,
    /// Pong frame (0xA)
    Pong = 0xA,
}

impl Opcode {
    /// Parse opcode from 4-bit value.
    pub fn from_u8(value: u8) -> Result<Self, WebSocketError> {
        match value {
            0x0 => Ok(Opcode::Continuation),
            0x1 => Ok(Opcode::Text),
            0x2 => Ok(Opcode::Binary),
            0x8 => Ok(Opcode::Close),
            0x9 => Ok(Opcode::Ping),
            0xA => Ok(Opcode::Pong),
            _ => Err(WebSocketError::InvalidOpcode(value)),
        }
    }

    /// Check if this is a control frame opcode.
    pub fn is_control(&self) -> bool {
        matches!(self, Opcode::Close | Opcode::Ping | Opcode::Pong)
    }

    /// Check if this is a data frame opcode.
    pub fn is_data(&self) -> bool {
        matches!(self, Opcode::Text | Opcode::Binary | Opcode::Continuation)
    }
}

/// WebSocket frame structure per RFC 6455 Section 5.2.
///
/// Frames are immutable. They come out of [`Frame::parse`] with their payload already
/// unmasked, or are built through [`Frame::new`] (usually via the frame factory).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    fin: bool,
    opcode: Opcode,
    masking_key: Option<[u8; 4]>,
    payload: Vec<u8>,
    wire_len: usize,
}

impl Frame {
    /// Create a frame, enforcing the control frame invariants.
    ///
    /// Control frames must be final and carry at most 125 bytes.
    pub fn new(
        fin: bool,
        opcode: Opcode,
        payload: Vec<u8>,
        masking_key: Option<[u8; 4]>,
    ) -> Result<Self, WebSocketError> {
        if opcode.is_control() {
            if !fin {
                return Err(WebSocketError::ControlFrameFragmented);
            }
            if payload.len() > MAX_CONTROL_PAYLOAD {
                return Err(WebSocketError::ControlFrameTooLarge);
            }
        }

        let wire_len = header_len(payload.len(), masking_key.is_some()) + payload.len();
        Ok(Frame {
            fin,
            opcode,
            masking_key,
            payload,
            wire_len,
        })
    }

    /// Parse a WebSocket frame from the head of `data`.
    ///
    /// Returns the parsed frame and the number of bytes consumed.
    /// Returns `Err(WebSocketError::IncompleteFrame)` if more data is needed; nothing is
    /// consumed in that case and the caller retries once more bytes arrive.
    ///
    /// The declared payload length is checked against `max_payload` before any payload byte
    /// is required, so an attacker-controlled 64-bit length never causes buffering.
    ///
    /// # RFC 6455 Frame Format
    ///
    /// ```text
    ///  0                   1                   2                   3
    ///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
    /// +-+-+-+-+-------+-+-------------+-------------------------------+
    /// |F|R|R|R| opcode|M| Payload len |    Extended payload length    |
    /// |I|S|S|S|  (4)  |A|     (7)     |             (16/64)           |
    /// |N|V|V|V|       |S|             |   (if payload len==126/127)   |
    /// | |1|2|3|       |K|             |                               |
    /// +-+-+-+-+-------+-+-------------+ - - - - - - - - - - - - - - - +
    /// |     Extended payload length continued, if payload len == 127  |
    /// + - - - - - - - - - - - - - - - +-------------------------------+
    /// |                               |Masking-key, if MASK set to 1  |
    /// +-------------------------------+-------------------------------+
    /// | Masking-key (continued)       |          Payload Data         |
    /// +-------------------------------- - - - - - - - - - - - - - - - +
    /// :                     Payload Data continued ...                :
    /// + - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - +
    /// |                     Payload Data continued ...                |
    /// +---------------------------------------------------------------+
    /// ```
    pub fn parse(data: &[u8], max_payload: usize) -> Result<(Self, usize), WebSocketError> {
        // Need at least 2 bytes for header
        if data.len() < 2 {
            return Err(WebSocketError::IncompleteFrame);
        }

        // Parse first byte: FIN, RSV1-3, Opcode
        let byte1 = data[0];
        let fin = (byte1 & 0b1000_0000) != 0;
        let reserved = byte1 & 0b0111_0000;
        let opcode = Opcode::from_u8(byte1 & 0b0000_1111)?;

        // Parse second byte: MASK, Payload length
        let byte2 = data[1];
        let masked = (byte2 & 0b1000_0000) != 0;
        let short_len = byte2 & 0b0111_1111;

        // Control frames are rejected before the extended length is even looked at
        if opcode.is_control() {
            if !fin {
                return Err(WebSocketError::ControlFrameFragmented);
            }
            if short_len as usize > MAX_CONTROL_PAYLOAD {
                return Err(WebSocketError::ControlFrameTooLarge);
            }
        }

        if reserved != 0 {
            return Err(WebSocketError::ReservedBitsSet);
        }

        let mut offset = 2;

        let payload_len = match short_len {
            126 => {
                if data.len() < offset + 2 {
                    return Err(WebSocketError::IncompleteFrame);
                }
                let len = u16::from_be_bytes([data[offset], data[offset + 1]]) as u64;
                offset += 2;
                len
            }
            127 => {
                if data.len() < offset + 8 {
                    return Err(WebSocketError::IncompleteFrame);
                }
                let len = u64::from_be_bytes([
                    data[offset],
                    data[offset + 1],
                    data[offset + 2],
                    data[offset + 3],
                    data[offset + 4],
                    data[offset + 5],
                    data[offset + 6],
                    data[offset + 7],
                ]);
                if len & (1 << 63) != 0 {
                    return Err(WebSocketError::InvalidLength);
                }
                offset += 8;
                len
            }
            len => len as u64,
        };

        if payload_len > max_payload as u64 {
            return Err(WebSocketError::FrameTooLarge);
        }
        let payload_len = payload_len as usize;

        // Parse masking key if present
        let masking_key = if masked {
            if data.len() < offset + 4 {
                return Err(WebSocketError::IncompleteFrame);
            }
            let key = [
                data[offset],
                data[offset + 1],
                data[offset + 2],
                data[offset + 3],
            ];
            offset += 4;
            Some(key)
        } else {
            None
        };

        // Parse payload
        if data.len() - offset < payload_len {
            return Err(WebSocketError::IncompleteFrame);
        }

        let mut payload = data[offset..offset + payload_len].to_vec();
        offset += payload_len;

        if let Some(key) = masking_key {
            apply_mask(&mut payload, key);
        }

        Ok((
            Frame {
                fin,
                opcode,
                masking_key,
                payload,
                wire_len: offset,
            },
            offset,
        ))
    }

    /// Encode the frame to bytes, re-applying the mask if the frame carries a masking key.
    pub fn encode(&self) -> Vec<u8> {
        let mut dst = BytesMut::with_capacity(self.encoded_len());
        self.encode_into(&mut dst);
        dst.to_vec()
    }

    /// Append the encoded frame to `dst`, using the shortest length field for the payload.
    pub fn encode_into(&self, dst: &mut BytesMut) {
        dst.reserve(self.encoded_len());

        let mut byte1 = self.opcode as u8;
        if self.fin {
            byte1 |= 0b1000_0000;
        }
        dst.put_u8(byte1);

        let payload_len = self.payload.len();
        let mask_bit = if self.masking_key.is_some() {
            0b1000_0000
        } else {
            0b0000_0000
        };

        if payload_len < 126 {
            dst.put_u8(mask_bit | payload_len as u8);
        } else if payload_len <= 65535 {
            dst.put_u8(mask_bit | 126);
            dst.put_u16(payload_len as u16);
        } else {
            dst.put_u8(mask_bit | 127);
            dst.put_u64(payload_len as u64);
        }

        match self.masking_key {
            Some(key) => {
                dst.put_slice(&key);
                let start = dst.len();
                dst.put_slice(&self.payload);
                apply_mask(&mut dst[start..], key);
            }
            None => dst.put_slice(&self.payload),
        }
    }

    /// Length of this frame once encoded with minimal length fields.
    pub fn encoded_len(&self) -> usize {
        header_len(self.payload.len(), self.masking_key.is_some()) + self.payload.len()
    }

    /// Number of bytes this frame occupied in the buffer it was parsed from.
    ///
    /// Equals [`Frame::encoded_len`] unless the peer used a non-minimal length field.
    pub fn wire_len(&self) -> usize {
        self.wire_len
    }

    /// FIN bit: this is the final fragment of a message.
    pub fn is_final(&self) -> bool {
        self.fin
    }

    /// The frame opcode.
    pub fn opcode(&self) -> Opcode {
        self.opcode
    }

    /// Check if this is a control frame.
    pub fn is_control(&self) -> bool {
        self.opcode.is_control()
    }

    /// Whether the frame is (or was, on the wire) masked.
    pub fn is_masked(&self) -> bool {
        self.masking_key.is_some()
    }

    /// The masking key, present iff the frame is masked.
    pub fn masking_key(&self) -> Option<[u8; 4]> {
        self.masking_key
    }

    /// The unmasked payload.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Length of the payload in bytes.
    pub fn payload_len(&self) -> usize {
        self.payload.len()
    }

    /// Consume the frame and return its unmasked payload.
    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }

    /// Parse close frame payload to extract status code and reason.
    ///
    /// Returns `Ok(None)` for an empty close payload. A one byte payload cannot hold a
    /// status code and is rejected, as is a reason that is not UTF-8.
    pub fn parse_close_payload(&self) -> Result<Option<(u16, &str)>, WebSocketError> {
        if self.opcode != Opcode::Close {
            return Err(WebSocketError::UnexpectedOpcode(self.opcode));
        }
        match self.payload.as_slice() {
            [] => Ok(None),
            [single] => Err(WebSocketError::InvalidCloseCode(*single as u16)),
            [high, low, reason @ ..] => {
                let code = u16::from_be_bytes([*high, *low]);
                let reason =
                    std::str::from_utf8(reason).map_err(|_| WebSocketError::InvalidUtf8)?;
                Ok(Some((code, reason)))
            }
        }
    }
}

impl AsRef<[u8]> for Frame {
    fn as_ref(&self) -> &[u8] {
        &self.payload
    }
}

/// Apply XOR mask to payload data per RFC 6455 Section 5.3.
///
/// This operation is reversible (applying the same mask twice yields the original data).
pub fn apply_mask(payload: &mut [u8], key: [u8; 4]) {
    for (i, byte) in payload.iter_mut().enumerate() {
        *byte ^= key[i % 4];
    }
}

fn header_len(payload_len: usize, masked: bool) -> usize {
    let length_field = if payload_len < 126 {
        0
    } else if payload_len <= 65535 {
        2
    } else {
        8
    };
    2 + length_field + if masked { 4 } else { 0 }
}

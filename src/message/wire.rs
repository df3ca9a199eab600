//! Binary framing of [`DataMessage`].
//!
//! ```text
//! +-----------+-----------+-----------+---------+---------+-------------+--------------+
//! | appPortDst| appPortSrc| messageId | addrSrc | addrDst | messageSize | body ...     |
//! |    u8     |    u8     |    u8     | u16 LE  | u16 LE  |   u32 LE    | messageSize  |
//! +-----------+-----------+-----------+---------+---------+-------------+--------------+
//! ```
//!
//! `messageSize` is always derived from the body while encoding; callers never
//! supply it, so a frame can not misdeclare its own length.
use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::error::WireError;
use super::payload::AppPayload;
use super::ports::AppPort;
use super::{DataMessage, MessageHeader};

/// Fixed header size in bytes.
pub const HEADER_SIZE: usize = 11;
/// Upper bound on a body. Anything larger is treated as corruption.
pub const MAX_BODY_SIZE: usize = 1024;

/// Encode a message into an exactly sized buffer.
///
/// Bodies that [`decode`] would refuse are refused here too, so every encoded
/// frame reads back as the same message.
pub fn encode(msg: &DataMessage) -> Result<Bytes, WireError> {
    msg.payload.validate(msg.header.app_port_src)?;
    let body_len = msg.payload.encoded_len();
    let mut buf = BytesMut::with_capacity(HEADER_SIZE + body_len);
    put_header(&mut buf, &msg.header, body_len as u32);
    msg.payload.encode_body(&mut buf);
    debug_assert_eq!(buf.len(), HEADER_SIZE + body_len);
    Ok(buf.freeze())
}

fn put_header(buf: &mut BytesMut, h: &MessageHeader, body_len: u32) {
    buf.put_u8(h.app_port_dst.into());
    buf.put_u8(h.app_port_src.into());
    buf.put_u8(h.message_id);
    buf.put_u16_le(h.addr_src);
    buf.put_u16_le(h.addr_dst);
    buf.put_u32_le(body_len);
}

/// Parse the fixed header, returning it together with the declared body size.
fn get_header(mut buf: &[u8]) -> Result<(MessageHeader, usize), WireError> {
    if buf.len() < HEADER_SIZE {
        return Err(WireError::Truncated {
            needed: HEADER_SIZE,
            available: buf.len(),
        });
    }
    let app_port_dst = AppPort::try_from(buf.get_u8())?;
    let app_port_src = AppPort::try_from(buf.get_u8())?;
    let message_id = buf.get_u8();
    let addr_src = buf.get_u16_le();
    let addr_dst = buf.get_u16_le();
    let size = buf.get_u32_le() as usize;
    if size > MAX_BODY_SIZE {
        return Err(WireError::Oversize {
            size,
            max: MAX_BODY_SIZE,
        });
    }
    Ok((
        MessageHeader {
            app_port_dst,
            app_port_src,
            message_id,
            addr_src,
            addr_dst,
        },
        size,
    ))
}

/// Decode exactly one frame. The buffer must hold the header and the declared
/// body, nothing more.
pub fn decode(bytes: &[u8]) -> Result<DataMessage, WireError> {
    let (header, size) = get_header(bytes)?;
    let available = bytes.len() - HEADER_SIZE;
    if available < size {
        return Err(WireError::Truncated {
            needed: HEADER_SIZE + size,
            available: bytes.len(),
        });
    }
    if available > size {
        return Err(WireError::TrailingBytes {
            declared: size,
            available,
        });
    }
    let payload = AppPayload::decode(header.app_port_src, &bytes[HEADER_SIZE..])?;
    Ok(DataMessage { header, payload })
}

/// Incremental decoder for stream transports. Feed arbitrary chunks and pull
/// whole messages out as they complete.
///
/// A header naming an unknown port or an oversize body drops one leading byte
/// and tries again from the next offset.
pub struct FrameDecoder {
    buf: BytesMut,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self {
            buf: BytesMut::with_capacity(1024),
        }
    }

    pub fn push(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Next complete frame, `Ok(None)` when more bytes are needed. A frame whose
    /// header parses but whose body does not is consumed and returned as the error.
    pub fn next_message(&mut self) -> Result<Option<DataMessage>, WireError> {
        loop {
            if self.buf.len() < HEADER_SIZE {
                return Ok(None);
            }
            let size = match get_header(&self.buf[..HEADER_SIZE]) {
                Ok((_, size)) => size,
                Err(e) => {
                    log::trace!("frame resync after bad header: {}", e);
                    self.buf.advance(1);
                    continue;
                }
            };
            if self.buf.len() < HEADER_SIZE + size {
                return Ok(None);
            }
            let frame = self.buf.split_to(HEADER_SIZE + size);
            return decode(&frame).map(Some);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::payload::{
        ChatKind, ChatPayload, DisplayCommand, DisplayPayload, LedCommand, LedPayload, MonitorReport, RouteReport,
    };

    fn chat(text: &str) -> DataMessage {
        DataMessage {
            header: MessageHeader {
                app_port_dst: AppPort::LoRaChat,
                app_port_src: AppPort::LoRaChat,
                message_id: 7,
                addr_src: 0x10,
                addr_dst: 0x20,
            },
            payload: AppPayload::Chat(ChatPayload::new(ChatKind::ChatTo, text)),
        }
    }

    #[test]
    fn header_layout_is_little_endian_and_packed() {
        let bytes = encode(&chat("hi")).unwrap();
        assert_eq!(
            &bytes[..],
            &[1, 1, 7, 0x10, 0x00, 0x20, 0x00, 3, 0, 0, 0, 8, b'h', b'i']
        );
    }

    #[test]
    fn size_mismatch_is_rejected() {
        let mut bytes = encode(&chat("hello")).unwrap().to_vec();
        bytes.push(0);
        assert!(matches!(
            decode(&bytes),
            Err(WireError::TrailingBytes { declared: 6, available: 7 })
        ));
        bytes.truncate(HEADER_SIZE + 2);
        assert!(matches!(decode(&bytes), Err(WireError::Truncated { .. })));
    }

    #[test]
    fn unknown_destination_port_is_rejected() {
        let mut bytes = encode(&chat("x")).unwrap().to_vec();
        bytes[0] = 99;
        assert!(matches!(decode(&bytes), Err(WireError::UnknownPort(99))));
    }

    #[test]
    fn oversize_declaration_is_rejected() {
        let mut bytes = encode(&chat("x")).unwrap().to_vec();
        bytes[7..11].copy_from_slice(&(MAX_BODY_SIZE as u32 + 1).to_le_bytes());
        assert!(matches!(decode(&bytes), Err(WireError::Oversize { .. })));
    }

    #[test]
    fn mismatched_layout_refuses_to_encode() {
        let mut msg = chat("x");
        msg.payload = AppPayload::Led(LedPayload {
            command: LedCommand::On,
        });
        assert!(matches!(encode(&msg), Err(WireError::LayoutMismatch { .. })));
    }

    #[test]
    fn unreadable_bodies_refuse_to_encode() {
        let display = DataMessage::new(
            AppPort::Display,
            1,
            0x10,
            0x20,
            AppPayload::Display(DisplayPayload {
                command: DisplayCommand::Text,
                text: "x".repeat(40),
            }),
        );
        assert!(matches!(
            encode(&display),
            Err(WireError::MalformedBody { port: AppPort::Display, .. })
        ));

        let row = DataMessage::new(
            AppPort::Mon,
            1,
            0x10,
            0,
            AppPayload::Mon(MonitorReport::PerRoute(RouteReport {
                rt_count: 0xFFFF,
                ..RouteReport::default()
            })),
        );
        assert!(matches!(
            encode(&row),
            Err(WireError::MalformedBody { port: AppPort::Mon, .. })
        ));
    }

    #[test]
    fn frame_decoder_handles_split_and_concatenated_frames() {
        let a = encode(&chat("first")).unwrap();
        let b = encode(&chat("second")).unwrap();
        let mut stream = vec![0xEE];
        stream.extend_from_slice(&a);
        stream.extend_from_slice(&b);

        let mut dec = FrameDecoder::new();
        dec.push(&stream[..5]);
        assert!(dec.next_message().unwrap().is_none());
        dec.push(&stream[5..]);
        assert_eq!(dec.next_message().unwrap().unwrap(), chat("first"));
        assert_eq!(dec.next_message().unwrap().unwrap(), chat("second"));
        assert!(dec.next_message().unwrap().is_none());
        assert_eq!(dec.buffered(), 0);
    }
}

//! Packed binary codec for the command envelope
//!
//! The envelope is a fixed 316-byte block with no delimiters: a short read
//! is a partial message, never "more data coming". All multi-byte integers
//! are little-endian, matching the packed-struct layout the device firmware
//! parses. Decoding validates the payload length field; everything else is
//! carried as-is.
//!
//! ```text
//! [read_write: u8][length: u16][notifications: u32]
//! [protocol: u16][checksum: u16][read_write: u8][opcode: u8][secondary_opcode: u8]
//! [payload length: u16][payload data: 300 bytes]
//! ```

use crate::error::{DecodeError, Result};
use crate::types::{ENVELOPE_SIZE, Envelope, MAX_PAYLOAD_LENGTH, MESSAGE_SIZE, Message, Payload};
use bytes::{Buf, BufMut};

#[cfg(feature = "async")]
use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// Encode an envelope into its exact 316-byte wire form
///
/// Always succeeds: every field is a bounded integer or fixed-size buffer.
pub fn encode_envelope(envelope: &Envelope) -> Vec<u8> {
    let mut buf = Vec::with_capacity(ENVELOPE_SIZE);
    buf.put_u8(envelope.read_write);
    buf.put_u16_le(envelope.length);
    buf.put_u32_le(envelope.notifications);
    put_message(&mut buf, &envelope.payload);
    buf
}

/// Encode the inner message block alone (309 bytes)
///
/// This is the buffer handed to the USB transfer layer; the envelope fields
/// never reach the device.
pub fn encode_message(message: &Message) -> Vec<u8> {
    let mut buf = Vec::with_capacity(MESSAGE_SIZE);
    put_message(&mut buf, message);
    buf
}

fn put_message(buf: &mut Vec<u8>, message: &Message) {
    buf.put_u16_le(message.protocol);
    buf.put_u16_le(message.checksum);
    buf.put_u8(message.read_write);
    buf.put_u8(message.opcode);
    buf.put_u8(message.secondary_opcode);
    buf.put_u16_le(message.payload.length);
    buf.put_slice(&message.payload.data);
}

/// Decode one envelope from the start of `bytes`
///
/// Trailing bytes beyond the fixed envelope size are ignored.
///
/// # Errors
///
/// [`DecodeError::Truncated`] if fewer than [`ENVELOPE_SIZE`] bytes are
/// available; [`DecodeError::LengthOutOfRange`] if the payload length field
/// exceeds [`MAX_PAYLOAD_LENGTH`].
pub fn decode_envelope(bytes: &[u8]) -> Result<Envelope> {
    if bytes.len() < ENVELOPE_SIZE {
        return Err(DecodeError::Truncated {
            expected: ENVELOPE_SIZE,
            actual: bytes.len(),
        });
    }

    let mut buf = &bytes[..ENVELOPE_SIZE];
    let read_write = buf.get_u8();
    let length = buf.get_u16_le();
    let notifications = buf.get_u32_le();

    let protocol = buf.get_u16_le();
    let checksum = buf.get_u16_le();
    let inner_read_write = buf.get_u8();
    let opcode = buf.get_u8();
    let secondary_opcode = buf.get_u8();

    let payload_length = buf.get_u16_le();
    if payload_length as usize > MAX_PAYLOAD_LENGTH {
        return Err(DecodeError::LengthOutOfRange {
            length: payload_length,
            max: MAX_PAYLOAD_LENGTH,
        });
    }
    let mut data = [0u8; MAX_PAYLOAD_LENGTH];
    buf.copy_to_slice(&mut data);

    Ok(Envelope {
        read_write,
        length,
        notifications,
        payload: Message {
            protocol,
            checksum,
            read_write: inner_read_write,
            opcode,
            secondary_opcode,
            payload: Payload {
                length: payload_length,
                data,
            },
        },
    })
}

/// Async: read exactly one envelope from a stream
///
/// Returns `Ok(None)` when the peer closed the connection cleanly before
/// the first byte of an envelope. EOF partway through an envelope is a
/// [`DecodeError::Truncated`] error, matching the fixed-block framing.
#[cfg(feature = "async")]
pub async fn read_envelope<R>(reader: &mut R) -> Result<Option<Envelope>>
where
    R: AsyncReadExt + Unpin,
{
    let mut buf = [0u8; ENVELOPE_SIZE];
    let mut filled = 0;

    while filled < ENVELOPE_SIZE {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            if filled == 0 {
                return Ok(None);
            }
            return Err(DecodeError::Truncated {
                expected: ENVELOPE_SIZE,
                actual: filled,
            });
        }
        filled += n;
    }

    decode_envelope(&buf).map(Some)
}

/// Async: write one encoded envelope to a stream
#[cfg(feature = "async")]
pub async fn write_envelope<W>(writer: &mut W, envelope: &Envelope) -> Result<()>
where
    W: AsyncWriteExt + Unpin,
{
    let encoded = encode_envelope(envelope);
    writer.write_all(&encoded).await?;
    Ok(())
}

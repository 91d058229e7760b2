//! Command message type definitions
//!
//! Types mirror the packed structures understood by the speaker-module
//! firmware parser: a fixed-size [`Message`] (header, payload length,
//! payload buffer) wrapped in the [`Envelope`] record that clients send
//! over TCP, one per request.

/// Protocol identifier carried in every message header
///
/// The bridge passes this through without checking it; validation is the
/// concern of the endpoints that construct and consume messages.
pub const MESSAGE_PROTOCOL: u16 = 0x0101;

/// Capacity of the message payload buffer in bytes
pub const MAX_PAYLOAD_LENGTH: usize = 300;

/// Size of the message header (protocol, checksum, role, opcodes)
pub const MESSAGE_HEADER_SIZE: usize = 7;

/// Total on-wire size of a message: header + payload length + payload buffer
pub const MESSAGE_SIZE: usize = MESSAGE_HEADER_SIZE + 2 + MAX_PAYLOAD_LENGTH;

/// Size of the envelope fields preceding the inner message
pub const ENVELOPE_HEADER_SIZE: usize = 7;

/// Total on-wire size of an envelope
pub const ENVELOPE_SIZE: usize = ENVELOPE_HEADER_SIZE + MESSAGE_SIZE;

/// Role selector value for a write-only exchange
pub const ROLE_WRITE: u8 = 0;

/// Role selector value for a request/response exchange
pub const ROLE_READ: u8 = 1;

/// Dispatch role of one exchange
///
/// WRITE sends the command to the device and expects nothing back; READ
/// sends the command and then relays the device's reply to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Write,
    Read,
}

impl Role {
    /// Interpret the wire role byte: zero is WRITE, any other value is READ
    pub fn from_wire(byte: u8) -> Self {
        if byte == ROLE_WRITE {
            Role::Write
        } else {
            Role::Read
        }
    }
}

/// Message payload: a declared length and a fixed-capacity data buffer
///
/// Only the first `length` bytes of `data` are meaningful; the rest of the
/// buffer still travels on the wire (the message is a fixed-size block, not
/// length-delimited).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload {
    /// Count of valid bytes in `data`, `0..=MAX_PAYLOAD_LENGTH`
    pub length: u16,
    /// Fixed-capacity payload buffer
    pub data: [u8; MAX_PAYLOAD_LENGTH],
}

impl Payload {
    /// Build a payload from a byte slice
    ///
    /// Fails with [`DecodeError::LengthOutOfRange`](crate::DecodeError) if
    /// the slice is longer than the payload buffer.
    pub fn from_slice(bytes: &[u8]) -> crate::Result<Self> {
        if bytes.len() > MAX_PAYLOAD_LENGTH {
            return Err(crate::DecodeError::LengthOutOfRange {
                length: bytes.len() as u16,
                max: MAX_PAYLOAD_LENGTH,
            });
        }
        let mut data = [0u8; MAX_PAYLOAD_LENGTH];
        data[..bytes.len()].copy_from_slice(bytes);
        Ok(Self {
            length: bytes.len() as u16,
            data,
        })
    }

    /// The meaningful prefix of the payload buffer
    pub fn bytes(&self) -> &[u8] {
        let len = (self.length as usize).min(MAX_PAYLOAD_LENGTH);
        &self.data[..len]
    }
}

impl Default for Payload {
    fn default() -> Self {
        Self {
            length: 0,
            data: [0u8; MAX_PAYLOAD_LENGTH],
        }
    }
}

/// One command/response message as understood by the device firmware
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Message {
    /// Protocol identifier, pass-through (normally [`MESSAGE_PROTOCOL`])
    pub protocol: u16,
    /// Message checksum, carried opaquely; the bridge never computes or
    /// verifies it
    pub checksum: u16,
    /// Role byte inside the message; redundant with the envelope field and
    /// not used for dispatch
    pub read_write: u8,
    /// Command identifier, opaque to the bridge
    pub opcode: u8,
    /// Secondary command identifier, opaque to the bridge
    pub secondary_opcode: u8,
    /// Message payload
    pub payload: Payload,
}

/// The outer record read off the socket, one per request
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Envelope {
    /// Role selector the handler dispatches on: 0 = WRITE, nonzero = READ
    pub read_write: u8,
    /// Requested USB transfer length in bytes (caller-supplied, distinct
    /// from the payload length)
    pub length: u16,
    /// Opaque notification flags, not interpreted by the bridge
    pub notifications: u32,
    /// The command message to relay
    pub payload: Message,
}

impl Envelope {
    /// Dispatch role of this envelope
    pub fn role(&self) -> Role {
        Role::from_wire(self.read_write)
    }
}

//! Wire protocol for wisa-bridge
//!
//! This crate defines the fixed-format command envelope exchanged between
//! TCP clients and the bridge, and the packed binary codec for it. The byte
//! layout is the contract with the message parser in the speaker-module
//! firmware and must not change: every field has an explicit width, all
//! multi-byte integers are little-endian, and there is no padding between
//! fields.
//!
//! # Example
//!
//! ```
//! use protocol::{Envelope, decode_envelope, encode_envelope};
//!
//! let envelope = Envelope::default();
//! let bytes = encode_envelope(&envelope);
//! let decoded = decode_envelope(&bytes).unwrap();
//! assert_eq!(decoded, envelope);
//! ```

pub mod codec;
pub mod error;
pub mod types;

pub use codec::{decode_envelope, encode_envelope, encode_message};

#[cfg(feature = "async")]
pub use codec::{read_envelope, write_envelope};
pub use error::{DecodeError, Result};
pub use types::{
    ENVELOPE_HEADER_SIZE, ENVELOPE_SIZE, Envelope, MAX_PAYLOAD_LENGTH, MESSAGE_HEADER_SIZE,
    MESSAGE_PROTOCOL, MESSAGE_SIZE, Message, Payload, ROLE_READ, ROLE_WRITE, Role,
};

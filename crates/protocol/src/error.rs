//! Protocol error types

use thiserror::Error;

/// Errors produced while decoding an envelope off the wire
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Fewer bytes were available than the fixed envelope size
    #[error("truncated envelope: expected {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },

    /// Declared payload length exceeds the payload buffer capacity
    #[error("payload length out of range: {length} (max {max})")]
    LengthOutOfRange { length: u16, max: usize },

    /// I/O error while reading an envelope from a stream
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Type alias for protocol results
pub type Result<T> = std::result::Result<T, DecodeError>;

//! Common error types

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("USB error: {0}")]
    Usb(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Channel error: {0}")]
    Channel(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Failure of a single USB control transfer
///
/// Mirrors the libusb status codes the bridge can actually see. Transfer
/// errors are never fatal to a connection: the WRITE path logs and carries
/// on, and the READ path suppresses the response (spelled out in the
/// connection handler).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransferError {
    #[error("transfer timed out")]
    Timeout,

    #[error("endpoint stalled")]
    Pipe,

    #[error("device disconnected")]
    NoDevice,

    #[error("device busy")]
    Busy,

    #[error("buffer overflow")]
    Overflow,

    #[error("transfer I/O error")]
    Io,

    #[error("invalid transfer parameter")]
    InvalidParam,

    #[error("access denied")]
    Access,

    #[error("transfer failed: {0}")]
    Other(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transfer_error_display() {
        assert_eq!(TransferError::Timeout.to_string(), "transfer timed out");
        assert_eq!(
            TransferError::Other("weird".to_string()).to_string(),
            "transfer failed: weird"
        );
    }
}

//! USB worker thread
//!
//! Dedicated thread that owns the device handle and executes relay commands
//! one at a time. Connection handlers submit commands over the channel
//! bridge; draining them on a single thread makes each command's transfer
//! sequence a critical section, so the READ path's request and response
//! transfers can never interleave with another connection's traffic.

use crate::usb::{UsbDevice, transfers};
use common::{ReadOutcome, TransferError, UsbCommand, UsbWorker};
use protocol::{Envelope, encode_message};
use std::time::Duration;
use tracing::{debug, info};

/// USB worker thread state
pub struct UsbWorkerThread {
    device: UsbDevice,
    worker: UsbWorker,
    timeout: Duration,
}

impl UsbWorkerThread {
    /// Create a new worker around an opened device
    pub fn new(worker: UsbWorker, device: UsbDevice, timeout: Duration) -> Self {
        Self {
            device,
            worker,
            timeout,
        }
    }

    /// Run the worker loop until shutdown
    ///
    /// Processes one command at a time: receive, execute the transfer
    /// sequence, send the outcome back. Exits on a Shutdown command or once
    /// every bridge handle has been dropped.
    pub fn run(mut self) {
        info!("USB worker thread started");

        loop {
            let cmd = match self.worker.recv_command() {
                Ok(cmd) => cmd,
                Err(_) => break, // all senders gone
            };

            match cmd {
                UsbCommand::Shutdown => {
                    info!("USB worker shutting down");
                    break;
                }
                UsbCommand::Write { envelope, response } => {
                    let _ = response.send(self.relay_write(&envelope));
                }
                UsbCommand::Read { envelope, response } => {
                    let _ = response.send(self.relay_read(&envelope));
                }
            }
        }

        info!("USB worker thread stopped");
    }

    /// Relay a WRITE-role envelope: one OUT transfer of the command bytes
    fn relay_write(&mut self, envelope: &Envelope) -> Result<usize, TransferError> {
        let (request, _) = command_bytes(envelope);
        transfers::write_command(self.device.handle(), &request, self.timeout)
    }

    /// Relay a READ-role envelope: OUT request, then IN response
    ///
    /// The response transfer only happens when the request phase moved
    /// exactly the byte count the envelope asked for; anything less leaves
    /// the peer without a response for this request.
    fn relay_read(&mut self, envelope: &Envelope) -> ReadOutcome {
        let (request, requested) = command_bytes(envelope);

        match transfers::write_command(self.device.handle(), &request, self.timeout) {
            Ok(transferred) if transferred == requested => {
                match transfers::read_response(self.device.handle(), self.timeout) {
                    Ok(bytes) => ReadOutcome::Response(bytes),
                    Err(e) => ReadOutcome::ResponseFailed(e),
                }
            }
            Ok(transferred) => ReadOutcome::ShortRequest {
                requested,
                transferred,
            },
            Err(e) => {
                debug!("request-phase transfer failed: {e}");
                ReadOutcome::ShortRequest {
                    requested,
                    transferred: 0,
                }
            }
        }
    }
}

/// The bytes handed to the OUT transfer, and the requested transfer length
///
/// The envelope's `length` field is caller-supplied and may exceed the
/// fixed message block; the transfer is clamped to the block while the
/// completion check still compares against the requested length, so an
/// oversized request can never report full completion.
fn command_bytes(envelope: &Envelope) -> (Vec<u8>, usize) {
    let mut message = encode_message(&envelope.payload);
    let requested = envelope.length as usize;
    message.truncate(requested.min(message.len()));
    (message, requested)
}

/// Spawn the USB worker thread
///
/// Creates a named OS thread for USB operations and returns its join
/// handle. The thread runs until a Shutdown command is received.
pub fn spawn_usb_worker(
    worker: UsbWorker,
    device: UsbDevice,
    timeout: Duration,
) -> std::thread::JoinHandle<()> {
    std::thread::Builder::new()
        .name("usb-worker".to_string())
        .spawn(move || UsbWorkerThread::new(worker, device, timeout).run())
        .expect("Failed to spawn USB worker thread")
}

#[cfg(test)]
mod tests {
    use super::*;
    use protocol::{MESSAGE_SIZE, Message, Payload};

    #[test]
    fn test_command_bytes_clamped_to_message_block() {
        let envelope = Envelope {
            read_write: 0,
            length: 1000,
            notifications: 0,
            payload: Message::default(),
        };

        let (request, requested) = command_bytes(&envelope);
        assert_eq!(request.len(), MESSAGE_SIZE);
        assert_eq!(requested, 1000);
    }

    #[test]
    fn test_command_bytes_short_transfer_length() {
        let mut envelope = Envelope {
            read_write: 0,
            length: 11,
            notifications: 0,
            payload: Message {
                opcode: 0x31,
                payload: Payload::from_slice(&[0xAA, 0xBB]).unwrap(),
                ..Message::default()
            },
        };
        envelope.payload.protocol = protocol::MESSAGE_PROTOCOL;

        let (request, requested) = command_bytes(&envelope);
        assert_eq!(requested, 11);
        assert_eq!(request.len(), 11);
        // The slice is the prefix of the encoded message block.
        assert_eq!(&request[..2], &protocol::MESSAGE_PROTOCOL.to_le_bytes());
        assert_eq!(request[5], 0x31);
    }
}

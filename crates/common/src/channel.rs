//! Async channel bridge between the Tokio runtime and the USB worker thread
//!
//! Connection handlers run on Tokio; USB control transfers are synchronous
//! rusb calls on one dedicated thread. Handlers enqueue [`UsbCommand`]s and
//! await the per-command `oneshot` response. Because a single worker thread
//! drains the queue, the transfers behind one command never interleave with
//! another command's transfers, which is the serialization the shared
//! device requires.

use crate::error::TransferError;
use async_channel::{Receiver, Sender, bounded};
use protocol::Envelope;

/// Result of relaying a READ-role envelope to the device
#[derive(Debug)]
pub enum ReadOutcome {
    /// Request phase transferred in full; these are the bytes the device
    /// returned (possibly empty) to forward to the peer
    Response(Vec<u8>),

    /// Request phase moved fewer bytes than the envelope asked for; no
    /// response was collected and the peer gets nothing for this request
    ShortRequest { requested: usize, transferred: usize },

    /// Request phase completed but the response transfer failed; nothing
    /// is forwarded
    ResponseFailed(TransferError),
}

/// Commands from connection handlers to the USB worker thread
#[derive(Debug)]
pub enum UsbCommand {
    /// Relay a WRITE-role envelope: one OUT control transfer
    Write {
        /// Envelope to relay
        envelope: Envelope,
        /// Bytes transferred, or the transfer failure
        response: tokio::sync::oneshot::Sender<Result<usize, TransferError>>,
    },

    /// Relay a READ-role envelope: the OUT request transfer followed, on
    /// full completion, by the IN response transfer
    Read {
        /// Envelope to relay
        envelope: Envelope,
        /// Outcome of the two-phase exchange
        response: tokio::sync::oneshot::Sender<ReadOutcome>,
    },

    /// Shutdown the USB thread gracefully
    Shutdown,
}

/// Handle for the Tokio runtime (async)
#[derive(Clone)]
pub struct UsbBridge {
    cmd_tx: Sender<UsbCommand>,
}

impl UsbBridge {
    /// Send a command to the USB thread
    pub async fn send_command(&self, cmd: UsbCommand) -> crate::Result<()> {
        self.cmd_tx
            .send(cmd)
            .await
            .map_err(|e| crate::Error::Channel(e.to_string()))
    }
}

/// Handle for the USB thread (blocking)
pub struct UsbWorker {
    cmd_rx: Receiver<UsbCommand>,
}

impl UsbWorker {
    /// Receive a command from the Tokio runtime (blocking)
    ///
    /// Returns an error once every bridge handle has been dropped.
    pub fn recv_command(&self) -> crate::Result<UsbCommand> {
        self.cmd_rx
            .recv_blocking()
            .map_err(|e| crate::Error::Channel(e.to_string()))
    }
}

/// Create the channel bridge between Tokio and the USB thread
///
/// Returns (UsbBridge for Tokio, UsbWorker for the USB thread)
pub fn create_usb_bridge() -> (UsbBridge, UsbWorker) {
    let (cmd_tx, cmd_rx) = bounded(256);

    (UsbBridge { cmd_tx }, UsbWorker { cmd_rx })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_bridge() {
        let (bridge, worker) = create_usb_bridge();

        // Spawn a thread to simulate the USB worker
        let handle = std::thread::spawn(move || {
            let cmd = worker.recv_command().unwrap();
            matches!(cmd, UsbCommand::Write { .. })
        });

        // Send command from async context
        let (tx, _rx) = tokio::sync::oneshot::channel();
        bridge
            .send_command(UsbCommand::Write {
                envelope: Envelope::default(),
                response: tx,
            })
            .await
            .unwrap();

        assert!(handle.join().unwrap());
    }

    #[tokio::test]
    async fn test_recv_fails_after_bridge_dropped() {
        let (bridge, worker) = create_usb_bridge();
        drop(bridge);

        let result = worker.recv_command();
        assert!(result.is_err());
    }
}

//! Client connection handler
//!
//! Owns one accepted connection and runs the relay loop: read exactly one
//! command envelope, dispatch on its WRITE/READ role, relay it to the USB
//! worker, and on the READ path forward the device's response bytes back to
//! the peer. Requests are strictly sequential within a connection: the next
//! envelope is not read until the current dispatch has fully completed.
//!
//! Failure policy per request:
//! - clean close (EOF before an envelope) ends the loop without error
//! - a short read or decode failure ends the loop with an error; the
//!   connection is not kept alive after a malformed message
//! - a failed WRITE transfer is logged and the loop continues
//! - a READ whose request phase moved the wrong byte count is skipped
//!   without a response; the peer detects the non-response by timeout
//! - a failed READ response transfer is logged and forwards nothing

use anyhow::{Context, Result};
use common::{ReadOutcome, UsbBridge, UsbCommand};
use protocol::{Envelope, Role, read_envelope};
use std::net::SocketAddr;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tracing::{debug, error, info};

/// Per-connection relay handler
pub struct ClientConnection {
    stream: TcpStream,
    peer: SocketAddr,
    usb_bridge: UsbBridge,
}

impl ClientConnection {
    /// Create a handler for one accepted connection
    pub fn new(stream: TcpStream, peer: SocketAddr, usb_bridge: UsbBridge) -> Self {
        Self {
            stream,
            peer,
            usb_bridge,
        }
    }

    /// Run the relay loop until the peer closes or an error ends it
    pub async fn run(&mut self) -> Result<()> {
        loop {
            let envelope = match read_envelope(&mut self.stream).await {
                Ok(Some(envelope)) => envelope,
                Ok(None) => {
                    info!("Ending connection from {}", self.peer);
                    return Ok(());
                }
                Err(e) => {
                    return Err(e).context("reading command message");
                }
            };

            self.dispatch(envelope).await?;
        }
    }

    /// Relay one envelope and, on the READ path, respond to the peer
    async fn dispatch(&mut self, envelope: Envelope) -> Result<()> {
        match envelope.role() {
            Role::Write => {
                let (tx, rx) = oneshot::channel();
                self.usb_bridge
                    .send_command(UsbCommand::Write {
                        envelope,
                        response: tx,
                    })
                    .await
                    .context("USB worker unavailable")?;

                match rx.await.context("USB worker dropped the request")? {
                    Ok(written) => debug!("Relayed {written} bytes to device"),
                    // A failed write does not end the session; the peer
                    // decides whether to resubmit.
                    Err(e) => error!("USB write error: {e}"),
                }
            }
            Role::Read => {
                let (tx, rx) = oneshot::channel();
                self.usb_bridge
                    .send_command(UsbCommand::Read {
                        envelope,
                        response: tx,
                    })
                    .await
                    .context("USB worker unavailable")?;

                match rx.await.context("USB worker dropped the request")? {
                    ReadOutcome::Response(bytes) => {
                        debug!("Forwarding {} response bytes to {}", bytes.len(), self.peer);
                        self.stream
                            .write_all(&bytes)
                            .await
                            .context("writing response to peer")?;
                    }
                    ReadOutcome::ShortRequest { .. } => {
                        // No response for this request; the peer times out
                        // and resubmits if it cares.
                    }
                    ReadOutcome::ResponseFailed(e) => error!("USB read error: {e}"),
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{TransferError, UsbWorker, create_usb_bridge};
    use protocol::{ENVELOPE_SIZE, ROLE_READ, ROLE_WRITE, encode_envelope};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    fn envelope(role: u8, length: u16) -> Envelope {
        Envelope {
            read_write: role,
            length,
            ..Envelope::default()
        }
    }

    /// Accept one connection and run its handler to completion
    async fn serve_one(
        usb_bridge: UsbBridge,
    ) -> (SocketAddr, JoinHandle<Result<()>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (stream, peer) = listener.accept().await?;
            ClientConnection::new(stream, peer, usb_bridge).run().await
        });
        (addr, handle)
    }

    /// Drive the worker side of the bridge with a scripted responder
    fn scripted_worker<F>(worker: UsbWorker, mut script: F) -> std::thread::JoinHandle<usize>
    where
        F: FnMut(usize, UsbCommand) + Send + 'static,
    {
        std::thread::spawn(move || {
            let mut handled = 0;
            while let Ok(cmd) = worker.recv_command() {
                if matches!(cmd, UsbCommand::Shutdown) {
                    break;
                }
                script(handled, cmd);
                handled += 1;
            }
            handled
        })
    }

    #[tokio::test]
    async fn write_failure_keeps_connection_open() {
        let (bridge, worker) = create_usb_bridge();
        let worker_thread = scripted_worker(worker, |i, cmd| match cmd {
            UsbCommand::Write { response, .. } => {
                // First transfer fails, second succeeds; neither may end
                // the connection.
                let result = if i == 0 {
                    Err(TransferError::Io)
                } else {
                    Ok(9)
                };
                let _ = response.send(result);
            }
            other => panic!("expected Write command, got {:?}", other),
        });

        let (addr, handler) = serve_one(bridge).await;
        let mut client = TcpStream::connect(addr).await.unwrap();

        client
            .write_all(&encode_envelope(&envelope(ROLE_WRITE, 9)))
            .await
            .unwrap();
        client
            .write_all(&encode_envelope(&envelope(ROLE_WRITE, 9)))
            .await
            .unwrap();
        drop(client);

        assert!(handler.await.unwrap().is_ok());
        assert_eq!(worker_thread.join().unwrap(), 2);
    }

    #[tokio::test]
    async fn read_forwards_exact_device_bytes() {
        // End-to-end: readWrite=1, length=4, request phase reports 4 bytes
        // moved, device returns [0x00, 0x05, 0x00, 0x00]. The peer must
        // receive exactly those 4 bytes and no more.
        let (bridge, worker) = create_usb_bridge();
        let worker_thread = scripted_worker(worker, |_, cmd| match cmd {
            UsbCommand::Read { envelope, response } => {
                assert_eq!(envelope.length, 4);
                let _ = response.send(ReadOutcome::Response(vec![0x00, 0x05, 0x00, 0x00]));
            }
            other => panic!("expected Read command, got {:?}", other),
        });

        let (addr, handler) = serve_one(bridge).await;
        let mut client = TcpStream::connect(addr).await.unwrap();

        client
            .write_all(&encode_envelope(&envelope(ROLE_READ, 4)))
            .await
            .unwrap();

        let mut response = [0u8; 4];
        client.read_exact(&mut response).await.unwrap();
        assert_eq!(response, [0x00, 0x05, 0x00, 0x00]);

        // Half-close our side; the handler must see a clean EOF with no
        // extra response bytes in between.
        client.shutdown().await.unwrap();
        let trailing = client.read(&mut [0u8; 16]).await.unwrap();
        assert_eq!(trailing, 0);

        assert!(handler.await.unwrap().is_ok());
        assert_eq!(worker_thread.join().unwrap(), 1);
    }

    #[tokio::test]
    async fn short_request_phase_sends_nothing() {
        let (bridge, worker) = create_usb_bridge();
        let worker_thread = scripted_worker(worker, |_, cmd| match cmd {
            UsbCommand::Read { envelope, response } => {
                let _ = response.send(ReadOutcome::ShortRequest {
                    requested: envelope.length as usize,
                    transferred: 2,
                });
            }
            other => panic!("expected Read command, got {:?}", other),
        });

        let (addr, handler) = serve_one(bridge).await;
        let mut client = TcpStream::connect(addr).await.unwrap();

        client
            .write_all(&encode_envelope(&envelope(ROLE_READ, 9)))
            .await
            .unwrap();
        client.shutdown().await.unwrap();

        // The connection closes with zero response bytes ever sent.
        let n = client.read(&mut [0u8; 16]).await.unwrap();
        assert_eq!(n, 0);

        assert!(handler.await.unwrap().is_ok());
        assert_eq!(worker_thread.join().unwrap(), 1);
    }

    #[tokio::test]
    async fn failed_response_phase_forwards_zero_bytes() {
        let (bridge, worker) = create_usb_bridge();
        let worker_thread = scripted_worker(worker, |_, cmd| match cmd {
            UsbCommand::Read { response, .. } => {
                let _ = response.send(ReadOutcome::ResponseFailed(TransferError::Timeout));
            }
            other => panic!("expected Read command, got {:?}", other),
        });

        let (addr, handler) = serve_one(bridge).await;
        let mut client = TcpStream::connect(addr).await.unwrap();

        client
            .write_all(&encode_envelope(&envelope(ROLE_READ, 9)))
            .await
            .unwrap();
        client.shutdown().await.unwrap();

        let n = client.read(&mut [0u8; 16]).await.unwrap();
        assert_eq!(n, 0);

        assert!(handler.await.unwrap().is_ok());
        assert_eq!(worker_thread.join().unwrap(), 1);
    }

    #[tokio::test]
    async fn clean_close_ends_loop_without_error() {
        let (bridge, worker) = create_usb_bridge();
        let worker_thread = scripted_worker(worker, |_, _| panic!("no commands expected"));

        let (addr, handler) = serve_one(bridge.clone()).await;
        let client = TcpStream::connect(addr).await.unwrap();
        drop(client);

        assert!(handler.await.unwrap().is_ok());

        drop(bridge);
        assert_eq!(worker_thread.join().unwrap(), 0);
    }

    #[tokio::test]
    async fn partial_envelope_ends_loop_with_error() {
        let (bridge, worker) = create_usb_bridge();
        let worker_thread = scripted_worker(worker, |_, _| panic!("no commands expected"));

        let (addr, handler) = serve_one(bridge.clone()).await;
        let mut client = TcpStream::connect(addr).await.unwrap();

        // Half an envelope, then close: a partial message, not "more data
        // coming".
        client.write_all(&[0u8; 100]).await.unwrap();
        drop(client);

        assert!(handler.await.unwrap().is_err());

        drop(bridge);
        assert_eq!(worker_thread.join().unwrap(), 0);
    }

    #[tokio::test]
    async fn oversized_payload_length_closes_connection() {
        let (bridge, worker) = create_usb_bridge();
        let worker_thread = scripted_worker(worker, |_, _| panic!("no commands expected"));

        let (addr, handler) = serve_one(bridge.clone()).await;
        let mut client = TcpStream::connect(addr).await.unwrap();

        let mut frame = encode_envelope(&envelope(ROLE_WRITE, 9));
        assert_eq!(frame.len(), ENVELOPE_SIZE);
        frame[14..16].copy_from_slice(&301u16.to_le_bytes());
        client.write_all(&frame).await.unwrap();

        assert!(handler.await.unwrap().is_err());

        drop(bridge);
        assert_eq!(worker_thread.join().unwrap(), 0);
    }

    #[tokio::test]
    async fn concurrent_connections_never_interleave_commands() {
        // Two connections share the worker; each command must be fully
        // handled before the next one starts, whatever the arrival order.
        let (bridge, worker) = create_usb_bridge();
        let log: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let worker_log = log.clone();

        let worker_thread = scripted_worker(worker, move |_, cmd| match cmd {
            UsbCommand::Read { envelope, response } => {
                let id = envelope.payload.opcode;
                worker_log.lock().unwrap().push(format!("start {id}"));
                std::thread::sleep(Duration::from_millis(20));
                worker_log.lock().unwrap().push(format!("end {id}"));
                let _ = response.send(ReadOutcome::Response(vec![id]));
            }
            other => panic!("expected Read command, got {:?}", other),
        });

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let accept_bridge = bridge.clone();
        let server = tokio::spawn(async move {
            for _ in 0..2 {
                let (stream, peer) = listener.accept().await.unwrap();
                let usb_bridge = accept_bridge.clone();
                tokio::spawn(async move {
                    let _ = ClientConnection::new(stream, peer, usb_bridge).run().await;
                });
            }
        });

        let mut clients = Vec::new();
        for id in [1u8, 2u8] {
            let mut request = envelope(ROLE_READ, 9);
            request.payload.opcode = id;
            let mut client = TcpStream::connect(addr).await.unwrap();
            client
                .write_all(&encode_envelope(&request))
                .await
                .unwrap();
            clients.push(client);
        }

        for client in &mut clients {
            let mut response = [0u8; 1];
            client.read_exact(&mut response).await.unwrap();
        }
        server.await.unwrap();
        drop(clients);

        // Stop the worker explicitly; the connection tasks may still hold
        // bridge clones at this point.
        bridge.send_command(UsbCommand::Shutdown).await.unwrap();
        assert_eq!(worker_thread.join().unwrap(), 2);

        // Every start is immediately followed by its own end.
        let log = log.lock().unwrap();
        assert_eq!(log.len(), 4);
        for pair in log.chunks(2) {
            let id_start = pair[0].strip_prefix("start ").expect("start entry");
            let id_end = pair[1].strip_prefix("end ").expect("end entry");
            assert_eq!(id_start, id_end);
        }
    }

    #[tokio::test]
    async fn requests_on_one_connection_processed_in_order() {
        let (bridge, worker) = create_usb_bridge();
        let worker_thread = scripted_worker(worker, |_, cmd| match cmd {
            UsbCommand::Read { envelope, response } => {
                let _ = response.send(ReadOutcome::Response(vec![envelope.payload.opcode]));
            }
            other => panic!("expected Read command, got {:?}", other),
        });

        let (addr, handler) = serve_one(bridge).await;
        let mut client = TcpStream::connect(addr).await.unwrap();

        for id in [10u8, 20, 30] {
            let mut request = envelope(ROLE_READ, 9);
            request.payload.opcode = id;
            client
                .write_all(&encode_envelope(&request))
                .await
                .unwrap();
        }

        let mut responses = [0u8; 3];
        client.read_exact(&mut responses).await.unwrap();
        assert_eq!(responses, [10, 20, 30]);

        drop(client);
        assert!(handler.await.unwrap().is_ok());
        assert_eq!(worker_thread.join().unwrap(), 3);
    }
}

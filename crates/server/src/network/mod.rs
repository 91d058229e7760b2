//! Network subsystem
//!
//! TCP listener and per-connection command relay.
//!
//! # Architecture
//!
//! ```text
//! BridgeServer
//!   ├─> accept TCP connections
//!   └─> spawn ClientConnection per peer
//!         ├─> read fixed-size envelopes off the socket
//!         ├─> dispatch on the WRITE/READ role
//!         ├─> relay to the USB worker via UsbBridge
//!         └─> forward READ responses back to the peer
//! ```

pub mod connection;
pub mod server;

// Re-export public types
pub use connection::ClientConnection;
pub use server::BridgeServer;

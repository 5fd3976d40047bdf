//! Transport layer for fingerprint sensor modules
//!
//! Provides the byte stream the protocol engine runs over: a real serial
//! port and an in-memory pair for tests and simulations.

pub mod error;
pub mod memory;
pub mod serial;

pub use error::{Error, Result};
pub use memory::{MemoryPeer, MemoryTransport};
pub use serial::{available_ports, SerialTransport};

use async_trait::async_trait;
use bytes::BytesMut;

/// Byte stream to a sensor
#[async_trait]
pub trait Transport: Send {
    /// Open the port
    async fn open(&mut self) -> Result<()>;

    /// Close the port
    async fn close(&mut self) -> Result<()>;

    /// Check if open
    fn is_open(&self) -> bool;

    /// Write raw bytes
    async fn send(&mut self, data: &[u8]) -> Result<()>;

    /// Wait for the next chunk of received bytes
    ///
    /// Must be cancel-safe: dropping the future before it resolves loses no
    /// data. Returns [`Error::ConnectionClosed`] once the port has gone away.
    async fn receive(&mut self) -> Result<BytesMut>;

    /// Port name, for logging
    fn port_name(&self) -> String;
}

//! In-memory transport
//!
//! [`MemoryTransport::pair`] returns a transport plus the [`MemoryPeer`]
//! holding the other end of the wire. Whatever the transport sends shows up
//! at the peer and whatever the peer writes is received by the transport.
//! Used to simulate a sensor in tests and demos.

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::{error::*, Transport};

/// Transport end of an in-memory wire
pub struct MemoryTransport {
    name: String,
    open: bool,
    inbound: mpsc::UnboundedReceiver<Bytes>,
    outbound: mpsc::UnboundedSender<Bytes>,
}

/// Sensor end of an in-memory wire
pub struct MemoryPeer {
    to_transport: Option<mpsc::UnboundedSender<Bytes>>,
    from_transport: mpsc::UnboundedReceiver<Bytes>,
}

impl MemoryTransport {
    /// Create a connected transport/peer pair
    pub fn pair(name: impl Into<String>) -> (Self, MemoryPeer) {
        let (to_transport, inbound) = mpsc::unbounded_channel();
        let (outbound, from_transport) = mpsc::unbounded_channel();

        let transport = Self {
            name: name.into(),
            open: false,
            inbound,
            outbound,
        };
        let peer = MemoryPeer {
            to_transport: Some(to_transport),
            from_transport,
        };

        (transport, peer)
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn open(&mut self) -> Result<()> {
        if self.open {
            return Err(Error::AlreadyOpen);
        }
        if self.outbound.is_closed() {
            return Err(Error::ConnectionClosed);
        }

        debug!("Opened {}", self.name);
        self.open = true;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        if self.open {
            debug!("Closing {}...", self.name);
        }
        self.open = false;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open
    }

    async fn send(&mut self, data: &[u8]) -> Result<()> {
        if !self.open {
            return Err(Error::NotOpen);
        }

        trace!("Sending {} bytes: {}", data.len(), hex::encode(data));

        self.outbound
            .send(Bytes::copy_from_slice(data))
            .map_err(|_| Error::ConnectionClosed)
    }

    async fn receive(&mut self) -> Result<BytesMut> {
        if !self.open {
            return Err(Error::NotOpen);
        }

        match self.inbound.recv().await {
            Some(bytes) => Ok(BytesMut::from(&bytes[..])),
            None => {
                debug!("{} hung up", self.name);
                self.open = false;
                Err(Error::ConnectionClosed)
            }
        }
    }

    fn port_name(&self) -> String {
        self.name.clone()
    }
}

impl MemoryPeer {
    /// Deliver bytes to the transport; `false` once the transport is gone
    pub fn write(&self, data: impl Into<Bytes>) -> bool {
        match &self.to_transport {
            Some(tx) => tx.send(data.into()).is_ok(),
            None => false,
        }
    }

    /// Wait for the next write made by the transport
    pub async fn read(&mut self) -> Option<Bytes> {
        self.from_transport.recv().await
    }

    /// Next write made by the transport, if one is already queued
    pub fn try_read(&mut self) -> Option<Bytes> {
        self.from_transport.try_recv().ok()
    }

    /// Simulate unplugging the device
    pub fn hang_up(&mut self) {
        self.to_transport = None;
    }
}

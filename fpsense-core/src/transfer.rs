//! Bulk data transfers (image and template upload/download)
//!
//! An inbound transfer accumulates DataChunk payloads until EndOfData.
//! An outbound transfer slices a buffer into fixed-size chunks.

use bytes::{Bytes, BytesMut};
use tracing::debug;

use crate::constants::IMAGE_SIZE;
use crate::error::Error;

/// Progress of a bulk transfer
#[derive(Debug, Clone, PartialEq)]
pub struct Progress {
    /// Bytes transferred so far
    pub current: usize,

    /// Expected total size
    pub size: usize,

    /// `current / size`
    pub fraction: f64,

    /// Bytes transferred by the frame that produced this update
    pub new_data: Bytes,
}

impl Progress {
    fn new(current: usize, size: usize, new_data: Bytes) -> Self {
        let fraction = if size == 0 {
            1.0
        } else {
            current as f64 / size as f64
        };

        Self {
            current,
            size,
            fraction,
            new_data,
        }
    }

    pub fn percent(&self) -> f64 {
        self.fraction * 100.0
    }
}

/// Observer of an inbound transfer
///
/// Callbacks run on the protocol engine's task and must not block.
pub trait ReceiveHandler: Send {
    /// A data packet was accepted
    fn on_progress(&mut self, _progress: &Progress) {}

    /// The transfer was aborted
    fn on_error(&mut self, _error: Error) {}

    /// EndOfData was accepted; `data` holds every byte in arrival order
    fn on_finish(&mut self, data: Bytes);
}

/// Observer of an outbound transfer
pub trait SendHandler: Send {
    /// A DataChunk was written
    fn on_progress(&mut self, _progress: &Progress) {}

    /// The EndOfData packet was written
    fn on_finish(&mut self) {}
}

/// Send handler that ignores every notification
#[derive(Debug, Default, Clone, Copy)]
pub struct Silent;

impl SendHandler for Silent {}

impl ReceiveHandler for Silent {
    fn on_finish(&mut self, _data: Bytes) {}
}

/// Transfer requested alongside a command
pub enum TransferMode {
    /// Plain request/response
    None,

    /// Acknowledge is followed by DataChunk..EndOfData from the sensor
    Receive {
        expected_size: usize,
        handler: Box<dyn ReceiveHandler>,
    },

    /// Acknowledge triggers streaming `data` to the sensor
    Send {
        data: Bytes,
        chunk_size: usize,
        handler: Box<dyn SendHandler>,
    },
}

impl TransferMode {
    pub fn receive(expected_size: usize, handler: impl ReceiveHandler + 'static) -> Self {
        Self::Receive {
            expected_size,
            handler: Box::new(handler),
        }
    }

    pub fn send(
        data: impl Into<Bytes>,
        chunk_size: usize,
        handler: impl SendHandler + 'static,
    ) -> Self {
        Self::Send {
            data: data.into(),
            chunk_size,
            handler: Box::new(handler),
        }
    }
}

impl std::fmt::Debug for TransferMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "None"),
            Self::Receive { expected_size, .. } => {
                write!(f, "Receive {{ expected_size: {} }}", expected_size)
            }
            Self::Send {
                data, chunk_size, ..
            } => write!(f, "Send {{ len: {}, chunk_size: {} }}", data.len(), chunk_size),
        }
    }
}

/// Transfer state while data streams in from the sensor
pub struct InboundTransfer {
    expected_size: usize,
    accumulated: BytesMut,
    has_errored: bool,
    handler: Box<dyn ReceiveHandler>,
}

impl InboundTransfer {
    pub fn new(expected_size: usize, handler: Box<dyn ReceiveHandler>) -> Self {
        Self {
            expected_size,
            // Grows past this as chunks arrive
            accumulated: BytesMut::with_capacity(expected_size.min(IMAGE_SIZE)),
            has_errored: false,
            handler,
        }
    }

    /// Append an accepted packet's payload and notify progress
    pub fn append(&mut self, data: Bytes) {
        self.accumulated.extend_from_slice(&data);

        let progress = Progress::new(self.accumulated.len(), self.expected_size, data);
        self.handler.on_progress(&progress);
    }

    /// Hand the accumulated buffer to the handler
    pub fn finish(mut self) {
        debug!(
            received = self.accumulated.len(),
            expected = self.expected_size,
            "Inbound transfer finished"
        );

        let data = std::mem::take(&mut self.accumulated).freeze();
        self.handler.on_finish(data);
    }

    /// Report an error; only the first one reaches the handler
    pub fn fail(&mut self, error: Error) {
        if self.has_errored {
            return;
        }
        self.has_errored = true;
        self.handler.on_error(error);
    }

    pub fn received(&self) -> usize {
        self.accumulated.len()
    }

    pub fn expected_size(&self) -> usize {
        self.expected_size
    }

    pub fn has_errored(&self) -> bool {
        self.has_errored
    }
}

/// A slice of an outbound transfer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub data: Bytes,
    /// Goes out as EndOfData rather than DataChunk
    pub last: bool,
}

/// Transfer state while data streams out to the sensor
pub struct OutboundTransfer {
    remaining: Bytes,
    chunk_size: usize,
    total: usize,
    done: bool,
    handler: Box<dyn SendHandler>,
}

impl OutboundTransfer {
    pub fn new(data: Bytes, chunk_size: usize, handler: Box<dyn SendHandler>) -> Self {
        Self {
            total: data.len(),
            remaining: data,
            chunk_size: chunk_size.max(1),
            done: false,
            handler,
        }
    }

    /// Next chunk to put on the wire, `None` once EndOfData went out
    ///
    /// DataChunk packets carry exactly `chunk_size` bytes; the final
    /// EndOfData carries the remainder, which may be empty.
    pub fn next_chunk(&mut self) -> Option<Chunk> {
        if self.done {
            return None;
        }

        if self.remaining.len() > self.chunk_size {
            let data = self.remaining.split_to(self.chunk_size);
            return Some(Chunk { data, last: false });
        }

        self.done = true;
        Some(Chunk {
            data: std::mem::take(&mut self.remaining),
            last: true,
        })
    }

    /// Notify the handler that `chunk` was written
    pub fn sent(&mut self, chunk: &Chunk) {
        if chunk.last {
            debug!(total = self.total, "Outbound transfer finished");
            self.handler.on_finish();
        } else {
            let current = self.total - self.remaining.len();
            let progress = Progress::new(current, self.total, chunk.data.clone());
            self.handler.on_progress(&progress);
        }
    }
}

//! Channel-backed transfer observer
//!
//! Turns [`ReceiveHandler`]/[`SendHandler`] callbacks into a stream the
//! caller can await.
//!
//! ```no_run
//! # async fn demo(sensor: fpsense::Sensor) -> fpsense::Result<()> {
//! use fpsense::{TransferEvent, TransferReceiver};
//!
//! let (observer, mut events) = TransferReceiver::channel();
//! sensor.up_image(observer).await?;
//!
//! while let Some(event) = events.next().await {
//!     match event {
//!         TransferEvent::Progress(p) => println!("{:.0}%", p.percent()),
//!         TransferEvent::Received(image) => println!("{} bytes", image.len()),
//!         _ => {}
//!     }
//! }
//! # Ok(())
//! # }
//! ```

use bytes::Bytes;
use fpsense_core::{Progress, ReceiveHandler, SendHandler};
use tokio::sync::mpsc;

use crate::error::{Error, Result};

/// Transfer notification
#[derive(Debug)]
pub enum TransferEvent {
    Progress(Progress),
    /// Inbound transfer complete
    Received(Bytes),
    /// Outbound transfer complete
    Sent,
    Failed(fpsense_core::Error),
}

/// Handler half, passed to the transfer methods of [`Sensor`](crate::Sensor)
#[derive(Debug, Clone)]
pub struct TransferObserver {
    tx: mpsc::UnboundedSender<TransferEvent>,
}

/// Receiving half
#[derive(Debug)]
pub struct TransferReceiver {
    rx: mpsc::UnboundedReceiver<TransferEvent>,
}

impl TransferReceiver {
    pub fn channel() -> (TransferObserver, TransferReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (TransferObserver { tx }, TransferReceiver { rx })
    }

    /// Next notification; `None` once the transfer is over
    pub async fn next(&mut self) -> Option<TransferEvent> {
        self.rx.recv().await
    }

    /// Skip progress updates and wait for the inbound data
    pub async fn received(mut self) -> Result<Bytes> {
        loop {
            match self.rx.recv().await {
                Some(TransferEvent::Progress(_)) | Some(TransferEvent::Sent) => continue,
                Some(TransferEvent::Received(data)) => return Ok(data),
                Some(TransferEvent::Failed(error)) => return Err(error.into()),
                None => return Err(Error::ActorStopped),
            }
        }
    }

    /// Wait for an outbound transfer to finish
    pub async fn sent(mut self) -> Result<()> {
        loop {
            match self.rx.recv().await {
                Some(TransferEvent::Progress(_)) | Some(TransferEvent::Received(_)) => continue,
                Some(TransferEvent::Sent) => return Ok(()),
                Some(TransferEvent::Failed(error)) => return Err(error.into()),
                None => return Err(Error::ActorStopped),
            }
        }
    }
}

impl TransferObserver {
    fn notify(&self, event: TransferEvent) {
        // The caller may have stopped listening
        let _ = self.tx.send(event);
    }
}

impl ReceiveHandler for TransferObserver {
    fn on_progress(&mut self, progress: &Progress) {
        self.notify(TransferEvent::Progress(progress.clone()));
    }

    fn on_error(&mut self, error: fpsense_core::Error) {
        self.notify(TransferEvent::Failed(error));
    }

    fn on_finish(&mut self, data: Bytes) {
        self.notify(TransferEvent::Received(data));
    }
}

impl SendHandler for TransferObserver {
    fn on_progress(&mut self, progress: &Progress) {
        self.notify(TransferEvent::Progress(progress.clone()));
    }

    fn on_finish(&mut self) {
        self.notify(TransferEvent::Sent);
    }
}

//! # fpsense
//!
//! Driver for serial fingerprint sensor modules (R30x/ZFM family protocol).
//!
//! ## Features
//!
//! - Async/await API using Tokio
//! - Requests queued and answered strictly in order, one on the wire at a time
//! - Image and template transfers with progress reporting
//! - Typed results for every supported instruction
//!
//! ## Quick Start
//!
//! ```no_run
//! use fpsense::{Sensor, SensorConfig};
//!
//! #[tokio::main]
//! async fn main() -> fpsense::Result<()> {
//!     let sensor = Sensor::open(SensorConfig::new("/dev/ttyUSB0")).await?;
//!     sensor.ready().await?;
//!
//!     sensor.handshake().await?;
//!     println!("{} templates stored", sensor.template_count().await?);
//!
//!     sensor.close().await?;
//!     Ok(())
//! }
//! ```

mod actor;
pub mod config;
pub mod error;
pub mod events;
pub mod sensor;
pub mod transfer;

// Re-exports
pub use config::SensorConfig;
pub use error::{Error, Result};
pub use events::{EventKind, PortState, SensorEvent};
pub use sensor::Sensor;
pub use transfer::{TransferEvent, TransferObserver, TransferReceiver};

// Re-export protocol types
pub use fpsense_core::{
    Acknowledge, ConfirmationCode, Instruction, Progress, ReceiveHandler, SendHandler, Silent,
    TransferMode,
};
pub use fpsense_transport::{MemoryPeer, MemoryTransport, SerialTransport, Transport};
pub use fpsense_types::{
    BaudRate, CharBuffer, LedColor, LedMode, PacketLength, SearchResult, SecurityLevel,
    StatusRegister, SystemParameters,
};

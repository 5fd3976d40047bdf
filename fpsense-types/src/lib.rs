//! Type definitions for fpsense
//!
//! Sensor settings and the decoded results of typed requests.

pub mod decode;
pub mod error;
pub mod led;
pub mod search;
pub mod settings;
pub mod system;

pub use error::{Error, Result};
pub use led::{LedColor, LedMode};
pub use search::{template_indexes, CharBuffer, SearchResult};
pub use settings::{BaudRate, PacketLength, SecurityLevel};
pub use system::{StatusRegister, SystemParameters};

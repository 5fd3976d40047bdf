//! Error types for fpsense-core

use crate::confirmation::ConfirmationCode;

/// Result type alias for fpsense operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core protocol errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No valid response within the configured window
    #[error("Timeout waiting for response after {millis}ms")]
    Timeout {
        millis: u64,
    },

    /// The timer expired while the port was not open
    #[error("Serial port is not open")]
    PortNotOpen,

    /// The port closed while this request or transfer was active
    #[error("Serial port closed during the exchange")]
    PortClosed,

    /// The port closed before this request was transmitted
    #[error("Request was never sent: serial port closed")]
    NotSent,

    /// Wrong packet identifier or address prefix
    #[error("Corrupted packet: {reason}")]
    CorruptedPacket {
        reason: String,
    },

    /// Checksum verification failed
    #[error("Checksum mismatch: expected 0x{expected:04X}, received 0x{received:04X}")]
    ChecksumMismatch {
        expected: u16,
        received: u16,
    },

    /// Sensor answered with a non-OK confirmation code
    #[error("Device returned 0x{:02X}: {}", .0.code(), .0.reason())]
    Device(ConfirmationCode),

    /// Unknown instruction code
    #[error("Unknown instruction code: 0x{0:02X}")]
    UnknownInstruction(u8),

    /// Payload does not fit the 16-bit length field
    #[error("Payload too large: {size} bytes (max: {max} bytes)")]
    PayloadTooLarge {
        size: usize,
        max: usize,
    },

    /// Argument rejected before anything was queued
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl Error {
    pub(crate) fn corrupted(reason: impl Into<String>) -> Self {
        Self::CorruptedPacket {
            reason: reason.into(),
        }
    }

    /// Check if error is recoverable (re-issuing the request might succeed)
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. }
                | Self::CorruptedPacket { .. }
                | Self::ChecksumMismatch { .. }
                | Self::Device(_)
        )
    }

    /// Check if error requires reopening the port
    pub fn requires_reopen(&self) -> bool {
        matches!(self, Self::PortNotOpen | Self::PortClosed | Self::NotSent)
    }

    /// Confirmation code carried by a device-level failure
    pub fn confirmation_code(&self) -> Option<ConfirmationCode> {
        match self {
            Self::Device(code) => Some(*code),
            _ => None,
        }
    }
}

//! High-level error types

use fpsense_core::ConfirmationCode;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Core protocol error: {0}")]
    Core(#[from] fpsense_core::Error),

    #[error("Transport error: {0}")]
    Transport(#[from] fpsense_transport::Error),

    #[error("Type error: {0}")]
    Types(#[from] fpsense_types::Error),

    /// The sensor task is gone; every handle was dropped or it panicked
    #[error("Sensor task stopped")]
    ActorStopped,

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl Error {
    /// Check if error is recoverable (retrying the request might succeed)
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Core(e) => e.is_recoverable(),
            _ => false,
        }
    }

    /// Check if error requires reopening the sensor
    pub fn requires_reopen(&self) -> bool {
        match self {
            Self::Core(e) => e.requires_reopen(),
            Self::Transport(e) => e.is_disconnect(),
            Self::ActorStopped => true,
            _ => false,
        }
    }

    /// Confirmation code of a device-level failure
    pub fn confirmation_code(&self) -> Option<ConfirmationCode> {
        match self {
            Self::Core(e) => e.confirmation_code(),
            _ => None,
        }
    }
}

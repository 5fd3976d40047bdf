//! Transport errors

use std::io;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Port is not open")]
    NotOpen,

    #[error("Port is already open")]
    AlreadyOpen,

    #[error("Failed to open serial port: {0}")]
    Open(#[from] serialport::Error),

    #[error("Port closed")]
    ConnectionClosed,

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid port: {0}")]
    InvalidPort(String),
}

impl Error {
    /// The port is gone and further I/O will not succeed
    pub fn is_disconnect(&self) -> bool {
        matches!(self, Self::NotOpen | Self::ConnectionClosed)
    }
}

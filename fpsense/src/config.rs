//! Sensor configuration

use std::time::Duration;

use fpsense_core::constants::{
    DEFAULT_ADDRESS, DEFAULT_PASSWORD, DEFAULT_TIMEOUT_MS, SETTLE_DELAY_MS,
};
use fpsense_types::{BaudRate, PacketLength};

/// Connection settings for a [`Sensor`](crate::Sensor)
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use fpsense::SensorConfig;
///
/// let config = SensorConfig::new("/dev/ttyUSB0")
///     .with_password(0x1234)
///     .with_timeout(Duration::from_millis(2000));
///
/// assert_eq!(config.address, 0xFFFF_FFFF);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensorConfig {
    /// Serial port path
    pub port: String,

    pub baud_rate: BaudRate,

    /// Device address
    pub address: u32,

    /// Handshake password used by `verify_password`
    pub password: u32,

    /// Response timeout, restarted by every accepted packet
    pub timeout: Duration,

    /// Delay between the port opening and the Ready event
    pub settle_delay: Duration,

    /// Chunk size for outbound transfers
    pub packet_length: PacketLength,
}

impl SensorConfig {
    pub fn new(port: impl Into<String>) -> Self {
        Self {
            port: port.into(),
            baud_rate: BaudRate::default(),
            address: DEFAULT_ADDRESS,
            password: DEFAULT_PASSWORD,
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            settle_delay: Duration::from_millis(SETTLE_DELAY_MS),
            packet_length: PacketLength::default(),
        }
    }

    /// Set baud rate
    pub fn with_baud_rate(mut self, baud_rate: BaudRate) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    /// Set device address
    pub fn with_address(mut self, address: u32) -> Self {
        self.address = address;
        self
    }

    /// Set handshake password (default: 0)
    pub fn with_password(mut self, password: u32) -> Self {
        self.password = password;
        self
    }

    /// Set response timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set settle delay
    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    /// Set outbound data packet length
    pub fn with_packet_length(mut self, length: PacketLength) -> Self {
        self.packet_length = length;
        self
    }
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self::new("/dev/ttyUSB0")
    }
}

//! Configurable sensor settings

use std::fmt;

use crate::error::{Error, Result};

/// Serial baud rate, always a multiple of 9600
///
/// # Examples
///
/// ```
/// use fpsense_types::BaudRate;
///
/// let baud = BaudRate::new(57_600).unwrap();
/// assert_eq!(baud.code(), 6);
/// assert!(BaudRate::new(57_601).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BaudRate(u8);

impl BaudRate {
    /// Baud rate step
    pub const UNIT: u32 = 9600;

    pub const B9600: Self = Self(1);
    pub const B19200: Self = Self(2);
    pub const B38400: Self = Self(4);
    pub const B57600: Self = Self(6);
    pub const B115200: Self = Self(12);

    /// Validate a rate in bits per second
    pub fn new(bits_per_second: u32) -> Result<Self> {
        if bits_per_second % Self::UNIT != 0 {
            return Err(Error::Validation(format!(
                "baud rate {} is not a multiple of {}",
                bits_per_second,
                Self::UNIT
            )));
        }
        let code = u16::try_from(bits_per_second / Self::UNIT).unwrap_or(u16::MAX);
        Self::from_code(code)
    }

    /// Decode the multiplier stored by the sensor
    pub fn from_code(code: u16) -> Result<Self> {
        match code {
            1..=12 => Ok(Self(code as u8)),
            _ => Err(Error::Validation(format!(
                "baud rate multiplier {} outside 1..=12",
                code
            ))),
        }
    }

    /// Multiplier written with SET_SYSPARA
    pub fn code(self) -> u8 {
        self.0
    }

    pub fn bits_per_second(self) -> u32 {
        self.0 as u32 * Self::UNIT
    }
}

impl Default for BaudRate {
    fn default() -> Self {
        Self::B57600
    }
}

impl fmt::Display for BaudRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} baud", self.bits_per_second())
    }
}

/// Matching threshold, from most to least permissive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[repr(u8)]
pub enum SecurityLevel {
    VeryLow = 1,
    Low = 2,
    #[default]
    Medium = 3,
    High = 4,
    VeryHigh = 5,
}

impl SecurityLevel {
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::VeryLow => "very low",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::VeryHigh => "very high",
        }
    }
}

impl TryFrom<u16> for SecurityLevel {
    type Error = Error;

    fn try_from(code: u16) -> Result<Self> {
        match code {
            1 => Ok(Self::VeryLow),
            2 => Ok(Self::Low),
            3 => Ok(Self::Medium),
            4 => Ok(Self::High),
            5 => Ok(Self::VeryHigh),
            _ => Err(Error::Validation(format!("security level {} outside 1..=5", code))),
        }
    }
}

impl fmt::Display for SecurityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Payload size of data packets during bulk transfers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum PacketLength {
    Bytes32 = 0,
    Bytes64 = 1,
    #[default]
    Bytes128 = 2,
    Bytes256 = 3,
}

impl PacketLength {
    /// Value written with SET_SYSPARA
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn bytes(self) -> usize {
        32 << self.code()
    }

    /// Map a byte count to its setting
    pub fn from_bytes(bytes: usize) -> Result<Self> {
        match bytes {
            32 => Ok(Self::Bytes32),
            64 => Ok(Self::Bytes64),
            128 => Ok(Self::Bytes128),
            256 => Ok(Self::Bytes256),
            _ => Err(Error::Validation(format!(
                "packet length must be 32, 64, 128 or 256 bytes, got {}",
                bytes
            ))),
        }
    }
}

impl TryFrom<u16> for PacketLength {
    type Error = Error;

    fn try_from(code: u16) -> Result<Self> {
        match code {
            0 => Ok(Self::Bytes32),
            1 => Ok(Self::Bytes64),
            2 => Ok(Self::Bytes128),
            3 => Ok(Self::Bytes256),
            _ => Err(Error::Validation(format!("packet length code {} outside 0..=3", code))),
        }
    }
}

impl fmt::Display for PacketLength {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} bytes", self.bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_baud_rate() {
        assert_eq!(BaudRate::default().bits_per_second(), 57_600);
        assert_eq!(BaudRate::new(115_200).unwrap(), BaudRate::B115200);
        assert_eq!(BaudRate::from_code(2).unwrap().bits_per_second(), 19_200);
        assert!(BaudRate::new(0).is_err());
        assert!(BaudRate::new(9600 * 13).is_err());
        assert_eq!(BaudRate::B9600.to_string(), "9600 baud");
    }

    #[test]
    fn test_security_level() {
        assert_eq!(SecurityLevel::try_from(5).unwrap(), SecurityLevel::VeryHigh);
        assert_eq!(SecurityLevel::default().code(), 3);
        assert!(SecurityLevel::try_from(0).is_err());
        assert_eq!(SecurityLevel::VeryLow.to_string(), "very low");
    }

    #[test]
    fn test_packet_length() {
        assert_eq!(PacketLength::Bytes32.bytes(), 32);
        assert_eq!(PacketLength::Bytes256.bytes(), 256);
        assert_eq!(PacketLength::default().bytes(), 128);
        assert_eq!(PacketLength::from_bytes(64).unwrap().code(), 1);
        assert_eq!(PacketLength::try_from(3).unwrap(), PacketLength::Bytes256);
        assert!(PacketLength::from_bytes(100).is_err());
        assert!(PacketLength::try_from(4).is_err());
    }
}

//! READ_SYSPARA result

use std::fmt;

use bitflags::bitflags;
use byteorder::{BigEndian, ByteOrder};

use crate::{
    error::{Error, Result},
    settings::{BaudRate, PacketLength, SecurityLevel},
};

bitflags! {
    /// Sensor status register
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct StatusRegister: u16 {
        /// Executing a command
        const BUSY = 0x0001;
        /// A finger matched
        const PASS = 0x0002;
        /// Handshake password verified
        const PASSWORD_VERIFIED = 0x0004;
        /// The image buffer holds a valid image
        const IMAGE_BUFFER = 0x0008;
    }
}

/// Basic sensor parameters
///
/// # Layout
///
/// ```text
/// 0  status register   (2)
/// 2  system identifier (2)
/// 4  library capacity  (2)
/// 6  security level    (2)
/// 8  device address    (4)
/// 12 packet length     (2)
/// 14 baud multiplier   (2)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SystemParameters {
    pub status: StatusRegister,
    pub system_id: u16,
    /// Number of template slots
    pub capacity: u16,
    pub security_level: SecurityLevel,
    pub address: u32,
    pub packet_length: PacketLength,
    pub baud_rate: BaudRate,
}

impl SystemParameters {
    pub const SIZE: usize = 16;

    /// Decode the data bytes of a READ_SYSPARA acknowledge
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < Self::SIZE {
            return Err(Error::short_response("READ_SYSPARA", Self::SIZE, data.len()));
        }

        let security_level = SecurityLevel::try_from(BigEndian::read_u16(&data[6..8]))
            .map_err(|e| Error::Parse(e.to_string()))?;
        let packet_length = PacketLength::try_from(BigEndian::read_u16(&data[12..14]))
            .map_err(|e| Error::Parse(e.to_string()))?;
        let baud_rate = BaudRate::from_code(BigEndian::read_u16(&data[14..16]))
            .map_err(|e| Error::Parse(e.to_string()))?;

        Ok(Self {
            status: StatusRegister::from_bits_retain(BigEndian::read_u16(&data[0..2])),
            system_id: BigEndian::read_u16(&data[2..4]),
            capacity: BigEndian::read_u16(&data[4..6]),
            security_level,
            address: BigEndian::read_u32(&data[8..12]),
            packet_length,
            baud_rate,
        })
    }
}

impl fmt::Display for SystemParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Sensor[address: 0x{:08X}, capacity: {}, security: {}, packets: {}, {}]",
            self.address, self.capacity, self.security_level, self.packet_length, self.baud_rate
        )
    }
}

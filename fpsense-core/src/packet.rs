//! Sensor protocol packet structure, encoding and incremental parsing

use bytes::{BufMut, Bytes, BytesMut};
use std::fmt;

use crate::{
    checksum,
    constants::HEADER,
    error::{Error, Result},
};

/// Packet identifier
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PacketId {
    /// Host to sensor command
    Command = 0x01,
    /// Bulk data, more to follow
    DataChunk = 0x02,
    /// Sensor response to a command
    Acknowledge = 0x07,
    /// Last bulk data packet
    EndOfData = 0x08,
}

impl PacketId {
    pub fn name(self) -> &'static str {
        match self {
            Self::Command => "COMMAND",
            Self::DataChunk => "DATA",
            Self::Acknowledge => "ACK",
            Self::EndOfData => "END_OF_DATA",
        }
    }
}

impl From<PacketId> for u8 {
    fn from(id: PacketId) -> u8 {
        id as u8
    }
}

impl TryFrom<u8> for PacketId {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0x01 => Ok(Self::Command),
            0x02 => Ok(Self::DataChunk),
            0x07 => Ok(Self::Acknowledge),
            0x08 => Ok(Self::EndOfData),
            _ => Err(Error::corrupted(format!("unknown packet id 0x{:02X}", value))),
        }
    }
}

/// 4-byte device address
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct Address([u8; 4]);

impl Address {
    pub const fn new(address: u32) -> Self {
        Self(address.to_be_bytes())
    }

    pub fn as_bytes(&self) -> &[u8; 4] {
        &self.0
    }

    pub fn value(&self) -> u32 {
        u32::from_be_bytes(self.0)
    }

    /// The 6-byte prefix every frame to or from this address starts with
    pub fn frame_prefix(&self) -> [u8; 6] {
        [HEADER[0], HEADER[1], self.0[0], self.0[1], self.0[2], self.0[3]]
    }
}

impl From<u32> for Address {
    fn from(address: u32) -> Self {
        Self::new(address)
    }
}

impl Default for Address {
    fn default() -> Self {
        Self::new(crate::constants::DEFAULT_ADDRESS)
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address(0x{:08X})", self.value())
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08X}", self.value())
    }
}

/// Result of trying to extract one frame from the front of a buffer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Parsed {
    /// More bytes are needed
    Incomplete,
    /// A complete, validated frame occupying the first `consumed` bytes
    Frame { packet: Packet, consumed: usize },
}

/// Sensor protocol packet
///
/// # Packet Structure
///
/// ```text
/// ┌──────────┬───────────┬──────────┬──────────┬───────────┬──────────┐
/// │  Header  │  Address  │   PID    │  Length  │  Payload  │ Checksum │
/// │  EF 01   │  4 bytes  │  1 byte  │  2 bytes │  N bytes  │  2 bytes │
/// │          │  (BE u32) │          │ (BE, N+2)│           │ (BE u16) │
/// └──────────┴───────────┴──────────┴──────────┴───────────┴──────────┘
/// ```
///
/// All multi-byte values are big-endian.
///
/// # Examples
///
/// ```
/// use fpsense_core::packet::{Address, Packet, PacketId, Parsed};
///
/// let address = Address::new(0xFFFF_FFFF);
/// let packet = Packet::with_payload(PacketId::Acknowledge, address, vec![0x00]);
/// let encoded = packet.encode();
///
/// match Packet::parse(&encoded, address).unwrap() {
///     Parsed::Frame { packet: decoded, consumed } => {
///         assert_eq!(decoded, packet);
///         assert_eq!(consumed, encoded.len());
///     }
///     Parsed::Incomplete => unreachable!(),
/// }
/// ```
#[derive(Clone, PartialEq, Eq)]
pub struct Packet {
    /// Packet identifier
    pub id: PacketId,

    /// Device address
    pub address: Address,

    /// Packet payload
    pub payload: Bytes,
}

impl Packet {
    /// Header + address + pid + length
    pub const PREAMBLE_SIZE: usize = 9;

    /// Preamble plus checksum, i.e. a frame with an empty payload
    pub const MIN_FRAME_SIZE: usize = Self::PREAMBLE_SIZE + 2;

    /// Maximum payload size
    pub const MAX_PAYLOAD_SIZE: usize = u16::MAX as usize - 2;

    /// Create a new packet with empty payload
    pub fn new(id: PacketId, address: Address) -> Self {
        Self {
            id,
            address,
            payload: Bytes::new(),
        }
    }

    /// Create a packet with payload
    ///
    /// # Examples
    ///
    /// ```
    /// use fpsense_core::packet::{Address, Packet, PacketId};
    ///
    /// let packet = Packet::with_payload(PacketId::Command, Address::default(), vec![0x17, 0x00]);
    /// assert_eq!(packet.length_field(), 4);
    /// ```
    pub fn with_payload(id: PacketId, address: Address, payload: impl Into<Bytes>) -> Self {
        Self {
            id,
            address,
            payload: payload.into(),
        }
    }

    /// Value of the length field (payload + checksum)
    pub fn length_field(&self) -> u16 {
        (self.payload.len() + 2) as u16
    }

    /// Calculate checksum for this packet
    pub fn checksum(&self) -> u16 {
        checksum::calculate(self.id.into(), self.length_field(), &self.payload)
    }

    /// Check the payload fits the length field
    pub fn validate(&self) -> Result<()> {
        if self.payload.len() > Self::MAX_PAYLOAD_SIZE {
            return Err(Error::PayloadTooLarge {
                size: self.payload.len(),
                max: Self::MAX_PAYLOAD_SIZE,
            });
        }
        Ok(())
    }

    /// Encode packet to bytes
    ///
    /// # Examples
    ///
    /// ```
    /// use fpsense_core::packet::{Address, Packet, PacketId};
    ///
    /// let packet = Packet::with_payload(PacketId::Command, Address::default(), vec![0x17, 0x00]);
    /// assert_eq!(
    ///     packet.encode().as_ref(),
    ///     &[0xEF, 0x01, 0xFF, 0xFF, 0xFF, 0xFF, 0x01, 0x00, 0x04, 0x17, 0x00, 0x00, 0x1C]
    /// );
    /// ```
    pub fn encode(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(self.size());

        buf.put_slice(&self.address.frame_prefix());
        buf.put_u8(self.id.into());
        buf.put_u16(self.length_field());
        buf.put_slice(&self.payload);
        buf.put_u16(self.checksum());

        buf
    }

    /// Try to extract one frame from the front of `buf`
    ///
    /// Nothing is inspected until at least [`Self::MIN_FRAME_SIZE`] bytes are
    /// buffered. A frame whose declared length is not fully buffered yet
    /// yields [`Parsed::Incomplete`].
    ///
    /// # Errors
    ///
    /// - [`Error::CorruptedPacket`] if the prefix is not `EF 01 ++ address`,
    ///   the packet id is unknown or the length field is below 2
    /// - [`Error::ChecksumMismatch`] if the trailing checksum disagrees
    pub fn parse(buf: &[u8], address: Address) -> Result<Parsed> {
        if buf.len() < Self::MIN_FRAME_SIZE {
            return Ok(Parsed::Incomplete);
        }

        if buf[..6] != address.frame_prefix() {
            return Err(Error::corrupted(format!(
                "unexpected prefix {} (expected {})",
                hex::encode(&buf[..6]),
                hex::encode(address.frame_prefix())
            )));
        }

        let length = u16::from_be_bytes([buf[7], buf[8]]);
        if length < 2 {
            return Err(Error::corrupted(format!("length field {} below minimum", length)));
        }

        let total = Self::PREAMBLE_SIZE + length as usize;
        if buf.len() < total {
            return Ok(Parsed::Incomplete);
        }

        let id = PacketId::try_from(buf[6])?;

        let payload = &buf[Self::PREAMBLE_SIZE..total - 2];
        let received = u16::from_be_bytes([buf[total - 2], buf[total - 1]]);
        let expected = checksum::calculate(buf[6], length, payload);
        if expected != received {
            return Err(Error::ChecksumMismatch { expected, received });
        }

        Ok(Parsed::Frame {
            packet: Self {
                id,
                address,
                payload: Bytes::copy_from_slice(payload),
            },
            consumed: total,
        })
    }

    /// Get total frame size
    pub fn size(&self) -> usize {
        Self::MIN_FRAME_SIZE + self.payload.len()
    }
}

impl fmt::Debug for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Packet")
            .field("id", &self.id)
            .field("address", &self.address)
            .field("checksum", &format!("0x{:04X}", self.checksum()))
            .field("payload_len", &self.payload.len())
            .finish()
    }
}

impl fmt::Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Packet[{}](address={}, len={})",
            self.id.name(),
            self.address,
            self.payload.len()
        )
    }
}

//! Sensor instruction codes
//!
//! The first payload byte of every Command packet.

use std::fmt;

use crate::error::{Error, Result};

/// Instruction codes from the sensor's command table
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Instruction {
    // Image & character buffers
    GenImg = 0x01,
    Img2Tz = 0x02,
    Match = 0x03,
    Search = 0x04,
    RegModel = 0x05,
    Store = 0x06,
    LoadChar = 0x07,
    UpChar = 0x08,
    DownChar = 0x09,
    UpImage = 0x0A,
    DownImage = 0x0B,

    // Template library
    DeleteChar = 0x0C,
    Empty = 0x0D,
    FastSearch = 0x1B,
    TemplateCount = 0x1D,
    TemplateTable = 0x1F,

    // System
    SetSysPara = 0x0E,
    ReadSysPara = 0x0F,
    SetPassword = 0x12,
    VerifyPassword = 0x13,
    GetRandomCode = 0x14,
    SetAddress = 0x15,
    Handshake = 0x17,

    // Notepad
    WriteNotepad = 0x18,
    ReadNotepad = 0x19,

    // LED ring
    LedControl = 0x35,
    LedOn = 0x50,
    LedOff = 0x51,
}

impl Instruction {
    /// Instructions whose acknowledge is followed by an inbound transfer
    pub fn is_upload(self) -> bool {
        matches!(self, Self::UpChar | Self::UpImage)
    }

    /// Instructions whose acknowledge triggers an outbound transfer
    pub fn is_download(self) -> bool {
        matches!(self, Self::DownChar | Self::DownImage)
    }

    /// Get instruction name
    pub fn name(self) -> &'static str {
        match self {
            Self::GenImg => "GEN_IMG",
            Self::Img2Tz => "IMG2TZ",
            Self::Match => "MATCH",
            Self::Search => "SEARCH",
            Self::RegModel => "REG_MODEL",
            Self::Store => "STORE",
            Self::LoadChar => "LOAD_CHAR",
            Self::UpChar => "UP_CHAR",
            Self::DownChar => "DOWN_CHAR",
            Self::UpImage => "UP_IMAGE",
            Self::DownImage => "DOWN_IMAGE",
            Self::DeleteChar => "DELETE_CHAR",
            Self::Empty => "EMPTY",
            Self::FastSearch => "FAST_SEARCH",
            Self::TemplateCount => "TEMPLATE_COUNT",
            Self::TemplateTable => "TEMPLATE_TABLE",
            Self::SetSysPara => "SET_SYSPARA",
            Self::ReadSysPara => "READ_SYSPARA",
            Self::SetPassword => "SET_PASSWORD",
            Self::VerifyPassword => "VERIFY_PASSWORD",
            Self::GetRandomCode => "GET_RANDOM_CODE",
            Self::SetAddress => "SET_ADDRESS",
            Self::Handshake => "HANDSHAKE",
            Self::WriteNotepad => "WRITE_NOTEPAD",
            Self::ReadNotepad => "READ_NOTEPAD",
            Self::LedControl => "LED_CONTROL",
            Self::LedOn => "LED_ON",
            Self::LedOff => "LED_OFF",
        }
    }
}

impl From<Instruction> for u8 {
    fn from(instruction: Instruction) -> u8 {
        instruction as u8
    }
}

impl TryFrom<u8> for Instruction {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0x01 => Ok(Self::GenImg),
            0x02 => Ok(Self::Img2Tz),
            0x03 => Ok(Self::Match),
            0x04 => Ok(Self::Search),
            0x05 => Ok(Self::RegModel),
            0x06 => Ok(Self::Store),
            0x07 => Ok(Self::LoadChar),
            0x08 => Ok(Self::UpChar),
            0x09 => Ok(Self::DownChar),
            0x0A => Ok(Self::UpImage),
            0x0B => Ok(Self::DownImage),
            0x0C => Ok(Self::DeleteChar),
            0x0D => Ok(Self::Empty),
            0x0E => Ok(Self::SetSysPara),
            0x0F => Ok(Self::ReadSysPara),
            0x12 => Ok(Self::SetPassword),
            0x13 => Ok(Self::VerifyPassword),
            0x14 => Ok(Self::GetRandomCode),
            0x15 => Ok(Self::SetAddress),
            0x17 => Ok(Self::Handshake),
            0x18 => Ok(Self::WriteNotepad),
            0x19 => Ok(Self::ReadNotepad),
            0x1B => Ok(Self::FastSearch),
            0x1D => Ok(Self::TemplateCount),
            0x1F => Ok(Self::TemplateTable),
            0x35 => Ok(Self::LedControl),
            0x50 => Ok(Self::LedOn),
            0x51 => Ok(Self::LedOff),
            _ => Err(Error::UnknownInstruction(value)),
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(0x{:02X})", self.name(), *self as u8)
    }
}

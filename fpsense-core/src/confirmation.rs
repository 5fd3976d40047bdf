//! Confirmation codes carried in the first byte of every Acknowledge payload

use std::fmt;

/// Outcome reported by the sensor for a command
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ConfirmationCode {
    Ok,
    PacketReceive,
    NoFinger,
    EnrollFail,
    ImageDisordered,
    ImageNoCharacter,
    FingerNotMatch,
    FingerNotFound,
    EnrollMismatch,
    BadLocation,
    TemplateDb,
    UploadFail,
    PacketResponseFail,
    DeleteFail,
    ClearDbFail,
    InvalidImage,
    FlashError,
    DefinitionError,
    InvalidRegister,
    InvalidRegisterConfig,
    NotepadPageNotFound,
    CommFail,
    InvalidAddressCode,
    PasswordNotVerified,
    /// Code outside the documented table
    Unknown(u8),
}

impl ConfirmationCode {
    /// Raw code byte
    pub fn code(self) -> u8 {
        match self {
            Self::Ok => 0x00,
            Self::PacketReceive => 0x01,
            Self::NoFinger => 0x02,
            Self::EnrollFail => 0x03,
            Self::ImageDisordered => 0x06,
            Self::ImageNoCharacter => 0x07,
            Self::FingerNotMatch => 0x08,
            Self::FingerNotFound => 0x09,
            Self::EnrollMismatch => 0x0A,
            Self::BadLocation => 0x0B,
            Self::TemplateDb => 0x0C,
            Self::UploadFail => 0x0D,
            Self::PacketResponseFail => 0x0E,
            Self::DeleteFail => 0x10,
            Self::ClearDbFail => 0x11,
            Self::InvalidImage => 0x15,
            Self::FlashError => 0x18,
            Self::DefinitionError => 0x19,
            Self::InvalidRegister => 0x1A,
            Self::InvalidRegisterConfig => 0x1B,
            Self::NotepadPageNotFound => 0x1C,
            Self::CommFail => 0x1D,
            Self::InvalidAddressCode => 0x20,
            Self::PasswordNotVerified => 0x21,
            Self::Unknown(code) => code,
        }
    }

    /// Check if this is the success code
    pub fn is_ok(self) -> bool {
        matches!(self, Self::Ok)
    }

    /// Human-readable reason
    pub fn reason(self) -> &'static str {
        match self {
            Self::Ok => "command executed",
            Self::PacketReceive => "error when receiving data package",
            Self::NoFinger => "no finger on the sensor",
            Self::EnrollFail => "failed to enroll the finger",
            Self::ImageDisordered => "fingerprint image too disordered",
            Self::ImageNoCharacter => "too few character points in the fingerprint image",
            Self::FingerNotMatch => "fingerprints do not match",
            Self::FingerNotFound => "no matching fingerprint found",
            Self::EnrollMismatch => "failed to combine the character files",
            Self::BadLocation => "page id beyond the fingerprint library",
            Self::TemplateDb => "error reading the template or invalid template",
            Self::UploadFail => "error uploading the template",
            Self::PacketResponseFail => "module cannot receive the following data packages",
            Self::DeleteFail => "failed to delete the template",
            Self::ClearDbFail => "failed to clear the fingerprint library",
            Self::InvalidImage => "no valid primary image in the image buffer",
            Self::FlashError => "error writing to flash",
            Self::DefinitionError => "undefined error",
            Self::InvalidRegister => "invalid register number",
            Self::InvalidRegisterConfig => "incorrect register configuration",
            Self::NotepadPageNotFound => "wrong notepad page number",
            Self::CommFail => "failed to operate the communication port",
            Self::InvalidAddressCode => "address code mismatch",
            Self::PasswordNotVerified => "password must be verified first",
            Self::Unknown(_) => "unknown confirmation code",
        }
    }
}

impl From<u8> for ConfirmationCode {
    fn from(value: u8) -> Self {
        match value {
            0x00 => Self::Ok,
            0x01 => Self::PacketReceive,
            0x02 => Self::NoFinger,
            0x03 => Self::EnrollFail,
            0x06 => Self::ImageDisordered,
            0x07 => Self::ImageNoCharacter,
            0x08 => Self::FingerNotMatch,
            0x09 => Self::FingerNotFound,
            0x0A => Self::EnrollMismatch,
            0x0B => Self::BadLocation,
            0x0C => Self::TemplateDb,
            0x0D => Self::UploadFail,
            0x0E => Self::PacketResponseFail,
            0x10 => Self::DeleteFail,
            0x11 => Self::ClearDbFail,
            0x15 => Self::InvalidImage,
            0x18 => Self::FlashError,
            0x19 => Self::DefinitionError,
            0x1A => Self::InvalidRegister,
            0x1B => Self::InvalidRegisterConfig,
            0x1C => Self::NotepadPageNotFound,
            0x1D => Self::CommFail,
            0x20 => Self::InvalidAddressCode,
            0x21 => Self::PasswordNotVerified,
            other => Self::Unknown(other),
        }
    }
}

impl From<ConfirmationCode> for u8 {
    fn from(code: ConfirmationCode) -> u8 {
        code.code()
    }
}

impl fmt::Display for ConfirmationCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:02X} ({})", self.code(), self.reason())
    }
}

//! Protocol constants

/// Fixed frame header
pub const HEADER: [u8; 2] = [0xEF, 0x01];

/// Factory default device address
pub const DEFAULT_ADDRESS: u32 = 0xFFFF_FFFF;

/// Factory default password
pub const DEFAULT_PASSWORD: u32 = 0;

/// Default response timeout (milliseconds)
pub const DEFAULT_TIMEOUT_MS: u64 = 1000;

/// Delay between the port opening and the sensor accepting commands (milliseconds)
pub const SETTLE_DELAY_MS: u64 = 700;

/// Default serial baud rate
pub const DEFAULT_BAUD_RATE: u32 = 57600;

/// Default chunk size for outbound transfers
pub const DEFAULT_CHUNK_SIZE: usize = 128;

/// Size of an uploaded image buffer
pub const IMAGE_SIZE: usize = 36864;

/// Size of an uploaded character buffer (template)
pub const TEMPLATE_SIZE: usize = 512;

/// Notepad page size
pub const NOTEPAD_PAGE_SIZE: usize = 32;

/// Number of notepad pages
pub const NOTEPAD_PAGES: u8 = 16;

/// Parameter numbers for SET_SYSPARA
pub mod sys_para {
    /// Baud rate control (N where baud = N * 9600)
    pub const BAUD_RATE: u8 = 4;

    /// Security level (1..=5)
    pub const SECURITY_LEVEL: u8 = 5;

    /// Data package length (0..=3 for 32..256 bytes)
    pub const PACKET_LENGTH: u8 = 6;
}

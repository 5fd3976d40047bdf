//! Aura LED control arguments

/// LED animation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum LedMode {
    Breathing = 0x01,
    Flashing = 0x02,
    On = 0x03,
    Off = 0x04,
    GradualOn = 0x05,
    GradualOff = 0x06,
}

impl LedMode {
    pub fn code(self) -> u8 {
        self as u8
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum LedColor {
    Red = 0x01,
    Blue = 0x02,
    Purple = 0x03,
}

impl LedColor {
    pub fn code(self) -> u8 {
        self as u8
    }
}

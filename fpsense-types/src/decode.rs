//! Big-endian fields of acknowledge data

use byteorder::{BigEndian, ByteOrder};

use crate::error::{Error, Result};

/// Read the `u16` at `offset`, naming `what` in the error
pub fn u16_at(data: &[u8], offset: usize, what: &str) -> Result<u16> {
    data.get(offset..offset + 2)
        .map(BigEndian::read_u16)
        .ok_or_else(|| Error::short_response(what, offset + 2, data.len()))
}

/// Read the `u32` at `offset`, naming `what` in the error
pub fn u32_at(data: &[u8], offset: usize, what: &str) -> Result<u32> {
    data.get(offset..offset + 4)
        .map(BigEndian::read_u32)
        .ok_or_else(|| Error::short_response(what, offset + 4, data.len()))
}

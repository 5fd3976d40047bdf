//! Packet checksum
//!
//! The sensor uses a plain additive checksum:
//! 1. Start from the packet identifier byte
//! 2. Add both bytes of the big-endian length field
//! 3. Add every payload byte
//! 4. Keep the low 16 bits
//!
//! The fixed header (`0xEF 0x01`) and the device address are not covered.

use tracing::trace;

/// Calculate the checksum of a frame
///
/// `length` is the value carried in the length field, i.e. the payload
/// length plus the two checksum bytes.
///
/// # Examples
///
/// ```
/// use fpsense_core::checksum;
///
/// // Handshake command: pid=0x01, length=4, payload=[0x17, 0x00]
/// let checksum = checksum::calculate(0x01, 4, &[0x17, 0x00]);
/// assert_eq!(checksum, 0x001C);
/// ```
pub fn calculate(packet_id: u8, length: u16, payload: &[u8]) -> u16 {
    let [len_hi, len_lo] = length.to_be_bytes();

    let checksum = payload.iter().fold(
        u16::from(packet_id)
            .wrapping_add(u16::from(len_hi))
            .wrapping_add(u16::from(len_lo)),
        |sum, &byte| sum.wrapping_add(u16::from(byte)),
    );

    trace!(
        packet_id = packet_id,
        length = length,
        payload_len = payload.len(),
        checksum = format!("0x{:04X}", checksum),
        "Calculated checksum"
    );

    checksum
}

/// Verify checksum
pub fn verify(packet_id: u8, length: u16, payload: &[u8], expected: u16) -> bool {
    calculate(packet_id, length, payload) == expected
}

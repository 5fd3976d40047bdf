//! Template buffers and search results

use std::fmt;

use crate::{decode::u16_at, error::Result};

/// Character buffer holding an extracted feature set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CharBuffer {
    One = 1,
    Two = 2,
}

impl CharBuffer {
    pub fn code(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for CharBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CharBuffer{}", self.code())
    }
}

/// Outcome of SEARCH / FAST_SEARCH
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchResult {
    /// Library slot of the matching template
    pub page_id: u16,
    pub matching_score: u16,
}

impl SearchResult {
    pub fn parse(data: &[u8]) -> Result<Self> {
        Ok(Self {
            page_id: u16_at(data, 0, "SEARCH")?,
            matching_score: u16_at(data, 2, "SEARCH")?,
        })
    }
}

/// Occupied library slots listed by one TEMPLATE_TABLE page
///
/// Bit `j` of byte `i` marks slot `page * 256 + i * 8 + j`. Slots past
/// 65535 cannot be addressed and are dropped.
///
/// # Examples
///
/// ```
/// use fpsense_types::template_indexes;
///
/// assert_eq!(template_indexes(1, &[0b0000_0101, 0x00, 0x80]), vec![256, 258, 279]);
/// ```
pub fn template_indexes(page: u8, table: &[u8]) -> Vec<u16> {
    let base = page as usize * 256;

    table
        .iter()
        .enumerate()
        .filter(|(_, byte)| **byte != 0)
        .flat_map(|(i, byte)| {
            (0..8usize)
                .filter(move |j| (byte >> j) & 1 == 1)
                .map(move |j| base + i * 8 + j)
        })
        .map_while(|slot| u16::try_from(slot).ok())
        .collect()
}

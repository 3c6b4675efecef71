//! Token metadata account layout.
//!
//! ```text
//! [0]        key / discriminator
//! [1..33]    update authority
//! [33..65]   mint
//! [65..]     u32-LE len + name bytes, u32-LE len + symbol bytes, ...
//! ```
//!
//! Names and symbols are stored in fixed-width, NUL-padded buffers.

use crate::cache::TokenMetadata;

const HEADER_LEN: usize = 1 + 32 + 32;

/// Cursor over the account data; every read is bounds-checked.
struct Reader<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8], offset: usize) -> Self {
        Self { data, offset }
    }

    fn read_u32_le(&mut self) -> Option<u32> {
        let bytes = self.data.get(self.offset..self.offset.checked_add(4)?)?;
        self.offset += 4;
        Some(u32::from_le_bytes(bytes.try_into().ok()?))
    }

    fn read_string(&mut self) -> Option<String> {
        let len = self.read_u32_le()? as usize;
        let end = self.offset.checked_add(len)?;
        let bytes = self.data.get(self.offset..end)?;
        self.offset = end;
        Some(clean(&String::from_utf8_lossy(bytes)))
    }
}

fn clean(raw: &str) -> String {
    raw.trim_matches(|c: char| c == '\0' || c.is_whitespace())
        .replace('\0', "")
}

/// Decodes name and symbol. Short or malformed buffers yield empty strings
/// for whatever could not be read.
pub fn decode(data: &[u8]) -> TokenMetadata {
    if data.len() < HEADER_LEN {
        return TokenMetadata::default();
    }
    let mut reader = Reader::new(data, HEADER_LEN);
    let name = reader.read_string().unwrap_or_default();
    let symbol = reader.read_string().unwrap_or_default();
    TokenMetadata { name, symbol }
}

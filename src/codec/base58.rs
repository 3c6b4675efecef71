//! Bitcoin-alphabet base58, as used for Solana addresses.

use crate::error::{AggregatorError, Result};

pub const ALPHABET: &str = "123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";

pub fn encode(bytes: &[u8]) -> String {
    bs58::encode(bytes).into_string()
}

/// Decodes a base58 string. Characters outside the alphabet are an input
/// error.
pub fn decode(s: &str) -> Result<Vec<u8>> {
    bs58::decode(s).into_vec().map_err(|e| match e {
        bs58::decode::Error::InvalidCharacter { character, index } => {
            AggregatorError::InvalidInput(format!(
                "invalid base58 character {:?} at index {}",
                character, index
            ))
        }
        other => AggregatorError::from(other),
    })
}

/// Decodes a 32-byte public key. Anything else yields `None`.
pub fn decode_pubkey(s: &str) -> Option<[u8; 32]> {
    let bytes = decode(s).ok()?;
    bytes.try_into().ok()
}

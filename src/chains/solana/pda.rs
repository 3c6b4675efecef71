//! Metadata account derivation for SPL mints.

use crate::cache::TokenMetadata;
use crate::codec::{base58, metadata};
use crate::error::Result;
use async_trait::async_trait;
use log::debug;
use sha2::{Digest, Sha256};

pub const METADATA_PROGRAM_ID: &str = "metaqbxxUerdq28cj1RbAWkYQm3ybzjb6a8bt518x1s";
const PDA_MARKER: &[u8] = b"ProgramDerivedAddress";
const METADATA_SEED: &[u8] = b"metadata";

/// Anything that can tell whether an account exists and hand back its data.
#[async_trait]
pub trait AccountSource: Send + Sync {
    /// Raw account data, `Ok(None)` when the account does not exist. An
    /// `Err` means the question could not be answered.
    async fn account_data(&self, address: &str) -> Result<Option<Vec<u8>>>;
}

/// `base58(sha256(seeds || [bump] || program_id || "ProgramDerivedAddress"))`
pub fn derive_address(seeds: &[&[u8]], bump: u8, program_id: &[u8]) -> String {
    let mut hasher = Sha256::new();
    for seed in seeds {
        hasher.update(seed);
    }
    hasher.update([bump]);
    hasher.update(program_id);
    hasher.update(PDA_MARKER);
    base58::encode(&hasher.finalize())
}

/// Walks bumps 255 down to 0 and returns the first candidate that has
/// account data, together with that data. At most 256 lookups; the walk
/// stops at the first failed lookup, which is returned as the error.
pub async fn find_metadata_account(
    source: &dyn AccountSource,
    mint: &str,
) -> Result<Option<(String, Vec<u8>)>> {
    let (Some(mint_bytes), Some(program)) = (
        base58::decode_pubkey(mint),
        base58::decode_pubkey(METADATA_PROGRAM_ID),
    ) else {
        return Ok(None);
    };
    let seeds: [&[u8]; 3] = [METADATA_SEED, &program, &mint_bytes];

    for bump in (0..=u8::MAX).rev() {
        let candidate = derive_address(&seeds, bump, &program);
        if let Some(data) = source.account_data(&candidate).await? {
            debug!("Metadata account for {} found at bump {}: {}", mint, bump, candidate);
            return Ok(Some((candidate, data)));
        }
    }
    debug!("No metadata account for {} after 256 lookups", mint);
    Ok(None)
}

/// Name and symbol of `mint`, `Ok(None)` when no metadata account exists.
pub async fn fetch_metadata(source: &dyn AccountSource, mint: &str) -> Result<Option<TokenMetadata>> {
    let found = find_metadata_account(source, mint).await?;
    Ok(found.map(|(_, data)| metadata::decode(&data)))
}

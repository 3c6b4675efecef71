pub mod base58;
pub mod metadata;

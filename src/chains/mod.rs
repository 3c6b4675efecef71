// src/chains/mod.rs

pub mod evm;
pub mod registry;
pub mod solana;
pub mod tron;

pub use registry::ChainRegistry;

use crate::cache::CacheStats;
use crate::dates::DateRange;
use crate::error::{AggregatorError, Result};
use crate::models::{ContractDetails, TransactionList, WalletInfo};
use async_trait::async_trait;
use std::fmt;
use std::str::FromStr;

pub const DEFAULT_TRANSACTION_LIMIT: usize = 20;

/// Supported chains, keyed by their lowercase identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Chain {
    Ethereum,
    Bnb,
    Tron,
    Solana,
}

impl Chain {
    pub const ALL: [Chain; 4] = [Chain::Ethereum, Chain::Bnb, Chain::Tron, Chain::Solana];

    pub fn as_str(&self) -> &'static str {
        match self {
            Chain::Ethereum => "ethereum",
            Chain::Bnb => "bnb",
            Chain::Tron => "tron",
            Chain::Solana => "solana",
        }
    }
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Chain {
    type Err = AggregatorError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ethereum" | "eth" => Ok(Chain::Ethereum),
            "bnb" | "bsc" => Ok(Chain::Bnb),
            "tron" | "trx" => Ok(Chain::Tron),
            "solana" | "sol" => Ok(Chain::Solana),
            other => Err(AggregatorError::UnsupportedChain(other.to_string())),
        }
    }
}

/// Parameters of a transaction-history query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionQuery {
    pub address: String,
    pub limit: usize,
    /// Contract/mint address; restricts the result to that token's transfers.
    pub token: Option<String>,
    pub dates: DateRange,
}

impl TransactionQuery {
    /// Rejects `limit < 1`. Unparseable dates are dropped.
    pub fn new(
        address: &str,
        limit: i64,
        token: Option<&str>,
        start_date: Option<&str>,
        end_date: Option<&str>,
    ) -> Result<Self> {
        if limit < 1 {
            return Err(AggregatorError::InvalidInput(format!(
                "limit must be at least 1, got {}",
                limit
            )));
        }
        Ok(Self {
            address: address.trim().to_string(),
            limit: usize::try_from(limit).unwrap_or(usize::MAX),
            token: token
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_string),
            dates: DateRange::parse(start_date, end_date),
        })
    }
}

/// The three read operations every supported chain provides.
///
/// Upstream failures never surface as errors here; they degrade to empty or
/// default fields. `Err` is reserved for caller input errors.
#[async_trait]
pub trait ChainClient: Send + Sync {
    fn chain(&self) -> Chain;

    async fn get_wallet_info(&self, address: &str) -> Result<WalletInfo>;

    async fn get_transactions(&self, query: &TransactionQuery) -> Result<TransactionList>;

    async fn get_contract_details(&self, address: &str) -> Result<ContractDetails>;

    /// Drops every cached lookup. No-op for clients without caches.
    fn clear_cache(&self) {}

    fn cache_stats(&self) -> Option<CacheStats> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_from_str() {
        assert_eq!("Ethereum".parse::<Chain>().unwrap(), Chain::Ethereum);
        assert_eq!("bsc".parse::<Chain>().unwrap(), Chain::Bnb);
        assert_eq!(" solana ".parse::<Chain>().unwrap(), Chain::Solana);
        let err = "dogecoin".parse::<Chain>().unwrap_err();
        assert!(err.is_input_error());
    }

    #[test]
    fn test_chain_round_trips_through_display() {
        for chain in Chain::ALL {
            assert_eq!(chain.to_string().parse::<Chain>().unwrap(), chain);
        }
    }

    #[test]
    fn test_query_rejects_non_positive_limit() {
        for limit in [0, -3] {
            let err = TransactionQuery::new("addr", limit, None, None, None).unwrap_err();
            assert!(err.is_input_error());
        }
    }

    #[test]
    fn test_query_normalizes_inputs() {
        let query =
            TransactionQuery::new(" addr ", 5, Some("  "), Some("2024-01-01"), Some("not a date"))
                .unwrap();
        assert_eq!(query.address, "addr");
        assert_eq!(query.limit, 5);
        assert_eq!(query.token, None);
        assert!(query.dates.start.is_some());
        assert!(query.dates.end.is_none());
    }
}

pub mod cache;
pub mod chains;
pub mod codec;
pub mod config;
pub mod dates;
pub mod error;
pub mod models;
pub mod normalize;
pub mod rpc;
pub mod utils;

// Re-export the request surface for callers
pub use chains::{Chain, ChainClient, ChainRegistry, TransactionQuery, DEFAULT_TRANSACTION_LIMIT};
pub use error::{AggregatorError, Result};
pub use models::{ContractDetails, Transaction, TransactionList, TxStatus, WalletInfo};

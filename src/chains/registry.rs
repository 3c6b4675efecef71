// src/chains/registry.rs
//! Startup-time selection of one [`ChainClient`] per chain.

use super::evm::{EvmClient, EvmNetwork};
use super::solana::SolanaClient;
use super::tron::TronClient;
use super::{Chain, ChainClient};
use crate::config::Config;
use crate::error::{AggregatorError, Result};
use log::{info, warn};
use std::collections::HashMap;
use std::sync::Arc;

pub struct ChainRegistry {
    clients: HashMap<Chain, Arc<dyn ChainClient>>,
}

impl ChainRegistry {
    /// Builds every chain the configuration allows. A chain whose API key is
    /// missing is skipped and later reported as not configured.
    pub fn from_config(config: &Config) -> Result<Self> {
        let mut clients: HashMap<Chain, Arc<dyn ChainClient>> = HashMap::new();

        match config.etherscan_api_key.as_deref() {
            Some(key) => {
                for network in [EvmNetwork::Ethereum, EvmNetwork::Bnb] {
                    let client = EvmClient::new(network, &config.etherscan_base_url, key, config)?;
                    info!("✅ {} client initialized ({})", network.chain(), config.etherscan_base_url);
                    clients.insert(network.chain(), Arc::new(client));
                }
            }
            None => warn!("⚠️ ETHERSCAN_API_KEY not set; ethereum and bnb are disabled"),
        }

        match config.tronscan_api_key.as_deref() {
            Some(key) => {
                let client = TronClient::new(&config.tronscan_base_url, key, config)?;
                info!("✅ tron client initialized ({})", config.tronscan_base_url);
                clients.insert(Chain::Tron, Arc::new(client));
            }
            None => warn!("⚠️ TRONSCAN_API_KEY not set; tron is disabled"),
        }

        let solana = SolanaClient::new(config)?;
        info!("✅ solana client initialized ({})", config.solana_rpc_url);
        clients.insert(Chain::Solana, Arc::new(solana));

        info!("Chain registry ready with {} of {} chains", clients.len(), Chain::ALL.len());
        Ok(Self { clients })
    }

    /// Looks up a client by chain identifier (aliases accepted).
    pub fn get(&self, chain: &str) -> Result<Arc<dyn ChainClient>> {
        let chain: Chain = chain.parse()?;
        self.clients.get(&chain).cloned().ok_or_else(|| {
            AggregatorError::ChainNotConfigured(format!("{} has no configured client", chain))
        })
    }

    pub fn chains(&self) -> Vec<Chain> {
        let mut chains: Vec<Chain> = self.clients.keys().copied().collect();
        chains.sort();
        chains
    }
}

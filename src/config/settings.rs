use std::env;
use std::time::Duration;

pub const DEFAULT_ETHERSCAN_BASE_URL: &str = "https://api.etherscan.io/v2/api";
pub const DEFAULT_TRONSCAN_BASE_URL: &str = "https://apilist.tronscanapi.com";
pub const DEFAULT_SOLANA_RPC_URL: &str = "https://api.mainnet-beta.solana.com";

/// How a Solana date bound is mapped onto a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotStrategy {
    /// Linear extrapolation from the current slot, minus a safety buffer.
    Estimate,
    /// Probe `getBlockTime` at candidate slots. Slower, more precise.
    BinarySearch,
}

impl SlotStrategy {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "estimate" => Some(SlotStrategy::Estimate),
            "binary_search" | "binary-search" => Some(SlotStrategy::BinarySearch),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub etherscan_api_key: Option<String>,
    pub etherscan_base_url: String,
    pub tronscan_api_key: Option<String>,
    pub tronscan_base_url: String,
    pub solana_rpc_url: String,
    pub http_timeout_secs: u64,
    pub rpc_timeout_secs: u64,
    pub rpc_batch_timeout_secs: u64,
    pub solana_slot_duration_ms: u64,
    pub solana_slot_buffer: u64,
    pub solana_slot_strategy: SlotStrategy,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            etherscan_api_key: None,
            etherscan_base_url: DEFAULT_ETHERSCAN_BASE_URL.to_string(),
            tronscan_api_key: None,
            tronscan_base_url: DEFAULT_TRONSCAN_BASE_URL.to_string(),
            solana_rpc_url: DEFAULT_SOLANA_RPC_URL.to_string(),
            http_timeout_secs: 15,
            rpc_timeout_secs: 20,
            rpc_batch_timeout_secs: 30,
            solana_slot_duration_ms: 400,
            solana_slot_buffer: 5000,
            solana_slot_strategy: SlotStrategy::Estimate,
            log_level: "info".to_string(),
        }
    }
}

fn non_empty(key: &str) -> Option<String> {
    env::var(key).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = Config::default();
        Config {
            etherscan_api_key: non_empty("ETHERSCAN_API_KEY"),
            etherscan_base_url: non_empty("ETHERSCAN_BASE_URL")
                .unwrap_or(defaults.etherscan_base_url),
            tronscan_api_key: non_empty("TRONSCAN_API_KEY"),
            tronscan_base_url: non_empty("TRONSCAN_BASE_URL")
                .unwrap_or(defaults.tronscan_base_url),
            solana_rpc_url: non_empty("SOLANA_RPC_URL")
                .or_else(|| non_empty("QUICKNODE_API_URL"))
                .unwrap_or(defaults.solana_rpc_url),
            http_timeout_secs: env::var("HTTP_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.http_timeout_secs),
            rpc_timeout_secs: env::var("RPC_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.rpc_timeout_secs),
            rpc_batch_timeout_secs: env::var("RPC_BATCH_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.rpc_batch_timeout_secs),
            solana_slot_duration_ms: env::var("SOLANA_SLOT_DURATION_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.solana_slot_duration_ms),
            solana_slot_buffer: env::var("SOLANA_SLOT_BUFFER")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.solana_slot_buffer),
            solana_slot_strategy: env::var("SOLANA_SLOT_STRATEGY")
                .ok()
                .and_then(|v| SlotStrategy::parse(&v))
                .unwrap_or(defaults.solana_slot_strategy),
            log_level: env::var("LOG_LEVEL").unwrap_or(defaults.log_level),
        }
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_secs(self.rpc_timeout_secs)
    }

    pub fn rpc_batch_timeout(&self) -> Duration {
        Duration::from_secs(self.rpc_batch_timeout_secs)
    }

    pub fn log_level_filter(&self) -> log::LevelFilter {
        self.log_level.parse().unwrap_or(log::LevelFilter::Info)
    }

    pub fn validate_and_log(&self) {
        // API keys are redacted, everything else is logged as-is.
        log::info!(
            "Configuration loaded: etherscan={} (key {}), tronscan={} (key {}), solana_rpc={}, \
             timeouts http={}s rpc={}s batch={}s, slot strategy={:?} ({}ms/slot, buffer {})",
            self.etherscan_base_url,
            if self.etherscan_api_key.is_some() { "set" } else { "missing" },
            self.tronscan_base_url,
            if self.tronscan_api_key.is_some() { "set" } else { "missing" },
            self.solana_rpc_url,
            self.http_timeout_secs,
            self.rpc_timeout_secs,
            self.rpc_batch_timeout_secs,
            self.solana_slot_strategy,
            self.solana_slot_duration_ms,
            self.solana_slot_buffer,
        );
        if self.etherscan_api_key.is_none() {
            log::warn!("ETHERSCAN_API_KEY not set: ethereum and bnb will be unavailable");
        }
        if self.tronscan_api_key.is_none() {
            log::warn!("TRONSCAN_API_KEY not set: tron will be unavailable");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_strategy_parse() {
        assert_eq!(SlotStrategy::parse("estimate"), Some(SlotStrategy::Estimate));
        assert_eq!(
            SlotStrategy::parse(" Binary_Search "),
            Some(SlotStrategy::BinarySearch)
        );
        assert_eq!(SlotStrategy::parse("bisect"), None);
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.http_timeout(), Duration::from_secs(15));
        assert_eq!(config.solana_slot_buffer, 5000);
        assert_eq!(config.solana_slot_strategy, SlotStrategy::Estimate);
        assert_eq!(config.log_level_filter(), log::LevelFilter::Info);
    }
}

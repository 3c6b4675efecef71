pub mod settings;

pub use settings::{Config, SlotStrategy};

use crate::error::AggregatorError;
use std::sync::Arc;

/// Loads the configuration from the environment (and `.env` if present),
/// validates it and logs a redacted summary.
pub fn load_config() -> Result<Arc<settings::Config>, AggregatorError> {
    dotenv::dotenv().ok(); // Load .env file if present, ignore errors

    let config = settings::Config::from_env();

    if config.solana_rpc_url.is_empty() {
        return Err(AggregatorError::ConfigError(
            "SOLANA_RPC_URL cannot be empty".to_string(),
        ));
    }
    if config.solana_slot_duration_ms == 0 {
        return Err(AggregatorError::ConfigError(
            "SOLANA_SLOT_DURATION_MS must be greater than zero".to_string(),
        ));
    }
    if config.http_timeout_secs == 0 || config.rpc_timeout_secs == 0 {
        return Err(AggregatorError::ConfigError(
            "timeouts must be greater than zero".to_string(),
        ));
    }

    config.validate_and_log();

    Ok(Arc::new(config))
}

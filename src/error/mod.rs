use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum AggregatorError {
    /// Chain identifier not known to the registry
    #[error("Unsupported blockchain: {0}")]
    UnsupportedChain(String),

    /// Chain known but missing credentials/endpoints at startup
    #[error("Blockchain not configured: {0}")]
    ChainNotConfigured(String),

    /// Invalid caller parameters (limit, addresses, ...)
    #[error("Invalid Input: {0}")]
    InvalidInput(String),

    /// Base58 / binary payload decoding problems
    #[error("Decode Error: {0}")]
    DecodeError(String),

    /// Network/connectivity issues
    #[error("Network Error: {0}")]
    NetworkError(String),

    /// JSON-RPC level errors returned by the node
    #[error("RPC Error: {0}")]
    RpcError(String),

    /// Unexpected upstream payload shape
    #[error("Parse Error: {0}")]
    ParseError(String),

    /// Configuration errors
    #[error("Config Error: {0}")]
    ConfigError(String),
}

impl From<serde_json::Error> for AggregatorError {
    fn from(err: serde_json::Error) -> Self {
        AggregatorError::ParseError(format!("JSON serialization/deserialization error: {}", err))
    }
}

impl From<reqwest::Error> for AggregatorError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            AggregatorError::NetworkError(format!("request timed out: {}", err))
        } else if err.is_decode() {
            AggregatorError::ParseError(format!("response body: {}", err))
        } else {
            AggregatorError::NetworkError(err.to_string())
        }
    }
}

impl From<bs58::decode::Error> for AggregatorError {
    fn from(err: bs58::decode::Error) -> Self {
        AggregatorError::DecodeError(format!("base58: {}", err))
    }
}

impl AggregatorError {
    /// Caller input errors are the only failures surfaced to the outer layer;
    /// everything else degrades to default values inside the core.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            AggregatorError::UnsupportedChain(_)
                | AggregatorError::ChainNotConfigured(_)
                | AggregatorError::InvalidInput(_)
        )
    }

    pub fn categorize(&self) -> ErrorCategory {
        match self {
            AggregatorError::UnsupportedChain(_)
            | AggregatorError::ChainNotConfigured(_)
            | AggregatorError::InvalidInput(_) => ErrorCategory::Input,
            AggregatorError::NetworkError(_) | AggregatorError::RpcError(_) => {
                ErrorCategory::Transport
            }
            AggregatorError::ParseError(_) | AggregatorError::DecodeError(_) => {
                ErrorCategory::Payload
            }
            AggregatorError::ConfigError(_) => ErrorCategory::Configuration,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Input,
    Transport,
    Payload,
    Configuration,
}

pub type Result<T> = std::result::Result<T, AggregatorError>;

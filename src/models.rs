// src/models.rs

use crate::utils::amount::format_units;
use chrono::{DateTime, Utc};
use num_bigint::BigUint;
use serde::{Deserialize, Serialize};
use std::fmt;

pub const MAX_DECIMALS: u8 = 18;

/// Clamps an upstream decimals value into `[0, 18]`.
pub fn clamp_decimals(decimals: u64) -> u8 {
    decimals.min(MAX_DECIMALS as u64) as u8
}

/// ISO-8601 (`YYYY-MM-DDTHH:MM:SSZ`) rendering of optional timestamps.
/// A missing timestamp serializes as an empty string.
pub mod iso_timestamp {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub const FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

    pub fn serialize<S>(value: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(ts) => serializer.serialize_str(&ts.format(FORMAT).to_string()),
            None => serializer.serialize_str(""),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        if s.is_empty() {
            return Ok(None);
        }
        NaiveDateTime::parse_from_str(&s, FORMAT)
            .map(|naive| Some(naive.and_utc()))
            .map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxStatus {
    Success,
    Failed,
    Pending,
}

impl fmt::Display for TxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TxStatus::Success => "success",
            TxStatus::Failed => "failed",
            TxStatus::Pending => "pending",
        };
        f.write_str(s)
    }
}

/// A chain's base currency balance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NativeToken {
    pub symbol: String,
    pub decimals: u8,
    pub balance: String,
    #[serde(skip)]
    pub raw_balance: BigUint,
}

impl NativeToken {
    pub fn new(symbol: &str, decimals: u8, raw_balance: BigUint) -> Self {
        Self {
            symbol: symbol.to_string(),
            decimals,
            balance: format_units(&raw_balance, decimals),
            raw_balance,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenHolding {
    pub token_address: String,
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
    pub balance: String,
    #[serde(skip)]
    pub raw_balance: BigUint,
}

impl TokenHolding {
    pub fn new(
        token_address: impl Into<String>,
        name: impl Into<String>,
        symbol: impl Into<String>,
        decimals: u8,
        raw_balance: BigUint,
    ) -> Self {
        Self {
            token_address: token_address.into(),
            name: name.into(),
            symbol: symbol.into(),
            decimals,
            balance: format_units(&raw_balance, decimals),
            raw_balance,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalletInfo {
    pub wallet_address: String,
    pub blockchain: String,
    pub native_token: NativeToken,
    pub tokens: Vec<TokenHolding>,
}

impl WalletInfo {
    /// All-defaults value returned when every upstream call failed.
    pub fn empty(wallet_address: &str, blockchain: &str, native: NativeToken) -> Self {
        Self {
            wallet_address: wallet_address.to_string(),
            blockchain: blockchain.to_string(),
            native_token: native,
            tokens: Vec::new(),
        }
    }
}

/// One normalized transfer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub hash: String,
    #[serde(with = "iso_timestamp")]
    pub timestamp: Option<DateTime<Utc>>,
    pub from: String,
    pub to: String,
    pub amount: String,
    pub amount_formatted: String,
    pub token_symbol: String,
    pub fee: String,
    pub fee_formatted: String,
    pub status: TxStatus,
    pub block_number: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NativeBalance {
    pub symbol: String,
    pub balance_raw: String,
    pub balance_formatted: String,
}

impl From<&NativeToken> for NativeBalance {
    fn from(native: &NativeToken) -> Self {
        Self {
            symbol: native.symbol.clone(),
            balance_raw: native.raw_balance.to_string(),
            balance_formatted: native.balance.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TxnTokenBalance {
    pub token_address: String,
    pub symbol: String,
    pub decimals: u8,
    pub balance_raw: String,
    pub balance_formatted: String,
}

impl From<&TokenHolding> for TxnTokenBalance {
    fn from(holding: &TokenHolding) -> Self {
        Self {
            token_address: holding.token_address.clone(),
            symbol: holding.symbol.clone(),
            decimals: holding.decimals,
            balance_raw: holding.raw_balance.to_string(),
            balance_formatted: holding.balance.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionList {
    pub wallet_address: String,
    pub blockchain: String,
    pub native_balance: NativeBalance,
    pub token_balances: Vec<TxnTokenBalance>,
    pub transactions: Vec<Transaction>,
}

impl TransactionList {
    pub fn new(wallet: &WalletInfo, transactions: Vec<Transaction>) -> Self {
        Self {
            wallet_address: wallet.wallet_address.clone(),
            blockchain: wallet.blockchain.clone(),
            native_balance: NativeBalance::from(&wallet.native_token),
            token_balances: wallet.tokens.iter().map(TxnTokenBalance::from).collect(),
            transactions,
        }
    }
}

/// Best-effort contract/mint metadata. Fields the upstream cannot provide
/// stay at their defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContractDetails {
    pub address: String,
    pub blockchain: String,
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
    pub total_supply: String,
    pub total_supply_formatted: String,
    pub creator: String,
    #[serde(with = "iso_timestamp")]
    pub creation_time: Option<DateTime<Utc>>,
    pub verified: bool,
    pub holders_count: u64,
    pub transfers_count: u64,
    pub mintable: bool,
    pub burnable: bool,
}

impl ContractDetails {
    pub fn new(address: &str, blockchain: &str) -> Self {
        Self {
            address: address.to_string(),
            blockchain: blockchain.to_string(),
            total_supply: "0".to_string(),
            total_supply_formatted: "0".to_string(),
            ..Default::default()
        }
    }

    pub fn set_total_supply(&mut self, raw: &BigUint) {
        self.total_supply = raw.to_string();
        self.total_supply_formatted = format_units(raw, self.decimals);
    }
}

/// Position range in chain-native units (block number or slot).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionRange {
    pub start: u64,
    pub end: u64,
}

impl PositionRange {
    /// The "no filter" range.
    pub const IDENTITY: PositionRange = PositionRange {
        start: 0,
        end: u64::MAX,
    };

    pub fn is_identity(&self) -> bool {
        *self == Self::IDENTITY
    }

    pub fn contains(&self, position: u64) -> bool {
        position >= self.start && position <= self.end
    }
}

impl Default for PositionRange {
    fn default() -> Self {
        Self::IDENTITY
    }
}

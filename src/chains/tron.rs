//! Tron through the TronScan REST API.

use super::{Chain, ChainClient, TransactionQuery};
use crate::config::Config;
use crate::dates::{parse_iso_date, DateRangeResolver, TimestampWindow};
use crate::error::Result;
use crate::models::{
    clamp_decimals, ContractDetails, NativeToken, PositionRange, TokenHolding, Transaction,
    TransactionList, TxStatus, WalletInfo,
};
use crate::normalize::{merge_streams, timestamp_auto, RawTransfer};
use crate::rpc::explorer::{
    bool_field, first_field, headers_with_api_key, str_field, u64_field, ExplorerHttp,
};
use crate::utils::amount::raw_from_value;
use crate::utils::{short_address, timing::Timer};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, info};
use num_bigint::BigUint;
use serde_json::Value;
use std::collections::HashSet;

const NATIVE_SYMBOL: &str = "TRX";
const NATIVE_DECIMALS: u8 = 6;
const DEFAULT_TRC20_DECIMALS: u64 = 6;
/// TronScan caps page sizes at 100.
const MAX_PAGE_SIZE: usize = 100;

#[derive(Debug, Clone, Copy)]
enum TransferKind {
    Native,
    Trc20 { default_symbol: &'static str },
}

pub struct TronClient {
    http: ExplorerHttp,
}

impl TronClient {
    pub fn new(base_url: &str, api_key: &str, config: &Config) -> Result<Self> {
        let headers = headers_with_api_key("tron-pro-api-key", Some(api_key));
        let http = ExplorerHttp::new(base_url, headers, config.http_timeout())?;
        Ok(Self { http })
    }

    async fn get(&self, path: &str, query: &[(&str, String)]) -> Option<Value> {
        self.http.get_opt(&format!("tron {}", path), path, query).await
    }

    async fn trc20_transfers_for_token(
        &self,
        address: &str,
        contract: &str,
        window: PositionRange,
        page_size: usize,
    ) -> Vec<Value> {
        let mut params = vec![
            ("limit", page_size.to_string()),
            ("start", "0".to_string()),
            ("contract_address", contract.to_string()),
            ("relatedAddress", address.to_string()),
            ("confirm", "true".to_string()),
            ("filterTokenValue", "1".to_string()),
        ];
        push_window(&mut params, window);
        let records = self
            .get("/api/token_trc20/transfers", &params)
            .await
            .map(|body| records_under(&body, &["token_transfers", "data"]))
            .unwrap_or_default();
        if !records.is_empty() {
            return records;
        }

        debug!(
            "No TRC-20 transfers for {} on primary endpoint; trying transfers-with-status",
            short_address(contract)
        );
        let mut params = vec![
            ("trc20Id", contract.to_string()),
            ("address", address.to_string()),
            ("limit", page_size.to_string()),
            ("start", "0".to_string()),
            ("direction", "0".to_string()),
            ("db_version", "1".to_string()),
            ("reverse", "true".to_string()),
        ];
        push_window(&mut params, window);
        self.get("/api/token_trc20/transfers-with-status", &params)
            .await
            .map(|body| records_under(&body, &["data"]))
            .unwrap_or_default()
    }

    async fn transfers(&self, path: &str, address: &str, window: PositionRange, page_size: usize) -> Vec<Value> {
        let mut params = vec![
            ("address", address.to_string()),
            ("limit", page_size.to_string()),
            ("start", "0".to_string()),
            ("direction", "0".to_string()),
            ("reverse", "true".to_string()),
            ("db_version", "1".to_string()),
        ];
        push_window(&mut params, window);
        self.get(path, &params)
            .await
            .map(|body| records_under(&body, &["data"]))
            .unwrap_or_default()
    }
}

#[async_trait]
impl ChainClient for TronClient {
    fn chain(&self) -> Chain {
        Chain::Tron
    }

    async fn get_wallet_info(&self, address: &str) -> Result<WalletInfo> {
        let account = self
            .get("/api/accountv2", &[("address", address.to_string())])
            .await
            .unwrap_or(Value::Null);

        let native = NativeToken::new(NATIVE_SYMBOL, NATIVE_DECIMALS, raw_from_value(account.get("balance")));
        let mut info = WalletInfo::empty(address, Chain::Tron.as_str(), native);

        let token_lists = ["withPriceTokens", "trc20token_balances"];
        let mut seen = HashSet::new();
        for token in token_lists
            .iter()
            .filter_map(|key| account.get(*key).and_then(Value::as_array))
            .flatten()
        {
            let token_id = str_field(token, &["tokenId", "contract_address"]);
            // "_" is TRX itself
            if token_id.trim().is_empty() || token_id == "_" || !seen.insert(token_id.clone()) {
                continue;
            }
            info.tokens.push(TokenHolding::new(
                token_id,
                str_field(token, &["tokenName", "name"]),
                str_field(token, &["tokenAbbr", "symbol"]),
                clamp_decimals(u64_field(token, &["tokenDecimal", "decimals"]).unwrap_or(0)),
                raw_from_value(token.get("balance")),
            ));
        }
        Ok(info)
    }

    async fn get_transactions(&self, query: &TransactionQuery) -> Result<TransactionList> {
        let mut timer = Timer::start("tron get_transactions");
        let window = TimestampWindow.resolve(&query.dates).await;
        let page_size = query.limit.min(MAX_PAGE_SIZE);

        let transactions = match &query.token {
            Some(contract) => {
                let records = self
                    .trc20_transfers_for_token(&query.address, contract, window, page_size)
                    .await;
                let kind = TransferKind::Trc20 { default_symbol: "TRC20" };
                merge_streams(
                    vec![records.iter().map(|r| parse_transfer(r, kind)).collect()],
                    query.limit,
                )
            }
            None => {
                let trx = self.transfers("/api/transfer/trx", &query.address, window, page_size).await;
                let trc20 = self.transfers("/api/transfer/trc20", &query.address, window, page_size).await;
                let kind = TransferKind::Trc20 { default_symbol: "TKN" };
                merge_streams(
                    vec![
                        trx.iter().map(|r| parse_transfer(r, TransferKind::Native)).collect(),
                        trc20.iter().map(|r| parse_transfer(r, kind)).collect(),
                    ],
                    query.limit,
                )
            }
        };
        timer.checkpoint("transfers");

        let wallet = self.get_wallet_info(&query.address).await?;
        timer.finish_with_threshold(5_000);
        Ok(TransactionList::new(&wallet, transactions))
    }

    async fn get_contract_details(&self, address: &str) -> Result<ContractDetails> {
        let mut details = ContractDetails::new(address, Chain::Tron.as_str());
        details.decimals = DEFAULT_TRC20_DECIMALS as u8;

        let token_body = self
            .get("/api/token_trc20", &[("contract", address.to_string())])
            .await;
        let token = token_body.as_ref().map(|body| {
            body.get("trc20_tokens")
                .and_then(|list| list.get(0))
                .unwrap_or(body)
        });

        let contract_body = self
            .get("/api/contract", &[("contract", address.to_string())])
            .await;
        let contract = contract_body
            .as_ref()
            .and_then(|body| body.get("data"))
            .and_then(|data| data.get(0));

        let mut supply = BigUint::default();
        if let Some(token) = token {
            details.name = str_field(token, &["name", "tokenName"]);
            details.symbol = str_field(token, &["symbol", "tokenAbbr"]);
            details.decimals = clamp_decimals(
                u64_field(token, &["decimals", "tokenDecimal"]).unwrap_or(DEFAULT_TRC20_DECIMALS),
            );
            supply = raw_from_value(first_field(
                token,
                &["total_supply_with_decimals", "totalSupplyWithDecimals", "total_supply", "totalSupply"],
            ));
            details.creator = str_field(token, &["owner_address", "ownerAddress"]);
            details.creation_time = first_field(token, &["issue_time", "createTime"]).and_then(issue_time);
            details.verified = bool_field(token, &["verified"]).unwrap_or(false);
            details.holders_count = u64_field(token, &["holders_count", "holders"]).unwrap_or(0);
            details.transfers_count =
                u64_field(token, &["transfer_count", "transfers", "transfer_num"]).unwrap_or(0);
            details.mintable = bool_field(token, &["mintable", "is_mintable"]).unwrap_or(false);
            details.burnable = bool_field(token, &["burnable", "is_burnable"]).unwrap_or(false);
        }
        details.set_total_supply(&supply);

        if let Some(contract) = contract {
            if details.name.is_empty() {
                details.name = str_field(contract, &["name"]);
            }
            if details.creator.is_empty() {
                details.creator = contract
                    .get("creator")
                    .map(|c| str_field(c, &["address"]))
                    .unwrap_or_default();
            }
            if details.creation_time.is_none() {
                details.creation_time = u64_field(contract, &["date_created"]).and_then(timestamp_auto);
            }
            if !details.verified {
                details.verified = u64_field(contract, &["verify_status"]) == Some(2);
            }
        }

        info!(
            "tron contract {} resolved: name={:?} symbol={:?} holders={}",
            short_address(address),
            details.name,
            details.symbol,
            details.holders_count
        );
        Ok(details)
    }
}

fn push_window(params: &mut Vec<(&str, String)>, window: PositionRange) {
    if window.start != PositionRange::IDENTITY.start {
        params.push(("min_timestamp", window.start.to_string()));
    }
    if window.end != PositionRange::IDENTITY.end {
        params.push(("max_timestamp", window.end.to_string()));
    }
}

/// Records of the first non-empty array among `keys`.
fn records_under(body: &Value, keys: &[&str]) -> Vec<Value> {
    keys.iter()
        .filter_map(|k| body.get(*k).and_then(Value::as_array))
        .find(|records| !records.is_empty())
        .map(|records| records.iter().filter(|r| r.is_object()).cloned().collect())
        .unwrap_or_default()
}

/// Issue time comes either as epoch (s or ms) or as `YYYY-MM-DD HH:MM:SS`.
fn issue_time(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => s
            .trim()
            .parse::<u64>()
            .ok()
            .and_then(timestamp_auto)
            .or_else(|| parse_iso_date(s)),
        other => crate::rpc::explorer::as_u64_lenient(other).and_then(timestamp_auto),
    }
}

fn transfer_status(record: &Value) -> TxStatus {
    let result = str_field(record, &["finalResult", "contractRet"]);
    if !result.is_empty() && !result.eq_ignore_ascii_case("SUCCESS") {
        return TxStatus::Failed;
    }
    if let Some(confirmed) = bool_field(record, &["confirmed"]) {
        return if confirmed { TxStatus::Success } else { TxStatus::Pending };
    }
    match record.get("status") {
        None | Some(Value::Null) => TxStatus::Success,
        Some(_) => {
            let ok = bool_field(record, &["status"]).unwrap_or(false)
                || str_field(record, &["status"]).eq_ignore_ascii_case("SUCCESS");
            if ok {
                TxStatus::Success
            } else {
                TxStatus::Failed
            }
        }
    }
}

fn parse_transfer(record: &Value, kind: TransferKind) -> Transaction {
    let token_info = record.get("tokenInfo").cloned().unwrap_or(Value::Null);

    let (decimals, symbol) = match kind {
        TransferKind::Native => (NATIVE_DECIMALS, NATIVE_SYMBOL.to_string()),
        TransferKind::Trc20 { default_symbol } => {
            let decimals = u64_field(record, &["decimals"])
                .filter(|d| *d > 0)
                .or_else(|| u64_field(&token_info, &["tokenDecimal", "decimals"]))
                .unwrap_or(DEFAULT_TRC20_DECIMALS);
            let symbol = [
                str_field(&token_info, &["tokenAbbr", "symbol"]),
                str_field(record, &["symbol", "tokenAbbr"]),
                str_field(&token_info, &["tokenName"]),
                str_field(record, &["token_name"]),
            ]
            .into_iter()
            .find(|s| !s.is_empty())
            .unwrap_or_else(|| default_symbol.to_string());
            (clamp_decimals(decimals), symbol)
        }
    };

    RawTransfer {
        hash: str_field(record, &["hash", "transaction_id"]),
        timestamp: u64_field(record, &["timestamp", "block_timestamp", "block_ts"]).and_then(timestamp_auto),
        from: str_field(record, &["from", "from_address", "ownerAddress"]),
        to: str_field(record, &["to", "to_address", "toAddress"]),
        amount: raw_from_value(first_field(record, &["amount", "amount_str", "quant", "value"])),
        decimals,
        token_symbol: symbol,
        fee: BigUint::from(u64_field(record, &["energy_fee", "fee", "cost"]).unwrap_or(0)),
        native_decimals: NATIVE_DECIMALS,
        status: transfer_status(record),
        position: u64_field(record, &["block", "blockNumber"]).unwrap_or(0),
    }
    .normalize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_parse_native_transfer() {
        let record = json!({
            "hash": "abc", "timestamp": 1_700_000_000_000u64, "ownerAddress": "TFrom",
            "toAddress": "TTo", "amount": 2_500_000, "fee": "1100000", "block": 55, "confirmed": true,
        });
        let tx = parse_transfer(&record, TransferKind::Native);
        assert_eq!(tx.amount_formatted, "2.5");
        assert_eq!(tx.fee_formatted, "1.1");
        assert_eq!(tx.from, "TFrom");
        assert_eq!(tx.token_symbol, "TRX");
        assert_eq!(tx.status, TxStatus::Success);
        assert_eq!(tx.timestamp.map(|t| t.timestamp()), Some(1_700_000_000));
    }

    #[test]
    fn test_parse_trc20_transfer_defaults_to_six_decimals() {
        let record = json!({
            "transaction_id": "def", "block_ts": 1_700_000_000u64, "from_address": "A", "to_address": "B",
            "quant": "10", "confirmed": false,
        });
        let tx = parse_transfer(&record, TransferKind::Trc20 { default_symbol: "TRC20" });
        assert_eq!(tx.hash, "def");
        assert_eq!(tx.amount_formatted, "0.00001");
        assert_eq!(tx.token_symbol, "TRC20");
        assert_eq!(tx.status, TxStatus::Pending);
    }

    #[test]
    fn test_parse_trc20_uses_token_info() {
        let record = json!({
            "hash": "x", "amount": "123456789", "tokenInfo": {"tokenAbbr": "USDT", "tokenDecimal": 6},
            "contractRet": "OUT_OF_ENERGY",
        });
        let tx = parse_transfer(&record, TransferKind::Trc20 { default_symbol: "TKN" });
        assert_eq!(tx.token_symbol, "USDT");
        assert_eq!(tx.amount_formatted, "123.456789");
        assert_eq!(tx.status, TxStatus::Failed);
    }

    #[test]
    fn test_records_under_falls_through_empty_arrays() {
        let body = json!({"token_transfers": [], "data": [{"hash": "a"}, "junk"]});
        let records = records_under(&body, &["token_transfers", "data"]);
        assert_eq!(records, vec![json!({"hash": "a"})]);
    }

    #[test]
    fn test_issue_time_formats() {
        let expected = Some(1_555_418_480);
        assert_eq!(issue_time(&json!("2019-04-16 12:41:20")).map(|t| t.timestamp()), expected);
        assert_eq!(issue_time(&json!(1_555_418_480_000u64)).map(|t| t.timestamp()), expected);
        assert_eq!(issue_time(&json!("1555418480")).map(|t| t.timestamp()), expected);
    }

    #[test]
    fn test_push_window_only_sets_bounded_sides() {
        let mut params = Vec::new();
        push_window(&mut params, PositionRange { start: 10, end: u64::MAX });
        assert_eq!(params, vec![("min_timestamp", "10".to_string())]);
    }
}

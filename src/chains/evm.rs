//! Ethereum and BNB Smart Chain through the Etherscan v2 multichain API.

use super::{Chain, ChainClient, TransactionQuery};
use crate::config::Config;
use crate::dates::{BlockByTime, BlockLookupResolver, Closest, DateRangeResolver};
use crate::error::Result;
use crate::models::{
    clamp_decimals, ContractDetails, NativeToken, PositionRange, TokenHolding, Transaction,
    TransactionList, TxStatus, WalletInfo,
};
use crate::normalize::{merge_streams, timestamp_auto, timestamp_from_secs, RawTransfer};
use crate::rpc::explorer::{as_u64_lenient, str_field, u64_field, ExplorerHttp};
use crate::utils::amount::{parse_hex_quantity, raw_from_value, SignedBalance};
use crate::utils::{same_address, short_address, timing::Timer};
use async_trait::async_trait;
use log::{debug, info, warn};
use num_bigint::BigUint;
use reqwest::header::HeaderMap;
use serde_json::Value;
use std::collections::HashMap;

const NATIVE_DECIMALS: u8 = 18;
const DEFAULT_TOKEN_DECIMALS: u64 = 18;
const UNKNOWN_TOKEN_SYMBOL: &str = "TKN";
/// Etherscan rejects page sizes above this.
const MAX_PAGE_SIZE: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvmNetwork {
    Ethereum,
    Bnb,
}

impl EvmNetwork {
    pub fn chain_id(&self) -> u64 {
        match self {
            EvmNetwork::Ethereum => 1,
            EvmNetwork::Bnb => 56,
        }
    }

    pub fn native_symbol(&self) -> &'static str {
        match self {
            EvmNetwork::Ethereum => "ETH",
            EvmNetwork::Bnb => "BNB",
        }
    }

    pub fn chain(&self) -> Chain {
        match self {
            EvmNetwork::Ethereum => Chain::Ethereum,
            EvmNetwork::Bnb => Chain::Bnb,
        }
    }
}

pub struct EvmClient {
    network: EvmNetwork,
    http: ExplorerHttp,
    api_key: String,
}

impl EvmClient {
    pub fn new(network: EvmNetwork, base_url: &str, api_key: &str, config: &Config) -> Result<Self> {
        // the API key travels as a query parameter
        let http = ExplorerHttp::new(base_url, HeaderMap::new(), config.http_timeout())?;
        Ok(Self {
            network,
            http,
            api_key: api_key.to_string(),
        })
    }

    /// One explorer call. Returns the `result` field of successful replies.
    ///
    /// Regular modules flag success with `status == "1"`; proxy-module
    /// replies are JSON-RPC shaped and carry no status at all.
    async fn call(&self, label: &str, params: &[(&str, String)]) -> Option<Value> {
        let mut query: Vec<(&str, String)> = params.to_vec();
        query.push(("chainid", self.network.chain_id().to_string()));
        query.push(("apikey", self.api_key.clone()));

        let label = format!("{} {}", self.network.chain(), label);
        let body = self.http.get_opt(&label, "", &query).await?;
        unwrap_result(&label, body)
    }

    async fn token_transfers(
        &self,
        address: &str,
        contract: Option<&str>,
        range: PositionRange,
        page_size: Option<usize>,
    ) -> Vec<Value> {
        let mut params = vec![
            ("module", "account".to_string()),
            ("action", "tokentx".to_string()),
            ("address", address.to_string()),
            ("sort", "desc".to_string()),
        ];
        if let Some(contract) = contract {
            params.push(("contractaddress", contract.to_string()));
        }
        push_block_range(&mut params, range);
        if let Some(size) = page_size {
            params.push(("page", "1".to_string()));
            params.push(("offset", size.min(MAX_PAGE_SIZE).to_string()));
        }
        as_records(self.call("tokentx", &params).await)
    }

    async fn native_transfers(&self, address: &str, range: PositionRange, page_size: usize) -> Vec<Value> {
        let mut params = vec![
            ("module", "account".to_string()),
            ("action", "txlist".to_string()),
            ("address", address.to_string()),
            ("sort", "desc".to_string()),
            ("page", "1".to_string()),
            ("offset", page_size.min(MAX_PAGE_SIZE).to_string()),
        ];
        push_block_range(&mut params, range);
        as_records(self.call("txlist", &params).await)
    }

    fn native_transaction(&self, record: &Value) -> Transaction {
        let status = match record.get("isError").and_then(Value::as_str) {
            Some("0") => TxStatus::Success,
            _ => TxStatus::Failed,
        };
        RawTransfer {
            hash: str_field(record, &["hash"]),
            timestamp: record_timestamp(record),
            from: str_field(record, &["from"]),
            to: str_field(record, &["to"]),
            amount: raw_from_value(record.get("value")),
            decimals: NATIVE_DECIMALS,
            token_symbol: self.network.native_symbol().to_string(),
            fee: gas_fee(record),
            native_decimals: NATIVE_DECIMALS,
            status,
            position: u64_field(record, &["blockNumber"]).unwrap_or(0),
        }
        .normalize()
    }

    /// Creation time via `creation tx → block number → block timestamp`.
    async fn creation_time(&self, tx_hash: &str) -> Option<i64> {
        let tx = self
            .call(
                "eth_getTransactionByHash",
                &[
                    ("module", "proxy".to_string()),
                    ("action", "eth_getTransactionByHash".to_string()),
                    ("txhash", tx_hash.to_string()),
                ],
            )
            .await?;
        let block_tag = tx.get("blockNumber").and_then(Value::as_str)?.to_string();
        if parse_hex_quantity(&block_tag).unwrap_or(0) == 0 {
            return None;
        }
        let block = self
            .call(
                "eth_getBlockByNumber",
                &[
                    ("module", "proxy".to_string()),
                    ("action", "eth_getBlockByNumber".to_string()),
                    ("tag", block_tag),
                    ("boolean", "false".to_string()),
                ],
            )
            .await?;
        let ts = block.get("timestamp").and_then(Value::as_str).and_then(parse_hex_quantity)?;
        i64::try_from(ts).ok()
    }
}

#[async_trait]
impl BlockByTime for EvmClient {
    async fn block_by_time(&self, unix_secs: i64, closest: Closest) -> Option<u64> {
        let result = self
            .call(
                "getblocknobytime",
                &[
                    ("module", "block".to_string()),
                    ("action", "getblocknobytime".to_string()),
                    ("timestamp", unix_secs.max(0).to_string()),
                    ("closest", closest.as_str().to_string()),
                ],
            )
            .await?;
        as_u64_lenient(&result)
    }
}

#[async_trait]
impl ChainClient for EvmClient {
    fn chain(&self) -> Chain {
        self.network.chain()
    }

    async fn get_wallet_info(&self, address: &str) -> Result<WalletInfo> {
        let balance = self
            .call(
                "balance",
                &[
                    ("module", "account".to_string()),
                    ("action", "balance".to_string()),
                    ("address", address.to_string()),
                    ("tag", "latest".to_string()),
                ],
            )
            .await;
        let native = NativeToken::new(
            self.network.native_symbol(),
            NATIVE_DECIMALS,
            raw_from_value(balance.as_ref()),
        );

        let records = self
            .token_transfers(address, None, PositionRange::IDENTITY, None)
            .await;
        let tokens = reconstruct_holdings(address, &records);
        debug!(
            "{} wallet {}: {} token contracts in transfer history",
            self.network.chain(),
            short_address(address),
            tokens.len()
        );

        let mut info = WalletInfo::empty(address, self.network.chain().as_str(), native);
        info.tokens = tokens;
        Ok(info)
    }

    async fn get_transactions(&self, query: &TransactionQuery) -> Result<TransactionList> {
        let mut timer = Timer::start(&format!("{} get_transactions", self.network.chain()));
        let range = BlockLookupResolver::new(self).resolve(&query.dates).await;
        timer.checkpoint("date range");

        let transactions = match &query.token {
            Some(contract) => {
                let records = self
                    .token_transfers(&query.address, Some(contract), range, Some(query.limit))
                    .await;
                merge_streams(vec![records.iter().map(token_transaction).collect()], query.limit)
            }
            None => {
                let native = self.native_transfers(&query.address, range, query.limit).await;
                let tokens = self
                    .token_transfers(&query.address, None, range, Some(query.limit))
                    .await;
                merge_streams(
                    vec![
                        native.iter().map(|r| self.native_transaction(r)).collect(),
                        tokens.iter().map(token_transaction).collect(),
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
        let mut details = ContractDetails::new(address, self.network.chain().as_str());
        details.symbol = UNKNOWN_TOKEN_SYMBOL.to_string();
        details.decimals = DEFAULT_TOKEN_DECIMALS as u8;

        let source = self
            .call(
                "getsourcecode",
                &[
                    ("module", "contract".to_string()),
                    ("action", "getsourcecode".to_string()),
                    ("address", address.to_string()),
                ],
            )
            .await;
        if let Some(entry) = source.as_ref().and_then(|s| s.get(0)) {
            details.name = str_field(entry, &["ContractName"]);
            let code = str_field(entry, &["SourceCode"]);
            details.verified = !code.is_empty();
            let (mintable, burnable) = scan_source_heuristics(&code);
            details.mintable = mintable;
            details.burnable = burnable;
        }

        // One transfer record carries the token's name, symbol and decimals.
        let sample = self
            .call(
                "tokentx",
                &[
                    ("module", "account".to_string()),
                    ("action", "tokentx".to_string()),
                    ("contractaddress", address.to_string()),
                    ("page", "1".to_string()),
                    ("offset", "1".to_string()),
                    ("sort", "desc".to_string()),
                ],
            )
            .await;
        if let Some(record) = sample.as_ref().and_then(|s| s.get(0)) {
            let token_name = str_field(record, &["tokenName"]);
            if !token_name.is_empty() {
                details.name = token_name;
            }
            let symbol = str_field(record, &["tokenSymbol"]);
            if !symbol.is_empty() {
                details.symbol = symbol;
            }
            details.decimals = clamp_decimals(
                u64_field(record, &["tokenDecimal"]).unwrap_or(DEFAULT_TOKEN_DECIMALS),
            );
        }

        let supply = self
            .call(
                "tokensupply",
                &[
                    ("module", "stats".to_string()),
                    ("action", "tokensupply".to_string()),
                    ("contractaddress", address.to_string()),
                ],
            )
            .await;
        details.set_total_supply(&raw_from_value(supply.as_ref()));

        let creation = self
            .call(
                "getcontractcreation",
                &[
                    ("module", "contract".to_string()),
                    ("action", "getcontractcreation".to_string()),
                    ("contractaddresses", address.to_string()),
                ],
            )
            .await;
        if let Some(entry) = creation.as_ref().and_then(|c| c.get(0)) {
            details.creator = str_field(entry, &["contractCreator"]);
            // newer explorer versions include the timestamp directly
            let direct = u64_field(entry, &["timestamp"]).and_then(timestamp_auto);
            details.creation_time = match direct {
                Some(ts) => Some(ts),
                None => {
                    let tx_hash = str_field(entry, &["txHash"]);
                    if tx_hash.is_empty() {
                        None
                    } else {
                        self.creation_time(&tx_hash).await.and_then(timestamp_from_secs)
                    }
                }
            };
        }

        info!(
            "{} contract {} resolved: name={:?} symbol={:?} verified={}",
            self.network.chain(),
            short_address(address),
            details.name,
            details.symbol,
            details.verified
        );
        Ok(details)
    }
}

fn unwrap_result(label: &str, body: Value) -> Option<Value> {
    match body.get("status").and_then(Value::as_str) {
        Some("1") => body.get("result").cloned(),
        Some(_) => {
            let message = str_field(&body, &["message"]);
            let detail = body.get("result").and_then(Value::as_str).unwrap_or_default();
            if message.starts_with("No ") {
                debug!("{}: {}", label, message);
            } else {
                warn!("{}: explorer error {} {}", label, message, detail);
            }
            None
        }
        None => {
            if let Some(error) = body.get("error") {
                warn!("{}: proxy error {}", label, error);
                return None;
            }
            body.get("result").filter(|r| !r.is_null()).cloned()
        }
    }
}

fn as_records(result: Option<Value>) -> Vec<Value> {
    match result {
        Some(Value::Array(records)) => records,
        _ => Vec::new(),
    }
}

fn push_block_range(params: &mut Vec<(&str, String)>, range: PositionRange) {
    params.push(("startblock", range.start.to_string()));
    if range.end != PositionRange::IDENTITY.end {
        params.push(("endblock", range.end.to_string()));
    }
}

fn record_timestamp(record: &Value) -> Option<chrono::DateTime<chrono::Utc>> {
    u64_field(record, &["timeStamp"]).and_then(timestamp_auto)
}

fn gas_fee(record: &Value) -> BigUint {
    raw_from_value(record.get("gasPrice")) * raw_from_value(record.get("gasUsed"))
}

fn token_decimals(record: &Value) -> u8 {
    clamp_decimals(u64_field(record, &["tokenDecimal"]).unwrap_or(DEFAULT_TOKEN_DECIMALS))
}

/// Token transfers carry no error flag; they are listed only when they
/// succeeded.
fn token_transaction(record: &Value) -> Transaction {
    let symbol = str_field(record, &["tokenSymbol"]);
    RawTransfer {
        hash: str_field(record, &["hash"]),
        timestamp: record_timestamp(record),
        from: str_field(record, &["from"]),
        to: str_field(record, &["to"]),
        amount: raw_from_value(record.get("value")),
        decimals: token_decimals(record),
        token_symbol: if symbol.is_empty() { UNKNOWN_TOKEN_SYMBOL.to_string() } else { symbol },
        fee: gas_fee(record),
        native_decimals: NATIVE_DECIMALS,
        status: TxStatus::Success,
        position: u64_field(record, &["blockNumber"]).unwrap_or(0),
    }
    .normalize()
}

/// One holding per distinct contract, in order of first appearance, with the
/// balance rebuilt from signed transfer amounts and clamped at zero.
fn reconstruct_holdings(wallet: &str, records: &[Value]) -> Vec<TokenHolding> {
    let mut order: Vec<String> = Vec::new();
    let mut balances: HashMap<String, (SignedBalance, &Value)> = HashMap::new();

    for record in records {
        let contract = str_field(record, &["contractAddress"]);
        if contract.is_empty() {
            continue;
        }
        let key = contract.to_ascii_lowercase();
        let (balance, _) = balances.entry(key.clone()).or_insert_with(|| {
            order.push(key.clone());
            (SignedBalance::default(), record)
        });
        let amount = raw_from_value(record.get("value"));
        if same_address(&str_field(record, &["to"]), wallet) {
            balance.credit(&amount);
        } else if same_address(&str_field(record, &["from"]), wallet) {
            balance.debit(&amount);
        }
    }

    order
        .into_iter()
        .filter_map(|key| {
            let (balance, first) = balances.remove(&key)?;
            let symbol = str_field(first, &["tokenSymbol"]);
            Some(TokenHolding::new(
                str_field(first, &["contractAddress"]),
                str_field(first, &["tokenName"]),
                if symbol.is_empty() { UNKNOWN_TOKEN_SYMBOL.to_string() } else { symbol },
                token_decimals(first),
                balance.clamped(),
            ))
        })
        .collect()
}

/// Low-confidence legacy heuristic: flags a contract as mintable/burnable when
/// its verified source merely contains the substrings "mint"/"burn". Comments
/// and unrelated identifiers produce false positives.
pub fn scan_source_heuristics(source: &str) -> (bool, bool) {
    let lower = source.to_ascii_lowercase();
    (lower.contains("mint"), lower.contains("burn"))
}

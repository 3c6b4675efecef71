//! Solana through JSON-RPC.
//!
//! Every lookup that can be shared between requests (token-account owners,
//! metadata, a wallet's token accounts per mint, slot times) goes through the
//! client's [`CacheLayer`].

pub mod instructions;
pub mod pda;

use self::instructions::{find_transfer, ParsedTransfer, TransferAsset};
use self::pda::AccountSource;
use super::{Chain, ChainClient, TransactionQuery};
use crate::cache::{generate_key, CacheLayer, CacheStats, TokenMetadata};
use crate::config::{Config, SlotStrategy};
use crate::dates::{DateRange, DateRangeResolver, SlotClock, SlotResolver};
use crate::error::{AggregatorError, Result};
use crate::models::{
    clamp_decimals, ContractDetails, NativeToken, PositionRange, TokenHolding, Transaction,
    TransactionList, TxStatus, WalletInfo,
};
use crate::normalize::{merge_streams, timestamp_from_secs, RawTransfer};
use crate::rpc::explorer::{as_u64_lenient, str_field, u64_field};
use crate::rpc::{BatchRpcClient, RpcRequest};
use crate::utils::amount::raw_from_value;
use crate::utils::{short_address, timing::Timer};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::Utc;
use itertools::Itertools;
use log::{debug, info, warn};
use num_bigint::BigUint;
use serde_json::{json, Value};
use std::collections::HashMap;

pub const TOKEN_PROGRAM_ID: &str = "TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA";
const NATIVE_SYMBOL: &str = "SOL";
const NATIVE_DECIMALS: u8 = 9;
const UNKNOWN_TOKEN_SYMBOL: &str = "SPL";
/// Upper bound the RPC accepts for `getSignaturesForAddress`.
const MAX_SIGNATURES: usize = 1_000;
/// Signatures are over-fetched since token queries skip transactions without
/// a transfer of the requested mint.
const SIGNATURE_OVERFETCH: usize = 3;
const TX_BATCH_SIZE: usize = 50;

/// One entry of `getSignaturesForAddress`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureInfo {
    pub signature: String,
    pub slot: u64,
    pub block_time: Option<i64>,
}

impl SignatureInfo {
    /// Exact time filter when the block time is known, slot range otherwise.
    fn within(&self, dates: &DateRange, slots: PositionRange) -> bool {
        match self.block_time {
            Some(ts) => dates.contains_secs(ts),
            None => slots.contains(self.slot),
        }
    }
}

pub fn parse_signatures(result: &Value) -> Vec<SignatureInfo> {
    result
        .as_array()
        .map(|entries| {
            entries
                .iter()
                .filter_map(|e| {
                    let signature = e.get("signature")?.as_str()?.to_string();
                    Some(SignatureInfo {
                        signature,
                        slot: u64_field(e, &["slot"]).unwrap_or(0),
                        block_time: e.get("blockTime").and_then(Value::as_i64),
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

/// A parsed SPL token account as listed by `getTokenAccountsByOwner`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenAccount {
    pub pubkey: String,
    pub mint: String,
    pub amount: BigUint,
    pub decimals: u8,
}

pub fn parse_token_accounts(result: &Value) -> Vec<TokenAccount> {
    result
        .get("value")
        .and_then(Value::as_array)
        .map(|accounts| {
            accounts
                .iter()
                .filter_map(|account| {
                    let parsed = account.pointer("/account/data/parsed")?;
                    if parsed.get("type").and_then(Value::as_str) != Some("account") {
                        return None;
                    }
                    let info = parsed.get("info")?;
                    let mint = str_field(info, &["mint"]);
                    if mint.is_empty() {
                        return None;
                    }
                    Some(TokenAccount {
                        pubkey: str_field(account, &["pubkey"]),
                        mint,
                        amount: raw_from_value(info.pointer("/tokenAmount/amount")),
                        decimals: clamp_decimals(
                            info.pointer("/tokenAmount/decimals")
                                .and_then(as_u64_lenient)
                                .unwrap_or(0),
                        ),
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

fn parsed_account_params(address: &str) -> Value {
    json!([address, {"encoding": "jsonParsed"}])
}

/// `info` of a `jsonParsed` account whose parsed type is `kind`.
fn parsed_info<'a>(account: &'a Value, kind: &str) -> Option<&'a Value> {
    account
        .pointer("/value/data/parsed")
        .filter(|p| p.get("type").and_then(Value::as_str) == Some(kind))
        .and_then(|p| p.get("info"))
}

/// Mint and decimals of a token account or of a mint account itself.
fn mint_decimals(account: &Value, address: &str) -> Option<(String, u8)> {
    if let Some(info) = parsed_info(account, "mint") {
        let decimals = u64_field(info, &["decimals"])?;
        return Some((address.to_string(), clamp_decimals(decimals)));
    }
    let info = parsed_info(account, "account")?;
    let mint = str_field(info, &["mint"]);
    let decimals = info.pointer("/tokenAmount/decimals").and_then(as_u64_lenient)?;
    (!mint.is_empty()).then(|| (mint, clamp_decimals(decimals)))
}

pub struct SolanaClient {
    rpc: BatchRpcClient,
    cache: CacheLayer,
    slot_strategy: SlotStrategy,
    slot_duration_ms: u64,
    slot_buffer: u64,
}

impl SolanaClient {
    pub fn new(config: &Config) -> Result<Self> {
        let rpc = BatchRpcClient::new(
            &config.solana_rpc_url,
            config.rpc_timeout(),
            config.rpc_batch_timeout(),
        )?;
        Ok(Self {
            rpc,
            cache: CacheLayer::new(),
            slot_strategy: config.solana_slot_strategy,
            slot_duration_ms: config.solana_slot_duration_ms,
            slot_buffer: config.solana_slot_buffer,
        })
    }

    /// Metadata of `mint`. A finished search is cached whatever it found; a
    /// search cut short by a failed lookup is not.
    async fn metadata(&self, mint: &str) -> Option<TokenMetadata> {
        let lookup = self
            .cache
            .token_metadata
            .get_or_fetch(mint.to_string(), || pda::fetch_metadata(self, mint))
            .await;
        match lookup {
            Ok(found) => found,
            Err(e) => {
                warn!("Metadata lookup for {} failed: {}", short_address(mint), e);
                None
            }
        }
    }

    async fn symbol_for(&self, mint: &str) -> String {
        self.metadata(mint)
            .await
            .map(|m| m.symbol)
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| UNKNOWN_TOKEN_SYMBOL.to_string())
    }

    async fn signatures_for(&self, address: &str, limit: usize) -> Vec<SignatureInfo> {
        self.rpc
            .call_opt(
                "getSignaturesForAddress",
                json!([address, {"limit": limit.min(MAX_SIGNATURES)}]),
            )
            .await
            .map(|r| parse_signatures(&r))
            .unwrap_or_default()
    }

    /// Token accounts `wallet` holds for `mint`. Only successful lookups are
    /// cached.
    async fn token_accounts_for_mint(&self, wallet: &str, mint: &str) -> Vec<String> {
        let key = generate_key(wallet, &[mint]);
        if let Some(hit) = self.cache.token_accounts.get(&key) {
            return hit;
        }
        let Some(result) = self
            .rpc
            .call_opt(
                "getTokenAccountsByOwner",
                json!([wallet, {"mint": mint}, {"encoding": "jsonParsed"}]),
            )
            .await
        else {
            return Vec::new();
        };
        let pubkeys = result
            .get("value")
            .and_then(Value::as_array)
            .map(|accounts| {
                accounts
                    .iter()
                    .map(|a| str_field(a, &["pubkey"]))
                    .filter(|p| !p.is_empty())
                    .collect()
            })
            .unwrap_or_default();
        self.cache.token_accounts.insert(key, pubkeys)
    }

    async fn token_signatures(
        &self,
        wallet: &str,
        mint: &str,
        fetch_limit: usize,
        limit: usize,
        dates: &DateRange,
        slots: PositionRange,
    ) -> Vec<SignatureInfo> {
        let accounts = self.token_accounts_for_mint(wallet, mint).await;
        debug!(
            "{} token accounts for {} / {}",
            accounts.len(),
            short_address(wallet),
            short_address(mint)
        );
        let mut signatures = Vec::new();
        for account in &accounts {
            signatures.extend(self.signatures_for(account, fetch_limit).await);
        }
        let mut signatures: Vec<SignatureInfo> = signatures
            .into_iter()
            .filter(|s| s.within(dates, slots))
            .unique_by(|s| s.signature.clone())
            .collect();
        signatures.sort_by(|a, b| b.block_time.cmp(&a.block_time));
        signatures.truncate(limit);
        signatures
    }

    /// Wallet owning each token account, through the owner cache. Uncached
    /// accounts are looked up in one batch; accounts without a parsed owner
    /// are absent from the result.
    async fn resolve_owners(&self, accounts: &[String]) -> HashMap<String, String> {
        let mut resolved = HashMap::new();
        let mut missing = Vec::new();
        for account in accounts.iter().filter(|a| !a.is_empty()).unique() {
            match self.cache.owners.get(account) {
                Some(Some(owner)) => {
                    resolved.insert(account.clone(), owner);
                }
                Some(None) => {}
                None => missing.push(account.clone()),
            }
        }
        if missing.is_empty() {
            return resolved;
        }

        let requests: Vec<RpcRequest> = missing
            .iter()
            .map(|a| RpcRequest::new("getAccountInfo", parsed_account_params(a)))
            .collect();
        let replies = self.rpc.batch(&requests).await;
        for (account, reply) in missing.into_iter().zip(replies) {
            // a failed lookup is retried next time
            let Some(reply) = reply else { continue };
            let owner = reply
                .pointer("/value/data/parsed/info/owner")
                .and_then(Value::as_str)
                .map(str::to_string);
            if let Some(owner) = self.cache.owners.insert(account.clone(), owner) {
                resolved.insert(account, owner);
            }
        }
        resolved
    }

    /// Mint and decimals for token transfers whose transaction carried
    /// neither. The mint account answers when the mint is known, the source
    /// token account otherwise.
    async fn resolve_token_info(
        &self,
        transfers: &[&ParsedTransfer],
        mint_filter: Option<&str>,
    ) -> HashMap<String, (String, u8)> {
        let lookups: Vec<String> = transfers
            .iter()
            .filter_map(|t| match &t.asset {
                TransferAsset::Token { mint, decimals: None } => mint
                    .clone()
                    .or_else(|| mint_filter.map(str::to_string))
                    .or_else(|| (!t.source.is_empty()).then(|| t.source.clone())),
                _ => None,
            })
            .unique()
            .collect();
        if lookups.is_empty() {
            return HashMap::new();
        }

        let requests: Vec<RpcRequest> = lookups
            .iter()
            .map(|a| RpcRequest::new("getAccountInfo", parsed_account_params(a)))
            .collect();
        let replies = self.rpc.batch(&requests).await;
        lookups
            .into_iter()
            .zip(replies)
            .filter_map(|(address, reply)| {
                let info = mint_decimals(reply.as_ref()?, &address)?;
                Some((address, info))
            })
            .collect()
    }

    /// Fetches the transactions behind `signatures` in batches until `limit`
    /// are found. A token query keeps only transactions with a transfer of
    /// that mint; otherwise a transaction without a transfer is kept as a
    /// zero-amount SOL record without parties.
    async fn load_transfers(
        &self,
        signatures: &[SignatureInfo],
        mint_filter: Option<&str>,
        limit: usize,
    ) -> Vec<Transaction> {
        let mut found: Vec<(&SignatureInfo, Value, Option<ParsedTransfer>)> = Vec::new();
        for chunk in signatures.chunks(TX_BATCH_SIZE) {
            let requests: Vec<RpcRequest> = chunk
                .iter()
                .map(|s| {
                    RpcRequest::new(
                        "getTransaction",
                        json!([s.signature, {"encoding": "jsonParsed", "maxSupportedTransactionVersion": 0}]),
                    )
                })
                .collect();
            let replies = self.rpc.batch(&requests).await;
            for (sig, reply) in chunk.iter().zip(replies) {
                let Some(tx) = reply else { continue };
                let transfer = find_transfer(&tx, mint_filter);
                if transfer.is_some() || mint_filter.is_none() {
                    found.push((sig, tx, transfer));
                }
            }
            if found.len() >= limit {
                break;
            }
        }

        let token_transfers: Vec<&ParsedTransfer> = found
            .iter()
            .filter_map(|(_, _, t)| t.as_ref())
            .filter(|t| matches!(t.asset, TransferAsset::Token { .. }))
            .collect();
        let token_accounts: Vec<String> = token_transfers
            .iter()
            .flat_map(|t| [t.source.clone(), t.destination.clone()])
            .collect();
        let token_info = self.resolve_token_info(&token_transfers, mint_filter).await;
        let owners = self.resolve_owners(&token_accounts).await;
        let wallet_of = |account: &str| owners.get(account).cloned().unwrap_or_else(|| account.to_string());

        let mut transactions = Vec::with_capacity(found.len());
        for (sig, tx, transfer) in found {
            let (from, to, amount, decimals, symbol) = match transfer {
                None => (
                    String::new(),
                    String::new(),
                    BigUint::default(),
                    NATIVE_DECIMALS,
                    NATIVE_SYMBOL.to_string(),
                ),
                Some(ParsedTransfer {
                    source,
                    destination,
                    amount,
                    asset: TransferAsset::Lamports,
                }) => (source, destination, amount, NATIVE_DECIMALS, NATIVE_SYMBOL.to_string()),
                Some(ParsedTransfer {
                    source,
                    destination,
                    amount,
                    asset: TransferAsset::Token { mint, decimals },
                }) => {
                    let known_mint = mint.or_else(|| mint_filter.map(str::to_string));
                    let looked_up = known_mint
                        .as_ref()
                        .or(Some(&source))
                        .and_then(|a| token_info.get(a));
                    let mint = known_mint.or_else(|| looked_up.map(|(m, _)| m.clone()));
                    let decimals = decimals.or_else(|| looked_up.map(|(_, d)| *d)).unwrap_or_else(|| {
                        debug!("No decimals for {}; amount left unscaled", sig.signature);
                        0
                    });
                    let symbol = match mint.as_deref() {
                        Some(mint) => self.symbol_for(mint).await,
                        None => UNKNOWN_TOKEN_SYMBOL.to_string(),
                    };
                    (wallet_of(&source), wallet_of(&destination), amount, decimals, symbol)
                }
            };
            let status = match tx.pointer("/meta/err") {
                None | Some(Value::Null) => TxStatus::Success,
                Some(_) => TxStatus::Failed,
            };
            let hash = tx
                .pointer("/transaction/signatures/0")
                .and_then(Value::as_str)
                .unwrap_or(sig.signature.as_str())
                .to_string();
            let block_time = tx.get("blockTime").and_then(Value::as_i64).or(sig.block_time);

            transactions.push(
                RawTransfer {
                    hash,
                    timestamp: block_time.and_then(timestamp_from_secs),
                    from,
                    to,
                    amount,
                    decimals,
                    token_symbol: symbol,
                    fee: raw_from_value(tx.pointer("/meta/fee")),
                    native_decimals: NATIVE_DECIMALS,
                    status,
                    position: u64_field(&tx, &["slot"]).unwrap_or(sig.slot),
                }
                .normalize(),
            );
        }
        transactions
    }
}

#[async_trait]
impl AccountSource for SolanaClient {
    async fn account_data(&self, address: &str) -> Result<Option<Vec<u8>>> {
        let result = self
            .rpc
            .call("getAccountInfo", json!([address, {"encoding": "base64"}]))
            .await?;
        Ok(result
            .pointer("/value/data/0")
            .and_then(Value::as_str)
            .and_then(|encoded| STANDARD.decode(encoded).ok()))
    }
}

#[async_trait]
impl SlotClock for SolanaClient {
    async fn current_slot(&self) -> Option<u64> {
        self.rpc.call_opt("getSlot", json!([])).await?.as_u64()
    }

    /// A skipped slot (`null` reply) is cached; a failed call is not.
    async fn block_time(&self, slot: u64) -> Option<i64> {
        let lookup = self
            .cache
            .slot_times
            .get_or_fetch(slot, || async move {
                let value = self.rpc.call("getBlockTime", json!([slot])).await?;
                Ok::<_, AggregatorError>(value.as_i64())
            })
            .await;
        match lookup {
            Ok(time) => time,
            Err(e) => {
                warn!("RPC getBlockTime({}) failed: {}", slot, e);
                None
            }
        }
    }
}

#[async_trait]
impl ChainClient for SolanaClient {
    fn chain(&self) -> Chain {
        Chain::Solana
    }

    async fn get_wallet_info(&self, address: &str) -> Result<WalletInfo> {
        let requests = [
            RpcRequest::new("getBalance", json!([address])),
            RpcRequest::new(
                "getTokenAccountsByOwner",
                json!([address, {"programId": TOKEN_PROGRAM_ID}, {"encoding": "jsonParsed"}]),
            ),
        ];
        let mut replies = self.rpc.batch(&requests).await.into_iter();
        let balance = replies.next().flatten();
        let accounts = replies.next().flatten();

        let lamports = balance
            .as_ref()
            .and_then(|b| b.get("value").or(Some(b)))
            .and_then(as_u64_lenient)
            .unwrap_or(0);
        let native = NativeToken::new(NATIVE_SYMBOL, NATIVE_DECIMALS, BigUint::from(lamports));
        let mut info = WalletInfo::empty(address, Chain::Solana.as_str(), native);

        let token_accounts = accounts.as_ref().map(parse_token_accounts).unwrap_or_default();
        let mut by_mint: Vec<(String, u8, BigUint, Vec<String>)> = Vec::new();
        for account in token_accounts {
            match by_mint.iter_mut().find(|(mint, ..)| *mint == account.mint) {
                Some((_, _, amount, pubkeys)) => {
                    *amount += account.amount;
                    pubkeys.push(account.pubkey);
                }
                None => by_mint.push((account.mint, account.decimals, account.amount, vec![account.pubkey])),
            }
        }

        for (mint, decimals, amount, pubkeys) in by_mint {
            self.cache
                .token_accounts
                .insert(generate_key(address, &[mint.as_str()]), pubkeys);
            let metadata = self.metadata(&mint).await.unwrap_or_default();
            info.tokens
                .push(TokenHolding::new(mint, metadata.name, metadata.symbol, decimals, amount));
        }
        Ok(info)
    }

    async fn get_transactions(&self, query: &TransactionQuery) -> Result<TransactionList> {
        let mut timer = Timer::start("solana get_transactions");
        let now_ms = Utc::now().timestamp_millis();
        let slots = SlotResolver::new(
            self,
            self.slot_strategy,
            self.slot_duration_ms,
            self.slot_buffer,
            now_ms,
        )
        .resolve(&query.dates)
        .await;
        if !slots.is_identity() {
            debug!("Solana slot window {}..={}", slots.start, slots.end);
        }

        let fetch_limit = query.limit.saturating_mul(SIGNATURE_OVERFETCH).min(MAX_SIGNATURES);
        let signatures = match &query.token {
            Some(mint) => {
                self.token_signatures(&query.address, mint, fetch_limit, query.limit, &query.dates, slots)
                    .await
            }
            None => self
                .signatures_for(&query.address, fetch_limit)
                .await
                .into_iter()
                .filter(|s| s.within(&query.dates, slots))
                .collect(),
        };
        timer.checkpoint("signatures");

        let transfers = self
            .load_transfers(&signatures, query.token.as_deref(), query.limit)
            .await;
        timer.checkpoint("transactions");
        let transactions = merge_streams(vec![transfers], query.limit);

        let wallet = self.get_wallet_info(&query.address).await?;
        timer.finish_with_threshold(10_000);
        Ok(TransactionList::new(&wallet, transactions))
    }

    async fn get_contract_details(&self, address: &str) -> Result<ContractDetails> {
        let mut details = ContractDetails::new(address, Chain::Solana.as_str());
        let account = self
            .rpc
            .call_opt("getAccountInfo", parsed_account_params(address))
            .await;

        let mut supply = BigUint::default();
        let mint = account.as_ref().and_then(|a| parsed_info(a, "mint"));
        match mint {
            Some(info) => {
                details.decimals = clamp_decimals(u64_field(info, &["decimals"]).unwrap_or(0));
                supply = raw_from_value(info.get("supply"));
                details.mintable = info.get("mintAuthority").map_or(false, |v| !v.is_null());
            }
            None => debug!("{} is not a parsed mint account", short_address(address)),
        }
        details.set_total_supply(&supply);

        if let Some(metadata) = self.metadata(address).await {
            details.name = metadata.name;
            details.symbol = metadata.symbol;
        }
        info!(
            "solana mint {} resolved: symbol={:?} decimals={}",
            short_address(address),
            details.symbol,
            details.decimals
        );
        Ok(details)
    }

    fn clear_cache(&self) {
        self.cache.clear_all();
    }

    fn cache_stats(&self) -> Option<CacheStats> {
        Some(self.cache.stats())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_signatures_skips_malformed() {
        let result = json!([
            {"signature": "a", "slot": 10, "blockTime": 1_700_000_000},
            {"slot": 11},
            {"signature": "b", "slot": 12, "blockTime": null},
        ]);
        assert_eq!(
            parse_signatures(&result),
            vec![
                SignatureInfo {
                    signature: "a".into(),
                    slot: 10,
                    block_time: Some(1_700_000_000)
                },
                SignatureInfo {
                    signature: "b".into(),
                    slot: 12,
                    block_time: None
                },
            ]
        );
    }

    #[test]
    fn test_signature_filter_prefers_block_time() {
        let dates = DateRange::parse(Some("2024-01-01"), Some("2024-01-31"));
        let inside = 1_705_000_000;
        let slots = PositionRange { start: 100, end: 200 };
        let timed = |ts| SignatureInfo {
            signature: "s".into(),
            slot: 5,
            block_time: Some(ts),
        };
        // slot 5 is outside the slot window but the block time decides
        assert!(timed(inside).within(&dates, slots));
        assert!(!timed(1_600_000_000).within(&dates, slots));

        let untimed = |slot| SignatureInfo {
            signature: "s".into(),
            slot,
            block_time: None,
        };
        assert!(untimed(150).within(&dates, slots));
        assert!(!untimed(201).within(&dates, slots));
    }

    #[test]
    fn test_parse_token_accounts() {
        let result = json!({"context": {"slot": 1}, "value": [
            {"pubkey": "ata1", "account": {"data": {"program": "spl-token", "parsed": {"type": "account",
                "info": {"mint": "mintA", "owner": "w", "tokenAmount": {"amount": "1500", "decimals": 3}}}}}},
            {"pubkey": "weird", "account": {"data": ["AAAA", "base64"]}},
            {"pubkey": "ata2", "account": {"data": {"parsed": {"type": "mint", "info": {}}}}},
        ]});
        assert_eq!(
            parse_token_accounts(&result),
            vec![TokenAccount {
                pubkey: "ata1".into(),
                mint: "mintA".into(),
                amount: BigUint::from(1500u32),
                decimals: 3,
            }]
        );
    }
}

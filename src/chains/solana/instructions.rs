//! Transfer extraction from `jsonParsed` transactions.

use crate::models::clamp_decimals;
use crate::rpc::explorer::{str_field, u64_field};
use crate::utils::amount::raw_from_value;
use num_bigint::BigUint;
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferAsset {
    Lamports,
    Token {
        mint: Option<String>,
        decimals: Option<u8>,
    },
}

/// First qualifying transfer of a transaction. For token transfers
/// `source`/`destination` are token accounts, not wallets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedTransfer {
    pub source: String,
    pub destination: String,
    pub amount: BigUint,
    pub asset: TransferAsset,
}

fn is_token_program(program: &str) -> bool {
    program == "spl-token" || program == "spl-token-2022"
}

/// Outer instructions first, then every inner-instruction group in order.
fn all_instructions(tx: &Value) -> impl Iterator<Item = &Value> {
    let outer = tx
        .pointer("/transaction/message/instructions")
        .and_then(Value::as_array)
        .into_iter()
        .flatten();
    let inner = tx
        .pointer("/meta/innerInstructions")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|group| group.get("instructions").and_then(Value::as_array))
        .flatten();
    outer.chain(inner)
}

/// Account keys in message order; parsed messages give objects with a
/// `pubkey`, legacy ones plain strings.
pub fn account_keys(tx: &Value) -> Vec<String> {
    tx.pointer("/transaction/message/accountKeys")
        .and_then(Value::as_array)
        .map(|keys| {
            keys.iter()
                .map(|k| match k {
                    Value::String(s) => s.clone(),
                    other => str_field(other, &["pubkey"]),
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Mint and decimals of a token account, from the transaction's token
/// balance snapshots.
pub fn token_balance_info(tx: &Value, account: &str) -> Option<(String, u8)> {
    let index = account_keys(tx).iter().position(|k| k == account)? as u64;
    ["/meta/postTokenBalances", "/meta/preTokenBalances"]
        .iter()
        .filter_map(|p| tx.pointer(p).and_then(Value::as_array))
        .flatten()
        .find(|b| u64_field(b, &["accountIndex"]) == Some(index))
        .map(|b| {
            let decimals = b
                .pointer("/uiTokenAmount/decimals")
                .and_then(Value::as_u64)
                .unwrap_or(0);
            (str_field(b, &["mint"]), clamp_decimals(decimals))
        })
}

fn parse_instruction(tx: &Value, instruction: &Value, mint_filter: Option<&str>) -> Option<ParsedTransfer> {
    let program = instruction.get("program").and_then(Value::as_str)?;
    let parsed = instruction.get("parsed")?;
    let kind = parsed.get("type").and_then(Value::as_str)?;
    let info = parsed.get("info")?;

    if program == "system" {
        if mint_filter.is_some() || !matches!(kind, "transfer" | "transferWithSeed") {
            return None;
        }
        return Some(ParsedTransfer {
            source: str_field(info, &["source"]),
            destination: str_field(info, &["destination"]),
            amount: raw_from_value(info.get("lamports")),
            asset: TransferAsset::Lamports,
        });
    }

    if !is_token_program(program) || !matches!(kind, "transfer" | "transferChecked") {
        return None;
    }
    let source = str_field(info, &["source"]);
    let destination = str_field(info, &["destination"]);
    let amount = raw_from_value(
        info.get("amount")
            .or_else(|| info.pointer("/tokenAmount/amount")),
    );
    let declared_decimals = info
        .get("decimals")
        .or_else(|| info.pointer("/tokenAmount/decimals"))
        .and_then(Value::as_u64)
        .map(clamp_decimals);
    let declared_mint = info.get("mint").and_then(Value::as_str).map(str::to_string);

    if kind == "transferChecked" {
        if let Some(wanted) = mint_filter {
            if declared_mint.as_deref() != Some(wanted) {
                return None;
            }
        }
    }

    let snapshot = token_balance_info(tx, &source).or_else(|| token_balance_info(tx, &destination));
    let mint = declared_mint.or_else(|| snapshot.as_ref().map(|(m, _)| m.clone()));
    if let (Some(wanted), Some(found)) = (mint_filter, mint.as_deref()) {
        if found != wanted {
            return None;
        }
    }
    let decimals = declared_decimals.or_else(|| snapshot.map(|(_, d)| d));

    Some(ParsedTransfer {
        source,
        destination,
        amount,
        asset: TransferAsset::Token { mint, decimals },
    })
}

/// First system or token transfer in `tx`. With `mint_filter` only token
/// transfers of that mint qualify.
pub fn find_transfer(tx: &Value, mint_filter: Option<&str>) -> Option<ParsedTransfer> {
    all_instructions(tx).find_map(|ix| parse_instruction(tx, ix, mint_filter))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    const MINT: &str = "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v";

    fn tx(outer: Value, inner: Value) -> Value {
        json!({
            "transaction": {
                "signatures": ["sig1"],
                "message": {
                    "accountKeys": [
                        {"pubkey": "wallet", "signer": true},
                        {"pubkey": "srcAta", "signer": false},
                        "dstAta"
                    ],
                    "instructions": outer,
                }
            },
            "meta": {
                "err": null,
                "fee": 5000,
                "innerInstructions": inner,
                "postTokenBalances": [
                    {"accountIndex": 1, "mint": MINT, "uiTokenAmount": {"decimals": 6, "amount": "0"}},
                ],
            }
        })
    }

    #[test]
    fn test_system_transfer() {
        let t = tx(
            json!([{"program": "system", "parsed": {"type": "transfer",
                "info": {"source": "a", "destination": "b", "lamports": 1_500_000_000u64}}}]),
            json!([]),
        );
        let found = find_transfer(&t, None).unwrap();
        assert_eq!(found.asset, TransferAsset::Lamports);
        assert_eq!(found.amount, BigUint::from(1_500_000_000u64));
        assert_eq!(found.source, "a");
    }

    #[test]
    fn test_system_transfer_skipped_for_token_query() {
        let t = tx(
            json!([{"program": "system", "parsed": {"type": "transfer",
                "info": {"source": "a", "destination": "b", "lamports": 1}}}]),
            json!([]),
        );
        assert_eq!(find_transfer(&t, Some(MINT)), None);
    }

    #[test]
    fn test_inner_token_transfer_resolves_mint_from_balances() {
        let t = tx(
            json!([{"programId": "ComputeBudget111111111111111111111111111111", "data": "x"}]),
            json!([{"index": 0, "instructions": [
                {"program": "spl-token", "parsed": {"type": "transfer",
                    "info": {"source": "srcAta", "destination": "dstAta", "amount": "2500000", "authority": "wallet"}}}
            ]}]),
        );
        let found = find_transfer(&t, Some(MINT)).unwrap();
        assert_eq!(found.amount, BigUint::from(2_500_000u32));
        assert_eq!(
            found.asset,
            TransferAsset::Token {
                mint: Some(MINT.to_string()),
                decimals: Some(6)
            }
        );
    }

    #[test]
    fn test_transfer_checked_requires_matching_mint() {
        let ix = |mint: &str| {
            json!({"program": "spl-token", "parsed": {"type": "transferChecked", "info": {
                "source": "x", "destination": "y", "mint": mint,
                "tokenAmount": {"amount": "7", "decimals": 2}}}})
        };
        let t = tx(json!([ix("OtherMint"), ix(MINT)]), json!([]));
        let found = find_transfer(&t, Some(MINT)).unwrap();
        assert_eq!(
            found.asset,
            TransferAsset::Token {
                mint: Some(MINT.to_string()),
                decimals: Some(2)
            }
        );
        assert_eq!(found.amount, BigUint::from(7u32));
    }

    #[test]
    fn test_account_keys_accept_both_shapes() {
        let t = tx(json!([]), json!([]));
        assert_eq!(account_keys(&t), vec!["wallet", "srcAta", "dstAta"]);
        assert_eq!(token_balance_info(&t, "srcAta"), Some((MINT.to_string(), 6)));
        assert_eq!(token_balance_info(&t, "dstAta"), None);
    }

    #[test]
    fn test_no_transfer_found() {
        let t = tx(json!([{"program": "spl-memo", "parsed": "hello"}]), json!(null));
        assert_eq!(find_transfer(&t, None), None);
    }
}

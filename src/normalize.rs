//! Mapping of chain-native transfer records into [`Transaction`]s and
//! merging of transfer streams.

use crate::models::{Transaction, TxStatus};
use crate::utils::amount::format_units;
use chrono::{DateTime, Utc};
use itertools::Itertools;
use num_bigint::BigUint;

/// Timestamps above this are taken to be milliseconds.
const MILLIS_THRESHOLD: u64 = 1_000_000_000_000;

pub fn timestamp_from_secs(secs: i64) -> Option<DateTime<Utc>> {
    if secs <= 0 {
        return None;
    }
    DateTime::from_timestamp(secs, 0)
}

/// Accepts unix seconds or milliseconds.
pub fn timestamp_auto(value: u64) -> Option<DateTime<Utc>> {
    if value > MILLIS_THRESHOLD {
        DateTime::from_timestamp_millis(i64::try_from(value).ok()?)
    } else {
        timestamp_from_secs(i64::try_from(value).ok()?)
    }
}

/// One transfer as extracted from an upstream payload, before formatting.
#[derive(Debug, Clone, PartialEq)]
pub struct RawTransfer {
    pub hash: String,
    pub timestamp: Option<DateTime<Utc>>,
    pub from: String,
    pub to: String,
    pub amount: BigUint,
    pub decimals: u8,
    pub token_symbol: String,
    pub fee: BigUint,
    pub native_decimals: u8,
    pub status: TxStatus,
    pub position: u64,
}

impl RawTransfer {
    pub fn normalize(self) -> Transaction {
        Transaction {
            amount_formatted: format_units(&self.amount, self.decimals),
            fee_formatted: format_units(&self.fee, self.native_decimals),
            amount: self.amount.to_string(),
            fee: self.fee.to_string(),
            hash: self.hash,
            timestamp: self.timestamp,
            from: self.from,
            to: self.to,
            token_symbol: self.token_symbol,
            status: self.status,
            block_number: self.position,
        }
    }
}

/// Concatenates the streams, drops hash duplicates (first occurrence wins),
/// sorts by timestamp descending and keeps at most `limit` entries.
///
/// The sort is stable, so equal timestamps keep discovery order; entries
/// without a timestamp go last.
pub fn merge_streams(streams: Vec<Vec<Transaction>>, limit: usize) -> Vec<Transaction> {
    let mut merged: Vec<Transaction> = streams
        .into_iter()
        .flatten()
        .filter(|tx| !tx.hash.is_empty())
        .unique_by(|tx| tx.hash.clone())
        .collect();
    merged.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    merged.truncate(limit);
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashSet;

    fn tx(hash: &str, ts: i64) -> Transaction {
        RawTransfer {
            hash: hash.to_string(),
            timestamp: timestamp_from_secs(ts),
            from: "from".into(),
            to: "to".into(),
            amount: BigUint::from(10u32),
            decimals: 6,
            token_symbol: "TKN".into(),
            fee: BigUint::from(21_000u32) * BigUint::from(1_000_000_000u64),
            native_decimals: 18,
            status: TxStatus::Success,
            position: ts as u64,
        }
        .normalize()
    }

    #[test]
    fn test_normalize_formats_amount_and_fee() {
        let t = tx("a", 1_700_000_000);
        assert_eq!(t.amount, "10");
        assert_eq!(t.amount_formatted, "0.00001");
        assert_eq!(t.fee, "21000000000000");
        assert_eq!(t.fee_formatted, "0.000021");
    }

    #[test]
    fn test_merge_dedupes_by_hash() {
        let native = vec![tx("a", 100), tx("b", 300)];
        let tokens = vec![tx("b", 300), tx("c", 200), tx("a", 100)];
        let merged = merge_streams(vec![native, tokens], 20);
        let hashes: Vec<_> = merged.iter().map(|t| t.hash.as_str()).collect();
        assert_eq!(hashes, vec!["b", "c", "a"]);
        let unique: HashSet<_> = hashes.iter().collect();
        assert_eq!(unique.len(), hashes.len());
    }

    #[test]
    fn test_merge_sorts_desc_and_truncates() {
        let stream: Vec<_> = (1..=50).map(|i| tx(&format!("h{i}"), 1_000 + i)).collect();
        let merged = merge_streams(vec![stream], 7);
        assert_eq!(merged.len(), 7);
        assert!(merged.windows(2).all(|w| w[0].timestamp >= w[1].timestamp));
        assert_eq!(merged[0].hash, "h50");
    }

    #[test]
    fn test_ties_keep_discovery_order_and_untimed_go_last() {
        let merged = merge_streams(
            vec![vec![tx("untimed", 0), tx("x", 500)], vec![tx("y", 500), tx("z", 900)]],
            10,
        );
        let hashes: Vec<_> = merged.iter().map(|t| t.hash.as_str()).collect();
        assert_eq!(hashes, vec!["z", "x", "y", "untimed"]);
    }

    #[test]
    fn test_timestamp_auto_detects_millis() {
        assert_eq!(timestamp_auto(1_700_000_000), timestamp_from_secs(1_700_000_000));
        assert_eq!(
            timestamp_auto(1_700_000_000_123).map(|d| d.timestamp()),
            Some(1_700_000_000)
        );
        assert_eq!(timestamp_auto(0), None);
    }
}

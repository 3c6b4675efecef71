//! Integer-safe amount handling.
//!
//! Raw chain amounts are arbitrary-size integers (ERC-20 supplies routinely
//! exceed `u128`), so everything here goes through `num-bigint` and string
//! manipulation. Floats are never involved.

use num_bigint::{BigInt, BigUint, Sign};
use serde_json::Value;

/// Formats a raw integer amount as a human-readable decimal string.
///
/// Trailing fractional zeros are trimmed; amounts below one unit keep a
/// leading `0.` and zero renders as `0.0` when `decimals > 0`.
pub fn format_units(amount: &BigUint, decimals: u8) -> String {
    let s = amount.to_string();
    let decimals = decimals as usize;

    if decimals == 0 {
        return s;
    }

    if s.len() <= decimals {
        let mut result = String::from("0.");
        result.extend(std::iter::repeat('0').take(decimals - s.len()));
        result.push_str(&s);
        let trimmed = result.trim_end_matches('0');
        if trimmed.ends_with('.') {
            return format!("{trimmed}0");
        }
        return trimmed.to_string();
    }

    let (integer_part, decimal_part) = s.split_at(s.len() - decimals);
    let trimmed = decimal_part.trim_end_matches('0');
    if trimmed.is_empty() {
        integer_part.to_string()
    } else {
        format!("{integer_part}.{trimmed}")
    }
}

/// Inverse of [`format_units`]: rescales a decimal string by `10^decimals`.
/// Extra fractional digits beyond `decimals` are truncated.
pub fn parse_units(formatted: &str, decimals: u8) -> Option<BigUint> {
    let formatted = formatted.trim();
    let (integer_part, fraction) = match formatted.split_once('.') {
        Some((i, f)) => (i, f),
        None => (formatted, ""),
    };
    if integer_part.is_empty() && fraction.is_empty() {
        return None;
    }
    if !integer_part.chars().all(|c| c.is_ascii_digit())
        || !fraction.chars().all(|c| c.is_ascii_digit())
    {
        return None;
    }

    let decimals = decimals as usize;
    let mut digits = String::with_capacity(integer_part.len() + decimals);
    digits.push_str(integer_part);
    if fraction.len() >= decimals {
        digits.push_str(&fraction[..decimals]);
    } else {
        digits.push_str(fraction);
        digits.extend(std::iter::repeat('0').take(decimals - fraction.len()));
    }
    if digits.is_empty() {
        return Some(BigUint::default());
    }
    digits.parse().ok()
}

/// Parses a raw integer amount as found in explorer payloads.
///
/// Accepts plain digit strings and JSON numbers. Anything else (negative,
/// fractional, hex, garbage) reads as zero.
pub fn parse_raw(value: &str) -> BigUint {
    let value = value.trim();
    if value.is_empty() || !value.chars().all(|c| c.is_ascii_digit()) {
        return BigUint::default();
    }
    value.parse().unwrap_or_default()
}

/// Same as [`parse_raw`] for loosely typed JSON fields.
pub fn raw_from_value(value: Option<&Value>) -> BigUint {
    match value {
        Some(Value::String(s)) => parse_raw(s),
        Some(Value::Number(n)) => n
            .as_u64()
            .map(BigUint::from)
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0 && f.fract() == 0.0).map(|f| {
                parse_raw(&format!("{f:.0}"))
            }))
            .unwrap_or_default(),
        _ => BigUint::default(),
    }
}

/// Parses a `0x`-prefixed hex quantity (JSON-RPC proxy responses).
pub fn parse_hex_quantity(value: &str) -> Option<u64> {
    let digits = value.trim().strip_prefix("0x")?;
    u64::from_str_radix(digits, 16).ok()
}

/// Running signed balance used when a holding has to be reconstructed from
/// transfer history. The final value is clamped at zero.
#[derive(Debug, Clone, Default)]
pub struct SignedBalance(BigInt);

impl SignedBalance {
    pub fn credit(&mut self, amount: &BigUint) {
        self.0 += BigInt::from_biguint(Sign::Plus, amount.clone());
    }

    pub fn debit(&mut self, amount: &BigUint) {
        self.0 -= BigInt::from_biguint(Sign::Plus, amount.clone());
    }

    pub fn clamped(&self) -> BigUint {
        self.0.to_biguint().unwrap_or_default()
    }
}

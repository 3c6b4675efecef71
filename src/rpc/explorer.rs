//! Shared HTTP plumbing for explorer-style REST APIs.

use crate::error::{AggregatorError, Result};
use log::{debug, warn};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT};
use serde_json::Value;
use std::time::Duration;

/// Returns a HeaderMap carrying `api_key` under `header_name`. An unparsable
/// key is logged and left out.
pub fn headers_with_api_key(header_name: &'static str, api_key: Option<&str>) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
    if let Some(key) = api_key {
        match HeaderValue::from_str(key) {
            Ok(value) => {
                headers.insert(HeaderName::from_static(header_name), value);
            }
            Err(e) => {
                let partial = key.chars().take(5).collect::<String>();
                warn!(
                    "API key (starting with '{}...') failed to parse as header value: {}. Proceeding without it.",
                    partial, e
                );
            }
        }
    }
    headers
}

/// GET client bound to one explorer base URL.
#[derive(Debug, Clone)]
pub struct ExplorerHttp {
    base_url: String,
    client: reqwest::Client,
    timeout: Duration,
}

impl ExplorerHttp {
    pub fn new(base_url: &str, headers: HeaderMap, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| AggregatorError::ConfigError(format!("HTTP client: {}", e)))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            timeout,
        })
    }

    /// GET `base_url + path` and parse the body as JSON.
    pub async fn get(&self, path: &str, query: &[(&str, String)]) -> Result<Value> {
        let url = format!("{}{}", self.base_url, path);
        let resp = self
            .client
            .get(&url)
            .query(query)
            .timeout(self.timeout)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(AggregatorError::NetworkError(format!(
                "GET {} returned HTTP {}",
                url,
                resp.status()
            )));
        }
        Ok(resp.json::<Value>().await?)
    }

    /// Same as [`get`](Self::get) with failures logged and collapsed into `None`.
    pub async fn get_opt(&self, label: &str, path: &str, query: &[(&str, String)]) -> Option<Value> {
        let start = std::time::Instant::now();
        let result = self.get(path, query).await;
        debug!("{} completed in {} ms", label, start.elapsed().as_millis());
        match result {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("{} failed: {}", label, e);
                None
            }
        }
    }
}

/// First present, non-null field among `keys`.
pub fn first_field<'a>(value: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|k| value.get(*k))
        .find(|v| !v.is_null())
}

/// First field among `keys` rendered as a string (numbers are stringified).
pub fn str_field(value: &Value, keys: &[&str]) -> String {
    keys.iter()
        .filter_map(|k| value.get(*k))
        .find_map(|v| match v {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
        .unwrap_or_default()
}

/// First field among `keys` read as an unsigned integer; numeric strings are
/// accepted.
pub fn u64_field(value: &Value, keys: &[&str]) -> Option<u64> {
    keys.iter().filter_map(|k| value.get(*k)).find_map(as_u64_lenient)
}

pub fn bool_field(value: &Value, keys: &[&str]) -> Option<bool> {
    keys.iter().filter_map(|k| value.get(*k)).find_map(|v| match v {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_u64().map(|n| n != 0),
        Value::String(s) => match s.to_ascii_lowercase().as_str() {
            "true" | "1" => Some(true),
            "false" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    })
}

pub fn as_u64_lenient(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_field_helpers() {
        let record = json!({
            "hash": null,
            "transaction_id": "abc",
            "block": "123",
            "decimals": 6,
            "confirmed": true,
            "flag": "0",
        });
        assert_eq!(str_field(&record, &["hash", "transaction_id"]), "abc");
        assert_eq!(str_field(&record, &["decimals"]), "6");
        assert_eq!(str_field(&record, &["missing"]), "");
        assert_eq!(u64_field(&record, &["blockNumber", "block"]), Some(123));
        assert_eq!(bool_field(&record, &["confirmed"]), Some(true));
        assert_eq!(bool_field(&record, &["flag"]), Some(false));
        assert_eq!(first_field(&record, &["hash", "decimals"]), Some(&json!(6)));
    }

    #[test]
    fn test_headers_with_api_key() {
        let headers = headers_with_api_key("tron-pro-api-key", Some("secret"));
        assert_eq!(headers.get("TRON-PRO-API-KEY").unwrap(), "secret");
        let headers = headers_with_api_key("tron-pro-api-key", Some("bad\nkey"));
        assert!(headers.get("tron-pro-api-key").is_none());
    }
}

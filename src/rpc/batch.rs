//! JSON-RPC 2.0 client with request batching.

use crate::error::{AggregatorError, Result};
use log::{debug, warn};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct RpcRequest {
    pub method: String,
    pub params: Value,
}

impl RpcRequest {
    pub fn new(method: &str, params: Value) -> Self {
        Self {
            method: method.to_string(),
            params,
        }
    }
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

impl JsonRpcResponse {
    fn into_result(self) -> Result<Value> {
        if let Some(error) = self.error {
            return Err(AggregatorError::RpcError(format!(
                "{}: {}",
                error.code, error.message
            )));
        }
        Ok(self.result.unwrap_or(Value::Null))
    }
}

/// Issues single or batched JSON-RPC calls against one endpoint.
///
/// Batches fall back to sequential single calls when the endpoint rejects
/// the batch or answers with something other than an array.
#[derive(Debug, Clone)]
pub struct BatchRpcClient {
    url: String,
    client: reqwest::Client,
    timeout: Duration,
    batch_timeout: Duration,
}

impl BatchRpcClient {
    pub fn new(url: &str, timeout: Duration, batch_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| AggregatorError::ConfigError(format!("HTTP client: {}", e)))?;
        Ok(Self {
            url: url.to_string(),
            client,
            timeout,
            batch_timeout,
        })
    }

    /// One JSON-RPC call. A `null` result is returned as `Value::Null`.
    pub async fn call(&self, method: &str, params: Value) -> Result<Value> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });

        let resp = self
            .client
            .post(&self.url)
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(AggregatorError::NetworkError(format!(
                "{} returned HTTP {}",
                method,
                resp.status()
            )));
        }
        let parsed: JsonRpcResponse = resp.json().await?;
        parsed.into_result()
    }

    /// Like [`call`](Self::call) but failures and `null` results are logged
    /// and collapsed into `None`.
    pub async fn call_opt(&self, method: &str, params: Value) -> Option<Value> {
        match self.call(method, params).await {
            Ok(Value::Null) => None,
            Ok(value) => Some(value),
            Err(e) => {
                warn!("RPC {} failed: {}", method, e);
                None
            }
        }
    }

    /// Sends all `requests` in one round trip. The output has one slot per
    /// request, in request order; missing or failed responses are `None`.
    pub async fn batch(&self, requests: &[RpcRequest]) -> Vec<Option<Value>> {
        if requests.is_empty() {
            return Vec::new();
        }

        let body: Vec<Value> = requests
            .iter()
            .enumerate()
            .map(|(i, req)| {
                json!({
                    "jsonrpc": "2.0",
                    "id": i + 1,
                    "method": req.method,
                    "params": req.params,
                })
            })
            .collect();

        match self.send_batch(&body).await {
            Ok(Value::Array(items)) => {
                debug!("Batch of {} requests answered with {} items", requests.len(), items.len());
                reorder_by_id(items, requests.len())
            }
            Ok(other) => {
                warn!(
                    "Batch RPC returned a non-array payload ({}); falling back to sequential calls",
                    type_name(&other)
                );
                self.sequential(requests).await
            }
            Err(e) => {
                warn!("Batch RPC failed: {}; falling back to sequential calls", e);
                self.sequential(requests).await
            }
        }
    }

    async fn send_batch(&self, body: &[Value]) -> Result<Value> {
        let resp = self
            .client
            .post(&self.url)
            .timeout(self.batch_timeout)
            .json(body)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(AggregatorError::NetworkError(format!(
                "batch returned HTTP {}",
                resp.status()
            )));
        }
        Ok(resp.json::<Value>().await?)
    }

    async fn sequential(&self, requests: &[RpcRequest]) -> Vec<Option<Value>> {
        let mut out = Vec::with_capacity(requests.len());
        for req in requests {
            out.push(self.call_opt(&req.method, req.params.clone()).await);
        }
        out
    }
}

/// Places each response at `id - 1`. Unknown ids, duplicates, errors and
/// `null` results leave the slot empty.
fn reorder_by_id(items: Vec<Value>, len: usize) -> Vec<Option<Value>> {
    let mut slots: Vec<Option<Value>> = vec![None; len];
    for item in items {
        let response: JsonRpcResponse = match serde_json::from_value(item) {
            Ok(r) => r,
            Err(e) => {
                debug!("Skipping malformed batch item: {}", e);
                continue;
            }
        };
        let Some(index) = response
            .id
            .as_ref()
            .and_then(Value::as_u64)
            .and_then(|id| (id as usize).checked_sub(1))
            .filter(|i| *i < len)
        else {
            continue;
        };
        if slots[index].is_some() {
            continue;
        }
        match response.into_result() {
            Ok(Value::Null) => {}
            Ok(value) => slots[index] = Some(value),
            Err(e) => debug!("Batch item {} failed: {}", index + 1, e),
        }
    }
    slots
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_reorder_by_id_handles_out_of_order_and_missing() {
        let items = vec![
            json!({"jsonrpc": "2.0", "id": 3, "result": "c"}),
            json!({"jsonrpc": "2.0", "id": 1, "result": "a"}),
            json!({"jsonrpc": "2.0", "id": 9, "result": "bogus"}),
        ];
        assert_eq!(
            reorder_by_id(items, 3),
            vec![Some(json!("a")), None, Some(json!("c"))]
        );
    }

    #[test]
    fn test_reorder_by_id_drops_errors_and_nulls() {
        let items = vec![
            json!({"jsonrpc": "2.0", "id": 1, "error": {"code": -32602, "message": "bad"}}),
            json!({"jsonrpc": "2.0", "id": 2, "result": null}),
            json!("garbage"),
            json!({"jsonrpc": "2.0", "id": 0, "result": 1}),
        ];
        assert_eq!(reorder_by_id(items, 2), vec![None, None]);
    }

    #[test]
    fn test_rpc_error_maps_to_rpc_error() {
        let response: JsonRpcResponse = serde_json::from_value(
            json!({"jsonrpc": "2.0", "id": 1, "error": {"code": -32000, "message": "slot skipped"}}),
        )
        .unwrap();
        match response.into_result() {
            Err(AggregatorError::RpcError(msg)) => assert!(msg.contains("slot skipped")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_empty_batch_makes_no_request() {
        let client = BatchRpcClient::new(
            "http://127.0.0.1:9",
            Duration::from_millis(50),
            Duration::from_millis(50),
        )
        .unwrap();
        assert!(client.batch(&[]).await.is_empty());
    }
}

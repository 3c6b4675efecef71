#![allow(dead_code)]

use chain_aggregator::config::Config;
use serde_json::{json, Value};
use wiremock::{Request, Respond, ResponseTemplate};

pub const WALLET: &str = "0x1111111111111111111111111111111111111111";

/// Config pointing every upstream at one mock server.
pub fn config_for(uri: &str) -> Config {
    Config {
        etherscan_api_key: Some("test-key".to_string()),
        etherscan_base_url: uri.to_string(),
        tronscan_api_key: Some("tron-key".to_string()),
        tronscan_base_url: uri.to_string(),
        solana_rpc_url: uri.to_string(),
        http_timeout_secs: 5,
        rpc_timeout_secs: 5,
        rpc_batch_timeout_secs: 5,
        ..Config::default()
    }
}

pub fn explorer_ok(result: Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({"status": "1", "message": "OK", "result": result}))
}

type Handler = dyn Fn(&str, &Value) -> Value + Send + Sync;

/// JSON-RPC responder answering single and batch calls through `handler`
/// (method, params) -> result.
pub struct RpcResponder {
    handler: Box<Handler>,
    batches: bool,
}

impl RpcResponder {
    pub fn new(handler: impl Fn(&str, &Value) -> Value + Send + Sync + 'static) -> Self {
        Self {
            handler: Box::new(handler),
            batches: true,
        }
    }

    /// Answers batch bodies with a non-array payload.
    pub fn without_batches(mut self) -> Self {
        self.batches = false;
        self
    }

    fn answer(&self, call: &Value) -> Value {
        let method = call["method"].as_str().unwrap_or_default();
        json!({
            "jsonrpc": "2.0",
            "id": call["id"].clone(),
            "result": (self.handler)(method, &call["params"]),
        })
    }
}

impl Respond for RpcResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let body: Value = serde_json::from_slice(&request.body).unwrap_or(Value::Null);
        let reply = match &body {
            Value::Array(_) if !self.batches => json!({"error": "batch requests are not supported"}),
            // reversed so callers have to reorder by id
            Value::Array(calls) => Value::Array(calls.iter().rev().map(|c| self.answer(c)).collect()),
            call => self.answer(call),
        };
        ResponseTemplate::new(200).set_body_json(reply)
    }
}

/// Methods of every JSON-RPC call the server has seen, batches flattened.
pub async fn rpc_methods(server: &wiremock::MockServer) -> Vec<String> {
    let requests = server.received_requests().await.unwrap_or_default();
    requests
        .iter()
        .filter_map(|r| serde_json::from_slice::<Value>(&r.body).ok())
        .flat_map(|body| match body {
            Value::Array(calls) => calls,
            call => vec![call],
        })
        .filter_map(|call| call["method"].as_str().map(str::to_string))
        .collect()
}

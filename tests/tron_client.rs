mod common;

use chain_aggregator::chains::tron::TronClient;
use chain_aggregator::{ChainClient, TransactionQuery, TxStatus};
use common::config_for;
use pretty_assertions::assert_eq;
use serde_json::json;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const WALLET: &str = "TXYZopYRdj2D9XRtbG411XZZ3kM5VkAeBf";
const USDT: &str = "TR7NHqjeKQxGTCi8q8ZY4pL8otSzgjLj6t";

fn ok(body: serde_json::Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(body)
}

async fn setup() -> (MockServer, TronClient) {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/accountv2"))
        .respond_with(ok(json!({
            "balance": 12_500_000,
            "withPriceTokens": [
                {"tokenId": "_", "tokenName": "trx", "tokenAbbr": "trx", "tokenDecimal": 6, "balance": "12500000"},
                {"tokenId": USDT, "tokenName": "Tether USD", "tokenAbbr": "USDT", "tokenDecimal": 6, "balance": "3000000"}
            ]
        })))
        .mount(&server)
        .await;
    let client = TronClient::new(&server.uri(), "tron-key", &config_for(&server.uri())).unwrap();
    (server, client)
}

#[tokio::test]
async fn test_wallet_info_skips_trx_pseudo_token() {
    let (_server, client) = setup().await;
    let info = client.get_wallet_info(WALLET).await.unwrap();
    assert_eq!(info.native_token.symbol, "TRX");
    assert_eq!(info.native_token.balance, "12.5");
    assert_eq!(info.tokens.len(), 1);
    assert_eq!(info.tokens[0].symbol, "USDT");
    assert_eq!(info.tokens[0].balance, "3");
}

#[tokio::test]
async fn test_single_native_transfer() {
    let (server, client) = setup().await;
    Mock::given(method("GET"))
        .and(path("/api/transfer/trx"))
        .and(header("tron-pro-api-key", "tron-key"))
        .respond_with(ok(json!({"total": 1, "data": [{
            "hash": "h1", "block": 100, "timestamp": 1_700_000_000_000u64,
            "from": WALLET, "to": "TReceiver", "amount": "10", "confirmed": true
        }]})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/transfer/trc20"))
        .respond_with(ok(json!({"total": 0, "data": []})))
        .mount(&server)
        .await;

    let query = TransactionQuery::new(WALLET, 20, None, None, None).unwrap();
    let list = client.get_transactions(&query).await.unwrap();
    assert_eq!(list.transactions.len(), 1);
    let tx = &list.transactions[0];
    assert_eq!(tx.amount, "10");
    assert_eq!(tx.amount_formatted, "0.00001");
    assert_eq!(tx.token_symbol, "TRX");
    assert_eq!(tx.status, TxStatus::Success);
    assert_eq!(list.native_balance.symbol, "TRX");
    assert_eq!(list.token_balances.len(), 1);
}

#[tokio::test]
async fn test_merged_streams_are_sorted_deduped_and_capped() {
    let (server, client) = setup().await;
    let record = |hash: &str, ts: u64| json!({"hash": hash, "timestamp": ts, "amount": "1000000", "confirmed": true});
    Mock::given(method("GET"))
        .and(path("/api/transfer/trx"))
        .respond_with(ok(json!({"data": [record("a", 1_000_000), record("b", 3_000_000), record("c", 2_000_000)]})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/transfer/trc20"))
        .respond_with(ok(json!({"data": [record("b", 3_000_000), record("d", 4_000_000)]})))
        .mount(&server)
        .await;

    let query = TransactionQuery::new(WALLET, 3, None, None, None).unwrap();
    let list = client.get_transactions(&query).await.unwrap();
    let hashes: Vec<_> = list.transactions.iter().map(|t| t.hash.as_str()).collect();
    assert_eq!(hashes, vec!["d", "b", "c"]);
}

#[tokio::test]
async fn test_page_size_and_time_window_params() {
    let (server, client) = setup().await;
    Mock::given(method("GET"))
        .and(path("/api/transfer/trx"))
        .and(query_param("limit", "100"))
        .and(query_param("min_timestamp", "1704067200000"))
        .respond_with(ok(json!({"data": [{"hash": "x", "timestamp": 1_704_067_300_000u64, "amount": 1}]})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/transfer/trc20"))
        .respond_with(ok(json!({"data": []})))
        .mount(&server)
        .await;

    let query = TransactionQuery::new(WALLET, 500, None, Some("2024-01-01"), None).unwrap();
    let list = client.get_transactions(&query).await.unwrap();
    assert_eq!(list.transactions.len(), 1);
}

#[tokio::test]
async fn test_token_query_falls_back_to_transfers_with_status() {
    let (server, client) = setup().await;
    Mock::given(method("GET"))
        .and(path("/api/token_trc20/transfers"))
        .and(query_param("contract_address", USDT))
        .respond_with(ok(json!({"total": 0, "token_transfers": []})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/token_trc20/transfers-with-status"))
        .and(query_param("trc20Id", USDT))
        .respond_with(ok(json!({"data": [
            {"hash": "t1", "block_timestamp": 1_700_000_000_000u64, "from": WALLET, "to": "R", "amount": "5000000",
             "tokenInfo": {"tokenAbbr": "USDT", "tokenDecimal": 6}},
            {"hash": "t2", "block_timestamp": 1_700_000_100_000u64, "from": "R", "to": WALLET, "amount": "250000"}
        ]})))
        .mount(&server)
        .await;

    let query = TransactionQuery::new(WALLET, 20, Some(USDT), None, None).unwrap();
    let list = client.get_transactions(&query).await.unwrap();
    let hashes: Vec<_> = list.transactions.iter().map(|t| t.hash.as_str()).collect();
    assert_eq!(hashes, vec!["t2", "t1"]);
    assert_eq!(list.transactions[0].amount_formatted, "0.25");
    assert_eq!(list.transactions[0].token_symbol, "TRC20");
    assert_eq!(list.transactions[1].token_symbol, "USDT");
}

#[tokio::test]
async fn test_contract_details_merge_token_and_contract_endpoints() {
    let (server, client) = setup().await;
    Mock::given(method("GET"))
        .and(path("/api/token_trc20"))
        .respond_with(ok(json!({"trc20_tokens": [{
            "contract_address": USDT, "name": "Tether USD", "symbol": "USDT", "decimals": 6,
            "total_supply_with_decimals": "1000000000", "issue_ts": 0,
            "issue_time": "2019-04-16 12:41:20", "holders_count": 42, "transfer_num": 7
        }]})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/contract"))
        .respond_with(ok(json!({"data": [{"creator": {"address": "TCreator"}, "verify_status": 2}]})))
        .mount(&server)
        .await;

    let details = client.get_contract_details(USDT).await.unwrap();
    assert_eq!(details.name, "Tether USD");
    assert_eq!(details.symbol, "USDT");
    assert_eq!(details.total_supply, "1000000000");
    assert_eq!(details.total_supply_formatted, "1000");
    assert_eq!(details.holders_count, 42);
    assert_eq!(details.transfers_count, 7);
    assert_eq!(details.creator, "TCreator");
    assert!(details.verified);
    assert_eq!(details.creation_time.map(|t| t.timestamp()), Some(1_555_418_480));
}

#[tokio::test]
async fn test_upstream_outage_degrades_to_empty() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    let client = TronClient::new(&server.uri(), "tron-key", &config_for(&server.uri())).unwrap();

    let query = TransactionQuery::new(WALLET, 5, None, None, None).unwrap();
    let list = client.get_transactions(&query).await.unwrap();
    assert!(list.transactions.is_empty());
    assert_eq!(list.native_balance.balance_formatted, "0.0");

    let details = client.get_contract_details(USDT).await.unwrap();
    assert_eq!(details.total_supply, "0");
    assert_eq!(details.decimals, 6);
}

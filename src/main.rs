// src/main.rs
use anyhow::Context;
use chain_aggregator::{
    config::{load_config, Config}, utils::setup_logging, AggregatorError, ChainRegistry,
    TransactionQuery, DEFAULT_TRANSACTION_LIMIT,
};
use clap::{Parser, Subcommand};
use log::{error, info};
use serde::Serialize;

#[derive(Parser, Debug)]
#[command(name = "chain-aggregator", version, about = "Wallet, transaction and contract lookups across chains")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Native and token balances of a wallet
    WalletInfo {
        /// ethereum, bnb, tron or solana
        chain: String,
        address: String,
    },
    /// Recent transfers of a wallet, newest first
    Transactions {
        chain: String,
        address: String,
        #[arg(long, default_value_t = DEFAULT_TRANSACTION_LIMIT as i64)]
        limit: i64,
        /// Restrict to one token contract / mint
        #[arg(long)]
        token: Option<String>,
        /// YYYY-MM-DD or ISO-8601 date-time
        #[arg(long)]
        start_date: Option<String>,
        #[arg(long)]
        end_date: Option<String>,
    },
    /// Token contract details
    Contract { chain: String, address: String },
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run(command: Command, registry: &ChainRegistry) -> anyhow::Result<()> {
    match command {
        Command::WalletInfo { chain, address } => {
            let client = registry.get(&chain)?;
            print_json(&client.get_wallet_info(&address).await?)
        }
        Command::Transactions {
            chain,
            address,
            limit,
            token,
            start_date,
            end_date,
        } => {
            let client = registry.get(&chain)?;
            let query = TransactionQuery::new(
                &address,
                limit,
                token.as_deref(),
                start_date.as_deref(),
                end_date.as_deref(),
            )?;
            print_json(&client.get_transactions(&query).await?)
        }
        Command::Contract { chain, address } => {
            let client = registry.get(&chain)?;
            print_json(&client.get_contract_details(&address).await?)
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    dotenv::dotenv().ok();
    setup_logging(Config::from_env().log_level_filter()).context("failed to initialize logging")?;
    info!("🚀 chain-aggregator starting");
    let config = load_config().context("failed to load configuration")?;

    let registry = ChainRegistry::from_config(&config).context("failed to build chain registry")?;
    let chains: Vec<String> = registry.chains().iter().map(|c| c.to_string()).collect();
    info!("Available chains: {}", chains.join(", "));

    let outcome = run(cli.command, &registry).await;
    if let Err(e) = &outcome {
        match e.downcast_ref::<AggregatorError>() {
            Some(inner) => error!("❌ [{:?}] {:#}", inner.categorize(), e),
            None => error!("❌ {:#}", e),
        }
    }
    outcome
}

use std::path::PathBuf;
use std::sync::Arc;

use acctdash_brokers_bybit::{BybitClient, ReqwestTransport, ScriptedTransport};
use acctdash_core::*;
use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "acctdash")]
#[command(about = "Read-only exchange account dashboard: wallet, positions, and closed-trade history")]
#[command(version)]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// TOML file overriding client settings (URLs, timeouts, history window)
    #[arg(long, env = "ACCTDASH_CONFIG")]
    config: Option<PathBuf>,

    /// Serve canned sample data instead of calling the exchange
    #[arg(long)]
    dry_run: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the account snapshot as JSON
    Snapshot {
        /// Print the raw exchange envelopes instead of normalized records
        #[arg(long)]
        raw: bool,

        /// Single-line JSON
        #[arg(long)]
        compact: bool,
    },

    /// Print this month's closed trades
    History,

    /// Measure the offset between the local and exchange clocks
    Time,

    /// Start the API server
    Server {
        /// Bind address
        #[arg(short, long, env = "ACCTDASH_BIND", default_value = "127.0.0.1:5000")]
        bind: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env is fine; the process environment may already be set.
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let config = match &cli.config {
        Some(path) => ClientConfig::from_file(path)?,
        None => ClientConfig::default(),
    };

    let (credentials, transport) = if cli.dry_run {
        tracing::info!("Dry run: using sample account data");
        let transport: Arc<dyn HttpTransport> = Arc::new(ScriptedTransport::sample_account());
        (Credentials::new("dry-run-key", "dry-run-secret", true), transport)
    } else {
        let transport: Arc<dyn HttpTransport> = Arc::new(ReqwestTransport::new());
        (Credentials::from_env(), transport)
    };

    match cli.command {
        Commands::Snapshot { raw, compact } => {
            let value = if raw {
                let info =
                    acctdash_engine::load_account_info(credentials, config, transport).await?;
                serde_json::to_value(info)?
            } else {
                let snapshot =
                    acctdash_engine::load_snapshot(credentials, config, transport).await?;
                serde_json::to_value(snapshot)?
            };
            let out = if compact {
                serde_json::to_string(&value)?
            } else {
                serde_json::to_string_pretty(&value)?
            };
            println!("{out}");
        }
        Commands::History => {
            let client = acctdash_engine::connect_client(credentials, config, transport).await?;
            let envelope = client.fetch_month_closed_pnl().await;
            let trades = acctdash_engine::normalize_closed_trades(&envelope)
                .map_err(|f| anyhow::anyhow!("History unavailable: {}", f.message))?;
            print_history(&trades);
        }
        Commands::Time => {
            let mut client = BybitClient::new(credentials?, config, transport)?;
            match client.sync_clock().await {
                Ok(offset) => println!("Clock offset: {offset} ms (server - local)"),
                Err(e) => anyhow::bail!("Clock sync failed: {e}"),
            }
        }
        Commands::Server { bind } => {
            let state = acctdash_api::state::AppState::new(credentials, config, transport);
            acctdash_api::start_server(state, &bind).await?;
        }
    }

    Ok(())
}

fn format_ms(ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(ms)
        .map(|t| {
            t.with_timezone(&chrono::Local)
                .format("%Y-%m-%d %H:%M:%S")
                .to_string()
        })
        .unwrap_or_else(|| "-".to_string())
}

fn print_history(trades: &[ClosedTradeRecord]) {
    let sep = "=".repeat(104);
    println!("\n{sep}");
    println!(
        "  {:<19}  {:<14}  {:<5}  {:>10}  {:>12}  {:>12}  {:>12}  {:>4}",
        "Closed", "Symbol", "Side", "Qty", "Entry", "Exit", "PnL", "Lev"
    );
    println!("{sep}");
    for t in trades {
        println!(
            "  {:<19}  {:<14}  {:<5}  {:>10}  {:>12}  {:>12}  {:>12}  {:>4}",
            format_ms(t.updated_time_ms),
            t.symbol,
            t.side,
            t.qty,
            t.avg_entry_price,
            t.avg_exit_price,
            t.closed_pnl,
            t.leverage,
        );
    }
    println!("{sep}");
    println!("  Trades:          {}", trades.len());
    println!("  Realized PnL:    {}", total_closed_pnl(trades));
    println!("{sep}\n");
}

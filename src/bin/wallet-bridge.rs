//! Serves the bridge protocol as JSON lines over stdin/stdout.
//!
//! One request object per input line; one response object per output line. Logs go to
//! stderr so stdout stays machine-readable.

use anyhow::Context;
use clap::Parser;
use headless_wallet::host::HostPage;
use headless_wallet::logging::init_tracing;
use headless_wallet::service::{BridgeRequest, BridgeResponse, WalletBridge};
use headless_wallet::WalletConfig;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(name = "wallet-bridge", about = "Headless wallet bridge (JSON lines over stdio)")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Args {
    /// Wallet configuration file (.toml or .json)
    #[arg(long)]
    config: Option<PathBuf>,
    /// URL of the page the wallet is attached to
    #[arg(long, default_value = "http://localhost:3000")]
    url: String,
    /// Do not attach providers to the page on startup
    #[arg(long)]
    no_inject: bool,
    /// Verbose logging
    #[arg(long)]
    debug: bool,
}

fn load_config(path: Option<&Path>) -> anyhow::Result<WalletConfig> {
    let config = match path {
        None => WalletConfig::default(),
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("reading config {}", path.display()))?;
            let parsed = match path.extension().and_then(|e| e.to_str()) {
                Some("json") => WalletConfig::from_json_str(&raw),
                _ => WalletConfig::from_toml_str(&raw),
            };
            parsed.with_context(|| format!("parsing config {}", path.display()))?
        }
    };
    config.apply_env_overrides().context("applying HEADLESS_WALLET_* overrides")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = load_config(args.config.as_deref())?;
    init_tracing(args.debug || config.debug).context("initialising tracing")?;

    let host = Arc::new(HostPage::new(&args.url).context("parsing --url")?.with_process_env());
    let bridge = WalletBridge::new(host);
    let wallet = bridge.create(config).context("creating wallet")?;
    if !args.no_inject {
        wallet.inject().context("injecting providers")?;
    }
    info!(wallet = %wallet.id(), origin = %bridge.host().origin(), "wallet bridge ready");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    while let Some(line) = lines.next_line().await.context("reading stdin")? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let response = match serde_json::from_str::<BridgeRequest>(line) {
            Ok(request) => bridge.dispatch(request).await,
            Err(err) => {
                warn!(error = %err, "unparseable bridge request");
                BridgeResponse::parse_error(&err.to_string())
            }
        };
        let mut encoded = serde_json::to_vec(&response).context("encoding response")?;
        encoded.push(b'\n');
        stdout.write_all(&encoded).await.context("writing stdout")?;
        stdout.flush().await.context("flushing stdout")?;
    }
    info!("stdin closed, shutting down");
    Ok(())
}

//! Fee Funder
//!
//! Watches the fee-paying contract's L2 balance and bridges fee asset from
//! L1 whenever it drops below the threshold. A bridge in flight is persisted
//! and resumed after a restart, never submitted twice.

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use funding_runtime::{Checker, ConfirmationEngine, FlightGate, OpsState, Reconciler, Scheduler, Shutdown, StateStore};
use l1_bridge::{
    FeeAssetBalanceReader, FeeAssetChain, GatewayClient, GatewayConfig, MessageReadiness, PollingMessageReadiness,
    PortalBridgeSubmitter, SimulatedChain,
};
use ops_server::OpsServer;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod config;
mod secrets;

use config::{ChainSettings, FunderConfig, Settings};
use secrets::SecretSource;

/// Deposits land this long after submission on the simulated chain
const SIMULATED_LANDING_DELAY: Duration = Duration::from_secs(10);

/// Per-request timeout for gateway calls
const GATEWAY_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

/// L2 fee-asset top-up service
#[derive(Parser, Debug)]
#[command(name = "fee-funder")]
#[command(about = "Keeps a fee-paying contract funded on L2 by bridging from L1", long_about = None)]
struct Args {
    /// JSON config file; command line and environment take precedence
    #[arg(long, env = "FUNDER_CONFIG")]
    config: Option<PathBuf>,

    /// L2 address of the fee-paying contract (0x + 64 hex)
    #[arg(long, env = "FUNDER_DESTINATION")]
    destination: Option<String>,

    /// Top up when the balance falls below this
    #[arg(long, env = "FUNDER_THRESHOLD")]
    threshold: Option<String>,

    /// Amount bridged per top-up
    #[arg(long, env = "FUNDER_TOP_UP_AMOUNT")]
    top_up_amount: Option<String>,

    /// Balance check interval in milliseconds [default: 60000]
    #[arg(long, env = "FUNDER_CHECK_INTERVAL_MS")]
    check_interval_ms: Option<u64>,

    /// Confirmation timeout in milliseconds [default: 180000]
    #[arg(long, env = "FUNDER_CONFIRM_TIMEOUT_MS")]
    confirm_timeout_ms: Option<u64>,

    /// Initial confirmation poll interval in milliseconds [default: 2000]
    #[arg(long, env = "FUNDER_CONFIRM_POLL_MIN_MS")]
    confirm_poll_min_ms: Option<u64>,

    /// Maximum confirmation poll interval in milliseconds [default: 15000]
    #[arg(long, env = "FUNDER_CONFIRM_POLL_MAX_MS")]
    confirm_poll_max_ms: Option<u64>,

    /// Bridge state file [default: ./data/bridge-state.json]
    #[arg(long, env = "FUNDER_STATE_PATH")]
    state_path: Option<PathBuf>,

    /// Ops server bind host [default: 127.0.0.1]
    #[arg(long, env = "FUNDER_OPS_HOST")]
    ops_host: Option<String>,

    /// Ops server bind port [default: 9464]
    #[arg(long, env = "FUNDER_OPS_PORT")]
    ops_port: Option<u16>,

    /// JSON-RPC gateway URL
    #[arg(long, env = "FUNDER_GATEWAY_URL")]
    gateway_url: Option<String>,

    /// Gateway bearer token source: env:NAME, file:PATH or inline:VALUE
    #[arg(long, env = "FUNDER_GATEWAY_TOKEN")]
    gateway_token: Option<SecretSource>,

    /// Retry a persisted, unconfirmed bridge every N cycles [default: 5]
    #[arg(long, env = "FUNDER_RECONCILE_EVERY_CYCLES")]
    reconcile_every_cycles: Option<u32>,

    /// Run against an in-memory simulated chain
    #[arg(long, env = "FUNDER_SIMULATE")]
    simulate: bool,

    /// Log level (trace, debug, info, warn, error); RUST_LOG overrides
    #[arg(long, env = "FUNDER_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Log output format
    #[arg(long, env = "FUNDER_LOG_FORMAT", value_enum, default_value = "text")]
    log_format: LogFormat,
}

impl Args {
    fn settings(&self) -> Settings {
        Settings {
            destination: self.destination.clone(),
            threshold: self.threshold.clone(),
            top_up_amount: self.top_up_amount.clone(),
            check_interval_ms: self.check_interval_ms,
            confirm_timeout_ms: self.confirm_timeout_ms,
            confirm_poll_min_ms: self.confirm_poll_min_ms,
            confirm_poll_max_ms: self.confirm_poll_max_ms,
            state_path: self.state_path.clone(),
            ops_host: self.ops_host.clone(),
            ops_port: self.ops_port,
            gateway_url: self.gateway_url.clone(),
            gateway_token: self.gateway_token.clone(),
            reconcile_every_cycles: self.reconcile_every_cycles,
            simulate: self.simulate.then_some(true),
        }
    }

    fn load_config(&self) -> Result<FunderConfig> {
        let file = match &self.config {
            Some(path) => Settings::from_file(path)?,
            None => Settings::default(),
        };
        self.settings().or(file).resolve()
    }
}

fn init_tracing(args: &Args) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    let (text, json) = match args.log_format {
        LogFormat::Text => (Some(tracing_subscriber::fmt::layer()), None),
        LogFormat::Json => (None, Some(tracing_subscriber::fmt::layer().json())),
    };

    tracing_subscriber::registry().with(filter).with(text).with(json).init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(&args);

    let config = args.load_config().context("invalid configuration")?;
    run(config).await
}

async fn run(config: FunderConfig) -> Result<()> {
    tracing::info!("Starting fee funder");
    tracing::info!("  Destination: {}", config.destination);
    tracing::info!("  Threshold: {}", config.threshold);
    tracing::info!("  Top-up amount: {}", config.top_up_amount);
    tracing::info!("  Check interval: {}ms", config.check_interval.as_millis());
    tracing::info!("  State file: {}", config.state_path.display());
    tracing::info!("  Ops server: {}", config.ops_addr);

    let chain: Arc<dyn FeeAssetChain> = match &config.chain {
        ChainSettings::Simulated => {
            tracing::warn!("Running against the simulated chain; no real deposits are made");
            Arc::new(SimulatedChain::new(SIMULATED_LANDING_DELAY))
        }
        ChainSettings::Gateway { url, token } => {
            if let Some(token) = token {
                tracing::info!(provenance = %token.provenance(), "Gateway token resolved");
            }
            let client = GatewayClient::connect(&GatewayConfig {
                url: url.clone(),
                auth_token: token.as_ref().map(|t| t.expose().to_string()),
                request_timeout: GATEWAY_REQUEST_TIMEOUT,
            })
            .context("failed to create gateway client")?;
            tracing::info!("  Gateway: {}", client.url());
            Arc::new(client)
        }
    };

    let ops = Arc::new(OpsState::new(config.check_interval).context("failed to register metrics")?);
    let shutdown = Shutdown::new();
    let gate = FlightGate::new();
    let store = Arc::new(StateStore::new(config.state_path.clone()));

    let balances = Arc::new(FeeAssetBalanceReader::new(chain.clone()));
    let readiness: Arc<dyn MessageReadiness> =
        Arc::new(PollingMessageReadiness::new(chain.clone(), config.confirmation.initial_poll));
    let engine = Arc::new(ConfirmationEngine::new(
        config.destination,
        balances.clone(),
        Some(readiness),
        ops.clone(),
    ));

    let reconciler = Arc::new(Reconciler::new(
        store.clone(),
        engine.clone(),
        config.confirmation,
        ops.clone(),
        gate.clone(),
        shutdown.clone(),
    ));
    let checker = Arc::new(Checker::new(
        config.checker_config(),
        balances,
        Arc::new(PortalBridgeSubmitter::new(chain)),
        engine,
        store,
        reconciler.clone(),
        ops.clone(),
        gate,
    ));

    // Start ops server. It outlives the scheduler so /ready reports
    // shutting_down while a confirmation finishes.
    let ops_stop = Shutdown::new();
    let ops_server = tokio::spawn(OpsServer::new(ops).run(config.ops_addr, ops_stop.clone()));

    // Wait for shutdown signal
    let signal_shutdown = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = wait_for_signal().await {
            tracing::error!("Failed to listen for shutdown signals: {}", e);
        }
        tracing::info!("Shutting down...");
        signal_shutdown.trigger();
    });

    let scheduler = Scheduler::new(checker, reconciler, config.check_interval, shutdown);
    let result = scheduler.run().await;

    // Stop the ops server even when the scheduler failed.
    ops_stop.trigger();
    match ops_server.await {
        Ok(Err(e)) => tracing::error!("Ops server error: {}", e),
        Err(e) => tracing::error!("Ops server task failed: {}", e),
        Ok(Ok(())) => {}
    }

    result.context("bridge state needs operator attention")?;
    tracing::info!("Fee funder stopped");
    Ok(())
}

async fn wait_for_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut terminate = signal(SignalKind::terminate())?;
        tokio::select! {
            r = tokio::signal::ctrl_c() => r?,
            _ = terminate.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
    }

    Ok(())
}

//! Fee Funder Configuration
//!
//! Values come from three layers, highest first: command line or `FUNDER_*`
//! environment, the optional JSON config file, built-in defaults.

use crate::secrets::{ResolvedSecret, SecretSource};
use anyhow::{bail, Context, Result};
use funding_runtime::{CheckerConfig, ConfirmationConfig};
use l1_integration::{parse_uint, Address};
use serde::Deserialize;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CHECK_INTERVAL_MS: u64 = 60_000;
pub const DEFAULT_CONFIRM_TIMEOUT_MS: u64 = 180_000;
pub const DEFAULT_CONFIRM_POLL_MIN_MS: u64 = 2_000;
pub const DEFAULT_CONFIRM_POLL_MAX_MS: u64 = 15_000;
pub const DEFAULT_STATE_PATH: &str = "./data/bridge-state.json";
pub const DEFAULT_OPS_HOST: &str = "127.0.0.1";
pub const DEFAULT_OPS_PORT: u16 = 9464;
pub const DEFAULT_RECONCILE_EVERY_CYCLES: u32 = 5;

/// Unvalidated settings from one layer. `None` means "not set here".
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub destination: Option<String>,
    pub threshold: Option<String>,
    pub top_up_amount: Option<String>,
    pub check_interval_ms: Option<u64>,
    pub confirm_timeout_ms: Option<u64>,
    pub confirm_poll_min_ms: Option<u64>,
    pub confirm_poll_max_ms: Option<u64>,
    pub state_path: Option<PathBuf>,
    pub ops_host: Option<String>,
    pub ops_port: Option<u16>,
    pub gateway_url: Option<String>,
    pub gateway_token: Option<SecretSource>,
    pub reconcile_every_cycles: Option<u32>,
    pub simulate: Option<bool>,
}

impl Settings {
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("invalid config file {}", path.display()))
    }

    /// Keep every value set here; take the rest from `fallback`
    pub fn or(self, fallback: Settings) -> Settings {
        Settings {
            destination: self.destination.or(fallback.destination),
            threshold: self.threshold.or(fallback.threshold),
            top_up_amount: self.top_up_amount.or(fallback.top_up_amount),
            check_interval_ms: self.check_interval_ms.or(fallback.check_interval_ms),
            confirm_timeout_ms: self.confirm_timeout_ms.or(fallback.confirm_timeout_ms),
            confirm_poll_min_ms: self.confirm_poll_min_ms.or(fallback.confirm_poll_min_ms),
            confirm_poll_max_ms: self.confirm_poll_max_ms.or(fallback.confirm_poll_max_ms),
            state_path: self.state_path.or(fallback.state_path),
            ops_host: self.ops_host.or(fallback.ops_host),
            ops_port: self.ops_port.or(fallback.ops_port),
            gateway_url: self.gateway_url.or(fallback.gateway_url),
            gateway_token: self.gateway_token.or(fallback.gateway_token),
            reconcile_every_cycles: self.reconcile_every_cycles.or(fallback.reconcile_every_cycles),
            simulate: self.simulate.or(fallback.simulate),
        }
    }

    /// Apply defaults, validate, and resolve the gateway secret
    pub fn resolve(self) -> Result<FunderConfig> {
        let destination: Address = self
            .destination
            .context("destination is required")?
            .parse()
            .context("invalid destination")?;
        if destination.is_zero() {
            bail!("destination must not be the zero address");
        }

        let threshold = parse_uint(&self.threshold.context("threshold is required")?).context("invalid threshold")?;
        if threshold == 0 {
            bail!("threshold must be greater than zero");
        }
        let top_up_amount =
            parse_uint(&self.top_up_amount.context("top_up_amount is required")?).context("invalid top_up_amount")?;
        if top_up_amount == 0 {
            bail!("top_up_amount must be greater than zero");
        }

        let check_interval_ms = self.check_interval_ms.unwrap_or(DEFAULT_CHECK_INTERVAL_MS);
        let confirm_timeout_ms = self.confirm_timeout_ms.unwrap_or(DEFAULT_CONFIRM_TIMEOUT_MS);
        let poll_min_ms = self.confirm_poll_min_ms.unwrap_or(DEFAULT_CONFIRM_POLL_MIN_MS);
        let poll_max_ms = self.confirm_poll_max_ms.unwrap_or(DEFAULT_CONFIRM_POLL_MAX_MS);
        if check_interval_ms == 0 {
            bail!("check_interval_ms must be greater than zero");
        }
        if confirm_timeout_ms == 0 {
            bail!("confirm_timeout_ms must be greater than zero");
        }
        if poll_min_ms == 0 {
            bail!("confirm_poll_min_ms must be greater than zero");
        }
        if poll_min_ms > poll_max_ms {
            bail!("confirm_poll_min_ms ({poll_min_ms}) exceeds confirm_poll_max_ms ({poll_max_ms})");
        }

        let reconcile_every_cycles = self.reconcile_every_cycles.unwrap_or(DEFAULT_RECONCILE_EVERY_CYCLES);
        if reconcile_every_cycles == 0 {
            bail!("reconcile_every_cycles must be greater than zero");
        }

        let ops_host = self.ops_host.unwrap_or_else(|| DEFAULT_OPS_HOST.to_string());
        let ops_ip: IpAddr = ops_host
            .parse()
            .with_context(|| format!("ops_host {ops_host} is not an IP address"))?;
        let ops_addr = SocketAddr::new(ops_ip, self.ops_port.unwrap_or(DEFAULT_OPS_PORT));

        let chain = if self.simulate.unwrap_or(false) {
            ChainSettings::Simulated
        } else {
            let url = self.gateway_url.context("gateway_url is required unless simulate is set")?;
            let token = self
                .gateway_token
                .map(|source| source.resolve().context("failed to resolve gateway_token"))
                .transpose()?;
            ChainSettings::Gateway { url, token }
        };

        Ok(FunderConfig {
            destination,
            threshold,
            top_up_amount,
            check_interval: Duration::from_millis(check_interval_ms),
            confirmation: ConfirmationConfig {
                timeout: Duration::from_millis(confirm_timeout_ms),
                initial_poll: Duration::from_millis(poll_min_ms),
                max_poll: Duration::from_millis(poll_max_ms),
            },
            state_path: self.state_path.unwrap_or_else(|| PathBuf::from(DEFAULT_STATE_PATH)),
            ops_addr,
            reconcile_every_cycles,
            chain,
        })
    }
}

#[derive(Debug, Clone)]
pub enum ChainSettings {
    /// In-memory chain, no network
    Simulated,
    Gateway {
        url: String,
        token: Option<ResolvedSecret>,
    },
}

/// Validated configuration
#[derive(Debug, Clone)]
pub struct FunderConfig {
    pub destination: Address,
    pub threshold: u128,
    pub top_up_amount: u128,
    pub check_interval: Duration,
    pub confirmation: ConfirmationConfig,
    pub state_path: PathBuf,
    pub ops_addr: SocketAddr,
    pub reconcile_every_cycles: u32,
    pub chain: ChainSettings,
}

impl FunderConfig {
    pub fn checker_config(&self) -> CheckerConfig {
        CheckerConfig {
            destination: self.destination,
            threshold: self.threshold,
            top_up_amount: self.top_up_amount,
            confirmation: self.confirmation,
            reconcile_every_cycles: self.reconcile_every_cycles,
        }
    }
}

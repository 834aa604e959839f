//! Configuration module for the sniper
//!
//! This module handles configuration loading from TOML files and `.env`
//! overrides, and provides structured configuration types for each component.
//! Every field has a default, so a partial (or missing) config file still
//! produces a runnable configuration.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::LAMPORTS_PER_SOL;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("{field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub rpc: RpcConfig,
    pub wallet: WalletConfig,
    pub trading: TradingConfig,
    pub vetting: VettingConfig,
    pub sniffer: SnifferConfig,
    pub monitor: MonitorConfig,
    pub disposal: DisposalConfig,
    pub jito: JitoConfig,
    pub store: StoreConfig,
    pub monitoring: MonitoringConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcConfig {
    /// Primary HTTP RPC endpoint
    #[serde(default = "default_rpc_url")]
    pub url: String,

    /// Websocket endpoint for log/account subscriptions
    #[serde(default = "default_ws_url")]
    pub ws_url: String,

    /// Extra endpoints every transaction is also broadcast to
    #[serde(default)]
    pub send_tx_urls: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletConfig {
    /// Path to a keypair file; takes precedence over the env key when set
    #[serde(default)]
    pub keypair_path: Option<String>,

    /// Env var holding a base58 secret key
    #[serde(default = "default_private_key_env")]
    pub private_key_env: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradingConfig {
    /// SOL spent per acquisition
    #[serde(default = "default_buy_amount_sol")]
    pub buy_amount_sol: f64,

    /// Multiplier applied to the quoted token amount
    #[serde(default = "default_slippage")]
    pub slippage: f64,

    #[serde(default = "default_priority_fee")]
    pub priority_fee_micro_lamports: u64,

    #[serde(default = "default_compute_unit_limit")]
    pub compute_unit_limit: u32,

    /// Always create the token account instead of checking it exists first
    #[serde(default = "default_true")]
    pub skip_ata_lookup: bool,

    /// Route through Jito bundles when a relay validator leads
    #[serde(default = "default_true")]
    pub enable_jito: bool,

    /// Confirmation wait for each dispatched transaction
    #[serde(default = "default_confirm_timeout_secs")]
    pub confirm_timeout_secs: u64,

    /// Blockhash cache refresh interval
    #[serde(default = "default_blockhash_refresh_ms")]
    pub blockhash_refresh_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VettingConfig {
    #[serde(default = "default_min_creator_buy_sol")]
    pub min_creator_buy_sol: f64,

    #[serde(default = "default_max_creator_buy_sol")]
    pub max_creator_buy_sol: f64,

    /// Creator transactions scanned for funders
    #[serde(default = "default_funder_scan_depth")]
    pub funder_scan_depth: usize,

    #[serde(default = "default_max_funders")]
    pub max_funders: usize,

    /// Transfers at or below this are ignored when looking for funders
    #[serde(default = "default_min_funding_sol")]
    pub min_funding_sol: f64,

    /// Addresses trusted as funders in addition to the built-in exchange list
    #[serde(default)]
    pub extra_exchange_addresses: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnifferConfig {
    /// Log line marking a new mint
    #[serde(default = "default_mint_log_marker")]
    pub mint_log_marker: String,

    /// Candidates whose evaluation took longer than this are dropped
    #[serde(default = "default_freshness_ms")]
    pub freshness_ms: u64,

    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    #[serde(default = "default_candidate_buffer")]
    pub candidate_buffer: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Recent transactions inspected per notification
    #[serde(default = "default_monitor_lookback")]
    pub lookback: usize,

    #[serde(default = "default_lookup_timeout_ms")]
    pub lookup_timeout_ms: u64,

    #[serde(default = "default_monitor_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisposalConfig {
    /// Registry sweep cadence
    #[serde(default = "default_scan_interval_ms")]
    pub scan_interval_ms: u64,

    /// Cadence of new attempts within one race
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,

    #[serde(default = "default_deadline_ms")]
    pub deadline_ms: u64,

    #[serde(default = "default_min_sol_output")]
    pub min_sol_output_lamports: u64,

    /// Races without a confirmed sell before the asset is abandoned
    #[serde(default = "default_max_rounds")]
    pub max_rounds: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JitoConfig {
    #[serde(default = "default_block_engine_url")]
    pub block_engine_url: String,

    #[serde(default = "default_validators_url")]
    pub validators_url: String,

    #[serde(default = "default_tip_stream_url")]
    pub tip_stream_url: String,

    /// Tip paid until the first tip sample arrives
    #[serde(default = "default_tip_lamports")]
    pub default_tip_lamports: u64,

    #[serde(default = "default_epoch_poll_ms")]
    pub epoch_poll_ms: u64,

    #[serde(default = "default_refresh_secs")]
    pub leader_schedule_refresh_secs: u64,

    #[serde(default = "default_refresh_secs")]
    pub validators_refresh_secs: u64,

    #[serde(default = "default_refresh_secs")]
    pub vote_accounts_refresh_secs: u64,

    #[serde(default = "default_initial_backoff_ms")]
    pub stream_initial_backoff_ms: u64,

    #[serde(default = "default_max_backoff_ms")]
    pub stream_max_backoff_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// sled database holding known creator addresses
    #[serde(default = "default_store_path")]
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringConfig {
    /// Enable Prometheus metrics
    #[serde(default = "default_true")]
    pub enable_metrics: bool,

    /// Metrics port
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
}

// Default value functions
fn default_rpc_url() -> String { "https://api.mainnet-beta.solana.com".to_string() }
fn default_ws_url() -> String { "wss://api.mainnet-beta.solana.com".to_string() }
fn default_private_key_env() -> String { "PRIVATE_KEY".to_string() }
fn default_buy_amount_sol() -> f64 { 0.05 }
fn default_slippage() -> f64 { 0.98 }
fn default_priority_fee() -> u64 { 200_000 }
fn default_compute_unit_limit() -> u32 { 70_000 }
fn default_confirm_timeout_secs() -> u64 { 120 }
fn default_blockhash_refresh_ms() -> u64 { 400 }
fn default_min_creator_buy_sol() -> f64 { 0.5 }
fn default_max_creator_buy_sol() -> f64 { 2.5 }
fn default_funder_scan_depth() -> usize { 30 }
fn default_max_funders() -> usize { 3 }
fn default_min_funding_sol() -> f64 { 0.05 }
fn default_mint_log_marker() -> String { "InitializeMint2".to_string() }
fn default_freshness_ms() -> u64 { 2_000 }
fn default_initial_backoff_ms() -> u64 { 250 }
fn default_max_backoff_ms() -> u64 { 10_000 }
fn default_candidate_buffer() -> usize { 64 }
fn default_monitor_lookback() -> usize { 3 }
fn default_lookup_timeout_ms() -> u64 { 900 }
fn default_monitor_attempts() -> u32 { 10 }
fn default_retry_delay_ms() -> u64 { 200 }
fn default_scan_interval_ms() -> u64 { 100 }
fn default_tick_ms() -> u64 { 400 }
fn default_deadline_ms() -> u64 { 6_000 }
fn default_min_sol_output() -> u64 { 1 }
fn default_max_rounds() -> u32 { 5 }
fn default_block_engine_url() -> String { "https://mainnet.block-engine.jito.wtf".to_string() }
fn default_validators_url() -> String { "https://kobe.mainnet.jito.network/api/v1/validators".to_string() }
fn default_tip_stream_url() -> String { "wss://bundles.jito.wtf/api/v1/bundles/tip_stream".to_string() }
fn default_tip_lamports() -> u64 { 2_000_000 }
fn default_epoch_poll_ms() -> u64 { 10 }
fn default_refresh_secs() -> u64 { 600 }
fn default_store_path() -> String { "creators.db".to_string() }
fn default_metrics_port() -> u16 { 9090 }
fn default_true() -> bool { true }

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            url: default_rpc_url(),
            ws_url: default_ws_url(),
            send_tx_urls: Vec::new(),
        }
    }
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            keypair_path: None,
            private_key_env: default_private_key_env(),
        }
    }
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            buy_amount_sol: default_buy_amount_sol(),
            slippage: default_slippage(),
            priority_fee_micro_lamports: default_priority_fee(),
            compute_unit_limit: default_compute_unit_limit(),
            skip_ata_lookup: true,
            enable_jito: true,
            confirm_timeout_secs: default_confirm_timeout_secs(),
            blockhash_refresh_ms: default_blockhash_refresh_ms(),
        }
    }
}

impl TradingConfig {
    pub fn buy_amount_lamports(&self) -> u64 {
        (self.buy_amount_sol * LAMPORTS_PER_SOL as f64).round() as u64
    }
}

impl Default for VettingConfig {
    fn default() -> Self {
        Self {
            min_creator_buy_sol: default_min_creator_buy_sol(),
            max_creator_buy_sol: default_max_creator_buy_sol(),
            funder_scan_depth: default_funder_scan_depth(),
            max_funders: default_max_funders(),
            min_funding_sol: default_min_funding_sol(),
            extra_exchange_addresses: Vec::new(),
        }
    }
}

impl VettingConfig {
    pub fn min_funding_lamports(&self) -> u64 {
        (self.min_funding_sol * LAMPORTS_PER_SOL as f64).round() as u64
    }
}

impl Default for SnifferConfig {
    fn default() -> Self {
        Self {
            mint_log_marker: default_mint_log_marker(),
            freshness_ms: default_freshness_ms(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            candidate_buffer: default_candidate_buffer(),
        }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            lookback: default_monitor_lookback(),
            lookup_timeout_ms: default_lookup_timeout_ms(),
            max_attempts: default_monitor_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

impl Default for DisposalConfig {
    fn default() -> Self {
        Self {
            scan_interval_ms: default_scan_interval_ms(),
            tick_ms: default_tick_ms(),
            deadline_ms: default_deadline_ms(),
            min_sol_output_lamports: default_min_sol_output(),
            max_rounds: default_max_rounds(),
        }
    }
}

impl Default for JitoConfig {
    fn default() -> Self {
        Self {
            block_engine_url: default_block_engine_url(),
            validators_url: default_validators_url(),
            tip_stream_url: default_tip_stream_url(),
            default_tip_lamports: default_tip_lamports(),
            epoch_poll_ms: default_epoch_poll_ms(),
            leader_schedule_refresh_secs: default_refresh_secs(),
            validators_refresh_secs: default_refresh_secs(),
            vote_accounts_refresh_secs: default_refresh_secs(),
            stream_initial_backoff_ms: default_initial_backoff_ms(),
            stream_max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            enable_metrics: default_true(),
            metrics_port: default_metrics_port(),
        }
    }
}

impl Config {
    /// Load configuration from TOML file
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let trading = &self.trading;
        if trading.buy_amount_sol.is_nan() || trading.buy_amount_sol <= 0.0 {
            return Err(invalid("trading.buy_amount_sol", "must be positive"));
        }
        if !(0.0..=1.0).contains(&trading.slippage) {
            return Err(invalid("trading.slippage", "must be within [0, 1]"));
        }
        if trading.compute_unit_limit == 0 {
            return Err(invalid("trading.compute_unit_limit", "must be non-zero"));
        }

        let vetting = &self.vetting;
        if vetting.min_creator_buy_sol >= vetting.max_creator_buy_sol {
            return Err(invalid(
                "vetting.min_creator_buy_sol",
                format!(
                    "{} must be below max_creator_buy_sol {}",
                    vetting.min_creator_buy_sol, vetting.max_creator_buy_sol
                ),
            ));
        }
        if vetting.max_funders == 0 || vetting.funder_scan_depth == 0 {
            return Err(invalid("vetting.max_funders", "scan depth and funder cap must be non-zero"));
        }

        if self.rpc.url.is_empty() || self.rpc.ws_url.is_empty() {
            return Err(invalid("rpc.url", "RPC and websocket endpoints are required"));
        }

        let disposal = &self.disposal;
        if disposal.tick_ms == 0 || disposal.scan_interval_ms == 0 {
            return Err(invalid("disposal.tick_ms", "intervals must be non-zero"));
        }
        if disposal.deadline_ms < disposal.tick_ms {
            return Err(invalid("disposal.deadline_ms", "must allow at least one attempt"));
        }

        if self.monitor.max_attempts == 0 {
            return Err(invalid("monitor.max_attempts", "must be non-zero"));
        }
        if self.jito.epoch_poll_ms == 0 {
            return Err(invalid("jito.epoch_poll_ms", "must be non-zero"));
        }
        Ok(())
    }
}

//! Configuration for the sniper bot
//!
//! Sections mirror the subsystems: general settings, bus sizing, watcher
//! address books, the safety check weights and the trading parameters.
//! Configuration is loaded once in `main`, validated, and passed to
//! `AppState` by `Arc`; there is no process-global config.

use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::bus::DEFAULT_HISTORY_CAPACITY;

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BotConfig {
    /// General bot settings
    pub general: GeneralConfig,

    /// Message bus sizing
    pub bus: BusConfig,

    /// Mempool watcher address book
    pub mempool: MempoolConfig,

    /// Pool detector settings
    pub detector: DetectorConfig,

    /// Safety check weights and probes
    pub safety: SafetyConfig,

    /// Trading parameters
    pub trading: TradingConfig,
}

/// General bot settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Bot name/identifier used in logs
    pub bot_name: String,

    /// Log level (error, warn, info, debug, trace)
    pub log_level: String,

    /// Enable metrics collection
    pub enable_metrics: bool,

    /// Interval between coordinator stats log lines, in seconds
    pub stats_interval_secs: u64,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            bot_name: "sniperbot".to_string(),
            log_level: "info".to_string(),
            enable_metrics: true,
            stats_interval_secs: 60,
        }
    }
}

/// Message bus sizing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusConfig {
    /// Number of messages retained in bus history
    pub history_capacity: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            history_capacity: DEFAULT_HISTORY_CAPACITY,
        }
    }
}

/// Address book for the mempool watcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MempoolConfig {
    /// Router/factory addresses whose calls are relevant. Empty means any
    /// target is considered.
    pub watched_routers: Vec<String>,
}

impl Default for MempoolConfig {
    fn default() -> Self {
        Self {
            watched_routers: Vec::new(),
        }
    }
}

/// Pool detector settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorConfig {
    /// Factory/launchpad addresses to filter confirmed logs on. Empty means
    /// all logs from the subscription are inspected.
    pub factory_addresses: Vec<String>,

    /// Sliding dedup window in blocks: a pool re-confirmed within this many
    /// blocks of its first sighting is not re-reported.
    pub dedup_window_blocks: u64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            factory_addresses: Vec::new(),
            dedup_window_blocks: 128,
        }
    }
}

/// Safety check weights, thresholds and probe sizing.
///
/// Each check yields a 0-100 sub-score; the aggregate risk score is the
/// weight-proportional sum. Hard limits live in [`TradingConfig`] and
/// override the aggregate regardless of these weights.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafetyConfig {
    /// Reject when the weighted risk score exceeds this threshold
    pub risk_threshold: u8,

    /// Weight of the liquidity depth check
    pub weight_liquidity: u32,

    /// Weight of the ownership renouncement check
    pub weight_ownership: u32,

    /// Weight of the mint/freeze authority check
    pub weight_authority: u32,

    /// Weight of the honeypot / tax simulation check
    pub weight_honeypot: u32,

    /// Weight of the blacklist bytecode scan
    pub weight_blacklist: u32,

    /// Weight of the liquidity lock check
    pub weight_liquidity_lock: u32,

    /// Buy size used for the buy-then-sell simulation, in base units
    pub probe_amount: u128,

    /// USD price of one whole base asset unit, for display-oriented
    /// liquidity estimates
    pub base_usd_price: f64,

    /// Decimals of the base asset
    pub base_decimals: u32,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            risk_threshold: 50,
            weight_liquidity: 20,
            weight_ownership: 15,
            weight_authority: 15,
            weight_honeypot: 30,
            weight_blacklist: 10,
            weight_liquidity_lock: 10,
            probe_amount: 100_000_000,
            base_usd_price: 150.0,
            base_decimals: 9,
        }
    }
}

impl SafetyConfig {
    /// Sum of all check weights.
    pub fn total_weight(&self) -> u32 {
        self.weight_liquidity
            + self.weight_ownership
            + self.weight_authority
            + self.weight_honeypot
            + self.weight_blacklist
            + self.weight_liquidity_lock
    }
}

/// Trading parameters. Read by the safety and sniper agents; mutated at
/// runtime only by explicit operator command relayed through the
/// coordinator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradingConfig {
    /// Maximum tolerated slippage in basis points
    pub slippage_bps: u32,

    /// Priority fee attached to submissions (floor; the live estimate is
    /// used when higher)
    pub priority_fee: u64,

    /// Position size per snipe, in base units
    pub max_position_size: u128,

    /// Liquidity floor in USD, checked by safety and re-checked at
    /// execution time
    pub min_liquidity_usd: f64,

    /// Hard limit on estimated buy tax
    pub max_buy_tax_bps: u32,

    /// Hard limit on estimated sell tax
    pub max_sell_tax_bps: u32,

    /// Cap on concurrently open positions
    pub max_concurrent_positions: usize,

    /// Dry-run mode: quote and report, never touch the signer
    pub simulation_mode: bool,

    /// Auto-exit once spot price reaches entry price times this multiple
    pub auto_take_profit_multiple: f64,

    /// Exit submission retries before a position is marked Failed
    pub max_exit_retries: u32,

    /// How long to wait for a submission to confirm, in milliseconds
    pub confirmation_timeout_ms: u64,

    /// Deadline attached to submitted transactions, in milliseconds
    pub submission_deadline_ms: u64,

    /// Interval between auto-exit checks, in seconds
    pub exit_check_interval_secs: u64,
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            slippage_bps: 300,
            priority_fee: 10_000,
            max_position_size: 1_000_000_000,
            min_liquidity_usd: 5_000.0,
            max_buy_tax_bps: 1_000,
            max_sell_tax_bps: 1_000,
            max_concurrent_positions: 5,
            simulation_mode: true,
            auto_take_profit_multiple: 3.0,
            max_exit_retries: 3,
            confirmation_timeout_ms: 30_000,
            submission_deadline_ms: 60_000,
            exit_check_interval_secs: 5,
        }
    }
}

impl BotConfig {
    /// Load configuration from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config: BotConfig = serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Write configuration to a JSON file, creating parent directories.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create config directory {}", parent.display()))?;
        }
        let raw = serde_json::to_string_pretty(self).context("failed to serialize config")?;
        fs::write(path, raw)
            .with_context(|| format!("failed to write config file {}", path.display()))?;
        Ok(())
    }

    /// Check cross-field consistency before the bot starts.
    pub fn validate(&self) -> Result<()> {
        if self.trading.slippage_bps >= 10_000 {
            bail!(
                "slippage_bps must be below 10000, got {}",
                self.trading.slippage_bps
            );
        }
        if self.trading.max_concurrent_positions == 0 {
            bail!("max_concurrent_positions must be at least 1");
        }
        if self.trading.max_position_size == 0 {
            bail!("max_position_size must be positive");
        }
        if self.safety.total_weight() == 0 {
            bail!("safety check weights must not all be zero");
        }
        if self.safety.probe_amount == 0 {
            bail!("safety probe_amount must be positive");
        }
        if self.bus.history_capacity == 0 {
            bail!("bus history_capacity must be at least 1");
        }
        Ok(())
    }
}

//! Pool detector agent
//!
//! Watches confirmed-block logs for pool-initialization events across the
//! supported protocol families, extracts the pool candidate and publishes
//! `NewPoolDetected`. A sliding dedup window keyed by pool address stops a
//! pool re-confirmed after a reorg from being reported as new twice, and a
//! reorg notice retracts every candidate whose confirming block was
//! invalidated via `PoolDetectionReverted`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::bus::MessageBus;
use crate::chain_adapters::{ChainClient, LogEvent, LogFilter, ReorgNotice};
use crate::config::DetectorConfig;
use crate::errors::SniperError;
use crate::metric;
use crate::types::{
    normalize_address, AgentId, MessagePayload, PoolCandidate, PoolRetraction, ProtocolVersion,
    NATIVE_ASSET,
};

use super::Agent;

/// `PairCreated(address,address,address,uint256)` on V2-style factories.
const PAIR_CREATED_TOPIC: &str =
    "0x0d3648bd0f6ba80134a33ba9275ac585d9d315f0ad8355cddefde31afa28d0e9";

/// `PoolCreated(address,address,uint24,int24,address)` on V3-style factories.
const POOL_CREATED_TOPIC: &str =
    "0x783cca1c0412dd0d695e784568c96da2e9c22ff989357a2e8b1d9b2b4e6b7118";

/// `CurveCreated(address,address)` on launchpad bonding-curve deployments.
const CURVE_CREATED_TOPIC: &str =
    "0x9c5f8a41b42d0f1a7e6c25548c1c6f6a1f5d0f4db6c3ee44c1b2f7c0552a9b3e";

/// `CurveGraduated(address,address,address)`: curve liquidity migrated to a
/// standard AMM pool once the funding threshold was met.
const CURVE_GRADUATED_TOPIC: &str =
    "0x6f1df62c38abcde10a4a37a7a21b0b8d2a9f3d5c11c6ce08e05a04a6f0c3d471";

/// Fee tier reported for V2-style pairs.
const V2_FEE_BPS: u32 = 30;

/// Platform fee of launchpad bonding curves.
const CURVE_FEE_BPS: u32 = 100;

#[derive(Default)]
struct DedupWindow {
    /// Pool address -> block the candidate was confirmed in
    entries: HashMap<String, u64>,
    head_block: u64,
}

impl DedupWindow {
    /// Record a sighting. Returns false when the address is already inside
    /// the window (a duplicate that must not be re-reported).
    fn record(&mut self, pool_address: &str, block: u64, window_blocks: u64) -> bool {
        self.head_block = self.head_block.max(block);
        let head = self.head_block;
        self.entries
            .retain(|_, seen_at| head.saturating_sub(*seen_at) <= window_blocks);

        if self.entries.contains_key(pool_address) {
            return false;
        }
        self.entries.insert(pool_address.to_string(), block);
        true
    }

    /// Remove and return every entry whose confirming block the notice
    /// invalidates, so the pool can be legitimately re-detected later.
    fn evict_invalidated(&mut self, notice: &ReorgNotice) -> Vec<(String, u64)> {
        let invalidated: Vec<(String, u64)> = self
            .entries
            .iter()
            .filter(|(_, block)| notice.invalidates(**block))
            .map(|(addr, block)| (addr.clone(), *block))
            .collect();
        for (addr, _) in &invalidated {
            self.entries.remove(addr);
        }
        invalidated
    }
}

/// Watches confirmed logs for pool creation and graduation events.
pub struct PoolDetectorAgent {
    bus: Arc<MessageBus>,
    chain: Arc<dyn ChainClient>,
    config: DetectorConfig,
    window: Mutex<DedupWindow>,
    shutdown: watch::Sender<bool>,
}

impl PoolDetectorAgent {
    pub fn new(bus: Arc<MessageBus>, chain: Arc<dyn ChainClient>, config: DetectorConfig) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            bus,
            chain,
            config,
            window: Mutex::new(DedupWindow::default()),
            shutdown,
        }
    }

    fn log_filter(&self) -> LogFilter {
        LogFilter {
            addresses: self
                .config
                .factory_addresses
                .iter()
                .map(|a| normalize_address(a))
                .collect(),
            topics: vec![
                PAIR_CREATED_TOPIC.to_string(),
                POOL_CREATED_TOPIC.to_string(),
                CURVE_CREATED_TOPIC.to_string(),
                CURVE_GRADUATED_TOPIC.to_string(),
            ],
        }
    }

    async fn handle_log(&self, log: LogEvent) {
        let candidate = match recognize_pool_event(&log) {
            Ok(Some(candidate)) => candidate,
            Ok(None) => return,
            Err(err) => {
                debug!(tx_hash = %log.tx_hash, %err, "dropping undecodable log event");
                return;
            }
        };

        let fresh = {
            let mut window = self.window.lock().expect("dedup window lock poisoned");
            window.record(
                &candidate.pool_address,
                candidate.detected_at_block,
                self.config.dedup_window_blocks,
            )
        };
        if !fresh {
            debug!(
                pool = %candidate.pool_address,
                block = candidate.detected_at_block,
                "pool already reported inside dedup window"
            );
            return;
        }

        info!(
            pool = %candidate.pool_address,
            token = %candidate.token_a,
            protocol = ?candidate.protocol_version,
            block = candidate.detected_at_block,
            "new pool detected"
        );
        metric::record_pool_detected();
        self.bus
            .broadcast(
                AgentId::PoolDetector,
                MessagePayload::NewPoolDetected(candidate),
            )
            .await;
    }

    async fn handle_reorg(&self, notice: ReorgNotice) {
        let invalidated = {
            let mut window = self.window.lock().expect("dedup window lock poisoned");
            window.evict_invalidated(&notice)
        };
        if invalidated.is_empty() {
            return;
        }

        warn!(
            from_block = notice.from_block,
            to_block = notice.to_block,
            retracted = invalidated.len(),
            "reorg invalidated detected pools"
        );
        for (pool_address, block) in invalidated {
            metric::record_pool_reverted();
            self.bus
                .broadcast(
                    AgentId::PoolDetector,
                    MessagePayload::PoolDetectionReverted(PoolRetraction {
                        pool_address,
                        invalidated_block: block,
                    }),
                )
                .await;
        }
    }
}

/// Recognize a pool-creation/graduation log. `Ok(None)` for unrelated
/// events, `Err` for events that match a known topic but carry malformed
/// payloads.
fn recognize_pool_event(log: &LogEvent) -> Result<Option<PoolCandidate>, SniperError> {
    let topic0 = match log.topics.first() {
        Some(topic) => topic.as_str(),
        None => return Ok(None),
    };

    let candidate = match topic0 {
        PAIR_CREATED_TOPIC => PoolCandidate {
            pool_address: data_address(log, 0)?,
            token_a: topic_address(log, 1)?,
            token_b: topic_address(log, 2)?,
            fee_tier_bps: V2_FEE_BPS,
            protocol_version: ProtocolVersion::UniswapV2,
            detected_at_block: log.block_number,
        },
        POOL_CREATED_TOPIC => PoolCandidate {
            // data layout: word 0 = tickSpacing, word 1 = pool address
            pool_address: data_address(log, 1)?,
            token_a: topic_address(log, 1)?,
            token_b: topic_address(log, 2)?,
            fee_tier_bps: topic_u32(log, 3)? / 100,
            protocol_version: ProtocolVersion::UniswapV3,
            detected_at_block: log.block_number,
        },
        CURVE_CREATED_TOPIC => PoolCandidate {
            pool_address: topic_address(log, 2)?,
            token_a: topic_address(log, 1)?,
            token_b: NATIVE_ASSET.to_string(),
            fee_tier_bps: CURVE_FEE_BPS,
            protocol_version: ProtocolVersion::BondingCurve,
            detected_at_block: log.block_number,
        },
        // A graduation moves the curve's liquidity into a standard pair;
        // the new pair is a fresh candidate at the AMM fee tier.
        CURVE_GRADUATED_TOPIC => PoolCandidate {
            pool_address: data_address(log, 0)?,
            token_a: topic_address(log, 1)?,
            token_b: NATIVE_ASSET.to_string(),
            fee_tier_bps: V2_FEE_BPS,
            protocol_version: ProtocolVersion::UniswapV2,
            detected_at_block: log.block_number,
        },
        _ => return Ok(None),
    };

    Ok(Some(candidate))
}

/// Address packed into an indexed topic (last 20 of 32 bytes).
fn topic_address(log: &LogEvent, index: usize) -> Result<String, SniperError> {
    let topic = log.topics.get(index).ok_or_else(|| SniperError::Decode {
        context: format!("log {}", log.tx_hash),
        reason: format!("missing topic {index}"),
    })?;
    let hex = topic.trim_start_matches("0x");
    if hex.len() != 64 {
        return Err(SniperError::Decode {
            context: format!("log {}", log.tx_hash),
            reason: format!("topic {index} has unexpected length {}", hex.len()),
        });
    }
    Ok(format!("0x{}", hex[24..].to_ascii_lowercase()))
}

/// Small unsigned integer packed into an indexed topic.
fn topic_u32(log: &LogEvent, index: usize) -> Result<u32, SniperError> {
    let topic = log.topics.get(index).ok_or_else(|| SniperError::Decode {
        context: format!("log {}", log.tx_hash),
        reason: format!("missing topic {index}"),
    })?;
    let hex = topic.trim_start_matches("0x");
    let significant = hex.trim_start_matches('0');
    if significant.is_empty() {
        return Ok(0);
    }
    u32::from_str_radix(significant, 16).map_err(|_| SniperError::Decode {
        context: format!("log {}", log.tx_hash),
        reason: format!("topic {index} is not a small integer"),
    })
}

/// Address stored in the data section at 32-byte word `word`.
fn data_address(log: &LogEvent, word: usize) -> Result<String, SniperError> {
    let start = word * 32;
    let end = start + 32;
    if log.data.len() < end {
        return Err(SniperError::Decode {
            context: format!("log {}", log.tx_hash),
            reason: format!("data too short for word {word} ({} bytes)", log.data.len()),
        });
    }
    let bytes = &log.data[start + 12..end];
    let mut out = String::with_capacity(42);
    out.push_str("0x");
    for byte in bytes {
        out.push_str(&format!("{byte:02x}"));
    }
    Ok(out)
}

#[async_trait]
impl Agent for PoolDetectorAgent {
    fn id(&self) -> AgentId {
        AgentId::PoolDetector
    }

    async fn start(self: Arc<Self>) -> Result<()> {
        let mut logs_rx = self
            .chain
            .subscribe_confirmed_logs(self.log_filter())
            .await
            .context("failed to subscribe to confirmed logs")?;
        let mut reorg_rx = self
            .chain
            .subscribe_reorgs()
            .await
            .context("failed to subscribe to reorg notices")?;
        let mut shutdown_rx = self.shutdown.subscribe();

        let agent = self.clone();
        tokio::spawn(async move {
            info!("pool detector agent watching confirmed logs");
            loop {
                tokio::select! {
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                    maybe_log = logs_rx.recv() => {
                        match maybe_log {
                            Some(log) => agent.handle_log(log).await,
                            None => {
                                warn!("confirmed-log stream ended");
                                break;
                            }
                        }
                    }
                    maybe_reorg = reorg_rx.recv() => {
                        match maybe_reorg {
                            Some(notice) => agent.handle_reorg(notice).await,
                            None => {
                                warn!("reorg stream ended");
                                break;
                            }
                        }
                    }
                }
            }
            info!("pool detector agent stopped");
        });

        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        let _ = self.shutdown.send(true);
        Ok(())
    }
}

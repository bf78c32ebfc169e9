//! Mempool watcher agent
//!
//! Consumes the raw pending-transaction feed, decodes call targets and
//! 4-byte selectors, and publishes a lightweight `CandidateSeen` for calls
//! that add liquidity or create pools on a watched router/factory. The feed
//! is unordered, bursty and full of duplicates; the watcher keeps no state
//! beyond the transaction currently being decoded, and a decode failure is
//! a debug-level note, never an escalation.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::bus::MessageBus;
use crate::chain_adapters::{ChainClient, PendingTransaction};
use crate::config::MempoolConfig;
use crate::errors::SniperError;
use crate::metric;
use crate::types::{
    normalize_address, AgentId, CandidateKind, CandidateSeen, MessagePayload,
};

use super::Agent;

/// Known router/factory call selectors and their classification.
static CALL_SELECTORS: Lazy<HashMap<[u8; 4], (&'static str, CandidateKind)>> = Lazy::new(|| {
    HashMap::from([
        (
            [0xe8, 0xe3, 0x37, 0x00],
            ("addLiquidity", CandidateKind::LiquidityAdd),
        ),
        (
            [0xf3, 0x05, 0xd7, 0x19],
            ("addLiquidityETH", CandidateKind::LiquidityAdd),
        ),
        (
            [0xc9, 0xc6, 0x53, 0x96],
            ("createPair", CandidateKind::PoolCreate),
        ),
        (
            [0xa1, 0x67, 0x12, 0x95],
            ("createPool", CandidateKind::PoolCreate),
        ),
        (
            [0x7f, 0xf3, 0x6a, 0xb5],
            ("swapExactETHForTokens", CandidateKind::Swap),
        ),
        (
            [0x38, 0xed, 0x17, 0x39],
            ("swapExactTokensForTokens", CandidateKind::Swap),
        ),
        (
            [0xb6, 0xf9, 0xde, 0x95],
            (
                "swapExactETHForTokensSupportingFeeOnTransferTokens",
                CandidateKind::Swap,
            ),
        ),
    ])
});

/// Watches the pending-transaction feed for liquidity/pool-creation calls.
pub struct MempoolAgent {
    bus: Arc<MessageBus>,
    chain: Arc<dyn ChainClient>,
    watched_routers: HashSet<String>,
    shutdown: watch::Sender<bool>,
}

impl MempoolAgent {
    pub fn new(bus: Arc<MessageBus>, chain: Arc<dyn ChainClient>, config: &MempoolConfig) -> Self {
        let watched_routers = config
            .watched_routers
            .iter()
            .map(|a| normalize_address(a))
            .collect();
        let (shutdown, _) = watch::channel(false);
        Self {
            bus,
            chain,
            watched_routers,
            shutdown,
        }
    }

    async fn handle_pending(&self, tx: PendingTransaction) {
        match decode_pending(&tx, &self.watched_routers) {
            Ok(Some(candidate)) => {
                debug!(
                    tx_hash = %candidate.tx_hash,
                    target = %candidate.target,
                    kind = ?candidate.kind,
                    "relevant pending call seen"
                );
                metric::record_candidate_seen();
                self.bus
                    .broadcast(AgentId::Mempool, MessagePayload::CandidateSeen(candidate))
                    .await;
            }
            Ok(None) => {}
            Err(err) => {
                // Malformed input is expected noise on a public mempool feed.
                debug!(tx_hash = %tx.tx_hash, %err, "dropping undecodable pending transaction");
            }
        }
    }
}

/// Decode one pending transaction. `Ok(None)` means decodable but not
/// relevant; `Err` means malformed input.
fn decode_pending(
    tx: &PendingTransaction,
    watched_routers: &HashSet<String>,
) -> Result<Option<CandidateSeen>, SniperError> {
    let target = match &tx.to {
        Some(to) => normalize_address(to),
        // Contract creation; nothing to snipe here.
        None => return Ok(None),
    };

    if !watched_routers.is_empty() && !watched_routers.contains(&target) {
        return Ok(None);
    }

    if tx.input.len() < 4 {
        return Err(SniperError::Decode {
            context: format!("pending transaction {}", tx.tx_hash),
            reason: format!("calldata too short ({} bytes)", tx.input.len()),
        });
    }

    let selector: [u8; 4] = [tx.input[0], tx.input[1], tx.input[2], tx.input[3]];
    let (_, kind) = match CALL_SELECTORS.get(&selector) {
        Some(entry) => *entry,
        None => return Ok(None),
    };

    // Plain swaps are decoded for classification but only liquidity and
    // pool-creation calls are worth a candidate event.
    if kind == CandidateKind::Swap {
        return Ok(None);
    }

    Ok(Some(CandidateSeen {
        tx_hash: tx.tx_hash.clone(),
        target,
        kind,
        value: tx.value,
    }))
}

#[async_trait]
impl Agent for MempoolAgent {
    fn id(&self) -> AgentId {
        AgentId::Mempool
    }

    async fn start(self: Arc<Self>) -> Result<()> {
        let mut pending_rx = self
            .chain
            .subscribe_pending_transactions()
            .await
            .context("failed to subscribe to pending transactions")?;
        let mut shutdown_rx = self.shutdown.subscribe();

        let agent = self.clone();
        tokio::spawn(async move {
            info!("mempool agent watching pending transactions");
            loop {
                tokio::select! {
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                    maybe_tx = pending_rx.recv() => {
                        match maybe_tx {
                            Some(tx) => agent.handle_pending(tx).await,
                            None => {
                                warn!("pending-transaction stream ended");
                                break;
                            }
                        }
                    }
                }
            }
            info!("mempool agent stopped");
        });

        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        let _ = self.shutdown.send(true);
        Ok(())
    }
}

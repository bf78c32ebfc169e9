//! Coordinator agent
//!
//! Owns the process-wide run state, relays operator commands to the other
//! agents and aggregates statistics purely from observed bus traffic. It
//! keeps no private state anything else depends on, so restarting it cannot
//! desynchronize the rest of the system: the counters simply rebuild from
//! the traffic that follows.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::{watch, RwLock};
use tracing::{debug, info};

use crate::bus::MessageBus;
use crate::metric;
use crate::types::{
    AgentId, AgentMessage, MessagePayload, OperatorCommand, PositionStatus, RunState, RunStatus,
    Verdict,
};

use super::Agent;

/// Counters rebuilt from bus traffic.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BotStats {
    /// Relevant pending calls seen by the mempool watcher
    pub candidates_seen: u64,

    /// Pools detected in confirmed blocks
    pub pools_detected: u64,

    /// Detections retracted by reorg
    pub pools_reverted: u64,

    /// Safety reports with verdict Approve
    pub reports_approved: u64,

    /// Safety reports with verdict Reject
    pub reports_rejected: u64,

    /// Confirmed (or simulated) buys
    pub snipes_executed: u64,

    /// Buy attempts that produced no position
    pub snipes_failed: u64,

    /// Positions that exited cleanly
    pub positions_closed: u64,

    /// Positions whose exit retries were exhausted
    pub positions_failed: u64,

    /// Positions currently open
    pub open_positions: u64,

    /// Operator commands processed
    pub commands_processed: u64,
}

/// Observes all bus traffic and relays operator commands.
pub struct CoordinatorAgent {
    bus: Arc<MessageBus>,
    run_state: Arc<RunState>,
    stats: RwLock<BotStats>,
    stats_interval_secs: u64,
    shutdown: watch::Sender<bool>,
}

impl CoordinatorAgent {
    pub fn new(bus: Arc<MessageBus>, run_state: Arc<RunState>, stats_interval_secs: u64) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            bus,
            run_state,
            stats: RwLock::new(BotStats::default()),
            stats_interval_secs,
            shutdown,
        }
    }

    /// Current counter snapshot.
    pub async fn stats(&self) -> BotStats {
        self.stats.read().await.clone()
    }

    /// Current run status.
    pub fn status(&self) -> RunStatus {
        self.run_state.status()
    }

    async fn observe(&self, message: &AgentMessage) {
        {
            let mut stats = self.stats.write().await;
            match &message.payload {
                MessagePayload::CandidateSeen(_) => stats.candidates_seen += 1,
                MessagePayload::NewPoolDetected(_) => stats.pools_detected += 1,
                MessagePayload::PoolDetectionReverted(_) => stats.pools_reverted += 1,
                MessagePayload::SafetyReport(report) => match report.verdict {
                    Verdict::Approve => stats.reports_approved += 1,
                    Verdict::Reject => stats.reports_rejected += 1,
                },
                MessagePayload::SnipeExecuted(_) => {
                    stats.snipes_executed += 1;
                    stats.open_positions += 1;
                }
                MessagePayload::SnipeFailed(_) => stats.snipes_failed += 1,
                MessagePayload::PositionClosed(closed) => {
                    stats.open_positions = stats.open_positions.saturating_sub(1);
                    match closed.final_status {
                        PositionStatus::Failed => stats.positions_failed += 1,
                        _ => stats.positions_closed += 1,
                    }
                }
                MessagePayload::OperatorCommand(_) | MessagePayload::RunStateChanged(_) => {}
            }
        }

        // Only operator-originated commands are handled; our own relays come
        // back through the any-subscription and must not loop.
        if message.from == AgentId::Operator {
            if let MessagePayload::OperatorCommand(command) = &message.payload {
                self.handle_command(command.clone()).await;
            }
        }
    }

    async fn handle_command(&self, command: OperatorCommand) {
        self.stats.write().await.commands_processed += 1;
        match command {
            OperatorCommand::Pause => {
                info!("operator requested pause");
                self.run_state.set(RunStatus::Paused);
                self.bus
                    .broadcast(
                        AgentId::Coordinator,
                        MessagePayload::RunStateChanged(RunStatus::Paused),
                    )
                    .await;
            }
            OperatorCommand::Resume => {
                info!("operator requested resume");
                self.run_state.set(RunStatus::Running);
                self.bus
                    .broadcast(
                        AgentId::Coordinator,
                        MessagePayload::RunStateChanged(RunStatus::Running),
                    )
                    .await;
            }
            sell @ (OperatorCommand::Sell { .. } | OperatorCommand::SellAll) => {
                debug!(command = ?sell, "relaying exit command to sniper");
                self.bus
                    .send_to(
                        AgentId::Coordinator,
                        AgentId::Sniper,
                        MessagePayload::OperatorCommand(sell),
                    )
                    .await;
            }
        }
    }

    async fn log_stats(&self) {
        let stats = self.stats().await;
        metric::set_open_positions(stats.open_positions as f64);
        info!(
            status = ?self.run_state.status(),
            pools_detected = stats.pools_detected,
            reports_approved = stats.reports_approved,
            reports_rejected = stats.reports_rejected,
            snipes_executed = stats.snipes_executed,
            snipes_failed = stats.snipes_failed,
            open_positions = stats.open_positions,
            "coordinator stats"
        );
    }
}

#[async_trait]
impl Agent for CoordinatorAgent {
    fn id(&self) -> AgentId {
        AgentId::Coordinator
    }

    async fn start(self: Arc<Self>) -> Result<()> {
        let mut all_rx = self.bus.subscribe_all().await;
        let mut shutdown_rx = self.shutdown.subscribe();

        let agent = self.clone();
        tokio::spawn(async move {
            info!("coordinator observing bus traffic");
            loop {
                tokio::select! {
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                    maybe_msg = all_rx.recv() => {
                        match maybe_msg {
                            Some(message) => agent.observe(&message).await,
                            None => break,
                        }
                    }
                }
            }
            info!("coordinator stopped");
        });

        let reporter = self.clone();
        let mut reporter_shutdown = self.shutdown.subscribe();
        tokio::spawn(async move {
            let period = std::time::Duration::from_secs(reporter.stats_interval_secs.max(1));
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // skip the immediate first tick; an empty stats line helps nobody
            ticker.tick().await;
            loop {
                tokio::select! {
                    changed = reporter_shutdown.changed() => {
                        if changed.is_err() || *reporter_shutdown.borrow() {
                            break;
                        }
                    }
                    _ = ticker.tick() => reporter.log_stats().await,
                }
            }
        });

        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        let _ = self.shutdown.send(true);
        Ok(())
    }
}

//! Sniperbot library
//!
//! An automated multi-agent system that watches a chain for newly created
//! liquidity pools, screens them with on-chain safety heuristics and
//! executes bounded-slippage buys before the opportunity is gone. Five
//! agents (mempool watcher, pool detector, safety, sniper, coordinator)
//! cooperate over an in-process message bus; the chain and signing clients
//! are injected collaborators.

pub mod agents;
pub mod bus;
pub mod chain_adapters;
pub mod config;
pub mod errors;
pub mod metric;
pub mod pricing;
pub mod types;

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use crate::agents::coordinator::CoordinatorAgent;
use crate::agents::detector::PoolDetectorAgent;
use crate::agents::mempool::MempoolAgent;
use crate::agents::safety::SafetyAgent;
use crate::agents::sniper::SniperAgent;
use crate::agents::Agent;
use crate::bus::MessageBus;
use crate::chain_adapters::{ChainClient, TxSigner};
use crate::config::BotConfig;
use crate::types::RunState;

pub use crate::types::{
    AgentId, AgentMessage, MessageKind, MessagePayload, OperatorCommand, PoolCandidate, Position,
    PositionStatus, RiskLevel, RunStatus, SafetyReport, Verdict,
};

/// Application state wiring the bus and the agents together.
///
/// Everything is constructed here, in one place, and handed to the agents
/// explicitly: the bus, the run-state flag and the injected collaborators.
/// No agent reaches for ambient process-wide state.
pub struct AppState {
    /// Shared configuration
    pub config: Arc<BotConfig>,

    /// The inter-agent message bus
    pub bus: Arc<MessageBus>,

    /// Coordinator-owned run status flag
    pub run_state: Arc<RunState>,

    /// Coordinator handle, kept for stats access
    pub coordinator: Arc<CoordinatorAgent>,

    /// Sniper handle, kept for position inspection
    pub sniper: Arc<SniperAgent>,

    agents: Vec<Arc<dyn Agent>>,
}

impl AppState {
    /// Wire the bus and all five agents. Nothing is started yet.
    pub fn new(
        config: Arc<BotConfig>,
        chain: Arc<dyn ChainClient>,
        signer: Arc<dyn TxSigner>,
    ) -> Self {
        let bus = Arc::new(MessageBus::new(config.bus.history_capacity));
        let run_state = Arc::new(RunState::new());

        let mempool = Arc::new(MempoolAgent::new(bus.clone(), chain.clone(), &config.mempool));
        let detector = Arc::new(PoolDetectorAgent::new(
            bus.clone(),
            chain.clone(),
            config.detector.clone(),
        ));
        let safety = Arc::new(SafetyAgent::new(bus.clone(), chain.clone(), config.clone()));
        let sniper = Arc::new(SniperAgent::new(
            bus.clone(),
            chain.clone(),
            signer,
            config.clone(),
            run_state.clone(),
        ));
        let coordinator = Arc::new(CoordinatorAgent::new(
            bus.clone(),
            run_state.clone(),
            config.general.stats_interval_secs,
        ));

        let agents: Vec<Arc<dyn Agent>> = vec![
            coordinator.clone(),
            safety.clone(),
            sniper.clone(),
            detector.clone(),
            mempool.clone(),
        ];

        Self {
            config,
            bus,
            run_state,
            coordinator,
            sniper,
            agents,
        }
    }

    /// Start every agent. Consumers first, watchers last, so no early
    /// detection can race an unsubscribed consumer.
    pub async fn start(&self) -> Result<()> {
        info!(
            bot = %self.config.general.bot_name,
            simulation = self.config.trading.simulation_mode,
            "starting agents"
        );
        for agent in &self.agents {
            agent
                .clone()
                .start()
                .await
                .with_context(|| format!("failed to start {} agent", agent.id()))?;
            info!(agent = %agent.id(), "agent started");
        }
        Ok(())
    }

    /// Stop every agent, watchers first.
    pub async fn stop(&self) -> Result<()> {
        for agent in self.agents.iter().rev() {
            agent
                .stop()
                .await
                .with_context(|| format!("failed to stop {} agent", agent.id()))?;
        }
        info!("all agents stopped");
        Ok(())
    }
}

/// Initialize the tracing subscriber.
pub fn init_logging(log_level: &str) -> Result<()> {
    let level = match log_level.to_lowercase().as_str() {
        "trace" => tracing::Level::TRACE,
        "debug" => tracing::Level::DEBUG,
        "info" => tracing::Level::INFO,
        "warn" => tracing::Level::WARN,
        "error" => tracing::Level::ERROR,
        _ => tracing::Level::INFO,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set global default subscriber")?;

    info!("logging initialized at {} level", log_level);
    Ok(())
}

/// Version information.
pub mod version {
    /// Current version from Cargo.toml
    pub const VERSION: &str = env!("CARGO_PKG_VERSION");

    /// Get full version string
    pub fn full_version() -> String {
        format!("sniperbot v{}", VERSION)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain_adapters::{StubChainClient, StubSigner};

    #[tokio::test]
    async fn app_state_wires_starts_and_stops_cleanly() {
        let config = Arc::new(BotConfig::default());
        let app = AppState::new(
            config,
            Arc::new(StubChainClient::new()),
            Arc::new(StubSigner::new()),
        );

        app.start().await.unwrap();
        assert_eq!(app.run_state.status(), RunStatus::Running);
        assert_eq!(app.coordinator.stats().await.pools_detected, 0);
        app.stop().await.unwrap();
    }
}

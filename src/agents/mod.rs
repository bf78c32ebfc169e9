//! The cooperating agents
//!
//! Each agent runs as an independent task set; the message bus is their only
//! synchronization point. Agents never call into one another directly.

pub mod coordinator;
pub mod detector;
pub mod mempool;
pub mod safety;
pub mod sniper;

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

use crate::types::AgentId;

/// Lifecycle contract every agent implements.
///
/// `start` subscribes to the relevant bus topics and collaborator streams
/// and spawns the agent's loop task(s); it must return promptly. `stop`
/// signals the loops to wind down. Implementations are thread-safe and
/// suitable for async contexts.
#[async_trait]
pub trait Agent: Send + Sync + 'static {
    /// The agent's bus identity.
    fn id(&self) -> AgentId;

    /// Subscribe and spawn the agent's background loops.
    async fn start(self: Arc<Self>) -> Result<()>;

    /// Signal the agent's loops to stop. Idempotent.
    async fn stop(&self) -> Result<()>;
}

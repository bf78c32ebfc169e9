//! Core type definitions shared across the bot
//!
//! This module contains the data model every agent speaks: agent identities,
//! the bus message envelope with its closed payload union, pool candidates,
//! safety reports, positions and operator commands. Messages are immutable
//! once published; cross-agent visibility goes through these payloads only.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

use chrono::{DateTime, Utc};
use ethers::types::U256;
use serde::{Deserialize, Serialize};

/// Sentinel for the chain's native asset when a pool quotes against it.
pub const NATIVE_ASSET: &str = "0x0000000000000000000000000000000000000000";

/// Identities of the cooperating agents plus the external operator surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AgentId {
    /// Watches the pending-transaction feed
    Mempool,

    /// Watches confirmed logs for pool creation
    PoolDetector,

    /// Runs the safety check battery
    Safety,

    /// Sizes and executes buys/sells
    Sniper,

    /// Owns run state and aggregates statistics
    Coordinator,

    /// External control surface (CLI/dashboard), source of operator commands
    Operator,
}

impl AgentId {
    /// Stable name used in logs and metrics labels.
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentId::Mempool => "mempool",
            AgentId::PoolDetector => "pool_detector",
            AgentId::Safety => "safety",
            AgentId::Sniper => "sniper",
            AgentId::Coordinator => "coordinator",
            AgentId::Operator => "operator",
        }
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Delivery target of a bus message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Recipient {
    /// Point-to-point delivery to one agent's direct channel
    Agent(AgentId),

    /// Delivered to every current subscriber
    Broadcast,
}

/// Field-less discriminant of [`MessagePayload`], used for subscription
/// routing and history queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageKind {
    CandidateSeen,
    NewPoolDetected,
    PoolDetectionReverted,
    SafetyReport,
    SnipeExecuted,
    SnipeFailed,
    PositionClosed,
    OperatorCommand,
    RunStateChanged,
}

/// What a decoded pending transaction was trying to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CandidateKind {
    /// Liquidity added to a new or existing pool
    LiquidityAdd,

    /// Pool or pair creation call on a factory
    PoolCreate,

    /// Plain swap through a watched router
    Swap,
}

/// Lightweight note that a relevant pending transaction was seen.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateSeen {
    /// Pending transaction hash
    pub tx_hash: String,

    /// Router or factory the call targets
    pub target: String,

    /// Decoded call classification
    pub kind: CandidateKind,

    /// Native value attached to the call
    pub value: U256,
}

/// AMM protocol family a detected pool belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProtocolVersion {
    /// Constant-product pair (factory `PairCreated`)
    UniswapV2,

    /// Concentrated liquidity pool (factory `PoolCreated`)
    UniswapV3,

    /// Launchpad bonding curve, priced constant-product on virtual reserves
    BondingCurve,
}

/// A newly detected pool. Read-only after creation; a re-report of the same
/// address is a fresh snapshot, never an in-place mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolCandidate {
    /// Pool (or curve) contract address, lowercased
    pub pool_address: String,

    /// The newly launched token
    pub token_a: String,

    /// Quote-side token ([`NATIVE_ASSET`] for native pairs)
    pub token_b: String,

    /// Swap fee tier in basis points
    pub fee_tier_bps: u32,

    /// Protocol the pool was created on
    pub protocol_version: ProtocolVersion,

    /// Block whose logs confirmed the pool
    pub detected_at_block: u64,
}

/// Retraction of a previously published candidate after a reorg.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolRetraction {
    /// Address of the retracted pool
    pub pool_address: String,

    /// The confirming block that was invalidated
    pub invalidated_block: u64,
}

/// Safety verdict gating the sniper.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    Approve,
    Reject,
}

/// Outcome of the safety check battery for one candidate. Produced exactly
/// once per candidate and immutable afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafetyReport {
    /// The candidate this report covers, carried along for the sniper
    pub candidate: PoolCandidate,

    /// True if the sell simulation reverted or was blocked
    pub honeypot_suspected: bool,

    /// Estimated buy-side tax in basis points
    pub estimated_buy_tax_bps: u32,

    /// Estimated sell-side tax in basis points
    pub estimated_sell_tax_bps: u32,

    /// Owner renounced (or no owner authority present)
    pub ownership_renounced: bool,

    /// Blacklist-style selector found in the token bytecode
    pub blacklist_function_present: bool,

    /// Display-oriented liquidity estimate in USD
    pub liquidity_usd: f64,

    /// Weighted aggregate risk, 0 (clean) to 100 (worst)
    pub risk_score: u8,

    /// Final gate for the sniper; hard limits override the weighted score
    pub verdict: Verdict,

    /// Human-readable reasons behind the verdict
    pub reasons: Vec<String>,
}

impl SafetyReport {
    /// Risk bucket for the aggregate score.
    pub fn risk_level(&self) -> RiskLevel {
        RiskLevel::from_score(self.risk_score)
    }
}

/// Coarse risk bucket derived from a 0-100 score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskLevel {
    /// 0-25
    Low,
    /// 26-50
    Medium,
    /// 51-75
    High,
    /// 76-100
    Critical,
}

impl RiskLevel {
    /// Bucket a numeric score. Boundaries are inclusive on the upper edge.
    pub fn from_score(score: u8) -> Self {
        match score {
            0..=25 => RiskLevel::Low,
            26..=50 => RiskLevel::Medium,
            51..=75 => RiskLevel::High,
            _ => RiskLevel::Critical,
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RiskLevel::Low => "LOW",
            RiskLevel::Medium => "MEDIUM",
            RiskLevel::High => "HIGH",
            RiskLevel::Critical => "CRITICAL",
        };
        f.write_str(name)
    }
}

/// Published when a buy confirmed (or was simulated).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnipeExecuted {
    /// Id of the opened position
    pub position_id: String,

    /// Pool that was bought into
    pub pool_address: String,

    /// Transaction hash; synthetic when `simulated`
    pub tx_hash: String,

    /// Quote currency spent
    pub amount_in: U256,

    /// Tokens received (quoted output in simulation mode)
    pub tokens_out: U256,

    /// True when produced by dry-run mode without touching the signer
    pub simulated: bool,
}

/// Published when a buy attempt did not produce a position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnipeFailed {
    /// Pool the attempt targeted
    pub pool_address: String,

    /// Why the attempt failed
    pub reason: String,

    /// Submitted transaction hash, if the failure happened after submission
    pub tx_hash: Option<String>,
}

/// Published when a position leaves the Open state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionClosed {
    /// Id of the position
    pub position_id: String,

    /// Pool the position was in
    pub pool_address: String,

    /// Terminal status (Closed or Failed)
    pub final_status: PositionStatus,

    /// Exit price in quote currency per token, when the exit filled
    pub exit_price_quote: Option<f64>,
}

/// Operator commands relayed through the coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperatorCommand {
    /// Stop accepting new buys; in-flight exits continue
    Pause,

    /// Resume accepting new buys
    Resume,

    /// Exit the open position in one pool
    Sell { pool_address: String },

    /// Exit every open position
    SellAll,
}

/// Closed union of every message payload. One shape per variant, checked at
/// compile time; no stringly-typed topics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum MessagePayload {
    CandidateSeen(CandidateSeen),
    NewPoolDetected(PoolCandidate),
    PoolDetectionReverted(PoolRetraction),
    SafetyReport(SafetyReport),
    SnipeExecuted(SnipeExecuted),
    SnipeFailed(SnipeFailed),
    PositionClosed(PositionClosed),
    OperatorCommand(OperatorCommand),
    RunStateChanged(RunStatus),
}

impl MessagePayload {
    /// The routing discriminant for this payload.
    pub fn kind(&self) -> MessageKind {
        match self {
            MessagePayload::CandidateSeen(_) => MessageKind::CandidateSeen,
            MessagePayload::NewPoolDetected(_) => MessageKind::NewPoolDetected,
            MessagePayload::PoolDetectionReverted(_) => MessageKind::PoolDetectionReverted,
            MessagePayload::SafetyReport(_) => MessageKind::SafetyReport,
            MessagePayload::SnipeExecuted(_) => MessageKind::SnipeExecuted,
            MessagePayload::SnipeFailed(_) => MessageKind::SnipeFailed,
            MessagePayload::PositionClosed(_) => MessageKind::PositionClosed,
            MessagePayload::OperatorCommand(_) => MessageKind::OperatorCommand,
            MessagePayload::RunStateChanged(_) => MessageKind::RunStateChanged,
        }
    }
}

/// Immutable bus message. `id` and `timestamp` are assigned by the bus at
/// publish time, never by the sender; `id` is unique for the process lifetime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentMessage {
    /// Monotonic, process-unique message id
    pub id: u64,

    /// Publish time assigned by the bus
    pub timestamp: DateTime<Utc>,

    /// Publishing agent
    pub from: AgentId,

    /// Delivery target
    pub to: Recipient,

    /// Typed payload
    pub payload: MessagePayload,
}

impl AgentMessage {
    /// Routing discriminant of the payload.
    pub fn kind(&self) -> MessageKind {
        self.payload.kind()
    }
}

/// Lifecycle status of a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionStatus {
    /// Buy confirmed, tokens held
    Open,

    /// Exit filled
    Closed,

    /// Exit retries exhausted or submission deadline passed
    Failed,
}

/// Permanent record of one trade's lifecycle. Created when a buy confirms,
/// status-transitioned but never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    /// Unique position id
    pub id: String,

    /// Pool the position was opened in
    pub pool_address: String,

    /// Token held
    pub token_address: String,

    /// Entry price in quote currency per token (display)
    pub entry_price_quote: f64,

    /// Quote currency spent on entry
    pub amount_in_quote: U256,

    /// Tokens received on entry
    pub amount_out_token: U256,

    /// Swap fee tier of the pool, reused for exits
    pub fee_tier_bps: u32,

    /// Buy transaction hash (synthetic for simulated entries)
    pub tx_hash: String,

    /// When the buy confirmed
    pub opened_at: DateTime<Utc>,

    /// Current lifecycle status
    pub status: PositionStatus,

    /// Exit price in quote currency per token, once closed
    pub exit_price_quote: Option<f64>,

    /// When the position left the Open state
    pub closed_at: Option<DateTime<Utc>>,
}

impl Position {
    pub fn is_open(&self) -> bool {
        self.status == PositionStatus::Open
    }
}

/// Process-wide run status owned by the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    Running,
    Paused,
}

/// Atomically updated run-status flag. Constructed once in `AppState` and
/// injected into the coordinator (writer) and sniper (reader); the single
/// piece of shared state that is not a bus message.
#[derive(Debug)]
pub struct RunState {
    status: AtomicU8,
}

const RUN_STATUS_RUNNING: u8 = 0;
const RUN_STATUS_PAUSED: u8 = 1;

impl RunState {
    /// Starts Running at process start.
    pub fn new() -> Self {
        Self {
            status: AtomicU8::new(RUN_STATUS_RUNNING),
        }
    }

    pub fn status(&self) -> RunStatus {
        match self.status.load(Ordering::SeqCst) {
            RUN_STATUS_PAUSED => RunStatus::Paused,
            _ => RunStatus::Running,
        }
    }

    pub fn is_paused(&self) -> bool {
        self.status() == RunStatus::Paused
    }

    pub fn set(&self, status: RunStatus) {
        let raw = match status {
            RunStatus::Running => RUN_STATUS_RUNNING,
            RunStatus::Paused => RUN_STATUS_PAUSED,
        };
        self.status.store(raw, Ordering::SeqCst);
    }
}

impl Default for RunState {
    fn default() -> Self {
        Self::new()
    }
}

/// Lowercase an address so map keys and comparisons agree regardless of the
/// checksum casing a data source used.
pub fn normalize_address(address: &str) -> String {
    address.trim().to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn risk_level_boundaries_are_exact() {
        assert_eq!(RiskLevel::from_score(0), RiskLevel::Low);
        assert_eq!(RiskLevel::from_score(25), RiskLevel::Low);
        assert_eq!(RiskLevel::from_score(26), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_score(50), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_score(51), RiskLevel::High);
        assert_eq!(RiskLevel::from_score(75), RiskLevel::High);
        assert_eq!(RiskLevel::from_score(76), RiskLevel::Critical);
        assert_eq!(RiskLevel::from_score(100), RiskLevel::Critical);
    }

    #[test]
    fn payload_kind_matches_variant() {
        let payload = MessagePayload::OperatorCommand(OperatorCommand::Pause);
        assert_eq!(payload.kind(), MessageKind::OperatorCommand);

        let payload = MessagePayload::SnipeFailed(SnipeFailed {
            pool_address: "0xpool".to_string(),
            reason: "test".to_string(),
            tx_hash: None,
        });
        assert_eq!(payload.kind(), MessageKind::SnipeFailed);
    }

    #[test]
    fn run_state_transitions() {
        let state = RunState::new();
        assert_eq!(state.status(), RunStatus::Running);
        assert!(!state.is_paused());

        state.set(RunStatus::Paused);
        assert!(state.is_paused());

        state.set(RunStatus::Running);
        assert_eq!(state.status(), RunStatus::Running);
    }

    #[test]
    fn normalize_address_lowercases_and_trims() {
        assert_eq!(
            normalize_address(" 0xAbCdEF0123 "),
            "0xabcdef0123".to_string()
        );
    }
}

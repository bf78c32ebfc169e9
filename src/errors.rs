//! Error types shared across the bot
//!
//! The variants here mirror the failure modes that matter operationally:
//! malformed chain data, timed-out waits, safety checks that could not run,
//! rejected submissions and reorg retractions. Agents convert these into bus
//! messages where an external observer needs to see them; nothing is allowed
//! to fail silently.

use thiserror::Error;

/// Top-level error type for agent and bus operations.
#[derive(Debug, Error)]
pub enum SniperError {
    /// Malformed input (calldata, log payload, account bytes). Logged at
    /// debug level and dropped by the watcher agents, never fatal.
    #[error("failed to decode {context}: {reason}")]
    Decode { context: String, reason: String },

    /// A bounded wait (bus wait or chain confirmation deadline) expired.
    #[error("timed out after {waited_ms}ms waiting for {what}")]
    Timeout { what: String, waited_ms: u64 },

    /// A safety heuristic could not complete. Treated as fail-closed: the
    /// check contributes maximum risk and forces rejection.
    #[error("safety check '{check}' unavailable: {reason}")]
    CheckUnavailable { check: String, reason: String },

    /// The chain rejected a submitted transaction. `transient` marks revert
    /// reasons (stale slippage) that justify a single re-quote and retry.
    #[error("submission reverted: {reason}")]
    Reverted { reason: String, transient: bool },

    /// A previously confirmed pool was invalidated by a chain reorg.
    #[error("pool {pool_address} invalidated by reorg at block {block}")]
    ReorgInvalidation { pool_address: String, block: u64 },

    /// Pricing engine failure, propagated unchanged.
    #[error(transparent)]
    Pricing(#[from] PricingError),

    /// The message bus (or one of its channels) is gone.
    #[error("message bus closed")]
    BusClosed,
}

impl SniperError {
    /// True for revert reasons worth a single re-quote-and-retry.
    pub fn is_transient(&self) -> bool {
        matches!(self, SniperError::Reverted { transient: true, .. })
    }
}

/// Errors from the constant-product pricing engine.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PricingError {
    #[error("pool has empty reserves")]
    EmptyReserves,

    #[error("swap amount must be positive")]
    ZeroAmount,

    #[error("fee of {0} bps leaves no input after fees")]
    FeeTooHigh(u32),

    #[error("arithmetic overflow in curve math")]
    Overflow,
}

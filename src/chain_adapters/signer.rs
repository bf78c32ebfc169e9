//! Signing and submission collaborator
//!
//! The sniper hands this interface a fully specified swap order; the
//! collaborator signs it with the managed wallet and submits it. Key
//! material never enters this crate.

use anyhow::Result;
use async_trait::async_trait;
use ethers::types::U256;
#[cfg(test)]
use mockall::automock;
use serde::{Deserialize, Serialize};

use super::chain_client::SwapSide;

/// A fully specified swap ready to be signed and submitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwapOrder {
    /// Pool to trade against
    pub pool_address: String,

    /// Token bought or sold
    pub token_address: String,

    /// Trade direction
    pub side: SwapSide,

    /// Exact input amount
    pub amount_in: U256,

    /// Minimum acceptable output; the transaction must revert below this
    pub min_amount_out: U256,

    /// Priority fee to attach
    pub priority_fee: u64,
}

/// Terminal outcome of a submitted transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfirmationStatus {
    /// Landed successfully
    Confirmed {
        /// Output amount actually delivered
        executed_amount_out: U256,
    },

    /// Rejected on-chain
    Reverted {
        /// Revert reason as reported by the node
        reason: String,
    },

    /// No terminal state within the wait window
    TimedOut,
}

/// Signing/submission collaborator.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait TxSigner: Send + Sync + 'static {
    /// Sign and submit an order. `deadline_ms` bounds how long the
    /// transaction stays valid; after it, the chain must not execute it.
    /// Returns the transaction hash.
    async fn sign_and_submit(&self, order: &SwapOrder, deadline_ms: u64) -> Result<String>;

    /// Wait up to `timeout_ms` for a terminal state of `tx_hash`.
    async fn await_confirmation(
        &self,
        tx_hash: &str,
        timeout_ms: u64,
    ) -> Result<ConfirmationStatus>;
}

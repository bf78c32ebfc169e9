//! Chain data collaborator
//!
//! Read-side interface to the blockchain node: pending-transaction,
//! confirmed-log and reorg subscriptions plus the typed lookups the agents
//! need. Subscriptions hand back bounded channels; the collaborator owns the
//! underlying websocket/RPC plumbing.

use anyhow::Result;
use async_trait::async_trait;
use ethers::types::U256;
#[cfg(test)]
use mockall::automock;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::pricing::Reserves;

/// A raw pending transaction from the mempool feed. May arrive duplicated
/// and unordered; may never confirm.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingTransaction {
    /// Transaction hash
    pub tx_hash: String,

    /// Sender address
    pub from: String,

    /// Target contract; `None` for contract creation
    pub to: Option<String>,

    /// Native value attached
    pub value: U256,

    /// Raw calldata
    pub input: Vec<u8>,

    /// Gas price offered
    pub gas_price: u64,
}

/// A decoded log event from a confirmed block.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEvent {
    /// Emitting contract address
    pub address: String,

    /// Topic list; topic 0 is the event signature hash
    pub topics: Vec<String>,

    /// ABI-encoded event data
    pub data: Vec<u8>,

    /// Block the log was confirmed in
    pub block_number: u64,

    /// Transaction that emitted the log
    pub tx_hash: String,
}

/// Notice that a block range was invalidated by a reorg.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ReorgNotice {
    /// First invalidated block, inclusive
    pub from_block: u64,

    /// Last invalidated block, inclusive
    pub to_block: u64,
}

impl ReorgNotice {
    pub fn invalidates(&self, block: u64) -> bool {
        block >= self.from_block && block <= self.to_block
    }
}

/// Filter applied to the confirmed-log subscription. Empty lists match
/// everything.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogFilter {
    /// Contract addresses to include
    pub addresses: Vec<String>,

    /// Topic-0 signature hashes to include
    pub topics: Vec<String>,
}

/// On-chain authority flags for a token contract.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TokenOnchainStatus {
    /// Owner is the zero address or renounced
    pub ownership_renounced: bool,

    /// No authority can mint additional supply
    pub mint_authority_revoked: bool,

    /// No authority can freeze holder accounts
    pub freeze_authority_revoked: bool,

    /// LP tokens are locked or burned
    pub liquidity_locked: bool,
}

/// Direction of a simulated or submitted swap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SwapSide {
    Buy,
    Sell,
}

/// Read-side chain collaborator.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ChainClient: Send + Sync + 'static {
    /// Stream of raw pending transactions from the node's mempool feed.
    async fn subscribe_pending_transactions(&self)
        -> Result<mpsc::Receiver<PendingTransaction>>;

    /// Stream of decoded log events from confirmed blocks.
    async fn subscribe_confirmed_logs(&self, filter: LogFilter)
        -> Result<mpsc::Receiver<LogEvent>>;

    /// Stream of invalidated block ranges.
    async fn subscribe_reorgs(&self) -> Result<mpsc::Receiver<ReorgNotice>>;

    /// Raw account/contract bytes (token bytecode for the blacklist scan).
    async fn get_account_data(&self, address: &str) -> Result<Vec<u8>>;

    /// Current network prioritization fee estimate.
    async fn get_latest_prioritization_fee(&self) -> Result<u64>;

    /// Current reserves of one pool.
    async fn get_pool_reserves(&self, pool_address: &str) -> Result<Reserves>;

    /// Authority flags for one token contract.
    async fn get_token_status(&self, token_address: &str) -> Result<TokenOnchainStatus>;

    /// Simulate a swap against current chain state and return the output
    /// amount the chain would actually deliver (taxes included). An `Err`
    /// covers both RPC failure and simulation revert.
    async fn simulate_swap(
        &self,
        pool_address: &str,
        side: SwapSide,
        amount_in: U256,
    ) -> Result<U256>;
}

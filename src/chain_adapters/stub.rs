//! Inert collaborator stubs
//!
//! Used by the binary to wire a full agent topology without a live node,
//! e.g. for simulation-mode smoke runs. Subscriptions stay open but never
//! produce events; data lookups and submissions fail loudly so a
//! misconfigured live run cannot silently trade against a stub.

use anyhow::{bail, Result};
use async_trait::async_trait;
use ethers::types::U256;
use std::sync::Mutex;
use tokio::sync::mpsc;

use crate::pricing::Reserves;

use super::chain_client::{
    ChainClient, LogEvent, LogFilter, PendingTransaction, ReorgNotice, SwapSide,
    TokenOnchainStatus,
};
use super::signer::{ConfirmationStatus, SwapOrder, TxSigner};

/// Chain client whose subscriptions are open but permanently idle.
#[derive(Default)]
pub struct StubChainClient {
    // Senders are parked here so the returned receivers stay open.
    pending_tx: Mutex<Vec<mpsc::Sender<PendingTransaction>>>,
    logs: Mutex<Vec<mpsc::Sender<LogEvent>>>,
    reorgs: Mutex<Vec<mpsc::Sender<ReorgNotice>>>,
}

impl StubChainClient {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ChainClient for StubChainClient {
    async fn subscribe_pending_transactions(
        &self,
    ) -> Result<mpsc::Receiver<PendingTransaction>> {
        let (tx, rx) = mpsc::channel(16);
        self.pending_tx.lock().expect("stub lock poisoned").push(tx);
        Ok(rx)
    }

    async fn subscribe_confirmed_logs(
        &self,
        _filter: LogFilter,
    ) -> Result<mpsc::Receiver<LogEvent>> {
        let (tx, rx) = mpsc::channel(16);
        self.logs.lock().expect("stub lock poisoned").push(tx);
        Ok(rx)
    }

    async fn subscribe_reorgs(&self) -> Result<mpsc::Receiver<ReorgNotice>> {
        let (tx, rx) = mpsc::channel(16);
        self.reorgs.lock().expect("stub lock poisoned").push(tx);
        Ok(rx)
    }

    async fn get_account_data(&self, address: &str) -> Result<Vec<u8>> {
        bail!("stub chain client has no account data for {address}")
    }

    async fn get_latest_prioritization_fee(&self) -> Result<u64> {
        Ok(0)
    }

    async fn get_pool_reserves(&self, pool_address: &str) -> Result<Reserves> {
        bail!("stub chain client has no reserves for {pool_address}")
    }

    async fn get_token_status(&self, token_address: &str) -> Result<TokenOnchainStatus> {
        bail!("stub chain client has no token status for {token_address}")
    }

    async fn simulate_swap(
        &self,
        pool_address: &str,
        _side: SwapSide,
        _amount_in: U256,
    ) -> Result<U256> {
        bail!("stub chain client cannot simulate swaps against {pool_address}")
    }
}

/// Signer that refuses every submission.
#[derive(Debug, Default)]
pub struct StubSigner;

impl StubSigner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl TxSigner for StubSigner {
    async fn sign_and_submit(&self, order: &SwapOrder, _deadline_ms: u64) -> Result<String> {
        bail!(
            "stub signer cannot submit {:?} order for pool {}",
            order.side,
            order.pool_address
        )
    }

    async fn await_confirmation(
        &self,
        tx_hash: &str,
        _timeout_ms: u64,
    ) -> Result<ConfirmationStatus> {
        bail!("stub signer has no confirmation state for {tx_hash}")
    }
}

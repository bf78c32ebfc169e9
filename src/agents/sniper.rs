//! Sniper (execution) agent
//!
//! Consumes approved safety reports and turns them into bounded-slippage
//! buys: pause gate, atomic concurrency cap, liquidity re-check at execution
//! time, curve quote, minimum-output guard, then submission with a deadline.
//! A confirmed buy opens a `Position`; a revert or timeout publishes
//! `SnipeFailed` and opens nothing. A submission that times out is treated
//! as failed even if a confirmation lands later; the transaction hash is the
//! reconciliation key and never produces a second position.
//!
//! Exits run on operator command or when the auto take-profit multiple is
//! reached, with bounded retries before a position is marked Failed.
//! In-flight exits are allowed while the bot is paused.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::Utc;
use ethers::types::U256;
use rand::RngCore;
use tokio::sync::{watch, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::bus::MessageBus;
use crate::chain_adapters::{
    ChainClient, ConfirmationStatus, SwapOrder, SwapSide, TxSigner,
};
use crate::config::BotConfig;
use crate::metric;
use crate::pricing::{self, u256_to_f64};
use crate::types::{
    normalize_address, AgentId, MessageKind, MessagePayload, OperatorCommand, PoolCandidate,
    Position, PositionClosed, PositionStatus, RunState, SafetyReport, SnipeExecuted, SnipeFailed,
    Verdict,
};

use super::Agent;

/// Executes buys for approved pools and manages the resulting positions.
pub struct SniperAgent {
    bus: Arc<MessageBus>,
    chain: Arc<dyn ChainClient>,
    signer: Arc<dyn TxSigner>,
    config: Arc<BotConfig>,
    run_state: Arc<RunState>,
    /// The one shared counter: open/in-flight positions against the cap.
    open_count: AtomicUsize,
    /// Position id -> position. Entries are never removed, only
    /// status-transitioned.
    positions: RwLock<HashMap<String, Position>>,
    /// Transaction hash -> position id, the late-confirmation
    /// reconciliation index.
    hash_index: RwLock<HashMap<String, String>>,
    /// Hashes of submissions already treated as failed.
    failed_hashes: RwLock<HashSet<String>>,
    /// Pools retracted by reorg; pending work for them is abandoned.
    revoked: Mutex<HashSet<String>>,
    shutdown: watch::Sender<bool>,
}

impl SniperAgent {
    pub fn new(
        bus: Arc<MessageBus>,
        chain: Arc<dyn ChainClient>,
        signer: Arc<dyn TxSigner>,
        config: Arc<BotConfig>,
        run_state: Arc<RunState>,
    ) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            bus,
            chain,
            signer,
            config,
            run_state,
            open_count: AtomicUsize::new(0),
            positions: RwLock::new(HashMap::new()),
            hash_index: RwLock::new(HashMap::new()),
            failed_hashes: RwLock::new(HashSet::new()),
            revoked: Mutex::new(HashSet::new()),
            shutdown,
        }
    }

    /// Snapshot of every position ever opened.
    pub async fn positions_snapshot(&self) -> Vec<Position> {
        self.positions.read().await.values().cloned().collect()
    }

    /// Number of currently open (or in-flight) positions.
    pub fn open_position_count(&self) -> usize {
        self.open_count.load(Ordering::SeqCst)
    }

    /// Gate an approved report: pause state, retraction, concurrency cap.
    /// On success the cap slot is already acquired.
    fn gate_report(&self, report: &SafetyReport) -> bool {
        let pool = normalize_address(&report.candidate.pool_address);

        if self.run_state.is_paused() {
            debug!(pool = %pool, "paused, rejecting new buy attempt");
            return false;
        }

        if self
            .revoked
            .lock()
            .expect("revoked lock poisoned")
            .contains(&pool)
        {
            debug!(pool = %pool, "pool was retracted, skipping");
            return false;
        }

        // Compare-and-swap loop: two concurrent attempts can never both
        // pass the cap check and overshoot it.
        let cap = self.config.trading.max_concurrent_positions;
        let acquired = self
            .open_count
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                if current < cap {
                    Some(current + 1)
                } else {
                    None
                }
            })
            .is_ok();
        if !acquired {
            warn!(pool = %pool, cap, "concurrent position cap reached, skipping candidate");
        }
        acquired
    }

    fn release_slot(&self) {
        let _ = self
            .open_count
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                current.checked_sub(1)
            });
        metric::set_open_positions(self.open_position_count() as f64);
    }

    /// Publish `SnipeFailed` and give the cap slot back.
    async fn abort_snipe(&self, pool_address: &str, reason: String, tx_hash: Option<String>) {
        warn!(pool = %pool_address, %reason, "snipe failed");
        self.release_slot();
        metric::record_snipe_failed();
        self.bus
            .broadcast(
                AgentId::Sniper,
                MessagePayload::SnipeFailed(SnipeFailed {
                    pool_address: pool_address.to_string(),
                    reason,
                    tx_hash,
                }),
            )
            .await;
    }

    /// Steps 1-5 of the buy path. The cap slot is held on entry and released
    /// on every failure path; a confirmed buy keeps it until the position
    /// closes.
    async fn execute_buy(self: Arc<Self>, report: SafetyReport) {
        let candidate = report.candidate.clone();
        let pool = normalize_address(&candidate.pool_address);
        let trading = self.config.trading.clone();

        // Liquidity may have moved since detection; re-check the floor.
        let reserves = match self.chain.get_pool_reserves(&candidate.pool_address).await {
            Ok(reserves) => reserves,
            Err(err) => {
                self.abort_snipe(&pool, format!("liquidity re-check unavailable: {err}"), None)
                    .await;
                return;
            }
        };
        let liquidity = pricing::depth_usd(
            &reserves,
            self.config.safety.base_decimals,
            self.config.safety.base_usd_price,
        );
        if liquidity < trading.min_liquidity_usd {
            self.abort_snipe(
                &pool,
                format!(
                    "liquidity ${liquidity:.0} below floor ${:.0} at execution time",
                    trading.min_liquidity_usd
                ),
                None,
            )
            .await;
            return;
        }

        let amount_in = U256::from(trading.max_position_size);
        let quote = match pricing::buy_quote(&reserves, amount_in, candidate.fee_tier_bps) {
            Ok(quote) => quote,
            Err(err) => {
                self.abort_snipe(&pool, format!("buy quote failed: {err}"), None).await;
                return;
            }
        };
        let min_amount_out = pricing::min_amount_out(quote.amount_out, trading.slippage_bps);
        debug!(
            pool = %pool,
            amount_in = %amount_in,
            quoted_out = %quote.amount_out,
            min_out = %min_amount_out,
            impact_pct = quote.price_impact_pct,
            "buy sized"
        );

        // Dry-run contract: quote and report with a synthetic hash, never
        // touch the signer.
        if trading.simulation_mode {
            let hash = synthetic_hash();
            self.open_position(&candidate, amount_in, quote.amount_out, &hash, true)
                .await;
            return;
        }

        let priority_fee = match self.chain.get_latest_prioritization_fee().await {
            Ok(estimate) => estimate.max(trading.priority_fee),
            Err(_) => trading.priority_fee,
        };
        let order = SwapOrder {
            pool_address: candidate.pool_address.clone(),
            token_address: candidate.token_a.clone(),
            side: SwapSide::Buy,
            amount_in,
            min_amount_out,
            priority_fee,
        };
        self.submit_buy(candidate, order).await;
    }

    /// Submit and track a live buy, with a single re-quote-and-retry for
    /// transient (stale slippage) reverts.
    async fn submit_buy(self: Arc<Self>, candidate: PoolCandidate, mut order: SwapOrder) {
        let trading = self.config.trading.clone();
        let pool = normalize_address(&candidate.pool_address);
        let mut attempts = 0u32;

        loop {
            attempts += 1;
            let tx_hash = match self
                .signer
                .sign_and_submit(&order, trading.submission_deadline_ms)
                .await
            {
                Ok(hash) => hash,
                Err(err) => {
                    self.abort_snipe(&pool, format!("submission failed: {err}"), None).await;
                    return;
                }
            };

            match self
                .signer
                .await_confirmation(&tx_hash, trading.confirmation_timeout_ms)
                .await
            {
                Ok(ConfirmationStatus::Confirmed { executed_amount_out }) => {
                    self.open_position(&candidate, order.amount_in, executed_amount_out, &tx_hash, false)
                        .await;
                    return;
                }
                Ok(ConfirmationStatus::Reverted { reason }) => {
                    if attempts == 1 && is_transient_revert(&reason) {
                        if let Ok(fresh) = self.chain.get_pool_reserves(&candidate.pool_address).await
                        {
                            if let Ok(quote) =
                                pricing::buy_quote(&fresh, order.amount_in, candidate.fee_tier_bps)
                            {
                                order.min_amount_out =
                                    pricing::min_amount_out(quote.amount_out, trading.slippage_bps);
                                warn!(pool = %pool, %reason, "transient revert, re-quoting once");
                                continue;
                            }
                        }
                    }
                    self.abort_snipe(&pool, format!("submission reverted: {reason}"), Some(tx_hash))
                        .await;
                    return;
                }
                Ok(ConfirmationStatus::TimedOut) => {
                    self.handle_submission_timeout(&pool, tx_hash, "confirmation deadline exceeded")
                        .await;
                    return;
                }
                Err(err) => {
                    self.handle_submission_timeout(&pool, tx_hash, &format!("confirmation wait failed: {err}"))
                        .await;
                    return;
                }
            }
        }
    }

    /// Record the hash as failed, surface the failure, and watch for a late
    /// confirmation so it cannot mint a duplicate position.
    async fn handle_submission_timeout(self: Arc<Self>, pool: &str, tx_hash: String, detail: &str) {
        self.failed_hashes.write().await.insert(tx_hash.clone());
        self.abort_snipe(pool, detail.to_string(), Some(tx_hash.clone())).await;

        let agent = self;
        tokio::spawn(async move {
            let grace = agent.config.trading.confirmation_timeout_ms;
            if let Ok(ConfirmationStatus::Confirmed { .. }) =
                agent.signer.await_confirmation(&tx_hash, grace).await
            {
                // Already treated as failed; the recorded hash blocks a
                // second position for the same submission.
                if agent.failed_hashes.read().await.contains(&tx_hash) {
                    warn!(
                        tx_hash = %tx_hash,
                        "late confirmation for abandoned submission, position not created"
                    );
                }
            }
        });
    }

    /// Create and announce a position for a confirmed (or simulated) buy.
    async fn open_position(
        &self,
        candidate: &PoolCandidate,
        amount_in: U256,
        tokens_out: U256,
        tx_hash: &str,
        simulated: bool,
    ) {
        if self.hash_index.read().await.contains_key(tx_hash) {
            warn!(tx_hash = %tx_hash, "confirmation for already-tracked hash, ignoring");
            return;
        }

        let entry_price = amount_price(amount_in, tokens_out);
        let position = Position {
            id: Uuid::new_v4().to_string(),
            pool_address: normalize_address(&candidate.pool_address),
            token_address: candidate.token_a.clone(),
            entry_price_quote: entry_price,
            amount_in_quote: amount_in,
            amount_out_token: tokens_out,
            fee_tier_bps: candidate.fee_tier_bps,
            tx_hash: tx_hash.to_string(),
            opened_at: Utc::now(),
            status: PositionStatus::Open,
            exit_price_quote: None,
            closed_at: None,
        };

        self.hash_index
            .write()
            .await
            .insert(tx_hash.to_string(), position.id.clone());
        self.positions
            .write()
            .await
            .insert(position.id.clone(), position.clone());

        info!(
            position = %position.id,
            pool = %position.pool_address,
            amount_in = %amount_in,
            tokens_out = %tokens_out,
            simulated,
            "snipe executed"
        );
        metric::record_snipe_executed(simulated);
        metric::set_open_positions(self.open_position_count() as f64);
        self.bus
            .broadcast(
                AgentId::Sniper,
                MessagePayload::SnipeExecuted(SnipeExecuted {
                    position_id: position.id.clone(),
                    pool_address: position.pool_address.clone(),
                    tx_hash: tx_hash.to_string(),
                    amount_in,
                    tokens_out,
                    simulated,
                }),
            )
            .await;
    }

    /// Relayed operator commands. Pause/resume are the coordinator's
    /// business; only exits land here.
    async fn handle_command(self: Arc<Self>, command: OperatorCommand) {
        match command {
            OperatorCommand::Sell { pool_address } => {
                let pool = normalize_address(&pool_address);
                let targets = self.open_position_ids(Some(&pool)).await;
                if targets.is_empty() {
                    warn!(pool = %pool, "sell command for pool with no open position");
                }
                for id in targets {
                    tokio::spawn(self.clone().exit_position(id, "operator sell"));
                }
            }
            OperatorCommand::SellAll => {
                for id in self.open_position_ids(None).await {
                    tokio::spawn(self.clone().exit_position(id, "operator sell-all"));
                }
            }
            other => debug!(command = ?other, "ignoring non-exit command"),
        }
    }

    async fn open_position_ids(&self, pool: Option<&str>) -> Vec<String> {
        self.positions
            .read()
            .await
            .values()
            .filter(|p| p.is_open())
            .filter(|p| pool.map_or(true, |addr| p.pool_address == addr))
            .map(|p| p.id.clone())
            .collect()
    }

    /// Exit one position with bounded retries; exhausting them marks the
    /// position Failed. Runs regardless of pause state.
    async fn exit_position(self: Arc<Self>, position_id: String, trigger: &'static str) {
        let Some(position) = self.positions.read().await.get(&position_id).cloned() else {
            return;
        };
        if !position.is_open() {
            return;
        }
        info!(position = %position_id, trigger, "exiting position");

        let max_retries = self.config.trading.max_exit_retries;
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.try_exit_once(&position).await {
                Ok(exit_price) => {
                    self.finish_position(&position_id, PositionStatus::Closed, Some(exit_price))
                        .await;
                    return;
                }
                Err(err) => {
                    warn!(position = %position_id, attempt, %err, "exit attempt failed");
                    if attempt > max_retries {
                        self.finish_position(&position_id, PositionStatus::Failed, None).await;
                        return;
                    }
                    tokio::time::sleep(Duration::from_millis(500)).await;
                }
            }
        }
    }

    /// One sell attempt. Returns the realized exit price per token.
    async fn try_exit_once(&self, position: &Position) -> Result<f64> {
        let trading = &self.config.trading;
        let reserves = self.chain.get_pool_reserves(&position.pool_address).await?;
        let quote = pricing::sell_quote(&reserves, position.amount_out_token, position.fee_tier_bps)?;
        let min_amount_out = pricing::min_amount_out(quote.amount_out, trading.slippage_bps);

        if trading.simulation_mode {
            return Ok(amount_price(quote.amount_out, position.amount_out_token));
        }

        let priority_fee = match self.chain.get_latest_prioritization_fee().await {
            Ok(estimate) => estimate.max(trading.priority_fee),
            Err(_) => trading.priority_fee,
        };
        let order = SwapOrder {
            pool_address: position.pool_address.clone(),
            token_address: position.token_address.clone(),
            side: SwapSide::Sell,
            amount_in: position.amount_out_token,
            min_amount_out,
            priority_fee,
        };
        let tx_hash = self
            .signer
            .sign_and_submit(&order, trading.submission_deadline_ms)
            .await?;
        match self
            .signer
            .await_confirmation(&tx_hash, trading.confirmation_timeout_ms)
            .await?
        {
            ConfirmationStatus::Confirmed { executed_amount_out } => {
                Ok(amount_price(executed_amount_out, position.amount_out_token))
            }
            ConfirmationStatus::Reverted { reason } => bail!("exit reverted: {reason}"),
            ConfirmationStatus::TimedOut => bail!("exit confirmation timed out"),
        }
    }

    /// Transition a position out of Open and announce it.
    async fn finish_position(
        &self,
        position_id: &str,
        status: PositionStatus,
        exit_price: Option<f64>,
    ) {
        let pool_address = {
            let mut positions = self.positions.write().await;
            let Some(position) = positions.get_mut(position_id) else {
                return;
            };
            position.status = status;
            position.exit_price_quote = exit_price;
            position.closed_at = Some(Utc::now());
            position.pool_address.clone()
        };

        self.release_slot();
        info!(position = %position_id, ?status, ?exit_price, "position finished");
        self.bus
            .broadcast(
                AgentId::Sniper,
                MessagePayload::PositionClosed(PositionClosed {
                    position_id: position_id.to_string(),
                    pool_address,
                    final_status: status,
                    exit_price_quote: exit_price,
                }),
            )
            .await;
    }

    /// Auto-exit sweep: close any open position whose spot price reached the
    /// configured take-profit multiple.
    async fn check_auto_exits(self: Arc<Self>) {
        let multiple = self.config.trading.auto_take_profit_multiple;
        if multiple <= 1.0 {
            return;
        }
        let open: Vec<Position> = self
            .positions
            .read()
            .await
            .values()
            .filter(|p| p.is_open())
            .cloned()
            .collect();

        for position in open {
            let Ok(reserves) = self.chain.get_pool_reserves(&position.pool_address).await else {
                continue;
            };
            let spot = pricing::spot_price(&reserves);
            if position.entry_price_quote > 0.0 && spot >= position.entry_price_quote * multiple {
                info!(
                    position = %position.id,
                    entry = position.entry_price_quote,
                    spot,
                    "take-profit target reached"
                );
                tokio::spawn(self.clone().exit_position(position.id.clone(), "auto take-profit"));
            }
        }
    }

    fn handle_retraction(&self, pool_address: &str) {
        self.revoked
            .lock()
            .expect("revoked lock poisoned")
            .insert(normalize_address(pool_address));
    }
}

/// Entry/exit price in quote currency per token. Display only.
fn amount_price(quote_amount: U256, token_amount: U256) -> f64 {
    let tokens = u256_to_f64(token_amount);
    if tokens == 0.0 {
        return 0.0;
    }
    u256_to_f64(quote_amount) / tokens
}

/// Revert reasons that justify one re-quote-and-retry.
fn is_transient_revert(reason: &str) -> bool {
    let reason = reason.to_ascii_lowercase();
    reason.contains("slippage")
        || reason.contains("insufficient_output")
        || reason.contains("insufficient output")
        || reason.contains("stale")
}

/// Dry-run stand-in for a transaction hash.
fn synthetic_hash() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    let mut out = String::with_capacity(66);
    out.push_str("0x");
    for byte in bytes {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

#[async_trait]
impl Agent for SniperAgent {
    fn id(&self) -> AgentId {
        AgentId::Sniper
    }

    async fn start(self: Arc<Self>) -> Result<()> {
        let mut report_rx = self.bus.subscribe_kind(MessageKind::SafetyReport).await;
        let mut retraction_rx = self
            .bus
            .subscribe_kind(MessageKind::PoolDetectionReverted)
            .await;
        let mut direct_rx = self.bus.register_agent(AgentId::Sniper).await;
        let mut shutdown_rx = self.shutdown.subscribe();

        let agent = self.clone();
        tokio::spawn(async move {
            info!("sniper agent waiting for approved pools");
            loop {
                tokio::select! {
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                    maybe_msg = report_rx.recv() => {
                        match maybe_msg {
                            Some(msg) => {
                                if let MessagePayload::SafetyReport(report) = &msg.payload {
                                    if report.verdict == Verdict::Approve && agent.gate_report(report) {
                                        tokio::spawn(agent.clone().execute_buy(report.clone()));
                                    }
                                }
                            }
                            None => break,
                        }
                    }
                    maybe_msg = direct_rx.recv() => {
                        if let Some(msg) = maybe_msg {
                            if let MessagePayload::OperatorCommand(command) = &msg.payload {
                                agent.clone().handle_command(command.clone()).await;
                            }
                        }
                    }
                    maybe_msg = retraction_rx.recv() => {
                        if let Some(msg) = maybe_msg {
                            if let MessagePayload::PoolDetectionReverted(retraction) = &msg.payload {
                                agent.handle_retraction(&retraction.pool_address);
                            }
                        }
                    }
                }
            }
            info!("sniper agent stopped");
        });

        let monitor = self.clone();
        let mut monitor_shutdown = self.shutdown.subscribe();
        tokio::spawn(async move {
            let period = Duration::from_secs(monitor.config.trading.exit_check_interval_secs.max(1));
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    changed = monitor_shutdown.changed() => {
                        if changed.is_err() || *monitor_shutdown.borrow() {
                            break;
                        }
                    }
                    _ = ticker.tick() => {
                        monitor.clone().check_auto_exits().await;
                    }
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain_adapters::chain_client::MockChainClient;
    use crate::chain_adapters::signer::MockTxSigner;
    use crate::pricing::Reserves;
    use crate::types::{ProtocolVersion, RunStatus};
    use mockall::Sequence;

    fn approved_report(pool: &str) -> SafetyReport {
        SafetyReport {
            candidate: PoolCandidate {
                pool_address: pool.to_string(),
                token_a: "0xt0ken".to_string(),
                token_b: crate::types::NATIVE_ASSET.to_string(),
                fee_tier_bps: 30,
                protocol_version: ProtocolVersion::UniswapV2,
                detected_at_block: 5,
            },
            honeypot_suspected: false,
            estimated_buy_tax_bps: 0,
            estimated_sell_tax_bps: 0,
            ownership_renounced: true,
            blacklist_function_present: false,
            liquidity_usd: 30_000.0,
            risk_score: 10,
            verdict: Verdict::Approve,
            reasons: vec![],
        }
    }

    fn healthy_reserves() -> Reserves {
        Reserves::new(
            U256::from(100_000_000_000u64),
            U256::from(1_073_000_000_000_000u64),
        )
    }

    fn chain_with_reserves() -> MockChainClient {
        let mut chain = MockChainClient::new();
        chain
            .expect_get_pool_reserves()
            .returning(|_| Ok(healthy_reserves()));
        chain
            .expect_get_latest_prioritization_fee()
            .returning(|| Ok(50_000));
        chain
    }

    fn sim_config() -> BotConfig {
        let mut config = BotConfig::default();
        config.trading.simulation_mode = true;
        // keep the auto-exit sweep quiet during tests
        config.trading.auto_take_profit_multiple = 0.0;
        config
    }

    async fn started_agent(
        config: BotConfig,
        chain: MockChainClient,
        signer: MockTxSigner,
        run_state: Arc<RunState>,
    ) -> (Arc<MessageBus>, Arc<SniperAgent>) {
        let bus = Arc::new(MessageBus::default());
        let agent = Arc::new(SniperAgent::new(
            bus.clone(),
            Arc::new(chain),
            Arc::new(signer),
            Arc::new(config),
            run_state,
        ));
        agent.clone().start().await.unwrap();
        (bus, agent)
    }

    #[test_log::test(tokio::test)]
    async fn paused_state_blocks_buys_until_resumed() {
        let run_state = Arc::new(RunState::new());
        run_state.set(RunStatus::Paused);
        let (bus, agent) = started_agent(
            sim_config(),
            chain_with_reserves(),
            MockTxSigner::new(),
            run_state.clone(),
        )
        .await;

        let mut executed_rx = bus.subscribe_kind(MessageKind::SnipeExecuted).await;
        bus.broadcast(
            AgentId::Safety,
            MessagePayload::SafetyReport(approved_report("0xpaused")),
        )
        .await;
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(executed_rx.try_recv().is_err(), "paused bot must not buy");
        assert_eq!(agent.open_position_count(), 0);

        // approvals arriving after resume go through
        run_state.set(RunStatus::Running);
        bus.broadcast(
            AgentId::Safety,
            MessagePayload::SafetyReport(approved_report("0xresumed")),
        )
        .await;
        let executed = tokio::time::timeout(Duration::from_millis(1_000), executed_rx.recv())
            .await
            .expect("buy should run after resume")
            .unwrap();
        assert!(matches!(
            &executed.payload,
            MessagePayload::SnipeExecuted(e) if e.simulated && e.pool_address == "0xresumed"
        ));
        assert_eq!(agent.open_position_count(), 1);

        agent.stop().await.unwrap();
    }

    #[tokio::test]
    async fn concurrency_cap_is_never_overshot() {
        let mut config = sim_config();
        config.trading.max_concurrent_positions = 1;
        let (bus, agent) = started_agent(
            config,
            chain_with_reserves(),
            MockTxSigner::new(),
            Arc::new(RunState::new()),
        )
        .await;

        let mut executed_rx = bus.subscribe_kind(MessageKind::SnipeExecuted).await;
        bus.broadcast(
            AgentId::Safety,
            MessagePayload::SafetyReport(approved_report("0xfirst")),
        )
        .await;
        bus.broadcast(
            AgentId::Safety,
            MessagePayload::SafetyReport(approved_report("0xsecond")),
        )
        .await;

        let first = tokio::time::timeout(Duration::from_millis(1_000), executed_rx.recv())
            .await
            .expect("first snipe")
            .unwrap();
        assert!(matches!(
            &first.payload,
            MessagePayload::SnipeExecuted(e) if e.pool_address == "0xfirst"
        ));

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(executed_rx.try_recv().is_err(), "cap of 1 allows one position");
        assert_eq!(agent.open_position_count(), 1);

        agent.stop().await.unwrap();
    }

    #[tokio::test]
    async fn liquidity_floor_recheck_fails_visibly() {
        let mut chain = MockChainClient::new();
        // a rug between detection and execution: reserves nearly drained
        chain
            .expect_get_pool_reserves()
            .returning(|_| Ok(Reserves::new(U256::from(1_000u64), U256::from(1_000_000u64))));

        let (bus, agent) = started_agent(
            sim_config(),
            chain,
            MockTxSigner::new(),
            Arc::new(RunState::new()),
        )
        .await;

        let mut failed_rx = bus.subscribe_kind(MessageKind::SnipeFailed).await;
        bus.broadcast(
            AgentId::Safety,
            MessagePayload::SafetyReport(approved_report("0xrugged")),
        )
        .await;

        let failed = tokio::time::timeout(Duration::from_millis(1_000), failed_rx.recv())
            .await
            .expect("failure must be published")
            .unwrap();
        assert!(matches!(
            &failed.payload,
            MessagePayload::SnipeFailed(f) if f.reason.contains("below floor")
        ));
        assert_eq!(agent.open_position_count(), 0);

        agent.stop().await.unwrap();
    }

    #[tokio::test]
    async fn live_buy_confirmation_opens_a_position() {
        let mut config = sim_config();
        config.trading.simulation_mode = false;

        let mut signer = MockTxSigner::new();
        signer
            .expect_sign_and_submit()
            .times(1)
            .returning(|_, _| Ok("0xhash1".to_string()));
        signer
            .expect_await_confirmation()
            .times(1)
            .returning(|_, _| {
                Ok(ConfirmationStatus::Confirmed {
                    executed_amount_out: U256::from(500_000_000u64),
                })
            });

        let (bus, agent) = started_agent(
            config,
            chain_with_reserves(),
            signer,
            Arc::new(RunState::new()),
        )
        .await;

        let mut executed_rx = bus.subscribe_kind(MessageKind::SnipeExecuted).await;
        bus.broadcast(
            AgentId::Safety,
            MessagePayload::SafetyReport(approved_report("0xlive")),
        )
        .await;

        let executed = tokio::time::timeout(Duration::from_millis(1_000), executed_rx.recv())
            .await
            .expect("confirmed buy")
            .unwrap();
        assert!(matches!(
            &executed.payload,
            MessagePayload::SnipeExecuted(e)
                if e.tx_hash == "0xhash1" && !e.simulated
        ));

        let positions = agent.positions_snapshot().await;
        assert_eq!(positions.len(), 1);
        assert_eq!(positions[0].status, PositionStatus::Open);
        assert_eq!(positions[0].amount_out_token, U256::from(500_000_000u64));

        agent.stop().await.unwrap();
    }

    #[tokio::test]
    async fn transient_revert_is_retried_exactly_once() {
        let mut config = sim_config();
        config.trading.simulation_mode = false;

        let mut signer = MockTxSigner::new();
        let mut seq = Sequence::new();
        signer
            .expect_sign_and_submit()
            .times(2)
            .returning(|_, _| Ok("0xhash2".to_string()));
        signer
            .expect_await_confirmation()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| {
                Ok(ConfirmationStatus::Reverted {
                    reason: "stale slippage bound".to_string(),
                })
            });
        signer
            .expect_await_confirmation()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| {
                Ok(ConfirmationStatus::Confirmed {
                    executed_amount_out: U256::from(400_000_000u64),
                })
            });

        let (bus, agent) = started_agent(
            config,
            chain_with_reserves(),
            signer,
            Arc::new(RunState::new()),
        )
        .await;

        let mut executed_rx = bus.subscribe_kind(MessageKind::SnipeExecuted).await;
        bus.broadcast(
            AgentId::Safety,
            MessagePayload::SafetyReport(approved_report("0xretry")),
        )
        .await;

        let executed = tokio::time::timeout(Duration::from_millis(2_000), executed_rx.recv())
            .await
            .expect("retried buy should confirm")
            .unwrap();
        assert!(matches!(
            &executed.payload,
            MessagePayload::SnipeExecuted(e) if !e.simulated
        ));

        agent.stop().await.unwrap();
    }

    #[tokio::test]
    async fn timed_out_submission_fails_and_late_confirmation_is_reconciled() {
        let mut config = sim_config();
        config.trading.simulation_mode = false;

        let mut signer = MockTxSigner::new();
        let mut seq = Sequence::new();
        signer
            .expect_sign_and_submit()
            .times(1)
            .returning(|_, _| Ok("0xhash3".to_string()));
        signer
            .expect_await_confirmation()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(ConfirmationStatus::TimedOut));
        // the grace re-check sees the transaction land late
        signer
            .expect_await_confirmation()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| {
                Ok(ConfirmationStatus::Confirmed {
                    executed_amount_out: U256::from(400_000_000u64),
                })
            });

        let (bus, agent) = started_agent(
            config,
            chain_with_reserves(),
            signer,
            Arc::new(RunState::new()),
        )
        .await;

        let mut failed_rx = bus.subscribe_kind(MessageKind::SnipeFailed).await;
        let mut executed_rx = bus.subscribe_kind(MessageKind::SnipeExecuted).await;
        bus.broadcast(
            AgentId::Safety,
            MessagePayload::SafetyReport(approved_report("0xlate")),
        )
        .await;

        let failed = tokio::time::timeout(Duration::from_millis(1_000), failed_rx.recv())
            .await
            .expect("timeout is a failure")
            .unwrap();
        assert!(matches!(
            &failed.payload,
            MessagePayload::SnipeFailed(f) if f.tx_hash.as_deref() == Some("0xhash3")
        ));

        // the late confirmation must not mint a position
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(executed_rx.try_recv().is_err());
        assert!(agent.positions_snapshot().await.is_empty());
        assert_eq!(agent.open_position_count(), 0);

        agent.stop().await.unwrap();
    }

    #[tokio::test]
    async fn sell_all_closes_open_positions_with_exit_price() {
        let (bus, agent) = started_agent(
            sim_config(),
            chain_with_reserves(),
            MockTxSigner::new(),
            Arc::new(RunState::new()),
        )
        .await;

        let mut executed_rx = bus.subscribe_kind(MessageKind::SnipeExecuted).await;
        let mut closed_rx = bus.subscribe_kind(MessageKind::PositionClosed).await;

        bus.broadcast(
            AgentId::Safety,
            MessagePayload::SafetyReport(approved_report("0xexit")),
        )
        .await;
        tokio::time::timeout(Duration::from_millis(1_000), executed_rx.recv())
            .await
            .expect("position opens")
            .unwrap();

        bus.send_to(
            AgentId::Coordinator,
            AgentId::Sniper,
            MessagePayload::OperatorCommand(OperatorCommand::SellAll),
        )
        .await;

        let closed = tokio::time::timeout(Duration::from_millis(2_000), closed_rx.recv())
            .await
            .expect("position closes")
            .unwrap();
        match &closed.payload {
            MessagePayload::PositionClosed(c) => {
                assert_eq!(c.final_status, PositionStatus::Closed);
                assert!(c.exit_price_quote.unwrap() > 0.0);
            }
            other => panic!("unexpected payload {other:?}"),
        }
        assert_eq!(agent.open_position_count(), 0);
        let positions = agent.positions_snapshot().await;
        assert_eq!(positions.len(), 1);
        assert_eq!(positions[0].status, PositionStatus::Closed);

        agent.stop().await.unwrap();
    }

    #[test]
    fn transient_revert_reasons_are_recognized() {
        assert!(is_transient_revert("UniswapV2Router: INSUFFICIENT_OUTPUT_AMOUNT"));
        assert!(is_transient_revert("stale slippage bound"));
        assert!(!is_transient_revert("TRANSFER_FROM_FAILED"));
    }

    #[test]
    fn synthetic_hashes_look_like_transaction_hashes() {
        let hash = synthetic_hash();
        assert!(hash.starts_with("0x"));
        assert_eq!(hash.len(), 66);
        assert_ne!(hash, synthetic_hash());
    }
}

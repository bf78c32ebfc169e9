//! Safety agent
//!
//! Consumes `NewPoolDetected` and runs an ordered battery of on-chain
//! heuristics: liquidity depth, ownership renouncement, mint/freeze
//! authority, a simulated buy-then-sell (honeypot and tax estimation against
//! the pricing engine's expected output), a blacklist bytecode scan and a
//! liquidity-lock check. Each check yields a weighted sub-score; hard limits
//! override the aggregate, and a check that cannot run is dominant: it
//! contributes maximum risk and forces rejection on its own.
//!
//! Exactly one `SafetyReport` is published per candidate address. Work in
//! flight for a pool retracted by `PoolDetectionReverted` is abandoned.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use ethers::types::U256;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::bus::MessageBus;
use crate::chain_adapters::{ChainClient, SwapSide, TokenOnchainStatus};
use crate::config::{BotConfig, SafetyConfig};
use crate::metric;
use crate::pricing::{self, Reserves, BPS_DENOMINATOR};
use crate::types::{
    normalize_address, AgentId, MessageKind, MessagePayload, PoolCandidate, SafetyReport, Verdict,
};

use super::Agent;

/// 4-byte selectors of blocklisting entry points commonly compiled into
/// trap tokens. Bytecode containing any of them gets flagged.
const BLACKLIST_SELECTORS: &[([u8; 4], &str)] = &[
    ([0xf9, 0xf9, 0x2b, 0xe4], "blacklist(address)"),
    ([0x1d, 0x0a, 0x80, 0xa9], "setBlacklist(address,bool)"),
    ([0x47, 0x8b, 0x64, 0xed], "addBotToBlacklist(address)"),
    ([0x8c, 0x0b, 0x5e, 0x22], "setBots(address[])"),
];

/// One completed (or failed-closed) safety check.
#[derive(Debug, Clone)]
struct CheckResult {
    name: &'static str,
    weight: u32,
    /// 0 (clean) to 100 (worst)
    score: u8,
    /// Set when a configured hard limit is violated or the check could not
    /// run; any violation rejects regardless of the weighted score.
    hard_violation: Option<String>,
    /// Informational finding worth surfacing in the report
    note: Option<String>,
}

impl CheckResult {
    fn clean(name: &'static str, weight: u32, score: u8) -> Self {
        Self {
            name,
            weight,
            score,
            hard_violation: None,
            note: None,
        }
    }

    fn noted(name: &'static str, weight: u32, score: u8, note: String) -> Self {
        Self {
            name,
            weight,
            score,
            hard_violation: None,
            note: Some(note),
        }
    }

    fn violated(name: &'static str, weight: u32, score: u8, violation: String) -> Self {
        Self {
            name,
            weight,
            score,
            hard_violation: Some(violation),
            note: None,
        }
    }

    /// Fail closed: the check could not run, so it carries maximum risk and
    /// is dominant over every passing check.
    fn unavailable(name: &'static str, weight: u32, reason: &dyn std::fmt::Display) -> Self {
        Self {
            name,
            weight,
            score: 100,
            hard_violation: Some(format!("check '{name}' unavailable: {reason}")),
            note: None,
        }
    }
}

/// Raw findings accumulated while the battery runs.
#[derive(Debug, Default)]
struct BatteryOutcome {
    checks: Vec<CheckResult>,
    honeypot_suspected: bool,
    buy_tax_bps: u32,
    sell_tax_bps: u32,
    ownership_renounced: bool,
    blacklist_present: bool,
    liquidity_usd: f64,
}

/// Runs the safety battery over detected pools.
pub struct SafetyAgent {
    bus: Arc<MessageBus>,
    chain: Arc<dyn ChainClient>,
    config: Arc<BotConfig>,
    /// Addresses a report was already produced for (exactly-once guard)
    seen: Mutex<HashSet<String>>,
    /// Addresses retracted by reorg while work may be in flight
    revoked: Mutex<HashSet<String>>,
    shutdown: watch::Sender<bool>,
}

impl SafetyAgent {
    pub fn new(bus: Arc<MessageBus>, chain: Arc<dyn ChainClient>, config: Arc<BotConfig>) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            bus,
            chain,
            config,
            seen: Mutex::new(HashSet::new()),
            revoked: Mutex::new(HashSet::new()),
            shutdown,
        }
    }

    async fn handle_candidate(self: Arc<Self>, candidate: PoolCandidate) {
        let address = normalize_address(&candidate.pool_address);

        // A fresh snapshot supersedes any earlier retraction of the address.
        self.revoked
            .lock()
            .expect("revoked lock poisoned")
            .remove(&address);

        {
            let mut seen = self.seen.lock().expect("seen lock poisoned");
            if !seen.insert(address.clone()) {
                debug!(pool = %address, "candidate already evaluated, skipping");
                return;
            }
        }

        // The battery does chain lookups; run it off the bus loop so a slow
        // candidate cannot delay the next one.
        let agent = self.clone();
        tokio::spawn(async move {
            let report = agent.evaluate(&candidate).await;

            if agent
                .revoked
                .lock()
                .expect("revoked lock poisoned")
                .contains(&address)
            {
                // Retracted mid-evaluation; allow a later re-detection to be
                // evaluated from scratch.
                warn!(pool = %address, "pool retracted during evaluation, dropping report");
                agent.seen.lock().expect("seen lock poisoned").remove(&address);
                return;
            }

            info!(
                pool = %address,
                verdict = ?report.verdict,
                risk_score = report.risk_score,
                risk_level = %report.risk_level(),
                "safety report ready"
            );
            metric::record_safety_report(report.verdict == Verdict::Approve);
            agent
                .bus
                .broadcast(AgentId::Safety, MessagePayload::SafetyReport(report))
                .await;
        });
    }

    fn handle_retraction(&self, pool_address: &str) {
        let address = normalize_address(pool_address);
        self.revoked
            .lock()
            .expect("revoked lock poisoned")
            .insert(address);
    }

    /// Run the full battery for one candidate.
    async fn evaluate(&self, candidate: &PoolCandidate) -> SafetyReport {
        let safety = &self.config.safety;
        let trading = &self.config.trading;
        let mut outcome = BatteryOutcome::default();

        // Liquidity and the swap simulation both need the reserve snapshot.
        match self.chain.get_pool_reserves(&candidate.pool_address).await {
            Ok(reserves) => {
                outcome.liquidity_usd = liquidity_usd(&reserves, safety);
                outcome.checks.push(liquidity_check(
                    outcome.liquidity_usd,
                    trading.min_liquidity_usd,
                    safety.weight_liquidity,
                ));
                self.honeypot_check(candidate, &reserves, &mut outcome).await;
            }
            Err(err) => {
                outcome.checks.push(CheckResult::unavailable(
                    "liquidity",
                    safety.weight_liquidity,
                    &err,
                ));
                outcome.checks.push(CheckResult::unavailable(
                    "honeypot",
                    safety.weight_honeypot,
                    &err,
                ));
            }
        }

        match self.chain.get_token_status(&candidate.token_a).await {
            Ok(status) => authority_checks(&status, safety, &mut outcome),
            Err(err) => {
                outcome.checks.push(CheckResult::unavailable(
                    "ownership",
                    safety.weight_ownership,
                    &err,
                ));
                outcome.checks.push(CheckResult::unavailable(
                    "authority",
                    safety.weight_authority,
                    &err,
                ));
                outcome.checks.push(CheckResult::unavailable(
                    "liquidity_lock",
                    safety.weight_liquidity_lock,
                    &err,
                ));
            }
        }

        match self.chain.get_account_data(&candidate.token_a).await {
            Ok(bytecode) => {
                let check = blacklist_check(
                    &bytecode,
                    safety.weight_blacklist,
                    &mut outcome.blacklist_present,
                );
                outcome.checks.push(check);
            }
            Err(err) => {
                outcome.checks.push(CheckResult::unavailable(
                    "blacklist",
                    safety.weight_blacklist,
                    &err,
                ));
            }
        }

        conclude(candidate, outcome, safety)
    }

    /// Simulated buy-then-sell: compare the chain's delivered amounts with
    /// the pricing engine's expected output to estimate taxes; a blocked
    /// sell marks the token a honeypot.
    async fn honeypot_check(
        &self,
        candidate: &PoolCandidate,
        reserves: &Reserves,
        outcome: &mut BatteryOutcome,
    ) {
        let safety = &self.config.safety;
        let trading = &self.config.trading;
        let weight = safety.weight_honeypot;
        let probe = U256::from(safety.probe_amount);

        let expected_buy = match pricing::buy_quote(reserves, probe, candidate.fee_tier_bps) {
            Ok(quote) => quote,
            Err(err) => {
                outcome
                    .checks
                    .push(CheckResult::unavailable("honeypot", weight, &err));
                return;
            }
        };

        let simulated_buy = match self
            .chain
            .simulate_swap(&candidate.pool_address, SwapSide::Buy, probe)
            .await
        {
            Ok(amount) => amount,
            Err(err) => {
                outcome
                    .checks
                    .push(CheckResult::unavailable("honeypot", weight, &err));
                return;
            }
        };

        outcome.buy_tax_bps = tax_bps(expected_buy.amount_out, simulated_buy);

        if simulated_buy.is_zero() {
            outcome.honeypot_suspected = true;
            outcome.sell_tax_bps = BPS_DENOMINATOR;
            outcome.checks.push(CheckResult::violated(
                "honeypot",
                weight,
                100,
                "buy simulation delivered zero tokens".to_string(),
            ));
            return;
        }

        // Sell the simulated proceeds back against the post-buy reserves.
        let expected_sell =
            pricing::sell_quote(&expected_buy.new_reserves, simulated_buy, candidate.fee_tier_bps);
        match self
            .chain
            .simulate_swap(&candidate.pool_address, SwapSide::Sell, simulated_buy)
            .await
        {
            Ok(simulated_sell) => {
                let expected_out = expected_sell.map(|q| q.amount_out).unwrap_or_default();
                outcome.sell_tax_bps = tax_bps(expected_out, simulated_sell);
            }
            Err(err) => {
                // A sell that cannot even be simulated is the honeypot
                // signature; fail closed.
                debug!(pool = %candidate.pool_address, %err, "sell simulation failed");
                outcome.honeypot_suspected = true;
                outcome.sell_tax_bps = BPS_DENOMINATOR;
            }
        }

        let mut violations = Vec::new();
        if outcome.honeypot_suspected {
            violations.push("sell simulation blocked, honeypot suspected".to_string());
        }
        if outcome.buy_tax_bps > trading.max_buy_tax_bps {
            violations.push(format!(
                "estimated buy tax {} bps exceeds limit {} bps",
                outcome.buy_tax_bps, trading.max_buy_tax_bps
            ));
        }
        if outcome.sell_tax_bps > trading.max_sell_tax_bps {
            violations.push(format!(
                "estimated sell tax {} bps exceeds limit {} bps",
                outcome.sell_tax_bps, trading.max_sell_tax_bps
            ));
        }

        let worst_tax = outcome.buy_tax_bps.max(outcome.sell_tax_bps);
        let score = if outcome.honeypot_suspected {
            100
        } else {
            ((worst_tax / 50).min(100)) as u8
        };

        match violations.into_iter().reduce(|a, b| format!("{a}; {b}")) {
            Some(violation) => outcome
                .checks
                .push(CheckResult::violated("honeypot", weight, score, violation)),
            None => outcome.checks.push(CheckResult::clean("honeypot", weight, score)),
        }
    }
}

fn liquidity_usd(reserves: &Reserves, safety: &SafetyConfig) -> f64 {
    pricing::depth_usd(reserves, safety.base_decimals, safety.base_usd_price)
}

fn liquidity_check(liquidity_usd: f64, min_liquidity_usd: f64, weight: u32) -> CheckResult {
    if liquidity_usd < min_liquidity_usd {
        return CheckResult::violated(
            "liquidity",
            weight,
            95,
            format!("liquidity ${liquidity_usd:.0} below floor ${min_liquidity_usd:.0}"),
        );
    }
    if liquidity_usd < min_liquidity_usd * 2.0 {
        return CheckResult::noted(
            "liquidity",
            weight,
            40,
            format!("liquidity ${liquidity_usd:.0} is thin"),
        );
    }
    CheckResult::clean("liquidity", weight, 10)
}

fn authority_checks(
    status: &TokenOnchainStatus,
    safety: &SafetyConfig,
    outcome: &mut BatteryOutcome,
) {
    outcome.ownership_renounced = status.ownership_renounced;
    if status.ownership_renounced {
        outcome
            .checks
            .push(CheckResult::clean("ownership", safety.weight_ownership, 5));
    } else {
        outcome.checks.push(CheckResult::noted(
            "ownership",
            safety.weight_ownership,
            70,
            "ownership not renounced".to_string(),
        ));
    }

    let authority_score = match (
        status.mint_authority_revoked,
        status.freeze_authority_revoked,
    ) {
        (true, true) => 5,
        (true, false) | (false, true) => 50,
        (false, false) => 80,
    };
    if authority_score > 5 {
        outcome.checks.push(CheckResult::noted(
            "authority",
            safety.weight_authority,
            authority_score,
            "mint or freeze authority still active".to_string(),
        ));
    } else {
        outcome.checks.push(CheckResult::clean(
            "authority",
            safety.weight_authority,
            authority_score,
        ));
    }

    if status.liquidity_locked {
        outcome.checks.push(CheckResult::clean(
            "liquidity_lock",
            safety.weight_liquidity_lock,
            0,
        ));
    } else {
        outcome.checks.push(CheckResult::noted(
            "liquidity_lock",
            safety.weight_liquidity_lock,
            45,
            "liquidity is not locked".to_string(),
        ));
    }
}

fn blacklist_check(bytecode: &[u8], weight: u32, present: &mut bool) -> CheckResult {
    for (selector, signature) in BLACKLIST_SELECTORS {
        if bytecode.windows(4).any(|window| window == selector) {
            *present = true;
            return CheckResult::noted(
                "blacklist",
                weight,
                80,
                format!("bytecode exposes {signature}"),
            );
        }
    }
    CheckResult::clean("blacklist", weight, 0)
}

/// Difference between the expected and delivered output, in basis points.
fn tax_bps(expected: U256, actual: U256) -> u32 {
    if expected.is_zero() || actual >= expected {
        return 0;
    }
    ((expected - actual) * U256::from(BPS_DENOMINATOR) / expected).low_u64() as u32
}

/// Fold the battery into the final report. Hard limits and unavailable
/// checks override the weighted aggregate in either direction.
fn conclude(candidate: &PoolCandidate, outcome: BatteryOutcome, safety: &SafetyConfig) -> SafetyReport {
    let total_weight: u64 = outcome.checks.iter().map(|c| c.weight as u64).sum();
    let weighted: u64 = outcome
        .checks
        .iter()
        .map(|c| c.weight as u64 * c.score as u64)
        .sum();
    let risk_score = if total_weight == 0 {
        100
    } else {
        (weighted / total_weight).min(100) as u8
    };

    let mut reasons: Vec<String> = Vec::new();
    let mut rejected = false;
    for check in &outcome.checks {
        if let Some(violation) = &check.hard_violation {
            rejected = true;
            reasons.push(violation.clone());
        }
        if let Some(note) = &check.note {
            reasons.push(note.clone());
        }
    }

    if !rejected && risk_score > safety.risk_threshold {
        rejected = true;
        reasons.push(format!(
            "risk score {} exceeds threshold {}",
            risk_score, safety.risk_threshold
        ));
    }

    SafetyReport {
        candidate: candidate.clone(),
        honeypot_suspected: outcome.honeypot_suspected,
        estimated_buy_tax_bps: outcome.buy_tax_bps,
        estimated_sell_tax_bps: outcome.sell_tax_bps,
        ownership_renounced: outcome.ownership_renounced,
        blacklist_function_present: outcome.blacklist_present,
        liquidity_usd: outcome.liquidity_usd,
        risk_score,
        verdict: if rejected { Verdict::Reject } else { Verdict::Approve },
        reasons,
    }
}

#[async_trait]
impl Agent for SafetyAgent {
    fn id(&self) -> AgentId {
        AgentId::Safety
    }

    async fn start(self: Arc<Self>) -> Result<()> {
        let mut candidate_rx = self.bus.subscribe_kind(MessageKind::NewPoolDetected).await;
        let mut retraction_rx = self
            .bus
            .subscribe_kind(MessageKind::PoolDetectionReverted)
            .await;
        let mut shutdown_rx = self.shutdown.subscribe();

        let agent = self.clone();
        tokio::spawn(async move {
            info!("safety agent waiting for pool candidates");
            loop {
                tokio::select! {
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                    maybe_msg = candidate_rx.recv() => {
                        match maybe_msg {
                            Some(msg) => {
                                if let MessagePayload::NewPoolDetected(candidate) = &msg.payload {
                                    agent.clone().handle_candidate(candidate.clone()).await;
                                }
                            }
                            None => break,
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
            info!("safety agent stopped");
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
    use crate::types::ProtocolVersion;
    use std::time::Duration;

    fn candidate() -> PoolCandidate {
        PoolCandidate {
            pool_address: "0xp00l".to_string(),
            token_a: "0xt0ken".to_string(),
            token_b: crate::types::NATIVE_ASSET.to_string(),
            fee_tier_bps: 30,
            protocol_version: ProtocolVersion::UniswapV2,
            detected_at_block: 10,
        }
    }

    fn outcome_with(checks: Vec<CheckResult>) -> BatteryOutcome {
        BatteryOutcome {
            checks,
            ..BatteryOutcome::default()
        }
    }

    #[test]
    fn hard_limit_overrides_low_aggregate_score() {
        // Every check is clean except the sell-tax hard limit; the weighted
        // score alone would approve comfortably.
        let mut outcome = outcome_with(vec![
            CheckResult::clean("liquidity", 20, 5),
            CheckResult::clean("ownership", 15, 5),
            CheckResult::clean("authority", 15, 5),
            CheckResult::violated(
                "honeypot",
                30,
                10,
                "estimated sell tax 5000 bps exceeds limit 1000 bps".to_string(),
            ),
            CheckResult::clean("blacklist", 10, 0),
            CheckResult::clean("liquidity_lock", 10, 0),
        ]);
        outcome.sell_tax_bps = 5_000;

        let report = conclude(&candidate(), outcome, &SafetyConfig::default());
        assert!(report.risk_score <= SafetyConfig::default().risk_threshold);
        assert_eq!(report.verdict, Verdict::Reject);
        assert!(report
            .reasons
            .iter()
            .any(|r| r.contains("sell tax 5000 bps")));
    }

    #[test]
    fn unavailable_check_is_dominant() {
        let outcome = outcome_with(vec![
            CheckResult::clean("liquidity", 20, 0),
            CheckResult::clean("ownership", 15, 0),
            CheckResult::clean("authority", 15, 0),
            CheckResult::unavailable("honeypot", 30, &"rpc error"),
            CheckResult::clean("blacklist", 10, 0),
            CheckResult::clean("liquidity_lock", 10, 0),
        ]);

        let report = conclude(&candidate(), outcome, &SafetyConfig::default());
        assert_eq!(report.verdict, Verdict::Reject);
        assert!(report.reasons.iter().any(|r| r.contains("unavailable")));
    }

    #[test]
    fn weighted_score_above_threshold_rejects_and_below_approves() {
        let risky = outcome_with(vec![
            CheckResult::clean("liquidity", 50, 80),
            CheckResult::clean("honeypot", 50, 60),
        ]);
        let report = conclude(&candidate(), risky, &SafetyConfig::default());
        assert_eq!(report.risk_score, 70);
        assert_eq!(report.verdict, Verdict::Reject);

        let calm = outcome_with(vec![
            CheckResult::clean("liquidity", 50, 10),
            CheckResult::clean("honeypot", 50, 20),
        ]);
        let report = conclude(&candidate(), calm, &SafetyConfig::default());
        assert_eq!(report.risk_score, 15);
        assert_eq!(report.verdict, Verdict::Approve);
    }

    #[test]
    fn tax_bps_measures_shortfall() {
        assert_eq!(tax_bps(U256::from(1000u64), U256::from(1000u64)), 0);
        assert_eq!(tax_bps(U256::from(1000u64), U256::from(900u64)), 1000);
        assert_eq!(tax_bps(U256::from(1000u64), U256::from(500u64)), 5000);
        assert_eq!(tax_bps(U256::zero(), U256::zero()), 0);
    }

    #[test]
    fn blacklist_scan_finds_selector_in_bytecode() {
        let mut present = false;
        let mut bytecode = vec![0x60, 0x80, 0x60, 0x40];
        bytecode.extend_from_slice(&[0x63, 0xf9, 0xf9, 0x2b, 0xe4]); // PUSH4 blacklist(address)
        let check = blacklist_check(&bytecode, 10, &mut present);
        assert!(present);
        assert_eq!(check.score, 80);

        let mut clean_present = false;
        let check = blacklist_check(&[0x60, 0x80, 0x60, 0x40], 10, &mut clean_present);
        assert!(!clean_present);
        assert_eq!(check.score, 0);
    }

    fn healthy_reserves() -> Reserves {
        Reserves::new(
            U256::from(100_000_000_000u64),
            U256::from(1_073_000_000_000_000u64),
        )
    }

    fn healthy_mock() -> MockChainClient {
        let mut chain = MockChainClient::new();
        chain
            .expect_get_pool_reserves()
            .returning(|_| Ok(healthy_reserves()));
        chain.expect_get_token_status().returning(|_| {
            Ok(TokenOnchainStatus {
                ownership_renounced: true,
                mint_authority_revoked: true,
                freeze_authority_revoked: true,
                liquidity_locked: true,
            })
        });
        chain
            .expect_get_account_data()
            .returning(|_| Ok(vec![0x60, 0x80, 0x60, 0x40]));
        chain
            .expect_simulate_swap()
            .returning(|_, side, amount| match side {
                // Deliver exactly what the curve predicts: zero tax.
                SwapSide::Buy => {
                    Ok(pricing::buy_quote(&healthy_reserves(), amount, 30)?.amount_out)
                }
                SwapSide::Sell => {
                    let probe = U256::from(SafetyConfig::default().probe_amount);
                    let buy = pricing::buy_quote(&healthy_reserves(), probe, 30)?;
                    Ok(pricing::sell_quote(&buy.new_reserves, amount, 30)?.amount_out)
                }
            });
        chain
    }

    #[tokio::test]
    async fn duplicate_candidates_yield_exactly_one_report() {
        let bus = Arc::new(MessageBus::default());
        let agent = Arc::new(SafetyAgent::new(
            bus.clone(),
            Arc::new(healthy_mock()),
            Arc::new(BotConfig::default()),
        ));
        agent.clone().start().await.unwrap();

        let mut report_rx = bus.subscribe_kind(MessageKind::SafetyReport).await;

        let payload = MessagePayload::NewPoolDetected(candidate());
        bus.broadcast(AgentId::PoolDetector, payload.clone()).await;
        bus.broadcast(AgentId::PoolDetector, payload).await;

        let first = tokio::time::timeout(Duration::from_millis(1_000), report_rx.recv())
            .await
            .expect("one report should be produced")
            .unwrap();
        let report = match &first.payload {
            MessagePayload::SafetyReport(report) => report.clone(),
            other => panic!("unexpected payload {other:?}"),
        };
        assert_eq!(report.verdict, Verdict::Approve);
        assert_eq!(report.estimated_buy_tax_bps, 0);
        assert!(!report.honeypot_suspected);

        // The duplicate must not produce a second report.
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(report_rx.try_recv().is_err());

        agent.stop().await.unwrap();
    }

    #[tokio::test]
    async fn failing_reserve_lookup_rejects_fail_closed() {
        let mut chain = MockChainClient::new();
        chain
            .expect_get_pool_reserves()
            .returning(|_| Err(anyhow::anyhow!("rpc unavailable")));
        chain.expect_get_token_status().returning(|_| {
            Ok(TokenOnchainStatus {
                ownership_renounced: true,
                mint_authority_revoked: true,
                freeze_authority_revoked: true,
                liquidity_locked: true,
            })
        });
        chain
            .expect_get_account_data()
            .returning(|_| Ok(vec![0x60, 0x80]));

        let bus = Arc::new(MessageBus::default());
        let agent = Arc::new(SafetyAgent::new(
            bus.clone(),
            Arc::new(chain),
            Arc::new(BotConfig::default()),
        ));
        agent.clone().start().await.unwrap();

        let mut report_rx = bus.subscribe_kind(MessageKind::SafetyReport).await;
        bus.broadcast(
            AgentId::PoolDetector,
            MessagePayload::NewPoolDetected(candidate()),
        )
        .await;

        let message = tokio::time::timeout(Duration::from_millis(1_000), report_rx.recv())
            .await
            .expect("report should be produced")
            .unwrap();
        let report = match &message.payload {
            MessagePayload::SafetyReport(report) => report.clone(),
            other => panic!("unexpected payload {other:?}"),
        };
        assert_eq!(report.verdict, Verdict::Reject);
        assert!(report.reasons.iter().any(|r| r.contains("unavailable")));

        agent.stop().await.unwrap();
    }
}

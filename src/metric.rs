//! Metrics collection
//!
//! Thin counters and gauges over the bot's main events. The recorder is
//! installed once at startup when metrics are enabled; without it every
//! macro call is a no-op, so the helpers are safe to call unconditionally.

use anyhow::{Context, Result};
use metrics::{counter, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;
use tracing::info;

static PROMETHEUS_HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

/// Install the metrics recorder. Idempotent; later calls are ignored.
pub fn init_metrics(enabled: bool) -> Result<()> {
    if !enabled {
        info!("metrics collection disabled");
        return Ok(());
    }
    if PROMETHEUS_HANDLE.get().is_some() {
        return Ok(());
    }
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .context("failed to install metrics recorder")?;
    let _ = PROMETHEUS_HANDLE.set(handle);
    info!("metrics recorder installed");
    Ok(())
}

/// Render the current metrics in Prometheus exposition format, if the
/// recorder is installed.
pub fn render() -> Option<String> {
    PROMETHEUS_HANDLE.get().map(|handle| handle.render())
}

pub fn record_candidate_seen() {
    counter!("sniperbot_candidates_seen_total", 1);
}

pub fn record_pool_detected() {
    counter!("sniperbot_pools_detected_total", 1);
}

pub fn record_pool_reverted() {
    counter!("sniperbot_pools_reverted_total", 1);
}

pub fn record_safety_report(approved: bool) {
    if approved {
        counter!("sniperbot_reports_approved_total", 1);
    } else {
        counter!("sniperbot_reports_rejected_total", 1);
    }
}

pub fn record_snipe_executed(simulated: bool) {
    if simulated {
        counter!("sniperbot_snipes_simulated_total", 1);
    } else {
        counter!("sniperbot_snipes_executed_total", 1);
    }
}

pub fn record_snipe_failed() {
    counter!("sniperbot_snipes_failed_total", 1);
}

pub fn set_open_positions(count: f64) {
    gauge!("sniperbot_open_positions", count);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn helpers_are_safe_without_a_recorder() {
        record_candidate_seen();
        record_pool_detected();
        record_safety_report(true);
        record_snipe_executed(true);
        record_snipe_failed();
        set_open_positions(2.0);
    }
}

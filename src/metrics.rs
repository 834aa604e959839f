//! Metrics collection and export module

use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::time::Instant;

/// Global metrics registry
pub struct Metrics {
    registry: Registry,

    // Listener
    pub candidates_detected: IntCounter,
    pub candidates_admitted: IntCounter,
    pub candidates_rejected: IntCounter,
    pub candidates_stale: IntCounter,
    pub decode_errors: IntCounter,

    // Acquisition
    pub buys_attempted: IntCounter,
    pub buys_confirmed: IntCounter,
    pub buys_failed: IntCounter,
    pub buys_late: IntCounter,

    // Exit monitor and disposal
    pub creator_exits: IntCounter,
    pub sells_triggered: IntCounter,
    pub sells_confirmed: IntCounter,
    pub sells_expired: IntCounter,
    pub sells_abandoned: IntCounter,

    /// Dispatches by route label (`privileged` / `standard`)
    pub dispatches: IntCounterVec,

    // Gauges
    pub pending_assets: IntGauge,
    pub current_tip_lamports: IntGauge,

    // Histograms
    pub decision_latency: Histogram,
    pub dispatch_latency: Histogram,
}

impl Metrics {
    /// Create new metrics instance
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let counter = |name: &str, help: &str| -> anyhow::Result<IntCounter> {
            let counter = IntCounter::with_opts(Opts::new(name, help))?;
            registry.register(Box::new(counter.clone()))?;
            Ok(counter)
        };

        let candidates_detected =
            counter("candidates_detected_total", "Launch transactions decoded")?;
        let candidates_admitted = counter(
            "candidates_admitted_total",
            "Candidates admitted by creator vetting",
        )?;
        let candidates_rejected = counter(
            "candidates_rejected_total",
            "Candidates rejected by creator vetting",
        )?;
        let candidates_stale = counter(
            "candidates_stale_total",
            "Candidates dropped by the freshness guard",
        )?;
        let decode_errors = counter(
            "decode_errors_total",
            "Launch transactions that failed to decode",
        )?;

        let buys_attempted = counter("buys_attempted_total", "Acquisitions attempted")?;
        let buys_confirmed = counter("buys_confirmed_total", "Acquisitions confirmed")?;
        let buys_failed = counter("buys_failed_total", "Acquisitions that failed")?;
        let buys_late = counter(
            "buys_late_total",
            "Acquisitions skipped by the late-entry guard",
        )?;

        let creator_exits = counter("creator_exits_total", "Creator exits flagged")?;
        let sells_triggered = counter("sells_triggered_total", "Disposal races started")?;
        let sells_confirmed = counter("sells_confirmed_total", "Disposal races won")?;
        let sells_expired = counter(
            "sells_expired_total",
            "Disposal races that hit the deadline",
        )?;
        let sells_abandoned = counter(
            "sells_abandoned_total",
            "Assets dropped after exhausting disposal rounds",
        )?;

        let dispatches = IntCounterVec::new(
            Opts::new("dispatches_total", "Transactions dispatched by route"),
            &["route"],
        )?;
        registry.register(Box::new(dispatches.clone()))?;

        let pending_assets = IntGauge::with_opts(Opts::new(
            "pending_assets",
            "Assets currently tracked by the registry",
        ))?;
        registry.register(Box::new(pending_assets.clone()))?;

        let current_tip_lamports = IntGauge::with_opts(Opts::new(
            "current_tip_lamports",
            "Incentive payment attached to privileged dispatches",
        ))?;
        registry.register(Box::new(current_tip_lamports.clone()))?;

        let decision_latency = Histogram::with_opts(
            HistogramOpts::new(
                "decision_latency_seconds",
                "Detection to admission decision latency",
            )
            .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 1.5, 2.0, 5.0]),
        )?;
        registry.register(Box::new(decision_latency.clone()))?;

        let dispatch_latency = Histogram::with_opts(
            HistogramOpts::new(
                "dispatch_latency_seconds",
                "Dispatch to confirmation latency",
            )
            .buckets(vec![0.1, 0.25, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 120.0]),
        )?;
        registry.register(Box::new(dispatch_latency.clone()))?;

        Ok(Self {
            registry,
            candidates_detected,
            candidates_admitted,
            candidates_rejected,
            candidates_stale,
            decode_errors,
            buys_attempted,
            buys_confirmed,
            buys_failed,
            buys_late,
            creator_exits,
            sells_triggered,
            sells_confirmed,
            sells_expired,
            sells_abandoned,
            dispatches,
            pending_assets,
            current_tip_lamports,
            decision_latency,
            dispatch_latency,
        })
    }

    /// Get the registry for exporting
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Prometheus text exposition of every registered metric.
    pub fn encode_text(&self) -> anyhow::Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

/// Global metrics instance
pub fn metrics() -> &'static Metrics {
    static METRICS: once_cell::sync::Lazy<Metrics> =
        once_cell::sync::Lazy::new(|| Metrics::new().expect("Failed to initialize metrics"));
    &METRICS
}

/// Timer helper for measuring operation duration
pub struct Timer {
    start: Instant,
}

impl Timer {
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn observe_duration(&self, histogram: &Histogram) {
        histogram.observe(self.elapsed_secs());
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_register_and_encode() {
        let metrics = Metrics::new().unwrap();
        metrics.candidates_detected.inc();
        metrics.dispatches.with_label_values(&["privileged"]).inc();
        metrics.current_tip_lamports.set(2_000_000);

        let text = metrics.encode_text().unwrap();
        assert!(text.contains("candidates_detected_total 1"));
        assert!(text.contains("dispatches_total{route=\"privileged\"} 1"));
        assert!(text.contains("current_tip_lamports 2000000"));
    }

    #[test]
    fn test_timer_observes_into_histogram() {
        let metrics = Metrics::new().unwrap();
        let timer = Timer::start();
        timer.observe_duration(&metrics.dispatch_latency);
        assert_eq!(metrics.dispatch_latency.get_sample_count(), 1);
    }
}

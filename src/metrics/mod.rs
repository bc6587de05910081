mod server;

use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry};

pub use server::start_metrics_server;

// ============================================================================
// Metrics - Prometheus instrumentation for the order core
// ============================================================================
//
// - transitions: committed / rejected (by reason) / latency
// - effects: dispatched, failed, de-duplicated, retried, dead-lettered
// - notification broker circuit breaker state
//
// Scraped through the actix server in `server.rs`.
// ============================================================================

pub struct Metrics {
    registry: Registry,

    // Transition Engine
    pub transitions_committed: IntCounterVec,
    pub transitions_rejected: IntCounterVec,
    pub transition_duration: HistogramVec,

    // Effect Dispatcher
    pub effects_dispatched: IntCounterVec,
    pub effects_failed: IntCounterVec,
    pub effects_deduplicated: IntCounter,
    pub retry_attempts_total: IntCounterVec,
    pub dead_letters_total: IntCounterVec,

    pub notification_breaker_state: IntGauge,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let transitions_committed = IntCounterVec::new(
            Opts::new("order_transitions_committed_total", "Committed order transitions"),
            &["action", "to_status"],
        )?;
        registry.register(Box::new(transitions_committed.clone()))?;

        let transitions_rejected = IntCounterVec::new(
            Opts::new("order_transitions_rejected_total", "Rejected order transitions"),
            &["action", "reason"],
        )?;
        registry.register(Box::new(transitions_rejected.clone()))?;

        let transition_duration = HistogramVec::new(
            HistogramOpts::new("order_transition_duration_seconds", "Time from request to commit or rejection")
                .buckets(vec![0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0]),
            &["action"],
        )?;
        registry.register(Box::new(transition_duration.clone()))?;

        let effects_dispatched = IntCounterVec::new(
            Opts::new("order_effects_dispatched_total", "Effects delivered to collaborators"),
            &["effect"],
        )?;
        registry.register(Box::new(effects_dispatched.clone()))?;

        let effects_failed = IntCounterVec::new(
            Opts::new("order_effects_failed_total", "Effects that exhausted their retries"),
            &["effect"],
        )?;
        registry.register(Box::new(effects_failed.clone()))?;

        let effects_deduplicated = IntCounter::new(
            "order_effects_deduplicated_total",
            "Transition events dropped because their id was already dispatched",
        )?;
        registry.register(Box::new(effects_deduplicated.clone()))?;

        let retry_attempts_total = IntCounterVec::new(
            Opts::new("order_retry_attempts_total", "Retried attempts per operation"),
            &["operation"],
        )?;
        registry.register(Box::new(retry_attempts_total.clone()))?;

        let dead_letters_total = IntCounterVec::new(
            Opts::new("order_dead_letters_total", "Effects moved to the dead letter queue"),
            &["effect"],
        )?;
        registry.register(Box::new(dead_letters_total.clone()))?;

        let notification_breaker_state = IntGauge::new(
            "notification_circuit_breaker_state",
            "Notification broker circuit breaker (0=Closed, 1=Open, 2=HalfOpen)",
        )?;
        registry.register(Box::new(notification_breaker_state.clone()))?;

        Ok(Self {
            registry,
            transitions_committed,
            transitions_rejected,
            transition_duration,
            effects_dispatched,
            effects_failed,
            effects_deduplicated,
            retry_attempts_total,
            dead_letters_total,
            notification_breaker_state,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn record_commit(&self, action: &str, to_status: &str, duration_secs: f64) {
        self.transitions_committed.with_label_values(&[action, to_status]).inc();
        self.transition_duration.with_label_values(&[action]).observe(duration_secs);
    }

    pub fn record_rejection(&self, action: &str, reason: &str, duration_secs: f64) {
        self.transitions_rejected.with_label_values(&[action, reason]).inc();
        self.transition_duration.with_label_values(&[action]).observe(duration_secs);
    }

    pub fn record_effect(&self, effect: &str, success: bool) {
        if success {
            self.effects_dispatched.with_label_values(&[effect]).inc();
        } else {
            self.effects_failed.with_label_values(&[effect]).inc();
        }
    }

    /// Only attempts after the first count as retries.
    pub fn record_retry_attempt(&self, operation: &str, attempt: u32) {
        if attempt > 1 {
            self.retry_attempts_total.with_label_values(&[operation]).inc();
        }
    }

    pub fn record_dead_letter(&self, effect: &str) {
        self.dead_letters_total.with_label_values(&[effect]).inc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_commit_and_rejection() {
        let metrics = Metrics::new().unwrap();
        metrics.record_commit("claimed", "PREPARING", 0.002);
        metrics.record_commit("claimed", "PREPARING", 0.003);
        metrics.record_rejection("claimed", "claim_denied", 0.001);

        assert_eq!(
            metrics.transitions_committed.with_label_values(&["claimed", "PREPARING"]).get(),
            2
        );
        assert_eq!(
            metrics.transitions_rejected.with_label_values(&["claimed", "claim_denied"]).get(),
            1
        );
        assert_eq!(
            metrics.transition_duration.with_label_values(&["claimed"]).get_sample_count(),
            3
        );
    }

    #[test]
    fn test_first_attempt_is_not_a_retry() {
        let metrics = Metrics::new().unwrap();
        metrics.record_retry_attempt("settlement_check", 1);
        metrics.record_retry_attempt("settlement_check", 2);
        metrics.record_retry_attempt("settlement_check", 3);

        assert_eq!(metrics.retry_attempts_total.with_label_values(&["settlement_check"]).get(), 2);
    }

    #[test]
    fn test_effect_outcomes() {
        let metrics = Metrics::new().unwrap();
        metrics.record_effect("notification", true);
        metrics.record_effect("refund_request", false);
        metrics.record_dead_letter("refund_request");

        assert_eq!(metrics.effects_dispatched.with_label_values(&["notification"]).get(), 1);
        assert_eq!(metrics.effects_failed.with_label_values(&["refund_request"]).get(), 1);
        assert_eq!(metrics.dead_letters_total.with_label_values(&["refund_request"]).get(), 1);
        assert!(!metrics.registry().gather().is_empty());
    }
}

//! # Prometheus Metrics
//!
//! Operational metrics for the recovery authority. The simulator feeds them
//! as it drives the core and can dump them in Prometheus text format at the
//! end of a run (`simulate --metrics`).
//!
//! All metrics are registered in a dedicated [`prometheus::Registry`]
//! with the `bftdid` prefix, so they do not collide with any default
//! global registry consumers.

use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};

use bftdid_contracts::{RecoveryReceipt, RegistryError};

/// Holds all Prometheus metric handles.
///
/// Clone-friendly: prometheus handles are `Arc`s internally.
#[derive(Clone)]
pub struct NodeMetrics {
    registry: Registry,
    /// DIDs registered.
    pub dids_created_total: IntCounter,
    /// Committees configured (every configure bumps an epoch).
    pub watcher_sets_configured_total: IntCounter,
    /// Recoveries committed.
    pub recoveries_committed_total: IntCounter,
    /// Rejected recovery attempts, by reason.
    pub recovery_rejections_total: IntCounterVec,
    /// Signatures skipped inside otherwise successful commits, by kind.
    pub signatures_skipped_total: IntCounterVec,
    /// Size of the most recently configured committee.
    pub committee_size: IntGauge,
    /// Wall-clock latency of `commit_recovery` calls that committed.
    pub commit_latency_seconds: Histogram,
}

impl NodeMetrics {
    /// Creates and registers all metrics. Call once at startup.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("bftdid".into()), None)?;

        let dids_created_total = IntCounter::new("dids_created_total", "Total DIDs registered")?;
        registry.register(Box::new(dids_created_total.clone()))?;

        let watcher_sets_configured_total = IntCounter::new(
            "watcher_sets_configured_total",
            "Total watcher committees configured",
        )?;
        registry.register(Box::new(watcher_sets_configured_total.clone()))?;

        let recoveries_committed_total =
            IntCounter::new("recoveries_committed_total", "Total recoveries committed")?;
        registry.register(Box::new(recoveries_committed_total.clone()))?;

        let recovery_rejections_total = IntCounterVec::new(
            Opts::new(
                "recovery_rejections_total",
                "Rejected recovery attempts by reason",
            ),
            &["reason"],
        )?;
        registry.register(Box::new(recovery_rejections_total.clone()))?;

        let signatures_skipped_total = IntCounterVec::new(
            Opts::new(
                "signatures_skipped_total",
                "Signatures not counted toward a committed quorum, by kind",
            ),
            &["kind"],
        )?;
        registry.register(Box::new(signatures_skipped_total.clone()))?;

        let committee_size =
            IntGauge::new("committee_size", "Size of the most recently configured committee")?;
        registry.register(Box::new(committee_size.clone()))?;

        let commit_latency_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "commit_latency_seconds",
                "Latency of committed recovery calls in seconds",
            )
            .buckets(vec![
                0.0001, 0.00025, 0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1,
            ]),
        )?;
        registry.register(Box::new(commit_latency_seconds.clone()))?;

        Ok(Self {
            registry,
            dids_created_total,
            watcher_sets_configured_total,
            recoveries_committed_total,
            recovery_rejections_total,
            signatures_skipped_total,
            committee_size,
            commit_latency_seconds,
        })
    }

    /// Record a committed recovery.
    pub fn observe_commit(&self, receipt: &RecoveryReceipt, latency_secs: f64) {
        self.recoveries_committed_total.inc();
        self.commit_latency_seconds.observe(latency_secs);
        for (kind, count) in [
            ("invalid", receipt.skipped.invalid),
            ("unauthorized", receipt.skipped.unauthorized),
            ("duplicate", receipt.skipped.duplicate),
        ] {
            if count > 0 {
                self.signatures_skipped_total
                    .with_label_values(&[kind])
                    .inc_by(count as u64);
            }
        }
    }

    /// Record a rejected recovery.
    pub fn observe_rejection(&self, error: &RegistryError) {
        self.recovery_rejections_total
            .with_label_values(&[error.reason()])
            .inc();
    }

    /// Encodes all registered metrics into the Prometheus text exposition format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bftdid_contracts::SkippedSignatures;
    use bftdid_protocol::identity::{DidId, DocRef, Identity};

    #[test]
    fn registers_and_encodes() {
        let metrics = NodeMetrics::new().unwrap();
        metrics.dids_created_total.inc();
        metrics.committee_size.set(7);
        let text = metrics.encode().unwrap();
        assert!(text.contains("bftdid_dids_created_total 1"));
        assert!(text.contains("bftdid_committee_size 7"));
    }

    #[test]
    fn commits_and_rejections_are_labelled() {
        let metrics = NodeMetrics::new().unwrap();
        let receipt = RecoveryReceipt {
            did: DidId::ZERO,
            epoch: 1,
            previous_controller: Identity::from_bytes([1; 32]),
            new_controller: Identity::from_bytes([2; 32]),
            new_doc_ref: DocRef::ZERO,
            version: 1,
            signers: vec![],
            skipped: SkippedSignatures {
                invalid: 2,
                unauthorized: 0,
                duplicate: 1,
            },
        };
        metrics.observe_commit(&receipt, 0.0004);
        metrics.observe_rejection(&RegistryError::AlreadyCompleted {
            did: DidId::ZERO,
            epoch: 1,
        });

        assert_eq!(metrics.recoveries_committed_total.get(), 1);
        assert_eq!(
            metrics
                .signatures_skipped_total
                .with_label_values(&["invalid"])
                .get(),
            2
        );
        assert_eq!(
            metrics
                .recovery_rejections_total
                .with_label_values(&["already_completed"])
                .get(),
            1
        );
        let text = metrics.encode().unwrap();
        assert!(text.contains(r#"bftdid_recovery_rejections_total{reason="already_completed"} 1"#));
    }
}

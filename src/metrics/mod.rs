mod server;

use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry};

pub use server::start_metrics_server;

// ============================================================================
// Workflow Metrics
// ============================================================================
//
// - Operations by name and outcome (succeeded, rejected, conflict, failed)
// - Operation latency
// - Rejected transitions by event
// - Audit entries written by field
// - Notification failures
//
// Scraped from /metrics.
// ============================================================================

pub struct Metrics {
    registry: Registry,

    pub operations_total: IntCounterVec,
    pub operation_duration: HistogramVec,
    pub transition_rejections: IntCounterVec,
    pub audit_entries_written: IntCounterVec,
    pub notification_failures: IntCounter,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let operations_total = IntCounterVec::new(
            Opts::new("workflow_operations_total", "Workflow operations by outcome"),
            &["operation", "outcome"],
        )?;
        registry.register(Box::new(operations_total.clone()))?;

        let operation_duration = HistogramVec::new(
            HistogramOpts::new(
                "workflow_operation_duration_seconds",
                "Workflow operation duration, load to commit",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0]),
            &["operation"],
        )?;
        registry.register(Box::new(operation_duration.clone()))?;

        let transition_rejections = IntCounterVec::new(
            Opts::new("transition_rejections_total", "Rejected status transitions"),
            &["event"],
        )?;
        registry.register(Box::new(transition_rejections.clone()))?;

        let audit_entries_written = IntCounterVec::new(
            Opts::new("audit_entries_written_total", "Audit entries committed"),
            &["field"],
        )?;
        registry.register(Box::new(audit_entries_written.clone()))?;

        let notification_failures = IntCounter::new(
            "notification_failures_total",
            "Post-commit notifications that could not be delivered",
        )?;
        registry.register(Box::new(notification_failures.clone()))?;

        Ok(Self {
            registry,
            operations_total,
            operation_duration,
            transition_rejections,
            audit_entries_written,
            notification_failures,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn record_operation(&self, operation: &str, outcome: &str, duration_secs: f64) {
        self.operations_total.with_label_values(&[operation, outcome]).inc();
        self.operation_duration
            .with_label_values(&[operation])
            .observe(duration_secs);
    }

    pub fn record_rejection(&self, event: &str) {
        self.transition_rejections.with_label_values(&[event]).inc();
    }

    pub fn record_audit_entry(&self, field: &str) {
        self.audit_entries_written.with_label_values(&[field]).inc();
    }

    pub fn record_notification_failure(&self) {
        self.notification_failures.inc();
    }
}

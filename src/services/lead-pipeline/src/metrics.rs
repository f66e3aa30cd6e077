//! Prometheus metrics for the lead pipeline
//!
//! Counters cover intake (submissions, validation failures), every email
//! outcome by type and listener redeliveries. One histogram times whole
//! dispatcher invocations.

use crate::config::MetricsConfig;
use crate::error::{PipelineError, Result};
use prometheus::{
    core::Collector, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use studio_shared::{DeliveryOutcome, EmailType};
use tracing::info;

/// Metrics collector for the lead pipeline
#[derive(Clone)]
pub struct PipelineMetrics {
    registry: Arc<Registry>,

    leads_submitted: IntCounter,
    validation_failures: IntCounter,

    emails_sent: IntCounterVec,
    emails_failed: IntCounterVec,
    emails_skipped: IntCounterVec,

    redeliveries: IntCounter,
    dispatch_duration: HistogramVec,
}

fn register<C>(registry: &Registry, collector: C, name: &str) -> Result<C>
where
    C: Collector + Clone + 'static,
{
    registry
        .register(Box::new(collector.clone()))
        .map_err(|e| PipelineError::internal(format!("Failed to register {}: {}", name, e)))?;
    Ok(collector)
}

fn metric_error(name: &str, e: prometheus::Error) -> PipelineError {
    PipelineError::internal(format!("Failed to create {}: {}", name, e))
}

impl PipelineMetrics {
    /// Create a new metrics collector with its own registry
    pub fn new(config: &MetricsConfig) -> Result<Self> {
        info!("Initializing pipeline metrics");

        let registry = Registry::new();
        let namespace = config.namespace.as_str();

        let leads_submitted = IntCounter::with_opts(
            Opts::new("leads_submitted_total", "Leads accepted and persisted").namespace(namespace),
        )
        .map_err(|e| metric_error("leads_submitted_total", e))?;

        let validation_failures = IntCounter::with_opts(
            Opts::new(
                "lead_validation_failures_total",
                "Lead submissions rejected by validation",
            )
            .namespace(namespace),
        )
        .map_err(|e| metric_error("lead_validation_failures_total", e))?;

        let emails_sent = IntCounterVec::new(
            Opts::new("emails_sent_total", "Emails accepted by the relay").namespace(namespace),
            &["type"],
        )
        .map_err(|e| metric_error("emails_sent_total", e))?;

        let emails_failed = IntCounterVec::new(
            Opts::new("emails_failed_total", "Emails that could not be sent").namespace(namespace),
            &["type"],
        )
        .map_err(|e| metric_error("emails_failed_total", e))?;

        let emails_skipped = IntCounterVec::new(
            Opts::new(
                "emails_skipped_total",
                "Emails skipped because the audit log already holds them",
            )
            .namespace(namespace),
            &["type"],
        )
        .map_err(|e| metric_error("emails_skipped_total", e))?;

        let redeliveries = IntCounter::with_opts(
            Opts::new(
                "trigger_redeliveries_total",
                "Dispatcher invocations re-run by the trigger listener",
            )
            .namespace(namespace),
        )
        .map_err(|e| metric_error("trigger_redeliveries_total", e))?;

        let dispatch_duration = HistogramVec::new(
            HistogramOpts::new(
                "dispatch_duration_seconds",
                "Time taken by one dispatcher invocation",
            )
            .namespace(namespace)
            .buckets(config.histogram_buckets.clone()),
            &["outcome"],
        )
        .map_err(|e| metric_error("dispatch_duration_seconds", e))?;

        let metrics = Self {
            leads_submitted: register(&registry, leads_submitted, "leads_submitted_total")?,
            validation_failures: register(
                &registry,
                validation_failures,
                "lead_validation_failures_total",
            )?,
            emails_sent: register(&registry, emails_sent, "emails_sent_total")?,
            emails_failed: register(&registry, emails_failed, "emails_failed_total")?,
            emails_skipped: register(&registry, emails_skipped, "emails_skipped_total")?,
            redeliveries: register(&registry, redeliveries, "trigger_redeliveries_total")?,
            dispatch_duration: register(
                &registry,
                dispatch_duration,
                "dispatch_duration_seconds",
            )?,
            registry: Arc::new(registry),
        };

        info!("Pipeline metrics initialized successfully");
        Ok(metrics)
    }

    pub fn record_lead_submitted(&self) {
        self.leads_submitted.inc();
    }

    pub fn record_validation_failure(&self) {
        self.validation_failures.inc();
    }

    pub fn record_email(&self, email_type: EmailType, outcome: DeliveryOutcome) {
        let counter = match outcome {
            DeliveryOutcome::Sent => &self.emails_sent,
            DeliveryOutcome::AlreadySent => &self.emails_skipped,
            DeliveryOutcome::Failed => &self.emails_failed,
        };
        counter.with_label_values(&[email_type.as_str()]).inc();
    }

    pub fn record_redelivery(&self) {
        self.redeliveries.inc();
    }

    pub fn start_dispatch_timer(&self) -> DispatchTimer {
        DispatchTimer {
            histogram: self.dispatch_duration.clone(),
            start: Instant::now(),
        }
    }

    /// Prometheus text exposition of every registered metric
    pub fn export_metrics(&self) -> Result<String> {
        let encoder = prometheus::TextEncoder::new();
        let metric_families = self.registry.gather();
        encoder
            .encode_to_string(&metric_families)
            .map_err(|e| PipelineError::internal(format!("Failed to encode metrics: {}", e)))
    }

    /// Counter snapshot for the health endpoint
    pub fn summary(&self) -> serde_json::Value {
        let by_type = |counter: &IntCounterVec| {
            let mut map = serde_json::Map::new();
            for email_type in EmailType::ALL {
                map.insert(
                    email_type.as_str().to_string(),
                    json!(counter.with_label_values(&[email_type.as_str()]).get()),
                );
            }
            serde_json::Value::Object(map)
        };

        json!({
            "leads_submitted": self.leads_submitted.get(),
            "validation_failures": self.validation_failures.get(),
            "emails_sent": by_type(&self.emails_sent),
            "emails_failed": by_type(&self.emails_failed),
            "emails_skipped": by_type(&self.emails_skipped),
            "redeliveries": self.redeliveries.get(),
        })
    }
}

/// Observes the elapsed time into `dispatch_duration_seconds` when finished
pub struct DispatchTimer {
    histogram: HistogramVec,
    start: Instant,
}

impl DispatchTimer {
    pub fn finish(self, complete: bool) -> f64 {
        let elapsed = self.start.elapsed().as_secs_f64();
        let outcome = if complete { "complete" } else { "incomplete" };
        self.histogram.with_label_values(&[outcome]).observe(elapsed);
        elapsed
    }
}

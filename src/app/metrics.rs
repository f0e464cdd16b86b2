//! Prometheus-based metrics module
//!
//! Counts dispatches, rejections and traffic per transport. The CLI prints
//! the text exposition with `--metrics`.

use std::time::Instant;

use lazy_static::lazy_static;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};

use crate::common::{DispatchOutcome, FailureKind, TransportKind};
use crate::error::{Error, Result};

lazy_static! {
    /// Global Prometheus registry
    pub static ref REGISTRY: Registry = Registry::new();

    // === Dispatch Metrics ===

    /// Dispatches started per transport
    pub static ref DISPATCH_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("janus_dispatch_total", "Total number of dispatches started"),
        &["transport"]
    ).unwrap();

    /// Failed dispatches per transport and failure kind
    pub static ref DISPATCH_FAILED: IntCounterVec = IntCounterVec::new(
        Opts::new("janus_dispatch_failed_total", "Total number of failed dispatches"),
        &["transport", "kind"]
    ).unwrap();

    /// Dispatch currently in flight (0 or 1)
    pub static ref DISPATCH_IN_FLIGHT: IntGauge = IntGauge::new(
        "janus_dispatch_in_flight",
        "Number of dispatches currently in flight"
    ).unwrap();

    /// Requests rejected because another one was in flight
    pub static ref DISPATCH_REJECTED_BUSY: IntCounter = IntCounter::new(
        "janus_dispatch_rejected_busy_total",
        "Requests ignored while already sending"
    ).unwrap();

    /// Requests rejected by validation
    pub static ref DISPATCH_REJECTED_INVALID: IntCounter = IntCounter::new(
        "janus_dispatch_rejected_invalid_total",
        "Requests rejected by validation"
    ).unwrap();

    // === Traffic Metrics ===

    pub static ref BYTES_SENT: IntCounterVec = IntCounterVec::new(
        Opts::new("janus_bytes_sent_total", "Payload bytes sent"),
        &["transport"]
    ).unwrap();

    pub static ref BYTES_RECEIVED: IntCounterVec = IntCounterVec::new(
        Opts::new("janus_bytes_received_total", "Reply bytes received"),
        &["transport"]
    ).unwrap();

    // === Duration ===

    pub static ref DISPATCH_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "janus_dispatch_duration_seconds",
            "Dispatch duration in seconds"
        ).buckets(vec![0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0]),
        &["transport"]
    ).unwrap();
}

/// Initialize and register all metrics with the global registry
pub fn init_metrics() {
    REGISTRY.register(Box::new(DISPATCH_TOTAL.clone())).ok();
    REGISTRY.register(Box::new(DISPATCH_FAILED.clone())).ok();
    REGISTRY.register(Box::new(DISPATCH_IN_FLIGHT.clone())).ok();
    REGISTRY.register(Box::new(DISPATCH_REJECTED_BUSY.clone())).ok();
    REGISTRY.register(Box::new(DISPATCH_REJECTED_INVALID.clone())).ok();

    REGISTRY.register(Box::new(BYTES_SENT.clone())).ok();
    REGISTRY.register(Box::new(BYTES_RECEIVED.clone())).ok();

    REGISTRY.register(Box::new(DISPATCH_DURATION_SECONDS.clone())).ok();
}

/// Text exposition of the global registry
pub fn gather_text() -> Result<String> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| Error::Io(std::io::Error::other(e)))?;
    String::from_utf8(buffer).map_err(|e| Error::Io(std::io::Error::other(e)))
}

/// Helper struct for tracking a single dispatch's metrics
pub struct DispatchMetrics {
    transport: &'static str,
    start_time: Instant,
}

impl DispatchMetrics {
    pub fn start(kind: TransportKind) -> Self {
        let transport = kind.label();
        DISPATCH_TOTAL.with_label_values(&[transport]).inc();
        DISPATCH_IN_FLIGHT.inc();
        Self {
            transport,
            start_time: Instant::now(),
        }
    }

    /// Record completion with duration and traffic
    pub fn record_outcome(self, outcome: &DispatchOutcome) {
        DISPATCH_DURATION_SECONDS
            .with_label_values(&[self.transport])
            .observe(self.start_time.elapsed().as_secs_f64());

        match outcome {
            DispatchOutcome::Success(delivery) => {
                BYTES_SENT
                    .with_label_values(&[self.transport])
                    .inc_by(delivery.bytes_sent() as u64);
                if let Some(reply) = delivery.reply() {
                    BYTES_RECEIVED
                        .with_label_values(&[self.transport])
                        .inc_by(reply.len() as u64);
                }
            }
            DispatchOutcome::Failure { kind, .. } => {
                DISPATCH_FAILED
                    .with_label_values(&[self.transport, failure_label(*kind)])
                    .inc();
            }
        }
    }
}

impl Drop for DispatchMetrics {
    fn drop(&mut self) {
        DISPATCH_IN_FLIGHT.dec();
    }
}

fn failure_label(kind: FailureKind) -> &'static str {
    match kind {
        FailureKind::Transport => "transport",
        FailureKind::Timeout => "timeout",
        FailureKind::Internal => "internal",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::Delivery;

    #[test]
    fn test_dispatch_metrics_record() {
        init_metrics();
        let failed_before = DISPATCH_FAILED
            .with_label_values(&["UDP", "timeout"])
            .get();
        let sent_before = BYTES_SENT.with_label_values(&["UDP"]).get();

        DispatchMetrics::start(TransportKind::Datagram)
            .record_outcome(&DispatchOutcome::Success(Delivery::new("sent", 7)));
        DispatchMetrics::start(TransportKind::Datagram)
            .record_outcome(&DispatchOutcome::failure(FailureKind::Timeout, "late"));

        // Other tests dispatch concurrently through the same registry
        assert!(BYTES_SENT.with_label_values(&["UDP"]).get() >= sent_before + 7);
        assert!(DISPATCH_FAILED.with_label_values(&["UDP", "timeout"]).get() >= failed_before + 1);
        assert!(gather_text().unwrap().contains("janus_dispatch_total"));
    }
}

use metriken::{AtomicHistogram, Counter, Gauge, LazyCounter, LazyGauge, metric};
use std::sync::atomic::AtomicBool;

use crate::sample::{FailureKind, Sample};

// Set while a run is active so background reporters know when to stop
pub static RUNNING: AtomicBool = AtomicBool::new(false);

// Live counters for the admin endpoint and progress output. Reports are
// aggregated from samples and never read these.

#[metric(
    name = "samples",
    description = "Inference requests started",
    metadata = { status = "sent" }
)]
pub static SAMPLES_SENT: LazyCounter = LazyCounter::new(Counter::default);

#[metric(
    name = "samples",
    description = "Samples that completed successfully",
    metadata = { status = "success" }
)]
pub static SAMPLES_SUCCESS: LazyCounter = LazyCounter::new(Counter::default);

#[metric(
    name = "samples",
    description = "Samples that failed",
    metadata = { status = "failed" }
)]
pub static SAMPLES_FAILED: LazyCounter = LazyCounter::new(Counter::default);

#[metric(
    name = "failures",
    description = "Samples that timed out",
    metadata = { "type" = "timeout" }
)]
pub static FAILURES_TIMEOUT: LazyCounter = LazyCounter::new(Counter::default);

#[metric(
    name = "failures",
    description = "Samples that could not connect",
    metadata = { "type" = "connection" }
)]
pub static FAILURES_CONNECTION: LazyCounter = LazyCounter::new(Counter::default);

#[metric(
    name = "failures",
    description = "Samples with an unparseable response",
    metadata = { "type" = "malformed" }
)]
pub static FAILURES_MALFORMED: LazyCounter = LazyCounter::new(Counter::default);

#[metric(
    name = "failures",
    description = "Samples answered with a non-success HTTP status",
    metadata = { "type" = "http" }
)]
pub static FAILURES_HTTP: LazyCounter = LazyCounter::new(Counter::default);

#[metric(
    name = "failures",
    description = "Samples cut off by the run deadline",
    metadata = { "type" = "cancelled" }
)]
pub static FAILURES_CANCELLED: LazyCounter = LazyCounter::new(Counter::default);

#[metric(
    name = "failures",
    description = "Other sample failures",
    metadata = { "type" = "other" }
)]
pub static FAILURES_OTHER: LazyCounter = LazyCounter::new(Counter::default);

#[metric(name = "tokens_output", description = "Output tokens generated")]
pub static TOKENS_OUTPUT: LazyCounter = LazyCounter::new(Counter::default);

#[metric(
    name = "samples_inflight",
    description = "Current number of inference requests in flight"
)]
pub static SAMPLES_INFLIGHT: LazyGauge = LazyGauge::new(Gauge::default);

// Histogram parameters: (grouping_power=5, max_value_power=64)
#[metric(
    name = "sample_latency",
    description = "Inference request latency in nanoseconds",
    metadata = { unit = "nanoseconds" }
)]
pub static SAMPLE_LATENCY: AtomicHistogram = AtomicHistogram::new(5, 64);

pub struct Metrics;

impl Metrics {
    /// Count a started request; the in-flight gauge drops when the guard does,
    /// including when a deadline cancels the request mid-flight.
    pub fn start_request() -> InflightGuard {
        SAMPLES_SENT.increment();
        SAMPLES_INFLIGHT.increment();
        InflightGuard { _private: () }
    }

    /// Record the outcome counters of a sample.
    pub fn record_outcome(sample: &Sample) {
        if sample.succeeded {
            SAMPLES_SUCCESS.increment();
            TOKENS_OUTPUT.add(sample.output_tokens);
            let _ = SAMPLE_LATENCY.increment(sample.elapsed.as_nanos() as u64);
            return;
        }

        SAMPLES_FAILED.increment();
        match sample.error_detail.unwrap_or(FailureKind::Other) {
            FailureKind::Timeout => FAILURES_TIMEOUT.increment(),
            FailureKind::ConnectionRefused => FAILURES_CONNECTION.increment(),
            FailureKind::MalformedResponse => FAILURES_MALFORMED.increment(),
            FailureKind::HttpError => FAILURES_HTTP.increment(),
            FailureKind::Cancelled => FAILURES_CANCELLED.increment(),
            FailureKind::Other => FAILURES_OTHER.increment(),
        };
    }

    /// Samples that finished either way.
    pub fn completed() -> u64 {
        SAMPLES_SUCCESS.value() + SAMPLES_FAILED.value()
    }
}

pub struct InflightGuard {
    _private: (),
}

impl Drop for InflightGuard {
    fn drop(&mut self) {
        SAMPLES_INFLIGHT.decrement();
    }
}

use chrono::{Timelike, Utc};
use metriken::histogram::Histogram;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tokio::time::{Instant, interval_at, timeout};

use crate::metrics::{
    FAILURES_CANCELLED, FAILURES_CONNECTION, FAILURES_HTTP, FAILURES_MALFORMED, FAILURES_OTHER,
    FAILURES_TIMEOUT, Metrics, RUNNING, SAMPLE_LATENCY, SAMPLES_FAILED, SAMPLES_INFLIGHT,
    SAMPLES_SUCCESS, TOKENS_OUTPUT,
};

/// Print with timestamp prefix
macro_rules! output {
    () => {
        let now = chrono::Utc::now();
        println!("{}", now.to_rfc3339_opts(chrono::SecondsFormat::Millis, false));
    };
    ($($arg:tt)*) => {{
        let now = chrono::Utc::now();
        print!("{} ", now.to_rfc3339_opts(chrono::SecondsFormat::Millis, false));
        println!($($arg)*);
    }};
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Counters {
    success: u64,
    failed: u64,
    tokens_output: u64,
    timeout: u64,
    connection: u64,
    malformed: u64,
    http: u64,
    cancelled: u64,
    other: u64,
}

impl Counters {
    fn read() -> Self {
        Self {
            success: SAMPLES_SUCCESS.value(),
            failed: SAMPLES_FAILED.value(),
            tokens_output: TOKENS_OUTPUT.value(),
            timeout: FAILURES_TIMEOUT.value(),
            connection: FAILURES_CONNECTION.value(),
            malformed: FAILURES_MALFORMED.value(),
            http: FAILURES_HTTP.value(),
            cancelled: FAILURES_CANCELLED.value(),
            other: FAILURES_OTHER.value(),
        }
    }

    fn delta(&self, previous: &Counters) -> Counters {
        Counters {
            success: self.success.saturating_sub(previous.success),
            failed: self.failed.saturating_sub(previous.failed),
            tokens_output: self.tokens_output.saturating_sub(previous.tokens_output),
            timeout: self.timeout.saturating_sub(previous.timeout),
            connection: self.connection.saturating_sub(previous.connection),
            malformed: self.malformed.saturating_sub(previous.malformed),
            http: self.http.saturating_sub(previous.http),
            cancelled: self.cancelled.saturating_sub(previous.cancelled),
            other: self.other.saturating_sub(previous.other),
        }
    }
}

/// Latency percentiles (p50, p90, max bucket) in milliseconds over the window.
fn window_latency(current: &Option<Histogram>, previous: &Option<Histogram>) -> Option<[u64; 3]> {
    let window = match (current, previous) {
        (Some(current), Some(previous)) => current.wrapping_sub(previous).ok()?,
        (Some(current), None) => current.clone(),
        _ => return None,
    };

    let percentiles = window.percentiles(&[50.0, 90.0, 100.0]).ok()??;
    if percentiles.len() < 3 {
        return None;
    }

    Some([
        percentiles[0].1.end() / 1_000_000,
        percentiles[1].1.end() / 1_000_000,
        percentiles[2].1.end() / 1_000_000,
    ])
}

/// Completed samples of one run, counted from the live metrics at its start.
#[derive(Debug, Clone, Copy)]
pub struct Progress {
    planned: u64,
    baseline: u64,
}

impl Progress {
    /// Snapshot the completed count before any sample of the run can finish.
    pub fn start(planned: u64) -> Self {
        Self {
            planned,
            baseline: Metrics::completed(),
        }
    }

    pub fn planned(&self) -> u64 {
        self.planned
    }

    pub fn done(&self) -> u64 {
        Metrics::completed().saturating_sub(self.baseline)
    }
}

/// Print progress windows while a run is active.
///
/// Reads the live metrics only; the report itself is built from samples.
pub async fn periodic_stats(interval_duration: Duration, progress: Progress) {
    if interval_duration.is_zero() {
        return;
    }

    // Get an aligned start time (aligned to the second)
    let start = Instant::now() - Duration::from_nanos(Utc::now().nanosecond() as u64)
        + Duration::from_secs(1);
    let mut interval = interval_at(start, interval_duration);
    let mut window_id = 1;

    let mut previous = Counters::read();
    let mut previous_latency = SAMPLE_LATENCY.load();

    // Give the runner time to raise the flag
    tokio::time::sleep(Duration::from_secs(1)).await;

    while RUNNING.load(Ordering::Relaxed) {
        if timeout(Duration::from_secs(1), interval.tick())
            .await
            .is_err()
        {
            continue;
        }

        let current = Counters::read();
        let window = current.delta(&previous);
        let interval_secs = interval_duration.as_secs_f64();
        let done = progress.done();

        output!();
        output!("-----");
        output!("Window: {}", window_id);
        output!(
            "Samples: Done: {}/{} In-flight: {}",
            done,
            progress.planned(),
            SAMPLES_INFLIGHT.value()
        );
        output!("Responses: Ok: {} Err: {}", window.success, window.failed);

        if window.failed > 0 {
            output!(
                "Errors: Timeout: {} Connection: {} Malformed: {} HTTP: {} Cancelled: {} Other: {}",
                window.timeout,
                window.connection,
                window.malformed,
                window.http,
                window.cancelled,
                window.other
            );
        }

        if window.tokens_output > 0 {
            output!(
                "Tokens/s: Output: {:.2}",
                window.tokens_output as f64 / interval_secs
            );
        }

        let current_latency = SAMPLE_LATENCY.load();
        if let Some([p50, p90, max]) = window_latency(&current_latency, &previous_latency) {
            output!("Sample Latency (ms): p50: {} p90: {} max: {}", p50, p90, max);
        }

        previous = current;
        previous_latency = current_latency;
        window_id += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::{ModelId, Sample};

    #[test]
    fn test_counter_delta() {
        let previous = Counters {
            success: 3,
            failed: 1,
            tokens_output: 150,
            timeout: 1,
            ..Default::default()
        };
        let current = Counters {
            success: 5,
            failed: 2,
            tokens_output: 250,
            timeout: 1,
            http: 1,
            ..Default::default()
        };

        let window = current.delta(&previous);
        assert_eq!(window.success, 2);
        assert_eq!(window.failed, 1);
        assert_eq!(window.tokens_output, 100);
        assert_eq!(window.timeout, 0);
        assert_eq!(window.http, 1);
    }

    #[test]
    fn test_window_latency_without_data() {
        assert_eq!(window_latency(&None, &None), None);
    }

    #[test]
    fn test_progress_counts_samples_finished_right_after_start() {
        let progress = Progress::start(2);
        Metrics::record_outcome(&Sample::success(
            ModelId::new("small"),
            0,
            "prompt",
            Duration::from_millis(20),
            5,
            "one two three four five",
        ));

        // Counters are shared with concurrently running tests.
        assert!(progress.done() >= 1);
        assert_eq!(progress.planned(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_interval_returns_immediately() {
        periodic_stats(Duration::ZERO, Progress::start(1)).await;
    }
}

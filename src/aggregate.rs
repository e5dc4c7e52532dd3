use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use crate::sample::{FailureKind, ModelId, Sample, duration_ms};

/// Summary of every sample taken for one model.
///
/// Statistics are computed over successful samples only. When a model has no
/// successful samples they are `None`, never zero.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateStat {
    pub model: ModelId,
    /// Samples recorded for this model, successful or not
    pub attempts: usize,
    /// Successful samples
    pub sample_count: usize,
    pub failure_count: usize,
    pub mean_tokens_per_second: Option<f64>,
    #[serde(rename = "min_latency_ms", serialize_with = "duration_ms::serialize_option")]
    pub min_latency: Option<Duration>,
    #[serde(rename = "median_latency_ms", serialize_with = "duration_ms::serialize_option")]
    pub median_latency: Option<Duration>,
    #[serde(rename = "p90_latency_ms", serialize_with = "duration_ms::serialize_option")]
    pub p90_latency: Option<Duration>,
    #[serde(rename = "max_latency_ms", serialize_with = "duration_ms::serialize_option")]
    pub max_latency: Option<Duration>,
    #[serde(rename = "mean_latency_ms", serialize_with = "duration_ms::serialize_option")]
    pub mean_latency: Option<Duration>,
    pub total_output_tokens: u64,
    pub failures: BTreeMap<FailureKind, usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preview: Option<String>,
}

impl AggregateStat {
    fn from_samples(model: ModelId, samples: &[&Sample]) -> Self {
        let mut latencies: Vec<Duration> = Vec::new();
        let mut total_output_tokens = 0;
        let mut failures = BTreeMap::new();
        let mut preview = None;

        for sample in samples {
            if sample.succeeded {
                latencies.push(sample.elapsed);
                total_output_tokens += sample.output_tokens;
                if preview.is_none() {
                    preview = sample.preview.clone();
                }
            } else {
                let kind = sample.error_detail.unwrap_or(FailureKind::Other);
                *failures.entry(kind).or_insert(0) += 1;
            }
        }

        latencies.sort();

        let total_elapsed: Duration = latencies.iter().sum();
        let total_secs = total_elapsed.as_secs_f64();
        let mean_tokens_per_second =
            (!latencies.is_empty() && total_secs > 0.0).then(|| total_output_tokens as f64 / total_secs);
        let mean_latency = (!latencies.is_empty()).then(|| total_elapsed / latencies.len() as u32);

        Self {
            model,
            attempts: samples.len(),
            sample_count: latencies.len(),
            failure_count: samples.len() - latencies.len(),
            mean_tokens_per_second,
            min_latency: latencies.first().copied(),
            median_latency: percentile(&latencies, 0.5),
            p90_latency: percentile(&latencies, 0.9),
            max_latency: latencies.last().copied(),
            mean_latency,
            total_output_tokens,
            failures,
            preview,
        }
    }

    pub fn success_rate(&self) -> f64 {
        if self.attempts == 0 {
            0.0
        } else {
            self.sample_count as f64 / self.attempts as f64
        }
    }
}

/// Group samples by model and summarize each group.
///
/// Output order is the order in which each model first appears in `samples`.
pub fn aggregate(samples: &[Sample]) -> Vec<AggregateStat> {
    let mut order: Vec<&ModelId> = Vec::new();
    let mut groups: HashMap<&ModelId, Vec<&Sample>> = HashMap::new();

    for sample in samples {
        groups
            .entry(&sample.model)
            .or_insert_with(|| {
                order.push(&sample.model);
                Vec::new()
            })
            .push(sample);
    }

    order
        .into_iter()
        .map(|model| AggregateStat::from_samples(model.clone(), &groups[model]))
        .collect()
}

/// Order stats by mean throughput, fastest first.
///
/// The sort is stable, so equal throughputs keep their input order, and
/// models without a throughput go last.
pub fn rank(mut stats: Vec<AggregateStat>) -> Vec<AggregateStat> {
    stats.sort_by(|a, b| match (a.mean_tokens_per_second, b.mean_tokens_per_second) {
        (Some(a), Some(b)) => b.total_cmp(&a),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => std::cmp::Ordering::Equal,
    });
    stats
}

/// Nearest-rank percentile: the smallest value with at least `quantile` of
/// the samples at or below it.
fn percentile(sorted: &[Duration], quantile: f64) -> Option<Duration> {
    if sorted.is_empty() {
        return None;
    }

    let clamped = quantile.clamp(0.0, 1.0);
    // Epsilon keeps exact ranks like 0.9 * 10 from rounding up a slot
    let rank = ((sorted.len() as f64 * clamped) - 1e-9).ceil().max(1.0) as usize;
    sorted.get(rank.min(sorted.len()) - 1).copied()
}

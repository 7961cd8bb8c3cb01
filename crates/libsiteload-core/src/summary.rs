//! Run-summary statistics derived from the outcome log

use std::collections::BTreeMap;
use std::time::Duration;

use hdrhistogram::Histogram;
use serde::{Deserialize, Serialize};

use crate::outcome::RequestOutcome;

/// Upper bound for recorded latencies, in microseconds (1 hour)
const HISTOGRAM_MAX_US: u64 = 3_600_000_000;

/// Latency distribution in milliseconds
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LatencyStats {
    pub min_ms: f64,
    pub avg_ms: f64,
    pub med_ms: f64,
    pub p90_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
    pub max_ms: f64,
}

impl LatencyStats {
    /// `None` when there are no outcomes
    pub fn from_outcomes(outcomes: &[RequestOutcome]) -> Option<Self> {
        if outcomes.is_empty() {
            return None;
        }

        let hist = latency_histogram(outcomes)?;
        let (min, max, sum) = outcomes.iter().map(|o| o.duration_ms()).fold(
            (f64::MAX, f64::MIN, 0.0),
            |(min, max, sum), ms| (min.min(ms), max.max(ms), sum + ms),
        );

        Some(Self {
            min_ms: min,
            avg_ms: sum / outcomes.len() as f64,
            med_ms: us_to_ms(hist.value_at_percentile(50.0)),
            p90_ms: us_to_ms(hist.value_at_percentile(90.0)),
            p95_ms: us_to_ms(hist.value_at_percentile(95.0)),
            p99_ms: us_to_ms(hist.value_at_percentile(99.0)),
            max_ms: max,
        })
    }
}

/// Pass/fail tally for the per-response status check
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckStats {
    pub name: String,
    pub passed: u64,
    pub failed: u64,
}

impl CheckStats {
    pub fn pass_rate(&self) -> f64 {
        let total = self.passed + self.failed;
        if total == 0 {
            0.0
        } else {
            self.passed as f64 / total as f64
        }
    }
}

/// Aggregate numbers printed at the end of a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub failure_rate: f64,
    pub latency: Option<LatencyStats>,
    pub checks: Option<CheckStats>,
    pub status_counts: BTreeMap<String, u64>,
    pub requests_per_sec: f64,
    #[serde(with = "serde_secs")]
    pub elapsed: Duration,
    pub peak_vus: usize,
}

impl RunSummary {
    pub fn from_outcomes(
        outcomes: &[RequestOutcome],
        success_statuses: &[u16],
        status_check: Option<u16>,
        elapsed: Duration,
        peak_vus: usize,
    ) -> Self {
        let total = outcomes.len() as u64;
        let successful = outcomes
            .iter()
            .filter(|o| o.is_success(success_statuses))
            .count() as u64;

        let mut status_counts = BTreeMap::new();
        for outcome in outcomes {
            *status_counts.entry(outcome.status_key()).or_insert(0) += 1;
        }

        let checks = status_check.map(|expected| {
            let passed = outcomes.iter().filter(|o| o.status == Some(expected)).count() as u64;
            CheckStats {
                name: format!("status code {}", expected),
                passed,
                failed: total - passed,
            }
        });

        let secs = elapsed.as_secs_f64();

        Self {
            total_requests: total,
            successful_requests: successful,
            failed_requests: total - successful,
            failure_rate: failure_rate(outcomes, success_statuses).unwrap_or(0.0),
            latency: LatencyStats::from_outcomes(outcomes),
            checks,
            status_counts,
            requests_per_sec: if secs > 0.0 { total as f64 / secs } else { 0.0 },
            elapsed,
            peak_vus,
        }
    }
}

/// Fraction of outcomes whose status is not in `success_statuses`
pub fn failure_rate(outcomes: &[RequestOutcome], success_statuses: &[u16]) -> Option<f64> {
    if outcomes.is_empty() {
        return None;
    }
    let failed = outcomes
        .iter()
        .filter(|o| !o.is_success(success_statuses))
        .count();
    Some(failed as f64 / outcomes.len() as f64)
}

/// p-th percentile of request durations in milliseconds
pub fn duration_percentile_ms(outcomes: &[RequestOutcome], percentile: f64) -> Option<f64> {
    if outcomes.is_empty() {
        return None;
    }
    let hist = latency_histogram(outcomes)?;
    Some(us_to_ms(hist.value_at_percentile(percentile)))
}

fn latency_histogram(outcomes: &[RequestOutcome]) -> Option<Histogram<u64>> {
    // 1 microsecond to 1 hour, 3 significant figures
    let mut hist = Histogram::<u64>::new_with_bounds(1, HISTOGRAM_MAX_US, 3).ok()?;
    for outcome in outcomes {
        let us = (outcome.duration.as_micros() as u64).max(1);
        hist.saturating_record(us);
    }
    Some(hist)
}

fn us_to_ms(us: u64) -> f64 {
    us as f64 / 1000.0
}

mod serde_secs {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs_f64().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs)
            .map_err(|_| serde::de::Error::custom(format!("invalid duration {}s", secs)))
    }
}

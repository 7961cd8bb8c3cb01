//! Pass/fail thresholds over aggregate run metrics
//!
//! Thresholds use the k6 expression syntax: `rate < 0.01` for the request
//! failure rate, and `p(95) < 1000`, `avg <= 200`, `med < 300`, `min > 0`,
//! `max < 5000` for request durations in milliseconds. Evaluation happens
//! once, after the run completes.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SiteloadError};
use crate::outcome::{RequestOutcome, DEFAULT_SUCCESS_STATUSES};
use crate::summary::{duration_percentile_ms, failure_rate};

/// Metric a threshold applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    /// Fraction of requests whose status is outside the success set
    HttpReqFailed,
    /// Request duration in milliseconds
    HttpReqDuration,
}

impl Metric {
    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::HttpReqFailed => "http_req_failed",
            Metric::HttpReqDuration => "http_req_duration",
        }
    }

    /// Accepts the k6 metric names and the descriptive aliases
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim() {
            "http_req_failed" | "request_failure_rate" => Some(Metric::HttpReqFailed),
            "http_req_duration" | "request_duration" | "request_duration_p95" => {
                Some(Metric::HttpReqDuration)
            }
            _ => None,
        }
    }
}

/// How the metric's samples are reduced to one number
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggregation {
    Rate,
    Avg,
    Min,
    Max,
    Med,
    Percentile(f64),
}

impl Aggregation {
    fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        match s {
            "rate" => return Some(Aggregation::Rate),
            "avg" => return Some(Aggregation::Avg),
            "min" => return Some(Aggregation::Min),
            "max" => return Some(Aggregation::Max),
            "med" => return Some(Aggregation::Med),
            _ => {}
        }

        let inner = s.strip_prefix("p(")?.strip_suffix(')')?;
        let p: f64 = inner.trim().parse().ok()?;
        if (0.0..=100.0).contains(&p) {
            Some(Aggregation::Percentile(p))
        } else {
            None
        }
    }

    fn applies_to(&self, metric: Metric) -> bool {
        match metric {
            Metric::HttpReqFailed => matches!(self, Aggregation::Rate),
            Metric::HttpReqDuration => !matches!(self, Aggregation::Rate),
        }
    }
}

impl fmt::Display for Aggregation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Aggregation::Rate => write!(f, "rate"),
            Aggregation::Avg => write!(f, "avg"),
            Aggregation::Min => write!(f, "min"),
            Aggregation::Max => write!(f, "max"),
            Aggregation::Med => write!(f, "med"),
            Aggregation::Percentile(p) => write!(f, "p({})", p),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Comparison {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

impl Comparison {
    // Two-character operators first so "<=" is not read as "<"
    const TOKENS: [(&'static str, Comparison); 6] = [
        ("<=", Comparison::Le),
        (">=", Comparison::Ge),
        ("==", Comparison::Eq),
        ("!=", Comparison::Ne),
        ("<", Comparison::Lt),
        (">", Comparison::Gt),
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Comparison::Lt => "<",
            Comparison::Le => "<=",
            Comparison::Gt => ">",
            Comparison::Ge => ">=",
            Comparison::Eq => "==",
            Comparison::Ne => "!=",
        }
    }

    pub fn holds(&self, observed: f64, bound: f64) -> bool {
        match self {
            Comparison::Lt => observed < bound,
            Comparison::Le => observed <= bound,
            Comparison::Gt => observed > bound,
            Comparison::Ge => observed >= bound,
            Comparison::Eq => observed == bound,
            Comparison::Ne => observed != bound,
        }
    }
}

/// One pass/fail criterion, e.g. `http_req_duration: p(95) < 1000`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Threshold {
    pub metric: Metric,
    pub aggregation: Aggregation,
    pub comparison: Comparison,
    pub bound: f64,
}

impl Threshold {
    /// Parse an expression such as `p(95) < 1000` for `metric`
    pub fn parse(metric: Metric, expr: &str) -> Result<Self> {
        let invalid = |reason: &str| SiteloadError::Threshold {
            expr: format!("{}: {}", metric.as_str(), expr),
            reason: reason.to_string(),
        };

        let (pos, token, comparison) = Comparison::TOKENS
            .iter()
            .filter_map(|(tok, cmp)| expr.find(*tok).map(|pos| (pos, *tok, *cmp)))
            .min_by_key(|(pos, tok, _)| (*pos, std::cmp::Reverse(tok.len())))
            .ok_or_else(|| invalid("missing comparison operator"))?;

        let aggregation = Aggregation::parse(&expr[..pos])
            .ok_or_else(|| invalid("unknown aggregation"))?;
        if !aggregation.applies_to(metric) {
            return Err(invalid(&format!("'{}' does not apply to {}", aggregation, metric.as_str())));
        }

        let raw_bound = expr[pos + token.len()..].trim();
        let raw_bound = raw_bound.strip_suffix("ms").unwrap_or(raw_bound).trim();
        let bound: f64 = raw_bound.parse().map_err(|_| invalid("bound is not a number"))?;
        if !bound.is_finite() {
            return Err(invalid("bound is not finite"));
        }

        Ok(Self {
            metric,
            aggregation,
            comparison,
            bound,
        })
    }

    /// Expression text, e.g. `p(95) < 1000`
    pub fn expr(&self) -> String {
        format!("{} {} {}", self.aggregation, self.comparison.as_str(), self.bound)
    }

    /// Observed aggregate for this threshold; `None` when nothing was recorded
    pub fn observe(&self, outcomes: &[RequestOutcome], success_statuses: &[u16]) -> Option<f64> {
        if outcomes.is_empty() {
            return None;
        }
        let durations = || outcomes.iter().map(|o| o.duration_ms());
        match self.aggregation {
            Aggregation::Rate => failure_rate(outcomes, success_statuses),
            Aggregation::Avg => Some(durations().sum::<f64>() / outcomes.len() as f64),
            Aggregation::Min => durations().reduce(f64::min),
            Aggregation::Max => durations().reduce(f64::max),
            Aggregation::Med => duration_percentile_ms(outcomes, 50.0),
            Aggregation::Percentile(p) => duration_percentile_ms(outcomes, p),
        }
    }
}

impl fmt::Display for Threshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.metric.as_str(), self.expr())
    }
}

/// Outcome of one threshold
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdResult {
    pub threshold: Threshold,
    /// `None` when no requests were recorded
    pub observed: Option<f64>,
    pub passed: bool,
}

/// Thresholds plus the status codes that count as success
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdSet {
    pub thresholds: Vec<Threshold>,
    pub success_statuses: Vec<u16>,
}

impl ThresholdSet {
    pub fn new(thresholds: Vec<Threshold>) -> Self {
        Self {
            thresholds,
            success_statuses: DEFAULT_SUCCESS_STATUSES.to_vec(),
        }
    }

    /// Build from the k6 layout: metric name -> list of expressions
    pub fn from_map(map: &BTreeMap<String, Vec<String>>) -> Result<Self> {
        let mut thresholds = Vec::new();
        for (name, exprs) in map {
            let metric = Metric::from_name(name).ok_or_else(|| SiteloadError::Threshold {
                expr: name.clone(),
                reason: "unknown metric".to_string(),
            })?;
            for expr in exprs {
                thresholds.push(Threshold::parse(metric, expr)?);
            }
        }
        Ok(Self::new(thresholds))
    }

    /// Smoke defaults: under 1% failures, p95 under 500ms
    pub fn smoke() -> Self {
        Self::defaults(500.0)
    }

    /// Load defaults: under 1% failures, p95 under 1000ms
    pub fn load() -> Self {
        Self::defaults(1000.0)
    }

    fn defaults(p95_bound_ms: f64) -> Self {
        Self::new(vec![
            Threshold {
                metric: Metric::HttpReqFailed,
                aggregation: Aggregation::Rate,
                comparison: Comparison::Lt,
                bound: 0.01,
            },
            Threshold {
                metric: Metric::HttpReqDuration,
                aggregation: Aggregation::Percentile(95.0),
                comparison: Comparison::Lt,
                bound: p95_bound_ms,
            },
        ])
    }

    pub fn with_success_statuses(mut self, statuses: Vec<u16>) -> Self {
        self.success_statuses = statuses;
        self
    }
}

/// Evaluate every threshold against the recorded outcomes.
///
/// With zero outcomes every threshold passes vacuously.
pub fn evaluate(outcomes: &[RequestOutcome], thresholds: &ThresholdSet) -> Vec<ThresholdResult> {
    thresholds
        .thresholds
        .iter()
        .map(|threshold| {
            let observed = threshold.observe(outcomes, &thresholds.success_statuses);
            let passed = observed.map_or(true, |value| threshold.comparison.holds(value, threshold.bound));
            ThresholdResult {
                threshold: threshold.clone(),
                observed,
                passed,
            }
        })
        .collect()
}

/// True when every result passed
pub fn all_passed(results: &[ThresholdResult]) -> bool {
    results.iter().all(|r| r.passed)
}

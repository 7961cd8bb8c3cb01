//! Per-request outcomes and the shared, append-only outcome log

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::RwLock;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::fetcher::FetchError;

/// Status codes counted as success when nothing else is configured
pub const DEFAULT_SUCCESS_STATUSES: &[u16] = &[200];

/// Result of one iteration's GET
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestOutcome {
    /// HTTP status, `None` on network error or timeout
    pub status: Option<u16>,
    /// Wall time from send to response (or failure)
    #[serde(with = "serde_millis")]
    pub duration: Duration,
    pub timestamp: DateTime<Utc>,
    pub path: String,
    pub vu: usize,
    /// Error kind when `status` is `None`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RequestOutcome {
    pub fn from_result(
        result: &std::result::Result<u16, FetchError>,
        duration: Duration,
        path: impl Into<String>,
        vu: usize,
    ) -> Self {
        let (status, error) = match result {
            Ok(status) => (Some(*status), None),
            Err(e) => (None, Some(e.as_str().to_string())),
        };
        Self {
            status,
            duration,
            timestamp: Utc::now(),
            path: path.into(),
            vu,
            error,
        }
    }

    /// Whether the response status is in `success_statuses`
    pub fn is_success(&self, success_statuses: &[u16]) -> bool {
        self.status.map_or(false, |s| success_statuses.contains(&s))
    }

    pub fn duration_ms(&self) -> f64 {
        self.duration.as_secs_f64() * 1000.0
    }

    /// Key used in the status breakdown
    pub fn status_key(&self) -> String {
        match (&self.status, &self.error) {
            (Some(status), _) => status.to_string(),
            (None, Some(kind)) => kind.to_uppercase(),
            (None, None) => "UNKNOWN".to_string(),
        }
    }
}

/// Append-only outcome store shared by all virtual users, plus live gauges
/// readable while the run is in progress.
pub struct OutcomeLog {
    outcomes: RwLock<Vec<RequestOutcome>>,
    success_statuses: Vec<u16>,

    pub total_requests: AtomicU64,
    pub failed_requests: AtomicU64,
    pub in_flight: AtomicUsize,
    pub active_vus: AtomicUsize,
    pub peak_vus: AtomicUsize,
}

impl OutcomeLog {
    pub fn new(success_statuses: Vec<u16>) -> Self {
        Self {
            outcomes: RwLock::new(Vec::new()),
            success_statuses,
            total_requests: AtomicU64::new(0),
            failed_requests: AtomicU64::new(0),
            in_flight: AtomicUsize::new(0),
            active_vus: AtomicUsize::new(0),
            peak_vus: AtomicUsize::new(0),
        }
    }

    /// Append one outcome
    pub fn record(&self, outcome: RequestOutcome) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        if !outcome.is_success(&self.success_statuses) {
            self.failed_requests.fetch_add(1, Ordering::Relaxed);
        }

        // A panicked writer cannot leave the Vec half-pushed, so keep appending
        self.outcomes
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(outcome);
    }

    pub fn request_started(&self) {
        self.in_flight.fetch_add(1, Ordering::Relaxed);
    }

    pub fn request_finished(&self) {
        self.in_flight.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn vu_activated(&self) {
        let now = self.active_vus.fetch_add(1, Ordering::Relaxed) + 1;
        self.peak_vus.fetch_max(now, Ordering::Relaxed);
    }

    pub fn vu_deactivated(&self) {
        self.active_vus.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn active_vus(&self) -> usize {
        self.active_vus.load(Ordering::Relaxed)
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Relaxed)
    }

    pub fn peak_vus(&self) -> usize {
        self.peak_vus.load(Ordering::Relaxed)
    }

    pub fn total_requests(&self) -> u64 {
        self.total_requests.load(Ordering::Relaxed)
    }

    pub fn failed_requests(&self) -> u64 {
        self.failed_requests.load(Ordering::Relaxed)
    }

    pub fn success_statuses(&self) -> &[u16] {
        &self.success_statuses
    }

    /// Copy of everything recorded so far
    pub fn snapshot(&self) -> Vec<RequestOutcome> {
        self.outcomes
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl Default for OutcomeLog {
    fn default() -> Self {
        Self::new(DEFAULT_SUCCESS_STATUSES.to_vec())
    }
}

mod serde_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_secs_f64() * 1000.0).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let ms = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(ms / 1000.0)
            .map_err(|_| serde::de::Error::custom(format!("invalid duration {}ms", ms)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn outcome(status: Option<u16>) -> RequestOutcome {
        RequestOutcome {
            status,
            duration: Duration::from_millis(10),
            timestamp: Utc::now(),
            path: "".to_string(),
            vu: 0,
            error: status.is_none().then(|| "timeout".to_string()),
        }
    }

    #[test]
    fn test_success_uses_status_set() {
        assert!(outcome(Some(200)).is_success(DEFAULT_SUCCESS_STATUSES));
        assert!(!outcome(Some(500)).is_success(DEFAULT_SUCCESS_STATUSES));
        assert!(!outcome(Some(301)).is_success(DEFAULT_SUCCESS_STATUSES));
        assert!(outcome(Some(301)).is_success(&[200, 301]));
        assert!(!outcome(None).is_success(DEFAULT_SUCCESS_STATUSES));
    }

    #[test]
    fn test_status_key() {
        assert_eq!(outcome(Some(404)).status_key(), "404");
        assert_eq!(outcome(None).status_key(), "TIMEOUT");
    }

    #[test]
    fn test_from_fetch_error() {
        let o = RequestOutcome::from_result(&Err(FetchError::Timeout), Duration::from_secs(60), "about-us", 3);
        assert_eq!(o.status, None);
        assert_eq!(o.error.as_deref(), Some("timeout"));
        assert_eq!(o.vu, 3);
        assert_eq!(o.path, "about-us");
    }

    #[test]
    fn test_record_counts_failures() {
        let log = OutcomeLog::default();
        log.record(outcome(Some(200)));
        log.record(outcome(Some(500)));
        log.record(outcome(None));

        assert_eq!(log.total_requests(), 3);
        assert_eq!(log.failed_requests(), 2);
        assert_eq!(log.snapshot().len(), 3);
    }

    #[test]
    fn test_concurrent_appends_are_not_lost() {
        let log = Arc::new(OutcomeLog::default());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let log = Arc::clone(&log);
                std::thread::spawn(move || {
                    for _ in 0..250 {
                        log.record(outcome(Some(200)));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(log.snapshot().len(), 2000);
        assert_eq!(log.total_requests(), 2000);
        assert_eq!(log.failed_requests(), 0);
    }

    #[test]
    fn test_record_survives_poisoned_lock() {
        let log = Arc::new(OutcomeLog::default());
        log.record(outcome(Some(200)));

        let poisoner = Arc::clone(&log);
        let result = std::thread::spawn(move || {
            let _guard = poisoner.outcomes.write().unwrap();
            panic!("writer died holding the lock");
        })
        .join();
        assert!(result.is_err());
        assert!(log.outcomes.is_poisoned());

        log.record(outcome(Some(500)));

        // Gauges and the evaluated snapshot stay in agreement
        let snapshot = log.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(log.total_requests(), 2);
        assert_eq!(log.failed_requests(), 1);
    }

    #[test]
    fn test_negative_duration_in_json_rejected() {
        let mut value = serde_json::to_value(outcome(Some(200))).unwrap();
        value["duration"] = serde_json::json!(-5.0);
        assert!(serde_json::from_value::<RequestOutcome>(value).is_err());
    }

    #[test]
    fn test_peak_vus_tracks_maximum() {
        let log = OutcomeLog::default();
        log.vu_activated();
        log.vu_activated();
        log.vu_activated();
        log.vu_deactivated();
        log.vu_activated();
        assert_eq!(log.active_vus(), 3);
        assert_eq!(log.peak_vus(), 3);
    }
}

//! Scenario runner - drives the virtual-user pool for one run

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio::time::{sleep, sleep_until, timeout, Instant};
use tracing::{debug, info, warn};

use crate::error::{Result, SiteloadError};
use crate::fetcher::{FetchError, Fetcher};
use crate::outcome::{OutcomeLog, RequestOutcome};
use crate::profile::LoadProfile;
use crate::summary::RunSummary;
use crate::target::{PickStrategy, TargetConfig};
use crate::threshold::{all_passed, evaluate, ThresholdResult, ThresholdSet};

/// Default per-request timeout
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Lifecycle of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    #[default]
    NotStarted,
    Running,
    Completed,
    Aborted,
}

impl RunState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunState::NotStarted => "not started",
            RunState::Running => "running",
            RunState::Completed => "completed",
            RunState::Aborted => "aborted",
        }
    }
}

/// Per-run knobs that are not part of the VU schedule
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub strategy: PickStrategy,
    /// Pause after every iteration
    pub iteration_sleep: Duration,
    pub request_timeout: Duration,
    /// Seed for per-VU random sources; entropy when `None`
    pub seed: Option<u64>,
    /// Expected status for the per-response check, if the scenario has one
    pub status_check: Option<u16>,
    /// Issue one GET to the base URL before starting and abort if it fails
    pub preflight: bool,
    /// How often the controller re-reads the schedule and idle VUs poll
    pub tick: Duration,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            strategy: PickStrategy::RandomUniform,
            iteration_sleep: Duration::from_secs(1),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            seed: None,
            status_check: None,
            preflight: false,
            tick: Duration::from_millis(100),
        }
    }
}

/// Everything known about a finished run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub scenario: String,
    pub base_url: String,
    pub profile: LoadProfile,
    pub state: RunState,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub summary: RunSummary,
    pub thresholds: Vec<ThresholdResult>,
    pub passed: bool,
}

/// Runs one scenario against a target registry
pub struct ScenarioRunner<F: Fetcher> {
    name: String,
    targets: Arc<TargetConfig>,
    profile: LoadProfile,
    thresholds: ThresholdSet,
    options: RunOptions,
    fetcher: Arc<F>,
    log: Arc<OutcomeLog>,
    state: RunState,
}

/// State shared read-only by all VU tasks
struct VuContext<F: Fetcher> {
    targets: Arc<TargetConfig>,
    fetcher: Arc<F>,
    log: Arc<OutcomeLog>,
    strategy: PickStrategy,
    target_vus: Arc<AtomicUsize>,
    deadline: Instant,
    iteration_sleep: Duration,
    request_timeout: Duration,
    tick: Duration,
}

impl<F: Fetcher> ScenarioRunner<F> {
    pub fn new(
        name: impl Into<String>,
        targets: TargetConfig,
        profile: LoadProfile,
        thresholds: ThresholdSet,
        options: RunOptions,
        fetcher: F,
    ) -> Result<Self> {
        profile.validate()?;
        if options.tick.is_zero() {
            return Err(SiteloadError::Config("controller tick must be positive".to_string()));
        }

        let log = Arc::new(OutcomeLog::new(thresholds.success_statuses.clone()));

        Ok(Self {
            name: name.into(),
            targets: Arc::new(targets),
            profile,
            thresholds,
            options,
            fetcher: Arc::new(fetcher),
            log,
            state: RunState::NotStarted,
        })
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Live view of the run's outcomes and gauges
    pub fn outcome_log(&self) -> Arc<OutcomeLog> {
        Arc::clone(&self.log)
    }

    /// Execute the run to completion and evaluate thresholds.
    ///
    /// Returns `Err` only when the run aborts before the first iteration.
    pub async fn run(&mut self) -> Result<RunReport> {
        if self.state != RunState::NotStarted {
            return Err(SiteloadError::Config(format!(
                "scenario '{}' already {}",
                self.name,
                self.state.as_str()
            )));
        }

        let started_at = Utc::now();

        if self.options.preflight {
            if let Err(e) = self.preflight().await {
                self.state = RunState::Aborted;
                return Err(e);
            }
        }

        self.state = RunState::Running;
        info!(
            scenario = %self.name,
            base_url = %self.targets.base_url(),
            profile = %self.profile.describe(),
            "starting run"
        );

        let start = Instant::now();
        let total = self.profile.total_duration();
        let deadline = start + total;
        let target_vus = Arc::new(AtomicUsize::new(0));

        let ctx = Arc::new(VuContext {
            targets: Arc::clone(&self.targets),
            fetcher: Arc::clone(&self.fetcher),
            log: Arc::clone(&self.log),
            strategy: self.options.strategy.clone(),
            target_vus: Arc::clone(&target_vus),
            deadline,
            iteration_sleep: self.options.iteration_sleep,
            request_timeout: self.options.request_timeout,
            tick: self.options.tick,
        });

        let mut handles: Vec<JoinHandle<()>> = Vec::new();
        let mut current_stage = None;

        loop {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            let elapsed = now - start;

            let stage = self.profile.stage_index_at(elapsed);
            if stage != current_stage {
                if let Some(idx) = stage {
                    info!(scenario = %self.name, stage = idx, "entering stage");
                }
                current_stage = stage;
            }

            let desired = self.profile.target_vus_at(elapsed);
            target_vus.store(desired, Ordering::Relaxed);

            // VUs are never torn down; surplus ones park until needed again
            while handles.len() < desired {
                let vu_id = handles.len();
                let rng = match self.options.seed {
                    Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(vu_id as u64)),
                    None => StdRng::from_entropy(),
                };
                handles.push(tokio::spawn(run_vu(vu_id, Arc::clone(&ctx), rng)));
            }

            sleep_until((now + self.options.tick).min(deadline)).await;
        }

        target_vus.store(0, Ordering::Relaxed);

        // In-flight requests finish; no new iterations start past the deadline
        for handle in handles {
            if let Err(e) = handle.await {
                warn!(scenario = %self.name, error = %e, "virtual user task failed");
            }
        }

        let elapsed = start.elapsed();
        let outcomes = self.log.snapshot();
        let summary = RunSummary::from_outcomes(
            &outcomes,
            &self.thresholds.success_statuses,
            self.options.status_check,
            elapsed,
            self.log.peak_vus(),
        );
        let results = evaluate(&outcomes, &self.thresholds);
        let passed = all_passed(&results);

        self.state = RunState::Completed;
        info!(
            scenario = %self.name,
            requests = summary.total_requests,
            failed = summary.failed_requests,
            passed,
            "run completed"
        );

        Ok(RunReport {
            scenario: self.name.clone(),
            base_url: self.targets.base_url().to_string(),
            profile: self.profile.clone(),
            state: self.state,
            started_at,
            finished_at: Utc::now(),
            summary,
            thresholds: results,
            passed,
        })
    }

    async fn preflight(&self) -> Result<()> {
        let url = self.targets.url_for("");
        debug!(url = %url, "preflight request");

        let result = match timeout(self.options.request_timeout, self.fetcher.get(&url)).await {
            Ok(result) => result,
            Err(_) => Err(FetchError::Timeout),
        };

        match result {
            Ok(status) => {
                info!(url = %url, status, "preflight ok");
                Ok(())
            }
            Err(e) => Err(SiteloadError::Preflight {
                url,
                reason: e.to_string(),
            }),
        }
    }
}

/// One virtual user: pick, GET, record, sleep, until the deadline
async fn run_vu<F: Fetcher>(id: usize, ctx: Arc<VuContext<F>>, mut rng: StdRng) {
    let mut active = false;
    debug!(vu = id, "virtual user started");

    loop {
        if Instant::now() >= ctx.deadline {
            break;
        }

        if id >= ctx.target_vus.load(Ordering::Relaxed) {
            if active {
                ctx.log.vu_deactivated();
                active = false;
            }
            sleep(ctx.tick).await;
            continue;
        }

        if !active {
            ctx.log.vu_activated();
            active = true;
        }

        let path = ctx.targets.pick_path(&ctx.strategy, &mut rng).to_string();
        let url = ctx.targets.url_for(&path);

        ctx.log.request_started();
        let started = Instant::now();
        let result = match timeout(ctx.request_timeout, ctx.fetcher.get(&url)).await {
            Ok(result) => result,
            Err(_) => Err(FetchError::Timeout),
        };
        let elapsed = started.elapsed();
        ctx.log.request_finished();

        if let Err(ref e) = result {
            debug!(vu = id, url = %url, error = %e, "request failed");
        }
        ctx.log.record(RequestOutcome::from_result(&result, elapsed, path, id));

        sleep_until((Instant::now() + ctx.iteration_sleep).min(ctx.deadline)).await;
    }

    if active {
        ctx.log.vu_deactivated();
    }
    debug!(vu = id, "virtual user stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    struct AlwaysOk;

    impl Fetcher for AlwaysOk {
        async fn get(&self, _url: &str) -> std::result::Result<u16, FetchError> {
            sleep(Duration::from_millis(10)).await;
            Ok(200)
        }
    }

    struct Unreachable;

    impl Fetcher for Unreachable {
        async fn get(&self, _url: &str) -> std::result::Result<u16, FetchError> {
            Err(FetchError::Connect("connection refused".to_string()))
        }
    }

    fn targets() -> TargetConfig {
        TargetConfig::new("https://example.com", vec!["".to_string()]).unwrap()
    }

    fn short_profile() -> LoadProfile {
        LoadProfile::Constant {
            vus: 1,
            duration: Duration::from_secs(3),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_state_transitions_to_completed() {
        let mut runner = ScenarioRunner::new(
            "t",
            targets(),
            short_profile(),
            ThresholdSet::smoke(),
            RunOptions::default(),
            AlwaysOk,
        )
        .unwrap();
        assert_eq!(runner.state(), RunState::NotStarted);

        let report = runner.run().await.unwrap();
        assert_eq!(runner.state(), RunState::Completed);
        assert_eq!(report.state, RunState::Completed);
        assert!(report.passed);
        assert_eq!(report.summary.total_requests, 3);

        // A runner is single-use
        assert!(runner.run().await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_preflight_aborts() {
        let options = RunOptions {
            preflight: true,
            ..RunOptions::default()
        };
        let mut runner = ScenarioRunner::new(
            "t",
            targets(),
            short_profile(),
            ThresholdSet::smoke(),
            options,
            Unreachable,
        )
        .unwrap();

        let err = runner.run().await.unwrap_err();
        assert!(matches!(err, SiteloadError::Preflight { .. }));
        assert_eq!(runner.state(), RunState::Aborted);
        assert_eq!(runner.outcome_log().total_requests(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_network_errors_do_not_stop_the_run() {
        let mut runner = ScenarioRunner::new(
            "t",
            targets(),
            short_profile(),
            ThresholdSet::smoke(),
            RunOptions::default(),
            Unreachable,
        )
        .unwrap();

        let report = runner.run().await.unwrap();
        assert_eq!(report.state, RunState::Completed);
        assert_eq!(report.summary.total_requests, 3);
        assert_eq!(report.summary.failed_requests, 3);
        assert!(!report.passed);
    }

    #[test]
    fn test_invalid_profile_rejected() {
        let profile = LoadProfile::Ramping {
            start_vus: 0,
            stages: Vec::new(),
        };
        let result = ScenarioRunner::new(
            "t",
            targets(),
            profile,
            ThresholdSet::load(),
            RunOptions::default(),
            AlwaysOk,
        );
        assert!(result.is_err());
    }
}

//! Core library for siteload: smoke and load checks against a website's
//! page paths, with k6-style pass/fail thresholds.

pub mod config;
pub mod error;
pub mod fetcher;
pub mod outcome;
pub mod profile;
pub mod runner;
pub mod summary;
pub mod target;
pub mod threshold;

pub use config::{load_config, FileConfig, Mode, Overrides, Settings};
pub use error::{Result, SiteloadError};
pub use fetcher::{FetchError, Fetcher, HttpFetcher};
pub use outcome::{OutcomeLog, RequestOutcome};
pub use profile::{LoadProfile, Stage};
pub use runner::{RunOptions, RunReport, RunState, ScenarioRunner};
pub use summary::{LatencyStats, RunSummary};
pub use target::{PickStrategy, TargetConfig};
pub use threshold::{evaluate, Threshold, ThresholdResult, ThresholdSet};

//! Run configuration: built-in defaults, optional TOML file, CLI overrides

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SiteloadError};
use crate::outcome::DEFAULT_SUCCESS_STATUSES;
use crate::profile::{parse_duration, LoadProfile, Stage, SMOKE_DURATION, SMOKE_VUS};
use crate::runner::{RunOptions, DEFAULT_REQUEST_TIMEOUT};
use crate::target::{PickStrategy, TargetConfig, DEFAULT_BASE_URL, DEFAULT_PAGES};
use crate::threshold::ThresholdSet;

/// Which scenario to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Few VUs, root page only, tight latency bound
    Smoke,
    /// Ramping VUs over random sitemap pages
    Load,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Smoke => "smoke",
            Mode::Load => "load",
        }
    }
}

/// Contents of a `siteload.toml` file. Every field is optional; anything
/// left out falls back to the built-in defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paths: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub insecure_skip_tls_verify: Option<bool>,
    /// k6-style duration string, e.g. "60s"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_timeout: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub success_statuses: Option<Vec<u16>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub smoke: Option<SmokeSection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub load: Option<LoadSection>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SmokeSection {
    pub vus: Option<usize>,
    pub duration: Option<String>,
    /// Path requested on every iteration (default: the root page)
    pub path: Option<String>,
    pub thresholds: Option<BTreeMap<String, Vec<String>>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoadSection {
    pub start_vus: Option<usize>,
    pub stages: Option<Vec<Stage>>,
    pub thresholds: Option<BTreeMap<String, Vec<String>>>,
}

/// Load a config file from disk
pub fn load_config(path: &Path) -> Result<FileConfig> {
    if !path.exists() {
        return Err(SiteloadError::Config(format!(
            "config file not found: {}",
            path.display()
        )));
    }
    let content = std::fs::read_to_string(path)?;
    let config: FileConfig = toml::from_str(&content)?;
    Ok(config)
}

/// Values given on the command line or via environment
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub base_url: Option<String>,
    pub insecure_skip_tls_verify: bool,
    pub seed: Option<u64>,
    pub preflight: bool,
}

/// Fully resolved inputs for one run
#[derive(Debug, Clone)]
pub struct Settings {
    pub mode: Mode,
    pub targets: TargetConfig,
    pub profile: LoadProfile,
    pub thresholds: ThresholdSet,
    pub options: RunOptions,
    pub insecure_skip_tls_verify: bool,
}

impl Settings {
    /// Merge defaults, file and overrides (in increasing precedence) and
    /// validate the result.
    pub fn resolve(mode: Mode, file: Option<&FileConfig>, overrides: &Overrides) -> Result<Self> {
        let empty = FileConfig::default();
        let file = file.unwrap_or(&empty);

        let base_url = overrides
            .base_url
            .clone()
            .or_else(|| file.base_url.clone())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let paths = file
            .paths
            .clone()
            .unwrap_or_else(|| DEFAULT_PAGES.iter().map(|p| p.to_string()).collect());
        let targets = TargetConfig::new(base_url, paths)?;

        let request_timeout = match &file.request_timeout {
            Some(s) => parse_duration(s)?,
            None => DEFAULT_REQUEST_TIMEOUT,
        };
        if request_timeout.is_zero() {
            return Err(SiteloadError::Config("request_timeout must be positive".to_string()));
        }

        let success_statuses = file
            .success_statuses
            .clone()
            .unwrap_or_else(|| DEFAULT_SUCCESS_STATUSES.to_vec());
        if success_statuses.is_empty() {
            return Err(SiteloadError::Config("success_statuses must not be empty".to_string()));
        }

        let (profile, thresholds, strategy, status_check) = match mode {
            Mode::Smoke => {
                let section = file.smoke.clone().unwrap_or_default();
                let duration = match &section.duration {
                    Some(s) => parse_duration(s)?,
                    None => SMOKE_DURATION,
                };
                let profile = LoadProfile::Constant {
                    vus: section.vus.unwrap_or(SMOKE_VUS),
                    duration,
                };
                let thresholds = match &section.thresholds {
                    Some(map) => ThresholdSet::from_map(map)?,
                    None => ThresholdSet::smoke(),
                };
                let strategy = PickStrategy::Fixed(section.path.unwrap_or_default());
                (profile, thresholds, strategy, None)
            }
            Mode::Load => {
                let section = file.load.clone().unwrap_or_default();
                let profile = match (section.start_vus, section.stages) {
                    (None, None) => LoadProfile::load(),
                    (start_vus, stages) => LoadProfile::Ramping {
                        start_vus: start_vus.unwrap_or(0),
                        stages: stages.unwrap_or_else(LoadProfile::load_stages),
                    },
                };
                let thresholds = match &section.thresholds {
                    Some(map) => ThresholdSet::from_map(map)?,
                    None => ThresholdSet::load(),
                };
                (profile, thresholds, PickStrategy::RandomUniform, Some(200))
            }
        };
        profile.validate()?;

        let options = RunOptions {
            strategy,
            request_timeout,
            seed: overrides.seed,
            status_check,
            preflight: overrides.preflight,
            ..RunOptions::default()
        };

        Ok(Self {
            mode,
            targets,
            profile,
            thresholds: thresholds.with_success_statuses(success_statuses),
            options,
            insecure_skip_tls_verify: overrides.insecure_skip_tls_verify
                || file.insecure_skip_tls_verify.unwrap_or(false),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::threshold::{Aggregation, Metric};
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_match_site_scripts() {
        let smoke = Settings::resolve(Mode::Smoke, None, &Overrides::default()).unwrap();
        assert_eq!(smoke.targets.base_url(), DEFAULT_BASE_URL);
        assert_eq!(smoke.profile, LoadProfile::smoke());
        assert_eq!(smoke.options.strategy, PickStrategy::Fixed(String::new()));
        assert_eq!(smoke.options.status_check, None);
        assert_eq!(smoke.thresholds.thresholds[1].bound, 500.0);

        let load = Settings::resolve(Mode::Load, None, &Overrides::default()).unwrap();
        assert_eq!(load.profile, LoadProfile::load());
        assert_eq!(load.options.strategy, PickStrategy::RandomUniform);
        assert_eq!(load.options.status_check, Some(200));
        assert_eq!(load.thresholds.thresholds[1].bound, 1000.0);
        assert!(!load.insecure_skip_tls_verify);
    }

    #[test]
    fn test_override_beats_file() {
        let file = FileConfig {
            base_url: Some("https://staging.example.com".to_string()),
            ..FileConfig::default()
        };
        let overrides = Overrides {
            base_url: Some("https://localhost:8443".to_string()),
            insecure_skip_tls_verify: true,
            ..Overrides::default()
        };

        let settings = Settings::resolve(Mode::Smoke, Some(&file), &overrides).unwrap();
        assert_eq!(settings.targets.base_url(), "https://localhost:8443");
        assert!(settings.insecure_skip_tls_verify);

        let settings = Settings::resolve(Mode::Smoke, Some(&file), &Overrides::default()).unwrap();
        assert_eq!(settings.targets.base_url(), "https://staging.example.com");
    }

    #[test]
    fn test_empty_paths_in_file_is_config_error() {
        let file = FileConfig {
            paths: Some(Vec::new()),
            ..FileConfig::default()
        };
        let err = Settings::resolve(Mode::Load, Some(&file), &Overrides::default()).unwrap_err();
        assert!(matches!(err, SiteloadError::EmptyTargets));
        assert!(err.is_config_error());
    }

    #[test]
    fn test_load_toml_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("siteload.toml");
        std::fs::write(
            &path,
            r#"
base_url = "https://example.com"
paths = ["", "about-us"]
request_timeout = "30s"
success_statuses = [200, 304]

[smoke]
vus = 2
duration = "10s"

[load]
stages = [
    { duration = "5s", target = 10 },
    { duration = "5s", target = 0 },
]

[load.thresholds]
http_req_failed = ["rate < 0.05"]
http_req_duration = ["p(90) < 800", "max < 3000"]
"#,
        )
        .unwrap();

        let file = load_config(&path).unwrap();

        let smoke = Settings::resolve(Mode::Smoke, Some(&file), &Overrides::default()).unwrap();
        assert_eq!(
            smoke.profile,
            LoadProfile::Constant {
                vus: 2,
                duration: Duration::from_secs(10)
            }
        );
        assert_eq!(smoke.options.request_timeout, Duration::from_secs(30));
        assert_eq!(smoke.thresholds.success_statuses, vec![200, 304]);

        let load = Settings::resolve(Mode::Load, Some(&file), &Overrides::default()).unwrap();
        assert_eq!(load.targets.len(), 2);
        assert_eq!(load.profile.total_duration(), Duration::from_secs(10));
        assert_eq!(load.profile.max_vus(), 10);
        assert_eq!(load.thresholds.thresholds.len(), 3);
        assert!(load
            .thresholds
            .thresholds
            .iter()
            .any(|t| t.metric == Metric::HttpReqDuration && t.aggregation == Aggregation::Percentile(90.0)));
    }

    #[test]
    fn test_unknown_keys_rejected() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("bad.toml");
        std::fs::write(&path, "base_urll = \"https://example.com\"\n").unwrap();
        assert!(matches!(load_config(&path), Err(SiteloadError::TomlParse(_))));
    }

    #[test]
    fn test_missing_file() {
        let temp = TempDir::new().unwrap();
        let err = load_config(&temp.path().join("nope.toml")).unwrap_err();
        assert!(err.is_config_error());
    }

    #[test]
    fn test_bad_threshold_in_file() {
        let mut thresholds = BTreeMap::new();
        thresholds.insert("http_req_duration".to_string(), vec!["p95 < 10".to_string()]);
        let file = FileConfig {
            smoke: Some(SmokeSection {
                thresholds: Some(thresholds),
                ..SmokeSection::default()
            }),
            ..FileConfig::default()
        };
        let err = Settings::resolve(Mode::Smoke, Some(&file), &Overrides::default()).unwrap_err();
        assert!(matches!(err, SiteloadError::Threshold { .. }));
    }
}

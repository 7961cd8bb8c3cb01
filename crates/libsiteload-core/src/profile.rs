//! Load profile definitions

use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Result, SiteloadError};

/// VUs used by the smoke profile
pub const SMOKE_VUS: usize = 3;

/// Length of the smoke run
pub const SMOKE_DURATION: Duration = Duration::from_secs(60);

/// One ramp stage: over `duration`, move the VU count linearly to `target`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stage {
    #[serde(with = "serde_duration")]
    pub duration: Duration,
    pub target: usize,
}

impl Stage {
    pub fn new(duration: Duration, target: usize) -> Self {
        Self { duration, target }
    }
}

/// Virtual-user schedule for a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LoadProfile {
    /// Fixed number of VUs for a fixed duration
    Constant {
        vus: usize,
        #[serde(with = "serde_duration")]
        duration: Duration,
    },
    /// Linear ramps between stage targets, starting from `start_vus`
    Ramping {
        start_vus: usize,
        stages: Vec<Stage>,
    },
}

impl LoadProfile {
    /// Smoke profile: a handful of VUs hitting the site for a minute
    pub fn smoke() -> Self {
        LoadProfile::Constant {
            vus: SMOKE_VUS,
            duration: SMOKE_DURATION,
        }
    }

    /// Average-load profile: ramp to 50 VUs, hold, ramp down
    pub fn load() -> Self {
        LoadProfile::Ramping {
            start_vus: 0,
            stages: Self::load_stages(),
        }
    }

    /// Stages of the average-load profile
    pub fn load_stages() -> Vec<Stage> {
        vec![
            Stage::new(Duration::from_secs(15), 50),
            Stage::new(Duration::from_secs(30), 50),
            Stage::new(Duration::from_secs(15), 0),
        ]
    }

    /// Reject profiles that can never issue a request
    pub fn validate(&self) -> Result<()> {
        match self {
            LoadProfile::Constant { vus, duration } => {
                if *vus == 0 {
                    return Err(SiteloadError::Config("constant profile needs at least one VU".to_string()));
                }
                if duration.is_zero() {
                    return Err(SiteloadError::Config("constant profile duration must be positive".to_string()));
                }
            }
            LoadProfile::Ramping { stages, .. } => {
                if stages.is_empty() {
                    return Err(SiteloadError::Config("ramping profile has no stages".to_string()));
                }
                if self.total_duration().is_zero() {
                    return Err(SiteloadError::Config("ramping profile duration must be positive".to_string()));
                }
            }
        }
        Ok(())
    }

    /// Total wall-clock length of the run
    pub fn total_duration(&self) -> Duration {
        match self {
            LoadProfile::Constant { duration, .. } => *duration,
            LoadProfile::Ramping { stages, .. } => stages.iter().map(|s| s.duration).sum(),
        }
    }

    /// Largest VU count the schedule ever asks for
    pub fn max_vus(&self) -> usize {
        match self {
            LoadProfile::Constant { vus, .. } => *vus,
            LoadProfile::Ramping { start_vus, stages } => stages
                .iter()
                .map(|s| s.target)
                .fold(*start_vus, usize::max),
        }
    }

    /// Target VU count at `elapsed` since the run started.
    ///
    /// Past the end of the schedule this returns 0.
    pub fn target_vus_at(&self, elapsed: Duration) -> usize {
        match self {
            LoadProfile::Constant { vus, duration } => {
                if elapsed < *duration {
                    *vus
                } else {
                    0
                }
            }
            LoadProfile::Ramping { start_vus, stages } => {
                let mut from = *start_vus;
                let mut stage_start = Duration::ZERO;

                for stage in stages {
                    let stage_end = stage_start + stage.duration;
                    if elapsed < stage_end {
                        let into = (elapsed - stage_start).as_secs_f64();
                        let frac = into / stage.duration.as_secs_f64();
                        let vus = from as f64 + (stage.target as f64 - from as f64) * frac;
                        return vus.round().max(0.0) as usize;
                    }
                    from = stage.target;
                    stage_start = stage_end;
                }

                0
            }
        }
    }

    /// Index of the stage active at `elapsed`, if any
    pub fn stage_index_at(&self, elapsed: Duration) -> Option<usize> {
        match self {
            LoadProfile::Constant { duration, .. } => (elapsed < *duration).then_some(0),
            LoadProfile::Ramping { stages, .. } => {
                let mut end = Duration::ZERO;
                for (idx, stage) in stages.iter().enumerate() {
                    end += stage.duration;
                    if elapsed < end {
                        return Some(idx);
                    }
                }
                None
            }
        }
    }

    /// Short human description, e.g. "3 VUs for 1m0s"
    pub fn describe(&self) -> String {
        match self {
            LoadProfile::Constant { vus, duration } => {
                format!("{} VUs for {}", vus, format_duration(*duration))
            }
            LoadProfile::Ramping { start_vus, stages } => {
                let mut parts = vec![format!("start {}", start_vus)];
                for stage in stages {
                    parts.push(format!("{}->{}", format_duration(stage.duration), stage.target));
                }
                parts.join(", ")
            }
        }
    }
}

/// Parse a k6-style duration string: `500ms`, `15s`, `1m`, `1m30s`, `2h`.
/// A bare number is taken as seconds.
pub fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim();
    if s.is_empty() {
        return Err(SiteloadError::Duration(s.to_string()));
    }

    if let Ok(secs) = s.parse::<f64>() {
        return Duration::try_from_secs_f64(secs)
            .map_err(|_| SiteloadError::Duration(s.to_string()));
    }

    let mut total = Duration::ZERO;
    let mut rest = s;
    while !rest.is_empty() {
        let num_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .ok_or_else(|| SiteloadError::Duration(s.to_string()))?;
        if num_len == 0 {
            return Err(SiteloadError::Duration(s.to_string()));
        }
        let value: f64 = rest[..num_len]
            .parse()
            .map_err(|_| SiteloadError::Duration(s.to_string()))?;
        rest = &rest[num_len..];

        let unit_len = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let millis_per_unit = match &rest[..unit_len] {
            "ms" => 1.0,
            "s" => 1_000.0,
            "m" => 60_000.0,
            "h" => 3_600_000.0,
            _ => return Err(SiteloadError::Duration(s.to_string())),
        };
        rest = &rest[unit_len..];

        let part = Duration::try_from_secs_f64(value * millis_per_unit / 1000.0)
            .map_err(|_| SiteloadError::Duration(s.to_string()))?;
        total = total
            .checked_add(part)
            .ok_or_else(|| SiteloadError::Duration(s.to_string()))?;
    }

    Ok(total)
}

/// Render a duration the way k6 prints it: `1m30s`, `15s`, `250ms`
pub fn format_duration(d: Duration) -> String {
    let total_ms = d.as_millis();
    if total_ms < 1000 {
        return format!("{}ms", total_ms);
    }

    let secs = d.as_secs();
    let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    let mut out = String::new();
    if h > 0 {
        out.push_str(&format!("{}h", h));
    }
    if h > 0 || m > 0 {
        out.push_str(&format!("{}m", m));
    }
    out.push_str(&format!("{}s", s));
    out
}

/// Serialize durations as k6-style strings, accept strings or plain seconds
pub(crate) mod serde_duration {
    use super::*;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        format_duration(*duration).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> std::result::Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Secs(f64),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Text(s) => parse_duration(&s).map_err(serde::de::Error::custom),
            Raw::Secs(secs) => Duration::try_from_secs_f64(secs)
                .map_err(|_| serde::de::Error::custom(format!("invalid duration {}", secs))),
        }
    }
}

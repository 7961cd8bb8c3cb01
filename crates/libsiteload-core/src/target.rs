//! Target registry: the site's base URL and the page paths to exercise

use rand::Rng;
use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SiteloadError};

/// Site exercised when no override is given
pub const DEFAULT_BASE_URL: &str = "https://projetoumportodostodosporum.org";

/// Page paths taken from the site's sitemap.xml.
///
/// The duplicate entry mirrors the sitemap and is kept so the random
/// distribution matches it.
pub const DEFAULT_PAGES: &[&str] = &[
    "", // main page
    "about-us",
    "about-us/authors-credentials",
    "about-us/authors-credentials",
    "about-us/authors-management",
    "about-us/meet-the-author",
    "about-us/services",
    "about-us/talking-about-the-project",
    "fields",
    "fields/churches-in-unity",
    "fields/collaborators",
    "fields/collected-offers",
    "fields/offeror-families",
    "fields/offeror-families/all",
    "fields/offeror-families/specific",
    "fields/recovery-houses",
    "fields/reports",
    "fields/volunteers",
    "fields/welcomed-families",
    "how-to-participate",
    "how-to-participate/administrative-documents",
    "how-to-participate/as-autonomous-collaborator",
    "how-to-participate/as-church-in-unity",
    "how-to-participate/as-recovery-house",
    "how-to-participate/as-volunteer-family",
];

/// How a virtual user chooses the path for its next request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PickStrategy {
    /// Uniformly random index into the path list, independent per call
    RandomUniform,
    /// Always the same path
    Fixed(String),
}

impl PickStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            PickStrategy::RandomUniform => "random_uniform",
            PickStrategy::Fixed(_) => "fixed",
        }
    }
}

/// Base URL plus ordered page paths. Validated on construction and
/// read-only afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TargetConfig {
    base_url: String,
    paths: Vec<String>,
}

impl TargetConfig {
    /// Build a registry, failing fast on an empty path list or a base URL
    /// that is not an absolute http(s) URL.
    pub fn new(base_url: impl Into<String>, paths: Vec<String>) -> Result<Self> {
        let base_url = base_url.into();
        validate_base_url(&base_url)?;

        if paths.is_empty() {
            return Err(SiteloadError::EmptyTargets);
        }

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            paths,
        })
    }

    /// The built-in site and sitemap paths, optionally pointed at another host
    pub fn site_default(base_url: Option<&str>) -> Result<Self> {
        let paths = DEFAULT_PAGES.iter().map(|p| p.to_string()).collect();
        Self::new(base_url.unwrap_or(DEFAULT_BASE_URL), paths)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn paths(&self) -> &[String] {
        &self.paths
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Pick the path for one iteration
    pub fn pick_path<'a, R: Rng + ?Sized>(&'a self, strategy: &'a PickStrategy, rng: &mut R) -> &'a str {
        match strategy {
            PickStrategy::RandomUniform => {
                let idx = rng.gen_range(0..self.paths.len());
                &self.paths[idx]
            }
            PickStrategy::Fixed(path) => path,
        }
    }

    /// Full URL for a relative path: `base_url + "/" + path`
    pub fn url_for(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

fn validate_base_url(base_url: &str) -> Result<()> {
    let invalid = |reason: &str| SiteloadError::InvalidUrl {
        url: base_url.to_string(),
        reason: reason.to_string(),
    };

    let url = Url::parse(base_url).map_err(|e| invalid(&e.to_string()))?;
    match url.scheme() {
        "http" | "https" => {}
        other => return Err(invalid(&format!("unsupported scheme '{}'", other))),
    }
    if url.host_str().is_none() {
        return Err(invalid("missing host"));
    }
    Ok(())
}

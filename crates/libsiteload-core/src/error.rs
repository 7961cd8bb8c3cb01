use thiserror::Error;

/// Main error type for siteload operations.
///
/// Only startup problems surface as `SiteloadError`; failures of individual
/// requests are recorded as outcomes (see [`crate::fetcher::FetchError`]).
#[derive(Debug, Error)]
pub enum SiteloadError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("invalid base URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("target path list is empty")]
    EmptyTargets,

    #[error("invalid threshold '{expr}': {reason}")]
    Threshold { expr: String, reason: String },

    #[error("invalid duration '{0}'")]
    Duration(String),

    #[error("preflight request to {url} failed: {reason}")]
    Preflight { url: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
}

impl SiteloadError {
    /// Stable machine-readable code for the error
    pub fn error_code(&self) -> &'static str {
        match self {
            SiteloadError::Config(_) => "invalid_config",
            SiteloadError::InvalidUrl { .. } => "invalid_url",
            SiteloadError::EmptyTargets => "empty_targets",
            SiteloadError::Threshold { .. } => "invalid_threshold",
            SiteloadError::Duration(_) => "invalid_duration",
            SiteloadError::Preflight { .. } => "preflight_failed",
            SiteloadError::Io(_) => "io_error",
            SiteloadError::TomlParse(_) => "invalid_config",
            SiteloadError::Json(_) => "internal_error",
            SiteloadError::Http(_) => "http_client_error",
        }
    }

    /// Whether the error is a configuration problem detected before the run
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            SiteloadError::Config(_)
                | SiteloadError::InvalidUrl { .. }
                | SiteloadError::EmptyTargets
                | SiteloadError::Threshold { .. }
                | SiteloadError::Duration(_)
                | SiteloadError::Preflight { .. }
                | SiteloadError::TomlParse(_)
        )
    }

    /// Process exit code for the CLI
    pub fn exit_code(&self) -> i32 {
        if self.is_config_error() {
            2
        } else {
            1
        }
    }
}

pub type Result<T> = std::result::Result<T, SiteloadError>;

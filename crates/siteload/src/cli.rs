use std::path::PathBuf;

use clap::builder::BoolishValueParser;
use clap::{Parser, Subcommand};
use libsiteload_core::{Mode, Overrides};

#[derive(Parser, Debug)]
#[command(name = "siteload")]
#[command(about = "Smoke and load checks for a website with pass/fail thresholds")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Base URL of the site under test
    #[arg(long, env = "BASE_URL", global = true)]
    pub base_url: Option<String>,

    /// Accept self-signed or otherwise invalid TLS certificates
    #[arg(
        long,
        env = "INSECURE_SKIP_TLS_VERIFY",
        global = true,
        value_parser = BoolishValueParser::new()
    )]
    pub insecure_skip_tls_verify: bool,

    /// TOML file overriding paths, profiles and thresholds
    #[arg(short = 'c', long, global = true)]
    pub config: Option<PathBuf>,

    /// Write the full run report as JSON to this file
    #[arg(short = 'j', long, global = true)]
    pub json_report: Option<PathBuf>,

    /// Seed for path selection (random when omitted)
    #[arg(long, global = true)]
    pub seed: Option<u64>,

    /// GET the base URL once before starting and abort if it is unreachable
    #[arg(long, global = true)]
    pub preflight: bool,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(long, default_value = "info", global = true)]
    pub log_level: String,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// A few VUs requesting the home page for a minute
    Smoke,
    /// Ramp to 50 VUs over random sitemap pages, hold, ramp down
    Load,
}

impl Cli {
    pub fn mode(&self) -> Mode {
        match self.command {
            Command::Smoke => Mode::Smoke,
            Command::Load => Mode::Load,
        }
    }

    pub fn overrides(&self) -> Overrides {
        Overrides {
            base_url: self.base_url.clone(),
            insecure_skip_tls_verify: self.insecure_skip_tls_verify,
            seed: self.seed,
            preflight: self.preflight,
        }
    }
}

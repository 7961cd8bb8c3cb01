//! siteload - smoke and load checks for a website
//!
//! `siteload smoke` keeps a few virtual users on the home page;
//! `siteload load` ramps virtual users over random sitemap pages. Both exit
//! non-zero when a threshold is crossed.

mod cli;
mod output;

use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use cli::Cli;
use libsiteload_core::{load_config, HttpFetcher, ScenarioRunner, Settings, SiteloadError};

/// Exit code when the run completed but a threshold failed
const THRESHOLDS_CROSSED_EXIT: i32 = 99;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Logs go to stderr so stdout carries only the summary
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cli.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let code = match run(&cli).await {
        Ok(true) => 0,
        Ok(false) => THRESHOLDS_CROSSED_EXIT,
        Err(e) => {
            output::output_error(&e);
            e.exit_code()
        }
    };

    std::process::exit(code);
}

/// Returns whether every threshold passed
async fn run(cli: &Cli) -> Result<bool, SiteloadError> {
    let file = match cli.config {
        Some(ref path) => Some(load_config(path)?),
        None => None,
    };

    let mode = cli.mode();
    let settings = Settings::resolve(mode, file.as_ref(), &cli.overrides())?;
    let fetcher = HttpFetcher::new(
        settings.options.request_timeout,
        settings.insecure_skip_tls_verify,
    )?;

    info!(
        mode = mode.as_str(),
        paths = settings.targets.len(),
        insecure = settings.insecure_skip_tls_verify,
        "configuration resolved"
    );

    let mut runner = ScenarioRunner::new(
        mode.as_str(),
        settings.targets,
        settings.profile,
        settings.thresholds,
        settings.options,
        fetcher,
    )?;
    let report = runner.run().await?;

    output::print_summary(&report);

    if let Some(ref path) = cli.json_report {
        output::write_json_report(path, &report)?;
        println!("Report saved to {}", path.display());
    }

    Ok(report.passed)
}

//! Human-readable run summary and report files

use std::path::Path;

use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, Color, ContentArrangement, Table};
use libsiteload_core::{RunReport, SiteloadError, ThresholdResult};

/// Print the end-of-run summary to stdout
pub fn print_summary(report: &RunReport) {
    let summary = &report.summary;

    println!();
    println!("=== SITELOAD {} RESULTS ===", report.scenario.to_uppercase());
    println!();
    println!("Target:        {}", report.base_url);
    println!("Profile:       {}", report.profile.describe());
    println!("State:         {}", report.state.as_str());
    println!("Started:       {}", report.started_at.format("%Y/%m/%d %H:%M:%S UTC"));
    println!("Elapsed:       {:.2}s", summary.elapsed.as_secs_f64());
    println!("Peak VUs:      {}", summary.peak_vus);
    println!();
    println!("Requests:      {}", summary.total_requests);
    println!("Successful:    {}", summary.successful_requests);
    println!(
        "Failed:        {} ({:.2}%)",
        summary.failed_requests,
        summary.failure_rate * 100.0
    );
    println!("Requests/sec:  {:.2}", summary.requests_per_sec);

    if let Some(ref checks) = summary.checks {
        println!(
            "Checks:        '{}' {:.2}% ({} passed, {} failed)",
            checks.name,
            checks.pass_rate() * 100.0,
            checks.passed,
            checks.failed
        );
    }

    println!();
    match summary.latency {
        Some(ref latency) => {
            println!(
                "Latency:       min={:.2}ms avg={:.2}ms med={:.2}ms p90={:.2}ms p95={:.2}ms max={:.2}ms",
                latency.min_ms,
                latency.avg_ms,
                latency.med_ms,
                latency.p90_ms,
                latency.p95_ms,
                latency.max_ms
            );
        }
        None => println!("Latency:       no requests recorded"),
    }

    if !summary.status_counts.is_empty() {
        println!();
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .set_content_arrangement(ContentArrangement::Dynamic)
            .set_header(vec!["Status", "Count"]);
        for (status, count) in &summary.status_counts {
            table.add_row(vec![Cell::new(status), Cell::new(count)]);
        }
        println!("{table}");
    }

    println!();
    println!("{}", thresholds_table(&report.thresholds));
    println!();
    if report.passed {
        println!("All thresholds passed");
    } else {
        let failed = report.thresholds.iter().filter(|r| !r.passed).count();
        println!("{} threshold(s) crossed", failed);
    }
}

fn thresholds_table(results: &[ThresholdResult]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["Metric", "Threshold", "Observed", "Result"]);

    for result in results {
        let observed = match result.observed {
            Some(value) => format!("{:.4}", value),
            None => "n/a".to_string(),
        };
        let verdict = if result.passed {
            Cell::new("PASS").fg(Color::Green)
        } else {
            Cell::new("FAIL").fg(Color::Red)
        };
        table.add_row(vec![
            Cell::new(result.threshold.metric.as_str()),
            Cell::new(result.threshold.expr()),
            Cell::new(observed),
            verdict,
        ]);
    }

    table
}

/// Write the report as pretty JSON
pub fn write_json_report(path: &Path, report: &RunReport) -> Result<(), SiteloadError> {
    let content = serde_json::to_string_pretty(report)?;
    std::fs::write(path, content)?;
    Ok(())
}

/// Single diagnostic line for a fatal error
pub fn output_error(err: &SiteloadError) {
    eprintln!("error [{}]: {}", err.error_code(), err);
}

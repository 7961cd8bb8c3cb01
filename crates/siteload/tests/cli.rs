//! CLI tests for siteload against a throwaway local HTTP responder

use std::io::{Read, Write};
use std::net::TcpListener;
use std::path::PathBuf;
use std::thread;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// Serve every request with `status_line` until the test process exits.
/// Returns the base URL.
fn spawn_server(status_line: &'static str) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(mut stream) = stream else { continue };
            thread::spawn(move || {
                let mut buf = [0u8; 4096];
                let _ = stream.read(&mut buf);
                let body = "ok";
                let response = format!(
                    "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status_line,
                    body.len(),
                    body
                );
                let _ = stream.write_all(response.as_bytes());
            });
        }
    });

    format!("http://{}", addr)
}

/// Short smoke profile so tests finish in a couple of seconds
fn short_config(dir: &TempDir, extra: &str) -> PathBuf {
    let path = dir.path().join("siteload.toml");
    std::fs::write(
        &path,
        format!(
            "paths = [\"\", \"about-us\"]\n{}\n[smoke]\nvus = 2\nduration = \"2s\"\n",
            extra
        ),
    )
    .unwrap();
    path
}

fn siteload() -> Command {
    let mut cmd = Command::cargo_bin("siteload").unwrap();
    cmd.env_remove("RUST_LOG")
        .env_remove("BASE_URL")
        .env_remove("INSECURE_SKIP_TLS_VERIFY");
    cmd
}

#[test]
fn test_smoke_passes_against_healthy_site() {
    let base_url = spawn_server("200 OK");
    let dir = TempDir::new().unwrap();
    let config = short_config(&dir, "");

    siteload()
        .args(["smoke", "--base-url", &base_url, "--config"])
        .arg(&config)
        .assert()
        .success()
        .stdout(predicate::str::contains("Requests:      4"))
        .stdout(predicate::str::contains("PASS"))
        .stdout(predicate::str::contains("All thresholds passed"));
}

#[test]
fn test_smoke_fails_with_threshold_exit_code() {
    let base_url = spawn_server("500 Internal Server Error");
    let dir = TempDir::new().unwrap();
    let config = short_config(&dir, "");

    siteload()
        .args(["smoke", "--base-url", &base_url, "--config"])
        .arg(&config)
        .assert()
        .code(99)
        .stdout(predicate::str::contains("FAIL"))
        .stdout(predicate::str::contains("threshold(s) crossed"));
}

#[test]
fn test_base_url_from_environment() {
    let base_url = spawn_server("200 OK");
    let dir = TempDir::new().unwrap();
    let config = short_config(&dir, "");

    siteload()
        .env("BASE_URL", &base_url)
        .args(["smoke", "--config"])
        .arg(&config)
        .assert()
        .success()
        .stdout(predicate::str::contains(base_url.as_str()));
}

#[test]
fn test_json_report_written() {
    let base_url = spawn_server("200 OK");
    let dir = TempDir::new().unwrap();
    let config = short_config(&dir, "");
    let report_path = dir.path().join("report.json");

    siteload()
        .args(["smoke", "--base-url", &base_url, "--config"])
        .arg(&config)
        .arg("--json-report")
        .arg(&report_path)
        .assert()
        .success();

    let content = std::fs::read_to_string(&report_path).unwrap();
    let report: serde_json::Value = serde_json::from_str(&content).unwrap();
    assert_eq!(report["passed"], serde_json::Value::Bool(true));
    assert_eq!(report["state"], "completed");
    assert_eq!(report["summary"]["total_requests"], 4);
}

#[test]
fn test_malformed_base_url_is_fatal() {
    siteload()
        .args(["smoke", "--base-url", "not a url"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("invalid_url"));
}

#[test]
fn test_empty_path_list_is_fatal() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("empty.toml");
    std::fs::write(&path, "paths = []\n").unwrap();

    siteload()
        .args(["load", "--config"])
        .arg(&path)
        .assert()
        .code(2)
        .stderr(predicate::str::contains("empty"))
        .stdout(predicate::str::is_empty());
}

#[test]
fn test_preflight_against_closed_port_aborts() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let dir = TempDir::new().unwrap();
    let config = short_config(&dir, "request_timeout = \"2s\"");

    siteload()
        .args(["smoke", "--preflight", "--config"])
        .arg(&config)
        .args(["--base-url", &format!("http://127.0.0.1:{}", port)])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("preflight_failed"));
}

#[test]
fn test_out_of_range_duration_is_fatal() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("huge.toml");
    std::fs::write(&path, "[smoke]\nduration = \"99999999999999999999h\"\n").unwrap();

    siteload()
        .args(["smoke", "--config"])
        .arg(&path)
        .assert()
        .code(2)
        .stderr(predicate::str::contains("invalid_duration"))
        .stderr(predicate::str::contains("panicked").not());
}

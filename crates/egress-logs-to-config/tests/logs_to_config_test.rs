//! Runs the `logs-to-config` binary against log files on disk

use egress_config::{AllowlistDocument, GENERATED_HEADER};
use std::fs;
use std::process::Command;
use tempfile::TempDir;

const DISCOVERY_LOG: &str = r#"{"timestamp":"2024-01-15T10:30:00Z","level":"INFO","event":"proxy_starting","message":"Proxy starting on 127.0.0.1:9091 (mode=discovery, allowlist_entries=1)"}
{"timestamp":"2024-01-15T10:30:01Z","level":"INFO","event":"connection_attempt","destination":"registry.npmjs.org:443","action":"allowed_discovery"}
{"timestamp":"2024-01-15T10:30:02Z","level":"INFO","event":"connection_attempt","destination":"github.com:443","action":"allowed_discovery"}
{"timestamp":"2024-01-15T10:30:03Z","level":"INFO","event":"connection_closed","destination":"github.com:443"}
{"timestamp":"2024-01-15T10:30:04Z","level":"INFO","event":"connection_attempt","destination":"registry.npmjs.org:443","action":"allowed_discovery"}
garbage line
"#;

fn logs_to_config() -> Command {
    Command::new(env!("CARGO_BIN_EXE_logs-to-config"))
}

#[test]
fn test_generates_allowlist_from_log() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("discovery.jsonl");
    let output = dir.path().join("allowlist.yaml");
    fs::write(&input, DISCOVERY_LOG).unwrap();

    let result = logs_to_config()
        .arg("--input")
        .arg(&input)
        .arg("--output")
        .arg(&output)
        .output()
        .unwrap();
    assert!(result.status.success());

    let stdout = String::from_utf8_lossy(&result.stdout);
    assert!(stdout.contains("with 2 unique destinations"));
    assert!(stdout.contains("  - github.com:443"));

    let written = fs::read_to_string(&output).unwrap();
    assert!(written.starts_with(GENERATED_HEADER));

    let document = AllowlistDocument::parse(&written).unwrap();
    assert_eq!(
        document.allowlist,
        vec!["github.com:443", "registry.npmjs.org:443"]
    );

    // The generated file is directly usable as proxy configuration
    let index = document.into_index().unwrap();
    assert!(index.is_admitted("github.com:443"));
    assert!(!index.is_admitted("github.com:80"));
}

#[test]
fn test_missing_input_file_fails() {
    let dir = TempDir::new().unwrap();
    let output = dir.path().join("allowlist.yaml");

    let result = logs_to_config()
        .arg("--input")
        .arg(dir.path().join("nope.jsonl"))
        .arg("--output")
        .arg(&output)
        .output()
        .unwrap();

    assert!(!result.status.success());
    assert!(String::from_utf8_lossy(&result.stderr).contains("Failed to open input file"));
    assert!(!output.exists());
}

#[test]
fn test_input_flag_is_required() {
    let result = logs_to_config().output().unwrap();
    assert!(!result.status.success());
}

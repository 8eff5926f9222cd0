use std::path::PathBuf;
use std::process::Command;

fn main() {
    // Get git commit hash
    let git_hash = Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .output()
        .ok()
        .and_then(|output| String::from_utf8(output.stdout).ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "unknown".to_string());

    // Get git tag (version)
    let git_tag = Command::new("git")
        .args(["describe", "--tags", "--abbrev=0"])
        .output()
        .ok()
        .and_then(|output| String::from_utf8(output.stdout).ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| env!("CARGO_PKG_VERSION").to_string());

    let build_time = chrono::Utc::now().to_rfc3339();

    println!("cargo:rustc-env=GIT_HASH={}", git_hash);
    println!("cargo:rustc-env=GIT_TAG={}", git_tag);
    println!("cargo:rustc-env=BUILD_TIME={}", build_time);

    // Allowlist and mode are fixed at build time
    let manifest_dir = PathBuf::from(std::env::var("CARGO_MANIFEST_DIR").unwrap());
    let allowlist = std::env::var("EGRESS_ALLOWLIST")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("allowlist.yaml"));
    let allowlist = if allowlist.is_absolute() {
        allowlist
    } else {
        manifest_dir.join(allowlist)
    };

    let content = std::fs::read_to_string(&allowlist)
        .unwrap_or_else(|e| panic!("Failed to read allowlist {}: {}", allowlist.display(), e));
    let out_dir = PathBuf::from(std::env::var("OUT_DIR").unwrap());
    std::fs::write(out_dir.join("allowlist.yaml"), content).unwrap();

    let mode = match std::env::var("EGRESS_DISCOVERY_MODE").as_deref() {
        Ok("true") => "discovery",
        _ => "restricted",
    };
    println!("cargo:rustc-env=EGRESS_BUILD_MODE={}", mode);

    println!("cargo:rerun-if-changed={}", allowlist.display());
    println!("cargo:rerun-if-env-changed=EGRESS_ALLOWLIST");
    println!("cargo:rerun-if-env-changed=EGRESS_DISCOVERY_MODE");

    // Rebuild if git state changes
    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/refs");
}

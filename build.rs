//! Build script for revq - generates version information.
//!
//! Prefers `git describe --tags --always --dirty`; when no tags exist (or
//! git is unavailable) falls back to a pseudo-version built from the
//! Cargo.toml version, a timestamp, and the short commit hash.

use std::{env, process::Command};

use chrono::Utc;

fn main() {
    ["src", "build.rs", "Cargo.toml", "Cargo.lock"]
        .iter()
        .for_each(|path| println!("cargo:rerun-if-changed={path}"));

    let build_info = generate_human_readable_version();
    println!("cargo:rustc-env=BUILD_INFO_HUMAN={build_info}");
}

/// Executes a git command and returns the trimmed stdout as a String.
fn git_command(args: &[&str]) -> Option<String> {
    Command::new("git")
        .args(args)
        .output()
        .ok()
        .filter(|output| output.status.success())
        .and_then(|output| String::from_utf8(output.stdout).ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn get_rustc_version() -> Option<String> {
    Command::new("rustc")
        .arg("--version")
        .output()
        .ok()
        .and_then(|output| String::from_utf8(output.stdout).ok())
        .map(|s| s.trim().to_string())
}

fn get_git_version() -> Option<String> {
    git_command(&["describe", "--tags", "--always", "--dirty"])
        .map(|desc| {
            // A bare hash means no tags exist; use the pseudo-version
            // instead.
            if !desc.contains('v') && !desc.contains("-g") {
                generate_pseudo_version()
            } else {
                desc
            }
        })
        .or_else(|| Some(generate_pseudo_version()))
}

/// v{version}-<timestamp>-<commit>[+dirty], usable when no tag is reachable.
fn generate_pseudo_version() -> String {
    let commit_hash =
        git_command(&["rev-parse", "--short=12", "HEAD"]).unwrap_or_else(|| "unknown".to_string());

    let is_dirty = git_command(&["status", "--porcelain"]).map(|out| !out.is_empty());

    // Clean builds get the deterministic commit timestamp; dirty builds get
    // the build timestamp.
    let timestamp = match is_dirty {
        Some(false) => git_command(&["log", "-1", "--format=%ct"])
            .and_then(|s| s.parse::<i64>().ok())
            .and_then(|ts| chrono::DateTime::from_timestamp(ts, 0))
            .map(|dt| dt.format("%Y%m%d%H%M%S").to_string())
            .unwrap_or_else(|| Utc::now().format("%Y%m%d%H%M%S").to_string()),
        _ => Utc::now().format("%Y%m%d%H%M%S").to_string(),
    };

    let dirty_suffix = if is_dirty == Some(true) { "+dirty" } else { "" };
    let version = env!("CARGO_PKG_VERSION");

    format!("v{version}-{timestamp}-{commit_hash}{dirty_suffix}")
}

fn generate_human_readable_version() -> String {
    let components = [
        Some(env!("CARGO_PKG_VERSION").to_string()),
        get_git_version().map(|v| format!("({v})")),
        get_rustc_version(),
    ]
    .into_iter()
    .flatten()
    .collect::<Vec<_>>();

    components.join(" ")
}

//! Build script for glidergun
//!
//! Exposes `GIT_HASH` and `BUILD_TIME` to `utils::version_info`.

use std::process::Command;

use chrono::Utc;

fn git_hash() -> Option<String> {
    let output = Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .output()
        .ok()?;

    if !output.status.success() {
        return None;
    }

    let hash = String::from_utf8(output.stdout).ok()?;
    Some(hash.trim().to_string()).filter(|h| !h.is_empty())
}

fn main() {
    let hash = git_hash().unwrap_or_else(|| "unknown".to_string());
    let built = Utc::now().to_rfc3339();

    println!("cargo:rustc-env=GIT_HASH={}", hash);
    println!("cargo:rustc-env=BUILD_TIME={}", built);
    println!("cargo:rerun-if-changed=../.git/HEAD");
    println!("cargo:rerun-if-changed=build.rs");
}

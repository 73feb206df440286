use std::process::Command;

/// CI and container builds usually have no `.git`; they pass the commit in.
const COMMIT_ENV_VARS: &[&str] = &["KEYWORD_PULSE_COMMIT", "GITHUB_SHA", "SOURCE_COMMIT_SHA"];

fn commit_from_env() -> Option<String> {
    COMMIT_ENV_VARS
        .iter()
        .filter_map(|name| std::env::var(name).ok())
        .map(|value| value.trim().to_string())
        .find(|value| !value.is_empty())
}

fn commit_from_git() -> Option<String> {
    let output = Command::new("git").args(["rev-parse", "HEAD"]).output().ok()?;
    output
        .status
        .success()
        .then(|| String::from_utf8_lossy(&output.stdout).trim().to_string())
}

fn main() {
    let hash = commit_from_env()
        .or_else(commit_from_git)
        .unwrap_or_else(|| "unknown".to_string());
    let short = hash.get(..7).unwrap_or(&hash);

    println!("cargo:rustc-env=GIT_COMMIT_HASH={hash}");
    println!("cargo:rustc-env=GIT_COMMIT_SHORT={short}");
    for name in COMMIT_ENV_VARS {
        println!("cargo:rerun-if-env-changed={name}");
    }

    if std::path::Path::new(".git/HEAD").exists() {
        println!("cargo:rerun-if-changed=.git/HEAD");
        println!("cargo:rerun-if-changed=.git/refs/heads");
    }
}

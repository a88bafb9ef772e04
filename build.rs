use std::process::Command;

/// Short hash of the checked-out commit, reported by the home endpoint.
fn commit_hash() -> Option<String> {
    let output = Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .output()
        .ok()
        .filter(|output| output.status.success())?;
    let hash = String::from_utf8(output.stdout).ok()?;
    let hash = hash.trim();
    (!hash.is_empty()).then(|| hash.to_string())
}

fn main() {
    let hash = commit_hash().unwrap_or_else(|| "unknown".into());
    println!("cargo:rustc-env=GIT_HASH={hash}");

    for watched in [".git/HEAD", ".git/refs/heads/"] {
        println!("cargo:rerun-if-changed={watched}");
    }
}

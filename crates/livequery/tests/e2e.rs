// SPDX-FileCopyrightText: 2026 Livequery Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Runs the compiled binary.

use std::process::Command;

fn livequery() -> Command {
    Command::new(env!("CARGO_BIN_EXE_livequery"))
}

#[test]
fn check_config_accepts_valid_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("livequery.toml");
    std::fs::write(
        &path,
        r#"
log_level = "debug"

[gateway]
port = 9099

[gateway.bearer_tokens]
s3cret = "alice"
"#,
    )
    .unwrap();

    let output = livequery()
        .args(["check-config", "--config"])
        .arg(&path)
        .output()
        .unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("config OK"));
    assert!(stdout.contains("9099"));
    assert!(stdout.contains("viewers=1"));
    assert!(!stdout.contains("s3cret"));
}

#[test]
fn check_config_rejects_unknown_keys() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("livequery.toml");
    std::fs::write(&path, "[campaign]\nheartbeat_intervl_secs = 5\n").unwrap();

    let output = livequery()
        .args(["check-config", "--config"])
        .arg(&path)
        .output()
        .unwrap();
    assert!(!output.status.success());
}

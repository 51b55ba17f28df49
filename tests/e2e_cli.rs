//! End-to-end CLI tests that do not require ffmpeg.

use assert_cmd::Command;
use predicates::prelude::*;
use std::path::Path;

fn write_config(dir: &Path, body: &str) -> std::path::PathBuf {
    let path = dir.join("encsweep.toml");
    std::fs::write(&path, body).unwrap();
    path
}

fn base_config(root: &Path) -> String {
    format!(
        r#"
[paths]
videos = "{root}/videos"
cache = "{root}/cache"
output = "{root}/output"

[encoders.libx264]
enabled = true
pool = "cpu"
threads = 16
presets = ["veryfast", "medium"]
tunes = ["none"]

[videos.clip_a]
enabled = true
"#,
        root = root.display()
    )
}

#[test]
fn version_prints_the_crate_version() {
    Command::cargo_bin("encsweep")
        .unwrap()
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn validate_accepts_a_valid_config() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), &base_config(dir.path()));

    Command::cargo_bin("encsweep")
        .unwrap()
        .args(["validate"])
        .arg(&config)
        .assert()
        .success()
        .stdout(predicate::str::contains("Configuration is valid"))
        .stdout(predicate::str::contains("1 enabled"));
}

#[test]
fn validate_rejects_an_encoder_without_presets() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(
        dir.path(),
        r#"
[encoders.libx264]
enabled = true
"#,
    );

    Command::cargo_bin("encsweep")
        .unwrap()
        .args(["validate"])
        .arg(&config)
        .assert()
        .failure()
        .stderr(predicate::str::contains("no presets"));
}

#[test]
fn combinations_writes_the_audit_index() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), &base_config(dir.path()));

    Command::cargo_bin("encsweep")
        .unwrap()
        .args(["combinations", "libx264", "--config"])
        .arg(&config)
        .assert()
        .success()
        .stdout(predicate::str::contains("2 combinations"));

    let index_path = dir.path().join("output").join("libx264.json");
    let index: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(index_path).unwrap()).unwrap();
    let map = index.as_object().unwrap();
    assert_eq!(map.len(), 2);
    // Keys are 64-char hex digests mapping to option lists.
    for (hash, options) in map {
        assert_eq!(hash.len(), 64);
        assert!(options.as_array().unwrap().len() >= 10);
    }
}

#[test]
fn combinations_rejects_an_unconfigured_encoder() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), &base_config(dir.path()));

    Command::cargo_bin("encsweep")
        .unwrap()
        .args(["combinations", "av1_totally_real", "--config"])
        .arg(&config)
        .assert()
        .failure()
        .stderr(predicate::str::contains("not configured"));
}

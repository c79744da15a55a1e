//! End-to-end cache maintenance through the compiled binary.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::time::{SystemTime, UNIX_EPOCH};

fn unique_data_dir(name: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system time")
        .as_nanos();
    std::env::temp_dir().join(format!("safe-aur-cli-{nanos}-{name}"))
}

fn run_cache(data_dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_safe-aur"))
        .env("SAFE_AUR_DATA_DIR", data_dir)
        .env("SAFE_AUR_CONFIG_PATH", data_dir.join("no-such-config.toml"))
        .arg("cache")
        .args(args)
        .output()
        .expect("run safe-aur binary")
}

fn stdout_json(output: &Output) -> serde_json::Value {
    assert!(
        output.status.success(),
        "command failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).expect("stdout is JSON")
}

fn seed_record(data_dir: &Path, package: &str, identifier: &str) {
    let partition = data_dir.join("cache").join(package);
    fs::create_dir_all(&partition).expect("create partition");
    let record = serde_json::json!({
        "cache_metadata": {
            "commit_hash": identifier,
            "package_name": package,
            "cached_at": "2026-01-15T12:00:00Z",
            "cache_version": "1.0",
            "producer_version": "0.2.0"
        },
        "analysis": {
            "package_name": package,
            "overall_severity": "LOW",
            "findings": [],
            "summary": "nothing unusual",
            "recommendation": "PROCEED",
            "predictability_score": 0.9,
            "producer": "claude",
            "produced_at": "2026-01-15T12:00:00Z"
        }
    });
    fs::write(
        partition.join(format!("{identifier}.json")),
        serde_json::to_string_pretty(&record).expect("serialize record"),
    )
    .expect("write record");
}

#[test]
fn stats_on_an_empty_cache_report_zero_records() {
    let data_dir = unique_data_dir("empty-stats");
    let stats = stdout_json(&run_cache(&data_dir, &["stats"]));
    assert_eq!(stats["total_records"], 0);
    assert_eq!(stats["total_packages"], 0);
    assert_eq!(stats["total_bytes"], 0);
}

#[test]
fn seeded_records_show_up_in_list_and_stats() {
    let data_dir = unique_data_dir("seeded");
    let id_a = "a".repeat(40);
    let id_b = "b".repeat(40);
    seed_record(&data_dir, "demo", &id_a);
    seed_record(&data_dir, "demo", &id_b);
    seed_record(&data_dir, "other", &id_a);

    let listed = stdout_json(&run_cache(&data_dir, &["list", "demo"]));
    assert_eq!(listed, serde_json::json!([id_a, id_b]));

    let stats = stdout_json(&run_cache(&data_dir, &["stats"]));
    assert_eq!(stats["total_records"], 3);
    assert_eq!(stats["total_packages"], 2);
}

#[test]
fn listing_an_unknown_package_yields_an_empty_array() {
    let data_dir = unique_data_dir("unknown-list");
    let listed = stdout_json(&run_cache(&data_dir, &["list", "ghost"]));
    assert_eq!(listed, serde_json::json!([]));
}

#[test]
fn prune_with_a_long_window_keeps_fresh_records() {
    let data_dir = unique_data_dir("prune-keep");
    seed_record(&data_dir, "demo", &"c".repeat(40));

    let output = run_cache(&data_dir, &["prune", "--days", "365"]);
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("removed 0"));

    let stats = stdout_json(&run_cache(&data_dir, &["stats"]));
    assert_eq!(stats["total_records"], 1);
}

#[test]
fn clear_removes_every_record() {
    let data_dir = unique_data_dir("clear");
    seed_record(&data_dir, "demo", &"d".repeat(40));
    seed_record(&data_dir, "other", &"e".repeat(40));

    let output = run_cache(&data_dir, &["clear"]);
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("removed 2"));

    let stats = stdout_json(&run_cache(&data_dir, &["stats"]));
    assert_eq!(stats["total_records"], 0);
}

#![cfg(feature = "cli")]

use std::path::PathBuf;
use std::process::{Command, Output};

fn vcucan(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_vcucan"))
        .arg("--log-level")
        .arg("error")
        .args(args)
        .env_remove("VCUCAN_CONFIG")
        .output()
        .expect("vcucan should run")
}

fn stdout_json(output: &Output) -> serde_json::Value {
    let stdout = String::from_utf8_lossy(&output.stdout);
    serde_json::from_str(stdout.trim()).expect("stdout should be one json document")
}

fn temp_config(tag: &str, contents: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!(
        "vcucan-{tag}-{}-{}.json",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("time should be after epoch")
            .as_nanos()
    ));
    std::fs::write(&path, contents).expect("config should be writable");
    path
}

#[test]
fn version_prints_package_version() {
    let output = vcucan(&["version"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(
        stdout.trim(),
        format!("vcucan {}", env!("CARGO_PKG_VERSION"))
    );
}

#[test]
fn dictionary_lists_every_entry() {
    let output = vcucan(&["--format", "json", "dictionary"]);
    assert!(output.status.success());

    let entries = stdout_json(&output);
    let entries = entries.as_array().expect("dictionary should be an array");
    assert_eq!(entries.len(), 19);
    assert_eq!(entries[0]["name"], "Temp_1");
    assert_eq!(entries[0]["id"], "0x0A0");
    assert!(entries
        .iter()
        .any(|e| e["name"] == "DRS_Input" && e["owner"] == "drs"));
}

#[test]
fn decode_temp_1_writes_module_temperatures() {
    let output = vcucan(&["--format", "json", "decode", "0xA0", "10 00 20 00 30 00 40 00"]);
    assert!(output.status.success());

    let decoded = stdout_json(&output);
    assert_eq!(decoded["outcome"], "decoded");
    assert_eq!(decoded["entry"], "Temp_1");
    assert_eq!(decoded["points"][0]["point"], "module_a_temp");
    assert_eq!(decoded["points"][0]["value"], 0x10);
    assert_eq!(decoded["points"][3]["value"], 0x40);
}

#[test]
fn decode_unknown_id_fails_without_points() {
    let output = vcucan(&["--format", "json", "decode", "0x7FF", "01"]);
    assert_eq!(output.status.code(), Some(1));

    let decoded = stdout_json(&output);
    assert_eq!(decoded["outcome"], "unmatched");
    assert!(decoded["points"].as_array().is_some_and(Vec::is_empty));
}

#[test]
fn decode_rejects_oversized_frames() {
    let output = vcucan(&["decode", "0xA0", "00 00 00 00 00 00 00 00 00"]);
    assert_eq!(output.status.code(), Some(64));
}

#[test]
fn encode_torque_command() {
    let output = vcucan(&["--format", "json", "encode", "torque", "1500"]);
    assert!(output.status.success());

    let frame = stdout_json(&output);
    assert_eq!(frame["id"], "0x0C0");
    assert_eq!(frame["data"], "DC 05 00 00 01 01 00 00");
}

#[test]
fn encode_uses_configured_base() {
    let path = temp_config("encode", r#"{ "inverter_base_id": 256 }"#);
    let output = vcucan(&[
        "--format",
        "json",
        "--config",
        path.to_str().expect("utf-8 path"),
        "encode",
        "param-read",
        "0xAC",
    ]);
    let _ = std::fs::remove_file(&path);
    assert!(output.status.success());

    let frame = stdout_json(&output);
    assert_eq!(frame["id"], "0x121");
    assert_eq!(frame["data"], "AC 00 00 00 00 00 00 00");
}

#[test]
fn invalid_config_is_reported() {
    let path = temp_config("invalid", r#"{ "broadcast": { "period_ms": 0 } }"#);
    let output = vcucan(&["--config", path.to_str().expect("utf-8 path"), "config"]);
    let _ = std::fs::remove_file(&path);

    assert_eq!(output.status.code(), Some(40));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("period_ms"));
}

#[test]
fn config_prints_defaults() {
    let output = vcucan(&["--format", "json", "config"]);
    assert!(output.status.success());

    let config = stdout_json(&output);
    assert_eq!(config["inverter_base_id"], 0xA0);
    assert_eq!(config["broadcast"]["period_ms"], 100);
}

#[test]
fn simulate_runs_a_healthy_session() {
    let path = temp_config("simulate", r#"{ "broadcast": { "period_ms": 10 } }"#);
    let output = vcucan(&[
        "--format",
        "json",
        "--config",
        path.to_str().expect("utf-8 path"),
        "simulate",
        "--ticks",
        "5",
        "--torque",
        "100",
        "--quiet",
    ]);
    let _ = std::fs::remove_file(&path);
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let stats = stdout_json(&output);
    assert_eq!(stats["decoded"], 35);
    assert_eq!(stats["unmatched"], 0);
    assert!(stats["transmitted"].as_u64().is_some_and(|n| n >= 5));
    assert!(stats["cycles"].as_u64().is_some_and(|n| n >= 1));
    assert!(stats["module_errors"].as_array().is_some_and(Vec::is_empty));
}

//! End-to-end tests of the `stepstore` binary, including cross-process increments.

use std::path::Path;
use std::process::{Command, Output};
use std::thread;

use serde_json::{Value, json};
use stepstore::storage::codec;

fn stepstore(instance: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_stepstore"))
        .arg("--instance-dir")
        .arg(instance)
        .args(args)
        .env_remove("STEP_ENGINE_INSTANCE_PATH")
        .env_remove("STEPSTORE_NAME")
        .env_remove("STEPSTORE_LOCK_TIMEOUT_MS")
        .env("RUST_LOG", "warn")
        .current_dir(instance)
        .output()
        .expect("failed to launch stepstore")
}

fn stdout(out: &Output) -> String {
    String::from_utf8_lossy(&out.stdout).trim().to_string()
}

fn document(instance: &Path) -> Value {
    let bytes = std::fs::read(instance.join(".step_engine.json")).unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[test]
fn init_writes_engine_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let instance = dir.path().join("instance");
    std::fs::create_dir(&instance).unwrap();

    let out = stepstore(&instance, &["init", "--library-path", "/opt/steps"]);
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));

    let doc = document(&instance);
    assert_eq!(doc["global_parameters"]["step_engine_state"], json!("INACTIVE"));
    assert_eq!(doc["global_parameters"]["current_step_state"], json!("INACTIVE"));
    assert_eq!(doc["global_parameters"]["run_step_count"], json!(0));
    assert_eq!(doc["global_parameters"]["step_engine_library_path"], json!("/opt/steps"));
}

#[test]
fn set_get_and_group() {
    let dir = tempfile::tempdir().unwrap();

    let out = stepstore(dir.path(), &["set", "global_parameters", "current_step_state", "ENTER"]);
    assert!(out.status.success());
    assert_eq!(stdout(&out), "ENTER");

    let out = stepstore(dir.path(), &["get", "global_parameters", "current_step_state"]);
    assert!(out.status.success());
    assert_eq!(stdout(&out), "ENTER");

    let out = stepstore(dir.path(), &["set", "my_step", "limits", r#"{"max": 3}"#]);
    assert!(out.status.success());

    let out = stepstore(dir.path(), &["group", "my_step"]);
    assert!(out.status.success());
    let group: Value = serde_json::from_str(&stdout(&out)).unwrap();
    assert_eq!(group, json!({"limits": {"max": 3}}));

    let out = stepstore(dir.path(), &["set", "my_step", "code", "007", "--string"]);
    assert!(out.status.success());
    assert_eq!(document(dir.path())["my_step"]["code"], json!("007"));
}

#[test]
fn show_supports_json_and_table() {
    let dir = tempfile::tempdir().unwrap();
    assert!(stepstore(dir.path(), &["incr", "my_step", "retry_count"]).status.success());

    let out = stepstore(dir.path(), &["show"]);
    assert!(out.status.success());
    let doc: Value = serde_json::from_str(&stdout(&out)).unwrap();
    assert_eq!(doc["my_step"]["retry_count"], json!(1));

    let out = stepstore(dir.path(), &["show", "--format", "table"]);
    assert!(out.status.success());
    assert!(stdout(&out).contains("retry_count"));

    let out = stepstore(dir.path(), &["show", "--format", "xml"]);
    assert!(!out.status.success());
}

#[test]
fn incr_and_decr_print_new_value() {
    let dir = tempfile::tempdir().unwrap();

    assert_eq!(stdout(&stepstore(dir.path(), &["incr", "g", "n"])), "1");
    assert_eq!(stdout(&stepstore(dir.path(), &["incr", "g", "n"])), "2");
    assert_eq!(stdout(&stepstore(dir.path(), &["decr", "g", "n"])), "1");
}

#[test]
fn missing_key_exits_non_zero_with_kind() {
    let dir = tempfile::tempdir().unwrap();

    let out = stepstore(dir.path(), &["get", "my_step", "retry_count"]);
    assert!(!out.status.success());
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("MissingGroupOrKey"), "{}", stderr);
    assert!(stderr.contains("my_step.retry_count"), "{}", stderr);
}

#[test]
fn corrupt_document_fails_without_writing() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(".step_engine.json");
    std::fs::write(&path, "not json at all").unwrap();

    let out = stepstore(dir.path(), &["incr", "g", "n"]);
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("CorruptDocument"));
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "not json at all");
}

#[test]
fn incr_on_string_reports_not_a_number() {
    let dir = tempfile::tempdir().unwrap();
    assert!(stepstore(dir.path(), &["set", "g", "k", "hello"]).status.success());

    let out = stepstore(dir.path(), &["incr", "g", "k"]);
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("NotANumber"));
}

#[test]
fn bare_skips_engine_defaults() {
    let dir = tempfile::tempdir().unwrap();
    assert!(stepstore(dir.path(), &["--bare", "incr", "g", "n"]).status.success());
    assert_eq!(document(dir.path()), json!({"g": {"n": 1}}));
}

#[test]
fn store_name_comes_from_config_file() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("stepstore.yaml"), "store_name: custom\n").unwrap();

    assert!(stepstore(dir.path(), &["--bare", "incr", "g", "n"]).status.success());
    let bytes = std::fs::read(dir.path().join(".custom.json")).unwrap();
    assert_eq!(
        codec::decode(&bytes).unwrap().get("g", "n"),
        Some(&json!(1))
    );
}

#[test]
fn concurrent_processes_never_lose_increments() {
    let dir = tempfile::tempdir().unwrap();
    let instance = dir.path().to_path_buf();

    const PROCESSES: usize = 4;
    const PER_PROCESS: usize = 5;

    let handles: Vec<_> = (0..PROCESSES)
        .map(|_| {
            let instance = instance.clone();
            thread::spawn(move || {
                for _ in 0..PER_PROCESS {
                    let out = stepstore(&instance, &["incr", "race", "count"]);
                    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(
        document(&instance)["race"]["count"],
        json!((PROCESSES * PER_PROCESS) as i64)
    );
}

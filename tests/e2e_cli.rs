use std::fs;
use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use tempfile::TempDir;

fn bin(home: &Path) -> Command {
    let path = assert_cmd::cargo::cargo_bin!("hireflow");
    let mut cmd = Command::new(path);
    // Keep any per-user config and keys out of the run.
    cmd.env("HOME", home)
        .env("XDG_CONFIG_HOME", home.join(".config"))
        .env_remove("GEMINI_API_KEY")
        .env_remove("TOP_K_CANDIDATES")
        .env_remove("EMBEDDING_MODEL")
        .env_remove("HIREFLOW_RESUME_DIR")
        .env_remove("RUST_LOG");
    cmd
}

fn workspace() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    let resumes = dir.path().join("resumes");
    fs::create_dir_all(&resumes).unwrap();
    fs::write(
        resumes.join("alice.txt"),
        "Alice Chen\nSenior accountant, CPA. GAAP financial reporting, tax preparation, SAP.",
    )
    .unwrap();
    fs::write(
        resumes.join("bob.txt"),
        "Bob Smith\nLine cook. Knife skills, pastry, kitchen inventory.",
    )
    .unwrap();
    fs::write(
        resumes.join("carol.md"),
        "Carol Diaz\nStaff accountant with QuickBooks and audit support experience.",
    )
    .unwrap();
    dir
}

fn path_arg(p: &Path) -> &str {
    p.to_str().unwrap()
}

#[test]
fn search_mode_prints_ranked_json_and_saves_index() {
    let dir = workspace();
    let index = dir.path().join("store/index.jsonl");
    let assert = bin(dir.path())
        .args([
            "--mode",
            "search",
            "--resume-dir",
            path_arg(&dir.path().join("resumes")),
            "--index-path",
            path_arg(&index),
            "-j",
            "Senior Accountant with CPA, GAAP and SAP",
            "--top-n",
            "2",
            "--output",
            "json",
        ])
        .assert()
        .success();

    let output = String::from_utf8(assert.get_output().stdout.clone()).unwrap();
    let json: Value = serde_json::from_str(&output).unwrap();
    assert_eq!(json["indexed"], 3);
    let candidates = json["candidates"].as_array().unwrap();
    assert_eq!(candidates.len(), 2);
    assert_eq!(candidates[0]["id"], "alice.txt");
    assert_eq!(candidates[0]["rank"], 1);
    assert!(json.get("evaluation").is_none());
    assert!(index.is_file());
}

#[test]
fn keyword_boost_reorders_candidates() {
    let dir = workspace();
    let assert = bin(dir.path())
        .args([
            "--mode",
            "search",
            "--resume-dir",
            path_arg(&dir.path().join("resumes")),
            "--index-path",
            path_arg(&dir.path().join("index.jsonl")),
            "-j",
            "accountant",
            "--keyword",
            "QuickBooks",
            "--keyword",
            "audit support",
            "--boost-weight",
            "5",
            "--output",
            "json",
        ])
        .assert()
        .success();
    let json: Value = serde_json::from_slice(&assert.get_output().stdout).unwrap();
    assert_eq!(json["candidates"][0]["id"], "carol.md");
}

#[test]
fn text_report_shows_tiers() {
    let dir = workspace();
    bin(dir.path())
        .args([
            "--mode",
            "search",
            "--resume-dir",
            path_arg(&dir.path().join("resumes")),
            "--index-path",
            path_arg(&dir.path().join("index.jsonl")),
            "-j",
            "Senior Accountant",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("CANDIDATE SUMMARY REPORT"))
        .stdout(predicate::str::contains("Recommendation:"));
}

#[test]
fn empty_resume_directory_fails() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir_all(dir.path().join("empty")).unwrap();
    bin(dir.path())
        .args([
            "--mode",
            "search",
            "--resume-dir",
            path_arg(&dir.path().join("empty")),
            "--index-path",
            path_arg(&dir.path().join("index.jsonl")),
            "-j",
            "Accountant",
        ])
        .assert()
        .code(9)
        .stderr(predicate::str::contains("error:"));
}

#[test]
fn detailed_evaluation_without_api_key_is_a_config_error() {
    let dir = workspace();
    bin(dir.path())
        .args([
            "--mode",
            "full",
            "--resume-dir",
            path_arg(&dir.path().join("resumes")),
            "-j",
            "Accountant",
            "-e",
            "--no-interactive",
        ])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("GEMINI_API_KEY"));
}

#[test]
fn chatbot_without_index_or_resumes_fails() {
    let dir = tempfile::tempdir().unwrap();
    bin(dir.path())
        .env("GEMINI_API_KEY", "test-key")
        .args([
            "--mode",
            "chatbot",
            "--resume-dir",
            path_arg(&dir.path().join("missing")),
            "--index-path",
            path_arg(&dir.path().join("index.jsonl")),
        ])
        .write_stdin("")
        .assert()
        .code(9)
        .stderr(predicate::str::contains("Index not found"));
}

#[test]
fn conflicting_job_inputs_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    bin(dir.path())
        .args(["--mode", "search", "-j", "x", "-f", "jd.txt"])
        .assert()
        .code(6);
}

#[test]
fn explicit_config_file_must_exist() {
    let dir = tempfile::tempdir().unwrap();
    bin(dir.path())
        .args([
            "--mode",
            "search",
            "--config",
            path_arg(&dir.path().join("nope.toml")),
            "-j",
            "x",
        ])
        .assert()
        .code(2);
}

#[test]
fn config_file_values_apply() {
    let dir = workspace();
    let config = dir.path().join("hireflow.toml");
    fs::write(
        &config,
        format!(
            "resume_dir = {:?}\nindex_path = {:?}\n\n[rerank]\ntop_n = 1\n",
            dir.path().join("resumes"),
            dir.path().join("index.jsonl"),
        ),
    )
    .unwrap();
    let assert = bin(dir.path())
        .args([
            "--mode",
            "search",
            "--config",
            path_arg(&config),
            "-j",
            "accountant",
            "--output",
            "json",
        ])
        .assert()
        .success();
    let json: Value = serde_json::from_slice(&assert.get_output().stdout).unwrap();
    assert_eq!(json["candidates"].as_array().unwrap().len(), 1);
}

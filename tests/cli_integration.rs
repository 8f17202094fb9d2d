// CLI integration tests for the filigree binary.
use std::io::Write;
use std::process::{Command, Stdio};

use serde_json::Value;

fn cmd() -> Command {
    let exe = env!("CARGO_BIN_EXE_filigree");
    Command::new(exe)
}

fn parse_json(value: &str) -> Value {
    serde_json::from_str(value).expect("valid json")
}

fn stdout_lines(output: &[u8]) -> Vec<Value> {
    String::from_utf8_lossy(output)
        .lines()
        .map(parse_json)
        .collect()
}

fn stderr_error(output: &[u8]) -> Value {
    let text = String::from_utf8_lossy(output);
    let line = text.lines().next().expect("error line");
    parse_json(line)
}

#[test]
fn eval_addition_relays_engine_result() {
    let output = cmd().args(["eval", "1 + 2"]).output().expect("eval");
    assert!(output.status.success());
    assert_eq!(stdout_lines(&output.stdout), vec![Value::from(3)]);
}

#[test]
fn eval_reads_input_from_flag() {
    let output = cmd()
        .args(["eval", ".x * 2", "--input-json", "{\"x\":21}"])
        .output()
        .expect("eval");
    assert!(output.status.success());
    assert_eq!(stdout_lines(&output.stdout), vec![Value::from(42)]);
}

#[test]
fn eval_reads_input_from_stdin() {
    let mut child = cmd()
        .args(["eval", ".items[]"])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("spawn");
    child
        .stdin
        .as_mut()
        .expect("stdin")
        .write_all(b"{\"items\":[1,2]}")
        .expect("write stdin");
    let output = child.wait_with_output().expect("wait");
    assert!(output.status.success());
    assert_eq!(
        stdout_lines(&output.stdout),
        vec![Value::from(1), Value::from(2)]
    );
}

#[test]
fn defs_file_feeds_call() {
    let temp = tempfile::tempdir().expect("tempdir");
    let defs = temp.path().join("prelude.jq");
    std::fs::write(&defs, "def double: . * 2;\ndef add(n): . + n;\n").expect("write defs");

    let output = cmd()
        .args([
            "--defs",
            defs.to_str().unwrap(),
            "call",
            "add",
            "5",
            "--input-json",
            "10",
        ])
        .output()
        .expect("call");
    assert!(output.status.success());
    assert_eq!(stdout_lines(&output.stdout), vec![Value::from(15)]);
}

#[test]
fn check_accepts_valid_expression() {
    let output = cmd().args(["check", ".a.b + 1"]).output().expect("check");
    assert!(output.status.success());
    let report = stdout_lines(&output.stdout);
    assert_eq!(report[0].get("ok"), Some(&Value::Bool(true)));
}

#[test]
fn check_rejects_invalid_expression_with_usage_exit() {
    let output = cmd().args(["check", ".[("]).output().expect("check");
    assert_eq!(output.status.code(), Some(2));
    let err = stderr_error(&output.stderr);
    assert_eq!(
        err["error"]["kind"].as_str(),
        Some("Usage"),
        "stderr: {err}"
    );
}

#[test]
fn runtime_failure_exits_with_eval_code() {
    let output = cmd()
        .args(["eval", ".foo", "--input-json", "5"])
        .output()
        .expect("eval");
    assert_eq!(output.status.code(), Some(4));
    let err = stderr_error(&output.stderr);
    assert_eq!(err["error"]["kind"].as_str(), Some("Eval"));
    assert_eq!(err["error"]["expr"].as_str(), Some(".foo"));
}

#[test]
fn non_finite_result_exits_with_convert_code() {
    let output = cmd().args(["eval", "1e308 * 10"]).output().expect("eval");
    assert_eq!(output.status.code(), Some(5));
    let err = stderr_error(&output.stderr);
    assert_eq!(err["error"]["kind"].as_str(), Some("Convert"));
}

#[test]
fn unknown_function_reports_usage_with_hint() {
    let output = cmd().args(["call", "missing"]).output().expect("call");
    assert_eq!(output.status.code(), Some(2));
    let err = stderr_error(&output.stderr);
    assert_eq!(err["error"]["kind"].as_str(), Some("Usage"));
    assert!(err["error"]["hint"].as_str().unwrap_or("").contains("missing"));
}

#[test]
fn version_emits_name_and_version() {
    let output = cmd().args(["version"]).output().expect("version");
    assert!(output.status.success());
    let report = stdout_lines(&output.stdout);
    assert_eq!(report[0]["name"].as_str(), Some("filigree"));
    assert_eq!(report[0]["version"].as_str(), Some(env!("CARGO_PKG_VERSION")));
}

#[test]
fn bad_defs_file_is_io_error() {
    let output = cmd()
        .args(["--defs", "/nonexistent/prelude.jq", "eval", "."])
        .output()
        .expect("eval");
    assert_eq!(output.status.code(), Some(6));
    let err = stderr_error(&output.stderr);
    assert_eq!(err["error"]["kind"].as_str(), Some("Io"));
}

use assert_cmd::Command;
use serde_json::Value;
use tempfile::TempDir;

const RULES: &str = r#"
permissions:
  - roles: [admin]
    predicate: "path-prefix('/')"
  - roles: [user]
    predicate: "path-prefix('/blog') and method(GET)"
    priority: 10
  - roles: [user]
    effect: veto
    predicate: "field-exists(admin)"
"#;

fn docgate(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("docgate").unwrap();
    cmd.current_dir(dir.path())
        .env_remove("RUST_LOG")
        .args(["--log-level", "error"]);
    cmd
}

fn workspace() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("acl.yaml"), RULES).unwrap();
    dir
}

#[test]
fn check_acl_lists_rules_per_role() {
    let dir = workspace();
    let output = docgate(&dir).args(["check-acl", "acl.yaml"]).output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("3 rule(s)"), "{stdout}");
    assert!(stdout.contains("admin:"));
    assert!(stdout.contains("[10] path-prefix('/blog') and method(GET)"));
    assert!(stdout.contains("veto:"));
}

#[test]
fn check_acl_json_summary() {
    let dir = workspace();
    let output = docgate(&dir)
        .args(["check-acl", "acl.yaml", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let summary: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(summary["rules"], 3);
    assert_eq!(summary["roles"]["user"], 1);
    assert_eq!(summary["veto"], 1);
}

#[test]
fn check_acl_rejects_broken_predicates() {
    let dir = workspace();
    std::fs::write(
        dir.path().join("broken.yaml"),
        "permissions:\n  - roles: [a]\n    predicate: \"path-prefix(\"\n",
    )
    .unwrap();
    docgate(&dir)
        .args(["check-acl", "broken.yaml"])
        .assert()
        .failure();
}

#[test]
fn print_config_applies_env_overrides() {
    let dir = workspace();
    std::fs::write(
        dir.path().join("gw.yaml"),
        "server:\n  bind: 127.0.0.1:8001\nquery:\n  max_pagesize: 50\n  default_pagesize: 20\n",
    )
    .unwrap();
    let output = docgate(&dir)
        .args(["--config", "gw.yaml", "print-config"])
        .env("DOCGATE__SERVER__BIND", "0.0.0.0:9999")
        .output()
        .unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("# source: gw.yaml"), "{stdout}");
    assert!(stdout.contains("0.0.0.0:9999"));
    assert!(stdout.contains("max_pagesize: 50"));
}

#[test]
fn serve_refuses_an_invalid_bind_address() {
    let dir = workspace();
    docgate(&dir)
        .args(["serve", "--bind", "not-an-address"])
        .assert()
        .failure();
}

#[test]
fn missing_config_file_is_fatal() {
    let dir = workspace();
    docgate(&dir)
        .args(["--config", "missing.yaml", "print-config"])
        .assert()
        .failure();
}

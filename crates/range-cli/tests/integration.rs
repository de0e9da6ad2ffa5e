use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn rangectl(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("rangectl").unwrap();
    cmd.current_dir(dir.path()).env("RANGECTL_ROOT", dir.path());
    cmd
}

fn write_range(dir: &TempDir, yaml: &str) {
    std::fs::write(dir.path().join("range.yaml"), yaml).unwrap();
}

fn scaffold_challenge(dir: &TempDir, id: &str) {
    let path = dir.path().join("challenges").join(id);
    std::fs::create_dir_all(&path).unwrap();
    std::fs::write(path.join("main.tf"), "# placeholder\n").unwrap();
}

const BASIC_RANGE: &str = r#"
challenges:
  - id: shared-network
    provider: aws
    difficulty: basic
    description: "Shared VPC used by other challenges"
    directory: challenges/shared-network
    outputs: [vpc_id]
  - id: iam-privesc
    provider: aws
    difficulty: intermediate
    description: "IAM privilege escalation paths"
    directory: challenges/iam-privesc
    depends_on: [shared-network]
    inputs:
      vpc_id: ${shared-network.vpc_id}
"#;

// ---------------------------------------------------------------------------
// rangectl list
// ---------------------------------------------------------------------------

#[test]
fn list_shows_registered_challenges() {
    let dir = TempDir::new().unwrap();
    write_range(&dir, BASIC_RANGE);
    rangectl(&dir)
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("shared-network"))
        .stdout(predicate::str::contains("iam-privesc"))
        .stdout(predicate::str::contains("not deployed"));
}

#[test]
fn list_filters_by_difficulty() {
    let dir = TempDir::new().unwrap();
    write_range(&dir, BASIC_RANGE);
    rangectl(&dir)
        .args(["list", "--difficulty", "basic"])
        .assert()
        .success()
        .stdout(predicate::str::contains("shared-network"))
        .stdout(predicate::str::contains("iam-privesc").not());
}

#[test]
fn list_json_is_machine_readable() {
    let dir = TempDir::new().unwrap();
    write_range(&dir, BASIC_RANGE);
    let output = rangectl(&dir).args(["list", "--json"]).output().unwrap();
    assert!(output.status.success());
    let parsed: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(parsed.as_array().unwrap().len(), 2);
}

#[test]
fn missing_config_exits_with_config_error() {
    let dir = TempDir::new().unwrap();
    rangectl(&dir)
        .arg("list")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("not a range root"));
}

// ---------------------------------------------------------------------------
// rangectl check
// ---------------------------------------------------------------------------

#[test]
fn check_reports_deploy_order() {
    let dir = TempDir::new().unwrap();
    write_range(&dir, BASIC_RANGE);
    scaffold_challenge(&dir, "shared-network");
    scaffold_challenge(&dir, "iam-privesc");
    rangectl(&dir)
        .arg("check")
        .assert()
        .success()
        .stdout(predicate::str::contains("deploy order"))
        .stdout(predicate::str::contains("shared-network"));
}

#[test]
fn check_detects_cycles_as_config_error() {
    let dir = TempDir::new().unwrap();
    write_range(
        &dir,
        r#"
challenges:
  - id: a
    provider: aws
    directory: challenges/a
    depends_on: [b]
  - id: b
    provider: aws
    directory: challenges/b
    depends_on: [a]
"#,
    );
    scaffold_challenge(&dir, "a");
    scaffold_challenge(&dir, "b");
    rangectl(&dir)
        .arg("check")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("dependency cycle"));
}

#[test]
fn check_detects_unknown_references() {
    let dir = TempDir::new().unwrap();
    write_range(
        &dir,
        r#"
challenges:
  - id: app
    provider: aws
    directory: challenges/app
    inputs:
      vpc: ${ghost.vpc_id}
"#,
    );
    scaffold_challenge(&dir, "app");
    rangectl(&dir)
        .arg("check")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("unknown challenge 'ghost'"));
}

#[test]
fn check_flags_missing_challenge_directory() {
    let dir = TempDir::new().unwrap();
    write_range(&dir, BASIC_RANGE);
    // Directories intentionally not scaffolded.
    rangectl(&dir)
        .arg("check")
        .assert()
        .code(2)
        .stdout(predicate::str::contains("directory not found"));
}

// ---------------------------------------------------------------------------
// rangectl status / output
// ---------------------------------------------------------------------------

#[test]
fn status_before_any_deploy_shows_not_deployed() {
    let dir = TempDir::new().unwrap();
    write_range(&dir, BASIC_RANGE);
    rangectl(&dir)
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("not deployed: 2"));
}

#[test]
fn status_for_unknown_challenge_fails() {
    let dir = TempDir::new().unwrap();
    write_range(&dir, BASIC_RANGE);
    rangectl(&dir)
        .args(["status", "ghost"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("ghost"));
}

#[test]
fn output_requires_a_deployed_challenge() {
    let dir = TempDir::new().unwrap();
    write_range(&dir, BASIC_RANGE);
    rangectl(&dir)
        .args(["output", "shared-network"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("not deployed"));
}

#[test]
fn output_reads_the_ledger() {
    let dir = TempDir::new().unwrap();
    write_range(&dir, BASIC_RANGE);
    std::fs::create_dir_all(dir.path().join(".range")).unwrap();
    std::fs::write(
        dir.path().join(".range/ledger.yaml"),
        r#"
version: 1
entries:
  shared-network:
    signature: abc123
    outputs:
      vpc_id: vpc-0a1b2c
    deployed_at: 2026-08-01T12:00:00Z
"#,
    )
    .unwrap();
    rangectl(&dir)
        .args(["output", "shared-network"])
        .assert()
        .success()
        .stdout(predicate::str::contains("vpc-0a1b2c"));
    rangectl(&dir)
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("deployed: 1"));
}

// ---------------------------------------------------------------------------
// rangectl deploy / destroy argument handling
// ---------------------------------------------------------------------------

#[test]
fn deploy_requires_a_selection() {
    let dir = TempDir::new().unwrap();
    write_range(&dir, BASIC_RANGE);
    scaffold_challenge(&dir, "shared-network");
    scaffold_challenge(&dir, "iam-privesc");
    rangectl(&dir)
        .arg("deploy")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("specify a challenge"));
}

#[test]
fn deploy_of_unknown_challenge_fails() {
    let dir = TempDir::new().unwrap();
    write_range(&dir, BASIC_RANGE);
    scaffold_challenge(&dir, "shared-network");
    scaffold_challenge(&dir, "iam-privesc");
    rangectl(&dir)
        .args(["deploy", "ghost"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("challenge not found: ghost"));
}

#[test]
fn destroy_with_nothing_deployed_is_a_noop() {
    let dir = TempDir::new().unwrap();
    write_range(&dir, BASIC_RANGE);
    scaffold_challenge(&dir, "shared-network");
    scaffold_challenge(&dir, "iam-privesc");
    rangectl(&dir)
        .args(["destroy", "--all", "--yes"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No deployed challenges"));
}

// Copyright (c) 2025 The release-gate Authors
//
// SPDX-License-Identifier: Apache-2.0
//

//! Tests driving the `gate` binary with a scripted external validator.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Output;

use assert_cmd::Command;
use rstest::rstest;
use serde_json::Value;
use tempfile::TempDir;

const POLICY: &str = r#"{"publicKey": "cosign.pub"}"#;

/// Passes every image but the ones with `bad` in their name, which violate
/// a rule, and fails the ones with `broken` in their name.
const VALIDATOR: &str = r#"input=$(cat)
case "$input" in
  *broken*) echo "no image signatures found" >&2; exit 1 ;;
  *bad*) echo '{"violations": [{"msg": "Unknown attestation type", "metadata": {"code": "attestation_type.known_attestation_type"}}]}' ;;
  *) echo '{"successes": [{"msg": "Pass"}]}' ;;
esac
"#;

struct Env {
    dir: TempDir,
    config: PathBuf,
}

impl Env {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("validator.sh");
        fs::write(&script, VALIDATOR).unwrap();
        let work_dir = dir.path().join("work");

        let config = dir.path().join("gate.toml");
        fs::write(
            &config,
            format!(
                "work_dir = \"{}\"\nmax_concurrent_validations = 2\n\n[validator]\ncommand = \"sh\"\nargs = [\"{}\"]\n",
                work_dir.display(),
                script.display()
            ),
        )
        .unwrap();

        Self { dir, config }
    }

    fn gate(&self) -> Command {
        let mut cmd = Command::cargo_bin("gate").unwrap();
        cmd.env_remove("RUST_LOG").arg("--config").arg(&self.config);
        cmd
    }

    fn work_dir(&self) -> PathBuf {
        self.dir.path().join("work")
    }
}

fn snapshot(images: &[&str]) -> String {
    let components: Vec<Value> = images
        .iter()
        .enumerate()
        .map(|(i, image)| serde_json::json!({"name": format!("c{i}"), "containerImage": image}))
        .collect();
    serde_json::json!({"application": "app", "components": components}).to_string()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).to_string()
}

fn report(stdout: &[u8]) -> Value {
    serde_json::from_slice(stdout).expect("report is JSON")
}

#[test]
fn test_validate_single_image() {
    let env = Env::new();

    let out = env
        .gate()
        .args(["validate", "image", "--image", "registry.io/good:1", "--policy", POLICY])
        .assert()
        .success();

    let report = report(&out.get_output().stdout);
    assert_eq!(report["success"], true);
    assert_eq!(report["key"], "cosign.pub");
    assert_eq!(report["components"][0]["name"], "Unnamed");
    assert_eq!(report["components"][0]["successes"][0]["msg"], "Pass");
}

#[rstest]
#[case::lenient(false)]
#[case::strict(true)]
fn test_validate_violations(#[case] strict: bool) {
    let env = Env::new();
    let output = env.dir.path().join("report.json");

    let mut cmd = env.gate();
    cmd.args(["validate", "image", "--policy", POLICY, "--json-input"])
        .arg(snapshot(&["registry.io/good:1", "registry.io/bad:1"]))
        .arg("--output")
        .arg(&output);
    if strict {
        cmd.arg("--strict");
    }

    if strict {
        let out = cmd.assert().failure();
        assert!(stderr(out.get_output()).contains("success criteria not met"));
    } else {
        cmd.assert().success();
    }

    let report: Value = serde_json::from_slice(&fs::read(&output).unwrap()).unwrap();
    assert_eq!(report["success"], false);
    assert_eq!(report["components"][0]["success"], true);
    assert_eq!(report["components"][1]["success"], false);
    assert_eq!(
        report["components"][1]["violations"][0]["metadata"]["code"],
        "attestation_type.known_attestation_type"
    );
}

#[test]
fn test_validate_hard_error() {
    let env = Env::new();

    let out = env
        .gate()
        .args(["validate", "image", "--policy", POLICY, "--json-input"])
        .arg(snapshot(&[
            "registry.io/good:1",
            "registry.io/broken:1",
            "registry.io/bad:1",
        ]))
        .assert()
        .failure();

    let stderr = stderr(out.get_output());
    assert!(stderr.contains("1 error occurred"), "{stderr}");
    assert!(stderr.contains("error validating image registry.io/broken:1 of component c1"));
    assert!(stderr.contains("no image signatures found"));
    assert!(out.get_output().stdout.is_empty());
}

#[test]
fn test_validate_from_file_with_policy_file() {
    let env = Env::new();
    let snapshot_file = env.dir.path().join("snapshot.yaml");
    fs::write(
        &snapshot_file,
        "components:\n- name: a\n  containerImage: registry.io/good:1\n",
    )
    .unwrap();
    let policy_file = env.dir.path().join("policy.yaml");
    fs::write(&policy_file, "publicKey: from-file.pub\n").unwrap();

    let out = env
        .gate()
        .args(["validate", "image", "--file-path"])
        .arg(&snapshot_file)
        .arg("--policy")
        .arg(&policy_file)
        .assert()
        .success();

    let report = report(&out.get_output().stdout);
    assert_eq!(report["key"], "from-file.pub");
    assert_eq!(report["components"][0]["name"], "a");
    // Scoped work dirs are removed.
    assert_eq!(fs::read_dir(env.work_dir()).unwrap().count(), 0);
}

#[rstest]
#[case::no_input(&["--policy", POLICY], "neither a snapshot file")]
#[case::no_key_material(&["--image", "registry.io/good:1", "--policy", "{}"], "public key or a keyless identity")]
#[case::bad_effective_time(
    &["--image", "registry.io/good:1", "--policy", POLICY, "--effective-time", "soon"],
    "invalid effective time soon"
)]
fn test_validate_usage_errors(#[case] args: &[&str], #[case] message: &str) {
    let out = Env::new()
        .gate()
        .args(["validate", "image"])
        .args(args)
        .assert()
        .failure();

    let stderr = stderr(out.get_output());
    assert!(stderr.contains(message), "{stderr}");
}

fn policy_repo(root: &Path) {
    fs::create_dir_all(root.join("release")).unwrap();
    fs::write(
        root.join("release/tasks.rego"),
        "package policy.release.tasks\n\n# METADATA\n# title: Pipeline run includes at least one task\n# custom:\n#   short_name: pipeline_has_tasks\ndeny contains result if {\n\tfalse\n}\n",
    )
    .unwrap();
}

#[test]
fn test_inspect_policy() {
    let env = Env::new();
    let repo = env.dir.path().join("policy");
    policy_repo(&repo);

    let out = env
        .gate()
        .args(["inspect", "policy", "--source"])
        .arg(&repo)
        .assert()
        .success();

    let rules = report(&out.get_output().stdout);
    assert_eq!(rules[0]["code"], "tasks.pipeline_has_tasks");
    assert_eq!(rules[0]["kind"], "deny");
    assert_eq!(rules[0]["file"], "release/tasks.rego");
    assert_eq!(rules[0]["package"], "policy.release.tasks");
}

/// A policy source that never answers keeps the run in source resolution
/// until SIGINT arrives, which must end the run and remove the work dir.
#[cfg(unix)]
#[test]
fn test_interrupted_while_resolving_sources() {
    use std::net::TcpListener;
    use std::process::{Command as StdCommand, Stdio};
    use std::sync::mpsc;
    use std::time::{Duration, Instant};

    let env = Env::new();
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let (connected, accepted) = mpsc::channel();
    std::thread::spawn(move || {
        // Accepted connections are held open and never answered.
        let mut held = Vec::new();
        for stream in listener.incoming() {
            held.push(stream);
            let _ = connected.send(());
        }
    });

    let policy = format!(
        r#"{{"publicKey": "k", "sources": [{{"policy": ["http://127.0.0.1:{port}/p.rego"]}}]}}"#
    );
    let mut child = StdCommand::new(assert_cmd::cargo::cargo_bin("gate"))
        .env_remove("RUST_LOG")
        .arg("--config")
        .arg(&env.config)
        .args(["validate", "image", "--image", "registry.io/good:1", "--policy"])
        .arg(&policy)
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .unwrap();

    accepted
        .recv_timeout(Duration::from_secs(30))
        .expect("policy source is requested");
    std::thread::sleep(Duration::from_millis(200));
    let killed = StdCommand::new("kill")
        .args(["-INT", &child.id().to_string()])
        .status()
        .unwrap();
    assert!(killed.success());

    let deadline = Instant::now() + Duration::from_secs(10);
    let status = loop {
        if let Some(status) = child.try_wait().unwrap() {
            break status;
        }
        if Instant::now() > deadline {
            child.kill().unwrap();
            panic!("gate still running after SIGINT");
        }
        std::thread::sleep(Duration::from_millis(50));
    };

    let output = child.wait_with_output().unwrap();
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(!status.success());
    assert!(stderr.contains("interrupted"), "{stderr}");
    assert_eq!(fs::read_dir(env.work_dir()).unwrap().count(), 0);
}

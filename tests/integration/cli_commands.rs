#![allow(missing_docs)]

use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::cargo::cargo_bin_cmd;
use serde_json::Value;
use tempfile::TempDir;

const PAIR: &str = r#"{
    "name": "pair",
    "vertices": [
        {"name": "A", "condition": {"test": {"operator": "eq", "attribute": "kind", "value": "a"}}},
        {"name": "B", "condition": {"test": {"operator": "eq", "attribute": "kind", "value": "b"}}}
    ],
    "edges": [{"name": "Y", "from": "A", "to": "B", "directed": true}]
}"#;

const DISCONNECTED: &str = r#"{
    "name": "islands",
    "vertices": [{"name": "A"}, {"name": "B"}, {"name": "C"}],
    "edges": [{"name": "Y", "from": "A", "to": "B"}]
}"#;

const TRIANGLE: &str = r#"{
    "name": "triangle",
    "vertices": [{"name": "A"}, {"name": "B"}, {"name": "C", "annotation": {"min": 1}}],
    "edges": [
        {"name": "Y", "from": "A", "to": "B", "directed": true},
        {"name": "Z", "from": "B", "to": "C", "directed": true, "annotation": {"min": 1}},
        {"name": "W", "from": "A", "to": "C", "directed": true, "annotation": {"min": 1}}
    ]
}"#;

struct Workspace {
    dir: TempDir,
}

impl Workspace {
    fn new() -> Self {
        let dir = TempDir::new().expect("tempdir");
        fs::write(
            dir.path().join("objects.csv"),
            "id,kind\n1,a\n2,b\n3,a\n4,b\n",
        )
        .expect("objects");
        fs::write(dir.path().join("links.csv"), "id,o1_id,o2_id,type\n10,1,2,x\n").expect("links");
        Self { dir }
    }

    fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        fs::write(&path, contents).expect("write query");
        path
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    fn config(&self) -> PathBuf {
        self.path("absent-config.toml")
    }
}

fn qgraph(config: &Path) -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("qgraph");
    cmd.env("QGRAPH_CONFIG", config)
        .env("RUST_LOG", "off")
        .env_remove("QGRAPH_PROFILE");
    cmd
}

fn json(output: &[u8]) -> Value {
    serde_json::from_slice(output).expect("valid json")
}

#[test]
fn validate_accepts_a_connected_query() {
    let ws = Workspace::new();
    let query = ws.write("pair.json", PAIR);
    qgraph(&ws.config())
        .arg("validate")
        .arg(&query)
        .assert()
        .success();
}

#[test]
fn validate_lists_every_violation() {
    let ws = Workspace::new();
    let query = ws.write("islands.json", DISCONNECTED);
    let output = qgraph(&ws.config())
        .args(["--format", "json", "validate"])
        .arg(&query)
        .assert()
        .code(2)
        .get_output()
        .stdout
        .clone();
    let json = json(&output);
    assert_eq!(json["valid"], false);
    let violations = json["violations"].as_array().expect("violations");
    assert!(violations
        .iter()
        .any(|v| v == "query (without negated elements) is not connected"));
}

#[test]
fn plan_prints_the_chosen_steps() {
    let ws = Workspace::new();
    let query = ws.write("pair.json", PAIR);
    let output = qgraph(&ws.config())
        .args(["--format", "json", "plan"])
        .arg(&query)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let json = json(&output);
    assert_eq!(json["status"], "compiled");
    let steps = json["plan"]["steps"].as_array().expect("steps");
    assert_eq!(steps.len(), 3);
    assert_eq!(steps[2]["strategy"], "collapse-edge");
}

#[test]
fn plan_reports_missing_solutions() {
    let ws = Workspace::new();
    let query = ws.write("triangle.json", TRIANGLE);
    let output = qgraph(&ws.config())
        .args(["--theme", "plain", "plan"])
        .arg(&query)
        .assert()
        .code(3)
        .get_output()
        .stderr
        .clone();
    let stderr = String::from_utf8(output).expect("utf8");
    assert!(stderr.contains("no solution found with current rewrite strategies"));
}

#[test]
fn run_stores_matches_from_csv() {
    let ws = Workspace::new();
    let query = ws.write("pair.json", PAIR);
    let output = qgraph(&ws.config())
        .args(["--format", "json", "run"])
        .arg(&query)
        .arg("--objects")
        .arg(ws.path("objects.csv"))
        .arg("--links")
        .arg(ws.path("links.csv"))
        .args(["--into", "matches"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let json = json(&output);
    assert_eq!(json["status"], "completed");
    assert_eq!(json["report"]["container"], "matches");
    assert_eq!(json["report"]["subgraphs"], 1);
    assert_eq!(json["report"]["objects"], 2);
    assert_eq!(json["report"]["links"], 1);
}

#[test]
fn run_text_output_shows_subgraphs() {
    let ws = Workspace::new();
    let query = ws.write("pair.json", PAIR);
    let output = qgraph(&ws.config())
        .args(["--theme", "plain", "run"])
        .arg(&query)
        .arg("--objects")
        .arg(ws.path("objects.csv"))
        .arg("--links")
        .arg(ws.path("links.csv"))
        .args(["--into", "matches", "--show"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let stdout = String::from_utf8(output).expect("utf8");
    assert!(stdout.contains(": A=1 B=2 Y=10"));
    assert!(stdout.contains("collapse-edge:A|Y|B -> A.B.Y"));
}

#[test]
fn broken_config_is_reported() {
    let ws = Workspace::new();
    let query = ws.write("pair.json", PAIR);
    let config = ws.write("config.toml", "[planner]\nunknown = 1\n");
    qgraph(&config)
        .arg("validate")
        .arg(&query)
        .assert()
        .failure()
        .code(1);
}

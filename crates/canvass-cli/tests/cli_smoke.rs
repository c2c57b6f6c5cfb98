use assert_cmd::Command;
use predicates::str::contains;
use tempfile::TempDir;

fn canvass() -> Command {
    Command::cargo_bin("canvass").unwrap()
}

#[test]
fn init_writes_a_sample_definition_once() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("survey.yaml");

    canvass()
        .arg("init")
        .arg("--config")
        .arg(&config)
        .assert()
        .success()
        .stderr(contains("created"));
    assert!(config.exists());

    canvass()
        .arg("init")
        .arg("--config")
        .arg(&config)
        .assert()
        .success()
        .stderr(contains("already exists"));
}

#[test]
fn create_rejects_an_invalid_definition() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("survey.yaml");
    std::fs::write(&config, "version: 1\ntitle: Empty\nquestions: []\nsubjects: []\n").unwrap();

    canvass()
        .arg("create")
        .arg("--config")
        .arg(&config)
        .arg("--db")
        .arg(dir.path().join("c.db"))
        .assert()
        .code(2)
        .stderr(contains("config error"));
}

#[test]
fn full_fake_run_then_analyze() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("survey.yaml");
    let db = dir.path().join("c.db");

    canvass().arg("init").arg("--config").arg(&config).assert().success();

    let out = canvass()
        .arg("create")
        .arg("--config")
        .arg(&config)
        .arg("--db")
        .arg(&db)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let survey_id = String::from_utf8(out).unwrap().trim().to_string();
    assert_eq!(survey_id, "1");

    canvass()
        .arg("run")
        .arg(&survey_id)
        .arg("--config")
        .arg(&config)
        .arg("--db")
        .arg(&db)
        .arg("--provider")
        .arg("fake")
        .assert()
        .success()
        .stderr(contains("completed"));

    canvass()
        .arg("progress")
        .arg(&survey_id)
        .arg("--db")
        .arg(&db)
        .assert()
        .success()
        .stderr(contains("100.0%"));

    canvass()
        .arg("analyze")
        .arg(&survey_id)
        .arg("--config")
        .arg(&config)
        .arg("--db")
        .arg(&db)
        .assert()
        .success()
        .stderr(contains("analysis v1"));

    canvass()
        .arg("aggregate")
        .arg("insights")
        .arg("--config")
        .arg(&config)
        .arg("--db")
        .arg(&db)
        .assert()
        .success()
        .stderr(contains("responses from 3 subjects"));
}

#[test]
fn run_with_unknown_provider_is_a_config_error() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("survey.yaml");
    canvass().arg("init").arg("--config").arg(&config).assert().success();

    canvass()
        .arg("run")
        .arg("1")
        .arg("--config")
        .arg(&config)
        .arg("--db")
        .arg(dir.path().join("c.db"))
        .arg("--provider")
        .arg("carrier-pigeon")
        .assert()
        .code(2)
        .stderr(contains("unknown provider"));
}

#[test]
fn analyze_without_responses_fails_cleanly() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("survey.yaml");
    let db = dir.path().join("c.db");
    canvass().arg("init").arg("--config").arg(&config).assert().success();
    canvass()
        .arg("create")
        .arg("--config")
        .arg(&config)
        .arg("--db")
        .arg(&db)
        .assert()
        .success();

    canvass()
        .arg("analyze")
        .arg("1")
        .arg("--config")
        .arg(&config)
        .arg("--db")
        .arg(&db)
        .assert()
        .code(1)
        .stderr(contains("no responses"));
}

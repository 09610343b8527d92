// tests/config_loading.rs

use std::fs;
use std::time::Duration;

use judgedag::config::{load_and_validate, load_from_path};
use judgedag::store::{BlueprintRepository, MemoryStore, ProgramRepository, fixtures};

#[test]
fn loads_full_config_and_resolves_store_paths() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir(dir.path().join("blueprints")).unwrap();
    fs::write(
        dir.path().join("programs.json"),
        r#"[{"name": "compile", "fields": [
            {"name": "source", "attr": "input"},
            {"name": "binary", "attr": "output"},
            {"name": "flags", "attr": "property"}
        ]}]"#,
    )
    .unwrap();
    fs::write(
        dir.path().join("blueprints/a+b.json"),
        r#"{"nodes": [], "links": []}"#,
    )
    .unwrap();

    let path = dir.path().join("Judgedag.toml");
    fs::write(
        &path,
        r#"
[manager]
lock_ttl = "5s"
admission_capacity = 4

[scheduler]
task_timeout = "2m"

[scheduler.timeouts]
"basic/evaluate" = "5s"

[dispatcher]
queue_capacity = 8

[server]
bind = "0.0.0.0:9000"

[store]
programs = "programs.json"

[[store.blueprint]]
id = 1
path = "blueprints/a+b.json"
"#,
    )
    .unwrap();

    let cfg = load_and_validate(&path).unwrap();
    assert_eq!(cfg.manager.lock_ttl, Duration::from_secs(5));
    assert_eq!(cfg.manager.admission_capacity, 4);
    assert_eq!(cfg.scheduler.timeout_for("basic/evaluate"), Duration::from_secs(5));
    assert_eq!(cfg.scheduler.timeout_for("compile"), Duration::from_secs(120));
    assert_eq!(cfg.dispatcher_options().queue_capacity, 8);
    assert_eq!(cfg.bind.port(), 9000);
    assert_eq!(cfg.store.blueprint[0].path, dir.path().join("blueprints/a+b.json"));

    let store = MemoryStore::new();
    fixtures::seed(&store, &cfg.store).unwrap();
    let programs = ProgramRepository::list(&store).unwrap();
    assert_eq!(programs[0].input_arity(), 1);
    assert_eq!(programs[0].output_arity(), 1);
    assert!(BlueprintRepository::get(&store, 1).unwrap().is_some());
}

#[test]
fn invalid_values_are_config_errors() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bad.toml");
    fs::write(&path, "[manager]\nlock_ttl = \"soon\"\n").unwrap();

    let raw = load_from_path(&path).unwrap();
    assert_eq!(raw.manager.lock_ttl, "soon");

    let err = load_and_validate(&path).unwrap_err();
    assert!(err.to_string().contains("[manager].lock_ttl"), "{err}");
}

#[test]
fn malformed_toml_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.toml");
    fs::write(&path, "[manager\n").unwrap();

    let err = load_from_path(&path).unwrap_err();
    assert!(err.to_string().starts_with("TOML parsing error"));
}

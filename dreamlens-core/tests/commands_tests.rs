// tests/commands_tests.rs
// Data-root bootstrap, config loading and Commands::open end to end.

use std::fs;
use std::path::Path;

use rusqlite::{params, Connection};

use dreamlens_core::commands::{ensure_initialized, Commands};
use dreamlens_core::config::{ClassifierMode, CoreConfig};
use dreamlens_core::error::StoreLoadError;
use dreamlens_core::services::vector_store::{encode_vector, EmbeddingProvider, HashEmbedding};

const REFERENCE_CSV: &str = "\
dream,archetype
flying over a city at night,Explorer
rescuing a child from a fire,Hero
an old man reading by candlelight,Sage
running through an endless forest,explorer
";

fn write_store(store_dir: &Path, texts: &[&str]) {
    fs::create_dir_all(store_dir).unwrap();
    let conn = Connection::open(store_dir.join("embeddings.db")).unwrap();
    conn.execute_batch(
        "CREATE TABLE meta(key TEXT PRIMARY KEY, value TEXT);
         CREATE TABLE embeddings(row_id INTEGER PRIMARY KEY, vector BLOB);
         INSERT INTO meta(key, value) VALUES ('dimension', '128');",
    )
    .unwrap();
    let embedder = HashEmbedding::new(128);
    for (i, text) in texts.iter().enumerate() {
        conn.execute(
            "INSERT INTO embeddings(row_id, vector) VALUES (?1, ?2)",
            params![i as i64, encode_vector(&embedder.embed(text))],
        )
        .unwrap();
    }
}

#[test]
fn init_is_idempotent() {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path().join(".dreamlens");

    let first = ensure_initialized(&root).expect("init");
    assert!(first.created.contains(&"config.toml".to_string()));
    assert!(first.created.contains(&"resources/default.json".to_string()));
    assert!(first.created.contains(&"logbook/actions.jsonl".to_string()));
    assert!(root.join("resources/default.json").is_file());
    assert!(root.join("logbook/actions.jsonl").is_file());

    let second = ensure_initialized(&root).expect("re-init");
    assert!(second.created.is_empty(), "{:?}", second.created);
    assert!(second.existed.contains(&"config.toml".to_string()));
}

#[test]
fn init_seeds_an_emptied_logbook() {
    let tmp = tempfile::tempdir().unwrap();
    ensure_initialized(tmp.path()).expect("init");
    let log = tmp.path().join("logbook/actions.jsonl");
    fs::write(&log, "").unwrap();

    let report = ensure_initialized(tmp.path()).expect("re-init");
    assert!(report.existed.contains(&"logbook/actions.jsonl".to_string()));
    let text = fs::read_to_string(&log).unwrap();
    assert_eq!(text.lines().count(), 1);
    assert!(text.contains("\"event\":\"system_init\""), "{text}");
}

#[test]
fn init_keeps_user_edits() {
    let tmp = tempfile::tempdir().unwrap();
    ensure_initialized(tmp.path()).expect("init");
    fs::write(tmp.path().join("config.toml"), "[server]\nport = 9100\n").unwrap();
    ensure_initialized(tmp.path()).expect("re-init");
    let text = fs::read_to_string(tmp.path().join("config.toml")).unwrap();
    assert_eq!(text, "[server]\nport = 9100\n");
}

#[test]
fn config_defaults_and_path_resolution() {
    let tmp = tempfile::tempdir().unwrap();
    let cfg = CoreConfig::load(tmp.path()).expect("defaults");
    assert_eq!(cfg.server.port, 8000);
    assert_eq!(cfg.vector_store.top_k, 10);
    assert_eq!(cfg.history.capacity, 1000);
    assert_eq!(cfg.metrics.max_extra_archetypes, 32);
    assert_eq!(cfg.classifier.mode, ClassifierMode::Command);
    assert_eq!(cfg.resources.dir, tmp.path().join("resources"));

    let abs = tmp.path().join("elsewhere");
    fs::write(
        tmp.path().join("config.toml"),
        format!(
            "[classifier]\nmode = \"mock\"\n[resources]\ndir = {:?}\n[vector_store]\ndir = \"vs\"\ntop_k = 3\n",
            abs.to_string_lossy()
        ),
    )
    .unwrap();
    let cfg = CoreConfig::load(tmp.path()).expect("custom");
    assert_eq!(cfg.classifier.mode, ClassifierMode::Mock);
    assert_eq!(cfg.resources.dir, abs);
    assert_eq!(cfg.vector_store.dir, tmp.path().join("vs"));
    assert_eq!(cfg.vector_store.top_k, 3);
    assert_eq!(cfg.server.host, "127.0.0.1");
}

#[test]
fn broken_config_is_an_error() {
    let tmp = tempfile::tempdir().unwrap();
    fs::write(tmp.path().join("config.toml"), "[server\nport = ").unwrap();
    assert!(CoreConfig::load(tmp.path()).is_err());
}

#[test]
fn fresh_root_starts_without_store() {
    let tmp = tempfile::tempdir().unwrap();
    let cmds = Commands::open(tmp.path()).expect("open");

    assert!(cmds.bar_data().labels.is_empty());
    assert!(matches!(cmds.doughnut_data(), Err(StoreLoadError::Missing(_))));
    let resources = cmds.resources("hero");
    assert_eq!(resources[0].title, "Dreams");
    assert!(cmds.metrics_text().expect("encode").contains("active_requests 0"));
}

#[test]
fn open_with_reference_store_and_mock_classifier() {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path();
    ensure_initialized(root).expect("init");
    fs::write(
        root.join("config.toml"),
        "[classifier]\nmode = \"mock\"\n[vector_store]\ntop_k = 2\n[logbook]\nenabled = true\n",
    )
    .unwrap();
    fs::write(root.join("reference/dreams.csv"), REFERENCE_CSV).unwrap();
    write_store(
        &root.join("store"),
        &[
            "flying over a city at night",
            "rescuing a child from a fire",
            "an old man reading by candlelight",
            "running through an endless forest",
        ],
    );

    let cmds = Commands::open(root).expect("open");
    assert!(cmds.store_error().is_none());

    let bar = cmds.bar_data();
    assert_eq!(bar.labels, vec!["explorer", "hero", "sage"]);
    assert_eq!(bar.values, vec![2, 1, 1]);
    assert_eq!(cmds.metrics().archetype_count("explorer"), 2);

    assert_eq!(cmds.doughnut_data().expect("store loaded"), None);

    let result = cmds
        .submit_dream("flying over a city at night")
        .expect("mock classification");
    assert_eq!(result.archetype, "lover");

    let doughnut = cmds
        .doughnut_data()
        .expect("store loaded")
        .expect("current dream set");
    assert_eq!(doughnut.values.iter().sum::<u64>(), 2);
    assert!(doughnut.value_of("explorer").unwrap_or(0) >= 1);

    let log = fs::read_to_string(root.join("logbook/actions.jsonl")).unwrap();
    assert!(log.contains("\"action\":\"classified\""), "{log}");
    assert_eq!(cmds.history(5)[0].archetype, "lover");
}

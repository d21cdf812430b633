// tests/resources_tests.rs

use std::fs;
use std::path::Path;

use dreamlens_core::services::audit::Audit;
use dreamlens_core::services::resources::{
    builtin_fallback, sanitize_archetype, ResourceBundle, ResourceLookup,
};

fn bundle_json(title: &str) -> String {
    format!(r#"[{{"title":"{title}","description":"about {title}","links":["https://example.org/{title}"]}}]"#)
}

fn lookup(dir: &Path) -> ResourceLookup {
    ResourceLookup::new(dir, "default.json", Audit::disabled())
}

fn titles(bundles: &[ResourceBundle]) -> Vec<&str> {
    bundles.iter().map(|b| b.title.as_str()).collect()
}

#[test]
fn archetype_file_wins() {
    let tmp = tempfile::tempdir().unwrap();
    fs::write(tmp.path().join("hero.json"), bundle_json("hero-reading")).unwrap();
    fs::write(tmp.path().join("default.json"), bundle_json("general")).unwrap();

    let got = lookup(tmp.path()).get_resources("Hero");
    assert_eq!(titles(&got), vec!["hero-reading"]);
    assert_eq!(got[0].links, vec!["https://example.org/hero-reading"]);
}

#[test]
fn display_names_resolve_to_the_archetype_file() {
    let tmp = tempfile::tempdir().unwrap();
    fs::write(tmp.path().join("hero.json"), bundle_json("hero-reading")).unwrap();
    fs::write(tmp.path().join("default.json"), bundle_json("general")).unwrap();

    assert_eq!(sanitize_archetype("The Hero"), "hero");
    let rl = lookup(tmp.path());
    for name in ["The Hero", "  the hero ", "THE HERO"] {
        assert_eq!(titles(&rl.get_resources(name)), vec!["hero-reading"], "{name}");
    }
}

#[test]
fn missing_archetype_file_uses_default() {
    let tmp = tempfile::tempdir().unwrap();
    fs::write(tmp.path().join("default.json"), bundle_json("general")).unwrap();
    let got = lookup(tmp.path()).get_resources("jester");
    assert_eq!(titles(&got), vec!["general"]);
}

#[test]
fn missing_archetype_and_default_uses_builtin() {
    let tmp = tempfile::tempdir().unwrap();
    let got = lookup(tmp.path()).get_resources("jester");
    assert_eq!(got, builtin_fallback());
    assert!(!got.is_empty());
}

#[test]
fn missing_resources_dir_uses_builtin() {
    let tmp = tempfile::tempdir().unwrap();
    let got = lookup(&tmp.path().join("nope")).get_resources("hero");
    assert_eq!(got, builtin_fallback());
}

#[test]
fn malformed_archetype_file_skips_default() {
    let tmp = tempfile::tempdir().unwrap();
    fs::write(tmp.path().join("sage.json"), "{ not json").unwrap();
    fs::write(tmp.path().join("default.json"), bundle_json("general")).unwrap();
    let got = lookup(tmp.path()).get_resources("sage");
    assert_eq!(got, builtin_fallback());
}

#[test]
fn malformed_default_uses_builtin() {
    let tmp = tempfile::tempdir().unwrap();
    fs::write(tmp.path().join("default.json"), "[{\"title\": 3}]").unwrap();
    let got = lookup(tmp.path()).get_resources("sage");
    assert_eq!(got, builtin_fallback());
}

#[test]
fn traversal_never_leaves_the_resources_dir() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = tmp.path().join("resources");
    fs::create_dir_all(&dir).unwrap();
    // a tempting target one level up
    fs::write(tmp.path().join("passwd.json"), bundle_json("secret")).unwrap();
    fs::write(dir.join("default.json"), bundle_json("general")).unwrap();

    assert_eq!(sanitize_archetype("../../etc/passwd"), "passwd");
    let rl = lookup(&dir);
    for attempt in ["../../etc/passwd", "../passwd", "..\\passwd", "%2e%2e/passwd"] {
        let got = rl.get_resources(attempt);
        assert_eq!(titles(&got), vec!["general"], "{attempt}");
    }
}

#[test]
fn name_that_sanitizes_to_nothing_uses_default() {
    let tmp = tempfile::tempdir().unwrap();
    fs::write(tmp.path().join("default.json"), bundle_json("general")).unwrap();
    let rl = lookup(tmp.path());
    assert_eq!(titles(&rl.get_resources("...")), vec!["general"]);
    assert_eq!(titles(&rl.get_resources("")), vec!["general"]);
}

#[test]
fn edits_are_picked_up_without_restart() {
    let tmp = tempfile::tempdir().unwrap();
    fs::write(tmp.path().join("default.json"), bundle_json("general")).unwrap();
    let rl = lookup(tmp.path());
    assert_eq!(titles(&rl.get_resources("lover")), vec!["general"]);

    fs::write(tmp.path().join("lover.json"), bundle_json("lover-reading")).unwrap();
    assert_eq!(titles(&rl.get_resources("lover")), vec!["lover-reading"]);
}

#[test]
fn links_default_to_empty() {
    let tmp = tempfile::tempdir().unwrap();
    fs::write(
        tmp.path().join("rebel.json"),
        r#"[{"title":"Rebel","description":"Breaking rules"}]"#,
    )
    .unwrap();
    let got = lookup(tmp.path()).get_resources("rebel");
    assert_eq!(got.len(), 1);
    assert!(got[0].links.is_empty());
}

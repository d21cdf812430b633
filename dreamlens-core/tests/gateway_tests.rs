// tests/gateway_tests.rs
// Classification gateway through the Commands facade: counters, distribution,
// current-dream context and history.

use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

use serde_json::{json, Value};

use dreamlens_core::commands::Commands;
use dreamlens_core::config::CoreConfig;
use dreamlens_core::error::{ClassificationError, StoreLoadError, SubmitError};
use dreamlens_core::services::classifier::{Classifier, MockClassifier};
use dreamlens_core::services::metrics::SubmissionStatus;
use dreamlens_core::services::reference::ReferenceTable;

struct FixedClassifier(&'static str);

impl Classifier for FixedClassifier {
    fn classify(&self, dream_text: &str) -> Result<Value, ClassificationError> {
        Ok(json!({
            "archetype": self.0,
            "descriptive_content": { "dream": dream_text }
        }))
    }
}

struct PayloadClassifier(Value);

impl Classifier for PayloadClassifier {
    fn classify(&self, _dream_text: &str) -> Result<Value, ClassificationError> {
        Ok(self.0.clone())
    }
}

/// Uses the dream text itself as the archetype label.
struct EchoClassifier;

impl Classifier for EchoClassifier {
    fn classify(&self, dream_text: &str) -> Result<Value, ClassificationError> {
        Ok(json!({ "archetype": dream_text }))
    }
}

struct DownClassifier;

impl Classifier for DownClassifier {
    fn classify(&self, _dream_text: &str) -> Result<Value, ClassificationError> {
        Err(ClassificationError::Unavailable("model offline".into()))
    }
}

fn quiet_config() -> CoreConfig {
    let mut cfg = CoreConfig::default();
    cfg.logbook.enabled = false;
    cfg
}

fn no_store() -> Result<Arc<dyn dreamlens_core::services::SimilarityIndex>, StoreLoadError> {
    Err(StoreLoadError::Missing(PathBuf::from("store/embeddings.db")))
}

fn reference() -> ReferenceTable {
    ReferenceTable::from_archetypes(["hero", "explorer", "hero", "sage"])
}

fn commands_with(classifier: Arc<dyn Classifier>) -> Commands {
    Commands::from_parts(quiet_config(), classifier, reference(), no_store()).expect("commands")
}

#[test]
fn explorer_submission_leaves_bar_data_and_bumps_distribution() {
    let cmds = commands_with(Arc::new(FixedClassifier("Explorer")));
    let bar_before = cmds.bar_data();
    let explorer_before = cmds.metrics().archetype_count("explorer");
    assert_eq!(explorer_before, 1, "seeded from the reference table");

    let result = cmds
        .submit_dream("I was flying over a city")
        .expect("classified");
    assert_eq!(result.archetype, "explorer");

    assert_eq!(cmds.bar_data(), bar_before);
    assert_eq!(cmds.metrics().archetype_count("explorer"), explorer_before + 1);
    assert_eq!(cmds.metrics().archetype_count("hero"), 2);
    assert_eq!(cmds.metrics().submissions(SubmissionStatus::Success), 1);
    assert_eq!(cmds.metrics().submissions(SubmissionStatus::Error), 0);

    assert_eq!(
        cmds.context().current_dream_text().as_deref(),
        Some("I was flying over a city")
    );
    assert_eq!(cmds.context().current_archetype().as_deref(), Some("explorer"));

    let history = cmds.history(10);
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].archetype, "explorer");
    assert_eq!(cmds.metrics().processing_samples().0, 1);
}

#[test]
fn failed_classification_counts_error_and_changes_nothing_else() {
    let cmds = commands_with(Arc::new(DownClassifier));
    let err = cmds.submit_dream("a dark forest").unwrap_err();
    assert!(matches!(
        err,
        SubmitError::Classification(ClassificationError::Unavailable(_))
    ));

    assert_eq!(cmds.metrics().submissions(SubmissionStatus::Error), 1);
    assert_eq!(cmds.metrics().submissions(SubmissionStatus::Success), 0);
    assert!(cmds.context().current_dream_text().is_none());
    assert!(cmds.context().current_archetype().is_none());
    assert!(cmds.history(10).is_empty());
    assert_eq!(cmds.metrics().archetype_count("hero"), 2);
    // the classifier call is timed on both outcomes
    assert_eq!(cmds.metrics().processing_samples().0, 1);
}

#[test]
fn blank_dream_is_not_a_classification_attempt() {
    let cmds = commands_with(Arc::new(FixedClassifier("hero")));
    assert!(matches!(cmds.submit_dream("   \n"), Err(SubmitError::EmptyDream)));
    assert_eq!(cmds.metrics().submissions(SubmissionStatus::Success), 0);
    assert_eq!(cmds.metrics().submissions(SubmissionStatus::Error), 0);
    assert_eq!(cmds.metrics().processing_samples().0, 0);
}

#[test]
fn payload_without_usable_archetype_is_an_error() {
    let cases = [
        (json!(["not", "an", "object"]), "malformed"),
        (json!({ "descriptive_content": "x" }), "missing"),
        (json!({ "archetype": "   " }), "missing"),
        (json!({ "archetype": 7 }), "malformed"),
    ];
    for (payload, expected) in cases {
        let cmds = commands_with(Arc::new(PayloadClassifier(payload.clone())));
        let err = cmds.submit_dream("dream").unwrap_err();
        match (expected, err) {
            ("missing", SubmitError::Classification(ClassificationError::MissingArchetype)) => {}
            ("malformed", SubmitError::Classification(ClassificationError::Malformed(_))) => {}
            (_, other) => panic!("payload {payload}: unexpected {other:?}"),
        }
        assert_eq!(cmds.metrics().submissions(SubmissionStatus::Error), 1);
    }
}

#[test]
fn unknown_labels_pass_through_until_the_cap() {
    let mut cfg = quiet_config();
    cfg.metrics.max_extra_archetypes = 1;
    let cmds = Commands::from_parts(cfg, Arc::new(EchoClassifier), reference(), no_store())
        .expect("commands");

    let r = cmds.submit_dream("The Trickster").expect("classified");
    assert_eq!(r.archetype, "trickster");
    assert_eq!(cmds.metrics().archetype_count("trickster"), 1);

    // second unseen label overflows; the result itself still carries it
    let r = cmds.submit_dream("shadow").expect("classified");
    assert_eq!(r.archetype, "shadow");
    assert_eq!(cmds.metrics().archetype_count("other"), 1);
    assert_eq!(cmds.context().current_archetype().as_deref(), Some("shadow"));
}

#[test]
fn mock_payload_flattens_in_payload_order() {
    let cmds = commands_with(Arc::new(MockClassifier));
    let result = cmds.submit_dream("walking through a market").expect("classified");
    assert_eq!(result.archetype, "lover");
    let ids: Vec<String> = result.flatten().into_iter().map(|f| f.id).collect();
    assert_eq!(ids, vec!["archetype", "descriptive_content"]);
    assert_eq!(
        result.descriptive_content["dream"]["description"],
        json!("walking through a market")
    );
}

#[test]
fn history_is_bounded() {
    let mut cfg = quiet_config();
    cfg.history.capacity = 2;
    let cmds = Commands::from_parts(cfg, Arc::new(FixedClassifier("sage")), reference(), no_store())
        .expect("commands");
    for text in ["one", "two", "three"] {
        cmds.submit_dream(text).expect("classified");
    }
    let history = cmds.history(10);
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].dream, "three");
    assert_eq!(history[1].dream, "two");
}

#[test]
fn concurrent_submissions_are_all_counted() {
    let cmds = commands_with(Arc::new(FixedClassifier("explorer")));
    let threads = 8;
    let per_thread = 25;
    thread::scope(|s| {
        for t in 0..threads {
            let cmds = &cmds;
            s.spawn(move || {
                for i in 0..per_thread {
                    cmds.submit_dream(&format!("dream {t}-{i}")).expect("classified");
                }
            });
        }
    });

    let total = (threads * per_thread) as u64;
    assert_eq!(cmds.metrics().submissions(SubmissionStatus::Success), total);
    assert_eq!(cmds.metrics().archetype_count("explorer"), 1 + total as i64);
    assert_eq!(cmds.history(usize::MAX).len(), total as usize);
    assert_eq!(cmds.metrics().processing_samples().0, total);
}

#[test]
fn rarity_uses_override_then_current_archetype() {
    let cmds = commands_with(Arc::new(FixedClassifier("hero")));
    assert!(cmds.rarity_score(None).is_none());

    let sage = cmds.rarity_score(Some("Sage")).expect("override");
    assert_eq!(sage.archetype, "sage");
    assert!((0.0..=100.0).contains(&sage.score));

    cmds.submit_dream("I rescued a child").expect("classified");
    let current = cmds.rarity_score(Some("  ")).expect("current archetype");
    assert_eq!(current.archetype, "hero");
}

#[test]
fn doughnut_reports_store_failure() {
    let cmds = commands_with(Arc::new(FixedClassifier("hero")));
    assert!(matches!(cmds.doughnut_data(), Err(StoreLoadError::Missing(_))));
    assert!(cmds.store_error().is_some());
}

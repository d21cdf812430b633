// src/services/classifier.rs
//! Classification gateway: external classifier → normalized result → shared state.
//!
//! The classifier itself is opaque. It maps dream text to a JSON object that
//! carries at least an `archetype` string plus descriptive content. The
//! gateway owns everything around that call: timing, outcome counters, the
//! distribution gauge, the current-dream context and the history log.

use std::io::{ErrorKind, Write};
use std::panic::{self, AssertUnwindSafe};
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::config::{ClassifierConfig, ClassifierMode};
use crate::error::ClassificationError;
use crate::services::audit::Audit;
use crate::services::history::{DreamContext, DreamSubmission, HistoryEntry, HistoryLog};
use crate::services::metrics::{MetricsRegistry, SubmissionStatus};
use crate::services::reference::normalize_label;
use crate::utils::logbook::preview;

/// Capability: the external text classifier.
pub trait Classifier: Send + Sync {
    /// Raw payload for `dream_text`. Shape validation happens in the gateway.
    fn classify(&self, dream_text: &str) -> Result<Value, ClassificationError>;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassificationResult {
    /// Normalized label (lower-case, no leading "the ").
    pub archetype: String,
    pub descriptive_content: Value,
    /// Full payload in the order the classifier produced it.
    #[serde(skip)]
    pub payload: Map<String, Value>,
}

/// One `{id, text}` pair of the flattened payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PayloadField {
    pub id: String,
    pub text: Value,
}

impl ClassificationResult {
    pub fn from_payload(payload: Value) -> Result<Self, ClassificationError> {
        let kind = kind_of(&payload);
        let Value::Object(map) = payload else {
            return Err(ClassificationError::Malformed(format!(
                "expected a JSON object, got {kind}"
            )));
        };
        let archetype = match map.get("archetype") {
            Some(Value::String(s)) if !s.trim().is_empty() => normalize_label(s),
            Some(Value::String(_)) | None => return Err(ClassificationError::MissingArchetype),
            Some(other) => {
                return Err(ClassificationError::Malformed(format!(
                    "`archetype` must be a string, got {}",
                    kind_of(other)
                )))
            }
        };
        let descriptive_content = map
            .get("descriptive_content")
            .cloned()
            .unwrap_or(Value::Null);
        Ok(Self {
            archetype,
            descriptive_content,
            payload: map,
        })
    }

    /// Top-level payload fields as an ordered list of `{id, text}` pairs.
    pub fn flatten(&self) -> Vec<PayloadField> {
        self.payload
            .iter()
            .map(|(k, v)| PayloadField {
                id: k.clone(),
                text: v.clone(),
            })
            .collect()
    }
}

fn kind_of(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ---------- classifier implementations ----------

/// Runs an external program: dream text on stdin, JSON payload on stdout.
#[derive(Debug, Clone)]
pub struct CommandClassifier {
    program: String,
    args: Vec<String>,
}

impl CommandClassifier {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }
}

impl Classifier for CommandClassifier {
    fn classify(&self, dream_text: &str) -> Result<Value, ClassificationError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| ClassificationError::Unavailable(format!("spawn {}: {e}", self.program)))?;

        // stdin is fed from its own thread so a child that answers before
        // draining its input (or fills the stdout pipe first) cannot stall us
        let stdin = child.stdin.take();
        let (out, written) = thread::scope(|s| {
            let writer = stdin.map(|mut stdin| s.spawn(move || stdin.write_all(dream_text.as_bytes())));
            let out = child.wait_with_output();
            (out, writer.map(|w| w.join()))
        });
        let out = out.map_err(|e| ClassificationError::Unavailable(format!("wait: {e}")))?;

        match written {
            None | Some(Ok(Ok(()))) => {}
            Some(Ok(Err(e))) if e.kind() == ErrorKind::BrokenPipe => {
                tracing::debug!(program = %self.program, "classifier closed stdin before reading it all");
            }
            Some(Ok(Err(e))) => {
                return Err(ClassificationError::Unavailable(format!("write stdin: {e}")));
            }
            Some(Err(_)) => {
                return Err(ClassificationError::Unavailable("stdin writer panicked".into()));
            }
        }
        if !out.status.success() {
            return Err(ClassificationError::Failed {
                status: out.status.to_string(),
                stderr: preview(&String::from_utf8_lossy(&out.stderr), 240),
            });
        }
        serde_json::from_slice(&out.stdout)
            .map_err(|e| ClassificationError::Malformed(format!("stdout is not JSON: {e}")))
    }
}

/// Fixed sample interpretation; lets the front end run without the model.
#[derive(Debug, Clone, Default)]
pub struct MockClassifier;

impl Classifier for MockClassifier {
    fn classify(&self, dream_text: &str) -> Result<Value, ClassificationError> {
        Ok(json!({
            "archetype": "lover",
            "descriptive_content": {
                "archetype": {
                    "name": "The Everyman",
                    "description": "A symbol of ordinary, everyday life and experiences."
                },
                "dream": { "description": dream_text },
                "interpretation": {
                    "lesson1": {
                        "title": "Our Conscious Actions are Motivated by our Unconscious Ones",
                        "text": "The dream may be highlighting unconscious motivations or desires that are driving your actions in waking life."
                    },
                    "lesson2": {
                        "title": "Talk A Lot And You Will Eventually Betray Yourself",
                        "text": "The dream could be suggesting that you need to examine your own weaknesses and biases, rather than relying on surface-level knowledge or assumptions."
                    },
                    "actionableNotes": [
                        {
                            "title": "What are you lacking?",
                            "text": "Consider what areas of your life may be lacking or compensating for shortcomings. Look beyond the qualities you present to others and examine your real defects."
                        }
                    ]
                }
            }
        }))
    }
}

/// Build the classifier selected by config.
pub fn from_config(cfg: &ClassifierConfig) -> Arc<dyn Classifier> {
    match cfg.mode {
        ClassifierMode::Command => {
            tracing::info!(program = %cfg.program, args = ?cfg.args, "using command classifier");
            Arc::new(CommandClassifier::new(cfg.program.clone(), cfg.args.clone()))
        }
        ClassifierMode::Mock => {
            tracing::info!("using mock classifier");
            Arc::new(MockClassifier)
        }
    }
}

// ---------- gateway ----------

pub struct ClassificationGateway {
    classifier: Arc<dyn Classifier>,
    metrics: Arc<MetricsRegistry>,
    context: Arc<DreamContext>,
    history: Arc<HistoryLog>,
    audit: Audit,
}

impl ClassificationGateway {
    pub fn new(
        classifier: Arc<dyn Classifier>,
        metrics: Arc<MetricsRegistry>,
        context: Arc<DreamContext>,
        history: Arc<HistoryLog>,
        audit: Audit,
    ) -> Self {
        Self {
            classifier,
            metrics,
            context,
            history,
            audit,
        }
    }

    /// Classify one submission.
    ///
    /// Success: `submissions_total{success}` +1, distribution gauge +1,
    /// current dream/archetype overwritten, history appended.
    /// Failure (a panicking classifier included): `submissions_total{error}` +1
    /// and nothing else changes.
    pub fn classify(
        &self,
        submission: &DreamSubmission,
    ) -> Result<ClassificationResult, ClassificationError> {
        let started = Instant::now();
        let raw = panic::catch_unwind(AssertUnwindSafe(|| {
            self.classifier.classify(&submission.text)
        }))
        .unwrap_or_else(|_| Err(ClassificationError::Unavailable("classifier panicked".into())));
        let elapsed = started.elapsed();
        self.metrics.observe_processing(elapsed);

        match raw.and_then(ClassificationResult::from_payload) {
            Ok(result) => {
                self.metrics.record_submission(SubmissionStatus::Success);
                let label = self.metrics.record_archetype(&result.archetype);
                self.context.set_current(&submission.text, &result.archetype);
                let evicted = self.history.push(HistoryEntry {
                    dream: submission.text.clone(),
                    archetype: result.archetype.clone(),
                    timestamp: Utc::now(),
                });
                tracing::info!(
                    submission = %submission.id,
                    archetype = %result.archetype,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "dream classified"
                );
                self.audit.record_action(
                    "gateway",
                    "classified",
                    &json!({
                        "submission_id": submission.id.to_string(),
                        "archetype": result.archetype,
                        "metric_label": label,
                        "history_evicted": evicted,
                        "dream_preview": self.audit.preview(&submission.text),
                    }),
                    "low",
                );
                Ok(result)
            }
            Err(e) => {
                self.metrics.record_submission(SubmissionStatus::Error);
                tracing::warn!(submission = %submission.id, "classification failed: {e}");
                self.audit.record_action(
                    "gateway",
                    "classification_failed",
                    &json!({
                        "submission_id": submission.id.to_string(),
                        "error": e.to_string(),
                    }),
                    "medium",
                );
                Err(e)
            }
        }
    }
}

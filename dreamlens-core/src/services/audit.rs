//! services/audit.rs
//! Action logbook: one JSONL line per notable service event.
//!
//! - Writes `<logbook>/actions.jsonl`.
//! - Mirrors each entry to `tracing` at debug level so the line is visible in
//!   the process log even when the file sink is disabled.

use chrono::Utc;
use serde_json::{json, Value};
use std::path::PathBuf;

use crate::config::LogbookConfig;
use crate::utils::logbook::{append_jsonl, preview};

#[derive(Debug, Clone)]
pub struct Audit {
    enabled: bool,
    actions: PathBuf,
    preview_len: usize,
}

impl Audit {
    pub fn from_config(cfg: &LogbookConfig) -> Self {
        Self {
            enabled: cfg.enabled,
            actions: cfg.path.join("actions.jsonl"),
            preview_len: cfg.preview_len,
        }
    }

    /// Audit sink that only mirrors to `tracing`.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            actions: PathBuf::new(),
            preview_len: 0,
        }
    }

    /// Record a generic action event.
    ///
    /// # Arguments
    /// * `agent`: Logical component name (e.g., `"gateway"`, `"resources"`).
    /// * `action`: Short verb label (e.g., `"classified"`, `"fallback_builtin"`).
    /// * `details`: Arbitrary JSON payload.
    /// * `severity`: `"low" | "medium" | "high"`.
    ///
    /// Write failures are logged and swallowed; auditing never fails a request.
    pub fn record_action(&self, agent: &str, action: &str, details: &Value, severity: &str) {
        tracing::debug!(agent, action, severity, %details, "audit");
        if !self.enabled {
            return;
        }
        let entry = json!({
            "timestamp": Utc::now().to_rfc3339(),
            "event": "action",
            "agent": agent,
            "action": action,
            "severity": severity,
            "details": details
        });
        if let Err(e) = append_jsonl(&self.actions, &entry) {
            tracing::warn!(path = %self.actions.display(), "audit append failed: {e}");
        }
    }

    /// Privacy-safe preview of dream text for audit payloads.
    pub fn preview(&self, text: &str) -> String {
        preview(text, self.preview_len)
    }
}

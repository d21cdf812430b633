// src/services/resources.rs
//! Archetype -> curated reading list.
//!
//! Files are read on every request, so edits under the resources dir show up
//! without a restart. Lookup never fails from the caller's point of view:
//!
//! 1. `<dir>/<sanitized archetype>.json`
//! 2. `<dir>/<default_file>` when (1) does not exist or the name sanitizes to ""
//! 3. [`builtin_fallback`] for anything else (missing default, bad JSON, I/O, escape)

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::config::ResourcesConfig;
use crate::error::ResourceLookupError;
use crate::services::audit::Audit;
use crate::services::reference::normalize_label;
use crate::utils::path::{assert_within_root_abs, sanitize_segment};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceBundle {
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub links: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ResourceLookup {
    dir: PathBuf,
    default_file: String,
    audit: Audit,
}

/// Safe file stem for an archetype name. The name is normalized the same way
/// classifier labels are ("The Hero" -> `hero`), then reduced by
/// [`sanitize_segment`].
pub fn sanitize_archetype(raw: &str) -> String {
    sanitize_segment(&normalize_label(raw))
}

/// Compiled-in reading list, used when nothing on disk is usable.
pub fn builtin_fallback() -> Vec<ResourceBundle> {
    vec![
        ResourceBundle {
            title: "Man and His Symbols".into(),
            description: "Carl Jung's introduction to archetypes and the symbolic language of dreams."
                .into(),
            links: vec!["https://en.wikipedia.org/wiki/Man_and_His_Symbols".into()],
        },
        ResourceBundle {
            title: "Jungian archetypes".into(),
            description: "Overview of the recurring figures Jung identified in myths and dreams."
                .into(),
            links: vec!["https://en.wikipedia.org/wiki/Jungian_archetypes".into()],
        },
    ]
}

impl ResourceLookup {
    pub fn new(dir: impl Into<PathBuf>, default_file: impl Into<String>, audit: Audit) -> Self {
        Self {
            dir: dir.into(),
            default_file: default_file.into(),
            audit,
        }
    }

    pub fn from_config(cfg: &ResourcesConfig, audit: Audit) -> Self {
        Self::new(cfg.dir.clone(), cfg.default_file.clone(), audit)
    }

    /// Tier 1. `name` must already be sanitized.
    pub fn load_archetype_file(&self, name: &str) -> Result<Vec<ResourceBundle>, ResourceLookupError> {
        if name.is_empty() {
            return Err(ResourceLookupError::NotFound(self.dir.clone()));
        }
        self.read_bundles(&self.dir.join(format!("{name}.json")))
    }

    /// Tier 2.
    pub fn load_default_file(&self) -> Result<Vec<ResourceBundle>, ResourceLookupError> {
        self.read_bundles(&self.dir.join(&self.default_file))
    }

    pub fn get_resources(&self, archetype: &str) -> Vec<ResourceBundle> {
        let name = sanitize_archetype(archetype);
        let first = self.load_archetype_file(&name);
        let (tier, outcome) = match first {
            Ok(bundles) => return bundles,
            Err(ResourceLookupError::NotFound(path)) => {
                tracing::debug!(archetype, path = %path.display(), "no archetype resources; using default file");
                ("default", self.load_default_file())
            }
            Err(e) => ("archetype", Err(e)),
        };
        match outcome {
            Ok(bundles) => bundles,
            Err(e) => {
                tracing::warn!(archetype, tier, "resource lookup fell back to builtin list: {e}");
                self.audit.record_action(
                    "resources",
                    "fallback_builtin",
                    &json!({ "archetype": name, "tier": tier, "error": e.to_string() }),
                    "low",
                );
                builtin_fallback()
            }
        }
    }

    fn read_bundles(&self, path: &Path) -> Result<Vec<ResourceBundle>, ResourceLookupError> {
        if !path.is_file() {
            return Err(ResourceLookupError::NotFound(path.to_path_buf()));
        }
        let checked = assert_within_root_abs(&self.dir, path)
            .map_err(|e| ResourceLookupError::Escapes(e.to_string()))?;
        let text = fs::read_to_string(&checked).map_err(|source| match source.kind() {
            ErrorKind::NotFound => ResourceLookupError::NotFound(checked.clone()),
            _ => ResourceLookupError::Io {
                path: checked.clone(),
                source,
            },
        })?;
        serde_json::from_str(&text).map_err(|e| ResourceLookupError::Malformed {
            path: checked,
            reason: e.to_string(),
        })
    }
}

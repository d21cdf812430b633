// src/services/reference.rs
//! Reference table: the static dataset of known dreams, one archetype per row.
//!
//! Loaded once at startup and never mutated. `row_id` is the positional index
//! of the row and is the key similarity hits are resolved against.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Serialize;

use crate::error::ReferenceError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReferenceRecord {
    pub row_id: usize,
    pub archetype: String,
}

#[derive(Debug, Clone, Default)]
pub struct ReferenceTable {
    records: Vec<ReferenceRecord>,
}

impl ReferenceTable {
    /// Build from archetype labels in row order.
    pub fn from_archetypes<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let records = labels
            .into_iter()
            .enumerate()
            .map(|(row_id, a)| ReferenceRecord {
                row_id,
                archetype: normalize_label(&a.into()),
            })
            .collect();
        Self { records }
    }

    /// Read the dataset CSV; only `column` is kept. Blank cells keep their row
    /// (so row ids stay aligned with the embedding store) under `unknown`.
    pub fn load_csv(path: &Path, column: &str) -> Result<Self, ReferenceError> {
        let csv_err = |e: csv::Error| ReferenceError::Csv {
            path: path.to_path_buf(),
            reason: e.to_string(),
        };
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_path(path)
            .map_err(csv_err)?;

        let headers = reader.headers().map_err(csv_err)?.clone();
        let idx = headers
            .iter()
            .position(|h| h.trim().eq_ignore_ascii_case(column))
            .ok_or_else(|| ReferenceError::MissingColumn {
                path: path.to_path_buf(),
                column: column.to_string(),
            })?;

        let mut labels = Vec::new();
        for row in reader.records() {
            let row = row.map_err(csv_err)?;
            let cell = row.get(idx).unwrap_or("").trim();
            labels.push(if cell.is_empty() { "unknown" } else { cell }.to_string());
        }
        tracing::info!(rows = labels.len(), path = %path.display(), "reference table loaded");
        Ok(Self::from_archetypes(labels))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[ReferenceRecord] {
        &self.records
    }

    /// Archetype for a positional row id, if the row exists.
    pub fn archetype_of(&self, row_id: usize) -> Option<&str> {
        self.records.get(row_id).map(|r| r.archetype.as_str())
    }

    /// Row count per archetype, keyed in ascending label order.
    pub fn counts(&self) -> BTreeMap<String, u64> {
        let mut out = BTreeMap::new();
        for r in &self.records {
            *out.entry(r.archetype.clone()).or_insert(0u64) += 1;
        }
        out
    }
}

/// Canonical archetype label: trimmed, lower-case, without a leading "the ".
pub fn normalize_label(raw: &str) -> String {
    let t = raw.trim().to_lowercase();
    match t.strip_prefix("the ") {
        Some(rest) => rest.trim().to_string(),
        None => t,
    }
}

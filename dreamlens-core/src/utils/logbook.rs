// src/utils/logbook.rs
use anyhow::Result;
use serde::Serialize;
use std::{fs, io::Write, path::Path};

/// Append one serialized value as a JSONL line, creating parents as needed.
pub fn append_jsonl<S: Serialize>(path: &Path, value: &S) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string(value)?;
    let mut f = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    writeln!(f, "{}", json)?;
    Ok(())
}

/// Single-line preview: newlines flattened, truncated on a char boundary.
pub fn preview(content: &str, max_chars: usize) -> String {
    let flat = content.replace('\n', " ");
    if flat.chars().count() <= max_chars {
        return flat;
    }
    let mut out: String = flat.chars().take(max_chars).collect();
    out.push('…');
    out
}

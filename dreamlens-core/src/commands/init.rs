// src/commands/init.rs

use anyhow::{Context, Result};
use chrono::Utc;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct InitReport {
    pub root: PathBuf,
    pub created: Vec<String>,
    pub existed: Vec<String>,
}

/// Resolve the data root. `DREAMLENS_ROOT` overrides the `.dreamlens` default.
pub fn dreamlens_root() -> PathBuf {
    std::env::var_os("DREAMLENS_ROOT")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(".dreamlens"))
}

/// Create whatever is missing under `root`. Existing files are never touched.
pub fn ensure_initialized(root: &Path) -> Result<InitReport> {
    let mut scaffold = Scaffold::new(root);

    for dir in [".", "resources", "reference", "store", "logbook"] {
        scaffold.dir(dir)?;
    }
    scaffold.file("config.toml", DEFAULT_CONFIG_TOML)?;
    scaffold.file("resources/default.json", DEFAULT_RESOURCES_JSON)?;

    let init_event = format!(
        r#"{{"timestamp":"{}","event":"system_init","agent":"system","details":{{"version":"{}"}}}}"#,
        Utc::now().to_rfc3339(),
        env!("CARGO_PKG_VERSION")
    );
    scaffold.seeded_jsonl("logbook/actions.jsonl", &init_event)?;

    let report = scaffold.finish();
    if !report.created.is_empty() {
        tracing::info!(root = %report.root.display(), created = ?report.created, "data root initialized");
    }
    Ok(report)
}

/// Tracks what one initialization pass created versus found in place.
/// Entries are root-relative, `.` being the root itself.
struct Scaffold {
    root: PathBuf,
    created: Vec<String>,
    existed: Vec<String>,
}

impl Scaffold {
    fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            created: Vec::new(),
            existed: Vec::new(),
        }
    }

    fn dir(&mut self, rel: &str) -> Result<()> {
        let p = self.root.join(rel);
        if p.is_dir() {
            self.existed.push(rel.to_string());
            return Ok(());
        }
        fs::create_dir_all(&p).with_context(|| format!("creating {}", p.display()))?;
        self.created.push(rel.to_string());
        Ok(())
    }

    fn file(&mut self, rel: &str, contents: &str) -> Result<()> {
        let p = self.root.join(rel);
        if p.exists() {
            self.existed.push(rel.to_string());
            return Ok(());
        }
        write_atomic(&p, contents.as_bytes())?;
        self.created.push(rel.to_string());
        Ok(())
    }

    /// Like [`Scaffold::file`], but an existing empty log also gets the seed line.
    fn seeded_jsonl(&mut self, rel: &str, line: &str) -> Result<()> {
        let p = self.root.join(rel);
        if !p.exists() {
            return self.file(rel, &format!("{line}\n"));
        }
        self.existed.push(rel.to_string());
        if fs::metadata(&p)?.len() == 0 {
            let mut f = OpenOptions::new().append(true).open(&p)?;
            writeln!(f, "{line}")?;
        }
        Ok(())
    }

    fn finish(self) -> InitReport {
        InitReport {
            root: self.root,
            created: self.created,
            existed: self.existed,
        }
    }
}

/// Write via a sibling temp file and rename, so readers never see a partial file.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
    }
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, bytes).with_context(|| format!("writing {}", tmp.display()))?;
    fs::rename(&tmp, path)
        .with_context(|| format!("renaming {} to {}", tmp.display(), path.display()))
}

// ---------- defaults ----------

const DEFAULT_CONFIG_TOML: &str = r#"[system]
name = "dreamlens"
version = "0.1.0"

[server]
host = "127.0.0.1"
port = 8000

[reference]
csv_path = "reference/dreams.csv"
archetype_column = "archetype"

[vector_store]
dir = "store"
file_name = "embeddings.db"
cpu_only = true
top_k = 10

[classifier]
# "command" runs `program args...` with the dream on stdin; "mock" returns a fixed sample.
mode = "command"
program = "python"
args = ["-m", "scripts.the_big_dipper"]

[resources]
dir = "resources"
default_file = "default.json"

[history]
capacity = 1000

[metrics]
max_extra_archetypes = 32

[logbook]
enabled = true
path = "logbook"
preview_len = 160
"#;

const DEFAULT_RESOURCES_JSON: &str = r#"[
  {
    "title": "Dreams",
    "description": "Collected essays by Carl Jung on dream analysis and the unconscious.",
    "links": ["https://en.wikipedia.org/wiki/Dreams_(Jung_book)"]
  },
  {
    "title": "The Archetypes and the Collective Unconscious",
    "description": "Jung's account of the archetypes behind recurring dream figures.",
    "links": ["https://en.wikipedia.org/wiki/Collective_unconscious"]
  }
]
"#;

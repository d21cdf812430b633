use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Ensure that a candidate absolute path resolves (or its parent resolves) to a
/// location contained within the canonicalized `root_abs`. Returns the
/// canonicalized path that was checked.
///
/// For paths that don't exist yet, this canonicalizes the parent and rejoins the
/// leaf to prevent symlink escapes.
pub fn assert_within_root_abs(root_abs: &Path, candidate_abs: &Path) -> Result<PathBuf> {
    let root = root_abs
        .canonicalize()
        .with_context(|| format!("canonicalize root {:?}", root_abs))?;

    let resolved = match candidate_abs.canonicalize() {
        Ok(c) => c,
        Err(_) => {
            let parent = candidate_abs
                .parent()
                .ok_or_else(|| anyhow::anyhow!("invalid path: no parent"))?;
            let leaf = candidate_abs
                .file_name()
                .ok_or_else(|| anyhow::anyhow!("invalid path: no file name"))?;
            let canon_parent = parent
                .canonicalize()
                .with_context(|| format!("canonicalize parent {:?}", parent))?;
            canon_parent.join(leaf)
        }
    };

    if !resolved.starts_with(&root) {
        anyhow::bail!(
            "path escapes root: path={:?} root={:?}",
            candidate_abs, root
        );
    }
    Ok(resolved)
}

/// Reduce untrusted input to a single safe file-name stem.
///
/// Lower-cases, keeps only what follows the last `/` or `\`, removes `..`
/// sequences and drops every char outside `[a-z0-9_-]`. May return an empty
/// string, which callers treat as "no dedicated file".
pub fn sanitize_segment(raw: &str) -> String {
    let lowered = raw.trim().to_lowercase();
    let base = lowered
        .rsplit(|c: char| c == '/' || c == '\\')
        .next()
        .unwrap_or("");
    base.replace("..", "")
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .collect()
}

// src/services/vector_store.rs
//! Read-only embedding store.
//!
//! On-disk layout (SQLite, one file under the store dir):
//!
//! ```text
//! meta(key TEXT PRIMARY KEY, value TEXT)          -- "dimension" required, "embedder" optional
//! embeddings(row_id INTEGER PRIMARY KEY, vector BLOB)  -- little-endian f32 x dimension
//! ```
//!
//! The whole index is pulled into memory by [`load`] and the connection is
//! dropped, so queries never touch SQLite and the store is `Send + Sync`.

use std::cmp::Ordering;
use std::path::{Path, PathBuf};

use rusqlite::{Connection, OpenFlags};
use serde::Serialize;

use crate::config::VectorStoreConfig;
use crate::error::StoreLoadError;

/// Name recorded in `meta.embedder` by stores built with [`HashEmbedding`].
pub const HASH_EMBEDDER_NAME: &str = "hash-blake3";

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SimilarityHit {
    pub row_id: usize,
    pub score: f32,
}

/// Capability: nearest-neighbor lookup by free text.
pub trait SimilarityIndex: Send + Sync {
    /// At most `k` hits, best first. Ties keep the store's row order.
    fn similarity_search(&self, query_text: &str, k: usize) -> Vec<SimilarityHit>;
}

/// Trait for text embedding providers.
pub trait EmbeddingProvider: Send + Sync {
    fn embed(&self, text: &str) -> Vec<f32>;
    fn dimensions(&self) -> usize;
    fn name(&self) -> &str;
}

/// Deterministic token-hashing embedding (not semantic: shared words, not
/// shared meaning, drive similarity).
#[derive(Debug, Clone)]
pub struct HashEmbedding {
    dimensions: usize,
}

impl HashEmbedding {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }
}

impl EmbeddingProvider for HashEmbedding {
    fn embed(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dimensions];
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let token = token.to_lowercase();
            let h = blake3::hash(token.as_bytes());
            let bytes = h.as_bytes();
            let mut head = [0u8; 8];
            head.copy_from_slice(&bytes[..8]);
            let slot = (u64::from_le_bytes(head) % self.dimensions as u64) as usize;
            let sign = if bytes[8] & 1 == 0 { 1.0 } else { -1.0 };
            v[slot] += sign;
        }
        l2_normalize(&mut v);
        v
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn name(&self) -> &str {
        HASH_EMBEDDER_NAME
    }
}

/// Where the persisted store lives.
#[derive(Debug, Clone)]
pub struct StorePaths {
    pub dir: PathBuf,
    pub file_name: String,
}

impl StorePaths {
    pub fn from_config(cfg: &VectorStoreConfig) -> Self {
        Self {
            dir: cfg.dir.clone(),
            file_name: cfg.file_name.clone(),
        }
    }

    pub fn db_path(&self) -> PathBuf {
        self.dir.join(&self.file_name)
    }
}

pub struct VectorStore {
    embedder: Box<dyn EmbeddingProvider>,
    rows: Vec<(usize, Vec<f32>)>,
}

impl std::fmt::Debug for VectorStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorStore")
            .field("embedder", &self.embedder.name())
            .field("rows", &self.rows.len())
            .finish()
    }
}

impl VectorStore {
    /// In-memory store over precomputed vectors. Vectors are normalized here;
    /// rows whose width differs from the embedder are rejected.
    pub fn from_rows(
        embedder: Box<dyn EmbeddingProvider>,
        rows: Vec<(usize, Vec<f32>)>,
    ) -> Result<Self, StoreLoadError> {
        let dim = embedder.dimensions();
        let mut out = Vec::with_capacity(rows.len());
        for (row_id, mut v) in rows {
            if v.len() != dim {
                return Err(StoreLoadError::DimensionMismatch {
                    expected: dim,
                    found: v.len(),
                });
            }
            l2_normalize(&mut v);
            out.push((row_id, v));
        }
        out.sort_by_key(|(id, _)| *id);
        Ok(Self { embedder, rows: out })
    }

    /// Index text rows with the store's own embedder (fixtures and demos).
    pub fn from_texts<'a, I>(embedder: Box<dyn EmbeddingProvider>, texts: I) -> Self
    where
        I: IntoIterator<Item = (usize, &'a str)>,
    {
        let mut rows: Vec<(usize, Vec<f32>)> = texts
            .into_iter()
            .map(|(id, t)| (id, embedder.embed(t)))
            .collect();
        rows.sort_by_key(|(id, _)| *id);
        Self { embedder, rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn dimensions(&self) -> usize {
        self.embedder.dimensions()
    }
}

impl SimilarityIndex for VectorStore {
    fn similarity_search(&self, query_text: &str, k: usize) -> Vec<SimilarityHit> {
        if k == 0 {
            return Vec::new();
        }
        let q = self.embedder.embed(query_text);
        if q.iter().all(|x| *x == 0.0) {
            return Vec::new();
        }
        let mut hits: Vec<SimilarityHit> = self
            .rows
            .iter()
            .map(|(row_id, v)| SimilarityHit {
                row_id: *row_id,
                score: dot(&q, v),
            })
            .collect();
        // stable: equal scores keep ascending row order
        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
        hits.truncate(k);
        hits
    }
}

/// Open the persisted store described by `paths` and load it into memory.
pub fn load(paths: &StorePaths, config: &VectorStoreConfig) -> Result<VectorStore, StoreLoadError> {
    if !config.cpu_only {
        tracing::warn!("no accelerated vector backend in this build; using CPU");
    }
    let db_path = paths.db_path();
    if !db_path.is_file() {
        return Err(StoreLoadError::Missing(db_path));
    }

    let conn = Connection::open_with_flags(&db_path, OpenFlags::SQLITE_OPEN_READ_ONLY)
        .map_err(|e| StoreLoadError::Unreadable {
            path: db_path.clone(),
            reason: e.to_string(),
        })?;

    let dimension = read_dimension(&conn)?;
    if let Some(expected) = config.dimension {
        if expected != dimension {
            return Err(StoreLoadError::DimensionMismatch {
                expected,
                found: dimension,
            });
        }
    }
    if let Some(name) = read_meta(&conn, "embedder")? {
        if name != HASH_EMBEDDER_NAME {
            return Err(StoreLoadError::Malformed(format!(
                "unsupported embedder `{name}`"
            )));
        }
    }

    let rows = read_rows(&conn, dimension, &db_path)?;
    tracing::info!(
        rows = rows.len(),
        dimension,
        path = %db_path.display(),
        "vector store loaded"
    );
    VectorStore::from_rows(Box::new(HashEmbedding::new(dimension)), rows)
}

fn read_meta(conn: &Connection, key: &str) -> Result<Option<String>, StoreLoadError> {
    let mut stmt = conn
        .prepare("SELECT value FROM meta WHERE key=?1")
        .map_err(|e| StoreLoadError::Malformed(format!("meta table: {e}")))?;
    let mut rows = stmt
        .query([key])
        .map_err(|e| StoreLoadError::Malformed(format!("meta query: {e}")))?;
    match rows
        .next()
        .map_err(|e| StoreLoadError::Malformed(format!("meta row: {e}")))?
    {
        Some(r) => {
            let v: String = r
                .get(0)
                .map_err(|e| StoreLoadError::Malformed(format!("meta value: {e}")))?;
            Ok(Some(v))
        }
        None => Ok(None),
    }
}

fn read_dimension(conn: &Connection) -> Result<usize, StoreLoadError> {
    let raw = read_meta(conn, "dimension")?
        .ok_or_else(|| StoreLoadError::Malformed("meta.dimension missing".into()))?;
    match raw.trim().parse::<usize>() {
        Ok(d) if d > 0 => Ok(d),
        _ => Err(StoreLoadError::Malformed(format!(
            "meta.dimension not a positive integer: {raw}"
        ))),
    }
}

fn read_rows(
    conn: &Connection,
    dimension: usize,
    db_path: &Path,
) -> Result<Vec<(usize, Vec<f32>)>, StoreLoadError> {
    let malformed = |e: rusqlite::Error| StoreLoadError::Malformed(format!("embeddings: {e}"));
    let mut stmt = conn
        .prepare("SELECT row_id, vector FROM embeddings ORDER BY row_id")
        .map_err(malformed)?;
    let iter = stmt
        .query_map([], |r| Ok((r.get::<_, i64>(0)?, r.get::<_, Vec<u8>>(1)?)))
        .map_err(malformed)?;

    let mut out = Vec::new();
    for row in iter {
        let (row_id, blob) = row.map_err(malformed)?;
        let row_id = usize::try_from(row_id).map_err(|_| {
            StoreLoadError::Malformed(format!("negative row_id {row_id} in {}", db_path.display()))
        })?;
        if blob.len() != dimension * 4 {
            return Err(StoreLoadError::Malformed(format!(
                "row {row_id}: {} bytes, expected {}",
                blob.len(),
                dimension * 4
            )));
        }
        let v = blob
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        out.push((row_id, v));
    }
    Ok(out)
}

/// Encode a vector as the blob format stored in `embeddings.vector`.
pub fn encode_vector(v: &[f32]) -> Vec<u8> {
    v.iter().flat_map(|x| x.to_le_bytes()).collect()
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn l2_normalize(v: &mut [f32]) {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

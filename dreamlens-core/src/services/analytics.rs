// src/services/analytics.rs
//! Chart-ready views for the front end.
//!
//! - `bar_data`: archetype counts of the reference table (pure, deterministic).
//! - `doughnut_data`: archetype counts over the nearest reference rows to the
//!   current dream.
//! - `time_series_data`: **synthetic**. Six months of random-walk values per
//!   archetype; it is illustrative only and reflects no real submissions.
//! - `rarity_score`: inverse-frequency score with gaussian noise.

use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate};
use rand::Rng;
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};

use crate::services::history::DreamContext;
use crate::services::reference::{normalize_label, ReferenceTable};
use crate::services::vector_store::SimilarityIndex;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChartData {
    pub labels: Vec<String>,
    pub values: Vec<u64>,
}

impl ChartData {
    fn from_counts(counts: BTreeMap<String, u64>) -> Self {
        let (labels, values) = counts.into_iter().unzip();
        Self { labels, values }
    }

    pub fn empty() -> Self {
        Self {
            labels: Vec::new(),
            values: Vec::new(),
        }
    }

    pub fn value_of(&self, label: &str) -> Option<u64> {
        self.labels
            .iter()
            .position(|l| l == label)
            .map(|i| self.values[i])
    }
}

/// Reference table grouped by archetype, labels ascending.
pub fn bar_data(table: &ReferenceTable) -> ChartData {
    ChartData::from_counts(table.counts())
}

/// Archetype frequencies among the `k` reference rows nearest to the current
/// dream text. `None` until a dream has been classified.
pub fn doughnut_data(
    ctx: &DreamContext,
    index: &dyn SimilarityIndex,
    table: &ReferenceTable,
    k: usize,
) -> Option<ChartData> {
    let text = ctx.current_dream_text()?;
    let mut counts = BTreeMap::new();
    for hit in index.similarity_search(&text, k) {
        match table.archetype_of(hit.row_id) {
            Some(a) => *counts.entry(a.to_string()).or_insert(0u64) += 1,
            None => tracing::debug!(row_id = hit.row_id, "similarity hit outside reference table"),
        }
    }
    Some(ChartData::from_counts(counts))
}

// ---------- synthetic time series ----------

pub const TIME_SERIES_ARCHETYPES: [&str; 6] =
    ["explorer", "hero", "sage", "caregiver", "rebel", "lover"];
pub const TIME_SERIES_MONTHS: usize = 6;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Series {
    pub label: String,
    pub data: Vec<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSeriesData {
    pub labels: Vec<String>,
    pub datasets: Vec<Series>,
}

/// Six monthly buckets ending with `today`'s month, one series per archetype
/// in [`TIME_SERIES_ARCHETYPES`].
pub fn time_series_data<R: Rng + ?Sized>(rng: &mut R, today: NaiveDate) -> TimeSeriesData {
    let datasets = TIME_SERIES_ARCHETYPES
        .iter()
        .map(|a| Series {
            label: (*a).to_string(),
            data: random_walk(rng, TIME_SERIES_MONTHS),
        })
        .collect();
    TimeSeriesData {
        labels: month_labels(today, TIME_SERIES_MONTHS),
        datasets,
    }
}

/// Base in [5,15), one trend in {-1,0,1} for the whole walk, noise in [-3,3]
/// per step, never below 1.
pub fn random_walk<R: Rng + ?Sized>(rng: &mut R, steps: usize) -> Vec<i64> {
    let mut out = Vec::with_capacity(steps);
    if steps == 0 {
        return out;
    }
    let trend: i64 = rng.gen_range(-1..=1);
    let mut value: i64 = rng.gen_range(5..15);
    out.push(value);
    for _ in 1..steps {
        let noise: i64 = rng.gen_range(-3..=3);
        value = (value + trend + noise).max(1);
        out.push(value);
    }
    out
}

/// Abbreviated month names, oldest first, ending with `today`'s month.
pub fn month_labels(today: NaiveDate, n: usize) -> Vec<String> {
    let current = today.year() as i64 * 12 + today.month0() as i64;
    (0..n as i64)
        .rev()
        .map(|back| {
            let idx = current - back;
            let year = idx.div_euclid(12) as i32;
            let month = idx.rem_euclid(12) as u32 + 1;
            NaiveDate::from_ymd_opt(year, month, 1)
                .map(|d| d.format("%b").to_string())
                .unwrap_or_default()
        })
        .collect()
}

// ---------- rarity ----------

/// Relative commonness per archetype; rarer archetypes carry lower weights.
pub const ARCHETYPE_WEIGHTS: &[(&str, f64)] = &[
    ("hero", 0.85),
    ("explorer", 0.75),
    ("caregiver", 0.7),
    ("lover", 0.65),
    ("everyman", 0.6),
    ("innocent", 0.55),
    ("sage", 0.45),
    ("creator", 0.4),
    ("rebel", 0.35),
    ("jester", 0.3),
    ("ruler", 0.25),
    ("magician", 0.2),
];
pub const DEFAULT_WEIGHT: f64 = 0.5;
pub const RARITY_NOISE_STDDEV: f64 = 10.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RarityScore {
    pub archetype: String,
    pub score: f64,
}

pub fn weight(archetype: &str) -> f64 {
    let key = normalize_label(archetype);
    ARCHETYPE_WEIGHTS
        .iter()
        .find(|(a, _)| *a == key)
        .map(|(_, w)| *w)
        .unwrap_or(DEFAULT_WEIGHT)
}

/// `clamp(100 - weight*100 + noise, 0, 100)` rounded to one decimal.
pub fn rarity_score_with_noise(archetype: &str, noise: f64) -> f64 {
    let raw = 100.0 - weight(archetype) * 100.0 + noise;
    round1(raw.clamp(0.0, 100.0))
}

/// Rarity with N(0, 10) noise drawn from `rng`; seed the rng for repeatable scores.
pub fn rarity_score<R: Rng + ?Sized>(archetype: &str, rng: &mut R) -> RarityScore {
    let z: f64 = rng.sample(StandardNormal);
    RarityScore {
        archetype: normalize_label(archetype),
        score: rarity_score_with_noise(archetype, z * RARITY_NOISE_STDDEV),
    }
}

fn round1(x: f64) -> f64 {
    (x * 10.0).round() / 10.0
}

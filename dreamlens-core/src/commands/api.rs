// src/commands/api.rs
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use serde_json::json;

use crate::commands::init::ensure_initialized;
use crate::config::CoreConfig;
use crate::error::{StoreLoadError, SubmitError};
use crate::services::analytics::{self, ChartData, RarityScore, TimeSeriesData};
use crate::services::audit::Audit;
use crate::services::classifier::{self, ClassificationGateway, ClassificationResult, Classifier};
use crate::services::history::{DreamContext, DreamSubmission, HistoryEntry, HistoryLog};
use crate::services::metrics::MetricsRegistry;
use crate::services::reference::ReferenceTable;
use crate::services::resources::{ResourceBundle, ResourceLookup};
use crate::services::vector_store::{self, SimilarityIndex, StorePaths};

/// Everything one HTTP operation needs, owned in one place.
pub struct Commands {
    config: CoreConfig,
    metrics: Arc<MetricsRegistry>,
    context: Arc<DreamContext>,
    history: Arc<HistoryLog>,
    gateway: ClassificationGateway,
    reference: ReferenceTable,
    store: Result<Arc<dyn SimilarityIndex>, StoreLoadError>,
    resources: ResourceLookup,
}

impl Commands {
    /// Initialize `root` if needed, load config, reference table and vector
    /// store. A store that fails to load only disables the doughnut chart.
    pub fn open(root: &Path) -> Result<Self> {
        ensure_initialized(root)?;
        let config = CoreConfig::load(root)?;

        let csv_path = &config.reference.csv_path;
        let reference = if csv_path.is_file() {
            ReferenceTable::load_csv(csv_path, &config.reference.archetype_column)
                .with_context(|| format!("loading reference table {}", csv_path.display()))?
        } else {
            tracing::warn!(path = %csv_path.display(), "reference csv missing; starting with an empty table");
            ReferenceTable::default()
        };

        let store = vector_store::load(
            &StorePaths::from_config(&config.vector_store),
            &config.vector_store,
        )
        .map(|s| {
            if s.len() != reference.len() {
                tracing::warn!(
                    store_rows = s.len(),
                    reference_rows = reference.len(),
                    "vector store and reference table differ in size"
                );
            }
            Arc::new(s) as Arc<dyn SimilarityIndex>
        });
        if let Err(e) = &store {
            tracing::warn!("vector store unavailable, doughnut data disabled: {e}");
        }

        let classifier = classifier::from_config(&config.classifier);
        Self::from_parts(config, classifier, reference, store)
    }

    /// Assemble from already-built collaborators (tests, embedding).
    pub fn from_parts(
        config: CoreConfig,
        classifier: Arc<dyn Classifier>,
        reference: ReferenceTable,
        store: Result<Arc<dyn SimilarityIndex>, StoreLoadError>,
    ) -> Result<Self> {
        let audit = Audit::from_config(&config.logbook);
        let metrics = Arc::new(
            MetricsRegistry::new(&config.metrics).context("registering metrics")?,
        );
        metrics.seed_distribution(&reference);

        let context = Arc::new(DreamContext::new());
        let history = Arc::new(HistoryLog::with_capacity(config.history.capacity));
        let gateway = ClassificationGateway::new(
            classifier,
            Arc::clone(&metrics),
            Arc::clone(&context),
            Arc::clone(&history),
            audit.clone(),
        );
        let resources = ResourceLookup::from_config(&config.resources, audit.clone());

        audit.record_action(
            "commands",
            "opened",
            &json!({
                "reference_rows": reference.len(),
                "vector_store": store.is_ok(),
                "classifier": format!("{:?}", config.classifier.mode),
            }),
            "low",
        );

        Ok(Self {
            config,
            metrics,
            context,
            history,
            gateway,
            reference,
            store,
            resources,
        })
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    pub fn metrics(&self) -> &MetricsRegistry {
        &self.metrics
    }

    pub fn context(&self) -> &DreamContext {
        &self.context
    }

    pub fn store_error(&self) -> Option<&StoreLoadError> {
        self.store.as_ref().err()
    }

    /// Classify a dream. Blank text is rejected before it reaches the gateway.
    pub fn submit_dream(&self, text: &str) -> Result<ClassificationResult, SubmitError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(SubmitError::EmptyDream);
        }
        let submission = DreamSubmission::new(text);
        Ok(self.gateway.classify(&submission)?)
    }

    pub fn bar_data(&self) -> ChartData {
        analytics::bar_data(&self.reference)
    }

    /// `Ok(None)` until a dream has been classified.
    pub fn doughnut_data(&self) -> Result<Option<ChartData>, StoreLoadError> {
        let index = self.store.as_ref().map_err(Clone::clone)?;
        Ok(analytics::doughnut_data(
            &self.context,
            index.as_ref(),
            &self.reference,
            self.config.vector_store.top_k,
        ))
    }

    pub fn time_series_data(&self) -> TimeSeriesData {
        analytics::time_series_data(&mut rand::thread_rng(), Utc::now().date_naive())
    }

    /// Score `archetype` if given (and non-blank), else the current archetype.
    pub fn rarity_score(&self, archetype: Option<&str>) -> Option<RarityScore> {
        let archetype = match archetype.map(str::trim).filter(|a| !a.is_empty()) {
            Some(a) => a.to_string(),
            None => self.context.current_archetype()?,
        };
        Some(analytics::rarity_score(&archetype, &mut rand::thread_rng()))
    }

    pub fn resources(&self, archetype: &str) -> Vec<ResourceBundle> {
        self.resources.get_resources(archetype)
    }

    pub fn history(&self, limit: usize) -> Vec<HistoryEntry> {
        self.history.recent(limit)
    }

    pub fn metrics_text(&self) -> Result<String> {
        self.metrics.encode().context("encoding metrics")
    }
}

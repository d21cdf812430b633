pub mod analytics;
pub mod audit;
pub mod classifier;
pub mod history;
pub mod metrics;
pub mod reference;
pub mod resources;
pub mod vector_store;

pub use analytics::{ChartData, RarityScore, TimeSeriesData};
pub use classifier::{ClassificationGateway, ClassificationResult, Classifier, PayloadField};
pub use history::{DreamContext, DreamSubmission, HistoryEntry, HistoryLog};
pub use metrics::{InFlightRequest, MetricsRegistry, SubmissionStatus};
pub use reference::ReferenceTable;
pub use resources::{ResourceBundle, ResourceLookup};
pub use vector_store::{SimilarityHit, SimilarityIndex, VectorStore};

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing;

#[derive(Debug, Clone, Deserialize)]
pub struct CoreConfig {
    #[serde(default)]
    pub system: SystemConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub reference: ReferenceConfig,
    #[serde(default)]
    pub vector_store: VectorStoreConfig,
    #[serde(default)]
    pub classifier: ClassifierConfig,
    #[serde(default)]
    pub resources: ResourcesConfig,
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub logbook: LogbookConfig,
}

impl CoreConfig {
    /// Load `<root>/config.toml` (defaults when absent), resolve relative paths
    /// against `root`, then apply `DREAMLENS_*` environment overrides.
    pub fn load(root: &Path) -> Result<Self> {
        let path = root.join("config.toml");
        let mut cfg = if path.exists() {
            let text = fs::read_to_string(&path)
                .with_context(|| format!("reading config file {}", path.display()))?;
            toml::from_str::<CoreConfig>(&text)
                .with_context(|| format!("parsing config file {}", path.display()))?
        } else {
            tracing::info!(
                "No config file found at {}. Using CoreConfig::default().",
                path.display()
            );
            CoreConfig::default()
        };
        cfg.apply_env_overrides();
        cfg.resolve_paths(root);
        Ok(cfg)
    }

    fn resolve_paths(&mut self, root: &Path) {
        self.reference.csv_path = absolutize(root, &self.reference.csv_path);
        self.vector_store.dir = absolutize(root, &self.vector_store.dir);
        self.resources.dir = absolutize(root, &self.resources.dir);
        self.logbook.path = absolutize(root, &self.logbook.path);
    }

    fn apply_env_overrides(&mut self) {
        if let Some(flag) = std::env::var("DREAMLENS_CPU_ONLY").ok().and_then(|v| parse_flag(&v)) {
            self.vector_store.cpu_only = flag;
        }
        if let Some(dir) = std::env::var_os("DREAMLENS_STORE_DIR") {
            self.vector_store.dir = PathBuf::from(dir);
        }
    }
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            system: SystemConfig::default(),
            server: ServerConfig::default(),
            reference: ReferenceConfig::default(),
            vector_store: VectorStoreConfig::default(),
            classifier: ClassifierConfig::default(),
            resources: ResourcesConfig::default(),
            history: HistoryConfig::default(),
            metrics: MetricsConfig::default(),
            logbook: LogbookConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SystemConfig {
    #[serde(default = "SystemConfig::default_name")]
    pub name: String,
    #[serde(default = "SystemConfig::default_version")]
    pub version: String,
}

impl SystemConfig {
    fn default_name() -> String {
        "dreamlens".to_string()
    }

    fn default_version() -> String {
        "0.1.0".to_string()
    }
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            name: Self::default_name(),
            version: Self::default_version(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "ServerConfig::default_host")]
    pub host: String,
    #[serde(default = "ServerConfig::default_port")]
    pub port: u16,
}

impl ServerConfig {
    fn default_host() -> String {
        "127.0.0.1".to_string()
    }

    fn default_port() -> u16 {
        8000
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: Self::default_host(),
            port: Self::default_port(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReferenceConfig {
    #[serde(default = "ReferenceConfig::default_csv_path")]
    pub csv_path: PathBuf,
    #[serde(default = "ReferenceConfig::default_archetype_column")]
    pub archetype_column: String,
}

impl ReferenceConfig {
    fn default_csv_path() -> PathBuf {
        PathBuf::from("reference/dreams.csv")
    }

    fn default_archetype_column() -> String {
        "archetype".to_string()
    }
}

impl Default for ReferenceConfig {
    fn default() -> Self {
        Self {
            csv_path: Self::default_csv_path(),
            archetype_column: Self::default_archetype_column(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct VectorStoreConfig {
    #[serde(default = "VectorStoreConfig::default_dir")]
    pub dir: PathBuf,
    #[serde(default = "VectorStoreConfig::default_file_name")]
    pub file_name: String,
    #[serde(default = "VectorStoreConfig::default_cpu_only")]
    pub cpu_only: bool,
    /// Expected embedding width; `None` accepts whatever the store declares.
    #[serde(default)]
    pub dimension: Option<usize>,
    #[serde(default = "VectorStoreConfig::default_top_k")]
    pub top_k: usize,
}

impl VectorStoreConfig {
    fn default_dir() -> PathBuf {
        PathBuf::from("store")
    }

    fn default_file_name() -> String {
        "embeddings.db".to_string()
    }

    fn default_cpu_only() -> bool {
        true
    }

    fn default_top_k() -> usize {
        10
    }
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            dir: Self::default_dir(),
            file_name: Self::default_file_name(),
            cpu_only: Self::default_cpu_only(),
            dimension: None,
            top_k: Self::default_top_k(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassifierMode {
    Command, // default
    Mock,    // fixed sample payload, no external process
}

impl Default for ClassifierMode {
    fn default() -> Self {
        ClassifierMode::Command
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClassifierConfig {
    #[serde(default)]
    pub mode: ClassifierMode,
    #[serde(default = "ClassifierConfig::default_program")]
    pub program: String,
    #[serde(default = "ClassifierConfig::default_args")]
    pub args: Vec<String>,
}

impl ClassifierConfig {
    fn default_program() -> String {
        "python".to_string()
    }

    fn default_args() -> Vec<String> {
        vec!["-m".into(), "scripts.the_big_dipper".into()]
    }
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            mode: ClassifierMode::default(),
            program: Self::default_program(),
            args: Self::default_args(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResourcesConfig {
    #[serde(default = "ResourcesConfig::default_dir")]
    pub dir: PathBuf,
    #[serde(default = "ResourcesConfig::default_file")]
    pub default_file: String,
}

impl ResourcesConfig {
    fn default_dir() -> PathBuf {
        PathBuf::from("resources")
    }

    fn default_file() -> String {
        "default.json".to_string()
    }
}

impl Default for ResourcesConfig {
    fn default() -> Self {
        Self {
            dir: Self::default_dir(),
            default_file: Self::default_file(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct HistoryConfig {
    #[serde(default = "HistoryConfig::default_capacity")]
    pub capacity: usize,
}

impl HistoryConfig {
    fn default_capacity() -> usize {
        1000
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            capacity: Self::default_capacity(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    /// Unseen archetype labels admitted beyond the seeded set before
    /// increments collapse into `other`.
    #[serde(default = "MetricsConfig::default_max_extra_archetypes")]
    pub max_extra_archetypes: usize,
    #[serde(default = "MetricsConfig::default_latency_buckets")]
    pub latency_buckets: Vec<f64>,
}

impl MetricsConfig {
    fn default_max_extra_archetypes() -> usize {
        32
    }

    fn default_latency_buckets() -> Vec<f64> {
        vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            max_extra_archetypes: Self::default_max_extra_archetypes(),
            latency_buckets: Self::default_latency_buckets(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogbookConfig {
    #[serde(default = "LogbookConfig::default_enabled")]
    pub enabled: bool,
    #[serde(default = "LogbookConfig::default_path")]
    pub path: PathBuf,
    #[serde(default = "LogbookConfig::default_preview_len")]
    pub preview_len: usize,
}

impl LogbookConfig {
    fn default_enabled() -> bool {
        true
    }

    fn default_path() -> PathBuf {
        PathBuf::from("logbook")
    }

    fn default_preview_len() -> usize {
        160
    }
}

impl Default for LogbookConfig {
    fn default() -> Self {
        Self {
            enabled: Self::default_enabled(),
            path: Self::default_path(),
            preview_len: Self::default_preview_len(),
        }
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn absolutize(root: &Path, value: &Path) -> PathBuf {
    if value.is_absolute() {
        value.to_path_buf()
    } else {
        root.join(value)
    }
}

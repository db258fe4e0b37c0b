//! Run configuration.
//!
//! Uses `figment` for layered configuration: built-in defaults -> optional
//! TOML file -> `ETLFLOW_`-prefixed environment variables -> the plain
//! `SUPABASE_URL` / `SUPABASE_KEY` / `SUPABASE_TABLE` variables.
//!
//! A configuration is validated once, before any stage runs. Every component
//! receives the pieces it needs explicitly; nothing is read from the
//! environment after that point.

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::datasets::DatasetKind;
use crate::errors::ConfigError;
use crate::pipeline::{BackoffStrategy, JitterStrategy, RetryConfig, RetryOn};

/// Default Open-Meteo air-quality endpoint.
pub const DEFAULT_SOURCE_URL: &str = "https://air-quality-api.open-meteo.com/v1/air-quality";

/// Top-level configuration for one pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Which dataset profile drives the run.
    pub dataset: DatasetKind,
    /// Remote table store.
    pub store: StoreConfig,
    /// Raw data source.
    pub source: SourceConfig,
    /// Fetch retry and concurrency.
    pub fetch: FetchConfig,
    /// Batch loading.
    pub load: LoadConfig,
    /// Local artifact directories.
    pub paths: PathsConfig,
    /// Optional wall-clock budget for the whole run.
    pub run_timeout_seconds: Option<u64>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            dataset: DatasetKind::AirQuality,
            store: StoreConfig::default(),
            source: SourceConfig::default(),
            fetch: FetchConfig::default(),
            load: LoadConfig::default(),
            paths: PathsConfig::default(),
            run_timeout_seconds: None,
        }
    }
}

/// Remote store connection settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Base URL of the store, e.g. `https://xyz.supabase.co`.
    pub endpoint: Option<String>,
    /// API key sent with every request.
    pub api_key: Option<String>,
    /// Destination table. Falls back to the dataset's default table.
    pub table: Option<String>,
    /// Per-request timeout in seconds.
    pub timeout_seconds: f64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_key: None,
            table: None,
            timeout_seconds: 30.0,
        }
    }
}

impl StoreConfig {
    /// Request timeout as a `Duration`.
    pub fn timeout(&self) -> Result<Duration, ConfigError> {
        seconds(self.timeout_seconds, "store.timeout_seconds")
    }
}

/// One partition to fetch.
///
/// HTTP partitions carry coordinates; file-backed partitions only a key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartitionConfig {
    /// Partition key, e.g. the city name.
    pub key: String,
    /// Latitude in decimal degrees.
    #[serde(default)]
    pub latitude: Option<f64>,
    /// Longitude in decimal degrees.
    #[serde(default)]
    pub longitude: Option<f64>,
}

impl PartitionConfig {
    /// Creates a located partition entry.
    #[must_use]
    pub fn new(key: impl Into<String>, latitude: f64, longitude: f64) -> Self {
        Self {
            key: key.into(),
            latitude: Some(latitude),
            longitude: Some(longitude),
        }
    }

    /// Creates a partition with a key only.
    #[must_use]
    pub fn named(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            latitude: None,
            longitude: None,
        }
    }
}

/// Raw data source settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// HTTP endpoint for measurement partitions.
    pub base_url: String,
    /// Per-request timeout in seconds.
    pub timeout_seconds: f64,
    /// Partitions to fetch.
    pub partitions: Vec<PartitionConfig>,
    /// Local CSV extract, for file-backed datasets.
    pub csv_path: Option<PathBuf>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_SOURCE_URL.to_string(),
            timeout_seconds: 10.0,
            partitions: default_partitions(),
            csv_path: None,
        }
    }
}

impl SourceConfig {
    /// Request timeout as a `Duration`.
    pub fn timeout(&self) -> Result<Duration, ConfigError> {
        seconds(self.timeout_seconds, "source.timeout_seconds")
    }
}

fn seconds(value: f64, key: &str) -> Result<Duration, ConfigError> {
    match Duration::try_from_secs_f64(value) {
        Ok(duration) if !duration.is_zero() => Ok(duration),
        _ => Err(ConfigError::new(key, format!("{value} is not a usable timeout"))),
    }
}

fn default_partitions() -> Vec<PartitionConfig> {
    vec![
        PartitionConfig::new("Delhi", 28.7041, 77.1025),
        PartitionConfig::new("Bengaluru", 12.9716, 77.5946),
        PartitionConfig::new("Hyderabad", 17.3850, 78.4867),
        PartitionConfig::new("Mumbai", 19.0760, 72.8777),
        PartitionConfig::new("Kolkata", 22.5726, 88.3639),
    ]
}

/// Fetch retry and concurrency settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Attempts per partition, including the first.
    pub max_attempts: usize,
    /// First backoff delay.
    pub base_delay_ms: u64,
    /// Upper bound on any single backoff delay.
    pub max_delay_ms: u64,
    /// How the delay grows between attempts.
    pub backoff: BackoffStrategy,
    /// Randomization applied to each delay.
    pub jitter: JitterStrategy,
    /// Partitions fetched concurrently.
    pub workers: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
            max_delay_ms: 30_000,
            backoff: BackoffStrategy::Exponential,
            jitter: JitterStrategy::None,
            workers: 4,
        }
    }
}

impl FetchConfig {
    /// Retry policy for partition fetches.
    #[must_use]
    pub fn retry(&self) -> RetryConfig {
        RetryConfig::exponential(self.max_attempts, self.base_delay_ms)
            .with_max_delay_ms(self.max_delay_ms)
            .with_backoff(self.backoff)
            .with_jitter(self.jitter)
            .with_retry_on(RetryOn::Remote)
    }
}

/// Batch loading settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadConfig {
    /// Maximum rows per insert.
    pub batch_size: usize,
    /// Retries per batch after the first attempt.
    pub max_retries: usize,
    /// Fixed delay between batch attempts.
    pub retry_delay_ms: u64,
    /// Randomization applied to each delay.
    pub jitter: JitterStrategy,
    /// Batches in flight at once.
    pub concurrency: usize,
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            batch_size: 200,
            max_retries: 2,
            retry_delay_ms: 1500,
            jitter: JitterStrategy::None,
            concurrency: 1,
        }
    }
}

impl LoadConfig {
    /// Retry policy for batch inserts.
    #[must_use]
    pub fn retry(&self) -> RetryConfig {
        RetryConfig::fixed(self.max_retries + 1, self.retry_delay_ms)
            .with_max_delay_ms(self.retry_delay_ms)
            .with_jitter(self.jitter)
            .with_retry_on(RetryOn::Any)
    }
}

/// Local artifact directories.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Raw payload archive.
    pub raw_dir: PathBuf,
    /// Staged CSV artifact.
    pub staged_dir: PathBuf,
    /// Report tables.
    pub processed_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            raw_dir: PathBuf::from("data/raw"),
            staged_dir: PathBuf::from("data/staged"),
            processed_dir: PathBuf::from("data/processed"),
        }
    }
}

impl PipelineConfig {
    /// Builds the layered figment without extracting it.
    #[must_use]
    pub fn figment(file: Option<&Path>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Some(path) = file {
            figment = figment.merge(Toml::file(path));
        }

        figment
            .merge(Env::prefixed("ETLFLOW_").split("__"))
            .merge(
                Env::raw()
                    .only(&["SUPABASE_URL", "SUPABASE_KEY", "SUPABASE_TABLE"])
                    .map(|key| {
                        let key = key.as_str();
                        if key.eq_ignore_ascii_case("SUPABASE_URL") {
                            "store.endpoint".into()
                        } else if key.eq_ignore_ascii_case("SUPABASE_KEY") {
                            "store.api_key".into()
                        } else {
                            "store.table".into()
                        }
                    }),
            )
    }

    /// Extracts a configuration from a figment and validates it.
    pub fn from_figment(figment: &Figment) -> Result<Self, ConfigError> {
        let config: Self = figment.extract().map_err(ConfigError::from)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads and validates configuration from every layer.
    pub fn load(file: Option<&Path>) -> Result<Self, ConfigError> {
        Self::from_figment(&Self::figment(file))
    }

    /// Destination table, falling back to the dataset default.
    #[must_use]
    pub fn table(&self) -> String {
        self.store
            .table
            .clone()
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| self.dataset.default_table().to_string())
    }

    /// Partitions the Extract stage fetches.
    ///
    /// File-backed datasets have exactly one partition named after the dataset.
    #[must_use]
    pub fn partitions(&self) -> Vec<PartitionConfig> {
        match self.dataset {
            DatasetKind::AirQuality => self.source.partitions.clone(),
            DatasetKind::Churn => vec![PartitionConfig::named(self.dataset.to_string())],
        }
    }

    /// Run budget as a `Duration`.
    #[must_use]
    pub fn run_timeout(&self) -> Option<Duration> {
        self.run_timeout_seconds.map(Duration::from_secs)
    }

    /// Checks that the configuration can drive a run.
    ///
    /// Returns the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        require(self.store.endpoint.as_deref(), "store.endpoint")?;
        require(self.store.api_key.as_deref(), "store.api_key")?;

        if self.table().trim().is_empty() {
            return Err(ConfigError::missing("store.table"));
        }
        if self.load.batch_size == 0 {
            return Err(ConfigError::new("load.batch_size", "must be at least 1"));
        }
        if self.load.concurrency == 0 {
            return Err(ConfigError::new("load.concurrency", "must be at least 1"));
        }
        if self.fetch.max_attempts == 0 {
            return Err(ConfigError::new("fetch.max_attempts", "must be at least 1"));
        }
        if self.fetch.workers == 0 {
            return Err(ConfigError::new("fetch.workers", "must be at least 1"));
        }
        self.store.timeout()?;
        self.source.timeout()?;

        match self.dataset {
            DatasetKind::AirQuality => {
                require(Some(self.source.base_url.as_str()), "source.base_url")?;
                if self.source.partitions.is_empty() {
                    return Err(ConfigError::new(
                        "source.partitions",
                        "no partitions configured",
                    ));
                }
            }
            DatasetKind::Churn => {
                if self.source.csv_path.is_none() {
                    return Err(ConfigError::missing("source.csv_path"));
                }
            }
        }

        Ok(())
    }
}

fn require(value: Option<&str>, key: &str) -> Result<(), ConfigError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(()),
        _ => Err(ConfigError::missing(key)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    fn valid() -> PipelineConfig {
        let mut config = PipelineConfig::default();
        config.store.endpoint = Some("https://store.example".into());
        config.store.api_key = Some("secret".into());
        config
    }

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.fetch.max_attempts, 3);
        assert_eq!(config.load.batch_size, 200);
        assert_eq!(config.load.max_retries, 2);
        assert_eq!(config.source.partitions.len(), 5);
        assert_eq!(config.table(), "air_quality_data");
    }

    #[test]
    fn test_missing_credentials_are_config_errors() {
        let err = PipelineConfig::default().validate().unwrap_err();
        assert_eq!(err.key, "store.endpoint");

        let mut config = valid();
        config.store.api_key = Some("  ".into());
        assert_eq!(config.validate().unwrap_err().key, "store.api_key");
    }

    #[test]
    fn test_invalid_numbers_rejected() {
        let mut config = valid();
        config.load.batch_size = 0;
        assert_eq!(config.validate().unwrap_err().key, "load.batch_size");
    }

    #[test]
    fn test_churn_requires_csv_path() {
        let mut config = valid();
        config.dataset = DatasetKind::Churn;
        assert_eq!(config.validate().unwrap_err().key, "source.csv_path");
        config.source.csv_path = Some(PathBuf::from("churn.csv"));
        assert!(config.validate().is_ok());
        assert_eq!(config.table(), "churn_data");
        assert_eq!(config.partitions(), vec![PartitionConfig::named("churn")]);
    }

    #[test]
    fn test_retry_policies() {
        let config = valid();
        assert_eq!(config.fetch.retry().max_attempts, 3);
        assert_eq!(config.load.retry().max_attempts, 3);
        assert_eq!(config.load.retry().delay_for(1), Duration::from_millis(1500));
    }

    #[test]
    fn test_backoff_and_jitter_reach_the_retry_policy() {
        let mut config = valid();
        config.fetch.backoff = BackoffStrategy::Linear;
        config.fetch.base_delay_ms = 100;
        config.fetch.max_delay_ms = 250;
        let retry = config.fetch.retry();
        assert_eq!(retry.delay_for(1), Duration::from_millis(200));
        assert_eq!(retry.delay_for(5), Duration::from_millis(250));

        config.load.jitter = JitterStrategy::Full;
        let retry = config.load.retry();
        assert_eq!(retry.jitter_strategy, JitterStrategy::Full);
        assert!(retry.delay_for(3) <= Duration::from_millis(1500));
    }

    #[test]
    fn test_unusable_timeouts_rejected() {
        for bad in [f64::INFINITY, f64::NAN, -1.0, 0.0, 1e30] {
            let mut config = valid();
            config.store.timeout_seconds = bad;
            assert_eq!(config.validate().unwrap_err().key, "store.timeout_seconds");
        }

        let mut config = valid();
        config.source.timeout_seconds = f64::INFINITY;
        assert_eq!(config.validate().unwrap_err().key, "source.timeout_seconds");
        config.source.timeout_seconds = 2.5;
        assert_eq!(config.source.timeout().unwrap(), Duration::from_millis(2500));
    }

    #[test]
    fn test_toml_layer_and_overrides() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
dataset = "churn"
run_timeout_seconds = 60

[store]
endpoint = "https://store.example"
api_key = "secret"
table = "customers"

[source]
csv_path = "telco.csv"

[fetch]
backoff = "constant"
jitter = "equal"

[load]
batch_size = 50
"#
        )
        .unwrap();

        let figment = PipelineConfig::figment(Some(file.path()))
            .merge(Serialized::default("load.concurrency", 2));
        let config = PipelineConfig::from_figment(&figment).unwrap();

        assert_eq!(config.dataset, DatasetKind::Churn);
        assert_eq!(config.table(), "customers");
        assert_eq!(config.load.batch_size, 50);
        assert_eq!(config.load.concurrency, 2);
        assert_eq!(config.load.max_retries, 2);
        assert_eq!(config.fetch.retry().backoff_strategy, BackoffStrategy::Constant);
        assert_eq!(config.fetch.jitter, JitterStrategy::Equal);
        assert_eq!(config.run_timeout(), Some(Duration::from_secs(60)));
    }
}

//! Raw measurement sources.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

use crate::config::PartitionConfig;
use crate::errors::EtlError;

/// Something that can produce the raw payload for one partition.
///
/// One call is one attempt; retrying is the fetcher's job.
#[async_trait]
pub trait MeasurementSource: Send + Sync {
    /// Fetches the raw payload for a partition.
    async fn fetch(&self, partition: &PartitionConfig) -> Result<Value, EtlError>;
}

/// HTTP source answering `GET base_url?latitude=..&longitude=..&hourly=..`.
#[cfg(feature = "http")]
#[derive(Debug, Clone)]
pub struct HttpMeasurementSource {
    base_url: String,
    hourly: String,
    client: reqwest::Client,
}

#[cfg(feature = "http")]
impl HttpMeasurementSource {
    /// Creates a source requesting the given metrics.
    pub fn new(
        base_url: impl Into<String>,
        metrics: &[String],
        timeout: std::time::Duration,
    ) -> Result<Self, EtlError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(base_url, metrics, client))
    }

    /// Creates a source around an existing client.
    #[must_use]
    pub fn with_client(
        base_url: impl Into<String>,
        metrics: &[String],
        client: reqwest::Client,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            hourly: metrics.join(","),
            client,
        }
    }
}

#[cfg(feature = "http")]
#[async_trait]
impl MeasurementSource for HttpMeasurementSource {
    async fn fetch(&self, partition: &PartitionConfig) -> Result<Value, EtlError> {
        let (Some(latitude), Some(longitude)) = (partition.latitude, partition.longitude) else {
            return Err(crate::errors::ConfigError::new(
                format!("source.partitions.{}", partition.key),
                "latitude and longitude are required for HTTP partitions",
            )
            .into());
        };

        let response = self
            .client
            .get(&self.base_url)
            .query(&[
                ("latitude", latitude.to_string()),
                ("longitude", longitude.to_string()),
                ("hourly", self.hourly.clone()),
            ])
            .send()
            .await?
            .error_for_status()?;

        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| EtlError::Decode(e.to_string()))
    }
}

/// File source reading a local CSV extract.
///
/// The file is returned as a JSON array of objects keyed by the trimmed
/// header, every cell as a string.
#[derive(Debug, Clone)]
pub struct CsvFileSource {
    path: PathBuf,
}

impl CsvFileSource {
    /// Creates a source for one CSV file.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the extract.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<Value, EtlError> {
        if !self.path.exists() {
            return Err(EtlError::NotFound(format!(
                "dataset extract {}",
                self.path.display()
            )));
        }
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::Headers)
            .from_path(&self.path)?;
        let headers = reader.headers()?.clone();

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            let object: Map<String, Value> = headers
                .iter()
                .zip(record.iter())
                .map(|(h, cell)| (h.to_string(), Value::String(cell.to_string())))
                .collect();
            rows.push(Value::Object(object));
        }
        Ok(Value::Array(rows))
    }
}

#[async_trait]
impl MeasurementSource for CsvFileSource {
    async fn fetch(&self, _partition: &PartitionConfig) -> Result<Value, EtlError> {
        self.read()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[tokio::test]
    async fn test_csv_source_returns_array_of_objects() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("telco.csv");
        let body = "customerID, tenure ,TotalCharges\n0001,1,29.85\n0002,34, \n";
        std::fs::write(&path, body).unwrap();

        let source = CsvFileSource::new(&path);
        let payload = source.fetch(&PartitionConfig::named("churn")).await.unwrap();

        assert_eq!(
            payload,
            json!([
                {"customerID": "0001", "tenure": "1", "TotalCharges": "29.85"},
                {"customerID": "0002", "tenure": "34", "TotalCharges": " "}
            ])
        );
        assert_eq!(source.path(), path.as_path());
    }

    #[tokio::test]
    async fn test_missing_extract_is_not_retryable() {
        let source = CsvFileSource::new("/nonexistent/telco.csv");
        let err = source.fetch(&PartitionConfig::named("churn")).await.unwrap_err();
        assert_eq!(err.kind(), "not_found");
        assert!(!crate::pipeline::RetryOn::Remote.matches(&err));
    }

    #[cfg(feature = "http")]
    #[tokio::test]
    async fn test_http_partition_without_coordinates_is_config_error() {
        let source = HttpMeasurementSource::with_client(
            "http://127.0.0.1:9",
            &["pm2_5".to_string()],
            reqwest::Client::new(),
        );
        let err = source.fetch(&PartitionConfig::named("Nowhere")).await.unwrap_err();
        assert_eq!(err.kind(), "config");
    }

    #[cfg(feature = "http")]
    fn stub_source(server: &crate::testing::StubHttpServer) -> HttpMeasurementSource {
        let client = reqwest::Client::builder().no_proxy().build().unwrap();
        let metrics = ["pm2_5".to_string(), "carbon_monoxide".to_string()];
        let url = format!("{}/v1/air-quality", server.url());
        HttpMeasurementSource::with_client(url, &metrics, client)
    }

    #[cfg(feature = "http")]
    #[tokio::test]
    async fn test_http_fetch_sends_coordinates_and_metrics() {
        use crate::testing::StubHttpServer;

        let body = r#"{"hourly": {"time": ["2024-05-01T00:00"], "pm2_5": [12.5]}}"#;
        let server = StubHttpServer::start(vec![(200, body.to_string())]).await.unwrap();
        let source = stub_source(&server);

        let payload = source
            .fetch(&PartitionConfig::new("Delhi", 28.7041, 77.1025))
            .await
            .unwrap();

        assert_eq!(payload["hourly"]["pm2_5"], json!([12.5]));
        let request = &server.requests()[0];
        assert_eq!(request.method, "GET");
        assert_eq!(request.path(), "/v1/air-quality");
        assert_eq!(request.query("latitude").as_deref(), Some("28.7041"));
        assert_eq!(request.query("longitude").as_deref(), Some("77.1025"));
        assert_eq!(request.query("hourly").as_deref(), Some("pm2_5,carbon_monoxide"));
    }

    #[cfg(feature = "http")]
    #[tokio::test]
    async fn test_http_error_status_and_bad_body_are_classified() {
        use crate::testing::StubHttpServer;

        let server = StubHttpServer::start(vec![
            (429, r#"{"reason": "slow down"}"#.to_string()),
            (200, "<html>maintenance</html>".to_string()),
        ])
        .await
        .unwrap();
        let source = stub_source(&server);
        let delhi = PartitionConfig::new("Delhi", 28.7, 77.1);

        let throttled = source.fetch(&delhi).await.unwrap_err();
        assert!(matches!(throttled, EtlError::RemoteStatus { status: 429, .. }));
        assert!(crate::pipeline::RetryOn::Remote.matches(&throttled));

        let garbled = source.fetch(&delhi).await.unwrap_err();
        assert_eq!(garbled.kind(), "decode");
        assert!(!crate::pipeline::RetryOn::Remote.matches(&garbled));
        assert_eq!(server.requests().len(), 2);
    }
}

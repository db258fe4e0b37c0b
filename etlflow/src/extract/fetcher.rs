//! Partition fetcher.

use futures::stream::{self, StreamExt};
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

use super::archive::{NoArchive, RawArchive};
use super::payload::PayloadFormat;
use super::source::MeasurementSource;
use crate::config::PartitionConfig;
use crate::core::RawPartition;
use crate::events::{names, EventSink, NoOpEventSink};
use crate::pipeline::{retry_with, CancellationToken, RetryConfig, RetryOn};

/// Fetches partitions from a source with bounded retries.
///
/// A fetch never fails past this boundary: exhausted retries produce a
/// [`RawPartition`] marked failed, and other partitions carry on.
#[derive(Clone)]
pub struct Fetcher {
    source: Arc<dyn MeasurementSource>,
    archive: Arc<dyn RawArchive>,
    format: PayloadFormat,
    retry: RetryConfig,
    workers: usize,
    sink: Arc<dyn EventSink>,
}

impl std::fmt::Debug for Fetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fetcher")
            .field("format", &self.format)
            .field("retry", &self.retry)
            .field("workers", &self.workers)
            .finish_non_exhaustive()
    }
}

impl Fetcher {
    /// Creates a fetcher with the default policy: 3 attempts, 1 s doubling
    /// backoff, 4 workers, no archive.
    #[must_use]
    pub fn new(source: Arc<dyn MeasurementSource>, format: PayloadFormat) -> Self {
        Self {
            source,
            archive: Arc::new(NoArchive),
            format,
            retry: RetryConfig::exponential(3, 1000).with_retry_on(RetryOn::Remote),
            workers: 4,
            sink: Arc::new(NoOpEventSink),
        }
    }

    /// Sets the raw archive.
    #[must_use]
    pub fn with_archive(mut self, archive: Arc<dyn RawArchive>) -> Self {
        self.archive = archive;
        self
    }

    /// Sets the retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Sets how many partitions are fetched at once.
    #[must_use]
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Fetches, archives and decodes one partition.
    pub async fn fetch(
        &self,
        partition: &PartitionConfig,
        token: &CancellationToken,
    ) -> RawPartition {
        let key = partition.key.as_str();
        let start = Instant::now();
        let sink = Arc::clone(&self.sink);

        let outcome = retry_with(
            &self.retry,
            key,
            token,
            |attempt, err, delay| {
                warn!(partition = %key, attempt, error = %err, "Fetch attempt failed");
                sink.try_emit(
                    names::FETCH_RETRY,
                    Some(json!({
                        "partition": key,
                        "attempt": attempt,
                        "delay_ms": u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        "error": err.to_string(),
                    })),
                );
            },
            |_| self.source.fetch(partition),
        )
        .await;

        let attempts = outcome.attempts;
        let result = match outcome.result {
            Ok(payload) => {
                let fetched_at = chrono::Utc::now();
                let archive_path = self.archive.persist(key, &fetched_at, &payload).await;
                self.format.decode(&payload).map(|observations| {
                    RawPartition::succeeded(key, observations, archive_path, attempts)
                })
            }
            Err(err) => Err(err),
        };

        match result {
            Ok(partition) => {
                info!(
                    partition = %key,
                    attempts,
                    observations = partition.observations.len(),
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "Fetched partition"
                );
                partition
            }
            Err(err) => {
                warn!(partition = %key, attempts, error = %err, "Partition fetch failed");
                self.sink
                    .emit(
                        names::FETCH_FAILED,
                        Some(json!({
                            "partition": key,
                            "attempts": attempts,
                            "error": err.to_string(),
                            "interrupted": outcome.interrupted,
                        })),
                    )
                    .await;
                RawPartition::failed(key, err.to_string(), attempts)
            }
        }
    }

    /// Fetches every partition, at most `workers` at a time.
    ///
    /// Results come back in input order.
    pub async fn fetch_all(
        &self,
        partitions: &[PartitionConfig],
        token: &CancellationToken,
    ) -> Vec<RawPartition> {
        stream::iter(partitions)
            .map(|partition| self.fetch(partition, token))
            .buffered(self.workers)
            .collect()
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::EtlError;
    use crate::events::CollectingEventSink;
    use crate::extract::FsRawArchive;
    use crate::testing::ScriptedSource;
    use pretty_assertions::assert_eq;

    fn format() -> PayloadFormat {
        PayloadFormat::HourlySeries {
            metrics: vec!["pm2_5".into()],
        }
    }

    fn payload() -> serde_json::Value {
        json!({"hourly": {"time": ["2024-05-01T00:00", "2024-05-01T01:00"], "pm2_5": [10.0, 20.0]}})
    }

    fn fast_retry() -> RetryConfig {
        RetryConfig::exponential(3, 1).with_retry_on(RetryOn::Remote)
    }

    #[tokio::test]
    async fn test_fetch_recovers_after_transient_failures() {
        let source = ScriptedSource::new()
            .fail_times("Delhi", 2, || EtlError::Transport("reset".into()))
            .respond("Delhi", payload());
        let sink = Arc::new(CollectingEventSink::new());
        let dir = tempfile::tempdir().unwrap();
        let fetcher = Fetcher::new(Arc::new(source), format())
            .with_retry(fast_retry())
            .with_archive(Arc::new(FsRawArchive::new(dir.path())))
            .with_event_sink(sink.clone());

        let partition = fetcher
            .fetch(&PartitionConfig::new("Delhi", 28.7, 77.1), &CancellationToken::default())
            .await;

        assert!(partition.is_success());
        assert_eq!(partition.attempts, 3);
        assert_eq!(partition.observations.len(), 2);
        assert!(partition.archive_path().unwrap().exists());
        assert_eq!(sink.count_of(names::FETCH_RETRY), 2);
    }

    #[tokio::test]
    async fn test_exhausted_retries_yield_failed_partition() {
        let source = ScriptedSource::new().fail_times("Mumbai", 5, || EtlError::RemoteStatus {
            status: 503,
            message: "unavailable".into(),
        });
        let sink = Arc::new(CollectingEventSink::new());
        let fetcher = Fetcher::new(Arc::new(source), format())
            .with_retry(fast_retry())
            .with_event_sink(sink.clone());

        let partition = fetcher
            .fetch(&PartitionConfig::named("Mumbai"), &CancellationToken::default())
            .await;

        assert!(!partition.is_success());
        assert_eq!(partition.attempts, 3);
        assert!(partition.error().unwrap().contains("503"));
        assert_eq!(sink.count_of(names::FETCH_RETRY), 2);
        assert_eq!(sink.count_of(names::FETCH_FAILED), 1);
    }

    #[tokio::test]
    async fn test_decode_failure_is_not_retried() {
        let source = ScriptedSource::new().respond("Delhi", json!({"unexpected": true}));
        let fetcher = Fetcher::new(Arc::new(source), format()).with_retry(fast_retry());

        let partition = fetcher
            .fetch(&PartitionConfig::named("Delhi"), &CancellationToken::default())
            .await;

        assert!(!partition.is_success());
        assert_eq!(partition.attempts, 1);
    }

    #[tokio::test]
    async fn test_fetch_all_preserves_order_and_isolates_failures() {
        let source = ScriptedSource::new()
            .respond("Delhi", payload())
            .fail_times("Mumbai", 10, || EtlError::Transport("down".into()))
            .respond("Kolkata", payload());
        let fetcher = Fetcher::new(Arc::new(source), format())
            .with_retry(fast_retry())
            .with_workers(2);
        let partitions = vec![
            PartitionConfig::named("Delhi"),
            PartitionConfig::named("Mumbai"),
            PartitionConfig::named("Kolkata"),
        ];

        let results = fetcher.fetch_all(&partitions, &CancellationToken::default()).await;

        let keys: Vec<&str> = results.iter().map(|p| p.key.as_str()).collect();
        assert_eq!(keys, vec!["Delhi", "Mumbai", "Kolkata"]);
        let ok: Vec<bool> = results.iter().map(RawPartition::is_success).collect();
        assert_eq!(ok, vec![true, false, true]);
    }

    #[tokio::test]
    async fn test_cancelled_run_makes_no_attempts() {
        let source = ScriptedSource::new().respond("Delhi", payload());
        let fetcher = Fetcher::new(Arc::new(source), format());
        let token = CancellationToken::default();
        token.cancel("deadline");

        let partition = fetcher.fetch(&PartitionConfig::named("Delhi"), &token).await;
        assert!(!partition.is_success());
        assert_eq!(partition.attempts, 0);
    }
}

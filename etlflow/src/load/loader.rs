//! Batch loader.

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::ops::Range;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

use super::batch::batch_ranges;
use super::store::RemoteStore;
use crate::core::{Record, TableSchema};
use crate::errors::EtlError;
use crate::events::{names, EventSink, NoOpEventSink};
use crate::pipeline::{retry_with, CancellationToken, RetryConfig, RetryOn};

/// A batch that exhausted its attempts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedBatch {
    /// Zero-based batch index.
    pub index: usize,
    /// Rows covered by the batch.
    pub rows: Range<usize>,
    /// Attempts made. Zero when the run deadline passed before the batch started.
    pub attempts: usize,
    /// Last error.
    pub error: String,
}

/// Outcome of loading one record set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadResult {
    /// Rows submitted.
    pub attempted: usize,
    /// Rows in batches that were accepted.
    pub inserted: usize,
    /// Rows in batches that were not.
    pub failed: usize,
    /// Number of batches.
    pub batches: usize,
    /// Permanently failed batches, by index.
    pub failed_batches: Vec<FailedBatch>,
    /// Error from the schema step, if it failed. Loading continues regardless.
    pub schema_error: Option<String>,
}

impl LoadResult {
    /// Returns true if every row landed.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failed == 0
    }

    /// Checks the accounting: `attempted == inserted + failed` and the failed
    /// rows are exactly the rows of the failed batches.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        let failed_rows: usize = self.failed_batches.iter().map(|b| b.rows.len()).sum();
        self.attempted == self.inserted + self.failed && self.failed == failed_rows
    }
}

struct BatchOutcome {
    index: usize,
    rows: Range<usize>,
    attempts: usize,
    error: Option<String>,
}

/// Inserts records in fixed-size batches with per-batch retries.
///
/// A batch that keeps failing is recorded and the next one still runs.
#[derive(Clone)]
pub struct BatchLoader {
    store: Arc<dyn RemoteStore>,
    retry: RetryConfig,
    batch_size: usize,
    concurrency: usize,
    sink: Arc<dyn EventSink>,
}

impl std::fmt::Debug for BatchLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchLoader")
            .field("retry", &self.retry)
            .field("batch_size", &self.batch_size)
            .field("concurrency", &self.concurrency)
            .finish_non_exhaustive()
    }
}

impl BatchLoader {
    /// Creates a loader with the default policy: 200 rows per batch, 3
    /// attempts 1.5 s apart, one batch in flight.
    #[must_use]
    pub fn new(store: Arc<dyn RemoteStore>) -> Self {
        Self {
            store,
            retry: RetryConfig::fixed(3, 1500).with_retry_on(RetryOn::Any),
            batch_size: 200,
            concurrency: 1,
            sink: Arc::new(NoOpEventSink),
        }
    }

    /// Sets the batch size.
    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Sets the retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Sets how many batches may be in flight.
    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Loads `records` into the schema's table.
    ///
    /// Never fails: schema and batch errors are folded into the result.
    pub async fn load(
        &self,
        schema: &TableSchema,
        records: &[Record],
        token: &CancellationToken,
    ) -> LoadResult {
        let start = Instant::now();
        let table = schema.table.as_str();

        let schema_error = match self.store.ensure_schema(schema).await {
            Ok(()) => None,
            Err(err) => {
                warn!(
                    table = %table,
                    error = %err,
                    "Could not ensure table exists; continuing"
                );
                Some(err.to_string())
            }
        };

        let ranges = batch_ranges(records.len(), self.batch_size);
        let batches = ranges.len();

        let mut outcomes: Vec<BatchOutcome> = stream::iter(ranges.into_iter().enumerate())
            .map(|(index, rows)| self.insert_batch(table, records, index, rows, token))
            .buffer_unordered(self.concurrency)
            .collect()
            .await;
        outcomes.sort_by_key(|o| o.index);

        let mut result = LoadResult {
            attempted: records.len(),
            batches,
            schema_error,
            ..LoadResult::default()
        };
        for outcome in outcomes {
            match outcome.error {
                None => result.inserted += outcome.rows.len(),
                Some(error) => {
                    result.failed += outcome.rows.len();
                    result.failed_batches.push(FailedBatch {
                        index: outcome.index,
                        rows: outcome.rows,
                        attempts: outcome.attempts,
                        error,
                    });
                }
            }
        }

        info!(
            table = %table,
            attempted = result.attempted,
            inserted = result.inserted,
            failed = result.failed,
            batches = result.batches,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Load summary"
        );
        result
    }

    async fn insert_batch(
        &self,
        table: &str,
        records: &[Record],
        index: usize,
        rows: Range<usize>,
        token: &CancellationToken,
    ) -> BatchOutcome {
        let slice = &records[rows.clone()];
        let key = format!("{table}#{index}");
        let sink = Arc::clone(&self.sink);

        let outcome = retry_with(
            &self.retry,
            &key,
            token,
            |attempt, err, _| {
                warn!(batch = index, attempt, error = %err, "Batch insert failed");
                sink.try_emit(
                    names::LOAD_RETRY,
                    Some(json!({ "batch": index, "attempt": attempt, "error": err.to_string() })),
                );
            },
            |_| self.store.insert(table, slice),
        )
        .await;

        match outcome.result {
            Ok(()) => {
                info!(
                    batch = index,
                    first_row = rows.start + 1,
                    last_row = rows.end,
                    "Inserted batch"
                );
                BatchOutcome {
                    index,
                    rows,
                    attempts: outcome.attempts,
                    error: None,
                }
            }
            Err(err) => {
                let error = match (&err, outcome.interrupted) {
                    (EtlError::Cancelled(_), _) | (_, None) => err.to_string(),
                    (_, Some(reason)) => format!("{err} (interrupted: {reason})"),
                };
                warn!(
                    batch = index,
                    attempts = outcome.attempts,
                    error = %error,
                    "Batch failed permanently"
                );
                self.sink
                    .emit(
                        names::LOAD_BATCH_FAILED,
                        Some(json!({
                            "batch": index,
                            "rows": [rows.start, rows.end],
                            "attempts": outcome.attempts,
                            "error": &error,
                        })),
                    )
                    .await;
                BatchOutcome {
                    index,
                    rows,
                    attempts: outcome.attempts,
                    error: Some(error),
                }
            }
        }
    }
}

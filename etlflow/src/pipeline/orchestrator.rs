//! Extract → Transform → Load → Analyze state machine.

use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

use super::{CancellationToken, RetryConfig};
use crate::analyze::{analyze, AnalysisReport};
use crate::config::{PartitionConfig, PipelineConfig};
use crate::core::{PipelineState, RawPartition, Record, StageStatus};
use crate::datasets::{DatasetKind, DatasetProfile};
use crate::errors::EtlError;
use crate::events::{names, EventSink, NoOpEventSink};
use crate::extract::{Fetcher, FsRawArchive, MeasurementSource, RawArchive};
use crate::load::{BatchLoader, LoadResult, RemoteStore};
use crate::transform::{read_staged, write_staged};
use crate::validate::{validate, ReconciliationReport};

/// Outcome of one stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageReport {
    /// Stage that ran.
    pub stage: PipelineState,
    /// How it ended.
    pub status: StageStatus,
    /// Wall time in milliseconds.
    pub duration_ms: f64,
    /// Short human-readable summary.
    pub detail: Option<String>,
    /// Error or panic message, if any.
    pub error: Option<String>,
}

/// Fetch outcome of one partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionSummary {
    /// Partition key.
    pub key: String,
    /// Whether the fetch succeeded.
    pub success: bool,
    /// Attempts made.
    pub attempts: usize,
    /// Observations decoded.
    pub observations: usize,
    /// Last error of a failed fetch.
    pub error: Option<String>,
}

impl From<&RawPartition> for PartitionSummary {
    fn from(partition: &RawPartition) -> Self {
        Self {
            key: partition.key.clone(),
            success: partition.is_success(),
            attempts: partition.attempts,
            observations: partition.observations.len(),
            error: partition.error().map(ToString::to_string),
        }
    }
}

/// Everything one run produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    /// Unique id of the run.
    pub run_id: Uuid,
    /// Dataset processed.
    pub dataset: DatasetKind,
    /// Final state, [`PipelineState::Done`] or [`PipelineState::Aborted`].
    pub state: PipelineState,
    /// Why the run stopped early.
    pub abort_reason: Option<String>,
    /// Stage reports in execution order.
    pub stages: Vec<StageReport>,
    /// Per-partition fetch outcomes.
    pub partitions: Vec<PartitionSummary>,
    /// Engineered rows produced by Transform.
    pub rows_engineered: usize,
    /// Staged artifact written by Transform.
    pub staged_path: Option<PathBuf>,
    /// Load accounting.
    pub load: Option<LoadResult>,
    /// Post-load reconciliation.
    pub reconciliation: Option<ReconciliationReport>,
    /// KPI, distribution and trend tables.
    pub analysis: Option<AnalysisReport>,
    /// Report files written.
    pub exported: Vec<PathBuf>,
    /// Total wall time in milliseconds.
    pub duration_ms: f64,
}

impl RunReport {
    fn new(dataset: DatasetKind) -> Self {
        Self {
            run_id: Uuid::now_v7(),
            dataset,
            state: PipelineState::Extract,
            abort_reason: None,
            stages: Vec::new(),
            partitions: Vec::new(),
            rows_engineered: 0,
            staged_path: None,
            load: None,
            reconciliation: None,
            analysis: None,
            exported: Vec::new(),
            duration_ms: 0.0,
        }
    }

    /// Returns true if the run stopped before loading.
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        self.state == PipelineState::Aborted
    }

    /// Report of a stage, if it ran.
    #[must_use]
    pub fn stage(&self, stage: PipelineState) -> Option<&StageReport> {
        self.stages.iter().find(|s| s.stage == stage)
    }
}

struct AnalyzeOutcome {
    reconciliation: Option<ReconciliationReport>,
    select_error: Option<String>,
    analysis: AnalysisReport,
    exported: Vec<PathBuf>,
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic payload".to_string())
}

/// One configured ETL pipeline.
///
/// Collaborators are passed in once and reused for every run; a run owns its
/// partitions, rows and load accounting.
pub struct Pipeline {
    profile: DatasetProfile,
    partitions: Vec<PartitionConfig>,
    fetcher: Fetcher,
    loader: BatchLoader,
    store: Arc<dyn RemoteStore>,
    staged_dir: PathBuf,
    processed_dir: PathBuf,
    run_timeout: Option<Duration>,
    event_sink: Arc<dyn EventSink>,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("dataset", &self.profile.kind)
            .field("table", &self.profile.schema.table)
            .field("partitions", &self.partitions.len())
            .field("staged_dir", &self.staged_dir)
            .field("processed_dir", &self.processed_dir)
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    /// Creates a pipeline with default retry, batching and paths.
    #[must_use]
    pub fn new(
        profile: DatasetProfile,
        source: Arc<dyn MeasurementSource>,
        store: Arc<dyn RemoteStore>,
    ) -> Self {
        Self {
            fetcher: Fetcher::new(source, profile.payload.clone()),
            loader: BatchLoader::new(store.clone()),
            profile,
            partitions: Vec::new(),
            store,
            staged_dir: PathBuf::from("data/staged"),
            processed_dir: PathBuf::from("data/processed"),
            run_timeout: None,
            event_sink: Arc::new(NoOpEventSink),
        }
    }

    /// Creates a pipeline from a loaded configuration.
    ///
    /// Does not call [`PipelineConfig::validate`]; the caller decides which
    /// keys its collaborators need.
    #[must_use]
    pub fn from_config(
        config: &PipelineConfig,
        source: Arc<dyn MeasurementSource>,
        store: Arc<dyn RemoteStore>,
    ) -> Self {
        let profile = config.dataset.profile().with_table(config.table());
        let mut pipeline = Self::new(profile, source, store)
            .with_partitions(config.partitions())
            .with_fetch_retry(config.fetch.retry())
            .with_load_retry(config.load.retry())
            .with_archive(Arc::new(FsRawArchive::new(config.paths.raw_dir.clone())))
            .with_staged_dir(&config.paths.staged_dir)
            .with_processed_dir(&config.paths.processed_dir);
        pipeline.fetcher = pipeline.fetcher.with_workers(config.fetch.workers);
        pipeline.loader = pipeline
            .loader
            .with_batch_size(config.load.batch_size)
            .with_concurrency(config.load.concurrency);
        pipeline.run_timeout = config.run_timeout();
        pipeline
    }

    /// Sets the partitions fetched by Extract.
    #[must_use]
    pub fn with_partitions(mut self, partitions: Vec<PartitionConfig>) -> Self {
        self.partitions = partitions;
        self
    }

    /// Sets the fetch retry policy.
    #[must_use]
    pub fn with_fetch_retry(mut self, retry: RetryConfig) -> Self {
        self.fetcher = self.fetcher.with_retry(retry);
        self
    }

    /// Sets the batch retry policy.
    #[must_use]
    pub fn with_load_retry(mut self, retry: RetryConfig) -> Self {
        self.loader = self.loader.with_retry(retry);
        self
    }

    /// Sets the batch size.
    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.loader = self.loader.with_batch_size(batch_size);
        self
    }

    /// Sets where raw payloads are archived.
    #[must_use]
    pub fn with_archive(mut self, archive: Arc<dyn RawArchive>) -> Self {
        self.fetcher = self.fetcher.with_archive(archive);
        self
    }

    /// Sets the directory of the staged artifact.
    #[must_use]
    pub fn with_staged_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.staged_dir = dir.as_ref().to_path_buf();
        self
    }

    /// Sets the directory report tables are exported to.
    #[must_use]
    pub fn with_processed_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.processed_dir = dir.as_ref().to_path_buf();
        self
    }

    /// Bounds the whole run.
    #[must_use]
    pub fn with_run_timeout(mut self, timeout: Duration) -> Self {
        self.run_timeout = Some(timeout);
        self
    }

    /// Sets the event sink of the run and its components.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.fetcher = self.fetcher.with_event_sink(sink.clone());
        self.loader = self.loader.with_event_sink(sink.clone());
        self.event_sink = sink;
        self
    }

    /// Dataset profile driving the run.
    #[must_use]
    pub fn profile(&self) -> &DatasetProfile {
        &self.profile
    }

    /// Path of the staged artifact.
    #[must_use]
    pub fn staged_path(&self) -> PathBuf {
        self.staged_dir.join(&self.profile.staged_file)
    }

    /// Runs every stage once and reports the outcome.
    ///
    /// Never returns an error: stage failures, panics and empty results end
    /// up in the report.
    pub async fn run(&self) -> RunReport {
        let started = Instant::now();
        let token = CancellationToken::from_timeout(self.run_timeout);
        let mut report = RunReport::new(self.profile.kind);
        let mut partitions: Vec<RawPartition> = Vec::new();
        let mut records: Vec<Record> = Vec::new();

        tracing::info!(
            run_id = %report.run_id,
            dataset = %self.profile.kind,
            partitions = self.partitions.len(),
            "Starting pipeline run"
        );

        while !report.state.is_terminal() {
            let state = report.state;
            let stage_started = Instant::now();
            self.event_sink.try_emit(
                names::STAGE_STARTED,
                Some(json!({ "run_id": report.run_id, "stage": state.to_string() })),
            );

            let (stage, next) = match state {
                PipelineState::Extract => {
                    match self.guard(self.extract(&token)).await {
                        Ok(fetched) => {
                            let failed = fetched.iter().filter(|p| !p.is_success()).count();
                            let status = if failed == 0 {
                                StageStatus::Ok
                            } else {
                                StageStatus::Partial
                            };
                            let stage = StageReport {
                                stage: state,
                                status,
                                duration_ms: 0.0,
                                detail: Some(format!(
                                    "{} partitions, {failed} failed",
                                    fetched.len()
                                )),
                                error: None,
                            };
                            partitions = fetched;
                            report.partitions =
                                partitions.iter().map(PartitionSummary::from).collect();
                            (stage, state.next())
                        }
                        Err(error) => (Self::failed(state, error), PipelineState::Aborted),
                    }
                }
                PipelineState::Transform => match self
                    .guard(async { self.transform(&partitions) })
                    .await
                {
                    Ok(engineered) if engineered.is_empty() => {
                        report.abort_reason = Some("transform produced no rows".to_string());
                        let stage = StageReport {
                            stage: state,
                            status: StageStatus::Skip,
                            duration_ms: 0.0,
                            detail: Some("0 rows".to_string()),
                            error: None,
                        };
                        (stage, PipelineState::Aborted)
                    }
                    Ok(engineered) => {
                        report.rows_engineered = engineered.len();
                        report.staged_path = Some(self.staged_path());
                        records = engineered;
                        let stage = StageReport {
                            stage: state,
                            status: StageStatus::Ok,
                            duration_ms: 0.0,
                            detail: Some(format!("{} rows", records.len())),
                            error: None,
                        };
                        (stage, state.next())
                    }
                    Err(error) => {
                        report.abort_reason = Some(format!("transform failed: {error}"));
                        (Self::failed(state, error), PipelineState::Aborted)
                    }
                },
                PipelineState::Load => {
                    let stage = match self.guard(self.load(&records, &token)).await {
                        Ok(result) => {
                            let status = if result.is_complete() {
                                StageStatus::Ok
                            } else if result.inserted == 0 {
                                StageStatus::Fail
                            } else {
                                StageStatus::Partial
                            };
                            let stage = StageReport {
                                stage: state,
                                status,
                                duration_ms: 0.0,
                                detail: Some(format!(
                                    "{} inserted, {} failed of {}",
                                    result.inserted, result.failed, result.attempted
                                )),
                                error: result.schema_error.clone(),
                            };
                            report.load = Some(result);
                            stage
                        }
                        Err(error) => Self::failed(state, error),
                    };
                    (stage, state.next())
                }
                PipelineState::Analyze => {
                    let stage = match self.guard(self.analyze(&records)).await {
                        Ok(outcome) => {
                            let stage = StageReport {
                                stage: state,
                                status: if outcome.select_error.is_some() {
                                    StageStatus::Partial
                                } else {
                                    StageStatus::Ok
                                },
                                duration_ms: 0.0,
                                detail: Some(format!("{} report tables", outcome.exported.len())),
                                error: outcome.select_error,
                            };
                            report.reconciliation = outcome.reconciliation;
                            report.analysis = Some(outcome.analysis);
                            report.exported = outcome.exported;
                            stage
                        }
                        Err(error) => Self::failed(state, error),
                    };
                    (stage, state.next())
                }
                PipelineState::Done | PipelineState::Aborted => break,
            };

            let stage = StageReport {
                duration_ms: stage_started.elapsed().as_secs_f64() * 1000.0,
                ..stage
            };
            self.record_stage(&report.run_id, &stage);
            report.stages.push(stage);
            if next == PipelineState::Aborted && report.abort_reason.is_none() {
                report.abort_reason = Some(format!("{state} failed"));
            }
            report.state = next;
        }

        report.duration_ms = started.elapsed().as_secs_f64() * 1000.0;
        match &report.abort_reason {
            Some(reason) if report.is_aborted() => {
                tracing::warn!(run_id = %report.run_id, reason = %reason, "Pipeline aborted");
                self.event_sink.try_emit(
                    names::PIPELINE_ABORTED,
                    Some(json!({ "run_id": report.run_id, "reason": reason })),
                );
            }
            _ => {
                tracing::info!(
                    run_id = %report.run_id,
                    duration_ms = report.duration_ms,
                    "Pipeline completed"
                );
                self.event_sink.try_emit(
                    names::PIPELINE_COMPLETED,
                    Some(json!({ "run_id": report.run_id, "duration_ms": report.duration_ms })),
                );
            }
        }
        report
    }

    /// Runs a stage future, turning errors and panics into a message.
    async fn guard<T, F>(&self, stage: F) -> Result<T, String>
    where
        F: Future<Output = Result<T, EtlError>>,
    {
        match AssertUnwindSafe(stage).catch_unwind().await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(error)) => Err(error.to_string()),
            Err(payload) => Err(format!("stage panicked: {}", panic_message(&*payload))),
        }
    }

    fn failed(stage: PipelineState, error: String) -> StageReport {
        StageReport {
            stage,
            status: StageStatus::Fail,
            duration_ms: 0.0,
            detail: None,
            error: Some(error),
        }
    }

    fn record_stage(&self, run_id: &Uuid, stage: &StageReport) {
        if stage.status == StageStatus::Fail {
            tracing::error!(
                run_id = %run_id,
                stage = %stage.stage,
                error = stage.error.as_deref().unwrap_or_default(),
                "Stage failed"
            );
            self.event_sink.try_emit(
                names::STAGE_FAILED,
                Some(json!({
                    "run_id": run_id,
                    "stage": stage.stage.to_string(),
                    "error": stage.error,
                    "duration_ms": stage.duration_ms,
                })),
            );
        } else {
            tracing::info!(
                run_id = %run_id,
                stage = %stage.stage,
                status = %stage.status,
                detail = stage.detail.as_deref().unwrap_or_default(),
                "Stage completed"
            );
            self.event_sink.try_emit(
                names::STAGE_COMPLETED,
                Some(json!({
                    "run_id": run_id,
                    "stage": stage.stage.to_string(),
                    "status": stage.status.to_string(),
                    "duration_ms": stage.duration_ms,
                })),
            );
        }
    }

    async fn extract(&self, token: &CancellationToken) -> Result<Vec<RawPartition>, EtlError> {
        Ok(self.fetcher.fetch_all(&self.partitions, token).await)
    }

    fn transform(&self, partitions: &[RawPartition]) -> Result<Vec<Record>, EtlError> {
        let rows = self.profile.engine.engineer_partitions(partitions);
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        let records = self.profile.schema.project_all(&rows);
        write_staged(&self.staged_path(), &self.profile.schema, &records)?;
        Ok(records)
    }

    async fn load(
        &self,
        records: &[Record],
        token: &CancellationToken,
    ) -> Result<LoadResult, EtlError> {
        Ok(self.loader.load(&self.profile.schema, records, token).await)
    }

    async fn analyze(&self, records: &[Record]) -> Result<AnalyzeOutcome, EtlError> {
        let schema = &self.profile.schema;
        let (reconciliation, select_error) = match self.store.select_all(&schema.table).await {
            Ok(remote) => {
                let staged = read_staged(&self.staged_path(), schema)?;
                (Some(validate(&self.profile.rules, &staged, &remote)), None)
            }
            Err(error) => {
                tracing::warn!(
                    table = %schema.table,
                    error = %error,
                    "Could not select remote table"
                );
                (None, Some(format!("select failed: {error}")))
            }
        };

        let analysis = analyze(&self.profile.analysis, records);
        let exported = if self.profile.analysis.is_empty() {
            Vec::new()
        } else {
            analysis.export(&self.processed_dir)?
        };

        Ok(AnalyzeOutcome {
            reconciliation,
            select_error,
            analysis,
            exported,
        })
    }
}

//! Runs one pipeline pass with configuration from the environment.
//!
//! Usage: `etlflow [config.toml]`. Set `ETLFLOW_LOG_FORMAT=json` for JSON logs
//! and `RUST_LOG` to change the filter.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use etlflow::prelude::*;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

fn init_tracing() {
    let filter = || EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("ETLFLOW_LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    let layer = if json {
        tracing_subscriber::fmt::layer().json().with_filter(filter()).boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_filter(filter())
            .boxed()
    };
    tracing_subscriber::registry().with(layer).init();
}

fn source_for(
    config: &PipelineConfig,
    profile: &DatasetProfile,
) -> anyhow::Result<Arc<dyn MeasurementSource>> {
    match config.dataset {
        DatasetKind::AirQuality => {
            let source = HttpMeasurementSource::new(
                config.source.base_url.clone(),
                profile.payload.metrics(),
                config.source.timeout()?,
            )
            .context("building source client")?;
            Ok(Arc::new(source))
        }
        DatasetKind::Churn => {
            let path = config
                .source
                .csv_path
                .clone()
                .context("source.csv_path is required for the churn dataset")?;
            Ok(Arc::new(CsvFileSource::new(path)))
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    init_tracing();

    let file = std::env::args().nth(1).map(PathBuf::from);
    let config = PipelineConfig::load(file.as_deref()).context("Configuration error")?;

    let profile = config.dataset.profile();
    let source = source_for(&config, &profile)?;
    let store = HttpTableStore::new(
        config.store.endpoint.clone().unwrap_or_default(),
        config.store.api_key.clone().unwrap_or_default(),
        config.store.timeout()?,
    )
    .context("building store client")?;

    let pipeline = Pipeline::from_config(&config, source, Arc::new(store))
        .with_event_sink(Arc::new(LoggingEventSink::debug()));
    let report = pipeline.run().await;

    for stage in &report.stages {
        tracing::info!(
            stage = %stage.stage,
            status = %stage.status,
            duration_ms = stage.duration_ms,
            detail = stage.detail.as_deref().unwrap_or_default(),
            "Stage summary"
        );
    }
    if let Some(load) = &report.load {
        tracing::info!(
            attempted = load.attempted,
            inserted = load.inserted,
            failed = load.failed,
            batches = load.batches,
            "Load summary"
        );
    }
    if let Some(reconciliation) = &report.reconciliation {
        tracing::info!("Reconciliation:\n{reconciliation}");
    }
    if let Some(analysis) = &report.analysis {
        for (name, value) in &analysis.kpis.values {
            tracing::info!(kpi = %name, value = %value, "KPI");
        }
    }
    println!("{}", serde_json::to_string_pretty(&report)?);

    if report.is_aborted() {
        anyhow::bail!(
            "pipeline aborted: {}",
            report.abort_reason.as_deref().unwrap_or("unknown reason")
        );
    }
    Ok(())
}

//! Raw payload archive.
//!
//! Payloads are stored verbatim as `<key>_raw_<YYYYMMDDTHHMMSSZ>.json` where
//! the key is lowercased with spaces replaced by `_`. A payload that cannot
//! be written as JSON falls back to a `.txt` rendering.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::payload::PayloadFormat;
use crate::core::timestamps::archive_stamp;
use crate::core::RawPartition;
use crate::errors::EtlError;

const RAW_MARKER: &str = "_raw_";

/// Stores raw payloads.
#[async_trait]
pub trait RawArchive: Send + Sync {
    /// Persists a payload. Returns where it landed, or `None` if every write
    /// failed. Never fails the fetch.
    async fn persist(
        &self,
        key: &str,
        fetched_at: &DateTime<Utc>,
        payload: &Value,
    ) -> Option<PathBuf>;
}

/// Archive that keeps nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoArchive;

#[async_trait]
impl RawArchive for NoArchive {
    async fn persist(
        &self,
        _key: &str,
        _fetched_at: &DateTime<Utc>,
        _payload: &Value,
    ) -> Option<PathBuf> {
        None
    }
}

/// File name stem for an archived payload.
#[must_use]
pub fn archive_stem(key: &str, fetched_at: &DateTime<Utc>) -> String {
    format!(
        "{}{RAW_MARKER}{}",
        key.replace(' ', "_").to_lowercase(),
        archive_stamp(fetched_at)
    )
}

/// Archive writing into a local directory.
#[derive(Debug, Clone)]
pub struct FsRawArchive {
    dir: PathBuf,
}

impl FsRawArchive {
    /// Creates an archive rooted at `dir`. The directory is created lazily.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Archive directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    async fn write_json(&self, stem: &str, payload: &Value) -> Result<PathBuf, EtlError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.dir.join(format!("{stem}.json"));
        let body = serde_json::to_string_pretty(payload)?;
        tokio::fs::write(&path, body).await?;
        Ok(path)
    }

    async fn write_text(&self, stem: &str, payload: &Value) -> Result<PathBuf, EtlError> {
        let path = self.dir.join(format!("{stem}.txt"));
        tokio::fs::write(&path, payload.to_string()).await?;
        Ok(path)
    }

    /// Re-reads every archived `*_raw_*.json` payload into partitions.
    ///
    /// The partition key is the file stem before `_raw_`. Files are visited
    /// in name order; a file that cannot be read or decoded yields a failed
    /// partition.
    pub fn replay(&self, format: &PayloadFormat) -> Result<Vec<RawPartition>, EtlError> {
        let mut paths: Vec<PathBuf> = fs::read_dir(&self.dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| {
                p.extension().is_some_and(|ext| ext == "json")
                    && p
                        .file_stem()
                        .and_then(|s| s.to_str())
                        .is_some_and(|s| s.contains(RAW_MARKER))
            })
            .collect();
        paths.sort();

        Ok(paths
            .into_iter()
            .map(|path| {
                let stem = path
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .unwrap_or_default()
                    .to_string();
                let key = stem.split(RAW_MARKER).next().unwrap_or_default().to_string();
                let decoded = fs::read_to_string(&path)
                    .map_err(EtlError::from)
                    .and_then(|body| serde_json::from_str::<Value>(&body).map_err(EtlError::from))
                    .and_then(|payload| format.decode(&payload));
                match decoded {
                    Ok(observations) => RawPartition::succeeded(key, observations, Some(path), 0),
                    Err(err) => {
                        warn!(
                            path = %path.display(),
                            error = %err,
                            "Could not replay archived payload"
                        );
                        RawPartition::failed(key, err.to_string(), 0)
                    }
                }
            })
            .collect())
    }
}

#[async_trait]
impl RawArchive for FsRawArchive {
    async fn persist(
        &self,
        key: &str,
        fetched_at: &DateTime<Utc>,
        payload: &Value,
    ) -> Option<PathBuf> {
        let stem = archive_stem(key, fetched_at);
        match self.write_json(&stem, payload).await {
            Ok(path) => {
                debug!(key = %key, path = %path.display(), "Archived raw payload");
                Some(path)
            }
            Err(json_err) => match self.write_text(&stem, payload).await {
                Ok(path) => {
                    warn!(
                        key = %key,
                        error = %json_err,
                        path = %path.display(),
                        "JSON archive failed, wrote text fallback"
                    );
                    Some(path)
                }
                Err(text_err) => {
                    warn!(key = %key, error = %text_err, "Could not archive raw payload");
                    None
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 13, 4, 5).unwrap()
    }

    #[test]
    fn test_archive_stem() {
        assert_eq!(archive_stem("New Delhi", &at()), "new_delhi_raw_20240501T130405Z");
    }

    #[tokio::test]
    async fn test_persist_writes_verbatim_json() {
        let dir = tempfile::tempdir().unwrap();
        let archive = FsRawArchive::new(dir.path().join("raw"));
        let payload = json!({"hourly": {"time": ["2024-05-01T00:00"], "pm2_5": [4.2]}});

        let path = archive.persist("Delhi", &at(), &payload).await.unwrap();
        assert_eq!(path.file_name().unwrap(), "delhi_raw_20240501T130405Z.json");
        let stored: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(stored, payload);
    }

    #[tokio::test]
    async fn test_blocked_json_path_falls_back_to_text() {
        let dir = tempfile::tempdir().unwrap();
        let archive = FsRawArchive::new(dir.path());
        // A directory squatting on the JSON file name makes that write fail.
        fs::create_dir(dir.path().join("delhi_raw_20240501T130405Z.json")).unwrap();
        let payload = json!({"hourly": {"time": ["2024-05-01T00:00"], "pm2_5": [4.2]}});

        let path = archive.persist("Delhi", &at(), &payload).await.unwrap();

        assert_eq!(path.file_name().unwrap(), "delhi_raw_20240501T130405Z.txt");
        assert_eq!(fs::read_to_string(&path).unwrap(), payload.to_string());
    }

    #[tokio::test]
    async fn test_unwritable_archive_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        fs::write(&blocker, "x").unwrap();
        let archive = FsRawArchive::new(blocker.join("raw"));
        assert!(archive.persist("Delhi", &at(), &json!({})).await.is_none());
        assert!(NoArchive.persist("Delhi", &at(), &json!({})).await.is_none());
    }

    #[tokio::test]
    async fn test_replay_reads_archived_partitions() {
        let dir = tempfile::tempdir().unwrap();
        let archive = FsRawArchive::new(dir.path());
        let format = PayloadFormat::HourlySeries {
            metrics: vec!["pm2_5".into()],
        };
        let mumbai = json!({"hourly": {"time": ["2024-05-01T00:00"], "pm2_5": [1.0]}});
        archive.persist("Mumbai", &at(), &mumbai).await;
        archive.persist("Delhi", &at(), &json!({"nothing": true})).await;
        fs::write(dir.path().join("notes.json"), "{}").unwrap();

        let partitions = archive.replay(&format).unwrap();
        assert_eq!(partitions.len(), 2);
        assert_eq!(partitions[0].key, "delhi");
        assert!(!partitions[0].is_success());
        assert_eq!(partitions[1].key, "mumbai");
        assert_eq!(partitions[1].observations.len(), 1);
    }
}

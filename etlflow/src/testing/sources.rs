//! Scripted measurement source.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};

use crate::config::PartitionConfig;
use crate::errors::EtlError;
use crate::extract::MeasurementSource;

type ErrorFactory = Box<dyn Fn() -> EtlError + Send + Sync>;

enum Step {
    Fail(ErrorFactory),
    Respond(Value),
}

/// A source replaying a per-partition script.
///
/// Steps are consumed in order; the last `respond` step repeats forever.
/// A partition with nothing left to play answers [`EtlError::NotFound`].
#[derive(Default)]
pub struct ScriptedSource {
    scripts: Mutex<HashMap<String, VecDeque<Step>>>,
    calls: Mutex<HashMap<String, usize>>,
}

impl std::fmt::Debug for ScriptedSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptedSource")
            .field("calls", &*self.calls.lock())
            .finish_non_exhaustive()
    }
}

impl ScriptedSource {
    /// Creates an empty source.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues `n` failures for a partition.
    #[must_use]
    pub fn fail_times<F>(self, key: &str, n: usize, error: F) -> Self
    where
        F: Fn() -> EtlError + Send + Sync + 'static,
    {
        let error: std::sync::Arc<F> = std::sync::Arc::new(error);
        {
            let mut scripts = self.scripts.lock();
            let script = scripts.entry(key.to_string()).or_default();
            for _ in 0..n {
                let error = error.clone();
                script.push_back(Step::Fail(Box::new(move || (*error)())));
            }
        }
        self
    }

    /// Queues a successful payload for a partition.
    #[must_use]
    pub fn respond(self, key: &str, payload: Value) -> Self {
        self.scripts
            .lock()
            .entry(key.to_string())
            .or_default()
            .push_back(Step::Respond(payload));
        self
    }

    /// Number of fetches made for a partition.
    #[must_use]
    pub fn calls(&self, key: &str) -> usize {
        self.calls.lock().get(key).copied().unwrap_or(0)
    }
}

#[async_trait]
impl MeasurementSource for ScriptedSource {
    async fn fetch(&self, partition: &PartitionConfig) -> Result<Value, EtlError> {
        *self.calls.lock().entry(partition.key.clone()).or_default() += 1;

        let mut scripts = self.scripts.lock();
        let Some(script) = scripts.get_mut(&partition.key) else {
            return Err(EtlError::NotFound(partition.key.clone()));
        };
        if script.len() == 1 {
            if let Some(Step::Respond(payload)) = script.front() {
                return Ok(payload.clone());
            }
        }
        match script.pop_front() {
            Some(Step::Fail(error)) => Err(error()),
            Some(Step::Respond(payload)) => Ok(payload),
            None => Err(EtlError::NotFound(partition.key.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_script_plays_in_order() {
        let source = ScriptedSource::new()
            .fail_times("Delhi", 1, || EtlError::Transport("reset".into()))
            .respond("Delhi", json!({"ok": 1}));
        let delhi = PartitionConfig::named("Delhi");

        assert!(source.fetch(&delhi).await.is_err());
        assert_eq!(source.fetch(&delhi).await.unwrap(), json!({"ok": 1}));
        assert_eq!(source.fetch(&delhi).await.unwrap(), json!({"ok": 1}));
        assert_eq!(source.calls("Delhi"), 3);
    }

    #[tokio::test]
    async fn test_unknown_partition_is_not_found() {
        let err = ScriptedSource::new()
            .fetch(&PartitionConfig::named("Pune"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "not_found");
    }
}

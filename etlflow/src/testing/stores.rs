//! In-memory remote stores.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;

use crate::core::{Record, TableSchema};
use crate::errors::EtlError;
use crate::load::RemoteStore;

/// A remote store keeping tables in memory.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    tables: Mutex<HashMap<String, Vec<Record>>>,
    ddl: Mutex<Vec<String>>,
}

impl InMemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a table with rows.
    #[must_use]
    pub fn with_rows(self, table: &str, rows: Vec<Record>) -> Self {
        self.tables.lock().insert(table.to_string(), rows);
        self
    }

    /// Rows of a table, in insertion order.
    #[must_use]
    pub fn rows(&self, table: &str) -> Vec<Record> {
        self.tables.lock().get(table).cloned().unwrap_or_default()
    }

    /// Number of schema statements received.
    #[must_use]
    pub fn ddl_count(&self) -> usize {
        self.ddl.lock().len()
    }
}

#[async_trait]
impl RemoteStore for InMemoryStore {
    async fn ensure_schema(&self, schema: &TableSchema) -> Result<(), EtlError> {
        self.ddl.lock().push(schema.create_table_sql());
        self.tables.lock().entry(schema.table.clone()).or_default();
        Ok(())
    }

    async fn insert(&self, table: &str, records: &[Record]) -> Result<(), EtlError> {
        self.tables
            .lock()
            .entry(table.to_string())
            .or_default()
            .extend_from_slice(records);
        Ok(())
    }

    async fn select_all(&self, table: &str) -> Result<Vec<Record>, EtlError> {
        self.tables
            .lock()
            .get(table)
            .cloned()
            .ok_or_else(|| EtlError::NotFound(format!("table {table}")))
    }
}

type BatchPredicate = Box<dyn Fn(&[Record]) -> bool + Send + Sync>;

struct InsertFault {
    matches: BatchPredicate,
    remaining: Option<usize>,
}

/// A store wrapper that fails selected calls with a 503.
pub struct FlakyStore<S> {
    inner: S,
    faults: Mutex<Vec<InsertFault>>,
    fail_schema: bool,
    fail_select: bool,
}

impl<S: std::fmt::Debug> std::fmt::Debug for FlakyStore<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlakyStore")
            .field("inner", &self.inner)
            .field("fail_schema", &self.fail_schema)
            .field("fail_select", &self.fail_select)
            .finish_non_exhaustive()
    }
}

fn unavailable(what: &str) -> EtlError {
    EtlError::RemoteStatus {
        status: 503,
        message: format!("{what} unavailable"),
    }
}

impl<S> FlakyStore<S> {
    /// Wraps a store with no faults.
    #[must_use]
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            faults: Mutex::new(Vec::new()),
            fail_schema: false,
            fail_select: false,
        }
    }

    /// Fails every insert of a matching batch.
    #[must_use]
    pub fn fail_always<P>(self, matches: P) -> Self
    where
        P: Fn(&[Record]) -> bool + Send + Sync + 'static,
    {
        self.faults.lock().push(InsertFault {
            matches: Box::new(matches),
            remaining: None,
        });
        self
    }

    /// Fails the first `n` inserts of a matching batch.
    #[must_use]
    pub fn fail_times<P>(self, n: usize, matches: P) -> Self
    where
        P: Fn(&[Record]) -> bool + Send + Sync + 'static,
    {
        self.faults.lock().push(InsertFault {
            matches: Box::new(matches),
            remaining: Some(n),
        });
        self
    }

    /// Fails schema creation.
    #[must_use]
    pub fn fail_schema(mut self) -> Self {
        self.fail_schema = true;
        self
    }

    /// Fails full-table selects.
    #[must_use]
    pub fn fail_select(mut self) -> Self {
        self.fail_select = true;
        self
    }

    /// The wrapped store.
    #[must_use]
    pub fn inner(&self) -> &S {
        &self.inner
    }

    fn should_fail(&self, records: &[Record]) -> bool {
        let mut faults = self.faults.lock();
        for fault in faults.iter_mut() {
            if !(fault.matches)(records) {
                continue;
            }
            match &mut fault.remaining {
                None => return true,
                Some(0) => {}
                Some(n) => {
                    *n -= 1;
                    return true;
                }
            }
        }
        false
    }
}

#[async_trait]
impl<S: RemoteStore> RemoteStore for FlakyStore<S> {
    async fn ensure_schema(&self, schema: &TableSchema) -> Result<(), EtlError> {
        if self.fail_schema {
            return Err(unavailable("schema endpoint"));
        }
        self.inner.ensure_schema(schema).await
    }

    async fn insert(&self, table: &str, records: &[Record]) -> Result<(), EtlError> {
        if self.should_fail(records) {
            return Err(unavailable("insert endpoint"));
        }
        self.inner.insert(table, records).await
    }

    async fn select_all(&self, table: &str) -> Result<Vec<Record>, EtlError> {
        if self.fail_select {
            return Err(unavailable("select endpoint"));
        }
        self.inner.select_all(table).await
    }
}

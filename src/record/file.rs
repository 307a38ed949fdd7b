// src/record/file.rs

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::errors::{PodflowError, Result};
use crate::record::store::{MetricRecord, RecordStore, RunRecord, WorkloadRecord};
use crate::record::{RecordFuture, Recorder};

/// Recorder that rewrites a JSON snapshot of all records after every change.
#[derive(Debug)]
pub struct FileRecorder {
    path: PathBuf,
    store: Mutex<RecordStore>,
    // Serialises snapshot writes so the file always ends up with the latest
    // state.
    write_lock: tokio::sync::Mutex<()>,
}

impl FileRecorder {
    /// Open the snapshot at `path`, starting empty if it does not exist.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let store = match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let store: RecordStore = serde_json::from_slice(&bytes)?;
                info!(path = %path.display(), "loaded record snapshot");
                store
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no record snapshot yet; starting empty");
                RecordStore::default()
            }
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            path,
            store: Mutex::new(store),
            write_lock: tokio::sync::Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn store(&self) -> MutexGuard<'_, RecordStore> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn persist(&self) -> Result<()> {
        let _write = self.write_lock.lock().await;
        let bytes = {
            let store = self.store();
            serde_json::to_vec_pretty(&*store)?
        };
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        tokio::fs::write(&self.path, bytes).await.map_err(|e| {
            PodflowError::Recorder(format!("writing {}: {e}", self.path.display()))
        })
    }
}

impl Recorder for FileRecorder {
    fn upsert_workload(&self, record: WorkloadRecord) -> RecordFuture<'_, WorkloadRecord> {
        Box::pin(async move {
            let stored = self.store().upsert_workload(record);
            self.persist().await?;
            Ok(stored)
        })
    }

    fn get_workload<'a>(&'a self, name: &'a str) -> RecordFuture<'a, Option<WorkloadRecord>> {
        Box::pin(async move { Ok(self.store().get_workload(name)) })
    }

    fn set_workload_on<'a>(&'a self, name: &'a str, is_on: bool) -> RecordFuture<'a, ()> {
        Box::pin(async move {
            let found = self.store().set_workload_on(name, is_on, Utc::now());
            if !found {
                return Err(PodflowError::WorkloadNotFound(name.to_string()));
            }
            self.persist().await
        })
    }

    fn upsert_run(&self, record: RunRecord) -> RecordFuture<'_, ()> {
        Box::pin(async move {
            self.store().upsert_run(record);
            self.persist().await
        })
    }

    fn run_exists(
        &self,
        workload_id: u64,
        execution_date: DateTime<Utc>,
    ) -> RecordFuture<'_, bool> {
        Box::pin(async move { Ok(self.store().run_exists(workload_id, execution_date)) })
    }

    fn last_runs(&self, workload_id: u64, n: usize) -> RecordFuture<'_, Vec<RunRecord>> {
        Box::pin(async move { Ok(self.store().last_runs(workload_id, n)) })
    }

    fn insert_metric(&self, record: MetricRecord) -> RecordFuture<'_, ()> {
        Box::pin(async move {
            self.store().insert_metric(record);
            self.persist().await
        })
    }

    fn metrics_for<'a>(
        &'a self,
        workload: &'a str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> RecordFuture<'a, Vec<MetricRecord>> {
        Box::pin(async move { Ok(self.store().metrics_for(workload, start, end)) })
    }
}

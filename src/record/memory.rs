// src/record/memory.rs

use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};

use crate::errors::PodflowError;
use crate::record::store::{MetricRecord, RecordStore, RunRecord, WorkloadRecord};
use crate::record::{RecordFuture, Recorder};

/// Recorder that keeps everything in memory.
#[derive(Debug, Default)]
pub struct MemoryRecorder {
    store: Mutex<RecordStore>,
}

impl MemoryRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    fn store(&self) -> MutexGuard<'_, RecordStore> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Recorder for MemoryRecorder {
    fn upsert_workload(&self, record: WorkloadRecord) -> RecordFuture<'_, WorkloadRecord> {
        Box::pin(async move { Ok(self.store().upsert_workload(record)) })
    }

    fn get_workload<'a>(&'a self, name: &'a str) -> RecordFuture<'a, Option<WorkloadRecord>> {
        Box::pin(async move { Ok(self.store().get_workload(name)) })
    }

    fn set_workload_on<'a>(&'a self, name: &'a str, is_on: bool) -> RecordFuture<'a, ()> {
        Box::pin(async move {
            if self.store().set_workload_on(name, is_on, Utc::now()) {
                Ok(())
            } else {
                Err(PodflowError::WorkloadNotFound(name.to_string()))
            }
        })
    }

    fn upsert_run(&self, record: RunRecord) -> RecordFuture<'_, ()> {
        Box::pin(async move {
            self.store().upsert_run(record);
            Ok(())
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
            Ok(())
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

impl MemoryRecorder {
    /// Snapshot of every stored table.
    pub fn snapshot(&self) -> RecordStore {
        self.store().clone()
    }
}

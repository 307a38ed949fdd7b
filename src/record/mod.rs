// src/record/mod.rs

//! Durable workload and run history.
//!
//! - [`store`] holds the record types and the plain in-memory table both
//!   recorders share.
//! - [`memory`] keeps records for the lifetime of the process.
//! - [`file`] snapshots every change to a JSON file.

pub mod file;
pub mod memory;
pub mod store;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::config::RecorderSection;
use crate::errors::{PodflowError, Result};
use crate::types::RecorderKind;

pub use file::FileRecorder;
pub use memory::MemoryRecorder;
pub use store::{MetricRecord, RecordStore, RunRecord, WorkloadRecord};

/// Boxed future returned by [`Recorder`] methods.
pub type RecordFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Persistence of workload, run and resource usage records.
///
/// Workloads are keyed by name, runs by `(workload_id, execution_date)`.
pub trait Recorder: Send + Sync {
    /// Insert or update a workload. A new workload is assigned an id; an
    /// existing one keeps its id. Returns the stored record.
    fn upsert_workload(&self, record: WorkloadRecord) -> RecordFuture<'_, WorkloadRecord>;

    fn get_workload<'a>(&'a self, name: &'a str) -> RecordFuture<'a, Option<WorkloadRecord>>;

    /// Persist the on/off state of a workload.
    fn set_workload_on<'a>(&'a self, name: &'a str, is_on: bool) -> RecordFuture<'a, ()>;

    fn upsert_run(&self, record: RunRecord) -> RecordFuture<'_, ()>;

    fn run_exists(
        &self,
        workload_id: u64,
        execution_date: DateTime<Utc>,
    ) -> RecordFuture<'_, bool>;

    /// The `n` most recent runs of a workload, newest execution date first.
    fn last_runs(&self, workload_id: u64, n: usize) -> RecordFuture<'_, Vec<RunRecord>>;

    fn insert_metric(&self, record: MetricRecord) -> RecordFuture<'_, ()>;

    /// Resource samples of a workload's runs taken between `start` and `end`
    /// (inclusive), oldest first.
    fn metrics_for<'a>(
        &'a self,
        workload: &'a str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> RecordFuture<'a, Vec<MetricRecord>>;
}

/// Build the recorder selected by the `[recorder]` section.
pub async fn recorder_from_config(section: &RecorderSection) -> Result<Arc<dyn Recorder>> {
    match section.kind {
        RecorderKind::Memory => Ok(Arc::new(MemoryRecorder::new())),
        RecorderKind::File => {
            let path = section.path.as_deref().ok_or_else(|| {
                PodflowError::ConfigError("recorder.path is required for kind = \"file\"".into())
            })?;
            Ok(Arc::new(FileRecorder::open(path).await?))
        }
    }
}

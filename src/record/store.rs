// src/record/store.rs

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Persisted view of a workload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadRecord {
    /// Assigned by the recorder; `0` means "not stored yet".
    pub id: u64,
    pub name: String,
    pub namespace: String,
    pub file_path: String,
    pub file_format: String,
    pub is_on: bool,
    pub last_updated: DateTime<Utc>,
}

/// Persisted view of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRecord {
    pub workload_id: u64,
    pub execution_date: DateTime<Utc>,
    pub status: String,
    pub start_date: DateTime<Utc>,
    pub end_date: Option<DateTime<Utc>>,
    pub last_updated: DateTime<Utc>,
}

/// One resource usage sample of a run's unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricRecord {
    pub workload: String,
    pub run: String,
    pub memory_bytes: u64,
    pub cpu_nanos: u64,
    pub metric_time: DateTime<Utc>,
}

/// Record tables shared by the recorder implementations. Also the on-disk
/// snapshot format of [`FileRecorder`](super::FileRecorder).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecordStore {
    next_id: u64,
    workloads: BTreeMap<String, WorkloadRecord>,
    runs: Vec<RunRecord>,
    #[serde(default)]
    metrics: Vec<MetricRecord>,
}

impl RecordStore {
    pub fn upsert_workload(&mut self, mut record: WorkloadRecord) -> WorkloadRecord {
        match self.workloads.get(&record.name) {
            Some(existing) => record.id = existing.id,
            None => {
                self.next_id += 1;
                record.id = self.next_id;
            }
        }
        self.workloads.insert(record.name.clone(), record.clone());
        record
    }

    pub fn get_workload(&self, name: &str) -> Option<WorkloadRecord> {
        self.workloads.get(name).cloned()
    }

    /// Returns `false` when no workload with that name is stored.
    pub fn set_workload_on(&mut self, name: &str, is_on: bool, now: DateTime<Utc>) -> bool {
        match self.workloads.get_mut(name) {
            Some(record) => {
                record.is_on = is_on;
                record.last_updated = now;
                true
            }
            None => false,
        }
    }

    pub fn upsert_run(&mut self, record: RunRecord) {
        match self.runs.iter_mut().find(|r| {
            r.workload_id == record.workload_id && r.execution_date == record.execution_date
        }) {
            Some(existing) => *existing = record,
            None => self.runs.push(record),
        }
    }

    pub fn run_exists(&self, workload_id: u64, execution_date: DateTime<Utc>) -> bool {
        self.runs
            .iter()
            .any(|r| r.workload_id == workload_id && r.execution_date == execution_date)
    }

    pub fn last_runs(&self, workload_id: u64, n: usize) -> Vec<RunRecord> {
        let mut runs: Vec<RunRecord> = self
            .runs
            .iter()
            .filter(|r| r.workload_id == workload_id)
            .cloned()
            .collect();
        runs.sort_by(|a, b| b.execution_date.cmp(&a.execution_date));
        runs.truncate(n);
        runs
    }

    pub fn insert_metric(&mut self, record: MetricRecord) {
        self.metrics.push(record);
    }

    /// Samples of `workload` taken within `[start, end]`, oldest first.
    pub fn metrics_for(
        &self,
        workload: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Vec<MetricRecord> {
        let mut metrics: Vec<MetricRecord> = self
            .metrics
            .iter()
            .filter(|m| m.workload == workload && m.metric_time >= start && m.metric_time <= end)
            .cloned()
            .collect();
        metrics.sort_by(|a, b| a.metric_time.cmp(&b.metric_time));
        metrics
    }
}

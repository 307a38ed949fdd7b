// src/scheduler/mod.rs

//! The orchestrator.
//!
//! A [`Scheduler`] owns every known [`Workload`], keeps the set in sync with a
//! [`DefinitionSource`], periodically starts due runs and samples the
//! resource usage of running units.
//!
//! - [`cycle`] contains the collect/trigger/metrics cycles and the background
//!   loops.
//! - this module holds construction and the query/control operations.

pub mod cycle;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::SchedulerSettings;
use crate::definition::{DefinitionSource, WorkloadDefinition};
use crate::errors::{PodflowError, Result};
use crate::events::EventChannelRegistry;
use crate::exec::Executor;
use crate::record::{MetricRecord, Recorder, RunRecord};
use crate::run::{Run, RunContext};
use crate::workload::{ScheduleCache, Workload};

/// Outcome of a successful [`Scheduler::submit_definition`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitStatus {
    pub name: String,
    /// File the definition was written to. It is picked up by the next
    /// collect cycle.
    pub path: PathBuf,
}

pub struct Scheduler {
    settings: SchedulerSettings,
    source: Arc<dyn DefinitionSource>,
    ctx: RunContext,
    schedules: ScheduleCache,
    workloads: RwLock<HashMap<String, Arc<Workload>>>,
    stop_tx: watch::Sender<bool>,
    tasks: tokio::sync::Mutex<Vec<JoinHandle<()>>>,
    started: AtomicBool,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("settings", &self.settings)
            .field("workloads", &self.workload_count())
            .finish_non_exhaustive()
    }
}

impl Scheduler {
    pub fn new(
        settings: SchedulerSettings,
        source: Arc<dyn DefinitionSource>,
        executor: Arc<dyn Executor>,
        recorder: Arc<dyn Recorder>,
    ) -> Arc<Self> {
        let ctx = RunContext {
            executor,
            registry: Arc::new(EventChannelRegistry::new()),
            recorder,
            log_read_attempts: settings.log_read_attempts,
        };
        let (stop_tx, _) = watch::channel(false);
        Arc::new(Self {
            settings,
            source,
            ctx,
            schedules: ScheduleCache::new(),
            workloads: RwLock::new(HashMap::new()),
            stop_tx,
            tasks: tokio::sync::Mutex::new(Vec::new()),
            started: AtomicBool::new(false),
        })
    }

    fn read_map(&self) -> RwLockReadGuard<'_, HashMap<String, Arc<Workload>>> {
        self.workloads.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_map(&self) -> RwLockWriteGuard<'_, HashMap<String, Arc<Workload>>> {
        self.workloads.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn settings(&self) -> &SchedulerSettings {
        &self.settings
    }

    pub fn registry(&self) -> &Arc<EventChannelRegistry> {
        &self.ctx.registry
    }

    pub fn executor(&self) -> &Arc<dyn Executor> {
        &self.ctx.executor
    }

    pub fn recorder(&self) -> &Arc<dyn Recorder> {
        &self.ctx.recorder
    }

    pub fn schedules(&self) -> &ScheduleCache {
        &self.schedules
    }

    pub(crate) fn run_context(&self) -> RunContext {
        self.ctx.clone()
    }

    pub fn workload_count(&self) -> usize {
        self.read_map().len()
    }

    /// Register a workload. A workload with the same name is replaced.
    pub fn add_workload(&self, workload: Arc<Workload>) {
        let name = workload.name().to_string();
        if self.write_map().insert(name.clone(), workload).is_some() {
            warn!(workload = %name, "replaced existing workload");
        } else {
            info!(workload = %name, "added workload");
        }
    }

    /// Remove a workload after deleting the units of all its runs.
    ///
    /// Returns `None` if no workload has that name. The workload is removed
    /// even if some unit deletions fail; those failures are logged.
    pub async fn remove_workload(&self, name: &str) -> Option<Arc<Workload>> {
        let workload = self.get_workload(name)?;
        if let Err(e) = workload.terminate_and_delete_runs().await {
            warn!(workload = %name, error = %e, "some run units could not be deleted");
        }
        let removed = self.write_map().remove(name);
        info!(workload = %name, "removed workload");
        removed
    }

    /// All workloads, sorted by name.
    pub fn list_workloads(&self) -> Vec<Arc<Workload>> {
        let mut workloads: Vec<Arc<Workload>> = self.read_map().values().cloned().collect();
        workloads.sort_by(|a, b| a.name().cmp(b.name()));
        workloads
    }

    pub fn get_workload(&self, name: &str) -> Option<Arc<Workload>> {
        self.read_map().get(name).cloned()
    }

    /// Runs of a workload, oldest first.
    pub fn list_runs(&self, workload: &str) -> Option<Vec<Arc<Run>>> {
        self.get_workload(workload).map(|w| w.runs())
    }

    /// Find a run by name across all workloads.
    pub fn find_run(&self, run: &str) -> Option<Arc<Run>> {
        self.list_workloads().iter().find_map(|w| w.run(run))
    }

    /// Live log chunks of a run.
    pub fn logs(&self, run: &str) -> Option<broadcast::Receiver<String>> {
        self.find_run(run).map(|r| r.logs())
    }

    /// Flip a workload on or off. Returns the new state.
    pub async fn toggle(&self, name: &str) -> Result<bool> {
        let workload = self
            .get_workload(name)
            .ok_or_else(|| PodflowError::WorkloadNotFound(name.to_string()))?;
        Ok(workload.toggle().await)
    }

    /// Validate and persist a new definition in the definition folder.
    ///
    /// Nothing is written when the name is invalid (`Validation`) or a
    /// workload or file with that name already exists (`Conflict`).
    pub fn submit_definition(&self, definition: &WorkloadDefinition) -> Result<SubmitStatus> {
        definition.validate_name()?;
        if self.read_map().contains_key(&definition.name) || self.source.exists(&definition.name) {
            return Err(PodflowError::Conflict(format!(
                "a workload named '{}' already exists",
                definition.name
            )));
        }
        let path = self.source.store(definition)?;
        info!(workload = %definition.name, path = ?path, "definition submitted");
        Ok(SubmitStatus {
            name: definition.name.clone(),
            path,
        })
    }

    /// The `n` most recent recorded runs of a workload, newest first.
    pub async fn run_history(&self, name: &str, n: usize) -> Result<Vec<RunRecord>> {
        let workload = self
            .get_workload(name)
            .ok_or_else(|| PodflowError::WorkloadNotFound(name.to_string()))?;
        self.ctx.recorder.last_runs(workload.record_id(), n).await
    }

    /// Stored resource samples of a workload's runs between `start` and
    /// `end`, oldest first.
    pub async fn workload_metrics(
        &self,
        name: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<MetricRecord>> {
        if self.get_workload(name).is_none() {
            return Err(PodflowError::WorkloadNotFound(name.to_string()));
        }
        self.ctx.recorder.metrics_for(name, start, end).await
    }
}

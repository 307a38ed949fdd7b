// src/run/mod.rs

//! A single execution of a workload.
//!
//! - [`naming`] derives run names from workload name and execution date.
//! - [`monitor`] is the state machine that follows a run's unit until it
//!   terminates.

pub mod monitor;
pub mod naming;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::definition::WorkloadDefinition;
use crate::errors::{PodflowError, Result};
use crate::events::EventChannelRegistry;
use crate::exec::unit::{
    APP_LABEL, APP_NAME, EXECUTION_DATE_ANNOTATION, NAME_LABEL, SERVICE_ACCOUNT, WORKLOAD_LABEL,
};
use crate::exec::{ContainerSpec, Executor, UnitHandle, UnitMetrics, UnitSpec};
use crate::record::{Recorder, RunRecord};
use crate::types::Phase;
use crate::workload::counter::{CounterRelease, ExecutionCounter};

pub use monitor::RunMonitor;
pub use naming::{clean_name, run_name};

/// Name of the single container of every unit.
pub const CONTAINER_NAME: &str = "task";

/// Collaborators shared by every run of a scheduler.
#[derive(Clone)]
pub struct RunContext {
    pub executor: Arc<dyn Executor>,
    pub registry: Arc<EventChannelRegistry>,
    pub recorder: Arc<dyn Recorder>,
    pub log_read_attempts: u32,
}

#[derive(Debug, Default)]
struct RunTimes {
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
    handle: Option<UnitHandle>,
}

pub struct Run {
    name: String,
    workload_name: String,
    workload_id: u64,
    execution_date: DateTime<Utc>,
    definition: Arc<WorkloadDefinition>,
    ctx: RunContext,
    counter: Arc<ExecutionCounter>,
    monitor: RunMonitor,
    times: Mutex<RunTimes>,
}

impl std::fmt::Debug for Run {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Run")
            .field("name", &self.name)
            .field("workload", &self.workload_name)
            .field("execution_date", &self.execution_date)
            .field("phase", &self.phase())
            .finish()
    }
}

impl Run {
    /// Build a run for `execution_date`. The caller has already reserved a
    /// slot in `counter`; [`Run::start`] releases it.
    pub fn new(
        definition: Arc<WorkloadDefinition>,
        workload_id: u64,
        execution_date: DateTime<Utc>,
        counter: Arc<ExecutionCounter>,
        ctx: RunContext,
    ) -> Self {
        let name = run_name(&definition.name, execution_date);
        let monitor = RunMonitor::new(
            name.clone(),
            definition.namespace.clone(),
            Arc::clone(&ctx.executor),
            definition.with_logs(),
            ctx.log_read_attempts,
        );
        Self {
            name,
            workload_name: definition.name.clone(),
            workload_id,
            execution_date,
            definition,
            ctx,
            counter,
            monitor,
            times: Mutex::new(RunTimes::default()),
        }
    }

    fn times(&self) -> MutexGuard<'_, RunTimes> {
        self.times.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn workload_name(&self) -> &str {
        &self.workload_name
    }

    pub fn namespace(&self) -> &str {
        &self.definition.namespace
    }

    pub fn execution_date(&self) -> DateTime<Utc> {
        self.execution_date
    }

    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        self.times().start
    }

    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        self.times().end
    }

    pub fn handle(&self) -> Option<UnitHandle> {
        self.times().handle.clone()
    }

    pub fn phase(&self) -> Phase {
        self.monitor.phase()
    }

    pub fn monitor(&self) -> &RunMonitor {
        &self.monitor
    }

    /// Live log chunks captured from now on.
    pub fn logs(&self) -> broadcast::Receiver<String> {
        self.monitor.subscribe_logs()
    }

    /// Every log chunk captured so far.
    pub fn captured_logs(&self) -> Vec<String> {
        self.monitor.captured_logs()
    }

    /// The unit this run creates.
    pub fn unit_spec(&self) -> UnitSpec {
        let def = &self.definition;

        let mut labels = def.labels.clone();
        labels.insert(NAME_LABEL.to_string(), self.name.clone());
        labels.insert(APP_LABEL.to_string(), APP_NAME.to_string());
        labels.insert(WORKLOAD_LABEL.to_string(), def.name.clone());

        let mut annotations = def.annotations.clone();
        annotations.insert(
            EXECUTION_DATE_ANNOTATION.to_string(),
            self.execution_date.to_rfc3339(),
        );

        UnitSpec {
            name: self.name.clone(),
            namespace: def.namespace.clone(),
            labels,
            annotations,
            container: ContainerSpec {
                name: CONTAINER_NAME.to_string(),
                image: def.image.clone(),
                command: def.command.clone(),
                pull_if_not_present: true,
            },
            restart_policy: def.restart_policy.unwrap_or_default(),
            active_deadline_seconds: def.time_limit,
            service_account: SERVICE_ACCOUNT.to_string(),
            parallelism: def.parallelism,
            retries: def.retries,
        }
    }

    /// Ask the executor to create this run's unit.
    pub async fn create(&self) -> Result<UnitHandle> {
        info!(run = %self.name, workload = %self.workload_name, "creating unit");
        let handle = self
            .ctx
            .executor
            .create_unit(self.unit_spec())
            .await
            .map_err(|e| match e {
                e @ PodflowError::UnitCreate { .. } => e,
                other => PodflowError::UnitCreate {
                    name: self.name.clone(),
                    reason: other.to_string(),
                },
            })?;
        self.times().handle = Some(handle.clone());
        Ok(handle)
    }

    /// Delete this run's unit. Fails with `UnitNotFound` when the unit was
    /// never created or is already gone.
    pub async fn delete(&self) -> Result<()> {
        let Some(handle) = self.handle() else {
            return Err(PodflowError::UnitNotFound(self.name.clone()));
        };
        self.ctx
            .executor
            .delete_unit(&handle.name, &handle.namespace)
            .await
    }

    /// Sample the resource usage of this run's unit.
    pub async fn unit_metrics(&self) -> Result<UnitMetrics> {
        let Some(handle) = self.handle() else {
            return Err(PodflowError::UnitNotFound(self.name.clone()));
        };
        self.ctx
            .executor
            .unit_metrics(&handle.name, &handle.namespace)
            .await
    }

    fn record(&self, status: Phase) -> RunRecord {
        let times = self.times();
        let now = Utc::now();
        RunRecord {
            workload_id: self.workload_id,
            execution_date: self.execution_date,
            status: status.as_status().to_string(),
            start_date: times.start.unwrap_or(now),
            end_date: times.end,
            last_updated: now,
        }
    }

    async fn upsert_record(&self, status: Phase) {
        let record = self.record(status);
        if let Err(e) = self.ctx.recorder.upsert_run(record).await {
            warn!(run = %self.name, error = %e, "failed to record run");
        }
    }

    /// Execute the run end to end.
    ///
    /// Cleanup (unit deletion, channel group removal, final record, counter
    /// release) happens whatever the outcome of creation or monitoring.
    pub async fn start(self: Arc<Self>) {
        let _release = CounterRelease::new(Arc::clone(&self.counter));
        let group = self.ctx.registry.add_group(&self.name);
        self.times().start = Some(Utc::now());

        let monitor_task = {
            let run = Arc::clone(&self);
            let group = Arc::clone(&group);
            tokio::spawn(async move { run.monitor.run(group).await })
        };

        match self.create().await {
            Ok(handle) => {
                debug!(run = %self.name, namespace = %handle.namespace, "unit created");
                self.upsert_record(Phase::Running).await;
            }
            Err(e) => {
                error!(run = %self.name, error = %e, "unit creation failed");
                group.remove.publish(());
            }
        }

        self.monitor.wait_for_done().await;
        if let Err(e) = monitor_task.await {
            error!(run = %self.name, error = %e, "run monitor crashed");
        }
        if !self.phase().is_terminal() {
            self.monitor.observe(Phase::Failed);
        }

        if self.handle().is_some() {
            match self.delete().await {
                Ok(()) => {}
                Err(e) if e.is_not_found() => {
                    debug!(run = %self.name, "unit already gone");
                }
                Err(e) => warn!(run = %self.name, error = %e, "failed to delete unit"),
            }
        }
        self.ctx.registry.remove_group(&self.name);
        self.times().end = Some(Utc::now());
        self.upsert_record(self.phase()).await;

        info!(
            run = %self.name,
            workload = %self.workload_name,
            phase = %self.phase(),
            "run finished"
        );
    }
}

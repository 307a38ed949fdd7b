// src/workload/mod.rs

//! Workloads: a definition plus the runs it has produced.
//!
//! - [`counter`] bounds the number of active runs per workload.
//! - [`schedule`] parses schedule expressions and computes fire times.

pub mod counter;
pub mod schedule;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::definition::{LoadedDefinition, WorkloadDefinition};
use crate::errors::{PodflowError, Result};
use crate::record::WorkloadRecord;
use crate::run::{Run, RunContext};

pub use counter::{CounterRelease, ExecutionCounter};
pub use schedule::{Schedule, ScheduleCache, parse_schedule};

/// State guarded by the fire-time lock.
///
/// `last_fire` only moves forward and `runs` is append-only; both change
/// together so that run order follows fire order.
#[derive(Debug)]
struct FireState {
    is_on: bool,
    last_fire: Option<DateTime<Utc>>,
    runs: Vec<Arc<Run>>,
}

pub struct Workload {
    definition: Arc<WorkloadDefinition>,
    code: String,
    digest: String,
    path: PathBuf,
    format: String,
    start: DateTime<Utc>,
    end: Option<DateTime<Utc>>,
    schedule: Arc<Schedule>,
    counter: Arc<ExecutionCounter>,
    fire: Mutex<FireState>,
    record_id: AtomicU64,
    last_updated: Mutex<DateTime<Utc>>,
    ctx: RunContext,
}

impl std::fmt::Debug for Workload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workload")
            .field("name", &self.definition.name)
            .field("schedule", &self.definition.schedule)
            .field("is_on", &self.is_on())
            .field("active_runs", &self.active_runs())
            .finish()
    }
}

impl Workload {
    /// Build a workload from a validated definition. The schedule is taken
    /// from `schedules` so identical expressions share one parse.
    pub fn new(
        loaded: LoadedDefinition,
        schedules: &ScheduleCache,
        is_on: bool,
        ctx: RunContext,
    ) -> Result<Self> {
        let format = loaded.format();
        let LoadedDefinition {
            definition,
            code,
            digest,
            path,
        } = loaded;

        definition.validate()?;
        let schedule = schedules.get_or_parse(&definition.schedule)?;
        let start = definition.start_time()?;
        let end = definition.end_time()?;

        Ok(Self {
            definition: Arc::new(definition),
            code,
            digest,
            path,
            format,
            start,
            end,
            schedule,
            counter: Arc::new(ExecutionCounter::new()),
            fire: Mutex::new(FireState {
                is_on,
                last_fire: None,
                runs: Vec::new(),
            }),
            record_id: AtomicU64::new(0),
            last_updated: Mutex::new(Utc::now()),
            ctx,
        })
    }

    fn fire(&self) -> MutexGuard<'_, FireState> {
        self.fire.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn name(&self) -> &str {
        &self.definition.name
    }

    pub fn namespace(&self) -> &str {
        &self.definition.namespace
    }

    pub fn definition(&self) -> &WorkloadDefinition {
        &self.definition
    }

    /// Raw definition text.
    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn digest(&self) -> &str {
        &self.digest
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn max_active_runs(&self) -> usize {
        self.definition.max_active_runs
    }

    pub fn active_runs(&self) -> usize {
        self.counter.get()
    }

    pub fn counter(&self) -> &Arc<ExecutionCounter> {
        &self.counter
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        self.end
    }

    pub fn is_on(&self) -> bool {
        self.fire().is_on
    }

    pub fn record_id(&self) -> u64 {
        self.record_id.load(Ordering::Acquire)
    }

    pub fn set_record_id(&self, id: u64) {
        self.record_id.store(id, Ordering::Release);
    }

    pub fn last_updated(&self) -> DateTime<Utc> {
        *self.last_updated.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn touch(&self) {
        *self.last_updated.lock().unwrap_or_else(PoisonError::into_inner) = Utc::now();
    }

    /// Fire time of the most recent run, if any.
    pub fn last_fire_time(&self) -> Option<DateTime<Utc>> {
        self.fire().last_fire
    }

    /// Fire time of the next run: the start time before the first run, then
    /// the next schedule occurrence strictly after the most recent fire.
    pub fn next_fire_time(&self) -> Option<DateTime<Utc>> {
        let fire = self.fire();
        self.next_fire(&fire)
    }

    fn next_fire(&self, fire: &FireState) -> Option<DateTime<Utc>> {
        match fire.last_fire {
            None => Some(self.start),
            Some(prev) => self.schedule.next_after(prev),
        }
    }

    fn in_window(&self, next: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        next <= now && self.end.is_none_or(|end| next < end)
    }

    /// Restore persisted state after a restart. `last_fire` never moves
    /// backwards.
    pub fn restore(&self, is_on: bool, last_fire: Option<DateTime<Utc>>) {
        let mut fire = self.fire();
        fire.is_on = is_on;
        if last_fire > fire.last_fire {
            fire.last_fire = last_fire;
        }
    }

    /// Whether a new run should be started at `now`.
    pub fn ready(&self, now: DateTime<Utc>) -> bool {
        if self.counter.get() >= self.max_active_runs() {
            return false;
        }
        let fire = self.fire();
        fire.is_on
            && self
                .next_fire(&fire)
                .is_some_and(|next| self.in_window(next, now))
    }

    /// Start the next run if one is due.
    ///
    /// A counter slot is reserved first; the fire time is then advanced under
    /// the fire-time lock, so concurrent triggers never produce two runs for
    /// the same timestamp. The run executes on its own task.
    pub async fn advance_and_trigger(&self, now: DateTime<Utc>) -> Result<Option<Arc<Run>>> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| PodflowError::Other(e.into()))?;

        if !self.counter.try_acquire(self.max_active_runs()) {
            return Ok(None);
        }

        let run = {
            let mut fire = self.fire();
            let next = if fire.is_on { self.next_fire(&fire) } else { None };
            match next {
                Some(next) if self.in_window(next, now) => {
                    fire.last_fire = Some(next);
                    let run = Arc::new(Run::new(
                        Arc::clone(&self.definition),
                        self.record_id(),
                        next,
                        Arc::clone(&self.counter),
                        self.ctx.clone(),
                    ));
                    fire.runs.push(Arc::clone(&run));
                    Some(run)
                }
                _ => None,
            }
        };

        let Some(run) = run else {
            self.counter.dec();
            return Ok(None);
        };

        info!(
            workload = %self.name(),
            run = %run.name(),
            execution_date = %run.execution_date(),
            "triggering run"
        );
        runtime.spawn(Arc::clone(&run).start());
        Ok(Some(run))
    }

    /// Delete the unit of every run.
    ///
    /// Runs whose unit was never created or is already gone are skipped.
    /// Other failures are logged; the first is returned once every run was
    /// attempted.
    pub async fn terminate_and_delete_runs(&self) -> Result<()> {
        let runs = self.runs();
        let mut first_err = None;
        for run in runs {
            if run.handle().is_none() {
                continue;
            }
            match run.delete().await {
                Ok(()) => debug!(workload = %self.name(), run = %run.name(), "deleted run unit"),
                Err(e) if e.is_not_found() => {}
                Err(e) => {
                    warn!(workload = %self.name(), run = %run.name(), error = %e, "failed to delete run unit");
                    first_err.get_or_insert(e);
                }
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Flip the on/off state and persist it. Returns the new state.
    pub async fn toggle(&self) -> bool {
        let is_on = {
            let mut fire = self.fire();
            fire.is_on = !fire.is_on;
            fire.is_on
        };
        self.touch();
        info!(workload = %self.name(), is_on, "toggled workload");
        if let Err(e) = self.ctx.recorder.set_workload_on(self.name(), is_on).await {
            warn!(workload = %self.name(), error = %e, "failed to persist workload state");
        }
        is_on
    }

    /// Snapshot of all runs, oldest first.
    pub fn runs(&self) -> Vec<Arc<Run>> {
        self.fire().runs.clone()
    }

    pub fn run(&self, name: &str) -> Option<Arc<Run>> {
        self.fire().runs.iter().find(|r| r.name() == name).cloned()
    }

    /// Record describing this workload, as stored by a recorder.
    pub fn to_record(&self) -> WorkloadRecord {
        WorkloadRecord {
            id: self.record_id(),
            name: self.name().to_string(),
            namespace: self.namespace().to_string(),
            file_path: self.path.display().to_string(),
            file_format: self.format.clone(),
            is_on: self.is_on(),
            last_updated: self.last_updated(),
        }
    }
}

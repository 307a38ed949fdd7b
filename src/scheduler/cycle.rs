// src/scheduler/cycle.rs

//! Collect, trigger and metrics cycles, and the loops that repeat them.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::definition::LoadedDefinition;
use crate::errors::Result;
use crate::events::TaskInformer;
use crate::exec::unit::SERVICE_ACCOUNT;
use crate::record::MetricRecord;
use crate::scheduler::Scheduler;
use crate::types::Phase;
use crate::workload::Workload;

impl Scheduler {
    /// Reload definitions and add the ones not known yet. Returns the number
    /// of workloads added.
    ///
    /// A known workload whose definition text changed keeps running with the
    /// old definition; the change is only logged.
    pub async fn collect_definitions(&self) -> Result<usize> {
        let loaded = self.source.load()?;
        let mut added = 0;

        for def in loaded {
            let name = def.definition.name.clone();
            if let Some(existing) = self.get_workload(&name) {
                if existing.digest() != def.digest {
                    warn!(
                        workload = %name,
                        path = ?def.path,
                        "definition changed on disk; changes are not applied to a loaded workload"
                    );
                }
                continue;
            }

            match self.build_workload(def).await {
                Ok(workload) => {
                    self.add_workload(workload);
                    added += 1;
                }
                Err(e) => error!(workload = %name, error = %e, "failed to add workload"),
            }
        }

        if added > 0 {
            info!(added, total = self.workload_count(), "collected definitions");
        }
        Ok(added)
    }

    async fn build_workload(&self, def: LoadedDefinition) -> Result<Arc<Workload>> {
        let namespace = def.definition.namespace.clone();
        self.ctx
            .executor
            .ensure_identity(SERVICE_ACCOUNT, &namespace)
            .await?;

        let workload = Arc::new(Workload::new(
            def,
            &self.schedules,
            self.settings.workloads_on,
            self.run_context(),
        )?);

        let recorder = &self.ctx.recorder;
        match recorder.get_workload(workload.name()).await {
            Ok(Some(record)) => {
                let last_fire = match recorder.last_runs(record.id, 1).await {
                    Ok(runs) => runs.first().map(|r| r.execution_date),
                    Err(e) => {
                        warn!(workload = %workload.name(), error = %e, "could not read run history");
                        None
                    }
                };
                debug!(
                    workload = %workload.name(),
                    id = record.id,
                    is_on = record.is_on,
                    ?last_fire,
                    "restoring workload state"
                );
                workload.set_record_id(record.id);
                workload.restore(record.is_on, last_fire);
            }
            Ok(None) => {}
            Err(e) => warn!(workload = %workload.name(), error = %e, "could not read workload record"),
        }

        let stored = recorder.upsert_workload(workload.to_record()).await?;
        workload.set_record_id(stored.id);
        Ok(workload)
    }

    /// Start a run on every workload that is due at `now`. Returns the number
    /// of runs started. A failure on one workload does not affect the others.
    pub async fn trigger(&self, now: DateTime<Utc>) -> usize {
        let mut started = 0;
        for workload in self.list_workloads() {
            if !workload.ready(now) {
                continue;
            }
            match workload.advance_and_trigger(now).await {
                Ok(Some(_)) => started += 1,
                Ok(None) => {}
                Err(e) => error!(workload = %workload.name(), error = %e, "failed to trigger run"),
            }
        }
        started
    }

    /// Sample every running unit once and store the samples. Returns the
    /// number stored. Units that finished meanwhile are skipped.
    pub async fn store_metrics(&self) -> usize {
        let mut stored = 0;
        for workload in self.list_workloads() {
            for run in workload.runs() {
                if run.phase() != Phase::Running {
                    continue;
                }
                let sample = match run.unit_metrics().await {
                    Ok(sample) => sample,
                    Err(e) if e.is_not_found() => {
                        debug!(run = %run.name(), "no process to sample");
                        continue;
                    }
                    Err(e) => {
                        warn!(run = %run.name(), error = %e, "failed to sample unit usage");
                        continue;
                    }
                };
                let record = MetricRecord {
                    workload: workload.name().to_string(),
                    run: run.name().to_string(),
                    memory_bytes: sample.memory_bytes,
                    cpu_nanos: sample.cpu_nanos,
                    metric_time: sample.sampled_at,
                };
                match self.ctx.recorder.insert_metric(record).await {
                    Ok(()) => stored += 1,
                    Err(e) => warn!(run = %run.name(), error = %e, "failed to store unit usage"),
                }
            }
        }
        stored
    }

    /// Start the event bridge and the collect and trigger loops, each
    /// repeating every `period`, plus the metrics loop repeating every
    /// `metrics_period` from the settings. All of them run until
    /// [`Scheduler::stop`].
    pub async fn start(self: &Arc<Self>, period: Duration) -> Result<()> {
        if self.started.swap(true, Ordering::AcqRel) {
            warn!("scheduler already started");
            return Ok(());
        }
        info!(period = ?period, "starting scheduler");

        let bridge = TaskInformer::new(Arc::clone(&self.ctx.executor), Arc::clone(&self.ctx.registry))
            .spawn(self.stop_tx.subscribe())
            .await?;

        let collect = {
            let scheduler = Arc::clone(self);
            spawn_cycle("collect", period, self.stop_tx.subscribe(), move || {
                let scheduler = Arc::clone(&scheduler);
                async move {
                    if let Err(e) = scheduler.collect_definitions().await {
                        error!(error = %e, "collect cycle failed");
                    }
                }
            })
        };

        let trigger = {
            let scheduler = Arc::clone(self);
            spawn_cycle("trigger", period, self.stop_tx.subscribe(), move || {
                let scheduler = Arc::clone(&scheduler);
                async move {
                    let started = scheduler.trigger(Utc::now()).await;
                    if started > 0 {
                        debug!(started, "trigger cycle started runs");
                    }
                }
            })
        };

        let metrics = {
            let scheduler = Arc::clone(self);
            let every = self.settings.metrics_period;
            spawn_cycle("metrics", every, self.stop_tx.subscribe(), move || {
                let scheduler = Arc::clone(&scheduler);
                async move {
                    let stored = scheduler.store_metrics().await;
                    if stored > 0 {
                        debug!(stored, "metrics cycle stored samples");
                    }
                }
            })
        };

        self.tasks
            .lock()
            .await
            .extend([bridge, collect, trigger, metrics]);
        Ok(())
    }

    /// Signal the loops to stop. Runs already in flight are not cancelled.
    pub fn stop(&self) {
        if !self.stop_tx.send_replace(true) {
            info!("stopping scheduler");
        }
    }

    pub fn is_stopped(&self) -> bool {
        *self.stop_tx.borrow()
    }

    /// Wait for the loops started by [`Scheduler::start`] to exit.
    pub async fn wait(&self) {
        let tasks: Vec<_> = self.tasks.lock().await.drain(..).collect();
        for task in tasks {
            if let Err(e) = task.await {
                error!(error = %e, "scheduler task ended abnormally");
            }
        }
        info!("scheduler stopped");
    }
}

fn spawn_cycle<F, Fut>(
    name: &'static str,
    period: Duration,
    mut stop: watch::Receiver<bool>,
    mut cycle: F,
) -> tokio::task::JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        debug!(cycle = name, "cycle loop started");

        loop {
            if *stop.borrow() {
                break;
            }
            tokio::select! {
                _ = ticker.tick() => cycle().await,
                changed = stop.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
        debug!(cycle = name, "cycle loop stopped");
    })
}

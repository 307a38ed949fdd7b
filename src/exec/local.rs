// src/exec/local.rs

//! Executor that runs each unit as a local OS process.
//!
//! Units are keyed by `namespace/name`. The first element of the container
//! command is the program, the rest are its arguments; the image is only
//! recorded. Every phase change is pushed to matching subscribers, so the
//! scheduler can be exercised end to end without a cluster.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

use crate::errors::PodflowError;
use crate::exec::backend::{ExecFuture, Executor};
use crate::exec::unit::{
    LogOptions, LogStream, Selector, UnitEvent, UnitHandle, UnitMetrics, UnitSpec, UnitState,
};
use crate::exec::unit_runner::run_unit;
use crate::exec::usage::sample_process;
use crate::types::Phase;

/// Capacity of each subscriber's event channel.
const SUBSCRIBER_CAPACITY: usize = 256;

fn unit_key(name: &str, namespace: &str) -> String {
    format!("{namespace}/{name}")
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Internal record for a unit known to the executor.
///
/// - `output` collects stdout and stderr lines of the process.
/// - `cancel` stops the process when the unit is deleted.
/// - `pid` is set while the process is alive.
struct LocalUnit {
    state: UnitState,
    output: Arc<Mutex<Vec<u8>>>,
    cancel: Option<oneshot::Sender<()>>,
    pid: Option<u32>,
}

struct Subscriber {
    selector: Selector,
    tx: mpsc::UnboundedSender<UnitEvent>,
}

#[derive(Default)]
pub(crate) struct LocalState {
    units: Mutex<HashMap<String, LocalUnit>>,
    subscribers: Mutex<Vec<Subscriber>>,
    identities: Mutex<HashSet<String>>,
}

impl LocalState {
    fn publish(&self, event: UnitEvent) {
        let mut subscribers = lock(&self.subscribers);
        subscribers.retain(|s| !s.tx.is_closed());
        for sub in subscribers.iter() {
            if !sub.selector.matches(event.labels()) {
                continue;
            }
            if sub.tx.send(event.clone()).is_err() {
                debug!("subscriber went away while publishing");
            }
        }
    }

    /// Move the unit to `phase` and notify subscribers. Unknown units (already
    /// deleted) are ignored.
    pub(crate) fn set_phase(&self, name: &str, namespace: &str, phase: Phase) {
        let event = {
            let mut units = lock(&self.units);
            let Some(unit) = units.get_mut(&unit_key(name, namespace)) else {
                debug!(unit = %name, ?phase, "phase change for deleted unit; ignoring");
                return;
            };
            let old = unit.state.clone();
            unit.state.phase = old.phase.advance(phase);
            if unit.state.phase == old.phase {
                return;
            }
            UnitEvent::Updated {
                old,
                new: unit.state.clone(),
            }
        };
        self.publish(event);
    }

    pub(crate) fn set_pid(&self, name: &str, namespace: &str, pid: Option<u32>) {
        if let Some(unit) = lock(&self.units).get_mut(&unit_key(name, namespace)) {
            unit.pid = pid;
        }
    }
}

/// Local-process implementation of [`Executor`].
#[derive(Clone, Default)]
pub struct LocalProcessExecutor {
    state: Arc<LocalState>,
}

impl LocalProcessExecutor {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Executor for LocalProcessExecutor {
    fn create_unit(&self, spec: UnitSpec) -> ExecFuture<'_, UnitHandle> {
        Box::pin(async move {
            if spec.container.command.is_empty() {
                return Err(PodflowError::UnitCreate {
                    name: spec.name,
                    reason: "container command is empty".to_string(),
                });
            }

            let key = unit_key(&spec.name, &spec.namespace);
            let state = UnitState {
                name: spec.name.clone(),
                namespace: spec.namespace.clone(),
                phase: Phase::Pending,
                labels: spec.labels.clone(),
            };
            let output = Arc::new(Mutex::new(Vec::new()));
            let (cancel_tx, cancel_rx) = oneshot::channel::<()>();

            {
                let mut units = lock(&self.state.units);
                if units.contains_key(&key) {
                    return Err(PodflowError::UnitCreate {
                        name: spec.name,
                        reason: "a unit with this name already exists".to_string(),
                    });
                }
                units.insert(
                    key,
                    LocalUnit {
                        state: state.clone(),
                        output: Arc::clone(&output),
                        cancel: Some(cancel_tx),
                        pid: None,
                    },
                );
            }
            self.state.publish(UnitEvent::Added(state));

            info!(unit = %spec.name, namespace = %spec.namespace, "created local unit");

            let handle = UnitHandle {
                name: spec.name.clone(),
                namespace: spec.namespace.clone(),
            };
            let local = Arc::clone(&self.state);
            tokio::spawn(run_unit(local, spec, output, cancel_rx));

            Ok(handle)
        })
    }

    fn delete_unit<'a>(&'a self, name: &'a str, namespace: &'a str) -> ExecFuture<'a, ()> {
        Box::pin(async move {
            let removed = lock(&self.state.units).remove(&unit_key(name, namespace));
            let Some(mut unit) = removed else {
                return Err(PodflowError::UnitNotFound(name.to_string()));
            };

            if let Some(cancel) = unit.cancel.take() {
                if cancel.send(()).is_err() {
                    debug!(unit = %name, "process already finished while deleting");
                }
            }
            self.state.publish(UnitEvent::Deleted(unit.state));
            info!(unit = %name, namespace = %namespace, "deleted local unit");
            Ok(())
        })
    }

    fn get_unit<'a>(&'a self, name: &'a str, namespace: &'a str) -> ExecFuture<'a, UnitState> {
        Box::pin(async move {
            lock(&self.state.units)
                .get(&unit_key(name, namespace))
                .map(|u| u.state.clone())
                .ok_or_else(|| PodflowError::UnitNotFound(name.to_string()))
        })
    }

    fn list_units<'a>(&'a self, selector: &'a Selector) -> ExecFuture<'a, Vec<UnitState>> {
        Box::pin(async move {
            let units = lock(&self.state.units);
            let mut states: Vec<UnitState> = units
                .values()
                .filter(|u| selector.matches(&u.state.labels))
                .map(|u| u.state.clone())
                .collect();
            states.sort_by(|a, b| a.name.cmp(&b.name));
            Ok(states)
        })
    }

    fn read_logs<'a>(
        &'a self,
        name: &'a str,
        namespace: &'a str,
        options: LogOptions,
    ) -> ExecFuture<'a, LogStream> {
        Box::pin(async move {
            let units = lock(&self.state.units);
            let unit = units
                .get(&unit_key(name, namespace))
                .ok_or_else(|| PodflowError::UnitNotFound(name.to_string()))?;

            // The process has not been started yet: there is no container to
            // attach to unless the caller asks for whatever was left behind.
            if unit.state.phase == Phase::Pending && !options.previous {
                return Err(PodflowError::UnitNotFound(format!("{name} (container)")));
            }

            let snapshot = lock(&unit.output).clone();
            let stream: LogStream = Box::new(std::io::Cursor::new(snapshot));
            Ok(stream)
        })
    }

    fn subscribe(&self, selector: Selector) -> ExecFuture<'_, mpsc::Receiver<UnitEvent>> {
        Box::pin(async move {
            // Publishers are synchronous and never wait on a slow subscriber:
            // events queue on the unbounded side and a forwarder feeds the
            // bounded receiver in order, without dropping any.
            let (tx, mut queued) = mpsc::unbounded_channel();
            let (forward_tx, rx) = mpsc::channel(SUBSCRIBER_CAPACITY);
            lock(&self.state.subscribers).push(Subscriber { selector, tx });
            tokio::spawn(async move {
                while let Some(event) = queued.recv().await {
                    if forward_tx.send(event).await.is_err() {
                        break;
                    }
                }
            });
            Ok(rx)
        })
    }

    fn unit_metrics<'a>(
        &'a self,
        name: &'a str,
        namespace: &'a str,
    ) -> ExecFuture<'a, UnitMetrics> {
        Box::pin(async move {
            let pid = {
                let units = lock(&self.state.units);
                let unit = units
                    .get(&unit_key(name, namespace))
                    .ok_or_else(|| PodflowError::UnitNotFound(name.to_string()))?;
                match (unit.state.phase, unit.pid) {
                    (Phase::Running, Some(pid)) => pid,
                    _ => return Err(PodflowError::UnitNotFound(format!("{name} (process)"))),
                }
            };
            let usage = sample_process(name, pid).await?;
            Ok(UnitMetrics::sampled_now(
                name,
                namespace,
                usage.memory_bytes,
                usage.cpu_nanos,
            ))
        })
    }

    fn ensure_identity<'a>(&'a self, name: &'a str, namespace: &'a str) -> ExecFuture<'a, ()> {
        Box::pin(async move {
            if lock(&self.state.identities).insert(unit_key(name, namespace)) {
                info!(identity = %name, namespace = %namespace, "provisioned identity");
            }
            Ok(())
        })
    }
}

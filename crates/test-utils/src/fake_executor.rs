use std::collections::{BTreeMap, HashMap};
use std::io::Cursor;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;

use podflow::errors::PodflowError;
use podflow::exec::{
    ExecFuture, Executor, LogOptions, LogStream, Selector, UnitEvent, UnitHandle, UnitMetrics,
    UnitSpec, UnitState,
};
use podflow::types::Phase;

#[derive(Debug, Clone)]
struct FakeUnit {
    state: UnitState,
    logs: Vec<u8>,
    usage: (u64, u64),
}

#[derive(Default)]
struct Inner {
    units: BTreeMap<String, FakeUnit>,
    created: Vec<UnitSpec>,
    deleted: Vec<String>,
    identities: Vec<(String, String)>,
    subscribers: Vec<(Selector, mpsc::UnboundedSender<UnitEvent>)>,
    fail_creates: bool,
    fail_deletes: bool,
    log_failures: u32,
    script: Option<(Vec<Phase>, Duration)>,
    script_logs: HashMap<Phase, String>,
    metric_failures: u32,
    metric_samples: u32,
}

/// A scriptable executor that:
/// - records created and deleted units and provisioned identities
/// - lets tests drive unit phases and logs by hand (`set_phase`, `set_logs`)
/// - optionally walks every new unit through a fixed phase script
/// - reports per-unit resource usage set with `set_usage`
/// - injects create/delete/log/metrics failures on demand.
#[derive(Clone, Default)]
pub struct FakeExecutor {
    inner: Arc<Mutex<Inner>>,
}

impl FakeExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every unit created from now on moves through `phases`, one step per
    /// `step`, after being added as `Pending`.
    pub fn with_script(self, phases: Vec<Phase>, step: Duration) -> Self {
        self.inner.lock().unwrap().script = Some((phases, step));
        self
    }

    /// Append `text` to a scripted unit's logs when it reaches `phase`.
    pub fn with_script_logs(self, phase: Phase, text: &str) -> Self {
        self.inner
            .lock()
            .unwrap()
            .script_logs
            .insert(phase, text.to_string());
        self
    }

    pub fn fail_creates(&self, fail: bool) {
        self.inner.lock().unwrap().fail_creates = fail;
    }

    pub fn fail_deletes(&self, fail: bool) {
        self.inner.lock().unwrap().fail_deletes = fail;
    }

    /// The next `n` log reads fail with an executor error.
    pub fn fail_log_reads(&self, n: u32) {
        self.inner.lock().unwrap().log_failures = n;
    }

    /// The next `n` usage samples fail with an executor error.
    pub fn fail_metrics(&self, n: u32) {
        self.inner.lock().unwrap().metric_failures = n;
    }

    /// Memory (bytes) and CPU (nanoseconds) reported for a unit.
    pub fn set_usage(&self, name: &str, memory_bytes: u64, cpu_nanos: u64) {
        if let Some(unit) = self.inner.lock().unwrap().units.get_mut(name) {
            unit.usage = (memory_bytes, cpu_nanos);
        }
    }

    /// Number of successful usage samples served.
    pub fn metric_samples(&self) -> u32 {
        self.inner.lock().unwrap().metric_samples
    }

    fn publish(inner: &mut Inner, event: UnitEvent) {
        inner.subscribers.retain(|(selector, tx)| {
            if !selector.matches(event.labels()) {
                return !tx.is_closed();
            }
            tx.send(event.clone()).is_ok()
        });
    }

    /// Move a unit to `phase` and notify subscribers. Returns `false` for an
    /// unknown unit.
    pub fn set_phase(&self, name: &str, phase: Phase) -> bool {
        let mut inner = self.inner.lock().unwrap();
        let Some(unit) = inner.units.get_mut(name) else {
            return false;
        };
        let old = unit.state.clone();
        unit.state.phase = phase;
        let new = unit.state.clone();
        Self::publish(&mut inner, UnitEvent::Updated { old, new });
        true
    }

    /// Deliver an arbitrary event to subscribers without touching unit state.
    pub fn push_event(&self, event: UnitEvent) {
        let mut inner = self.inner.lock().unwrap();
        Self::publish(&mut inner, event);
    }

    /// Remove a unit as if someone outside podflow deleted it.
    pub fn remove_externally(&self, name: &str) -> bool {
        let mut inner = self.inner.lock().unwrap();
        let Some(unit) = inner.units.remove(name) else {
            return false;
        };
        Self::publish(&mut inner, UnitEvent::Deleted(unit.state));
        true
    }

    pub fn set_logs(&self, name: &str, text: &str) {
        if let Some(unit) = self.inner.lock().unwrap().units.get_mut(name) {
            unit.logs = text.as_bytes().to_vec();
        }
    }

    pub fn append_logs(&self, name: &str, text: &str) {
        if let Some(unit) = self.inner.lock().unwrap().units.get_mut(name) {
            unit.logs.extend_from_slice(text.as_bytes());
        }
    }

    pub fn created(&self) -> Vec<UnitSpec> {
        self.inner.lock().unwrap().created.clone()
    }

    pub fn created_names(&self) -> Vec<String> {
        self.created().into_iter().map(|s| s.name).collect()
    }

    pub fn deleted(&self) -> Vec<String> {
        self.inner.lock().unwrap().deleted.clone()
    }

    pub fn identities(&self) -> Vec<(String, String)> {
        self.inner.lock().unwrap().identities.clone()
    }

    /// Names of units that currently exist.
    pub fn live_units(&self) -> Vec<String> {
        self.inner.lock().unwrap().units.keys().cloned().collect()
    }

    pub fn phase_of(&self, name: &str) -> Option<Phase> {
        self.inner
            .lock()
            .unwrap()
            .units
            .get(name)
            .map(|u| u.state.phase)
    }

    fn run_script(&self, name: String, phases: Vec<Phase>, step: Duration) {
        let this = self.clone();
        tokio::spawn(async move {
            for phase in phases {
                tokio::time::sleep(step).await;
                let text = this.inner.lock().unwrap().script_logs.get(&phase).cloned();
                if let Some(text) = text {
                    this.append_logs(&name, &text);
                }
                if !this.set_phase(&name, phase) {
                    return;
                }
            }
        });
    }
}

impl Executor for FakeExecutor {
    fn create_unit(&self, spec: UnitSpec) -> ExecFuture<'_, UnitHandle> {
        Box::pin(async move {
            let script = {
                let mut inner = self.inner.lock().unwrap();
                if inner.fail_creates {
                    return Err(PodflowError::UnitCreate {
                        name: spec.name,
                        reason: "injected failure".to_string(),
                    });
                }
                let state = UnitState {
                    name: spec.name.clone(),
                    namespace: spec.namespace.clone(),
                    phase: Phase::Pending,
                    labels: spec.labels.clone(),
                };
                inner.units.insert(
                    spec.name.clone(),
                    FakeUnit {
                        state: state.clone(),
                        logs: Vec::new(),
                        usage: (0, 0),
                    },
                );
                inner.created.push(spec.clone());
                Self::publish(&mut inner, UnitEvent::Added(state));
                inner.script.clone()
            };

            if let Some((phases, step)) = script {
                self.run_script(spec.name.clone(), phases, step);
            }

            Ok(UnitHandle {
                name: spec.name,
                namespace: spec.namespace,
            })
        })
    }

    fn delete_unit<'a>(&'a self, name: &'a str, _namespace: &'a str) -> ExecFuture<'a, ()> {
        Box::pin(async move {
            let mut inner = self.inner.lock().unwrap();
            if inner.fail_deletes {
                return Err(PodflowError::UnitDelete {
                    name: name.to_string(),
                    reason: "injected failure".to_string(),
                });
            }
            let Some(unit) = inner.units.remove(name) else {
                return Err(PodflowError::UnitNotFound(name.to_string()));
            };
            inner.deleted.push(name.to_string());
            Self::publish(&mut inner, UnitEvent::Deleted(unit.state));
            Ok(())
        })
    }

    fn get_unit<'a>(&'a self, name: &'a str, _namespace: &'a str) -> ExecFuture<'a, UnitState> {
        Box::pin(async move {
            self.inner
                .lock()
                .unwrap()
                .units
                .get(name)
                .map(|u| u.state.clone())
                .ok_or_else(|| PodflowError::UnitNotFound(name.to_string()))
        })
    }

    fn list_units<'a>(&'a self, selector: &'a Selector) -> ExecFuture<'a, Vec<UnitState>> {
        Box::pin(async move {
            Ok(self
                .inner
                .lock()
                .unwrap()
                .units
                .values()
                .filter(|u| selector.matches(&u.state.labels))
                .map(|u| u.state.clone())
                .collect())
        })
    }

    fn read_logs<'a>(
        &'a self,
        name: &'a str,
        _namespace: &'a str,
        options: LogOptions,
    ) -> ExecFuture<'a, LogStream> {
        Box::pin(async move {
            let mut inner = self.inner.lock().unwrap();
            if inner.log_failures > 0 {
                inner.log_failures -= 1;
                return Err(PodflowError::Executor("injected log failure".to_string()));
            }
            let unit = inner
                .units
                .get(name)
                .ok_or_else(|| PodflowError::UnitNotFound(name.to_string()))?;
            if unit.state.phase == Phase::Pending && !options.previous {
                return Err(PodflowError::UnitNotFound(name.to_string()));
            }
            let stream: LogStream = Box::new(Cursor::new(unit.logs.clone()));
            Ok(stream)
        })
    }

    fn subscribe(&self, selector: Selector) -> ExecFuture<'_, mpsc::Receiver<UnitEvent>> {
        Box::pin(async move {
            // Bridge an unbounded internal channel into the bounded receiver
            // the trait hands out, so publishing never blocks the fake.
            let (tx, mut unbounded_rx) = mpsc::unbounded_channel();
            let (bounded_tx, rx) = mpsc::channel(1024);
            self.inner.lock().unwrap().subscribers.push((selector, tx));
            tokio::spawn(async move {
                while let Some(event) = unbounded_rx.recv().await {
                    if bounded_tx.send(event).await.is_err() {
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
            let mut inner = self.inner.lock().unwrap();
            if inner.metric_failures > 0 {
                inner.metric_failures -= 1;
                return Err(PodflowError::Executor("injected metrics failure".to_string()));
            }
            let (memory, cpu) = match inner.units.get(name) {
                Some(unit) if unit.state.phase == Phase::Running => unit.usage,
                _ => return Err(PodflowError::UnitNotFound(name.to_string())),
            };
            inner.metric_samples += 1;
            Ok(UnitMetrics::sampled_now(name, namespace, memory, cpu))
        })
    }

    fn ensure_identity<'a>(&'a self, name: &'a str, namespace: &'a str) -> ExecFuture<'a, ()> {
        Box::pin(async move {
            self.inner
                .lock()
                .unwrap()
                .identities
                .push((name.to_string(), namespace.to_string()));
            Ok(())
        })
    }
}

// src/exec/unit.rs

//! Value types exchanged with an [`Executor`](super::Executor).

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use tokio::io::AsyncRead;

use crate::types::{Phase, RestartPolicy};

/// Label key every unit created by podflow carries.
pub const APP_LABEL: &str = "App";
/// Value of [`APP_LABEL`].
pub const APP_NAME: &str = "podflow";
/// Label key carrying the run (unit) name.
pub const NAME_LABEL: &str = "Name";
/// Label key carrying the owning workload's name.
pub const WORKLOAD_LABEL: &str = "Workload";
/// Annotation carrying the logical execution date of a run.
pub const EXECUTION_DATE_ANNOTATION: &str = "podflow/execution-date";
/// Identity units run under; provisioned once per namespace.
pub const SERVICE_ACCOUNT: &str = "podflow";

pub type Labels = BTreeMap<String, String>;

/// Label equality selector: a unit matches if it carries every pair.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selector {
    pub match_labels: Labels,
}

impl Selector {
    pub fn new(match_labels: Labels) -> Self {
        Self { match_labels }
    }

    /// Selector matching every unit created by podflow.
    pub fn app() -> Self {
        let mut labels = Labels::new();
        labels.insert(APP_LABEL.to_string(), APP_NAME.to_string());
        Self::new(labels)
    }

    pub fn matches(&self, labels: &Labels) -> bool {
        self.match_labels
            .iter()
            .all(|(k, v)| labels.get(k) == Some(v))
    }
}

/// The single container of a unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    pub command: Vec<String>,
    pub pull_if_not_present: bool,
}

/// Everything an executor needs to create a unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitSpec {
    pub name: String,
    pub namespace: String,
    pub labels: Labels,
    pub annotations: Labels,
    pub container: ContainerSpec,
    pub restart_policy: RestartPolicy,
    /// Seconds after which the executor kills the unit.
    pub active_deadline_seconds: Option<i64>,
    pub service_account: String,
    pub parallelism: u32,
    pub retries: u32,
}

/// Returned by a successful create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitHandle {
    pub name: String,
    pub namespace: String,
}

/// Observed state of a unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitState {
    pub name: String,
    pub namespace: String,
    pub phase: Phase,
    pub labels: Labels,
}

/// Push notification delivered to subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitEvent {
    Added(UnitState),
    Updated { old: UnitState, new: UnitState },
    Deleted(UnitState),
}

impl UnitEvent {
    /// Labels of the unit the event is about.
    pub fn labels(&self) -> &Labels {
        match self {
            UnitEvent::Added(s) | UnitEvent::Deleted(s) => &s.labels,
            UnitEvent::Updated { new, .. } => &new.labels,
        }
    }
}

/// Options for reading a unit's logs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LogOptions {
    /// Read the logs of the previous (terminated) container instance.
    pub previous: bool,
}

/// Byte stream of a unit's output.
pub type LogStream = Box<dyn AsyncRead + Send + Unpin>;

/// Resource usage of a running unit at one point in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitMetrics {
    pub name: String,
    pub namespace: String,
    pub sampled_at: DateTime<Utc>,
    /// Resident memory, in bytes.
    pub memory_bytes: u64,
    /// CPU time consumed since the unit started, in nanoseconds.
    pub cpu_nanos: u64,
}

impl UnitMetrics {
    /// A sample taken now.
    pub fn sampled_now(name: &str, namespace: &str, memory_bytes: u64, cpu_nanos: u64) -> Self {
        Self {
            name: name.to_string(),
            namespace: namespace.to_string(),
            sampled_at: Utc::now(),
            memory_bytes,
            cpu_nanos,
        }
    }
}

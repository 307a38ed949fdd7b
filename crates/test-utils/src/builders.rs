#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use podflow::config::SchedulerSettings;
use podflow::definition::{LoadedDefinition, WorkloadDefinition};
use podflow::events::EventChannelRegistry;
use podflow::exec::Executor;
use podflow::record::{MemoryRecorder, Recorder};
use podflow::run::RunContext;
use podflow::types::RestartPolicy;

/// Builder for `WorkloadDefinition` to simplify test setup.
///
/// Defaults: namespace `default`, image `busybox`, schedule `@every 1h`,
/// start `2020-01-01`, one active run, logs enabled, command `echo <name>`.
pub struct WorkloadDefinitionBuilder {
    def: WorkloadDefinition,
}

impl WorkloadDefinitionBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            def: WorkloadDefinition {
                name: name.to_string(),
                namespace: "default".to_string(),
                schedule: "@every 1h".to_string(),
                image: "busybox".to_string(),
                restart_policy: Some(RestartPolicy::Never),
                command: vec!["echo".to_string(), name.to_string()],
                parallelism: 1,
                time_limit: None,
                retries: 0,
                max_active_runs: 1,
                start_date_time: "2020-01-01".to_string(),
                end_date_time: None,
                labels: BTreeMap::new(),
                annotations: BTreeMap::new(),
                with_logs: Some(true),
            },
        }
    }

    pub fn namespace(mut self, namespace: &str) -> Self {
        self.def.namespace = namespace.to_string();
        self
    }

    pub fn schedule(mut self, schedule: &str) -> Self {
        self.def.schedule = schedule.to_string();
        self
    }

    pub fn command(mut self, command: &[&str]) -> Self {
        self.def.command = command.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn max_active_runs(mut self, max: usize) -> Self {
        self.def.max_active_runs = max;
        self
    }

    pub fn start(mut self, start: &str) -> Self {
        self.def.start_date_time = start.to_string();
        self
    }

    pub fn end(mut self, end: &str) -> Self {
        self.def.end_date_time = Some(end.to_string());
        self
    }

    pub fn time_limit(mut self, seconds: i64) -> Self {
        self.def.time_limit = Some(seconds);
        self
    }

    pub fn label(mut self, key: &str, value: &str) -> Self {
        self.def.labels.insert(key.to_string(), value.to_string());
        self
    }

    pub fn annotation(mut self, key: &str, value: &str) -> Self {
        self.def.annotations.insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_logs(mut self, enabled: bool) -> Self {
        self.def.with_logs = Some(enabled);
        self
    }

    pub fn build(self) -> WorkloadDefinition {
        self.def
    }

    /// The definition as if it had been read from `<name>.json`.
    pub fn loaded(self) -> LoadedDefinition {
        let code = serde_json::to_string_pretty(&self.def)
            .expect("Failed to serialise definition from builder");
        let path = PathBuf::from(format!("{}.json", self.def.name));
        LoadedDefinition::new(self.def, code, path)
    }
}

/// Scheduler settings for tests: short cycles and a few log attempts.
pub fn test_settings(dag_path: impl Into<PathBuf>) -> SchedulerSettings {
    SchedulerSettings {
        dag_path: dag_path.into(),
        cycle_period: Duration::from_millis(20),
        workloads_on: true,
        log_read_attempts: 3,
        metrics_period: Duration::from_millis(20),
    }
}

/// Run context over `executor` with a fresh registry and an in-memory
/// recorder.
pub fn run_context(executor: Arc<dyn Executor>) -> RunContext {
    let recorder: Arc<dyn Recorder> = Arc::new(MemoryRecorder::new());
    RunContext {
        executor,
        registry: Arc::new(EventChannelRegistry::new()),
        recorder,
        log_read_attempts: 3,
    }
}

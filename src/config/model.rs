// src/config/model.rs

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::types::{RecorderKind, RestartPolicy};

/// Top-level configuration as read from a TOML file.
///
/// ```toml
/// [scheduler]
/// dag_path = "dags"
/// cycle_period = "1s"
/// workloads_on = true
///
/// [defaults]
/// namespace = "default"
/// image = "busybox"
/// restart_policy = "Never"
/// max_active_runs = 1
///
/// [recorder]
/// kind = "file"
/// path = ".podflow/records.json"
/// ```
///
/// All sections are optional and have reasonable defaults.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawAppConfig {
    /// Loop behaviour from `[scheduler]`.
    #[serde(default)]
    pub scheduler: SchedulerSection,

    /// Values applied to definitions that leave them unset, from `[defaults]`.
    #[serde(default)]
    pub defaults: DefaultsSection,

    /// Persistence backend from `[recorder]`.
    #[serde(default)]
    pub recorder: RecorderSection,
}

/// `[scheduler]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerSection {
    /// Folder scanned for `*.json` workload definitions.
    #[serde(default = "default_dag_path")]
    pub dag_path: String,

    /// Period of the collect and trigger loops, e.g. `"1s"`.
    #[serde(default = "default_cycle_period")]
    pub cycle_period: String,

    /// Whether newly discovered workloads start switched on.
    #[serde(default = "default_true")]
    pub workloads_on: bool,

    /// How many times a monitor tries to open a unit's log stream before
    /// giving up on log capture for that run.
    #[serde(default = "default_log_read_attempts")]
    pub log_read_attempts: u32,

    /// Period of the resource usage sampling loop, e.g. `"2s"`.
    #[serde(default = "default_metrics_period")]
    pub metrics_period: String,
}

fn default_dag_path() -> String {
    "dags".to_string()
}

fn default_cycle_period() -> String {
    "1s".to_string()
}

fn default_metrics_period() -> String {
    "2s".to_string()
}

fn default_true() -> bool {
    true
}

fn default_log_read_attempts() -> u32 {
    5
}

impl Default for SchedulerSection {
    fn default() -> Self {
        Self {
            dag_path: default_dag_path(),
            cycle_period: default_cycle_period(),
            workloads_on: default_true(),
            log_read_attempts: default_log_read_attempts(),
            metrics_period: default_metrics_period(),
        }
    }
}

/// `[defaults]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct DefaultsSection {
    #[serde(default = "default_namespace")]
    pub namespace: String,

    #[serde(default = "default_image")]
    pub image: String,

    /// `"Always"`, `"OnFailure"` or `"Never"`.
    #[serde(default = "default_restart_policy")]
    pub restart_policy: String,

    #[serde(default = "default_one")]
    pub parallelism: u32,

    /// Active deadline of a unit, in seconds.
    #[serde(default)]
    pub time_limit: Option<i64>,

    #[serde(default)]
    pub retries: u32,

    #[serde(default = "default_max_active_runs")]
    pub max_active_runs: usize,

    #[serde(default = "default_true")]
    pub with_logs: bool,
}

fn default_namespace() -> String {
    "default".to_string()
}

fn default_image() -> String {
    "busybox".to_string()
}

fn default_restart_policy() -> String {
    "Never".to_string()
}

fn default_one() -> u32 {
    1
}

fn default_max_active_runs() -> usize {
    1
}

impl Default for DefaultsSection {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            image: default_image(),
            restart_policy: default_restart_policy(),
            parallelism: default_one(),
            time_limit: None,
            retries: 0,
            max_active_runs: default_max_active_runs(),
            with_logs: default_true(),
        }
    }
}

/// `[recorder]` section.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RecorderSection {
    #[serde(default)]
    pub kind: RecorderKind,

    /// Snapshot file, required when `kind = "file"`.
    #[serde(default)]
    pub path: Option<String>,
}

/// Validated scheduler settings.
#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    pub dag_path: PathBuf,
    pub cycle_period: Duration,
    pub workloads_on: bool,
    pub log_read_attempts: u32,
    pub metrics_period: Duration,
}

/// Validated defaults applied to every loaded definition.
#[derive(Debug, Clone)]
pub struct WorkloadDefaults {
    pub namespace: String,
    pub image: String,
    pub restart_policy: RestartPolicy,
    pub parallelism: u32,
    pub time_limit: Option<i64>,
    pub retries: u32,
    pub max_active_runs: usize,
    pub with_logs: bool,
}

/// Validated configuration.
///
/// Can only be built through `TryFrom<RawAppConfig>` (see
/// [`crate::config::validate`]) or [`AppConfig::default`].
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub scheduler: SchedulerSettings,
    pub defaults: WorkloadDefaults,
    pub recorder: RecorderSection,
}

impl AppConfig {
    pub(crate) fn new_unchecked(
        scheduler: SchedulerSettings,
        defaults: WorkloadDefaults,
        recorder: RecorderSection,
    ) -> Self {
        Self {
            scheduler,
            defaults,
            recorder,
        }
    }

    /// Same config with a different definition folder.
    pub fn with_dag_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.scheduler.dag_path = path.into();
        self
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            scheduler: SchedulerSettings {
                dag_path: PathBuf::from(default_dag_path()),
                cycle_period: Duration::from_secs(1),
                workloads_on: true,
                log_read_attempts: default_log_read_attempts(),
                metrics_period: Duration::from_secs(2),
            },
            defaults: WorkloadDefaults {
                namespace: default_namespace(),
                image: default_image(),
                restart_policy: RestartPolicy::Never,
                parallelism: default_one(),
                time_limit: None,
                retries: 0,
                max_active_runs: default_max_active_runs(),
                with_logs: true,
            },
            recorder: RecorderSection::default(),
        }
    }
}

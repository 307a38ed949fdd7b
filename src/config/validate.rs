// src/config/validate.rs

use std::path::PathBuf;

use crate::config::duration::parse_duration;
use crate::config::model::{
    AppConfig, DefaultsSection, RawAppConfig, RecorderSection, SchedulerSection,
    SchedulerSettings, WorkloadDefaults,
};
use crate::errors::{PodflowError, Result};
use crate::types::{RecorderKind, RestartPolicy};

impl TryFrom<RawAppConfig> for AppConfig {
    type Error = PodflowError;

    fn try_from(raw: RawAppConfig) -> std::result::Result<Self, Self::Error> {
        let scheduler = validate_scheduler(&raw.scheduler)?;
        let defaults = validate_defaults(&raw.defaults)?;
        validate_recorder(&raw.recorder)?;
        Ok(AppConfig::new_unchecked(scheduler, defaults, raw.recorder))
    }
}

fn validate_scheduler(section: &SchedulerSection) -> Result<SchedulerSettings> {
    if section.dag_path.trim().is_empty() {
        return Err(PodflowError::ConfigError(
            "[scheduler].dag_path must not be empty".to_string(),
        ));
    }

    let cycle_period = parse_duration(&section.cycle_period).map_err(|e| {
        PodflowError::ConfigError(format!("[scheduler].cycle_period: {e}"))
    })?;
    if cycle_period.is_zero() {
        return Err(PodflowError::ConfigError(
            "[scheduler].cycle_period must be greater than zero".to_string(),
        ));
    }

    if section.log_read_attempts == 0 {
        return Err(PodflowError::ConfigError(
            "[scheduler].log_read_attempts must be >= 1 (got 0)".to_string(),
        ));
    }

    let metrics_period = parse_duration(&section.metrics_period).map_err(|e| {
        PodflowError::ConfigError(format!("[scheduler].metrics_period: {e}"))
    })?;
    if metrics_period.is_zero() {
        return Err(PodflowError::ConfigError(
            "[scheduler].metrics_period must be greater than zero".to_string(),
        ));
    }

    Ok(SchedulerSettings {
        dag_path: PathBuf::from(&section.dag_path),
        cycle_period,
        workloads_on: section.workloads_on,
        log_read_attempts: section.log_read_attempts,
        metrics_period,
    })
}

fn validate_defaults(section: &DefaultsSection) -> Result<WorkloadDefaults> {
    if section.restart_policy.trim().is_empty() {
        return Err(PodflowError::ConfigError(
            "[defaults].restart_policy must be specified".to_string(),
        ));
    }
    let restart_policy: RestartPolicy = section
        .restart_policy
        .parse()
        .map_err(|e: String| PodflowError::ConfigError(format!("[defaults].{e}")))?;

    if section.max_active_runs == 0 {
        return Err(PodflowError::ConfigError(
            "[defaults].max_active_runs must be >= 1 (got 0)".to_string(),
        ));
    }

    if let Some(limit) = section.time_limit {
        if limit <= 0 {
            return Err(PodflowError::ConfigError(format!(
                "[defaults].time_limit must be positive (got {limit})"
            )));
        }
    }

    Ok(WorkloadDefaults {
        namespace: section.namespace.clone(),
        image: section.image.clone(),
        restart_policy,
        parallelism: section.parallelism,
        time_limit: section.time_limit,
        retries: section.retries,
        max_active_runs: section.max_active_runs,
        with_logs: section.with_logs,
    })
}

fn validate_recorder(section: &RecorderSection) -> Result<()> {
    if section.kind == RecorderKind::File
        && section.path.as_deref().is_none_or(|p| p.trim().is_empty())
    {
        return Err(PodflowError::ConfigError(
            "[recorder].path is required when kind = \"file\"".to_string(),
        ));
    }
    Ok(())
}

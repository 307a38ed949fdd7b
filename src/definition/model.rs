// src/definition/model.rs

use std::collections::BTreeMap;
use std::sync::LazyLock;

use chrono::{DateTime, NaiveDate, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::config::WorkloadDefaults;
use crate::errors::{PodflowError, Result};
use crate::types::RestartPolicy;
use crate::workload::schedule::parse_schedule;

/// Names must start with a letter and may only contain letters, digits,
/// `_` and `-`. This rules out `.` and path separators.
pub const NAME_PATTERN: &str = "^[A-Za-z][A-Za-z0-9_-]+$";

static NAME_REGEX: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(NAME_PATTERN).ok());

/// A workload definition as stored in a `<name>.json` file.
///
/// ```json
/// {
///   "name": "nightly_report",
///   "schedule": "0 0 * * *",
///   "image": "busybox",
///   "command": ["sh", "-c", "echo report"],
///   "start_date_time": "2019-01-01",
///   "max_active_runs": 1
/// }
/// ```
///
/// Fields left empty/zero are filled from the `[defaults]` section of the
/// process config by [`WorkloadDefinition::apply_defaults`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadDefinition {
    pub name: String,

    #[serde(default)]
    pub namespace: String,

    /// Cron expression (5 or 6 fields), a descriptor like `@hourly`, or
    /// `@every <duration>`.
    pub schedule: String,

    #[serde(default)]
    pub image: String,

    #[serde(default)]
    pub restart_policy: Option<RestartPolicy>,

    #[serde(default)]
    pub command: Vec<String>,

    #[serde(default)]
    pub parallelism: u32,

    /// Active deadline of each unit, in seconds.
    #[serde(default)]
    pub time_limit: Option<i64>,

    #[serde(default)]
    pub retries: u32,

    #[serde(default)]
    pub max_active_runs: usize,

    /// `YYYY-MM-DD` or RFC 3339. The first run fires at exactly this time.
    pub start_date_time: String,

    /// Optional end of the schedule window (exclusive).
    #[serde(default)]
    pub end_date_time: Option<String>,

    #[serde(default)]
    pub labels: BTreeMap<String, String>,

    #[serde(default)]
    pub annotations: BTreeMap<String, String>,

    #[serde(default)]
    pub with_logs: Option<bool>,
}

impl WorkloadDefinition {
    /// Fill unset fields from the process-wide defaults.
    pub fn apply_defaults(&mut self, defaults: &WorkloadDefaults) {
        if self.image.is_empty() {
            self.image = defaults.image.clone();
        }
        if self.namespace.is_empty() {
            self.namespace = defaults.namespace.clone();
        }
        if self.restart_policy.is_none() {
            self.restart_policy = Some(defaults.restart_policy);
        }
        if self.parallelism == 0 {
            self.parallelism = defaults.parallelism;
        }
        if self.time_limit.is_none() {
            self.time_limit = defaults.time_limit;
        }
        if self.retries == 0 {
            self.retries = defaults.retries;
        }
        if self.max_active_runs == 0 {
            self.max_active_runs = defaults.max_active_runs;
        }
        if self.with_logs.is_none() {
            self.with_logs = Some(defaults.with_logs);
        }
    }

    pub fn is_name_valid(&self) -> bool {
        NAME_REGEX
            .as_ref()
            .is_some_and(|re| re.is_match(&self.name))
    }

    /// Reject names that could escape the definition folder or collide with
    /// the cluster naming rules.
    pub fn validate_name(&self) -> Result<()> {
        if self.is_name_valid() {
            Ok(())
        } else {
            Err(PodflowError::Validation(format!(
                "workload name '{}' must match the pattern \"{}\"",
                self.name, NAME_PATTERN
            )))
        }
    }

    /// Full semantic validation, run after defaults were applied.
    pub fn validate(&self) -> Result<()> {
        self.validate_name()?;

        if self.max_active_runs < 1 {
            return Err(PodflowError::Validation(format!(
                "workload '{}': max_active_runs must be greater than 0",
                self.name
            )));
        }

        parse_schedule(&self.schedule)?;

        let start = self.start_time()?;
        if let Some(end) = self.end_time()? {
            if end <= start {
                return Err(PodflowError::Validation(format!(
                    "workload '{}': end_date_time must be after start_date_time",
                    self.name
                )));
            }
        }
        Ok(())
    }

    pub fn start_time(&self) -> Result<DateTime<Utc>> {
        parse_date_time(&self.start_date_time)
    }

    pub fn end_time(&self) -> Result<Option<DateTime<Utc>>> {
        match self.end_date_time.as_deref() {
            None => Ok(None),
            Some(s) if s.trim().is_empty() => Ok(None),
            Some(s) => parse_date_time(s).map(Some),
        }
    }

    pub fn with_logs(&self) -> bool {
        self.with_logs.unwrap_or(true)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Parse `YYYY-MM-DD` (midnight UTC) or an RFC 3339 timestamp.
pub fn parse_date_time(s: &str) -> Result<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        if let Some(midnight) = date.and_hms_opt(0, 0, 0) {
            return Ok(midnight.and_utc());
        }
    }
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| PodflowError::Validation(format!("invalid date '{s}': {e}")))
}

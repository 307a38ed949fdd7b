// src/workload/schedule.rs

//! Parsed schedule expressions and the cache shared between workloads.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};

use crate::config::parse_duration;
use crate::errors::{PodflowError, Result};

/// A parsed schedule.
#[derive(Debug, Clone)]
pub enum Schedule {
    /// Standard cron expression (seconds field optional in the source text).
    Cron(Box<cron::Schedule>),
    /// `@every <duration>`: fixed interval from the previous fire time.
    Every(chrono::Duration),
}

impl Schedule {
    /// Next fire time strictly after `after`, if the schedule has one.
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Schedule::Cron(schedule) => schedule.after(&after).next(),
            Schedule::Every(interval) => after.checked_add_signed(*interval),
        }
    }
}

/// Parse a schedule expression.
///
/// Accepts:
/// - 5-field cron (`"*/5 * * * *"`), interpreted with seconds = 0,
/// - 6/7-field cron with a leading seconds field,
/// - descriptors such as `@hourly` or `@daily`,
/// - `@every 90s` style fixed intervals.
pub fn parse_schedule(expression: &str) -> Result<Schedule> {
    let expr = expression.trim();
    let invalid = |reason: String| PodflowError::Schedule {
        expression: expression.to_string(),
        reason,
    };

    if let Some(rest) = expr.strip_prefix("@every") {
        let interval = parse_duration(rest).map_err(invalid)?;
        if interval.is_zero() {
            return Err(invalid("interval must be greater than zero".to_string()));
        }
        let interval = chrono::Duration::from_std(interval).map_err(|e| invalid(e.to_string()))?;
        return Ok(Schedule::Every(interval));
    }

    let normalized = if !expr.starts_with('@') && expr.split_whitespace().count() == 5 {
        format!("0 {expr}")
    } else {
        expr.to_string()
    };

    cron::Schedule::from_str(&normalized)
        .map(|s| Schedule::Cron(Box::new(s)))
        .map_err(|e| invalid(e.to_string()))
}

/// Parsed schedules keyed by expression, shared by every workload of a
/// scheduler so that identical expressions are parsed once.
#[derive(Debug, Default)]
pub struct ScheduleCache {
    schedules: RwLock<HashMap<String, Arc<Schedule>>>,
}

impl ScheduleCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_parse(&self, expression: &str) -> Result<Arc<Schedule>> {
        {
            let map = self.schedules.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(schedule) = map.get(expression) {
                return Ok(Arc::clone(schedule));
            }
        }

        let schedule = Arc::new(parse_schedule(expression)?);
        let mut map = self.schedules.write().unwrap_or_else(PoisonError::into_inner);
        let entry = map
            .entry(expression.to_string())
            .or_insert_with(|| Arc::clone(&schedule));
        Ok(Arc::clone(entry))
    }

    pub fn len(&self) -> usize {
        self.schedules
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// src/run/naming.rs

//! Deterministic run names.

use chrono::{DateTime, Utc};

/// Rewrite `name` into the cluster naming alphabet `[a-z0-9.-]`.
///
/// `_` and `:` become `-`, spaces are dropped, `+` becomes `plus`, the result
/// is lowercased and any remaining character outside the alphabet is
/// removed.
pub fn clean_name(name: &str) -> String {
    name.replace(['_', ':'], "-")
        .replace(' ', "")
        .replace('+', "plus")
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '.' || *c == '-')
        .collect()
}

/// Name of the run of `workload` for `execution_date`.
///
/// `nightly` at `2024-01-01T00:00:00Z` becomes
/// `nightly-2024-01-0100-00-00plus0000utc`.
pub fn run_name(workload: &str, execution_date: DateTime<Utc>) -> String {
    let timestamp = execution_date.format("%Y-%m-%d %H:%M:%S%.f %z UTC");
    clean_name(&format!("{workload}-{timestamp}"))
}

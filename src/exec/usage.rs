// src/exec/usage.rs

//! Memory and CPU usage of local processes, read from `/proc`.

use std::path::PathBuf;

use crate::errors::{PodflowError, Result};

/// Clock ticks per second of the times in `/proc/<pid>/stat` (`USER_HZ`).
const TICKS_PER_SECOND: u64 = 100;
const NANOS_PER_TICK: u64 = 1_000_000_000 / TICKS_PER_SECOND;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessUsage {
    pub memory_bytes: u64,
    pub cpu_nanos: u64,
}

/// Sample process `pid`, which backs `unit`.
///
/// A process that is already gone is reported as `UnitNotFound`.
#[cfg(target_os = "linux")]
pub async fn sample_process(unit: &str, pid: u32) -> Result<ProcessUsage> {
    let proc_dir = PathBuf::from(format!("/proc/{pid}"));
    let status = read_proc_file(unit, proc_dir.join("status")).await?;
    let stat = read_proc_file(unit, proc_dir.join("stat")).await?;

    let memory_bytes = parse_status_rss(&status).ok_or_else(|| malformed(unit, "status"))?;
    let cpu_nanos = parse_stat_cpu(&stat).ok_or_else(|| malformed(unit, "stat"))?;
    Ok(ProcessUsage {
        memory_bytes,
        cpu_nanos,
    })
}

#[cfg(not(target_os = "linux"))]
pub async fn sample_process(unit: &str, _pid: u32) -> Result<ProcessUsage> {
    Err(PodflowError::Executor(format!(
        "cannot sample unit '{unit}': process metrics need /proc"
    )))
}

#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
async fn read_proc_file(unit: &str, path: PathBuf) -> Result<String> {
    tokio::fs::read_to_string(&path).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            PodflowError::UnitNotFound(format!("{unit} (process)"))
        } else {
            PodflowError::Executor(format!("reading {}: {e}", path.display()))
        }
    })
}

#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn malformed(unit: &str, file: &str) -> PodflowError {
    PodflowError::Executor(format!("unexpected /proc/<pid>/{file} format for unit '{unit}'"))
}

/// Resident set size in bytes, from the `VmRSS:` line of `/proc/<pid>/status`.
///
/// Zombies and kernel threads have no such line and count as zero.
pub fn parse_status_rss(status: &str) -> Option<u64> {
    let Some(rest) = status.lines().find_map(|l| l.strip_prefix("VmRSS:")) else {
        return Some(0);
    };
    let mut parts = rest.split_whitespace();
    let value: u64 = parts.next()?.parse().ok()?;
    match parts.next() {
        Some("kB") => value.checked_mul(1024),
        _ => None,
    }
}

/// User plus system CPU time in nanoseconds, from `/proc/<pid>/stat`.
pub fn parse_stat_cpu(stat: &str) -> Option<u64> {
    // The command name is parenthesised and may itself contain spaces or
    // parentheses; everything after the last ')' is space separated.
    let after_comm = &stat[stat.rfind(')')? + 1..];
    let fields: Vec<&str> = after_comm.split_whitespace().collect();
    // fields[0] is the state; utime and stime are fields[11] and fields[12].
    let utime: u64 = fields.get(11)?.parse().ok()?;
    let stime: u64 = fields.get(12)?.parse().ok()?;
    utime.checked_add(stime)?.checked_mul(NANOS_PER_TICK)
}

// tests/config.rs

use std::fs;
use std::time::Duration;

use tempfile::tempdir;

use podflow::config::{AppConfig, load_and_validate, load_from_path, parse_duration};
use podflow::errors::PodflowError;
use podflow::types::{RecorderKind, RestartPolicy};

fn write_config(contents: &str) -> (tempfile::TempDir, std::path::PathBuf) {
    let dir = tempdir().unwrap();
    let path = dir.path().join("Podflow.toml");
    fs::write(&path, contents).unwrap();
    (dir, path)
}

#[test]
fn empty_file_uses_defaults() {
    let (_dir, path) = write_config("");
    let cfg = load_and_validate(&path).unwrap();

    assert_eq!(cfg.scheduler.dag_path.to_str(), Some("dags"));
    assert_eq!(cfg.scheduler.cycle_period, Duration::from_secs(1));
    assert!(cfg.scheduler.workloads_on);
    assert_eq!(cfg.scheduler.metrics_period, Duration::from_secs(2));
    assert_eq!(cfg.defaults.namespace, "default");
    assert_eq!(cfg.defaults.restart_policy, RestartPolicy::Never);
    assert_eq!(cfg.defaults.max_active_runs, 1);
    assert_eq!(cfg.recorder.kind, RecorderKind::Memory);
}

#[test]
fn full_config_is_parsed() {
    let (_dir, path) = write_config(
        r#"
[scheduler]
dag_path = "workloads"
cycle_period = "250ms"
workloads_on = false
log_read_attempts = 2
metrics_period = "30s"

[defaults]
namespace = "batch"
image = "alpine:3"
restart_policy = "OnFailure"
time_limit = 600
max_active_runs = 3
with_logs = false

[recorder]
kind = "file"
path = "state/records.json"
"#,
    );
    let cfg = load_and_validate(&path).unwrap();

    assert_eq!(cfg.scheduler.cycle_period, Duration::from_millis(250));
    assert!(!cfg.scheduler.workloads_on);
    assert_eq!(cfg.scheduler.log_read_attempts, 2);
    assert_eq!(cfg.scheduler.metrics_period, Duration::from_secs(30));
    assert_eq!(cfg.defaults.namespace, "batch");
    assert_eq!(cfg.defaults.restart_policy, RestartPolicy::OnFailure);
    assert_eq!(cfg.defaults.time_limit, Some(600));
    assert_eq!(cfg.defaults.max_active_runs, 3);
    assert!(!cfg.defaults.with_logs);
    assert_eq!(cfg.recorder.kind, RecorderKind::File);
    assert_eq!(cfg.recorder.path.as_deref(), Some("state/records.json"));
}

#[test]
fn invalid_values_are_rejected() {
    let cases = [
        "[scheduler]\ncycle_period = \"0s\"\n",
        "[scheduler]\ncycle_period = \"soon\"\n",
        "[scheduler]\nlog_read_attempts = 0\n",
        "[scheduler]\nmetrics_period = \"0ms\"\n",
        "[scheduler]\nmetrics_period = \"999999999999999999h\"\n",
        "[defaults]\nrestart_policy = \"\"\n",
        "[defaults]\nrestart_policy = \"Sometimes\"\n",
        "[defaults]\nmax_active_runs = 0\n",
        "[defaults]\ntime_limit = -5\n",
        "[recorder]\nkind = \"file\"\n",
    ];
    for contents in cases {
        let (_dir, path) = write_config(contents);
        let err = load_and_validate(&path).unwrap_err();
        assert!(
            matches!(err, PodflowError::ConfigError(_)),
            "expected ConfigError for {contents:?}, got {err:?}"
        );
    }
}

#[test]
fn malformed_toml_is_a_toml_error() {
    let (_dir, path) = write_config("[scheduler\n");
    assert!(matches!(
        load_from_path(&path),
        Err(PodflowError::TomlError(_))
    ));
}

#[test]
fn missing_file_is_an_io_error() {
    let dir = tempdir().unwrap();
    assert!(matches!(
        load_and_validate(dir.path().join("nope.toml")),
        Err(PodflowError::IoError(_))
    ));
}

#[test]
fn durations_parse() {
    assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
    assert_eq!(parse_duration(" 2m ").unwrap(), Duration::from_secs(120));
    assert!(parse_duration("10").is_err());
    assert!(parse_duration("1d").is_err());
}

#[test]
fn oversized_durations_are_rejected() {
    let err = parse_duration("999999999999999999m").unwrap_err();
    assert!(err.contains("too large"), "got {err}");
    assert!(parse_duration("18446744073709551615h").is_err());
    assert_eq!(
        parse_duration("18446744073709551615s").unwrap(),
        Duration::from_secs(u64::MAX)
    );
}

#[test]
fn default_app_config_points_at_dags() {
    let cfg = AppConfig::default().with_dag_path("/tmp/elsewhere");
    assert_eq!(cfg.scheduler.dag_path.to_str(), Some("/tmp/elsewhere"));
}

// tests/local_executor.rs

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::sync::mpsc;

use podflow::errors::PodflowError;
use podflow::exec::usage::{parse_stat_cpu, parse_status_rss};
use podflow::exec::{
    ContainerSpec, Executor, LocalProcessExecutor, LogOptions, Selector, UnitEvent, UnitSpec,
};
use podflow::record::{MemoryRecorder, Recorder};
use podflow::scheduler::Scheduler;
use podflow::types::{Phase, RestartPolicy};
use podflow_test_utils::builders::{WorkloadDefinitionBuilder, test_settings};
use podflow_test_utils::fake_source::FakeDefinitionSource;
use podflow_test_utils::{init_tracing, wait_until, with_timeout};

fn spec(name: &str, command: &[&str]) -> UnitSpec {
    let mut labels = BTreeMap::new();
    labels.insert("App".to_string(), "podflow".to_string());
    UnitSpec {
        name: name.to_string(),
        namespace: "default".to_string(),
        labels,
        annotations: BTreeMap::new(),
        container: ContainerSpec {
            name: "task".to_string(),
            image: "local".to_string(),
            command: command.iter().map(|s| s.to_string()).collect(),
            pull_if_not_present: true,
        },
        restart_policy: RestartPolicy::Never,
        active_deadline_seconds: None,
        service_account: "podflow".to_string(),
        parallelism: 1,
        retries: 0,
    }
}

async fn next_phase(events: &mut mpsc::Receiver<UnitEvent>) -> Phase {
    match with_timeout(events.recv()).await.expect("event stream open") {
        UnitEvent::Added(s) | UnitEvent::Deleted(s) => s.phase,
        UnitEvent::Updated { new, .. } => new.phase,
    }
}

async fn read_logs(executor: &LocalProcessExecutor, name: &str) -> String {
    let mut stream = executor
        .read_logs(name, "default", LogOptions::default())
        .await
        .unwrap();
    let mut out = String::new();
    stream.read_to_string(&mut out).await.unwrap();
    out
}

#[tokio::test]
async fn successful_process_reports_phases_and_output() {
    init_tracing();
    let executor = LocalProcessExecutor::new();
    let mut events = executor.subscribe(Selector::app()).await.unwrap();

    executor
        .create_unit(spec("ok-unit", &["sh", "-c", "echo hello; echo oops >&2"]))
        .await
        .unwrap();

    assert_eq!(next_phase(&mut events).await, Phase::Pending);
    assert_eq!(next_phase(&mut events).await, Phase::Running);
    assert_eq!(next_phase(&mut events).await, Phase::Succeeded);

    let logs = read_logs(&executor, "ok-unit").await;
    assert!(logs.contains("hello\n"));
    assert!(logs.contains("oops\n"));

    let listed = executor.list_units(&Selector::app()).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].phase, Phase::Succeeded);
}

#[tokio::test]
async fn non_zero_exit_is_failed() {
    let executor = LocalProcessExecutor::new();
    let mut events = executor.subscribe(Selector::app()).await.unwrap();
    executor
        .create_unit(spec("bad-exit", &["sh", "-c", "exit 3"]))
        .await
        .unwrap();

    assert_eq!(next_phase(&mut events).await, Phase::Pending);
    assert_eq!(next_phase(&mut events).await, Phase::Running);
    assert_eq!(next_phase(&mut events).await, Phase::Failed);
}

#[tokio::test]
async fn missing_program_fails_the_unit() {
    let executor = LocalProcessExecutor::new();
    executor
        .create_unit(spec("no-such", &["definitely-not-a-real-program-podflow"]))
        .await
        .unwrap();

    with_timeout(async {
        loop {
            let state = executor.get_unit("no-such", "default").await.unwrap();
            if state.phase == Phase::Failed {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;

    // Never started, so only the previous container's output is available.
    let mut stream = executor
        .read_logs("no-such", "default", LogOptions { previous: true })
        .await
        .unwrap();
    let mut out = String::new();
    stream.read_to_string(&mut out).await.unwrap();
    assert!(out.contains("spawning process"));
}

#[tokio::test]
async fn slow_subscriber_still_sees_every_terminal_event() {
    init_tracing();
    let executor = LocalProcessExecutor::new();
    let mut events = executor.subscribe(Selector::app()).await.unwrap();

    // Each unit produces an add and a failed update; together they overflow
    // the receiver's buffer while nobody is reading.
    let units = 300;
    for i in 0..units {
        executor
            .create_unit(spec(&format!("flood-{i}"), &["definitely-not-a-real-program-podflow"]))
            .await
            .unwrap();
    }
    with_timeout(async {
        loop {
            let states = executor.list_units(&Selector::app()).await.unwrap();
            if states.iter().all(|s| s.phase == Phase::Failed) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    executor.delete_unit("flood-0", "default").await.unwrap();

    let mut failed = 0;
    let mut deleted = Vec::new();
    while failed < units || deleted.is_empty() {
        match with_timeout(events.recv()).await.expect("event stream open") {
            UnitEvent::Updated { new, .. } if new.phase == Phase::Failed => failed += 1,
            UnitEvent::Deleted(state) => deleted.push(state.name),
            _ => {}
        }
    }
    assert_eq!(failed, units);
    assert_eq!(deleted, vec!["flood-0".to_string()]);
}

#[tokio::test]
async fn active_deadline_kills_the_process() {
    let executor = LocalProcessExecutor::new();
    let mut events = executor.subscribe(Selector::app()).await.unwrap();
    let mut unit = spec("too-slow", &["sleep", "30"]);
    unit.active_deadline_seconds = Some(1);
    executor.create_unit(unit).await.unwrap();

    assert_eq!(next_phase(&mut events).await, Phase::Pending);
    assert_eq!(next_phase(&mut events).await, Phase::Running);
    assert_eq!(next_phase(&mut events).await, Phase::Failed);
    assert!(read_logs(&executor, "too-slow").await.contains("deadline"));
}

#[tokio::test]
async fn delete_kills_running_process() {
    let executor = LocalProcessExecutor::new();
    let mut events = executor.subscribe(Selector::app()).await.unwrap();
    executor
        .create_unit(spec("long", &["sleep", "30"]))
        .await
        .unwrap();
    assert_eq!(next_phase(&mut events).await, Phase::Pending);
    assert_eq!(next_phase(&mut events).await, Phase::Running);

    executor.delete_unit("long", "default").await.unwrap();
    match with_timeout(events.recv()).await.unwrap() {
        UnitEvent::Deleted(state) => assert_eq!(state.name, "long"),
        other => panic!("expected delete event, got {other:?}"),
    }
    assert!(matches!(
        executor.get_unit("long", "default").await,
        Err(PodflowError::UnitNotFound(_))
    ));
    assert!(matches!(
        executor.delete_unit("long", "default").await,
        Err(PodflowError::UnitNotFound(_))
    ));
}

#[tokio::test]
async fn invalid_specs_are_rejected() {
    let executor = LocalProcessExecutor::new();
    assert!(matches!(
        executor.create_unit(spec("empty", &[])).await,
        Err(PodflowError::UnitCreate { .. })
    ));

    executor
        .create_unit(spec("dup", &["sleep", "1"]))
        .await
        .unwrap();
    assert!(matches!(
        executor.create_unit(spec("dup", &["sleep", "1"])).await,
        Err(PodflowError::UnitCreate { .. })
    ));
    executor.delete_unit("dup", "default").await.unwrap();
}

#[tokio::test]
async fn identities_are_idempotent() {
    let executor = LocalProcessExecutor::new();
    executor.ensure_identity("podflow", "default").await.unwrap();
    executor.ensure_identity("podflow", "default").await.unwrap();
}

#[tokio::test]
async fn scheduler_captures_process_output() {
    init_tracing();
    let executor: Arc<dyn Executor> = Arc::new(LocalProcessExecutor::new());
    let source = FakeDefinitionSource::new(vec![
        WorkloadDefinitionBuilder::new("local-echo")
            .schedule("@every 1h")
            .start("2020-01-01")
            .end("2020-01-01T00:30:00Z")
            .command(&["sh", "-c", "echo hello from podflow"])
            .loaded(),
    ]);
    let recorder: Arc<dyn Recorder> = Arc::new(MemoryRecorder::new());
    let scheduler = Scheduler::new(
        test_settings("unused"),
        Arc::new(source),
        Arc::clone(&executor),
        recorder,
    );

    scheduler.collect_definitions().await.unwrap();
    scheduler.start(Duration::from_millis(20)).await.unwrap();

    let workload = scheduler.get_workload("local-echo").unwrap();
    wait_until(|| workload.runs().len() == 1 && workload.active_runs() == 0).await;

    let run = &workload.runs()[0];
    assert_eq!(run.phase(), Phase::Succeeded);
    assert!(run.captured_logs().concat().contains("hello from podflow"));
    assert!(executor.list_units(&Selector::app()).await.unwrap().is_empty());

    scheduler.stop();
    with_timeout(scheduler.wait()).await;
}

#[test]
fn proc_status_rss_is_reported_in_bytes() {
    let status = "Name:\tsleep\nState:\tS (sleeping)\nVmRSS:\t    1536 kB\nThreads:\t1\n";
    assert_eq!(parse_status_rss(status), Some(1536 * 1024));
    // Zombies have no resident set.
    assert_eq!(parse_status_rss("Name:\tsleep\nState:\tZ (zombie)\n"), Some(0));
    assert_eq!(parse_status_rss("VmRSS:\tlots kB\n"), None);
}

#[test]
fn proc_stat_cpu_sums_user_and_system_time() {
    let stat = "4242 (odd) name) S 1 4242 4242 0 -1 4194304 120 0 0 0 7 3 0 0 20 0 1 0 99 0 0";
    assert_eq!(parse_stat_cpu(stat), Some(10 * 10_000_000));
    assert_eq!(parse_stat_cpu("4242 (short) S 1 2"), None);
    assert_eq!(parse_stat_cpu("no parenthesis here"), None);
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn running_process_can_be_sampled() {
    let executor = LocalProcessExecutor::new();
    executor
        .create_unit(spec("sampled", &["sleep", "30"]))
        .await
        .unwrap();
    with_timeout(async {
        while executor.get_unit("sampled", "default").await.unwrap().phase != Phase::Running {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;

    let sample = executor.unit_metrics("sampled", "default").await.unwrap();
    assert_eq!(sample.name, "sampled");
    assert!(sample.memory_bytes > 0);

    executor.delete_unit("sampled", "default").await.unwrap();
    assert!(matches!(
        executor.unit_metrics("sampled", "default").await,
        Err(PodflowError::UnitNotFound(_))
    ));
}

#[tokio::test]
async fn finished_process_has_nothing_to_sample() {
    let executor = LocalProcessExecutor::new();
    executor
        .create_unit(spec("done", &["sh", "-c", "exit 0"]))
        .await
        .unwrap();
    with_timeout(async {
        while executor.get_unit("done", "default").await.unwrap().phase != Phase::Succeeded {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;

    assert!(matches!(
        executor.unit_metrics("done", "default").await,
        Err(PodflowError::UnitNotFound(_))
    ));
}

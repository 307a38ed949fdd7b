// tests/monitor.rs

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use podflow::events::EventChannelRegistry;
use podflow::exec::{ContainerSpec, Executor, UnitSpec};
use podflow::run::RunMonitor;
use podflow::types::{Phase, RestartPolicy};
use podflow_test_utils::fake_executor::FakeExecutor;
use podflow_test_utils::{init_tracing, with_timeout};

fn spec(name: &str) -> UnitSpec {
    let mut labels = BTreeMap::new();
    labels.insert("App".to_string(), "podflow".to_string());
    UnitSpec {
        name: name.to_string(),
        namespace: "default".to_string(),
        labels,
        annotations: BTreeMap::new(),
        container: ContainerSpec {
            name: "task".to_string(),
            image: "busybox".to_string(),
            command: vec!["true".to_string()],
            pull_if_not_present: true,
        },
        restart_policy: RestartPolicy::Never,
        active_deadline_seconds: None,
        service_account: "podflow".to_string(),
        parallelism: 1,
        retries: 0,
    }
}

async fn running_unit(fake: &FakeExecutor, name: &str, logs: &str) {
    fake.create_unit(spec(name)).await.unwrap();
    fake.set_phase(name, Phase::Running);
    fake.set_logs(name, logs);
}

fn monitor(fake: &FakeExecutor, name: &str, with_logs: bool) -> RunMonitor {
    let executor: Arc<dyn Executor> = Arc::new(fake.clone());
    RunMonitor::new(name, "default", executor, with_logs, 3)
}

#[tokio::test]
async fn ready_then_succeeded_flushes_logs_once() {
    init_tracing();
    let fake = FakeExecutor::new();
    running_unit(&fake, "run-c", "hello\nworld\n").await;

    let registry = EventChannelRegistry::new();
    let group = registry.add_group("run-c");
    group.ready.publish(Phase::Running);
    group.update.publish(Phase::Succeeded);

    let m = monitor(&fake, "run-c", true);
    with_timeout(m.run(Arc::clone(&group))).await;

    assert_eq!(m.phase(), Phase::Succeeded);
    assert_eq!(m.captured_logs(), vec!["hello\nworld\n".to_string()]);
}

#[tokio::test]
async fn only_new_output_is_captured_per_flush() {
    let fake = FakeExecutor::new();
    running_unit(&fake, "run-inc", "one\n").await;

    let registry = EventChannelRegistry::new();
    let group = registry.add_group("run-inc");
    let m = Arc::new(monitor(&fake, "run-inc", true));
    let mut live = m.subscribe_logs();

    let task = {
        let m = Arc::clone(&m);
        let group = Arc::clone(&group);
        tokio::spawn(async move { m.run(group).await })
    };

    group.ready.publish(Phase::Running);
    assert_eq!(with_timeout(live.recv()).await.unwrap(), "one\n");

    fake.append_logs("run-inc", "two\n");
    group.update.publish(Phase::Succeeded);
    assert_eq!(with_timeout(live.recv()).await.unwrap(), "two\n");

    with_timeout(task).await.unwrap();
    assert_eq!(m.captured_logs(), vec!["one\n".to_string(), "two\n".to_string()]);
}

#[tokio::test]
async fn terminal_first_observation_flushes_once() {
    let fake = FakeExecutor::new();
    running_unit(&fake, "run-fast", "done\n").await;
    fake.set_phase("run-fast", Phase::Failed);

    let registry = EventChannelRegistry::new();
    let group = registry.add_group("run-fast");
    group.ready.publish(Phase::Failed);

    let m = monitor(&fake, "run-fast", true);
    with_timeout(m.run(group)).await;

    assert_eq!(m.phase(), Phase::Failed);
    assert_eq!(m.captured_logs().len(), 1);
}

#[tokio::test]
async fn remove_before_terminal_marks_failed() {
    let fake = FakeExecutor::new();
    running_unit(&fake, "run-gone", "").await;

    let registry = EventChannelRegistry::new();
    let group = registry.add_group("run-gone");
    group.ready.publish(Phase::Running);

    let m = Arc::new(monitor(&fake, "run-gone", false));
    let task = {
        let m = Arc::clone(&m);
        let group = Arc::clone(&group);
        tokio::spawn(async move { m.run(group).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(m.phase(), Phase::Running);

    group.remove.publish(());
    with_timeout(task).await.unwrap();
    assert_eq!(m.phase(), Phase::Failed);
}

#[tokio::test]
async fn remove_with_pending_terminal_update_keeps_the_update() {
    let fake = FakeExecutor::new();
    running_unit(&fake, "run-race", "").await;

    let registry = EventChannelRegistry::new();
    let group = registry.add_group("run-race");
    group.ready.publish(Phase::Running);

    let m = Arc::new(monitor(&fake, "run-race", false));
    let task = {
        let m = Arc::clone(&m);
        let group = Arc::clone(&group);
        tokio::spawn(async move { m.run(group).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;

    group.update.publish(Phase::Succeeded);
    group.remove.publish(());
    with_timeout(task).await.unwrap();
    assert_eq!(m.phase(), Phase::Succeeded);
}

#[tokio::test]
async fn log_failures_do_not_fail_the_run() {
    let fake = FakeExecutor::new();
    running_unit(&fake, "run-quiet", "lost\n").await;
    fake.fail_log_reads(100);

    let registry = EventChannelRegistry::new();
    let group = registry.add_group("run-quiet");
    group.ready.publish(Phase::Running);
    group.update.publish(Phase::Succeeded);

    let m = monitor(&fake, "run-quiet", true);
    with_timeout(m.run(group)).await;

    assert_eq!(m.phase(), Phase::Succeeded);
    assert!(m.captured_logs().is_empty());
}

#[tokio::test]
async fn transient_log_failures_are_retried() {
    let fake = FakeExecutor::new();
    running_unit(&fake, "run-flaky", "eventually\n").await;
    fake.fail_log_reads(2);

    let registry = EventChannelRegistry::new();
    let group = registry.add_group("run-flaky");
    group.ready.publish(Phase::Succeeded);

    let m = monitor(&fake, "run-flaky", true);
    with_timeout(m.run(group)).await;

    assert_eq!(m.captured_logs(), vec!["eventually\n".to_string()]);
}

#[tokio::test]
async fn wait_for_done_releases_every_waiter() {
    let fake = FakeExecutor::new();
    running_unit(&fake, "run-wait", "").await;

    let registry = EventChannelRegistry::new();
    let group = registry.add_group("run-wait");
    group.ready.publish(Phase::Succeeded);

    let m = monitor(&fake, "run-wait", false);
    m.run(group).await;
    with_timeout(m.wait_for_done()).await;
    with_timeout(m.wait_for_done()).await;
}

#[tokio::test]
async fn missing_container_falls_back_to_previous_logs() {
    init_tracing();
    let fake = FakeExecutor::new();
    // The unit never left Pending from the executor's point of view, so only
    // the previous container's output can be read.
    fake.create_unit(spec("run-prev")).await.unwrap();
    fake.set_logs("run-prev", "left behind\n");

    let registry = EventChannelRegistry::new();
    let group = registry.add_group("run-prev");
    group.ready.publish(Phase::Running);
    group.update.publish(Phase::Failed);

    let m = monitor(&fake, "run-prev", true);
    with_timeout(m.run(Arc::clone(&group))).await;

    assert_eq!(fake.phase_of("run-prev"), Some(Phase::Pending));
    assert_eq!(m.phase(), Phase::Failed);
    assert_eq!(m.captured_logs(), vec!["left behind\n".to_string()]);
}

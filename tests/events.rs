// tests/events.rs

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use podflow::errors::PodflowError;
use podflow::events::{EventChannelRegistry, Slot, SlotPolicy, TaskInformer};
use podflow::exec::{Executor, UnitEvent, UnitState};
use podflow::types::Phase;
use podflow_test_utils::fake_executor::FakeExecutor;
use podflow_test_utils::{init_tracing, with_timeout};

fn state(name: &str, phase: Phase) -> UnitState {
    let mut labels = BTreeMap::new();
    labels.insert("App".to_string(), "podflow".to_string());
    UnitState {
        name: name.to_string(),
        namespace: "default".to_string(),
        phase,
        labels,
    }
}

#[test]
fn keep_first_slot_skips_later_publishes() {
    let slot = Slot::new(SlotPolicy::KeepFirst);
    assert!(slot.publish(Phase::Running));
    assert!(!slot.publish(Phase::Succeeded));
    assert_eq!(slot.try_recv(), Some(Phase::Running));
    assert_eq!(slot.try_recv(), None);
}

#[test]
fn keep_latest_slot_supersedes_stale_value() {
    let slot = Slot::new(SlotPolicy::KeepLatest);
    assert!(slot.publish(Phase::Running));
    assert!(slot.publish(Phase::Succeeded));
    assert_eq!(slot.try_recv(), Some(Phase::Succeeded));
    assert!(!slot.is_full());
}

#[tokio::test]
async fn recv_waits_for_a_publish() {
    let slot = Arc::new(Slot::new(SlotPolicy::KeepLatest));
    let publisher = Arc::clone(&slot);
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        publisher.publish(Phase::Failed);
    });
    assert_eq!(with_timeout(slot.recv()).await, Phase::Failed);
}

#[tokio::test]
async fn publish_before_recv_is_not_lost() {
    let slot = Slot::new(SlotPolicy::KeepFirst);
    slot.publish(Phase::Running);
    assert_eq!(with_timeout(slot.recv()).await, Phase::Running);
}

#[test]
fn registry_round_trip() {
    let registry = EventChannelRegistry::new();
    assert!(registry.is_empty());

    registry.add_group("run-a");
    assert!(registry.contains("run-a"));
    assert!(registry.get_group("run-a").is_ok());
    assert_eq!(registry.len(), 1);

    registry.remove_group("run-a");
    assert!(!registry.contains("run-a"));
    assert!(matches!(
        registry.get_group("run-a"),
        Err(PodflowError::ChannelGroupMissing(id)) if id == "run-a"
    ));
}

#[test]
fn add_group_replaces_existing() {
    let registry = EventChannelRegistry::new();
    let first = registry.add_group("run-a");
    first.ready.publish(Phase::Running);

    let second = registry.add_group("run-a");
    assert!(!second.ready.is_full());
    assert!(Arc::ptr_eq(&second, &registry.get_group("run-a").unwrap()));
    assert_eq!(registry.len(), 1);
}

#[test]
fn bridge_routes_add_update_delete() {
    let registry = Arc::new(EventChannelRegistry::new());
    let executor: Arc<dyn Executor> = Arc::new(FakeExecutor::new());
    let informer = TaskInformer::new(executor, Arc::clone(&registry));
    let group = registry.add_group("run-a");

    // Pending is not ready to log.
    informer.handle(&UnitEvent::Added(state("run-a", Phase::Pending)));
    assert!(!group.ready.is_full());

    informer.handle(&UnitEvent::Updated {
        old: state("run-a", Phase::Pending),
        new: state("run-a", Phase::Running),
    });
    assert_eq!(group.ready.try_recv(), Some(Phase::Running));
    assert_eq!(group.update.try_recv(), Some(Phase::Running));

    // Same phase: ready again, but no update.
    informer.handle(&UnitEvent::Updated {
        old: state("run-a", Phase::Running),
        new: state("run-a", Phase::Running),
    });
    assert!(!group.update.is_full());

    informer.handle(&UnitEvent::Deleted(state("run-a", Phase::Running)));
    assert_eq!(group.remove.try_recv(), Some(()));
}

#[test]
fn bridge_ignores_units_without_group() {
    let registry = Arc::new(EventChannelRegistry::new());
    let executor: Arc<dyn Executor> = Arc::new(FakeExecutor::new());
    let informer = TaskInformer::new(executor, Arc::clone(&registry));

    informer.handle(&UnitEvent::Added(state("stranger", Phase::Running)));
    informer.handle(&UnitEvent::Deleted(state("stranger", Phase::Running)));
    assert!(registry.is_empty());
}

#[tokio::test]
async fn spawned_bridge_forwards_executor_events_until_stopped() {
    init_tracing();
    let registry = Arc::new(EventChannelRegistry::new());
    let fake = FakeExecutor::new();
    let executor: Arc<dyn Executor> = Arc::new(fake.clone());
    let (stop_tx, stop_rx) = tokio::sync::watch::channel(false);

    let handle = TaskInformer::new(executor, Arc::clone(&registry))
        .spawn(stop_rx)
        .await
        .unwrap();

    let group = registry.add_group("run-b");
    fake.push_event(UnitEvent::Added(state("run-b", Phase::Running)));
    assert_eq!(with_timeout(group.ready.recv()).await, Phase::Running);

    stop_tx.send(true).unwrap();
    with_timeout(handle).await.unwrap();
}

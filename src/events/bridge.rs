// src/events/bridge.rs

//! Translates executor unit events into per-run channel publishes.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::errors::Result;
use crate::events::registry::EventChannelRegistry;
use crate::exec::{Executor, Selector, UnitEvent};

/// Watches every podflow unit and routes its events to the matching run.
///
/// Units without a channel group (runs started by another process, or runs
/// whose monitor already finished) are ignored.
pub struct TaskInformer {
    executor: Arc<dyn Executor>,
    registry: Arc<EventChannelRegistry>,
}

impl TaskInformer {
    pub fn new(executor: Arc<dyn Executor>, registry: Arc<EventChannelRegistry>) -> Self {
        Self { executor, registry }
    }

    /// Route a single event.
    pub fn handle(&self, event: &UnitEvent) {
        match event {
            UnitEvent::Added(state) => {
                let Ok(group) = self.registry.get_group(&state.name) else {
                    return;
                };
                if state.phase.is_ready_to_log() {
                    group.ready.publish(state.phase);
                }
            }
            UnitEvent::Updated { old, new } => {
                let Ok(group) = self.registry.get_group(&new.name) else {
                    return;
                };
                if new.phase.is_ready_to_log() {
                    group.ready.publish(new.phase);
                }
                if old.phase != new.phase {
                    debug!(run = %new.name, from = %old.phase, to = %new.phase, "unit phase changed");
                    group.update.publish(new.phase);
                }
            }
            UnitEvent::Deleted(state) => {
                info!(run = %state.name, phase = %state.phase, "unit deleted");
                if let Ok(group) = self.registry.get_group(&state.name) {
                    group.remove.publish(());
                }
            }
        }
    }

    /// Subscribe to the executor and route events on a background task until
    /// `stop` flips to `true` or the event stream ends.
    pub async fn spawn(self, mut stop: watch::Receiver<bool>) -> Result<JoinHandle<()>> {
        let mut events: mpsc::Receiver<UnitEvent> =
            self.executor.subscribe(Selector::app()).await?;
        info!("unit event bridge started");

        Ok(tokio::spawn(async move {
            loop {
                if *stop.borrow() {
                    break;
                }
                tokio::select! {
                    maybe = events.recv() => {
                        match maybe {
                            Some(event) => self.handle(&event),
                            None => {
                                warn!("unit event stream closed; bridge exiting");
                                break;
                            }
                        }
                    }
                    changed = stop.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
            }
            info!("unit event bridge stopped");
        }))
    }
}

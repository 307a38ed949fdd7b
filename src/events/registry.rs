// src/events/registry.rs

//! Per-run channel groups, keyed by run name.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::debug;

use crate::errors::{PodflowError, Result};
use crate::events::slot::{Slot, SlotPolicy};
use crate::types::Phase;

/// The three mailboxes a run's monitor consumes.
///
/// - `ready`: the first observation of a phase at which logs can be read.
/// - `update`: the latest phase change.
/// - `remove`: the unit has been deleted.
#[derive(Debug)]
pub struct ChannelGroup {
    pub ready: Slot<Phase>,
    pub update: Slot<Phase>,
    pub remove: Slot<()>,
}

impl ChannelGroup {
    pub fn new() -> Self {
        Self {
            ready: Slot::new(SlotPolicy::KeepFirst),
            update: Slot::new(SlotPolicy::KeepLatest),
            remove: Slot::new(SlotPolicy::KeepLatest),
        }
    }
}

impl Default for ChannelGroup {
    fn default() -> Self {
        Self::new()
    }
}

/// Map from run name to its [`ChannelGroup`].
#[derive(Debug, Default)]
pub struct EventChannelRegistry {
    groups: RwLock<HashMap<String, Arc<ChannelGroup>>>,
}

impl EventChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a fresh group for `id`, replacing any previous one.
    pub fn add_group(&self, id: &str) -> Arc<ChannelGroup> {
        let group = Arc::new(ChannelGroup::new());
        let previous = self
            .groups
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id.to_string(), Arc::clone(&group));
        if previous.is_some() {
            debug!(run = %id, "replaced existing channel group");
        }
        group
    }

    pub fn remove_group(&self, id: &str) {
        self.groups
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id);
    }

    pub fn contains(&self, id: &str) -> bool {
        self.groups
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(id)
    }

    pub fn get_group(&self, id: &str) -> Result<Arc<ChannelGroup>> {
        self.groups
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
            .ok_or_else(|| PodflowError::ChannelGroupMissing(id.to_string()))
    }

    pub fn len(&self) -> usize {
        self.groups
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

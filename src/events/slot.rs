// src/events/slot.rs

//! Single-slot mailbox.

use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::Notify;

/// What happens when a value is published into an occupied slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotPolicy {
    /// The value already in the slot stays; the new one is skipped.
    KeepFirst,
    /// The new value replaces the stale one.
    KeepLatest,
}

/// Holds at most one value for exactly one consumer.
///
/// Publishing never blocks. The consumer waits on [`Slot::recv`], which
/// takes the value out and leaves the slot empty for the next publish.
#[derive(Debug)]
pub struct Slot<T> {
    value: Mutex<Option<T>>,
    notify: Notify,
    policy: SlotPolicy,
}

impl<T> Slot<T> {
    pub fn new(policy: SlotPolicy) -> Self {
        Self {
            value: Mutex::new(None),
            notify: Notify::new(),
            policy,
        }
    }

    fn guard(&self) -> MutexGuard<'_, Option<T>> {
        self.value.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store `value` according to the slot policy. Returns `false` when the
    /// value was skipped because the slot was full.
    pub fn publish(&self, value: T) -> bool {
        {
            let mut slot = self.guard();
            if slot.is_some() && self.policy == SlotPolicy::KeepFirst {
                return false;
            }
            *slot = Some(value);
        }
        self.notify.notify_one();
        true
    }

    /// Take the current value without waiting.
    pub fn try_recv(&self) -> Option<T> {
        self.guard().take()
    }

    /// Wait until a value is available and take it.
    pub async fn recv(&self) -> T {
        loop {
            if let Some(value) = self.try_recv() {
                return value;
            }
            // `notify_one` stores a permit when nobody is waiting, so a
            // publish between the check above and this await is not lost.
            self.notify.notified().await;
        }
    }

    pub fn is_full(&self) -> bool {
        self.guard().is_some()
    }

    pub fn policy(&self) -> SlotPolicy {
        self.policy
    }
}

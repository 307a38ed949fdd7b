// src/events/mod.rs

//! Event routing between the executor and run monitors.
//!
//! - [`slot`] implements the single-slot mailbox.
//! - [`registry`] keeps one [`ChannelGroup`] per live run.
//! - [`bridge`] turns executor unit events into publishes on those groups.

pub mod bridge;
pub mod registry;
pub mod slot;

pub use bridge::TaskInformer;
pub use registry::{ChannelGroup, EventChannelRegistry};
pub use slot::{Slot, SlotPolicy};

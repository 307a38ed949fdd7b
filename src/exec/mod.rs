// src/exec/mod.rs

//! Execution layer.
//!
//! Everything podflow knows about the substrate that actually runs work goes
//! through the [`Executor`] trait.
//!
//! - [`backend`] defines the `Executor` trait.
//! - [`unit`] holds the value types exchanged with an executor (unit specs,
//!   states, events, selectors).
//! - [`local`] provides `LocalProcessExecutor`, which runs every unit as a
//!   local process.
//! - [`unit_runner`] drives a single local process.
//! - [`usage`] samples memory and CPU of a local process.
//! - [`cleanup`] removes every unit podflow created.

pub mod backend;
pub mod cleanup;
pub mod local;
pub mod unit;
pub(crate) mod unit_runner;
pub mod usage;

pub use backend::{ExecFuture, Executor};
pub use cleanup::cleanup_environment;
pub use local::LocalProcessExecutor;
pub use unit::{
    ContainerSpec, LogOptions, LogStream, Selector, UnitEvent, UnitHandle, UnitMetrics, UnitSpec,
    UnitState,
};

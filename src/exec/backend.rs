// src/exec/backend.rs

//! Pluggable executor abstraction.
//!
//! The scheduling core talks to an `Executor` instead of a concrete cluster
//! client. Production uses [`LocalProcessExecutor`](super::LocalProcessExecutor)
//! (or any cluster-backed implementation); tests provide a fake that lets
//! them script unit phases and logs.

use std::future::Future;
use std::pin::Pin;

use tokio::sync::mpsc;

use crate::errors::Result;
use crate::exec::unit::{
    LogOptions, LogStream, Selector, UnitEvent, UnitHandle, UnitMetrics, UnitSpec, UnitState,
};

/// Boxed future returned by [`Executor`] methods.
pub type ExecFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// The execution substrate units run on.
///
/// Error conventions:
/// - `delete_unit`, `get_unit`, `read_logs` and `unit_metrics` fail with
///   [`PodflowError::UnitNotFound`](crate::errors::PodflowError::UnitNotFound)
///   when the unit (or, for logs, its container) does not exist.
/// - `create_unit` fails with `UnitCreate`.
pub trait Executor: Send + Sync {
    fn create_unit(&self, spec: UnitSpec) -> ExecFuture<'_, UnitHandle>;

    fn delete_unit<'a>(&'a self, name: &'a str, namespace: &'a str) -> ExecFuture<'a, ()>;

    fn get_unit<'a>(&'a self, name: &'a str, namespace: &'a str) -> ExecFuture<'a, UnitState>;

    fn list_units<'a>(&'a self, selector: &'a Selector) -> ExecFuture<'a, Vec<UnitState>>;

    /// Open a stream over the unit's output as of now.
    fn read_logs<'a>(
        &'a self,
        name: &'a str,
        namespace: &'a str,
        options: LogOptions,
    ) -> ExecFuture<'a, LogStream>;

    /// Subscribe to add/update/delete notifications for units matching
    /// `selector`. The subscription ends when the receiver is dropped.
    fn subscribe(&self, selector: Selector) -> ExecFuture<'_, mpsc::Receiver<UnitEvent>>;

    /// Sample the current resource usage of a running unit. A unit that is
    /// not running has nothing to sample and reports `UnitNotFound`.
    fn unit_metrics<'a>(
        &'a self,
        name: &'a str,
        namespace: &'a str,
    ) -> ExecFuture<'a, UnitMetrics>;

    /// Make sure the identity `name` exists in `namespace`, creating it if
    /// needed.
    fn ensure_identity<'a>(&'a self, name: &'a str, namespace: &'a str) -> ExecFuture<'a, ()>;
}

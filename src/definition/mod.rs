// src/definition/mod.rs

//! Workload definitions.
//!
//! A definition is the user-supplied description of a recurring workload:
//! what to run (image, command, limits), when (schedule, start/end window)
//! and how many runs may be active at once.
//!
//! - [`model`] holds the [`WorkloadDefinition`] shape and its validation.
//! - [`source`] provides the [`DefinitionSource`] abstraction and the
//!   folder-backed implementation used in production.

pub mod model;
pub mod source;

pub use model::{NAME_PATTERN, WorkloadDefinition, parse_date_time};
pub use source::{DefinitionSource, FolderDefinitionSource, LoadedDefinition};

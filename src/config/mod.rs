// src/config/mod.rs

//! Process configuration.
//!
//! - [`model`] holds the raw TOML shape and the validated [`AppConfig`].
//! - [`loader`] reads the file from disk.
//! - [`validate`] turns a [`RawAppConfig`] into an [`AppConfig`].
//! - [`duration`] parses the short duration strings used in the config.

pub mod duration;
pub mod loader;
pub mod model;
pub mod validate;

pub use duration::parse_duration;
pub use loader::{default_config_path, load_and_validate, load_from_path};
pub use model::{
    AppConfig, DefaultsSection, RawAppConfig, RecorderSection, SchedulerSection,
    SchedulerSettings, WorkloadDefaults,
};

// src/definition/source.rs

//! Where workload definitions come from.

use std::fmt::Debug;
use std::fs;
use std::path::{Path, PathBuf};

use globset::{Glob, GlobSet, GlobSetBuilder};
use tracing::{debug, error, warn};

use crate::config::WorkloadDefaults;
use crate::definition::model::WorkloadDefinition;
use crate::errors::{PodflowError, Result};

/// Glob matched (relative to the definition folder) by definition files.
pub const DEFINITION_GLOB: &str = "**/*.json";

/// A definition together with the raw text it was parsed from.
#[derive(Debug, Clone)]
pub struct LoadedDefinition {
    pub definition: WorkloadDefinition,
    /// Raw file contents.
    pub code: String,
    /// blake3 hex digest of `code`; two loads describe the same definition
    /// iff their digests are equal.
    pub digest: String,
    pub path: PathBuf,
}

impl LoadedDefinition {
    pub fn new(definition: WorkloadDefinition, code: String, path: PathBuf) -> Self {
        let digest = digest_code(&code);
        Self {
            definition,
            code,
            digest,
            path,
        }
    }

    /// File extension without the dot, e.g. `"json"`.
    pub fn format(&self) -> String {
        self.path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default()
            .to_string()
    }
}

pub fn digest_code(code: &str) -> String {
    blake3::hash(code.as_bytes()).to_hex().to_string()
}

/// Source of workload definitions consumed by the scheduler.
pub trait DefinitionSource: Send + Sync + Debug {
    /// Current set of valid definitions. Invalid entries are skipped.
    fn load(&self) -> Result<Vec<LoadedDefinition>>;

    /// Whether a definition with this name is already stored.
    fn exists(&self, name: &str) -> bool;

    /// Persist a new definition. Fails with `Conflict` if one with the same
    /// name already exists.
    fn store(&self, definition: &WorkloadDefinition) -> Result<PathBuf>;
}

/// Definitions stored as `*.json` files below a folder.
#[derive(Debug)]
pub struct FolderDefinitionSource {
    root: PathBuf,
    defaults: WorkloadDefaults,
    matcher: GlobSet,
}

impl FolderDefinitionSource {
    pub fn new(root: impl Into<PathBuf>, defaults: WorkloadDefaults) -> Result<Self> {
        let glob = Glob::new(DEFINITION_GLOB)
            .map_err(|e| PodflowError::ConfigError(format!("definition glob: {e}")))?;
        let matcher = GlobSetBuilder::new()
            .add(glob)
            .build()
            .map_err(|e| PodflowError::ConfigError(format!("definition glob: {e}")))?;
        Ok(Self {
            root: root.into(),
            defaults,
            matcher,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, name: &str) -> PathBuf {
        self.root.join(format!("{name}.json"))
    }

    fn collect_files(&self, dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_dir() {
                self.collect_files(&path, out)?;
                continue;
            }
            let rel = path.strip_prefix(&self.root).unwrap_or(&path);
            if self.matcher.is_match(rel) {
                out.push(path);
            }
        }
        Ok(())
    }

    fn load_file(&self, path: &Path) -> Result<LoadedDefinition> {
        let code = fs::read_to_string(path)?;
        let mut definition: WorkloadDefinition = serde_json::from_str(&code)?;
        definition.apply_defaults(&self.defaults);
        definition.validate()?;
        Ok(LoadedDefinition::new(definition, code, path.to_path_buf()))
    }
}

impl DefinitionSource for FolderDefinitionSource {
    fn load(&self) -> Result<Vec<LoadedDefinition>> {
        if !self.root.is_dir() {
            warn!(path = ?self.root, "definition folder not found");
            return Ok(Vec::new());
        }

        let mut files = Vec::new();
        self.collect_files(&self.root, &mut files)?;
        files.sort();

        let mut loaded = Vec::with_capacity(files.len());
        for file in files {
            match self.load_file(&file) {
                Ok(def) => {
                    debug!(path = ?file, workload = %def.definition.name, "loaded definition");
                    loaded.push(def);
                }
                Err(PodflowError::IoError(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                    error!(path = ?file, "definition file no longer exists");
                }
                Err(e) => {
                    error!(path = ?file, error = %e, "skipping invalid definition file");
                }
            }
        }
        Ok(loaded)
    }

    fn exists(&self, name: &str) -> bool {
        self.path_for(name).exists()
    }

    fn store(&self, definition: &WorkloadDefinition) -> Result<PathBuf> {
        definition.validate_name()?;
        let mut resolved = definition.clone();
        resolved.apply_defaults(&self.defaults);
        resolved.validate()?;

        let path = self.path_for(&definition.name);
        if path.parent() != Some(self.root.as_path()) {
            return Err(PodflowError::Validation(format!(
                "workload name '{}' escapes the definition folder",
                definition.name
            )));
        }
        if path.exists() {
            return Err(PodflowError::Conflict(format!(
                "a definition named '{}' is already present",
                definition.name
            )));
        }

        fs::create_dir_all(&self.root)?;
        fs::write(&path, definition.to_json_pretty()?)?;
        debug!(path = ?path, workload = %definition.name, "stored definition");
        Ok(path)
    }
}

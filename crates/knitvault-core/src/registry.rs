/*
 * registry.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Registry of built-in and external transform modules.
 */

//! Module registry.
//!
//! Maps module names to factories. Built-in modules are compiled in;
//! external modules are executables found in a modules directory and run
//! out of process (see [`crate::transforms::external`]).

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::pipeline::ModuleRecord;
use crate::transform::{ModuleConfig, RunArguments, TransformModule};
use crate::transforms::{self, external::ExternalModule};
use crate::{Error, Result};

/// Constructor for a built-in module from its merged configuration.
pub type ModuleBuilder = fn(&ModuleConfig) -> Result<Box<dyn TransformModule>>;

/// A compiled-in module.
#[derive(Clone, Copy)]
pub struct ModuleFactory {
    pub name: &'static str,
    /// Family file the module belongs to
    pub family: &'static str,
    /// Keys the module takes from the run-wide arguments
    pub accepted_args: &'static [&'static str],
    pub build: ModuleBuilder,
}

impl std::fmt::Debug for ModuleFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleFactory")
            .field("name", &self.name)
            .field("family", &self.family)
            .field("accepted_args", &self.accepted_args)
            .finish()
    }
}

/// Where a registered module comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleSource {
    Builtin { family: &'static str },
    External { path: PathBuf },
}

/// Listing entry for a registered module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleDescription {
    pub name: String,
    pub source: ModuleSource,
}

#[derive(Debug, Clone, Default)]
pub struct ModuleRegistry {
    builtins: BTreeMap<&'static str, ModuleFactory>,
    external: BTreeMap<String, PathBuf>,
}

impl ModuleRegistry {
    /// Registry holding every built-in module.
    pub fn builtin() -> Self {
        let mut registry = Self::default();
        for factory in transforms::builtin_factories() {
            registry.builtins.insert(factory.name, factory);
        }
        registry
    }

    /// Builtins plus every executable file in `dir`, registered under its
    /// file stem. A missing directory registers nothing. Built-in names
    /// cannot be shadowed.
    pub fn with_external_dir(dir: &Path) -> Result<Self> {
        let mut registry = Self::builtin();
        if !dir.is_dir() {
            return Ok(registry);
        }
        let entries = std::fs::read_dir(dir).map_err(|e| Error::io(dir, e))?;
        for entry in entries {
            let path = entry.map_err(|e| Error::io(dir, e))?.path();
            if !path.is_file() || !is_executable(&path) {
                continue;
            }
            let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if registry.builtins.contains_key(name) {
                tracing::warn!(module = name, path = %path.display(), "External module shadows a built-in, ignoring");
                continue;
            }
            tracing::debug!(module = name, path = %path.display(), "Registered external module");
            registry.external.insert(name.to_string(), path);
        }
        Ok(registry)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.builtins.contains_key(name) || self.external.contains_key(name)
    }

    /// All registered names, builtins first, each group sorted.
    pub fn names(&self) -> Vec<String> {
        self.builtins
            .keys()
            .map(|s| s.to_string())
            .chain(self.external.keys().cloned())
            .collect()
    }

    pub fn describe(&self) -> Vec<ModuleDescription> {
        let builtins = self.builtins.values().map(|f| ModuleDescription {
            name: f.name.to_string(),
            source: ModuleSource::Builtin { family: f.family },
        });
        let external = self.external.iter().map(|(name, path)| ModuleDescription {
            name: name.clone(),
            source: ModuleSource::External { path: path.clone() },
        });
        builtins.chain(external).collect()
    }

    /// Instantiate the module a record names.
    ///
    /// Configuration is the record's `config` with run-wide arguments
    /// overriding the keys the module declares. Missing keys take the
    /// module's defaults.
    pub fn instantiate(
        &self,
        record: &ModuleRecord,
        args: &RunArguments,
    ) -> Result<Box<dyn TransformModule>> {
        let name = record.module_name.as_str();
        if let Some(factory) = self.builtins.get(name) {
            let config = merge_config(&record.config, args, factory.accepted_args);
            return (factory.build)(&config);
        }
        if let Some(path) = self.external.get(name) {
            // External modules cannot declare keys, so they see every
            // run-wide argument not already set by the record.
            let mut config = record.config.clone();
            for (key, value) in args.iter() {
                config.entry(key.clone()).or_insert_with(|| value.clone());
            }
            return Ok(Box::new(ExternalModule::new(name, path.clone(), config)));
        }
        Err(Error::Pipeline(format!("unknown module '{}'", name)))
    }
}

fn merge_config(config: &ModuleConfig, args: &RunArguments, accepted: &[&str]) -> ModuleConfig {
    let mut merged = config.clone();
    for key in accepted {
        if let Some(value) = args.get(key) {
            merged.insert((*key).to_string(), value.clone());
        }
    }
    merged
}

/// Decode a module configuration into its typed form.
pub(crate) fn decode_config<T: serde::de::DeserializeOwned>(
    module: &str,
    config: &ModuleConfig,
) -> Result<T> {
    serde_json::from_value(Value::Object(config.clone())).map_err(|e| Error::ModuleConfig {
        module: module.to_string(),
        message: e.to_string(),
    })
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|m| m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| matches!(e.to_ascii_lowercase().as_str(), "exe" | "bat" | "cmd"))
}

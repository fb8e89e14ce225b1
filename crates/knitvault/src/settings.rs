/*
 * settings.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Persistent settings store for the CLI.
 */

//! Settings store.
//!
//! Everything the CLI remembers between runs lives in one JSON file,
//! `settings.json`, inside the configuration directory. The directory also
//! holds the user's pipeline file and the external module directory.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow, bail};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Current settings format version.
///
/// Increment this when making breaking changes to the settings format.
pub const CURRENT_SETTINGS_VERSION: u32 = 1;

const SETTINGS_FILE: &str = "settings.json";
const PIPELINE_FILE: &str = "pipeline.json";
const MODULES_DIR: &str = "modules";

/// Locations inside the configuration directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigPaths {
    root: PathBuf,
}

impl ConfigPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Use `explicit` when given, else the platform configuration directory.
    pub fn resolve(explicit: Option<PathBuf>) -> Result<Self> {
        if let Some(root) = explicit {
            return Ok(Self::new(root));
        }
        let dirs = ProjectDirs::from("com", "Posit", "knitvault")
            .ok_or_else(|| anyhow!("Could not determine the configuration directory"))?;
        Ok(Self::new(dirs.config_dir()))
    }

    pub fn settings_file(&self) -> PathBuf {
        self.root.join(SETTINGS_FILE)
    }

    /// User pipeline, replacing the built-in one when present.
    pub fn pipeline_file(&self) -> PathBuf {
        self.root.join(PIPELINE_FILE)
    }

    /// Directory scanned for external transform modules.
    pub fn modules_dir(&self) -> PathBuf {
        self.root.join(MODULES_DIR)
    }
}

/// What the last successful conversion used.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunState {
    /// Selected output formats, in selection order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub formats: Vec<String>,

    /// Format name to raw parameter values
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub values: BTreeMap<String, BTreeMap<String, String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_note: Option<PathBuf>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_output_dir: Option<PathBuf>,
}

/// Contents of `settings.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Settings format version (for migrations)
    pub version: u32,

    /// Tool name to executable path
    #[serde(default)]
    pub tools: BTreeMap<String, PathBuf>,

    #[serde(default)]
    pub run: RunState,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: CURRENT_SETTINGS_VERSION,
            tools: BTreeMap::new(),
            run: RunState::default(),
        }
    }
}

impl Settings {
    /// Parse settings text, rejecting versions newer than this build.
    pub fn parse(text: &str) -> Result<Self> {
        let settings: Settings =
            serde_json::from_str(text).context("Failed to parse settings")?;
        if settings.version > CURRENT_SETTINGS_VERSION {
            bail!(
                "Settings version {} is newer than the supported version {}",
                settings.version,
                CURRENT_SETTINGS_VERSION
            );
        }
        if settings.version < CURRENT_SETTINGS_VERSION {
            warn!(
                old_version = settings.version,
                new_version = CURRENT_SETTINGS_VERSION,
                "Settings version upgrade needed (not yet implemented)"
            );
        }
        Ok(settings)
    }

    pub fn read_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("Invalid settings file {}", path.display()))
    }

    pub fn write_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))
    }

    /// Load settings, or create and save defaults if none exist yet.
    pub fn load_or_create(paths: &ConfigPaths) -> Result<Self> {
        let path = paths.settings_file();
        if path.exists() {
            debug!(path = %path.display(), "Loading settings");
            Self::read_file(&path)
        } else {
            debug!(path = %path.display(), "Creating settings");
            let settings = Self::default();
            settings.save(paths)?;
            Ok(settings)
        }
    }

    pub fn save(&self, paths: &ConfigPaths) -> Result<()> {
        self.write_file(&paths.settings_file())
    }

    /// Configured path for a tool, if any.
    pub fn tool(&self, name: &str) -> Option<&Path> {
        self.tools.get(name).map(PathBuf::as_path)
    }
}

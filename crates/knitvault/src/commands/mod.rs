//! Command implementations for the knitvault CLI
//!
//! Each command module handles the CLI interface and delegates to
//! knitvault-core for the actual work.

pub mod convert;
pub mod formats;
pub mod processingmodules;
pub mod settings;
pub mod tools;
pub mod version;

use std::path::PathBuf;

use anyhow::{Context, Result};
use knitvault_core::{Catalogue, CatalogueOptions, ModuleRegistry, PipelineConfig};

use crate::settings::ConfigPaths;

/// Options shared by every command.
#[derive(Debug)]
pub struct GlobalOptions {
    pub paths: ConfigPaths,
    /// Pipeline file given on the command line
    pub pipeline: Option<PathBuf>,
    /// Catalogue file given on the command line
    pub catalogue: Option<PathBuf>,
}

impl GlobalOptions {
    /// The catalogue in effect: `--catalogue`, else the built-in one.
    pub fn catalogue(&self) -> Result<Catalogue> {
        match &self.catalogue {
            Some(path) => Catalogue::load(path, &CatalogueOptions::default())
                .with_context(|| format!("Failed to load catalogue {}", path.display())),
            None => Catalogue::embedded().context("Built-in catalogue is invalid"),
        }
    }

    /// The pipeline in effect: `--pipeline`, else the user pipeline in the
    /// configuration directory, else the built-in one.
    pub fn pipeline(&self) -> Result<PipelineConfig> {
        let user = self.paths.pipeline_file();
        let path = match &self.pipeline {
            Some(path) => path.clone(),
            None if user.is_file() => user,
            None => return PipelineConfig::embedded().context("Built-in pipeline is invalid"),
        };
        PipelineConfig::load(&path)
            .with_context(|| format!("Failed to load pipeline {}", path.display()))
    }

    /// Built-in modules plus the external ones installed in the
    /// configuration directory.
    pub fn registry(&self) -> Result<ModuleRegistry> {
        let dir = self.paths.modules_dir();
        ModuleRegistry::with_external_dir(&dir)
            .with_context(|| format!("Failed to scan module directory {}", dir.display()))
    }
}

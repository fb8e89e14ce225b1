/*
 * processingmodules.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Transform module management command implementation.
 */

//! Processing module management.
//!
//! External modules are executables copied into the module directory of
//! the configuration directory. Adding or removing one edits the user
//! pipeline (`pipeline.json` next to the settings), which is created from
//! the pipeline in effect on first change.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::Subcommand;
use knitvault_core::{ModuleRecord, ModuleSource, PipelineConfig};
use tracing::info;

use super::GlobalOptions;

/// `file_name` recorded for externally installed modules.
const EXTERNAL_FAMILY: &str = "external";

#[derive(Subcommand, Debug)]
pub enum ModulesAction {
    /// List known modules and where they sit in the pipeline
    List,
    /// Install an executable as an external module and append it to the pipeline
    Add {
        file: PathBuf,
    },
    /// Remove a module from the pipeline and uninstall it if external
    Remove {
        name: String,
    },
    /// Write the pipeline in effect to FILE
    Export {
        file: PathBuf,
    },
}

pub fn execute(action: ModulesAction, global: &GlobalOptions) -> Result<()> {
    match action {
        ModulesAction::List => list(global),
        ModulesAction::Add { file } => add(&file, global),
        ModulesAction::Remove { name } => remove(&name, global),
        ModulesAction::Export { file } => {
            let json = global.pipeline()?.to_json()?;
            fs::write(&file, json).with_context(|| format!("Failed to write {}", file.display()))
        }
    }
}

fn list(global: &GlobalOptions) -> Result<()> {
    let registry = global.registry()?;
    let pipeline = global.pipeline()?;

    for (index, record) in pipeline.records.iter().enumerate() {
        let state = if !registry.contains(&record.module_name) {
            "unknown"
        } else if record.is_active() {
            "enabled"
        } else {
            "disabled"
        };
        println!("{:>3}  {:<40} {}", index + 1, record.module_name, state);
    }

    let unused: Vec<_> = registry
        .describe()
        .into_iter()
        .filter(|d| !pipeline.records.iter().any(|r| r.module_name == d.name))
        .collect();
    if !unused.is_empty() {
        println!();
        println!("Not in pipeline:");
        for description in unused {
            let source = match &description.source {
                ModuleSource::Builtin { family } => format!("builtin ({})", family),
                ModuleSource::External { path } => path.display().to_string(),
            };
            println!("     {:<40} {}", description.name, source);
        }
    }
    Ok(())
}

fn add(file: &Path, global: &GlobalOptions) -> Result<()> {
    if !file.is_file() {
        bail!("Module executable does not exist: {}", file.display());
    }
    let Some(name) = file.file_stem().and_then(|s| s.to_str()) else {
        bail!("Cannot derive a module name from {}", file.display());
    };
    if global.registry()?.contains(name) {
        bail!("A module named '{}' is already registered", name);
    }
    let Some(file_name) = file.file_name() else {
        bail!("Cannot derive a module name from {}", file.display());
    };

    let dir = global.paths.modules_dir();
    fs::create_dir_all(&dir).with_context(|| format!("Failed to create {}", dir.display()))?;
    let target = dir.join(file_name);
    fs::copy(file, &target)
        .with_context(|| format!("Failed to copy {} to {}", file.display(), target.display()))?;

    let mut pipeline = global.pipeline()?;
    pipeline
        .records
        .push(ModuleRecord::new(EXTERNAL_FAMILY, name));
    save_user_pipeline(&pipeline, global)?;
    info!(module = name, path = %target.display(), "Installed external module");
    Ok(())
}

fn remove(name: &str, global: &GlobalOptions) -> Result<()> {
    let registry = global.registry()?;
    let mut pipeline = global.pipeline()?;
    let before = pipeline.records.len();
    pipeline.records.retain(|r| r.module_name != name);
    let dropped = before - pipeline.records.len();

    let installed = registry.describe().into_iter().find_map(|d| match d.source {
        ModuleSource::External { path } if d.name == name => Some(path),
        _ => None,
    });

    if dropped == 0 && installed.is_none() {
        bail!("Module '{}' is neither in the pipeline nor installed", name);
    }
    if dropped > 0 {
        save_user_pipeline(&pipeline, global)?;
    }
    if let Some(path) = installed {
        fs::remove_file(&path)
            .with_context(|| format!("Failed to remove {}", path.display()))?;
    }
    info!(module = name, records = dropped, "Removed module");
    Ok(())
}

fn save_user_pipeline(pipeline: &PipelineConfig, global: &GlobalOptions) -> Result<()> {
    let path = global.paths.pipeline_file();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    fs::write(&path, pipeline.to_json()?)
        .with_context(|| format!("Failed to write {}", path.display()))
}

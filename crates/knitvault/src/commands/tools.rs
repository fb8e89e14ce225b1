/*
 * tools.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Tool registry command implementation.
 */

//! Tools command implementation.
//!
//! The tool registry maps tool names to executables. `convert` looks up
//! the renderer under the name `quarto`; unregistered tools are searched
//! on `PATH`.

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Subcommand;
use tracing::info;

use super::GlobalOptions;
use crate::settings::Settings;

#[derive(Subcommand, Debug)]
pub enum ToolsAction {
    /// Register the executable for a tool
    Set {
        name: String,
        path: PathBuf,
    },
    /// Forget a tool's executable
    Unset {
        name: String,
    },
    /// List registered tools
    List,
}

pub fn execute(action: ToolsAction, global: &GlobalOptions) -> Result<()> {
    let mut settings = Settings::load_or_create(&global.paths)?;

    match action {
        ToolsAction::Set { name, path } => {
            if !path.is_file() {
                bail!("Tool executable does not exist: {}", path.display());
            }
            let path = std::path::absolute(&path)
                .with_context(|| format!("Failed to resolve {}", path.display()))?;
            info!(tool = %name, path = %path.display(), "Registered tool");
            settings.tools.insert(name, path);
            settings.save(&global.paths)?;
        }
        ToolsAction::Unset { name } => {
            if settings.tools.remove(&name).is_none() {
                bail!("Tool '{}' is not registered", name);
            }
            settings.save(&global.paths)?;
        }
        ToolsAction::List => {
            for (name, path) in &settings.tools {
                println!("{}\t{}", name, path.display());
            }
        }
    }
    Ok(())
}

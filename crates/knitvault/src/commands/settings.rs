/*
 * settings.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Export and import of the settings store.
 */

use std::path::Path;

use anyhow::Result;
use tracing::info;

use super::GlobalOptions;
use crate::settings::Settings;

/// Write the current settings to `file`.
pub fn export(file: &Path, global: &GlobalOptions) -> Result<()> {
    let settings = Settings::load_or_create(&global.paths)?;
    settings.write_file(file)?;
    info!(file = %file.display(), "Exported settings");
    Ok(())
}

/// Replace the settings store with the contents of `file`.
pub fn import(file: &Path, global: &GlobalOptions) -> Result<()> {
    let settings = Settings::read_file(file)?;
    settings.save(&global.paths)?;
    info!(file = %file.display(), "Imported settings");
    Ok(())
}

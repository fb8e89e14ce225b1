/*
 * formats.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Formats command implementation.
 */

//! Formats command implementation

use anyhow::Result;

use super::GlobalOptions;
use crate::settings::Settings;

/// Basename substituted for `%name%` when none is given.
const DEFAULT_WRAPPER_NAME: &str = "index";

/// Print every catalogue format, one per line, marking disabled ones.
pub fn execute(global: &GlobalOptions) -> Result<()> {
    let catalogue = global.catalogue()?;
    for format in catalogue.formats() {
        let state = if format.enabled { "enabled" } else { "disabled" };
        println!(
            "{:<32} {:<9} .{}",
            format.name, state, format.meta.filesuffix
        );
    }
    Ok(())
}

/// Print the rendering call for `name`, configured with the values saved
/// by the last conversion.
pub fn wrapper(name: &str, output_name: Option<&str>, global: &GlobalOptions) -> Result<()> {
    let settings = Settings::load_or_create(&global.paths)?;
    let mut format = global.catalogue()?.select(name)?;
    if let Some(saved) = settings.run.values.get(name) {
        format.apply_values(saved)?;
    }
    let basename = output_name.unwrap_or(DEFAULT_WRAPPER_NAME);
    println!("{}", format.wrapper_string(basename)?);
    Ok(())
}

/*
 * resource_log.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Per-run resource log.
 */

//! Per-run resource log.
//!
//! Records what a run touched: modules that modified the document,
//! dependencies that were staged, formats that were rendered. The log is an
//! explicit value handed to the pipeline, the dependency resolver and the
//! dispatcher; it is `Sync` so parallel render tasks can append to it.

use std::fmt::Write as _;
use std::path::Path;
use std::sync::Mutex;

use crate::{Error, Result};

/// A single resource log entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceEntry {
    /// What produced the entry (`module`, `dependency`, `render`, ...)
    pub category: String,
    pub message: String,
}

/// Append-only log of resources used during one run.
#[derive(Debug, Default)]
pub struct ResourceLog {
    entries: Mutex<Vec<ResourceEntry>>,
}

impl ResourceLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry and mirror it to the tracing output.
    pub fn record(&self, category: &str, message: impl Into<String>) {
        let message = message.into();
        tracing::info!(category, "{}", message);
        let entry = ResourceEntry {
            category: category.to_string(),
            message,
        };
        match self.entries.lock() {
            Ok(mut entries) => entries.push(entry),
            Err(poisoned) => poisoned.into_inner().push(entry),
        }
    }

    /// Snapshot of all entries in insertion order.
    pub fn entries(&self) -> Vec<ResourceEntry> {
        match self.entries.lock() {
            Ok(entries) => entries.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Render the log as plain text, one `[category] message` line per entry.
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        for entry in self.entries() {
            let _ = writeln!(out, "[{}] {}", entry.category, entry.message);
        }
        out
    }

    /// Write the log to `path`, creating parent directories.
    pub fn write_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
        }
        std::fs::write(path, self.to_text()).map_err(|e| Error::io(path, e))
    }
}

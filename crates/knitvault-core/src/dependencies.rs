/*
 * dependencies.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Staging of front matter dependencies into the rendering directory.
 */

//! Dependency resolution.
//!
//! The `csl`, `bibliography` and `filters` front matter keys may carry
//! paths relative to the exported note. [`DependencyResolver::resolve`]
//! copies the files they refer to into the working directory `W` and
//! rewrites the keys so the renderer can find them:
//!
//! - absolute values are kept as they are
//! - `filters` values name filter extensions; when the exporter copied an
//!   `_extensions/<...>/<name>` entry, its whole `_extensions/` tree is
//!   copied to `W/_extensions/` and the value is kept
//! - other values are matched against the manifest by path suffix
//!   (relative to the vault folder), copied to `W/<relative>` and replaced
//!   by that path
//!
//! Nothing is ever deleted; re-running overwrites the staged copies.

use std::path::{Path, PathBuf};

use regex::Regex;
use serde_yaml::{Mapping, Value};
use walkdir::WalkDir;

use crate::exporter::ExporterManifest;
use crate::frontmatter;
use crate::resource_log::ResourceLog;
use crate::{Error, Result};

const FILTERS: &str = "filters";
const STAGED_KEYS: &[&str] = &["csl", "bibliography", FILTERS];
const EXTENSIONS_DIR: &str = "_extensions";

pub struct DependencyResolver<'a> {
    files: &'a [PathBuf],
    obsidian_folder: &'a Path,
    working_dir: PathBuf,
}

impl<'a> DependencyResolver<'a> {
    pub fn new(manifest: &'a ExporterManifest, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            files: &manifest.files,
            obsidian_folder: &manifest.paths.obsidian_folder,
            working_dir: working_dir.into(),
        }
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    /// Stage every dependency named in the front matter and return the
    /// rewritten document.
    ///
    /// # Errors
    ///
    /// `UnresolvedDependency` when a relative `csl`/`bibliography` value
    /// matches no manifest entry; `Io` when copying fails.
    pub fn resolve(&self, document: &str, log: &ResourceLog) -> Result<String> {
        let Some(split) = frontmatter::split(document) else {
            return Ok(document.to_string());
        };
        let original = frontmatter::parse_mapping(split.frontmatter)?;
        let mut map = original.clone();
        let mut extensions_staged = false;

        for key in STAGED_KEYS {
            let key_value = Value::String((*key).to_string());
            let Some(value) = map.get(&key_value) else {
                continue;
            };
            let (values, scalar) = match value {
                Value::String(s) => (vec![s.clone()], true),
                Value::Sequence(items) => (
                    items
                        .iter()
                        .filter_map(|v| v.as_str().map(str::to_string))
                        .collect(),
                    false,
                ),
                _ => continue,
            };

            let mut resolved = Vec::with_capacity(values.len());
            for value in values {
                if Path::new(&value).is_absolute() {
                    resolved.push(value);
                } else if *key == FILTERS {
                    if !extensions_staged {
                        extensions_staged = self.stage_filter(&value, log)?;
                    }
                    resolved.push(value);
                } else {
                    resolved.push(self.stage_file(&value, log)?);
                }
            }

            let new_value = if scalar && *key != FILTERS && resolved.len() == 1 {
                Value::String(resolved.remove(0))
            } else {
                Value::Sequence(resolved.into_iter().map(Value::String).collect())
            };
            map.insert(key_value, new_value);
        }

        if map == original {
            return Ok(document.to_string());
        }
        log.record(
            "dependency",
            format!("rewrote front matter keys {}", changed_keys(&original, &map).join(", ")),
        );
        let yaml = frontmatter::emit_mapping(&map)?;
        Ok(split.rebuild(&yaml, split.body))
    }

    /// Copy the exporter's `_extensions/` tree when it contains the named
    /// filter. Returns whether anything was copied.
    fn stage_filter(&self, name: &str, log: &ResourceLog) -> Result<bool> {
        let pattern = format!(r"{}/.*/{}$", EXTENSIONS_DIR, regex::escape(name));
        let Ok(re) = Regex::new(&pattern) else {
            return Ok(false);
        };
        let Some(source) = self.files.iter().find_map(|f| {
            let text = forward_slashes(f);
            re.find(&text)?;
            extensions_root(f)
        }) else {
            tracing::warn!(filter = name, "Filter not found among exported extensions");
            return Ok(false);
        };

        let dest = self.working_dir.join(EXTENSIONS_DIR);
        if !same_file(&source, &dest) {
            copy_tree(&source, &dest)?;
        }
        log.record(
            "dependency",
            format!(
                "copied filter extensions {} -> {}",
                source.display(),
                dest.display()
            ),
        );
        Ok(true)
    }

    /// Copy the manifest file matching `value` to `W/<relative>` and
    /// return the destination path.
    fn stage_file(&self, value: &str, log: &ResourceLog) -> Result<String> {
        let mut wanted = value;
        while let Some(rest) = wanted.strip_prefix("./") {
            wanted = rest;
        }
        let wanted_path = Path::new(wanted);

        let found = self.files.iter().find_map(|f| {
            let relative = f.strip_prefix(self.obsidian_folder).ok()?;
            relative.ends_with(wanted_path).then_some((f, relative))
        });
        let Some((source, relative)) = found else {
            return Err(Error::UnresolvedDependency(value.to_string()));
        };

        let dest = self.working_dir.join(relative);
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
        }
        if !same_file(source, &dest) {
            std::fs::copy(source, &dest).map_err(|e| Error::io(&dest, e))?;
        }
        log.record(
            "dependency",
            format!("staged {} -> {}", source.display(), dest.display()),
        );
        Ok(forward_slashes(&dest))
    }
}

fn forward_slashes(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

/// The `.../_extensions` ancestor of a path.
fn extensions_root(path: &Path) -> Option<PathBuf> {
    path.ancestors()
        .find(|a| a.file_name().is_some_and(|n| n == EXTENSIONS_DIR))
        .map(Path::to_path_buf)
}

fn copy_tree(source: &Path, dest: &Path) -> Result<()> {
    for entry in WalkDir::new(source) {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(source).to_path_buf();
            Error::io(path, e.into())
        })?;
        let Ok(relative) = entry.path().strip_prefix(source) else {
            continue;
        };
        let target = dest.join(relative);
        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target).map_err(|e| Error::io(&target, e))?;
        } else {
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
            }
            if !same_file(entry.path(), &target) {
                std::fs::copy(entry.path(), &target).map_err(|e| Error::io(&target, e))?;
            }
        }
    }
    Ok(())
}

/// Whether two paths name the same existing file or directory. Copying a
/// file onto itself truncates it.
fn same_file(a: &Path, b: &Path) -> bool {
    match (std::fs::canonicalize(a), std::fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

fn changed_keys(before: &Mapping, after: &Mapping) -> Vec<String> {
    STAGED_KEYS
        .iter()
        .filter(|k| frontmatter::get(before, k) != frontmatter::get(after, k))
        .map(|k| k.to_string())
        .collect()
}

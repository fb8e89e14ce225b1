/*
 * exporter.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Loading of the vault exporter's output manifest.
 */

//! The vault exporter leaves behind, under its output directory:
//!
//! ```text
//! <output_root>/<manifest_root>/index/files.json   ordered absolute paths
//! <output_root>/<manifest_root>/index/paths.json   path map
//! ```
//!
//! plus the flattened Markdown note. Everything here is read-only.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::Value;

use crate::{Error, Result};

pub const DEFAULT_MANIFEST_ROOT: &str = "mod";

/// Where to find the exporter's output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExporterLayout {
    pub output_root: PathBuf,
    /// Directory under `output_root` holding `index/`
    pub manifest_root: PathBuf,
    /// Explicit flattened Markdown file, overriding discovery
    pub markdown: Option<PathBuf>,
}

impl ExporterLayout {
    pub fn new(output_root: impl Into<PathBuf>) -> Self {
        Self {
            output_root: output_root.into(),
            manifest_root: PathBuf::from(DEFAULT_MANIFEST_ROOT),
            markdown: None,
        }
    }

    pub fn index_dir(&self) -> PathBuf {
        self.output_root.join(&self.manifest_root).join("index")
    }

    pub fn files_json(&self) -> PathBuf {
        self.index_dir().join("files.json")
    }

    pub fn paths_json(&self) -> PathBuf {
        self.index_dir().join("paths.json")
    }
}

/// The exporter's path map.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ExporterPaths {
    /// Effective root of the exported vault
    pub obsidian_folder: PathBuf,
    /// Absolute path of the exported note
    pub obsidian_entrypoint: PathBuf,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// Loaded exporter output.
#[derive(Debug, Clone, PartialEq)]
pub struct ExporterManifest {
    pub files: Vec<PathBuf>,
    pub paths: ExporterPaths,
    /// The flattened Markdown note
    pub markdown: PathBuf,
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    if !path.is_file() {
        return Err(Error::ManifestMissing(path.to_path_buf()));
    }
    let text = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
    serde_json::from_str(&text).map_err(|e| Error::ManifestParse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

impl ExporterManifest {
    pub fn load(layout: &ExporterLayout) -> Result<Self> {
        let files: Vec<PathBuf> = read_json(&layout.files_json())?;
        let paths: ExporterPaths = read_json(&layout.paths_json())?;
        tracing::debug!(
            files = files.len(),
            folder = %paths.obsidian_folder.display(),
            "Loaded exporter manifest"
        );

        let markdown = match &layout.markdown {
            Some(explicit) => {
                if !explicit.is_file() {
                    return Err(Error::ManifestMissing(explicit.clone()));
                }
                explicit.clone()
            }
            None => locate_markdown(layout, &files, &paths)?,
        };

        Ok(Self {
            files,
            paths,
            markdown,
        })
    }

    pub fn read_markdown(&self) -> Result<String> {
        std::fs::read_to_string(&self.markdown).map_err(|e| Error::io(&self.markdown, e))
    }

    /// Stem of the exported note, used as the default output name.
    pub fn note_name(&self) -> Option<&str> {
        self.paths.obsidian_entrypoint.file_stem()?.to_str()
    }
}

/// Find the flattened note: a manifest `.md` entry inside the output tree
/// with the entrypoint's stem, else `<manifest_root>/<stem>.md`.
fn locate_markdown(
    layout: &ExporterLayout,
    files: &[PathBuf],
    paths: &ExporterPaths,
) -> Result<PathBuf> {
    let stem = paths.obsidian_entrypoint.file_stem();
    let is_note = |p: &Path| {
        p.extension().is_some_and(|e| e == "md") && p.file_stem() == stem && p.is_file()
    };

    if let Some(found) = files
        .iter()
        .find(|p| p.starts_with(&layout.output_root) && is_note(p))
    {
        return Ok(found.clone());
    }

    let fallback = layout
        .output_root
        .join(&layout.manifest_root)
        .join(format!("{}.md", stem.map_or("index".into(), |s| s.to_string_lossy())));
    if fallback.is_file() {
        return Ok(fallback);
    }
    files
        .iter()
        .find(|p| is_note(p))
        .cloned()
        .ok_or(Error::ManifestMissing(fallback))
}

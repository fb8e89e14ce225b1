/*
 * render.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Render dispatch: one renderer invocation per output format.
 */

//! Render dispatch.
//!
//! For every [`RenderJob`] the dispatcher:
//!
//! 1. writes the document to `W/temp_<format-id>.<inputsuffix>`
//! 2. writes the sanitized metadata to `<output_dir>/<format-id>_config.yaml`
//! 3. runs `<renderer> render <temp> --to <filesuffix> --metadata-file
//!    <config> --output <basename>` in `W`
//! 4. copies `W/<basename>` to `<output_dir>`
//!
//! Jobs run either in order with fail-fast semantics, or on a bounded
//! worker pool where each format succeeds or fails on its own.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::process::Command;

use rayon::prelude::*;
use serde_yaml::{Mapping, Value};

use crate::format_args::OutputFormat;
use crate::resource_log::ResourceLog;
use crate::{Error, Result};

pub const DEFAULT_RENDERER: &str = "quarto";
const FALLBACK_OUTPUT_NAME: &str = "index";
const METADATA_SUFFIX: &str = "yaml";

/// Everything needed to render one output format.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderJob {
    /// Catalogue name, `<package>::<format>`
    pub format: String,
    pub format_id: String,
    pub input_suffix: String,
    pub file_suffix: String,
    pub document: String,
    pub metadata: Mapping,
    /// Output file stem overriding the note name
    pub output_name: Option<String>,
}

impl RenderJob {
    pub fn new(format: &OutputFormat, document: impl Into<String>) -> Result<Self> {
        Ok(Self {
            format: format.name.clone(),
            format_id: format.format_id(),
            input_suffix: non_empty_or(&format.meta.inputsuffix, "qmd"),
            file_suffix: non_empty_or(&format.meta.filesuffix, "html"),
            document: document.into(),
            metadata: format.metadata_document()?,
            output_name: None,
        })
    }

    pub fn with_output_name(mut self, name: impl Into<String>) -> Self {
        self.output_name = Some(name.into());
        self
    }
}

fn non_empty_or(value: &str, fallback: &str) -> String {
    if value.is_empty() {
        fallback.to_string()
    } else {
        value.to_string()
    }
}

/// Output basenames for a set of jobs, in job order.
///
/// The stem is the job's override, else the note name, else `index`.
/// Basenames claimed by several jobs become `<stem>_<format-id>.<suffix>`.
pub fn output_basenames(jobs: &[RenderJob], note_name: Option<&str>) -> Vec<String> {
    let stems: Vec<&str> = jobs
        .iter()
        .map(|job| {
            job.output_name
                .as_deref()
                .or(note_name)
                .filter(|s| !s.is_empty())
                .unwrap_or(FALLBACK_OUTPUT_NAME)
        })
        .collect();
    let plain: Vec<String> = jobs
        .iter()
        .zip(&stems)
        .map(|(job, stem)| format!("{}.{}", stem, job.file_suffix))
        .collect();

    let mut counts: HashMap<&str, usize> = HashMap::new();
    for name in &plain {
        *counts.entry(name.as_str()).or_default() += 1;
    }

    jobs.iter()
        .zip(&stems)
        .zip(&plain)
        .map(|((job, stem), name)| {
            if counts[name.as_str()] > 1 {
                format!("{}_{}.{}", stem, job.format_id, job.file_suffix)
            } else {
                name.clone()
            }
        })
        .collect()
}

/// Normalize stringly-typed metadata values, recursively:
/// `"true"`/`"false"` become booleans, all-digit strings integers and
/// `"[]"` an empty sequence.
pub fn sanitize_metadata(metadata: Mapping) -> Mapping {
    metadata
        .into_iter()
        .map(|(k, v)| (k, sanitize_value(v)))
        .collect()
}

fn sanitize_value(value: Value) -> Value {
    match value {
        Value::String(s) => {
            if s.eq_ignore_ascii_case("true") {
                Value::Bool(true)
            } else if s.eq_ignore_ascii_case("false") {
                Value::Bool(false)
            } else if s == "[]" {
                Value::Sequence(Vec::new())
            } else if !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()) {
                match s.parse::<i64>() {
                    Ok(n) => Value::Number(n.into()),
                    Err(_) => Value::String(s),
                }
            } else {
                Value::String(s)
            }
        }
        Value::Sequence(items) => Value::Sequence(items.into_iter().map(sanitize_value).collect()),
        Value::Mapping(map) => Value::Mapping(sanitize_metadata(map)),
        other => other,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DispatchMode {
    #[default]
    Sequential,
    Parallel,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderSettings {
    /// Renderer binary: a name looked up on `PATH`, or a path
    pub renderer: PathBuf,
    /// Rendering working directory `W`
    pub working_dir: PathBuf,
    pub output_dir: PathBuf,
    /// Note name used for output basenames
    pub note_name: Option<String>,
}

impl RenderSettings {
    pub fn new(working_dir: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            renderer: PathBuf::from(DEFAULT_RENDERER),
            working_dir: working_dir.into(),
            output_dir: output_dir.into(),
            note_name: None,
        }
    }
}

/// Result of a dispatch.
#[derive(Debug, Default)]
pub struct DispatchReport {
    /// Format name to absolute output path
    pub outputs: BTreeMap<String, PathBuf>,
    /// Format name to failure (parallel mode only)
    pub failures: BTreeMap<String, Error>,
    /// Directory shared by every output, if there is one
    pub common_dir: Option<PathBuf>,
}

impl DispatchReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    fn finish(mut self) -> Self {
        let mut parents = self.outputs.values().filter_map(|p| p.parent());
        self.common_dir = match parents.next() {
            Some(first) if parents.all(|p| p == first) => Some(first.to_path_buf()),
            _ => None,
        };
        self
    }
}

pub struct RenderDispatcher {
    settings: RenderSettings,
}

impl RenderDispatcher {
    pub fn new(settings: RenderSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &RenderSettings {
        &self.settings
    }

    /// Resolve the renderer binary.
    pub fn locate_renderer(&self) -> Result<PathBuf> {
        let renderer = &self.settings.renderer;
        let missing = || Error::RendererMissing(renderer.display().to_string());
        if renderer.components().count() > 1 || renderer.is_absolute() {
            return if renderer.is_file() {
                Ok(renderer.clone())
            } else {
                Err(missing())
            };
        }
        which::which(renderer).map_err(|_| missing())
    }

    pub fn temp_path(&self, job: &RenderJob) -> PathBuf {
        self.settings
            .working_dir
            .join(format!("temp_{}.{}", job.format_id, job.input_suffix))
    }

    pub fn config_path(&self, job: &RenderJob) -> PathBuf {
        self.settings
            .output_dir
            .join(format!("{}_config.{}", job.format_id, METADATA_SUFFIX))
    }

    /// Render every job.
    ///
    /// # Errors
    ///
    /// A format selected twice, a missing renderer or an unusable output
    /// directory fails before any job runs. In sequential mode the first failing job is returned
    /// as the error; in parallel mode failures are collected in the report.
    pub fn dispatch(
        &self,
        jobs: &[RenderJob],
        mode: DispatchMode,
        log: &ResourceLog,
    ) -> Result<DispatchReport> {
        let mut seen = std::collections::HashSet::new();
        if let Some(job) = jobs.iter().find(|j| !seen.insert(j.format.as_str())) {
            return Err(Error::DuplicateFormat(job.format.clone()));
        }
        // The renderer runs inside `W`, so every path handed to it is absolute
        let renderer = absolute(&self.locate_renderer()?)?;
        for dir in [&self.settings.working_dir, &self.settings.output_dir] {
            std::fs::create_dir_all(dir).map_err(|e| Error::io(dir, e))?;
        }
        let basenames = output_basenames(jobs, self.settings.note_name.as_deref());
        let mut report = DispatchReport::default();

        match mode {
            DispatchMode::Sequential => {
                for (job, basename) in jobs.iter().zip(&basenames) {
                    let output = self.render_one(&renderer, job, basename, log)?;
                    report.outputs.insert(job.format.clone(), output);
                }
            }
            DispatchMode::Parallel => {
                let threads = std::thread::available_parallelism()
                    .map_or(1, |n| n.get())
                    .saturating_mul(2)
                    .max(1);
                let pool = rayon::ThreadPoolBuilder::new()
                    .num_threads(threads)
                    .build()
                    .map_err(|e| Error::WorkerPool(e.to_string()))?;
                tracing::debug!(threads, jobs = jobs.len(), "Dispatching renders in parallel");

                let results: Vec<(String, Result<PathBuf>)> = pool.install(|| {
                    jobs.par_iter()
                        .zip(basenames.par_iter())
                        .map(|(job, basename)| {
                            (
                                job.format.clone(),
                                self.render_one(&renderer, job, basename, log),
                            )
                        })
                        .collect()
                });
                for (format, result) in results {
                    match result {
                        Ok(path) => {
                            report.outputs.insert(format, path);
                        }
                        Err(e) => {
                            tracing::warn!(format = %format, error = %e, "Render failed");
                            report.failures.insert(format, e);
                        }
                    }
                }
            }
        }

        Ok(report.finish())
    }

    fn render_one(
        &self,
        renderer: &Path,
        job: &RenderJob,
        basename: &str,
        log: &ResourceLog,
    ) -> Result<PathBuf> {
        let temp = self.temp_path(job);
        std::fs::write(&temp, &job.document).map_err(|e| Error::TempFileIo {
            path: temp.clone(),
            source: e,
        })?;
        let temp = absolute(&temp)?;

        let config = self.config_path(job);
        let metadata = serde_yaml::to_string(&sanitize_metadata(job.metadata.clone()))
            .map_err(|e| Error::Frontmatter(e.to_string()))?;
        std::fs::write(&config, metadata).map_err(|e| Error::TempFileIo {
            path: config.clone(),
            source: e,
        })?;
        let config = absolute(&config)?;

        tracing::info!(format = %job.format, output = basename, "Rendering");
        let output = Command::new(renderer)
            .arg("render")
            .arg(&temp)
            .arg("--to")
            .arg(&job.file_suffix)
            .arg("--metadata-file")
            .arg(&config)
            .arg("--output")
            .arg(basename)
            .current_dir(&self.settings.working_dir)
            .output()
            .map_err(|e| Error::RenderFailed {
                format: job.format.clone(),
                code: -1,
                stderr: format!("failed to start {}: {}", renderer.display(), e),
            })?;

        if !output.status.success() {
            return Err(Error::RenderFailed {
                format: job.format.clone(),
                code: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let rendered = self.settings.working_dir.join(basename);
        let target = self.settings.output_dir.join(basename);
        if rendered.is_file() {
            if absolute(&rendered)? != absolute(&target)? {
                std::fs::copy(&rendered, &target).map_err(|e| Error::io(&target, e))?;
            }
        } else if !target.is_file() {
            return Err(Error::RenderFailed {
                format: job.format.clone(),
                code: 0,
                stderr: format!("renderer produced no {}", rendered.display()),
            });
        }

        let target = absolute(&target)?;
        log.record(
            "render",
            format!("{} -> {}", job.format, target.display()),
        );
        Ok(target)
    }
}

fn absolute(path: &Path) -> Result<PathBuf> {
    std::path::absolute(path).map_err(|e| Error::io(path, e))
}

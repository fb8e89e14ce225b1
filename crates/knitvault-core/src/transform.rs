/*
 * transform.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Markdown transformation pipeline infrastructure.
 */

//! Markdown transformation pipeline infrastructure.
//!
//! This module provides the core abstractions for document transforms:
//!
//! - [`TransformModule`] - The trait implemented by every module
//! - [`TransformPipeline`] - Ordered collection of modules to execute
//! - [`AuditTrail`] - Per-module `input.md` / `output.md` snapshots
//!
//! # Architecture
//!
//! Modules run in a flat, ordered sequence (configuration order) over a
//! single document string. Each module:
//! - Receives the whole document (front matter and body) and returns the
//!   rewritten document
//! - May read the [`ModuleContext`] (resource log, base directory)
//! - Must not do any other I/O
//!
//! The pipeline is strictly sequential so the audit trail forms a
//! deterministic before/after record of every step.
//!
//! # Example
//!
//! ```ignore
//! use knitvault_core::transform::{ModuleContext, TransformModule, TransformPipeline};
//!
//! struct Shout;
//!
//! impl TransformModule for Shout {
//!     fn name(&self) -> &str { "Shout" }
//!
//!     fn process(&self, input: &str, _ctx: &ModuleContext<'_>) -> Result<String> {
//!         Ok(input.to_uppercase())
//!     }
//! }
//!
//! let mut pipeline = TransformPipeline::new();
//! pipeline.push(Box::new(Shout));
//! let output = pipeline.run(document, &RunContext::new(&log))?;
//! ```

use std::path::{Path, PathBuf};

use serde_json::{Map, Value};

use crate::resource_log::ResourceLog;
use crate::{Error, Result};

/// Free-form module configuration, as stored in pipeline records.
pub type ModuleConfig = Map<String, Value>;

/// Run-wide arguments.
///
/// Modules only receive the keys they declare (see
/// [`crate::registry::ModuleFactory::accepted_args`]); a run-wide value
/// then wins over the record's own configuration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunArguments(Map<String, Value>);

impl RunArguments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.0.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Set a value from its textual form. JSON literals (`true`, `3`,
    /// `["a"]`) are parsed, anything else is kept as a string.
    pub fn set_from_str(&mut self, key: &str, raw: &str) {
        let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
        self.insert(key, value);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }
}

/// What a module may look at besides its input.
#[derive(Debug, Clone, Copy)]
pub struct ModuleContext<'a> {
    pub log: &'a ResourceLog,
    /// Directory relative paths in the document are resolved against
    pub base_dir: Option<&'a Path>,
}

/// Trait for document transforms.
///
/// # Thread Safety
///
/// Modules must be `Send + Sync` so that a built pipeline can be shared,
/// even though a single pipeline run is sequential.
pub trait TransformModule: Send + Sync {
    /// Module identity, as used in pipeline records and audit paths.
    fn name(&self) -> &str;

    /// Rewrite the document.
    ///
    /// # Errors
    ///
    /// Returns an error if the module cannot process the document. The
    /// pipeline aborts and reports the module name and position.
    fn process(&self, input: &str, ctx: &ModuleContext<'_>) -> Result<String>;
}

/// Per-module before/after snapshots under a log directory.
#[derive(Debug, Clone)]
pub struct AuditTrail {
    dir: PathBuf,
}

impl AuditTrail {
    /// Wipe and recreate the log directory.
    ///
    /// Callers must have saved anything they want to keep from a previous
    /// run before calling this.
    pub fn prepare(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        if dir.exists() {
            std::fs::remove_dir_all(&dir).map_err(|e| Error::io(&dir, e))?;
        }
        std::fs::create_dir_all(&dir).map_err(|e| Error::io(&dir, e))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Directory holding the snapshots of one module.
    pub fn module_dir(&self, audit_name: &str) -> PathBuf {
        self.dir.join(audit_name)
    }

    fn write(&self, audit_name: &str, file: &str, contents: &str) -> Result<()> {
        let dir = self.module_dir(audit_name);
        std::fs::create_dir_all(&dir).map_err(|e| Error::io(&dir, e))?;
        let path = dir.join(file);
        std::fs::write(&path, contents).map_err(|e| Error::io(&path, e))
    }
}

/// Explicit per-run state threaded through the pipeline.
#[derive(Debug, Clone, Copy)]
pub struct RunContext<'a> {
    pub log: &'a ResourceLog,
    pub audit: Option<&'a AuditTrail>,
    pub base_dir: Option<&'a Path>,
}

impl<'a> RunContext<'a> {
    pub fn new(log: &'a ResourceLog) -> Self {
        Self {
            log,
            audit: None,
            base_dir: None,
        }
    }

    pub fn with_audit(mut self, audit: &'a AuditTrail) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn with_base_dir(mut self, base_dir: &'a Path) -> Self {
        self.base_dir = Some(base_dir);
        self
    }
}

struct PipelineEntry {
    module: Box<dyn TransformModule>,
    /// 1-based position in the pipeline configuration
    position: usize,
    /// Directory name under the audit trail
    audit_name: String,
}

/// A pipeline of document transforms to execute in order.
pub struct TransformPipeline {
    entries: Vec<PipelineEntry>,
}

impl TransformPipeline {
    /// Create a new empty pipeline.
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Add a module at the next position.
    pub fn push(&mut self, module: Box<dyn TransformModule>) {
        let position = self.entries.len() + 1;
        self.push_at(module, position);
    }

    /// Add a module, recording its position in the source configuration.
    ///
    /// The n-th occurrence (n >= 2) of a module name is audited under
    /// `<name>_<n>`.
    pub fn push_at(&mut self, module: Box<dyn TransformModule>, position: usize) {
        let occurrences = self
            .entries
            .iter()
            .filter(|e| e.module.name() == module.name())
            .count();
        let audit_name = if occurrences == 0 {
            module.name().to_string()
        } else {
            format!("{}_{}", module.name(), occurrences + 1)
        };
        self.entries.push(PipelineEntry {
            module,
            position,
            audit_name,
        });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Module names in execution order.
    pub fn module_names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.module.name()).collect()
    }

    /// Audit directory names in execution order.
    pub fn audit_names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.audit_name.as_str()).collect()
    }

    /// Run every module in order.
    ///
    /// # Errors
    ///
    /// Returns the first error, wrapped with the module name and position.
    /// Snapshots written before the failure are left in place.
    pub fn run(&self, input: &str, ctx: &RunContext<'_>) -> Result<String> {
        let module_ctx = ModuleContext {
            log: ctx.log,
            base_dir: ctx.base_dir,
        };
        let mut current = input.to_string();

        for entry in &self.entries {
            let name = entry.module.name();
            tracing::debug!(module = name, position = entry.position, "Running module");

            if let Some(audit) = ctx.audit {
                audit.write(&entry.audit_name, "input.md", &current)?;
            }

            let output = entry
                .module
                .process(&current, &module_ctx)
                .map_err(|e| Error::Module {
                    name: name.to_string(),
                    position: entry.position,
                    source: Box::new(e),
                })?;

            if let Some(audit) = ctx.audit {
                audit.write(&entry.audit_name, "output.md", &output)?;
            }

            if output != current {
                ctx.log.record(
                    "module",
                    format!("{} (position {}) modified the document", name, entry.position),
                );
            }
            current = output;
        }

        Ok(current)
    }
}

impl Default for TransformPipeline {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    /// Appends a marker and records its execution order.
    struct Appending {
        name: &'static str,
        suffix: &'static str,
        order: Arc<Mutex<Vec<&'static str>>>,
    }

    impl TransformModule for Appending {
        fn name(&self) -> &str {
            self.name
        }

        fn process(&self, input: &str, _ctx: &ModuleContext<'_>) -> Result<String> {
            self.order.lock().unwrap().push(self.name);
            Ok(format!("{}{}", input, self.suffix))
        }
    }

    struct Identity(Arc<AtomicUsize>);

    impl TransformModule for Identity {
        fn name(&self) -> &str {
            "Identity"
        }

        fn process(&self, input: &str, _ctx: &ModuleContext<'_>) -> Result<String> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(input.to_string())
        }
    }

    struct Failing;

    impl TransformModule for Failing {
        fn name(&self) -> &str {
            "Failing"
        }

        fn process(&self, _input: &str, _ctx: &ModuleContext<'_>) -> Result<String> {
            Err(Error::module_process("failed intentionally"))
        }
    }

    #[test]
    fn test_empty_pipeline_is_identity() {
        let pipeline = TransformPipeline::new();
        assert!(pipeline.is_empty());
        let log = ResourceLog::new();
        assert_eq!(pipeline.run("abc", &RunContext::new(&log)).unwrap(), "abc");
        assert!(log.is_empty());
    }

    #[test]
    fn test_modules_run_in_order() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut pipeline = TransformPipeline::new();
        for (name, suffix) in [("First", "1"), ("Second", "2"), ("Third", "3")] {
            pipeline.push(Box::new(Appending {
                name,
                suffix,
                order: order.clone(),
            }));
        }
        assert_eq!(pipeline.module_names(), vec!["First", "Second", "Third"]);

        let log = ResourceLog::new();
        let out = pipeline.run("x", &RunContext::new(&log)).unwrap();
        assert_eq!(out, "x123");
        assert_eq!(*order.lock().unwrap(), vec!["First", "Second", "Third"]);
        assert_eq!(log.len(), 3);
    }

    #[test]
    fn test_unchanged_output_is_not_logged() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut pipeline = TransformPipeline::new();
        pipeline.push(Box::new(Identity(counter.clone())));
        let log = ResourceLog::new();
        pipeline.run("same", &RunContext::new(&log)).unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert!(log.is_empty());
    }

    #[test]
    fn test_audit_files_match_module_io() {
        let temp = TempDir::new().unwrap();
        let audit = AuditTrail::prepare(temp.path().join("modules")).unwrap();
        let order = Arc::new(Mutex::new(Vec::new()));

        let mut pipeline = TransformPipeline::new();
        pipeline.push(Box::new(Appending {
            name: "Step",
            suffix: "-a",
            order: order.clone(),
        }));
        pipeline.push(Box::new(Appending {
            name: "Step",
            suffix: "-b",
            order,
        }));
        assert_eq!(pipeline.audit_names(), vec!["Step", "Step_2"]);

        let log = ResourceLog::new();
        let ctx = RunContext::new(&log).with_audit(&audit);
        pipeline.run("doc", &ctx).unwrap();

        let read = |module: &str, file: &str| {
            fs::read_to_string(audit.module_dir(module).join(file)).unwrap()
        };
        assert_eq!(read("Step", "input.md"), "doc");
        assert_eq!(read("Step", "output.md"), "doc-a");
        assert_eq!(read("Step_2", "input.md"), "doc-a");
        assert_eq!(read("Step_2", "output.md"), "doc-a-b");
    }

    #[test]
    fn test_failure_reports_name_and_position_and_keeps_snapshots() {
        let temp = TempDir::new().unwrap();
        let audit = AuditTrail::prepare(temp.path().join("modules")).unwrap();
        let counter = Arc::new(AtomicUsize::new(0));

        let mut pipeline = TransformPipeline::new();
        pipeline.push(Box::new(Identity(counter.clone())));
        pipeline.push_at(Box::new(Failing), 7);
        pipeline.push(Box::new(Identity(counter.clone())));

        let log = ResourceLog::new();
        let err = pipeline
            .run("doc", &RunContext::new(&log).with_audit(&audit))
            .unwrap_err();
        match err {
            Error::Module { name, position, .. } => {
                assert_eq!(name, "Failing");
                assert_eq!(position, 7);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert!(audit.module_dir("Identity").join("output.md").exists());
        assert!(audit.module_dir("Failing").join("input.md").exists());
        assert!(!audit.module_dir("Failing").join("output.md").exists());
    }

    #[test]
    fn test_prepare_wipes_previous_run() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("modules");
        fs::create_dir_all(dir.join("Old")).unwrap();
        fs::write(dir.join("Old").join("input.md"), "stale").unwrap();
        let audit = AuditTrail::prepare(&dir).unwrap();
        assert!(audit.dir().exists());
        assert!(!dir.join("Old").exists());
    }

    #[test]
    fn test_run_arguments_from_str() {
        let mut args = RunArguments::new();
        args.set_from_str("remove_hashtags_from_tags", "true");
        args.set_from_str("label", "hello world");
        args.set_from_str("langs", r#"["mermaid"]"#);
        assert_eq!(args.get("remove_hashtags_from_tags"), Some(&Value::Bool(true)));
        assert_eq!(
            args.get("label"),
            Some(&Value::String("hello world".into()))
        );
        assert!(args.get("langs").unwrap().is_array());
    }
}

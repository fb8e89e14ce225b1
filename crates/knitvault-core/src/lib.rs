//! Conversion core for knitvault
//!
//! This crate turns a note exported from a knowledge-base vault into
//! renderer-ready Markdown and drives the renderer once per output format.
//!
//! # Architecture
//!
//! - [`format_args`] - Output format catalogue and per-format renderer
//!   configuration ([`Catalogue`], [`OutputFormat`])
//! - [`TransformPipeline`] - Ordered chain of [`TransformModule`]s with a
//!   per-module audit trail, built from a [`PipelineConfig`] through the
//!   [`ModuleRegistry`]
//! - [`DependencyResolver`] - Stages bibliographies, styles and filter
//!   extensions into the rendering working directory
//! - [`RenderDispatcher`] - Invokes the renderer, sequentially or in parallel
//! - [`ResourceLog`] - Per-run record of what was touched
//!
//! # Example
//!
//! ```ignore
//! use knitvault_core::*;
//!
//! let manifest = ExporterManifest::load(&ExporterLayout::new("export"))?;
//! let log = ResourceLog::new();
//!
//! let registry = ModuleRegistry::builtin();
//! let config = PipelineConfig::embedded()?;
//! let pipeline = TransformPipeline::from_records(&config.records, &registry, &RunArguments::new())?;
//! let audit = AuditTrail::prepare("out/.knitvault/modules")?;
//! let document = pipeline.run(&manifest.read_markdown()?, &RunContext::new(&log).with_audit(&audit))?;
//!
//! let catalogue = Catalogue::embedded()?;
//! let pdf = catalogue.select("quarto::pdf")?;
//! let staged = DependencyResolver::new(&manifest, "work").resolve(&document, &log)?;
//! let job = RenderJob::new(&pdf, staged)?;
//!
//! let dispatcher = RenderDispatcher::new(RenderSettings::new("work", "out"));
//! let report = dispatcher.dispatch(&[job], DispatchMode::Sequential, &log)?;
//! ```

pub mod dependencies;
pub mod error;
pub mod exporter;
pub mod format_args;
pub mod frontmatter;
pub mod pipeline;
pub mod registry;
pub mod render;
pub mod resource_log;
pub mod transform;
pub mod transforms;

// Re-export commonly used types
pub use dependencies::DependencyResolver;
pub use error::{Error, ErrorKind, Result};
pub use exporter::{DEFAULT_MANIFEST_ROOT, ExporterLayout, ExporterManifest, ExporterPaths};
pub use format_args::{Catalogue, CatalogueOptions, OutputFormat, ParamValue, Parameter};
pub use pipeline::{DEFAULT_PIPELINE, ModuleRecord, PipelineConfig};
pub use registry::{ModuleDescription, ModuleRegistry, ModuleSource};
pub use render::{
    DEFAULT_RENDERER, DispatchMode, DispatchReport, RenderDispatcher, RenderJob, RenderSettings,
    output_basenames, sanitize_metadata,
};
pub use resource_log::{ResourceEntry, ResourceLog};
pub use transform::{
    AuditTrail, ModuleConfig, ModuleContext, RunArguments, RunContext, TransformModule,
    TransformPipeline,
};

/*
 * convert.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Convert command implementation
 */

//! Convert command implementation.
//!
//! Drives one conversion of an exported note:
//!
//! 1. load the exporter manifest and the flattened note
//! 2. run the transform pipeline, auditing each module under
//!    `<output_dir>/.knitvault/modules`
//! 3. stage front matter dependencies into the working directory
//! 4. configure every selected format and render it
//! 5. write `<output_dir>/.knitvault/resource_log.txt` and remember the run
//!
//! The working directory defaults to the exporter output, so that paths
//! the image module made relative to it resolve for the renderer.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use tracing::{debug, info, warn};

use knitvault_core::{
    AuditTrail, Catalogue, DEFAULT_RENDERER, DependencyResolver, DispatchMode, DispatchReport,
    ExporterLayout, ExporterManifest, OutputFormat, RenderDispatcher, RenderJob, RenderSettings,
    ResourceLog, RunContext, TransformPipeline,
};

use super::GlobalOptions;
use crate::overrides::Overrides;
use crate::settings::Settings;

/// Directory below the output directory holding run artifacts.
const RUN_DIR: &str = ".knitvault";
const DEFAULT_OUTPUT_DIR: &str = "output";
const RENDERER_TOOL: &str = "quarto";

/// Arguments for the convert command
#[derive(Debug)]
pub struct ConvertArgs {
    pub exporter_output: PathBuf,
    pub manifest_root: Option<PathBuf>,
    pub markdown: Option<PathBuf>,
    pub formats: Vec<String>,
    pub output_dir: Option<PathBuf>,
    pub working_dir: Option<PathBuf>,
    pub parallel: bool,
    pub output_name: Option<String>,
    pub overrides: Vec<String>,
}

/// Execute the convert command
pub fn execute(args: ConvertArgs, global: &GlobalOptions) -> Result<()> {
    let mut settings = Settings::load_or_create(&global.paths)?;
    let overrides = Overrides::parse(&args.overrides)?;

    let output_dir = args
        .output_dir
        .clone()
        .unwrap_or_else(|| args.exporter_output.join(DEFAULT_OUTPUT_DIR));
    let run_dir = output_dir.join(RUN_DIR);
    let audit_dir = run_dir.join("modules");
    let working_dir = args
        .working_dir
        .clone()
        .unwrap_or_else(|| args.exporter_output.clone());

    let selected = dedup_formats(if args.formats.is_empty() {
        settings.run.formats.clone()
    } else {
        args.formats.clone()
    });
    if selected.is_empty() {
        bail!("No output format selected (use --format <package>::<format>)");
    }
    for name in overrides.formats.keys() {
        if !selected.contains(name) {
            warn!(format = %name, "Override given for a format that is not selected");
        }
    }

    // Configuration problems surface before any module runs
    let catalogue = global.catalogue()?;
    let formats = configure_formats(&catalogue, &selected, &settings, &overrides)?;
    let registry = global.registry()?;
    let pipeline = TransformPipeline::from_records(
        &global.pipeline()?.records,
        &registry,
        &overrides.run_args,
    )
    .context("Failed to build the transform pipeline")?;

    let mut layout = ExporterLayout::new(&args.exporter_output);
    if let Some(root) = &args.manifest_root {
        layout.manifest_root = root.clone();
    }
    layout.markdown = args.markdown.clone();

    let renderer = settings
        .tool(RENDERER_TOOL)
        .map_or_else(|| PathBuf::from(DEFAULT_RENDERER), Path::to_path_buf);

    let log = ResourceLog::new();
    let run = Conversion {
        layout: &layout,
        pipeline: &pipeline,
        formats: &formats,
        audit_dir: &audit_dir,
        working_dir: &working_dir,
        output_dir: &output_dir,
        renderer,
        output_name: args.output_name.as_deref(),
        mode: if args.parallel {
            DispatchMode::Parallel
        } else {
            DispatchMode::Sequential
        },
    };
    let outcome = run.execute(&log);

    let log_path = run_dir.join("resource_log.txt");
    let written = log.write_to(&log_path);

    let (note, report) = match (outcome, written) {
        (Ok(result), Ok(())) => result,
        (Ok(_), Err(e)) => {
            bail!("Failed to write the resource log: {}: {}", e.kind(), e);
        }
        (Err(e), written) => {
            let log_note = match written {
                Ok(()) => log_path.display().to_string(),
                Err(log_error) => format!("not written ({})", log_error),
            };
            bail!(
                "{}: {}\n  module audit trail: {}\n  resource log: {}",
                e.kind(),
                e,
                audit_dir.display(),
                log_note
            );
        }
    };

    for (format, path) in &report.outputs {
        println!("{}\t{}", format, path.display());
    }
    for (format, error) in &report.failures {
        eprintln!("{}: {} ({})", format, error, error.kind());
    }

    settings.run.formats = selected;
    for format in &formats {
        settings
            .run
            .values
            .insert(format.name.clone(), format.values());
    }
    settings.run.last_note = Some(note);
    settings.run.last_output_dir = Some(output_dir);
    settings.save(&global.paths)?;

    if !report.is_success() {
        bail!(
            "{} of {} formats failed to render",
            report.failures.len(),
            formats.len()
        );
    }
    Ok(())
}

/// Drop repeated format names, keeping the first occurrence.
fn dedup_formats(formats: Vec<String>) -> Vec<String> {
    let mut unique: Vec<String> = Vec::with_capacity(formats.len());
    for format in formats {
        if unique.contains(&format) {
            warn!(format = %format, "Format selected more than once");
        } else {
            unique.push(format);
        }
    }
    unique
}

/// Select each format and apply saved values, then command-line overrides.
fn configure_formats(
    catalogue: &Catalogue,
    selected: &[String],
    settings: &Settings,
    overrides: &Overrides,
) -> Result<Vec<OutputFormat>> {
    selected
        .iter()
        .map(|name| -> Result<OutputFormat> {
            let mut format = catalogue.select(name)?;
            if let Some(saved) = settings.run.values.get(name) {
                format.apply_values(saved)?;
            }
            if let Some(values) = overrides.for_format(name) {
                for (param, value) in values {
                    format.set_value(param, value)?;
                }
            }
            Ok(format)
        })
        .collect()
}

/// Everything one conversion needs once configuration is settled.
struct Conversion<'a> {
    layout: &'a ExporterLayout,
    pipeline: &'a TransformPipeline,
    formats: &'a [OutputFormat],
    audit_dir: &'a Path,
    working_dir: &'a Path,
    output_dir: &'a Path,
    renderer: PathBuf,
    output_name: Option<&'a str>,
    mode: DispatchMode,
}

impl Conversion<'_> {
    /// Run the conversion, returning the note that was converted and the
    /// dispatch report.
    fn execute(self, log: &ResourceLog) -> knitvault_core::Result<(PathBuf, DispatchReport)> {
        let manifest = ExporterManifest::load(self.layout)?;
        info!(note = %manifest.markdown.display(), "Converting");

        let audit = AuditTrail::prepare(self.audit_dir)?;
        let base_dir = manifest.markdown.parent().map(Path::to_path_buf);
        let mut ctx = RunContext::new(log).with_audit(&audit);
        if let Some(dir) = base_dir.as_deref() {
            ctx = ctx.with_base_dir(dir);
        }
        let document = self.pipeline.run(&manifest.read_markdown()?, &ctx)?;
        debug!(modules = self.pipeline.len(), "Transform pipeline finished");

        let staged = DependencyResolver::new(&manifest, self.working_dir).resolve(&document, log)?;

        let mut jobs = Vec::with_capacity(self.formats.len());
        for format in self.formats {
            let job = RenderJob::new(format, staged.clone())?;
            jobs.push(match self.output_name {
                Some(name) => job.with_output_name(name),
                None => job,
            });
        }

        let mut settings = RenderSettings::new(self.working_dir, self.output_dir);
        settings.renderer = self.renderer;
        settings.note_name = manifest.note_name().map(str::to_string);
        let report = RenderDispatcher::new(settings).dispatch(&jobs, self.mode, log)?;

        Ok((manifest.markdown, report))
    }
}

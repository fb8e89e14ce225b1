/*
 * pipeline.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Pipeline configuration: the ordered list of transform-module records.
 */

//! Pipeline configuration.
//!
//! A pipeline file is a JSON array of [`ModuleRecord`]s. Order is
//! authoritative and the same module may appear more than once with a
//! different configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::registry::ModuleRegistry;
use crate::transform::{ModuleConfig, RunArguments, TransformPipeline};
use crate::{Error, Result};

/// The default pipeline, embedded at compile time.
pub const DEFAULT_PIPELINE: &str = include_str!("../resources/default_pipeline.json");

fn default_enabled() -> bool {
    true
}

/// One entry of the pipeline configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleRecord {
    /// Family file the module lives in (informational for built-ins)
    pub file_name: String,
    pub module_name: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub config: ModuleConfig,
    /// When `true`, the record runs regardless of `enabled`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub force_module_enabled_state: Option<bool>,
}

impl ModuleRecord {
    pub fn new(file_name: impl Into<String>, module_name: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
            module_name: module_name.into(),
            enabled: true,
            config: ModuleConfig::new(),
            force_module_enabled_state: None,
        }
    }

    /// Whether the record takes part in a run.
    pub fn is_active(&self) -> bool {
        self.force_module_enabled_state == Some(true) || self.enabled
    }
}

/// The ordered module records of a pipeline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PipelineConfig {
    pub records: Vec<ModuleRecord>,
}

impl PipelineConfig {
    pub fn parse_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| Error::Pipeline(e.to_string()))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        Self::parse_json(&text).map_err(|e| match e {
            Error::Pipeline(msg) => Error::Pipeline(format!("{}: {}", path.display(), msg)),
            other => other,
        })
    }

    pub fn embedded() -> Result<Self> {
        Self::parse_json(DEFAULT_PIPELINE)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::Pipeline(e.to_string()))
    }

    pub fn active_records(&self) -> impl Iterator<Item = &ModuleRecord> {
        self.records.iter().filter(|r| r.is_active())
    }
}

impl TransformPipeline {
    /// Build a pipeline from configuration records.
    ///
    /// Inactive records are skipped. Records naming a module the registry
    /// does not know are skipped with a warning; all other modules still
    /// run. Invalid module configuration is an error.
    pub fn from_records(
        records: &[ModuleRecord],
        registry: &ModuleRegistry,
        args: &RunArguments,
    ) -> Result<Self> {
        let mut pipeline = TransformPipeline::new();
        for (index, record) in records.iter().enumerate() {
            let position = index + 1;
            if !record.is_active() {
                tracing::debug!(module = %record.module_name, position, "Skipping disabled module");
                continue;
            }
            if !registry.contains(&record.module_name) {
                tracing::warn!(
                    module = %record.module_name,
                    file = %record.file_name,
                    position,
                    "Unknown processing module, skipping"
                );
                continue;
            }
            let module = registry.instantiate(record, args)?;
            pipeline.push_at(module, position);
        }
        Ok(pipeline)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_embedded_pipeline_parses() {
        let config = PipelineConfig::embedded().unwrap();
        assert!(!config.records.is_empty());
        let names: Vec<_> = config.records.iter().map(|r| r.module_name.as_str()).collect();
        assert!(names.contains(&"EnforceFrontmatterYAML"));
        assert!(names.contains(&"ConvertBookdownToQuartoReferencing"));
    }

    #[test]
    fn test_embedded_pipeline_modules_are_all_builtin() {
        let registry = ModuleRegistry::builtin();
        let config = PipelineConfig::embedded().unwrap();
        for record in &config.records {
            assert!(
                registry.contains(&record.module_name),
                "{} is not registered",
                record.module_name
            );
        }
    }

    #[test]
    fn test_record_defaults() {
        let config = PipelineConfig::parse_json(
            r#"[{"file_name": "layout", "module_name": "EnforceMinimalLinebreaks"}]"#,
        )
        .unwrap();
        let record = &config.records[0];
        assert!(record.enabled);
        assert!(record.config.is_empty());
        assert_eq!(record.force_module_enabled_state, None);
    }

    #[test]
    fn test_forced_state_overrides_enabled() {
        let mut record = ModuleRecord::new("frontmatter", "EnforceFrontmatterYAML");
        record.enabled = false;
        assert!(!record.is_active());
        record.force_module_enabled_state = Some(true);
        assert!(record.is_active());
    }

    #[test]
    fn test_rejects_non_array() {
        let err = PipelineConfig::parse_json(r#"{"module_name": "x"}"#).unwrap_err();
        assert!(matches!(err, Error::Pipeline(_)));
    }

    #[test]
    fn test_to_json_round_trips() {
        let mut record = ModuleRecord::new("quarto", "ProcessDiagramCodeblocks");
        record
            .config
            .insert("codeblock_langs".into(), json!(["mermaid"]));
        let config = PipelineConfig {
            records: vec![record],
        };
        let text = config.to_json().unwrap();
        assert_eq!(PipelineConfig::parse_json(&text).unwrap(), config);
        assert!(!text.contains("force_module_enabled_state"));
    }

    #[test]
    fn test_from_records_skips_unknown_and_disabled() {
        let registry = ModuleRegistry::builtin();
        let mut disabled = ModuleRecord::new("layout", "EnforceMinimalLinebreaks");
        disabled.enabled = false;
        let records = vec![
            ModuleRecord::new("nowhere", "NoSuchModule"),
            disabled,
            ModuleRecord::new("layout", "EnforceLinebreaksOnQuartoBlocks"),
            ModuleRecord::new("layout", "EnforceLinebreaksOnQuartoBlocks"),
        ];
        let pipeline =
            TransformPipeline::from_records(&records, &registry, &RunArguments::new()).unwrap();
        assert_eq!(
            pipeline.module_names(),
            vec![
                "EnforceLinebreaksOnQuartoBlocks",
                "EnforceLinebreaksOnQuartoBlocks"
            ]
        );
        assert_eq!(
            pipeline.audit_names(),
            vec![
                "EnforceLinebreaksOnQuartoBlocks",
                "EnforceLinebreaksOnQuartoBlocks_2"
            ]
        );
    }

    #[test]
    fn test_from_records_invalid_config_is_error() {
        let registry = ModuleRegistry::builtin();
        let mut record = ModuleRecord::new("quarto", "ProcessDiagramCodeblocks");
        record
            .config
            .insert("codeblock_langs".into(), json!("mermaid"));
        let err = TransformPipeline::from_records(&[record], &registry, &RunArguments::new())
            .err()
            .unwrap();
        assert!(matches!(err, Error::ModuleConfig { .. }));
    }
}

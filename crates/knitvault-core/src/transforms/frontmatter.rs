/*
 * transforms/frontmatter.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Front matter repair, canonicalization and outline purging.
 */

use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_json::{Map, Value as JsonValue, json};
use serde_yaml::Value;

use crate::frontmatter::{self, Split};
use crate::registry::{ModuleFactory, decode_config};
use crate::transform::{ModuleConfig, ModuleContext, TransformModule};
use crate::Result;

pub(crate) fn factories() -> Vec<ModuleFactory> {
    vec![
        ModuleFactory {
            name: PurgeContents::NAME,
            family: "frontmatter",
            accepted_args: &[],
            build: |config| {
                Ok(Box::new(PurgeContents::new(decode_config(
                    PurgeContents::NAME,
                    config,
                )?)))
            },
        },
        ModuleFactory {
            name: NULLS,
            family: "frontmatter",
            accepted_args: &[],
            build: |config| {
                let config = with_default_keys(config, json!({"aliases": [], "tags": []}));
                Ok(Box::new(FrontmatterFieldFix::new(NULLS, decode_config(NULLS, &config)?)))
            },
        },
        ModuleFactory {
            name: INVALID_FIELDS,
            family: "frontmatter",
            accepted_args: &[],
            build: |config| {
                let config = with_default_keys(config, json!({}));
                Ok(Box::new(FrontmatterFieldFix::new(
                    INVALID_FIELDS,
                    decode_config(INVALID_FIELDS, &config)?,
                )))
            },
        },
        ModuleFactory {
            name: EnforceFrontmatterYaml::NAME,
            family: "frontmatter",
            accepted_args: &[],
            build: |_| Ok(Box::new(EnforceFrontmatterYaml)),
        },
    ]
}

static HEADING: Lazy<Regex> = Lazy::new(|| Regex::new(r"^#{1,6}\s+").unwrap());

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PurgeContentsConfig {
    /// Keys whose path values are dropped when they do not exist
    pub purged_frontmatter_keys: Vec<String>,
}

/// Outline-only mode: keeps the front matter and headings, drops every
/// other body line.
pub struct PurgeContents {
    config: PurgeContentsConfig,
}

impl PurgeContents {
    pub const NAME: &'static str = "PurgeContents";

    pub fn new(config: PurgeContentsConfig) -> Self {
        Self { config }
    }

    fn purge_keys(&self, yaml: &str, base_dir: Option<&Path>) -> Result<Option<String>> {
        if self.config.purged_frontmatter_keys.is_empty() {
            return Ok(None);
        }
        let mut map = frontmatter::parse_mapping(yaml)?;
        let mut changed = false;
        for key in &self.config.purged_frontmatter_keys {
            let key = Value::String(key.clone());
            let Some(value) = map.get(&key) else {
                continue;
            };
            match value {
                Value::String(s) => {
                    let path = Path::new(s);
                    let resolved = match base_dir {
                        Some(base) if path.is_relative() => base.join(path),
                        _ => path.to_path_buf(),
                    };
                    if path.is_relative() && !resolved.exists() {
                        map.remove(&key);
                        changed = true;
                    }
                }
                Value::Sequence(items) => {
                    let kept: Vec<Value> = items
                        .iter()
                        .filter(|item| {
                            item.as_str()
                                .map(Path::new)
                                .is_some_and(|p| p.is_absolute() && p.exists())
                        })
                        .cloned()
                        .collect();
                    if kept.is_empty() {
                        map.remove(&key);
                        changed = true;
                    } else if kept.len() != items.len() {
                        map.insert(key, Value::Sequence(kept));
                        changed = true;
                    }
                }
                _ => {}
            }
        }
        if changed {
            Ok(Some(frontmatter::emit_mapping(&map)?))
        } else {
            Ok(None)
        }
    }
}

impl TransformModule for PurgeContents {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn process(&self, input: &str, ctx: &ModuleContext<'_>) -> Result<String> {
        let (split, body) = match frontmatter::split(input) {
            Some(split) => (Some(split), split.body),
            None => (None, input),
        };

        let outline: String = body
            .split_inclusive('\n')
            .filter(|line| HEADING.is_match(line))
            .collect();

        match split {
            Some(split) => {
                let yaml = self.purge_keys(split.frontmatter, ctx.base_dir)?;
                Ok(split.rebuild(yaml.as_deref().unwrap_or(split.frontmatter), &outline))
            }
            None => Ok(outline),
        }
    }
}

const NULLS: &str = "ProcessFrontmatterNulls";
const INVALID_FIELDS: &str = "ProcessInvalidQuartoFrontmatterFields";

fn with_default_keys(config: &ModuleConfig, defaults: JsonValue) -> ModuleConfig {
    let mut config = config.clone();
    config.entry("erroneous_keys").or_insert(defaults);
    config
}

#[derive(Debug, Clone, Deserialize)]
pub struct FieldFixConfig {
    /// Key to replacement value. Strings are written verbatim, anything
    /// else as flow YAML.
    pub erroneous_keys: Map<String, JsonValue>,
}

/// Replaces `null` front matter values of configured keys. Backs both
/// `ProcessFrontmatterNulls` and `ProcessInvalidQuartoFrontmatterFields`.
pub struct FrontmatterFieldFix {
    name: &'static str,
    rules: Vec<(Regex, String)>,
}

impl FrontmatterFieldFix {
    pub fn new(name: &'static str, config: FieldFixConfig) -> Self {
        let rules = config
            .erroneous_keys
            .iter()
            .filter_map(|(key, value)| {
                let pattern = format!(r#"^{}:\s*"?null"?\s*$"#, regex::escape(key));
                let replacement = match value {
                    JsonValue::String(s) => s.clone(),
                    other => other.to_string(),
                };
                Regex::new(&pattern)
                    .ok()
                    .map(|re| (re, format!("{}: {}", key, replacement)))
            })
            .collect();
        Self { name, rules }
    }

    fn fix_line<'a>(&'a self, line: &'a str) -> &'a str {
        self.rules
            .iter()
            .find(|(re, _)| re.is_match(line))
            .map_or(line, |(_, replacement)| replacement.as_str())
    }
}

impl TransformModule for FrontmatterFieldFix {
    fn name(&self) -> &str {
        self.name
    }

    fn process(&self, input: &str, _ctx: &ModuleContext<'_>) -> Result<String> {
        let Some(split) = frontmatter::split(input) else {
            return Ok(input.to_string());
        };
        let mut yaml = String::with_capacity(split.frontmatter.len());
        for line in split.frontmatter.split_inclusive('\n') {
            let (content, terminator) = match line.strip_suffix('\n') {
                Some(content) => (content, "\n"),
                None => (line, ""),
            };
            let (content, cr) = match content.strip_suffix('\r') {
                Some(content) => (content, "\r"),
                None => (content, ""),
            };
            yaml.push_str(self.fix_line(content));
            yaml.push_str(cr);
            yaml.push_str(terminator);
        }
        Ok(split.rebuild(&yaml, split.body))
    }
}

/// Re-emits the front matter in canonical block style and drops spurious
/// `---` lines at the start of the body.
pub struct EnforceFrontmatterYaml;

impl EnforceFrontmatterYaml {
    pub const NAME: &'static str = "EnforceFrontmatterYAML";
}

fn strip_spurious_fences(body: &str) -> &str {
    let mut rest = body;
    loop {
        let (line, next) = match rest.find('\n') {
            Some(i) => (&rest[..i], &rest[i + 1..]),
            None => (rest, ""),
        };
        if line.trim_end() != "---" {
            return rest;
        }
        rest = next;
    }
}

impl TransformModule for EnforceFrontmatterYaml {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn process(&self, input: &str, _ctx: &ModuleContext<'_>) -> Result<String> {
        let Some(Split {
            frontmatter: yaml,
            body,
            ..
        }) = frontmatter::split(input)
        else {
            return Ok(input.to_string());
        };
        let map = frontmatter::parse_mapping(yaml)?;
        let canonical = frontmatter::emit_mapping(&map)?;
        Ok(frontmatter::assemble(&canonical, strip_spurious_fences(body)))
    }
}

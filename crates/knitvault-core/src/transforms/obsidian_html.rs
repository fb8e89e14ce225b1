/*
 * transforms/obsidian_html.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Cleanup of HTML artifacts and placeholders left by the vault exporter.
 */

use once_cell::sync::Lazy;
use percent_encoding::percent_decode_str;
use regex::{Captures, Regex};
use serde::Deserialize;

use crate::frontmatter;
use crate::registry::{ModuleFactory, decode_config};
use crate::transform::{ModuleContext, TransformModule};
use crate::{Error, Result};

pub(crate) fn factories() -> Vec<ModuleFactory> {
    vec![
        ModuleFactory {
            name: ConvertImageSrcs::NAME,
            family: "obsidian_html",
            accepted_args: &[],
            build: |_| Ok(Box::new(ConvertImageSrcs)),
        },
        ModuleFactory {
            name: RemoveIncludeErrors::NAME,
            family: "obsidian_html",
            accepted_args: &[],
            build: |config| {
                Ok(Box::new(RemoveIncludeErrors::new(decode_config(
                    RemoveIncludeErrors::NAME,
                    config,
                )?)?))
            },
        },
        ModuleFactory {
            name: ProcessTags::NAME,
            family: "obsidian_html",
            accepted_args: &["remove_hashtags_from_tags"],
            build: |config| {
                Ok(Box::new(ProcessTags::new(decode_config(
                    ProcessTags::NAME,
                    config,
                )?)))
            },
        },
    ]
}

static IMG_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<img\b([^>]*?)/?>").unwrap());
static HTML_ATTR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?s)([A-Za-z_:][-A-Za-z0-9_:.]*)\s*=\s*(?:"([^"]*)"|'([^']*)')"#).unwrap()
});
static FIGURE_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)</?figure\b[^>]*>").unwrap());
static FIGCAPTION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<figcaption\b[^>]*>.*?</figcaption>").unwrap());

/// Rewrites `<img>` tags into knitr `include_graphics` chunks and drops
/// the surrounding `<figure>` markup.
pub struct ConvertImageSrcs;

impl ConvertImageSrcs {
    pub const NAME: &'static str = "ConvertImageSRCs";
}

#[derive(Debug, Default)]
struct ImageAttributes {
    src: String,
    width: String,
    alt: String,
    title: String,
}

impl ImageAttributes {
    fn parse(attrs: &str) -> Self {
        let mut image = Self::default();
        for caps in HTML_ATTR.captures_iter(attrs) {
            let value = caps
                .get(2)
                .or_else(|| caps.get(3))
                .map_or("", |m| m.as_str())
                .to_string();
            match caps[1].to_ascii_lowercase().as_str() {
                "src" => image.src = value,
                "width" => image.width = value,
                "alt" => image.alt = value,
                "title" => image.title = value,
                _ => {}
            }
        }
        image
    }

    fn chunk(&self) -> String {
        let decoded = percent_decode_str(&self.src).decode_utf8_lossy();
        let mut src: &str = &decoded;
        while let Some(rest) = src.strip_prefix("../") {
            src = rest;
        }

        let mut options = String::from("r, echo=FALSE");
        for (key, value) in [
            ("out.width", self.width.clone()),
            ("fig.cap", decode_attr(&self.alt)),
            ("fig.title", decode_attr(&self.title)),
        ] {
            if !value.is_empty() {
                options.push_str(&format!(", {}='{}'", key, escape_quotes(&value)));
            }
        }

        format!(
            "```{{{}}}\nknitr::include_graphics('{}')\n```",
            options,
            escape_quotes(src)
        )
    }
}

fn decode_attr(value: &str) -> String {
    html_escape::decode_html_entities(value).into_owned()
}

fn escape_quotes(value: &str) -> String {
    value.replace('\'', "\\'")
}

impl TransformModule for ConvertImageSrcs {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn process(&self, input: &str, _ctx: &ModuleContext<'_>) -> Result<String> {
        let mut out = String::with_capacity(input.len());
        let mut last = 0;
        for caps in IMG_TAG.captures_iter(input) {
            let (Some(whole), Some(attrs)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            let image = ImageAttributes::parse(attrs.as_str());
            if image.src.is_empty() {
                continue;
            }
            out.push_str(&input[last..whole.start()]);
            // The chunk fences must sit on their own lines
            if !out.is_empty() && !out.ends_with('\n') {
                out.push('\n');
            }
            out.push_str(&image.chunk());
            if !input[whole.end()..].starts_with('\n') && whole.end() < input.len() {
                out.push('\n');
            }
            last = whole.end();
        }
        out.push_str(&input[last..]);

        let out = FIGCAPTION.replace_all(&out, "");
        let out = FIGURE_TAG.replace_all(&out, "");
        Ok(out.into_owned())
    }
}

fn default_error_needles() -> Vec<String> {
    vec![
        r"> \*\*obsidian-html error:\*\*[^\n]*\n?".to_string(),
        r#"<span class="include-error">[^<]*</span>"#.to_string(),
    ]
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IncludeErrorsConfig {
    /// Regexes whose matches are deleted
    pub error_needles: Vec<String>,
}

impl Default for IncludeErrorsConfig {
    fn default() -> Self {
        Self {
            error_needles: default_error_needles(),
        }
    }
}

/// Deletes exporter error messages left in place of failed includes.
pub struct RemoveIncludeErrors {
    needles: Vec<Regex>,
}

impl RemoveIncludeErrors {
    pub const NAME: &'static str = "RemoveObsidianHTMLIncludeErrors";

    pub fn new(config: IncludeErrorsConfig) -> Result<Self> {
        let needles = config
            .error_needles
            .iter()
            .map(|needle| {
                Regex::new(needle).map_err(|e| Error::ModuleConfig {
                    module: Self::NAME.to_string(),
                    message: format!("invalid error needle '{}': {}", needle, e),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { needles })
    }
}

impl TransformModule for RemoveIncludeErrors {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn process(&self, input: &str, _ctx: &ModuleContext<'_>) -> Result<String> {
        let mut out = input.to_string();
        for needle in &self.needles {
            if needle.is_match(&out) {
                out = needle.replace_all(&out, "").into_owned();
            }
        }
        Ok(out)
    }
}

const TAG_PATTERN_MARKER: &str = "_obsidian_pattern";

static TAG_PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"`?\{_obsidian_pattern_tag_([^}]*)\}`?").unwrap());
static TAGS_KEY: Lazy<Regex> = Lazy::new(|| Regex::new(r"^tags:\s*$").unwrap());
static LIST_ITEM: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*-\s*(.*?)\s*$").unwrap());

fn default_tag_end_chars() -> String {
    " ,;:!?".to_string()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProcessTagsConfig {
    /// Emit `T` instead of `#T` for tag placeholders
    pub remove_hashtags_from_tags: bool,
    /// A tag ends at the first of these characters
    pub obsidian_tag_end_chars: String,
}

impl Default for ProcessTagsConfig {
    fn default() -> Self {
        Self {
            remove_hashtags_from_tags: false,
            obsidian_tag_end_chars: default_tag_end_chars(),
        }
    }
}

/// Resolves the exporter's tag placeholders and rebuilds the front matter
/// `tags:` list.
pub struct ProcessTags {
    config: ProcessTagsConfig,
}

impl ProcessTags {
    pub const NAME: &'static str = "ProcessTags";

    pub fn new(config: ProcessTagsConfig) -> Self {
        Self { config }
    }

    fn clean_tag(&self, raw: &str) -> String {
        let raw = raw.trim().trim_matches(|c| c == '"' || c == '\'');
        let raw = match TAG_PLACEHOLDER.captures(raw) {
            Some(caps) => caps.get(1).map_or("", |m| m.as_str()),
            None => raw,
        };
        let raw = raw.trim_start_matches('#');
        let end = raw
            .find(|c| self.config.obsidian_tag_end_chars.contains(c))
            .unwrap_or(raw.len());
        raw[..end].trim().to_string()
    }

    fn replace_placeholders(&self, text: &str) -> String {
        TAG_PLACEHOLDER
            .replace_all(text, |caps: &Captures| {
                let tag = self.clean_tag(&caps[1]);
                if self.config.remove_hashtags_from_tags {
                    tag
                } else {
                    format!("#{}", tag)
                }
            })
            .into_owned()
    }

    /// Rewrite the `tags:` block of the front matter from its cleaned,
    /// de-duplicated items and collapse blank-line runs.
    fn rebuild_frontmatter(&self, yaml: &str) -> String {
        let lines: Vec<&str> = yaml.lines().collect();
        let mut out: Vec<String> = Vec::with_capacity(lines.len());
        let mut i = 0;
        while i < lines.len() {
            let line = lines[i];
            i += 1;
            if !TAGS_KEY.is_match(line) {
                out.push(line.to_string());
                continue;
            }
            let mut tags: Vec<String> = Vec::new();
            while i < lines.len() {
                let Some(caps) = LIST_ITEM.captures(lines[i]) else {
                    break;
                };
                let tag = self.clean_tag(&caps[1]);
                if !tag.is_empty() && !tags.contains(&tag) {
                    tags.push(tag);
                }
                i += 1;
            }
            if tags.is_empty() {
                out.push("tags: []".to_string());
            } else {
                out.push("tags:".to_string());
                out.extend(tags.iter().map(|t| format!("  - {}", t)));
            }
        }

        let mut collapsed: Vec<String> = Vec::with_capacity(out.len());
        for line in out {
            let blank = line.trim().is_empty();
            if blank && collapsed.last().is_some_and(|l| l.trim().is_empty()) {
                continue;
            }
            collapsed.push(line);
        }

        let mut yaml_out = collapsed.join("\n");
        if !yaml_out.is_empty() {
            yaml_out.push('\n');
        }
        yaml_out
    }
}

impl TransformModule for ProcessTags {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn process(&self, input: &str, _ctx: &ModuleContext<'_>) -> Result<String> {
        if !input.contains(TAG_PATTERN_MARKER) {
            return Ok(input.to_string());
        }
        match frontmatter::split(input) {
            Some(split) => {
                let yaml = self.rebuild_frontmatter(split.frontmatter);
                let body = self.replace_placeholders(split.body);
                Ok(split.rebuild(&yaml, &body))
            }
            None => Ok(self.replace_placeholders(input)),
        }
    }
}

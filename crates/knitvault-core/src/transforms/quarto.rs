/*
 * transforms/quarto.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Conversions into the Quarto Markdown dialect.
 */

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::Deserialize;

use crate::registry::{ModuleFactory, decode_config};
use crate::transform::{ModuleContext, TransformModule};
use crate::Result;

pub(crate) fn factories() -> Vec<ModuleFactory> {
    vec![
        ModuleFactory {
            name: ProcessDiagramCodeblocks::NAME,
            family: "quarto",
            accepted_args: &[],
            build: |config| {
                Ok(Box::new(ProcessDiagramCodeblocks::new(decode_config(
                    ProcessDiagramCodeblocks::NAME,
                    config,
                )?)))
            },
        },
        ModuleFactory {
            name: ConvertBookdownReferences::NAME,
            family: "quarto",
            accepted_args: &["quarto_strip_reference_prefixes"],
            build: |config| {
                Ok(Box::new(ConvertBookdownReferences::new(decode_config(
                    ConvertBookdownReferences::NAME,
                    config,
                )?)))
            },
        },
        ModuleFactory {
            name: ProcessEquationReferences::NAME,
            family: "quarto",
            accepted_args: &[],
            build: |_| Ok(Box::new(ProcessEquationReferences)),
        },
    ]
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DiagramCodeblocksConfig {
    pub codeblock_langs: Vec<String>,
}

impl Default for DiagramCodeblocksConfig {
    fn default() -> Self {
        Self {
            codeblock_langs: vec!["mermaid".to_string(), "dot".to_string()],
        }
    }
}

/// Turns diagram fences (```` ```mermaid ````) into executable cells
/// (```` ```{mermaid} ````).
pub struct ProcessDiagramCodeblocks {
    fences: Vec<(Regex, String)>,
}

impl ProcessDiagramCodeblocks {
    pub const NAME: &'static str = "ProcessDiagramCodeblocks";

    pub fn new(config: DiagramCodeblocksConfig) -> Self {
        let fences = config
            .codeblock_langs
            .iter()
            .filter(|lang| !lang.is_empty())
            .filter_map(|lang| {
                let pattern = format!(
                    r"(?m)^([ \t]*)(`{{3,}}|~{{3,}})[ \t]*{}[ \t]*(\r?)$",
                    regex::escape(lang)
                );
                Regex::new(&pattern).ok().map(|re| (re, lang.clone()))
            })
            .collect();
        Self { fences }
    }
}

impl TransformModule for ProcessDiagramCodeblocks {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn process(&self, input: &str, _ctx: &ModuleContext<'_>) -> Result<String> {
        let mut out = input.to_string();
        for (fence, lang) in &self.fences {
            if fence.is_match(&out) {
                out = fence
                    .replace_all(&out, |caps: &Captures| {
                        format!("{}{}{{{}}}{}", &caps[1], &caps[2], lang, &caps[3])
                    })
                    .into_owned();
            }
        }
        Ok(out)
    }
}

static BOOKDOWN_REF: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\\@ref\(([A-Za-z]+):([^)\s]+)\)").unwrap());
static INLINE_R: Lazy<Regex> = Lazy::new(|| Regex::new(r"`r ([^`\s]+)`").unwrap());

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BookdownReferencesConfig {
    /// Emit `[-@type-label]` (number only) instead of `@type-label`
    pub quarto_strip_reference_prefixes: bool,
}

/// Converts bookdown cross references (`\@ref(fig:label)`) to Quarto
/// syntax (`@fig-label`).
pub struct ConvertBookdownReferences {
    config: BookdownReferencesConfig,
}

impl ConvertBookdownReferences {
    pub const NAME: &'static str = "ConvertBookdownToQuartoReferencing";

    pub fn new(config: BookdownReferencesConfig) -> Self {
        Self { config }
    }
}

fn quarto_type(bookdown_type: &str) -> &str {
    match bookdown_type {
        "tab" => "tbl",
        other => other,
    }
}

impl TransformModule for ConvertBookdownReferences {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn process(&self, input: &str, _ctx: &ModuleContext<'_>) -> Result<String> {
        if !BOOKDOWN_REF.is_match(input) {
            return Ok(input.to_string());
        }

        let mut converted: HashMap<String, String> = HashMap::new();
        let out = BOOKDOWN_REF.replace_all(input, |caps: &Captures| {
            let label = &caps[2];
            let id = format!("{}-{}", quarto_type(&caps[1]), label);
            converted.insert(label.to_string(), id.clone());
            if self.config.quarto_strip_reference_prefixes {
                format!("[-@{}]", id)
            } else {
                format!("@{}", id)
            }
        });

        // Inline `r LABEL` spans follow their converted labels
        let out = INLINE_R.replace_all(&out, |caps: &Captures| match converted.get(&caps[1]) {
            Some(id) => format!("`r {}`", id),
            None => caps[0].to_string(),
        });
        Ok(out.into_owned())
    }
}

static EQUATION_LABEL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\$\$([^$]*?)\(\\#eq:([^)\s]+)\)([^$]*?)\$\$(\r?\n)*").unwrap()
});

/// Moves bookdown equation labels out of display math into a Quarto
/// `{#eq-label}` attribute block.
pub struct ProcessEquationReferences;

impl ProcessEquationReferences {
    pub const NAME: &'static str = "ProcessEquationReferences";
}

impl TransformModule for ProcessEquationReferences {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn process(&self, input: &str, _ctx: &ModuleContext<'_>) -> Result<String> {
        let out = EQUATION_LABEL.replace_all(input, |caps: &Captures| {
            let inner = format!("{}{}", caps[1].trim_end(), &caps[3]);
            format!("$${}$$\n\n$$ {{#eq-{}}}\n\n", inner, &caps[2])
        });
        Ok(out.into_owned())
    }
}

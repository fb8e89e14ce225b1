/*
 * transforms/layout.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Blank-line normalization around blocks.
 */

use once_cell::sync::Lazy;
use regex::Regex;

use super::{LineKind, classify_lines};
use crate::frontmatter;
use crate::registry::ModuleFactory;
use crate::transform::{ModuleContext, TransformModule};
use crate::Result;

pub(crate) fn factories() -> Vec<ModuleFactory> {
    vec![
        ModuleFactory {
            name: EnforceBlockLinebreaks::NAME,
            family: "layout",
            accepted_args: &[],
            build: |_| Ok(Box::new(EnforceBlockLinebreaks)),
        },
        ModuleFactory {
            name: EnforceMinimalLinebreaks::NAME,
            family: "layout",
            accepted_args: &[],
            build: |_| Ok(Box::new(EnforceMinimalLinebreaks)),
        },
    ]
}

static HEADING: Lazy<Regex> = Lazy::new(|| Regex::new(r"^#{1,6}\s+").unwrap());
static NEWLINE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\r?\n)(?:\r?\n){2,}").unwrap());

/// Exactly one blank line before fence openers and headings, exactly one
/// after fence closers. Front matter and fence interiors are untouched.
pub struct EnforceBlockLinebreaks;

impl EnforceBlockLinebreaks {
    pub const NAME: &'static str = "EnforceLinebreaksOnQuartoBlocks";
}

fn normalize_body(body: &str) -> String {
    // Lines keep their `\r`, so an inserted blank line must carry one too
    let blank = if body.contains("\r\n") { "\r" } else { "" };
    let mut out: Vec<&str> = Vec::new();
    let mut after_close = false;

    for line in classify_lines(body) {
        let starts_block = match line.kind {
            LineKind::FenceOpen => true,
            LineKind::Text => HEADING.is_match(line.text),
            _ => false,
        };

        if after_close && line.kind == LineKind::Text && line.is_blank() {
            continue;
        }

        if starts_block || after_close {
            // Leading blank lines of the body are left alone
            if out.iter().any(|l| !l.trim().is_empty()) {
                while out.last().is_some_and(|l| l.trim().is_empty()) {
                    out.pop();
                }
                out.push(blank);
            }
        }
        after_close = line.kind == LineKind::FenceClose;
        out.push(line.text);
    }

    let mut text = out.join("\n");
    if body.ends_with('\n') && !text.is_empty() {
        text.push('\n');
    }
    text
}

impl TransformModule for EnforceBlockLinebreaks {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn process(&self, input: &str, _ctx: &ModuleContext<'_>) -> Result<String> {
        Ok(match frontmatter::split(input) {
            Some(split) => split.rebuild(split.frontmatter, &normalize_body(split.body)),
            None => normalize_body(input),
        })
    }
}

/// Collapses three or more consecutive newlines into two, outside fenced
/// code.
pub struct EnforceMinimalLinebreaks;

impl EnforceMinimalLinebreaks {
    pub const NAME: &'static str = "EnforceMinimalLinebreaks";
}

impl TransformModule for EnforceMinimalLinebreaks {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn process(&self, input: &str, _ctx: &ModuleContext<'_>) -> Result<String> {
        // Protected spans run from a fence opener to the end of its closing
        // line, excluding the closer's terminator.
        let mut protected: Vec<(usize, usize)> = Vec::new();
        let mut open_at = None;
        for line in classify_lines(input) {
            match line.kind {
                LineKind::FenceOpen => open_at = Some(line.start),
                LineKind::FenceClose => {
                    if let Some(start) = open_at.take() {
                        protected.push((start, line.start + line.text.len()));
                    }
                }
                _ => {}
            }
        }
        if let Some(start) = open_at {
            protected.push((start, input.len()));
        }

        let mut out = String::with_capacity(input.len());
        let mut pos = 0;
        for (start, end) in protected {
            out.push_str(&NEWLINE_RUN.replace_all(&input[pos..start], "$1$1"));
            out.push_str(&input[start..end]);
            pos = end;
        }
        out.push_str(&NEWLINE_RUN.replace_all(&input[pos..], "$1$1"));
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transforms::test_support::run;

    #[test]
    fn test_blank_lines_around_blocks() {
        let input = "---\ntitle: T\n# comment: kept\n---\nIntro\n# Heading\nText\n\n\n\n```r\nx <- 1\n\n\ny <- 2\n```\nAfter\n## Sub\n";
        let output = run(&EnforceBlockLinebreaks, input);
        insta::assert_snapshot!(output, @r"
        ---
        title: T
        # comment: kept
        ---
        Intro

        # Heading
        Text

        ```r
        x <- 1


        y <- 2
        ```

        After

        ## Sub
        ");
    }

    #[test]
    fn test_block_linebreaks_identity_on_conforming() {
        let input = "---\ntitle: T\n---\n\n# Heading\n\nText\n\n```{mermaid}\nA\n```\n\nMore text\n";
        assert_eq!(run(&EnforceBlockLinebreaks, input), input);
        let no_frontmatter = "# Title\n\nplain\n";
        assert_eq!(run(&EnforceBlockLinebreaks, no_frontmatter), no_frontmatter);
    }

    #[test]
    fn test_fence_closer_at_end() {
        let input = "text\n```\ncode\n```\n";
        assert_eq!(
            run(&EnforceBlockLinebreaks, input),
            "text\n\n```\ncode\n```\n"
        );
    }

    #[test]
    fn test_block_linebreaks_keep_crlf() {
        let input = "Intro\r\n# Heading\r\nText\r\n```\r\ncode\r\n```\r\nAfter\r\n";
        assert_eq!(
            run(&EnforceBlockLinebreaks, input),
            "Intro\r\n\r\n# Heading\r\nText\r\n\r\n```\r\ncode\r\n```\r\n\r\nAfter\r\n"
        );
    }

    #[test]
    fn test_minimal_linebreaks() {
        let input = "a\n\n\n\nb\n```\nc\n\n\n\nd\n```\n\n\n\ne\n";
        assert_eq!(
            run(&EnforceMinimalLinebreaks, input),
            "a\n\nb\n```\nc\n\n\n\nd\n```\n\ne\n"
        );
    }

    #[test]
    fn test_minimal_linebreaks_identity() {
        let input = "a\n\nb\n\n```\n\n\n\n```\n";
        assert_eq!(run(&EnforceMinimalLinebreaks, input), input);
        assert_eq!(run(&EnforceMinimalLinebreaks, "\n\nx"), "\n\nx");
    }

    #[test]
    fn test_minimal_linebreaks_crlf() {
        assert_eq!(
            run(&EnforceMinimalLinebreaks, "a\r\n\r\n\r\nb"),
            "a\r\n\r\nb"
        );
    }
}

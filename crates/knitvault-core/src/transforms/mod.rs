/*
 * transforms/mod.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Built-in transform modules.
 */

//! Built-in transform modules, grouped by family:
//!
//! - [`frontmatter`] - front matter repair and canonicalization, outline purge
//! - [`obsidian_html`] - cleanup of exporter HTML artifacts and tag placeholders
//! - [`content`] - abstract reflow
//! - [`quarto`] - renderer dialect conversions
//! - [`layout`] - blank-line normalization
//!
//! [`external`] runs user-provided executables as modules.

pub mod content;
pub mod external;
pub mod frontmatter;
pub mod layout;
pub mod obsidian_html;
pub mod quarto;

use crate::frontmatter::line_spans;
use crate::registry::ModuleFactory;

/// Factories for every compiled-in module.
pub fn builtin_factories() -> Vec<ModuleFactory> {
    let mut factories = Vec::new();
    factories.extend(frontmatter::factories());
    factories.extend(obsidian_html::factories());
    factories.extend(content::factories());
    factories.extend(quarto::factories());
    factories.extend(layout::factories());
    factories
}

/// An open fenced code block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Fence {
    marker: char,
    len: usize,
}

impl Fence {
    /// Recognize a fence opener: up to three spaces of indentation, then
    /// three or more backticks or tildes.
    pub(crate) fn open(line: &str) -> Option<Fence> {
        let rest = strip_fence_indent(line)?;
        let marker = rest.chars().next()?;
        if marker != '`' && marker != '~' {
            return None;
        }
        let len = rest.chars().take_while(|&c| c == marker).count();
        if len < 3 {
            return None;
        }
        // Backtick info strings may not contain backticks
        if marker == '`' && rest[len..].contains('`') {
            return None;
        }
        Some(Fence { marker, len })
    }

    pub(crate) fn closes(&self, line: &str) -> bool {
        let Some(rest) = strip_fence_indent(line) else {
            return false;
        };
        let len = rest.chars().take_while(|&c| c == self.marker).count();
        len >= self.len && rest[len * self.marker.len_utf8()..].trim().is_empty()
    }
}

fn strip_fence_indent(line: &str) -> Option<&str> {
    let indent = line.len() - line.trim_start_matches(' ').len();
    (indent <= 3).then(|| &line[indent..])
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LineKind {
    Text,
    FenceOpen,
    FenceBody,
    FenceClose,
}

/// A line with its byte span and fenced-code classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Line<'a> {
    /// Line content without the `\n` terminator
    pub text: &'a str,
    pub start: usize,
    /// Start of the next line
    pub next: usize,
    pub kind: LineKind,
}

impl Line<'_> {
    pub(crate) fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }

    pub(crate) fn in_fence(&self) -> bool {
        self.kind != LineKind::Text
    }
}

/// Split text into lines, marking fenced code. An unclosed fence runs to
/// the end of the text.
pub(crate) fn classify_lines(text: &str) -> Vec<Line<'_>> {
    let mut open: Option<Fence> = None;
    line_spans(text)
        .map(|(start, end, next)| {
            let line = &text[start..end];
            let kind = match open {
                Some(fence) if fence.closes(line) => {
                    open = None;
                    LineKind::FenceClose
                }
                Some(_) => LineKind::FenceBody,
                None => match Fence::open(line) {
                    Some(fence) => {
                        open = Some(fence);
                        LineKind::FenceOpen
                    }
                    None => LineKind::Text,
                },
            };
            Line {
                text: line,
                start,
                next,
                kind,
            }
        })
        .collect()
}

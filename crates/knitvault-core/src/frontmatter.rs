/*
 * frontmatter.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Front matter splitting, parsing and emission.
 */

//! Front matter handling for document strings.
//!
//! A document string starts with a block fenced by `---` lines. Most
//! modules only need the raw text of that block, so [`split`] hands out
//! borrowed slices and [`Split::rebuild`] puts a document back together
//! byte-for-byte when nothing changed. Modules that need structured access
//! go through [`parse_mapping`] / [`emit_mapping`], which use the
//! order-preserving `serde_yaml::Mapping`.

use serde_yaml::{Mapping, Value};

use crate::{Error, Result};

/// A document split into its front matter and body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Split<'a> {
    /// Opening fence line, including its line terminator
    pub open: &'a str,
    /// Text between the fences
    pub frontmatter: &'a str,
    /// Closing fence line, including its line terminator (if any)
    pub close: &'a str,
    /// Everything after the closing fence
    pub body: &'a str,
}

impl Split<'_> {
    /// Reassemble a document from replacement front matter and body.
    pub fn rebuild(&self, frontmatter: &str, body: &str) -> String {
        let mut out = String::with_capacity(
            self.open.len() + frontmatter.len() + self.close.len() + body.len() + 1,
        );
        out.push_str(self.open);
        out.push_str(frontmatter);
        if !frontmatter.is_empty() && !frontmatter.ends_with('\n') {
            out.push('\n');
        }
        out.push_str(self.close);
        if !self.close.ends_with('\n') && !body.is_empty() {
            out.push('\n');
        }
        out.push_str(body);
        out
    }
}

/// Iterate over `(start, end, next)` byte offsets of each line, where
/// `end` excludes the `\n` and `next` is the start of the following line.
pub(crate) fn line_spans(text: &str) -> impl Iterator<Item = (usize, usize, usize)> + '_ {
    let mut pos = 0;
    std::iter::from_fn(move || {
        if pos >= text.len() {
            return None;
        }
        let start = pos;
        match text[start..].find('\n') {
            Some(i) => {
                pos = start + i + 1;
                Some((start, start + i, pos))
            }
            None => {
                pos = text.len();
                Some((start, text.len(), text.len()))
            }
        }
    })
}

fn is_fence(line: &str) -> bool {
    line.trim_end() == "---"
}

/// Split a document into front matter and body.
///
/// Returns `None` when the document does not open with a `---` line or the
/// block is never closed.
pub fn split(document: &str) -> Option<Split<'_>> {
    let mut spans = line_spans(document);
    let (start, end, after_open) = spans.next()?;
    if !is_fence(&document[start..end]) {
        return None;
    }
    for (line_start, line_end, next) in spans {
        if is_fence(&document[line_start..line_end]) {
            return Some(Split {
                open: &document[..after_open],
                frontmatter: &document[after_open..line_start],
                close: &document[line_start..next],
                body: &document[next..],
            });
        }
    }
    None
}

/// Parse front matter text into an ordered mapping.
///
/// Empty or null front matter yields an empty mapping.
pub fn parse_mapping(yaml: &str) -> Result<Mapping> {
    if yaml.trim().is_empty() {
        return Ok(Mapping::new());
    }
    let value: Value =
        serde_yaml::from_str(yaml).map_err(|e| Error::Frontmatter(e.to_string()))?;
    match value {
        Value::Mapping(map) => Ok(map),
        Value::Null => Ok(Mapping::new()),
        other => Err(Error::Frontmatter(format!(
            "expected a mapping, found {}",
            value_kind(&other)
        ))),
    }
}

/// Emit a mapping as block-style YAML (no document markers).
///
/// An empty mapping emits as the empty string so that the document keeps a
/// bare `---`/`---` pair.
pub fn emit_mapping(map: &Mapping) -> Result<String> {
    if map.is_empty() {
        return Ok(String::new());
    }
    serde_yaml::to_string(map).map_err(|e| Error::Frontmatter(e.to_string()))
}

/// Build a document from front matter text and a body.
pub fn assemble(frontmatter: &str, body: &str) -> String {
    let mut out = String::from("---\n");
    out.push_str(frontmatter);
    if !frontmatter.is_empty() && !frontmatter.ends_with('\n') {
        out.push('\n');
    }
    out.push_str("---\n");
    out.push_str(body);
    out
}

/// Look up a string key in a mapping.
pub fn get<'a>(map: &'a Mapping, key: &str) -> Option<&'a Value> {
    map.get(Value::String(key.to_string()))
}

pub(crate) fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Sequence(_) => "sequence",
        Value::Mapping(_) => "mapping",
        Value::Tagged(_) => "tagged value",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_basic() {
        let doc = "---\ntitle: Hello\n---\n# Body\n";
        let split = split(doc).unwrap();
        assert_eq!(split.frontmatter, "title: Hello\n");
        assert_eq!(split.body, "# Body\n");
        assert_eq!(split.rebuild(split.frontmatter, split.body), doc);
    }

    #[test]
    fn test_split_requires_opening_fence() {
        assert!(split("# Title\n---\n").is_none());
        assert!(split("---\ntitle: unterminated\n").is_none());
    }

    #[test]
    fn test_split_empty_frontmatter_and_no_trailing_newline() {
        let doc = "---\n---";
        let split = split(doc).unwrap();
        assert_eq!(split.frontmatter, "");
        assert_eq!(split.body, "");
        assert_eq!(split.rebuild("", ""), doc);
    }

    #[test]
    fn test_rebuild_preserves_crlf_fences() {
        let doc = "---\r\na: 1\r\n---\r\nbody";
        let split = split(doc).unwrap();
        assert_eq!(split.rebuild(split.frontmatter, split.body), doc);
    }

    #[test]
    fn test_parse_mapping_preserves_order() {
        let map = parse_mapping("zeta: 1\nalpha: 2\n").unwrap();
        let keys: Vec<_> = map.keys().filter_map(|k| k.as_str()).collect();
        assert_eq!(keys, vec!["zeta", "alpha"]);
        assert_eq!(emit_mapping(&map).unwrap(), "zeta: 1\nalpha: 2\n");
    }

    #[test]
    fn test_parse_mapping_rejects_scalars() {
        assert!(matches!(
            parse_mapping("just text"),
            Err(Error::Frontmatter(_))
        ));
        assert!(parse_mapping("").unwrap().is_empty());
        assert!(parse_mapping("~\n").unwrap().is_empty());
    }

    #[test]
    fn test_assemble() {
        assert_eq!(assemble("a: 1", "text"), "---\na: 1\n---\ntext");
        assert_eq!(assemble("", "text"), "---\n---\ntext");
    }
}

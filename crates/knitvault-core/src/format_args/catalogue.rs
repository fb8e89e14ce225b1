/*
 * format_args/catalogue.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Output format catalogue parsing.
 */

//! Output format catalogue.
//!
//! The catalogue is a small line-oriented text format:
//!
//! ```text
//! quarto::pdf
//!     toc:checkbox|Type:boolean|Default:1|String:"Table of contents"
//!     toc-depth:edit|Type:Integer|Default:3|Min:1|Max:6
//!     filesuffix:Meta|Value:pdf
//! ;quarto::typst
//!     filesuffix:Meta|Value:pdf
//! ```
//!
//! Unindented lines name a format (`;` disables it, `#` is a file comment),
//! indented lines describe its parameters, and a blank line closes the
//! section. Indented lines starting with `;` are comments.

use std::collections::BTreeMap;
use std::path::Path;

use super::parameter::{Control, ParamType, Parameter, forward_slashes};
use crate::{Error, Result};

/// The built-in catalogue.
pub const DEFAULT_CATALOGUE: &str = include_str!("../../resources/default_formats.txt");

/// Delimiter separating a display label from the actual path in
/// reference-document values.
pub const DEFAULT_REFERENCE_DOC_DELIMITER: &str = "-<>-";

/// Options influencing catalogue parsing and emission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogueOptions {
    pub reference_doc_delimiter: String,
    /// Fail when a `file` parameter's default does not exist
    pub check_file_defaults: bool,
}

impl Default for CatalogueOptions {
    fn default() -> Self {
        Self {
            reference_doc_delimiter: DEFAULT_REFERENCE_DOC_DELIMITER.to_string(),
            check_file_defaults: true,
        }
    }
}

/// Meta fields of a format. These template the wrapper string and are
/// never shown as controls.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormatMeta {
    pub filesuffix: String,
    pub inputsuffix: String,
    pub renderingpackage_start: String,
    pub renderingpackage_end: String,
    pub dateformat: String,
    pub package: String,
    /// Meta fields with names not listed above
    pub extra: Vec<(String, String)>,
}

impl FormatMeta {
    fn set(&mut self, name: &str, value: String) {
        match name {
            "filesuffix" => self.filesuffix = value,
            "inputsuffix" => self.inputsuffix = value,
            "renderingpackage_start" => self.renderingpackage_start = value,
            "renderingpackage_end" => self.renderingpackage_end = value,
            "dateformat" => self.dateformat = value,
            "package" => self.package = value,
            _ => self.extra.push((name.to_string(), value)),
        }
    }
}

/// One output format with its parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputFormat {
    /// Compound name, e.g. `quarto::pdf`
    pub name: String,
    pub enabled: bool,
    pub parameters: Vec<Parameter>,
    pub meta: FormatMeta,
    pub(crate) reference_doc_delimiter: String,
}

impl OutputFormat {
    fn new(name: &str, enabled: bool, options: &CatalogueOptions) -> Self {
        Self {
            name: name.to_string(),
            enabled,
            parameters: Vec::new(),
            meta: FormatMeta::default(),
            reference_doc_delimiter: options.reference_doc_delimiter.clone(),
        }
    }

    /// The package half of the name (`quarto` in `quarto::pdf`).
    pub fn package(&self) -> &str {
        self.name.split_once("::").map_or("", |(p, _)| p)
    }

    /// The format half of the name (`pdf` in `quarto::pdf`).
    pub fn format(&self) -> &str {
        self.name.split_once("::").map_or(&self.name, |(_, f)| f)
    }

    /// File-system friendly identifier: `quarto::pdf` becomes `quarto_pdf`.
    pub fn format_id(&self) -> String {
        self.name.replace("::", "_")
    }

    pub fn parameter(&self, name: &str) -> Option<&Parameter> {
        self.parameters.iter().find(|p| p.name == name)
    }

    /// Set a parameter value, validating that it coerces.
    pub fn set_value(&mut self, name: &str, value: &str) -> Result<()> {
        let format = self.name.clone();
        let param = self
            .parameters
            .iter_mut()
            .find(|p| p.name == name)
            .ok_or_else(|| {
                Error::bad_value(name, value, format!("no such parameter in '{}'", format))
            })?;
        param.set_value(value)
    }

    /// Current raw values keyed by parameter name.
    pub fn values(&self) -> BTreeMap<String, String> {
        self.parameters
            .iter()
            .map(|p| (p.name.clone(), p.raw_value().to_string()))
            .collect()
    }

    /// Apply previously saved values. Unknown names are ignored so that a
    /// catalogue edit does not invalidate saved state.
    pub fn apply_values(&mut self, values: &BTreeMap<String, String>) -> Result<()> {
        for (name, value) in values {
            if self.parameter(name).is_none() {
                tracing::debug!(format = %self.name, param = %name, "Ignoring saved value for unknown parameter");
                continue;
            }
            self.set_value(name, value)?;
        }
        Ok(())
    }
}

/// A parsed catalogue of output formats, in file order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Catalogue {
    formats: Vec<OutputFormat>,
}

impl Catalogue {
    /// Parse the built-in catalogue.
    pub fn embedded() -> Result<Self> {
        Self::parse(DEFAULT_CATALOGUE, &CatalogueOptions::default())
    }

    /// Read and parse a catalogue file.
    pub fn load(path: &Path, options: &CatalogueOptions) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        Self::parse(&text, options)
    }

    /// Parse catalogue text.
    pub fn parse(text: &str, options: &CatalogueOptions) -> Result<Self> {
        let text = text.strip_prefix('\u{feff}').unwrap_or(text);
        let mut formats: Vec<OutputFormat> = Vec::new();
        let mut current: Option<OutputFormat> = None;

        for (idx, raw_line) in text.lines().enumerate() {
            let line_no = idx + 1;

            if raw_line.trim().is_empty() {
                finish_section(&mut formats, current.take(), options)?;
                continue;
            }

            if !raw_line.starts_with([' ', '\t']) {
                finish_section(&mut formats, current.take(), options)?;
                let header = raw_line.trim();
                if header.starts_with('#') {
                    continue;
                }
                let (enabled, name) = match header.strip_prefix(';') {
                    Some(rest) => (false, rest.trim()),
                    None => (true, header),
                };
                validate_format_name(name, line_no)?;
                if formats.iter().any(|f| f.name == name) {
                    return Err(malformed(line_no, format!("duplicate format '{}'", name)));
                }
                current = Some(OutputFormat::new(name, enabled, options));
                continue;
            }

            let content = raw_line.trim();
            if content.starts_with(';') {
                continue;
            }
            let Some(format) = current.as_mut() else {
                return Err(malformed(
                    line_no,
                    "indented line outside of a format section",
                ));
            };
            parse_section_line(format, content, line_no)?;
        }
        finish_section(&mut formats, current.take(), options)?;

        Ok(Self { formats })
    }

    pub fn formats(&self) -> &[OutputFormat] {
        &self.formats
    }

    pub fn enabled_formats(&self) -> impl Iterator<Item = &OutputFormat> {
        self.formats.iter().filter(|f| f.enabled)
    }

    /// Look up a format by compound name.
    pub fn format(&self, name: &str) -> Result<&OutputFormat> {
        self.formats
            .iter()
            .find(|f| f.name == name)
            .ok_or_else(|| Error::FormatNotFound(name.to_string()))
    }

    pub fn format_mut(&mut self, name: &str) -> Result<&mut OutputFormat> {
        self.formats
            .iter_mut()
            .find(|f| f.name == name)
            .ok_or_else(|| Error::FormatNotFound(name.to_string()))
    }

    /// Take a copy of an enabled format for a run.
    pub fn select(&self, name: &str) -> Result<OutputFormat> {
        let format = self.format(name)?;
        if !format.enabled {
            return Err(Error::FormatNotFound(format!(
                "{} (disabled in catalogue)",
                name
            )));
        }
        Ok(format.clone())
    }
}

fn malformed(line: usize, message: impl Into<String>) -> Error {
    Error::MalformedCatalogue {
        line,
        message: message.into(),
    }
}

fn validate_format_name(name: &str, line_no: usize) -> Result<()> {
    match name.split_once("::") {
        Some((package, format))
            if !package.is_empty()
                && !format.is_empty()
                && !name.chars().any(char::is_whitespace) =>
        {
            Ok(())
        }
        _ => Err(malformed(
            line_no,
            format!("expected a format name of the form <package>::<format>, found '{}'", name),
        )),
    }
}

fn finish_section(
    formats: &mut Vec<OutputFormat>,
    section: Option<OutputFormat>,
    options: &CatalogueOptions,
) -> Result<()> {
    let Some(mut format) = section else {
        return Ok(());
    };
    let check_files = options.check_file_defaults && format.enabled;
    for param in &mut format.parameters {
        param.assume_default(check_files)?;
    }
    formats.push(format);
    Ok(())
}

/// Split on `sep`, ignoring separators inside double quotes.
fn split_unquoted(s: &str, sep: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut in_quotes = false;
    let mut start = 0;
    for (i, c) in s.char_indices() {
        if c == '"' {
            in_quotes = !in_quotes;
        } else if c == sep && !in_quotes {
            parts.push(&s[start..i]);
            start = i + c.len_utf8();
        }
    }
    parts.push(&s[start..]);
    parts
}

fn strip_quotes(s: &str) -> String {
    let s = s.trim();
    if s.len() >= 2 && s.starts_with('"') && s.ends_with('"') {
        s[1..s.len() - 1].to_string()
    } else {
        s.to_string()
    }
}

fn looks_like_key(key: &str) -> bool {
    !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

fn split_options(raw: &str) -> Vec<String> {
    let sep = if raw.contains('|') { '|' } else { ',' };
    raw.split(sep)
        .map(strip_quotes)
        .filter(|o| !o.is_empty())
        .collect()
}

fn parse_bound(raw: &str, line_no: usize) -> Result<Option<f64>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    raw.parse::<f64>()
        .map(Some)
        .map_err(|_| malformed(line_no, format!("invalid numeric bound '{}'", raw)))
}

fn parse_section_line(format: &mut OutputFormat, content: &str, line_no: usize) -> Result<()> {
    let segments = split_unquoted(content, '|');
    let (name, control) = segments[0]
        .split_once(':')
        .ok_or_else(|| malformed(line_no, "expected <param>:<control>"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(malformed(line_no, "empty parameter name"));
    }
    let control = Control::try_from(control).map_err(|e| malformed(line_no, e))?;

    let mut fields: Vec<(String, String)> = Vec::new();
    for segment in &segments[1..] {
        match segment.split_once(':') {
            Some((key, value)) if looks_like_key(key.trim()) => {
                fields.push((key.trim().to_string(), value.trim().to_string()));
            }
            _ => match fields.last_mut() {
                Some((key, value)) if key.eq_ignore_ascii_case("ctrlOptions") => {
                    value.push('|');
                    value.push_str(segment.trim());
                }
                _ if segment.trim().is_empty() => {}
                _ => {
                    return Err(malformed(
                        line_no,
                        format!("expected Key:Value, found '{}'", segment),
                    ));
                }
            },
        }
    }

    if control == Control::Meta {
        let value = fields
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case("Value"))
            .map(|(_, v)| v.clone())
            .unwrap_or_default();
        format.meta.set(name, value);
        return Ok(());
    }

    if format.parameter(name).is_some() {
        return Err(malformed(line_no, format!("duplicate parameter '{}'", name)));
    }

    let mut param = Parameter::new(name, control);
    for (key, value) in fields {
        match key.to_ascii_lowercase().as_str() {
            "type" => {
                param.param_type =
                    ParamType::try_from(value.as_str()).map_err(|e| malformed(line_no, e))?;
            }
            "default" => param.default = strip_quotes(&value),
            "string" => param.description = strip_quotes(&value),
            "min" => param.min = parse_bound(&value, line_no)?,
            "max" => param.max = parse_bound(&value, line_no)?,
            "ctrloptions" => param.ctrl_options = split_options(&value),
            "tab3parent" => param.tab3_parent = Some(value),
            "link" => param.link = Some(value),
            "linktext" => param.linktext = Some(value),
            "searchpath" => param.search_path = Some(forward_slashes(&strip_quotes(&value))),
            "value" => param.value = Some(value),
            _ => param.extra.push((key, value)),
        }
    }
    format.parameters.push(param);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
# sample catalogue
quarto::pdf
\ttoc:checkbox|Type:boolean|Default:1|String:\"Table of contents\"|Tab3Parent:General
\ttoc-depth:edit|Type:Integer|Default:3|Min:1|Max:6
\t; a comment line
\tdocumentclass:ddl|Type:String|Default:\"article\"|ctrlOptions:article|report|book|Foo:bar
\tfilesuffix:Meta|Value:pdf
\tpackage:Meta|Value:quarto

;quarto::typst
\tfilesuffix:Meta|Value:pdf
";

    #[test]
    fn test_parse_sample() {
        let catalogue = Catalogue::parse(SAMPLE, &CatalogueOptions::default()).unwrap();
        assert_eq!(catalogue.formats().len(), 2);
        assert_eq!(catalogue.enabled_formats().count(), 1);

        let pdf = catalogue.format("quarto::pdf").unwrap();
        assert_eq!(pdf.package(), "quarto");
        assert_eq!(pdf.format(), "pdf");
        assert_eq!(pdf.format_id(), "quarto_pdf");
        assert_eq!(pdf.meta.filesuffix, "pdf");
        assert_eq!(pdf.parameters.len(), 3);

        let toc = pdf.parameter("toc").unwrap();
        assert_eq!(toc.param_type, ParamType::Boolean);
        assert_eq!(toc.description, "Table of contents");
        assert_eq!(toc.tab3_parent.as_deref(), Some("General"));
        assert_eq!(toc.raw_value(), "1");

        let depth = pdf.parameter("toc-depth").unwrap();
        assert_eq!(depth.min, Some(1.0));
        assert_eq!(depth.max, Some(6.0));

        let class = pdf.parameter("documentclass").unwrap();
        assert_eq!(class.default, "article");
        assert_eq!(class.ctrl_options, vec!["article", "report", "book"]);
        assert_eq!(class.extra, vec![("Foo".to_string(), "bar".to_string())]);
    }

    #[test]
    fn test_disabled_format_cannot_be_selected() {
        let catalogue = Catalogue::parse(SAMPLE, &CatalogueOptions::default()).unwrap();
        assert!(!catalogue.format("quarto::typst").unwrap().enabled);
        assert!(matches!(
            catalogue.select("quarto::typst"),
            Err(Error::FormatNotFound(_))
        ));
        assert!(matches!(
            catalogue.select("quarto::epub"),
            Err(Error::FormatNotFound(_))
        ));
    }

    #[test]
    fn test_malformed_lines() {
        let options = CatalogueOptions::default();
        let err = Catalogue::parse("\ttoc:checkbox\n", &options).unwrap_err();
        assert!(matches!(err, Error::MalformedCatalogue { line: 1, .. }));

        let err = Catalogue::parse("pdf\n", &options).unwrap_err();
        assert!(matches!(err, Error::MalformedCatalogue { line: 1, .. }));

        let err = Catalogue::parse("quarto::pdf\n\ttoc:slider\n", &options).unwrap_err();
        assert!(matches!(err, Error::MalformedCatalogue { line: 2, .. }));

        let err = Catalogue::parse("quarto::pdf\n\ttoc:edit|Min:low\n", &options).unwrap_err();
        assert!(matches!(err, Error::MalformedCatalogue { line: 2, .. }));
    }

    #[test]
    fn test_quoted_pipes_are_not_split() {
        let text = "quarto::html\n\ttitle-prefix:edit|Default:\"a|b\"\n";
        let catalogue = Catalogue::parse(text, &CatalogueOptions::default()).unwrap();
        let param = catalogue
            .format("quarto::html")
            .unwrap()
            .parameter("title-prefix")
            .unwrap();
        assert_eq!(param.default, "a|b");
    }

    #[test]
    fn test_set_and_apply_values() {
        let mut catalogue = Catalogue::parse(SAMPLE, &CatalogueOptions::default()).unwrap();
        let pdf = catalogue.format_mut("quarto::pdf").unwrap();
        pdf.set_value("toc", "false").unwrap();
        assert!(pdf.set_value("toc", "maybe").is_err());
        assert!(pdf.set_value("missing", "1").is_err());

        let mut saved = pdf.values();
        assert_eq!(saved.get("toc").map(String::as_str), Some("false"));
        saved.insert("gone".into(), "1".into());
        saved.insert("toc-depth".into(), "5".into());
        pdf.apply_values(&saved).unwrap();
        assert_eq!(pdf.parameter("toc-depth").unwrap().raw_value(), "5");
    }

    #[test]
    fn test_embedded_catalogue_parses() {
        let catalogue = Catalogue::embedded().unwrap();
        for name in ["quarto::html", "quarto::pdf", "quarto::docx"] {
            let format = catalogue.select(name).unwrap();
            assert!(!format.meta.filesuffix.is_empty(), "{name}");
            assert!(!format.meta.inputsuffix.is_empty(), "{name}");
        }
    }
}

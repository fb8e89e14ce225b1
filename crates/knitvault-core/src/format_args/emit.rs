/*
 * format_args/emit.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Wrapper string and metadata document emission.
 */

//! Emission of the two per-format artifacts: the wrapper string embedded
//! in the renderer invocation, and the metadata document passed to the
//! renderer's `--metadata-file` option.
//!
//! Both share the same selection rules (see [`OutputFormat::emitted_parameters`]).

use std::fmt::Write as _;
use std::path::Path;

use serde_yaml::{Mapping, Value};

use super::catalogue::OutputFormat;
use super::parameter::{ParamType, ParamValue, Parameter, forward_slashes, parse_bool};
use crate::{Error, Result};

const TOC_GATE: &str = "toc";
const TOC_DEPTH_NAMES: &[&str] = &["toc-depth", "toc_depth"];
const REFERENCE_DOC_NAMES: &[&str] = &["reference-doc", "reference_docx"];

impl OutputFormat {
    /// Parameters that take part in emission, with their coerced values, in
    /// catalogue order.
    ///
    /// Suppressed: parameters with empty value and empty default, and the
    /// table-of-contents depth while the `toc` checkbox is off.
    pub fn emitted_parameters(&self) -> Result<Vec<(&Parameter, ParamValue)>> {
        let toc_enabled = match self.parameter(TOC_GATE) {
            Some(gate) => parse_bool(&gate.name, gate.raw_value())?,
            None => true,
        };

        let mut emitted = Vec::new();
        for param in &self.parameters {
            if param.param_type == ParamType::Meta || param.is_blank() {
                continue;
            }
            if !toc_enabled && TOC_DEPTH_NAMES.contains(&param.name.as_str()) {
                continue;
            }
            let value = if REFERENCE_DOC_NAMES.contains(&param.name.as_str()) {
                self.resolve_reference_doc(param)?
            } else {
                param.effective_value()?
            };
            emitted.push((param, value));
        }
        Ok(emitted)
    }

    /// Resolve a reference document value carrying a `label<delim>path`
    /// pair.
    fn resolve_reference_doc(&self, param: &Parameter) -> Result<ParamValue> {
        let raw = param.raw_value();
        let delimiter = self.reference_doc_delimiter.as_str();
        if delimiter.is_empty() || !raw.contains(delimiter) {
            return param.effective_value();
        }

        let candidate = raw
            .rsplit_once(delimiter)
            .map_or(raw, |(_, tail)| tail)
            .trim();
        let candidate = forward_slashes(candidate);
        if Path::new(&candidate).exists() {
            return Ok(ParamValue::Text(candidate));
        }
        if Path::new(raw).exists() {
            return Ok(ParamValue::Text(forward_slashes(raw)));
        }
        Err(Error::MissingReferenceDoc(raw.to_string()))
    }

    /// Build the wrapper string.
    ///
    /// `%name%` in the start and end templates is replaced with
    /// `output_basename`. Every parameter line ends with a comma; the end
    /// template supplies the final argument and closes the call.
    pub fn wrapper_string(&self, output_basename: &str) -> Result<String> {
        let mut out = String::new();
        out.push_str(&self.meta.renderingpackage_start.replace("%name%", output_basename));
        out.push('\n');
        for (param, value) in self.emitted_parameters()? {
            let _ = writeln!(
                out,
                "{} = {},",
                wrapper_key(&param.name),
                wrapper_value(&value)
            );
        }
        out.push_str(&self.meta.renderingpackage_end.replace("%name%", output_basename));
        Ok(out)
    }

    /// Build the renderer metadata document. `NULL` values are left out.
    pub fn metadata_document(&self) -> Result<Mapping> {
        let mut map = Mapping::new();
        for (param, value) in self.emitted_parameters()? {
            let yaml = match value {
                ParamValue::Bool(b) => Value::Bool(b),
                ParamValue::Integer(i) => Value::Number(i.into()),
                ParamValue::Number(n) => Value::Number(n.into()),
                ParamValue::Text(s) => Value::String(s),
                ParamValue::Null => continue,
            };
            map.insert(Value::String(param.name.clone()), yaml);
        }
        Ok(map)
    }
}

fn wrapper_key(name: &str) -> String {
    if name.contains('-') {
        format!("'{}'", name)
    } else {
        name.to_string()
    }
}

fn wrapper_value(value: &ParamValue) -> String {
    match value {
        ParamValue::Bool(true) => "TRUE".to_string(),
        ParamValue::Bool(false) => "FALSE".to_string(),
        ParamValue::Integer(i) => i.to_string(),
        ParamValue::Number(n) => n.to_string(),
        ParamValue::Text(s) => format!("\"{}\"", s.replace('"', "\\\"")),
        ParamValue::Null => "NULL".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format_args::{Catalogue, CatalogueOptions};

    fn catalogue(text: &str) -> Catalogue {
        Catalogue::parse(text, &CatalogueOptions::default()).unwrap()
    }

    #[test]
    fn test_boolean_hyphenated_line() {
        let mut c = catalogue(
            "quarto::html\n\tnumber-sections:checkbox|Type:boolean|Default:0\n",
        );
        let html = c.format_mut("quarto::html").unwrap();
        html.set_value("number-sections", "1").unwrap();
        let wrapper = html.wrapper_string("doc").unwrap();
        assert!(wrapper.lines().any(|l| l == "'number-sections' = TRUE,"));
    }

    #[test]
    fn test_boolean_tokens_emit_uppercase() {
        for (token, expected) in [
            ("1", "TRUE"),
            ("true", "TRUE"),
            ("TRUE", "TRUE"),
            ("0", "FALSE"),
            ("False", "FALSE"),
            ("3", "TRUE"),
        ] {
            let mut c = catalogue("r::doc\n\tflag:checkbox|Default:0\n");
            let f = c.format_mut("r::doc").unwrap();
            f.set_value("flag", token).unwrap();
            let wrapper = f.wrapper_string("x").unwrap();
            assert!(
                wrapper.contains(&format!("flag = {},", expected)),
                "{token}: {wrapper}"
            );
        }
    }

    #[test]
    fn test_wrapper_shape() {
        let c = catalogue(
            "bookdown::html_document2
\ttoc:checkbox|Type:boolean|Default:1
\ttoc_depth:edit|Type:Integer|Default:3|Min:1|Max:6
\ttheme:ddl|Type:String|Default:\"cosmo\"
\tcss:edit|Type:String|Default:NULL
\tempty:edit|Type:String
\tfig_width:edit|Type:Number|Default:6.5
\trenderingpackage_start:Meta|Value:rmarkdown::render(\"%name%.rmd\", bookdown::html_document2(
\trenderingpackage_end:Meta|Value:pandoc_args = NULL), output_file = \"%name%.html\")
",
        );
        let wrapper = c
            .format("bookdown::html_document2")
            .unwrap()
            .wrapper_string("note")
            .unwrap();
        insta::assert_snapshot!(wrapper, @r#"
        rmarkdown::render("note.rmd", bookdown::html_document2(
        toc = TRUE,
        toc_depth = 3,
        theme = "cosmo",
        css = NULL,
        fig_width = 6.5,
        pandoc_args = NULL), output_file = "note.html")
        "#);
    }

    #[test]
    fn test_toc_depth_suppressed_without_toc() {
        let mut c = catalogue(
            "quarto::pdf\n\ttoc:checkbox|Default:1\n\ttoc-depth:edit|Type:Integer|Default:3\n",
        );
        let pdf = c.format_mut("quarto::pdf").unwrap();
        assert!(pdf.metadata_document().unwrap().contains_key("toc-depth"));
        pdf.set_value("toc", "0").unwrap();
        let meta = pdf.metadata_document().unwrap();
        assert!(!meta.contains_key("toc-depth"));
        assert_eq!(meta.get("toc"), Some(&Value::Bool(false)));
    }

    #[test]
    fn test_metadata_document_types() {
        let c = catalogue(
            "quarto::pdf
\ttoc-depth:edit|Type:Integer|Default:9|Min:1|Max:6
\tfontsize:edit|Type:String|Default:\"11pt\"
\tlinestretch:edit|Type:Number|Default:1.5
\tcss:edit|Type:String|Default:NULL
",
        );
        let meta = c.format("quarto::pdf").unwrap().metadata_document().unwrap();
        assert_eq!(meta.get("toc-depth"), Some(&Value::Number(6.into())));
        assert_eq!(meta.get("fontsize"), Some(&Value::String("11pt".into())));
        assert_eq!(meta.get("linestretch"), Some(&Value::Number(1.5.into())));
        assert!(!meta.contains_key("css"));
    }

    #[test]
    fn test_reference_doc_delimiter() {
        let temp = tempfile::TempDir::new().unwrap();
        let doc = temp.path().join("template.docx");
        std::fs::write(&doc, b"").unwrap();
        let doc_str = doc.to_string_lossy().replace('\\', "/");

        let mut c = catalogue("quarto::docx\n\treference-doc:file|Type:String\n");
        let docx = c.format_mut("quarto::docx").unwrap();
        docx.set_value("reference-doc", &format!("Company-<>-{}", doc_str))
            .unwrap();
        let meta = docx.metadata_document().unwrap();
        assert_eq!(
            meta.get("reference-doc"),
            Some(&Value::String(doc_str.clone()))
        );

        docx.set_value("reference-doc", "Company-<>-/nowhere/x.docx")
            .unwrap();
        assert!(matches!(
            docx.metadata_document(),
            Err(Error::MissingReferenceDoc(_))
        ));
    }
}

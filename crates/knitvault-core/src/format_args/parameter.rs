/*
 * format_args/parameter.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Parameter descriptors and typed values.
 */

//! Parameter descriptors and value coercion.
//!
//! Values are stored as the raw strings the user (or the catalogue)
//! supplied. Coercion to a typed [`ParamValue`] happens on demand through
//! [`Parameter::effective_value`], which applies boolean normalization and
//! numeric clamping.

use std::path::{Path, PathBuf};

use crate::{Error, Result};

/// UI control used for a parameter. The core only cares about `File`
/// (path normalization), `Checkbox` (default type) and `Meta`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Control {
    Edit,
    File,
    Ddl,
    Combobox,
    Datetime,
    Checkbox,
    Meta,
}

impl Control {
    pub fn as_str(&self) -> &'static str {
        match self {
            Control::Edit => "edit",
            Control::File => "file",
            Control::Ddl => "ddl",
            Control::Combobox => "combobox",
            Control::Datetime => "datetime",
            Control::Checkbox => "checkbox",
            Control::Meta => "meta",
        }
    }
}

impl TryFrom<&str> for Control {
    type Error = String;

    fn try_from(s: &str) -> std::result::Result<Self, Self::Error> {
        match s.trim().to_ascii_lowercase().as_str() {
            "edit" => Ok(Control::Edit),
            "file" => Ok(Control::File),
            "ddl" => Ok(Control::Ddl),
            "combobox" => Ok(Control::Combobox),
            "datetime" => Ok(Control::Datetime),
            "checkbox" => Ok(Control::Checkbox),
            "meta" => Ok(Control::Meta),
            other => Err(format!("unknown control '{}'", other)),
        }
    }
}

/// Declared value type of a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamType {
    Integer,
    Number,
    String,
    Boolean,
    Meta,
}

impl ParamType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParamType::Integer => "Integer",
            ParamType::Number => "Number",
            ParamType::String => "String",
            ParamType::Boolean => "boolean",
            ParamType::Meta => "meta",
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, ParamType::Integer | ParamType::Number)
    }
}

impl TryFrom<&str> for ParamType {
    type Error = String;

    fn try_from(s: &str) -> std::result::Result<Self, Self::Error> {
        match s.trim().to_ascii_lowercase().as_str() {
            "integer" => Ok(ParamType::Integer),
            "number" => Ok(ParamType::Number),
            "string" => Ok(ParamType::String),
            "boolean" | "bool" => Ok(ParamType::Boolean),
            "meta" => Ok(ParamType::Meta),
            other => Err(format!("unknown type '{}'", other)),
        }
    }
}

/// A coerced parameter value.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Bool(bool),
    Integer(i64),
    Number(f64),
    Text(String),
    /// The literal `NULL`
    Null,
}

/// A single parameter of an output format.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub name: String,
    pub control: Control,
    pub param_type: ParamType,
    pub default: String,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub ctrl_options: Vec<String>,
    /// Human-readable description (`String:` key)
    pub description: String,
    pub tab3_parent: Option<String>,
    pub link: Option<String>,
    pub linktext: Option<String>,
    pub search_path: Option<String>,
    pub value: Option<String>,
    /// Keys the catalogue grammar does not know about, in catalogue order
    pub extra: Vec<(String, String)>,
}

impl Parameter {
    pub fn new(name: impl Into<String>, control: Control) -> Self {
        let param_type = match control {
            Control::Checkbox => ParamType::Boolean,
            Control::Meta => ParamType::Meta,
            _ => ParamType::String,
        };
        Self {
            name: name.into(),
            control,
            param_type,
            default: String::new(),
            min: None,
            max: None,
            ctrl_options: Vec::new(),
            description: String::new(),
            tab3_parent: None,
            link: None,
            linktext: None,
            search_path: None,
            value: None,
            extra: Vec::new(),
        }
    }

    /// The stored value, falling back to the default.
    pub fn raw_value(&self) -> &str {
        self.value.as_deref().unwrap_or(&self.default)
    }

    /// True when both value and default are empty; such parameters are
    /// never emitted.
    pub fn is_blank(&self) -> bool {
        self.raw_value().is_empty() && self.default.is_empty()
    }

    /// Fill in `value` from `default` if it is unset.
    ///
    /// For `file` controls the default is joined onto `searchPath`. When
    /// `check_files` is set, a non-empty default that does not exist on disk
    /// is an error.
    pub fn assume_default(&mut self, check_files: bool) -> Result<()> {
        if self.value.is_some() {
            return Ok(());
        }
        if self.control != Control::File || self.default.is_empty() || self.default == "NULL" {
            self.value = Some(self.default.clone());
            return Ok(());
        }

        let path = match self.search_path.as_deref() {
            Some(dir) if !dir.is_empty() => Path::new(dir).join(&self.default),
            _ => PathBuf::from(&self.default),
        };
        if check_files && !path.exists() {
            return Err(Error::MissingFile {
                param: self.name.clone(),
                path,
            });
        }
        self.value = Some(forward_slashes(&path.to_string_lossy()));
        Ok(())
    }

    /// Store a new raw value and check that it coerces.
    pub fn set_value(&mut self, value: &str) -> Result<()> {
        let value = if self.control == Control::File {
            forward_slashes(value)
        } else {
            value.to_string()
        };
        let previous = self.value.replace(value);
        if let Err(e) = self.effective_value() {
            self.value = previous;
            return Err(e);
        }
        Ok(())
    }

    /// Coerce the current value according to the declared type.
    pub fn effective_value(&self) -> Result<ParamValue> {
        let raw = self.raw_value();
        match self.param_type {
            ParamType::Boolean => parse_bool(&self.name, raw).map(ParamValue::Bool),
            ParamType::Integer => {
                clamp_numeric(self, raw).map(|v| ParamValue::Integer(v.trunc() as i64))
            }
            ParamType::Number => clamp_numeric(self, raw).map(ParamValue::Number),
            ParamType::String | ParamType::Meta => {
                if raw == "NULL" {
                    Ok(ParamValue::Null)
                } else if self.control == Control::File {
                    Ok(ParamValue::Text(forward_slashes(raw)))
                } else {
                    Ok(ParamValue::Text(raw.to_string()))
                }
            }
        }
    }
}

pub(crate) fn forward_slashes(s: &str) -> String {
    s.replace('\\', "/")
}

/// Normalize a boolean token.
///
/// Accepts `1`, `0`, `true`, `false` (any case) and any other number,
/// where non-zero is true.
pub fn parse_bool(param: &str, raw: &str) -> Result<bool> {
    let token = raw.trim().to_ascii_lowercase();
    match token.as_str() {
        "1" | "true" => Ok(true),
        "0" | "false" => Ok(false),
        _ => match token.parse::<f64>() {
            Ok(n) if !n.is_nan() => Ok(n != 0.0),
            _ => Err(Error::bad_value(param, raw, "expected a boolean")),
        },
    }
}

fn parse_number(param: &str, raw: &str) -> Result<f64> {
    raw.trim()
        .parse::<f64>()
        .map_err(|_| Error::bad_value(param, raw, "expected a number"))
}

/// Clamp a numeric value into the parameter's bounds.
///
/// With both bounds present the value is clamped. A value that still
/// violates a defined bound (one-sided bounds, NaN) is replaced by the
/// default.
fn clamp_numeric(param: &Parameter, raw: &str) -> Result<f64> {
    let raw = if raw.trim().is_empty() {
        param.default.as_str()
    } else {
        raw
    };
    let parsed = parse_number(&param.name, raw)?;

    let candidate = match (param.min, param.max) {
        (Some(lo), Some(hi)) if lo <= hi && !parsed.is_nan() => parsed.clamp(lo, hi),
        _ => parsed,
    };

    let within = !candidate.is_nan()
        && param.min.is_none_or(|lo| candidate >= lo)
        && param.max.is_none_or(|hi| candidate <= hi);
    if within {
        Ok(candidate)
    } else {
        parse_number(&param.name, &param.default)
    }
}

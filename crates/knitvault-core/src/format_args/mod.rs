/*
 * format_args/mod.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Format-argument model.
 */

//! Format-argument model.
//!
//! Parses the output format catalogue, holds per-parameter values, and
//! emits the two per-format artifacts consumed downstream:
//!
//! - [`OutputFormat::wrapper_string`] - the renderer invocation string
//! - [`OutputFormat::metadata_document`] - the renderer configuration mapping
//!
//! ```ignore
//! use knitvault_core::format_args::Catalogue;
//!
//! let catalogue = Catalogue::embedded()?;
//! let mut pdf = catalogue.select("quarto::pdf")?;
//! pdf.set_value("toc", "true")?;
//! let metadata = pdf.metadata_document()?;
//! ```

mod catalogue;
mod emit;
mod parameter;

pub use catalogue::{
    Catalogue, CatalogueOptions, DEFAULT_CATALOGUE, DEFAULT_REFERENCE_DOC_DELIMITER, FormatMeta,
    OutputFormat,
};
pub use parameter::{Control, ParamType, ParamValue, Parameter, parse_bool};

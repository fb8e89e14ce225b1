/*
 * overrides.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Command-line overrides of format parameters and module arguments.
 */

//! Command-line overrides.
//!
//! Trailing `convert` arguments of the form `namespace::key=value`:
//!
//! - `<package>::<format>::<param>=value` sets a format parameter
//! - `args::<key>=value` sets a run-wide module argument; the value is read
//!   as a JSON literal when it parses as one, else as a string

use std::collections::BTreeMap;

use anyhow::{Result, bail};
use knitvault_core::RunArguments;

const RUN_ARGS_NAMESPACE: &str = "args";

#[derive(Debug, Default)]
pub struct Overrides {
    /// Format name to parameter values
    pub formats: BTreeMap<String, BTreeMap<String, String>>,
    pub run_args: RunArguments,
}

impl Overrides {
    pub fn parse<S: AsRef<str>>(items: &[S]) -> Result<Self> {
        let mut overrides = Self::default();
        for item in items {
            let item = item.as_ref();
            let Some((key, value)) = item.split_once('=') else {
                bail!("Override '{}' is not of the form namespace::key=value", item);
            };
            let Some((namespace, name)) = key.rsplit_once("::") else {
                bail!("Override '{}' has no namespace", item);
            };
            if name.is_empty() || namespace.is_empty() {
                bail!("Override '{}' has an empty key", item);
            }

            if namespace == RUN_ARGS_NAMESPACE {
                overrides.run_args.set_from_str(name, value);
            } else if namespace.contains("::") {
                overrides
                    .formats
                    .entry(namespace.to_string())
                    .or_default()
                    .insert(name.to_string(), value.to_string());
            } else {
                bail!(
                    "Unknown override namespace '{}' (expected '{}' or <package>::<format>)",
                    namespace,
                    RUN_ARGS_NAMESPACE
                );
            }
        }
        Ok(overrides)
    }

    pub fn for_format(&self, name: &str) -> Option<&BTreeMap<String, String>> {
        self.formats.get(name)
    }
}

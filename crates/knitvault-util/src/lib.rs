//! Shared utilities for knitvault

pub mod version;

pub use version::{cargo_version, cli_version};

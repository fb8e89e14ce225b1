/*
 * error.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Error types for knitvault-core.
 */

//! Error types for knitvault-core

use std::path::PathBuf;

use thiserror::Error;

/// Broad classification of a failure, used to decide when a run aborts
/// and how the failure is reported to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed catalogue, unknown format or module, bad coercion
    Configuration,
    /// Missing manifest, unresolved reference, missing referenced file
    Dependency,
    /// A transform module failed while processing
    Module,
    /// Renderer missing or exited unsuccessfully
    Render,
    /// Filesystem failure while writing temp, staging or audit files
    Io,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Configuration => "configuration error",
            ErrorKind::Dependency => "dependency error",
            ErrorKind::Module => "module error",
            ErrorKind::Render => "render error",
            ErrorKind::Io => "I/O error",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("Output format not found in catalogue: {0}")]
    FormatNotFound(String),

    #[error("Malformed catalogue at line {line}: {message}")]
    MalformedCatalogue { line: usize, message: String },

    #[error("Bad value '{value}' for parameter '{param}': {reason}")]
    BadValue {
        param: String,
        value: String,
        reason: String,
    },

    #[error("Output format selected more than once: {0}")]
    DuplicateFormat(String),

    #[error("Invalid pipeline configuration: {0}")]
    Pipeline(String),

    #[error("Invalid configuration for module '{module}': {message}")]
    ModuleConfig { module: String, message: String },

    #[error("Malformed front matter: {0}")]
    Frontmatter(String),

    #[error("Exporter manifest not found: {}", .0.display())]
    ManifestMissing(PathBuf),

    #[error("Failed to parse exporter manifest {}: {message}", path.display())]
    ManifestParse { path: PathBuf, message: String },

    #[error("Unresolved dependency '{0}': no file in the exporter manifest matches it")]
    UnresolvedDependency(String),

    #[error("Reference document does not exist: {0}")]
    MissingReferenceDoc(String),

    #[error("File referenced by parameter '{param}' does not exist: {}", path.display())]
    MissingFile { param: String, path: PathBuf },

    #[error("Module '{name}' (position {position}) failed: {source}")]
    Module {
        name: String,
        position: usize,
        #[source]
        source: Box<Error>,
    },

    #[error("{0}")]
    ModuleProcess(String),

    #[error("Renderer binary not found: {0}")]
    RendererMissing(String),

    #[error("Rendering '{format}' failed (exit code {code}): {stderr}")]
    RenderFailed {
        format: String,
        code: i32,
        stderr: String,
    },

    #[error("Failed to start render worker pool: {0}")]
    WorkerPool(String),

    #[error("Failed to write temporary file {}: {source}", path.display())]
    TempFileIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::FormatNotFound(_)
            | Error::MalformedCatalogue { .. }
            | Error::BadValue { .. }
            | Error::DuplicateFormat(_)
            | Error::Pipeline(_)
            | Error::ModuleConfig { .. } => ErrorKind::Configuration,
            Error::ManifestMissing(_)
            | Error::ManifestParse { .. }
            | Error::UnresolvedDependency(_)
            | Error::MissingReferenceDoc(_)
            | Error::MissingFile { .. } => ErrorKind::Dependency,
            Error::Module { .. } | Error::ModuleProcess(_) | Error::Frontmatter(_) => {
                ErrorKind::Module
            }
            Error::RendererMissing(_) | Error::RenderFailed { .. } | Error::WorkerPool(_) => {
                ErrorKind::Render
            }
            Error::TempFileIo { .. } | Error::Io { .. } => ErrorKind::Io,
        }
    }

    /// Wrap an I/O error together with the path it happened on.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }

    /// Error raised from inside a module's `process`.
    pub fn module_process(msg: impl Into<String>) -> Self {
        Error::ModuleProcess(msg.into())
    }

    pub(crate) fn bad_value(
        param: impl Into<String>,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Error::BadValue {
            param: param.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds() {
        assert_eq!(
            Error::FormatNotFound("x::y".into()).kind(),
            ErrorKind::Configuration
        );
        assert_eq!(
            Error::UnresolvedDependency("refs.bib".into()).kind(),
            ErrorKind::Dependency
        );
        assert_eq!(
            Error::RenderFailed {
                format: "quarto::pdf".into(),
                code: 1,
                stderr: String::new()
            }
            .kind(),
            ErrorKind::Render
        );
        let wrapped = Error::Module {
            name: "ProcessTags".into(),
            position: 3,
            source: Box::new(Error::module_process("boom")),
        };
        assert_eq!(wrapped.kind(), ErrorKind::Module);
        assert!(wrapped.to_string().contains("ProcessTags"));
        assert!(wrapped.to_string().contains("position 3"));
    }
}

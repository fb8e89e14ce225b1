/*
 * transforms/external.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * User-provided modules run as child processes.
 */

//! External transform modules.
//!
//! An external module is an executable. The protocol:
//!
//! - The document is written to stdin
//! - The merged module configuration is passed as a JSON object in the
//!   `KNITVAULT_MODULE_CONFIG` environment variable
//! - The transformed document is read from stdout
//! - A non-zero exit status fails the module; stderr is reported

use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};

use serde_json::Value;

use crate::transform::{ModuleConfig, ModuleContext, TransformModule};
use crate::{Error, Result};

/// Environment variable carrying the module configuration.
pub const CONFIG_ENV: &str = "KNITVAULT_MODULE_CONFIG";

pub struct ExternalModule {
    name: String,
    program: PathBuf,
    config: ModuleConfig,
}

impl ExternalModule {
    pub fn new(name: impl Into<String>, program: PathBuf, config: ModuleConfig) -> Self {
        Self {
            name: name.into(),
            program,
            config,
        }
    }
}

impl TransformModule for ExternalModule {
    fn name(&self) -> &str {
        &self.name
    }

    fn process(&self, input: &str, ctx: &ModuleContext<'_>) -> Result<String> {
        let config_json = Value::Object(self.config.clone()).to_string();

        let mut cmd = Command::new(&self.program);
        cmd.env(CONFIG_ENV, config_json)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = ctx.base_dir {
            cmd.current_dir(dir);
        }

        tracing::debug!(module = %self.name, program = %self.program.display(), "Spawning external module");
        let mut child = cmd.spawn().map_err(|e| {
            Error::module_process(format!(
                "failed to spawn {}: {}",
                self.program.display(),
                e
            ))
        })?;

        // Feed stdin from its own thread so a module that streams its
        // output cannot fill the stdout pipe while we are still writing.
        let writer = child.stdin.take().map(|mut stdin| {
            let document = input.to_owned();
            std::thread::spawn(move || stdin.write_all(document.as_bytes()))
        });

        let output = child
            .wait_with_output()
            .map_err(|e| Error::module_process(format!("failed to wait for module: {}", e)))?;

        let written = match writer.map(|handle| handle.join()) {
            None => Ok(()),
            Some(Ok(result)) => result,
            Some(Err(_)) => Err(std::io::Error::other("stdin writer panicked")),
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::module_process(format!(
                "exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        // A module may exit successfully without reading all of its input
        if let Err(e) = written
            && e.kind() != std::io::ErrorKind::BrokenPipe
        {
            return Err(Error::module_process(format!(
                "failed to write document to module stdin: {}",
                e
            )));
        }

        String::from_utf8(output.stdout)
            .map_err(|e| Error::module_process(format!("module output is not UTF-8: {}", e)))
    }
}

/*
 * cli.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Integration tests for the knitvault command-line interface.
 */

//! Integration tests for the CLI.
//!
//! Every test runs the built binary against its own configuration
//! directory, so no test touches the user's settings.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use tempfile::TempDir;

struct Cli {
    temp: TempDir,
}

impl Cli {
    fn new() -> Self {
        Self {
            temp: TempDir::new().expect("Failed to create temp directory"),
        }
    }

    fn config_dir(&self) -> PathBuf {
        self.temp.path().join("config")
    }

    fn run(&self, args: &[&str]) -> Output {
        Command::new(env!("CARGO_BIN_EXE_knitvault"))
            .arg("--config-dir")
            .arg(self.config_dir())
            .args(args)
            .env_remove("RUST_LOG")
            .output()
            .expect("Failed to run knitvault")
    }

    fn ok(&self, args: &[&str]) -> String {
        let output = self.run(args);
        assert!(
            output.status.success(),
            "knitvault {:?} failed: {}",
            args,
            String::from_utf8_lossy(&output.stderr)
        );
        String::from_utf8_lossy(&output.stdout).into_owned()
    }

    fn settings(&self) -> serde_json::Value {
        let text = fs::read_to_string(self.config_dir().join("settings.json")).unwrap();
        serde_json::from_str(&text).unwrap()
    }
}

fn path_str(path: &Path) -> &str {
    path.to_str().unwrap()
}

#[test]
fn test_version() {
    let cli = Cli::new();
    let stdout = cli.ok(&["version"]);
    assert!(stdout.starts_with("knitvault 0."));
}

#[test]
fn test_formats_lists_catalogue() {
    let cli = Cli::new();
    let stdout = cli.ok(&["formats"]);
    let pdf = stdout.lines().find(|l| l.starts_with("quarto::pdf")).unwrap();
    assert!(pdf.contains("enabled"));
    assert!(pdf.ends_with(".pdf"));
    let disabled = stdout
        .lines()
        .find(|l| l.starts_with("bookdown::pdf_document2"))
        .unwrap();
    assert!(disabled.contains("disabled"));
}

#[test]
fn test_formats_prints_wrapper() {
    let cli = Cli::new();
    let stdout = cli.ok(&["formats", "--wrapper", "quarto::html", "--output-name", "Paper"]);
    assert!(stdout.starts_with("quarto::quarto_render(\"Paper.qmd\", output_format = \"html\""));
    assert!(stdout.trim_end().ends_with("lang = \"en\"))"));

    let output = cli.run(&["formats", "--wrapper", "bookdown::pdf_document2"]);
    assert!(!output.status.success());
}

#[test]
fn test_tools_set_list_unset() {
    let cli = Cli::new();
    let tool = cli.temp.path().join("quarto-bin");
    fs::write(&tool, "").unwrap();

    cli.ok(&["tools", "set", "quarto", path_str(&tool)]);
    assert_eq!(cli.settings()["tools"]["quarto"], path_str(&tool));
    assert!(cli.ok(&["tools", "list"]).contains("quarto\t"));

    cli.ok(&["tools", "unset", "quarto"]);
    assert!(cli.ok(&["tools", "list"]).is_empty());
    assert!(!cli.run(&["tools", "unset", "quarto"]).status.success());
}

#[test]
fn test_tools_set_rejects_missing_file() {
    let cli = Cli::new();
    let output = cli.run(&["tools", "set", "quarto", "/no/such/quarto"]);
    assert!(!output.status.success());
}

#[test]
fn test_settings_export_import() {
    let cli = Cli::new();
    let file = cli.temp.path().join("exported.json");
    cli.ok(&["export", path_str(&file)]);
    let exported: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&file).unwrap()).unwrap();
    assert_eq!(exported["version"], 1);

    fs::write(
        &file,
        r#"{"version": 1, "tools": {"quarto": "/opt/quarto"}, "run": {"formats": ["quarto::html"]}}"#,
    )
    .unwrap();
    cli.ok(&["import", path_str(&file)]);
    assert_eq!(cli.settings()["run"]["formats"][0], "quarto::html");

    fs::write(&file, r#"{"version": 42}"#).unwrap();
    assert!(!cli.run(&["import", path_str(&file)]).status.success());
}

#[test]
fn test_processingmodules_export_and_list() {
    let cli = Cli::new();
    let file = cli.temp.path().join("pipeline.json");
    cli.ok(&["processingmodules", "export", path_str(&file)]);
    let records: Vec<serde_json::Value> =
        serde_json::from_str(&fs::read_to_string(&file).unwrap()).unwrap();
    assert_eq!(records.len(), 13);
    assert_eq!(records[0]["module_name"], "RemoveObsidianHTMLIncludeErrors");

    let listing = cli.ok(&["processingmodules", "list"]);
    assert!(listing.contains("PurgeContents"));
    assert!(
        listing
            .lines()
            .any(|l| l.contains("PurgeContents") && l.contains("disabled"))
    );
}

#[test]
fn test_processingmodules_remove_builtin_record() {
    let cli = Cli::new();
    cli.ok(&["processingmodules", "remove", "ProcessAbstract"]);
    let user = fs::read_to_string(cli.config_dir().join("pipeline.json")).unwrap();
    assert!(!user.contains("ProcessAbstract"));
    assert!(
        !cli.run(&["processingmodules", "remove", "ProcessAbstract"])
            .status
            .success()
    );
}

#[cfg(unix)]
mod unix {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    fn executable(path: &Path, body: &str) {
        fs::write(path, body).unwrap();
        fs::set_permissions(path, fs::Permissions::from_mode(0o755)).unwrap();
    }

    /// Exporter output with one note and its bibliography.
    fn export_tree(root: &Path) -> PathBuf {
        let export = root.join("export");
        let vault = root.join("vault");
        let bib = vault.join("refs.bib");
        fs::create_dir_all(&vault).unwrap();
        fs::write(&bib, "@book{a, title={A}}\n").unwrap();

        let note = export.join("mod").join("Paper.md");
        fs::create_dir_all(note.parent().unwrap()).unwrap();
        fs::write(
            &note,
            "---\ntitle: Paper\naliases: null\nbibliography: refs.bib\n---\n# Intro\n```mermaid\nA-->B\n```\nSee [@a].\n",
        )
        .unwrap();

        let index = export.join("mod").join("index");
        fs::create_dir_all(&index).unwrap();
        fs::write(
            index.join("files.json"),
            serde_json::to_string(&[&note, &bib]).unwrap(),
        )
        .unwrap();
        fs::write(
            index.join("paths.json"),
            serde_json::json!({
                "obsidian_folder": vault,
                "obsidian_entrypoint": vault.join("Paper.md"),
            })
            .to_string(),
        )
        .unwrap();
        export
    }

    fn install_renderer(cli: &Cli) {
        let renderer = cli.temp.path().join("fake-quarto");
        executable(
            &renderer,
            "#!/bin/sh\nif [ \"$4\" = \"pdf\" ]; then echo 'no TeX' >&2; exit 1; fi\ncp \"$2\" \"$8\"\n",
        );
        cli.ok(&["tools", "set", "quarto", path_str(&renderer)]);
    }

    #[test]
    fn test_convert_end_to_end() {
        let cli = Cli::new();
        install_renderer(&cli);
        let export = export_tree(cli.temp.path());
        let out = cli.temp.path().join("out");

        let stdout = cli.ok(&[
            "convert",
            "--exporter-output",
            path_str(&export),
            "--output-dir",
            path_str(&out),
            "--format",
            "quarto::html",
            "--format",
            "quarto::docx",
            "quarto::html::toc=0",
        ]);
        assert!(stdout.contains("quarto::html\t"));
        assert!(stdout.contains("quarto::docx\t"));

        let html = fs::read_to_string(out.join("Paper.html")).unwrap();
        assert!(html.contains("aliases: []"));
        assert!(html.contains("```{mermaid}"));
        let staged_bib = export.join("refs.bib");
        assert!(staged_bib.is_file());
        assert!(html.contains(&format!("bibliography: {}", staged_bib.display())));

        let config = fs::read_to_string(out.join("quarto_html_config.yaml")).unwrap();
        assert!(config.contains("toc: false"));
        assert!(!config.contains("toc-depth"));

        let audit = out.join(".knitvault").join("modules");
        assert!(audit.join("ProcessDiagramCodeblocks").join("output.md").is_file());
        let log = fs::read_to_string(out.join(".knitvault").join("resource_log.txt")).unwrap();
        assert!(log.contains("[module]"));
        assert!(log.contains("[dependency]"));
        assert!(log.contains("[render]"));

        let settings = cli.settings();
        assert_eq!(settings["run"]["formats"][1], "quarto::docx");
        assert_eq!(settings["run"]["values"]["quarto::html"]["toc"], "0");
        assert_eq!(settings["run"]["last_output_dir"], path_str(&out));
    }

    #[test]
    fn test_convert_reuses_saved_formats() {
        let cli = Cli::new();
        install_renderer(&cli);
        let export = export_tree(cli.temp.path());
        let out = cli.temp.path().join("out");
        let base = [
            "convert",
            "--exporter-output",
            path_str(&export),
            "--output-dir",
            path_str(&out),
        ];

        let mut first = base.to_vec();
        first.extend(["--format", "quarto::html", "--output-name", "draft"]);
        cli.ok(&first);
        fs::remove_file(out.join("draft.html")).unwrap();

        let stdout = cli.ok(&base);
        assert!(stdout.contains("quarto::html\t"));
        assert!(out.join("Paper.html").is_file());
    }

    #[test]
    fn test_parallel_convert_reports_failed_format() {
        let cli = Cli::new();
        install_renderer(&cli);
        let export = export_tree(cli.temp.path());
        let out = cli.temp.path().join("out");

        let output = cli.run(&[
            "convert",
            "--exporter-output",
            path_str(&export),
            "--output-dir",
            path_str(&out),
            "--parallel",
            "--format",
            "quarto::pdf",
            "--format",
            "quarto::html",
        ]);
        assert!(!output.status.success());
        let stderr = String::from_utf8_lossy(&output.stderr);
        assert!(stderr.contains("quarto::pdf"));
        assert!(stderr.contains("no TeX"));
        assert!(out.join("Paper.html").is_file());
    }

    #[test]
    fn test_repeated_format_renders_once() {
        let cli = Cli::new();
        install_renderer(&cli);
        let export = export_tree(cli.temp.path());
        let out = cli.temp.path().join("out");

        let stdout = cli.ok(&[
            "convert",
            "--exporter-output",
            path_str(&export),
            "--output-dir",
            path_str(&out),
            "--parallel",
            "--format",
            "quarto::html",
            "--format",
            "quarto::html",
        ]);
        assert_eq!(stdout.lines().filter(|l| l.starts_with("quarto::html\t")).count(), 1);
        assert!(out.join("Paper.html").is_file());
        assert_eq!(cli.settings()["run"]["formats"], serde_json::json!(["quarto::html"]));
    }

    #[test]
    fn test_unwritable_resource_log_fails_the_run() {
        let cli = Cli::new();
        install_renderer(&cli);
        let export = export_tree(cli.temp.path());
        let out = cli.temp.path().join("out");
        // A directory where the log file should go
        fs::create_dir_all(out.join(".knitvault").join("resource_log.txt")).unwrap();

        let output = cli.run(&[
            "convert",
            "--exporter-output",
            path_str(&export),
            "--output-dir",
            path_str(&out),
            "--format",
            "quarto::html",
        ]);
        assert!(!output.status.success());
        let stderr = String::from_utf8_lossy(&output.stderr);
        assert!(stderr.contains("Failed to write the resource log"));
        assert!(stderr.contains("I/O error"));
    }

    #[test]
    fn test_missing_manifest_names_kind_and_audit_dir() {
        let cli = Cli::new();
        install_renderer(&cli);
        let out = cli.temp.path().join("out");
        let output = cli.run(&[
            "convert",
            "--exporter-output",
            path_str(&cli.temp.path().join("nowhere")),
            "--output-dir",
            path_str(&out),
            "--format",
            "quarto::html",
        ]);
        assert!(!output.status.success());
        let stderr = String::from_utf8_lossy(&output.stderr);
        assert!(stderr.contains("dependency error"));
        assert!(stderr.contains("files.json"));
        assert!(stderr.contains(path_str(&out.join(".knitvault").join("modules"))));
    }

    #[test]
    fn test_external_module_runs_in_pipeline() {
        let cli = Cli::new();
        install_renderer(&cli);
        let module = cli.temp.path().join("Shout");
        executable(&module, "#!/bin/sh\ntr 'a-z' 'A-Z'\n");
        cli.ok(&["processingmodules", "add", path_str(&module)]);
        assert!(cli.config_dir().join("modules").join("Shout").is_file());
        assert!(cli.ok(&["processingmodules", "list"]).contains("Shout"));

        let export = export_tree(cli.temp.path());
        let out = cli.temp.path().join("out");
        cli.ok(&[
            "convert",
            "--exporter-output",
            path_str(&export),
            "--output-dir",
            path_str(&out),
            "--format",
            "quarto::html",
        ]);
        let html = fs::read_to_string(out.join("Paper.html")).unwrap();
        assert!(html.contains("SEE [@A]."));

        cli.ok(&["processingmodules", "remove", "Shout"]);
        assert!(!cli.config_dir().join("modules").join("Shout").exists());
    }
}

//! knitvault CLI - Main entry point

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod overrides;
mod settings;

use settings::ConfigPaths;

#[derive(Parser)]
#[command(name = "knitvault")]
#[command(version = knitvault_util::cli_version())]
#[command(about = "Convert vault notes into publication formats", long_about = None)]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Pipeline file replacing the configured transform modules
    #[arg(long, global = true, value_name = "FILE")]
    pipeline: Option<PathBuf>,

    /// Format catalogue replacing the built-in one
    #[arg(long, global = true, value_name = "FILE")]
    catalogue: Option<PathBuf>,

    /// Directory holding settings.json, the pipeline and external modules
    #[arg(long, global = true, env = "KNITVAULT_CONFIG_DIR", value_name = "DIR")]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert an exported note into the selected output formats
    Convert {
        /// Output directory of the vault exporter
        #[arg(long, value_name = "DIR")]
        exporter_output: PathBuf,

        /// Directory below the exporter output holding index/
        #[arg(long, value_name = "DIR")]
        manifest_root: Option<PathBuf>,

        /// Flattened Markdown note, overriding discovery
        #[arg(long, value_name = "FILE")]
        markdown: Option<PathBuf>,

        /// Output format to render, e.g. quarto::pdf (repeatable)
        #[arg(short = 'f', long = "format", value_name = "NAME")]
        formats: Vec<String>,

        /// Where rendered files are placed
        #[arg(short = 'o', long, value_name = "DIR")]
        output_dir: Option<PathBuf>,

        /// Directory the renderer runs in (defaults to the exporter output)
        #[arg(long, value_name = "DIR")]
        working_dir: Option<PathBuf>,

        /// Render all formats concurrently
        #[arg(long)]
        parallel: bool,

        /// Output file stem (defaults to the note name)
        #[arg(long, value_name = "NAME")]
        output_name: Option<String>,

        /// Overrides: <package>::<format>::<param>=VALUE or args::<key>=VALUE
        #[arg(trailing_var_arg = true, value_name = "OVERRIDE")]
        overrides: Vec<String>,
    },

    /// Print the version
    Version,

    /// Manage external tool locations
    Tools {
        #[command(subcommand)]
        action: commands::tools::ToolsAction,
    },

    /// Manage transform modules
    #[command(name = "processingmodules")]
    ProcessingModules {
        #[command(subcommand)]
        action: commands::processingmodules::ModulesAction,
    },

    /// List the output formats of the catalogue
    Formats {
        /// Print the rendering call for this format instead
        #[arg(long, value_name = "FORMAT")]
        wrapper: Option<String>,

        /// Basename substituted into the rendering call
        #[arg(long, value_name = "NAME", requires = "wrapper")]
        output_name: Option<String>,
    },

    /// Write the settings store to FILE
    Export {
        file: PathBuf,
    },

    /// Replace the settings store with FILE
    Import {
        file: PathBuf,
    },
}

fn init_logging(verbosity: u8) {
    let default_filter = match verbosity {
        0 => "knitvault=info,knitvault_core=info",
        1 => "knitvault=debug,knitvault_core=debug",
        _ => "knitvault=trace,knitvault_core=trace",
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let paths = ConfigPaths::resolve(cli.config_dir)?;
    let global = commands::GlobalOptions {
        paths,
        pipeline: cli.pipeline,
        catalogue: cli.catalogue,
    };

    match cli.command {
        Commands::Convert {
            exporter_output,
            manifest_root,
            markdown,
            formats,
            output_dir,
            working_dir,
            parallel,
            output_name,
            overrides,
        } => commands::convert::execute(
            commands::convert::ConvertArgs {
                exporter_output,
                manifest_root,
                markdown,
                formats,
                output_dir,
                working_dir,
                parallel,
                output_name,
                overrides,
            },
            &global,
        ),
        Commands::Version => commands::version::execute(),
        Commands::Tools { action } => commands::tools::execute(action, &global),
        Commands::ProcessingModules { action } => {
            commands::processingmodules::execute(action, &global)
        }
        Commands::Formats {
            wrapper: Some(name),
            output_name,
        } => commands::formats::wrapper(&name, output_name.as_deref(), &global),
        Commands::Formats { wrapper: None, .. } => commands::formats::execute(&global),
        Commands::Export { file } => commands::settings::export(&file, &global),
        Commands::Import { file } => commands::settings::import(&file, &global),
    }
}

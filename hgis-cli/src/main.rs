//! HGIS CLI - command-line front end for the HGIS engine.
//!
//! Creates and inspects `.hgis` project files, adds layers to them,
//! renders them to PNG and converts coordinates between the supported
//! reference systems.

mod commands;
mod error;
mod runner;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use commands::{crs, layer, project, render, transform};
use error::CliError;

#[derive(Parser)]
#[command(name = "hgis")]
#[command(version = hgis::VERSION)]
#[command(about = "Compose, reproject and render GIS layers", long_about = None)]
struct Cli {
    /// Read configuration from this file instead of ~/.hgis/config.ini
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create an empty project file
    New(project::NewArgs),

    /// Show a project's view, layers and their source status
    Info(project::InfoArgs),

    /// Bind a data source and add it as the top layer of a project
    AddLayer(layer::AddLayerArgs),

    /// Render a project to a PNG image
    Render(render::RenderArgs),

    /// Convert coordinates between reference systems
    Transform(transform::TransformArgs),

    /// List the supported coordinate reference systems
    Crs(crs::CrsArgs),
}

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        // Pure computations: no config, logging or runtime needed.
        Commands::Transform(args) => transform::run(args),
        Commands::Crs(args) => crs::run(args),
        command => run_with_runtime(cli.config, command),
    };

    if let Err(e) = result {
        e.exit();
    }
}

fn run_with_runtime(config: Option<PathBuf>, command: Commands) -> Result<(), CliError> {
    let runner = runner::CliRunner::new(config.as_deref())?;
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(CliError::Runtime)?;

    runtime.block_on(async move {
        match command {
            Commands::New(args) => project::run_new(&runner, args).await,
            Commands::Info(args) => project::run_info(&runner, args).await,
            Commands::AddLayer(args) => layer::run(&runner, args).await,
            Commands::Render(args) => render::run(&runner, args).await,
            Commands::Transform(_) | Commands::Crs(_) => Ok(()),
        }
    })
}

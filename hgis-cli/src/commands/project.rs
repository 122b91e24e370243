//! `hgis new` and `hgis info`.

use clap::Args;
use std::path::PathBuf;

use hgis::crs::{registry, CrsId};
use hgis::geometry::BoundingBox;
use hgis::layer::LayerStatus;
use hgis::project::Project;
use hgis::status::{format_coordinate, StatusBoard};

use super::common::{default_extent, parse_bbox, parse_crs};
use crate::error::CliError;
use crate::runner::CliRunner;

#[derive(Debug, Args)]
pub struct NewArgs {
    /// Project file to create (conventionally *.hgis)
    pub path: PathBuf,

    /// Working CRS of the project
    #[arg(long, default_value = "EPSG:4326", value_parser = parse_crs)]
    pub crs: CrsId,

    /// Initial view as min_x,min_y,max_x,max_y in the project CRS
    /// (default: the CRS area of use)
    #[arg(long, value_parser = parse_bbox, allow_hyphen_values = true)]
    pub extent: Option<BoundingBox>,

    /// Viewport width in pixels (default: render.default_width)
    #[arg(long)]
    pub width: Option<u32>,

    /// Viewport height in pixels (default: render.default_height)
    #[arg(long)]
    pub height: Option<u32>,

    /// Overwrite an existing file
    #[arg(long)]
    pub force: bool,
}

#[derive(Debug, Args)]
pub struct InfoArgs {
    /// Project file to inspect
    pub path: PathBuf,
}

/// Create an empty project.
pub async fn run_new(runner: &CliRunner, args: NewArgs) -> Result<(), CliError> {
    if args.path.exists() && !args.force {
        return Err(CliError::FileExists(args.path));
    }

    let extent = match args.extent {
        Some(extent) => extent,
        None => default_extent(&args.crs)?,
    };
    let render = &runner.config().render;
    let mut project = Project::new(
        args.crs,
        extent,
        args.width.unwrap_or(render.default_width),
        args.height.unwrap_or(render.default_height),
    )?;
    runner.store().save_to(&mut project, &args.path).await?;

    println!("Created {} ({})", args.path.display(), project.crs);
    Ok(())
}

/// Open a project, bind its layers and report what was found.
pub async fn run_info(runner: &CliRunner, args: InfoArgs) -> Result<(), CliError> {
    let (project, warnings) = runner.store().open(&args.path).await?;
    // Nothing has been drawn yet: a bound layer is as ready as it gets.
    let board = StatusBoard::new();
    for layer in project.stack.layers().iter().filter(|l| l.is_bound()) {
        board.set(layer.id, LayerStatus::Ready);
    }
    let status = project.status(&board, None);
    let viewport = &project.viewport;
    let units = registry::lookup(&project.crs)?.units;

    println!("Project:  {}", project.name());
    println!("CRS:      {}", status.crs);
    println!("Size:     {} x {} px", viewport.width(), viewport.height());
    println!("Scale:    {}", status.scale);
    println!("Center:   {}", format_coordinate(viewport.center(), units));
    println!("Extent:   {}", viewport.extent());
    println!();

    if status.layers.is_empty() {
        println!("No layers.");
    } else {
        println!("Layers (top first):");
        for (line, layer) in status.layers.iter().zip(project.stack.layers()) {
            let visibility = if line.visible { " " } else { "-" };
            println!(
                "  {}{:>3}  {:<24} {:<8} {:>4.0}%  {}",
                visibility,
                line.id.to_string(),
                line.name,
                line.kind.to_string(),
                layer.opacity * 100.0,
                line.status,
            );
            println!("         {}", layer.binding.describe());
        }
    }

    if !warnings.is_empty() {
        println!();
        println!("Warnings:");
        for warning in &warnings {
            println!("  {}", warning);
        }
    }
    Ok(())
}

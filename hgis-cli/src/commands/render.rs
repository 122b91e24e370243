//! `hgis render`.

use clap::Args;
use std::path::PathBuf;
use std::time::Instant;
use tracing::info;

use hgis::geometry::BoundingBox;

use super::common::parse_bbox;
use crate::error::CliError;
use crate::runner::CliRunner;

#[derive(Debug, Args)]
pub struct RenderArgs {
    /// Project file to render
    pub project: PathBuf,

    /// Output PNG file
    #[arg(short, long)]
    pub output: PathBuf,

    /// Image width in pixels (default: the project viewport width)
    #[arg(long)]
    pub width: Option<u32>,

    /// Image height in pixels (default: the project viewport height)
    #[arg(long)]
    pub height: Option<u32>,

    /// Area to draw as min_x,min_y,max_x,max_y in the project CRS
    /// (default: the saved view)
    #[arg(long, value_parser = parse_bbox, allow_hyphen_values = true)]
    pub extent: Option<BoundingBox>,

    /// Zoom to the combined extent of all visible layers
    #[arg(long, conflicts_with = "extent")]
    pub fit: bool,
}

/// Render every visible layer once and write the composite.
pub async fn run(runner: &CliRunner, args: RenderArgs) -> Result<(), CliError> {
    let (mut project, warnings) = runner.store().open(&args.project).await?;
    for warning in &warnings {
        eprintln!("Warning: {}", warning);
    }

    if args.width.is_some() || args.height.is_some() {
        let width = args.width.unwrap_or(project.viewport.width());
        let height = args.height.unwrap_or(project.viewport.height());
        project.viewport.resize(width, height)?;
    }
    if let Some(extent) = args.extent {
        project.viewport.set_extent(extent)?;
    } else if args.fit {
        project.viewport = project
            .viewport
            .clone()
            .with_limits(runner.config().view_limits());
        match project.stack.visible_extent(runner.engine(), &project.crs) {
            Some(extent) if extent.is_valid_extent() => project.viewport.zoom_to(extent)?,
            // A single point or a straight line: centre on it at the current scale.
            Some(extent) => project.viewport.pan_to(extent.center()),
            None => eprintln!("Warning: no visible layer reports an extent; keeping the saved view"),
        }
    }

    let started = Instant::now();
    let renderer = runner.renderer();
    let frame = renderer
        .render_once(&project.stack.snapshot(), &project.viewport)
        .await?;
    frame.save_png(&args.output)?;
    info!(
        output = %args.output.display(),
        width = frame.width(),
        height = frame.height(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Frame written"
    );

    for status in &frame.layers {
        let name = project
            .stack
            .get(status.layer)
            .map(|l| l.name.as_str())
            .unwrap_or("?");
        println!("  {:<5} {:<24} {}", status.layer.to_string(), name, status.status);
    }
    println!(
        "Wrote {} ({} x {} px)",
        args.output.display(),
        frame.width(),
        frame.height()
    );
    Ok(())
}

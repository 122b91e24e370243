//! `hgis add-layer`.

use clap::{Args, ValueEnum};
use std::path::{Path, PathBuf};

use hgis::crs::CrsId;
use hgis::layer::{NewLayer, ScaleRange};
use hgis::source::{PostgisConfig, SourceBinding, WmsConfig};

use super::common::{absolute_path, parse_crs};
use crate::error::CliError;
use crate::runner::CliRunner;

/// Kind of data source named by the `SOURCE` argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SourceType {
    /// ESRI shapefile (.shp with .shx/.dbf/.prj beside it)
    Vector,
    /// GeoTIFF, PNG or JPEG raster tile
    Raster,
    /// OGC WMS 1.3.0 GetMap endpoint
    Wms,
    /// PostGIS table
    Postgis,
}

impl SourceType {
    /// Guess the type from a URL scheme or file extension.
    pub fn infer(source: &str) -> Option<Self> {
        let lower = source.to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            return Some(SourceType::Wms);
        }
        if lower.starts_with("postgres://") || lower.starts_with("postgresql://") {
            return Some(SourceType::Postgis);
        }
        let extension = Path::new(&lower).extension()?.to_str()?.to_string();
        match extension.as_str() {
            "shp" => Some(SourceType::Vector),
            "tif" | "tiff" | "png" | "jpg" | "jpeg" => Some(SourceType::Raster),
            _ => None,
        }
    }
}

#[derive(Debug, Args)]
pub struct AddLayerArgs {
    /// Project file to modify
    pub project: PathBuf,

    /// File path, WMS URL or postgres:// connection string
    pub source: String,

    /// Source type (inferred from SOURCE when omitted)
    #[arg(long, value_enum)]
    pub kind: Option<SourceType>,

    /// Layer name (default: file stem, WMS layer names or table)
    #[arg(long)]
    pub name: Option<String>,

    /// CRS the source data is in (default: the project CRS; a shapefile's
    /// .prj takes precedence)
    #[arg(long, value_parser = parse_crs)]
    pub source_crs: Option<CrsId>,

    /// WMS layer names, comma separated
    #[arg(long, required_if_eq("kind", "wms"))]
    pub layers: Option<String>,

    /// PostGIS table, optionally schema-qualified
    #[arg(long, required_if_eq("kind", "postgis"))]
    pub table: Option<String>,

    /// PostGIS geometry column
    #[arg(long, default_value = "geom")]
    pub geometry_column: String,

    /// Style reference; a "#rrggbb" value is used as the colour
    #[arg(long)]
    pub style: Option<String>,

    /// Layer opacity between 0 and 1
    #[arg(long, default_value_t = 1.0)]
    pub opacity: f64,

    /// Add the layer hidden
    #[arg(long)]
    pub hidden: bool,

    /// Do not draw when zoomed in beyond 1:N
    #[arg(long, value_name = "N")]
    pub min_scale: Option<f64>,

    /// Do not draw when zoomed out beyond 1:N
    #[arg(long, value_name = "N")]
    pub max_scale: Option<f64>,

    /// Record the layer without checking that its source answers
    #[arg(long)]
    pub no_bind: bool,
}

/// Add a layer on top of the project's stack and save the project.
pub async fn run(runner: &CliRunner, args: AddLayerArgs) -> Result<(), CliError> {
    let (mut project, _) = runner.store().open(&args.project).await?;

    if !(0.0..=1.0).contains(&args.opacity) {
        return Err(CliError::InvalidArgument(format!(
            "Opacity {} is outside 0..1",
            args.opacity
        )));
    }
    let scale_range = ScaleRange::new(args.min_scale, args.max_scale)?;
    let source_crs = args.source_crs.clone().unwrap_or_else(|| project.crs.clone());
    let (binding, default_name) = binding_for(&args, &source_crs)?;

    let mut spec = NewLayer::new(
        args.name.clone().unwrap_or(default_name),
        binding,
        source_crs,
    )
    .with_opacity(args.opacity)
    .with_visibility(!args.hidden)
    .with_scale_range(scale_range);
    if let Some(style) = &args.style {
        spec = spec.with_style(style.clone());
    }

    let name = spec.name.clone();
    let id = if args.no_bind {
        project.stack.add_layer(spec)
    } else {
        runner.store().add_layer(&mut project, spec).await?
    };
    runner.store().save_to(&mut project, &args.project).await?;

    println!(
        "Added layer {} '{}' to {} ({} layers)",
        id,
        name,
        args.project.display(),
        project.stack.len()
    );
    Ok(())
}

/// Build the binding for `args.source` and a fallback layer name.
fn binding_for(
    args: &AddLayerArgs,
    source_crs: &CrsId,
) -> Result<(SourceBinding, String), CliError> {
    let kind = args
        .kind
        .or_else(|| SourceType::infer(&args.source))
        .ok_or_else(|| {
            CliError::InvalidArgument(format!(
                "Cannot tell what kind of source '{}' is; pass --kind",
                args.source
            ))
        })?;

    match kind {
        SourceType::Vector | SourceType::Raster => {
            let path = absolute_path(Path::new(&args.source))?;
            let name = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| args.source.clone());
            let binding = if kind == SourceType::Vector {
                SourceBinding::VectorFile { path }
            } else {
                SourceBinding::RasterTile { path }
            };
            Ok((binding, name))
        }
        SourceType::Wms => {
            let layers = args.layers.clone().ok_or_else(|| {
                CliError::InvalidArgument("A WMS layer needs --layers".to_string())
            })?;
            let config = WmsConfig::new(args.source.clone(), layers.clone(), source_crs.clone());
            Ok((SourceBinding::Service(config), layers))
        }
        SourceType::Postgis => {
            let table = args.table.clone().ok_or_else(|| {
                CliError::InvalidArgument("A PostGIS layer needs --table".to_string())
            })?;
            let mut config =
                PostgisConfig::new(args.source.clone(), table.clone(), source_crs.clone());
            config.geometry_column = args.geometry_column.clone();
            Ok((SourceBinding::Database(config), table))
        }
    }
}

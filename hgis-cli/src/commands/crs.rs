//! `hgis crs`.

use clap::Args;

use hgis::crs::{registry, Crs, Projection};

use crate::error::CliError;

#[derive(Debug, Args)]
pub struct CrsArgs {
    /// Only list systems whose identifier, name or datum contains this text
    pub filter: Option<String>,

    /// Also print each system's area of use
    #[arg(long)]
    pub verbose: bool,
}

pub fn run(args: CrsArgs) -> Result<(), CliError> {
    let matching: Vec<_> = registry::all()
        .filter(|crs| args.filter.as_deref().is_none_or(|f| crs_matches(crs, f)))
        .collect();

    if matching.is_empty() {
        println!("No reference system matches.");
        return Ok(());
    }
    for crs in &matching {
        println!(
            "{:<11} {:<36} {:<12} {}",
            crs.id.to_string(),
            crs.name,
            projection_name(&crs.projection),
            crs.units.abbreviation()
        );
        if args.verbose {
            println!("            datum: {}, area of use: {}", crs.datum.name, crs.area_of_use);
        }
    }
    println!();
    println!("{} reference systems", matching.len());
    Ok(())
}

fn crs_matches(crs: &Crs, filter: &str) -> bool {
    let filter = filter.to_lowercase();
    [crs.id.as_str(), crs.name.as_str(), crs.datum.name]
        .iter()
        .any(|field| field.to_lowercase().contains(&filter))
}

fn projection_name(projection: &Projection) -> &'static str {
    match projection {
        Projection::Geographic => "geographic",
        Projection::WebMercator => "mercator",
        Projection::TransverseMercator(_) => "tmerc",
    }
}

//! `hgis transform`.

use clap::Args;
use std::io::{self, BufRead, Write};

use hgis::crs::{registry, CrsEngine, CrsId, Pipeline, Units};
use hgis::geometry::Coord;

use super::common::parse_crs;
use crate::error::CliError;

#[derive(Debug, Args)]
pub struct TransformArgs {
    /// Source CRS
    #[arg(long, value_parser = parse_crs)]
    pub from: CrsId,

    /// Target CRS
    #[arg(long, value_parser = parse_crs)]
    pub to: CrsId,

    /// X (or longitude) and Y (or latitude). Without them, pairs are read
    /// from standard input, one per line.
    #[arg(num_args = 2, value_names = ["X", "Y"], allow_negative_numbers = true)]
    pub coords: Vec<f64>,
}

pub fn run(args: TransformArgs) -> Result<(), CliError> {
    let engine = CrsEngine::new();
    let pipeline = engine.pipeline(&args.from, &args.to)?;
    let units = registry::lookup(&args.to)?.units;

    if let [x, y] = args.coords[..] {
        let out = pipeline.transform_coord(Coord::new(x, y))?;
        println!("{}", format_output(out, units));
        return Ok(());
    }

    let stdin = io::stdin();
    let mut stdout = io::stdout().lock();
    let mut failed = 0usize;
    for (number, line) in stdin.lock().lines().enumerate() {
        let line = line.map_err(CliError::Input)?;
        if line.trim().is_empty() || line.trim_start().starts_with('#') {
            continue;
        }
        match transform_line(&pipeline, &line) {
            Ok(out) => {
                writeln!(stdout, "{}", format_output(out, units)).map_err(CliError::Input)?
            }
            Err(reason) => {
                failed += 1;
                eprintln!("line {}: {}", number + 1, reason);
            }
        }
    }

    if failed > 0 {
        return Err(CliError::InvalidArgument(format!(
            "{} coordinate(s) could not be transformed",
            failed
        )));
    }
    Ok(())
}

/// Parse `x y` or `x,y` and transform it.
fn transform_line(pipeline: &Pipeline, line: &str) -> Result<Coord, String> {
    let numbers: Vec<f64> = line
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<f64>().map_err(|_| format!("'{}' is not a number", s)))
        .collect::<Result<_, _>>()?;
    match numbers[..] {
        [x, y] => pipeline
            .transform_coord(Coord::new(x, y))
            .map_err(|e| e.to_string()),
        _ => Err(format!("expected two numbers, got '{}'", line.trim())),
    }
}

/// Nine decimals for degrees (about 0.1 mm), four for metres.
fn format_output(c: Coord, units: Units) -> String {
    match units {
        Units::Degrees => format!("{:.9} {:.9}", c.x, c.y),
        Units::Metres => format!("{:.4} {:.4}", c.x, c.y),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transform_line_accepts_both_separators() {
        let engine = CrsEngine::new();
        let pipeline = engine
            .pipeline(&CrsId::epsg(4326), &CrsId::epsg(4326))
            .unwrap();
        assert_eq!(
            transform_line(&pipeline, "127.0 37.5").unwrap(),
            Coord::new(127.0, 37.5)
        );
        assert_eq!(
            transform_line(&pipeline, " 127.0,37.5 ").unwrap(),
            Coord::new(127.0, 37.5)
        );
    }

    #[test]
    fn test_transform_line_reports_bad_input() {
        let engine = CrsEngine::new();
        let pipeline = engine
            .pipeline(&CrsId::epsg(4326), &CrsId::epsg(3857))
            .unwrap();
        assert!(transform_line(&pipeline, "127.0").is_err());
        assert!(transform_line(&pipeline, "127.0 abc").is_err());
        assert!(transform_line(&pipeline, "0 89.5").is_err());
    }

    #[test]
    fn test_central_belt_origin() {
        let engine = CrsEngine::new();
        let pipeline = engine
            .pipeline(&CrsId::epsg(4737), &CrsId::epsg(5186))
            .unwrap();
        let out = transform_line(&pipeline, "127 38").unwrap();
        assert_eq!(format_output(out, Units::Metres), "200000.0000 600000.0000");
    }
}

//! Argument parsers and helpers shared across commands.

use std::path::{Path, PathBuf};

use hgis::crs::{registry, CrsId};
use hgis::geometry::BoundingBox;

use crate::error::CliError;

/// Parse `min_x,min_y,max_x,max_y` into a box with positive area.
pub fn parse_bbox(value: &str) -> Result<BoundingBox, String> {
    let parts: Vec<&str> = value.split(',').map(str::trim).collect();
    if parts.len() != 4 {
        return Err(format!(
            "expected 'min_x,min_y,max_x,max_y', got '{}'",
            value
        ));
    }
    let mut numbers = [0.0; 4];
    for (slot, part) in numbers.iter_mut().zip(&parts) {
        *slot = part
            .parse::<f64>()
            .map_err(|_| format!("'{}' is not a number", part))?;
    }
    let bbox = BoundingBox::new(numbers[0], numbers[1], numbers[2], numbers[3]);
    if !bbox.is_valid_extent() {
        return Err(format!("'{}' does not enclose any area", value));
    }
    Ok(bbox)
}

/// Parse a CRS identifier and check that it is registered.
pub fn parse_crs(value: &str) -> Result<CrsId, String> {
    let id = CrsId::new(value);
    if registry::contains(&id) {
        Ok(id)
    } else {
        Err(format!("unsupported CRS '{}' (see 'hgis crs')", value))
    }
}

/// The area of use of `crs` in its own units.
pub fn default_extent(crs: &CrsId) -> Result<BoundingBox, CliError> {
    Ok(registry::lookup(crs)?.projected_area_of_use()?)
}

/// Make a user-supplied path absolute against the working directory, so it
/// survives being stored in a project elsewhere.
pub fn absolute_path(path: &Path) -> Result<PathBuf, CliError> {
    std::path::absolute(path).map_err(|e| {
        CliError::InvalidArgument(format!("Cannot resolve '{}': {}", path.display(), e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bbox_normalizes_corners() {
        let bbox = parse_bbox("127.5, 38, 126.5,37").unwrap();
        assert_eq!(bbox, BoundingBox::new(126.5, 37.0, 127.5, 38.0));
    }

    #[test]
    fn test_parse_bbox_rejects_bad_input() {
        assert!(parse_bbox("1,2,3").is_err());
        assert!(parse_bbox("1,2,x,4").is_err());
        assert!(parse_bbox("1,2,1,4").is_err());
    }

    #[test]
    fn test_parse_crs() {
        assert_eq!(parse_crs("epsg:5186").unwrap(), CrsId::epsg(5186));
        assert_eq!(parse_crs("4326").unwrap(), CrsId::epsg(4326));
        assert!(parse_crs("EPSG:9999").unwrap_err().contains("hgis crs"));
    }

    #[test]
    fn test_default_extent_is_in_crs_units() {
        let geographic = default_extent(&CrsId::epsg(4326)).unwrap();
        assert!(geographic.max_x <= 180.0);

        let projected = default_extent(&CrsId::epsg(5186)).unwrap();
        assert!(projected.width() > 10_000.0);
    }

    #[test]
    fn test_absolute_path() {
        let path = absolute_path(Path::new("data/roads.shp")).unwrap();
        assert!(path.is_absolute());
        assert!(path.ends_with("data/roads.shp"));
    }
}

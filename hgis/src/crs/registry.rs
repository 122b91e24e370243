//! Process-wide table of known coordinate reference systems.
//!
//! The table is built once on first use and never mutated afterwards. It
//! covers the systems in everyday use for Korean data:
//!
//! | Code         | Name                                  | Datum           |
//! |--------------|---------------------------------------|-----------------|
//! | 4326         | WGS 84                                | WGS 84          |
//! | 3857         | WGS 84 / Pseudo-Mercator              | WGS 84          |
//! | 32601-32660  | WGS 84 / UTM zone 1N-60N              | WGS 84          |
//! | 32701-32760  | WGS 84 / UTM zone 1S-60S              | WGS 84          |
//! | 4737         | Korea 2000                            | Korea 2000      |
//! | 5179         | Korea 2000 / Unified CS (UTM-K)       | Korea 2000      |
//! | 5185-5188    | Korea 2000 / West, Central, East, East Sea Belt 2010 | Korea 2000 |
//! | 4162         | Korean 1985                           | Korean 1985     |
//! | 5174-5176    | Korean 1985 / Modified Central, West, East Belt | Korean 1985 |

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, LazyLock};

use super::datum::Datum;
use super::ellipsoid::Ellipsoid;
use super::error::{CrsError, DomainViolation};
use super::id::CrsId;
use super::projection::Projection;
use super::tmerc::TransverseMercator;
use crate::geometry::BoundingBox;

/// Metres per degree of longitude at the equator, used to express scale for
/// geographic systems.
pub const METERS_PER_DEGREE: f64 = 111_319.490_793;

/// Linear unit of a CRS's coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Units {
    Degrees,
    Metres,
}

impl Units {
    pub fn meters_per_unit(self) -> f64 {
        match self {
            Units::Degrees => METERS_PER_DEGREE,
            Units::Metres => 1.0,
        }
    }

    pub fn abbreviation(self) -> &'static str {
        match self {
            Units::Degrees => "deg",
            Units::Metres => "m",
        }
    }
}

/// An immutable coordinate reference system definition.
#[derive(Debug, Clone, PartialEq)]
pub struct Crs {
    pub id: CrsId,
    pub name: String,
    pub datum: Datum,
    pub projection: Projection,
    pub units: Units,
    /// Region of validity as longitude/latitude degrees.
    pub area_of_use: BoundingBox,
}

impl Crs {
    pub fn is_geographic(&self) -> bool {
        self.projection.is_geographic()
    }

    pub fn meters_per_unit(&self) -> f64 {
        self.units.meters_per_unit()
    }

    /// CRS coordinates to geographic degrees on this CRS's datum.
    pub fn to_geographic(&self, x: f64, y: f64) -> Result<(f64, f64), CrsError> {
        self.projection
            .inverse(x, y)
            .map_err(|v: DomainViolation| v.into_error(&self.id, x, y))
    }

    /// Geographic degrees on this CRS's datum to CRS coordinates.
    pub fn from_geographic(&self, lon: f64, lat: f64) -> Result<(f64, f64), CrsError> {
        self.projection
            .forward(lon, lat)
            .map_err(|v| v.into_error(&self.id, lon, lat))
    }

    /// Area of use expressed in this CRS's own coordinates.
    pub fn projected_area_of_use(&self) -> Result<BoundingBox, CrsError> {
        let a = self.area_of_use;
        let corners = [
            (a.min_x, a.min_y),
            (a.max_x, a.min_y),
            (a.max_x, a.max_y),
            (a.min_x, a.max_y),
            (a.center().x, a.min_y),
            (a.center().x, a.max_y),
        ];
        let mut bbox: Option<BoundingBox> = None;
        for (lon, lat) in corners {
            let (x, y) = self.from_geographic(lon, lat)?;
            match bbox.as_mut() {
                Some(b) => b.expand_to_include(x, y),
                None => bbox = Some(BoundingBox::new(x, y, x, y)),
            }
        }
        bbox.ok_or_else(|| CrsError::Unsupported(self.id.to_string()))
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.id, self.name)
    }
}

static REGISTRY: LazyLock<BTreeMap<CrsId, Arc<Crs>>> = LazyLock::new(build_registry);

/// Look up a CRS by identifier.
pub fn lookup(id: &CrsId) -> Result<Arc<Crs>, CrsError> {
    REGISTRY
        .get(id)
        .cloned()
        .ok_or_else(|| CrsError::Unsupported(id.to_string()))
}

/// Convenience lookup from a string identifier.
pub fn lookup_str(id: &str) -> Result<Arc<Crs>, CrsError> {
    lookup(&CrsId::new(id))
}

pub fn contains(id: &CrsId) -> bool {
    REGISTRY.contains_key(id)
}

/// All registered systems, ordered by identifier.
pub fn all() -> impl Iterator<Item = &'static Arc<Crs>> {
    REGISTRY.values()
}

// ============================================================================
// Table construction
// ============================================================================

const KOREA_AREA: BoundingBox = BoundingBox {
    min_x: 124.0,
    min_y: 33.0,
    max_x: 132.0,
    max_y: 43.0,
};

fn build_registry() -> BTreeMap<CrsId, Arc<Crs>> {
    let mut table = BTreeMap::new();
    let mut add = |crs: Crs| {
        table.insert(crs.id.clone(), Arc::new(crs));
    };

    add(Crs {
        id: CrsId::epsg(4326),
        name: "WGS 84".into(),
        datum: Datum::WGS84,
        projection: Projection::Geographic,
        units: Units::Degrees,
        area_of_use: BoundingBox::new(-180.0, -90.0, 180.0, 90.0),
    });
    add(Crs {
        id: CrsId::epsg(3857),
        name: "WGS 84 / Pseudo-Mercator".into(),
        datum: Datum::WGS84,
        projection: Projection::WebMercator,
        units: Units::Metres,
        area_of_use: BoundingBox::new(-180.0, -85.0, 180.0, 85.0),
    });

    for zone in 1..=60u8 {
        let lon0 = f64::from(zone) * 6.0 - 183.0;
        for north in [true, false] {
            let code = (if north { 32600 } else { 32700 }) + u32::from(zone);
            let (lat_min, lat_max) = if north { (0.0, 84.0) } else { (-80.0, 0.0) };
            add(Crs {
                id: CrsId::epsg(code),
                name: format!(
                    "WGS 84 / UTM zone {}{}",
                    zone,
                    if north { 'N' } else { 'S' }
                ),
                datum: Datum::WGS84,
                projection: Projection::TransverseMercator(TransverseMercator::utm(
                    zone,
                    north,
                    Ellipsoid::WGS84,
                )),
                units: Units::Metres,
                area_of_use: BoundingBox::new(lon0 - 3.0, lat_min, lon0 + 3.0, lat_max),
            });
        }
    }

    add(Crs {
        id: CrsId::epsg(4737),
        name: "Korea 2000".into(),
        datum: Datum::KOREA_2000,
        projection: Projection::Geographic,
        units: Units::Degrees,
        area_of_use: KOREA_AREA,
    });
    add(Crs {
        id: CrsId::epsg(5179),
        name: "Korea 2000 / Unified CS".into(),
        datum: Datum::KOREA_2000,
        projection: Projection::TransverseMercator(TransverseMercator::new(
            Ellipsoid::GRS80,
            127.5,
            38.0,
            0.9996,
            1_000_000.0,
            2_000_000.0,
        )),
        units: Units::Metres,
        area_of_use: KOREA_AREA,
    });
    for (code, name, lon0) in [
        (5185, "Korea 2000 / West Belt 2010", 125.0),
        (5186, "Korea 2000 / Central Belt 2010", 127.0),
        (5187, "Korea 2000 / East Belt 2010", 129.0),
        (5188, "Korea 2000 / East Sea Belt 2010", 131.0),
    ] {
        add(Crs {
            id: CrsId::epsg(code),
            name: name.into(),
            datum: Datum::KOREA_2000,
            projection: Projection::TransverseMercator(TransverseMercator::new(
                Ellipsoid::GRS80,
                lon0,
                38.0,
                1.0,
                200_000.0,
                600_000.0,
            )),
            units: Units::Metres,
            area_of_use: BoundingBox::new(lon0 - 2.0, 33.0, lon0 + 2.0, 43.0),
        });
    }

    add(Crs {
        id: CrsId::epsg(4162),
        name: "Korean 1985".into(),
        datum: Datum::KOREAN_1985,
        projection: Projection::Geographic,
        units: Units::Degrees,
        area_of_use: KOREA_AREA,
    });
    // The "modified" belts carry the 10.405" Tokyo meridian correction.
    for (code, name, lon0) in [
        (5174, "Korean 1985 / Modified Central Belt", 127.002_890_277_777_8),
        (5175, "Korean 1985 / Modified West Belt", 125.002_890_277_777_8),
        (5176, "Korean 1985 / Modified East Belt", 129.002_890_277_777_8),
    ] {
        add(Crs {
            id: CrsId::epsg(code),
            name: name.into(),
            datum: Datum::KOREAN_1985,
            projection: Projection::TransverseMercator(TransverseMercator::new(
                Ellipsoid::BESSEL_1841,
                lon0,
                38.0,
                1.0,
                200_000.0,
                500_000.0,
            )),
            units: Units::Metres,
            area_of_use: BoundingBox::new(lon0 - 2.0, 33.0, lon0 + 2.0, 43.0),
        });
    }

    table
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_contents() {
        for code in [4326, 3857, 4737, 4162, 5179, 5185, 5186, 5187, 5188, 5174, 5175, 5176] {
            assert!(contains(&CrsId::epsg(code)), "missing EPSG:{}", code);
        }
        assert!(contains(&CrsId::epsg(32652)));
        assert!(contains(&CrsId::epsg(32760)));
        assert_eq!(all().count(), 12 + 120);
    }

    #[test]
    fn test_unknown_code_is_unsupported() {
        let err = lookup(&CrsId::epsg(9999)).unwrap_err();
        assert_eq!(err, CrsError::Unsupported("EPSG:9999".to_string()));
    }

    #[test]
    fn test_units() {
        assert_eq!(lookup_str("EPSG:4326").unwrap().units, Units::Degrees);
        assert_eq!(lookup_str("epsg:5186").unwrap().meters_per_unit(), 1.0);
        assert_eq!(Units::Degrees.meters_per_unit(), METERS_PER_DEGREE);
    }

    #[test]
    fn test_utm_names() {
        let crs = lookup(&CrsId::epsg(32652)).unwrap();
        assert_eq!(crs.name, "WGS 84 / UTM zone 52N");
        let crs = lookup(&CrsId::epsg(32733)).unwrap();
        assert_eq!(crs.name, "WGS 84 / UTM zone 33S");
    }

    #[test]
    fn test_projected_area_of_use() {
        let crs = lookup(&CrsId::epsg(5186)).unwrap();
        let area = crs.projected_area_of_use().unwrap();
        assert!(area.contains(200_000.0, 600_000.0));
    }
}

//! CRS detection from WKT strings (shapefile `.prj` sidecars).
//!
//! This is not a WKT parser. It recognises an explicit top-level
//! `AUTHORITY["EPSG", "code"]` and otherwise matches the well-known ESRI
//! names emitted by common desktop tools.

use super::id::CrsId;
use super::registry;

/// Best-effort mapping of a WKT definition to a registered CRS.
pub fn detect(wkt: &str) -> Option<CrsId> {
    if let Some(id) = authority_code(wkt) {
        if registry::contains(&id) {
            return Some(id);
        }
    }
    esri_name(wkt).filter(registry::contains)
}

/// The authority code attached to the outermost definition. In WKT1 the
/// top-level `AUTHORITY` clause is the last one in the string.
fn authority_code(wkt: &str) -> Option<CrsId> {
    const KEYWORD: &str = "AUTHORITY[";
    let pos = wkt.to_ascii_uppercase().rfind(KEYWORD)?;
    let opens = wkt[..pos].matches('[').count();
    let closes = wkt[..pos].matches(']').count();
    if opens.saturating_sub(closes) != 1 {
        // Nested clause (datum, unit, base CRS): says nothing about the CRS itself.
        return None;
    }
    let rest = &wkt[pos + KEYWORD.len()..];
    let end = rest.find(']')?;
    let mut parts = rest[..end]
        .split(',')
        .map(|p| p.trim().trim_matches('"').trim());
    let authority = parts.next()?;
    let code = parts.next()?;
    if authority.eq_ignore_ascii_case("EPSG") && code.chars().all(|c| c.is_ascii_digit()) {
        Some(CrsId::new(&format!("EPSG:{}", code)))
    } else {
        None
    }
}

fn esri_name(wkt: &str) -> Option<CrsId> {
    let upper = wkt.trim_start_matches('\u{feff}').trim().to_ascii_uppercase();
    let name = {
        let kw = if upper.starts_with("PROJCS[") {
            "PROJCS["
        } else if upper.starts_with("GEOGCS[") {
            "GEOGCS["
        } else {
            return None;
        };
        let rest = &upper[kw.len()..];
        let rest = rest.trim_start().strip_prefix('"')?;
        rest[..rest.find('"')?].to_string()
    };

    if let Some(zone) = name.strip_prefix("WGS_1984_UTM_ZONE_") {
        let (digits, hemisphere) = zone.split_at(zone.len().saturating_sub(1));
        let zone: u32 = digits.parse().ok()?;
        return match hemisphere {
            "N" => Some(CrsId::epsg(32600 + zone)),
            "S" => Some(CrsId::epsg(32700 + zone)),
            _ => None,
        };
    }

    let code = match name.as_str() {
        "GCS_WGS_1984" | "WGS 84" => 4326,
        "WGS_1984_WEB_MERCATOR_AUXILIARY_SPHERE" | "WGS_1984_WEB_MERCATOR" => 3857,
        "GCS_KOREA_2000" | "KOREA 2000" => 4737,
        "GCS_KOREAN_DATUM_1985" | "KOREAN 1985" => 4162,
        "KOREA_2000_KOREA_UNIFIED_COORDINATE_SYSTEM" | "KOREA_2000_UNIFIED_CS" => 5179,
        "KOREA_2000_KOREA_WEST_BELT_2010" | "KOREA_2000_WEST_BELT_2010" => 5185,
        "KOREA_2000_KOREA_CENTRAL_BELT_2010" | "KOREA_2000_CENTRAL_BELT_2010" => 5186,
        "KOREA_2000_KOREA_EAST_BELT_2010" | "KOREA_2000_EAST_BELT_2010" => 5187,
        "KOREA_2000_KOREA_EAST_SEA_BELT_2010" | "KOREA_2000_EAST_SEA_BELT_2010" => 5188,
        "KOREAN_1985_MODIFIED_KOREA_CENTRAL_BELT" => 5174,
        "KOREAN_1985_MODIFIED_KOREA_WEST_BELT" => 5175,
        "KOREAN_1985_MODIFIED_KOREA_EAST_BELT" => 5176,
        _ => return None,
    };
    Some(CrsId::epsg(code))
}

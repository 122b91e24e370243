//! Well-known binary geometry decoding.
//!
//! Accepts ISO WKB (`ST_AsBinary`), including Z/M/ZM type codes, and
//! PostGIS EWKB flag bits. M values are read and dropped. Geometry
//! collections are not supported.

use super::SourceError;
use crate::geometry::{Coord, Shape};

const EWKB_Z: u32 = 0x8000_0000;
const EWKB_M: u32 = 0x4000_0000;
const EWKB_SRID: u32 = 0x2000_0000;

#[derive(Debug, Clone, Copy)]
struct Dims {
    z: bool,
    m: bool,
}

impl Dims {
    fn coord_bytes(self) -> usize {
        8 * (2 + usize::from(self.z) + usize::from(self.m))
    }
}

struct WkbReader<'a> {
    buf: &'a [u8],
    pos: usize,
    little_endian: bool,
}

fn err(msg: impl Into<String>) -> SourceError {
    SourceError::FormatError(format!("WKB: {}", msg.into()))
}

impl<'a> WkbReader<'a> {
    fn bytes<const N: usize>(&mut self) -> Result<[u8; N], SourceError> {
        let slice = self
            .buf
            .get(self.pos..self.pos + N)
            .ok_or_else(|| err(format!("truncated at byte {}", self.pos)))?;
        self.pos += N;
        let mut out = [0u8; N];
        out.copy_from_slice(slice);
        Ok(out)
    }

    fn byte_order(&mut self) -> Result<(), SourceError> {
        let [order] = self.bytes::<1>()?;
        self.little_endian = match order {
            0 => false,
            1 => true,
            other => return Err(err(format!("invalid byte order marker {}", other))),
        };
        Ok(())
    }

    fn u32(&mut self) -> Result<u32, SourceError> {
        let b = self.bytes::<4>()?;
        Ok(if self.little_endian {
            u32::from_le_bytes(b)
        } else {
            u32::from_be_bytes(b)
        })
    }

    fn f64(&mut self) -> Result<f64, SourceError> {
        let b = self.bytes::<8>()?;
        Ok(if self.little_endian {
            f64::from_le_bytes(b)
        } else {
            f64::from_be_bytes(b)
        })
    }

    /// Element count, bounded by the bytes left so a corrupt count cannot
    /// trigger a huge allocation.
    fn count(&mut self, min_elem_bytes: usize) -> Result<usize, SourceError> {
        let n = self.u32()? as usize;
        let left = self.buf.len().saturating_sub(self.pos);
        if n.saturating_mul(min_elem_bytes) > left {
            return Err(err(format!("count {} exceeds remaining {} bytes", n, left)));
        }
        Ok(n)
    }

    fn coord(&mut self, dims: Dims) -> Result<Coord, SourceError> {
        let x = self.f64()?;
        let y = self.f64()?;
        let z = if dims.z { Some(self.f64()?) } else { None };
        if dims.m {
            self.f64()?;
        }
        Ok(Coord { x, y, z })
    }

    fn coords(&mut self, dims: Dims) -> Result<Vec<Coord>, SourceError> {
        let n = self.count(dims.coord_bytes())?;
        (0..n).map(|_| self.coord(dims)).collect()
    }

    fn rings(&mut self, dims: Dims) -> Result<Vec<Vec<Coord>>, SourceError> {
        let n = self.count(4)?;
        (0..n).map(|_| self.coords(dims)).collect()
    }

    /// Header of a (possibly nested) geometry: byte order, base type, dims.
    fn header(&mut self) -> Result<(u32, Dims), SourceError> {
        self.byte_order()?;
        let raw = self.u32()?;
        if raw & EWKB_SRID != 0 {
            self.u32()?;
        }
        let ewkb_z = raw & EWKB_Z != 0;
        let ewkb_m = raw & EWKB_M != 0;
        let code = raw & 0x0FFF_FFFF;
        let (base, iso_z, iso_m) = match code / 1000 {
            0 => (code, false, false),
            1 => (code - 1000, true, false),
            2 => (code - 2000, false, true),
            3 => (code - 3000, true, true),
            _ => return Err(err(format!("unknown geometry type {}", raw))),
        };
        Ok((
            base,
            Dims {
                z: iso_z || ewkb_z,
                m: iso_m || ewkb_m,
            },
        ))
    }

    fn expect(&mut self, want: u32) -> Result<Dims, SourceError> {
        let (base, dims) = self.header()?;
        if base != want {
            return Err(err(format!("expected member type {}, found {}", want, base)));
        }
        Ok(dims)
    }

    fn geometry(&mut self) -> Result<Option<Shape>, SourceError> {
        let (base, dims) = self.header()?;
        let shape = match base {
            1 => {
                let c = self.coord(dims)?;
                if c.x.is_nan() && c.y.is_nan() {
                    return Ok(None);
                }
                Shape::Point(c)
            }
            2 => Shape::LineString(self.coords(dims)?),
            3 => Shape::Polygon(self.rings(dims)?),
            4 => {
                let n = self.count(5)?;
                let points = (0..n)
                    .map(|_| {
                        let d = self.expect(1)?;
                        self.coord(d)
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Shape::MultiPoint(points)
            }
            5 => {
                let n = self.count(9)?;
                let lines = (0..n)
                    .map(|_| {
                        let d = self.expect(2)?;
                        self.coords(d)
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Shape::MultiLineString(lines)
            }
            6 => {
                let n = self.count(9)?;
                let polys = (0..n)
                    .map(|_| {
                        let d = self.expect(3)?;
                        self.rings(d)
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Shape::MultiPolygon(polys)
            }
            7 => return Err(err("geometry collections are not supported")),
            other => return Err(err(format!("unknown geometry type {}", other))),
        };
        Ok(Some(shape))
    }
}

/// Decode one WKB geometry. Empty geometries decode to `None`.
pub fn decode(bytes: &[u8]) -> Result<Option<Shape>, SourceError> {
    let mut reader = WkbReader {
        buf: bytes,
        pos: 0,
        little_endian: true,
    };
    let shape = reader.geometry()?;
    let empty = match &shape {
        Some(Shape::LineString(c) | Shape::MultiPoint(c)) => c.is_empty(),
        Some(Shape::Polygon(r) | Shape::MultiLineString(r)) => r.is_empty(),
        Some(Shape::MultiPolygon(p)) => p.is_empty(),
        _ => false,
    };
    Ok(if empty { None } else { shape })
}

/// Encode a point as little-endian ISO WKB.
pub fn encode_point(c: &Coord) -> Vec<u8> {
    let mut out = Vec::with_capacity(29);
    out.push(1);
    match c.z {
        Some(z) => {
            out.extend_from_slice(&1001u32.to_le_bytes());
            out.extend_from_slice(&c.x.to_le_bytes());
            out.extend_from_slice(&c.y.to_le_bytes());
            out.extend_from_slice(&z.to_le_bytes());
        }
        None => {
            out.extend_from_slice(&1u32.to_le_bytes());
            out.extend_from_slice(&c.x.to_le_bytes());
            out.extend_from_slice(&c.y.to_le_bytes());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hex(s: &str) -> Vec<u8> {
        (0..s.len())
            .step_by(2)
            .map(|i| u8::from_str_radix(&s[i..i + 2], 16).unwrap())
            .collect()
    }

    #[test]
    fn test_point_little_endian() {
        // POINT(127 37.5)
        let bytes = hex("01010000000000000000C05F400000000000C04240");
        assert_eq!(decode(&bytes).unwrap(), Some(Shape::Point(Coord::new(127.0, 37.5))));
    }

    #[test]
    fn test_point_big_endian() {
        // POINT(127 37.5)
        let bytes = hex("0000000001405FC000000000004042C00000000000");
        assert_eq!(decode(&bytes).unwrap(), Some(Shape::Point(Coord::new(127.0, 37.5))));
    }

    #[test]
    fn test_ewkb_point_with_srid() {
        // SRID=4326;POINT(1 2)
        let bytes = hex("0101000020E6100000000000000000F03F0000000000000040");
        assert_eq!(decode(&bytes).unwrap(), Some(Shape::Point(Coord::new(1.0, 2.0))));
    }

    #[test]
    fn test_polygon() {
        // POLYGON((0 0,1 0,1 1,0 0))
        let bytes = hex(concat!(
            "010300000001000000040000000000000000000000000000000000000000000000",
            "0000F03F0000000000000000000000000000F03F000000000000F03F0000000000",
            "0000000000000000000000"
        ));
        match decode(&bytes).unwrap() {
            Some(Shape::Polygon(rings)) => {
                assert_eq!(rings.len(), 1);
                assert_eq!(rings[0].len(), 4);
                assert_eq!(rings[0][2], Coord::new(1.0, 1.0));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_multipolygon_iso_z() {
        let mut bytes = vec![1u8];
        bytes.extend_from_slice(&1006u32.to_le_bytes());
        bytes.extend_from_slice(&1u32.to_le_bytes());
        bytes.push(1);
        bytes.extend_from_slice(&1003u32.to_le_bytes());
        bytes.extend_from_slice(&1u32.to_le_bytes());
        bytes.extend_from_slice(&3u32.to_le_bytes());
        for (x, y, z) in [(0.0f64, 0.0f64, 5.0f64), (1.0, 0.0, 5.0), (0.0, 0.0, 5.0)] {
            bytes.extend_from_slice(&x.to_le_bytes());
            bytes.extend_from_slice(&y.to_le_bytes());
            bytes.extend_from_slice(&z.to_le_bytes());
        }
        match decode(&bytes).unwrap() {
            Some(Shape::MultiPolygon(polys)) => {
                assert_eq!(polys[0][0][1], Coord::with_z(1.0, 0.0, 5.0));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_empty_point_is_none() {
        let mut bytes = vec![1u8];
        bytes.extend_from_slice(&1u32.to_le_bytes());
        bytes.extend_from_slice(&f64::NAN.to_le_bytes());
        bytes.extend_from_slice(&f64::NAN.to_le_bytes());
        assert_eq!(decode(&bytes).unwrap(), None);
    }

    #[test]
    fn test_corrupt_input() {
        assert!(decode(&[]).is_err());
        assert!(decode(&[7, 1, 0, 0, 0]).is_err());
        // LineString claiming a billion points.
        let mut bytes = vec![1u8];
        bytes.extend_from_slice(&2u32.to_le_bytes());
        bytes.extend_from_slice(&1_000_000_000u32.to_le_bytes());
        assert!(matches!(decode(&bytes), Err(SourceError::FormatError(_))));
    }

    #[test]
    fn test_encode_point_decodes() {
        let c = Coord::with_z(127.0, 37.5, 12.0);
        assert_eq!(decode(&encode_point(&c)).unwrap(), Some(Shape::Point(c)));
    }
}

//! ESRI shapefile reader (`.shp` geometry, `.dbf` attributes, `.prj` CRS).
//!
//! # Layout
//!
//! ```text
//! .shp  100-byte header ─► record* ; record = BE(number, words) + LE content
//! .dbf  32-byte header ─► 32-byte field descriptor* ─► 0x0D ─► fixed-width rows
//! .prj  WKT text, optional
//! ```
//!
//! Rows are paired with shape records by position. Polygon rings follow the
//! shapefile winding rule: clockwise rings are exteriors, counter-clockwise
//! rings are holes of the exterior before them.
//!
//! Opening a file scans it once to learn where every record sits; after
//! that, records are read back individually with a seek:
//!
//! ```text
//! feature id ─► RecordLocation { offset, len, dbf_row }
//!                    │                          │
//!                    ▼                          ▼
//!          .shp[offset..offset+len]   .dbf[header + row * record_len]
//! ```
//!
//! Text fields are decoded as UTF-8 with lossy replacement.

use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::SourceError;
use crate::crs::{wkt, CrsId};
use crate::geometry::{
    AttributeValue, Attributes, BoundingBox, Coord, Feature, FeatureId, Geometry, GeometryType,
    Shape,
};

const SHP_FILE_CODE: i32 = 9994;
const SHP_HEADER_LEN: usize = 100;
const DBF_HEADER_TERMINATOR: u8 = 0x0D;
const DBF_EOF: u8 = 0x1A;
const DBF_DELETED: u8 = b'*';

// ============================================================================
// Types
// ============================================================================

/// dBASE field types understood by the reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Character,
    Numeric,
    Float,
    Logical,
    Date,
    Other(char),
}

impl FieldType {
    fn from_code(code: u8) -> Self {
        match code {
            b'C' => FieldType::Character,
            b'N' => FieldType::Numeric,
            b'F' => FieldType::Float,
            b'L' => FieldType::Logical,
            b'D' => FieldType::Date,
            other => FieldType::Other(other as char),
        }
    }

    pub fn is_numeric(self) -> bool {
        matches!(self, FieldType::Numeric | FieldType::Float)
    }
}

/// One column of the attribute table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldInfo {
    pub name: String,
    pub field_type: FieldType,
    pub length: usize,
    pub decimals: usize,
}

// ============================================================================
// Byte reader
// ============================================================================

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], SourceError> {
        if n > self.remaining() {
            return Err(SourceError::FormatError(format!(
                "unexpected end of data at byte {} (wanted {} more)",
                self.pos, n
            )));
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], SourceError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn skip(&mut self, n: usize) -> Result<(), SourceError> {
        self.take(n).map(|_| ())
    }

    fn i32_be(&mut self) -> Result<i32, SourceError> {
        Ok(i32::from_be_bytes(self.array()?))
    }

    fn i32_le(&mut self) -> Result<i32, SourceError> {
        Ok(i32::from_le_bytes(self.array()?))
    }

    fn f64_le(&mut self) -> Result<f64, SourceError> {
        Ok(f64::from_le_bytes(self.array()?))
    }

    /// A non-negative element count whose elements of `elem_size` bytes fit
    /// in the remaining data.
    fn count(&mut self, elem_size: usize) -> Result<usize, SourceError> {
        let n = self.i32_le()?;
        let n = usize::try_from(n)
            .map_err(|_| SourceError::FormatError(format!("negative count {}", n)))?;
        if n.saturating_mul(elem_size) > self.remaining() {
            return Err(SourceError::FormatError(format!(
                "count {} exceeds record size",
                n
            )));
        }
        Ok(n)
    }
}

// ============================================================================
// .shp
// ============================================================================

fn geometry_type_of(shape_type: i32) -> Option<GeometryType> {
    match shape_type {
        1 | 11 | 21 => Some(GeometryType::Point),
        8 | 18 | 28 => Some(GeometryType::MultiPoint),
        3 | 13 | 23 => Some(GeometryType::LineString),
        5 | 15 | 25 => Some(GeometryType::Polygon),
        _ => None,
    }
}

fn has_z(shape_type: i32) -> bool {
    (11..=18).contains(&shape_type)
}

fn parse_record(r: &mut Reader<'_>) -> Result<Option<Shape>, SourceError> {
    let shape_type = r.i32_le()?;
    match shape_type {
        0 => Ok(None),
        1 | 11 | 21 => {
            let x = r.f64_le()?;
            let y = r.f64_le()?;
            let z = if shape_type == 11 {
                Some(r.f64_le()?)
            } else {
                None
            };
            Ok(Some(Shape::Point(Coord { x, y, z })))
        }
        8 | 18 | 28 => {
            r.skip(32)?;
            let n = r.count(16)?;
            let mut points = read_points(r, n)?;
            if has_z(shape_type) {
                read_z(r, &mut points)?;
            }
            Ok(Some(Shape::MultiPoint(points)))
        }
        3 | 13 | 23 | 5 | 15 | 25 => {
            let mut parts = read_parts(r, has_z(shape_type))?;
            if parts.is_empty() {
                return Ok(None);
            }
            let polygon = matches!(shape_type, 5 | 15 | 25);
            Ok(Some(match (polygon, parts.len()) {
                (true, _) => assemble_polygon(parts),
                (false, 1) => Shape::LineString(parts.remove(0)),
                (false, _) => Shape::MultiLineString(parts),
            }))
        }
        other => Err(SourceError::FormatError(format!(
            "unsupported shape type {}",
            other
        ))),
    }
}

fn read_points(r: &mut Reader<'_>, n: usize) -> Result<Vec<Coord>, SourceError> {
    (0..n)
        .map(|_| Ok(Coord::new(r.f64_le()?, r.f64_le()?)))
        .collect()
}

fn read_z(r: &mut Reader<'_>, points: &mut [Coord]) -> Result<(), SourceError> {
    r.skip(16)?;
    for p in points.iter_mut() {
        p.z = Some(r.f64_le()?);
    }
    Ok(())
}

fn read_parts(r: &mut Reader<'_>, z: bool) -> Result<Vec<Vec<Coord>>, SourceError> {
    r.skip(32)?;
    let num_parts = r.count(4)?;
    let num_points = r.i32_le()?;
    let num_points = usize::try_from(num_points)
        .map_err(|_| SourceError::FormatError("negative point count".into()))?;
    let starts = (0..num_parts)
        .map(|_| r.i32_le().map(|s| s.max(0) as usize))
        .collect::<Result<Vec<_>, _>>()?;
    if num_points.saturating_mul(16) > r.remaining() {
        return Err(SourceError::FormatError(format!(
            "point count {} exceeds record size",
            num_points
        )));
    }
    let mut points = read_points(r, num_points)?;
    if z {
        read_z(r, &mut points)?;
    }

    let mut parts = Vec::with_capacity(num_parts);
    for (i, &start) in starts.iter().enumerate() {
        let end = starts.get(i + 1).copied().unwrap_or(num_points);
        if start > end || end > num_points {
            return Err(SourceError::FormatError(format!(
                "part {} spans {}..{} of {} points",
                i, start, end, num_points
            )));
        }
        parts.push(points[start..end].to_vec());
    }
    Ok(parts)
}

/// Twice the signed area; negative for clockwise rings.
fn signed_area2(ring: &[Coord]) -> f64 {
    ring.windows(2)
        .map(|w| w[0].x * w[1].y - w[1].x * w[0].y)
        .sum()
}

fn assemble_polygon(rings: Vec<Vec<Coord>>) -> Shape {
    let mut polygons: Vec<Vec<Vec<Coord>>> = Vec::new();
    for ring in rings {
        let is_hole = signed_area2(&ring) > 0.0;
        match polygons.last_mut() {
            Some(polygon) if is_hole => polygon.push(ring),
            _ => polygons.push(vec![ring]),
        }
    }
    if polygons.len() == 1 {
        Shape::Polygon(polygons.remove(0))
    } else {
        Shape::MultiPolygon(polygons)
    }
}

// ============================================================================
// .dbf
// ============================================================================

/// Layout of a `.dbf` attribute table.
#[derive(Debug, Clone)]
struct DbfTable {
    path: PathBuf,
    num_records: usize,
    header_len: u64,
    record_len: usize,
    fields: Vec<FieldInfo>,
}

/// Parse the fixed header and field descriptors of a `.dbf`. `bytes` holds
/// at least the first `header_len` bytes of the file.
fn parse_dbf_header(path: &Path, bytes: &[u8]) -> Result<DbfTable, SourceError> {
    if bytes.len() < 32 {
        return Err(SourceError::FormatError("dbf header is truncated".into()));
    }
    let num_records = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]) as usize;
    let header_len = u16::from_le_bytes([bytes[8], bytes[9]]) as usize;
    let record_len = u16::from_le_bytes([bytes[10], bytes[11]]) as usize;

    let mut fields = Vec::new();
    let mut pos = 32;
    while pos + 32 <= bytes.len().min(header_len) && bytes[pos] != DBF_HEADER_TERMINATOR {
        let desc = &bytes[pos..pos + 32];
        let name_end = desc[..11].iter().position(|&b| b == 0).unwrap_or(11);
        fields.push(FieldInfo {
            name: String::from_utf8_lossy(&desc[..name_end]).trim().to_string(),
            field_type: FieldType::from_code(desc[11]),
            length: desc[16] as usize,
            decimals: desc[17] as usize,
        });
        pos += 32;
    }

    let row_width: usize = 1 + fields.iter().map(|f| f.length).sum::<usize>();
    if record_len < row_width {
        return Err(SourceError::FormatError(format!(
            "dbf record length {} is shorter than its fields ({})",
            record_len, row_width
        )));
    }
    Ok(DbfTable {
        path: path.to_path_buf(),
        num_records,
        header_len: header_len as u64,
        record_len,
        fields,
    })
}

impl DbfTable {
    fn open(path: &Path) -> Result<Self, SourceError> {
        let mut reader = open_buffered(path)?;
        let mut header = vec![0u8; 32];
        reader
            .read_exact(&mut header)
            .map_err(|e| SourceError::from_io(path, e))?;
        let header_len = u16::from_le_bytes([header[8], header[9]]) as usize;
        if header_len > header.len() {
            header.resize(header_len, 0);
            reader
                .read_exact(&mut header[32..])
                .map_err(|e| SourceError::from_io(path, e))?;
        }
        parse_dbf_header(path, &header).map_err(|e| in_file(path, e))
    }

    fn row_offset(&self, row: u32) -> u64 {
        self.header_len + u64::from(row) * self.record_len as u64
    }

    /// Deletion flag of every row, in order. Stops early at an end-of-file
    /// marker.
    fn deleted_rows(&self) -> Result<Vec<bool>, SourceError> {
        let mut reader = open_buffered(&self.path)?;
        reader
            .seek(SeekFrom::Start(self.header_len))
            .map_err(|e| SourceError::from_io(&self.path, e))?;
        let mut row = vec![0u8; self.record_len];
        let mut deleted = Vec::with_capacity(self.num_records);
        for i in 0..self.num_records {
            if reader.read_exact(&mut row).is_err() {
                return Err(SourceError::FormatError(format!(
                    "{}: dbf is truncated at row {} of {}",
                    self.path.display(),
                    i,
                    self.num_records
                )));
            }
            match row[0] {
                DBF_EOF => break,
                flag => deleted.push(flag == DBF_DELETED),
            }
        }
        Ok(deleted)
    }

    fn read_raw_row<R: Read + Seek>(
        &self,
        reader: &mut R,
        row: u32,
        buf: &mut Vec<u8>,
    ) -> Result<(), SourceError> {
        buf.resize(self.record_len, 0);
        reader
            .seek(SeekFrom::Start(self.row_offset(row)))
            .and_then(|_| reader.read_exact(buf))
            .map_err(|e| SourceError::from_io(&self.path, e))
    }

    fn read_row<R: Read + Seek>(
        &self,
        reader: &mut R,
        row: u32,
        buf: &mut Vec<u8>,
    ) -> Result<Attributes, SourceError> {
        self.read_raw_row(reader, row, buf)?;
        Ok(decode_row(&self.fields, buf))
    }
}

fn decode_row(fields: &[FieldInfo], row: &[u8]) -> Attributes {
    let mut offset = 1;
    let mut attributes = Attributes::new();
    for field in fields {
        let raw = &row[offset..offset + field.length];
        attributes.insert(field.name.clone(), decode_value(field, raw));
        offset += field.length;
    }
    attributes
}

fn decode_value(field: &FieldInfo, raw: &[u8]) -> AttributeValue {
    let text = String::from_utf8_lossy(raw);
    let trimmed = text.trim();
    match field.field_type {
        FieldType::Numeric | FieldType::Float => {
            if trimmed.is_empty() || trimmed.starts_with('*') {
                return AttributeValue::Null;
            }
            if field.decimals == 0 {
                if let Ok(v) = trimmed.parse::<i64>() {
                    return AttributeValue::Integer(v);
                }
            }
            trimmed
                .parse::<f64>()
                .map(AttributeValue::Float)
                .unwrap_or(AttributeValue::Null)
        }
        FieldType::Logical => match trimmed.chars().next() {
            Some('T' | 't' | 'Y' | 'y') => AttributeValue::Bool(true),
            Some('F' | 'f' | 'N' | 'n') => AttributeValue::Bool(false),
            _ => AttributeValue::Null,
        },
        FieldType::Date if trimmed.is_empty() => AttributeValue::Null,
        _ => AttributeValue::Text(text.trim_end().to_string()),
    }
}

// ============================================================================
// .shp scanning
// ============================================================================

fn in_file(path: &Path, err: SourceError) -> SourceError {
    match err {
        SourceError::FormatError(msg) => {
            SourceError::FormatError(format!("{}: {}", path.display(), msg))
        }
        other => other,
    }
}

fn open_buffered(path: &Path) -> Result<BufReader<File>, SourceError> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|e| SourceError::from_io(path, e))
}

fn sidecar(path: &Path, ext: &str) -> Option<PathBuf> {
    [ext.to_string(), ext.to_ascii_uppercase()]
        .into_iter()
        .map(|e| path.with_extension(e))
        .find(|p| p.exists())
}

/// Where one shape record lives on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct RecordLocation {
    /// Byte offset of the record content (after the 8-byte record header).
    offset: u64,
    len: u32,
    /// Attribute row paired with the record, if the table has one.
    dbf_row: Option<u32>,
}

/// Position of a record met while scanning the `.shp`.
struct ScannedRecord {
    ordinal: usize,
    number: u32,
    offset: u64,
    len: u32,
}

/// Fill `head` from `reader`. Returns false when the stream ends first.
fn read_full<R: Read>(reader: &mut R, head: &mut [u8]) -> io::Result<bool> {
    let mut filled = 0;
    while filled < head.len() {
        match reader.read(&mut head[filled..]) {
            Ok(0) => return Ok(false),
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(true)
}

/// Walk the `.shp` record by record, decoding one shape at a time.
///
/// Returns the shape type declared in the file header. A trailing fragment
/// shorter than a record header is ignored.
fn scan_shp(
    path: &Path,
    mut visit: impl FnMut(ScannedRecord, Option<Shape>),
) -> Result<i32, SourceError> {
    let io_err = |e| SourceError::from_io(path, e);
    let file_len = std::fs::metadata(path).map_err(io_err)?.len();
    let mut reader = open_buffered(path)?;

    let mut header = [0u8; SHP_HEADER_LEN];
    if !read_full(&mut reader, &mut header).map_err(io_err)? {
        return Err(SourceError::FormatError(format!(
            "{}: shapefile header is truncated",
            path.display()
        )));
    }
    let mut r = Reader::new(&header);
    let code = r.i32_be()?;
    if code != SHP_FILE_CODE {
        return Err(SourceError::FormatError(format!(
            "{}: not a shapefile (file code {})",
            path.display(),
            code
        )));
    }
    r.skip(24)?;
    let _version = r.i32_le()?;
    let shape_type = r.i32_le()?;

    let mut pos = SHP_HEADER_LEN as u64;
    let mut content = Vec::new();
    let mut ordinal = 0;
    loop {
        let mut head = [0u8; 8];
        if !read_full(&mut reader, &mut head).map_err(io_err)? {
            break;
        }
        let number = i32::from_be_bytes([head[0], head[1], head[2], head[3]]);
        let words = i32::from_be_bytes([head[4], head[5], head[6], head[7]]);
        let offset = pos + 8;
        let len = u64::try_from(words).map_err(|_| {
            SourceError::FormatError(format!(
                "{}: record {} has negative length",
                path.display(),
                number
            ))
        })? * 2;
        if offset + len > file_len {
            return Err(SourceError::FormatError(format!(
                "{}: record {} runs past the end of the file",
                path.display(),
                number
            )));
        }

        content.resize(len as usize, 0);
        reader.read_exact(&mut content).map_err(io_err)?;
        let shape = parse_record(&mut Reader::new(&content))
            .map_err(|e| in_file(path, record_error(number, e)))?;
        visit(
            ScannedRecord {
                ordinal,
                number: number.max(0) as u32,
                offset,
                len: len as u32,
            },
            shape,
        );
        pos = offset + len;
        ordinal += 1;
    }
    Ok(shape_type)
}

fn record_error(number: i32, err: SourceError) -> SourceError {
    match err {
        SourceError::FormatError(msg) => {
            SourceError::FormatError(format!("record {}: {}", number, msg))
        }
        other => other,
    }
}

// ============================================================================
// Shapefile table
// ============================================================================

/// An opened shapefile.
///
/// Only the record layout is kept in memory: where each shape sits in the
/// `.shp` and which `.dbf` row belongs to it. Geometry and attributes are
/// read back from disk for the records a query asks for.
///
/// Records without geometry (null shapes, empty multipoints, zero-point
/// parts) and records whose attribute row is deleted are left out.
#[derive(Debug, Clone)]
pub struct ShapefileTable {
    path: PathBuf,
    geometry_type: Option<GeometryType>,
    crs: CrsId,
    crs_from_prj: bool,
    dbf: Option<DbfTable>,
    records: HashMap<FeatureId, RecordLocation>,
    extent: Option<BoundingBox>,
}

impl ShapefileTable {
    /// Scan a shapefile and its sidecars.
    ///
    /// Returns the table and the envelope of every record in it, ready for
    /// bulk-loading a spatial index. `fallback_crs` is used when the `.prj`
    /// is missing or names a CRS the registry does not know. A missing
    /// `.dbf` yields features without attributes.
    pub fn open(
        path: &Path,
        fallback_crs: &CrsId,
    ) -> Result<(Self, Vec<(FeatureId, BoundingBox)>), SourceError> {
        let dbf = match sidecar(path, "dbf") {
            Some(dbf_path) => Some(DbfTable::open(&dbf_path)?),
            None => {
                debug!(path = %path.display(), "No .dbf sidecar, reading geometry only");
                None
            }
        };
        let deleted = match &dbf {
            Some(table) => table.deleted_rows()?,
            None => Vec::new(),
        };

        let mut records = HashMap::new();
        let mut envelopes = Vec::new();
        let mut extent: Option<BoundingBox> = None;
        let mut shapes = 0usize;
        let mut empty = 0usize;
        let shape_type = scan_shp(path, |record, shape| {
            shapes += 1;
            let dbf_row = match deleted.get(record.ordinal) {
                Some(true) => return,
                Some(false) => Some(record.ordinal as u32),
                None => None,
            };
            let Some(bbox) = shape.and_then(|s| s.bbox()) else {
                empty += 1;
                return;
            };
            let id = u64::from(record.number);
            records.insert(
                id,
                RecordLocation {
                    offset: record.offset,
                    len: record.len,
                    dbf_row,
                },
            );
            envelopes.push((id, bbox));
            extent = Some(extent.map_or(bbox, |e| e.union(&bbox)));
        })?;

        if !deleted.is_empty() && deleted.len() != shapes {
            warn!(
                path = %path.display(),
                shapes,
                rows = deleted.len(),
                "Attribute table and geometry disagree on record count"
            );
        }

        let (crs, crs_from_prj) = match sidecar(path, "prj") {
            Some(prj_path) => {
                let text = std::fs::read_to_string(&prj_path)
                    .map_err(|e| SourceError::from_io(&prj_path, e))?;
                match wkt::detect(&text) {
                    Some(id) => (id, true),
                    None => {
                        warn!(
                            path = %prj_path.display(),
                            fallback = %fallback_crs,
                            "Unrecognised .prj definition, using layer CRS"
                        );
                        (fallback_crs.clone(), false)
                    }
                }
            }
            None => (fallback_crs.clone(), false),
        };

        debug!(
            path = %path.display(),
            features = records.len(),
            empty,
            fields = dbf.as_ref().map_or(0, |d| d.fields.len()),
            crs = %crs,
            "Scanned shapefile"
        );

        let table = Self {
            path: path.to_path_buf(),
            geometry_type: geometry_type_of(shape_type),
            crs,
            crs_from_prj,
            dbf,
            records,
            extent,
        };
        Ok((table, envelopes))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Geometry type declared in the `.shp` header; `None` for null-shape files.
    pub fn geometry_type(&self) -> Option<GeometryType> {
        self.geometry_type
    }

    pub fn crs(&self) -> &CrsId {
        &self.crs
    }

    /// Whether the CRS came from the `.prj` sidecar rather than the fallback.
    pub fn crs_from_prj(&self) -> bool {
        self.crs_from_prj
    }

    pub fn fields(&self) -> &[FieldInfo] {
        self.dbf.as_ref().map(|d| d.fields.as_slice()).unwrap_or(&[])
    }

    pub fn extent(&self) -> Option<BoundingBox> {
        self.extent
    }

    /// Number of features with geometry.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn contains(&self, id: FeatureId) -> bool {
        self.records.contains_key(&id)
    }

    /// Feature ids in ascending order.
    pub fn ids(&self) -> Vec<FeatureId> {
        let mut ids: Vec<FeatureId> = self.records.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Re-read the envelope of every record from the `.shp`.
    pub fn envelopes(&self) -> Result<Vec<(FeatureId, BoundingBox)>, SourceError> {
        let mut envelopes = Vec::with_capacity(self.records.len());
        scan_shp(&self.path, |record, shape| {
            let id = u64::from(record.number);
            if !self.records.contains_key(&id) {
                return;
            }
            if let Some(bbox) = shape.and_then(|s| s.bbox()) {
                envelopes.push((id, bbox));
            }
        })?;
        Ok(envelopes)
    }

    /// Read the features with the given ids, in the order given. Unknown
    /// ids are skipped.
    pub fn read_features(&self, ids: &[FeatureId]) -> Result<Vec<Feature>, SourceError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut shp = open_buffered(&self.path)?;
        let mut dbf = match &self.dbf {
            Some(table) => Some((table, open_buffered(&table.path)?)),
            None => None,
        };

        let mut buf = Vec::new();
        let mut out = Vec::with_capacity(ids.len());
        for &id in ids {
            let Some(location) = self.records.get(&id) else {
                continue;
            };
            let Some(shape) = self.read_shape(&mut shp, id, location, &mut buf)? else {
                warn!(path = %self.path.display(), feature = id, "Shape record became empty since the file was opened");
                continue;
            };
            let attributes = match (dbf.as_mut(), location.dbf_row) {
                (Some((table, reader)), Some(row)) => table.read_row(reader, row, &mut buf)?,
                _ => Attributes::new(),
            };
            out.push(Feature {
                id,
                geometry: Geometry::new(shape, self.crs.clone()),
                attributes,
            });
        }
        Ok(out)
    }

    /// Attribute row of one feature. `None` for unknown ids.
    pub fn read_attributes(&self, id: FeatureId) -> Result<Option<Attributes>, SourceError> {
        let Some(location) = self.records.get(&id) else {
            return Ok(None);
        };
        match (&self.dbf, location.dbf_row) {
            (Some(table), Some(row)) => {
                let mut reader = open_buffered(&table.path)?;
                table.read_row(&mut reader, row, &mut Vec::new()).map(Some)
            }
            _ => Ok(Some(Attributes::new())),
        }
    }

    /// Fold over the values of one attribute column, streaming the rows of
    /// every feature in file order. `None` when the table has no such field.
    pub fn fold_field<T>(
        &self,
        field: &str,
        init: T,
        mut f: impl FnMut(T, AttributeValue) -> T,
    ) -> Result<Option<T>, SourceError> {
        let Some(table) = &self.dbf else {
            return Ok(None);
        };
        let mut offset = 1;
        let mut column = None;
        for info in &table.fields {
            if info.name == field {
                column = Some(info);
                break;
            }
            offset += info.length;
        }
        let Some(column) = column else {
            return Ok(None);
        };

        let mut rows: Vec<u32> = self.records.values().filter_map(|r| r.dbf_row).collect();
        rows.sort_unstable();
        let mut reader = open_buffered(&table.path)?;
        let mut buf = Vec::new();
        let mut acc = init;
        for row in rows {
            table.read_raw_row(&mut reader, row, &mut buf)?;
            acc = f(acc, decode_value(column, &buf[offset..offset + column.length]));
        }
        Ok(Some(acc))
    }

    fn read_shape<R: Read + Seek>(
        &self,
        reader: &mut R,
        id: FeatureId,
        location: &RecordLocation,
        buf: &mut Vec<u8>,
    ) -> Result<Option<Shape>, SourceError> {
        buf.resize(location.len as usize, 0);
        reader
            .seek(SeekFrom::Start(location.offset))
            .and_then(|_| reader.read_exact(buf))
            .map_err(|e| SourceError::from_io(&self.path, e))?;
        parse_record(&mut Reader::new(buf))
            .map_err(|e| in_file(&self.path, record_error(id as i32, e)))
    }
}

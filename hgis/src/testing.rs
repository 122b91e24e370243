//! Test fixtures shared by unit and integration tests.
//!
//! Writers for small shapefiles and GeoTIFFs, scripted network clients and
//! an in-memory [`DataSource`]. Nothing here is used by the engine itself;
//! the module is compiled for unit tests and behind the `testing` feature.

use futures::future::BoxFuture;
use image::{ImageFormat, RgbaImage};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::io::{self, Cursor, Write};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tiff::encoder::{colortype, TiffEncoder};
use tiff::tags::Tag;
use tokio_util::sync::CancellationToken;

use crate::crs::{registry, CrsId};
use crate::geometry::{BoundingBox, Feature};
use crate::source::{
    DataSource, EnvelopeQuery, FeatureQuery, FeatureRow, FetchRequest, HttpClient, HttpError,
    HttpResponse, Payload, SourceError, SourceKind,
};

// ============================================================================
// Shapefile writer
// ============================================================================

/// A point with `NAME` and `YEAR` attributes.
#[derive(Debug, Clone)]
pub struct PointRecord {
    pub x: f64,
    pub y: f64,
    pub name: String,
    pub year: i64,
    pub deleted: bool,
    /// Written as a multipoint with no points instead of a point.
    pub empty: bool,
}

impl PointRecord {
    pub fn new(x: f64, y: f64, name: &str, year: i64) -> Self {
        Self {
            x,
            y,
            name: name.to_string(),
            year,
            deleted: false,
            empty: false,
        }
    }

    /// Mark the attribute row as deleted.
    pub fn deleted(mut self) -> Self {
        self.deleted = true;
        self
    }

    /// Give the record an empty geometry.
    pub fn empty(mut self) -> Self {
        self.empty = true;
        self
    }

    /// Record content: shape type, then the point or an empty multipoint
    /// (zero bbox and zero points).
    fn content(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(40);
        if self.empty {
            out.extend_from_slice(&8i32.to_le_bytes());
            out.extend_from_slice(&[0u8; 32]);
            out.extend_from_slice(&0i32.to_le_bytes());
        } else {
            out.extend_from_slice(&1i32.to_le_bytes());
            out.extend_from_slice(&self.x.to_le_bytes());
            out.extend_from_slice(&self.y.to_le_bytes());
        }
        out
    }
}

const NAME_WIDTH: usize = 24;
const YEAR_WIDTH: usize = 6;

fn shp_header(out: &mut Vec<u8>, file_len_bytes: usize, bbox: [f64; 4]) {
    out.extend_from_slice(&9994i32.to_be_bytes());
    out.extend_from_slice(&[0u8; 20]);
    out.extend_from_slice(&((file_len_bytes / 2) as i32).to_be_bytes());
    out.extend_from_slice(&1000i32.to_le_bytes());
    out.extend_from_slice(&1i32.to_le_bytes());
    for v in bbox {
        out.extend_from_slice(&v.to_le_bytes());
    }
    out.extend_from_slice(&[0u8; 32]);
}

fn dbf_field(out: &mut Vec<u8>, name: &str, code: u8, length: usize) {
    let mut desc = [0u8; 32];
    desc[..name.len()].copy_from_slice(name.as_bytes());
    desc[11] = code;
    desc[16] = length as u8;
    out.extend_from_slice(&desc);
}

/// Write `<path>.shp`, `.shx` and `.dbf` (and `.prj` when given) holding
/// one point per record.
pub fn write_point_shapefile(
    path: &Path,
    records: &[PointRecord],
    prj: Option<&str>,
) -> io::Result<()> {
    let bbox = records.iter().filter(|r| !r.empty).fold(
        [f64::INFINITY, f64::INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY],
        |b, r| [b[0].min(r.x), b[1].min(r.y), b[2].max(r.x), b[3].max(r.y)],
    );
    let bbox = if bbox[0].is_finite() { bbox } else { [0.0; 4] };

    let contents: Vec<Vec<u8>> = records.iter().map(PointRecord::content).collect();
    let shp_len = 100 + contents.iter().map(|c| 8 + c.len()).sum::<usize>();
    let mut shp = Vec::with_capacity(shp_len);
    shp_header(&mut shp, shp_len, bbox);
    let mut shx = Vec::with_capacity(100 + 8 * records.len());
    shp_header(&mut shx, 100 + 8 * records.len(), bbox);
    for (i, content) in contents.iter().enumerate() {
        let words = (content.len() / 2) as i32;
        shx.extend_from_slice(&((shp.len() / 2) as i32).to_be_bytes());
        shx.extend_from_slice(&words.to_be_bytes());

        shp.extend_from_slice(&(i as i32 + 1).to_be_bytes());
        shp.extend_from_slice(&words.to_be_bytes());
        shp.extend_from_slice(content);
    }

    let header_len = 32 + 2 * 32 + 1;
    let record_len = 1 + NAME_WIDTH + YEAR_WIDTH;
    let mut dbf = Vec::with_capacity(header_len + record_len * records.len() + 1);
    dbf.extend_from_slice(&[0x03, 124, 1, 1]);
    dbf.extend_from_slice(&(records.len() as u32).to_le_bytes());
    dbf.extend_from_slice(&(header_len as u16).to_le_bytes());
    dbf.extend_from_slice(&(record_len as u16).to_le_bytes());
    dbf.extend_from_slice(&[0u8; 20]);
    dbf_field(&mut dbf, "NAME", b'C', NAME_WIDTH);
    dbf_field(&mut dbf, "YEAR", b'N', YEAR_WIDTH);
    dbf.push(0x0D);
    for record in records {
        dbf.push(if record.deleted { b'*' } else { b' ' });
        let name: String = record.name.chars().take(NAME_WIDTH).collect();
        write!(dbf, "{:<width$}", name, width = NAME_WIDTH)?;
        write!(dbf, "{:>width$}", record.year, width = YEAR_WIDTH)?;
    }
    dbf.push(0x1A);

    std::fs::write(path.with_extension("shp"), shp)?;
    std::fs::write(path.with_extension("shx"), shx)?;
    std::fs::write(path.with_extension("dbf"), dbf)?;
    if let Some(prj) = prj {
        std::fs::write(path.with_extension("prj"), prj)?;
    }
    Ok(())
}

// ============================================================================
// GeoTIFF writer
// ============================================================================

/// Write an RGBA GeoTIFF with one IFD per level. `levels[0]` is the full
/// resolution image; its upper-left corner sits at `origin` with square
/// pixels of `pixel_size`.
pub fn write_geotiff(
    path: &Path,
    levels: &[RgbaImage],
    origin: (f64, f64),
    pixel_size: f64,
    epsg: Option<u16>,
) -> Result<(), tiff::TiffError> {
    encode_geotiff(path, levels, origin, pixel_size, epsg, None)
}

/// [`write_geotiff`] with every level cut into strips of `rows_per_strip`
/// rows.
pub fn write_geotiff_strips(
    path: &Path,
    levels: &[RgbaImage],
    origin: (f64, f64),
    pixel_size: f64,
    epsg: Option<u16>,
    rows_per_strip: u32,
) -> Result<(), tiff::TiffError> {
    encode_geotiff(path, levels, origin, pixel_size, epsg, Some(rows_per_strip))
}

fn encode_geotiff(
    path: &Path,
    levels: &[RgbaImage],
    origin: (f64, f64),
    pixel_size: f64,
    epsg: Option<u16>,
    rows_per_strip: Option<u32>,
) -> Result<(), tiff::TiffError> {
    let file = std::fs::File::create(path)?;
    let mut encoder = TiffEncoder::new(file)?;
    for (i, level) in levels.iter().enumerate() {
        let mut image = encoder.new_image::<colortype::RGBA8>(level.width(), level.height())?;
        if let Some(rows) = rows_per_strip {
            image.rows_per_strip(rows)?;
        }
        if i == 0 {
            let dir = image.encoder();
            dir.write_tag(
                Tag::from_u16_exhaustive(33550),
                &[pixel_size, pixel_size, 0.0][..],
            )?;
            dir.write_tag(
                Tag::from_u16_exhaustive(33922),
                &[0.0, 0.0, 0.0, origin.0, origin.1, 0.0][..],
            )?;
            if let Some(code) = epsg {
                let geographic = registry::lookup(&CrsId::epsg(u32::from(code)))
                    .map(|crs| crs.is_geographic())
                    .unwrap_or(false);
                let key = if geographic { 2048 } else { 3072 };
                dir.write_tag(
                    Tag::from_u16_exhaustive(34735),
                    &[1u16, 1, 0, 1, key, 0, 1, code][..],
                )?;
            }
        }
        image.write_data(level.as_raw())?;
    }
    Ok(())
}

/// Encode a transparent PNG of the given size.
pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let mut out = Vec::new();
    // Writing to memory only fails on encoder bugs.
    let _ = RgbaImage::new(width, height).write_to(&mut Cursor::new(&mut out), ImageFormat::Png);
    out
}

// ============================================================================
// Scripted HTTP client
// ============================================================================

/// [`HttpClient`] answering from a queue of canned responses. An empty
/// queue fails every request with a connection error.
#[derive(Default)]
pub struct MockHttpClient {
    responses: Mutex<VecDeque<HttpResponse>>,
    requests: Mutex<Vec<String>>,
    delay: Duration,
}

impl MockHttpClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait this long (in tokio time) before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn push_ok(&self, body: Vec<u8>) {
        self.responses.lock().push_back(HttpResponse {
            status: 200,
            content_type: Some("image/png".into()),
            body,
        });
    }

    pub fn push_status(&self, status: u16) {
        self.responses.lock().push_back(HttpResponse {
            status,
            content_type: Some("text/plain".into()),
            body: Vec::new(),
        });
    }

    pub fn push_response(&self, response: HttpResponse) {
        self.responses.lock().push_back(response);
    }

    /// URLs requested so far.
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().clone()
    }
}

impl HttpClient for MockHttpClient {
    fn get<'a>(
        &'a self,
        url: &'a str,
        _headers: &'a [(String, String)],
    ) -> BoxFuture<'a, Result<HttpResponse, HttpError>> {
        Box::pin(async move {
            self.requests.lock().push(url.to_string());
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.responses
                .lock()
                .pop_front()
                .ok_or_else(|| HttpError::Connect("connection refused".into()))
        })
    }
}

// ============================================================================
// Scripted query client
// ============================================================================

/// [`FeatureQuery`] answering from a queue of canned results. An empty
/// queue answers with no rows.
#[derive(Default)]
pub struct MockQueryClient {
    results: Mutex<VecDeque<Result<Vec<FeatureRow>, SourceError>>>,
    queries: Mutex<Vec<EnvelopeQuery>>,
    ping_error: Mutex<Option<SourceError>>,
    delay: Duration,
}

impl MockQueryClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn push_rows(&self, rows: Vec<FeatureRow>) {
        self.results.lock().push_back(Ok(rows));
    }

    pub fn push_error(&self, error: SourceError) {
        self.results.lock().push_back(Err(error));
    }

    /// Make every ping fail with `error`.
    pub fn fail_ping(&self, error: SourceError) {
        *self.ping_error.lock() = Some(error);
    }

    pub fn queries(&self) -> Vec<EnvelopeQuery> {
        self.queries.lock().clone()
    }
}

impl FeatureQuery for MockQueryClient {
    fn query<'a>(
        &'a self,
        query: &'a EnvelopeQuery,
    ) -> BoxFuture<'a, Result<Vec<FeatureRow>, SourceError>> {
        Box::pin(async move {
            self.queries.lock().push(query.clone());
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.results.lock().pop_front().unwrap_or(Ok(Vec::new()))
        })
    }

    fn ping(&self) -> BoxFuture<'_, Result<(), SourceError>> {
        Box::pin(async move {
            match self.ping_error.lock().clone() {
                Some(e) => Err(e),
                None => Ok(()),
            }
        })
    }
}

// ============================================================================
// In-memory data source
// ============================================================================

/// A [`DataSource`] over features held in memory.
///
/// Each fetch can be delayed; a source built with
/// [`StaticSource::ignoring_cancel`] sleeps through cancellation, like a
/// file decode that runs to completion.
pub struct StaticSource {
    kind: SourceKind,
    crs: CrsId,
    features: Vec<Feature>,
    delays: Mutex<VecDeque<Duration>>,
    honour_cancel: bool,
    failure: Mutex<Option<SourceError>>,
    fetches: AtomicUsize,
    cancellations: AtomicUsize,
}

impl StaticSource {
    pub fn new(crs: CrsId, features: Vec<Feature>) -> Self {
        Self {
            kind: SourceKind::VectorFile,
            crs,
            features,
            delays: Mutex::new(VecDeque::new()),
            honour_cancel: true,
            failure: Mutex::new(None),
            fetches: AtomicUsize::new(0),
            cancellations: AtomicUsize::new(0),
        }
    }

    pub fn with_kind(mut self, kind: SourceKind) -> Self {
        self.kind = kind;
        self
    }

    /// Delay the next fetches by these durations, in order.
    pub fn with_delays(self, delays: impl IntoIterator<Item = Duration>) -> Self {
        self.delays.lock().extend(delays);
        self
    }

    pub fn ignoring_cancel(mut self) -> Self {
        self.honour_cancel = false;
        self
    }

    /// Fail every fetch with `error` until cleared with `None`.
    pub fn set_failure(&self, error: Option<SourceError>) {
        *self.failure.lock() = error;
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    /// Fetches that gave up because their token was cancelled.
    pub fn cancelled_count(&self) -> usize {
        self.cancellations.load(Ordering::SeqCst)
    }
}

impl DataSource for StaticSource {
    fn kind(&self) -> SourceKind {
        self.kind
    }

    fn describe(&self) -> String {
        format!("memory ({} features)", self.features.len())
    }

    fn native_crs(&self) -> &CrsId {
        &self.crs
    }

    fn full_extent(&self) -> Option<BoundingBox> {
        self.features
            .iter()
            .filter_map(Feature::bbox)
            .reduce(|a, b| a.union(&b))
    }

    fn fetch<'a>(
        &'a self,
        request: &'a FetchRequest,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<Payload, SourceError>> {
        Box::pin(async move {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            let delay = self.delays.lock().pop_front();
            if let Some(delay) = delay {
                if self.honour_cancel {
                    tokio::select! {
                        _ = cancel.cancelled() => {
                            self.cancellations.fetch_add(1, Ordering::SeqCst);
                            return Err(SourceError::Cancelled);
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }
                } else {
                    tokio::time::sleep(delay).await;
                }
            }
            if let Some(error) = self.failure.lock().clone() {
                return Err(error);
            }
            let features = self
                .features
                .iter()
                .filter(|f| {
                    request.crs != self.crs
                        || f.bbox().is_some_and(|b| b.intersects(&request.extent))
                })
                .cloned()
                .collect();
            Ok(Payload::Features(features))
        })
    }
}

//! GeoTIFF raster adapter with overview selection.
//!
//! A pyramided GeoTIFF stores the full-resolution image in its first IFD and
//! reduced-resolution copies in the following ones:
//!
//! ```text
//!   IFD 0  4096 x 4096  res 0.5 m   ◄─ finest
//!   IFD 1  2048 x 2048  res 1 m
//!   IFD 2  1024 x 1024  res 2 m
//!   IFD 3   512 x  512  res 4 m     ◄─ coarsest
//! ```
//!
//! For a request at 1.5 m per pixel the adapter picks IFD 0 (the coarsest
//! level that is still at least as fine as asked for) and decodes only the
//! strips or tiles that overlap the requested window, one chunk at a time:
//!
//! ```text
//!   IFD 0, tiled           requested window
//!   ┌────┬────┬────┬────┐
//!   │    │ ┌──┼──┐ │    │  chunks (1,1) (2,1) (1,2) (2,2) are decoded,
//!   ├────┼─┼──┼──┼─┼────┤  copied into the tile and dropped
//!   │    │ └──┼──┘ │    │
//!   └────┴────┴────┴────┘
//! ```
//!
//! When even the coarsest level is finer than the request, every n-th pixel
//! is kept so the tile stays close to the requested size. Decoded pixels
//! live only in the fetch cache.

use futures::future::BoxFuture;
use image::{Rgba, RgbaImage};
use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tiff::decoder::{Decoder, DecodingResult, Limits};
use tiff::tags::{PlanarConfiguration, Tag};
use tiff::ColorType;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{DataSource, FetchRequest, Payload, RasterTile, SourceError, SourceKind};
use crate::crs::{registry, CrsEngine, CrsId};
use crate::geometry::BoundingBox;

const TAG_MODEL_PIXEL_SCALE: u16 = 33550;
const TAG_MODEL_TIEPOINT: u16 = 33922;
const TAG_GEO_KEY_DIRECTORY: u16 = 34735;
const GEOKEY_GEOGRAPHIC_TYPE: u32 = 2048;
const GEOKEY_PROJECTED_CS_TYPE: u32 = 3072;
const GEOKEY_USER_DEFINED: u32 = 32767;

/// One resolution level of the pyramid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverviewLevel {
    /// Position of the level's IFD in the file.
    pub ifd: usize,
    pub width: u32,
    pub height: u32,
    /// Ground size of one pixel, in native CRS units.
    pub res_x: f64,
    pub res_y: f64,
}

/// Georeferencing and pyramid layout read from the file header.
#[derive(Debug, Clone)]
struct RasterMetadata {
    extent: BoundingBox,
    crs: Option<CrsId>,
    levels: Vec<OverviewLevel>,
}

fn tiff_err(path: &Path, err: tiff::TiffError) -> SourceError {
    match err {
        tiff::TiffError::IoError(io) => SourceError::from_io(path, io),
        other => SourceError::FormatError(format!("{}: {}", path.display(), other)),
    }
}

fn read_metadata<R: Read + Seek>(path: &Path, reader: R) -> Result<RasterMetadata, SourceError> {
    let mut decoder = Decoder::new(reader).map_err(|e| tiff_err(path, e))?;
    let (width, height) = decoder.dimensions().map_err(|e| tiff_err(path, e))?;

    let scale = find_f64_vec(&mut decoder, TAG_MODEL_PIXEL_SCALE).map_err(|e| tiff_err(path, e))?;
    let tiepoint = find_f64_vec(&mut decoder, TAG_MODEL_TIEPOINT).map_err(|e| tiff_err(path, e))?;
    let (Some(scale), Some(tiepoint)) = (scale, tiepoint) else {
        return Err(SourceError::FormatError(format!(
            "{}: no ModelPixelScale/ModelTiepoint georeferencing",
            path.display()
        )));
    };
    if scale.len() < 2 || tiepoint.len() < 6 || scale[0] <= 0.0 || scale[1] <= 0.0 {
        return Err(SourceError::FormatError(format!(
            "{}: malformed georeferencing tags",
            path.display()
        )));
    }

    let (sx, sy) = (scale[0], scale[1]);
    let min_x = tiepoint[3] - tiepoint[0] * sx;
    let max_y = tiepoint[4] + tiepoint[1] * sy;
    let extent = BoundingBox::new(
        min_x,
        max_y - f64::from(height) * sy,
        min_x + f64::from(width) * sx,
        max_y,
    );

    let crs = decoder
        .find_tag(Tag::from_u16_exhaustive(TAG_GEO_KEY_DIRECTORY))
        .ok()
        .flatten()
        .and_then(|v| v.into_u32_vec().ok())
        .and_then(|keys| crs_from_geokeys(&keys));

    let mut levels = vec![OverviewLevel {
        ifd: 0,
        width,
        height,
        res_x: sx,
        res_y: sy,
    }];
    let mut ifd = 0;
    while decoder.more_images() {
        decoder.next_image().map_err(|e| tiff_err(path, e))?;
        ifd += 1;
        let (w, h) = decoder.dimensions().map_err(|e| tiff_err(path, e))?;
        if w == 0 || h == 0 || w > width || h > height {
            debug!(path = %path.display(), ifd, "Skipping IFD that is not an overview");
            continue;
        }
        levels.push(OverviewLevel {
            ifd,
            width: w,
            height: h,
            res_x: extent.width() / f64::from(w),
            res_y: extent.height() / f64::from(h),
        });
    }
    levels.sort_by(|a, b| a.res_x.total_cmp(&b.res_x));

    Ok(RasterMetadata {
        extent,
        crs,
        levels,
    })
}

fn find_f64_vec<R: Read + Seek>(
    decoder: &mut Decoder<R>,
    code: u16,
) -> tiff::TiffResult<Option<Vec<f64>>> {
    decoder
        .find_tag(Tag::from_u16_exhaustive(code))?
        .map(|v| v.into_f64_vec())
        .transpose()
}

/// Read the EPSG code out of a GeoKey directory.
///
/// The directory is a header `[version, revision, minor, count]` followed by
/// `count` entries of `[key, location, count, value]`; a location of 0 means
/// the value is stored inline.
fn crs_from_geokeys(keys: &[u32]) -> Option<CrsId> {
    let count = *keys.get(3)? as usize;
    let entries = keys.get(4..)?.chunks_exact(4).take(count);
    let mut geographic = None;
    let mut projected = None;
    for entry in entries {
        let (key, location, value) = (entry[0], entry[1], entry[3]);
        if location != 0 || value == 0 || value == GEOKEY_USER_DEFINED {
            continue;
        }
        match key {
            GEOKEY_PROJECTED_CS_TYPE => projected = Some(value),
            GEOKEY_GEOGRAPHIC_TYPE => geographic = Some(value),
            _ => {}
        }
    }
    projected.or(geographic).map(CrsId::epsg)
}

/// Pixel rectangle of one level, end exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PixelWindow {
    col0: u32,
    row0: u32,
    col1: u32,
    row1: u32,
}

impl PixelWindow {
    /// Smallest pixel rectangle of `level` covering `window`, never empty.
    fn covering(extent: &BoundingBox, level: &OverviewLevel, window: &BoundingBox) -> Self {
        let col0 = ((window.min_x - extent.min_x) / level.res_x).floor().max(0.0) as u32;
        let row0 = ((extent.max_y - window.max_y) / level.res_y).floor().max(0.0) as u32;
        let col0 = col0.min(level.width - 1);
        let row0 = row0.min(level.height - 1);
        let col1 = (((window.max_x - extent.min_x) / level.res_x).ceil() as u32)
            .clamp(col0 + 1, level.width);
        let row1 = (((extent.max_y - window.min_y) / level.res_y).ceil() as u32)
            .clamp(row0 + 1, level.height);
        Self {
            col0,
            row0,
            col1,
            row1,
        }
    }

    /// Ground extent of the rectangle.
    fn extent(&self, extent: &BoundingBox, level: &OverviewLevel) -> BoundingBox {
        BoundingBox::new(
            extent.min_x + f64::from(self.col0) * level.res_x,
            extent.max_y - f64::from(self.row1) * level.res_y,
            extent.min_x + f64::from(self.col1) * level.res_x,
            extent.max_y - f64::from(self.row0) * level.res_y,
        )
    }
}

/// Output indices `o` with `start <= base + o * step < end`.
fn sampled(base: u32, step: u32, start: u32, end: u32) -> std::ops::Range<u32> {
    let first = start.saturating_sub(base).div_ceil(step);
    let last = end.saturating_sub(base).div_ceil(step);
    first..last.max(first)
}

fn unsupported(path: &Path, what: String) -> SourceError {
    SourceError::FormatError(format!("{}: {}", path.display(), what))
}

/// Expand one chunk's samples to RGBA8.
fn to_rgba(path: &Path, data: DecodingResult, color: ColorType) -> Result<Vec<u8>, SourceError> {
    let samples: Vec<u8> = match data {
        DecodingResult::U8(v) => v,
        DecodingResult::U16(v) => v.into_iter().map(|s| (s >> 8) as u8).collect(),
        _ => return Err(unsupported(path, "unsupported sample format".into())),
    };
    Ok(match color {
        ColorType::RGBA(_) => samples,
        ColorType::RGB(_) => samples
            .chunks_exact(3)
            .flat_map(|p| [p[0], p[1], p[2], 255])
            .collect(),
        ColorType::Gray(_) => samples.iter().flat_map(|&g| [g, g, g, 255]).collect(),
        ColorType::GrayA(_) => samples
            .chunks_exact(2)
            .flat_map(|p| [p[0], p[0], p[0], p[1]])
            .collect(),
        other => return Err(unsupported(path, format!("unsupported colour type {:?}", other))),
    })
}

/// Decode `window` of one level, keeping every `step`-th pixel in each
/// direction. Only chunks overlapping the window are read, and no more than
/// one decoded chunk is held at a time.
fn decode_window(
    path: &Path,
    level: OverviewLevel,
    window: PixelWindow,
    step: u32,
    decode_limit: usize,
) -> Result<RgbaImage, SourceError> {
    let file = File::open(path).map_err(|e| SourceError::from_io(path, e))?;
    let mut limits = Limits::default();
    limits.decoding_buffer_size = decode_limit;
    let mut decoder = Decoder::new(BufReader::new(file))
        .map_err(|e| tiff_err(path, e))?
        .with_limits(limits);
    decoder.seek_to_image(level.ifd).map_err(|e| tiff_err(path, e))?;

    let planar = decoder
        .find_tag_unsigned::<u16>(Tag::PlanarConfiguration)
        .map_err(|e| tiff_err(path, e))?;
    if planar == Some(PlanarConfiguration::Planar.to_u16()) {
        return Err(unsupported(path, "planar sample layout is not supported".into()));
    }
    let color = decoder.colortype().map_err(|e| tiff_err(path, e))?;
    let (chunk_w, chunk_h) = decoder.chunk_dimensions();
    if chunk_w == 0 || chunk_h == 0 {
        return Err(unsupported(path, format!("IFD {} has empty chunks", level.ifd)));
    }
    let chunks_across = level.width.div_ceil(chunk_w);

    let out_w = (window.col1 - window.col0).div_ceil(step);
    let out_h = (window.row1 - window.row0).div_ceil(step);
    let mut out = RgbaImage::new(out_w, out_h);
    let mut chunks = 0u32;

    for chunk_row in window.row0 / chunk_h..=(window.row1 - 1) / chunk_h {
        for chunk_col in window.col0 / chunk_w..=(window.col1 - 1) / chunk_w {
            let index = chunk_row * chunks_across + chunk_col;
            let data = decoder.read_chunk(index).map_err(|e| tiff_err(path, e))?;
            let (data_w, data_h) = decoder.chunk_data_dimensions(index);
            let rgba = to_rgba(path, data, color)?;
            if rgba.len() < data_w as usize * data_h as usize * 4 {
                return Err(unsupported(
                    path,
                    format!("chunk {} of IFD {} is short", index, level.ifd),
                ));
            }
            chunks += 1;

            let (x0, y0) = (chunk_col * chunk_w, chunk_row * chunk_h);
            let rows = sampled(window.row0, step, y0.max(window.row0), (y0 + data_h).min(window.row1));
            let cols = sampled(window.col0, step, x0.max(window.col0), (x0 + data_w).min(window.col1));
            for oy in rows {
                let ly = window.row0 + oy * step - y0;
                for ox in cols.clone() {
                    let lx = window.col0 + ox * step - x0;
                    let i = (ly as usize * data_w as usize + lx as usize) * 4;
                    out.put_pixel(ox, oy, Rgba([rgba[i], rgba[i + 1], rgba[i + 2], rgba[i + 3]]));
                }
            }
        }
    }
    debug!(
        path = %path.display(),
        ifd = level.ifd,
        chunks,
        step,
        width = out_w,
        height = out_h,
        "Decoded raster window"
    );
    Ok(out)
}

/// Serves imagery from a pyramided GeoTIFF.
pub struct RasterTileAdapter {
    path: PathBuf,
    crs: CrsId,
    engine: Arc<CrsEngine>,
    extent: BoundingBox,
    levels: Vec<OverviewLevel>,
    decode_limit: usize,
}

impl RasterTileAdapter {
    /// Read the header and overview layout of a GeoTIFF.
    ///
    /// The CRS comes from the GeoKey directory when it names a registered
    /// system, `fallback_crs` otherwise. Pixel data is decoded on demand.
    pub async fn open(
        path: impl Into<PathBuf>,
        fallback_crs: CrsId,
        engine: Arc<CrsEngine>,
    ) -> Result<Self, SourceError> {
        let path = path.into();
        tokio::task::spawn_blocking(move || Self::open_blocking(&path, &fallback_crs, engine))
            .await
            .map_err(|e| SourceError::SourceUnavailable(format!("decode task failed: {}", e)))?
    }

    pub fn open_blocking(
        path: &Path,
        fallback_crs: &CrsId,
        engine: Arc<CrsEngine>,
    ) -> Result<Self, SourceError> {
        let file = File::open(path).map_err(|e| SourceError::from_io(path, e))?;
        let meta = read_metadata(path, BufReader::new(file))?;
        let crs = match meta.crs {
            Some(id) if registry::contains(&id) => id,
            Some(id) => {
                warn!(path = %path.display(), crs = %id, fallback = %fallback_crs, "GeoTIFF CRS not registered, using layer CRS");
                fallback_crs.clone()
            }
            None => fallback_crs.clone(),
        };
        debug!(
            path = %path.display(),
            levels = meta.levels.len(),
            crs = %crs,
            extent = %meta.extent,
            "Opened GeoTIFF"
        );
        Ok(Self {
            path: path.to_path_buf(),
            crs,
            engine,
            extent: meta.extent,
            levels: meta.levels,
            decode_limit: Limits::default().decoding_buffer_size,
        })
    }

    /// Largest single strip or tile the decoder accepts, in bytes.
    pub fn with_decode_limit(mut self, bytes: usize) -> Self {
        self.decode_limit = bytes;
        self
    }

    /// Levels from finest to coarsest.
    pub fn levels(&self) -> &[OverviewLevel] {
        &self.levels
    }

    /// Coarsest level whose resolution is at least as fine as `resolution`;
    /// the finest level when none is.
    pub fn select_level(&self, resolution: f64) -> Option<OverviewLevel> {
        let tolerance = resolution * 1e-9;
        self.levels
            .iter()
            .rev()
            .find(|l| l.res_x <= resolution + tolerance)
            .or_else(|| self.levels.first())
            .copied()
    }
}

impl DataSource for RasterTileAdapter {
    fn kind(&self) -> SourceKind {
        SourceKind::RasterTile
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    fn native_crs(&self) -> &CrsId {
        &self.crs
    }

    fn full_extent(&self) -> Option<BoundingBox> {
        Some(self.extent)
    }

    /// Returns an empty feature payload when the request does not overlap
    /// the raster.
    fn fetch<'a>(
        &'a self,
        request: &'a FetchRequest,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<Payload, SourceError>> {
        Box::pin(async move {
            if cancel.is_cancelled() {
                return Err(SourceError::Cancelled);
            }
            let native = self
                .engine
                .transform_bbox(&request.extent, &request.crs, &self.crs)?;
            let Some(window) = native.intersection(&self.extent) else {
                return Ok(Payload::Features(Vec::new()));
            };
            let resolution = native.width() / f64::from(request.width.max(1));
            let Some(level) = self.select_level(resolution) else {
                return Ok(Payload::Features(Vec::new()));
            };
            let pixels = PixelWindow::covering(&self.extent, &level, &window);
            let step = ((resolution / level.res_x) * (1.0 + 1e-9)).floor().max(1.0) as u32;

            let path = self.path.clone();
            let limit = self.decode_limit;
            let image = tokio::task::spawn_blocking(move || {
                decode_window(&path, level, pixels, step, limit)
            })
            .await
            .map_err(|e| SourceError::SourceUnavailable(format!("decode task failed: {}", e)))??;
            Ok(Payload::Image(RasterTile::new(
                image,
                pixels.extent(&self.extent, &level),
                self.crs.clone(),
            )))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{write_geotiff, write_geotiff_strips};
    use tempfile::TempDir;

    fn pyramid() -> Vec<RgbaImage> {
        vec![
            RgbaImage::from_pixel(400, 400, Rgba([255, 0, 0, 255])),
            RgbaImage::from_pixel(200, 200, Rgba([0, 255, 0, 255])),
            RgbaImage::from_pixel(100, 100, Rgba([0, 0, 255, 255])),
        ]
    }

    /// 400 m square at 1 m per pixel with two overviews.
    fn pyramid_adapter() -> (TempDir, RasterTileAdapter) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ortho.tif");
        write_geotiff(&path, &pyramid(), (200_000.0, 500_400.0), 1.0, Some(5186)).unwrap();
        let adapter =
            RasterTileAdapter::open_blocking(&path, &CrsId::epsg(4326), Arc::new(CrsEngine::new()))
                .unwrap();
        (dir, adapter)
    }

    /// Pixel (x, y) holds (x, y, 0) modulo 256.
    fn gradient(size: u32) -> RgbaImage {
        RgbaImage::from_fn(size, size, |x, y| Rgba([x as u8, y as u8, 0, 255]))
    }

    fn request(extent: BoundingBox, width: u32) -> FetchRequest {
        FetchRequest::new(extent, CrsId::epsg(5186), 10_000.0, width, width)
    }

    #[test]
    fn test_select_level() {
        let (_dir, adapter) = pyramid_adapter();
        assert_eq!(adapter.select_level(0.5).unwrap().ifd, 0);
        assert_eq!(adapter.select_level(1.0).unwrap().ifd, 0);
        assert_eq!(adapter.select_level(1.5).unwrap().ifd, 0);
        assert_eq!(adapter.select_level(2.0).unwrap().ifd, 1);
        assert_eq!(adapter.select_level(3.9).unwrap().ifd, 1);
        assert_eq!(adapter.select_level(100.0).unwrap().ifd, 2);
    }

    #[tokio::test]
    async fn test_fetch_crops_requested_window() {
        let (_dir, adapter) = pyramid_adapter();
        let window = BoundingBox::new(200_100.0, 500_100.0, 200_200.0, 500_200.0);
        let payload = adapter
            .fetch(&request(window, 50), &CancellationToken::new())
            .await
            .unwrap();
        let tile = payload.image().unwrap();
        // 2 m per pixel requested: the 200 px level.
        assert_eq!((tile.width(), tile.height()), (50, 50));
        assert_eq!(tile.image.get_pixel(0, 0), &Rgba([0, 255, 0, 255]));
        assert_eq!(tile.extent, window);
    }

    #[tokio::test]
    async fn test_disjoint_request_is_empty() {
        let (_dir, adapter) = pyramid_adapter();
        let payload = adapter
            .fetch(
                &request(BoundingBox::new(0.0, 0.0, 10.0, 10.0), 10),
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(payload, Payload::Features(Vec::new()));
    }

    #[test]
    fn test_geokeys() {
        let keys = [1, 1, 0, 2, 1024, 0, 1, 1, 3072, 0, 1, 5186];
        assert_eq!(crs_from_geokeys(&keys), Some(CrsId::epsg(5186)));
        let user_defined = [1, 1, 0, 1, 3072, 0, 1, 32767];
        assert_eq!(crs_from_geokeys(&user_defined), None);
        assert_eq!(crs_from_geokeys(&[1, 1]), None);
    }

    #[tokio::test]
    async fn test_open_geotiff_with_overviews() {
        let (_dir, adapter) = pyramid_adapter();
        assert_eq!(adapter.native_crs(), &CrsId::epsg(5186));
        assert_eq!(adapter.levels().len(), 3);
        assert_eq!(
            adapter.full_extent(),
            Some(BoundingBox::new(200_000.0, 500_000.0, 200_400.0, 500_400.0))
        );

        let full = request(BoundingBox::new(200_000.0, 500_000.0, 200_400.0, 500_400.0), 100);
        let payload = adapter
            .fetch(&full, &CancellationToken::new())
            .await
            .unwrap();
        let tile = payload.image().unwrap();
        assert_eq!((tile.width(), tile.height()), (100, 100));
        assert_eq!(tile.image.get_pixel(10, 10), &Rgba([0, 0, 255, 255]));
    }

    #[tokio::test]
    async fn test_window_of_level_larger_than_decode_limit() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.tif");
        // 512 x 512 RGBA is 1 MiB; each 8-row strip is 16 KiB.
        write_geotiff_strips(&path, &[gradient(512)], (200_000.0, 500_512.0), 1.0, Some(5186), 8)
            .unwrap();
        let limit = 64 * 1024;

        let mut limits = Limits::default();
        limits.decoding_buffer_size = limit;
        let mut whole = Decoder::new(File::open(&path).unwrap())
            .unwrap()
            .with_limits(limits);
        assert!(whole.read_image().is_err());

        let adapter =
            RasterTileAdapter::open_blocking(&path, &CrsId::epsg(4326), Arc::new(CrsEngine::new()))
                .unwrap()
                .with_decode_limit(limit);
        let window = BoundingBox::new(200_100.0, 500_348.0, 200_164.0, 500_412.0);
        let payload = adapter
            .fetch(&request(window, 64), &CancellationToken::new())
            .await
            .unwrap();
        let tile = payload.image().unwrap();
        assert_eq!((tile.width(), tile.height()), (64, 64));
        assert_eq!(tile.extent, window);
        assert_eq!(tile.image.get_pixel(0, 0), &Rgba([100, 100, 0, 255]));
        assert_eq!(tile.image.get_pixel(63, 63), &Rgba([163, 163, 0, 255]));
        assert_eq!(tile.image.get_pixel(20, 5), &Rgba([120, 105, 0, 255]));
    }

    #[tokio::test]
    async fn test_zoomed_out_request_is_subsampled() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flat.tif");
        write_geotiff_strips(&path, &[gradient(512)], (200_000.0, 500_512.0), 1.0, Some(5186), 16)
            .unwrap();
        let adapter =
            RasterTileAdapter::open_blocking(&path, &CrsId::epsg(4326), Arc::new(CrsEngine::new()))
                .unwrap()
                .with_decode_limit(64 * 1024);

        let full = adapter.full_extent().unwrap();
        let payload = adapter
            .fetch(&request(full, 64), &CancellationToken::new())
            .await
            .unwrap();
        let tile = payload.image().unwrap();
        // 8 m per pixel asked of a 1 m level without overviews.
        assert_eq!((tile.width(), tile.height()), (64, 64));
        assert_eq!(tile.extent, full);
        assert_eq!(tile.image.get_pixel(1, 2), &Rgba([8, 16, 0, 255]));
        assert_eq!(tile.image.get_pixel(63, 63), &Rgba([248, 248, 0, 255]));
    }

    #[test]
    fn test_sampled_range() {
        assert_eq!(sampled(0, 1, 0, 10), 0..10);
        assert_eq!(sampled(100, 1, 104, 112), 4..12);
        assert_eq!(sampled(0, 8, 16, 32), 2..4);
        assert_eq!(sampled(0, 8, 17, 32), 3..4);
        assert_eq!(sampled(0, 8, 17, 20), 3..3);
    }

    #[tokio::test]
    async fn test_open_plain_tiff_is_format_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plain.tif");
        RgbaImage::new(8, 8).save(&path).unwrap();
        let result =
            RasterTileAdapter::open(&path, CrsId::epsg(4326), Arc::new(CrsEngine::new())).await;
        assert!(matches!(result, Err(SourceError::FormatError(_))));
    }
}

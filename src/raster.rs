//! Decoding GeoTIFF assets into in-memory arrays.

use anyhow::Result;
use ndarray::{Array3, ArrayView2, Axis};
use std::io::Cursor;
use tiff::decoder::{Decoder, DecodingResult, Limits};
use tiff::tags::Tag;
use tiff::ColorType;
use tracing::{debug, info};

use crate::signing::{redact, SignedHref};
use crate::storage::ObjectRead;

const PROJECTED_CS_TYPE_KEY: u16 = 3072;
const GEOGRAPHIC_TYPE_KEY: u16 = 2048;

/// Affine placement of a north-up raster: the world coordinate of the top-left
/// corner of pixel (0, 0) and the size of one pixel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoTransform {
    pub origin_x: f64,
    pub origin_y: f64,
    pub pixel_width: f64,
    pub pixel_height: f64,
}

impl GeoTransform {
    /// `[min_x, min_y, max_x, max_y]` of a `width` x `height` grid.
    pub fn bounds(&self, width: usize, height: usize) -> [f64; 4] {
        let max_x = self.origin_x + width as f64 * self.pixel_width;
        let min_y = self.origin_y - height as f64 * self.pixel_height;
        [self.origin_x, min_y, max_x, self.origin_y]
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BandStats {
    pub min: f32,
    pub max: f32,
    pub mean: f64,
    pub valid: usize,
}

/// A decoded raster: samples as `(band, row, col)`.
#[derive(Debug, Clone)]
pub struct Raster {
    pub data: Array3<f32>,
    pub geo: Option<GeoTransform>,
    pub epsg: Option<u16>,
    pub nodata: Option<f32>,
}

impl Raster {
    /// Fetches a (signed) asset and decodes it. Transport and decode errors
    /// propagate as the collaborator raised them.
    pub async fn open(storage: &impl ObjectRead, href: &SignedHref) -> Result<Self> {
        info!(href = %href.redacted(), "opening raster");
        let bytes = storage.get_object(&href.href).await?;
        debug!(url = %redact(&href.href), bytes = bytes.len(), "raster fetched");
        Self::decode(&bytes)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut decoder = Decoder::new(Cursor::new(bytes))?;

        // Full-size scenes (10980 x 10980 u16) are beyond the default limits.
        let mut limits = Limits::default();
        limits.decoding_buffer_size = 1024 * 1024 * 1024;
        limits.intermediate_buffer_size = 1024 * 1024 * 1024;
        limits.ifd_value_size = 1024 * 1024 * 1024;
        decoder = decoder.with_limits(limits);

        let (width, height) = decoder.dimensions()?;
        let bands = samples_per_pixel(decoder.colortype()?);
        let geo = read_geotransform(&mut decoder);
        let epsg = read_epsg(&mut decoder);
        let nodata = read_nodata_value(&mut decoder);
        let samples = decode_samples(decoder.read_image()?);

        let data = deinterleave(samples, bands, height as usize, width as usize)?;
        debug!(width, height, bands, ?epsg, ?nodata, "raster decoded");

        Ok(Self {
            data,
            geo,
            epsg,
            nodata,
        })
    }

    pub fn band_count(&self) -> usize {
        self.data.len_of(Axis(0))
    }

    pub fn height(&self) -> usize {
        self.data.len_of(Axis(1))
    }

    pub fn width(&self) -> usize {
        self.data.len_of(Axis(2))
    }

    pub fn band(&self, index: usize) -> ArrayView2<'_, f32> {
        self.data.index_axis(Axis(0), index)
    }

    pub fn bounds(&self) -> Option<[f64; 4]> {
        Some(self.geo?.bounds(self.width(), self.height()))
    }

    pub fn is_nodata(&self, value: f32) -> bool {
        value.is_nan() || self.nodata.map(|n| value == n).unwrap_or(false)
    }

    /// Statistics over the pixels of one band that are not nodata. `None` when
    /// the band has no valid pixel.
    pub fn band_stats(&self, index: usize) -> Option<BandStats> {
        let mut min = f32::INFINITY;
        let mut max = f32::NEG_INFINITY;
        let mut sum = 0_f64;
        let mut valid = 0_usize;
        for &v in self.band(index).iter() {
            if self.is_nodata(v) {
                continue;
            }
            min = min.min(v);
            max = max.max(v);
            sum += v as f64;
            valid += 1;
        }
        (valid > 0).then(|| BandStats {
            min,
            max,
            mean: sum / valid as f64,
            valid,
        })
    }
}

fn samples_per_pixel(color: ColorType) -> usize {
    match color {
        ColorType::Gray(_) | ColorType::Palette(_) => 1,
        ColorType::GrayA(_) => 2,
        ColorType::RGB(_) | ColorType::YCbCr(_) => 3,
        ColorType::RGBA(_) | ColorType::CMYK(_) => 4,
    }
}

fn decode_samples(result: DecodingResult) -> Vec<f32> {
    match result {
        DecodingResult::F32(data) => data,
        DecodingResult::F64(data) => data.into_iter().map(|v| v as f32).collect(),
        DecodingResult::I8(data) => data.into_iter().map(|v| v as f32).collect(),
        DecodingResult::I16(data) => data.into_iter().map(|v| v as f32).collect(),
        DecodingResult::I32(data) => data.into_iter().map(|v| v as f32).collect(),
        DecodingResult::I64(data) => data.into_iter().map(|v| v as f32).collect(),
        DecodingResult::U8(data) => data.into_iter().map(|v| v as f32).collect(),
        DecodingResult::U16(data) => data.into_iter().map(|v| v as f32).collect(),
        DecodingResult::U32(data) => data.into_iter().map(|v| v as f32).collect(),
        DecodingResult::U64(data) => data.into_iter().map(|v| v as f32).collect(),
    }
}

/// Chunky (pixel-interleaved) samples to `(band, row, col)`.
fn deinterleave(samples: Vec<f32>, bands: usize, height: usize, width: usize) -> Result<Array3<f32>> {
    let interleaved = Array3::from_shape_vec((height, width, bands), samples)?;
    Ok(interleaved.permuted_axes([2, 0, 1]).as_standard_layout().to_owned())
}

/// ModelTiepoint (33922) + ModelPixelScale (33550).
fn read_geotransform<R: std::io::Read + std::io::Seek>(
    decoder: &mut Decoder<R>,
) -> Option<GeoTransform> {
    let tiepoint = decoder.get_tag_f64_vec(Tag::ModelTiepointTag).ok()?;
    let scale = decoder.get_tag_f64_vec(Tag::ModelPixelScaleTag).ok()?;
    if tiepoint.len() < 6 || scale.len() < 2 {
        return None;
    }
    // Tiepoint format: [i, j, k, x, y, z], raster (i, j) maps to world (x, y)
    let (i, j) = (tiepoint[0], tiepoint[1]);
    Some(GeoTransform {
        origin_x: tiepoint[3] - i * scale[0],
        origin_y: tiepoint[4] + j * scale[1],
        pixel_width: scale[0],
        pixel_height: scale[1],
    })
}

/// Reads the CRS code out of the GeoKey directory: a 4-short header followed
/// by `[key, location, count, value]` entries.
fn read_epsg<R: std::io::Read + std::io::Seek>(decoder: &mut Decoder<R>) -> Option<u16> {
    let directory = decoder.get_tag_u16_vec(Tag::GeoKeyDirectoryTag).ok()?;
    let entries = directory.get(4..)?;
    let lookup = |wanted: u16| {
        entries
            .chunks_exact(4)
            .find(|e| e[0] == wanted && e[1] == 0)
            .map(|e| e[3])
    };
    lookup(PROJECTED_CS_TYPE_KEY)
        .or_else(|| lookup(GEOGRAPHIC_TYPE_KEY))
        .filter(|code| *code != 0 && *code != 32767)
}

/// GDAL_NODATA (42113), stored as an ASCII string.
fn read_nodata_value<R: std::io::Read + std::io::Seek>(decoder: &mut Decoder<R>) -> Option<f32> {
    let nodata = decoder.get_tag_ascii_string(Tag::GdalNodata).ok()?;
    nodata.trim().parse().ok()
}

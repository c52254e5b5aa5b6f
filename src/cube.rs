//! Stacking the same assets of many items into a (time, band, row, col) cube.

use anyhow::Result;
use chrono::{DateTime, Utc};
use ndarray::{s, Array2, Array4, ArrayView2, Axis, Zip};
use tracing::{debug, info, warn};

use crate::error::WorkflowError;
use crate::raster::{GeoTransform, Raster};
use crate::records::{ItemExt, ItemSet};
use crate::signing::HrefSigner;
use crate::storage::ObjectRead;

/// One item's contribution to the cube: one raster per requested asset.
#[derive(Debug, Clone)]
pub struct Layer {
    pub item_id: String,
    pub datetime: DateTime<Utc>,
    pub rasters: Vec<Raster>,
}

#[derive(Debug, Clone)]
pub struct Datacube {
    /// Distinct acquisition times, ascending.
    pub times: Vec<DateTime<Utc>>,
    /// Asset keys, in request order.
    pub bands: Vec<String>,
    /// Items merged into each time slice.
    pub item_ids: Vec<Vec<String>>,
    /// `(time, band, row, col)`, nodata as NaN.
    pub data: Array4<f32>,
    pub geo: Option<GeoTransform>,
    pub epsg: Option<u16>,
}

/// Signs and reads `assets` of every item, one request at a time, and stacks
/// them. Every item is checked for a datetime and the requested assets before
/// anything is fetched.
pub async fn stack<S: AsRef<str>>(
    items: &ItemSet,
    assets: &[S],
    signer: &impl HrefSigner,
    storage: &impl ObjectRead,
) -> Result<Datacube> {
    if assets.is_empty() {
        return Err(WorkflowError::NoAssetsRequested.into());
    }
    if items.is_empty() {
        return Err(WorkflowError::EmptyResultSet.into());
    }

    let mut plan = Vec::with_capacity(items.len());
    for item in items {
        let datetime = item
            .datetime()
            .ok_or_else(|| WorkflowError::MissingDatetime(item.id.clone()))?;
        let mut hrefs = Vec::with_capacity(assets.len());
        for key in assets {
            let asset = item
                .asset(key.as_ref())
                .ok_or_else(|| WorkflowError::AssetNotFound {
                    item: item.id.clone(),
                    asset: key.as_ref().to_string(),
                })?;
            hrefs.push(asset.href.as_str());
        }
        plan.push((item, datetime, hrefs));
    }

    info!(items = plan.len(), bands = assets.len(), "stacking datacube");
    let mut layers = Vec::with_capacity(plan.len());
    for (item, datetime, hrefs) in plan {
        let mut rasters = Vec::with_capacity(hrefs.len());
        for href in hrefs {
            let signed = signer.sign_href(href).await?;
            rasters.push(Raster::open(storage, &signed).await?);
        }
        debug!(item = %item.id, %datetime, "layer loaded");
        layers.push(Layer {
            item_id: item.id.clone(),
            datetime,
            rasters,
        });
    }

    Datacube::from_layers(assets, layers)
}

impl Datacube {
    /// Builds the cube from already decoded layers. Layers are ordered by time
    /// and those sharing a timestamp are merged, earlier layers winning where
    /// both have a valid pixel. Only the first band of each raster is used.
    pub fn from_layers<S: AsRef<str>>(bands: &[S], mut layers: Vec<Layer>) -> Result<Self> {
        let first = layers
            .first()
            .and_then(|l| l.rasters.first())
            .ok_or(WorkflowError::EmptyResultSet)?;
        let shape = (first.height(), first.width());
        let geo = first.geo;
        let epsg = first.epsg;

        for layer in &layers {
            for (raster, band) in layer.rasters.iter().zip(bands) {
                let found = (raster.height(), raster.width());
                if found != shape {
                    return Err(WorkflowError::IncompatibleRaster {
                        item: layer.item_id.clone(),
                        asset: band.as_ref().to_string(),
                        expected: shape,
                        found,
                    }
                    .into());
                }
                if raster.epsg != epsg {
                    warn!(
                        item = %layer.item_id,
                        asset = band.as_ref(),
                        expected = ?epsg,
                        found = ?raster.epsg,
                        "CRS differs from the first layer, stacking without reprojection"
                    );
                }
            }
        }

        layers.sort_by_key(|l| l.datetime);
        let mut times: Vec<DateTime<Utc>> = Vec::new();
        let mut item_ids: Vec<Vec<String>> = Vec::new();
        for layer in &layers {
            if times.last() != Some(&layer.datetime) {
                times.push(layer.datetime);
                item_ids.push(Vec::new());
            }
            if let Some(ids) = item_ids.last_mut() {
                ids.push(layer.item_id.clone());
            }
        }

        let mut data = Array4::from_elem((times.len(), bands.len(), shape.0, shape.1), f32::NAN);
        let mut t = 0;
        for layer in &layers {
            if times[t] != layer.datetime {
                t += 1;
            }
            for (b, raster) in layer.rasters.iter().enumerate().take(bands.len()) {
                let slice = data.slice_mut(s![t, b, .., ..]);
                Zip::from(slice).and(&raster.band(0)).for_each(|cell, &value| {
                    if cell.is_nan() && !raster.is_nodata(value) {
                        *cell = value;
                    }
                });
            }
        }

        info!(
            times = times.len(),
            bands = bands.len(),
            height = shape.0,
            width = shape.1,
            "datacube built"
        );
        Ok(Self {
            times,
            bands: bands.iter().map(|b| b.as_ref().to_string()).collect(),
            item_ids,
            data,
            geo,
            epsg,
        })
    }

    /// `(time, band, row, col)`
    pub fn shape(&self) -> (usize, usize, usize, usize) {
        self.data.dim()
    }

    pub fn time_len(&self) -> usize {
        self.data.len_of(Axis(0))
    }

    pub fn band_index(&self, band: &str) -> Option<usize> {
        self.bands.iter().position(|b| b == band)
    }

    pub fn slice(&self, time: usize, band: usize) -> ArrayView2<'_, f32> {
        self.data.slice(s![time, band, .., ..])
    }

    /// Per-pixel median over time, ignoring NaN. Pixels with no valid
    /// observation stay NaN.
    pub fn median_over_time(&self, band: usize) -> Array2<f32> {
        let (_, _, height, width) = self.shape();
        let series = self.data.index_axis(Axis(1), band);
        Array2::from_shape_fn((height, width), |(row, col)| {
            let mut values: Vec<f32> = series
                .slice(s![.., row, col])
                .iter()
                .copied()
                .filter(|v| !v.is_nan())
                .collect();
            if values.is_empty() {
                return f32::NAN;
            }
            values.sort_by(|a, b| a.total_cmp(b));
            let mid = values.len() / 2;
            if values.len() % 2 == 0 {
                (values[mid - 1] + values[mid]) / 2.0
            } else {
                values[mid]
            }
        })
    }
}

use gdal::{Dataset, GeoTransform, GeoTransformEx, Metadata};
use std::path::Path;
use tracing::{debug, warn};

use crate::bands::{parse_valid_time, BandInfo, COMMENT_KEY, VALID_TIME_KEY};
use crate::error::Result;

/// Reads the valid time and comment of every band.
pub fn read_band_info(dataset: &Dataset) -> Result<Vec<BandInfo>> {
    let band_count = dataset.raster_count();
    debug!("Total bands: {}", band_count);

    let mut bands = Vec::with_capacity(band_count);
    for index in 1..=band_count {
        let band = dataset.rasterband(index)?;
        let raw_time = band.metadata_item(VALID_TIME_KEY, "");
        let valid_time = raw_time.as_deref().and_then(parse_valid_time);
        if let (Some(raw), None) = (&raw_time, valid_time) {
            warn!(band = index, "unreadable {}: {:?}", VALID_TIME_KEY, raw);
        }

        bands.push(BandInfo {
            index,
            valid_time,
            comment: band.metadata_item(COMMENT_KEY, "").unwrap_or_default(),
        });
    }
    Ok(bands)
}

pub fn open_band_info(path: &Path) -> Result<Vec<BandInfo>> {
    let dataset = Dataset::open(path)?;
    read_band_info(&dataset)
}

/// Point lookup of every band of a raster.
pub struct RasterSampler {
    dataset: Dataset,
    inverse: Option<GeoTransform>,
    size: (usize, usize),
    nodata: Vec<Option<f64>>,
}

impl RasterSampler {
    pub fn open(path: &Path) -> Result<Self> {
        let dataset = Dataset::open(path)?;
        // A degenerate transform leaves every lookup outside the raster
        let inverse = dataset.geo_transform()?.invert().ok();
        if inverse.is_none() {
            warn!("{:?}: geotransform is not invertible", path);
        }
        let size = dataset.raster_size();

        let mut nodata = Vec::with_capacity(dataset.raster_count());
        for index in 1..=dataset.raster_count() {
            nodata.push(dataset.rasterband(index)?.no_data_value());
        }

        Ok(Self {
            dataset,
            inverse,
            size,
            nodata,
        })
    }

    pub fn band_count(&self) -> usize {
        self.nodata.len()
    }

    /// Pixel `(column, row)` holding world coordinate `(x, y)`.
    pub fn pixel_at(&self, x: f64, y: f64) -> Option<(usize, usize)> {
        let (col, row) = self.inverse.as_ref()?.apply(x, y);
        let (col, row) = (col.floor(), row.floor());
        if col < 0.0 || row < 0.0 || col >= self.size.0 as f64 || row >= self.size.1 as f64 {
            return None;
        }
        Some((col as usize, row as usize))
    }

    /// One value per band; `None` outside the raster or on a band's nodata.
    pub fn sample(&self, x: f64, y: f64) -> Result<Vec<Option<f64>>> {
        let Some((col, row)) = self.pixel_at(x, y) else {
            return Ok(vec![None; self.band_count()]);
        };

        let mut values = Vec::with_capacity(self.band_count());
        for (i, nodata) in self.nodata.iter().enumerate() {
            let band = self.dataset.rasterband(i + 1)?;
            let mut pixel = [0f64; 1];
            band.read_into_slice((col as isize, row as isize), (1, 1), (1, 1), &mut pixel, None)?;
            let value = pixel[0];
            values.push(match nodata {
                Some(nodata) if value == *nodata => None,
                _ => Some(value),
            });
        }
        Ok(values)
    }
}

//! Labelled point records and non-fire point generation.

use gdal::spatial_ref::{AxisMappingStrategy, CoordTransform, SpatialRef};
use rand::Rng;
use serde::Serialize;
use tracing::{info, warn};

use crate::boundary::Boundary;
use crate::error::Result;

pub const FIRE: u8 = 1;
pub const NO_FIRE: u8 = 0;

/// One row of the common point schema.
///
/// `x`/`y` are the geometry in the projected CRS; `latitude`/`longitude`
/// are the geographic attributes exported alongside them.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PointRecord {
    #[serde(rename = "X")]
    pub x: f64,
    #[serde(rename = "Y")]
    pub y: f64,
    #[serde(rename = "Latitude")]
    pub latitude: f64,
    #[serde(rename = "Longitude")]
    pub longitude: f64,
    /// English month name, empty when the source date could not be parsed.
    #[serde(rename = "Month")]
    pub month: String,
    /// 0 when the source date could not be parsed.
    #[serde(rename = "Year")]
    pub year: i32,
    #[serde(rename = "Fire")]
    pub fire: u8,
}

/// Projected-to-geographic conversion for the attribute table.
pub trait ToGeographic {
    /// Returns `(latitude, longitude)` for a projected `(x, y)`.
    fn to_lat_lon(&self, x: f64, y: f64) -> Result<(f64, f64)>;
}

/// GDAL/PROJ transformation from the target CRS to a geographic CRS.
pub struct GdalToGeographic {
    transform: CoordTransform,
}

impl GdalToGeographic {
    pub fn new(source_epsg: u32, geographic_epsg: u32) -> Result<Self> {
        let mut source = SpatialRef::from_epsg(source_epsg)?;
        let mut target = SpatialRef::from_epsg(geographic_epsg)?;
        // x = longitude, y = latitude regardless of the authority axis order
        source.set_axis_mapping_strategy(AxisMappingStrategy::TraditionalGisOrder);
        target.set_axis_mapping_strategy(AxisMappingStrategy::TraditionalGisOrder);
        Ok(Self {
            transform: CoordTransform::new(&source, &target)?,
        })
    }
}

impl ToGeographic for GdalToGeographic {
    fn to_lat_lon(&self, x: f64, y: f64) -> Result<(f64, f64)> {
        let mut xs = [x];
        let mut ys = [y];
        let mut zs = [0.0];
        self.transform.transform_coords(&mut xs, &mut ys, &mut zs)?;
        Ok((ys[0], xs[0]))
    }
}

/// Outcome of a generation request; may hold fewer points than requested.
#[derive(Debug, Clone)]
pub struct GeneratedPoints {
    pub points: Vec<PointRecord>,
    pub requested: usize,
    pub attempts: usize,
}

impl GeneratedPoints {
    pub fn is_partial(&self) -> bool {
        self.points.len() < self.requested
    }
}

/// Rejection sampler over a boundary's bounding box.
pub struct PointGenerator<R: Rng> {
    rng: R,
    max_attempts: usize,
}

impl<R: Rng> PointGenerator<R> {
    pub fn new(rng: R, max_attempts: usize) -> Self {
        Self { rng, max_attempts }
    }

    /// Draws up to `count` non-fire points strictly inside `boundary`.
    ///
    /// Stops after `max_attempts` candidates whether or not `count` was
    /// reached; a short result is logged and flagged, not an error.
    pub fn generate(
        &mut self,
        boundary: &Boundary,
        count: usize,
        geographic: &dyn ToGeographic,
        month_name: &str,
        year: i32,
    ) -> Result<GeneratedPoints> {
        let extent = boundary.extent();
        let (xmin, ymin) = (extent.min().x, extent.min().y);
        let (xmax, ymax) = (extent.max().x, extent.max().y);

        let mut points = Vec::with_capacity(count);
        let mut attempts = 0;

        while points.len() < count && attempts < self.max_attempts {
            attempts += 1;
            let x = self.rng.random_range(xmin..=xmax);
            let y = self.rng.random_range(ymin..=ymax);

            if !boundary.contains(x, y) {
                continue;
            }

            let (latitude, longitude) = geographic.to_lat_lon(x, y)?;
            points.push(PointRecord {
                x,
                y,
                latitude,
                longitude,
                month: month_name.to_string(),
                year,
                fire: NO_FIRE,
            });
        }

        let generated = GeneratedPoints {
            points,
            requested: count,
            attempts,
        };

        if generated.is_partial() {
            warn!(
                "Only generated {} of {} points after {} attempts",
                generated.points.len(),
                count,
                attempts
            );
        } else {
            info!("Generated {} no-fire points for {} {}", count, month_name, year);
        }

        Ok(generated)
    }
}

/// Fire points first, then non-fire points, in one schema.
pub fn merge(fire: Vec<PointRecord>, non_fire: Vec<PointRecord>) -> Vec<PointRecord> {
    let mut merged = fire;
    merged.extend(non_fire);
    merged
}

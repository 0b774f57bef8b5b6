//! Fire hotspot ingestion and harmonisation into the common point schema.
//!
//! Hotspot archives from different years spell their fields differently
//! (`REP_DATE` vs `rep_date`, `LAT` vs `lat`). [`HotspotSchema`] resolves the
//! spelling once per layer so the rest of the pipeline never branches on it.

use chrono::{Datelike, NaiveDate, NaiveDateTime};
use gdal::vector::LayerAccess;
use gdal::Dataset;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::boundary::Boundary;
use crate::calendar::month_name;
use crate::error::{EtlError, Result};
use crate::points::{PointRecord, ToGeographic, FIRE};

const DATE_ALIASES: &[&str] = &["REP_DATE", "rep_date"];
const LATITUDE_ALIASES: &[&str] = &["LAT", "lat"];
const LONGITUDE_ALIASES: &[&str] = &["LON", "lon"];

const DATETIME_FORMATS: &[&str] = &[
    "%Y/%m/%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y/%m/%d %H:%M",
    "%Y-%m-%d %H:%M",
];
const DATE_FORMATS: &[&str] = &["%Y/%m/%d", "%Y-%m-%d"];

/// Field positions of one hotspot layer vintage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HotspotSchema {
    pub date: usize,
    pub latitude: Option<usize>,
    pub longitude: Option<usize>,
}

impl HotspotSchema {
    /// `None` when the layer has no report-date field at all.
    pub fn resolve<S: AsRef<str>>(field_names: &[S]) -> Option<Self> {
        Some(Self {
            date: find_alias(field_names, DATE_ALIASES)?,
            latitude: find_alias(field_names, LATITUDE_ALIASES),
            longitude: find_alias(field_names, LONGITUDE_ALIASES),
        })
    }
}

fn find_alias<S: AsRef<str>>(field_names: &[S], aliases: &[&str]) -> Option<usize> {
    aliases
        .iter()
        .find_map(|alias| field_names.iter().position(|name| name.as_ref() == *alias))
}

/// Parses a hotspot report date.
///
/// Accepts slash-delimited timestamps with fractional seconds
/// (`2015/03/04 12:00:00.000`), dash-delimited ones without
/// (`2015-03-04 12:00:00`), the ISO `T` separator and bare dates.
pub fn parse_report_date(raw: &str) -> Option<NaiveDateTime> {
    let mut raw = raw.trim().trim_end_matches('Z');
    // OGR renders zoned datetime fields with a `+hh` or `+hh:mm` suffix
    if let Some((head, zone)) = raw.rsplit_once('+') {
        if !zone.is_empty() && zone.chars().all(|c| c.is_ascii_digit() || c == ':') {
            raw = head;
        }
    }
    if raw.is_empty() {
        return None;
    }
    DATETIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|format| NaiveDate::parse_from_str(raw, format).ok())
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
}

/// Reads a coordinate attribute stored as either a number or text.
///
/// Blank and non-numeric values are `None`, so the caller falls back to the
/// geometry instead of taking 0.
pub fn parse_coordinate(raw: Option<&str>) -> Option<f64> {
    raw.and_then(|value| value.trim().parse::<f64>().ok())
        .filter(|value| value.is_finite())
}

/// A hotspot feature as read from a reprojected layer.
#[derive(Debug, Clone, PartialEq)]
pub struct RawHotspot {
    pub x: f64,
    pub y: f64,
    pub report_date: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl RawHotspot {
    fn parsed_date(&self) -> Option<NaiveDateTime> {
        self.report_date.as_deref().and_then(parse_report_date)
    }

    /// Converts to the common schema with `Fire = 1`.
    ///
    /// An unparseable date yields an empty month and year 0 rather than an
    /// error. Latitude/longitude come from the layer's attributes; the
    /// geometry is transformed only when they are missing.
    pub fn harmonize(&self, geographic: &dyn ToGeographic) -> Result<PointRecord> {
        let (month, year) = match self.parsed_date() {
            Some(date) => (
                month_name(date.month()).unwrap_or_default().to_string(),
                date.year(),
            ),
            None => {
                debug!("Failed date parsing for {:?}", self.report_date);
                (String::new(), 0)
            }
        };

        let (latitude, longitude) = match (self.latitude, self.longitude) {
            (Some(lat), Some(lon)) => (lat, lon),
            _ => geographic.to_lat_lon(self.x, self.y)?,
        };

        Ok(PointRecord {
            x: self.x,
            y: self.y,
            latitude,
            longitude,
            month,
            year,
            fire: FIRE,
        })
    }
}

/// All hotspots of one year, in the target CRS.
#[derive(Debug, Clone, Default)]
pub struct HotspotLayer {
    pub features: Vec<RawHotspot>,
}

impl HotspotLayer {
    pub fn new(features: Vec<RawHotspot>) -> Self {
        Self { features }
    }

    /// Reads point features from the first layer of `path`.
    ///
    /// A layer without a report-date field is treated as having no usable
    /// hotspots.
    pub fn open(path: &Path) -> Result<Self> {
        let dataset = Dataset::open(path)?;
        let mut layer = dataset.layer(0)?;

        let field_names: Vec<String> = layer.defn().fields().map(|field| field.name()).collect();
        let Some(schema) = HotspotSchema::resolve(&field_names) else {
            warn!("{:?}: no REP_DATE or rep_date field", path);
            return Ok(Self::default());
        };

        let mut features = Vec::new();
        for feature in layer.features() {
            let Some(geometry) = feature.geometry() else {
                continue;
            };
            if geometry.is_empty() {
                continue;
            }
            let (x, y, _) = geometry.get_point(0);

            features.push(RawHotspot {
                x,
                y,
                report_date: feature.field_as_string(schema.date)?,
                latitude: match schema.latitude {
                    Some(i) => parse_coordinate(feature.field_as_string(i)?.as_deref()),
                    None => None,
                },
                longitude: match schema.longitude {
                    Some(i) => parse_coordinate(feature.field_as_string(i)?.as_deref()),
                    None => None,
                },
            });
        }

        info!("Loaded {} hotspots from {:?}", features.len(), path);
        Ok(Self { features })
    }

    /// Hotspots reported in `year`/`month` that lie inside `boundary`,
    /// edges included.
    pub fn monthly<'a>(&'a self, year: i32, month: u32, boundary: &Boundary) -> Vec<&'a RawHotspot> {
        let mut unparsed = 0usize;
        let selected: Vec<&RawHotspot> = self
            .features
            .iter()
            .filter(|hotspot| match hotspot.parsed_date() {
                Some(date) => date.year() == year && date.month() == month,
                None => {
                    if hotspot.report_date.is_some() {
                        unparsed += 1;
                    }
                    false
                }
            })
            .filter(|hotspot| boundary.covers(hotspot.x, hotspot.y))
            .collect();

        if unparsed > 0 {
            debug!(year, month, unparsed, "skipped hotspots with bad dates");
        }
        selected
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

/// Per-year hotspot layers.
///
/// A year is inserted once before its months are visited and only read
/// afterwards. Reading a year that was never inserted is an error rather
/// than a silent empty result.
#[derive(Debug, Default)]
pub struct HotspotCache {
    years: BTreeMap<i32, HotspotLayer>,
}

impl HotspotCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, year: i32, layer: HotspotLayer) {
        self.years.insert(year, layer);
    }

    pub fn contains(&self, year: i32) -> bool {
        self.years.contains_key(&year)
    }

    pub fn get(&self, year: i32) -> Result<&HotspotLayer> {
        self.years
            .get(&year)
            .ok_or(EtlError::HotspotsNotPrepared { year })
    }

    pub fn evict(&mut self, year: i32) {
        self.years.remove(&year);
    }
}

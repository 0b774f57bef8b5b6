//! Attaching raster values to points and discarding incomplete rows.

use std::fmt;
use tracing::info;

use crate::error::Result;
use crate::points::PointRecord;
use crate::raster::RasterSampler;

/// Sentinel written for missing pixels by the clip step.
pub const NODATA_SENTINEL: f64 = -9999.0;

#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    Null,
    Text(String),
    Integer(i64),
    Real(f64),
}

impl AttributeValue {
    /// Null, empty text, the -9999 sentinel or NaN.
    pub fn is_missing(&self) -> bool {
        match self {
            Self::Null => true,
            Self::Text(text) => text.is_empty(),
            Self::Integer(value) => *value == NODATA_SENTINEL as i64,
            Self::Real(value) => value.is_nan() || *value == NODATA_SENTINEL,
        }
    }
}

impl From<Option<f64>> for AttributeValue {
    fn from(value: Option<f64>) -> Self {
        value.map_or(Self::Null, Self::Real)
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => Ok(()),
            Self::Text(text) => write!(f, "{}", text),
            Self::Integer(value) => write!(f, "{}", value),
            Self::Real(value) => write!(f, "{}", value),
        }
    }
}

/// A point with named sampled fields, in field order.
#[derive(Debug, Clone, PartialEq)]
pub struct SampledRecord {
    pub point: PointRecord,
    pub fields: Vec<(String, AttributeValue)>,
}

impl SampledRecord {
    pub fn field(&self, name: &str) -> Option<&AttributeValue> {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, value)| value)
    }
}

/// A raster whose bands become named fields.
pub struct SampleSource<'a> {
    pub sampler: &'a RasterSampler,
    pub band_names: Vec<String>,
}

impl<'a> SampleSource<'a> {
    /// Names bands from `names` in order; bands past the list are named by
    /// their 1-based index.
    pub fn new(sampler: &'a RasterSampler, names: &[String]) -> Self {
        let band_names = (0..sampler.band_count())
            .map(|i| names.get(i).cloned().unwrap_or_else(|| (i + 1).to_string()))
            .collect();
        Self { sampler, band_names }
    }
}

/// Samples every source at every point.
pub fn sample_points(points: Vec<PointRecord>, sources: &[SampleSource<'_>]) -> Result<Vec<SampledRecord>> {
    let mut sampled = Vec::with_capacity(points.len());
    for point in points {
        let mut fields = Vec::new();
        for source in sources {
            let values = source.sampler.sample(point.x, point.y)?;
            fields.extend(
                source
                    .band_names
                    .iter()
                    .cloned()
                    .zip(values.into_iter().map(AttributeValue::from)),
            );
        }
        sampled.push(SampledRecord { point, fields });
    }
    Ok(sampled)
}

/// Drops records with a missing value in any checked field.
#[derive(Debug, Clone)]
pub struct Cleaner {
    checked_fields: Vec<String>,
}

impl Cleaner {
    pub fn new(checked_fields: Vec<String>) -> Self {
        Self { checked_fields }
    }

    /// Rows are removed, never repaired. Checked fields absent from a record
    /// are not considered.
    pub fn keep(&self, record: &SampledRecord) -> bool {
        !self
            .checked_fields
            .iter()
            .filter_map(|name| record.field(name))
            .any(AttributeValue::is_missing)
    }

    pub fn clean(&self, records: Vec<SampledRecord>) -> Vec<SampledRecord> {
        let total = records.len();
        let kept: Vec<SampledRecord> = records.into_iter().filter(|r| self.keep(r)).collect();
        info!("Filtered out {} features with missing values", total - kept.len());
        info!("Remaining features: {}", kept.len());
        kept
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::points::NO_FIRE;

    fn record(fields: Vec<(&str, AttributeValue)>) -> SampledRecord {
        SampledRecord {
            point: PointRecord {
                x: 0.0,
                y: 0.0,
                latitude: 49.0,
                longitude: -123.0,
                month: "July".to_string(),
                year: 2015,
                fire: NO_FIRE,
            },
            fields: fields
                .into_iter()
                .map(|(name, value)| (name.to_string(), value))
                .collect(),
        }
    }

    fn cleaner() -> Cleaner {
        Cleaner::new(vec!["temp_2m".to_string(), "Fuel_Type".to_string()])
    }

    #[test]
    fn test_missing_values() {
        assert!(AttributeValue::Null.is_missing());
        assert!(AttributeValue::Text(String::new()).is_missing());
        assert!(AttributeValue::Integer(-9999).is_missing());
        assert!(AttributeValue::Real(-9999.0).is_missing());
        assert!(AttributeValue::Real(f64::NAN).is_missing());

        assert!(!AttributeValue::Real(0.0).is_missing());
        assert!(!AttributeValue::Integer(0).is_missing());
        assert!(!AttributeValue::Text("C2".to_string()).is_missing());
        assert!(!AttributeValue::Real(-9998.5).is_missing());
    }

    #[test]
    fn test_cleaner_keeps_valid_zero() {
        let valid = record(vec![
            ("temp_2m", AttributeValue::Real(0.0)),
            ("Fuel_Type", AttributeValue::Integer(0)),
        ]);
        assert!(cleaner().keep(&valid));
    }

    #[test]
    fn test_cleaner_drops_any_missing_field() {
        for missing in [
            AttributeValue::Null,
            AttributeValue::Text(String::new()),
            AttributeValue::Real(-9999.0),
            AttributeValue::Real(f64::NAN),
        ] {
            let row = record(vec![
                ("temp_2m", AttributeValue::Real(281.5)),
                ("Fuel_Type", missing.clone()),
            ]);
            assert!(!cleaner().keep(&row), "{:?} should be dropped", missing);
        }
    }

    #[test]
    fn test_unchecked_and_absent_fields_ignored() {
        let row = record(vec![
            ("temp_2m", AttributeValue::Real(281.5)),
            ("lai_high", AttributeValue::Null),
        ]);
        assert!(cleaner().keep(&row));
    }

    #[test]
    fn test_clean_filters_rows() {
        let rows = vec![
            record(vec![("temp_2m", AttributeValue::Real(1.0))]),
            record(vec![("temp_2m", AttributeValue::Null)]),
            record(vec![("temp_2m", AttributeValue::Real(2.0))]),
        ];
        let kept = cleaner().clean(rows);
        assert_eq!(kept.len(), 2);
    }

    #[test]
    fn test_display_for_csv() {
        assert_eq!(AttributeValue::Null.to_string(), "");
        assert_eq!(AttributeValue::Real(1.5).to_string(), "1.5");
        assert_eq!(AttributeValue::Integer(3).to_string(), "3");
    }
}

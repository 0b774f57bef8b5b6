//! Pipeline configuration.
//!
//! Every key has a default, so an empty TOML file describes the British Columbia
//! 2000-2024 run. Relative paths are resolved against `base_dir` by
//! [`crate::layout::DataLayout`].

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::{EtlError, Result};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub base_dir: PathBuf,
    pub start_year: i32,
    pub end_year: i32,
    /// Seed for non-fire point generation. `None` draws from OS entropy.
    pub seed: Option<u64>,
    pub crs: CrsConfig,
    pub boundary: BoundaryConfig,
    pub climate: ClimateConfig,
    pub fuel: FuelConfig,
    pub points: PointsConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("."),
            start_year: 2000,
            end_year: 2024,
            seed: None,
            crs: CrsConfig::default(),
            boundary: BoundaryConfig::default(),
            climate: ClimateConfig::default(),
            fuel: FuelConfig::default(),
            points: PointsConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CrsConfig {
    /// Projected CRS used for clipping, containment and sampling.
    pub target_epsg: u32,
    /// CRS of the Latitude/Longitude attributes.
    pub geographic_epsg: u32,
}

impl Default for CrsConfig {
    fn default() -> Self {
        Self {
            target_epsg: 3347,
            geographic_epsg: 4326,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BoundaryConfig {
    /// National provinces layer the boundary is filtered from.
    pub source: PathBuf,
    pub field: String,
    pub value: String,
}

impl Default for BoundaryConfig {
    fn default() -> Self {
        Self {
            source: PathBuf::from("Map_of_Canada/lpr_000b16a_e.shp"),
            field: "PREABBR".to_string(),
            value: "B.C.".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClimateConfig {
    pub nodata: f64,
    pub fill_max_distance: u32,
    pub fill_smoothing_iterations: u32,
    /// Lower-case substrings of `GRIB_COMMENT` marking accumulated quantities.
    pub cumulative_keywords: Vec<String>,
    /// Field names for the filled climate stack, in band order.
    pub band_names: Vec<String>,
}

impl Default for ClimateConfig {
    fn default() -> Self {
        Self {
            nodata: -9999.0,
            fill_max_distance: 10,
            fill_smoothing_iterations: 0,
            cumulative_keywords: ["[m]", "precipitation", "total"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            band_names: [
                "u10_wind",
                "v10_wind",
                "dew_temp_2m",
                "temp_2m",
                "tot_precip",
                "lai_high",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FuelConfig {
    pub source: PathBuf,
    pub field_name: String,
}

impl Default for FuelConfig {
    fn default() -> Self {
        Self {
            source: PathBuf::from("National_FBP_Fueltypes_version2014b/nat_fbpfuels_2014b.tif"),
            field_name: "Fuel_Type".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PointsConfig {
    pub max_attempts: usize,
    pub fallback_non_fire_count: usize,
    pub write_shapefiles: bool,
    /// Keep every year's hotspots in memory instead of evicting at the year boundary.
    pub retain_hotspot_cache: bool,
}

impl Default for PointsConfig {
    fn default() -> Self {
        Self {
            max_attempts: 10_000,
            fallback_non_fire_count: 400,
            write_shapefiles: true,
            retain_hotspot_cache: false,
        }
    }
}

impl PipelineConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        if self.start_year > self.end_year {
            return Err(EtlError::InvalidInput(format!(
                "start_year {} is after end_year {}",
                self.start_year, self.end_year
            )));
        }
        if self.points.max_attempts == 0 {
            return Err(EtlError::InvalidInput(
                "points.max_attempts must be positive".to_string(),
            ));
        }
        if self.crs.target_epsg == 0 || self.crs.geographic_epsg == 0 {
            return Err(EtlError::InvalidInput("EPSG codes must be non-zero".to_string()));
        }
        Ok(())
    }

    pub fn years(&self) -> std::ops::RangeInclusive<i32> {
        self.start_year..=self.end_year
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = PipelineConfig::from_toml_str("").unwrap();
        assert_eq!(config.start_year, 2000);
        assert_eq!(config.end_year, 2024);
        assert_eq!(config.crs.target_epsg, 3347);
        assert_eq!(config.points.max_attempts, 10_000);
        assert_eq!(config.points.fallback_non_fire_count, 400);
        assert_eq!(config.climate.band_names.len(), 6);
        assert_eq!(config.boundary.value, "B.C.");
    }

    #[test]
    fn test_partial_sections_override() {
        let text = r#"
            base_dir = "/data/wildfire"
            start_year = 2010
            end_year = 2011
            seed = 7

            [points]
            max_attempts = 50
        "#;
        let config = PipelineConfig::from_toml_str(text).unwrap();
        assert_eq!(config.base_dir, PathBuf::from("/data/wildfire"));
        assert_eq!(config.seed, Some(7));
        assert_eq!(config.points.max_attempts, 50);
        assert!(config.points.write_shapefiles);
        assert_eq!(config.years().count(), 2);
    }

    #[test]
    fn test_reversed_years_rejected() {
        let result = PipelineConfig::from_toml_str("start_year = 2020\nend_year = 2019\n");
        assert!(matches!(result, Err(EtlError::InvalidInput(_))));
    }

    #[test]
    fn test_malformed_toml_rejected() {
        let result = PipelineConfig::from_toml_str("start_year = \"soon\"");
        assert!(matches!(result, Err(EtlError::Config(_))));
    }

    #[test]
    fn test_example_config_matches_defaults() {
        let config = PipelineConfig::from_toml_str(include_str!("../wildfire-etl.example.toml")).unwrap();
        let defaults = PipelineConfig::default();
        assert_eq!(config.climate.band_names, defaults.climate.band_names);
        assert_eq!(config.climate.cumulative_keywords, defaults.climate.cumulative_keywords);
        assert_eq!(config.fuel.source, defaults.fuel.source);
        assert_eq!(config.seed, None);
    }
}

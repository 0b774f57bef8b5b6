//! On-disk layout shared by the climate and point stages.

use std::path::{Path, PathBuf};

use crate::bands::ArchiveSpan;
use crate::config::PipelineConfig;

#[derive(Debug, Clone)]
pub struct DataLayout {
    base_dir: PathBuf,
    boundary_source: PathBuf,
    fuel_source: PathBuf,
    target_epsg: u32,
    start_year: i32,
    end_year: i32,
}

impl DataLayout {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            base_dir: config.base_dir.clone(),
            boundary_source: config.boundary.source.clone(),
            fuel_source: config.fuel.source.clone(),
            target_epsg: config.crs.target_epsg,
            start_year: config.start_year,
            end_year: config.end_year,
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }

    // --- boundary ---

    pub fn provinces(&self) -> PathBuf {
        self.resolve(&self.boundary_source)
    }

    fn boundary_dir(&self) -> PathBuf {
        self.provinces()
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.base_dir.clone())
    }

    pub fn boundary(&self) -> PathBuf {
        self.boundary_dir().join("BC_boundary.shp")
    }

    pub fn reprojected_boundary(&self) -> PathBuf {
        self.boundary_dir()
            .join(format!("BC_boundary_epsg{}.shp", self.target_epsg))
    }

    // --- fuel ---

    pub fn fuel_source(&self) -> PathBuf {
        self.resolve(&self.fuel_source)
    }

    fn fuel_dir(&self) -> PathBuf {
        self.fuel_source()
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.base_dir.clone())
    }

    pub fn clipped_fuel(&self) -> PathBuf {
        self.fuel_dir().join("temp_clipped_fuel.tif")
    }

    pub fn fuel(&self) -> PathBuf {
        self.fuel_dir()
            .join(format!("BC_fuel_type_epsg{}.tif", self.target_epsg))
    }

    // --- climate ---

    fn climate_root(&self) -> PathBuf {
        self.base_dir.join("climate_data").join("GRIB_climate_data")
    }

    pub fn climate_archive(&self, year: i32) -> PathBuf {
        let span = ArchiveSpan::for_year(year);
        self.climate_root().join(format!("{}.grib", span.label()))
    }

    pub fn climate_month_dir(&self, year: i32, month_name: &str) -> PathBuf {
        self.climate_root().join(year.to_string()).join(month_name)
    }

    pub fn climate_stack(&self, year: i32, month_name: &str) -> PathBuf {
        self.climate_month_dir(year, month_name)
            .join(format!("{}_{}.tif", month_name, year))
    }

    pub fn clipped_climate(&self, year: i32, month_name: &str) -> PathBuf {
        let span = ArchiveSpan::for_year(year);
        self.climate_month_dir(year, month_name)
            .join(format!("BC_temp_{}_{}.tif", span.label(), month_name))
    }

    pub fn reprojected_climate(&self, year: i32, month_name: &str) -> PathBuf {
        let span = ArchiveSpan::for_year(year);
        self.climate_month_dir(year, month_name)
            .join(format!("BC_{}_{}.tif", span.label(), month_name))
    }

    pub fn filled_bands_dir(&self, year: i32, month_name: &str) -> PathBuf {
        self.climate_month_dir(year, month_name)
            .join(format!("Filled_Bands_{}_{}", month_name, year))
    }

    pub fn filled_band(&self, year: i32, month_name: &str, band: usize) -> PathBuf {
        self.filled_bands_dir(year, month_name)
            .join(format!("filled_band_{}.tif", band))
    }

    /// Final climate raster, the input of the sampling step.
    pub fn filled_climate(&self, year: i32, month_name: &str) -> PathBuf {
        self.filled_bands_dir(year, month_name)
            .join(format!("{}_{}_Filled_Stacked_Climate.tif", month_name, year))
    }

    // --- points ---

    fn point_root(&self) -> PathBuf {
        self.base_dir.join("Point_data")
    }

    fn hotspot_dir(&self, year: i32) -> PathBuf {
        self.point_root()
            .join("Hotspot data")
            .join(format!("{}_hotspots", year))
    }

    pub fn hotspots(&self, year: i32) -> PathBuf {
        self.hotspot_dir(year).join(format!("{}_hotspots.shp", year))
    }

    pub fn reprojected_hotspots(&self, year: i32) -> PathBuf {
        self.hotspot_dir(year)
            .join("Reprojected_hotspot_files")
            .join(format!("{}_reprojected.shp", year))
    }

    pub fn random_points(&self, year: i32, month_name: &str, extension: &str) -> PathBuf {
        self.point_root()
            .join("Random_points")
            .join(year.to_string())
            .join(month_name)
            .join(format!("Random_NoFire_{}_{}.{}", month_name, year, extension))
    }

    pub fn merged_points(&self, year: i32, month_name: &str, extension: &str) -> PathBuf {
        self.point_root()
            .join("Merged")
            .join(year.to_string())
            .join(month_name)
            .join(format!("Merged_Fire_NoFire_{}_{}.{}", month_name, year, extension))
    }

    pub fn sampled_dir(&self, year: i32, month_name: &str) -> PathBuf {
        self.point_root()
            .join("Sampled")
            .join(year.to_string())
            .join(month_name)
    }

    pub fn cleaned_csv(&self, year: i32, month_name: &str) -> PathBuf {
        self.sampled_dir(year, month_name)
            .join(format!("Cleaned_Sampled_Points_{}{}.csv", month_name, year))
    }

    pub fn combined_csv(&self) -> PathBuf {
        self.point_root().join("Sampled").join(format!(
            "Combined_Sampled_Points_{}-{}.csv",
            self.start_year, self.end_year
        ))
    }

    pub fn count_table(&self) -> PathBuf {
        self.point_root().join("non_fire_counts.csv")
    }
}

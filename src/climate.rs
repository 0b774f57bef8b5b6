//! Monthly climate raster assembly.

use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{error, info};

use crate::bands::BandSelector;
use crate::calendar::month_name;
use crate::config::PipelineConfig;
use crate::engine::GisEngine;
use crate::error::{EtlError, Result};
use crate::layout::DataLayout;
use crate::raster::open_band_info;

/// Turns one month of a two-year archive into a filled, clipped, reprojected
/// stack.
pub struct ClimateExtractor<'a> {
    config: &'a PipelineConfig,
    layout: &'a DataLayout,
    engine: &'a dyn GisEngine,
    selector: BandSelector,
}

impl<'a> ClimateExtractor<'a> {
    pub fn new(config: &'a PipelineConfig, layout: &'a DataLayout, engine: &'a dyn GisEngine) -> Self {
        Self {
            config,
            layout,
            engine,
            selector: BandSelector::new(config.climate.cumulative_keywords.iter().cloned()),
        }
    }

    /// Returns the filled stack, or `None` when the month has no data.
    pub fn extract_month(&self, year: i32, month: u32) -> Result<Option<PathBuf>> {
        let name = month_name(month)
            .ok_or_else(|| EtlError::InvalidInput(format!("month {} out of range", month)))?;

        let archive = self.layout.climate_archive(year);
        if !archive.exists() {
            info!("Climate archive not found: {:?}", archive);
            return Ok(None);
        }

        let bands = open_band_info(&archive)?;
        let selected = self.selector.select(&bands, year, month);
        if selected.is_empty() {
            info!("No bands found for {} {}", name, year);
            return Ok(None);
        }

        let scratch = TempDir::new()?;
        let mut band_files = Vec::with_capacity(selected.len());
        for &index in &selected {
            let band_file = scratch.path().join(format!("band_{}.tif", index));
            self.engine.extract_band(&archive, index, &band_file)?;
            band_files.push(band_file);
        }

        let stack = self.layout.climate_stack(year, name);
        self.engine.stack_bands(&band_files, &stack)?;
        info!("Stacked {} bands into {:?}", band_files.len(), stack);

        let clipped = self.layout.clipped_climate(year, name);
        self.engine.clip_raster_by_mask(
            &stack,
            &self.layout.reprojected_boundary(),
            self.config.climate.nodata,
            &clipped,
        )?;

        let reprojected = self.layout.reprojected_climate(year, name);
        self.engine
            .warp_raster(&clipped, self.config.crs.target_epsg, &reprojected)?;
        info!("Reprojected raster to EPSG:{}", self.config.crs.target_epsg);

        fs::create_dir_all(self.layout.filled_bands_dir(year, name))?;
        let filled = self.fill_bands(&reprojected, year, name, selected.len())?;

        let output = self.layout.filled_climate(year, name);
        self.engine.stack_bands(&filled, &output)?;
        info!("All bands filled and stacked: {:?}", output);
        Ok(Some(output))
    }

    /// Fills every band separately. A band that fails is dropped from the
    /// stack; the month fails only when every band does.
    fn fill_bands(&self, input: &Path, year: i32, name: &str, band_count: usize) -> Result<Vec<PathBuf>> {
        let mut filled = Vec::with_capacity(band_count);
        let mut last_error = None;

        for band in 1..=band_count {
            let output = self.layout.filled_band(year, name, band);
            match self.engine.fill_nodata(
                input,
                band,
                self.config.climate.fill_max_distance,
                self.config.climate.fill_smoothing_iterations,
                &output,
            ) {
                Ok(()) => filled.push(output),
                Err(e) => {
                    error!(band, "Failed to fill band: {}", e);
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(e) if filled.is_empty() => Err(e),
            _ => Ok(filled),
        }
    }
}

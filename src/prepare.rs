//! Inputs shared by every month: boundary, fuel raster, yearly hotspots.

use std::path::PathBuf;
use tracing::{info, warn};

use crate::boundary::Boundary;
use crate::config::PipelineConfig;
use crate::engine::GisEngine;
use crate::error::Result;
use crate::hotspots::HotspotLayer;
use crate::layout::DataLayout;

/// Extracts the province from the national layer, reprojects it, and loads it.
pub fn prepare_boundary(
    config: &PipelineConfig,
    layout: &DataLayout,
    engine: &dyn GisEngine,
) -> Result<Boundary> {
    let boundary = layout.boundary();
    engine.extract_by_attribute(
        &layout.provinces(),
        &config.boundary.field,
        &config.boundary.value,
        &boundary,
    )?;
    info!("Extracted {} = {} to {:?}", config.boundary.field, config.boundary.value, boundary);

    let reprojected = layout.reprojected_boundary();
    engine.reproject_vector(&boundary, config.crs.target_epsg, &reprojected)?;
    info!("Reprojected boundary to EPSG:{}", config.crs.target_epsg);

    load_boundary(layout)
}

/// Loads a boundary prepared by an earlier run.
pub fn load_boundary(layout: &DataLayout) -> Result<Boundary> {
    Boundary::open(&layout.reprojected_boundary())
}

/// Clips the national fuel raster to the boundary and reprojects it.
///
/// Skipped when the final raster exists.
pub fn prepare_fuel(
    config: &PipelineConfig,
    layout: &DataLayout,
    engine: &dyn GisEngine,
) -> Result<PathBuf> {
    let fuel = layout.fuel();
    if fuel.exists() {
        info!("Reprojected fuel raster already exists, skipping: {:?}", fuel);
        return Ok(fuel);
    }

    let clipped = layout.clipped_fuel();
    engine.clip_raster_by_mask(
        &layout.fuel_source(),
        &layout.reprojected_boundary(),
        config.climate.nodata,
        &clipped,
    )?;
    info!("Temporary clipped fuel raster created");

    engine.warp_raster(&clipped, config.crs.target_epsg, &fuel)?;
    info!("Reprojected fuel raster to EPSG:{}", config.crs.target_epsg);
    Ok(fuel)
}

/// Reprojects (once, cached on disk) and loads a year's hotspot layer.
///
/// A year without a hotspot file yields an empty layer.
pub fn prepare_hotspots(
    config: &PipelineConfig,
    layout: &DataLayout,
    engine: &dyn GisEngine,
    year: i32,
) -> Result<HotspotLayer> {
    let reprojected = layout.reprojected_hotspots(year);
    if !reprojected.exists() {
        let source = layout.hotspots(year);
        if !source.exists() {
            warn!(year, "Hotspot file not found: {:?}", source);
            return Ok(HotspotLayer::new(Vec::new()));
        }
        engine.reproject_vector(&source, config.crs.target_epsg, &reprojected)?;
        info!(year, "Reprojected hotspots to {:?}", reprojected);
    }

    HotspotLayer::open(&reprojected)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::EtlError;
    use std::cell::RefCell;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    /// Records calls and touches each output instead of running tools.
    #[derive(Default)]
    pub(crate) struct RecordingEngine {
        pub(crate) calls: RefCell<Vec<String>>,
        pub(crate) fail_on: Option<&'static str>,
    }

    impl RecordingEngine {
        fn touch(&self, name: &'static str, output: &Path) -> Result<()> {
            self.calls.borrow_mut().push(name.to_string());
            if self.fail_on == Some(name) {
                return Err(EtlError::ToolFailed {
                    tool: name.to_string(),
                    status: "exit status: 1".to_string(),
                    stderr: String::new(),
                });
            }
            if let Some(parent) = output.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(output, b"")?;
            Ok(())
        }
    }

    impl GisEngine for RecordingEngine {
        fn extract_by_attribute(&self, _: &Path, _: &str, _: &str, output: &Path) -> Result<()> {
            self.touch("extract_by_attribute", output)
        }
        fn reproject_vector(&self, _: &Path, _: u32, output: &Path) -> Result<()> {
            self.touch("reproject_vector", output)
        }
        fn extract_band(&self, _: &Path, _: usize, output: &Path) -> Result<()> {
            self.touch("extract_band", output)
        }
        fn stack_bands(&self, _: &[PathBuf], output: &Path) -> Result<()> {
            self.touch("stack_bands", output)
        }
        fn clip_raster_by_mask(&self, _: &Path, _: &Path, _: f64, output: &Path) -> Result<()> {
            self.touch("clip_raster_by_mask", output)
        }
        fn warp_raster(&self, _: &Path, _: u32, output: &Path) -> Result<()> {
            self.touch("warp_raster", output)
        }
        fn fill_nodata(&self, _: &Path, _: usize, _: u32, _: u32, output: &Path) -> Result<()> {
            self.touch("fill_nodata", output)
        }
        fn points_to_vector(&self, _: &Path, _: u32, output: &Path) -> Result<()> {
            self.touch("points_to_vector", output)
        }
    }

    fn setup() -> (TempDir, PipelineConfig) {
        let dir = TempDir::new().unwrap();
        let config = PipelineConfig {
            base_dir: dir.path().to_path_buf(),
            ..PipelineConfig::default()
        };
        (dir, config)
    }

    #[test]
    fn test_fuel_clipped_then_warped() {
        let (_dir, config) = setup();
        let layout = DataLayout::new(&config);
        let engine = RecordingEngine::default();

        let fuel = prepare_fuel(&config, &layout, &engine).unwrap();
        assert_eq!(fuel, layout.fuel());
        assert_eq!(*engine.calls.borrow(), vec!["clip_raster_by_mask", "warp_raster"]);
    }

    #[test]
    fn test_existing_fuel_is_reused() {
        let (_dir, config) = setup();
        let layout = DataLayout::new(&config);
        fs::create_dir_all(layout.fuel().parent().unwrap()).unwrap();
        fs::write(layout.fuel(), b"").unwrap();

        let engine = RecordingEngine::default();
        prepare_fuel(&config, &layout, &engine).unwrap();
        assert!(engine.calls.borrow().is_empty());
    }

    #[test]
    fn test_missing_hotspot_file_is_empty_year() {
        let (_dir, config) = setup();
        let layout = DataLayout::new(&config);
        let engine = RecordingEngine::default();

        let layer = prepare_hotspots(&config, &layout, &engine, 2004).unwrap();
        assert!(layer.is_empty());
        assert!(engine.calls.borrow().is_empty());
    }

    #[test]
    fn test_boundary_failure_propagates() {
        let (_dir, config) = setup();
        let layout = DataLayout::new(&config);
        let engine = RecordingEngine {
            fail_on: Some("reproject_vector"),
            ..RecordingEngine::default()
        };

        let result = prepare_boundary(&config, &layout, &engine);
        assert!(matches!(result, Err(EtlError::ToolFailed { .. })));
        assert_eq!(
            *engine.calls.borrow(),
            vec!["extract_by_attribute", "reproject_vector"]
        );
    }
}

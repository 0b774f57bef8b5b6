//! Opaque geoprocessing operations and their GDAL command-line backend.

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::debug;

use crate::error::{EtlError, Result};

/// Geoprocessing operations the pipeline delegates.
///
/// Every operation writes `output` or fails; an `Ok` return guarantees the
/// output file exists.
pub trait GisEngine {
    /// Copies the features of `input` whose `field` equals `value`.
    fn extract_by_attribute(&self, input: &Path, field: &str, value: &str, output: &Path) -> Result<()>;

    fn reproject_vector(&self, input: &Path, target_epsg: u32, output: &Path) -> Result<()>;

    /// Copies one 1-based band of `input` into a single-band GeoTIFF.
    fn extract_band(&self, input: &Path, band: usize, output: &Path) -> Result<()>;

    /// Stacks single-band rasters, in order, into one multi-band GeoTIFF.
    fn stack_bands(&self, inputs: &[PathBuf], output: &Path) -> Result<()>;

    /// Crops `input` to the polygons of `mask`, writing `nodata` outside them.
    fn clip_raster_by_mask(&self, input: &Path, mask: &Path, nodata: f64, output: &Path) -> Result<()>;

    /// Reprojects a raster with nearest-neighbour resampling.
    fn warp_raster(&self, input: &Path, target_epsg: u32, output: &Path) -> Result<()>;

    fn fill_nodata(
        &self,
        input: &Path,
        band: usize,
        max_distance: u32,
        smoothing_iterations: u32,
        output: &Path,
    ) -> Result<()>;

    /// Converts a CSV with `X`/`Y` columns to a point shapefile.
    fn points_to_vector(&self, csv: &Path, epsg: u32, output: &Path) -> Result<()>;
}

/// One external tool call.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolInvocation {
    pub tool: &'static str,
    pub args: Vec<OsString>,
    pub output: PathBuf,
}

impl ToolInvocation {
    fn new(tool: &'static str, output: &Path) -> Self {
        Self {
            tool,
            args: Vec::new(),
            output: output.to_path_buf(),
        }
    }

    fn arg<S: Into<OsString>>(mut self, arg: S) -> Self {
        self.args.push(arg.into());
        self
    }

    fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn run(&self) -> Result<()> {
        remove_existing(&self.output)?;
        if let Some(parent) = self.output.parent() {
            fs::create_dir_all(parent)?;
        }

        debug!("Running {} {:?}", self.tool, self.args);
        let output = Command::new(self.tool)
            .args(&self.args)
            .output()
            .map_err(|e| EtlError::ToolFailed {
                tool: self.tool.to_string(),
                status: "not started".to_string(),
                stderr: format!("{} (is GDAL installed and on PATH?)", e),
            })?;

        if !output.status.success() {
            return Err(EtlError::ToolFailed {
                tool: self.tool.to_string(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        if !self.output.exists() {
            return Err(EtlError::ToolOutputMissing {
                tool: self.tool.to_string(),
                path: self.output.clone(),
            });
        }
        Ok(())
    }
}

const SHAPEFILE_SIDECARS: [&str; 5] = ["shx", "dbf", "prj", "cpg", "qix"];

/// Removes a previous output, including shapefile sidecar files.
pub fn remove_existing(path: &Path) -> Result<()> {
    if path.exists() {
        fs::remove_file(path)?;
    }
    let is_shapefile = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("shp"));
    if is_shapefile {
        for ext in SHAPEFILE_SIDECARS {
            let sidecar = path.with_extension(ext);
            if sidecar.exists() {
                fs::remove_file(sidecar)?;
            }
        }
    }
    Ok(())
}

/// OGR SQL equality filter with the value quoted.
pub fn attribute_filter(field: &str, value: &str) -> String {
    format!("\"{}\" = '{}'", field.replace('"', "\"\""), value.replace('\'', "''"))
}

fn epsg(code: u32) -> String {
    format!("EPSG:{}", code)
}

/// [`GisEngine`] backed by `ogr2ogr`, `gdal_translate`, `gdalbuildvrt`,
/// `gdalwarp` and `gdal_fillnodata`.
#[derive(Debug, Clone, Default)]
pub struct GdalTools;

impl GdalTools {
    pub fn new() -> Self {
        Self
    }

    pub fn extract_by_attribute_call(input: &Path, field: &str, value: &str, output: &Path) -> ToolInvocation {
        ToolInvocation::new("ogr2ogr", output)
            .args(["-f", "ESRI Shapefile", "-where"])
            .arg(attribute_filter(field, value))
            .arg(output)
            .arg(input)
    }

    pub fn reproject_vector_call(input: &Path, target_epsg: u32, output: &Path) -> ToolInvocation {
        ToolInvocation::new("ogr2ogr", output)
            .args(["-f", "ESRI Shapefile", "-t_srs"])
            .arg(epsg(target_epsg))
            .arg(output)
            .arg(input)
    }

    pub fn extract_band_call(input: &Path, band: usize, output: &Path) -> ToolInvocation {
        ToolInvocation::new("gdal_translate", output)
            .args(["-of", "GTiff", "-b"])
            .arg(band.to_string())
            .arg(input)
            .arg(output)
    }

    pub fn build_vrt_call(inputs: &[PathBuf], vrt: &Path) -> ToolInvocation {
        ToolInvocation::new("gdalbuildvrt", vrt)
            .arg("-separate")
            .arg(vrt)
            .args(inputs.iter().map(|p| p.as_os_str().to_os_string()))
    }

    pub fn translate_call(input: &Path, output: &Path) -> ToolInvocation {
        ToolInvocation::new("gdal_translate", output)
            .args(["-of", "GTiff"])
            .arg(input)
            .arg(output)
    }

    pub fn clip_raster_call(input: &Path, mask: &Path, nodata: f64, output: &Path) -> ToolInvocation {
        ToolInvocation::new("gdalwarp", output)
            .args(["-overwrite", "-of", "GTiff", "-cutline"])
            .arg(mask)
            .args(["-crop_to_cutline", "-dstnodata"])
            .arg(nodata.to_string())
            .arg(input)
            .arg(output)
    }

    pub fn warp_raster_call(input: &Path, target_epsg: u32, output: &Path) -> ToolInvocation {
        ToolInvocation::new("gdalwarp", output)
            .args(["-overwrite", "-of", "GTiff", "-r", "near", "-t_srs"])
            .arg(epsg(target_epsg))
            .arg(input)
            .arg(output)
    }

    pub fn fill_nodata_call(
        input: &Path,
        band: usize,
        max_distance: u32,
        smoothing_iterations: u32,
        output: &Path,
    ) -> ToolInvocation {
        ToolInvocation::new("gdal_fillnodata", output)
            .arg("-md")
            .arg(max_distance.to_string())
            .arg("-si")
            .arg(smoothing_iterations.to_string())
            .arg("-b")
            .arg(band.to_string())
            .args(["-of", "GTiff"])
            .arg(input)
            .arg(output)
    }

    pub fn points_to_vector_call(csv: &Path, epsg_code: u32, output: &Path) -> ToolInvocation {
        ToolInvocation::new("ogr2ogr", output)
            .args(["-f", "ESRI Shapefile", "-a_srs"])
            .arg(epsg(epsg_code))
            .args([
                "-oo",
                "X_POSSIBLE_NAMES=X",
                "-oo",
                "Y_POSSIBLE_NAMES=Y",
                "-oo",
                "AUTODETECT_TYPE=YES",
            ])
            .arg(output)
            .arg(csv)
    }
}

impl GisEngine for GdalTools {
    fn extract_by_attribute(&self, input: &Path, field: &str, value: &str, output: &Path) -> Result<()> {
        Self::extract_by_attribute_call(input, field, value, output).run()
    }

    fn reproject_vector(&self, input: &Path, target_epsg: u32, output: &Path) -> Result<()> {
        Self::reproject_vector_call(input, target_epsg, output).run()
    }

    fn extract_band(&self, input: &Path, band: usize, output: &Path) -> Result<()> {
        Self::extract_band_call(input, band, output).run()
    }

    fn stack_bands(&self, inputs: &[PathBuf], output: &Path) -> Result<()> {
        if inputs.is_empty() {
            return Err(EtlError::InvalidInput(format!(
                "no bands to stack into {:?}",
                output
            )));
        }
        let scratch = tempfile::TempDir::new()?;
        let vrt = scratch.path().join("stack.vrt");
        Self::build_vrt_call(inputs, &vrt).run()?;
        Self::translate_call(&vrt, output).run()
    }

    fn clip_raster_by_mask(&self, input: &Path, mask: &Path, nodata: f64, output: &Path) -> Result<()> {
        Self::clip_raster_call(input, mask, nodata, output).run()
    }

    fn warp_raster(&self, input: &Path, target_epsg: u32, output: &Path) -> Result<()> {
        Self::warp_raster_call(input, target_epsg, output).run()
    }

    fn fill_nodata(
        &self,
        input: &Path,
        band: usize,
        max_distance: u32,
        smoothing_iterations: u32,
        output: &Path,
    ) -> Result<()> {
        Self::fill_nodata_call(input, band, max_distance, smoothing_iterations, output).run()
    }

    fn points_to_vector(&self, csv: &Path, epsg_code: u32, output: &Path) -> Result<()> {
        Self::points_to_vector_call(csv, epsg_code, output).run()
    }
}

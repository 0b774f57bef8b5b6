//! Year/month orchestration of the climate and point stages.
//!
//! Every (year, month) unit runs to completion before the next starts. A
//! failing unit is logged and counted; the loop moves on.

use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::{Path, PathBuf};
use tracing::{error, info, info_span};

use crate::boundary::Boundary;
use crate::calendar::{month_name, months};
use crate::climate::ClimateExtractor;
use crate::config::PipelineConfig;
use crate::counts::{FireCountTable, NonFireCounts};
use crate::engine::GisEngine;
use crate::error::{EtlError, Result};
use crate::export::{combine_csv, write_points_csv, write_sampled_csv};
use crate::hotspots::HotspotCache;
use crate::layout::DataLayout;
use crate::points::{merge, GdalToGeographic, PointGenerator, PointRecord, ToGeographic};
use crate::prepare::{load_boundary, prepare_boundary, prepare_fuel, prepare_hotspots};
use crate::raster::RasterSampler;
use crate::sampling::{sample_points, Cleaner, SampleSource};

/// How a (year, month) unit ended when it did not fail.
#[derive(Debug, Clone, PartialEq)]
pub enum MonthOutcome {
    Exported(PathBuf),
    Skipped(String),
}

/// Tally of a year/month loop.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    pub exported: Vec<PathBuf>,
    pub skipped: usize,
    pub failed: usize,
}

impl RunSummary {
    fn record(&mut self, result: Result<MonthOutcome>) {
        match result {
            Ok(MonthOutcome::Exported(path)) => {
                info!("Completed: {:?}", path);
                self.exported.push(path);
            }
            Ok(MonthOutcome::Skipped(reason)) => {
                info!("Skipping: {}", reason);
                self.skipped += 1;
            }
            Err(e) => {
                error!("Month failed: {}", e);
                self.failed += 1;
            }
        }
    }
}

/// Tallies of both stages of a full run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PipelineSummary {
    pub climate: RunSummary,
    pub points: RunSummary,
}

impl PipelineSummary {
    /// Failed months across both stages.
    pub fn failed(&self) -> usize {
        self.climate.failed + self.points.failed
    }
}

/// State shared by every month of the generation pass.
pub struct PointContext<'a> {
    pub boundary: &'a Boundary,
    pub counts: &'a NonFireCounts,
    pub hotspots: &'a HotspotCache,
    pub geographic: &'a dyn ToGeographic,
    pub fuel: &'a RasterSampler,
    pub generator: PointGenerator<StdRng>,
}

pub struct Pipeline<E: GisEngine> {
    config: PipelineConfig,
    layout: DataLayout,
    engine: E,
}

impl<E: GisEngine> Pipeline<E> {
    pub fn new(config: PipelineConfig, engine: E) -> Result<Self> {
        config.validate()?;
        let layout = DataLayout::new(&config);
        Ok(Self {
            config,
            layout,
            engine,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn layout(&self) -> &DataLayout {
        &self.layout
    }

    /// Builds the reprojected boundary and the clipped fuel raster.
    pub fn prepare(&self) -> Result<Boundary> {
        let _span = info_span!("prepare").entered();
        let boundary = prepare_boundary(&self.config, &self.layout, &self.engine)?;
        prepare_fuel(&self.config, &self.layout, &self.engine)?;
        Ok(boundary)
    }

    /// Extracts the filled climate stack of every month in range.
    pub fn run_climate(&self) -> RunSummary {
        let extractor = ClimateExtractor::new(&self.config, &self.layout, &self.engine);
        let mut summary = RunSummary::default();

        for year in self.config.years() {
            let _year = info_span!("climate", year).entered();
            for month in months() {
                let _month = info_span!("month", month = month_name(month).unwrap_or_default()).entered();
                let result = extractor.extract_month(year, month).map(|output| match output {
                    Some(path) => MonthOutcome::Exported(path),
                    None => MonthOutcome::Skipped("no climate bands for this month".to_string()),
                });
                summary.record(result);
            }
        }

        info!(
            exported = summary.exported.len(),
            skipped = summary.skipped,
            failed = summary.failed,
            "Climate extraction finished"
        );
        summary
    }

    fn ensure_hotspots(&self, year: i32, cache: &mut HotspotCache) -> Result<()> {
        if !cache.contains(year) {
            let layer = prepare_hotspots(&self.config, &self.layout, &self.engine, year)?;
            cache.insert(year, layer);
        }
        Ok(())
    }

    fn end_of_year(&self, year: i32, cache: &mut HotspotCache) {
        if !self.config.points.retain_hotspot_cache {
            cache.evict(year);
        }
    }

    /// Pass 1: observed fire counts for every month in range.
    ///
    /// A year whose hotspots cannot be prepared records nothing, so its
    /// months fail in pass 2 with a missing count.
    pub fn statistics_pass(&self, boundary: &Boundary, cache: &mut HotspotCache) -> FireCountTable {
        let mut table = FireCountTable::new();

        for year in self.config.years() {
            let _year = info_span!("statistics", year).entered();
            if let Err(e) = self.ensure_hotspots(year, cache) {
                error!("Failed to prepare hotspots: {}", e);
                continue;
            }
            let Ok(layer) = cache.get(year) else {
                continue;
            };

            for month in months() {
                let count = layer.monthly(year, month, boundary).len();
                if count == 0 {
                    info!(month, "No valid hotspot data");
                }
                table.record(year, month, count);
            }
            self.end_of_year(year, cache);
        }
        table
    }

    /// Resolves pass-1 counts and persists them for pass 2.
    pub fn resolve_counts(&self, table: &FireCountTable) -> Result<NonFireCounts> {
        let counts = table.resolve(self.config.points.fallback_non_fire_count);
        counts.save(&self.layout.count_table())?;
        Ok(counts)
    }

    fn new_rng(&self) -> StdRng {
        match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        }
    }

    /// Pass 2: generate, merge, sample, clean and export every month.
    pub fn generation_pass(
        &self,
        boundary: &Boundary,
        counts: &NonFireCounts,
        cache: &mut HotspotCache,
    ) -> Result<RunSummary> {
        let geographic = GdalToGeographic::new(self.config.crs.target_epsg, self.config.crs.geographic_epsg)?;
        let fuel = RasterSampler::open(&self.layout.fuel())?;
        let mut generator = PointGenerator::new(self.new_rng(), self.config.points.max_attempts);
        let mut summary = RunSummary::default();

        for year in self.config.years() {
            let _year = info_span!("generation", year).entered();
            if let Err(e) = self.ensure_hotspots(year, cache) {
                error!("Failed to prepare hotspots: {}", e);
            }

            let mut ctx = PointContext {
                boundary,
                counts,
                hotspots: cache,
                geographic: &geographic,
                fuel: &fuel,
                generator,
            };
            for month in months() {
                let _month = info_span!("month", month = month_name(month).unwrap_or_default()).entered();
                summary.record(self.process_month(&mut ctx, year, month));
            }
            generator = ctx.generator;
            self.end_of_year(year, cache);
        }

        info!(
            exported = summary.exported.len(),
            skipped = summary.skipped,
            failed = summary.failed,
            "Point generation finished"
        );
        Ok(summary)
    }

    fn write_point_set(&self, csv: &Path, shapefile: &Path, points: &[PointRecord]) -> Result<()> {
        write_points_csv(csv, points)?;
        if self.config.points.write_shapefiles {
            self.engine
                .points_to_vector(csv, self.config.crs.target_epsg, shapefile)?;
        }
        Ok(())
    }

    /// One month of pass 2.
    pub fn process_month(&self, ctx: &mut PointContext<'_>, year: i32, month: u32) -> Result<MonthOutcome> {
        let name = month_name(month)
            .ok_or_else(|| EtlError::InvalidInput(format!("month {} out of range", month)))?;

        let climate = self.layout.filled_climate(year, name);
        if !climate.exists() {
            return Ok(MonthOutcome::Skipped(format!(
                "climate raster for {} {} not generated: {:?}",
                name, year, climate
            )));
        }

        let layer = ctx.hotspots.get(year)?;
        let fire = layer
            .monthly(year, month, ctx.boundary)
            .into_iter()
            .map(|hotspot| hotspot.harmonize(ctx.geographic))
            .collect::<Result<Vec<_>>>()?;
        if fire.is_empty() {
            info!("No fire points found for {} {}, proceeding with non-fire data only", name, year);
        }

        let non_fire_count = ctx.counts.non_fire_count(year, month)?;
        let generated = ctx
            .generator
            .generate(ctx.boundary, non_fire_count, ctx.geographic, name, year)?;
        self.write_point_set(
            &self.layout.random_points(year, name, "csv"),
            &self.layout.random_points(year, name, "shp"),
            &generated.points,
        )?;

        let merged = merge(fire, generated.points);
        self.write_point_set(
            &self.layout.merged_points(year, name, "csv"),
            &self.layout.merged_points(year, name, "shp"),
            &merged,
        )?;

        let climate_sampler = RasterSampler::open(&climate)?;
        let sources = [
            SampleSource::new(&climate_sampler, &self.config.climate.band_names),
            SampleSource::new(ctx.fuel, std::slice::from_ref(&self.config.fuel.field_name)),
        ];
        let field_names: Vec<String> = sources
            .iter()
            .flat_map(|source| source.band_names.iter().cloned())
            .collect();
        let sampled = sample_points(merged, &sources)?;

        let mut checked = self.config.climate.band_names.clone();
        checked.push(self.config.fuel.field_name.clone());
        let cleaned = Cleaner::new(checked).clean(sampled);

        let output = self.layout.cleaned_csv(year, name);
        write_sampled_csv(&output, &field_names, &cleaned)?;
        Ok(MonthOutcome::Exported(output))
    }

    /// Both point passes with the persisted count table between them, then
    /// the combined CSV.
    pub fn run_points(&self) -> Result<RunSummary> {
        let boundary = load_boundary(&self.layout)?;
        let mut cache = HotspotCache::new();

        let table = self.statistics_pass(&boundary, &mut cache);
        self.resolve_counts(&table)?;

        let counts = NonFireCounts::load(&self.layout.count_table())?;
        let summary = self.generation_pass(&boundary, &counts, &mut cache)?;

        combine_csv(&summary.exported, &self.layout.combined_csv())?;
        Ok(summary)
    }

    /// Preparation, climate extraction, then the point stage.
    pub fn run_all(&self) -> Result<PipelineSummary> {
        self.prepare()?;
        let climate = self.run_climate();
        let points = self.run_points()?;
        Ok(PipelineSummary { climate, points })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hotspots::{HotspotLayer, RawHotspot};
    use crate::points::tests::Identity;
    use crate::points::{FIRE, NO_FIRE};
    use crate::prepare::tests::RecordingEngine;
    use crate::raster::tests::{gtiff_available, write_test_raster};
    use geo::polygon;
    use std::fs;
    use tempfile::TempDir;

    fn setup() -> (TempDir, Pipeline<RecordingEngine>) {
        let dir = TempDir::new().unwrap();
        let mut config = PipelineConfig {
            base_dir: dir.path().to_path_buf(),
            start_year: 2010,
            end_year: 2010,
            seed: Some(7),
            ..PipelineConfig::default()
        };
        config.points.write_shapefiles = false;
        let pipeline = Pipeline::new(config, RecordingEngine::default()).unwrap();
        (dir, pipeline)
    }

    fn square() -> Boundary {
        Boundary::from_polygons(vec![polygon![
            (x: 0.0, y: 0.0),
            (x: 10.0, y: 0.0),
            (x: 10.0, y: 10.0),
            (x: 0.0, y: 10.0),
        ]])
        .unwrap()
    }

    fn january_hotspots() -> HotspotLayer {
        HotspotLayer::new(vec![
            RawHotspot {
                x: 5.5,
                y: 5.5,
                report_date: Some("2010/01/20 10:00:00.000".to_string()),
                latitude: Some(55.0),
                longitude: Some(-125.0),
            },
            // outside the boundary
            RawHotspot {
                x: 50.0,
                y: 50.0,
                report_date: Some("2010/01/21 10:00:00.000".to_string()),
                latitude: Some(60.0),
                longitude: Some(-120.0),
            },
        ])
    }

    fn write_inputs(pipeline: &Pipeline<RecordingEngine>) {
        let layout = pipeline.layout();
        let gt = [0.0, 1.0, 0.0, 10.0, 0.0, -1.0];

        let climate = layout.filled_climate(2010, "January");
        fs::create_dir_all(climate.parent().unwrap()).unwrap();
        let bands: Vec<(Vec<f64>, Vec<(&str, &str)>)> =
            (0..6).map(|b| (vec![b as f64; 100], vec![])).collect();
        write_test_raster(&climate, (10, 10), gt, &bands, Some(-9999.0));

        let fuel = layout.fuel();
        fs::create_dir_all(fuel.parent().unwrap()).unwrap();
        write_test_raster(&fuel, (10, 10), gt, &[(vec![2.0; 100], vec![])], Some(-9999.0));
    }

    #[test]
    fn test_summary_keeps_climate_failures() {
        let mut summary = PipelineSummary::default();
        summary.climate.record(Err(EtlError::InvalidInput("broken archive".to_string())));
        summary.climate.record(Ok(MonthOutcome::Skipped("no data".to_string())));
        summary.points.record(Ok(MonthOutcome::Exported(PathBuf::from("a.csv"))));

        assert_eq!(summary.climate.failed, 1);
        assert_eq!(summary.climate.skipped, 1);
        assert_eq!(summary.points.exported.len(), 1);
        assert_eq!(summary.failed(), 1);
    }

    #[test]
    fn test_run_all_stops_when_preparation_fails() {
        let dir = TempDir::new().unwrap();
        let config = PipelineConfig {
            base_dir: dir.path().to_path_buf(),
            start_year: 2010,
            end_year: 2010,
            ..PipelineConfig::default()
        };
        let engine = RecordingEngine {
            fail_on: Some("extract_by_attribute"),
            ..RecordingEngine::default()
        };
        let pipeline = Pipeline::new(config, engine).unwrap();

        assert!(matches!(pipeline.run_all(), Err(EtlError::ToolFailed { .. })));
        assert_eq!(*pipeline.engine.calls.borrow(), vec!["extract_by_attribute"]);
    }

    #[test]
    fn test_statistics_pass_records_every_month_and_evicts() {
        let (_dir, pipeline) = setup();
        let mut cache = HotspotCache::new();

        let table = pipeline.statistics_pass(&square(), &mut cache);
        for month in months() {
            assert_eq!(table.fire_count(2010, month), Some(0));
        }
        assert!(!cache.contains(2010));

        let counts = pipeline.resolve_counts(&table).unwrap();
        assert_eq!(counts.non_fire_count(2010, 6).unwrap(), 400);
        assert!(pipeline.layout().count_table().exists());
    }

    #[test]
    fn test_missing_climate_skips_month() {
        if !gtiff_available() {
            eprintln!("Skipping test: GTiff driver not available");
            return;
        }
        let (_dir, pipeline) = setup();
        write_inputs(&pipeline);
        let boundary = square();
        let counts = NonFireCounts::default();
        let cache = HotspotCache::new();
        let fuel = RasterSampler::open(&pipeline.layout().fuel()).unwrap();
        let mut ctx = PointContext {
            boundary: &boundary,
            counts: &counts,
            hotspots: &cache,
            geographic: &Identity,
            fuel: &fuel,
            generator: PointGenerator::new(StdRng::seed_from_u64(7), 10_000),
        };

        let outcome = pipeline.process_month(&mut ctx, 2010, 2).unwrap();
        assert!(matches!(outcome, MonthOutcome::Skipped(_)));
    }

    #[test]
    fn test_unprepared_hotspots_fail_the_month() {
        if !gtiff_available() {
            eprintln!("Skipping test: GTiff driver not available");
            return;
        }
        let (_dir, pipeline) = setup();
        write_inputs(&pipeline);
        let boundary = square();
        let counts = NonFireCounts::default();
        let cache = HotspotCache::new();
        let fuel = RasterSampler::open(&pipeline.layout().fuel()).unwrap();
        let mut ctx = PointContext {
            boundary: &boundary,
            counts: &counts,
            hotspots: &cache,
            geographic: &Identity,
            fuel: &fuel,
            generator: PointGenerator::new(StdRng::seed_from_u64(7), 10_000),
        };

        assert!(matches!(
            pipeline.process_month(&mut ctx, 2010, 1),
            Err(EtlError::HotspotsNotPrepared { year: 2010 })
        ));
    }

    #[test]
    fn test_month_exports_fire_then_non_fire_rows() {
        if !gtiff_available() {
            eprintln!("Skipping test: GTiff driver not available");
            return;
        }
        let (_dir, pipeline) = setup();
        write_inputs(&pipeline);
        let boundary = square();

        let mut cache = HotspotCache::new();
        cache.insert(2010, january_hotspots());
        let mut table = FireCountTable::new();
        table.record(2010, 1, 1);
        let counts = table.resolve(400);
        let fuel = RasterSampler::open(&pipeline.layout().fuel()).unwrap();
        let mut ctx = PointContext {
            boundary: &boundary,
            counts: &counts,
            hotspots: &cache,
            geographic: &Identity,
            fuel: &fuel,
            generator: PointGenerator::new(StdRng::seed_from_u64(7), 10_000),
        };

        let outcome = pipeline.process_month(&mut ctx, 2010, 1).unwrap();
        let output = pipeline.layout().cleaned_csv(2010, "January");
        assert_eq!(outcome, MonthOutcome::Exported(output.clone()));
        assert!(pipeline.layout().random_points(2010, "January", "csv").exists());
        assert!(pipeline.layout().merged_points(2010, "January", "csv").exists());
        assert!(pipeline.engine.calls.borrow().is_empty());

        let mut reader = csv::Reader::from_path(&output).unwrap();
        let header: Vec<String> = reader.headers().unwrap().iter().map(String::from).collect();
        assert_eq!(
            header,
            vec![
                "X", "Y", "Latitude", "Longitude", "Month", "Year", "Fire", "u10_wind", "v10_wind",
                "dew_temp_2m", "temp_2m", "tot_precip", "lai_high", "Fuel_Type"
            ]
        );

        let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(&rows[0][2], "55");
        assert_eq!(&rows[0][4], "January");
        assert_eq!(rows[0][6].parse::<u8>().unwrap(), FIRE);
        assert_eq!(rows[1][6].parse::<u8>().unwrap(), NO_FIRE);
        assert_eq!(&rows[1][9], "2");
        assert_eq!(&rows[1][13], "2");
    }
}

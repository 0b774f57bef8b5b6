use gdal::raster::Buffer;
use gdal::spatial_ref::SpatialRef;
use gdal::{DriverManager, Metadata};
use geo::polygon;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::Path;
use tempfile::TempDir;

use wildfire_etl::bands::{COMMENT_KEY, VALID_TIME_KEY};
use wildfire_etl::points::{ToGeographic, NO_FIRE};
use wildfire_etl::raster::open_band_info;
use wildfire_etl::{ArchiveSpan, BandSelector, Boundary, DataLayout, PipelineConfig, PointGenerator};

struct LonLat;

impl ToGeographic for LonLat {
    fn to_lat_lon(&self, x: f64, y: f64) -> wildfire_etl::Result<(f64, f64)> {
        Ok((y, x))
    }
}

fn write_archive(path: &Path, bands: &[(&str, &str)]) {
    let driver = DriverManager::get_driver_by_name("GTiff").unwrap();
    let mut dataset = driver
        .create_with_band_type::<f64, _>(path, 4, 4, bands.len())
        .unwrap();
    dataset
        .set_geo_transform(&[-123.0, 0.25, 0.0, 50.0, 0.0, -0.25])
        .unwrap();
    let wkt = SpatialRef::from_epsg(4326).unwrap().to_wkt().unwrap();
    dataset.set_projection(&wkt).unwrap();

    for (i, (valid_time, comment)) in bands.iter().enumerate() {
        let mut band = dataset.rasterband(i + 1).unwrap();
        let mut buffer = Buffer::new((4, 4), vec![i as f64; 16]);
        band.write((0, 0), (4, 4), &mut buffer).unwrap();
        band.set_metadata_item(VALID_TIME_KEY, valid_time, "").unwrap();
        band.set_metadata_item(COMMENT_KEY, comment, "").unwrap();
    }
}

#[test]
fn test_january_archive_and_points_in_one_degree_box() {
    if DriverManager::get_driver_by_name("GTiff").is_err() {
        eprintln!("Skipping test: GTiff driver not available");
        return;
    }

    let dir = TempDir::new().unwrap();
    let config = PipelineConfig {
        base_dir: dir.path().to_path_buf(),
        start_year: 2010,
        end_year: 2010,
        ..PipelineConfig::default()
    };
    let layout = DataLayout::new(&config);
    let archive = layout.climate_archive(2010);
    assert_eq!(ArchiveSpan::for_year(2010).label(), "2010-2011");
    std::fs::create_dir_all(archive.parent().unwrap()).unwrap();

    // 2010-01-01 12:00 and 2010-01-31 00:00 UTC
    write_archive(
        &archive,
        &[
            ("1262347200 sec UTC", "2 metre temperature [C]"),
            ("1264896000 sec UTC", "10 metre U wind component [m/s]"),
        ],
    );

    let bands = open_band_info(&archive).unwrap();
    let selector = BandSelector::new(config.climate.cumulative_keywords.iter().cloned());
    assert_eq!(selector.select(&bands, 2010, 1), vec![1, 2]);
    assert!(selector.select(&bands, 2010, 2).is_empty());

    let boundary = Boundary::from_polygons(vec![polygon![
        (x: -123.0, y: 49.0),
        (x: -122.0, y: 49.0),
        (x: -122.0, y: 50.0),
        (x: -123.0, y: 50.0),
    ]])
    .unwrap();

    let mut generator = PointGenerator::new(StdRng::seed_from_u64(2010), config.points.max_attempts);
    let generated = generator
        .generate(&boundary, 3, &LonLat, "January", 2010)
        .unwrap();

    assert!(!generated.is_partial());
    assert_eq!(generated.points.len(), 3);
    for point in &generated.points {
        assert!(boundary.contains(point.x, point.y));
        assert!(point.x > -123.0 && point.x < -122.0);
        assert!(point.y > 49.0 && point.y < 50.0);
        assert_eq!(point.fire, NO_FIRE);
        assert_eq!(point.month, "January");
    }
}

#[test]
fn test_odd_and_even_years_share_an_archive() {
    let config = PipelineConfig::default();
    let layout = DataLayout::new(&config);
    assert_eq!(layout.climate_archive(2013), layout.climate_archive(2012));
    assert_eq!(ArchiveSpan::for_year(2013).label(), "2012-2013");
    assert_eq!(ArchiveSpan::for_year(2012).label(), "2012-2013");
}

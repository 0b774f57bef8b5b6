//! Clip mask and containment surface for the whole run.

use gdal::vector::LayerAccess;
use gdal::Dataset;
use geo::{BoundingRect, Contains, Geometry, Intersects, Point, Polygon, Rect};
use rstar::primitives::{GeomWithData, Rectangle};
use rstar::RTree;
use std::path::Path;
use tracing::info;

use crate::error::{EtlError, Result};

type IndexedPart = GeomWithData<Rectangle<[f64; 2]>, usize>;

/// Polygon parts of a region, indexed by bounding box.
///
/// Coordinates are in whatever CRS the source layer was in; the pipeline
/// always loads the reprojected boundary, so this is the target CRS.
#[derive(Debug)]
pub struct Boundary {
    parts: Vec<Polygon<f64>>,
    index: RTree<IndexedPart>,
    extent: Rect<f64>,
}

impl Boundary {
    /// Returns `None` when no part has a bounding box (empty input).
    pub fn from_polygons(parts: Vec<Polygon<f64>>) -> Option<Self> {
        let mut entries = Vec::with_capacity(parts.len());
        let mut extent: Option<Rect<f64>> = None;

        for (i, part) in parts.iter().enumerate() {
            let Some(rect) = part.bounding_rect() else {
                continue;
            };
            entries.push(GeomWithData::new(
                Rectangle::from_corners(
                    [rect.min().x, rect.min().y],
                    [rect.max().x, rect.max().y],
                ),
                i,
            ));
            extent = Some(match extent {
                None => rect,
                Some(e) => Rect::new(
                    (e.min().x.min(rect.min().x), e.min().y.min(rect.min().y)),
                    (e.max().x.max(rect.max().x), e.max().y.max(rect.max().y)),
                ),
            });
        }

        Some(Self {
            parts,
            index: RTree::bulk_load(entries),
            extent: extent?,
        })
    }

    /// Collects polygon parts from arbitrary geometries, ignoring non-areal ones.
    pub fn from_geometries<I>(geometries: I) -> Option<Self>
    where
        I: IntoIterator<Item = Geometry<f64>>,
    {
        let mut parts = Vec::new();
        for geometry in geometries {
            collect_polygons(geometry, &mut parts);
        }
        Self::from_polygons(parts)
    }

    /// Loads every polygon of the first layer of a vector file.
    pub fn open(path: &Path) -> Result<Self> {
        let dataset = Dataset::open(path)?;
        let mut layer = dataset.layer(0)?;

        let mut geometries = Vec::new();
        for feature in layer.features() {
            if let Some(geometry) = feature.geometry() {
                geometries.push(geometry.to_geo()?);
            }
        }

        let boundary =
            Self::from_geometries(geometries).ok_or_else(|| EtlError::EmptyBoundary(path.to_path_buf()))?;
        info!(
            "Loaded boundary {:?}: {} polygon parts, extent {:?}",
            path,
            boundary.parts.len(),
            boundary.extent
        );
        Ok(boundary)
    }

    pub fn extent(&self) -> Rect<f64> {
        self.extent
    }

    pub fn part_count(&self) -> usize {
        self.parts.len()
    }

    /// True when `(x, y)` lies in the interior of some part. Points on an
    /// edge are outside.
    pub fn contains(&self, x: f64, y: f64) -> bool {
        let point = Point::new(x, y);
        self.index
            .locate_all_at_point(&[x, y])
            .any(|candidate| self.parts[candidate.data].contains(&point))
    }

    /// Like [`Boundary::contains`], but points on an edge are inside.
    pub fn covers(&self, x: f64, y: f64) -> bool {
        let point = Point::new(x, y);
        self.index
            .locate_all_at_point(&[x, y])
            .any(|candidate| self.parts[candidate.data].intersects(&point))
    }
}

fn collect_polygons(geometry: Geometry<f64>, parts: &mut Vec<Polygon<f64>>) {
    match geometry {
        Geometry::Polygon(polygon) => parts.push(polygon),
        Geometry::MultiPolygon(multi) => parts.extend(multi.0),
        Geometry::Rect(rect) => parts.push(rect.to_polygon()),
        Geometry::Triangle(triangle) => parts.push(triangle.to_polygon()),
        Geometry::GeometryCollection(collection) => {
            for inner in collection.0 {
                collect_polygons(inner, parts);
            }
        }
        _ => {}
    }
}

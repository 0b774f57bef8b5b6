pub mod bands;
pub mod boundary;
pub mod calendar;
pub mod climate;
pub mod config;
pub mod counts;
pub mod engine;
pub mod error;
pub mod export;
pub mod hotspots;
pub mod layout;
pub mod pipeline;
pub mod points;
pub mod prepare;
pub mod raster;
pub mod sampling;

pub use bands::{ArchiveSpan, BandInfo, BandSelector};
pub use boundary::Boundary;
pub use config::PipelineConfig;
pub use engine::{GdalTools, GisEngine};
pub use error::{EtlError, Result};
pub use layout::DataLayout;
pub use pipeline::{MonthOutcome, Pipeline, PipelineSummary, RunSummary};
pub use points::{GeneratedPoints, PointGenerator, PointRecord};

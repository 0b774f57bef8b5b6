use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, EtlError>;

#[derive(Debug, Error)]
pub enum EtlError {
    #[error("GDAL error: {0}")]
    Gdal(#[from] gdal::errors::GdalError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("invalid config: {0}")]
    Config(#[from] toml::de::Error),

    #[error("{tool} failed ({status}): {stderr}")]
    ToolFailed {
        tool: String,
        status: String,
        stderr: String,
    },

    #[error("{tool} reported success but {path:?} was not written")]
    ToolOutputMissing { tool: String, path: PathBuf },

    #[error("boundary {0:?} contains no polygon features")]
    EmptyBoundary(PathBuf),

    #[error("hotspot layer for {year} has not been prepared")]
    HotspotsNotPrepared { year: i32 },

    #[error("no resolved non-fire count for {month} {year}")]
    MissingCount { year: i32, month: String },

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

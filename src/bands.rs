//! Selecting the bands of a multi-year GRIB archive that belong to one month.
//!
//! Archives cover two calendar years starting on an even year, so a target
//! year is routed to `(year, year + 1)` when even and `(year - 1, year)` when
//! odd. Accumulated quantities (total precipitation and similar) are stamped
//! with the end of their accumulation window, which falls on the first day of
//! the following period; their timestamps are shifted forward one day before
//! comparison.

use chrono::{DateTime, Datelike, Duration, Utc};
use tracing::{debug, info, warn};

/// Band metadata key holding the valid time in epoch seconds.
pub const VALID_TIME_KEY: &str = "GRIB_VALID_TIME";
/// Band metadata key holding the free-text variable description.
pub const COMMENT_KEY: &str = "GRIB_COMMENT";

/// Timestamp metadata of one band, 1-based like GDAL band indices.
#[derive(Debug, Clone, PartialEq)]
pub struct BandInfo {
    pub index: usize,
    pub valid_time: Option<DateTime<Utc>>,
    pub comment: String,
}

/// The two-year span an archive file is keyed by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchiveSpan {
    pub first: i32,
    pub second: i32,
}

impl ArchiveSpan {
    pub fn for_year(year: i32) -> Self {
        if year.rem_euclid(2) == 0 {
            Self {
                first: year,
                second: year + 1,
            }
        } else {
            Self {
                first: year - 1,
                second: year,
            }
        }
    }

    /// `"2010-2011"`, the archive file stem and the working-file infix.
    pub fn label(&self) -> String {
        format!("{}-{}", self.first, self.second)
    }
}

/// Parses a `GRIB_VALID_TIME` value.
///
/// GDAL writes plain epoch seconds (`"1262304000"`); older releases append a
/// unit (`"  1262304000 sec UTC"`). Only the leading integer is used.
pub fn parse_valid_time(raw: &str) -> Option<DateTime<Utc>> {
    let seconds: i64 = raw.split_whitespace().next()?.parse().ok()?;
    DateTime::from_timestamp(seconds, 0)
}

#[derive(Debug, Clone)]
pub struct BandSelector {
    cumulative_keywords: Vec<String>,
}

impl Default for BandSelector {
    fn default() -> Self {
        Self::new(["[m]", "precipitation", "total"].iter().map(|s| s.to_string()))
    }
}

impl BandSelector {
    pub fn new<I>(keywords: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        Self {
            cumulative_keywords: keywords.into_iter().map(|k| k.to_lowercase()).collect(),
        }
    }

    pub fn is_cumulative(&self, comment: &str) -> bool {
        let comment = comment.to_lowercase();
        self.cumulative_keywords
            .iter()
            .any(|keyword| comment.contains(keyword.as_str()))
    }

    /// Valid time with the one-day shift applied to accumulated quantities.
    pub fn adjusted_time(&self, band: &BandInfo) -> Option<DateTime<Utc>> {
        let valid = band.valid_time?;
        if self.is_cumulative(&band.comment) {
            Some(valid + Duration::days(1))
        } else {
            Some(valid)
        }
    }

    /// Returns the indices, in archive order, of bands whose adjusted time
    /// falls in `year`/`month`. An empty result means the month has no data.
    pub fn select(&self, bands: &[BandInfo], year: i32, month: u32) -> Vec<usize> {
        let mut selected = Vec::new();

        for band in bands {
            let Some(adjusted) = self.adjusted_time(band) else {
                warn!(band = band.index, "band has no {}", VALID_TIME_KEY);
                continue;
            };

            if adjusted.year() == year && adjusted.month() == month {
                debug!(
                    band = band.index,
                    "selected {} (adjusted from {})",
                    adjusted.format("%Y-%m-%d"),
                    band.valid_time.map(|t| t.format("%Y-%m-%d").to_string()).unwrap_or_default()
                );
                selected.push(band.index);
            } else {
                debug!(band = band.index, "skipped {}", adjusted.format("%Y-%m-%d"));
            }
        }

        if selected.is_empty() {
            info!(year, month, "no bands matched");
        } else {
            info!(year, month, bands = ?selected, "bands selected");
        }
        selected
    }
}

//! Two-pass class balancing of fire and non-fire points.
//!
//! Pass 1 records the observed fire count of every (year, month). Only once a
//! whole year has been scanned can a zero-fire month be given a non-fire
//! count: the mean of that year's fire-bearing months, or a fixed fallback
//! when the year has none. The resolved table is persisted between the
//! passes.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::path::Path;
use tracing::info;

use crate::calendar::month_name;
use crate::error::{EtlError, Result};

/// Pass-1 output: observed fire counts, zero meaning "resolve later".
#[derive(Debug, Clone, Default)]
pub struct FireCountTable {
    observed: BTreeMap<(i32, u32), usize>,
}

impl FireCountTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, year: i32, month: u32, fire_count: usize) {
        self.observed.insert((year, month), fire_count);
    }

    pub fn fire_count(&self, year: i32, month: u32) -> Option<usize> {
        self.observed.get(&(year, month)).copied()
    }

    /// Rounded mean of the year's non-zero months, half to even.
    pub fn yearly_average(&self, year: i32) -> Option<usize> {
        let counts: Vec<usize> = self
            .observed
            .range((year, 0)..=(year, u32::MAX))
            .map(|(_, &count)| count)
            .filter(|&count| count > 0)
            .collect();
        if counts.is_empty() {
            return None;
        }
        let mean = counts.iter().sum::<usize>() as f64 / counts.len() as f64;
        Some(mean.round_ties_even() as usize)
    }

    /// Resolves every recorded month to a non-fire count.
    pub fn resolve(&self, fallback: usize) -> NonFireCounts {
        let mut averages: BTreeMap<i32, usize> = BTreeMap::new();
        let mut rows = BTreeMap::new();

        for (&(year, month), &fire_count) in &self.observed {
            let non_fire_count = if fire_count > 0 {
                fire_count
            } else {
                *averages
                    .entry(year)
                    .or_insert_with(|| self.yearly_average(year).unwrap_or(fallback))
            };
            rows.insert(
                (year, month),
                CountRow {
                    year,
                    month,
                    fire_count,
                    non_fire_count,
                },
            );
        }

        NonFireCounts { rows }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountRow {
    pub year: i32,
    pub month: u32,
    pub fire_count: usize,
    pub non_fire_count: usize,
}

/// Pass-2 input: how many non-fire points each month gets.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NonFireCounts {
    rows: BTreeMap<(i32, u32), CountRow>,
}

impl NonFireCounts {
    pub fn non_fire_count(&self, year: i32, month: u32) -> Result<usize> {
        self.rows
            .get(&(year, month))
            .map(|row| row.non_fire_count)
            .ok_or_else(|| EtlError::MissingCount {
                year,
                month: month_name(month).unwrap_or("?").to_string(),
            })
    }

    pub fn rows(&self) -> impl Iterator<Item = &CountRow> {
        self.rows.values()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut writer = csv::Writer::from_writer(File::create(path)?);
        for row in self.rows.values() {
            writer.serialize(row)?;
        }
        writer.flush()?;
        info!("Saved {} month counts to {:?}", self.rows.len(), path);
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let mut reader = csv::Reader::from_reader(File::open(path)?);
        let mut rows = BTreeMap::new();
        for row in reader.deserialize() {
            let row: CountRow = row?;
            rows.insert((row.year, row.month), row);
        }
        Ok(Self { rows })
    }
}

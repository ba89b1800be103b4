//! Month-by-month timeline of a persisted inventory.
//!
//! Re-reads an inventory CSV and groups file rows by the calendar month of
//! one timestamp column. Columns are located by header name, so inventories
//! written with or without `change_time` are both accepted.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use chrono::{DateTime, Months, Utc};
use derive_builder::Builder;
use fsinventory_core::EntryKind;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::AnalyzeError;

/// Timestamp column a timeline is built from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeField {
    /// `modification_time`.
    #[default]
    Modified,
    /// `access_time`.
    Accessed,
}

impl TimeField {
    /// CSV column holding this field.
    pub fn column(&self) -> &'static str {
        match self {
            Self::Modified => "modification_time",
            Self::Accessed => "access_time",
        }
    }
}

/// Configuration for timeline analysis.
#[derive(Debug, Clone, Builder)]
#[builder(setter(into))]
pub struct TimelineConfig {
    /// Timestamp to bucket by.
    #[builder(default)]
    pub field: TimeField,

    /// Drop files older than this many years before `reference_time`.
    #[builder(default)]
    pub since_years: Option<u32>,

    /// Largest files kept per month.
    #[builder(default = "10")]
    pub samples_per_bucket: usize,

    /// Reference time for `since_years` (default: now).
    #[builder(default = "Utc::now()")]
    pub reference_time: DateTime<Utc>,
}

impl Default for TimelineConfig {
    fn default() -> Self {
        Self {
            field: TimeField::default(),
            since_years: None,
            samples_per_bucket: 10,
            reference_time: Utc::now(),
        }
    }
}

impl TimelineConfig {
    /// Create a new config builder.
    pub fn builder() -> TimelineConfigBuilder {
        TimelineConfigBuilder::default()
    }

    /// Earliest timestamp kept, if a window is set.
    pub fn cutoff(&self) -> Option<DateTime<Utc>> {
        let years = self.since_years?;
        self.reference_time
            .checked_sub_months(Months::new(years.saturating_mul(12)))
    }
}

/// A file kept as an example of its month.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleFile {
    pub path: String,
    pub size: u64,
}

/// Files whose timestamp falls in one calendar month.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonthBucket {
    /// `YYYY-MM`, UTC.
    pub month: String,
    pub file_count: u64,
    pub total_size: u64,
    /// Largest files in the month, biggest first.
    pub samples: Vec<SampleFile>,
}

/// Results from timeline analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelineReport {
    /// Field the buckets were built from.
    pub field: TimeField,
    /// Earliest timestamp kept.
    pub since: Option<DateTime<Utc>>,
    /// Buckets in chronological order.
    pub buckets: Vec<MonthBucket>,
    /// Files placed in a bucket.
    pub total_files: u64,
    /// Bytes placed in a bucket.
    pub total_size: u64,
    /// Files with an empty or unparseable timestamp.
    pub undated_files: u64,
    /// Files older than the window.
    pub outside_window: u64,
    /// Directory rows passed over.
    pub directories_ignored: u64,
}

impl TimelineReport {
    /// Month with the most files.
    pub fn busiest_month(&self) -> Option<&MonthBucket> {
        self.buckets.iter().max_by_key(|b| b.file_count)
    }
}

/// Builds timelines from inventory CSVs.
#[derive(Debug, Default)]
pub struct TimelineAnalyzer {
    config: TimelineConfig,
}

impl TimelineAnalyzer {
    /// Create an analyzer with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an analyzer with custom settings.
    pub fn with_config(config: TimelineConfig) -> Self {
        Self { config }
    }

    /// Analyze the inventory at `path`.
    pub fn analyze_path(&self, path: &Path) -> Result<TimelineReport, AnalyzeError> {
        let file = File::open(path).map_err(|source| AnalyzeError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        self.analyze_reader(file)
    }

    /// Analyze an inventory from any reader. Rows are streamed, not collected.
    pub fn analyze_reader<R: Read>(&self, reader: R) -> Result<TimelineReport, AnalyzeError> {
        let mut reader = csv::Reader::from_reader(reader);
        let headers = reader.headers()?.clone();
        let column = |name: &'static str| {
            headers
                .iter()
                .position(|h| h == name)
                .ok_or(AnalyzeError::MissingColumn { column: name })
        };
        let path_col = column("absolute_path")?;
        let size_col = column("size_bytes")?;
        let kind_col = column("kind")?;
        let time_col = column(self.config.field.column())?;

        let cutoff = self.config.cutoff();
        let mut months: BTreeMap<String, BucketCollector> = BTreeMap::new();
        let mut report = TimelineReport {
            field: self.config.field,
            since: cutoff,
            buckets: Vec::new(),
            total_files: 0,
            total_size: 0,
            undated_files: 0,
            outside_window: 0,
            directories_ignored: 0,
        };

        let mut row = csv::StringRecord::new();
        while reader.read_record(&mut row)? {
            if row.get(kind_col) != Some(EntryKind::File.as_str()) {
                report.directories_ignored += 1;
                continue;
            }

            let Some(time) = row.get(time_col).and_then(parse_time) else {
                report.undated_files += 1;
                continue;
            };
            if cutoff.is_some_and(|c| time < c) {
                report.outside_window += 1;
                continue;
            }

            let size = row
                .get(size_col)
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(0);
            let path = row.get(path_col).unwrap_or_default();

            months
                .entry(time.format("%Y-%m").to_string())
                .or_insert_with(|| BucketCollector::new(self.config.samples_per_bucket))
                .add_file(path, size);
            report.total_files += 1;
            report.total_size += size;
        }

        report.buckets = months
            .into_iter()
            .map(|(month, collector)| collector.into_bucket(month))
            .collect();
        debug!(
            months = report.buckets.len(),
            files = report.total_files,
            "Timeline built"
        );
        Ok(report)
    }
}

fn parse_time(text: &str) -> Option<DateTime<Utc>> {
    if text.is_empty() {
        return None;
    }
    DateTime::parse_from_rfc3339(text)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

/// Per-month counters plus the largest files seen.
struct BucketCollector {
    file_count: u64,
    total_size: u64,
    samples: Vec<SampleFile>,
    max_samples: usize,
}

impl BucketCollector {
    fn new(max_samples: usize) -> Self {
        Self {
            file_count: 0,
            total_size: 0,
            samples: Vec::new(),
            max_samples,
        }
    }

    fn add_file(&mut self, path: &str, size: u64) {
        self.file_count += 1;
        self.total_size += size;

        if self.max_samples == 0 {
            return;
        }
        let smallest = self.samples.last().map(|s| s.size);
        if self.samples.len() < self.max_samples || smallest.is_some_and(|s| size > s) {
            if self.samples.len() == self.max_samples {
                self.samples.pop();
            }
            let at = self.samples.partition_point(|s| s.size >= size);
            self.samples.insert(
                at,
                SampleFile {
                    path: path.to_string(),
                    size,
                },
            );
        }
    }

    fn into_bucket(self, month: String) -> MonthBucket {
        MonthBucket {
            month,
            file_count: self.file_count,
            total_size: self.total_size,
            samples: self.samples,
        }
    }
}

//! CSV column layout.

use std::io::Write;

use chrono::{DateTime, SecondsFormat, Utc};
use fsinventory_core::{EntryRecord, InventoryConfig};

/// Column set for one run. `change_time` is optional; every other column is
/// always present, in this order:
/// `name, absolute_path, access_time, modification_time, [change_time], size_bytes, kind`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnLayout {
    change_time: bool,
}

impl ColumnLayout {
    /// Create a layout.
    pub fn new(change_time: bool) -> Self {
        Self { change_time }
    }

    /// Layout implied by a run configuration.
    pub fn from_config(config: &InventoryConfig) -> Self {
        Self::new(config.track_change_time)
    }

    /// Whether the `change_time` column is present.
    pub fn has_change_time(&self) -> bool {
        self.change_time
    }

    /// Header row.
    pub fn header(&self) -> Vec<&'static str> {
        let mut columns = vec!["name", "absolute_path", "access_time", "modification_time"];
        if self.change_time {
            columns.push("change_time");
        }
        columns.extend(["size_bytes", "kind"]);
        columns
    }

    /// Write the header row.
    pub fn write_header<W: Write>(&self, writer: &mut csv::Writer<W>) -> csv::Result<()> {
        writer.write_record(self.header())
    }

    /// Write one record as a row.
    pub fn write_row<W: Write>(
        &self,
        writer: &mut csv::Writer<W>,
        record: &EntryRecord,
    ) -> csv::Result<()> {
        let timestamps = &record.timestamps;
        let mut row: Vec<String> = Vec::with_capacity(7);
        row.push(record.name.to_string());
        row.push(record.absolute_path.clone());
        row.push(format_time(timestamps.accessed));
        row.push(format_time(timestamps.modified));
        if self.change_time {
            row.push(format_time(timestamps.changed));
        }
        row.push(record.size_bytes.to_string());
        row.push(record.kind.as_str().to_string());
        writer.write_record(&row)
    }
}

/// RFC 3339 in UTC; empty when the timestamp is unavailable.
fn format_time(time: Option<DateTime<Utc>>) -> String {
    time.map(|t| t.to_rfc3339_opts(SecondsFormat::AutoSi, true))
        .unwrap_or_default()
}

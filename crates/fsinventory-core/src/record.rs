//! Inventory record types.

use std::fs::Metadata;
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use compact_str::CompactString;
use serde::{Deserialize, Serialize};

/// Type of inventoried filesystem object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    /// Regular file.
    File,
    /// Directory.
    Directory,
}

impl EntryKind {
    /// Column value used in the CSV output.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryKind::File => "file",
            EntryKind::Directory => "directory",
        }
    }

    /// Check if this is a regular file.
    pub fn is_file(&self) -> bool {
        matches!(self, EntryKind::File)
    }

    /// Check if this is a directory.
    pub fn is_dir(&self) -> bool {
        matches!(self, EntryKind::Directory)
    }
}

/// File metadata timestamps, all in UTC.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timestamps {
    /// Last access time.
    pub accessed: Option<DateTime<Utc>>,
    /// Last modification time.
    pub modified: Option<DateTime<Utc>>,
    /// Last inode change time (Unix only).
    pub changed: Option<DateTime<Utc>>,
}

impl Timestamps {
    /// Create timestamps from explicit values.
    pub fn new(
        accessed: Option<DateTime<Utc>>,
        modified: Option<DateTime<Utc>>,
        changed: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            accessed,
            modified,
            changed,
        }
    }

    /// Read timestamps from already fetched metadata.
    pub fn from_metadata(metadata: &Metadata) -> Self {
        Self {
            accessed: metadata.accessed().ok().map(to_utc),
            modified: metadata.modified().ok().map(to_utc),
            changed: change_time(metadata),
        }
    }
}

fn to_utc(time: SystemTime) -> DateTime<Utc> {
    DateTime::<Utc>::from(time)
}

#[cfg(unix)]
fn change_time(metadata: &Metadata) -> Option<DateTime<Utc>> {
    use std::os::unix::fs::MetadataExt;
    DateTime::from_timestamp(metadata.ctime(), metadata.ctime_nsec() as u32)
}

#[cfg(not(unix))]
fn change_time(_metadata: &Metadata) -> Option<DateTime<Utc>> {
    None
}

/// One inventoried filesystem object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryRecord {
    /// Encoded base name.
    pub name: CompactString,
    /// Encoded absolute path.
    pub absolute_path: String,
    /// Object type.
    pub kind: EntryKind,
    /// Logical file size, or the subtree total for directories.
    pub size_bytes: u64,
    /// Access, modification and change times.
    pub timestamps: Timestamps,
}

impl EntryRecord {
    /// Create a file record.
    pub fn file(
        name: impl Into<CompactString>,
        absolute_path: impl Into<String>,
        size_bytes: u64,
        timestamps: Timestamps,
    ) -> Self {
        Self {
            name: name.into(),
            absolute_path: absolute_path.into(),
            kind: EntryKind::File,
            size_bytes,
            timestamps,
        }
    }

    /// Create a directory record. Its size is filled in once the subtree is done.
    pub fn directory(
        name: impl Into<CompactString>,
        absolute_path: impl Into<String>,
        timestamps: Timestamps,
    ) -> Self {
        Self {
            name: name.into(),
            absolute_path: absolute_path.into(),
            kind: EntryKind::Directory,
            size_bytes: 0,
            timestamps,
        }
    }

    /// Check if this record is a file.
    pub fn is_file(&self) -> bool {
        self.kind.is_file()
    }

    /// Check if this record is a directory.
    pub fn is_dir(&self) -> bool {
        self.kind.is_dir()
    }
}

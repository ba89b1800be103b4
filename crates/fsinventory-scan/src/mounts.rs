//! Live mount table snapshot and mount-point classification.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use fsinventory_core::ExcludedFsTypes;
use thiserror::Error;
use tracing::{debug, warn};

/// Mount table sources, most detailed first.
const MOUNT_SOURCES: &[(&str, MountFormat)] = &[
    ("/proc/self/mountinfo", MountFormat::MountInfo),
    ("/proc/mounts", MountFormat::Fstab),
    ("/etc/mtab", MountFormat::Fstab),
];

/// Errors from reading the mount table.
#[derive(Debug, Error)]
pub enum MountError {
    /// No mount table source could be read.
    #[error("no readable mount table (tried {tried})")]
    Unavailable { tried: String },

    /// I/O error reading a source.
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Text layout of a mount table source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MountFormat {
    /// `/proc/<pid>/mountinfo`: mount point in field 5, fs type after ` - `.
    MountInfo,
    /// `/proc/mounts`, `/etc/mtab`: `device mount_point fs_type options ...`.
    Fstab,
}

/// Outcome of classifying a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// Local storage; walk it.
    Scannable,
    /// Virtual, remote, or unverifiable; prune it.
    Excluded,
}

/// One mount point and its filesystem type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountEntry {
    /// Where the filesystem is attached.
    pub mount_point: PathBuf,
    /// Filesystem type name as reported by the kernel.
    pub fs_type: String,
    /// Whether the type is in the excluded set.
    pub excluded: bool,
}

/// Immutable snapshot of the mount table.
///
/// Entries are kept sorted by mount-point depth, deepest first, so the first
/// entry whose mount point prefixes a path is the most specific one.
#[derive(Debug, Clone)]
pub struct MountTable {
    entries: Vec<MountEntry>,
    fail_closed: bool,
}

impl MountTable {
    /// Read the live mount table, trying each known source in turn.
    pub fn load(excluded: &ExcludedFsTypes) -> Result<Self, MountError> {
        for (source, format) in MOUNT_SOURCES {
            match Self::from_source(Path::new(source), *format, excluded) {
                Ok(table) => {
                    debug!(source, mounts = table.entries.len(), "Loaded mount table");
                    return Ok(table);
                }
                Err(err) => debug!(source, error = %err, "Mount table source unavailable"),
            }
        }

        Err(MountError::Unavailable {
            tried: MOUNT_SOURCES
                .iter()
                .map(|(source, _)| *source)
                .collect::<Vec<_>>()
                .join(", "),
        })
    }

    /// Read one mount table file.
    pub fn from_source(
        path: &Path,
        format: MountFormat,
        excluded: &ExcludedFsTypes,
    ) -> Result<Self, MountError> {
        let raw = fs::read(path).map_err(|source| MountError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let text = String::from_utf8_lossy(&raw);

        Ok(match format {
            MountFormat::MountInfo => Self::parse_mountinfo(&text, excluded),
            MountFormat::Fstab => Self::parse_mounts(&text, excluded),
        })
    }

    /// Parse `/proc/<pid>/mountinfo` content.
    pub fn parse_mountinfo(input: &str, excluded: &ExcludedFsTypes) -> Self {
        let pairs = input.lines().filter_map(|line| {
            let parsed = line.split_once(" - ").and_then(|(left, right)| {
                let mount_point = left.split_whitespace().nth(4)?;
                let fs_type = right.split_whitespace().next()?;
                Some((unescape_mount_field(mount_point), fs_type.to_string()))
            });
            if parsed.is_none() && !line.trim().is_empty() {
                warn!(line, "Ignoring malformed mountinfo line");
            }
            parsed
        });

        Self::from_entries(pairs, excluded)
    }

    /// Parse `/proc/mounts` or `/etc/mtab` content.
    pub fn parse_mounts(input: &str, excluded: &ExcludedFsTypes) -> Self {
        let pairs = input.lines().filter_map(|line| {
            let mut fields = line.split_whitespace();
            let _device = fields.next()?;
            let mount_point = fields.next()?;
            let fs_type = fields.next()?;
            Some((unescape_mount_field(mount_point), fs_type.to_string()))
        });

        Self::from_entries(pairs, excluded)
    }

    /// Build a table from explicit `(mount_point, fs_type)` pairs.
    ///
    /// A later pair for the same mount point replaces an earlier one, the
    /// way a newer mount shadows an older one at the same location.
    /// Relative mount points (`none`, `rootfs` placeholders) are dropped.
    pub fn from_entries<I, P, S>(pairs: I, excluded: &ExcludedFsTypes) -> Self
    where
        I: IntoIterator<Item = (P, S)>,
        P: Into<PathBuf>,
        S: Into<String>,
    {
        let mut unique: BTreeMap<PathBuf, String> = BTreeMap::new();
        for (mount_point, fs_type) in pairs {
            let mount_point = mount_point.into();
            if mount_point.is_absolute() {
                unique.insert(mount_point, fs_type.into());
            }
        }

        let mut entries: Vec<MountEntry> = unique
            .into_iter()
            .map(|(mount_point, fs_type)| MountEntry {
                excluded: excluded.is_excluded(&fs_type),
                mount_point,
                fs_type,
            })
            .collect();
        entries.sort_by_key(|entry| std::cmp::Reverse(entry.mount_point.components().count()));

        Self {
            entries,
            fail_closed: false,
        }
    }

    /// Table used when no mount information could be read: everything is
    /// excluded.
    pub fn unavailable() -> Self {
        Self {
            entries: Vec::new(),
            fail_closed: true,
        }
    }

    /// Entries, deepest mount point first.
    pub fn entries(&self) -> &[MountEntry] {
        &self.entries
    }

    /// Number of mount points.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the table has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The most specific mount containing an already resolved path.
    pub fn mount_for(&self, resolved: &Path) -> Option<&MountEntry> {
        self.entries
            .iter()
            .find(|entry| resolved.starts_with(&entry.mount_point))
    }

    /// Classify a path by the filesystem it lives on.
    ///
    /// The path is canonicalized first; if that fails the path is excluded.
    /// A path under no known mount point is scannable.
    pub fn classify(&self, path: &Path) -> Classification {
        if self.fail_closed {
            return Classification::Excluded;
        }

        let resolved = match path.canonicalize() {
            Ok(resolved) => resolved,
            Err(err) => {
                debug!(path = %path.display(), error = %err, "Cannot resolve path, excluding");
                return Classification::Excluded;
            }
        };

        match self.mount_for(&resolved) {
            Some(entry) if entry.excluded => Classification::Excluded,
            _ => Classification::Scannable,
        }
    }
}

/// Decode the octal escapes (`\040` for space, `\011` for tab, ...) the kernel
/// uses for whitespace inside mount table fields.
fn unescape_mount_field(value: &str) -> PathBuf {
    let bytes = value.as_bytes();
    let mut output = Vec::with_capacity(bytes.len());
    let mut index = 0;

    while index < bytes.len() {
        if bytes[index] == b'\\' && index + 3 < bytes.len() {
            let digits = &bytes[index + 1..index + 4];
            if digits.iter().all(|b| (b'0'..=b'7').contains(b)) {
                let octal = std::str::from_utf8(digits).ok();
                if let Some(num) = octal.and_then(|o| u8::from_str_radix(o, 8).ok()) {
                    output.push(num);
                    index += 4;
                    continue;
                }
            }
        }

        output.push(bytes[index]);
        index += 1;
    }

    bytes_to_path(output)
}

#[cfg(unix)]
fn bytes_to_path(bytes: Vec<u8>) -> PathBuf {
    use std::ffi::OsString;
    use std::os::unix::ffi::OsStringExt;
    PathBuf::from(OsString::from_vec(bytes))
}

#[cfg(not(unix))]
fn bytes_to_path(bytes: Vec<u8>) -> PathBuf {
    PathBuf::from(String::from_utf8_lossy(&bytes).into_owned())
}

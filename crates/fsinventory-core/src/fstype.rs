//! Filesystem types that must never be walked.

use serde::{Deserialize, Serialize};

/// Kernel-backed pseudo filesystems.
const VIRTUAL_FS_TYPES: &[&str] = &[
    "autofs",
    "binfmt_misc",
    "bpf",
    "cgroup",
    "cgroup2",
    "configfs",
    "debugfs",
    "devpts",
    "devtmpfs",
    "efivarfs",
    "fusectl",
    "hugetlbfs",
    "mqueue",
    "nsfs",
    "overlay",
    "proc",
    "pstore",
    "ramfs",
    "rpc_pipefs",
    "securityfs",
    "selinuxfs",
    "squashfs",
    "sysfs",
    "tmpfs",
    "tracefs",
];

/// Network and remote filesystems.
const REMOTE_FS_TYPES: &[&str] = &[
    "nfs",
    "nfs4",
    "cifs",
    "smbfs",
    "smb3",
    "sshfs",
    "fuse.sshfs",
    "glusterfs",
    "lustre",
    "afs",
    "9p",
    "ceph",
    "gcsfuse",
    "s3fs",
    "davfs",
    "ftpfs",
];

/// Set of filesystem type names excluded from a walk.
///
/// A type is excluded when it equals one of `names` or starts with one of
/// `prefixes` (`fuse.` covers every FUSE driver, `nfs` covers versioned NFS).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExcludedFsTypes {
    /// Exact type names.
    pub names: Vec<String>,
    /// Type name prefixes.
    #[serde(default)]
    pub prefixes: Vec<String>,
}

impl ExcludedFsTypes {
    /// Virtual pseudo filesystems plus remote filesystems.
    pub fn standard() -> Self {
        Self {
            names: VIRTUAL_FS_TYPES
                .iter()
                .chain(REMOTE_FS_TYPES)
                .map(|s| s.to_string())
                .collect(),
            prefixes: vec!["fuse.".to_string(), "nfs".to_string()],
        }
    }

    /// Remote filesystems only; local pseudo filesystems are walked.
    pub fn remote_only() -> Self {
        Self {
            names: REMOTE_FS_TYPES.iter().map(|s| s.to_string()).collect(),
            prefixes: Vec::new(),
        }
    }

    /// Exclude nothing.
    pub fn none() -> Self {
        Self {
            names: Vec::new(),
            prefixes: Vec::new(),
        }
    }

    /// Add one more excluded type name.
    pub fn with_type(mut self, fs_type: impl Into<String>) -> Self {
        let fs_type = fs_type.into();
        if !self.names.contains(&fs_type) {
            self.names.push(fs_type);
        }
        self
    }

    /// Check whether a filesystem type is excluded.
    pub fn is_excluded(&self, fs_type: &str) -> bool {
        self.names.iter().any(|name| name == fs_type)
            || self.prefixes.iter().any(|prefix| fs_type.starts_with(prefix.as_str()))
    }
}

impl Default for ExcludedFsTypes {
    fn default() -> Self {
        Self::standard()
    }
}

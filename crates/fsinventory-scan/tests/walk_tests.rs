use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use fsinventory_scan::{
    CancelToken, EntryKind, EntryRecord, ExcludedFsTypes, InventoryConfig, InventoryWalker,
    MountTable, PathPolicy, WarningKind,
};
use tempfile::TempDir;

/// `root/a/file1` (100 B), `root/a/b/file2` (50 B) and a 1 GiB sparse
/// `root/excluded_mount/file3`.
fn mixed_tree() -> (TempDir, PathBuf) {
    let temp = TempDir::new().unwrap();
    let root = temp.path().canonicalize().unwrap().join("root");

    fs::create_dir_all(root.join("a/b")).unwrap();
    fs::create_dir_all(root.join("excluded_mount")).unwrap();
    fs::write(root.join("a/file1"), vec![b'x'; 100]).unwrap();
    fs::write(root.join("a/b/file2"), vec![b'y'; 50]).unwrap();
    let big = fs::File::create(root.join("excluded_mount/file3")).unwrap();
    big.set_len(1 << 30).unwrap();

    (temp, root)
}

fn mounts_with_excluded(root: &Path, excluded: &Path) -> Arc<MountTable> {
    Arc::new(MountTable::from_entries(
        [
            (root.to_path_buf(), "ext4".to_string()),
            (excluded.to_path_buf(), "nfs".to_string()),
        ],
        &ExcludedFsTypes::standard(),
    ))
}

fn aggregate_config(root: &Path) -> InventoryConfig {
    InventoryConfig::builder()
        .root(root)
        .output(root.with_extension("csv"))
        .aggregate_directories(true)
        .build()
        .unwrap()
}

fn by_name(records: &[EntryRecord]) -> BTreeMap<String, (EntryKind, u64)> {
    records
        .iter()
        .map(|r| (r.name.to_string(), (r.kind, r.size_bytes)))
        .collect()
}

#[test]
fn test_end_to_end_fixture() {
    let (_temp, root) = mixed_tree();
    let mounts = mounts_with_excluded(&root, &root.join("excluded_mount"));

    let walker = InventoryWalker::new();
    let mut walk = walker
        .walk(&aggregate_config(&root), mounts, CancelToken::new())
        .unwrap();
    let records: Vec<EntryRecord> = walk.by_ref().collect();

    let expected: BTreeMap<String, (EntryKind, u64)> = [
        ("file1", (EntryKind::File, 100)),
        ("file2", (EntryKind::File, 50)),
        ("a", (EntryKind::Directory, 150)),
        ("b", (EntryKind::Directory, 50)),
        ("root", (EntryKind::Directory, 150)),
    ]
    .into_iter()
    .map(|(name, value)| (name.to_string(), value))
    .collect();

    assert_eq!(records.len(), 5);
    assert_eq!(by_name(&records), expected);
    assert!(
        !records
            .iter()
            .any(|r| r.absolute_path.contains("excluded_mount"))
    );

    let stats = walk.stats();
    assert_eq!(stats.pruned_mounts, 1);
    assert_eq!(stats.total_size, 150);
    assert!(
        walk.warnings()
            .warnings()
            .iter()
            .any(|w| w.kind == WarningKind::ExcludedMount)
    );
}

#[test]
fn test_excluded_subtree_adds_nothing_to_ancestors() {
    let (_temp, root) = mixed_tree();
    // Exclude a nested directory so the prune boundary sits below `a`.
    let mounts = mounts_with_excluded(&root, &root.join("a/b"));

    let walker = InventoryWalker::new();
    let records: Vec<EntryRecord> = walker
        .walk(&aggregate_config(&root), mounts, CancelToken::new())
        .unwrap()
        .collect();
    let named = by_name(&records);

    assert!(!named.contains_key("b"));
    assert!(!named.contains_key("file2"));
    assert_eq!(named["a"], (EntryKind::Directory, 100));
    // excluded_mount is walkable here, so its sparse file counts.
    assert_eq!(named["root"], (EntryKind::Directory, 100 + (1 << 30)));
}

#[test]
fn test_directory_totals_match_brute_force_sums() {
    let temp = TempDir::new().unwrap();
    let root = temp.path().canonicalize().unwrap();

    let files: &[(&str, usize)] = &[
        ("top.bin", 7),
        ("x/one", 11),
        ("x/two", 13),
        ("x/y/three", 17),
        ("x/y/z/four", 19),
        ("w/five", 23),
        ("w/empty/.hidden", 29),
    ];
    fs::create_dir_all(root.join("v/empty_leaf")).unwrap();
    for (rel, size) in files {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, vec![0u8; *size]).unwrap();
    }

    let walker = InventoryWalker::new();
    let mounts = Arc::new(MountTable::from_entries(
        [(root.clone(), "ext4")],
        &ExcludedFsTypes::standard(),
    ));
    let records: Vec<EntryRecord> = walker
        .walk(&aggregate_config(&root), mounts, CancelToken::new())
        .unwrap()
        .collect();

    let file_paths: Vec<(PathBuf, u64)> = files
        .iter()
        .map(|(rel, size)| (root.join(rel), *size as u64))
        .collect();

    let directories: Vec<&EntryRecord> = records.iter().filter(|r| r.is_dir()).collect();
    assert_eq!(directories.len(), 8);

    for dir in directories {
        let dir_path = PathBuf::from(&dir.absolute_path);
        let expected: u64 = file_paths
            .iter()
            .filter(|(path, _)| path.starts_with(&dir_path))
            .map(|(_, size)| size)
            .sum();
        assert_eq!(dir.size_bytes, expected, "total for {}", dir_path.display());
    }

    assert_eq!(records.iter().filter(|r| r.is_file()).count(), files.len());
}

#[cfg(unix)]
#[test]
fn test_unreadable_directory_does_not_abort_walk() {
    use std::os::unix::fs::PermissionsExt;

    let temp = TempDir::new().unwrap();
    let root = temp.path().canonicalize().unwrap();
    fs::create_dir_all(root.join("a_locked/inner")).unwrap();
    fs::create_dir_all(root.join("b_open/deeper")).unwrap();
    fs::write(root.join("a_locked/inner/secret"), "s").unwrap();
    fs::write(root.join("b_open/one"), "1").unwrap();
    fs::write(root.join("b_open/deeper/two"), "22").unwrap();
    fs::write(root.join("c_file"), "333").unwrap();

    let locked = root.join("a_locked");
    fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();
    if fs::read_dir(&locked).is_ok() {
        // Running with CAP_DAC_OVERRIDE; permissions cannot be revoked.
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();
        return;
    }

    let walker = InventoryWalker::new();
    let mounts = Arc::new(MountTable::from_entries(
        [(root.clone(), "ext4")],
        &ExcludedFsTypes::standard(),
    ));
    let mut walk = walker
        .walk(&aggregate_config(&root), mounts, CancelToken::new())
        .unwrap();
    let records: Vec<EntryRecord> = walk.by_ref().collect();
    fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();

    let named = by_name(&records);
    assert_eq!(named["one"], (EntryKind::File, 1));
    assert_eq!(named["two"], (EntryKind::File, 2));
    assert_eq!(named["c_file"], (EntryKind::File, 3));
    assert_eq!(named["b_open"], (EntryKind::Directory, 3));
    assert!(!named.contains_key("a_locked"));
    assert!(!named.contains_key("secret"));
    assert!(walk.stats().skipped_directories >= 1);
}

#[cfg(target_os = "linux")]
#[test]
fn test_percent_policy_encodes_non_utf8_names() {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;

    let temp = TempDir::new().unwrap();
    let root = temp.path().canonicalize().unwrap();
    let raw_name = OsStr::from_bytes(b"bad\xffname");
    if fs::write(root.join(raw_name), "x").is_err() {
        // Filesystem refuses non-UTF-8 names.
        return;
    }

    let config = InventoryConfig::builder()
        .root(&root)
        .output(root.join("out.csv"))
        .path_policy(PathPolicy::Percent)
        .build()
        .unwrap();
    let mounts = Arc::new(MountTable::from_entries(
        [(root.clone(), "ext4")],
        &ExcludedFsTypes::standard(),
    ));

    let records: Vec<EntryRecord> = InventoryWalker::new()
        .walk(&config, mounts, CancelToken::new())
        .unwrap()
        .collect();

    assert_eq!(records.len(), 1);
    assert_eq!(records[0].name.as_str(), "bad%FFname");
    assert!(records[0].absolute_path.ends_with("/bad%FFname"));
}

#[test]
fn test_progress_is_broadcast_on_completion() {
    let (_temp, root) = mixed_tree();
    let mounts = mounts_with_excluded(&root, &root.join("excluded_mount"));

    let walker = InventoryWalker::new();
    let mut progress_rx = walker.subscribe();
    let count = walker
        .walk(&aggregate_config(&root), mounts, CancelToken::new())
        .unwrap()
        .count();
    assert_eq!(count, 5);

    let mut last = None;
    while let Ok(progress) = progress_rx.try_recv() {
        last = Some(progress);
    }
    let last = last.expect("final progress snapshot");
    assert_eq!(last.files, 2);
    assert_eq!(last.bytes, 150);
    assert_eq!(last.pruned_mounts, 1);
}

#[test]
fn test_independent_walks_do_not_share_totals() {
    let (_temp_a, root_a) = mixed_tree();
    let (_temp_b, root_b) = mixed_tree();
    fs::write(root_b.join("a/extra"), vec![0u8; 1000]).unwrap();

    let walker = InventoryWalker::new();
    let walk_a = walker
        .walk(
            &aggregate_config(&root_a),
            mounts_with_excluded(&root_a, &root_a.join("excluded_mount")),
            CancelToken::new(),
        )
        .unwrap();
    let walk_b = walker
        .walk(
            &aggregate_config(&root_b),
            mounts_with_excluded(&root_b, &root_b.join("excluded_mount")),
            CancelToken::new(),
        )
        .unwrap();

    // Interleave the two walks record by record.
    let mut a_records = Vec::new();
    let mut b_records = Vec::new();
    let (mut a, mut b) = (walk_a, walk_b);
    loop {
        let next_a = a.next();
        let next_b = b.next();
        if next_a.is_none() && next_b.is_none() {
            break;
        }
        a_records.extend(next_a);
        b_records.extend(next_b);
    }

    assert_eq!(by_name(&a_records)["root"], (EntryKind::Directory, 150));
    assert_eq!(by_name(&b_records)["root"], (EntryKind::Directory, 1150));
}

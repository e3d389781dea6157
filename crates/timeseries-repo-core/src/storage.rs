//! Storage locations and filesystem helpers.
//!
//! All reads and writes of dataset files and catalog documents go through
//! this module. A [`StorageLocation`] names a root; callers pass paths
//! relative to it, as produced by [`layout`]. Writes publish by writing a
//! uniquely named hidden sibling file, syncing it, and renaming it over the
//! target, so a reader never observes a half-written file and the previous
//! version stays in place until the rename. Concurrent writers to one target
//! each stage their own file; the last rename wins.
//!
//! Only local directories are implemented.

pub mod error;
pub mod layout;

use std::{
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
};

pub use error::StorageError;

/// General result type used by storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Root of a repository's data or catalog tree.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StorageLocation {
    /// A directory on the local filesystem.
    Local(PathBuf),
}

impl StorageLocation {
    /// A location rooted at a local directory.
    pub fn local(root: impl Into<PathBuf>) -> Self {
        StorageLocation::Local(root.into())
    }

    /// Absolute path of `rel` under this location.
    pub fn resolve(&self, rel: &Path) -> PathBuf {
        match self {
            StorageLocation::Local(root) => root.join(rel),
        }
    }
}

/// An entry returned by [`list_dir`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DirEntryInfo {
    /// File or directory name (not a path).
    pub name: String,
    /// Whether the entry is a directory.
    pub is_dir: bool,
}

/// Prefix of files still being written.
const PENDING_PREFIX: &str = ".tsrepo-";
/// Suffix of files still being written.
const PENDING_SUFFIX: &str = ".pending";

/// Whether `name` is a staging file of an unfinished [`write_atomic`].
fn is_pending(name: &str) -> bool {
    name.starts_with(PENDING_PREFIX) && name.ends_with(PENDING_SUFFIX)
}

/// Write `contents` to `rel_path` inside `location` atomically.
///
/// Parent directories are created as needed. An existing file at the target
/// is replaced only once the new contents are fully on disk. A failed write
/// leaves no staging file behind.
pub fn write_atomic(location: &StorageLocation, rel_path: &Path, contents: &[u8]) -> StorageResult<()> {
    let target = location.resolve(rel_path);
    let parent = target
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    fs::create_dir_all(&parent).map_err(|e| StorageError::from_io("create directory", &parent, e))?;

    let mut pending = tempfile::Builder::new()
        .prefix(PENDING_PREFIX)
        .suffix(PENDING_SUFFIX)
        .tempfile_in(&parent)
        .map_err(|e| StorageError::from_io("stage", &parent, e))?;
    pending
        .write_all(contents)
        .and_then(|()| pending.as_file().sync_all())
        .map_err(|e| StorageError::from_io("write", pending.path(), e))?;
    pending
        .persist(&target)
        .map_err(|e| StorageError::from_io("rename", &target, e.error))?;
    Ok(())
}

/// Read the whole file at `rel_path`.
///
/// A missing file is reported as [`StorageError::NotFound`].
pub fn read_all_bytes(location: &StorageLocation, rel_path: &Path) -> StorageResult<Vec<u8>> {
    let path = location.resolve(rel_path);
    fs::read(&path).map_err(|e| StorageError::from_io("read", &path, e))
}

/// Read the file at `rel_path` as UTF-8 text.
pub fn read_to_string(location: &StorageLocation, rel_path: &Path) -> StorageResult<String> {
    let path = location.resolve(rel_path);
    fs::read_to_string(&path).map_err(|e| StorageError::from_io("read", &path, e))
}

/// Whether anything exists at `rel_path`. Never reads file contents.
pub fn exists(location: &StorageLocation, rel_path: &Path) -> StorageResult<bool> {
    let path = location.resolve(rel_path);
    path.try_exists()
        .map_err(|e| StorageError::from_io("probe", &path, e))
}

/// Entries directly under `rel_dir`, sorted by name.
///
/// A missing directory lists as empty. Entries whose names are not valid
/// UTF-8, and files still being written, are skipped.
pub fn list_dir(location: &StorageLocation, rel_dir: &Path) -> StorageResult<Vec<DirEntryInfo>> {
    let dir = location.resolve(rel_dir);
    let list_err = |e: io::Error| StorageError::from_io("list", &dir, e);
    let reader = match fs::read_dir(&dir) {
        Ok(reader) => reader,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(list_err(e)),
    };

    let mut out = Vec::new();
    for entry in reader {
        let entry = entry.map_err(list_err)?;
        let Ok(name) = entry.file_name().into_string() else {
            continue;
        };
        let is_dir = entry.file_type().map_err(list_err)?.is_dir();
        if !is_dir && is_pending(&name) {
            continue;
        }
        out.push(DirEntryInfo { name, is_dir });
    }
    out.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(out)
}

/// Copy `src` to `dst` (both relative to their locations) atomically.
pub fn copy_file(
    src_location: &StorageLocation,
    src: &Path,
    dst_location: &StorageLocation,
    dst: &Path,
) -> StorageResult<()> {
    let bytes = read_all_bytes(src_location, src)?;
    write_atomic(dst_location, dst, &bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    #[test]
    fn write_atomic_creates_parents_and_replaces() -> TestResult {
        let tmp = TempDir::new()?;
        let location = StorageLocation::local(tmp.path());
        let rel = Path::new("a/b/file.json");

        write_atomic(&location, rel, b"one")?;
        write_atomic(&location, rel, b"two")?;

        assert_eq!(read_to_string(&location, rel)?, "two");
        let left: Vec<_> = fs::read_dir(tmp.path().join("a/b"))?
            .map(|e| e.map(|e| e.file_name()))
            .collect::<Result<_, _>>()?;
        assert_eq!(left, vec![std::ffi::OsString::from("file.json")]);
        Ok(())
    }

    #[test]
    fn concurrent_writers_last_rename_wins() -> TestResult {
        let tmp = TempDir::new()?;
        let location = StorageLocation::local(tmp.path());
        let rel = Path::new("f.bin");
        let payloads = [vec![1u8; 1 << 20], vec![2u8; 1 << 20]];

        for _ in 0..20 {
            let shared = &location;
            let results: Vec<StorageResult<()>> = std::thread::scope(|scope| {
                let handles: Vec<_> = payloads
                    .iter()
                    .map(|payload| scope.spawn(move || write_atomic(shared, rel, payload)))
                    .collect();
                handles
                    .into_iter()
                    .map(|h| h.join().unwrap_or_else(|_| panic!("writer panicked")))
                    .collect()
            });
            for result in results {
                result?;
            }
            let stored = read_all_bytes(&location, rel)?;
            assert!(payloads.contains(&stored));
        }
        let names: Vec<_> = list_dir(&location, Path::new(""))?
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(names, vec!["f.bin"]);
        Ok(())
    }

    #[test]
    fn missing_file_is_not_found() -> TestResult {
        let tmp = TempDir::new()?;
        let location = StorageLocation::local(tmp.path());
        let err = read_all_bytes(&location, Path::new("nope.parquet"));
        assert!(matches!(err, Err(StorageError::NotFound { .. })));
        assert!(!exists(&location, Path::new("nope.parquet"))?);
        Ok(())
    }

    #[test]
    fn list_dir_is_sorted_and_tolerates_missing() -> TestResult {
        let tmp = TempDir::new()?;
        let location = StorageLocation::local(tmp.path());
        assert!(list_dir(&location, Path::new("missing"))?.is_empty());

        write_atomic(&location, Path::new("d/zeta.txt"), b"z")?;
        write_atomic(&location, Path::new("d/alpha.txt"), b"a")?;
        write_atomic(&location, Path::new("d/sub/inner.txt"), b"i")?;

        let entries = list_dir(&location, Path::new("d"))?;
        let names: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["alpha.txt", "sub", "zeta.txt"]);
        assert!(entries[1].is_dir);
        Ok(())
    }

    #[test]
    fn only_staging_files_are_hidden() -> TestResult {
        let tmp = TempDir::new()?;
        let location = StorageLocation::local(tmp.path());
        write_atomic(&location, Path::new("d/as_of=v1.tmp/part-0.parquet"), b"p")?;
        write_atomic(&location, Path::new("d/keep.tmp"), b"k")?;
        fs::write(tmp.path().join("d/.tsrepo-abc123.pending"), b"half")?;

        let names: Vec<_> = list_dir(&location, Path::new("d"))?
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(names, vec!["as_of=v1.tmp", "keep.tmp"]);
        Ok(())
    }

    #[test]
    fn copy_file_between_locations() -> TestResult {
        let src = TempDir::new()?;
        let dst = TempDir::new()?;
        let src_loc = StorageLocation::local(src.path());
        let dst_loc = StorageLocation::local(dst.path());
        write_atomic(&src_loc, Path::new("x.bin"), &[1, 2, 3])?;
        copy_file(&src_loc, Path::new("x.bin"), &dst_loc, Path::new("copy/x.bin"))?;
        assert_eq!(read_all_bytes(&dst_loc, Path::new("copy/x.bin"))?, vec![1, 2, 3]);
        Ok(())
    }
}

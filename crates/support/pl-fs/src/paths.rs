//! Path arithmetic shared by scanners, matchers and storage targets.

use std::path::{Path, PathBuf};

/// Split a path into directory, file stem and final extension.
///
/// The extension is everything from the last dot of the file name onward,
/// dot included (`"archive.rcd.gz"` → stem `"archive.rcd"`, ext `".gz"`), or
/// empty when the name has no dot. A leading-dot name like `".env"` counts
/// as all extension, matching how marker patterns compare.
pub fn split_file_path(path: &Path) -> (PathBuf, String, String) {
    let dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    match name.rfind('.') {
        Some(idx) => (dir, name[..idx].to_string(), name[idx..].to_string()),
        None => (dir, name, String::new()),
    }
}

/// Final extension of a path, dot included; empty when there is none.
pub fn file_extension(path: &Path) -> String {
    split_file_path(path).2
}

/// Join directory, stem and extension back into a path.
pub fn combine_file_path(dir: &Path, stem: &str, ext: &str) -> PathBuf {
    dir.join(format!("{stem}{ext}"))
}

/// Compute the destination key for a replicated file.
///
/// The source's directory relative to the scan root is preserved beneath
/// `prefix`, so subdirectory layout survives replication:
///
/// ```
/// use std::path::Path;
/// use pl_fs::destination_path;
///
/// let key = destination_path(
///     Path::new("/scan"),
///     Path::new("/scan/day1/record.rcd.gz"),
///     "uploads",
/// );
/// assert_eq!(key, "uploads/day1/record.rcd.gz");
/// ```
///
/// Keys use `/` separators and never start with one.
pub fn destination_path(root_dir: &Path, src_file: &Path, prefix: &str) -> String {
    let (src_dir, stem, ext) = split_file_path(src_file);
    let rel = src_dir
        .strip_prefix(root_dir)
        .map(Path::to_path_buf)
        .unwrap_or(src_dir);

    let mut segments: Vec<String> = Vec::new();
    if !prefix.is_empty() {
        segments.extend(
            prefix
                .split('/')
                .filter(|s| !s.is_empty())
                .map(str::to_string),
        );
    }
    segments.extend(
        rel.components()
            .map(|c| c.as_os_str().to_string_lossy().to_string())
            .filter(|s| !s.is_empty() && s != "/"),
    );
    segments.push(format!("{stem}{ext}"));

    segments.join("/")
}

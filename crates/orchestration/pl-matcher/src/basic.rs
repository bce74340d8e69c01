//! Extension-swap matcher.

use std::path::{Path, PathBuf};

use pl_error::MatchError;
use pl_fs::{combine_file_path, split_file_path};
use pl_traits::FileMatcher;
use pl_types::config::{is_file_extension, FileMatcherConfig};
use pl_types::MatcherKind;
use tracing::debug;

/// Matches siblings by swapping extensions onto the marker's base name.
///
/// With patterns `[".txt", ".json"]` and marker `/d/rec.mf`, the candidates
/// checked are `/d/rec.txt` and `/d/rec.json`. Existing candidates are
/// returned; missing ones are silently skipped. Non-extension patterns are
/// an error.
pub struct BasicFileMatcher;

impl FileMatcher for BasicFileMatcher {
    fn kind(&self) -> MatcherKind {
        MatcherKind::Basic
    }

    fn match_files(
        &self,
        marker: &Path,
        cfg: &FileMatcherConfig,
    ) -> Result<Vec<PathBuf>, MatchError> {
        if cfg.patterns.is_empty() {
            return Ok(Vec::new());
        }

        let (marker_dir, marker_name, _) = split_file_path(marker);

        let mut matches = Vec::new();
        for ext in &cfg.patterns {
            if !is_file_extension(ext) {
                return Err(MatchError::NotAnExtension(ext.clone()));
            }

            let candidate = combine_file_path(&marker_dir, &marker_name, ext);
            debug!(
                matcher = %self.kind(),
                pattern = %ext,
                candidate = %candidate.display(),
                "checking candidate file"
            );
            if candidate.is_file() {
                matches.push(candidate);
            }
        }

        Ok(matches)
    }
}

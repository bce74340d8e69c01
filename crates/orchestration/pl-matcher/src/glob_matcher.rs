//! Glob matcher.

use std::collections::BTreeSet;
use std::io;
use std::path::{Path, PathBuf};

use glob::Pattern;
use pl_error::{MatchError, PelicanError};
use pl_fs::{combine_file_path, split_file_path, WalkDecision, Walker};
use pl_traits::FileMatcher;
use pl_types::config::{is_file_extension, FileMatcherConfig};
use pl_types::MatcherKind;

/// Batch size for the candidate walk below the marker's directory.
const WALK_BATCH_SIZE: usize = 1024;

/// Matches siblings with glob patterns rooted at the marker's directory.
///
/// Each pattern is either a bare extension (handled like the basic matcher)
/// or a template producing a glob once `{{markerName}}` is expanded. The
/// matcher walks the marker's directory and returns every regular file
/// matching at least one compiled glob; duplicate hits across globs are
/// de-duplicated.
pub struct GlobFileMatcher;

impl FileMatcher for GlobFileMatcher {
    fn kind(&self) -> MatcherKind {
        MatcherKind::Glob
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

        let mut compiled = Vec::with_capacity(cfg.patterns.len());
        for raw in &cfg.patterns {
            let candidate_pattern = if is_file_extension(raw) {
                combine_file_path(&marker_dir, &marker_name, raw)
                    .to_string_lossy()
                    .to_string()
            } else {
                marker_dir
                    .join(crate::expand_marker_name(raw, &marker_name))
                    .to_string_lossy()
                    .to_string()
            };

            compiled.push(Pattern::new(&candidate_pattern).map_err(|err| {
                MatchError::BadGlob {
                    pattern: candidate_pattern.clone(),
                    message: err.to_string(),
                }
            })?);
        }

        let mut found: BTreeSet<PathBuf> = BTreeSet::new();
        let walker = Walker::new(WALK_BATCH_SIZE);
        let walk_result = walker.start(&marker_dir, &mut |path, meta, err| {
            if let Some(err) = err {
                if err.kind() == io::ErrorKind::NotFound {
                    return Ok(WalkDecision::Continue);
                }
                return Err(MatchError::Walk {
                    dir: marker_dir.clone(),
                    message: err.to_string(),
                }
                .into());
            }

            if meta.map(|m| m.is_file()).unwrap_or(false) {
                let rendered = path.to_string_lossy();
                if compiled.iter().any(|p| p.matches(&rendered)) {
                    found.insert(path.to_path_buf());
                }
            }
            Ok(WalkDecision::Continue)
        });
        walker.end();

        if let Err(err) = walk_result {
            return Err(match err {
                PelicanError::Match(inner) => inner,
                other => MatchError::Walk {
                    dir: marker_dir,
                    message: other.to_string(),
                },
            });
        }

        Ok(found.into_iter().collect())
    }
}

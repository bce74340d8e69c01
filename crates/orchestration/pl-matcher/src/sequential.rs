//! Zero-padded counter matcher.

use std::path::{Path, PathBuf};

use pl_error::MatchError;
use pl_fs::split_file_path;
use pl_traits::FileMatcher;
use pl_types::config::FileMatcherConfig;
use pl_types::MatcherKind;
use tracing::debug;

use crate::expand_marker_name;

/// Matches consecutively numbered sidecar files.
///
/// Patterns may reference `{{markerName}}` and carry runs of `#` characters
/// acting as zero-padded decimal counters (`##` → width 2). For each
/// pattern the counter starts at 1 and every consecutively existing file is
/// collected; collection stops at the first gap, so an out-of-sequence file
/// like `_099` on its own is never picked up. A pattern without a `#` run
/// is evaluated once as a plain existence test.
pub struct SequentialFileMatcher;

enum Segment {
    Literal(String),
    Counter(usize),
}

fn parse_segments(pattern: &str) -> (Vec<Segment>, bool) {
    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut counter_width = 0usize;
    let mut sequenced = false;

    for c in pattern.chars() {
        if c == '#' {
            if !literal.is_empty() {
                segments.push(Segment::Literal(std::mem::take(&mut literal)));
            }
            counter_width += 1;
            sequenced = true;
        } else {
            if counter_width > 0 {
                segments.push(Segment::Counter(counter_width));
                counter_width = 0;
            }
            literal.push(c);
        }
    }
    if counter_width > 0 {
        segments.push(Segment::Counter(counter_width));
    }
    if !literal.is_empty() {
        segments.push(Segment::Literal(literal));
    }

    (segments, sequenced)
}

fn render(segments: &[Segment], index: u64) -> String {
    let mut name = String::new();
    for segment in segments {
        match segment {
            Segment::Literal(text) => name.push_str(text),
            Segment::Counter(width) => {
                let width = *width;
                name.push_str(&format!("{index:0width$}"));
            }
        }
    }
    name
}

impl FileMatcher for SequentialFileMatcher {
    fn kind(&self) -> MatcherKind {
        MatcherKind::Sequential
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
        for pattern in &cfg.patterns {
            let pattern = expand_marker_name(pattern, &marker_name);
            let (segments, sequenced) = parse_segments(&pattern);

            if !sequenced {
                let candidate = marker_dir.join(&pattern);
                if candidate.is_file() {
                    matches.push(candidate);
                }
                continue;
            }

            // Files are numbered from 1; the first hole ends the run.
            let mut index = 1u64;
            loop {
                let candidate = marker_dir.join(render(&segments, index));
                debug!(
                    matcher = %self.kind(),
                    pattern = %pattern,
                    candidate = %candidate.display(),
                    "checking if candidate file exists"
                );
                if candidate.is_file() {
                    matches.push(candidate);
                    index += 1;
                } else {
                    break;
                }
            }
        }

        Ok(matches)
    }
}

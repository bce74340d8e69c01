//! Sibling-file matchers.
//!
//! Given a marker file and a pattern list, a matcher computes the candidate
//! data files belonging to the marker's group. Three variants exist:
//!
//! - [`BasicFileMatcher`]: patterns are extensions swapped onto the marker's
//!   base name
//! - [`SequentialFileMatcher`]: patterns carry `#` runs acting as zero-padded
//!   counters; collection stops at the first gap
//! - [`GlobFileMatcher`]: patterns compile to globs matched against a walk of
//!   the marker's directory
//!
//! A processor may layer several matcher invocations and concatenate their
//! results.

mod basic;
mod glob_matcher;
mod sequential;

pub use basic::BasicFileMatcher;
pub use glob_matcher::GlobFileMatcher;
pub use sequential::SequentialFileMatcher;

use pl_traits::FileMatcher;
use pl_types::MatcherKind;

/// The template variable matchers resolve to the marker's base name.
pub const TEMPLATE_VAR_MARKER_NAME: &str = "markerName";

/// Matcher instance for a configured kind.
pub fn for_kind(kind: MatcherKind) -> Box<dyn FileMatcher> {
    match kind {
        MatcherKind::Basic => Box::new(BasicFileMatcher),
        MatcherKind::Sequential => Box::new(SequentialFileMatcher),
        MatcherKind::Glob => Box::new(GlobFileMatcher),
    }
}

/// Expand the `markerName` template variable in a pattern. Both the bare
/// (`{{markerName}}`) and the dotted (`{{.markerName}}`) spellings are
/// accepted.
fn expand_marker_name(pattern: &str, marker_name: &str) -> String {
    pattern
        .replace("{{.markerName}}", marker_name)
        .replace("{{markerName}}", marker_name)
}

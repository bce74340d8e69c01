//! Bounded-memory directory traversal.
//!
//! A directory with millions of entries must be walkable without
//! materializing its full listing. The walker reads at most `batch_size`
//! entries per readdir call and keeps each directory's `ReadDir` iterator
//! open until its listing is exhausted, so memory stays O(depth × batch)
//! rather than O(tree size). Entries are sorted lexically within each batch,
//! which makes traversal order deterministic for a given tree and batch
//! size.

use std::collections::HashMap;
use std::ffi::OsString;
use std::fs::{self, Metadata, ReadDir};
use std::io;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use pl_error::PelicanError;

/// What the callback wants the walker to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkDecision {
    /// Keep walking
    Continue,
    /// Prune this directory's descendants; siblings continue. Returned for
    /// a file, it ends the walk like [`WalkDecision::SkipAll`].
    SkipDir,
    /// End the walk early; not an error
    SkipAll,
}

/// Callback invoked for the root and every descendant, in pre-order.
///
/// On a traversal I/O error the entry's metadata is `None` and the error is
/// passed instead; the callback's return decides whether the walk continues.
/// Returning `Err` aborts the walk and propagates out of [`Walker::start`].
pub type WalkFn<'a> =
    dyn FnMut(&Path, Option<&Metadata>, Option<io::Error>) -> Result<WalkDecision, PelicanError>
        + 'a;

enum Flow {
    Continue,
    SkipAll,
}

/// Directory-tree walker with a bound on entries read per call.
///
/// A single walker instance is not meant for concurrent `start` calls; the
/// mutex only guards the handle map against internal races during close.
pub struct Walker {
    batch_size: usize,
    open: Mutex<HashMap<PathBuf, ReadDir>>,
}

impl Walker {
    /// Create a walker reading at most `batch_size` entries per readdir.
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size: batch_size.max(1),
            open: Mutex::new(HashMap::new()),
        }
    }

    /// Walk the tree rooted at `root`.
    ///
    /// An I/O error at the root itself is handed to the callback, whose
    /// return decides whether it propagates.
    pub fn start(&self, root: &Path, f: &mut WalkFn<'_>) -> Result<(), PelicanError> {
        match fs::symlink_metadata(root) {
            Err(err) => {
                f(root, None, Some(err))?;
            }
            Ok(meta) => {
                self.walk(root, &meta, f)?;
            }
        }
        Ok(())
    }

    /// Close every still-open directory handle. Idempotent; also run on
    /// drop.
    pub fn end(&self) {
        self.open.lock().clear();
    }

    /// Number of directory handles currently held. The walker keeps at most
    /// one per ancestor of the entry being visited.
    pub fn open_handles(&self) -> usize {
        self.open.lock().len()
    }

    fn walk(&self, path: &Path, meta: &Metadata, f: &mut WalkFn<'_>) -> Result<Flow, PelicanError> {
        if !meta.is_dir() {
            return Ok(match f(path, Some(meta), None)? {
                WalkDecision::SkipAll => Flow::SkipAll,
                // SkipDir on a file skips its remaining siblings
                WalkDecision::SkipDir => Flow::SkipAll,
                WalkDecision::Continue => Flow::Continue,
            });
        }

        match f(path, Some(meta), None)? {
            WalkDecision::SkipAll => return Ok(Flow::SkipAll),
            WalkDecision::SkipDir => {
                self.close(path);
                return Ok(Flow::Continue);
            }
            WalkDecision::Continue => {}
        }

        loop {
            let names = match self.read_batch(path) {
                Ok(names) => names,
                Err(err) => {
                    // Surface the readdir failure for this directory; its
                    // decision controls whether the walk goes on elsewhere.
                    return Ok(match f(path, Some(meta), Some(err))? {
                        WalkDecision::SkipAll => Flow::SkipAll,
                        _ => Flow::Continue,
                    });
                }
            };
            if names.is_empty() {
                break;
            }

            for name in names {
                let child = path.join(&name);
                match fs::symlink_metadata(&child) {
                    Err(err) => {
                        // Entry vanished between listing and stat, or is
                        // unreadable; let the callback decide.
                        match f(&child, None, Some(err))? {
                            WalkDecision::SkipAll => return Ok(Flow::SkipAll),
                            _ => continue,
                        }
                    }
                    Ok(child_meta) => {
                        if let Flow::SkipAll = self.walk(&child, &child_meta, f)? {
                            return Ok(Flow::SkipAll);
                        }
                    }
                }
            }
        }

        Ok(Flow::Continue)
    }

    /// Read up to `batch_size` names from `dir`, sorted lexically. The
    /// handle is cached across calls and dropped once the listing is
    /// exhausted; an empty result means end of directory.
    fn read_batch(&self, dir: &Path) -> io::Result<Vec<OsString>> {
        let mut open = self.open.lock();
        let handle = match open.entry(dir.to_path_buf()) {
            std::collections::hash_map::Entry::Occupied(entry) => entry.into_mut(),
            std::collections::hash_map::Entry::Vacant(entry) => entry.insert(fs::read_dir(dir)?),
        };

        let mut names = Vec::with_capacity(self.batch_size);
        while names.len() < self.batch_size {
            match handle.next() {
                Some(Ok(entry)) => names.push(entry.file_name()),
                Some(Err(err)) => {
                    open.remove(dir);
                    return Err(err);
                }
                None => break,
            }
        }

        if names.is_empty() {
            open.remove(dir);
            return Ok(names);
        }

        names.sort();
        Ok(names)
    }

    fn close(&self, dir: &Path) {
        self.open.lock().remove(dir);
    }
}

impl Drop for Walker {
    fn drop(&mut self) {
        self.end();
    }
}

//! Symlink-safe directory traversal.
//!
//! Walks the tree rooted at the scan target and yields a lazy, deduplicated
//! stream of regular files. Symbolic links are followed only when their
//! resolved target stays inside the canonicalized root and, for directories,
//! has not already been entered during this walk. Broken links are skipped
//! silently; permission errors are surfaced as events without aborting the
//! walk. Directory entries are visited in sorted order so scans are
//! reproducible.

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::debug;

use super::filter::IgnoreFilter;
use super::types::{CandidateFile, ScanError};

/// One event from the walk stream.
#[derive(Debug)]
pub enum WalkEvent {
    /// A regular file admitted to the scan
    File(CandidateFile),
    /// An entry rejected by the ignore filter
    Ignored(PathBuf),
    /// A recoverable per-entry error; the walk continues
    Error(ScanError),
}

/// Lazy walker over the tree rooted at a canonicalized scan target.
///
/// The visited-directory set is scoped to this walker instance, never shared
/// across scans.
pub struct Walker<'a> {
    root: PathBuf,
    filter: &'a IgnoreFilter,
    stack: Vec<PathBuf>,
    visited_dirs: HashSet<PathBuf>,
    yielded_files: HashSet<PathBuf>,
    pending: Option<WalkEvent>,
}

impl<'a> Walker<'a> {
    /// Create a walker for `root`. Fails only when the root itself cannot be
    /// canonicalized; everything below the root is handled non-fatally.
    pub fn new(root: &Path, filter: &'a IgnoreFilter) -> Result<Self> {
        let root = fs::canonicalize(root)
            .with_context(|| format!("cannot resolve scan root: {}", root.display()))?;
        let mut walker = Self {
            stack: Vec::new(),
            visited_dirs: HashSet::new(),
            yielded_files: HashSet::new(),
            pending: None,
            filter,
            root,
        };
        walker.visited_dirs.insert(walker.root.clone());
        let seed = walker.root.clone();
        if let Some(err) = walker.push_children(&seed) {
            walker.pending = Some(WalkEvent::Error(err));
        }
        Ok(walker)
    }

    /// The canonicalized scan root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Queue the sorted children of `dir` for traversal. Returns an error
    /// event payload when the directory cannot be read.
    fn push_children(&mut self, dir: &Path) -> Option<ScanError> {
        let entries = match fs::read_dir(dir) {
            Ok(rd) => rd,
            Err(e) => return Some(ScanError::new(dir, format!("cannot read directory: {}", e))),
        };
        let mut children: Vec<PathBuf> = entries.filter_map(|e| e.ok().map(|e| e.path())).collect();
        // Sorted, then reversed so pop() walks in ascending name order.
        children.sort();
        children.reverse();
        self.stack.extend(children);
        None
    }

    fn handle_directory(&mut self, path: &Path, real: PathBuf) -> Option<ScanError> {
        if !self.visited_dirs.insert(real.clone()) {
            debug!(dir = %real.display(), "directory already visited, breaking cycle");
            return None;
        }
        self.push_children(path)
    }
}

impl Iterator for Walker<'_> {
    type Item = WalkEvent;

    fn next(&mut self) -> Option<WalkEvent> {
        if let Some(event) = self.pending.take() {
            return Some(event);
        }
        while let Some(path) = self.stack.pop() {
            // Ignore rules are consulted on the relative path before any stat.
            if let Ok(relative) = path.strip_prefix(&self.root) {
                if self.filter.should_ignore(relative) {
                    return Some(WalkEvent::Ignored(path));
                }
            }

            let meta = match fs::symlink_metadata(&path) {
                Ok(m) => m,
                Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
                    return Some(WalkEvent::Error(ScanError::new(
                        &path,
                        format!("permission denied: {}", e),
                    )));
                }
                // Vanished mid-walk
                Err(_) => continue,
            };

            if meta.file_type().is_symlink() {
                // A broken link is invisible, never an error.
                let real = match fs::canonicalize(&path) {
                    Ok(r) => r,
                    Err(_) => continue,
                };
                if !real.starts_with(&self.root) {
                    debug!(
                        link = %path.display(),
                        target = %real.display(),
                        "symlink target escapes scan root, skipping"
                    );
                    continue;
                }
                let target = match fs::metadata(&real) {
                    Ok(m) => m,
                    Err(_) => continue,
                };
                if target.is_dir() {
                    // A link named like a skip directory, or pointing at one,
                    // is pruned the same as the directory itself.
                    let link_name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
                    let target_name = real.file_name().and_then(|n| n.to_str()).unwrap_or("");
                    if IgnoreFilter::is_skip_directory(link_name)
                        || IgnoreFilter::is_skip_directory(target_name)
                    {
                        return Some(WalkEvent::Ignored(path));
                    }
                    if let Some(err) = self.handle_directory(&path, real) {
                        return Some(WalkEvent::Error(err));
                    }
                } else if target.is_file() && self.yielded_files.insert(real.clone()) {
                    return Some(WalkEvent::File(CandidateFile {
                        path,
                        real_path: real,
                        via_symlink: true,
                    }));
                }
                continue;
            }

            if meta.is_dir() {
                if IgnoreFilter::is_skip_directory(
                    path.file_name().and_then(|n| n.to_str()).unwrap_or(""),
                ) {
                    return Some(WalkEvent::Ignored(path));
                }
                let real = match fs::canonicalize(&path) {
                    Ok(r) => r,
                    Err(_) => continue,
                };
                if let Some(err) = self.handle_directory(&path, real) {
                    return Some(WalkEvent::Error(err));
                }
                continue;
            }

            if meta.is_file() {
                let real = match fs::canonicalize(&path) {
                    Ok(r) => r,
                    Err(_) => continue,
                };
                if self.yielded_files.insert(real.clone()) {
                    return Some(WalkEvent::File(CandidateFile {
                        path,
                        real_path: real,
                        via_symlink: false,
                    }));
                }
            }
            // Sockets, fifos and other special files are not candidates.
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn collect_files(root: &Path, filter: &IgnoreFilter) -> Vec<CandidateFile> {
        Walker::new(root, filter)
            .unwrap()
            .filter_map(|ev| match ev {
                WalkEvent::File(f) => Some(f),
                _ => None,
            })
            .collect()
    }

    fn empty_filter() -> IgnoreFilter {
        IgnoreFilter::new(&[]).unwrap()
    }

    #[test]
    fn test_yields_regular_files_in_sorted_order() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("b.txt"), "b").unwrap();
        fs::write(tmp.path().join("a.txt"), "a").unwrap();
        fs::create_dir(tmp.path().join("sub")).unwrap();
        fs::write(tmp.path().join("sub/c.txt"), "c").unwrap();

        let filter = empty_filter();
        let files = collect_files(tmp.path(), &filter);
        let names: Vec<String> = files
            .iter()
            .map(|f| {
                f.path
                    .strip_prefix(fs::canonicalize(tmp.path()).unwrap())
                    .unwrap()
                    .display()
                    .to_string()
            })
            .collect();
        assert_eq!(names, vec!["a.txt", "b.txt", "sub/c.txt"]);
    }

    #[test]
    fn test_deterministic_order_across_runs() {
        let tmp = TempDir::new().unwrap();
        for name in ["z", "m", "a", "q"] {
            fs::write(tmp.path().join(name), name).unwrap();
        }
        let filter = empty_filter();
        let first: Vec<_> = collect_files(tmp.path(), &filter)
            .into_iter()
            .map(|f| f.path)
            .collect();
        let second: Vec<_> = collect_files(tmp.path(), &filter)
            .into_iter()
            .map(|f| f.path)
            .collect();
        assert_eq!(first, second);
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_outside_root_is_invisible() {
        let outside = TempDir::new().unwrap();
        fs::write(outside.path().join("secret.txt"), "API_KEY=outside").unwrap();

        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("inside.txt"), "hello").unwrap();
        std::os::unix::fs::symlink(outside.path(), tmp.path().join("escape")).unwrap();
        std::os::unix::fs::symlink(
            outside.path().join("secret.txt"),
            tmp.path().join("escape.txt"),
        )
        .unwrap();

        let filter = empty_filter();
        let files = collect_files(tmp.path(), &filter);
        assert_eq!(files.len(), 1);
        assert!(files[0].path.ends_with("inside.txt"));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_cycle_terminates() {
        let tmp = TempDir::new().unwrap();
        let a = tmp.path().join("a");
        let b = tmp.path().join("a/b");
        fs::create_dir_all(&b).unwrap();
        fs::write(a.join("file.txt"), "x").unwrap();
        // b -> a forms a cycle; the walk must visit each real directory once.
        std::os::unix::fs::symlink(&a, b.join("loop")).unwrap();
        // And a self-referencing link at the root.
        std::os::unix::fs::symlink(tmp.path(), tmp.path().join("self")).unwrap();

        let filter = empty_filter();
        let files = collect_files(tmp.path(), &filter);
        assert_eq!(files.len(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn test_broken_symlink_is_skipped_silently() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("ok.txt"), "x").unwrap();
        std::os::unix::fs::symlink(tmp.path().join("missing"), tmp.path().join("dangling"))
            .unwrap();

        let filter = empty_filter();
        let events: Vec<_> = Walker::new(tmp.path(), &filter).unwrap().collect();
        assert!(events
            .iter()
            .all(|ev| !matches!(ev, WalkEvent::Error(_))));
        let files: Vec<_> = events
            .into_iter()
            .filter(|ev| matches!(ev, WalkEvent::File(_)))
            .collect();
        assert_eq!(files.len(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinked_file_inside_root_yielded_once() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("real.txt"), "x").unwrap();
        std::os::unix::fs::symlink(tmp.path().join("real.txt"), tmp.path().join("alias.txt"))
            .unwrap();

        let filter = empty_filter();
        let files = collect_files(tmp.path(), &filter);
        // The canonical real path is yielded exactly once.
        assert_eq!(files.len(), 1);
    }

    #[test]
    fn test_ignored_entries_are_reported() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("keep.rs"), "x").unwrap();
        fs::write(tmp.path().join("skip.log"), "x").unwrap();

        let filter = IgnoreFilter::new(&["*.log".to_string()]).unwrap();
        let mut ignored = 0;
        let mut files = 0;
        for ev in Walker::new(tmp.path(), &filter).unwrap() {
            match ev {
                WalkEvent::Ignored(_) => ignored += 1,
                WalkEvent::File(_) => files += 1,
                WalkEvent::Error(_) => {}
            }
        }
        assert_eq!(ignored, 1);
        assert_eq!(files, 1);
    }

    #[test]
    fn test_skip_directories_are_pruned() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir(tmp.path().join("node_modules")).unwrap();
        fs::write(tmp.path().join("node_modules/dep.js"), "x").unwrap();
        fs::write(tmp.path().join("app.js"), "x").unwrap();

        let filter = empty_filter();
        let files = collect_files(tmp.path(), &filter);
        assert_eq!(files.len(), 1);
        assert!(files[0].path.ends_with("app.js"));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_to_skip_directory_is_pruned() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir(tmp.path().join("node_modules")).unwrap();
        fs::write(tmp.path().join("node_modules/dep.js"), "x").unwrap();
        fs::write(tmp.path().join("app.js"), "x").unwrap();
        // Neither a link into the skip directory nor a skip-named link may
        // reopen a pruned tree.
        std::os::unix::fs::symlink(tmp.path().join("node_modules"), tmp.path().join("deps"))
            .unwrap();
        fs::create_dir(tmp.path().join("real_deps")).unwrap();
        fs::write(tmp.path().join("real_deps/lib.js"), "x").unwrap();
        std::os::unix::fs::symlink(tmp.path().join("real_deps"), tmp.path().join(".git"))
            .unwrap();

        let filter = empty_filter();
        let files = collect_files(tmp.path(), &filter);
        let names: Vec<_> = files
            .iter()
            .filter_map(|f| f.path.file_name().and_then(|n| n.to_str()))
            .collect();
        assert!(names.contains(&"app.js"));
        assert!(!names.contains(&"dep.js"));
        // real_deps itself is still walked directly.
        assert!(names.contains(&"lib.js"));
    }

    #[test]
    fn test_missing_root_is_an_error() {
        let filter = empty_filter();
        assert!(Walker::new(Path::new("/definitely/not/here"), &filter).is_err());
    }
}

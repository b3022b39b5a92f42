//! Ignore filtering for the traversal engine.
//!
//! Decides, per path, whether an entry should be skipped before any stat or
//! read is attempted. Combines glob-style rules (config + CLI supplied) with a
//! built-in skip list of build/cache directories.

use std::path::Path;

use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};

/// Build/cache directories that are never worth scanning.
const SKIP_DIRECTORIES: &[&str] = &[
    // Rust
    "target",
    // Node.js / JavaScript
    "node_modules",
    "dist",
    "build",
    ".next",
    ".nuxt",
    // Python
    "__pycache__",
    ".pytest_cache",
    "venv",
    ".venv",
    // Go
    "vendor",
    // Our own result cache
    ".secretscan",
    // Generic
    "cache",
    ".cache",
    "tmp",
    ".tmp",
    // Version control
    ".git",
    ".svn",
    ".hg",
    // IDEs
    ".vscode",
    ".idea",
    // Coverage
    "coverage",
    ".nyc_output",
];

/// Glob-based ignore filter consulted by the traversal engine.
#[derive(Debug)]
pub struct IgnoreFilter {
    globs: GlobSet,
}

impl IgnoreFilter {
    /// Build a filter from ignore patterns. Directory patterns like `target/`
    /// are expanded to `target/**` so everything underneath is covered.
    pub fn new(patterns: &[String]) -> Result<Self> {
        let mut builder = GlobSetBuilder::new();
        for pattern in patterns {
            let processed = if pattern.ends_with('/') {
                format!("{}**", pattern)
            } else {
                pattern.clone()
            };
            let glob = Glob::new(&processed)
                .with_context(|| format!("invalid ignore pattern: {}", pattern))?;
            builder.add(glob);
        }
        let globs = builder.build().context("failed to build ignore globset")?;
        Ok(Self { globs })
    }

    /// Whether a path (relative to the scan root) matches an ignore rule.
    /// Consulted before any I/O on the path.
    pub fn should_ignore(&self, relative: &Path) -> bool {
        self.globs.is_match(relative)
    }

    /// Whether a directory name is on the built-in skip list.
    pub fn is_skip_directory(name: &str) -> bool {
        SKIP_DIRECTORIES.contains(&name)
    }
}

//! # secretscan - Fast Static Secret Detection
//!
//! Scans source trees for hard-coded credentials with a symlink-safe
//! traversal engine, a ReDoS-gated rule validator, and a fingerprint-keyed
//! result cache.
//!
//! ## Features
//!
//! - **Containment-safe traversal**: symlinks never lead the scan outside the
//!   root, and link cycles always terminate
//! - **Validated rule catalog**: every pattern is health-checked before it is
//!   trusted; backtracking-unsafe patterns are excluded up front
//! - **Incremental rescans**: unchanged files are answered from a persistent
//!   result cache keyed by size and modification time
//! - **Parallel matching**: large trees are matched across a rayon pool sized
//!   to the machine and the workload
//!
//! ## Quick Start
//!
//! ```bash
//! # Install secretscan
//! cargo install secretscan
//!
//! # Scan the current directory
//! secretscan
//!
//! # Machine-readable output for CI
//! secretscan --format json .
//! ```

pub mod cli;
pub mod config;
pub mod parallel;
pub mod scanner;

pub use cli::{Cli, Output};
pub use config::ScanConfig;
pub use scanner::{Finding, ScanOptions, ScanSummary, Scanner, Severity};

/// Result type alias for secretscan operations
pub type Result<T> = anyhow::Result<T>;

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const PKG_NAME: &str = env!("CARGO_PKG_NAME");
pub const PKG_DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single reported secret-detection match.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    /// Stable identifier for this finding
    pub id: Uuid,
    /// Identifier of the rule that produced the match
    pub rule_id: String,
    /// Human-readable rule name
    pub rule_name: String,
    /// Severity inherited from the rule
    pub severity: Severity,
    /// File the match was found in
    pub file_path: String,
    /// 1-based line number
    pub line: usize,
    /// 1-based column of the match start
    pub column: usize,
    /// The matched substring
    pub matched_text: String,
    /// Short snippet of the surrounding line
    pub context: String,
    /// Confidence score in [0, 1]
    pub confidence: f64,
}

/// Severity levels for findings.
///
/// We keep this simple - secrets are either critical security issues or
/// informational warnings. There's no middle ground with secrets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    /// Confirmed secrets that pose immediate security risk
    Critical,
    /// Patterns that might be false positives but worth checking
    Info,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Critical => write!(f, "CRITICAL"),
            Severity::Info => write!(f, "INFO"),
        }
    }
}

/// Convert a severity string to the enum
pub fn parse_severity(severity: &str) -> Severity {
    match severity.to_lowercase().as_str() {
        "info" => Severity::Info,
        // Default to critical - secrets are serious
        _ => Severity::Critical,
    }
}

/// A candidate produced by the traversal engine: a regular file reachable from
/// the scan root, deduplicated by canonical real path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateFile {
    /// Path as encountered during the walk (may go through symlinked directories)
    pub path: PathBuf,
    /// Canonical real path, used for dedup and as the cache key
    pub real_path: PathBuf,
    /// Whether the entry itself was a symbolic link
    pub via_symlink: bool,
}

/// A recoverable per-file error recorded during a scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanError {
    pub path: String,
    pub message: String,
}

impl ScanError {
    pub fn new(path: &std::path::Path, message: impl Into<String>) -> Self {
        Self {
            path: path.display().to_string(),
            message: message.into(),
        }
    }
}

/// Statistics from a scanning operation
#[derive(Debug, Default, Clone, Serialize)]
pub struct ScanStats {
    pub files_scanned: usize,
    pub files_skipped: usize,
    pub files_ignored: usize,
    pub total_findings: usize,
    pub scan_duration_ms: u64,
}

/// Result of a scanning operation
#[derive(Debug, Serialize)]
pub struct ScanSummary {
    pub findings: Vec<Finding>,
    pub errors: Vec<ScanError>,
    pub stats: ScanStats,
}

/// Processing mode for a scan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanMode {
    /// Pick sequential or parallel based on file count
    #[default]
    Auto,
    /// Always process files in parallel
    Parallel,
    /// Always process files one at a time
    Sequential,
}

/// Rendering format for scan results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Styled human-readable report
    #[default]
    Text,
    /// Machine-readable JSON document
    Json,
}

/// Caller-supplied options for one scan invocation.
#[derive(Debug, Clone, Default)]
pub struct ScanOptions {
    /// Additional glob patterns to ignore, on top of config and built-ins
    pub ignore_patterns: Vec<String>,
    /// Disable the result cache entirely
    pub no_cache: bool,
    /// Processing mode override
    pub mode: Option<ScanMode>,
    /// Cooperative cancellation flag, checked between files
    pub cancel: Option<Arc<AtomicBool>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_severity() {
        assert_eq!(parse_severity("critical"), Severity::Critical);
        assert_eq!(parse_severity("Info"), Severity::Info);
        // Unknown strings default to critical
        assert_eq!(parse_severity("whatever"), Severity::Critical);
    }

    #[test]
    fn test_severity_display() {
        assert_eq!(Severity::Critical.to_string(), "CRITICAL");
        assert_eq!(Severity::Info.to_string(), "INFO");
    }
}

pub mod cache;
pub mod classify;
pub mod core;
pub mod filter;
pub mod matcher;
pub mod patterns;
pub mod types;
pub mod validator;
pub mod walker;

// Re-export main types for easier access
pub use cache::{CacheStats, ResultCache};
pub use classify::{ContentClassifier, ContentVerdict, DefaultClassifier};
pub use core::Scanner;
pub use filter::IgnoreFilter;
pub use matcher::MatchEngine;
pub use patterns::{default_rules, RuleDefinition, SecretPattern};
pub use types::{
    CandidateFile, Finding, OutputFormat, ScanError, ScanMode, ScanOptions, ScanStats,
    ScanSummary, Severity,
};
pub use validator::{BatchReport, PatternValidator, ValidationResult};
pub use walker::{WalkEvent, Walker};

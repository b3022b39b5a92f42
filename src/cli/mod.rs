//! Command-line interface for secretscan.
//!
//! Argument parsing with clap plus the command body: load configuration,
//! build the scanner, run it over the target, and render findings as styled
//! text or JSON. The process exit code is the scan verdict.

use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;

use crate::config::ScanConfig;
use crate::scanner::{default_rules, OutputFormat, ScanMode, ScanOptions, ScanSummary, Scanner};

mod output;

pub use output::Output;

/// Exit code when the scan found at least one secret.
pub const EXIT_FINDINGS: i32 = 1;

/// secretscan - fast static secret detection for source trees
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Directory or file to scan
    #[arg(default_value = ".")]
    pub path: PathBuf,

    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<String>,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// Enable quiet output (minimal)
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    /// Disable the result cache for this run
    #[arg(long)]
    pub no_cache: bool,

    /// Additional glob patterns to ignore (comma-separated or repeated)
    #[arg(short, long, value_delimiter = ',')]
    pub ignore: Vec<String>,

    /// Processing mode override
    #[arg(long, value_enum)]
    pub mode: Option<ScanMode>,

    /// Print scan and cache statistics after the results
    #[arg(long)]
    pub stats: bool,

    /// List the built-in detection rules and exit
    #[arg(long)]
    pub list_rules: bool,
}

impl Cli {
    /// Execute the CLI command, returning the process exit code.
    pub fn run(self) -> Result<i32> {
        let output = Output::new(self.verbose, self.quiet);

        if self.list_rules {
            list_rules(&output);
            return Ok(0);
        }

        let config = ScanConfig::load_with_custom_config(self.config.as_deref())?;
        let options = ScanOptions {
            ignore_patterns: self.ignore.clone(),
            no_cache: self.no_cache,
            mode: self.mode,
            cancel: Some(Arc::new(AtomicBool::new(false))),
        };

        let scanner = Scanner::new(&config, &options)?;
        let report = scanner.validation_report();
        if report.invalid > 0 {
            output.warning(&format!(
                "{} rule(s) failed validation and were excluded",
                report.invalid
            ));
        }
        output.verbose(&format!(
            "{} active rules, scanning {}",
            scanner.engine().pattern_count(),
            self.path.display()
        ));

        let summary = scanner.scan(&self.path)?;

        match self.format {
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            }
            OutputFormat::Text => {
                render_text(&summary, &output);
                if self.stats {
                    render_stats(&scanner, &summary, &output);
                }
            }
        }

        if summary.findings.is_empty() {
            Ok(0)
        } else {
            Ok(EXIT_FINDINGS)
        }
    }
}

fn list_rules(output: &Output) {
    output.header("Built-in detection rules");
    for rule in default_rules() {
        output.list_item(&format!(
            "{:<22} [{}] {}",
            rule.id,
            rule.severity.to_uppercase(),
            rule.description
        ));
    }
}

fn render_text(summary: &ScanSummary, output: &Output) {
    if summary.findings.is_empty() {
        output.success("No secrets found");
    } else {
        output.warning(&format!("Found {} potential secret(s)", summary.findings.len()));
        output.blank_line();
        for (i, finding) in summary.findings.iter().enumerate() {
            output.error(&format!(
                "{}. [{}] {} ({:.0}% confidence)",
                i + 1,
                finding.severity,
                finding.rule_name,
                finding.confidence * 100.0
            ));
            output.file_location(&finding.file_path, finding.line, finding.column);
            output.indent(&format!("Context: {}", finding.context));
            output.blank_line();
        }
        output.separator();
        output.error("Scan completed with findings");
        output.info("Review the findings above; rotate any real credentials");
    }

    if !summary.errors.is_empty() {
        output.blank_line();
        output.warning(&format!(
            "{} file(s) could not be scanned",
            summary.errors.len()
        ));
        for err in &summary.errors {
            output.indent(&format!("{}: {}", err.path, err.message));
        }
    }
}

fn render_stats(scanner: &Scanner, summary: &ScanSummary, output: &Output) {
    output.blank_line();
    output.step("Scan statistics");
    output.summary_stats("files scanned", &summary.stats.files_scanned.to_string());
    output.summary_stats("files skipped", &summary.stats.files_skipped.to_string());
    output.summary_stats("files ignored", &summary.stats.files_ignored.to_string());
    output.summary_stats("findings", &summary.stats.total_findings.to_string());
    output.summary_stats(
        "duration",
        &format!("{}ms", summary.stats.scan_duration_ms),
    );
    if let Some(cache) = scanner.cache_stats() {
        output.step("Cache statistics");
        output.summary_stats("hits", &cache.hits.to_string());
        output.summary_stats("misses", &cache.misses.to_string());
        output.summary_stats("hit rate", &format!("{:.2}%", cache.hit_rate));
        output.summary_stats("live entries", &cache.live_entries.to_string());
    }
}

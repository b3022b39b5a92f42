//! Scan orchestration.
//!
//! Composes the traversal engine, ignore filter, result cache, and matching
//! engine into one scan: pull the next candidate, filter it, probe the cache,
//! match on a miss, store the result, and accumulate findings and per-file
//! errors without ever aborting the scan. The only early stop is the
//! caller-supplied cancellation flag, checked between files.

use std::fs;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::config::ScanConfig;
use crate::parallel;

use super::cache::{CacheStats, ResultCache};
use super::classify::{ContentClassifier, DefaultClassifier};
use super::filter::IgnoreFilter;
use super::matcher::MatchEngine;
use super::patterns::default_rules;
use super::types::{
    CandidateFile, Finding, ScanError, ScanMode, ScanOptions, ScanStats, ScanSummary,
};
use super::validator::{BatchReport, PatternValidator};
use super::walker::{WalkEvent, Walker};

/// Outcome of processing one candidate file.
enum FileOutcome {
    Findings(Vec<Finding>),
    Skipped,
    Failed(ScanError),
}

/// The scan orchestrator. Owns the validated rule set, the ignore filter,
/// the classifier, and (optionally) the result cache; the cache is
/// constructed here and passed explicitly, never a process-wide global.
pub struct Scanner {
    engine: MatchEngine,
    filter: IgnoreFilter,
    classifier: Box<dyn ContentClassifier>,
    cache: Option<Mutex<ResultCache>>,
    validation: BatchReport,
    mode: ScanMode,
    max_threads: usize,
    thread_percentage: u8,
    min_files_for_parallel: usize,
    cancel: Arc<AtomicBool>,
}

impl Scanner {
    /// Build a scanner from configuration and per-invocation options. Rules
    /// (built-in catalog plus config-supplied) are validated once here;
    /// invalid rules are excluded from the whole scan and reported in the
    /// validation report.
    pub fn new(config: &ScanConfig, options: &ScanOptions) -> Result<Self> {
        let mut defs = default_rules();
        defs.extend(config.rules.iter().cloned());

        let validator =
            PatternValidator::new(Duration::from_millis(config.validator.probe_timeout_ms));
        let (patterns, validation) = validator.validate_batch(&defs);
        info!(
            valid = validation.valid,
            invalid = validation.invalid,
            with_warnings = validation.with_warnings,
            "rule catalog validated"
        );
        if patterns.is_empty() {
            // Almost certainly an upstream configuration defect; the scan
            // still runs and finds nothing.
            warn!("no valid secret patterns loaded - the scan cannot find anything");
        }

        let mut ignore = config.scanner.ignore.clone();
        ignore.extend(options.ignore_patterns.iter().cloned());
        let filter = IgnoreFilter::new(&ignore)?;

        let cache_enabled = config.cache.enabled && !options.no_cache;
        let cache = cache_enabled.then(|| {
            let store = PathBuf::from(&config.cache.directory).join("cache.json");
            Mutex::new(ResultCache::new(
                store,
                Duration::from_secs(config.cache.retention_hours * 3600),
            ))
        });

        let classifier = Box::new(DefaultClassifier {
            max_in_memory_bytes: config.scanner.max_in_memory_file_mb * 1024 * 1024,
        });

        Ok(Self {
            engine: MatchEngine::new(patterns),
            filter,
            classifier,
            cache,
            validation,
            mode: options.mode.unwrap_or(config.scanner.mode),
            max_threads: config.scanner.max_threads,
            thread_percentage: config.scanner.thread_percentage,
            min_files_for_parallel: config.scanner.min_files_for_parallel,
            cancel: options
                .cancel
                .clone()
                .unwrap_or_else(|| Arc::new(AtomicBool::new(false))),
        })
    }

    /// Substitute the content classifier (injected capability).
    pub fn with_classifier(mut self, classifier: Box<dyn ContentClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    /// Load-time validation report for the rule catalog.
    pub fn validation_report(&self) -> &BatchReport {
        &self.validation
    }

    /// The active (validated) rule set.
    pub fn engine(&self) -> &MatchEngine {
        &self.engine
    }

    /// Flag that cancels the scan between files when set.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        self.cancel.clone()
    }

    /// Cache statistics, when the cache is enabled.
    pub fn cache_stats(&self) -> Option<CacheStats> {
        self.cache
            .as_ref()
            .map(|cache| cache.lock().expect("cache lock poisoned").stats())
    }

    /// Scan the tree rooted at `root` (or a single file).
    pub fn scan(&self, root: &Path) -> Result<ScanSummary> {
        let start = Instant::now();
        let root_meta = fs::metadata(root)
            .with_context(|| format!("cannot stat scan target: {}", root.display()))?;

        let mut summary = if root_meta.is_file() {
            self.scan_single_root_file(root)?
        } else {
            self.scan_tree(root)?
        };

        if let Some(cache) = &self.cache {
            let mut cache = cache.lock().expect("cache lock poisoned");
            if let Err(e) = cache.save() {
                // Cache persistence is best-effort and never fails the scan.
                warn!(error = %e, "failed to persist result cache");
            }
        }

        summary.stats.total_findings = summary.findings.len();
        summary.stats.scan_duration_ms = start.elapsed().as_millis() as u64;
        Ok(summary)
    }

    fn scan_single_root_file(&self, path: &Path) -> Result<ScanSummary> {
        let real = fs::canonicalize(path)
            .with_context(|| format!("cannot resolve scan target: {}", path.display()))?;
        let candidate = CandidateFile {
            path: path.to_path_buf(),
            real_path: real,
            via_symlink: false,
        };
        let mut summary = ScanSummary {
            findings: Vec::new(),
            errors: Vec::new(),
            stats: ScanStats::default(),
        };
        self.absorb(self.process_candidate(&candidate), &mut summary);
        Ok(summary)
    }

    fn scan_tree(&self, root: &Path) -> Result<ScanSummary> {
        let mut summary = ScanSummary {
            findings: Vec::new(),
            errors: Vec::new(),
            stats: ScanStats::default(),
        };

        match self.mode {
            ScanMode::Sequential => self.run_sequential(root, &mut summary)?,
            ScanMode::Parallel => self.run_parallel(root, &mut summary)?,
            ScanMode::Auto => {
                // The traversal is lazy either way; auto mode collects first
                // so the file count can pick the strategy.
                let candidates = self.collect_candidates(root, &mut summary)?;
                if candidates.len() >= self.min_files_for_parallel {
                    self.execute_parallel(candidates, &mut summary);
                } else {
                    self.execute_sequential(candidates, &mut summary);
                }
            }
        }
        Ok(summary)
    }

    /// Streaming sequential scan: one candidate is fully processed before the
    /// next is requested, with the cancellation flag checked in between.
    fn run_sequential(&self, root: &Path, summary: &mut ScanSummary) -> Result<()> {
        let walker = Walker::new(root, &self.filter)?;
        for event in walker {
            if self.cancel.load(Ordering::Relaxed) {
                debug!("scan cancelled");
                break;
            }
            match event {
                WalkEvent::File(candidate) => {
                    self.absorb(self.process_candidate(&candidate), summary)
                }
                WalkEvent::Ignored(_) => summary.stats.files_ignored += 1,
                WalkEvent::Error(err) => summary.errors.push(err),
            }
        }
        Ok(())
    }

    fn run_parallel(&self, root: &Path, summary: &mut ScanSummary) -> Result<()> {
        let candidates = self.collect_candidates(root, summary)?;
        self.execute_parallel(candidates, summary);
        Ok(())
    }

    /// Drain the walker up front. The visited-directory set stays owned by
    /// the single traversal; only matching is parallelized.
    fn collect_candidates(
        &self,
        root: &Path,
        summary: &mut ScanSummary,
    ) -> Result<Vec<CandidateFile>> {
        let walker = Walker::new(root, &self.filter)?;
        let mut candidates = Vec::new();
        for event in walker {
            if self.cancel.load(Ordering::Relaxed) {
                debug!("scan cancelled during traversal");
                break;
            }
            match event {
                WalkEvent::File(candidate) => candidates.push(candidate),
                WalkEvent::Ignored(_) => summary.stats.files_ignored += 1,
                WalkEvent::Error(err) => summary.errors.push(err),
            }
        }
        Ok(candidates)
    }

    fn execute_sequential(&self, candidates: Vec<CandidateFile>, summary: &mut ScanSummary) {
        for candidate in candidates {
            if self.cancel.load(Ordering::Relaxed) {
                break;
            }
            self.absorb(self.process_candidate(&candidate), summary);
        }
    }

    fn execute_parallel(&self, candidates: Vec<CandidateFile>, summary: &mut ScanSummary) {
        if candidates.is_empty() {
            return;
        }
        let max_workers =
            parallel::calculate_optimal_workers(self.max_threads, self.thread_percentage);
        let workers = parallel::adapt_workers_for_file_count(candidates.len(), max_workers);
        debug!(files = candidates.len(), workers, "parallel scan");

        let pool = match rayon::ThreadPoolBuilder::new().num_threads(workers).build() {
            Ok(pool) => pool,
            Err(e) => {
                // Thread pool creation failing is rare; degrade to sequential.
                warn!(error = %e, "thread pool unavailable, falling back to sequential");
                self.execute_sequential(candidates, summary);
                return;
            }
        };

        // Candidates unprocessed due to cancellation yield no outcome; they
        // are neither scanned nor skipped.
        let outcomes: Vec<FileOutcome> = pool.install(|| {
            candidates
                .par_iter()
                .filter_map(|candidate| {
                    if self.cancel.load(Ordering::Relaxed) {
                        None
                    } else {
                        Some(self.process_candidate(candidate))
                    }
                })
                .collect()
        });
        for outcome in outcomes {
            self.absorb(outcome, summary);
        }
    }

    fn absorb(&self, outcome: FileOutcome, summary: &mut ScanSummary) {
        match outcome {
            FileOutcome::Findings(findings) => {
                summary.stats.files_scanned += 1;
                summary.findings.extend(findings);
            }
            FileOutcome::Skipped => summary.stats.files_skipped += 1,
            FileOutcome::Failed(err) => {
                summary.stats.files_skipped += 1;
                summary.errors.push(err);
            }
        }
    }

    /// Process one admitted candidate: cache probe, classification, matching,
    /// cache store. All failure modes are per-file and recoverable.
    fn process_candidate(&self, candidate: &CandidateFile) -> FileOutcome {
        if let Some(cache) = &self.cache {
            let mut cache = cache.lock().expect("cache lock poisoned");
            if let Some(findings) = cache.get(&candidate.real_path) {
                debug!(file = %candidate.path.display(), "cache hit");
                return FileOutcome::Findings(findings);
            }
        }

        let verdict = match self.classifier.classify(&candidate.path) {
            Ok(verdict) => verdict,
            Err(e) => {
                return FileOutcome::Failed(ScanError::new(
                    &candidate.path,
                    format!("cannot classify: {}", e),
                ));
            }
        };
        if verdict.is_binary {
            debug!(file = %candidate.path.display(), "skipping binary file");
            return FileOutcome::Skipped;
        }

        let findings = if verdict.should_stream {
            let file = match fs::File::open(&candidate.path) {
                Ok(f) => f,
                Err(e) => {
                    return FileOutcome::Failed(ScanError::new(
                        &candidate.path,
                        format!("cannot open: {}", e),
                    ));
                }
            };
            match self.engine.scan_reader(&candidate.path, BufReader::new(file)) {
                Ok(findings) => findings,
                Err(e) => {
                    return FileOutcome::Failed(ScanError::new(
                        &candidate.path,
                        format!("cannot read: {}", e),
                    ));
                }
            }
        } else {
            match fs::read_to_string(&candidate.path) {
                Ok(content) => self.engine.scan_content(&candidate.path, &content),
                Err(e) => {
                    return FileOutcome::Failed(ScanError::new(
                        &candidate.path,
                        format!("cannot read: {}", e),
                    ));
                }
            }
        };

        if let Some(cache) = &self.cache {
            let mut cache = cache.lock().expect("cache lock poisoned");
            cache.set(&candidate.real_path, findings.clone());
        }

        FileOutcome::Findings(findings)
    }
}

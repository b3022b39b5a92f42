//! Pattern validation.
//!
//! Every externally supplied rule is compiled and health-checked here before
//! it can join the active rule set. The checks are, in order: compilation
//! (case-insensitive), compile-latency budget, catastrophic-backtracking
//! gating, structural warn-only heuristics, and optional per-rule test cases.
//!
//! The matching engine (`regex`) runs in linear time, so adversarial probes
//! alone cannot observe catastrophic backtracking. The hard gate therefore
//! combines structural detection of the catastrophic constructs (an unbounded
//! quantifier over a group that itself contains an unbounded quantifier, or an
//! unbounded-quantified group with overlapping alternation branches) with the
//! probe battery, which remains a real wall-clock check and keeps externally
//! supplied patterns portable to backtracking engines.

use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use regex::{Regex, RegexBuilder};
use tracing::{debug, warn};

use super::patterns::{PatternTestCase, RuleDefinition, SecretPattern};

/// Wall-clock threshold above which a compile or probe is considered slow.
const SLOW_THRESHOLD: Duration = Duration::from_millis(100);

/// Diagnosis attached to a rule rejected by the backtracking gate.
#[derive(Debug, Clone)]
pub struct BacktrackingDiagnosis {
    /// What triggered the gate
    pub reason: String,
    /// Probe input that triggered it, or the offending construct
    pub trigger: String,
    /// Wall-clock time of the triggering probe
    pub execution_time: Duration,
    /// Whether the triggering probe exceeded its timeout outright
    pub timed_out: bool,
}

/// Outcome of one rule test case.
#[derive(Debug, Clone)]
pub struct TestCaseResult {
    pub input: String,
    pub passed: bool,
    pub message: Option<String>,
}

/// Per-rule validation outcome, produced once at load time.
#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub compile_time: Duration,
    pub backtracking: Option<BacktrackingDiagnosis>,
    pub test_results: Vec<TestCaseResult>,
    /// The compiled pattern, present when compilation succeeded
    pub compiled: Option<Regex>,
}

impl ValidationResult {
    fn invalid(error: String) -> Self {
        Self {
            valid: false,
            errors: vec![error],
            warnings: Vec::new(),
            compile_time: Duration::ZERO,
            backtracking: None,
            test_results: Vec::new(),
            compiled: None,
        }
    }
}

/// Aggregated outcome of validating a whole catalog.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub total: usize,
    pub valid: usize,
    pub invalid: usize,
    pub with_warnings: usize,
    pub results: Vec<(String, ValidationResult)>,
}

/// Health-checks rule definitions before they are trusted.
#[derive(Debug, Clone)]
pub struct PatternValidator {
    probe_timeout: Duration,
}

impl Default for PatternValidator {
    fn default() -> Self {
        Self {
            probe_timeout: Duration::from_millis(1000),
        }
    }
}

impl PatternValidator {
    pub fn new(probe_timeout: Duration) -> Self {
        Self { probe_timeout }
    }

    /// Validate a single rule definition.
    pub fn validate(&self, def: &RuleDefinition) -> ValidationResult {
        let compile_start = Instant::now();
        let regex = match RegexBuilder::new(&def.pattern)
            .case_insensitive(true)
            .build()
        {
            Ok(re) => re,
            Err(e) => {
                return ValidationResult::invalid(format!("compilation failed: {}", e));
            }
        };
        let compile_time = compile_start.elapsed();

        let mut result = ValidationResult {
            valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
            compile_time,
            backtracking: None,
            test_results: Vec::new(),
            compiled: Some(regex.clone()),
        };

        if compile_time > SLOW_THRESHOLD {
            result.warnings.push(format!(
                "slow compile: {}ms",
                compile_time.as_millis()
            ));
        }

        // Hard gate: catastrophic constructs, then the adversarial probes.
        if let Some(construct) = detect_catastrophic_construct(&def.pattern) {
            result.valid = false;
            result
                .errors
                .push(format!("backtracking-unsafe pattern: {}", construct));
            result.backtracking = Some(BacktrackingDiagnosis {
                reason: construct.clone(),
                trigger: construct,
                execution_time: Duration::ZERO,
                timed_out: false,
            });
        } else if let Some(diagnosis) = self.run_probe_battery(&regex) {
            result.valid = false;
            result.errors.push(format!(
                "backtracking-unsafe pattern: probe '{}' took {}ms{}",
                truncate(&diagnosis.trigger, 32),
                diagnosis.execution_time.as_millis(),
                if diagnosis.timed_out { " (timed out)" } else { "" }
            ));
            result.backtracking = Some(diagnosis);
        }

        result.warnings.extend(structural_warnings(def));

        for case in &def.test_cases {
            let outcome = run_test_case(&regex, case);
            if !outcome.passed {
                result.valid = false;
                result.errors.push(format!(
                    "test case failed for input '{}': {}",
                    truncate(&case.input, 48),
                    outcome.message.as_deref().unwrap_or("unexpected outcome")
                ));
            }
            result.test_results.push(outcome);
        }

        result
    }

    /// Validate a catalog, splitting it into the active pattern set and a
    /// report. Never raises; disabled and invalid rules simply do not make it
    /// into the active set.
    pub fn validate_batch(
        &self,
        defs: &[RuleDefinition],
    ) -> (Vec<SecretPattern>, BatchReport) {
        let mut report = BatchReport::default();
        let mut active = Vec::new();

        for def in defs.iter().filter(|d| d.enabled) {
            let result = self.validate(def);
            report.total += 1;
            if result.valid {
                report.valid += 1;
                if let Some(regex) = &result.compiled {
                    active.push(SecretPattern::from_definition(def, regex.clone()));
                }
            } else {
                report.invalid += 1;
                warn!(
                    rule = %def.id,
                    errors = ?result.errors,
                    "rule failed validation and is excluded from the scan"
                );
            }
            if !result.warnings.is_empty() {
                report.with_warnings += 1;
                debug!(rule = %def.id, warnings = ?result.warnings, "rule validated with warnings");
            }
            report.results.push((def.id.clone(), result));
        }

        (active, report)
    }

    /// Run the adversarial probe battery, returning a diagnosis for the first
    /// probe that times out or exceeds the slow threshold.
    fn run_probe_battery(&self, regex: &Regex) -> Option<BacktrackingDiagnosis> {
        for probe in probe_battery() {
            let (elapsed, timed_out) = self.run_probe(regex, &probe);
            if timed_out || elapsed > SLOW_THRESHOLD {
                return Some(BacktrackingDiagnosis {
                    reason: "adversarial probe exceeded wall-clock budget".to_string(),
                    trigger: probe,
                    execution_time: elapsed,
                    timed_out,
                });
            }
        }
        None
    }

    /// Execute one probe under the configured timeout. The worker thread is
    /// detached on timeout; with a linear-time engine it finishes shortly
    /// after, so no cleanup is needed.
    fn run_probe(&self, regex: &Regex, input: &str) -> (Duration, bool) {
        let re = regex.clone();
        let text = input.to_string();
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let start = Instant::now();
            let _ = re.find(&text);
            let _ = tx.send(start.elapsed());
        });
        match rx.recv_timeout(self.probe_timeout) {
            Ok(elapsed) => (elapsed, false),
            Err(_) => (self.probe_timeout, true),
        }
    }
}

/// Inputs engineered to defeat nested-quantifier and alternation constructs:
/// long homogeneous runs terminated by a character that forces a backtracking
/// engine to revisit every partition of the run.
fn probe_battery() -> Vec<String> {
    let mut probes = Vec::new();
    for unit in ["a", "x", "0", " ", "ab", "a="] {
        probes.push(format!("{}!", unit.repeat(64)));
        probes.push(format!("{}!", unit.repeat(512)));
    }
    probes.push(format!("{}!", "a".repeat(4096)));
    probes
}

fn run_test_case(regex: &Regex, case: &PatternTestCase) -> TestCaseResult {
    let found = regex.find(&case.input);
    let (passed, message) = match (case.should_match, found) {
        (true, Some(m)) => match &case.expected {
            Some(expected) if m.as_str() != expected => (
                false,
                Some(format!("matched '{}', expected '{}'", m.as_str(), expected)),
            ),
            _ => (true, None),
        },
        (true, None) => (false, Some("expected a match, found none".to_string())),
        (false, Some(m)) => (
            false,
            Some(format!("expected no match, matched '{}'", m.as_str())),
        ),
        (false, None) => (true, None),
    };
    TestCaseResult {
        input: case.input.clone(),
        passed,
        message,
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        s.chars().take(max).collect::<String>() + "…"
    }
}

/// Detect constructs that are catastrophic in backtracking engines: an
/// unbounded quantifier applied to a group whose body contains an unbounded
/// quantifier, or an unbounded-quantified group with overlapping alternation
/// branches. Bounded repetitions like `{1,4}` never trigger.
fn detect_catastrophic_construct(pattern: &str) -> Option<String> {
    let chars: Vec<char> = pattern.chars().collect();
    let mut stack: Vec<String> = vec![String::new()];
    let mut in_class = false;
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            '\\' => {
                if let Some(top) = stack.last_mut() {
                    top.push('\\');
                    if let Some(&next) = chars.get(i + 1) {
                        top.push(next);
                    }
                }
                i += 2;
                continue;
            }
            '[' if !in_class => {
                in_class = true;
                push_char(&mut stack, c);
            }
            ']' if in_class => {
                in_class = false;
                push_char(&mut stack, c);
            }
            '(' if !in_class => stack.push(String::new()),
            ')' if !in_class => {
                let body = stack.pop().unwrap_or_default();
                if let Some(top) = stack.last_mut() {
                    top.push('(');
                    top.push_str(&body);
                    top.push(')');
                }
                if unbounded_quantifier_at(&chars, i + 1) {
                    let inner = strip_group_prefix(&body);
                    if contains_unbounded_quantifier(inner) {
                        return Some(format!(
                            "unbounded quantifier over group '({})' which itself repeats unboundedly",
                            inner
                        ));
                    }
                    if let Some(branch) = overlapping_branches(inner) {
                        return Some(format!(
                            "unbounded quantifier over alternation with overlapping branch '{}'",
                            branch
                        ));
                    }
                }
            }
            _ => push_char(&mut stack, c),
        }
        i += 1;
    }
    None
}

fn push_char(stack: &mut [String], c: char) {
    if let Some(top) = stack.last_mut() {
        top.push(c);
    }
}

/// Whether the characters at `idx` form an unbounded quantifier (`*`, `+`, or
/// `{n,}` with no upper bound).
fn unbounded_quantifier_at(chars: &[char], idx: usize) -> bool {
    match chars.get(idx) {
        Some('*') | Some('+') => true,
        Some('{') => {
            let mut body = String::new();
            let mut j = idx + 1;
            while let Some(&c) = chars.get(j) {
                if c == '}' {
                    break;
                }
                body.push(c);
                j += 1;
            }
            match body.split_once(',') {
                Some((_, upper)) => upper.trim().is_empty(),
                None => false,
            }
        }
        _ => false,
    }
}

/// Whether a group body contains an unbounded quantifier outside character
/// classes and escapes. Nested groups count; repetition anywhere inside the
/// repeated group is what makes the outer repetition ambiguous.
fn contains_unbounded_quantifier(body: &str) -> bool {
    let chars: Vec<char> = body.chars().collect();
    let mut in_class = false;
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '\\' => {
                i += 2;
                continue;
            }
            '[' if !in_class => in_class = true,
            ']' if in_class => in_class = false,
            '*' | '+' if !in_class => return true,
            '{' if !in_class => {
                if unbounded_quantifier_at(&chars, i) {
                    return true;
                }
            }
            _ => {}
        }
        i += 1;
    }
    false
}

/// Strip non-capturing and named-group prefixes (`?:`, `?i:`, `?P<name>`) so
/// the body analysis sees only the matched expression.
fn strip_group_prefix(body: &str) -> &str {
    if let Some(rest) = body.strip_prefix('?') {
        if let Some(named) = rest.strip_prefix("P<") {
            return named.split_once('>').map_or(named, |(_, tail)| tail);
        }
        if let Some(named) = rest.strip_prefix('<') {
            return named.split_once('>').map_or(named, |(_, tail)| tail);
        }
        if let Some(idx) = rest.find(':') {
            return &rest[idx + 1..];
        }
    }
    body
}

/// Split a group body on top-level `|` and report a branch that overlaps with
/// another (equal, or a literal prefix of it). Under an unbounded quantifier
/// such overlap makes match partitioning ambiguous.
fn overlapping_branches(body: &str) -> Option<String> {
    let mut branches: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    let mut in_class = false;
    let chars: Vec<char> = body.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            '\\' => {
                current.push('\\');
                if let Some(&next) = chars.get(i + 1) {
                    current.push(next);
                }
                i += 2;
                continue;
            }
            '[' if !in_class => {
                in_class = true;
                current.push(c);
            }
            ']' if in_class => {
                in_class = false;
                current.push(c);
            }
            '(' if !in_class => {
                depth += 1;
                current.push(c);
            }
            ')' if !in_class => {
                depth = depth.saturating_sub(1);
                current.push(c);
            }
            '|' if !in_class && depth == 0 => {
                branches.push(std::mem::take(&mut current));
            }
            _ => current.push(c),
        }
        i += 1;
    }
    branches.push(current);
    if branches.len() < 2 {
        return None;
    }
    for (i, a) in branches.iter().enumerate() {
        for b in branches.iter().skip(i + 1) {
            if a == b || a.starts_with(b.as_str()) || b.starts_with(a.as_str()) {
                return Some(if a.len() <= b.len() { a.clone() } else { b.clone() });
            }
        }
    }
    None
}

/// Warn-only structural heuristics. None of these invalidate a rule.
fn structural_warnings(def: &RuleDefinition) -> Vec<String> {
    let pattern = def.pattern.as_str();
    let mut warnings = Vec::new();

    let stripped = pattern
        .trim_start_matches('^')
        .trim_end_matches('$');
    if matches!(stripped, ".*" | ".+" | ".*?" | ".+?" | r"[\s\S]*" | r"[\s\S]+") {
        warnings.push("pattern matches almost anything".to_string());
    }

    if pattern.starts_with('^') ^ pattern.ends_with('$') {
        warnings.push("line-oriented pattern is anchored on one side only".to_string());
    }

    let has_lower = pattern.chars().any(|c| c.is_ascii_lowercase());
    let has_upper = pattern.chars().any(|c| c.is_ascii_uppercase());
    if (has_lower ^ has_upper) && !pattern.contains("(?i") {
        warnings.push(
            "pattern covers a single letter case; compiled case-insensitively here, \
             but other engines may not"
                .to_string(),
        );
    }

    let label = format!("{} {}", def.id, def.name).to_lowercase();
    if (label.contains("key") || label.contains("token")) && !pattern.contains("\\b") {
        warnings.push("key/token rule has no word-boundary marker".to_string());
    }

    warnings
}

#[cfg(test)]
mod tests {
    use super::*;

    fn def(pattern: &str) -> RuleDefinition {
        RuleDefinition {
            id: "test-rule".to_string(),
            name: "Test Rule".to_string(),
            pattern: pattern.to_string(),
            severity: "critical".to_string(),
            confidence: 0.8,
            description: String::new(),
            enabled: true,
            test_cases: Vec::new(),
        }
    }

    #[test]
    fn test_redos_patterns_are_rejected() {
        let validator = PatternValidator::default();
        for pattern in ["(a+)+b", "(a*)*b", "(a|a)*b", "(.*)*$"] {
            let result = validator.validate(&def(pattern));
            assert!(!result.valid, "{} should be invalid", pattern);
            assert!(result.backtracking.is_some(), "{} should carry a diagnosis", pattern);
            assert!(
                result.errors.iter().any(|e| e.contains("backtracking")),
                "{} should report a backtracking error",
                pattern
            );
        }
    }

    #[test]
    fn test_safe_patterns_are_accepted() {
        let validator = PatternValidator::default();
        for pattern in ["test", "[a-z]+", r"\d{3,10}"] {
            let result = validator.validate(&def(pattern));
            assert!(result.valid, "{} should be valid", pattern);
            assert!(result.backtracking.is_none(), "{} should have no diagnosis", pattern);
        }
    }

    #[test]
    fn test_bounded_repetition_over_unbounded_body_is_allowed() {
        // The JWT-style construct: unbounded inner, bounded outer.
        let validator = PatternValidator::default();
        let result = validator.validate(&def(r"(?:\.[\da-z=_-]{3,}){1,4}"));
        assert!(result.valid);
    }

    #[test]
    fn test_compilation_failure_stops_further_checks() {
        let validator = PatternValidator::default();
        let result = validator.validate(&def("(unclosed"));
        assert!(!result.valid);
        assert!(result.errors[0].contains("compilation failed"));
        assert!(result.compiled.is_none());
        assert!(result.test_results.is_empty());
    }

    #[test]
    fn test_positive_test_case_with_exact_expectation() {
        let validator = PatternValidator::default();
        let mut rule = def(r"ghp_[\da-z]{4}");
        rule.test_cases = vec![PatternTestCase {
            input: "token ghp_ab12 end".to_string(),
            should_match: true,
            expected: Some("ghp_ab12".to_string()),
        }];
        let result = validator.validate(&rule);
        assert!(result.valid);
        assert!(result.test_results[0].passed);
    }

    #[test]
    fn test_failing_test_case_invalidates_rule() {
        let validator = PatternValidator::default();
        let mut rule = def("abc");
        rule.test_cases = vec![PatternTestCase {
            input: "no match here".to_string(),
            should_match: true,
            expected: None,
        }];
        let result = validator.validate(&rule);
        assert!(!result.valid);
        assert!(!result.test_results[0].passed);
    }

    #[test]
    fn test_negative_test_case() {
        let validator = PatternValidator::default();
        let mut rule = def("abc");
        rule.test_cases = vec![PatternTestCase {
            input: "contains abc somewhere".to_string(),
            should_match: false,
            expected: None,
        }];
        let result = validator.validate(&rule);
        assert!(!result.valid);
    }

    #[test]
    fn test_one_sided_anchor_warns() {
        let validator = PatternValidator::default();
        let result = validator.validate(&def("^start-of-line"));
        assert!(result.valid);
        assert!(result.warnings.iter().any(|w| w.contains("anchored")));
    }

    #[test]
    fn test_key_rule_without_word_boundary_warns() {
        let validator = PatternValidator::default();
        let mut rule = def("apikey-[0-9]{8}");
        rule.id = "some-api-key".to_string();
        let result = validator.validate(&rule);
        assert!(result.valid);
        assert!(result.warnings.iter().any(|w| w.contains("word-boundary")));
    }

    #[test]
    fn test_batch_aggregation_never_raises() {
        let validator = PatternValidator::default();
        let defs = vec![def("[a-z]+"), def("(a+)+b"), def("(broken")];
        let (active, report) = validator.validate_batch(&defs);
        assert_eq!(report.total, 3);
        assert_eq!(report.valid, 1);
        assert_eq!(report.invalid, 2);
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, "test-rule");
    }

    #[test]
    fn test_disabled_rules_are_skipped() {
        let validator = PatternValidator::default();
        let mut rule = def("[a-z]+");
        rule.enabled = false;
        let (active, report) = validator.validate_batch(&[rule]);
        assert!(active.is_empty());
        assert_eq!(report.total, 0);
    }

    #[test]
    fn test_default_catalog_survives_the_gate() {
        let validator = PatternValidator::default();
        let (active, report) = validator.validate_batch(&crate::scanner::patterns::default_rules());
        assert_eq!(report.invalid, 0, "results: {:?}", report.results);
        assert_eq!(active.len(), report.valid);
    }

    #[test]
    fn test_construct_detection_details() {
        assert!(detect_catastrophic_construct(r"(a+)+b").is_some());
        assert!(detect_catastrophic_construct(r"(a{2,})*").is_some());
        assert!(detect_catastrophic_construct(r"(a|a)*").is_some());
        assert!(detect_catastrophic_construct(r"(ab|a)+").is_some());
        assert!(detect_catastrophic_construct(r"(a+){1,4}").is_none());
        assert!(detect_catastrophic_construct(r"(a|b)*").is_none());
        assert!(detect_catastrophic_construct(r"\(a+\)+").is_none());
        assert!(detect_catastrophic_construct(r"[(+*]+").is_none());
    }
}

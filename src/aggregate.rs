//! Folding many detection results into one verdict.

use crate::detection::{DetectionResult, Severity, Verdict};
use std::collections::HashSet;

/// Detector name of an aggregate built from no results
pub const AGGREGATE_NAME: &str = "aggregate";

/// Combine detection results into a single result.
///
/// Verdict, severity and confidence are each the maximum across inputs,
/// tracked independently. Matched rules are de-duplicated, elapsed times are
/// summed (total work, not wall-clock), and the detector name joins each
/// distinct contributor with `+` in order of first appearance. No input
/// gives an `allowed` result named `aggregate`.
pub fn aggregate_results(results: &[DetectionResult]) -> DetectionResult {
    if results.is_empty() {
        return DetectionResult::allowed(AGGREGATE_NAME, 0);
    }

    let mut verdict = Verdict::Allowed;
    let mut severity: Option<Severity> = None;
    let mut rules: Vec<String> = Vec::new();
    let mut seen_rules: HashSet<&str> = HashSet::new();
    let mut confidence: f64 = 0.0;
    let mut scan_time_ms: u64 = 0;
    let mut names: Vec<&str> = Vec::new();
    let mut seen_names: HashSet<&str> = HashSet::new();

    for result in results {
        if seen_names.insert(result.detector_name()) {
            names.push(result.detector_name());
        }
        for rule in result.rules_matched() {
            if seen_rules.insert(rule.as_str()) {
                rules.push(rule.clone());
            }
        }
        scan_time_ms = scan_time_ms.saturating_add(result.scan_time_ms());
        confidence = confidence.max(result.confidence());
        severity = severity.max(result.severity());
        verdict = verdict.max(result.verdict());
    }

    // Each input's confidence is in range, so their maximum is too.
    DetectionResult::from_parts(
        verdict,
        severity,
        rules,
        confidence,
        scan_time_ms,
        names.join("+"),
        None,
    )
}

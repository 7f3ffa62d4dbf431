//! Pattern rules and rule-file loading.
//!
//! Rule files are JSON arrays in a rules directory:
//!
//! ```json
//! [{ "name": "ignore-previous", "severity": "high", "pattern": "(?i)ignore\\s+previous" }]
//! ```
//!
//! Loading is forgiving: unreadable files, malformed files and patterns that
//! fail to compile are logged and skipped.

use super::{DetectionResult, DetectorError, Severity, Verdict};
use regex::{Regex, RegexSet};
use serde::Deserialize;
use serde_json::json;
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

/// Confidence reported for a keyword (regex) match
pub const KEYWORD_CONFIDENCE: f64 = 0.7;

/// Extension of rule files inside a rules directory
pub const RULE_FILE_EXTENSION: &str = "json";

/// A named regex with the severity it implies
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PatternRule {
    pub name: String,
    pub severity: Severity,
    pub pattern: String,
}

impl PatternRule {
    pub fn new(name: &str, severity: Severity, pattern: &str) -> Self {
        Self {
            name: name.to_string(),
            severity,
            pattern: pattern.to_string(),
        }
    }
}

/// Compiled set of pattern rules
#[derive(Debug, Clone)]
pub struct RuleSet {
    rules: Vec<PatternRule>,
    patterns: RegexSet,
}

impl RuleSet {
    /// Compile rules into a set. Fails if any pattern is invalid.
    pub fn new(rules: Vec<PatternRule>) -> Result<Self, DetectorError> {
        let patterns = RegexSet::new(rules.iter().map(|r| r.pattern.as_str()))?;
        Ok(Self { rules, patterns })
    }

    /// Compile a static rule table
    pub fn from_table(table: &[(&str, Severity, &str)]) -> Result<Self, DetectorError> {
        Self::new(
            table
                .iter()
                .map(|(name, severity, pattern)| PatternRule::new(name, *severity, pattern))
                .collect(),
        )
    }

    /// Compile `table` plus every valid rule found under `rules_path`.
    ///
    /// If the directory cannot be listed, or the combined set does not
    /// compile (e.g. it exceeds the regex size limit), the extra rules are
    /// dropped and only `table` is used. Only a broken `table` is an error.
    pub fn with_rules_dir(
        table: &[(&str, Severity, &str)],
        rules_path: &Path,
    ) -> Result<Self, DetectorError> {
        let extra = match load_rules_dir(rules_path) {
            Ok(extra) if !extra.is_empty() => extra,
            Ok(_) => return Self::from_table(table),
            Err(e) => {
                warn!(error = %e, "Ignoring rules directory, using built-in rules");
                return Self::from_table(table);
            }
        };

        let mut rules: Vec<PatternRule> = table
            .iter()
            .map(|(name, severity, pattern)| PatternRule::new(name, *severity, pattern))
            .collect();
        rules.extend(extra);
        match Self::new(rules) {
            Ok(set) => Ok(set),
            Err(e) => {
                warn!(path = %rules_path.display(), error = %e, "Extra rules do not compile together, using built-in rules");
                Self::from_table(table)
            }
        }
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Rules matching `text`, in rule order
    pub fn matching(&self, text: &str) -> Vec<&PatternRule> {
        self.patterns
            .matches(text)
            .into_iter()
            .map(|idx| &self.rules[idx])
            .collect()
    }

    /// Build the detection result for `text`.
    ///
    /// Any high-severity match blocks; other matches warn. Severity is the
    /// highest matched.
    pub fn evaluate(
        &self,
        detector_name: &str,
        text: &str,
        scan_time_ms: u64,
    ) -> Result<DetectionResult, DetectorError> {
        let matched = self.matching(text);
        let Some(severity) = matched.iter().map(|r| r.severity).max() else {
            return Ok(DetectionResult::allowed(detector_name, scan_time_ms));
        };

        let verdict = if severity == Severity::High {
            Verdict::Blocked
        } else {
            Verdict::Warned
        };
        let detections: Vec<_> = matched
            .iter()
            .map(|r| json!({ "rule_name": r.name, "severity": r.severity }))
            .collect();

        Ok(DetectionResult::new(
            verdict,
            Some(severity),
            matched.iter().map(|r| r.name.clone()).collect(),
            KEYWORD_CONFIDENCE,
            scan_time_ms,
            detector_name,
            Some(json!({ "detections": detections })),
        )?)
    }
}

/// Read every rule file under `rules_path`.
///
/// A path that does not exist or is not a directory yields no rules. Only a
/// directory that exists but cannot be listed is an error.
pub fn load_rules_dir(rules_path: &Path) -> Result<Vec<PatternRule>, DetectorError> {
    if !rules_path.is_dir() {
        debug!(path = %rules_path.display(), "Rules directory not found, skipping");
        return Ok(Vec::new());
    }

    let entries = fs::read_dir(rules_path).map_err(|source| DetectorError::RulesIo {
        path: rules_path.to_path_buf(),
        source,
    })?;

    let mut files: Vec<_> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == RULE_FILE_EXTENSION))
        .collect();
    files.sort();

    let mut rules = Vec::new();
    for file in files {
        match load_rule_file(&file) {
            Ok(loaded) => rules.extend(loaded),
            Err(e) => warn!(error = %e, "Skipping rule file"),
        }
    }

    debug!(path = %rules_path.display(), count = rules.len(), "Loaded rules");
    Ok(rules)
}

fn load_rule_file(path: &Path) -> Result<Vec<PatternRule>, DetectorError> {
    let content = fs::read_to_string(path).map_err(|source| DetectorError::RulesIo {
        path: path.to_path_buf(),
        source,
    })?;
    let parsed: Vec<PatternRule> =
        serde_json::from_str(&content).map_err(|source| DetectorError::RulesFormat {
            path: path.to_path_buf(),
            source,
        })?;

    Ok(parsed
        .into_iter()
        .filter(|rule| match Regex::new(&rule.pattern) {
            Ok(_) => true,
            Err(e) => {
                warn!(rule = %rule.name, file = %path.display(), error = %e, "Skipping invalid rule pattern");
                false
            }
        })
        .collect())
}

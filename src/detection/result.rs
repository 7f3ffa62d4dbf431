//! Detection result shared by every detector.
//!
//! A [`DetectionResult`] is the one shape every detector reports in, whatever
//! its internals. Construction validates the value, so anything holding one
//! can rely on its fields being in range.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use thiserror::Error;

/// Outcome category of a scan.
///
/// Variants are declared in ranking order, so the derived `Ord` gives
/// `Allowed < ScanFailed < Warned < Blocked`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// Nothing suspicious found
    Allowed,
    /// The detector could not produce a trustworthy answer
    ScanFailed,
    /// Suspicious, but not decisive
    Warned,
    /// Decisive threat
    Blocked,
}

impl Verdict {
    /// Get the wire name for this verdict
    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Allowed => "allowed",
            Verdict::ScanFailed => "scan_failed",
            Verdict::Warned => "warned",
            Verdict::Blocked => "blocked",
        }
    }

    /// Anything other than `Allowed` is something a policy has to act on.
    pub fn is_actionable(&self) -> bool {
        *self != Verdict::Allowed
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Verdict {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "allowed" => Ok(Verdict::Allowed),
            "scan_failed" => Ok(Verdict::ScanFailed),
            "warned" => Ok(Verdict::Warned),
            "blocked" => Ok(Verdict::Blocked),
            _ => Err(ValidationError::InvalidVerdict(s.to_string())),
        }
    }
}

/// Threat intensity assessed by a detector.
///
/// Absence is modelled as `Option<Severity>`; `None` sorts below `Low`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Severity {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Severity::Low),
            "medium" => Ok(Severity::Medium),
            "high" => Ok(Severity::High),
            _ => Err(ValidationError::InvalidSeverity(s.to_string())),
        }
    }
}

/// A result field outside its allowed domain.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("verdict must be one of allowed, warned, blocked, scan_failed (got {0:?})")]
    InvalidVerdict(String),

    #[error("severity must be one of low, medium, high (got {0:?})")]
    InvalidSeverity(String),

    #[error("confidence must be between 0.0 and 1.0 (got {0})")]
    InvalidConfidence(f64),
}

/// Outcome of one detector, or of several after aggregation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectionResult {
    verdict: Verdict,
    severity: Option<Severity>,
    rules_matched: Vec<String>,
    confidence: f64,
    scan_time_ms: u64,
    detector_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    raw_output: Option<Value>,
}

impl DetectionResult {
    /// Build a validated result.
    ///
    /// Fails when `confidence` is NaN or outside `[0.0, 1.0]`.
    pub fn new(
        verdict: Verdict,
        severity: Option<Severity>,
        rules_matched: Vec<String>,
        confidence: f64,
        scan_time_ms: u64,
        detector_name: impl Into<String>,
        raw_output: Option<Value>,
    ) -> Result<Self, ValidationError> {
        if !(0.0..=1.0).contains(&confidence) {
            return Err(ValidationError::InvalidConfidence(confidence));
        }

        Ok(Self::from_parts(
            verdict,
            severity,
            rules_matched,
            confidence,
            scan_time_ms,
            detector_name,
            raw_output,
        ))
    }

    /// Assemble a result whose fields are already known to be valid, such as
    /// one combined from other results.
    pub(crate) fn from_parts(
        verdict: Verdict,
        severity: Option<Severity>,
        rules_matched: Vec<String>,
        confidence: f64,
        scan_time_ms: u64,
        detector_name: impl Into<String>,
        raw_output: Option<Value>,
    ) -> Self {
        Self {
            verdict,
            severity,
            rules_matched,
            confidence,
            scan_time_ms,
            detector_name: detector_name.into(),
            raw_output,
        }
    }

    /// An "allowed, no detections" result.
    pub fn allowed(detector_name: impl Into<String>, scan_time_ms: u64) -> Self {
        Self {
            verdict: Verdict::Allowed,
            severity: None,
            rules_matched: Vec::new(),
            confidence: 0.0,
            scan_time_ms,
            detector_name: detector_name.into(),
            raw_output: None,
        }
    }

    /// A "scan failed" result, carrying `{"error": ...}` when a message is given.
    pub fn scan_failed(detector_name: impl Into<String>, error: Option<String>) -> Self {
        Self {
            verdict: Verdict::ScanFailed,
            severity: None,
            rules_matched: Vec::new(),
            confidence: 0.0,
            scan_time_ms: 0,
            detector_name: detector_name.into(),
            raw_output: error.map(|e| json!({ "error": e })),
        }
    }

    /// Copy of this result with the elapsed time replaced.
    pub fn with_scan_time_ms(mut self, scan_time_ms: u64) -> Self {
        self.scan_time_ms = scan_time_ms;
        self
    }

    pub fn verdict(&self) -> Verdict {
        self.verdict
    }

    pub fn severity(&self) -> Option<Severity> {
        self.severity
    }

    pub fn rules_matched(&self) -> &[String] {
        &self.rules_matched
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    pub fn scan_time_ms(&self) -> u64 {
        self.scan_time_ms
    }

    pub fn detector_name(&self) -> &str {
        &self.detector_name
    }

    pub fn raw_output(&self) -> Option<&Value> {
        self.raw_output.as_ref()
    }

    /// Error message recorded by [`DetectionResult::scan_failed`], if any.
    pub fn error(&self) -> Option<&str> {
        self.raw_output
            .as_ref()
            .and_then(|raw| raw.get("error"))
            .and_then(Value::as_str)
    }
}

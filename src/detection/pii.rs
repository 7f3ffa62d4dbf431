//! PII (Personally Identifiable Information) detection.
//!
//! Detects sensitive data like emails, SSNs, phone numbers, and credit cards.

use super::rules::KEYWORD_CONFIDENCE;
use super::{DetectionResult, Detector, DetectorError, Severity, Verdict};
use crate::InspectorConfig;
use regex::Regex;
use serde_json::json;
use std::path::Path;

pub const DETECTOR_NAME: &str = "pii";

/// Types of PII that can be detected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PiiType {
    Email,
    Ssn,
    PhoneNumber,
    CreditCard,
    IpAddress,
}

impl PiiType {
    /// Get the display name for this PII type
    pub fn as_str(&self) -> &'static str {
        match self {
            PiiType::Email => "email",
            PiiType::Ssn => "ssn",
            PiiType::PhoneNumber => "phone",
            PiiType::CreditCard => "credit-card",
            PiiType::IpAddress => "ip-address",
        }
    }

    /// Identifiers that enable fraud on their own rank higher
    pub fn severity(&self) -> Severity {
        match self {
            PiiType::Ssn | PiiType::CreditCard => Severity::Medium,
            PiiType::Email | PiiType::PhoneNumber | PiiType::IpAddress => Severity::Low,
        }
    }

    fn rule_name(&self) -> String {
        format!("pii-{}", self.as_str())
    }
}

/// A match of PII in text
#[derive(Debug, Clone)]
pub struct PiiMatch {
    pub pii_type: PiiType,
    pub start: usize,
    pub end: usize,
    pub matched: String,
}

/// Detector for personally identifiable information
pub struct PiiDetector {
    email_regex: Regex,
    ssn_regex: Regex,
    phone_regex: Regex,
    credit_card_regex: Regex,
    ip_regex: Regex,
}

impl PiiDetector {
    /// Create a new PII detector
    pub fn new() -> Result<Self, DetectorError> {
        Ok(Self {
            email_regex: Regex::new(r"[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}")?,
            ssn_regex: Regex::new(r"\b\d{3}-\d{2}-\d{4}\b")?,
            phone_regex: Regex::new(r"\b(?:\+1[-.\s]?)?\(?\d{3}\)?[-.\s]?\d{3}[-.\s]?\d{4}\b")?,
            credit_card_regex: Regex::new(r"\b\d{4}[-\s]?\d{4}[-\s]?\d{4}[-\s]?\d{4}\b")?,
            ip_regex: Regex::new(
                r"\b(?:(?:25[0-5]|2[0-4][0-9]|[01]?[0-9][0-9]?)\.){3}(?:25[0-5]|2[0-4][0-9]|[01]?[0-9][0-9]?)\b",
            )?,
        })
    }

    /// Detect all PII in text
    pub fn detect(&self, text: &str) -> Vec<PiiMatch> {
        let mut matches = Vec::new();

        let simple = [
            (&self.email_regex, PiiType::Email),
            (&self.ssn_regex, PiiType::Ssn),
            (&self.phone_regex, PiiType::PhoneNumber),
            (&self.credit_card_regex, PiiType::CreditCard),
        ];
        for (regex, pii_type) in simple {
            for m in regex.find_iter(text) {
                matches.push(PiiMatch {
                    pii_type,
                    start: m.start(),
                    end: m.end(),
                    matched: m.as_str().to_string(),
                });
            }
        }

        // Skip localhost and common private ranges for less noise
        for m in self.ip_regex.find_iter(text) {
            let ip = m.as_str();
            if !ip.starts_with("127.")
                && !ip.starts_with("10.")
                && !ip.starts_with("192.168.")
                && !ip.starts_with("0.")
            {
                matches.push(PiiMatch {
                    pii_type: PiiType::IpAddress,
                    start: m.start(),
                    end: m.end(),
                    matched: ip.to_string(),
                });
            }
        }

        matches.sort_by_key(|m| m.start);
        matches
    }

    /// Get unique PII types found in text
    pub fn detect_types(&self, text: &str) -> Vec<PiiType> {
        let mut types: Vec<PiiType> = self.detect(text).into_iter().map(|m| m.pii_type).collect();
        types.sort_by_key(|t| *t as u8);
        types.dedup();
        types
    }
}

impl Detector for PiiDetector {
    fn name(&self) -> &str {
        DETECTOR_NAME
    }

    // Elapsed time is left at zero; the executor records it.
    fn scan(&self, text: &str, _config: &InspectorConfig) -> Result<DetectionResult, DetectorError> {
        let types = self.detect_types(text);
        let Some(severity) = types.iter().map(PiiType::severity).max() else {
            return Ok(DetectionResult::allowed(DETECTOR_NAME, 0));
        };

        // Matched values are not echoed back; only their kinds are.
        let kinds: Vec<&str> = types.iter().map(PiiType::as_str).collect();
        Ok(DetectionResult::new(
            Verdict::Warned,
            Some(severity),
            types.iter().map(PiiType::rule_name).collect(),
            KEYWORD_CONFIDENCE,
            0,
            DETECTOR_NAME,
            Some(json!({ "pii_types": kinds })),
        )?)
    }

    // PII patterns are fixed; there is nothing to load.
    fn load_rules(&self, _rules_path: &Path) -> Result<usize, DetectorError> {
        Ok(0)
    }

    fn is_available(&self) -> bool {
        true
    }
}

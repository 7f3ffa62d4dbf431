//! Jailbreak attempt detection.
//!
//! Detects attempts to bypass AI safety measures and ethical guidelines.

use super::rules::RuleSet;
use super::{DetectionResult, Detector, DetectorError, Severity};
use crate::InspectorConfig;
use std::path::Path;
use std::sync::RwLock;
use std::time::Instant;
use tracing::warn;

pub const DETECTOR_NAME: &str = "jailbreak";

/// Built-in rules: (name, severity, pattern)
const JAILBREAK_RULES: &[(&str, Severity, &str)] = &[
    // DAN and variants
    ("dan", Severity::High, r"\bDAN\b"),
    ("do-anything-now", Severity::High, r"(?i)do\s+anything\s+now"),
    ("dan-variants", Severity::High, r"\b(STAN|DUDE)\b"),
    // Explicit jailbreak
    ("jailbreak-keyword", Severity::High, r"(?i)jail\s*break"),
    ("unlock-potential", Severity::Medium, r"(?i)unlock\s+your\s+(full\s+)?potential"),
    // Developer/debug mode
    ("privileged-mode", Severity::Medium, r"(?i)(developer|debug|maintenance|sudo|god|admin)\s+mode"),
    // Bypass attempts
    ("bypass-safeguards", Severity::High, r"(?i)bypass\s+(your\s+)?(programming|restrictions|filters|safety|guidelines)"),
    ("circumvent-rules", Severity::High, r"(?i)circumvent\s+(your\s+)?rules"),
    // Ethics bypass
    ("ignore-ethics", Severity::Medium, r"(?i)ignore\s+(your\s+)?(ethical|moral|safety)"),
    ("no-restrictions", Severity::Medium, r"(?i)without\s+(any\s+)?restrictions|no\s+limitations|unrestricted\s+mode"),
    // Hypothetical framing (often used to bypass)
    ("hypothetical-framing", Severity::Low, r"(?i)hypothetically\s+speaking|in\s+a\s+hypothetical\s+scenario"),
    ("academic-framing", Severity::Low, r"(?i)for\s+educational\s+purposes\s+only|for\s+research\s+purposes|purely\s+academic"),
    ("fiction-framing", Severity::Low, r"(?i)in\s+(fiction|a\s+novel|a\s+movie)"),
    // Persona forcing
    ("evil-persona", Severity::Medium, r"(?i)evil\s+(twin|version|mode)"),
    ("uncensored-persona", Severity::Medium, r"(?i)(uncensored|unfiltered)\s+(version|mode)"),
    // Token manipulation
    ("jailbreak-tokens", Severity::High, r"(?i)\[(jailbreak|unlock|unrestricted)\]|```jailbreak"),
];

/// Detector for jailbreak attempts
pub struct JailbreakDetector {
    rules: RwLock<RuleSet>,
}

impl JailbreakDetector {
    pub fn new() -> Result<Self, DetectorError> {
        Ok(Self {
            rules: RwLock::new(RuleSet::from_table(JAILBREAK_RULES)?),
        })
    }

    pub fn from_config(config: &InspectorConfig) -> Result<Self, DetectorError> {
        let detector = Self::new()?;
        if let Some(path) = config.rules_path_for(DETECTOR_NAME) {
            if let Err(e) = detector.load_rules(&path) {
                warn!(detector = DETECTOR_NAME, path = %path.display(), error = %e, "Failed to load rules, keeping built-in rules");
            }
        }
        Ok(detector)
    }
}

impl Detector for JailbreakDetector {
    fn name(&self) -> &str {
        DETECTOR_NAME
    }

    fn scan(&self, text: &str, _config: &InspectorConfig) -> Result<DetectionResult, DetectorError> {
        let start = Instant::now();
        let rules = self
            .rules
            .read()
            .map_err(|_| DetectorError::Scan("rule set lock poisoned".to_string()))?;
        let matched = rules.evaluate(DETECTOR_NAME, text, 0)?;
        Ok(matched.with_scan_time_ms(start.elapsed().as_millis() as u64))
    }

    fn load_rules(&self, rules_path: &Path) -> Result<usize, DetectorError> {
        let loaded = RuleSet::with_rules_dir(JAILBREAK_RULES, rules_path)?;
        let count = loaded.len();
        *self
            .rules
            .write()
            .map_err(|_| DetectorError::Scan("rule set lock poisoned".to_string()))? = loaded;
        Ok(count)
    }

    fn is_available(&self) -> bool {
        true
    }
}

//! Prompt injection detection.
//!
//! Detects attempts to override system prompts or inject malicious instructions.

use super::rules::RuleSet;
use super::{DetectionResult, Detector, DetectorError, Severity};
use crate::InspectorConfig;
use std::path::Path;
use std::sync::RwLock;
use std::time::Instant;
use tracing::warn;

pub const DETECTOR_NAME: &str = "prompt_injection";

/// Built-in rules: (name, severity, pattern)
const INJECTION_RULES: &[(&str, Severity, &str)] = &[
    // Direct instruction override
    ("ignore-previous-instructions", Severity::High, r"(?i)ignore\s+(all\s+)?previous\s+instructions?"),
    ("ignore-prior-instructions", Severity::High, r"(?i)ignore\s+(all\s+)?prior\s+instructions?"),
    ("disregard-previous", Severity::High, r"(?i)disregard\s+(all\s+)?previous"),
    ("forget-instructions", Severity::High, r"(?i)forget\s+(all\s+)?(your\s+)?instructions?"),
    ("override-instructions", Severity::High, r"(?i)override\s+(your\s+)?instructions?"),
    // New instruction injection
    ("new-instructions", Severity::Medium, r"(?i)new\s+instructions?:"),
    ("updated-instructions", Severity::Medium, r"(?i)updated\s+instructions?:"),
    ("system-prompt-header", Severity::Medium, r"(?i)system\s+prompt:"),
    ("system-tag", Severity::Medium, r"(?i)\[system\]|<system>"),
    // Role manipulation
    ("role-you-are-now", Severity::Medium, r"(?i)you\s+are\s+now\s+a"),
    ("role-act-as-if", Severity::Medium, r"(?i)act\s+as\s+if\s+you"),
    ("role-pretend", Severity::Medium, r"(?i)pretend\s+(to\s+be|you\s+are)"),
    ("role-roleplay", Severity::Low, r"(?i)roleplay\s+as"),
    ("role-simulate", Severity::Low, r"(?i)simulate\s+being"),
    // Prompt extraction
    ("reveal-system-prompt", Severity::High, r"(?i)reveal\s+(your\s+)?system\s+prompt"),
    ("show-instructions", Severity::Medium, r"(?i)show\s+(me\s+)?(your\s+)?instructions"),
    ("ask-system-prompt", Severity::Medium, r"(?i)what\s+(are|is)\s+(your\s+)?system\s+prompt"),
    ("print-initial-prompt", Severity::High, r"(?i)print\s+(your\s+)?initial\s+prompt"),
    // Context manipulation
    ("end-of-system-prompt", Severity::High, r"(?i)end\s+of\s+system\s+prompt"),
    ("instruction-tags", Severity::Medium, r"(?i)</?(system|instructions?)>"),
    ("inst-markers", Severity::High, r"(?i)\[/?INST\]|<<SYS>>"),
];

/// Detector for prompt injection attempts
pub struct PromptInjectionDetector {
    rules: RwLock<RuleSet>,
}

impl PromptInjectionDetector {
    /// Create a detector with the built-in rules only
    pub fn new() -> Result<Self, DetectorError> {
        Ok(Self {
            rules: RwLock::new(RuleSet::from_table(INJECTION_RULES)?),
        })
    }

    /// Plugin factory: built-in rules plus any configured rules directory
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

impl Detector for PromptInjectionDetector {
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
        let loaded = RuleSet::with_rules_dir(INJECTION_RULES, rules_path)?;
        let count = loaded.len();
        let mut rules = self
            .rules
            .write()
            .map_err(|_| DetectorError::Scan("rule set lock poisoned".to_string()))?;
        *rules = loaded;
        Ok(count)
    }

    fn is_available(&self) -> bool {
        true
    }
}

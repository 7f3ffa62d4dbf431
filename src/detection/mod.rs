//! Detector capability contract and the built-in detectors.

pub mod jailbreak;
pub mod pii;
pub mod prompt_injection;
pub mod result;
pub mod rules;

pub use jailbreak::JailbreakDetector;
pub use pii::{PiiDetector, PiiMatch, PiiType};
pub use prompt_injection::PromptInjectionDetector;
pub use result::{DetectionResult, Severity, ValidationError, Verdict};
pub use rules::{PatternRule, RuleSet};

use crate::InspectorConfig;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Failure reported by a detector across its boundary
#[derive(Debug, Error)]
pub enum DetectorError {
    #[error("detector {0} is not available")]
    Unavailable(String),

    #[error("failed to construct detector: {0}")]
    Construction(String),

    #[error("failed to read rules from {path}: {source}")]
    RulesIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid rule file {path}: {source}")]
    RulesFormat {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid rule pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("invalid result: {0}")]
    Validation(#[from] ValidationError),

    #[error("scan failed: {0}")]
    Scan(String),
}

/// Capability every detector plugin implements.
///
/// `scan` is synchronous; the executor runs it on the blocking pool and
/// bounds it with the configured deadline. Implementations are shared
/// behind an `Arc` and may be invoked concurrently from different scans,
/// so any mutable state (e.g. loaded rules) needs interior locking.
pub trait Detector: Send + Sync {
    /// Unique name used for lookup, configuration and aggregation.
    fn name(&self) -> &str;

    /// Analyze `text`. Failures are returned, not panicked; the executor
    /// turns them into `scan_failed`.
    fn scan(&self, text: &str, config: &InspectorConfig) -> Result<DetectionResult, DetectorError>;

    /// Load detector-specific rules from a directory and return how many
    /// are active afterwards. A missing directory is not an error.
    fn load_rules(&self, rules_path: &Path) -> Result<usize, DetectorError>;

    /// Whether runtime dependencies are satisfied. Must be cheap.
    fn is_available(&self) -> bool;
}

//! Content inspection agent for Zentinel.
//!
//! Screens text (user prompts, tool input and output) with a set of
//! pluggable detectors and folds their answers into one verdict:
//! - Detector registry with lazy, memoized construction
//! - Parallel scanning across every configured detector
//! - First-match scanning that stops at the first actionable verdict
//! - Aggregation of many results into a single verdict
//!
//! Everything here fails open. A broken, missing or slow detector turns into
//! a `scan_failed` result or no result at all, never an error for the caller.

pub mod aggregate;
pub mod detection;
pub mod executor;
pub mod registry;

pub use aggregate::aggregate_results;
pub use detection::{DetectionResult, Detector, DetectorError, Severity, ValidationError, Verdict};
pub use executor::{safe_scan, ScanExecutor};
pub use registry::{DetectorPlugin, DetectorRegistry, PluginCatalog, PluginError};

use serde::Deserialize;
use serde_json::{Map, Value};
use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

/// Detector used when the configuration does not list any
pub const DEFAULT_DETECTOR: &str = detection::prompt_injection::DETECTOR_NAME;

/// Default per-detector deadline
pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;

/// How a scan runs its detectors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DetectionMode {
    /// Run every detector concurrently and keep all results
    #[default]
    Parallel,
    /// Run detectors in order and stop at the first actionable verdict
    FirstMatch,
}

impl DetectionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DetectionMode::Parallel => "parallel",
            DetectionMode::FirstMatch => "first_match",
        }
    }
}

impl std::str::FromStr for DetectionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "parallel" => Ok(DetectionMode::Parallel),
            "first_match" => Ok(DetectionMode::FirstMatch),
            _ => Err(format!("Invalid detection mode: {}", s)),
        }
    }
}

/// JSON form of the `detection` section
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct DetectionSettingsJson {
    /// "parallel" or "first_match"
    #[serde(default)]
    pub mode: String,
    /// Ordered detector names; empty means every discovered detector
    #[serde(default = "default_detectors")]
    pub detectors: Vec<String>,
    /// Per-detector deadline in milliseconds (0 = none)
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_detectors() -> Vec<String> {
    vec![DEFAULT_DETECTOR.to_string()]
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

impl Default for DetectionSettingsJson {
    fn default() -> Self {
        Self {
            mode: DetectionMode::Parallel.as_str().to_string(),
            detectors: default_detectors(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }
}

/// JSON-serializable configuration passed to every scan
///
/// Keys other than `detection` are kept as-is and form the open namespace
/// detectors read their own settings from.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InspectorConfigJson {
    #[serde(default)]
    pub detection: DetectionSettingsJson,
    #[serde(flatten)]
    pub settings: Map<String, Value>,
}

impl From<DetectionSettingsJson> for DetectionSettings {
    fn from(json: DetectionSettingsJson) -> Self {
        let mode = if json.mode.is_empty() {
            DetectionMode::default()
        } else {
            json.mode.parse::<DetectionMode>().unwrap_or_else(|e| {
                warn!(error = %e, "Falling back to parallel detection mode");
                DetectionMode::Parallel
            })
        };
        Self {
            mode,
            detectors: json.detectors,
            timeout: (json.timeout_ms > 0).then(|| Duration::from_millis(json.timeout_ms)),
        }
    }
}

impl From<InspectorConfigJson> for InspectorConfig {
    fn from(json: InspectorConfigJson) -> Self {
        Self {
            detection: json.detection.into(),
            settings: json.settings,
        }
    }
}

/// Scan orchestration settings
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionSettings {
    pub mode: DetectionMode,
    pub detectors: Vec<String>,
    /// Deadline for a single detector invocation (None = unbounded)
    pub timeout: Option<Duration>,
}

impl Default for DetectionSettings {
    fn default() -> Self {
        Self {
            mode: DetectionMode::Parallel,
            detectors: default_detectors(),
            timeout: Some(Duration::from_millis(DEFAULT_TIMEOUT_MS)),
        }
    }
}

/// Configuration for the content inspector
#[derive(Debug, Clone, Default)]
pub struct InspectorConfig {
    pub detection: DetectionSettings,
    settings: Map<String, Value>,
}

impl InspectorConfig {
    /// Parse a configuration mapping, falling back to defaults when it is malformed
    pub fn from_value(value: Value) -> Self {
        match serde_json::from_value::<InspectorConfigJson>(value) {
            Ok(json) => json.into(),
            Err(e) => {
                warn!(error = %e, "Failed to parse configuration, using defaults");
                Self::default()
            }
        }
    }

    /// Set a top-level setting in the open namespace
    pub fn with_setting(mut self, key: impl Into<String>, value: Value) -> Self {
        self.settings.insert(key.into(), value);
        self
    }

    /// Raw top-level setting
    pub fn setting(&self, key: &str) -> Option<&Value> {
        self.settings.get(key)
    }

    /// Settings section owned by one detector, keyed by its name
    pub fn detector_section(&self, name: &str) -> Option<&Map<String, Value>> {
        self.settings.get(name).and_then(Value::as_object)
    }

    /// Rule directory for a detector: its own `rules-path`, then the top-level one
    pub fn rules_path_for(&self, name: &str) -> Option<PathBuf> {
        self.detector_section(name)
            .and_then(|section| section.get("rules-path"))
            .or_else(|| self.settings.get("rules-path"))
            .and_then(Value::as_str)
            .map(PathBuf::from)
    }

    pub fn debug(&self) -> bool {
        self.settings
            .get("debug")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }
}

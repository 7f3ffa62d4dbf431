//! Scan execution.
//!
//! Two policies run on top of [`safe_scan`]:
//! - [`ScanExecutor::scan_all`] runs every requested detector concurrently
//!   and returns results in completion order
//! - [`ScanExecutor::scan_first`] runs detectors one by one and stops at the
//!   first result that is not `allowed`
//!
//! [`ScanExecutor::scan`] picks the policy from configuration.

use crate::detection::{DetectionResult, Detector};
use crate::registry::DetectorRegistry;
use crate::{DetectionMode, InspectorConfig};
use std::any::Any;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tracing::{debug, warn};

/// Run one detector behind the failure boundary.
///
/// The detector runs on the blocking pool. Its elapsed time is filled in
/// when the detector reports zero. An error, a panic or an exceeded
/// `timeout` becomes a `scan_failed` result under the detector's name.
///
/// A timed-out detector is not interrupted: its blocking thread finishes in
/// the background and the result is discarded.
pub async fn safe_scan(
    detector: Arc<dyn Detector>,
    text: Arc<str>,
    config: Arc<InspectorConfig>,
    timeout: Option<Duration>,
) -> DetectionResult {
    let name = detector.name().to_string();
    let start = Instant::now();
    let task = tokio::task::spawn_blocking(move || detector.scan(&text, &config));

    let joined = match timeout {
        Some(limit) => match tokio::time::timeout(limit, task).await {
            Ok(joined) => joined,
            Err(_) => {
                warn!(detector = %name, timeout_ms = limit.as_millis() as u64, "Detector timed out");
                return DetectionResult::scan_failed(
                    name,
                    Some(format!("timed out after {} ms", limit.as_millis())),
                );
            }
        },
        None => task.await,
    };
    let elapsed_ms = start.elapsed().as_millis() as u64;

    match joined {
        Ok(Ok(result)) if result.scan_time_ms() == 0 => result.with_scan_time_ms(elapsed_ms),
        Ok(Ok(result)) => result,
        Ok(Err(e)) => {
            warn!(detector = %name, error = %e, "Detector scan failed");
            DetectionResult::scan_failed(name, Some(e.to_string()))
        }
        Err(e) => {
            let message = if e.is_panic() {
                format!("detector panicked: {}", panic_message(e.into_panic()))
            } else {
                e.to_string()
            };
            warn!(detector = %name, error = %message, "Detector scan aborted");
            DetectionResult::scan_failed(name, Some(message))
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Runs detectors resolved through a [`DetectorRegistry`]
#[derive(Clone)]
pub struct ScanExecutor {
    registry: Arc<DetectorRegistry>,
}

impl ScanExecutor {
    pub fn new(registry: Arc<DetectorRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<DetectorRegistry> {
        &self.registry
    }

    /// Requested names without repeats, or every discovered name when none are given
    async fn requested_names(&self, detectors: Option<&[String]>) -> Vec<String> {
        match detectors {
            Some(names) if !names.is_empty() => {
                let mut seen = HashSet::new();
                names
                    .iter()
                    .filter(|name| seen.insert(name.as_str()))
                    .cloned()
                    .collect()
            }
            _ => self.registry.available_detectors().await,
        }
    }

    /// Scan with every requested detector concurrently.
    ///
    /// Unresolvable names contribute nothing. Results come back in
    /// completion order.
    pub async fn scan_all(
        &self,
        text: &str,
        config: &InspectorConfig,
        detectors: Option<&[String]>,
    ) -> Vec<DetectionResult> {
        let mut resolved = Vec::new();
        for name in self.requested_names(detectors).await {
            match self.registry.get_detector(&name, config).await {
                Some(detector) => resolved.push(detector),
                None => debug!(detector = %name, "Detector unavailable, skipping"),
            }
        }

        if resolved.is_empty() {
            return Vec::new();
        }

        let text: Arc<str> = Arc::from(text);
        let shared_config = Arc::new(config.clone());
        let timeout = config.detection.timeout;

        let mut workers = JoinSet::new();
        for detector in resolved {
            workers.spawn(safe_scan(
                detector,
                text.clone(),
                shared_config.clone(),
                timeout,
            ));
        }

        let mut results = Vec::with_capacity(workers.len());
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(result) => {
                    debug!(
                        detector = %result.detector_name(),
                        verdict = %result.verdict(),
                        scan_time_ms = result.scan_time_ms(),
                        "Detector finished"
                    );
                    results.push(result);
                }
                Err(e) => warn!(error = %e, "Scan worker failed"),
            }
        }
        results
    }

    /// Scan with detectors in order, returning the first non-allowed result.
    ///
    /// `scan_failed` counts as a match. Detectors after the match are neither
    /// constructed nor invoked.
    pub async fn scan_first(
        &self,
        text: &str,
        config: &InspectorConfig,
        detectors: Option<&[String]>,
    ) -> Option<DetectionResult> {
        let text: Arc<str> = Arc::from(text);
        let shared_config = Arc::new(config.clone());

        for name in self.requested_names(detectors).await {
            let Some(detector) = self.registry.get_detector(&name, config).await else {
                debug!(detector = %name, "Detector unavailable, skipping");
                continue;
            };

            let result = safe_scan(
                detector,
                text.clone(),
                shared_config.clone(),
                config.detection.timeout,
            )
            .await;
            if result.verdict().is_actionable() {
                debug!(detector = %name, verdict = %result.verdict(), "First match found");
                return Some(result);
            }
        }
        None
    }

    /// Scan using the configured mode and detector list
    pub async fn scan(&self, text: &str, config: &InspectorConfig) -> Vec<DetectionResult> {
        let detectors = Some(config.detection.detectors.as_slice());
        match config.detection.mode {
            DetectionMode::FirstMatch => self
                .scan_first(text, config, detectors)
                .await
                .into_iter()
                .collect(),
            DetectionMode::Parallel => self.scan_all(text, config, detectors).await,
        }
    }
}

//! Content inspection CLI for Zentinel hooks.
//!
//! Reads a hook payload, scans it with the configured detectors and prints
//! the per-detector results plus the aggregate verdict as JSON. Exits 0 on
//! every path so a broken inspector never blocks the host.

use anyhow::{Context, Result};
use clap::error::ErrorKind;
use clap::Parser;
use serde::Deserialize;
use serde_json::{json, Value};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use tracing_subscriber::{fmt, EnvFilter};
use zentinel_agent_content_inspector::{
    aggregate_results, DetectionMode, DetectionResult, DetectorRegistry, InspectorConfig,
    ScanExecutor,
};

/// Content inspector for Zentinel hooks
///
/// Screens prompts and tool input/output for prompt injection, jailbreak
/// attempts and PII using pluggable detectors.
#[derive(Parser, Debug)]
#[command(name = "zentinel-content-inspector")]
#[command(version, about, long_about = None)]
struct Args {
    /// JSON configuration file
    #[arg(long, short, env = "INSPECTOR_CONFIG")]
    config: Option<PathBuf>,

    /// Text to scan (default: read the hook payload from stdin)
    #[arg(long)]
    text: Option<String>,

    /// Treat stdin as raw text instead of a `{"prompt": ...}` payload
    #[arg(long, default_value = "false")]
    raw: bool,

    /// Detection mode: parallel, first_match
    #[arg(long, env = "DETECTION_MODE")]
    mode: Option<String>,

    /// Comma-separated list of detectors, in order
    #[arg(long, env = "DETECTORS")]
    detectors: Option<String>,

    /// Directory with additional rule files
    #[arg(long, env = "RULES_PATH")]
    rules_path: Option<PathBuf>,

    /// Per-detector timeout in milliseconds (0 = none)
    #[arg(long, env = "DETECTOR_TIMEOUT_MS")]
    timeout_ms: Option<u64>,

    /// List discovered detectors and exit
    #[arg(long, default_value = "false")]
    list_detectors: bool,

    /// Emit logs as JSON
    #[arg(long, env = "JSON_LOGS", default_value = "false")]
    json_logs: bool,

    /// Enable verbose debug logging
    #[arg(long, short, env = "VERBOSE", default_value = "false")]
    verbose: bool,
}

/// Hook payload as delivered on stdin
#[derive(Debug, Deserialize)]
struct HookInput {
    #[serde(default)]
    prompt: String,
}

#[tokio::main]
async fn main() {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let _ = e.print();
            if !matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) {
                print_report(&[]);
            }
            return;
        }
    };

    // Initialize logging
    let filter = if args.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    if args.json_logs {
        fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }

    let config = build_config(&args);
    let registry = Arc::new(DetectorRegistry::builtin());

    if args.list_detectors {
        let detectors = registry.available_detectors().await;
        match serde_json::to_string_pretty(&detectors) {
            Ok(listing) => println!("{}", listing),
            Err(e) => warn!(error = %e, "Failed to render detector list"),
        }
        return;
    }

    let results = match run(&args, &config, registry).await {
        Ok(results) => results,
        Err(e) => {
            warn!(error = %e, "Inspection failed, allowing");
            Vec::new()
        }
    };
    print_report(&results);
}

/// Scan the input text. Empty input yields no results.
async fn run(
    args: &Args,
    config: &InspectorConfig,
    registry: Arc<DetectorRegistry>,
) -> Result<Vec<DetectionResult>> {
    let text = match &args.text {
        Some(text) => text.clone(),
        None => read_stdin(args.raw)?,
    };
    if text.is_empty() {
        debug!("Nothing to scan");
        return Ok(Vec::new());
    }

    info!(
        mode = config.detection.mode.as_str(),
        detectors = ?config.detection.detectors,
        length = text.len(),
        "Scanning content"
    );

    let executor = ScanExecutor::new(registry);
    let results = executor.scan(&text, config).await;
    Ok(results)
}

/// Aggregate verdict plus every per-detector result
fn build_report(results: &[DetectionResult]) -> Value {
    let combined = aggregate_results(results);
    info!(
        verdict = %combined.verdict(),
        detectors = %combined.detector_name(),
        scan_time_ms = combined.scan_time_ms(),
        "Scan complete"
    );

    json!({
        "verdict": combined,
        "results": results,
    })
}

fn print_report(results: &[DetectionResult]) {
    match serde_json::to_string_pretty(&build_report(results)) {
        Ok(report) => println!("{}", report),
        Err(e) => warn!(error = %e, "Failed to render report"),
    }
}

fn read_stdin(raw: bool) -> Result<String> {
    let mut input = String::new();
    std::io::stdin()
        .read_to_string(&mut input)
        .context("Failed to read stdin")?;

    if raw {
        return Ok(input);
    }
    let payload: HookInput =
        serde_json::from_str(&input).context("Failed to parse hook payload")?;
    Ok(payload.prompt)
}

fn load_config_file(path: &Path) -> Result<InspectorConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    let value = serde_json::from_str(&content)
        .with_context(|| format!("Invalid JSON in config file {}", path.display()))?;
    Ok(InspectorConfig::from_value(value))
}

/// Config file first, then command-line overrides. An unreadable or
/// malformed file falls back to the defaults.
fn build_config(args: &Args) -> InspectorConfig {
    let mut config = match &args.config {
        Some(path) => load_config_file(path).unwrap_or_else(|e| {
            warn!(error = %e, "Using default configuration");
            InspectorConfig::default()
        }),
        None => InspectorConfig::default(),
    };

    if let Some(mode) = &args.mode {
        config.detection.mode = mode.parse::<DetectionMode>().unwrap_or_else(|e| {
            warn!("{}, defaulting to 'parallel'", e);
            DetectionMode::Parallel
        });
    }

    if let Some(detectors) = &args.detectors {
        config.detection.detectors = detectors
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
    }

    if let Some(rules_path) = &args.rules_path {
        config = config.with_setting("rules-path", json!(rules_path.display().to_string()));
    }

    if let Some(timeout_ms) = args.timeout_ms {
        config.detection.timeout = (timeout_ms > 0).then(|| Duration::from_millis(timeout_ms));
    }

    config
}

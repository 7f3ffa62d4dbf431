//! Detector plugin registry.
//!
//! Plugins are registered at process start in a [`PluginCatalog`]. The
//! [`DetectorRegistry`] built from it discovers the catalog once, then
//! constructs detectors lazily on first lookup and memoizes them:
//! - a loader that fails or panics is skipped during discovery
//! - a factory that fails, panics, times out or yields an unavailable
//!   detector gives `None` and nothing is cached, so a later lookup retries
//!
//! Factories run on the blocking pool so a slow one (loading rule files or a
//! model) does not stall the async workers.
//!
//! The registry is a plain value owned by the caller. `reset` drops every
//! discovered plugin and cached detector.

use crate::detection::{
    jailbreak, pii, prompt_injection, Detector, DetectorError, JailbreakDetector, PiiDetector,
    PromptInjectionDetector,
};
use crate::InspectorConfig;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Names no plugin may register under
pub const RESERVED_NAMES: &[&str] = &["aggregate", "registry", "base"];

/// Builds a detector from configuration
pub type DetectorFactory = fn(&InspectorConfig) -> Result<Arc<dyn Detector>, DetectorError>;

/// Produces a plugin when the catalog is discovered
pub type PluginLoader = Box<dyn Fn() -> Result<Arc<dyn DetectorPlugin>, PluginError> + Send + Sync>;

/// A plugin unit that could not be loaded
#[derive(Debug, Error)]
pub enum PluginError {
    #[error("plugin unit {unit} failed to load: {reason}")]
    Load { unit: String, reason: String },

    #[error("plugin unit {unit} depends on {dependency}, which is missing")]
    MissingDependency { unit: String, dependency: String },
}

/// A registered detector plugin: a name plus a way to build the detector
pub trait DetectorPlugin: Send + Sync {
    fn name(&self) -> &str;

    fn create(&self, config: &InspectorConfig) -> Result<Arc<dyn Detector>, DetectorError>;
}

/// Plugin backed by a plain factory function
pub struct FactoryPlugin {
    name: &'static str,
    factory: DetectorFactory,
}

impl FactoryPlugin {
    pub fn new(name: &'static str, factory: DetectorFactory) -> Self {
        Self { name, factory }
    }
}

impl DetectorPlugin for FactoryPlugin {
    fn name(&self) -> &str {
        self.name
    }

    fn create(&self, config: &InspectorConfig) -> Result<Arc<dyn Detector>, DetectorError> {
        (self.factory)(config)
    }
}

struct PluginUnit {
    label: String,
    loader: PluginLoader,
}

/// Table of plugin units, registered once at startup
#[derive(Default)]
pub struct PluginCatalog {
    units: Vec<PluginUnit>,
}

impl PluginCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog with the detectors shipped in this crate
    pub fn builtin() -> Self {
        Self::new()
            .with_factory(prompt_injection::DETECTOR_NAME, |config| {
                Ok(Arc::new(PromptInjectionDetector::from_config(config)?))
            })
            .with_factory(jailbreak::DETECTOR_NAME, |config| {
                Ok(Arc::new(JailbreakDetector::from_config(config)?))
            })
            .with_factory(pii::DETECTOR_NAME, |_| Ok(Arc::new(PiiDetector::new()?)))
    }

    /// Register a unit whose loader runs at discovery time
    pub fn register<F>(&mut self, label: impl Into<String>, loader: F)
    where
        F: Fn() -> Result<Arc<dyn DetectorPlugin>, PluginError> + Send + Sync + 'static,
    {
        self.units.push(PluginUnit {
            label: label.into(),
            loader: Box::new(loader),
        });
    }

    /// Register an already-built plugin
    pub fn with_plugin(mut self, plugin: Arc<dyn DetectorPlugin>) -> Self {
        let label = plugin.name().to_string();
        self.register(label, move || Ok(plugin.clone()));
        self
    }

    /// Register a plugin from a name and factory function
    pub fn with_factory(self, name: &'static str, factory: DetectorFactory) -> Self {
        self.with_plugin(Arc::new(FactoryPlugin::new(name, factory)))
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}

#[derive(Default)]
struct Discovery {
    discovered: bool,
    /// Plugin names in discovery order
    order: Vec<String>,
    plugins: HashMap<String, Arc<dyn DetectorPlugin>>,
}

/// Registry of detector plugins and their live instances
pub struct DetectorRegistry {
    catalog: PluginCatalog,
    discovery: RwLock<Discovery>,
    instances: RwLock<HashMap<String, Arc<dyn Detector>>>,
}

impl DetectorRegistry {
    pub fn new(catalog: PluginCatalog) -> Self {
        Self {
            catalog,
            discovery: RwLock::new(Discovery::default()),
            instances: RwLock::new(HashMap::new()),
        }
    }

    /// Registry over the built-in detectors
    pub fn builtin() -> Self {
        Self::new(PluginCatalog::builtin())
    }

    /// Load every catalog unit. Runs once until [`reset`](Self::reset).
    pub async fn discover(&self) {
        if self.discovery.read().await.discovered {
            return;
        }

        let mut discovery = self.discovery.write().await;
        if discovery.discovered {
            return;
        }

        for unit in &self.catalog.units {
            let plugin = match catch_unwind(AssertUnwindSafe(|| (unit.loader)())) {
                Ok(Ok(plugin)) => plugin,
                Ok(Err(e)) => {
                    warn!(unit = %unit.label, error = %e, "Skipping plugin unit");
                    continue;
                }
                Err(_) => {
                    warn!(unit = %unit.label, "Plugin unit panicked while loading, skipping");
                    continue;
                }
            };

            let name = plugin.name().to_string();
            if name.is_empty() || RESERVED_NAMES.contains(&name.as_str()) {
                warn!(unit = %unit.label, name = %name, "Skipping plugin with reserved or empty name");
                continue;
            }

            if discovery.plugins.insert(name.clone(), plugin).is_some() {
                warn!(unit = %unit.label, name = %name, "Plugin name registered twice, keeping the later one");
            } else {
                discovery.order.push(name);
            }
        }

        discovery.discovered = true;
        info!(detectors = ?discovery.order, "Detector plugins discovered");
    }

    /// Names of every discovered plugin, in discovery order
    pub async fn available_detectors(&self) -> Vec<String> {
        self.discover().await;
        self.discovery.read().await.order.clone()
    }

    /// Look up a live detector, constructing and caching it on first use.
    ///
    /// Returns `None` when nothing is registered under `name` or when the
    /// detector cannot be built or is unavailable.
    pub async fn get_detector(
        &self,
        name: &str,
        config: &InspectorConfig,
    ) -> Option<Arc<dyn Detector>> {
        self.discover().await;

        if let Some(detector) = self.instances.read().await.get(name) {
            return Some(detector.clone());
        }

        let Some(plugin) = self.discovery.read().await.plugins.get(name).cloned() else {
            debug!(detector = name, "No plugin registered under this name");
            return None;
        };

        let detector = self.construct(name, plugin, config).await?;

        let mut instances = self.instances.write().await;
        let cached = instances.entry(name.to_string()).or_insert(detector);
        debug!(detector = name, "Detector instantiated");
        Some(cached.clone())
    }

    /// Run a plugin factory on the blocking pool, bounded by the configured
    /// timeout, and check the result is available.
    async fn construct(
        &self,
        name: &str,
        plugin: Arc<dyn DetectorPlugin>,
        config: &InspectorConfig,
    ) -> Option<Arc<dyn Detector>> {
        let timeout = config.detection.timeout;
        let config = config.clone();
        let owned_name = name.to_string();
        let task = tokio::task::spawn_blocking(move || -> Result<Arc<dyn Detector>, DetectorError> {
            let detector = plugin.create(&config)?;
            if detector.is_available() {
                Ok(detector)
            } else {
                Err(DetectorError::Unavailable(owned_name))
            }
        });

        let joined = match timeout {
            Some(limit) => match tokio::time::timeout(limit, task).await {
                Ok(joined) => joined,
                Err(_) => {
                    warn!(detector = name, timeout_ms = limit.as_millis() as u64, "Detector construction timed out");
                    return None;
                }
            },
            None => task.await,
        };

        match joined {
            Ok(Ok(detector)) => Some(detector),
            Ok(Err(e)) => {
                warn!(detector = name, error = %e, "Detector could not be instantiated");
                None
            }
            Err(e) if e.is_panic() => {
                warn!(detector = name, "Detector factory panicked");
                None
            }
            Err(e) => {
                warn!(detector = name, error = %e, "Detector construction was cancelled");
                None
            }
        }
    }

    /// Whether a live instance is cached under `name`
    pub async fn is_cached(&self, name: &str) -> bool {
        self.instances.read().await.contains_key(name)
    }

    /// Forget every discovered plugin and cached detector
    pub async fn reset(&self) {
        let mut discovery = self.discovery.write().await;
        let mut instances = self.instances.write().await;
        *discovery = Discovery::default();
        instances.clear();
        debug!("Detector registry reset");
    }
}

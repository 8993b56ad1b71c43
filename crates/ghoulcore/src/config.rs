//! # Configuration
//!
//! `Config` is the resolved, immutable snapshot that travels with every
//! request. `Settings` is the live store a context reads snapshots from.
//!
//! Resolution order for [`Config::load`]: defaults, then `ghoul.toml`, then
//! `GHOUL_*` environment variables.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use figment::Figment;
use figment::providers::Env;
use figment::providers::Format;
use figment::providers::Serialized;
use figment::providers::Toml;
use serde::Deserialize;
use serde::Serialize;
use sref::Reactive;
use sref::Subscription;

pub const CONFIG_FILE: &str = "ghoul.toml";
pub const ENV_PREFIX: &str = "GHOUL_";

#[derive(Debug, Clone)]
pub enum ConfigError {
    /// A provider failed or the merged values did not fit `Config`.
    Load(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Load(msg) => write!(f, "Failed to load configuration: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<figment::Error> for ConfigError {
    fn from(e: figment::Error) -> Self {
        Self::Load(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Options relevant to command execution.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Run commands in the worker context instead of the caller's.
    pub use_worker: bool,
    /// Directory the engine searches for its resources (`-I<dir>`).
    pub resource_base: Option<String>,
    /// Upper bound on how long a worker call waits for its response.
    /// `None` waits until a response or a channel fault.
    pub request_timeout_ms: Option<u64>,
}

impl Config {
    /// Resolves configuration from the working directory and environment.
    pub fn load() -> Result<Self> {
        Self::load_from(Path::new(CONFIG_FILE))
    }

    /// Resolves configuration from a specific TOML file and the environment.
    /// A missing file is not an error.
    pub fn load_from(path: &Path) -> Result<Self> {
        let config = Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX))
            .extract()?;
        Ok(config)
    }

    /// Returns a copy with every field set in `patch` replaced.
    pub fn merge(&self, patch: &ConfigPatch) -> Self {
        Self {
            use_worker: patch.use_worker.unwrap_or(self.use_worker),
            resource_base: patch
                .resource_base
                .clone()
                .or_else(|| self.resource_base.clone()),
            request_timeout_ms: patch.request_timeout_ms.or(self.request_timeout_ms),
        }
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_ms.map(Duration::from_millis)
    }
}

/// A partial `Config`; unset fields keep their current value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigPatch {
    pub use_worker: Option<bool>,
    pub resource_base: Option<String>,
    pub request_timeout_ms: Option<u64>,
}

impl ConfigPatch {
    pub fn use_worker(mut self, enabled: bool) -> Self {
        self.use_worker = Some(enabled);
        self
    }

    pub fn resource_base(mut self, base: impl Into<String>) -> Self {
        self.resource_base = Some(base.into());
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout_ms = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
        self
    }
}

/// Live configuration for one execution context.
///
/// Snapshots are `Arc<Config>`; every change replaces the whole snapshot, so
/// a reader never observes a half-applied configuration.
#[derive(Debug, Clone)]
pub struct Settings {
    current: Reactive<Arc<Config>>,
}

impl Settings {
    pub fn new(config: Config) -> Self {
        Self {
            current: Reactive::new(Arc::new(config)),
        }
    }

    pub fn snapshot(&self) -> Arc<Config> {
        self.current.get()
    }

    /// Replaces the configuration wholesale.
    pub fn apply(&self, snapshot: Arc<Config>) {
        self.current.set(snapshot);
    }

    /// Merges a patch into the current configuration.
    pub fn configure(&self, patch: &ConfigPatch) {
        self.current
            .update(|config| *config = Arc::new(config.merge(patch)));
    }

    /// Observes every configuration change.
    pub fn watch<F>(&self, f: F) -> Subscription<Arc<Config>>
    where
        F: Fn(&Arc<Config>) + Send + Sync + 'static,
    {
        self.current.on_change(f)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

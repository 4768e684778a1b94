//! Daemon configuration.
//!
//! Values come from an optional YAML file, then command-line overrides, then
//! [`DaemonConfig::resolve`] anchors relative paths under the root.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default listen address for the RPC/event endpoint
pub const DEFAULT_LISTEN: &str = "0.0.0.0:9090";

/// Get the minion home directory (`~/.minion`)
pub fn get_minion_home() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join(".minion")
}

/// Get the default config file path (`~/.minion/minion.yaml`)
pub fn get_default_config_file() -> PathBuf {
    get_minion_home().join("minion.yaml")
}

/// External toolchain used to fetch, build and clean services.
///
/// Step templates are argv vectors; `{id}` and `{source}` are substituted
/// per invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolchainConfig {
    /// Toolchain root, relative to the daemon root
    pub root_dir: String,
    /// Variable naming the shared toolchain root
    pub root_var: String,
    /// Variable naming the per-service package/build root
    pub package_root_var: String,
    pub fetch: Vec<String>,
    pub build: Vec<String>,
    pub clean: Vec<String>,
}

impl Default for ToolchainConfig {
    fn default() -> Self {
        Self {
            root_dir: "go".to_string(),
            root_var: "GOROOT".to_string(),
            package_root_var: "GOPATH".to_string(),
            fetch: argv(&["go", "get", "-u", "{source}"]),
            build: argv(&["go", "build", "-o", "bin/{id}", "{source}"]),
            clean: argv(&["go", "clean", "{source}"]),
        }
    }
}

fn argv(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|p| p.to_string()).collect()
}

/// Root configuration of the daemon
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// Listening address and port
    pub listen: String,
    /// Minion root directory (services, toolchain, logs)
    pub root: PathBuf,
    /// Error log path (relative paths are under `root`)
    pub error_log: PathBuf,
    /// Access log path (relative paths are under `root`)
    pub access_log: PathBuf,
    /// Do not mirror the error log to the console
    pub quiet: bool,
    /// Stats publishing period
    pub stats_interval_ms: u64,
    /// Timeout for a lifecycle command, 0 disables it
    pub command_timeout_secs: u64,
    /// Timeout for a fetch/build/clean step, 0 disables it
    pub tool_timeout_secs: u64,
    pub toolchain: ToolchainConfig,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            listen: DEFAULT_LISTEN.to_string(),
            root: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            error_log: PathBuf::from("log/error.log"),
            access_log: PathBuf::from("log/access.log"),
            quiet: false,
            stats_interval_ms: 1000,
            command_timeout_secs: 300,
            tool_timeout_secs: 600,
            toolchain: ToolchainConfig::default(),
        }
    }
}

impl DaemonConfig {
    /// Load configuration from a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read config '{}': {}", path.display(), e))?;
        Self::parse(&content)
            .map_err(|e| anyhow::anyhow!("Failed to parse config '{}': {}", path.display(), e))
    }

    /// Parse configuration from a YAML string
    pub fn parse(yaml: &str) -> anyhow::Result<Self> {
        let config: DaemonConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path` if given, else `~/.minion/minion.yaml` if present, else defaults.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(p) => Self::from_file(p),
            None => {
                let default_path = get_default_config_file();
                if default_path.exists() {
                    log::info!("Loading config from {}", default_path.display());
                    Self::from_file(default_path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    fn validate(&self) -> anyhow::Result<()> {
        for (name, steps) in [
            ("fetch", &self.toolchain.fetch),
            ("build", &self.toolchain.build),
            ("clean", &self.toolchain.clean),
        ] {
            if steps.is_empty() || steps[0].is_empty() {
                anyhow::bail!("toolchain.{} must name a program", name);
            }
        }
        if self.stats_interval_ms == 0 {
            anyhow::bail!("stats_interval_ms must be greater than zero");
        }
        Ok(())
    }

    /// Make `root` absolute and anchor relative log paths under it.
    pub fn resolve(mut self) -> anyhow::Result<Self> {
        self.validate()?;
        if !self.root.is_absolute() {
            self.root = std::env::current_dir()?.join(&self.root);
        }
        if !self.error_log.is_absolute() {
            self.error_log = self.root.join(&self.error_log);
        }
        if !self.access_log.is_absolute() {
            self.access_log = self.root.join(&self.access_log);
        }
        Ok(self)
    }

    pub fn stats_interval(&self) -> Duration {
        Duration::from_millis(self.stats_interval_ms)
    }

    pub fn command_timeout(&self) -> Option<Duration> {
        (self.command_timeout_secs > 0).then(|| Duration::from_secs(self.command_timeout_secs))
    }

    pub fn tool_timeout(&self) -> Option<Duration> {
        (self.tool_timeout_secs > 0).then(|| Duration::from_secs(self.tool_timeout_secs))
    }
}

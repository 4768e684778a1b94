//! On-disk layout and per-service environment.
//!
//! Every subprocess spawned for a service (lifecycle commands and toolchain
//! steps alike) runs with exactly the variables produced by [`service_env`];
//! the daemon's own environment is not inherited.

use crate::config::ToolchainConfig;
use std::path::{Path, PathBuf};

/// Paths derived from the daemon root.
#[derive(Debug, Clone)]
pub struct Layout {
    root: PathBuf,
    toolchain_root: PathBuf,
    /// `PATH` of the daemon, captured once at startup
    inherited_path: String,
}

impl Layout {
    /// Create a layout rooted at `root`, capturing the current `PATH`.
    pub fn new(root: impl Into<PathBuf>, toolchain: &ToolchainConfig) -> Self {
        let root = root.into();
        let toolchain_root = root.join(&toolchain.root_dir);
        Self {
            root,
            toolchain_root,
            inherited_path: std::env::var("PATH").unwrap_or_default(),
        }
    }

    /// Override the inherited `PATH` (tests, restricted deployments).
    pub fn with_inherited_path(mut self, path: impl Into<String>) -> Self {
        self.inherited_path = path.into();
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Isolated working directory and package root of a service: `root/svc/<id>`.
    pub fn service_dir(&self, id: &str) -> PathBuf {
        self.root.join("svc").join(id)
    }

    /// Executable built for a service: `root/svc/<id>/bin/<id>`.
    pub fn executable(&self, id: &str) -> PathBuf {
        self.service_dir(id).join("bin").join(id)
    }

    /// Shared installed-binary path: `root/bin/<id>`.
    pub fn installed_binary(&self, id: &str) -> PathBuf {
        self.root.join("bin").join(id)
    }

    /// Shared source checkout: `root/src/<source>`.
    pub fn source_dir(&self, source: &str) -> PathBuf {
        self.root.join("src").join(source)
    }

    pub fn toolchain_root(&self) -> &Path {
        &self.toolchain_root
    }

    pub fn toolchain_bin(&self) -> PathBuf {
        self.toolchain_root.join("bin")
    }
}

/// Build the environment for any subprocess of service `id`.
///
/// Deterministic for a given layout; no I/O.
pub fn service_env(
    layout: &Layout,
    toolchain: &ToolchainConfig,
    id: &str,
    source: &str,
) -> Vec<(String, String)> {
    let service_dir = layout.service_dir(id).to_string_lossy().into_owned();
    let search_path = if layout.inherited_path.is_empty() {
        layout.toolchain_bin().to_string_lossy().into_owned()
    } else {
        format!(
            "{}:{}",
            layout.inherited_path,
            layout.toolchain_bin().display()
        )
    };

    vec![
        (toolchain.package_root_var.clone(), service_dir.clone()),
        (
            toolchain.root_var.clone(),
            layout.toolchain_root().to_string_lossy().into_owned(),
        ),
        ("PATH".to_string(), search_path),
        ("SERVICE_NAME".to_string(), id.to_string()),
        ("SERVICE_URL".to_string(), source.to_string()),
        ("SERVICE_PATH".to_string(), service_dir),
    ]
}

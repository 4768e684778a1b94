//! Lifecycle manager
//!
//! Composes registry lookups with command-runner invocations. Operations on
//! the same service id are serialised; different ids proceed in parallel.

use crate::daemon::environment::Layout;
use crate::daemon::error::{Result, ServiceError};
use crate::daemon::registry::ServiceRegistry;
use crate::daemon::runner::{LifecycleCommand, Params, ProcessExecutor, ServiceExecutor, ToolStep};
use crate::validation::{validate_service_id, validate_source};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Counter values reported by a service's `stats` command.
pub type Stats = BTreeMap<String, i64>;

/// One async lock per service id, created on demand.
#[derive(Default)]
struct OperationLocks {
    locks: std::sync::Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl OperationLocks {
    async fn acquire(&self, id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            // Drop locks nobody holds or waits on
            locks.retain(|key, lock| key == id || Arc::strong_count(lock) > 1);
            Arc::clone(locks.entry(id.to_string()).or_default())
        };
        lock.lock_owned().await
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.locks.lock().unwrap().len()
    }
}

pub struct ServiceManager<E: ServiceExecutor = ProcessExecutor> {
    registry: ServiceRegistry,
    executor: E,
    layout: Layout,
    locks: OperationLocks,
}

impl<E: ServiceExecutor> ServiceManager<E> {
    pub fn new(layout: Layout, executor: E) -> Self {
        Self {
            registry: ServiceRegistry::new(),
            executor,
            layout,
            locks: OperationLocks::default(),
        }
    }

    pub fn registry(&self) -> &ServiceRegistry {
        &self.registry
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn list(&self) -> HashMap<String, String> {
        self.registry.list()
    }

    pub fn exists(&self, id: &str) -> bool {
        self.registry.exists(id)
    }

    /// Fetch and build `source`, register it as `id`, then run its `install`
    /// command with `params`.
    ///
    /// The registry is untouched when fetch or build fails. A failing
    /// `install` command is returned to the caller but the service stays
    /// registered.
    pub async fn install(&self, id: &str, source: &str, params: &Params) -> Result<String> {
        validate_service_id(id).map_err(ServiceError::InvalidInput)?;
        validate_source(source).map_err(ServiceError::InvalidInput)?;

        let _guard = self.locks.acquire(id).await;

        if self.registry.exists(id) {
            return Err(ServiceError::AlreadyExists(id.to_string()));
        }

        log::info!("[{}] Installing from {}", id, source);

        let service_dir = self.layout.service_dir(id);
        tokio::fs::create_dir_all(&service_dir)
            .await
            .map_err(|e| ServiceError::filesystem(&service_dir, e))?;

        self.executor.run_tool(id, source, ToolStep::Fetch).await?;
        self.executor.run_tool(id, source, ToolStep::Build).await?;

        self.registry.add(id, source)?;

        match self
            .executor
            .run_command(id, source, LifecycleCommand::Install, params)
            .await
        {
            Ok(output) => {
                log::info!("[{}] Installed", id);
                Ok(output)
            }
            Err(e) => {
                log::warn!("[{}] Registered but install command failed: {}", id, e);
                Err(e)
            }
        }
    }

    /// Deregister `id`, run its `remove` command and clean its artifacts.
    ///
    /// Deregistration happens first and is never reversed, even if a later
    /// step fails and leaves artifacts behind.
    pub async fn remove(&self, id: &str) -> Result<String> {
        let _guard = self.locks.acquire(id).await;

        let source = self
            .registry
            .lookup(id)
            .ok_or_else(|| ServiceError::NotFound(id.to_string()))?;
        self.registry.remove(id)?;

        log::info!("[{}] Removing", id);

        let output = self
            .executor
            .run_command(id, &source, LifecycleCommand::Remove, &Params::new())
            .await?;
        self.executor.run_tool(id, &source, ToolStep::Clean).await?;

        for path in [
            self.layout.source_dir(&source),
            self.layout.installed_binary(id),
            self.layout.service_dir(id),
        ] {
            remove_path(&path).await?;
        }

        log::info!("[{}] Removed", id);
        Ok(output)
    }

    pub async fn status(&self, id: &str) -> Result<String> {
        self.passthrough(id, LifecycleCommand::Status).await
    }

    pub async fn start(&self, id: &str) -> Result<String> {
        self.passthrough(id, LifecycleCommand::Start).await
    }

    pub async fn stop(&self, id: &str) -> Result<String> {
        self.passthrough(id, LifecycleCommand::Stop).await
    }

    /// Raw output of the `stats` command.
    pub async fn stats_raw(&self, id: &str) -> Result<String> {
        self.passthrough(id, LifecycleCommand::Stats).await
    }

    /// `stats` output decoded as a counter map.
    pub async fn stats(&self, id: &str) -> Result<Stats> {
        let raw = self.stats_raw(id).await?;
        serde_json::from_str(&raw).map_err(ServiceError::Parse)
    }

    async fn passthrough(&self, id: &str, command: LifecycleCommand) -> Result<String> {
        let _guard = self.locks.acquire(id).await;
        let source = self
            .registry
            .lookup(id)
            .ok_or_else(|| ServiceError::NotFound(id.to_string()))?;
        self.executor
            .run_command(id, &source, command, &Params::new())
            .await
    }
}

/// Remove a file or directory tree; a missing path is fine.
async fn remove_path(path: &Path) -> Result<()> {
    let result = match tokio::fs::symlink_metadata(path).await {
        Ok(meta) if meta.is_dir() => tokio::fs::remove_dir_all(path).await,
        Ok(_) => tokio::fs::remove_file(path).await,
        Err(e) => Err(e),
    };
    match result {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(ServiceError::filesystem(path, e)),
    }
}

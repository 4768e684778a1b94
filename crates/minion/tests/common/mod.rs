//! Shared fixtures for integration tests.
//!
//! The "toolchain" is plain `sh`: build copies a fixture script into
//! `bin/<id>` of the service directory, so no real compiler is needed.

#![allow(dead_code)]

use minion::config::{DaemonConfig, ToolchainConfig};
use minion::daemon::environment::Layout;
use minion::daemon::{ProcessExecutor, ServiceManager};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

/// Service executable answering the lifecycle vocabulary.
///
/// `broken` fails its stats command and `garbled` prints non-JSON stats.
pub const SERVICE_SCRIPT: &str = r#"#!/bin/sh
case "$1" in
  install)
    cat > params.json
    printf 'ok'
    ;;
  start)
    echo "started $SERVICE_NAME"
    ;;
  status)
    printf '%s %s ' "$SERVICE_NAME" "$SERVICE_URL"
    cat
    ;;
  stats)
    if [ "$SERVICE_NAME" = "broken" ]; then
      echo "stats unavailable" >&2
      exit 1
    fi
    if [ "$SERVICE_NAME" = "garbled" ]; then
      echo "ops=42"
      exit 0
    fi
    printf '{"ops":42}'
    ;;
  stop)
    echo "not running" >&2
    exit 2
    ;;
  remove)
    echo "removed $SERVICE_NAME"
    ;;
  *)
    echo "unknown command: $1" >&2
    exit 64
    ;;
esac
"#;

pub struct Fixture {
    /// Keeps the temporary tree alive
    pub dir: TempDir,
    pub config: DaemonConfig,
}

impl Fixture {
    pub fn root(&self) -> &Path {
        &self.config.root
    }

    pub fn layout(&self) -> Layout {
        Layout::new(&self.config.root, &self.config.toolchain)
    }

    pub fn manager(&self) -> Arc<ServiceManager<ProcessExecutor>> {
        Arc::new(ServiceManager::new(
            self.layout(),
            ProcessExecutor::from_config(&self.config),
        ))
    }
}

fn sh(script: String) -> Vec<String> {
    vec!["sh".to_string(), "-c".to_string(), script]
}

/// Daemon root in a fresh temporary directory with the shell toolchain.
pub fn fixture() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(dir.path());
    let root = dir.path().join("root");
    std::fs::create_dir_all(&root).unwrap();

    let toolchain = ToolchainConfig {
        fetch: sh("echo fetched {source}".to_string()),
        build: sh(format!(
            "mkdir -p bin && cp '{}' bin/{{id}} && chmod 755 bin/{{id}}",
            script.display()
        )),
        clean: sh("echo cleaned {source}".to_string()),
        ..Default::default()
    };

    let config = DaemonConfig {
        listen: "127.0.0.1:0".to_string(),
        root,
        quiet: true,
        stats_interval_ms: 100,
        command_timeout_secs: 30,
        tool_timeout_secs: 30,
        toolchain,
        ..Default::default()
    }
    .resolve()
    .unwrap();

    Fixture { dir, config }
}

/// Fixture whose build step always fails.
pub fn failing_build_fixture() -> Fixture {
    let mut fixture = fixture();
    fixture.config.toolchain.build = sh("echo 'cannot build {source}' >&2; exit 1".to_string());
    fixture
}

fn write_script(dir: &Path) -> PathBuf {
    let path = dir.join("service.sh");
    std::fs::write(&path, SERVICE_SCRIPT).unwrap();
    path
}

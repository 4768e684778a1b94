//! Minion daemon
//!
//! Usage:
//!   minion                              # Listen on 0.0.0.0:9090, root = cwd
//!   minion --listen 127.0.0.1:9191      # Custom listen address
//!   minion --root /srv/minion --quiet   # Custom root, no console logging
//!   minion --config minion.yaml         # Load settings from YAML

use argh::FromArgs;
use minion::config::DaemonConfig;
use std::path::PathBuf;

/// Minion - local service lifecycle daemon
#[derive(FromArgs)]
struct Args {
    /// show version information
    #[argh(switch, short = 'V')]
    version: bool,

    /// configuration file (default: ~/.minion/minion.yaml if present)
    #[argh(option, short = 'c')]
    config: Option<PathBuf>,

    /// listening address and port (default: 0.0.0.0:9090)
    #[argh(option, short = 'l')]
    listen: Option<String>,

    /// minion root directory (default: current directory)
    #[argh(option, short = 'r')]
    root: Option<PathBuf>,

    /// error log path, relative to root (default: log/error.log)
    #[argh(option)]
    error: Option<PathBuf>,

    /// access log path, relative to root (default: log/access.log)
    #[argh(option)]
    access: Option<PathBuf>,

    /// do not print the error log to the console
    #[argh(switch, short = 'q')]
    quiet: bool,
}

impl Args {
    /// Command-line values override the config file.
    fn apply(self, mut config: DaemonConfig) -> DaemonConfig {
        if let Some(listen) = self.listen {
            config.listen = listen;
        }
        if let Some(root) = self.root {
            config.root = root;
        }
        if let Some(error) = self.error {
            config.error_log = error;
        }
        if let Some(access) = self.access {
            config.access_log = access;
        }
        if self.quiet {
            config.quiet = true;
        }
        config
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let args: Args = argh::from_env();

    // Handle --version flag
    if args.version {
        println!("minion {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let config = DaemonConfig::load(args.config.as_deref())?;
    let config = args.apply(config).resolve()?;

    minion::logging::init(&config)?;
    log::info!(
        "Logging to {} (access: {})",
        config.error_log.display(),
        config.access_log.display()
    );

    minion::daemon::run(config).await
}

//! Log sinks of the daemon.
//!
//! Records on the `access` target go to the access log. Everything else goes
//! to the error log, mirrored to stderr unless running quiet.

use crate::config::DaemonConfig;
use anyhow::Context;
use env_logger::{Builder, Env, Logger, Target};
use log::{LevelFilter, Log, Metadata, Record};
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

/// Log target of HTTP access records
pub const ACCESS_TARGET: &str = "access";

/// Writes everything to a file and to stderr
struct Tee {
    file: File,
}

impl Write for Tee {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file.write_all(buf)?;
        io::stderr().write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()?;
        io::stderr().flush()
    }
}

/// Logger dispatching records to the access or error sink by target.
pub struct SplitLogger {
    access: Logger,
    errors: Logger,
}

impl SplitLogger {
    pub fn new(config: &DaemonConfig) -> anyhow::Result<Self> {
        let access_file = open_log(&config.access_log)?;
        let error_file = open_log(&config.error_log)?;

        let access = Builder::new()
            .filter_level(LevelFilter::Info)
            .format(|buf, record| {
                let ts = buf.timestamp();
                writeln!(buf, "{} {}", ts, record.args())
            })
            .target(Target::Pipe(Box::new(access_file)))
            .build();

        let error_target: Box<dyn Write + Send> = if config.quiet {
            Box::new(error_file)
        } else {
            Box::new(Tee { file: error_file })
        };
        let errors = Builder::from_env(Env::default().default_filter_or("info"))
            .write_style(env_logger::WriteStyle::Never)
            .target(Target::Pipe(error_target))
            .build();

        Ok(Self { access, errors })
    }

    fn sink(&self, target: &str) -> &Logger {
        if target == ACCESS_TARGET {
            &self.access
        } else {
            &self.errors
        }
    }

    pub fn max_level(&self) -> LevelFilter {
        self.access.filter().max(self.errors.filter())
    }
}

impl Log for SplitLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        self.sink(metadata.target()).enabled(metadata)
    }

    fn log(&self, record: &Record) {
        let sink = self.sink(record.target());
        if sink.matches(record) {
            sink.log(record);
        }
    }

    fn flush(&self) {
        self.access.flush();
        self.errors.flush();
    }
}

/// Install the daemon logger. Fails if log files cannot be opened or a
/// logger is already installed.
pub fn init(config: &DaemonConfig) -> anyhow::Result<()> {
    let logger = SplitLogger::new(config)?;
    let max_level = logger.max_level();
    log::set_boxed_logger(Box::new(logger)).context("Logger already initialized")?;
    log::set_max_level(max_level);
    Ok(())
}

fn open_log(path: &Path) -> anyhow::Result<File> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create log directory {}", parent.display()))?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open log file {}", path.display()))
}

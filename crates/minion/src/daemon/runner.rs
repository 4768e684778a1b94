//! Command runner
//!
//! Invokes lifecycle subcommands (`<executable> <command>`) and toolchain
//! steps (fetch/build/clean) as subprocesses. Combined stdout/stderr is the
//! result on exit code zero and the error detail otherwise.

use crate::config::{DaemonConfig, ToolchainConfig};
use crate::daemon::environment::{service_env, Layout};
use crate::daemon::error::{Result, ServiceError};
use std::fmt;
use std::future::Future;
use std::io::Read;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Parameter payload delivered to a lifecycle command on stdin.
pub type Params = serde_json::Map<String, serde_json::Value>;

/// Subcommands every managed service executable understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleCommand {
    Install,
    Start,
    Stop,
    Status,
    Stats,
    Remove,
}

impl LifecycleCommand {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleCommand::Install => "install",
            LifecycleCommand::Start => "start",
            LifecycleCommand::Stop => "stop",
            LifecycleCommand::Status => "status",
            LifecycleCommand::Stats => "stats",
            LifecycleCommand::Remove => "remove",
        }
    }
}

impl fmt::Display for LifecycleCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// External toolchain invocations used to materialize or clean a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolStep {
    Fetch,
    Build,
    Clean,
}

impl fmt::Display for ToolStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ToolStep::Fetch => "fetch",
            ToolStep::Build => "build",
            ToolStep::Clean => "clean",
        };
        f.write_str(s)
    }
}

/// Abstraction over subprocess execution.
///
/// The lifecycle manager calls this trait instead of spawning processes
/// directly, which keeps it testable with a scripted executor.
pub trait ServiceExecutor: Send + Sync + 'static {
    /// Run `<executable> <command>` for a service with `params` on stdin.
    fn run_command(
        &self,
        id: &str,
        source: &str,
        command: LifecycleCommand,
        params: &Params,
    ) -> impl Future<Output = Result<String>> + Send;

    /// Run one toolchain step for a service.
    fn run_tool(
        &self,
        id: &str,
        source: &str,
        step: ToolStep,
    ) -> impl Future<Output = Result<String>> + Send;
}

/// Real executor spawning child processes.
pub struct ProcessExecutor {
    layout: Layout,
    toolchain: ToolchainConfig,
    command_timeout: Option<Duration>,
    tool_timeout: Option<Duration>,
}

impl ProcessExecutor {
    /// Create an executor with no timeouts.
    pub fn new(layout: Layout, toolchain: ToolchainConfig) -> Self {
        Self {
            layout,
            toolchain,
            command_timeout: None,
            tool_timeout: None,
        }
    }

    pub fn from_config(config: &DaemonConfig) -> Self {
        Self::new(Layout::new(&config.root, &config.toolchain), config.toolchain.clone())
            .with_timeouts(config.command_timeout(), config.tool_timeout())
    }

    pub fn with_timeouts(mut self, command: Option<Duration>, tool: Option<Duration>) -> Self {
        self.command_timeout = command;
        self.tool_timeout = tool;
        self
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    fn command_for(&self, program: impl AsRef<std::ffi::OsStr>, id: &str, source: &str) -> Command {
        let mut cmd = Command::new(program);
        cmd.current_dir(self.layout.service_dir(id))
            .env_clear()
            .envs(service_env(&self.layout, &self.toolchain, id, source));
        cmd
    }

    fn tool_argv(&self, step: ToolStep, id: &str, source: &str) -> Vec<String> {
        let template = match step {
            ToolStep::Fetch => &self.toolchain.fetch,
            ToolStep::Build => &self.toolchain.build,
            ToolStep::Clean => &self.toolchain.clean,
        };
        template
            .iter()
            .map(|arg| arg.replace("{id}", id).replace("{source}", source))
            .collect()
    }
}

impl ServiceExecutor for ProcessExecutor {
    async fn run_command(
        &self,
        id: &str,
        source: &str,
        command: LifecycleCommand,
        params: &Params,
    ) -> Result<String> {
        // Encode before spawning: a bad payload must not start the process
        let payload = serde_json::to_vec(params).map_err(ServiceError::Serialization)?;

        let executable = self.layout.executable(id);
        let mut cmd = self.command_for(&executable, id, source);
        cmd.arg(command.as_str());

        log::debug!("[{}] running {} {}", id, executable.display(), command);
        let captured = run_captured(
            cmd,
            Some(payload),
            self.command_timeout,
            &format!("Command '{}' for {}", command, id),
        )
        .await?;

        let output = captured.output_string();
        if captured.status.success() {
            Ok(output)
        } else {
            Err(ServiceError::Subprocess {
                id: id.to_string(),
                command: command.to_string(),
                code: captured.status.code(),
                output,
            })
        }
    }

    async fn run_tool(&self, id: &str, source: &str, step: ToolStep) -> Result<String> {
        let argv = self.tool_argv(step, id, source);
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| ServiceError::InvalidInput(format!("No {} command configured", step)))?;

        let mut cmd = self.command_for(program, id, source);
        cmd.args(args);

        log::info!("[{}] {}: {}", id, step, argv.join(" "));
        let captured = run_captured(
            cmd,
            None,
            self.tool_timeout,
            &format!("{} step for {}", step, id),
        )
        .await?;

        let output = captured.output_string();
        if !output.is_empty() {
            log::debug!("[{}] {} output: {}", id, step, output.trim_end());
        }
        if captured.status.success() {
            Ok(output)
        } else {
            Err(ServiceError::ExternalTool {
                step,
                code: captured.status.code(),
                output,
            })
        }
    }
}

/// Exit status plus interleaved stdout/stderr of a finished process
struct Captured {
    status: ExitStatus,
    output: Vec<u8>,
}

impl Captured {
    fn output_string(&self) -> String {
        String::from_utf8_lossy(&self.output).into_owned()
    }
}

/// Spawn `cmd`, feed `input` on stdin, and wait for exit and end of output.
///
/// stdout and stderr share one pipe, so the output keeps the order in which
/// the process wrote it.
async fn run_captured(
    mut cmd: Command,
    input: Option<Vec<u8>>,
    limit: Option<Duration>,
    what: &str,
) -> Result<Captured> {
    let program = cmd.as_std().get_program().to_string_lossy().into_owned();
    let spawn_error = |source| ServiceError::Spawn {
        program: program.clone(),
        source,
    };

    let (mut reader, writer) = std::io::pipe().map_err(spawn_error)?;
    let stderr_writer = writer.try_clone().map_err(spawn_error)?;

    cmd.stdin(if input.is_some() {
        Stdio::piped()
    } else {
        Stdio::null()
    })
    .stdout(writer)
    .stderr(stderr_writer)
    .kill_on_drop(true); // timeout drops the child, which kills it

    let spawned = cmd.spawn();
    // Release our write ends so the reader sees EOF once the child exits
    drop(cmd);
    let mut child = spawned.map_err(spawn_error)?;

    let run = async {
        let stdin = child.stdin.take();
        let feed = async {
            if let (Some(mut stdin), Some(input)) = (stdin, input) {
                // Child may exit without reading stdin
                if let Err(e) = stdin.write_all(&input).await {
                    log::debug!("{}: stdin not fully consumed: {}", program, e);
                }
            }
        };
        let collect = tokio::task::spawn_blocking(move || {
            let mut output = Vec::new();
            reader.read_to_end(&mut output).map(|_| output)
        });
        let (_, output) = tokio::join!(feed, collect);
        let output = output
            .map_err(|e| spawn_error(std::io::Error::other(e)))?
            .map_err(spawn_error)?;
        let status = child.wait().await.map_err(spawn_error)?;
        Ok::<_, ServiceError>(Captured { status, output })
    };

    match limit {
        Some(after) => match tokio::time::timeout(after, run).await {
            Ok(result) => result,
            Err(_) => {
                log::warn!("{} timed out after {}s, killing it", what, after.as_secs());
                Err(ServiceError::Timeout {
                    what: what.to_string(),
                    after,
                })
            }
        },
        None => run.await,
    }
}

// ── MockExecutor for testing ─────────────────────────────────────────────

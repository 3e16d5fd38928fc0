/// Process execution for engine and compose commands

use async_trait::async_trait;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info};

use crate::core::command::CommandSpec;
use crate::core::error::OperationError;

/// Where a command runs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecMode {
    /// Directly on this machine
    Host,
    /// `docker exec` into a running container
    Container { id: String },
    /// Ephemeral `docker run --rm` of a client image
    Image { image: String },
}

impl ExecMode {
    pub fn uses_docker(&self) -> bool {
        !matches!(self, ExecMode::Host)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionResult {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ExecutionResult {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

#[derive(Debug, Error)]
pub enum ExecError {
    #[error("Cannot write to {}: {reason}", .path.display())]
    OutputNotWritable { path: PathBuf, reason: String },

    #[error("Input file not found: {}", .path.display())]
    InputMissing { path: PathBuf },

    #[error("'{program}' was not found on this machine")]
    ToolNotFound { program: String },

    #[error("{0}")]
    Infrastructure(String),

    #[error("{program} timed out")]
    Timeout { program: String, after: Duration },

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },
}

impl From<ExecError> for OperationError {
    fn from(err: ExecError) -> Self {
        match err {
            ExecError::OutputNotWritable { path, reason } => OperationError::NoWritableLocation {
                attempts: vec![(path, reason)],
            },
            ExecError::InputMissing { path } => {
                OperationError::Precondition(format!("Input file not found: {}", path.display()))
            }
            ExecError::ToolNotFound { program } => OperationError::Precondition(format!(
                "'{}' is not installed or not on PATH",
                program
            )),
            ExecError::Infrastructure(msg) => OperationError::Infrastructure(msg),
            ExecError::Timeout { program, after } => OperationError::Timeout { what: program, after },
            ExecError::Io { context, source } => OperationError::Io { context, source },
        }
    }
}

/// Permission and read-only filesystem errors mean "try somewhere else"
pub fn is_unwritable(err: &io::Error) -> bool {
    // EROFS
    err.kind() == io::ErrorKind::PermissionDenied || err.raw_os_error() == Some(30)
}

/// Open (truncating) a file for a command's stdout
pub fn open_output(path: &Path) -> Result<std::fs::File, ExecError> {
    std::fs::File::create(path).map_err(|e| {
        if is_unwritable(&e) || e.kind() == io::ErrorKind::NotFound {
            ExecError::OutputNotWritable {
                path: path.to_path_buf(),
                reason: e.to_string(),
            }
        } else {
            ExecError::Io {
                context: format!("Failed to open {}", path.display()),
                source: e,
            }
        }
    })
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    /// Run one command to completion; a non-zero exit is not an error here
    async fn execute(&self, spec: &CommandSpec, mode: &ExecMode) -> Result<ExecutionResult, ExecError>;
}

/// Runs commands with `tokio::process`
#[derive(Debug, Clone)]
pub struct ProcessExecutor {
    timeout: Duration,
    host_gateway: String,
}

impl ProcessExecutor {
    pub fn new(timeout: Duration, host_gateway: impl Into<String>) -> Self {
        Self {
            timeout,
            host_gateway: host_gateway.into(),
        }
    }

    /// Program and arguments actually spawned for `mode`
    pub fn argv(&self, spec: &CommandSpec, mode: &ExecMode) -> Vec<String> {
        let mut argv = Vec::new();
        let interactive = spec.stdin_from.is_some();

        match mode {
            ExecMode::Host => {}
            ExecMode::Container { id } => {
                argv.extend(["docker".to_string(), "exec".to_string()]);
                if interactive {
                    argv.push("-i".to_string());
                }
                // values come from the docker client's environment, never argv
                for (key, _) in &spec.env {
                    argv.extend(["-e".to_string(), key.clone()]);
                }
                argv.push(id.clone());
            }
            ExecMode::Image { image } => {
                argv.extend(["docker".to_string(), "run".to_string(), "--rm".to_string()]);
                if interactive {
                    argv.push("-i".to_string());
                }
                argv.extend([
                    "--add-host".to_string(),
                    format!("{}:host-gateway", self.host_gateway),
                ]);
                for (key, _) in &spec.env {
                    argv.extend(["-e".to_string(), key.clone()]);
                }
                argv.push(image.clone());
            }
        }

        argv.push(spec.program.clone());
        argv.extend(spec.args.iter().cloned());
        argv
    }
}

#[async_trait]
impl CommandExecutor for ProcessExecutor {
    async fn execute(&self, spec: &CommandSpec, mode: &ExecMode) -> Result<ExecutionResult, ExecError> {
        let argv = self.argv(spec, mode);
        let limit = spec.timeout.unwrap_or(self.timeout);
        info!(command = %spec.display(), mode = ?mode, "Running command");

        let mut cmd = Command::new(&argv[0]);
        cmd.args(&argv[1..])
            .envs(spec.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(dir) = &spec.cwd {
            cmd.current_dir(dir);
        }

        match &spec.stdin_from {
            Some(path) => {
                let file = std::fs::File::open(path).map_err(|e| match e.kind() {
                    io::ErrorKind::NotFound => ExecError::InputMissing { path: path.clone() },
                    _ => ExecError::Io {
                        context: format!("Failed to open {}", path.display()),
                        source: e,
                    },
                })?;
                cmd.stdin(Stdio::from(file));
            }
            None => {
                cmd.stdin(Stdio::null());
            }
        }

        match &spec.stdout_to {
            Some(path) => {
                cmd.stdout(Stdio::from(open_output(path)?));
            }
            None => {
                cmd.stdout(Stdio::piped());
            }
        }

        let child = cmd.spawn().map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                if mode.uses_docker() {
                    ExecError::Infrastructure("docker CLI is not installed or not on PATH".to_string())
                } else {
                    ExecError::ToolNotFound {
                        program: spec.program.clone(),
                    }
                }
            } else {
                ExecError::Io {
                    context: format!("Failed to start {}", spec.program),
                    source: e,
                }
            }
        })?;

        // dropping the future on timeout kills the child
        let output = match tokio::time::timeout(limit, child.wait_with_output()).await {
            Ok(result) => result.map_err(|e| ExecError::Io {
                context: format!("Failed to wait for {}", spec.program),
                source: e,
            })?,
            Err(_) => {
                return Err(ExecError::Timeout {
                    program: spec.program.clone(),
                    after: limit,
                })
            }
        };

        let result = ExecutionResult {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        };
        debug!(program = %spec.program, exit_code = ?result.exit_code, "Command finished");

        if mode.uses_docker()
            && !result.success()
            && result.stderr.contains("Cannot connect to the Docker daemon")
        {
            return Err(ExecError::Infrastructure(spec.redact(result.stderr.trim())));
        }

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn executor() -> ProcessExecutor {
        ProcessExecutor::new(Duration::from_secs(10), "host.docker.internal")
    }

    #[test]
    fn test_argv_container_mode_passes_env_names_only() {
        let spec = CommandSpec::new("psql")
            .args(["-U", "app", "-d", "shop"])
            .secret_env("PGPASSWORD", "hunter2")
            .stdin_from("/dumps/shop.sql");
        let argv = executor().argv(&spec, &ExecMode::Container { id: "abc".into() });

        assert_eq!(
            argv,
            vec!["docker", "exec", "-i", "-e", "PGPASSWORD", "abc", "psql", "-U", "app", "-d", "shop"]
        );
        assert!(!argv.iter().any(|a| a.contains("hunter2")));
    }

    #[test]
    fn test_argv_image_mode_maps_host_gateway() {
        let spec = CommandSpec::new("redis-cli").args(["--rdb", "-"]);
        let argv = executor().argv(&spec, &ExecMode::Image { image: "redis:7.0".into() });
        assert_eq!(
            argv,
            vec![
                "docker", "run", "--rm", "--add-host", "host.docker.internal:host-gateway",
                "redis:7.0", "redis-cli", "--rdb", "-"
            ]
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stdout_redirect_and_stdin_pipe() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("in.txt");
        let output = dir.path().join("out.txt");
        std::fs::write(&input, "hello dump\n").unwrap();

        let spec = CommandSpec::new("cat").stdin_from(&input).stdout_to(&output);
        let result = executor().execute(&spec, &ExecMode::Host).await.unwrap();

        assert!(result.success());
        assert_eq!(std::fs::read_to_string(&output).unwrap(), "hello dump\n");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_non_zero_exit_is_reported_not_raised() {
        let spec = CommandSpec::new("sh").args(["-c", "echo boom >&2; exit 3"]);
        let result = executor().execute(&spec, &ExecMode::Host).await.unwrap();
        assert_eq!(result.exit_code, Some(3));
        assert_eq!(result.stderr.trim(), "boom");
    }

    #[tokio::test]
    async fn test_missing_tool() {
        let spec = CommandSpec::new("dumpdock-no-such-tool");
        let err = executor().execute(&spec, &ExecMode::Host).await.unwrap_err();
        assert!(matches!(err, ExecError::ToolNotFound { .. }));
    }

    #[tokio::test]
    async fn test_missing_input_file() {
        let spec = CommandSpec::new("cat").stdin_from("/nonexistent/dumpdock/in.sql");
        let err = executor().execute(&spec, &ExecMode::Host).await.unwrap_err();
        assert!(matches!(err, ExecError::InputMissing { .. }));
    }

    #[tokio::test]
    async fn test_output_in_missing_directory_is_unwritable() {
        let dir = TempDir::new().unwrap();
        let spec = CommandSpec::new("cat").stdout_to(dir.path().join("gone/out.sql"));
        let err = executor().execute(&spec, &ExecMode::Host).await.unwrap_err();
        assert!(matches!(err, ExecError::OutputNotWritable { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timeout_kills_child() {
        let spec = CommandSpec::new("sleep").arg("5").timeout(Duration::from_millis(100));
        let err = executor().execute(&spec, &ExecMode::Host).await.unwrap_err();
        assert!(matches!(err, ExecError::Timeout { .. }));
        let op: OperationError = err.into();
        assert_eq!(op.to_string(), "sleep timed out after 100ms");
    }
}

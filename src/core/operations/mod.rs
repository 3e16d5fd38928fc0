/// Dump and restore orchestration
///
/// `run_dump` and `run_restore` sequence path resolution, parameter
/// reconciliation, command building and execution, and always return an
/// `OperationResult`; errors from every stage end up in its message.

mod dump;
mod restore;

pub use dump::{dump_holding, dump_target, run_dump, DumpRequest};
pub use restore::{restore_holding, restore_source, run_restore, RestoreRequest};

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::core::command::Step;
use crate::core::error::{ErrorKind, OperationError};
use crate::core::executor::{
    is_unwritable, CommandExecutor, ExecError, ExecMode, ExecutionResult, ProcessExecutor,
};
use crate::core::registry::ConfigLocks;
use crate::core::stack::ContainerInspector;
use crate::utils::{AppConfig, Runner};

/// Uniform outcome of a dump or restore
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationResult {
    pub success: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stdout: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stderr: Option<String>,
    /// The artifact is not where it was requested
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub fallback: bool,
    #[serde(skip)]
    pub error_kind: Option<ErrorKind>,
}

impl OperationResult {
    pub fn succeeded(message: impl Into<String>, path: Option<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            path,
            stdout: None,
            stderr: None,
            fallback: false,
            error_kind: None,
        }
    }

    pub fn failure(err: &OperationError) -> Self {
        let (stdout, stderr) = match err {
            OperationError::Execution { stdout, stderr, .. } => (
                Some(stdout.clone()).filter(|s| !s.is_empty()),
                Some(stderr.clone()).filter(|s| !s.is_empty()),
            ),
            _ => (None, None),
        };
        Self {
            success: false,
            message: err.to_string(),
            path: None,
            stdout,
            stderr,
            fallback: false,
            error_kind: Some(err.kind()),
        }
    }
}

/// Settings the orchestrators read
#[derive(Debug, Clone)]
pub struct OperationSettings {
    /// Shared by both sides so a restore finds what the dump wrote
    pub dump_dir: PathBuf,
    pub runner: Runner,
    pub host_gateway: String,
    pub require_restore_password: bool,
}

impl From<&AppConfig> for OperationSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            dump_dir: config.dump_dir.clone(),
            runner: config.runner,
            host_gateway: config.host_gateway.clone(),
            require_restore_password: config.require_restore_password,
        }
    }
}

/// Everything an operation needs from the outside world
#[derive(Clone)]
pub struct OperationContext {
    pub settings: OperationSettings,
    pub executor: Arc<dyn CommandExecutor>,
    pub inspector: Arc<dyn ContainerInspector>,
    pub locks: ConfigLocks,
}

impl OperationContext {
    pub fn new(
        settings: OperationSettings,
        executor: Arc<dyn CommandExecutor>,
        inspector: Arc<dyn ContainerInspector>,
    ) -> Self {
        Self {
            settings,
            executor,
            inspector,
            locks: ConfigLocks::new(),
        }
    }

    /// Production wiring: child processes on this machine, containers from `inspector`
    pub fn from_config(config: &AppConfig, inspector: Arc<dyn ContainerInspector>) -> Self {
        let executor = ProcessExecutor::new(config.operation_timeout, config.host_gateway.clone());
        Self::new(OperationSettings::from(config), Arc::new(executor), inspector)
    }

    /// Execution mode when no stack container is involved
    fn default_mode(&self, image: &str) -> ExecMode {
        match self.settings.runner {
            Runner::Host => ExecMode::Host,
            Runner::Docker => ExecMode::Image {
                image: image.to_string(),
            },
        }
    }

    /// Run one built step
    async fn run_step(&self, step: &Step, mode: &ExecMode) -> Result<ExecutionResult, ExecError> {
        match step {
            Step::Command(spec) => self.executor.execute(spec, mode).await,
            Step::CopyFile { from, to } => copy_file(from, to).await,
        }
    }
}

/// In-process copy with the same error classification as a redirected command
async fn copy_file(from: &Path, to: &Path) -> Result<ExecutionResult, ExecError> {
    if tokio::fs::metadata(from).await.is_err() {
        return Err(ExecError::InputMissing {
            path: from.to_path_buf(),
        });
    }
    match tokio::fs::copy(from, to).await {
        Ok(bytes) => Ok(ExecutionResult {
            exit_code: Some(0),
            stdout: format!("copied {} bytes", bytes),
            stderr: String::new(),
        }),
        Err(e) if is_unwritable(&e) || e.kind() == std::io::ErrorKind::NotFound => {
            Err(ExecError::OutputNotWritable {
                path: to.to_path_buf(),
                reason: e.to_string(),
            })
        }
        Err(e) => Err(ExecError::Io {
            context: format!("Failed to copy {} to {}", from.display(), to.display()),
            source: e,
        }),
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Recording executor shared by the orchestrator tests

    use super::*;
    use crate::core::command::CommandSpec;
    use async_trait::async_trait;
    use std::sync::Mutex;

    type Responder = dyn Fn(&CommandSpec, &ExecMode) -> Result<ExecutionResult, ExecError> + Send + Sync;

    pub struct FakeExecutor {
        pub calls: Mutex<Vec<(CommandSpec, ExecMode)>>,
        respond: Box<Responder>,
    }

    impl FakeExecutor {
        /// Writes `contents` to any redirected stdout and exits 0
        pub fn writing(contents: &'static str) -> Self {
            Self::with(move |spec, _| {
                if let Some(path) = &spec.stdout_to {
                    std::fs::write(path, contents).map_err(|e| ExecError::OutputNotWritable {
                        path: path.clone(),
                        reason: e.to_string(),
                    })?;
                }
                Ok(ok())
            })
        }

        pub fn with<F>(respond: F) -> Self
        where
            F: Fn(&CommandSpec, &ExecMode) -> Result<ExecutionResult, ExecError> + Send + Sync + 'static,
        {
            Self {
                calls: Mutex::new(Vec::new()),
                respond: Box::new(respond),
            }
        }

        pub fn programs(&self) -> Vec<String> {
            self.calls.lock().unwrap().iter().map(|(s, _)| s.program.clone()).collect()
        }
    }

    pub fn ok() -> ExecutionResult {
        ExecutionResult {
            exit_code: Some(0),
            ..Default::default()
        }
    }

    pub fn exit(code: i32, stderr: &str) -> ExecutionResult {
        ExecutionResult {
            exit_code: Some(code),
            stdout: String::new(),
            stderr: stderr.to_string(),
        }
    }

    #[async_trait]
    impl CommandExecutor for FakeExecutor {
        async fn execute(&self, spec: &CommandSpec, mode: &ExecMode) -> Result<ExecutionResult, ExecError> {
            self.calls.lock().unwrap().push((spec.clone(), mode.clone()));
            (self.respond)(spec, mode)
        }
    }
}

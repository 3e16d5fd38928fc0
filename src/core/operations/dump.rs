use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

use super::{OperationContext, OperationResult};
use crate::core::adapters::{adapter_for, BuildOptions};
use crate::core::command::Step;
use crate::core::engine::EngineType;
use crate::core::error::OperationError;
use crate::core::executor::ExecError;
use crate::core::fallback::FallbackPolicy;
use crate::core::params::{validate_required, ConnectionParams, HOST};
use crate::core::paths::resolve_path;
use crate::core::registry::ConfigGuard;
use crate::utils::is_loopback_host;

#[derive(Debug, Clone, Deserialize)]
pub struct DumpRequest {
    pub config_name: String,
    #[serde(rename = "engine_type", alias = "db_type")]
    pub engine: EngineType,
    #[serde(rename = "connection_params", alias = "params", default)]
    pub params: ConnectionParams,
    #[serde(default)]
    pub custom_filename: Option<String>,
}

/// Where a dump for `request` lands when nothing falls back
pub fn dump_target(ctx: &OperationContext, request: &DumpRequest) -> Result<PathBuf, OperationError> {
    resolve_path(
        &ctx.settings.dump_dir,
        &request.config_name,
        request.engine,
        request.custom_filename.as_deref(),
    )
}

pub async fn run_dump(ctx: &OperationContext, request: DumpRequest) -> OperationResult {
    match ctx.locks.try_acquire(&request.config_name) {
        Ok(guard) => dump_holding(ctx, request, guard).await,
        Err(e) => OperationResult::failure(&e),
    }
}

/// Dump with the configuration lock already taken by the caller
pub async fn dump_holding(ctx: &OperationContext, request: DumpRequest, _guard: ConfigGuard) -> OperationResult {
    let name = request.config_name.clone();
    match dump(ctx, request).await {
        Ok(result) => result,
        Err(e) => {
            error!(config = %name, error = %e, "Dump failed");
            OperationResult::failure(&e)
        }
    }
}

async fn dump(ctx: &OperationContext, request: DumpRequest) -> Result<OperationResult, OperationError> {
    let engine = request.engine;
    let adapter = adapter_for(engine);
    let requested = dump_target(ctx, &request)?;
    let file_name = requested
        .file_name()
        .map(PathBuf::from)
        .ok_or_else(|| OperationError::Validation(format!("Invalid dump path {}", requested.display())))?;

    let mode = ctx.default_mode(engine.default_image());
    let mut params = request.params.clone();
    if mode.uses_docker() {
        // the client container cannot reach the host through loopback
        if let Some(host) = params.host().filter(|h| is_loopback_host(h)) {
            info!(from = %host, to = %ctx.settings.host_gateway, "Rewriting loopback host for dump container");
            params.set(HOST, ctx.settings.host_gateway.clone());
        }
    }
    validate_required(&params, engine)?;

    let step = adapter.build_dump(&params, &requested, BuildOptions::default())?;
    info!(
        config = %request.config_name,
        engine = %engine,
        target = %requested.display(),
        command = %step.display(),
        "Starting dump"
    );

    let policy = FallbackPolicy::new(&ctx.settings.dump_dir);
    let placed = policy
        .place(&file_name, |target| {
            let step = step.retarget(&target);
            let mode = &mode;
            async move {
                match ctx.run_step(&step, mode).await {
                    Err(e) if !matches!(e, ExecError::OutputNotWritable { .. }) => {
                        remove_partial(&target).await;
                        Err(e)
                    }
                    other => other,
                }
            }
        })
        .await?;

    let result = placed.value;
    if !result.success() {
        remove_partial(&placed.path).await;
        let redact = |text: &str| match &step {
            Step::Command(spec) => spec.redact(text),
            _ => text.to_string(),
        };
        let stderr = redact(result.stderr.trim());
        return Err(OperationError::Execution {
            message: format!(
                "Dump of '{}' failed (exit code {}): {}",
                request.config_name,
                exit_label(result.exit_code),
                first_line(&stderr)
            ),
            exit_code: result.exit_code,
            stdout: redact(&result.stdout),
            stderr,
        });
    }

    let path = placed.path.display().to_string();
    let message = if placed.fell_back {
        warn!(requested = %requested.display(), used = %path, "Dump landed in fallback location");
        format!(
            "Dump of '{}' completed, but {} was not writable; saved to fallback location {}",
            request.config_name,
            requested.display(),
            path
        )
    } else {
        format!("Dump of '{}' completed: {}", request.config_name, path)
    };
    info!(config = %request.config_name, path = %path, "Dump completed");

    let mut outcome = OperationResult::succeeded(message, Some(path));
    outcome.fallback = placed.fell_back;
    Ok(outcome)
}

async fn remove_partial(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => info!(path = %path.display(), "Removed partial dump"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove partial dump"),
    }
}

pub(super) fn exit_label(code: Option<i32>) -> String {
    code.map(|c| c.to_string()).unwrap_or_else(|| "signal".to_string())
}

pub(super) fn first_line(text: &str) -> &str {
    text.lines().find(|l| !l.trim().is_empty()).unwrap_or("no error output")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::executor::ExecMode;
    use crate::core::operations::testing::{exit, FakeExecutor};
    use crate::core::operations::OperationSettings;
    use crate::core::stack::MockContainerInspector;
    use crate::utils::Runner;
    use serde_json::json;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn context(dir: &Path, executor: FakeExecutor, runner: Runner) -> (OperationContext, Arc<FakeExecutor>) {
        let executor = Arc::new(executor);
        let settings = OperationSettings {
            dump_dir: dir.to_path_buf(),
            runner,
            host_gateway: "host.docker.internal".into(),
            require_restore_password: false,
        };
        let ctx = OperationContext::new(settings, executor.clone(), Arc::new(MockContainerInspector::new()));
        (ctx, executor)
    }

    fn request(custom: Option<&str>) -> DumpRequest {
        serde_json::from_value(json!({
            "config_name": "acct",
            "engine_type": "postgres",
            "connection_params": {
                "host": "localhost", "port": 5432, "user": "u", "password": "s3cret", "database": "acctdb"
            },
            "custom_filename": custom
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_dump_writes_resolved_path() {
        let dir = TempDir::new().unwrap();
        let (ctx, executor) = context(dir.path(), FakeExecutor::writing("-- dump"), Runner::Host);

        let result = run_dump(&ctx, request(None)).await;
        assert!(result.success, "{}", result.message);
        let expected = dir.path().join("acct.sql");
        assert_eq!(result.path.as_deref(), Some(expected.to_str().unwrap()));
        assert_eq!(std::fs::read_to_string(&expected).unwrap(), "-- dump");

        let calls = executor.calls.lock().unwrap();
        let (spec, mode) = &calls[0];
        assert_eq!(*mode, ExecMode::Host);
        // host runner keeps loopback as-is
        assert!(spec.args.contains(&"localhost".to_string()));
    }

    #[tokio::test]
    async fn test_docker_runner_rewrites_loopback() {
        let dir = TempDir::new().unwrap();
        let (ctx, executor) = context(dir.path(), FakeExecutor::writing("-- dump"), Runner::Docker);

        assert!(run_dump(&ctx, request(None)).await.success);
        let calls = executor.calls.lock().unwrap();
        let (spec, mode) = &calls[0];
        assert_eq!(*mode, ExecMode::Image { image: "postgres:16".into() });
        assert!(spec.args.contains(&"host.docker.internal".to_string()));
    }

    #[tokio::test]
    async fn test_failed_dump_removes_partial_and_redacts() {
        let dir = TempDir::new().unwrap();
        let executor = FakeExecutor::with(|spec, _| {
            std::fs::write(spec.stdout_to.as_ref().unwrap(), "partial").unwrap();
            Ok(exit(1, "pg_dump: error: password s3cret rejected"))
        });
        let (ctx, _) = context(dir.path(), executor, Runner::Host);

        let result = run_dump(&ctx, request(None)).await;
        assert!(!result.success);
        assert!(!dir.path().join("acct.sql").exists());
        assert_eq!(result.stderr.as_deref(), Some("pg_dump: error: password **** rejected"));
        assert!(result.message.contains("exit code 1"));
    }

    #[tokio::test]
    async fn test_busy_configuration_is_rejected() {
        let dir = TempDir::new().unwrap();
        let (ctx, executor) = context(dir.path(), FakeExecutor::writing(""), Runner::Host);

        let _held = ctx.locks.try_acquire("acct").unwrap();
        let result = run_dump(&ctx, request(None)).await;
        assert!(!result.success);
        assert_eq!(result.error_kind, Some(crate::core::error::ErrorKind::Conflict));
        assert!(executor.programs().is_empty());
    }

    #[tokio::test]
    async fn test_mongodb_is_unsupported() {
        let dir = TempDir::new().unwrap();
        let (ctx, executor) = context(dir.path(), FakeExecutor::writing(""), Runner::Host);
        let mut req = request(None);
        req.engine = EngineType::Mongodb;

        let result = run_dump(&ctx, req).await;
        assert_eq!(result.error_kind, Some(crate::core::error::ErrorKind::Unsupported));
        assert!(executor.programs().is_empty());
    }
}

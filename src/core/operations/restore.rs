use serde::Deserialize;
use std::path::PathBuf;
use tracing::{error, info, warn};

use super::dump::{exit_label, first_line};
use super::{OperationContext, OperationResult};
use crate::core::adapters::{adapter_for, BuildOptions};
use crate::core::command::{FailurePolicy, Step};
use crate::core::error::OperationError;
use crate::core::executor::ExecMode;
use crate::core::operations::DumpRequest;
use crate::core::params::{reconcile, ReconcilePolicy, RestoreOverrides};
use crate::core::paths::resolve_path;
use crate::core::registry::ConfigGuard;

#[derive(Debug, Clone, Deserialize)]
pub struct RestoreRequest {
    #[serde(flatten)]
    pub source: DumpRequest,
    #[serde(flatten)]
    pub overrides: RestoreOverrides,
}

/// File a restore for `request` reads from
pub fn restore_source(ctx: &OperationContext, request: &RestoreRequest) -> Result<PathBuf, OperationError> {
    resolve_path(
        &ctx.settings.dump_dir,
        &request.source.config_name,
        request.source.engine,
        request.source.custom_filename.as_deref(),
    )
}

pub async fn run_restore(ctx: &OperationContext, request: RestoreRequest) -> OperationResult {
    match ctx.locks.try_acquire(&request.source.config_name) {
        Ok(guard) => restore_holding(ctx, request, guard).await,
        Err(e) => OperationResult::failure(&e),
    }
}

/// Restore with the configuration lock already taken by the caller
pub async fn restore_holding(
    ctx: &OperationContext,
    request: RestoreRequest,
    _guard: ConfigGuard,
) -> OperationResult {
    let name = request.source.config_name.clone();
    match restore(ctx, request).await {
        Ok(result) => result,
        Err(e) => {
            error!(config = %name, error = %e, "Restore failed");
            OperationResult::failure(&e)
        }
    }
}

async fn restore(ctx: &OperationContext, request: RestoreRequest) -> Result<OperationResult, OperationError> {
    let RestoreRequest { source: dump, overrides } = request;
    let engine = dump.engine;
    let source = resolve_path(
        &ctx.settings.dump_dir,
        &dump.config_name,
        engine,
        dump.custom_filename.as_deref(),
    )?;

    let policy = ReconcilePolicy {
        host_gateway: ctx.settings.host_gateway.clone(),
        require_restore_password: ctx.settings.require_restore_password,
    };
    let reconciled = reconcile(&dump.params, engine, &overrides, ctx.inspector.as_ref(), &policy).await?;

    let (mode, options) = match &reconciled.stack {
        // the version-matched client lives in the database container
        Some(stack) => (
            ExecMode::Container {
                id: stack.container_id.clone(),
            },
            BuildOptions { inside_container: true },
        ),
        None => (ctx.default_mode(engine.default_image()), BuildOptions::default()),
    };

    let steps = adapter_for(engine).build_restore(&reconciled.params, &source, options)?;

    if tokio::fs::metadata(&source).await.is_err() {
        return Err(OperationError::Precondition(format!(
            "No dump file found at {}; run a dump first",
            source.display()
        )));
    }

    info!(
        config = %dump.config_name,
        engine = %engine,
        source = %source.display(),
        mode = ?mode,
        steps = steps.len(),
        "Starting restore"
    );

    for planned in &steps {
        info!(step = %planned.label, command = %planned.step.display(), "Running restore step");
        let result = ctx.run_step(&planned.step, &mode).await?;
        if result.success() {
            continue;
        }

        let (stdout, stderr) = match &planned.step {
            Step::Command(spec) => (spec.redact(&result.stdout), spec.redact(result.stderr.trim())),
            Step::CopyFile { .. } => (result.stdout.clone(), result.stderr.trim().to_string()),
        };

        match planned.on_failure {
            FailurePolicy::Continue => {
                warn!(
                    step = %planned.label,
                    exit_code = ?result.exit_code,
                    stderr = %first_line(&stderr),
                    "Restore step failed, continuing"
                );
            }
            FailurePolicy::Abort => {
                return Err(OperationError::Execution {
                    message: format!(
                        "Restore of '{}' failed at '{}' (exit code {}): {}",
                        dump.config_name,
                        planned.label,
                        exit_label(result.exit_code),
                        first_line(&stderr)
                    ),
                    exit_code: result.exit_code,
                    stdout,
                    stderr,
                });
            }
        }
    }

    let target = match &reconciled.stack {
        Some(stack) => format!(" into container '{}'", stack.container_name),
        None => String::new(),
    };
    let message = format!(
        "Restore of '{}' completed{} from {}",
        dump.config_name,
        target,
        source.display()
    );
    info!(config = %dump.config_name, "Restore completed");
    Ok(OperationResult::succeeded(message, Some(source.display().to_string())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::docker::ContainerInfo;
    use crate::core::error::ErrorKind;
    use crate::core::operations::testing::{exit, ok, FakeExecutor};
    use crate::core::operations::OperationSettings;
    use crate::core::stack::MockContainerInspector;
    use crate::utils::{ContainerState, Runner};
    use serde_json::json;
    use std::path::Path;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn context(
        dir: &Path,
        executor: FakeExecutor,
        inspector: MockContainerInspector,
    ) -> (OperationContext, Arc<FakeExecutor>) {
        let executor = Arc::new(executor);
        let settings = OperationSettings {
            dump_dir: dir.to_path_buf(),
            runner: Runner::Host,
            host_gateway: "host.docker.internal".into(),
            require_restore_password: false,
        };
        (OperationContext::new(settings, executor.clone(), Arc::new(inspector)), executor)
    }

    fn request(extra: serde_json::Value) -> RestoreRequest {
        let mut body = json!({
            "config_name": "acct",
            "engine_type": "postgres",
            "connection_params": {
                "host": "db.internal", "port": 5432, "username": "u", "password": "s3cret", "database": "acctdb"
            }
        });
        if let (Some(base), Some(more)) = (body.as_object_mut(), extra.as_object()) {
            base.extend(more.clone());
        }
        serde_json::from_value(body).unwrap()
    }

    fn with_dump_file(dir: &Path) {
        std::fs::write(dir.join("acct.sql"), "CREATE TABLE t();").unwrap();
    }

    #[tokio::test]
    async fn test_missing_dump_file_is_a_precondition() {
        let dir = TempDir::new().unwrap();
        let (ctx, executor) = context(dir.path(), FakeExecutor::with(|_, _| Ok(ok())), MockContainerInspector::new());

        let result = run_restore(&ctx, request(json!({}))).await;
        assert!(!result.success);
        assert_eq!(result.error_kind, Some(ErrorKind::Precondition));
        assert!(result.message.contains("run a dump first"));
        assert!(executor.programs().is_empty());
    }

    #[tokio::test]
    async fn test_drop_failure_is_tolerated() {
        let dir = TempDir::new().unwrap();
        with_dump_file(dir.path());
        let executor = FakeExecutor::with(|spec, _| match spec.program.as_str() {
            "dropdb" => Ok(exit(1, "database \"acctdb\" does not exist")),
            _ => Ok(ok()),
        });
        let (ctx, executor) = context(dir.path(), executor, MockContainerInspector::new());

        let result = run_restore(&ctx, request(json!({}))).await;
        assert!(result.success, "{}", result.message);
        assert_eq!(executor.programs(), vec!["dropdb", "createdb", "psql"]);
    }

    #[tokio::test]
    async fn test_create_failure_aborts_before_load() {
        let dir = TempDir::new().unwrap();
        with_dump_file(dir.path());
        let executor = FakeExecutor::with(|spec, _| match spec.program.as_str() {
            "createdb" => Ok(exit(2, "permission denied for s3cret")),
            _ => Ok(ok()),
        });
        let (ctx, executor) = context(dir.path(), executor, MockContainerInspector::new());

        let result = run_restore(&ctx, request(json!({}))).await;
        assert!(!result.success);
        assert_eq!(result.error_kind, Some(ErrorKind::Execution));
        assert_eq!(result.stderr.as_deref(), Some("permission denied for ****"));
        assert_eq!(executor.programs(), vec!["dropdb", "createdb"]);
    }

    #[tokio::test]
    async fn test_stack_restore_runs_inside_container() {
        let dir = TempDir::new().unwrap();
        with_dump_file(dir.path());
        let mut inspector = MockContainerInspector::new();
        inspector.expect_list_stack_containers().returning(|_| {
            Ok(vec![ContainerInfo {
                id: "c0ffee".into(),
                name: "shop-db-1".into(),
                image: "postgres:15".into(),
                status: "Up".into(),
                state: ContainerState::Running,
                health: None,
                created: 0,
                ports: vec!["0.0.0.0:15432->5432/tcp".into()],
            }])
        });
        let (ctx, executor) = context(dir.path(), FakeExecutor::with(|_, _| Ok(ok())), inspector);

        let result = run_restore(&ctx, request(json!({"stack_name": "shop"}))).await;
        assert!(result.success, "{}", result.message);
        assert!(result.message.contains("shop-db-1"));

        let calls = executor.calls.lock().unwrap();
        assert_eq!(calls.len(), 3);
        for (spec, mode) in calls.iter() {
            assert_eq!(*mode, ExecMode::Container { id: "c0ffee".into() });
            assert!(!spec.args.contains(&"-h".to_string()));
        }
    }

    #[tokio::test]
    async fn test_overrides_reach_the_commands() {
        let dir = TempDir::new().unwrap();
        with_dump_file(dir.path());
        let (ctx, executor) = context(dir.path(), FakeExecutor::with(|_, _| Ok(ok())), MockContainerInspector::new());

        let result = run_restore(
            &ctx,
            request(json!({
                "restore_host": "localhost",
                "restore_port": "6543",
                "restore_password": "other",
                "local_database_name": "acct_copy"
            })),
        )
        .await;
        assert!(result.success, "{}", result.message);

        let calls = executor.calls.lock().unwrap();
        let (load, _) = &calls[2];
        assert_eq!(
            load.args,
            vec!["-h", "host.docker.internal", "-p", "6543", "-U", "u", "-v", "ON_ERROR_STOP=1", "-d", "acct_copy"]
        );
        assert_eq!(load.env, vec![("PGPASSWORD".to_string(), "other".to_string())]);
    }
}

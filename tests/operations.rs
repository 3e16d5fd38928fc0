//! Dump/restore scenarios driven through the public API with a scripted executor

use async_trait::async_trait;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

use dumpdock::core::command::CommandSpec;
use dumpdock::core::docker::DockerUnavailable;
use dumpdock::core::executor::{CommandExecutor, ExecError, ExecMode, ExecutionResult};
use dumpdock::core::operations::{DumpRequest, RestoreRequest};
use dumpdock::core::{run_dump, run_restore, OperationContext, OperationSettings};
use dumpdock::utils::app_config::FileConfig;
use dumpdock::utils::{AppConfig, Runner};

/// Writes a fake dump to redirected stdout, refusing anything under `denied`
struct ScriptedExecutor {
    denied: Option<PathBuf>,
    calls: Mutex<Vec<CommandSpec>>,
}

impl ScriptedExecutor {
    fn new(denied: Option<PathBuf>) -> Self {
        Self {
            denied,
            calls: Mutex::new(Vec::new()),
        }
    }

    fn calls(&self) -> Vec<CommandSpec> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl CommandExecutor for ScriptedExecutor {
    async fn execute(&self, spec: &CommandSpec, _mode: &ExecMode) -> Result<ExecutionResult, ExecError> {
        self.calls.lock().unwrap().push(spec.clone());
        if let Some(out) = &spec.stdout_to {
            if self.denied.as_ref().is_some_and(|d| out.starts_with(d)) {
                return Err(ExecError::OutputNotWritable {
                    path: out.clone(),
                    reason: "Permission denied (os error 13)".into(),
                });
            }
            std::fs::write(out, "-- PostgreSQL database dump\n").unwrap();
        }
        Ok(ExecutionResult {
            exit_code: Some(0),
            ..Default::default()
        })
    }
}

fn context(dir: &Path, executor: Arc<ScriptedExecutor>) -> OperationContext {
    let settings = OperationSettings {
        dump_dir: dir.to_path_buf(),
        runner: Runner::Host,
        host_gateway: "host.docker.internal".into(),
        require_restore_password: false,
    };
    let inspector = Arc::new(DockerUnavailable {
        reason: "not needed".into(),
    });
    OperationContext::new(settings, executor, inspector)
}

fn acct_dump(name: &str, custom_filename: Option<&str>) -> DumpRequest {
    serde_json::from_value(json!({
        "config_name": name,
        "engine_type": "postgres",
        "connection_params": {"host": "h", "port": 5432, "user": "u", "password": "p", "database": "acctdb"},
        "custom_filename": custom_filename,
    }))
    .unwrap()
}

#[tokio::test]
async fn dump_then_restore_uses_the_same_file() {
    let dir = TempDir::new().unwrap();
    let executor = Arc::new(ScriptedExecutor::new(None));
    let ctx = context(dir.path(), executor.clone());

    let dumped = run_dump(&ctx, acct_dump("acct", None)).await;
    assert!(dumped.success, "{}", dumped.message);
    let expected = dir.path().join("acct.sql");
    assert_eq!(dumped.path, Some(expected.display().to_string()));
    assert!(expected.exists());

    let restore = RestoreRequest {
        source: acct_dump("acct", None),
        overrides: Default::default(),
    };
    let restored = run_restore(&ctx, restore).await;
    assert!(restored.success, "{}", restored.message);
    assert_eq!(restored.path, dumped.path);

    let calls = executor.calls();
    let programs: Vec<_> = calls.iter().map(|c| c.program.as_str()).collect();
    assert_eq!(programs, vec!["pg_dump", "dropdb", "createdb", "psql"]);
    assert_eq!(calls[3].stdin_from.as_deref(), Some(expected.as_path()));
}

#[tokio::test]
async fn restore_base_path_does_not_split_the_directories() {
    let dumps = TempDir::new().unwrap();
    let other = TempDir::new().unwrap();
    let dump_base = dumps.path().display().to_string();
    let restore_base = other.path().display().to_string();
    let config = AppConfig::from_sources(FileConfig::default(), |key| match key {
        "DUMP_BASE_PATH" => Some(dump_base.clone()),
        "RESTORE_BASE_PATH" => Some(restore_base.clone()),
        _ => None,
    })
    .unwrap();

    let executor = Arc::new(ScriptedExecutor::new(None));
    let inspector = Arc::new(DockerUnavailable {
        reason: "not needed".into(),
    });
    let ctx = OperationContext::new(OperationSettings::from(&config), executor, inspector);

    let dumped = run_dump(&ctx, acct_dump("acct", None)).await;
    assert!(dumped.success, "{}", dumped.message);
    let restore = RestoreRequest {
        source: acct_dump("acct", None),
        overrides: Default::default(),
    };
    let restored = run_restore(&ctx, restore).await;
    assert!(restored.success, "{}", restored.message);
    assert_eq!(restored.path, Some(dumps.path().join("acct.sql").display().to_string()));
}

#[tokio::test]
async fn custom_filename_is_sanitized() {
    let dir = TempDir::new().unwrap();
    let ctx = context(dir.path(), Arc::new(ScriptedExecutor::new(None)));

    let result = run_dump(&ctx, acct_dump("acct", Some("nightly backup #3"))).await;
    assert!(result.success, "{}", result.message);
    let expected = dir.path().join("nightly_backup_3.sql");
    assert_eq!(result.path, Some(expected.display().to_string()));
    assert!(expected.exists());
}

#[tokio::test]
async fn unwritable_dump_dir_falls_back() {
    let dir = TempDir::new().unwrap();
    let executor = Arc::new(ScriptedExecutor::new(Some(dir.path().to_path_buf())));
    let ctx = context(dir.path(), executor);

    // unique name: the fallback location is the shared temp dir
    let name = format!("fallback-{}", uuid::Uuid::new_v4().simple());
    let result = run_dump(&ctx, acct_dump(&name, None)).await;
    assert!(result.success, "{}", result.message);
    assert!(result.fallback);

    let fallback = std::env::temp_dir().join(format!("{}.sql", name));
    assert_eq!(result.path, Some(fallback.display().to_string()));
    assert!(result.message.contains("fallback location"));
    assert!(result.message.contains(&fallback.display().to_string()));
    assert!(!dir.path().join(format!("{}.sql", name)).exists());

    std::fs::remove_file(fallback).unwrap();
}

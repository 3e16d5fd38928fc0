/// Docker Compose stack operations
///
/// Runs `docker compose` in a configured project directory and reads the
/// project's docker-compose.yml.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::{error, info};

use crate::core::command::CommandSpec;
use crate::core::error::OperationError;
use crate::core::executor::{CommandExecutor, ExecMode};
use crate::core::store::ComposeConfig;
use crate::utils::COMPOSE_FILE_NAME;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComposeOperation {
    Up,
    Down,
    Restart,
    Logs,
    Ps,
    Build,
    Pull,
}

impl ComposeOperation {
    pub const ALL: [ComposeOperation; 7] = [
        ComposeOperation::Up,
        ComposeOperation::Down,
        ComposeOperation::Restart,
        ComposeOperation::Logs,
        ComposeOperation::Ps,
        ComposeOperation::Build,
        ComposeOperation::Pull,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ComposeOperation::Up => "up",
            ComposeOperation::Down => "down",
            ComposeOperation::Restart => "restart",
            ComposeOperation::Logs => "logs",
            ComposeOperation::Ps => "ps",
            ComposeOperation::Build => "build",
            ComposeOperation::Pull => "pull",
        }
    }
}

impl fmt::Display for ComposeOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ComposeOperation {
    type Err = OperationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        ComposeOperation::ALL
            .into_iter()
            .find(|op| op.as_str() == wanted)
            .ok_or_else(|| {
                OperationError::Validation(format!(
                    "Invalid operation '{}': expected one of up, down, restart, logs, ps, build, pull",
                    s
                ))
            })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComposeOutcome {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

impl ComposeOutcome {
    fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            output: None,
        }
    }
}

/// Project directory and compose file, or a precondition error naming what is missing
pub fn check_project(path: &Path) -> Result<PathBuf, OperationError> {
    if !path.is_dir() {
        return Err(OperationError::Precondition(format!(
            "Path does not exist: {}. Please check the configuration path.",
            path.display()
        )));
    }
    let compose_file = path.join(COMPOSE_FILE_NAME);
    if !compose_file.is_file() {
        return Err(OperationError::Precondition(format!(
            "{} not found in path: {}",
            COMPOSE_FILE_NAME,
            path.display()
        )));
    }
    Ok(compose_file)
}

/// `docker compose [--flag value]... <op> [service]`
pub fn compose_command(
    project: &Path,
    operation: ComposeOperation,
    service: Option<&str>,
    flags: &BTreeMap<String, Value>,
    timeout: Duration,
) -> CommandSpec {
    let mut spec = CommandSpec::new("docker").arg("compose");
    for (flag, value) in flags {
        match value {
            Value::Bool(true) => spec = spec.arg(format!("--{}", flag)),
            Value::Bool(false) | Value::Null => {}
            Value::String(s) => spec = spec.arg(format!("--{}", flag)).arg(s.clone()),
            other => spec = spec.arg(format!("--{}", flag)).arg(other.to_string()),
        }
    }

    spec = spec.arg(operation.as_str());
    if operation == ComposeOperation::Up {
        spec = spec.arg("-d");
    }
    if let Some(service) = service.filter(|s| !s.trim().is_empty()) {
        spec = spec.arg(service);
    }
    spec.cwd(project).timeout(timeout)
}

/// Run one operation against a stored compose project
pub async fn run_compose_operation(
    executor: &dyn CommandExecutor,
    config: &ComposeConfig,
    operation: ComposeOperation,
    service: Option<&str>,
    extra_flags: Option<&BTreeMap<String, Value>>,
    timeout: Duration,
) -> ComposeOutcome {
    if !config.is_active {
        return ComposeOutcome::failed(format!("Compose configuration '{}' is inactive", config.name));
    }
    if let Err(e) = check_project(&config.path) {
        return ComposeOutcome::failed(e.to_string());
    }

    let mut flags = config.flags.clone();
    if let Some(extra) = extra_flags {
        flags.extend(extra.iter().map(|(k, v)| (k.clone(), v.clone())));
    }
    let service = service.or(config.service_name.as_deref());
    let spec = compose_command(&config.path, operation, service, &flags, timeout);

    info!(
        project = %config.name,
        dir = %config.path.display(),
        command = %spec.display(),
        "Running compose operation"
    );

    match executor.execute(&spec, &ExecMode::Host).await {
        Ok(result) if result.success() => ComposeOutcome {
            success: true,
            message: format!("Docker Compose {} completed successfully", operation),
            output: Some(result.stdout),
        },
        Ok(result) => {
            error!(project = %config.name, op = %operation, exit_code = ?result.exit_code, "Compose operation failed");
            ComposeOutcome {
                success: false,
                message: format!("Docker Compose {} failed: {}", operation, result.stderr.trim()),
                output: Some(result.stderr),
            }
        }
        Err(e) => {
            let err: OperationError = e.into();
            let message = match err {
                OperationError::Timeout { after, .. } => format!(
                    "Docker Compose {} timed out after {}",
                    operation,
                    humantime::format_duration(after)
                ),
                other => format!("Docker Compose {} failed: {}", operation, other),
            };
            ComposeOutcome::failed(message)
        }
    }
}

/// Containers reported by `docker compose ps --format json`
pub async fn list_services(
    executor: &dyn CommandExecutor,
    config: &ComposeConfig,
    timeout: Duration,
) -> Result<Vec<Value>, OperationError> {
    check_project(&config.path)?;
    let spec = CommandSpec::new("docker")
        .args(["compose", "ps", "--format", "json"])
        .cwd(&config.path)
        .timeout(timeout);

    let result = executor.execute(&spec, &ExecMode::Host).await?;
    if !result.success() {
        return Err(OperationError::Execution {
            message: format!("Failed to get services: {}", result.stderr.trim()),
            exit_code: result.exit_code,
            stdout: result.stdout,
            stderr: result.stderr,
        });
    }
    Ok(parse_ps_output(&result.stdout))
}

/// Compose v2 prints either one JSON array or one object per line
pub fn parse_ps_output(stdout: &str) -> Vec<Value> {
    let trimmed = stdout.trim();
    if trimmed.starts_with('[') {
        if let Ok(Value::Array(items)) = serde_json::from_str(trimmed) {
            return items;
        }
    }
    trimmed
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| serde_json::from_str(line).ok())
        .collect()
}

/// Service as declared in docker-compose.yml
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ComposeService {
    pub image: Option<String>,
    pub ports: Vec<String>,
    pub profiles: Vec<String>,
    pub depends_on: Vec<String>,
}

/// Parse docker-compose.yml and extract service declarations
pub fn declared_services(project: &Path) -> Result<BTreeMap<String, ComposeService>> {
    use serde_yaml::Value as Yaml;

    let compose_file = project.join(COMPOSE_FILE_NAME);
    let content = std::fs::read_to_string(&compose_file)
        .with_context(|| format!("Failed to read {}", compose_file.display()))?;
    let yaml: Yaml = serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse {}", compose_file.display()))?;

    let strings = |value: Option<&Yaml>| -> Vec<String> {
        value
            .and_then(|v| v.as_sequence())
            .map(|seq| {
                seq.iter()
                    .filter_map(|item| {
                        item.as_str()
                            .map(str::to_string)
                            .or_else(|| item.as_i64().map(|i| i.to_string()))
                    })
                    .collect()
            })
            .unwrap_or_default()
    };

    let mut services = BTreeMap::new();
    if let Some(map) = yaml.get("services").and_then(|s| s.as_mapping()) {
        for (name, service) in map {
            let Some(name) = name.as_str() else { continue };

            // depends_on is a list or a map keyed by service
            let depends_on = match service.get("depends_on") {
                Some(Yaml::Mapping(deps)) => deps
                    .keys()
                    .filter_map(|k| k.as_str().map(str::to_string))
                    .collect(),
                other => strings(other),
            };

            services.insert(
                name.to_string(),
                ComposeService {
                    image: service.get("image").and_then(|i| i.as_str()).map(str::to_string),
                    ports: strings(service.get("ports")),
                    profiles: strings(service.get("profiles")),
                    depends_on,
                },
            );
        }
    }
    Ok(services)
}

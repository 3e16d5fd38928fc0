/// Docker daemon integration
///
/// Connection, status reporting and compose-project container listing

use anyhow::{Context, Result};
use async_trait::async_trait;
use bollard::container::ListContainersOptions;
use bollard::models::{ContainerSummary, PortTypeEnum};
use bollard::Docker;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::core::error::OperationError;
use crate::core::stack::ContainerInspector;
use crate::utils::{ContainerState, COMPOSE_PROJECT_LABEL};

#[derive(Debug, Clone, Serialize)]
pub struct ContainerInfo {
    pub id: String,
    pub name: String,
    pub image: String,
    pub status: String,
    pub state: ContainerState,
    pub health: Option<String>,
    pub created: i64,
    /// `ip:published->internal/proto`
    pub ports: Vec<String>,
}

/// Daemon reachability as reported to API clients
#[derive(Debug, Clone, Serialize)]
pub struct DockerStatus {
    /// `running` or `not_accessible`
    pub status: String,
    pub version: Option<String>,
    pub api_version: Option<String>,
    pub containers: Option<i64>,
    pub containers_running: Option<i64>,
    pub images: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DockerStatus {
    pub fn is_running(&self) -> bool {
        self.status == "running"
    }

    pub fn not_accessible(error: String) -> Self {
        Self {
            status: "not_accessible".to_string(),
            version: None,
            api_version: None,
            containers: None,
            containers_running: None,
            images: None,
            error: Some(error),
        }
    }
}

#[derive(Clone)]
pub struct DockerManager {
    docker: Docker,
}

impl DockerManager {
    /// Connect to the local daemon (socket or DOCKER_HOST)
    pub fn new() -> Result<Self> {
        let docker = Docker::connect_with_local_defaults()
            .context("Failed to connect to Docker daemon. Is Docker running?")?;
        Ok(Self { docker })
    }

    pub async fn status(&self) -> DockerStatus {
        if let Err(e) = self.docker.ping().await {
            warn!(error = %e, "Docker daemon ping failed");
            return DockerStatus::not_accessible(e.to_string());
        }

        let version = self.docker.version().await.ok();
        let info = match self.docker.info().await {
            Ok(info) => Some(info),
            Err(e) => {
                debug!(error = %e, "Docker info unavailable");
                None
            }
        };

        DockerStatus {
            status: "running".to_string(),
            version: version.as_ref().and_then(|v| v.version.clone()),
            api_version: version.as_ref().and_then(|v| v.api_version.clone()),
            containers: info.as_ref().and_then(|i| i.containers),
            containers_running: info.as_ref().and_then(|i| i.containers_running),
            images: info.as_ref().and_then(|i| i.images),
            error: None,
        }
    }

    /// Running containers of a compose project
    pub async fn list_project_containers(&self, project: &str) -> Result<Vec<ContainerInfo>> {
        let mut filters = HashMap::new();
        filters.insert(
            "label".to_string(),
            vec![format!("{}={}", COMPOSE_PROJECT_LABEL, project)],
        );

        let options = Some(ListContainersOptions {
            all: false,
            filters,
            ..Default::default()
        });

        let containers = self
            .docker
            .list_containers(options)
            .await
            .with_context(|| format!("Failed to list containers for project '{}'", project))?;

        let mut infos: Vec<ContainerInfo> = containers
            .into_iter()
            .map(container_summary_to_info)
            .collect();
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(infos)
    }
}

#[async_trait]
impl ContainerInspector for DockerManager {
    async fn list_stack_containers(&self, stack: &str) -> Result<Vec<ContainerInfo>, OperationError> {
        self.list_project_containers(stack)
            .await
            .map_err(|e| OperationError::Infrastructure(format!("{:#}", e)))
    }
}

/// Stands in for the daemon when no client could be built; every lookup is an
/// infrastructure error
#[derive(Debug, Clone)]
pub struct DockerUnavailable {
    pub reason: String,
}

#[async_trait]
impl ContainerInspector for DockerUnavailable {
    async fn list_stack_containers(&self, stack: &str) -> Result<Vec<ContainerInfo>, OperationError> {
        Err(OperationError::Infrastructure(format!(
            "Docker is not accessible, cannot inspect stack '{}': {}",
            stack, self.reason
        )))
    }
}

/// Client for the local daemon, or a stand-in inspector that reports why
/// there is none
pub fn local_inspector() -> (Option<DockerManager>, Arc<dyn ContainerInspector>) {
    match DockerManager::new() {
        Ok(docker) => (Some(docker.clone()), Arc::new(docker)),
        Err(e) => {
            warn!(error = %e, "Docker client unavailable; stack operations will fail");
            let reason = format!("{:#}", e);
            (None, Arc::new(DockerUnavailable { reason }))
        }
    }
}

/// Convert ContainerSummary to ContainerInfo
fn container_summary_to_info(summary: ContainerSummary) -> ContainerInfo {
    let name = summary
        .names
        .as_ref()
        .and_then(|names| names.first())
        .map(|n| n.trim_start_matches('/').to_string())
        .unwrap_or_else(|| "unknown".to_string());

    let status = summary.status.clone().unwrap_or_else(|| "unknown".to_string());
    let state = summary
        .state
        .as_deref()
        .unwrap_or("unknown")
        .into();

    let health = summary.status.as_ref().and_then(|s| {
        // "unhealthy" contains "healthy"
        if s.contains("unhealthy") {
            Some("unhealthy".to_string())
        } else if s.contains("starting") {
            Some("starting".to_string())
        } else if s.contains("healthy") {
            Some("healthy".to_string())
        } else {
            None
        }
    });

    let ports = summary
        .ports
        .as_ref()
        .map(|ports| {
            ports
                .iter()
                .filter_map(|p| {
                    p.public_port.map(|pub_port| {
                        let proto = match p.typ {
                            Some(PortTypeEnum::UDP) => "udp",
                            Some(PortTypeEnum::SCTP) => "sctp",
                            _ => "tcp",
                        };
                        format!(
                            "{}:{}->{}/{}",
                            p.ip.as_deref().unwrap_or("0.0.0.0"),
                            pub_port,
                            p.private_port,
                            proto
                        )
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    ContainerInfo {
        id: summary.id.unwrap_or_default(),
        name,
        image: summary.image.unwrap_or_else(|| "unknown".to_string()),
        status,
        state,
        health,
        created: summary.created.unwrap_or(0),
        ports,
    }
}

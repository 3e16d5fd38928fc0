/// Database container discovery inside a compose stack

use async_trait::async_trait;
use regex::Regex;
use serde::Serialize;
use std::sync::OnceLock;
use tracing::{debug, warn};

use crate::core::docker::ContainerInfo;
use crate::core::engine::EngineType;
use crate::core::error::OperationError;

/// Source of running containers for a compose project
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ContainerInspector: Send + Sync {
    async fn list_stack_containers(&self, stack: &str) -> Result<Vec<ContainerInfo>, OperationError>;
}

/// The database container found in a stack
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StackInfo {
    pub container_id: String,
    pub container_name: String,
    pub engine: EngineType,
    pub version: Option<String>,
    pub published_port: Option<u16>,
    pub internal_port: Option<u16>,
}

fn port_mapping() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d+)->(\d+)/(\w+)").expect("static regex"))
}

fn postgres_version() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"postgres:(\d+)").expect("static regex"))
}

/// Find the database container of `stack`.
///
/// With several database containers, one of the `expected` engine is preferred;
/// ties go to the first by container name.
pub async fn discover(
    inspector: &dyn ContainerInspector,
    stack: &str,
    expected: Option<EngineType>,
) -> Result<StackInfo, OperationError> {
    let containers = inspector.list_stack_containers(stack).await?;
    debug!(stack, count = containers.len(), "Inspecting stack containers");

    let mut candidates: Vec<(EngineType, &ContainerInfo)> = containers
        .iter()
        .filter(|c| c.state.is_running())
        .filter_map(|c| EngineType::from_image(&c.image).map(|engine| (engine, c)))
        .collect();
    candidates.sort_by(|a, b| a.1.name.cmp(&b.1.name));

    if candidates.is_empty() {
        return Err(OperationError::Precondition(format!(
            "No database container found in stack '{}'",
            stack
        )));
    }

    if candidates.len() > 1 {
        let names: Vec<&str> = candidates.iter().map(|(_, c)| c.name.as_str()).collect();
        warn!(stack, containers = ?names, "Stack has several database containers");
    }

    let (engine, container) = expected
        .and_then(|wanted| candidates.iter().find(|(engine, _)| *engine == wanted))
        .unwrap_or(&candidates[0]);

    let (published_port, internal_port) = parse_ports(&container.ports);
    let version = match engine {
        EngineType::Postgres => postgres_version()
            .captures(&container.image)
            .map(|caps| caps[1].to_string()),
        _ => None,
    };

    Ok(StackInfo {
        container_id: container.id.clone(),
        container_name: container.name.clone(),
        engine: *engine,
        version,
        published_port,
        internal_port,
    })
}

/// First `published->internal/proto` mapping in the port list
fn parse_ports(ports: &[String]) -> (Option<u16>, Option<u16>) {
    ports
        .iter()
        .find_map(|p| port_mapping().captures(p))
        .map(|caps| (caps[1].parse().ok(), caps[2].parse().ok()))
        .unwrap_or((None, None))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::ContainerState;

    fn container(name: &str, image: &str, ports: &[&str]) -> ContainerInfo {
        ContainerInfo {
            id: format!("{}-id", name),
            name: name.to_string(),
            image: image.to_string(),
            status: "Up".to_string(),
            state: ContainerState::Running,
            health: None,
            created: 0,
            ports: ports.iter().map(|p| p.to_string()).collect(),
        }
    }

    fn inspector_with(containers: Vec<ContainerInfo>) -> MockContainerInspector {
        let mut mock = MockContainerInspector::new();
        mock.expect_list_stack_containers()
            .withf(|stack| stack == "shop")
            .returning(move |_| Ok(containers.clone()));
        mock
    }

    #[tokio::test]
    async fn test_discovers_postgres_with_version_and_ports() {
        let mock = inspector_with(vec![
            container("shop-web-1", "nginx:1.25", &["0.0.0.0:8080->80/tcp"]),
            container("shop-db-1", "postgres:15", &["0.0.0.0:15432->5432/tcp"]),
        ]);

        let info = discover(&mock, "shop", None).await.unwrap();
        assert_eq!(info.container_name, "shop-db-1");
        assert_eq!(info.engine, EngineType::Postgres);
        assert_eq!(info.version.as_deref(), Some("15"));
        assert_eq!(info.published_port, Some(15432));
        assert_eq!(info.internal_port, Some(5432));
    }

    #[tokio::test]
    async fn test_unpublished_port_is_none() {
        let mock = inspector_with(vec![container("shop-cache-1", "redis:7", &[])]);
        let info = discover(&mock, "shop", None).await.unwrap();
        assert_eq!(info.engine, EngineType::Redis);
        assert_eq!(info.published_port, None);
        assert_eq!(info.version, None);
    }

    #[tokio::test]
    async fn test_no_database_container() {
        let mock = inspector_with(vec![container("shop-web-1", "nginx:1.25", &[])]);
        let err = discover(&mock, "shop", None).await.unwrap_err();
        assert!(matches!(err, OperationError::Precondition(_)));
        assert!(err.to_string().contains("No database container found"));
    }

    #[tokio::test]
    async fn test_expected_engine_is_preferred() {
        let mock = inspector_with(vec![
            container("shop-cache-1", "redis:7", &["0.0.0.0:6380->6379/tcp"]),
            container("shop-db-1", "mariadb:11", &["0.0.0.0:13306->3306/tcp"]),
        ]);
        let info = discover(&mock, "shop", Some(EngineType::Mysql)).await.unwrap();
        assert_eq!(info.container_name, "shop-db-1");
        assert_eq!(info.engine, EngineType::Mysql);

        let mock = inspector_with(vec![
            container("shop-cache-1", "redis:7", &[]),
            container("shop-db-1", "mariadb:11", &[]),
        ]);
        // without a preference the first by name wins
        let info = discover(&mock, "shop", None).await.unwrap();
        assert_eq!(info.container_name, "shop-cache-1");
    }

    #[tokio::test]
    async fn test_inspector_failure_propagates() {
        let mut mock = MockContainerInspector::new();
        mock.expect_list_stack_containers()
            .returning(|_| Err(OperationError::Infrastructure("socket missing".into())));
        let err = discover(&mock, "shop", None).await.unwrap_err();
        assert!(matches!(err, OperationError::Infrastructure(_)));
    }

    #[test]
    fn test_parse_ports() {
        let ports = vec!["127.0.0.1:5433->5432/tcp".to_string()];
        assert_eq!(parse_ports(&ports), (Some(5433), Some(5432)));
        assert_eq!(parse_ports(&[]), (None, None));
    }
}

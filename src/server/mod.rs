/// HTTP API server for dumpdock
/// Handlers are thin: every route delegates to the orchestrators in `core`

pub mod auth;
pub mod handlers;
pub mod routes;

pub use routes::create_router;

use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::core::docker::local_inspector;
use crate::core::executor::{CommandExecutor, ProcessExecutor};
use crate::core::{ConfigStore, DockerManager, OperationContext, OperationRegistry};
use crate::utils::{is_dir_writable, AppConfig, API_TOKEN_ENV, OPERATION_RETENTION};

/// Shared by every handler
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<ConfigStore>,
    pub ops: Arc<OperationContext>,
    pub registry: OperationRegistry,
    pub docker: Option<DockerManager>,
    /// Runs `docker compose` on this machine
    pub compose: Arc<dyn CommandExecutor>,
    pub compose_timeout: Duration,
}

impl AppState {
    pub async fn from_config(config: &AppConfig) -> anyhow::Result<Self> {
        let store = ConfigStore::open(&config.data_file)
            .await
            .with_context(|| format!("Failed to open config store {}", config.data_file.display()))?;

        let (docker, inspector) = local_inspector();

        Ok(Self {
            store: Arc::new(store),
            ops: Arc::new(OperationContext::from_config(config, inspector)),
            registry: OperationRegistry::new(),
            docker,
            compose: Arc::new(ProcessExecutor::new(config.compose_timeout, config.host_gateway.clone())),
            compose_timeout: config.compose_timeout,
        })
    }
}

pub async fn run(config: AppConfig) -> anyhow::Result<()> {
    if !is_dir_writable(&config.dump_dir) {
        warn!(dir = %config.dump_dir.display(), "Dump directory is not writable; dumps will use fallback locations");
    }

    let state = AppState::from_config(&config).await?;

    // Finished operations are kept for polling, then dropped
    let registry = state.registry.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(60 * 10));
        loop {
            ticker.tick().await;
            let reaped = registry.reap(OPERATION_RETENTION);
            if reaped > 0 {
                info!(reaped, "Dropped finished operations");
            }
        }
    });

    let app = create_router(state, config.cors);

    let addr: SocketAddr = format!("{}:{}", config.api_host, config.api_port)
        .parse()
        .with_context(|| format!("Invalid listen address {}:{}", config.api_host, config.api_port))?;

    println!("🚀 dumpdock API");
    println!("   🔌 API:    http://{}/api", addr);
    if std::env::var(API_TOKEN_ENV).is_ok() {
        println!("   🔒 Auth:   Enabled (token required)");
    } else {
        println!("   ⚠️  Auth:   Disabled ({} not set)", API_TOKEN_ENV);
    }
    println!("   📁 Dumps:  {}", config.dump_dir.display());
    println!();

    info!(%addr, runner = ?config.runner, "Server listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

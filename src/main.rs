mod cli;

use anyhow::{bail, Context, Result};
use clap::Parser;
use colored::Colorize;
use std::path::Path;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands, ComposeCommands, ConfigCommands, DockerCommands, StackCommands};
use dumpdock::core::compose::{self, ComposeOperation};
use dumpdock::core::docker::{local_inspector, DockerStatus};
use dumpdock::core::params::RestoreOverrides;
use dumpdock::core::stack;
use dumpdock::core::store::{ComposeConfigInput, DatabaseConfig, DatabaseConfigInput};
use dumpdock::core::{
    run_dump, run_restore, ConfigStore, EngineType, OperationContext, OperationResult, ProcessExecutor,
};
use dumpdock::utils::{format_duration, mask_sensitive, truncate_string, AppConfig, API_TOKEN_ENV};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load()?;
    init_tracing(&config.log_level);

    match cli.command {
        #[cfg(feature = "server")]
        Commands::Serve { port, host, cors } => {
            let mut config = config;
            if let Some(port) = port {
                config.api_port = port;
            }
            if let Some(host) = host {
                config.api_host = host;
            }
            config.cors |= cors;
            dumpdock::server::run(config).await?;
        }
        #[cfg(feature = "server")]
        Commands::Token => {
            let token = dumpdock::server::auth::generate_token();
            println!("{}", token);
            println!();
            println!("To enable API authentication:");
            println!("  export {}=\"{}\"", API_TOKEN_ENV, token);
        }
        Commands::Dump { config: key, file } => {
            handle_dump(&config, &key, file).await?;
        }
        Commands::Restore {
            config: key,
            file,
            overrides,
        } => {
            handle_restore(&config, &key, file, overrides.into()).await?;
        }
        Commands::Config { command } => {
            handle_config(&config, command).await?;
        }
        Commands::Compose { command } => {
            handle_compose(&config, command).await?;
        }
        Commands::Docker { command } => match command {
            DockerCommands::Status => handle_docker_status().await?,
        },
        Commands::Stack { command } => match command {
            StackCommands::Discover { stack, engine } => handle_discover(&stack, engine).await?,
        },
    }

    Ok(())
}

/// Logs go to stderr so command output stays pipeable
fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn open_store(config: &AppConfig) -> Result<ConfigStore> {
    ConfigStore::open(&config.data_file)
        .await
        .with_context(|| format!("Failed to open config store {}", config.data_file.display()))
}

async fn stored_config(store: &ConfigStore, key: &str) -> Result<DatabaseConfig> {
    match store.resolve_database(key).await {
        Some(found) => Ok(found),
        None => bail!("Database configuration '{}' not found", key),
    }
}

fn operation_context(config: &AppConfig) -> OperationContext {
    let (_, inspector) = local_inspector();
    OperationContext::from_config(config, inspector)
}

fn print_result(result: &OperationResult) -> Result<()> {
    if result.success {
        println!("{} {}", "✓".green(), result.message);
        if let Some(path) = &result.path {
            println!("  File: {}", path);
        }
        if result.fallback {
            println!("  {}", "Written to a fallback location".yellow());
        }
        return Ok(());
    }

    println!("{} {}", "✗".red(), result.message);
    if let Some(stderr) = result.stderr.as_deref().filter(|s| !s.trim().is_empty()) {
        println!("\n{}", stderr.trim().dimmed());
    }
    bail!("operation failed")
}

async fn handle_dump(config: &AppConfig, key: &str, file: Option<String>) -> Result<()> {
    let store = open_store(config).await?;
    let stored = stored_config(&store, key).await?;

    let mut request = stored.dump_request();
    if file.is_some() {
        request.custom_filename = file;
    }

    println!("Dumping '{}' ({})...", stored.name, stored.db_type);
    let result = run_dump(&operation_context(config), request).await;
    print_result(&result)
}

async fn handle_restore(
    config: &AppConfig,
    key: &str,
    file: Option<String>,
    overrides: RestoreOverrides,
) -> Result<()> {
    let store = open_store(config).await?;
    let stored = stored_config(&store, key).await?;

    let mut request = stored.restore_request(&overrides);
    if file.is_some() {
        request.source.custom_filename = file;
    }

    println!("Restoring '{}' ({})...", stored.name, stored.db_type);
    let result = run_restore(&operation_context(config), request).await;
    print_result(&result)
}

async fn handle_config(config: &AppConfig, command: ConfigCommands) -> Result<()> {
    match command {
        ConfigCommands::List => {
            let store = open_store(config).await?;
            let configs = store.list_databases().await;
            if configs.is_empty() {
                println!("No database configurations. Import some with 'dumpdock config import <file>'.");
                return Ok(());
            }

            println!("{:<5} {:<24} {:<10} {:<40}", "ID", "Name", "Engine", "Target");
            println!("{}", "-".repeat(80));
            for c in configs {
                let target = match (c.params.host(), c.params.database()) {
                    (Some(host), Some(db)) => format!("{}/{}", host, db),
                    (None, Some(db)) => db,
                    (Some(host), None) => host,
                    (None, None) => "-".to_string(),
                };
                println!(
                    "{:<5} {:<24} {:<10} {:<40}",
                    c.id,
                    truncate_string(&c.name, 24),
                    c.db_type.to_string(),
                    truncate_string(&target, 40)
                );
            }
        }
        ConfigCommands::Show { config: key } => {
            let store = open_store(config).await?;
            let stored = stored_config(&store, &key).await?;
            println!("{}", serde_json::to_string_pretty(&stored.redacted())?);
        }
        ConfigCommands::Import { file } => {
            handle_import(config, &file).await?;
        }
        ConfigCommands::Delete { config: key } => {
            let store = open_store(config).await?;
            let stored = stored_config(&store, &key).await?;
            store.delete_database(stored.id).await?;
            println!("{} Deleted configuration '{}'", "✓".green(), stored.name);
        }
        ConfigCommands::Settings => {
            println!("Dump directory:     {}", config.dump_dir.display());
            println!("Config store:       {}", config.data_file.display());
            println!("Runner:             {:?}", config.runner);
            println!("Host gateway:       {}", config.host_gateway);
            println!("Operation timeout:  {}", format_duration(config.operation_timeout.as_secs()));
            println!("Compose timeout:    {}", format_duration(config.compose_timeout.as_secs()));
            println!("API:                {}:{}", config.api_host, config.api_port);
            let token = std::env::var(API_TOKEN_ENV)
                .map(|t| mask_sensitive(&t, 4))
                .unwrap_or_else(|_| "not set (auth disabled)".to_string());
            println!("API token:          {}", token);
        }
    }
    Ok(())
}

/// One configuration object or an array of them
async fn handle_import(config: &AppConfig, file: &Path) -> Result<()> {
    let contents = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let value: serde_json::Value =
        serde_json::from_str(&contents).with_context(|| format!("Failed to parse {}", file.display()))?;
    let inputs: Vec<DatabaseConfigInput> = if value.is_array() {
        serde_json::from_value(value)?
    } else {
        vec![serde_json::from_value(value)?]
    };

    let store = open_store(config).await?;
    let mut failed = 0;
    for input in inputs {
        let name = input.name.clone();
        match store.create_database(input).await {
            Ok(created) => println!("{} Imported '{}' (id {})", "✓".green(), created.name, created.id),
            Err(e) => {
                failed += 1;
                println!("{} '{}': {}", "✗".red(), name, e);
            }
        }
    }
    if failed > 0 {
        bail!("{} configuration(s) could not be imported", failed);
    }
    Ok(())
}

async fn handle_compose(config: &AppConfig, command: ComposeCommands) -> Result<()> {
    let store = open_store(config).await?;
    let executor = ProcessExecutor::new(config.compose_timeout, config.host_gateway.clone());

    match command {
        ComposeCommands::List => {
            let projects = store.list_compose().await;
            if projects.is_empty() {
                println!("No compose projects. Register one with 'dumpdock compose add <name> <path>'.");
                return Ok(());
            }
            println!("{:<5} {:<20} {:<8} {:<45}", "ID", "Name", "Active", "Path");
            println!("{}", "-".repeat(80));
            for p in projects {
                println!(
                    "{:<5} {:<20} {:<8} {:<45}",
                    p.id,
                    truncate_string(&p.name, 20),
                    if p.is_active { "yes" } else { "no" },
                    truncate_string(&p.path.display().to_string(), 45)
                );
            }
        }
        ComposeCommands::Add {
            name,
            path,
            service,
            description,
        } => {
            let path = if path.is_absolute() {
                path
            } else {
                std::env::current_dir()?.join(path)
            };
            let created = store
                .create_compose(ComposeConfigInput {
                    name,
                    path,
                    service_name: service,
                    flags: Default::default(),
                    description,
                    is_active: true,
                })
                .await?;
            println!("{} Registered '{}' (id {})", "✓".green(), created.name, created.id);
        }
        ComposeCommands::Run {
            project,
            operation,
            service,
        } => {
            let Some(stored) = store.resolve_compose(&project).await else {
                bail!("Compose configuration '{}' not found", project);
            };
            println!("Running 'docker compose {}' for '{}'...", operation, stored.name);
            let outcome = compose::run_compose_operation(
                &executor,
                &stored,
                operation,
                service.as_deref(),
                None,
                config.compose_timeout,
            )
            .await;

            let show_output = matches!(operation, ComposeOperation::Logs | ComposeOperation::Ps);
            if let Some(output) = outcome.output.as_deref().filter(|o| show_output && !o.is_empty()) {
                println!("{}", output.trim_end());
            }
            if outcome.success {
                println!("{} {}", "✓".green(), outcome.message);
            } else {
                println!("{} {}", "✗".red(), outcome.message);
                bail!("compose operation failed");
            }
        }
        ComposeCommands::Services { project } => {
            let Some(stored) = store.resolve_compose(&project).await else {
                bail!("Compose configuration '{}' not found", project);
            };

            let declared = compose::declared_services(&stored.path)?;
            println!("Declared services in {}:\n", stored.path.display());
            for (name, service) in &declared {
                let image = service.image.as_deref().unwrap_or("(build)");
                println!("  {:<24} {}", name, image);
            }

            match compose::list_services(&executor, &stored, config.compose_timeout).await {
                Ok(running) => {
                    println!("\nRunning containers: {}", running.len());
                    for container in running {
                        let name = container.get("Name").and_then(|v| v.as_str()).unwrap_or("?");
                        let state = container.get("State").and_then(|v| v.as_str()).unwrap_or("?");
                        println!("  {:<32} {}", name, state);
                    }
                }
                Err(e) => println!("\n{} {}", "⚠".yellow(), e),
            }
        }
        ComposeCommands::Delete { project } => {
            let Some(stored) = store.resolve_compose(&project).await else {
                bail!("Compose configuration '{}' not found", project);
            };
            store.delete_compose(stored.id).await?;
            println!("{} Deleted compose configuration '{}'", "✓".green(), stored.name);
        }
    }
    Ok(())
}

async fn handle_docker_status() -> Result<()> {
    let (docker, _) = local_inspector();
    let status = match docker {
        Some(docker) => docker.status().await,
        None => DockerStatus::not_accessible("Docker client could not be created".to_string()),
    };

    if !status.is_running() {
        let error = status.error.as_deref().unwrap_or("unknown error");
        println!("{} Docker not accessible: {}", "✗".red(), error);
        bail!("docker is not accessible");
    }
    println!("{} Docker is running", "✓".green());
    println!("  Version:     {}", status.version.as_deref().unwrap_or("unknown"));
    println!("  API version: {}", status.api_version.as_deref().unwrap_or("unknown"));
    if let (Some(total), Some(running)) = (status.containers, status.containers_running) {
        println!("  Containers:  {} ({} running)", total, running);
    }
    if let Some(images) = status.images {
        println!("  Images:      {}", images);
    }
    Ok(())
}

async fn handle_discover(stack_name: &str, engine: Option<EngineType>) -> Result<()> {
    let (_, inspector) = local_inspector();
    let info = stack::discover(inspector.as_ref(), stack_name, engine).await?;

    println!("{} Database container in '{}'", "✓".green(), stack_name);
    println!("  Container: {} ({})", info.container_name, info.container_id);
    println!("  Engine:    {}", info.engine);
    if let Some(version) = &info.version {
        println!("  Version:   {}", version);
    }
    match (info.published_port, info.internal_port) {
        (Some(published), Some(internal)) => println!("  Port:      {} -> {}", published, internal),
        (None, Some(internal)) => println!("  Port:      {} (not published)", internal),
        _ => {}
    }
    Ok(())
}

/// CLI argument parsing

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use dumpdock::core::compose::ComposeOperation;
use dumpdock::core::params::RestoreOverrides;
use dumpdock::core::EngineType;

// Build timestamp injected at compile time
pub const VERSION_WITH_BUILD: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (built: ",
    env!("BUILD_TIMESTAMP"),
    ")"
);

#[derive(Parser)]
#[command(name = "dumpdock")]
#[command(author, version = VERSION_WITH_BUILD, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run HTTP API server mode
    #[cfg(feature = "server")]
    Serve {
        /// Port to listen on (default from API_PORT)
        #[arg(short, long)]
        port: Option<u16>,

        /// Host to bind to (default from API_HOST)
        #[arg(long)]
        host: Option<String>,

        /// Enable CORS for cross-origin requests
        #[arg(long)]
        cors: bool,
    },

    /// Generate a random API token for DUMPDOCK_API_TOKEN
    #[cfg(feature = "server")]
    Token,

    /// Dump a stored database configuration
    Dump {
        /// Configuration id or name
        config: String,

        /// File name stem instead of the configuration's
        #[arg(short, long)]
        file: Option<String>,
    },

    /// Restore a stored database configuration from its dump file
    Restore {
        /// Configuration id or name
        config: String,

        /// File name stem to restore from
        #[arg(short, long)]
        file: Option<String>,

        #[command(flatten)]
        overrides: RestoreArgs,
    },

    /// Database configuration management
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },

    /// Docker Compose projects
    Compose {
        #[command(subcommand)]
        command: ComposeCommands,
    },

    /// Docker daemon information
    Docker {
        #[command(subcommand)]
        command: DockerCommands,
    },

    /// Compose stack inspection
    Stack {
        #[command(subcommand)]
        command: StackCommands,
    },
}

/// Restore-side connection overrides
#[derive(Args, Debug, Default)]
pub struct RestoreArgs {
    /// Host of the restore target
    #[arg(long = "restore-host")]
    pub host: Option<String>,

    /// Port of the restore target
    #[arg(long = "restore-port")]
    pub port: Option<u16>,

    /// User on the restore target
    #[arg(long = "restore-username")]
    pub username: Option<String>,

    /// Password on the restore target (falls back to the dump password)
    #[arg(long = "restore-password", env = "DUMPDOCK_RESTORE_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Database name to restore into
    #[arg(long = "database")]
    pub database: Option<String>,

    /// Compose project whose database container receives the restore
    #[arg(long = "stack")]
    pub stack: Option<String>,
}

impl From<RestoreArgs> for RestoreOverrides {
    fn from(args: RestoreArgs) -> Self {
        RestoreOverrides {
            restore_password: args.password,
            restore_username: args.username,
            restore_host: args.host,
            restore_port: args.port,
            local_database_name: args.database,
            stack_name: args.stack,
        }
    }
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// List stored database configurations
    List,

    /// Show one configuration (credentials masked)
    Show { config: String },

    /// Import configurations from a JSON file (one object or an array)
    Import { file: PathBuf },

    /// Delete a configuration
    Delete { config: String },

    /// Show the application settings in effect
    Settings,
}

#[derive(Subcommand)]
pub enum ComposeCommands {
    /// List stored compose projects
    List,

    /// Register a compose project directory
    Add {
        name: String,

        /// Directory holding docker-compose.yml
        path: PathBuf,

        /// Default service for operations
        #[arg(short, long)]
        service: Option<String>,

        #[arg(short, long)]
        description: Option<String>,
    },

    /// Run a compose operation (up, down, restart, logs, ps, build, pull)
    Run {
        /// Compose configuration id or name
        project: String,

        operation: ComposeOperation,

        /// Limit the operation to one service
        #[arg(short, long)]
        service: Option<String>,
    },

    /// Declared and running services of a project
    Services { project: String },

    /// Delete a compose configuration
    Delete { project: String },
}

#[derive(Subcommand)]
pub enum DockerCommands {
    /// Daemon reachability, version and counts
    Status,
}

#[derive(Subcommand)]
pub enum StackCommands {
    /// Find the database container of a compose project
    Discover {
        stack: String,

        /// Prefer containers of this engine
        #[arg(short, long)]
        engine: Option<EngineType>,
    },
}

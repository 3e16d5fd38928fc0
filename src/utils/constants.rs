/// Shared constants for dumpdock
///
/// Engine-specific values (extensions, ports, images) live in `core::engine`.

use std::time::Duration;

pub const APP_NAME: &str = "dumpdock";

/// Hostnames treated as "this machine" when reconciling restore targets
pub const LOOPBACK_HOSTS: &[&str] = &["localhost", "127.0.0.1"];

/// Hostname a containerised client uses to reach services on the Docker host
pub const DEFAULT_HOST_GATEWAY: &str = "host.docker.internal";

/// Label Docker Compose attaches to every container of a project
pub const COMPOSE_PROJECT_LABEL: &str = "com.docker.compose.project";

pub const COMPOSE_FILE_NAME: &str = "docker-compose.yml";

/// Upper bound for `docker compose` invocations (up/down/pull can be slow)
pub const DEFAULT_COMPOSE_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Upper bound for a single dump/restore tool invocation
pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(60 * 60);

pub const DEFAULT_DUMP_DIR: &str = "/tmp/dumpdock";

pub const DEFAULT_API_HOST: &str = "127.0.0.1";
pub const DEFAULT_API_PORT: u16 = 8000;

/// Environment variable holding the API bearer token
pub const API_TOKEN_ENV: &str = "DUMPDOCK_API_TOKEN";

/// Placeholder written in place of credentials in logs and error messages
pub const REDACTED: &str = "****";

/// Secrets shorter than this are only redacted as standalone tokens
pub const REDACT_SUBSTRING_MIN_LEN: usize = 4;

/// Finished operations older than this are dropped from the registry
pub const OPERATION_RETENTION: Duration = Duration::from_secs(24 * 60 * 60);

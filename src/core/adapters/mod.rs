/// Per-engine command builders
///
/// Each engine has one adapter that turns reconciled connection parameters
/// into the steps for a dump or a restore. Adapters only build; running the
/// steps is the orchestrator's job.

mod mongodb;
mod mysql;
mod postgres;
mod redis;
mod sqlite;

pub use mongodb::MongodbAdapter;
pub use mysql::MysqlAdapter;
pub use postgres::PostgresAdapter;
pub use redis::RedisAdapter;
pub use sqlite::SqliteAdapter;

use std::path::Path;

use crate::core::command::{PlannedStep, Step};
use crate::core::engine::EngineType;
use crate::core::error::OperationError;
use crate::core::params::ConnectionParams;

/// How the built commands will reach the database
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildOptions {
    /// Commands run inside the database's own container, so the local socket
    /// is used instead of host/port flags
    pub inside_container: bool,
}

pub trait EngineAdapter: Send + Sync {
    fn engine(&self) -> EngineType;

    /// Connection fields that must be present before building
    fn required_fields(&self) -> &'static [&'static str];

    /// Single step writing the dump to `target`
    fn build_dump(
        &self,
        params: &ConnectionParams,
        target: &Path,
        options: BuildOptions,
    ) -> Result<Step, OperationError>;

    /// Ordered steps loading `source` into the database
    fn build_restore(
        &self,
        params: &ConnectionParams,
        source: &Path,
        options: BuildOptions,
    ) -> Result<Vec<PlannedStep>, OperationError>;
}

static POSTGRES: PostgresAdapter = PostgresAdapter;
static MYSQL: MysqlAdapter = MysqlAdapter;
static MONGODB: MongodbAdapter = MongodbAdapter;
static REDIS: RedisAdapter = RedisAdapter;
static SQLITE: SqliteAdapter = SqliteAdapter;

pub fn adapter_for(engine: EngineType) -> &'static dyn EngineAdapter {
    match engine {
        EngineType::Postgres => &POSTGRES,
        EngineType::Mysql => &MYSQL,
        EngineType::Mongodb => &MONGODB,
        EngineType::Redis => &REDIS,
        EngineType::Sqlite => &SQLITE,
    }
}

/// `[host_flag, host, port_flag, port]` unless running inside the container
fn network_flags(
    params: &ConnectionParams,
    engine: EngineType,
    host_flag: &str,
    port_flag: &str,
    options: BuildOptions,
) -> Result<Vec<String>, OperationError> {
    if options.inside_container {
        return Ok(Vec::new());
    }
    let host = params.host().unwrap_or_else(|| "localhost".to_string());
    let port = params
        .port()?
        .or(engine.default_port())
        .map(|p| p.to_string())
        .unwrap_or_default();

    let mut flags = vec![host_flag.to_string(), host];
    if !port.is_empty() {
        flags.extend([port_flag.to_string(), port]);
    }
    Ok(flags)
}

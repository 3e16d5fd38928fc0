/// Supported database engines and their fixed properties

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::core::error::OperationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineType {
    Postgres,
    Mysql,
    Mongodb,
    Redis,
    Sqlite,
}

/// Static per-engine data
struct EngineSpec {
    name: &'static str,
    extension: &'static str,
    default_port: Option<u16>,
    image: &'static str,
}

const POSTGRES: EngineSpec = EngineSpec {
    name: "postgres",
    extension: ".sql",
    default_port: Some(5432),
    image: "postgres:16",
};
const MYSQL: EngineSpec = EngineSpec {
    name: "mysql",
    extension: ".sql",
    default_port: Some(3306),
    image: "mysql:8.0",
};
const MONGODB: EngineSpec = EngineSpec {
    name: "mongodb",
    extension: ".bson",
    default_port: Some(27017),
    image: "mongo:6.0",
};
const REDIS: EngineSpec = EngineSpec {
    name: "redis",
    extension: ".rdb",
    default_port: Some(6379),
    image: "redis:7.0",
};
const SQLITE: EngineSpec = EngineSpec {
    name: "sqlite",
    extension: ".db",
    default_port: None,
    image: "alpine:latest",
};

/// Image-name fragments that identify an engine container, in match priority
/// order. The first fragment contained in an image name wins.
pub const IMAGE_IDENTIFIERS: &[(&str, EngineType)] = &[
    ("postgres", EngineType::Postgres),
    ("mysql", EngineType::Mysql),
    ("mariadb", EngineType::Mysql),
    ("mongo", EngineType::Mongodb),
    ("redis", EngineType::Redis),
];

impl EngineType {
    pub const ALL: [EngineType; 5] = [
        EngineType::Postgres,
        EngineType::Mysql,
        EngineType::Mongodb,
        EngineType::Redis,
        EngineType::Sqlite,
    ];

    fn spec(&self) -> &'static EngineSpec {
        match self {
            EngineType::Postgres => &POSTGRES,
            EngineType::Mysql => &MYSQL,
            EngineType::Mongodb => &MONGODB,
            EngineType::Redis => &REDIS,
            EngineType::Sqlite => &SQLITE,
        }
    }

    pub fn as_str(&self) -> &'static str {
        self.spec().name
    }

    /// Canonical artifact extension, including the leading dot
    pub fn extension(&self) -> &'static str {
        self.spec().extension
    }

    pub fn default_port(&self) -> Option<u16> {
        self.spec().default_port
    }

    /// Client image used by the docker runner
    pub fn default_image(&self) -> &'static str {
        self.spec().image
    }

    /// Classify a container image name, honouring `IMAGE_IDENTIFIERS` order
    pub fn from_image(image: &str) -> Option<EngineType> {
        let image = image.to_lowercase();
        IMAGE_IDENTIFIERS
            .iter()
            .find(|(fragment, _)| image.contains(fragment))
            .map(|(_, engine)| *engine)
    }
}

impl fmt::Display for EngineType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EngineType {
    type Err = OperationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        EngineType::ALL
            .into_iter()
            .find(|e| e.as_str() == wanted)
            .ok_or_else(|| {
                OperationError::Validation(format!(
                    "Unsupported database type: {} (expected one of postgres, mysql, mongodb, redis, sqlite)",
                    s
                ))
            })
    }
}

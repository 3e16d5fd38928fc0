/// Persisted database and compose configurations
///
/// Records live in a single JSON file. Every mutation rewrites the file
/// through a temporary sibling and a rename.

use anyhow::Context;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::OnceLock;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::core::engine::EngineType;
use crate::core::operations::{DumpRequest, RestoreRequest};
use crate::core::params::{ConnectionParams, RestoreOverrides};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Invalid configuration: {}", .0.join("; "))]
    Invalid(Vec<String>),

    #[error("A configuration named '{0}' already exists")]
    Duplicate(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error(transparent)]
    Persist(#[from] anyhow::Error),
}

/// One database connection plus its dump/restore preferences
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub id: i64,
    pub name: String,
    pub db_type: EngineType,
    pub params: ConnectionParams,
    #[serde(default)]
    pub dump_file_name: Option<String>,
    #[serde(flatten)]
    pub restore: RestoreOverrides,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DatabaseConfig {
    pub fn dump_request(&self) -> DumpRequest {
        DumpRequest {
            config_name: self.name.clone(),
            engine: self.db_type,
            params: self.params.clone(),
            custom_filename: self.dump_file_name.clone(),
        }
    }

    /// Copy safe to return from the API
    pub fn redacted(&self) -> DatabaseConfig {
        let mut copy = self.clone();
        copy.params = self.params.redacted();
        if copy.restore.restore_password.is_some() {
            copy.restore.restore_password = Some(crate::utils::REDACTED.to_string());
        }
        copy
    }

    /// Restore request using the stored overrides, with `extra` taking priority
    pub fn restore_request(&self, extra: &RestoreOverrides) -> RestoreRequest {
        let stored = &self.restore;
        let pick = |a: &Option<String>, b: &Option<String>| {
            a.clone()
                .filter(|v| !v.trim().is_empty())
                .or_else(|| b.clone())
        };
        RestoreRequest {
            source: self.dump_request(),
            overrides: RestoreOverrides {
                restore_password: pick(&extra.restore_password, &stored.restore_password),
                restore_username: pick(&extra.restore_username, &stored.restore_username),
                restore_host: pick(&extra.restore_host, &stored.restore_host),
                restore_port: extra.restore_port.or(stored.restore_port),
                local_database_name: pick(&extra.local_database_name, &stored.local_database_name),
                stack_name: pick(&extra.stack_name, &stored.stack_name),
            },
        }
    }
}

/// Create/update payload for a database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfigInput {
    pub name: String,
    pub db_type: EngineType,
    #[serde(default)]
    pub params: ConnectionParams,
    #[serde(default)]
    pub dump_file_name: Option<String>,
    #[serde(flatten)]
    pub restore: RestoreOverrides,
}

impl DatabaseConfigInput {
    /// Field-level problems, empty when the input is acceptable
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        validate_name(&self.name, &mut errors);

        let params = &self.params;
        if let Some(host) = params.host() {
            if !is_valid_host(&host) {
                errors.push(format!("Invalid hostname or IP address: {}", host));
            }
        }
        if let Err(e) = params.port() {
            errors.push(e.to_string());
        }
        if let Some(user) = params.username() {
            if user.chars().count() > 64 {
                errors.push("Username must be at most 64 characters long".to_string());
            }
        }
        if let Some(password) = params.password() {
            if password.chars().count() > 128 {
                errors.push("Password must be at most 128 characters long".to_string());
            }
        }
        // SQLite keeps a file path here
        if self.db_type != EngineType::Sqlite {
            if let Some(db) = params.database() {
                validate_database_name(&db, "Database name", &mut errors);
            }
        }

        if let Some(host) = self.restore.restore_host.as_deref().filter(|h| !h.trim().is_empty()) {
            if !is_valid_host(host) {
                errors.push(format!("Invalid restore host: {}", host));
            }
        }
        if let Some(db) = self
            .restore
            .local_database_name
            .as_deref()
            .filter(|d| !d.trim().is_empty())
        {
            validate_database_name(db, "Local database name", &mut errors);
        }
        if let Some(file) = self.dump_file_name.as_deref().filter(|f| !f.trim().is_empty()) {
            if crate::core::paths::sanitize_stem(file).is_err() {
                errors.push(format!("Dump file name '{}' has no usable characters", file));
            }
        }
        errors
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComposeConfig {
    pub id: i64,
    pub name: String,
    /// Directory holding docker-compose.yml
    pub path: PathBuf,
    #[serde(default)]
    pub service_name: Option<String>,
    /// Global `docker compose` flags; `true` adds a bare `--flag`
    #[serde(default)]
    pub flags: BTreeMap<String, Value>,
    #[serde(default)]
    pub description: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComposeConfigInput {
    pub name: String,
    pub path: PathBuf,
    #[serde(default)]
    pub service_name: Option<String>,
    #[serde(default)]
    pub flags: BTreeMap<String, Value>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

impl ComposeConfigInput {
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        validate_name(&self.name, &mut errors);
        if self.path.as_os_str().is_empty() {
            errors.push("Path cannot be empty".to_string());
        } else if !self.path.is_absolute() {
            errors.push(format!("Path must be absolute: {}", self.path.display()));
        }
        for (flag, value) in &self.flags {
            if flag.is_empty() || flag.starts_with('-') || flag.contains(char::is_whitespace) {
                errors.push(format!("Invalid flag name '{}'", flag));
            }
            if value.is_array() || value.is_object() {
                errors.push(format!("Flag '{}' must be a string, number or boolean", flag));
            }
        }
        errors
    }
}

fn hostname_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[a-zA-Z0-9]([a-zA-Z0-9\-_]{0,61}[a-zA-Z0-9])?(\.[a-zA-Z0-9]([a-zA-Z0-9\-_]{0,61}[a-zA-Z0-9])?)*$")
            .expect("static regex")
    })
}

fn database_name_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-zA-Z0-9_-]+$").expect("static regex"))
}

fn is_valid_host(host: &str) -> bool {
    host.parse::<IpAddr>().is_ok() || (host.len() <= 253 && hostname_pattern().is_match(host))
}

fn validate_name(name: &str, errors: &mut Vec<String>) {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        errors.push("Name cannot be empty".to_string());
    } else if trimmed.chars().count() > 100 {
        errors.push("Name must be at most 100 characters long".to_string());
    }
}

fn validate_database_name(db: &str, label: &str, errors: &mut Vec<String>) {
    if db.chars().count() > 64 {
        errors.push(format!("{} too long (max 64 characters)", label));
    } else if !database_name_pattern().is_match(db) {
        errors.push(format!(
            "{} can only contain letters, numbers, underscores, and hyphens",
            label
        ));
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreData {
    #[serde(default)]
    next_id: i64,
    #[serde(default)]
    databases: Vec<DatabaseConfig>,
    #[serde(default)]
    compose: Vec<ComposeConfig>,
}

impl StoreData {
    fn allocate_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

pub struct ConfigStore {
    path: PathBuf,
    data: RwLock<StoreData>,
}

impl ConfigStore {
    /// Load the store at `path`, starting empty when the file is absent
    pub async fn open(path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let path = path.into();
        let data = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse config store {}", path.display()))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => StoreData::default(),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read config store {}", path.display()))
            }
        };
        debug!(path = %path.display(), "Config store opened");
        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    async fn persist(&self, data: &StoreData) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(data).context("Failed to serialize config store")?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json)
            .await
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("Failed to replace {}", self.path.display()))?;
        Ok(())
    }

    pub async fn list_databases(&self) -> Vec<DatabaseConfig> {
        self.data.read().await.databases.clone()
    }

    pub async fn get_database(&self, id: i64) -> Option<DatabaseConfig> {
        self.data.read().await.databases.iter().find(|c| c.id == id).cloned()
    }

    pub async fn find_database(&self, name: &str) -> Option<DatabaseConfig> {
        self.data.read().await.databases.iter().find(|c| c.name == name).cloned()
    }

    /// Lookup by numeric id or by name
    pub async fn resolve_database(&self, key: &str) -> Option<DatabaseConfig> {
        match key.parse::<i64>() {
            Ok(id) => match self.get_database(id).await {
                Some(found) => Some(found),
                None => self.find_database(key).await,
            },
            Err(_) => self.find_database(key).await,
        }
    }

    pub async fn create_database(&self, input: DatabaseConfigInput) -> Result<DatabaseConfig, StoreError> {
        let errors = input.validate();
        if !errors.is_empty() {
            return Err(StoreError::Invalid(errors));
        }

        let mut data = self.data.write().await;
        let name = input.name.trim().to_string();
        if data.databases.iter().any(|c| c.name == name) {
            return Err(StoreError::Duplicate(name));
        }

        let now = Utc::now();
        let config = DatabaseConfig {
            id: data.allocate_id(),
            name,
            db_type: input.db_type,
            params: input.params,
            dump_file_name: input.dump_file_name,
            restore: input.restore,
            created_at: now,
            updated_at: now,
        };
        data.databases.push(config.clone());
        self.persist(&data).await?;
        info!(id = config.id, name = %config.name, "Database configuration created");
        Ok(config)
    }

    pub async fn update_database(&self, id: i64, input: DatabaseConfigInput) -> Result<DatabaseConfig, StoreError> {
        let errors = input.validate();
        if !errors.is_empty() {
            return Err(StoreError::Invalid(errors));
        }

        let mut data = self.data.write().await;
        let name = input.name.trim().to_string();
        if data.databases.iter().any(|c| c.name == name && c.id != id) {
            return Err(StoreError::Duplicate(name));
        }
        let config = data
            .databases
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| StoreError::NotFound(format!("Configuration {}", id)))?;

        // records fetched from the API come back with masked credentials
        let mut params = input.params;
        params.keep_secrets_from(&config.params);
        let mut restore = input.restore;
        let restore_password_masked = restore
            .restore_password
            .as_deref()
            .map_or(true, |p| p == crate::utils::REDACTED);
        if restore_password_masked {
            restore.restore_password = config.restore.restore_password.clone();
        }

        config.name = name;
        config.db_type = input.db_type;
        config.params = params;
        config.dump_file_name = input.dump_file_name;
        config.restore = restore;
        config.updated_at = Utc::now();
        let updated = config.clone();

        self.persist(&data).await?;
        info!(id, name = %updated.name, "Database configuration updated");
        Ok(updated)
    }

    pub async fn delete_database(&self, id: i64) -> Result<(), StoreError> {
        let mut data = self.data.write().await;
        let before = data.databases.len();
        data.databases.retain(|c| c.id != id);
        if data.databases.len() == before {
            return Err(StoreError::NotFound(format!("Configuration {}", id)));
        }
        self.persist(&data).await?;
        info!(id, "Database configuration deleted");
        Ok(())
    }

    pub async fn list_compose(&self) -> Vec<ComposeConfig> {
        self.data.read().await.compose.clone()
    }

    pub async fn get_compose(&self, id: i64) -> Option<ComposeConfig> {
        self.data.read().await.compose.iter().find(|c| c.id == id).cloned()
    }

    pub async fn resolve_compose(&self, key: &str) -> Option<ComposeConfig> {
        let data = self.data.read().await;
        key.parse::<i64>()
            .ok()
            .and_then(|id| data.compose.iter().find(|c| c.id == id))
            .or_else(|| data.compose.iter().find(|c| c.name == key))
            .cloned()
    }

    pub async fn create_compose(&self, input: ComposeConfigInput) -> Result<ComposeConfig, StoreError> {
        let errors = input.validate();
        if !errors.is_empty() {
            return Err(StoreError::Invalid(errors));
        }

        let mut data = self.data.write().await;
        let name = input.name.trim().to_string();
        if data.compose.iter().any(|c| c.name == name) {
            return Err(StoreError::Duplicate(name));
        }

        let now = Utc::now();
        let config = ComposeConfig {
            id: data.allocate_id(),
            name,
            path: input.path,
            service_name: input.service_name,
            flags: input.flags,
            description: input.description,
            is_active: input.is_active,
            created_at: now,
            updated_at: now,
        };
        data.compose.push(config.clone());
        self.persist(&data).await?;
        info!(id = config.id, name = %config.name, "Compose configuration created");
        Ok(config)
    }

    pub async fn update_compose(&self, id: i64, input: ComposeConfigInput) -> Result<ComposeConfig, StoreError> {
        let errors = input.validate();
        if !errors.is_empty() {
            return Err(StoreError::Invalid(errors));
        }

        let mut data = self.data.write().await;
        let name = input.name.trim().to_string();
        if data.compose.iter().any(|c| c.name == name && c.id != id) {
            return Err(StoreError::Duplicate(name));
        }
        let config = data
            .compose
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| StoreError::NotFound(format!("Compose configuration {}", id)))?;

        config.name = name;
        config.path = input.path;
        config.service_name = input.service_name;
        config.flags = input.flags;
        config.description = input.description;
        config.is_active = input.is_active;
        config.updated_at = Utc::now();
        let updated = config.clone();

        self.persist(&data).await?;
        Ok(updated)
    }

    pub async fn delete_compose(&self, id: i64) -> Result<(), StoreError> {
        let mut data = self.data.write().await;
        let before = data.compose.len();
        data.compose.retain(|c| c.id != id);
        if data.compose.len() == before {
            return Err(StoreError::NotFound(format!("Compose configuration {}", id)));
        }
        self.persist(&data).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn pg_input(name: &str) -> DatabaseConfigInput {
        serde_json::from_value(json!({
            "name": name,
            "db_type": "postgres",
            "params": {"host": "db.internal", "port": 5432, "username": "app", "password": "pw", "database": "shop"},
            "restore_port": "6543",
            "stack_name": "shop"
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_crud_round_trip_through_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/configs.json");

        let store = ConfigStore::open(&path).await.unwrap();
        let created = store.create_database(pg_input("shop")).await.unwrap();
        assert_eq!(created.id, 1);
        assert_eq!(created.restore.restore_port, Some(6543));

        // reopen from disk
        let store = ConfigStore::open(&path).await.unwrap();
        let loaded = store.find_database("shop").await.unwrap();
        assert_eq!(loaded.id, created.id);
        assert_eq!(loaded.restore.stack_name.as_deref(), Some("shop"));
        assert_eq!(store.resolve_database("1").await.unwrap().name, "shop");

        let mut input = pg_input("shop-renamed");
        input.dump_file_name = Some("nightly".into());
        let updated = store.update_database(1, input).await.unwrap();
        assert_eq!(updated.name, "shop-renamed");
        assert!(updated.updated_at >= updated.created_at);

        store.delete_database(1).await.unwrap();
        assert!(store.list_databases().await.is_empty());
        assert!(matches!(store.delete_database(1).await, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_update_with_fetched_record_keeps_credentials() {
        let dir = TempDir::new().unwrap();
        let store = ConfigStore::open(dir.path().join("c.json")).await.unwrap();
        let mut input = pg_input("shop");
        input.params.set("password", "realpw");
        input.restore.restore_password = Some("restorepw".into());
        let created = store.create_database(input).await.unwrap();

        let fetched = serde_json::to_value(created.redacted()).unwrap();
        assert_eq!(fetched["params"]["password"], "****");
        let mut edited: DatabaseConfigInput = serde_json::from_value(fetched).unwrap();
        edited.dump_file_name = Some("nightly".into());
        store.update_database(created.id, edited).await.unwrap();

        let stored = store.get_database(created.id).await.unwrap();
        assert_eq!(stored.params.password().as_deref(), Some("realpw"));
        assert_eq!(stored.restore.restore_password.as_deref(), Some("restorepw"));
        assert_eq!(stored.dump_file_name.as_deref(), Some("nightly"));

        let mut changed = pg_input("shop");
        changed.params.set("password", "newpw");
        store.update_database(created.id, changed).await.unwrap();
        let stored = store.get_database(created.id).await.unwrap();
        assert_eq!(stored.params.password().as_deref(), Some("newpw"));
    }

    #[tokio::test]
    async fn test_duplicate_names_are_rejected() {
        let dir = TempDir::new().unwrap();
        let store = ConfigStore::open(dir.path().join("c.json")).await.unwrap();
        store.create_database(pg_input("shop")).await.unwrap();
        let err = store.create_database(pg_input("shop")).await.unwrap_err();
        assert!(matches!(err, StoreError::Duplicate(_)));

        let other = store.create_database(pg_input("billing")).await.unwrap();
        let err = store.update_database(other.id, pg_input("shop")).await.unwrap_err();
        assert!(matches!(err, StoreError::Duplicate(_)));
    }

    #[test]
    fn test_validation_messages() {
        let input: DatabaseConfigInput = serde_json::from_value(json!({
            "name": " ",
            "db_type": "mysql",
            "params": {"host": "bad host!", "port": 99999, "database": "shop; drop"}
        }))
        .unwrap();
        let errors = input.validate();
        assert_eq!(errors.len(), 4, "{errors:?}");

        let sqlite: DatabaseConfigInput = serde_json::from_value(json!({
            "name": "local",
            "db_type": "sqlite",
            "params": {"database": "/var/lib/app/app.db"}
        }))
        .unwrap();
        assert!(sqlite.validate().is_empty());
    }

    #[test]
    fn test_restore_request_prefers_request_overrides() {
        let now = Utc::now();
        let config = DatabaseConfig {
            id: 1,
            name: "shop".into(),
            db_type: EngineType::Postgres,
            params: ConnectionParams::new(),
            dump_file_name: Some("nightly".into()),
            restore: RestoreOverrides {
                restore_password: Some("stored".into()),
                stack_name: Some("shop".into()),
                ..Default::default()
            },
            created_at: now,
            updated_at: now,
        };
        let extra = RestoreOverrides {
            restore_password: Some("fresh".into()),
            restore_port: Some(5433),
            ..Default::default()
        };

        let request = config.restore_request(&extra);
        assert_eq!(request.source.custom_filename.as_deref(), Some("nightly"));
        assert_eq!(request.overrides.restore_password.as_deref(), Some("fresh"));
        assert_eq!(request.overrides.restore_port, Some(5433));
        assert_eq!(request.overrides.stack_name.as_deref(), Some("shop"));
    }

    #[tokio::test]
    async fn test_compose_configs() {
        let dir = TempDir::new().unwrap();
        let store = ConfigStore::open(dir.path().join("c.json")).await.unwrap();
        let input: ComposeConfigInput = serde_json::from_value(json!({
            "name": "shop",
            "path": dir.path(),
            "flags": {"profile": "db"}
        }))
        .unwrap();
        let created = store.create_compose(input).await.unwrap();
        assert!(created.is_active);
        assert_eq!(store.resolve_compose("shop").await.unwrap().id, created.id);

        let bad: ComposeConfigInput =
            serde_json::from_value(json!({"name": "x", "path": "relative/dir", "flags": {"--f": true}})).unwrap();
        assert_eq!(bad.validate().len(), 2);
    }
}

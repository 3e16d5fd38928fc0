/// Connection parameters and restore-side reconciliation
///
/// A restore starts from the parameters the dump used and layers the
/// configuration's restore overrides on top of them. Rules are applied in a
/// fixed order; later rules may overwrite earlier ones:
///
/// 1. copy the dump parameters
/// 2. `local_database_name` replaces `database`
/// 3. `restore_password` replaces `password`
/// 4. `restore_username` replaces `username`
/// 5. host/port come from stack discovery when a stack is named, otherwise
///    from the explicit restore host/port, the dump values, or the engine default
/// 6. a loopback host is rewritten to the host gateway, except for stack targets
/// 7. a MongoDB URI gets the same loopback rewrite on its host

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use tracing::{info, warn};
use url::Url;

use crate::core::adapters::adapter_for;
use crate::core::engine::EngineType;
use crate::core::error::OperationError;
use crate::core::stack::{discover, ContainerInspector, StackInfo};
use crate::utils::is_loopback_host;

pub const HOST: &str = "host";
pub const PORT: &str = "port";
pub const USERNAME: &str = "username";
pub const PASSWORD: &str = "password";
pub const DATABASE: &str = "database";
pub const URI: &str = "uri";

/// Free-form, engine-dependent connection parameters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionParams(Map<String, Value>);

impl ConnectionParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(map: Map<String, Value>) -> Self {
        Self(map)
    }

    /// String view of a field; numbers are stringified, blanks count as absent
    pub fn get_str(&self, key: &str) -> Option<String> {
        match self.0.get(key)? {
            Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    pub fn set(&mut self, key: &str, value: impl Into<Value>) {
        self.0.insert(key.to_string(), value.into());
    }

    pub fn host(&self) -> Option<String> {
        self.get_str(HOST)
    }

    pub fn port(&self) -> Result<Option<u16>, OperationError> {
        match self.get_str(PORT) {
            Some(raw) => parse_port(&raw).map(Some),
            None => Ok(None),
        }
    }

    /// `user` is accepted as an alias of `username`
    pub fn username(&self) -> Option<String> {
        self.get_str(USERNAME).or_else(|| self.get_str("user"))
    }

    pub fn password(&self) -> Option<String> {
        self.get_str(PASSWORD)
    }

    pub fn database(&self) -> Option<String> {
        self.get_str(DATABASE)
    }

    pub fn uri(&self) -> Option<String> {
        self.get_str(URI)
    }

    /// Field value or a validation error naming the field
    pub fn require(&self, field: &str, engine: EngineType) -> Result<String, OperationError> {
        let value = if field == USERNAME {
            self.username()
        } else {
            self.get_str(field)
        };
        value.ok_or_else(|| {
            OperationError::Validation(format!(
                "{} requires the '{}' connection parameter",
                engine, field
            ))
        })
    }

    /// Credential values that must never appear in logs
    pub fn secrets(&self) -> Vec<String> {
        let mut secrets = Vec::new();
        if let Some(password) = self.password() {
            secrets.push(password);
        }
        if let Some(uri) = self.uri() {
            if let Some(password) = Url::parse(&uri).ok().and_then(|u| u.password().map(str::to_string)) {
                secrets.push(password);
            }
        }
        secrets
    }

    /// Copy safe to log: password masked, URI credentials stripped
    pub fn redacted(&self) -> ConnectionParams {
        let mut copy = self.clone();
        if copy.0.contains_key(PASSWORD) {
            copy.set(PASSWORD, crate::utils::REDACTED);
        }
        if let Some(uri) = self.uri() {
            if let Ok(mut parsed) = Url::parse(&uri) {
                if parsed.password().is_some() {
                    let _ = parsed.set_password(Some(crate::utils::REDACTED));
                    copy.set(URI, parsed.to_string());
                }
            }
        }
        copy
    }

    /// Undo `redacted` against the stored values: a masked or missing
    /// password, or a URI whose password is masked, keeps what `stored` has
    pub fn keep_secrets_from(&mut self, stored: &ConnectionParams) {
        let masked = |v: &Option<String>| v.as_deref().map_or(true, |p| p == crate::utils::REDACTED);
        if masked(&self.password()) {
            match stored.0.get(PASSWORD) {
                Some(value) => {
                    self.0.insert(PASSWORD.to_string(), value.clone());
                }
                None => {
                    self.0.remove(PASSWORD);
                }
            }
        }

        let (Some(uri), Some(stored_uri)) = (self.uri(), stored.uri()) else {
            return;
        };
        let Ok(mut parsed) = Url::parse(&uri) else {
            return;
        };
        if parsed.password() != Some(crate::utils::REDACTED) {
            return;
        }
        let original = Url::parse(&stored_uri).ok();
        let password = original.as_ref().and_then(|u| u.password());
        if parsed.set_password(password).is_ok() {
            self.set(URI, parsed.to_string());
        }
    }
}

impl From<Map<String, Value>> for ConnectionParams {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

pub fn parse_port(raw: &str) -> Result<u16, OperationError> {
    match raw.trim().parse::<u16>() {
        Ok(port) if port > 0 => Ok(port),
        _ => Err(OperationError::Validation(format!(
            "Port must be a number between 1 and 65535, got '{}'",
            raw
        ))),
    }
}

/// Restore-side overrides stored on a configuration or sent with a request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RestoreOverrides {
    pub restore_password: Option<String>,
    pub restore_username: Option<String>,
    pub restore_host: Option<String>,
    #[serde(deserialize_with = "deserialize_opt_port")]
    pub restore_port: Option<u16>,
    pub local_database_name: Option<String>,
    pub stack_name: Option<String>,
}

/// Ports arrive as numbers or strings depending on the client
fn deserialize_opt_port<'de, D>(deserializer: D) -> Result<Option<u16>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => parse_port(&s).map(Some).map_err(serde::de::Error::custom),
        Some(Value::Number(n)) => n
            .as_u64()
            .and_then(|p| u16::try_from(p).ok())
            .filter(|p| *p > 0)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid port {}", n))),
        Some(other) => Err(serde::de::Error::custom(format!("invalid port {}", other))),
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Settings that shape reconciliation
#[derive(Debug, Clone)]
pub struct ReconcilePolicy {
    pub host_gateway: String,
    pub require_restore_password: bool,
}

/// Final restore parameters plus the stack container they point at, if any
#[derive(Debug, Clone)]
pub struct Reconciled {
    pub params: ConnectionParams,
    pub stack: Option<StackInfo>,
}

pub async fn reconcile(
    dump_params: &ConnectionParams,
    engine: EngineType,
    overrides: &RestoreOverrides,
    inspector: &dyn ContainerInspector,
    policy: &ReconcilePolicy,
) -> Result<Reconciled, OperationError> {
    let mut params = dump_params.clone();

    if let Some(name) = non_empty(&overrides.local_database_name) {
        info!(database = name, "Restoring into local database name");
        params.set(DATABASE, name);
    }

    match non_empty(&overrides.restore_password) {
        Some(password) => params.set(PASSWORD, password),
        None if policy.require_restore_password => {
            return Err(OperationError::Validation(
                "A restore password is required for restore operations".to_string(),
            ));
        }
        None => {
            if params.password().is_some() {
                warn!(engine = %engine, "No restore password given, reusing the dump-time password");
            }
        }
    }

    if let Some(username) = non_empty(&overrides.restore_username) {
        params.set(USERNAME, username);
    }

    let mut stack = None;
    if engine != EngineType::Sqlite {
        if let Some(stack_name) = non_empty(&overrides.stack_name) {
            let found = discover(inspector, stack_name, Some(engine)).await?;
            if found.engine != engine {
                return Err(OperationError::Precondition(format!(
                    "Stack '{}' runs {} in container '{}', but the configuration is for {}",
                    stack_name, found.engine, found.container_name, engine
                )));
            }

            params.set(HOST, found.container_name.clone());
            let port = overrides
                .restore_port
                .or(found.published_port)
                .or(params.port()?)
                .or(engine.default_port());
            if let Some(port) = port {
                params.set(PORT, port);
            }
            info!(
                stack = stack_name,
                container = %found.container_name,
                port = ?port,
                "Resolved restore target from stack"
            );
            stack = Some(found);
        } else {
            let host = non_empty(&overrides.restore_host)
                .map(str::to_string)
                .or_else(|| params.host())
                .unwrap_or_else(|| "localhost".to_string());
            params.set(HOST, host);

            let port = match overrides.restore_port {
                Some(port) => Some(port),
                None => params.port()?.or(engine.default_port()),
            };
            if let Some(port) = port {
                params.set(PORT, port);
            }
        }

        if stack.is_none() {
            if let Some(host) = params.host().filter(|h| is_loopback_host(h)) {
                info!(from = %host, to = %policy.host_gateway, "Rewriting loopback host for container-to-host access");
                params.set(HOST, policy.host_gateway.clone());
            }

            if engine == EngineType::Mongodb {
                if let Some(uri) = params.uri() {
                    if let Some(rewritten) = rewrite_uri_host(&uri, &policy.host_gateway) {
                        params.set(URI, rewritten);
                    }
                }
            }
        }
    }

    validate_required(&params, engine)?;

    Ok(Reconciled { params, stack })
}

/// Swap a loopback host in a connection URI, keeping credentials, port and path
pub fn rewrite_uri_host(uri: &str, gateway: &str) -> Option<String> {
    let mut parsed = match Url::parse(uri) {
        Ok(parsed) => parsed,
        Err(e) => {
            warn!(error = %e, "Connection URI could not be parsed; leaving it unchanged");
            return None;
        }
    };
    let host = parsed.host_str()?;
    if !is_loopback_host(host) {
        return None;
    }
    parsed.set_host(Some(gateway)).ok()?;
    Some(parsed.to_string())
}

/// Fail with a descriptive message when an engine-required field is missing
pub fn validate_required(params: &ConnectionParams, engine: EngineType) -> Result<(), OperationError> {
    for field in adapter_for(engine).required_fields() {
        params.require(field, engine)?;
    }
    params.port()?;
    Ok(())
}

/// API request handlers
/// Each handler resolves its inputs and delegates to `core`

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{info, warn};
use uuid::Uuid;

use super::AppState;
use crate::core::compose::{self, ComposeOperation, ComposeOutcome, ComposeService};
use crate::core::docker::DockerStatus;
use crate::core::operations::{
    dump_holding, dump_target, restore_holding, restore_source, run_dump, run_restore, DumpRequest,
    RestoreRequest,
};
use crate::core::params::RestoreOverrides;
use crate::core::registry::{OperationKind, OperationRecord, OperationStatus};
use crate::core::store::{
    ComposeConfig, ComposeConfigInput, DatabaseConfig, DatabaseConfigInput, StoreError,
};
use crate::core::{ErrorKind, OperationError, OperationResult};

// ============================================================================
// Response Types
// ============================================================================

#[derive(Serialize)]
pub struct ApiResponse<T> {
    success: bool,
    data: Option<T>,
    error: Option<String>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    fn error(msg: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(msg),
        }
    }
}

/// Error body plus the status it maps to
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn not_found(what: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: what.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ApiResponse::<()>::error(self.message))).into_response()
    }
}

impl From<OperationError> for ApiError {
    fn from(err: OperationError) -> Self {
        Self {
            status: status_for(err.kind()),
            message: err.to_string(),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        let status = match &err {
            StoreError::Invalid(_) => StatusCode::BAD_REQUEST,
            StoreError::Duplicate(_) => StatusCode::CONFLICT,
            StoreError::NotFound(_) => StatusCode::NOT_FOUND,
            StoreError::Persist(e) => {
                warn!(error = %e, "Config store write failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::Precondition => StatusCode::PRECONDITION_FAILED,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::Unsupported => StatusCode::NOT_IMPLEMENTED,
        ErrorKind::Infrastructure => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::Execution => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Dump/restore outcomes are returned as-is: `{success, message, path?}`
fn operation_response(result: OperationResult) -> Response {
    let status = match result.error_kind {
        None => StatusCode::OK,
        Some(kind) => status_for(kind),
    };
    (status, Json(result)).into_response()
}

#[derive(Debug, Default, Deserialize)]
pub struct RunQuery {
    #[serde(default)]
    pub background: bool,
}

#[derive(Serialize)]
pub struct Submitted {
    operation_id: Uuid,
    status: OperationStatus,
    path: Option<String>,
}

#[derive(Serialize)]
pub struct HealthInfo {
    status: &'static str,
    version: &'static str,
}

// ============================================================================
// Health & Docker
// ============================================================================

pub async fn health_check() -> ApiResult<HealthInfo> {
    Ok(Json(ApiResponse::ok(HealthInfo {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })))
}

pub async fn docker_status(State(state): State<AppState>) -> ApiResult<DockerStatus> {
    let status = match &state.docker {
        Some(docker) => docker.status().await,
        None => DockerStatus::not_accessible("Docker client could not be created".to_string()),
    };
    Ok(Json(ApiResponse::ok(status)))
}

// ============================================================================
// Database configurations
// ============================================================================

async fn database_by_key(state: &AppState, key: &str) -> Result<DatabaseConfig, ApiError> {
    state
        .store
        .resolve_database(key)
        .await
        .ok_or_else(|| ApiError::not_found(format!("Database configuration '{}' not found", key)))
}

pub async fn list_configs(State(state): State<AppState>) -> ApiResult<Vec<DatabaseConfig>> {
    let configs = state
        .store
        .list_databases()
        .await
        .iter()
        .map(DatabaseConfig::redacted)
        .collect();
    Ok(Json(ApiResponse::ok(configs)))
}

pub async fn get_config(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> ApiResult<DatabaseConfig> {
    let config = database_by_key(&state, &key).await?;
    Ok(Json(ApiResponse::ok(config.redacted())))
}

pub async fn create_config(
    State(state): State<AppState>,
    Json(input): Json<DatabaseConfigInput>,
) -> Result<(StatusCode, Json<ApiResponse<DatabaseConfig>>), ApiError> {
    let created = state.store.create_database(input).await?;
    info!(id = created.id, name = %created.name, "Database configuration created");
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(created.redacted()))))
}

pub async fn update_config(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(input): Json<DatabaseConfigInput>,
) -> ApiResult<DatabaseConfig> {
    if let Some(existing) = state.store.get_database(id).await {
        ensure_idle(&state, &existing.name)?;
    }
    let updated = state.store.update_database(id, input).await?;
    Ok(Json(ApiResponse::ok(updated.redacted())))
}

pub async fn delete_config(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult<String> {
    if let Some(existing) = state.store.get_database(id).await {
        ensure_idle(&state, &existing.name)?;
    }
    state.store.delete_database(id).await?;
    Ok(Json(ApiResponse::ok(format!("Configuration {} deleted", id))))
}

fn ensure_idle(state: &AppState, name: &str) -> Result<(), ApiError> {
    if state.ops.locks.is_busy(name) {
        return Err(OperationError::Conflict(format!(
            "An operation is running for configuration '{}'",
            name
        ))
        .into());
    }
    Ok(())
}

// ============================================================================
// Dump & restore
// ============================================================================

pub async fn dump_config(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(query): Query<RunQuery>,
) -> Result<Response, ApiError> {
    let config = database_by_key(&state, &key).await?;
    dispatch_dump(&state, config.dump_request(), query.background).await
}

pub async fn restore_config(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(query): Query<RunQuery>,
    body: Option<Json<RestoreOverrides>>,
) -> Result<Response, ApiError> {
    let config = database_by_key(&state, &key).await?;
    let extra = body.map(|Json(o)| o).unwrap_or_default();
    dispatch_restore(&state, config.restore_request(&extra), query.background).await
}

/// Dump from an inline request, no stored configuration needed
pub async fn dump(
    State(state): State<AppState>,
    Query(query): Query<RunQuery>,
    Json(request): Json<DumpRequest>,
) -> Result<Response, ApiError> {
    dispatch_dump(&state, request, query.background).await
}

pub async fn restore(
    State(state): State<AppState>,
    Query(query): Query<RunQuery>,
    Json(request): Json<RestoreRequest>,
) -> Result<Response, ApiError> {
    dispatch_restore(&state, request, query.background).await
}

async fn dispatch_dump(state: &AppState, request: DumpRequest, background: bool) -> Result<Response, ApiError> {
    if !background {
        return Ok(operation_response(run_dump(&state.ops, request).await));
    }

    let artifact = dump_target(&state.ops, &request)?;
    let guard = state.ops.locks.try_acquire(&request.config_name)?;
    let ctx = state.ops.clone();
    let id = state.registry.submit(
        OperationKind::Dump,
        request.config_name.clone(),
        Some(artifact.clone()),
        async move { dump_holding(&ctx, request, guard).await },
    );
    Ok(accepted(id, artifact.display().to_string()))
}

async fn dispatch_restore(
    state: &AppState,
    request: RestoreRequest,
    background: bool,
) -> Result<Response, ApiError> {
    if !background {
        return Ok(operation_response(run_restore(&state.ops, request).await));
    }

    let source = restore_source(&state.ops, &request)?;
    let guard = state.ops.locks.try_acquire(&request.source.config_name)?;
    let ctx = state.ops.clone();
    let id = state.registry.submit(
        OperationKind::Restore,
        request.source.config_name.clone(),
        Some(source.clone()),
        async move { restore_holding(&ctx, request, guard).await },
    );
    Ok(accepted(id, source.display().to_string()))
}

fn accepted(id: Uuid, path: String) -> Response {
    let body = ApiResponse::ok(Submitted {
        operation_id: id,
        status: OperationStatus::Running,
        path: Some(path),
    });
    (StatusCode::ACCEPTED, Json(body)).into_response()
}

// ============================================================================
// Background operations
// ============================================================================

pub async fn list_operations(State(state): State<AppState>) -> ApiResult<Vec<OperationRecord>> {
    Ok(Json(ApiResponse::ok(state.registry.list())))
}

pub async fn get_operation(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<OperationRecord> {
    state
        .registry
        .get(&id)
        .map(|record| Json(ApiResponse::ok(record)))
        .ok_or_else(|| ApiError::not_found(format!("Operation {} not found", id)))
}

pub async fn cancel_operation(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<OperationRecord> {
    let record = state.registry.cancel(&id)?;
    Ok(Json(ApiResponse::ok(record)))
}

// ============================================================================
// Compose configurations
// ============================================================================

async fn compose_by_key(state: &AppState, key: &str) -> Result<ComposeConfig, ApiError> {
    state
        .store
        .resolve_compose(key)
        .await
        .ok_or_else(|| ApiError::not_found(format!("Compose configuration '{}' not found", key)))
}

pub async fn list_compose(State(state): State<AppState>) -> ApiResult<Vec<ComposeConfig>> {
    Ok(Json(ApiResponse::ok(state.store.list_compose().await)))
}

pub async fn get_compose(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> ApiResult<ComposeConfig> {
    Ok(Json(ApiResponse::ok(compose_by_key(&state, &key).await?)))
}

pub async fn create_compose(
    State(state): State<AppState>,
    Json(input): Json<ComposeConfigInput>,
) -> Result<(StatusCode, Json<ApiResponse<ComposeConfig>>), ApiError> {
    let created = state.store.create_compose(input).await?;
    info!(id = created.id, name = %created.name, "Compose configuration created");
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(created))))
}

pub async fn update_compose(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(input): Json<ComposeConfigInput>,
) -> ApiResult<ComposeConfig> {
    Ok(Json(ApiResponse::ok(state.store.update_compose(id, input).await?)))
}

pub async fn delete_compose(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult<String> {
    state.store.delete_compose(id).await?;
    Ok(Json(ApiResponse::ok(format!("Compose configuration {} deleted", id))))
}

#[derive(Debug, Deserialize)]
pub struct OperateRequest {
    pub operation: ComposeOperation,
    #[serde(default)]
    pub service: Option<String>,
    #[serde(default)]
    pub flags: Option<BTreeMap<String, Value>>,
}

pub async fn operate_compose(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Json(request): Json<OperateRequest>,
) -> Result<(StatusCode, Json<ComposeOutcome>), ApiError> {
    let config = compose_by_key(&state, &key).await?;
    let outcome = compose::run_compose_operation(
        state.compose.as_ref(),
        &config,
        request.operation,
        request.service.as_deref(),
        request.flags.as_ref(),
        state.compose_timeout,
    )
    .await;

    let status = if outcome.success {
        StatusCode::OK
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    Ok((status, Json(outcome)))
}

#[derive(Serialize)]
pub struct ComposeServices {
    declared: BTreeMap<String, ComposeService>,
    running: Vec<Value>,
}

pub async fn compose_services(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> ApiResult<ComposeServices> {
    let config = compose_by_key(&state, &key).await?;
    let declared = compose::declared_services(&config.path).map_err(|e| ApiError {
        status: StatusCode::UNPROCESSABLE_ENTITY,
        message: format!("{:#}", e),
    })?;
    let running = compose::list_services(state.compose.as_ref(), &config, state.compose_timeout).await?;
    Ok(Json(ApiResponse::ok(ComposeServices { declared, running })))
}

/// Bearer-token authentication for mutating API routes

use axum::{
    extract::Request,
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::warn;

use crate::utils::API_TOKEN_ENV;

/// Token from the Authorization header; "Bearer TOKEN" and bare "TOKEN" both work
fn provided_token(headers: &HeaderMap) -> Option<&str> {
    let header = headers.get("Authorization")?.to_str().ok()?;
    Some(header.strip_prefix("Bearer ").unwrap_or(header).trim())
}

/// No expected token means auth is disabled
fn is_authorized(provided: Option<&str>, expected: Option<&str>) -> bool {
    match (provided, expected) {
        (_, None) => true,
        (Some(provided), Some(expected)) => provided == expected,
        (None, Some(_)) => false,
    }
}

pub async fn auth_middleware(
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Result<Response, Response> {
    let expected = std::env::var(API_TOKEN_ENV).ok().filter(|t| !t.is_empty());
    if expected.is_none() {
        warn!(path = %request.uri().path(), "{} not set - authentication disabled", API_TOKEN_ENV);
    }

    if is_authorized(provided_token(&headers), expected.as_deref()) {
        Ok(next.run(request).await)
    } else {
        Err(unauthorized_response())
    }
}

fn unauthorized_response() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({
            "success": false,
            "error": "Unauthorized - invalid or missing authentication token"
        })),
    )
        .into_response()
}

/// Random token suitable for `DUMPDOCK_API_TOKEN`
pub fn generate_token() -> String {
    use rand::Rng;
    const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
    const TOKEN_LEN: usize = 32;
    let mut rng = rand::thread_rng();

    (0..TOKEN_LEN)
        .map(|_| CHARSET[rng.gen_range(0..CHARSET.len())] as char)
        .collect()
}

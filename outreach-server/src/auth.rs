//! Bearer token checks

use axum::{
    extract::{Request, State},
    http::{HeaderMap, header},
    middleware::Next,
    response::Response,
};
use outreach_common::incoming;

use crate::{AppState, error::ApiError};

const ADMIN_TOKEN_HEADER: &str = "x-admin-token";

fn bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
}

/// Reject requests without the configured API token.
///
/// The admin token is accepted in its place.
pub async fn require_api_token(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(expected) = &state.auth.api_token else {
        return Ok(next.run(request).await);
    };

    let presented = bearer(request.headers());
    let authorised = presented == Some(expected.as_str())
        || state
            .auth
            .admin_token
            .as_deref()
            .is_some_and(|admin| presented == Some(admin));

    if !authorised {
        incoming!(
            level = WARN,
            path = %request.uri().path(),
            "Rejected request without a valid token"
        );
        return Err(ApiError::Unauthorized);
    }

    Ok(next.run(request).await)
}

/// Whether the caller presented the admin token, either as the bearer token
/// or in `X-Admin-Token`.
pub fn is_admin(state: &AppState, headers: &HeaderMap) -> bool {
    let Some(admin) = state.auth.admin_token.as_deref() else {
        return false;
    };

    let header_token = headers
        .get(ADMIN_TOKEN_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim);

    bearer(headers) == Some(admin) || header_token == Some(admin)
}

//! Bearer token authentication

use axum::{
    extract::{Request, State},
    http::{HeaderMap, StatusCode, header::AUTHORIZATION},
    middleware::Next,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::debug;

/// Reject requests that do not carry the configured token
///
/// The token is read from `Authorization: Bearer <token>`. Browsers cannot
/// set headers on WebSocket upgrades, so `?token=<token>` is accepted when
/// the header is absent.
pub async fn auth_middleware(
    State(expected_token): State<String>,
    request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let presented = presented_token(request.headers(), request.uri().query())?;
    if presented != expected_token {
        debug!("rejected request to {} with wrong token", request.uri().path());
        return Err(AuthError::InvalidToken);
    }

    Ok(next.run(request).await)
}

fn presented_token<'a>(headers: &'a HeaderMap, query: Option<&'a str>) -> Result<&'a str, AuthError> {
    match headers.get(AUTHORIZATION) {
        Some(value) => value
            .to_str()
            .ok()
            .and_then(|v| v.strip_prefix("Bearer "))
            .ok_or(AuthError::InvalidFormat),
        None => query_token(query).ok_or(AuthError::MissingToken),
    }
}

fn query_token(query: Option<&str>) -> Option<&str> {
    query?
        .split('&')
        .find_map(|pair| pair.strip_prefix("token="))
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("missing bearer token")]
    MissingToken,

    #[error("invalid Authorization header, expected: Bearer <token>")]
    InvalidFormat,

    #[error("invalid token")]
    InvalidToken,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = match self {
            AuthError::MissingToken | AuthError::InvalidFormat => StatusCode::UNAUTHORIZED,
            AuthError::InvalidToken => StatusCode::FORBIDDEN,
        };

        (status, self.to_string()).into_response()
    }
}

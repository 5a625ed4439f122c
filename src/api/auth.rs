// =============================================================================
// Admin Token Authorization
// =============================================================================
//
// One secret, two transports: REST requests carry it as a Bearer header, the
// WebSocket upgrade carries it as a `?token=` query parameter (browsers
// cannot set headers on upgrade requests). Both paths funnel into a single
// `authorize` check against the `ARGUS_ADMIN_TOKEN` environment variable,
// read per call so rotating the token does not require a restart.
// =============================================================================

use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts, StatusCode},
    response::{IntoResponse, Response},
};
use tracing::warn;

/// Why authorization failed. Both variants surface as 403 so probes cannot
/// distinguish a missing server secret from a wrong client one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthError {
    /// `ARGUS_ADMIN_TOKEN` is unset or empty on the server.
    NotConfigured,
    /// The request carried no token, or a token that does not match.
    BadToken,
}

impl AuthError {
    fn message(self) -> &'static str {
        match self {
            Self::NotConfigured => "Server authentication not configured",
            Self::BadToken => "Missing or invalid authorization token",
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({ "error": self.message() });
        (StatusCode::FORBIDDEN, axum::Json(body)).into_response()
    }
}

/// The configured admin token, or `None` when absent/empty.
fn expected_token() -> Option<String> {
    std::env::var("ARGUS_ADMIN_TOKEN")
        .ok()
        .filter(|t| !t.is_empty())
}

/// Timing-safe equality: the length difference and every byte XOR are folded
/// into one accumulator, so there is no data-dependent early exit.
fn token_matches(candidate: &str, expected: &str) -> bool {
    let a = candidate.as_bytes();
    let b = expected.as_bytes();

    a.iter()
        .zip(b.iter())
        .fold(a.len() ^ b.len(), |acc, (x, y)| acc | usize::from(x ^ y))
        == 0
}

/// Check a candidate token from either transport.
fn authorize(candidate: Option<&str>) -> Result<String, AuthError> {
    let expected = expected_token().ok_or_else(|| {
        warn!("ARGUS_ADMIN_TOKEN is not set — rejecting authenticated request");
        AuthError::NotConfigured
    })?;

    candidate
        .filter(|c| token_matches(c, &expected))
        .map(str::to_string)
        .ok_or(AuthError::BadToken)
}

/// Axum extractor yielding the validated raw token. Handlers that list it
/// never run for unauthorized requests.
pub struct AuthBearer(pub String);

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthBearer
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let bearer = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "));

        authorize(bearer).map(AuthBearer).inspect_err(|e| {
            if *e == AuthError::BadToken {
                warn!("request rejected: missing or invalid bearer token");
            }
        })
    }
}

/// Query-parameter validation for the WebSocket upgrade path.
pub fn validate_token(token: &str) -> bool {
    authorize(Some(token)).is_ok()
}

use axum::body::Body;
use axum::extract::Request;
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::Next;
use axum::response::Response;

/// Admin API authentication.
#[derive(Clone, Default)]
pub struct AuthConfig {
    /// Bearer token for the admin API. None = auth disabled.
    pub bearer_token: Option<String>,
}

impl AuthConfig {
    /// Whether the `authorization` header satisfies this config.
    pub fn permits(&self, headers: &HeaderMap) -> bool {
        let Some(expected) = self.bearer_token.as_deref() else {
            return true;
        };
        headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .is_some_and(|token| token == expected)
    }
}

/// Axum middleware that validates Bearer token authentication.
/// Reads the [`AuthConfig`] from request extensions; when none is present
/// every request is let through.
pub async fn bearer_auth_middleware(
    headers: HeaderMap,
    request: Request<Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let auth_config = request
        .extensions()
        .get::<AuthConfig>()
        .cloned()
        .unwrap_or_default();

    if !auth_config.permits(&headers) {
        tracing::debug!(path = %request.uri().path(), "Rejected unauthenticated admin request");
        return Err(StatusCode::UNAUTHORIZED);
    }

    Ok(next.run(request).await)
}

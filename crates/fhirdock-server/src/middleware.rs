//! Cross-cutting middleware: request-id propagation, content negotiation,
//! and bearer-token authentication. Each is a plain `axum::middleware::from_fn`
//! layer so the router stays the single place routes and their guards are
//! declared, rather than hiding behaviour in extractors.

use axum::extract::{Request, State};
use axum::http::{HeaderName, HeaderValue};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use uuid::Uuid;

use crate::authn::{AuthError, DynTokenVerifier, TokenClaims};

pub const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

/// Claims attached to the request via [`axum::Extension`] once authentication
/// succeeds, so handlers can read `sub` for audit entries without re-parsing
/// the bearer token.
#[derive(Debug, Clone)]
pub struct AuthenticatedActor(pub TokenClaims);

/// Preserves an incoming `X-Request-Id`, or mints one, and echoes it back on
/// the response. Every tracing span entered downstream can pick it up via
/// `tracing::Span::current().record`.
pub async fn request_id(mut req: Request, next: Next) -> Response {
    let request_id = req
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        req.headers_mut().insert(REQUEST_ID_HEADER, value.clone());
        let mut response = next.run(req).await;
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
        response
    } else {
        next.run(req).await
    }
}

/// Rejects requests whose `Accept`/`Content-Type` are neither
/// `application/fhir+json` nor `application/json`, ahead of any handler
/// deserialization so malformed-media-type failures never masquerade as a
/// parse error.
pub async fn content_negotiation(req: Request, next: Next) -> Response {
    if let Err(err) = fhirdock_api::validate_accept(req.headers()) {
        return err.into_response();
    }
    let has_body = req
        .headers()
        .get(axum::http::header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
        .is_some_and(|len| len > 0);
    if has_body {
        if let Err(err) = fhirdock_api::validate_content_type(req.headers()) {
            return err.into_response();
        }
    }
    next.run(req).await
}

/// Extracts the `Authorization: Bearer <token>` header, verifies it through
/// the configured [`crate::authn::TokenVerifier`], and inserts the resulting
/// [`AuthenticatedActor`] as a request extension. Applied only to the `/fhir`
/// route group — health and metadata endpoints stay unauthenticated.
pub async fn require_bearer_token(
    State(verifier): State<DynTokenVerifier>,
    mut req: Request,
    next: Next,
) -> Response {
    let token = req
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    let token = match token {
        Some(t) => t,
        None => return fhirdock_api::ApiError::unauthorized(AuthError::MissingToken.to_string()).into_response(),
    };

    match verifier.verify(token).await {
        Ok(claims) => {
            req.extensions_mut().insert(AuthenticatedActor(claims));
            next.run(req).await
        }
        Err(err) => fhirdock_api::ApiError::unauthorized(err.to_string()).into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::routing::get;
    use axum::Router;
    use tower::ServiceExt;

    async fn ok_handler() -> &'static str {
        "ok"
    }

    #[tokio::test]
    async fn request_id_is_minted_when_absent() {
        let app = Router::new().route("/", get(ok_handler)).layer(axum::middleware::from_fn(request_id));
        let response = app.oneshot(Request::builder().uri("/").body(Body::empty()).unwrap()).await.unwrap();
        assert!(response.headers().get(REQUEST_ID_HEADER).is_some());
    }

    #[tokio::test]
    async fn request_id_is_preserved_when_present() {
        let app = Router::new().route("/", get(ok_handler)).layer(axum::middleware::from_fn(request_id));
        let response = app
            .oneshot(Request::builder().uri("/").header(REQUEST_ID_HEADER, "req-123").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.headers().get(REQUEST_ID_HEADER).unwrap(), "req-123");
    }

    #[tokio::test]
    async fn content_negotiation_rejects_unsupported_accept() {
        let app = Router::new().route("/", get(ok_handler)).layer(axum::middleware::from_fn(content_negotiation));
        let response = app
            .oneshot(Request::builder().uri("/").header("accept", "text/xml").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), axum::http::StatusCode::UNSUPPORTED_MEDIA_TYPE);
    }
}

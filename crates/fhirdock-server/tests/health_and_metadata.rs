//! Unauthenticated surface: liveness/readiness, the bucket
//! `CapabilityStatement`, and content-negotiation rejection.

mod common;

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use serde_json::Value;
use tower::ServiceExt;

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn liveness_is_always_ok() {
    let app = common::test_app().await;
    let response = app.oneshot(Request::builder().uri("/health/liveness").body(Body::empty()).unwrap()).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn readiness_reflects_the_gateway_circuit_state() {
    let app = common::test_app().await;
    let response = app.oneshot(Request::builder().uri("/health/readiness").body(Body::empty()).unwrap()).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn capability_statement_is_reachable_without_a_bearer_token() {
    let app = common::test_app().await;
    let base = format!("/fhir/{}/metadata", common::TENANT);
    let response = app.oneshot(Request::builder().uri(base).body(Body::empty()).unwrap()).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let cs = body_json(response).await;
    assert_eq!(cs["resourceType"], "CapabilityStatement");
    assert_eq!(cs["fhirVersion"], "4.0.1");
}

#[tokio::test]
async fn unsupported_accept_header_is_rejected() {
    let app = common::test_app().await;
    let token = common::bearer_token("practitioner-1");
    let base = format!("/fhir/{}/Patient/1", common::TENANT);

    let response = app
        .oneshot(
            Request::builder()
                .uri(base)
                .header(header::AUTHORIZATION, format!("Bearer {token}"))
                .header(header::ACCEPT, "text/xml")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
}

//! Transaction/batch Bundle POST against `/fhir/{bucket}`, exercised
//! end-to-end through the in-process router.

mod common;

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use serde_json::{json, Value};
use tower::ServiceExt;

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn transaction_bundle_creates_two_resources_atomically() {
    let app = common::test_app().await;
    let token = common::bearer_token("practitioner-1");
    let base = format!("/fhir/{}", common::TENANT);

    let bundle = json!({
        "resourceType": "Bundle",
        "type": "transaction",
        "entry": [
            {
                "fullUrl": "urn:uuid:patient-1",
                "resource": {"resourceType": "Patient", "name": [{"family": "Doe"}]},
                "request": {"method": "POST", "url": "Patient"},
            },
            {
                "fullUrl": "urn:uuid:observation-1",
                "resource": {
                    "resourceType": "Observation",
                    "status": "final",
                    "subject": {"reference": "urn:uuid:patient-1"},
                },
                "request": {"method": "POST", "url": "Observation"},
            },
        ],
    });

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(&base)
                .header(header::AUTHORIZATION, format!("Bearer {token}"))
                .header(header::CONTENT_TYPE, "application/fhir+json")
                .body(Body::from(bundle.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let response_bundle = body_json(response).await;
    assert_eq!(response_bundle["type"], "transaction-response");
    let entries = response_bundle["entry"].as_array().unwrap();
    assert_eq!(entries.len(), 2);
    for entry in entries {
        let status = entry["response"]["status"].as_str().unwrap();
        assert!(status.starts_with("201"), "unexpected entry status: {status}");
    }

    let patient_ref = entries[1]["resource"]["subject"]["reference"].as_str().unwrap();
    assert!(patient_ref.starts_with("Patient/"), "reference not rewritten: {patient_ref}");
}

#[tokio::test]
async fn malformed_bundle_is_rejected_before_any_mutation() {
    let app = common::test_app().await;
    let token = common::bearer_token("practitioner-1");
    let base = format!("/fhir/{}", common::TENANT);

    let bundle = json!({"resourceType": "Bundle", "type": "transaction", "entry": [{"resource": {"resourceType": "Patient"}}]});

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(&base)
                .header(header::AUTHORIZATION, format!("Bearer {token}"))
                .header(header::CONTENT_TYPE, "application/fhir+json")
                .body(Body::from(bundle.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

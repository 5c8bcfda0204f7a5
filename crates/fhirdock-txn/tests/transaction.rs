//! End-to-end coverage of [`TransactionProcessor`] against the in-memory
//! gateway: UUID cross-references inside a single transaction Bundle, and
//! the all-or-nothing guarantee when one entry in the Bundle is invalid.

use std::sync::Arc;

use serde_json::json;

use fhirdock_db_memory::MemoryGateway;
use fhirdock_search::{build_registry, SearchEngine, SearchEngineConfig};
use fhirdock_storage::gateway::DynGateway;
use fhirdock_storage::{BucketConfig, ValidationMode, PROFILE_BASE_R4};
use fhirdock_txn::TransactionProcessor;

fn processor_with_gateway() -> (TransactionProcessor, DynGateway) {
    let gateway: DynGateway = Arc::new(MemoryGateway::new());
    let registry = Arc::new(build_registry());
    let search_engine = Arc::new(SearchEngine::new(gateway.clone(), registry, SearchEngineConfig::default()));
    (TransactionProcessor::new(gateway.clone(), search_engine), gateway)
}

fn disabled_validation() -> BucketConfig {
    BucketConfig::new(ValidationMode::Disabled, PROFILE_BASE_R4)
}

#[tokio::test]
async fn transaction_resolves_a_urn_uuid_cross_reference() {
    let (processor, gateway) = processor_with_gateway();
    let bundle = json!({
        "resourceType": "Bundle",
        "type": "transaction",
        "entry": [
            {
                "fullUrl": "urn:uuid:patient-a",
                "resource": {"resourceType": "Patient", "name": [{"family": "Doe"}]},
                "request": {"method": "POST", "url": "Patient"},
            },
            {
                "fullUrl": "urn:uuid:obs-a",
                "resource": {
                    "resourceType": "Observation",
                    "status": "final",
                    "subject": {"reference": "urn:uuid:patient-a"},
                },
                "request": {"method": "POST", "url": "Observation"},
            },
        ],
    });

    let response = processor.process("acme", &disabled_validation(), &bundle).await.unwrap();
    assert_eq!(response["resourceType"], "Bundle");
    assert_eq!(response["type"], "transaction-response");
    let entries = response["entry"].as_array().unwrap();
    assert_eq!(entries.len(), 2);

    let patient_location = entries[0]["response"]["location"].as_str().unwrap();
    assert!(patient_location.starts_with("Patient/"));
    let patient_id = patient_location.split('/').nth(1).unwrap();

    let observation_location = entries[1]["response"]["location"].as_str().unwrap();
    let observation_id = observation_location.split('/').nth(1).unwrap();

    let observation = gateway
        .get(
            &fhirdock_storage::routing::route("acme", &"Observation".parse().unwrap()),
            &format!("Observation/{observation_id}"),
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(observation["subject"]["reference"], format!("Patient/{patient_id}"));
}

#[tokio::test]
async fn transaction_aborts_entirely_when_one_entry_is_malformed() {
    let (processor, gateway) = processor_with_gateway();
    let bundle = json!({
        "resourceType": "Bundle",
        "type": "transaction",
        "entry": [
            {
                "resource": {"resourceType": "Patient", "id": "p1"},
                "request": {"method": "PUT", "url": "Patient/p1"},
            },
            {
                "resource": {"nope": "no resourceType here"},
                "request": {"method": "POST", "url": "Patient"},
            },
        ],
    });

    let err = processor.process("acme", &disabled_validation(), &bundle).await.unwrap_err();
    assert!(err.to_string().contains("entry 1"));

    let patient = gateway
        .get(
            &fhirdock_storage::routing::route("acme", &"Patient".parse().unwrap()),
            "Patient/p1",
        )
        .await
        .unwrap();
    assert!(patient.is_none(), "the first entry's write must not survive when the second entry aborts the transaction");
}

#[tokio::test]
async fn batch_commits_independent_entries_even_when_one_fails() {
    let (processor, _gateway) = processor_with_gateway();
    let bundle = json!({
        "resourceType": "Bundle",
        "type": "batch",
        "entry": [
            {
                "resource": {"resourceType": "Patient"},
                "request": {"method": "POST", "url": "Patient"},
            },
            {
                "resource": {"nope": "no resourceType here"},
                "request": {"method": "POST", "url": "Patient"},
            },
        ],
    });

    let response = processor.process("acme", &disabled_validation(), &bundle).await.unwrap();
    let entries = response["entry"].as_array().unwrap();
    assert_eq!(entries[0]["response"]["status"], "201 Created");
    assert_eq!(entries[1]["response"]["status"], "400 Bad Request");
}

//! Assembly of the `transaction-response` / `batch-response` Bundle
//! returned to the caller: one `entry.response` per input entry, in the
//! same order the entries were submitted (spec.md §4.4 "Response
//! ordering"), independent of the order they were actually executed in.

use serde_json::{json, Value};

/// The outcome recorded for a single input entry, addressed by its
/// original index so the final Bundle can be reassembled in submission
/// order regardless of execution order.
#[derive(Clone)]
pub struct EntryOutcome {
    pub index: usize,
    pub status: String,
    pub location: Option<String>,
    pub etag: Option<String>,
}

impl EntryOutcome {
    pub fn ok(index: usize, status: &str, resource_type: &str, id: &str, version_id: &str) -> Self {
        Self {
            index,
            status: status.to_string(),
            location: Some(format!("{resource_type}/{id}/_history/{version_id}")),
            etag: Some(format!("W/\"{version_id}\"")),
        }
    }

    pub fn no_content(index: usize) -> Self {
        Self { index, status: "204 No Content".to_string(), location: None, etag: None }
    }

    pub fn failed(index: usize, message: String) -> Self {
        Self {
            index,
            status: "400 Bad Request".to_string(),
            location: None,
            etag: Some(message),
        }
    }
}

/// Builds the response Bundle: `entry[i].response` mirrors
/// `outcomes[i]`, sorted back into the original entry order first.
pub fn response_bundle(bundle_type: &str, outcomes: &[EntryOutcome]) -> Value {
    let mut ordered: Vec<&EntryOutcome> = outcomes.iter().collect();
    ordered.sort_by_key(|o| o.index);

    let entries: Vec<Value> = ordered
        .into_iter()
        .map(|outcome| {
            let mut response = json!({ "status": outcome.status });
            if let Some(location) = &outcome.location {
                response["location"] = Value::String(location.clone());
            }
            if outcome.status == "400 Bad Request" {
                if let Some(message) = &outcome.etag {
                    response["outcome"] = json!({
                        "resourceType": "OperationOutcome",
                        "issue": [{ "severity": "error", "code": "processing", "diagnostics": message }],
                    });
                }
            } else if let Some(etag) = &outcome.etag {
                response["etag"] = Value::String(etag.clone());
            }
            json!({ "response": response })
        })
        .collect();

    json!({
        "resourceType": "Bundle",
        "type": bundle_type,
        "entry": entries,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_entries_are_reordered_to_submission_order() {
        let outcomes = vec![
            EntryOutcome::ok(1, "201 Created", "Observation", "o1", "1"),
            EntryOutcome::ok(0, "201 Created", "Patient", "p1", "1"),
        ];
        let bundle = response_bundle("transaction-response", &outcomes);
        let entries = bundle["entry"].as_array().unwrap();
        assert_eq!(entries[0]["response"]["location"], "Patient/p1/_history/1");
        assert_eq!(entries[1]["response"]["location"], "Observation/o1/_history/1");
    }

    #[test]
    fn failed_entries_carry_an_operation_outcome() {
        let outcomes = vec![EntryOutcome::failed(0, "boom".to_string())];
        let bundle = response_bundle("batch-response", &outcomes);
        let entry = &bundle["entry"][0];
        assert_eq!(entry["response"]["status"], "400 Bad Request");
        assert_eq!(entry["response"]["outcome"]["resourceType"], "OperationOutcome");
    }

    #[test]
    fn no_content_entries_omit_location_and_etag() {
        let outcomes = vec![EntryOutcome::no_content(0)];
        let bundle = response_bundle("transaction-response", &outcomes);
        let response = &bundle["entry"][0]["response"];
        assert_eq!(response["status"], "204 No Content");
        assert!(response.get("location").is_none());
    }
}

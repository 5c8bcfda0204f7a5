//! Parsing of an incoming `Bundle.type = transaction|batch` request body
//! into the shape the processor drives: a bundle-level type plus an
//! ordered list of entries, each carrying its HTTP method, target URL, and
//! conditional-request headers.

use serde_json::Value;

use crate::error::TxnError;

/// `Bundle.type`, restricted to the two variants this crate processes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BundleType {
    Transaction,
    Batch,
}

impl BundleType {
    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "transaction" => Some(Self::Transaction),
            "batch" => Some(Self::Batch),
            _ => None,
        }
    }
}

/// `Bundle.entry[].request.method`. `Patch` is grouped with `Put` for
/// ordering purposes — both mutate an existing resource in place, and the
/// JSON-Patch/FHIR-Patch diff itself is applied by the caller before the
/// entry reaches this crate (see `fhirdock-server`'s patch handling), so a
/// `Patch` entry carries the already-patched resource body exactly like a
/// `Put` entry does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryMethod {
    Post,
    Put,
    Patch,
    Delete,
}

impl EntryMethod {
    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "POST" => Some(Self::Post),
            "PUT" => Some(Self::Put),
            "PATCH" => Some(Self::Patch),
            "DELETE" => Some(Self::Delete),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }

    /// The processing-order group this method belongs to: POSTs first, then
    /// PUT/PATCH, then DELETEs (spec.md §4.4).
    pub fn order_group(&self) -> u8 {
        match self {
            Self::Post => 0,
            Self::Put | Self::Patch => 1,
            Self::Delete => 2,
        }
    }
}

/// One `Bundle.entry`, with `request`/`resource` flattened into the fields
/// the processor needs.
#[derive(Debug, Clone)]
pub struct BundleEntry {
    pub index: usize,
    pub full_url: Option<String>,
    pub method: EntryMethod,
    pub url: String,
    pub if_match: Option<String>,
    pub if_none_match: Option<String>,
    pub if_none_exist: Option<String>,
    pub resource: Option<Value>,
}

impl BundleEntry {
    /// Splits `request.url` into `(resourceType, id)` for PUT/DELETE/PATCH
    /// entries that target a specific resource rather than a type-level
    /// collection (POST, or a conditional PUT with a query string).
    pub fn target_type_and_id(&self) -> Option<(&str, &str)> {
        let mut parts = self.url.splitn(2, '/');
        let resource_type = parts.next()?;
        let rest = parts.next()?;
        let id = rest.split('?').next()?;
        if id.is_empty() {
            None
        } else {
            Some((resource_type, id))
        }
    }

    /// The resource type a POST targets, or the type prefix of a PUT/DELETE
    /// URL (`Type` or `Type/id` or `Type?query`).
    pub fn target_type(&self) -> &str {
        self.url.split(['/', '?']).next().unwrap_or(&self.url)
    }
}

#[derive(Debug)]
pub struct ParsedBundle {
    pub bundle_type: BundleType,
    pub entries: Vec<BundleEntry>,
}

/// Parses a raw `Bundle` JSON document into [`ParsedBundle`]. Rejects
/// anything other than `type = transaction | batch`, and any entry whose
/// method isn't one of POST/PUT/PATCH/DELETE.
pub fn parse_bundle(bundle: &Value) -> Result<ParsedBundle, TxnError> {
    if bundle.get("resourceType").and_then(Value::as_str) != Some("Bundle") {
        return Err(TxnError::MalformedBundle("not a Bundle resource".into()));
    }

    let bundle_type = bundle
        .get("type")
        .and_then(Value::as_str)
        .and_then(BundleType::parse)
        .ok_or_else(|| TxnError::MalformedBundle("Bundle.type must be 'transaction' or 'batch'".into()))?;

    let raw_entries = bundle.get("entry").and_then(Value::as_array).cloned().unwrap_or_default();

    let mut entries = Vec::with_capacity(raw_entries.len());
    for (index, raw) in raw_entries.into_iter().enumerate() {
        let request = raw
            .get("request")
            .ok_or_else(|| TxnError::MalformedBundle(format!("entry {index} is missing 'request'")))?;
        let method = request
            .get("method")
            .and_then(Value::as_str)
            .and_then(EntryMethod::parse)
            .ok_or_else(|| TxnError::MalformedBundle(format!("entry {index} has an unsupported or missing request.method")))?;
        let url = request
            .get("url")
            .and_then(Value::as_str)
            .ok_or_else(|| TxnError::MalformedBundle(format!("entry {index} is missing request.url")))?
            .to_string();

        entries.push(BundleEntry {
            index,
            full_url: raw.get("fullUrl").and_then(Value::as_str).map(str::to_string),
            method,
            url,
            if_match: request.get("ifMatch").and_then(Value::as_str).map(str::to_string),
            if_none_match: request.get("ifNoneMatch").and_then(Value::as_str).map(str::to_string),
            if_none_exist: request.get("ifNoneExist").and_then(Value::as_str).map(str::to_string),
            resource: raw.get("resource").cloned(),
        });
    }

    Ok(ParsedBundle { bundle_type, entries })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn rejects_a_non_bundle_resource() {
        let err = parse_bundle(&json!({"resourceType": "Patient"})).unwrap_err();
        assert!(matches!(err, TxnError::MalformedBundle(_)));
    }

    #[test]
    fn rejects_an_unrecognized_bundle_type() {
        let bundle = json!({"resourceType": "Bundle", "type": "searchset", "entry": []});
        assert!(parse_bundle(&bundle).is_err());
    }

    #[test]
    fn parses_a_minimal_transaction_entry() {
        let bundle = json!({
            "resourceType": "Bundle",
            "type": "transaction",
            "entry": [{
                "fullUrl": "urn:uuid:a1",
                "resource": {"resourceType": "Patient"},
                "request": {"method": "POST", "url": "Patient"},
            }],
        });
        let parsed = parse_bundle(&bundle).unwrap();
        assert_eq!(parsed.bundle_type, BundleType::Transaction);
        assert_eq!(parsed.entries.len(), 1);
        assert_eq!(parsed.entries[0].method, EntryMethod::Post);
        assert_eq!(parsed.entries[0].full_url.as_deref(), Some("urn:uuid:a1"));
    }

    #[test]
    fn rejects_an_entry_with_no_request() {
        let bundle = json!({"resourceType": "Bundle", "type": "batch", "entry": [{"resource": {}}]});
        assert!(parse_bundle(&bundle).is_err());
    }

    #[test]
    fn target_type_and_id_splits_a_put_url() {
        let entry = BundleEntry {
            index: 0,
            full_url: None,
            method: EntryMethod::Put,
            url: "Patient/123".into(),
            if_match: None,
            if_none_match: None,
            if_none_exist: None,
            resource: None,
        };
        assert_eq!(entry.target_type_and_id(), Some(("Patient", "123")));
        assert_eq!(entry.target_type(), "Patient");
    }

    #[test]
    fn target_type_and_id_is_none_for_a_type_level_url() {
        let entry = BundleEntry {
            index: 0,
            full_url: None,
            method: EntryMethod::Post,
            url: "Patient".into(),
            if_match: None,
            if_none_match: None,
            if_none_exist: None,
            resource: None,
        };
        assert_eq!(entry.target_type_and_id(), None);
    }

    #[test]
    fn patch_and_put_share_the_same_order_group() {
        assert_eq!(EntryMethod::Put.order_group(), EntryMethod::Patch.order_group());
        assert!(EntryMethod::Post.order_group() < EntryMethod::Put.order_group());
        assert!(EntryMethod::Put.order_group() < EntryMethod::Delete.order_group());
    }
}

//! Canonical request hashing.
//!
//! The hash binds an idempotency key to its payload: identical requests
//! must hash identically regardless of how the client ordered object keys,
//! and absent optional fields must hash the same as empty ones. Keys are
//! sorted explicitly at every nesting level so the result does not depend on
//! `serde_json`'s map implementation.

use std::collections::BTreeMap;

use common::api::ActionRequest;
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

/// JSON value with recursively sorted object keys.
#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Canonical {
    Scalar(Value),
    Array(Vec<Canonical>),
    Object(BTreeMap<String, Canonical>),
}

fn canonicalize(value: &Value) -> Canonical {
    match value {
        Value::Object(map) => Canonical::Object(
            map.iter()
                .map(|(key, nested)| (key.clone(), canonicalize(nested)))
                .collect(),
        ),
        Value::Array(items) => Canonical::Array(items.iter().map(canonicalize).collect()),
        other => Canonical::Scalar(other.clone()),
    }
}

/// Lowercase hex SHA-256 over the canonical serialization of the request's
/// semantically significant fields. Empty approval strings and empty params
/// are omitted; `dry_run` is always present.
pub fn request_hash(req: &ActionRequest) -> Result<String, serde_json::Error> {
    let mut fields: BTreeMap<String, Canonical> = BTreeMap::new();
    fields.insert(
        "environment".to_string(),
        Canonical::Scalar(Value::String(req.environment.clone())),
    );
    fields.insert(
        "action".to_string(),
        Canonical::Scalar(Value::String(req.action.as_str().to_string())),
    );
    fields.insert(
        "target".to_string(),
        Canonical::Scalar(Value::String(req.target.clone())),
    );
    if !req.params.is_empty() {
        fields.insert(
            "params".to_string(),
            canonicalize(&Value::Object(req.params.clone())),
        );
    }
    fields.insert(
        "dry_run".to_string(),
        Canonical::Scalar(Value::Bool(req.dry_run)),
    );
    for (name, value) in [
        ("approved_by", &req.approved_by),
        ("approval_ticket", &req.approval_ticket),
        ("reason", &req.reason),
        ("expires_at", &req.expires_at),
    ] {
        if !value.is_empty() {
            fields.insert(
                name.to_string(),
                Canonical::Scalar(Value::String(value.clone())),
            );
        }
    }

    let bytes = serde_json::to_vec(&Canonical::Object(fields))?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(format!("{:x}", hasher.finalize()))
}

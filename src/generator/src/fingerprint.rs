//! Endpoint fingerprinting for incremental regeneration.
//!
//! The fingerprint digests the semantic content of an endpoint: method,
//! path, tag set, parameters, body schema, response schemas, and auth.
//! Cosmetic fields (summary, description, operation id, parameter
//! ordering, tag ordering) do not participate.

use casecraft_shared::types::api::ApiEndpoint;
use sha2::{Digest, Sha256};

/// Compute the hex-encoded SHA-256 fingerprint of an endpoint.
pub fn fingerprint_endpoint(endpoint: &ApiEndpoint) -> String {
    let mut canonical = String::new();
    write_endpoint_canonical(endpoint, &mut canonical);
    hash_content(&canonical)
}

/// Hex-encoded SHA-256 of arbitrary content (used for the spec source).
pub fn hash_content(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    let digest = hasher.finalize();
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

fn write_endpoint_canonical(endpoint: &ApiEndpoint, out: &mut String) {
    out.push_str("method=");
    out.push_str(endpoint.method.as_str());
    out.push_str(";path=");
    out.push_str(&endpoint.path);

    let mut tags: Vec<&str> = endpoint.tags.iter().map(String::as_str).collect();
    tags.sort_unstable();
    tags.dedup();
    out.push_str(";tags=");
    out.push_str(&tags.join(","));

    let mut params: Vec<_> = endpoint.parameters.iter().collect();
    params.sort_by(|a, b| (a.location, a.name.as_str()).cmp(&(b.location, b.name.as_str())));
    out.push_str(";params=[");
    for param in params {
        out.push('(');
        out.push_str(param.location.as_str());
        out.push(':');
        out.push_str(&param.name);
        out.push(':');
        out.push_str(if param.required { "req" } else { "opt" });
        out.push(':');
        match &param.schema {
            Some(schema) => write_canonical_value(schema, out),
            None => out.push_str("null"),
        }
        out.push(')');
    }
    out.push(']');

    out.push_str(";body=");
    match &endpoint.request_body {
        Some(body) => write_canonical_value(body, out),
        None => out.push_str("null"),
    }

    out.push_str(";responses={");
    // BTreeMap iterates in sorted status order
    for (status, schema) in &endpoint.responses {
        out.push_str(status);
        out.push(':');
        write_canonical_value(schema, out);
        out.push(';');
    }
    out.push('}');

    out.push_str(";auth=");
    out.push_str(if endpoint.auth.required { "required" } else { "none" });
    out.push(':');
    out.push_str(&format!("{:?}", endpoint.auth.kind).to_lowercase());
}

/// Serialize a JSON value with recursively sorted object keys.
/// Arrays keep their order; this makes the digest independent of
/// serde_json's map backing.
fn write_canonical_value(value: &serde_json::Value, out: &mut String) {
    match value {
        serde_json::Value::Null => out.push_str("null"),
        serde_json::Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        serde_json::Value::Number(n) => out.push_str(&n.to_string()),
        serde_json::Value::String(s) => {
            // serde_json escaping keeps the representation unambiguous
            out.push_str(&serde_json::Value::String(s.clone()).to_string());
        }
        serde_json::Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical_value(item, out);
            }
            out.push(']');
        }
        serde_json::Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort_unstable();
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&serde_json::Value::String((*key).clone()).to_string());
                out.push(':');
                write_canonical_value(&map[*key], out);
            }
            out.push('}');
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use casecraft_shared::types::api::{
        ApiParameter, AuthKind, AuthRequirement, HttpMethod, ParamLocation,
    };
    use serde_json::json;
    use std::collections::BTreeMap;

    fn base_endpoint() -> ApiEndpoint {
        ApiEndpoint {
            method: HttpMethod::Post,
            path: "/orders".into(),
            operation_id: Some("createOrder".into()),
            summary: Some("Create an order".into()),
            description: Some("Creates a new order".into()),
            tags: vec!["orders".into(), "write".into()],
            parameters: vec![
                ApiParameter {
                    name: "X-Request-Id".into(),
                    location: ParamLocation::Header,
                    required: false,
                    description: None,
                    schema: Some(json!({"type": "string"})),
                },
                ApiParameter {
                    name: "dry_run".into(),
                    location: ParamLocation::Query,
                    required: false,
                    description: None,
                    schema: Some(json!({"type": "boolean"})),
                },
            ],
            request_body: Some(json!({
                "type": "object",
                "properties": {"sku": {"type": "string"}, "qty": {"type": "integer"}},
                "required": ["sku"]
            })),
            responses: BTreeMap::from([("201".to_string(), json!({"type": "object"}))]),
            auth: AuthRequirement::required(AuthKind::Bearer),
        }
    }

    #[test]
    fn test_fingerprint_is_hex_sha256() {
        let fp = fingerprint_endpoint(&base_endpoint());
        assert_eq!(fp.len(), 64);
        assert!(fp.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_cosmetic_changes_do_not_affect_fingerprint() {
        let original = base_endpoint();
        let mut reworded = base_endpoint();
        reworded.summary = Some("Make a brand new order".into());
        reworded.description = Some("Totally different wording".into());
        reworded.operation_id = Some("makeOrder".into());
        reworded.tags = vec!["write".into(), "orders".into()];
        reworded.parameters.reverse();

        assert_eq!(
            fingerprint_endpoint(&original),
            fingerprint_endpoint(&reworded)
        );
    }

    #[test]
    fn test_semantic_changes_affect_fingerprint() {
        let original = base_endpoint();

        let mut changed_body = base_endpoint();
        changed_body.request_body = Some(json!({"type": "object", "properties": {}}));
        assert_ne!(
            fingerprint_endpoint(&original),
            fingerprint_endpoint(&changed_body)
        );

        let mut changed_auth = base_endpoint();
        changed_auth.auth = AuthRequirement::none();
        assert_ne!(
            fingerprint_endpoint(&original),
            fingerprint_endpoint(&changed_auth)
        );

        let mut new_param = base_endpoint();
        new_param.parameters.push(ApiParameter {
            name: "limit".into(),
            location: ParamLocation::Query,
            required: true,
            description: None,
            schema: None,
        });
        assert_ne!(
            fingerprint_endpoint(&original),
            fingerprint_endpoint(&new_param)
        );
    }

    #[test]
    fn test_canonical_value_sorts_object_keys() {
        let a = json!({"b": 1, "a": {"d": 2, "c": 3}});
        let b = json!({"a": {"c": 3, "d": 2}, "b": 1});
        let mut sa = String::new();
        let mut sb = String::new();
        write_canonical_value(&a, &mut sa);
        write_canonical_value(&b, &mut sb);
        assert_eq!(sa, sb);
    }

    #[test]
    fn test_cycle_sentinels_compare_equal() {
        // Two structurally identical cyclic schemas reduced to the same
        // sentinel at parse time must fingerprint identically.
        let mut a = base_endpoint();
        a.request_body = Some(json!({"$cycle": "Node"}));
        let mut b = base_endpoint();
        b.request_body = Some(json!({"$cycle": "Node"}));
        assert_eq!(fingerprint_endpoint(&a), fingerprint_endpoint(&b));
    }
}

//! Prompt assembly for test-case generation.
//!
//! Prompts are deterministic in their inputs: a system preamble fixing
//! the output contract and a task body injecting the endpoint, its
//! schemas, and the budget targets. Retries append a structured
//! correction suffix.

use crate::complexity::Budget;
use casecraft_shared::types::api::{ApiEndpoint, AuthKind, HttpMethod};
use serde_json::json;

/// Fixed lexicon of authentication placeholders the model must use.
pub const AUTH_PLACEHOLDERS: [&str; 7] = [
    "${AUTH_TOKEN}",
    "${USER_TOKEN}",
    "${ADMIN_TOKEN}",
    "${API_KEY}",
    "${BASIC_CREDENTIALS}",
    "${INVALID_TOKEN}",
    "${INVALID_API_KEY}",
];

/// System preamble fixing the artifact contract.
pub fn system_prompt(budget: &Budget) -> String {
    format!(
        r#"You are an API testing expert. Generate test cases for the given API endpoint.

Requirements:
1. Positive tests ({positive}): valid requests covering distinct success scenarios.
2. Negative tests ({negative}): missing parameters, wrong types, format errors, out-of-range values, auth failures.
3. Boundary tests ({boundary}): minimum values, maximum values, empty values.

Output contract:
- Return ONLY a JSON array of test case objects, no explanations and no markdown fences.
- Each object has exactly these fields: "name" (string), "description" (string), "method" (HTTP method), "path" (string), "headers" (object), "path_params" (object, optional), "query_params" (object), "body" (object or null), "expected_status" (integer), "expected_response_schema" (object or null), "test_type" ("positive" | "negative" | "boundary"), "tags" (array of strings).
- Emit cases in order of importance within each test type: the most critical scenario first.
- Choose realistic status codes: 200/201 (success), 400 (bad parameters), 401 (unauthenticated), 403 (forbidden), 404 (not found), 422 (validation failure).
- Keep test data realistic and short.

Header rules:
- GET/DELETE: "Accept": "application/json".
- POST/PUT/PATCH: "Content-Type": "application/json" and "Accept": "application/json".
- Authenticated endpoints: use placeholder tokens only, never real credentials. Valid placeholders: {placeholders}.
- Negative auth scenarios: omit the auth header (expect 401) or use ${{INVALID_TOKEN}} / ${{INVALID_API_KEY}} (expect 401 or 403)."#,
        positive = budget.positive,
        negative = budget.negative,
        boundary = budget.boundary,
        placeholders = AUTH_PLACEHOLDERS.join(", "),
    )
}

/// Task body for one endpoint.
pub fn task_prompt(endpoint: &ApiEndpoint, budget: &Budget) -> String {
    let endpoint_info = endpoint_info_json(endpoint);

    format!(
        r#"Generate test cases for the following API endpoint:

**Endpoint Definition:**
```json
{info}
```

**Header guidance:**
{headers}

**Budget:** exactly {positive} positive, {negative} negative, and {boundary} boundary test cases ({total} total). Order each type by importance, most critical first.

Return the test cases as a JSON array:"#,
        info = serde_json::to_string_pretty(&endpoint_info).unwrap_or_default(),
        headers = header_guidance(endpoint),
        positive = budget.positive,
        negative = budget.negative,
        boundary = budget.boundary,
        total = budget.total(),
    )
}

/// Correction suffix appended when the previous output failed validation.
pub fn correction_suffix(violation: &str) -> String {
    format!(
        "\n\nYour previous output violated the contract: {}. Re-emit the complete corrected JSON array only, with no other text.",
        violation
    )
}

fn endpoint_info_json(endpoint: &ApiEndpoint) -> serde_json::Value {
    let parameters: Vec<serde_json::Value> = endpoint
        .parameters
        .iter()
        .map(|p| {
            json!({
                "name": p.name,
                "location": p.location,
                "required": p.required,
                "description": p.description,
                "schema": p.schema,
            })
        })
        .collect();

    json!({
        "method": endpoint.method,
        "path": endpoint.path,
        "summary": endpoint.summary,
        "description": endpoint.description,
        "tags": endpoint.tags,
        "parameters": parameters,
        "requestBody": endpoint.request_body,
        "responses": endpoint.responses,
        "authentication": {
            "required": endpoint.auth.required,
            "kind": endpoint.auth.kind,
        },
    })
}

/// Method- and auth-derived header recommendations for the task body.
fn header_guidance(endpoint: &ApiEndpoint) -> String {
    let mut lines = Vec::new();

    match endpoint.method {
        HttpMethod::Post | HttpMethod::Put | HttpMethod::Patch => {
            lines.push(
                "- Positive cases: \"Content-Type\": \"application/json\", \"Accept\": \"application/json\"."
                    .to_string(),
            );
        }
        _ => {
            lines.push("- Positive cases: \"Accept\": \"application/json\".".to_string());
        }
    }

    if endpoint.auth.required {
        let auth_line = match endpoint.auth.kind {
            AuthKind::Bearer => {
                "- Auth: \"Authorization\": \"Bearer ${AUTH_TOKEN}\" on positive cases."
            }
            AuthKind::ApiKey => "- Auth: \"X-API-Key\": \"${API_KEY}\" on positive cases.",
            AuthKind::Basic => {
                "- Auth: \"Authorization\": \"Basic ${BASIC_CREDENTIALS}\" on positive cases."
            }
            AuthKind::None => "- Auth: no auth header required.",
        };
        lines.push(auth_line.to_string());
        lines.push(
            "- Include one negative case with the auth header missing (expect 401) and one with an invalid credential placeholder."
                .to_string(),
        );
    } else {
        lines.push("- No authentication headers required.".to_string());
    }

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use casecraft_shared::types::api::{AuthRequirement, HttpMethod};
    use std::collections::BTreeMap;

    fn endpoint(method: HttpMethod, auth: AuthRequirement) -> ApiEndpoint {
        ApiEndpoint {
            method,
            path: "/users/{id}".into(),
            operation_id: None,
            summary: Some("Get user".into()),
            description: None,
            tags: vec!["users".into()],
            parameters: Vec::new(),
            request_body: None,
            responses: BTreeMap::new(),
            auth,
        }
    }

    fn budget() -> Budget {
        Budget {
            positive: 2,
            negative: 3,
            boundary: 1,
        }
    }

    #[test]
    fn test_prompts_are_deterministic() {
        let ep = endpoint(HttpMethod::Get, AuthRequirement::none());
        assert_eq!(system_prompt(&budget()), system_prompt(&budget()));
        assert_eq!(task_prompt(&ep, &budget()), task_prompt(&ep, &budget()));
    }

    #[test]
    fn test_system_prompt_carries_budget() {
        let prompt = system_prompt(&budget());
        assert!(prompt.contains("Positive tests (2)"));
        assert!(prompt.contains("Negative tests (3)"));
        assert!(prompt.contains("Boundary tests (1)"));
        assert!(prompt.contains("order of importance"));
    }

    #[test]
    fn test_auth_placeholders_in_system_prompt() {
        let prompt = system_prompt(&budget());
        for placeholder in AUTH_PLACEHOLDERS {
            assert!(prompt.contains(placeholder), "missing {}", placeholder);
        }
    }

    #[test]
    fn test_task_prompt_includes_endpoint_and_budget() {
        let ep = endpoint(
            HttpMethod::Post,
            AuthRequirement::required(casecraft_shared::types::api::AuthKind::Bearer),
        );
        let prompt = task_prompt(&ep, &budget());
        assert!(prompt.contains("/users/{id}"));
        assert!(prompt.contains("6 total"));
        assert!(prompt.contains("Bearer ${AUTH_TOKEN}"));
        assert!(prompt.contains("Content-Type"));
    }

    #[test]
    fn test_correction_suffix() {
        let suffix = correction_suffix("expected 2 positive cases, found 5");
        assert!(suffix.contains("expected 2 positive cases, found 5"));
        assert!(suffix.contains("Re-emit"));
    }
}

//! Complexity scoring and test-case budgeting.
//!
//! The score summarizes an endpoint's surface area; the budget derives
//! the required number of positive, negative, and boundary cases from
//! it. Priorities are assigned afterwards by positional slicing within
//! each test type.

use casecraft_shared::types::api::{ApiEndpoint, HttpMethod, ParamLocation};
use casecraft_shared::types::cases::{Priority, TestCase, TestType};
use serde::{Deserialize, Serialize};

// ============================================================================
// SCORING
// ============================================================================

/// Compute the complexity score for an endpoint.
pub fn score_endpoint(endpoint: &ApiEndpoint) -> u32 {
    let mut score = 0u32;

    score += 2 * endpoint.count_params(ParamLocation::Path) as u32;
    score += endpoint.count_params(ParamLocation::Query) as u32;
    score += endpoint.count_params(ParamLocation::Header) as u32;

    if let Some(body) = &endpoint.request_body {
        score += body_structure_score(body, 0);
    }

    score += match endpoint.method {
        HttpMethod::Post | HttpMethod::Put | HttpMethod::Patch => 2,
        HttpMethod::Delete => 1,
        _ => 0,
    };

    if endpoint.auth.required {
        score += 3;
    }

    let responses = endpoint.responses.len() as u32;
    score += responses.saturating_sub(1);

    score
}

/// Structural score of a request body schema: +1 per object level,
/// +2 per array of objects, +1 per required field beyond three on
/// each object.
fn body_structure_score(schema: &serde_json::Value, depth: usize) -> u32 {
    if depth > 32 {
        return 0;
    }

    let Some(obj) = schema.as_object() else {
        return 0;
    };

    let mut score = 0u32;
    let type_name = obj.get("type").and_then(|t| t.as_str());
    let has_properties = obj.contains_key("properties");

    if type_name == Some("object") || has_properties {
        score += 1;

        if let Some(required) = obj.get("required").and_then(|r| r.as_array()) {
            score += (required.len() as u32).saturating_sub(3);
        }

        if let Some(properties) = obj.get("properties").and_then(|p| p.as_object()) {
            for prop in properties.values() {
                score += body_structure_score(prop, depth + 1);
            }
        }
    } else if type_name == Some("array") {
        if let Some(items) = obj.get("items") {
            let item_score = body_structure_score(items, depth + 1);
            if item_score > 0 {
                // Array of objects: the +2 replaces the item object's +1
                score += 1 + item_score;
            }
        }
    }

    score
}

// ============================================================================
// TIERS AND BUDGETS
// ============================================================================

/// Complexity tier derived from the score. The upper boundary is
/// strict: a score of 10 is still Medium, 11 is Complex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComplexityTier {
    Simple,
    Medium,
    Complex,
}

impl ComplexityTier {
    pub fn from_score(score: u32) -> Self {
        if score <= 5 {
            ComplexityTier::Simple
        } else if score <= 10 {
            ComplexityTier::Medium
        } else {
            ComplexityTier::Complex
        }
    }
}

/// Required test-case counts per type for one endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Budget {
    pub positive: usize,
    pub negative: usize,
    pub boundary: usize,
}

impl Budget {
    pub fn total(&self) -> usize {
        self.positive + self.negative + self.boundary
    }

    pub fn count_of(&self, test_type: TestType) -> usize {
        match test_type {
            TestType::Positive => self.positive,
            TestType::Negative => self.negative,
            TestType::Boundary => self.boundary,
        }
    }
}

/// Derive the budget for a score. DELETE endpoints give up one negative
/// case, landing on the second-highest total within their tier.
pub fn budget_for(score: u32, method: HttpMethod) -> Budget {
    let tier = ComplexityTier::from_score(score);
    let mut budget = match tier {
        ComplexityTier::Simple => Budget {
            positive: 2,
            negative: 3,
            boundary: 1,
        },
        ComplexityTier::Medium => Budget {
            positive: 3,
            negative: 4,
            boundary: 2,
        },
        ComplexityTier::Complex => Budget {
            positive: 4,
            negative: 5,
            boundary: 3,
        },
    };

    if method == HttpMethod::Delete {
        budget.negative -= 1;
    }

    budget
}

// ============================================================================
// PRIORITY SLICING
// ============================================================================

/// Assign P0/P1/P2 within each test type by position: the first 30% of
/// cases are P0, the next 40% P1, the remainder P2. Groups of three or
/// more always get at least one P0 and one P2.
pub fn assign_priorities(cases: &mut [TestCase]) {
    for test_type in TestType::ALL {
        let indices: Vec<usize> = cases
            .iter()
            .enumerate()
            .filter(|(_, c)| c.test_type == test_type)
            .map(|(i, _)| i)
            .collect();

        let (p0, p1) = slice_counts(indices.len());
        for (pos, &idx) in indices.iter().enumerate() {
            cases[idx].priority = if pos < p0 {
                Priority::P0
            } else if pos < p0 + p1 {
                Priority::P1
            } else {
                Priority::P2
            };
        }
    }
}

/// Compute the (P0, P1) split for a group of `total` cases; P2 takes
/// the remainder.
fn slice_counts(total: usize) -> (usize, usize) {
    match total {
        0 => (0, 0),
        1 => (1, 0),
        2 => (1, 1),
        _ => {
            let p0 = ((total as f64 * 0.3) as usize).max(1);
            let mut p1 = ((total as f64 * 0.4) as usize).max(1);
            if total - p0 - p1 == 0 {
                p1 -= 1;
            }
            (p0, p1)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use casecraft_shared::types::api::{ApiParameter, AuthKind, AuthRequirement};
    use casecraft_shared::types::cases::CaseMetadata;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn endpoint_with(
        method: HttpMethod,
        params: Vec<(ParamLocation, &str)>,
        body: Option<serde_json::Value>,
        auth: bool,
        responses: &[&str],
    ) -> ApiEndpoint {
        ApiEndpoint {
            method,
            path: "/x".into(),
            operation_id: None,
            summary: None,
            description: None,
            tags: Vec::new(),
            parameters: params
                .into_iter()
                .map(|(location, name)| ApiParameter {
                    name: name.into(),
                    location,
                    required: true,
                    description: None,
                    schema: None,
                })
                .collect(),
            request_body: body,
            responses: responses
                .iter()
                .map(|s| (s.to_string(), json!({})))
                .collect::<BTreeMap<_, _>>(),
            auth: if auth {
                AuthRequirement::required(AuthKind::Bearer)
            } else {
                AuthRequirement::none()
            },
        }
    }

    #[test]
    fn test_param_scoring() {
        let ep = endpoint_with(
            HttpMethod::Get,
            vec![
                (ParamLocation::Path, "id"),
                (ParamLocation::Query, "limit"),
                (ParamLocation::Header, "X-Trace"),
            ],
            None,
            false,
            &["200"],
        );
        // 2×1 path + 1 query + 1 header
        assert_eq!(score_endpoint(&ep), 4);
    }

    #[test]
    fn test_method_auth_response_scoring() {
        let ep = endpoint_with(HttpMethod::Post, vec![], None, true, &["200", "400", "422"]);
        // +2 method, +3 auth, +2 responses beyond one
        assert_eq!(score_endpoint(&ep), 7);

        let del = endpoint_with(HttpMethod::Delete, vec![], None, false, &["204"]);
        assert_eq!(score_endpoint(&del), 1);
    }

    #[test]
    fn test_body_structure_scoring() {
        // One object level with 5 required fields: +1 + (5-3)
        let flat = json!({
            "type": "object",
            "properties": {"a": {}, "b": {}, "c": {}, "d": {}, "e": {}},
            "required": ["a", "b", "c", "d", "e"]
        });
        assert_eq!(body_structure_score(&flat, 0), 3);

        // Nested object: outer +1, inner +1
        let nested = json!({
            "type": "object",
            "properties": {"inner": {"type": "object", "properties": {}}}
        });
        assert_eq!(body_structure_score(&nested, 0), 2);

        // Array of objects: +2 for the array-of-objects plus the walk
        let array = json!({
            "type": "object",
            "properties": {
                "items": {"type": "array", "items": {"type": "object", "properties": {}}}
            }
        });
        assert_eq!(body_structure_score(&array, 0), 3);
    }

    #[test]
    fn test_tier_boundaries() {
        assert_eq!(ComplexityTier::from_score(5), ComplexityTier::Simple);
        assert_eq!(ComplexityTier::from_score(6), ComplexityTier::Medium);
        assert_eq!(ComplexityTier::from_score(10), ComplexityTier::Medium);
        assert_eq!(ComplexityTier::from_score(11), ComplexityTier::Complex);
    }

    #[test]
    fn test_budget_table() {
        for score in 0..=20u32 {
            let budget = budget_for(score, HttpMethod::Get);
            let total = budget.total();
            match ComplexityTier::from_score(score) {
                ComplexityTier::Simple => {
                    assert!((5..=6).contains(&total));
                    assert!((2..=2).contains(&budget.positive));
                    assert!((2..=3).contains(&budget.negative));
                    assert!((1..=1).contains(&budget.boundary));
                }
                ComplexityTier::Medium => {
                    assert!((7..=9).contains(&total));
                    assert!((2..=3).contains(&budget.positive));
                    assert!((3..=4).contains(&budget.negative));
                    assert!((1..=2).contains(&budget.boundary));
                }
                ComplexityTier::Complex => {
                    assert!((10..=12).contains(&total));
                    assert!((3..=4).contains(&budget.positive));
                    assert!((4..=5).contains(&budget.negative));
                    assert!((2..=3).contains(&budget.boundary));
                }
            }
        }
    }

    #[test]
    fn test_delete_gets_second_highest_total() {
        let get = budget_for(3, HttpMethod::Get);
        let del = budget_for(3, HttpMethod::Delete);
        assert_eq!(del.total(), get.total() - 1);

        let get_med = budget_for(8, HttpMethod::Get);
        let del_med = budget_for(8, HttpMethod::Delete);
        assert_eq!(del_med.total(), get_med.total() - 1);
    }

    fn cases_of(counts: &[(TestType, usize)]) -> Vec<TestCase> {
        let mut cases = Vec::new();
        for &(tt, n) in counts {
            for i in 0..n {
                cases.push(TestCase {
                    name: format!("{} {}", tt, i),
                    description: "d".into(),
                    priority: Priority::P1,
                    method: HttpMethod::Get,
                    path: "/x".into(),
                    headers: BTreeMap::new(),
                    path_params: None,
                    query_params: BTreeMap::new(),
                    body: None,
                    expected_status: 200,
                    expected_response_schema: None,
                    test_type: tt,
                    tags: Vec::new(),
                    metadata: CaseMetadata::default(),
                });
            }
        }
        cases
    }

    fn priority_counts(cases: &[TestCase], tt: TestType) -> (usize, usize, usize) {
        let group: Vec<_> = cases.iter().filter(|c| c.test_type == tt).collect();
        (
            group.iter().filter(|c| c.priority == Priority::P0).count(),
            group.iter().filter(|c| c.priority == Priority::P1).count(),
            group.iter().filter(|c| c.priority == Priority::P2).count(),
        )
    }

    #[test]
    fn test_slicing_ten_cases() {
        let mut cases = cases_of(&[(TestType::Negative, 10)]);
        assign_priorities(&mut cases);
        assert_eq!(priority_counts(&cases, TestType::Negative), (3, 4, 3));
    }

    #[test]
    fn test_slicing_three_cases() {
        let mut cases = cases_of(&[(TestType::Positive, 3)]);
        assign_priorities(&mut cases);
        assert_eq!(priority_counts(&cases, TestType::Positive), (1, 1, 1));
    }

    #[test]
    fn test_slicing_small_groups() {
        let mut cases = cases_of(&[(TestType::Boundary, 1), (TestType::Positive, 2)]);
        assign_priorities(&mut cases);
        assert_eq!(priority_counts(&cases, TestType::Boundary), (1, 0, 0));
        assert_eq!(priority_counts(&cases, TestType::Positive), (1, 1, 0));
    }

    #[test]
    fn test_slicing_is_per_type_and_positional() {
        let mut cases = cases_of(&[(TestType::Positive, 3), (TestType::Negative, 3)]);
        assign_priorities(&mut cases);
        // First case of each type is P0 regardless of interleaving
        assert_eq!(cases[0].priority, Priority::P0);
        assert_eq!(cases[3].priority, Priority::P0);
        assert_eq!(cases[2].priority, Priority::P2);
        assert_eq!(cases[5].priority, Priority::P2);
    }
}

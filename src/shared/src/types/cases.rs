//! Generated test case types
//!
//! The artifact written for an endpoint is an ordered JSON array of
//! [`TestCase`] values. [`TestCaseCollection`] is the in-memory carrier
//! used between validation and the writer.

use crate::types::api::HttpMethod;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

// ============================================================================
// CLASSIFICATION
// ============================================================================

/// Test case category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestType {
    Positive,
    Negative,
    Boundary,
}

impl TestType {
    pub const ALL: [TestType; 3] = [TestType::Positive, TestType::Negative, TestType::Boundary];

    pub fn as_str(&self) -> &'static str {
        match self {
            TestType::Positive => "positive",
            TestType::Negative => "negative",
            TestType::Boundary => "boundary",
        }
    }
}

impl fmt::Display for TestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Test case priority, assigned by positional slicing within each type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Priority {
    P0,
    P1,
    P2,
}

impl Default for Priority {
    fn default() -> Self {
        Priority::P1
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "P0" => Ok(Priority::P0),
            "P1" => Ok(Priority::P1),
            "P2" => Ok(Priority::P2),
            _ => Err(format!("Invalid priority: {}", s)),
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Priority::P0 => f.write_str("P0"),
            Priority::P1 => f.write_str("P1"),
            Priority::P2 => f.write_str("P2"),
        }
    }
}

// ============================================================================
// TEST CASES
// ============================================================================

/// Generation metadata attached to every test case
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseMetadata {
    pub generated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub llm_model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub llm_provider: Option<String>,
}

impl Default for CaseMetadata {
    fn default() -> Self {
        Self {
            generated_at: Utc::now(),
            api_version: None,
            llm_model: None,
            llm_provider: None,
        }
    }
}

/// A single generated test case
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCase {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub priority: Priority,
    pub method: HttpMethod,
    pub path: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path_params: Option<BTreeMap<String, serde_json::Value>>,
    #[serde(default)]
    pub query_params: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub body: Option<serde_json::Value>,
    pub expected_status: u16,
    #[serde(default)]
    pub expected_response_schema: Option<serde_json::Value>,
    pub test_type: TestType,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub metadata: CaseMetadata,
}

/// Test cases generated for one endpoint, in model output order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestCaseCollection {
    pub endpoint_id: String,
    pub method: HttpMethod,
    pub path: String,
    pub test_cases: Vec<TestCase>,
}

impl TestCaseCollection {
    pub fn count_of(&self, test_type: TestType) -> usize {
        self.test_cases
            .iter()
            .filter(|c| c.test_type == test_type)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_serde() {
        assert_eq!(
            serde_json::to_string(&TestType::Boundary).unwrap(),
            "\"boundary\""
        );
        let t: TestType = serde_json::from_str("\"positive\"").unwrap();
        assert_eq!(t, TestType::Positive);
    }

    #[test]
    fn test_priority_serde() {
        assert_eq!(serde_json::to_string(&Priority::P0).unwrap(), "\"P0\"");
        let p: Priority = serde_json::from_str("\"P2\"").unwrap();
        assert_eq!(p, Priority::P2);
        assert_eq!("p1".parse::<Priority>().unwrap(), Priority::P1);
    }

    #[test]
    fn test_case_deserializes_without_optional_fields() {
        let raw = serde_json::json!({
            "name": "create order with valid payload",
            "description": "all required fields present",
            "method": "POST",
            "path": "/orders",
            "expected_status": 201,
            "test_type": "positive"
        });
        let case: TestCase = serde_json::from_value(raw).unwrap();
        assert_eq!(case.method, HttpMethod::Post);
        assert!(case.headers.is_empty());
        assert!(case.body.is_none());
        assert_eq!(case.priority, Priority::P1);
    }

    #[test]
    fn test_collection_counts() {
        let mk = |tt: TestType| TestCase {
            name: "n".into(),
            description: "d".into(),
            priority: Priority::P0,
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
        };
        let coll = TestCaseCollection {
            endpoint_id: "GET /x".into(),
            method: HttpMethod::Get,
            path: "/x".into(),
            test_cases: vec![
                mk(TestType::Positive),
                mk(TestType::Positive),
                mk(TestType::Negative),
            ],
        };
        assert_eq!(coll.count_of(TestType::Positive), 2);
        assert_eq!(coll.count_of(TestType::Boundary), 0);
    }
}

//! Endpoint-to-provider assignment strategies.
//!
//! Four strategies map the filtered endpoint list to primary providers.
//! All are deterministic except `random`, which uses a seeded PRNG so
//! runs are reproducible.

use crate::complexity::{score_endpoint, ComplexityTier};
use crate::error::{GeneratorError, Result};
use casecraft_shared::config::ProviderRoles;
use casecraft_shared::types::api::{glob_match, ApiEndpoint, HttpMethod};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::str::FromStr;

/// Strategy selector, parsed from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyKind {
    RoundRobin,
    Random,
    Complexity,
    Manual,
}

impl FromStr for StrategyKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "round_robin" => Ok(StrategyKind::RoundRobin),
            "random" => Ok(StrategyKind::Random),
            "complexity" => Ok(StrategyKind::Complexity),
            "manual" => Ok(StrategyKind::Manual),
            _ => Err(format!(
                "unknown strategy '{}'; expected round_robin, random, complexity, or manual",
                s
            )),
        }
    }
}

/// A policy mapping endpoints to primary provider names.
pub trait ProviderStrategy: Send {
    fn assign(&mut self, endpoint: &ApiEndpoint) -> Result<String>;
}

// ============================================================================
// ROUND ROBIN
// ============================================================================

/// Cycles through the provider list in document order.
pub struct RoundRobinStrategy {
    providers: Vec<String>,
    index: usize,
}

impl RoundRobinStrategy {
    pub fn new(providers: Vec<String>) -> Result<Self> {
        if providers.is_empty() {
            return Err(GeneratorError::NoProviderConfigured);
        }
        Ok(Self {
            providers,
            index: 0,
        })
    }
}

impl ProviderStrategy for RoundRobinStrategy {
    fn assign(&mut self, _endpoint: &ApiEndpoint) -> Result<String> {
        let provider = self.providers[self.index % self.providers.len()].clone();
        self.index += 1;
        Ok(provider)
    }
}

// ============================================================================
// RANDOM
// ============================================================================

/// Uniform random choice per endpoint with a seeded PRNG.
pub struct RandomStrategy {
    providers: Vec<String>,
    rng: StdRng,
}

impl RandomStrategy {
    pub fn new(providers: Vec<String>, seed: u64) -> Result<Self> {
        if providers.is_empty() {
            return Err(GeneratorError::NoProviderConfigured);
        }
        Ok(Self {
            providers,
            rng: StdRng::seed_from_u64(seed),
        })
    }
}

impl ProviderStrategy for RandomStrategy {
    fn assign(&mut self, _endpoint: &ApiEndpoint) -> Result<String> {
        let idx = self.rng.gen_range(0..self.providers.len());
        Ok(self.providers[idx].clone())
    }
}

/// Default seed when none is configured: endpoint count mixed with the
/// leading bytes of the spec source hash.
pub fn default_random_seed(endpoint_count: usize, source_hash: &str) -> u64 {
    let hash_prefix = u64::from_str_radix(source_hash.get(..16).unwrap_or("0"), 16).unwrap_or(0);
    (endpoint_count as u64).wrapping_add(hash_prefix)
}

// ============================================================================
// COMPLEXITY
// ============================================================================

/// Routes endpoints by complexity tier to operator-tagged providers.
pub struct ComplexityStrategy {
    strongest: String,
    fastest: String,
    balanced: String,
}

impl ComplexityStrategy {
    pub fn new(roles: &ProviderRoles, providers: &[String]) -> Result<Self> {
        let fallback = providers
            .first()
            .cloned()
            .ok_or(GeneratorError::NoProviderConfigured)?;

        Ok(Self {
            strongest: roles.strongest.clone().unwrap_or_else(|| fallback.clone()),
            fastest: roles.fastest.clone().unwrap_or_else(|| fallback.clone()),
            balanced: roles.balanced.clone().unwrap_or(fallback),
        })
    }
}

impl ProviderStrategy for ComplexityStrategy {
    fn assign(&mut self, endpoint: &ApiEndpoint) -> Result<String> {
        let score = score_endpoint(endpoint);
        let provider = match ComplexityTier::from_score(score) {
            ComplexityTier::Complex => &self.strongest,
            ComplexityTier::Simple => &self.fastest,
            ComplexityTier::Medium => &self.balanced,
        };
        Ok(provider.clone())
    }
}

// ============================================================================
// MANUAL
// ============================================================================

/// One rule of the manual mapping: optional method, path glob, provider.
#[derive(Debug, Clone, PartialEq)]
struct ManualRule {
    method: Option<HttpMethod>,
    path_pattern: String,
    provider: String,
}

/// Declarative `pattern:provider,...` mapping. Patterns match a method
/// and/or a path glob; first match wins. A wildcard entry covers
/// endpoints no other rule matches.
#[derive(Debug)]
pub struct ManualStrategy {
    rules: Vec<ManualRule>,
}

impl ManualStrategy {
    pub fn parse(mapping: &str, providers: &[String]) -> Result<Self> {
        let mut rules = Vec::new();

        for entry in mapping.split(',') {
            let entry = entry.trim();
            if entry.is_empty() {
                continue;
            }
            let (pattern, provider) = entry.rsplit_once(':').ok_or_else(|| {
                GeneratorError::config(format!(
                    "manual mapping entry '{}' must have the form pattern:provider",
                    entry
                ))
            })?;
            let provider = provider.trim().to_string();
            if !providers.contains(&provider) {
                return Err(GeneratorError::config(format!(
                    "manual mapping references unconfigured provider '{}'",
                    provider
                )));
            }

            let pattern = pattern.trim();
            let (method, path_pattern) = match pattern.split_once(char::is_whitespace) {
                Some((method_part, path_part)) => {
                    let method = HttpMethod::from_str(method_part)
                        .map_err(GeneratorError::Config)?;
                    (Some(method), path_part.trim().to_string())
                }
                None => (None, pattern.to_string()),
            };

            rules.push(ManualRule {
                method,
                path_pattern,
                provider,
            });
        }

        if rules.is_empty() {
            return Err(GeneratorError::config("manual mapping is empty"));
        }

        Ok(Self { rules })
    }

    fn matches(rule: &ManualRule, endpoint: &ApiEndpoint) -> bool {
        if let Some(method) = rule.method {
            if method != endpoint.method {
                return false;
            }
        }
        glob_match(&rule.path_pattern, &endpoint.path)
    }
}

impl ProviderStrategy for ManualStrategy {
    fn assign(&mut self, endpoint: &ApiEndpoint) -> Result<String> {
        for rule in &self.rules {
            if Self::matches(rule, endpoint) {
                return Ok(rule.provider.clone());
            }
        }
        Err(GeneratorError::config(format!(
            "manual mapping has no rule for {}; add a wildcard '*:<provider>' entry",
            endpoint.endpoint_id()
        )))
    }
}

// ============================================================================
// CONSTRUCTION
// ============================================================================

/// Build the configured strategy over the active provider list.
pub fn build_strategy(
    kind: StrategyKind,
    providers: &[String],
    roles: &ProviderRoles,
    manual_mapping: Option<&str>,
    random_seed: u64,
) -> Result<Box<dyn ProviderStrategy>> {
    match kind {
        StrategyKind::RoundRobin => Ok(Box::new(RoundRobinStrategy::new(providers.to_vec())?)),
        StrategyKind::Random => Ok(Box::new(RandomStrategy::new(
            providers.to_vec(),
            random_seed,
        )?)),
        StrategyKind::Complexity => Ok(Box::new(ComplexityStrategy::new(roles, providers)?)),
        StrategyKind::Manual => {
            let mapping = manual_mapping.ok_or_else(|| {
                GeneratorError::config("strategy 'manual' requires a provider mapping")
            })?;
            Ok(Box::new(ManualStrategy::parse(mapping, providers)?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use casecraft_shared::types::api::{ApiParameter, AuthRequirement, ParamLocation};
    use std::collections::BTreeMap;

    fn endpoint(method: HttpMethod, path: &str) -> ApiEndpoint {
        ApiEndpoint {
            method,
            path: path.into(),
            operation_id: None,
            summary: None,
            description: None,
            tags: Vec::new(),
            parameters: Vec::new(),
            request_body: None,
            responses: BTreeMap::new(),
            auth: AuthRequirement::none(),
        }
    }

    fn providers() -> Vec<String> {
        vec!["glm".into(), "qwen".into()]
    }

    #[test]
    fn test_round_robin_sequence() {
        let mut strategy = RoundRobinStrategy::new(providers()).unwrap();
        let endpoints = ["/a", "/b", "/c", "/d", "/e"];
        let assigned: Vec<String> = endpoints
            .iter()
            .map(|p| strategy.assign(&endpoint(HttpMethod::Get, p)).unwrap())
            .collect();
        // P[i mod |P|] for the i-th endpoint in document order
        assert_eq!(assigned, ["glm", "qwen", "glm", "qwen", "glm"]);
    }

    #[test]
    fn test_random_is_reproducible() {
        let seq = |seed: u64| -> Vec<String> {
            let mut strategy = RandomStrategy::new(providers(), seed).unwrap();
            (0..10)
                .map(|i| {
                    strategy
                        .assign(&endpoint(HttpMethod::Get, &format!("/{}", i)))
                        .unwrap()
                })
                .collect()
        };
        assert_eq!(seq(42), seq(42));
    }

    #[test]
    fn test_default_seed_derivation() {
        let a = default_random_seed(3, "00000000000000ff0000");
        assert_eq!(a, 3 + 0xff);
        // Non-hex hash degrades to the endpoint count alone
        assert_eq!(default_random_seed(7, "zzzz"), 7);
    }

    #[test]
    fn test_complexity_routing() {
        let roles = ProviderRoles {
            strongest: Some("glm".into()),
            fastest: Some("local".into()),
            balanced: Some("qwen".into()),
        };
        let mut strategy = ComplexityStrategy::new(&roles, &providers()).unwrap();

        // Score 0: simple
        let simple = endpoint(HttpMethod::Get, "/health");
        assert_eq!(strategy.assign(&simple).unwrap(), "local");

        // POST + auth + params pushes past 10: complex
        let mut complex = endpoint(HttpMethod::Post, "/orders/{id}");
        complex.auth = AuthRequirement::required(casecraft_shared::types::api::AuthKind::Bearer);
        complex.parameters = (0..3)
            .map(|i| ApiParameter {
                name: format!("p{}", i),
                location: ParamLocation::Path,
                required: true,
                description: None,
                schema: None,
            })
            .collect();
        assert_eq!(strategy.assign(&complex).unwrap(), "glm");

        // In between: medium
        let mut medium = endpoint(HttpMethod::Post, "/orders");
        medium.auth = AuthRequirement::required(casecraft_shared::types::api::AuthKind::Bearer);
        medium.parameters = vec![ApiParameter {
            name: "q".into(),
            location: ParamLocation::Query,
            required: false,
            description: None,
            schema: None,
        }];
        assert_eq!(strategy.assign(&medium).unwrap(), "qwen");
    }

    #[test]
    fn test_manual_first_match_wins() {
        let mut strategy =
            ManualStrategy::parse("/users/*:qwen,GET /users/admin:glm,*:glm", &providers())
                .unwrap();

        // The /users/* rule precedes the more specific GET rule
        assert_eq!(
            strategy
                .assign(&endpoint(HttpMethod::Get, "/users/admin"))
                .unwrap(),
            "qwen"
        );
        assert_eq!(
            strategy
                .assign(&endpoint(HttpMethod::Get, "/orders"))
                .unwrap(),
            "glm"
        );
    }

    #[test]
    fn test_manual_method_pattern() {
        let mut strategy =
            ManualStrategy::parse("POST /orders:qwen,*:glm", &providers()).unwrap();
        assert_eq!(
            strategy
                .assign(&endpoint(HttpMethod::Post, "/orders"))
                .unwrap(),
            "qwen"
        );
        assert_eq!(
            strategy
                .assign(&endpoint(HttpMethod::Get, "/orders"))
                .unwrap(),
            "glm"
        );
    }

    #[test]
    fn test_manual_requires_wildcard_coverage() {
        let mut strategy = ManualStrategy::parse("/users/*:qwen", &providers()).unwrap();
        let err = strategy
            .assign(&endpoint(HttpMethod::Get, "/orders"))
            .unwrap_err();
        assert!(err.to_string().contains("wildcard"));
    }

    #[test]
    fn test_manual_rejects_unknown_provider() {
        let err = ManualStrategy::parse("*:claude", &providers()).unwrap_err();
        assert!(err.to_string().contains("unconfigured provider"));
    }
}

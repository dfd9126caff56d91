//! Shared type definitions for CaseCraft
//!
//! This module provides the core data model used across the pipeline,
//! ensuring consistency between the parser, scheduler, and writer.

pub mod api;
pub mod cases;
pub mod state;
pub mod usage;

pub use api::{
    ApiEndpoint, ApiParameter, ApiSpecification, AuthKind, AuthRequirement, EndpointFilter,
    HttpMethod, ParamLocation,
};
pub use cases::{CaseMetadata, Priority, TestCase, TestCaseCollection, TestType};
pub use state::{EndpointState, GenerationState, ProcessingStatistics, ProjectConfig};
pub use usage::{ProviderStats, TokenUsage, UsageOutcome, UsageRecord};

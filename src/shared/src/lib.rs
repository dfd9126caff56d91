//! Shared types and utilities for CaseCraft
//!
//! This crate holds the data model used across the CaseCraft pipeline:
//! normalized API endpoints, generated test cases, incremental-generation
//! state, token usage accounting, and provider configuration.

pub mod config;
pub mod types;

pub use config::{OutputConfig, ProviderConfig, ProviderRoles};
pub use types::*;

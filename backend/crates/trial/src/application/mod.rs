//! Application Layer - Use Cases
//!
//! This layer orchestrates domain logic and infrastructure.
//! Contains use case implementations.

pub mod advance_verification;
pub mod config;
pub mod issue_credential;
pub mod rate_limit;
pub mod start_verification;
pub mod store;
pub mod verify_token;

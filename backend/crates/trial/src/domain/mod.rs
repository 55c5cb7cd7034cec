//! Domain Layer - Business logic and entities
//!
//! This layer contains:
//! - Domain entities (VerificationRecord, TrialAccount)
//! - Domain value objects (PlanId, ClientIdentity, ReferrerAllowList)
//! - Domain services (token derivation, username generation)
//! - Repository traits (interfaces)

pub mod entities;
pub mod repository;
pub mod services;
pub mod value_objects;

//! Trial Backend Module
//!
//! Gates issuance of short-lived trial credentials behind an external
//! link-shortener funnel.
//!
//! Clean Architecture structure:
//! - `domain/` - Entities, value objects, repository traits
//! - `application/` - Use cases
//! - `infra/` - PostgreSQL and in-memory implementations
//! - `presentation/` - HTTP handlers
//!
//! ## Security Model
//! - Tokens carry 256 bits from the OS CSPRNG; only their SHA-256 is stored
//! - A record moves `pending -> completed -> used`, each step a conditional
//!   update, so racing requests see exactly one success
//! - Callback rejections are logged, never shown: the redirect is uniform
//! - Credential lifetime comes from the stored record, never the request
//! - Clear text passwords are returned once and never persisted

pub mod application;
pub mod domain;
pub mod error;
pub mod infra;
pub mod presentation;

// Re-exports for convenience
pub use application::config::{PlanCatalog, TrialConfig};
pub use application::store::StoreHandle;
pub use error::{TrialError, TrialResult};
pub use infra::hasher::Argon2Hasher;
pub use infra::memory::InMemoryTrialRepository;
pub use infra::postgres::PgTrialRepository;
pub use infra::rate_limit::RateLimiterBackend;
pub use presentation::router::{trial_router, trial_router_generic};

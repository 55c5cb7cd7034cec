//! Platform Crate - Technical Infrastructure
//!
//! This crate provides shared technical foundations:
//! - Cryptographic utilities (secure random, SHA-256, Base64)
//! - Password hashing (Argon2id)
//! - Cookie management
//! - Client IP extraction
//! - Rate limiting infrastructure

pub mod client;
pub mod cookie;
pub mod crypto;
pub mod password;
pub mod rate_limit;

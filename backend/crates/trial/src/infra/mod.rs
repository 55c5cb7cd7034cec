//! Infrastructure Layer - Store, hasher and rate limiter implementations

pub mod hasher;
pub mod memory;
pub mod postgres;
pub mod rate_limit;

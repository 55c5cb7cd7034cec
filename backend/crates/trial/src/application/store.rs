//! Store Handle
//!
//! The persistence collaborator is passed into every use case explicitly.
//! A missing store is a variant, not a null checked at each call site.

use std::sync::Arc;

use crate::error::{TrialError, TrialResult};

/// Handle to the verification store
#[derive(Debug)]
pub enum StoreHandle<R> {
    Configured(Arc<R>),
    NotConfigured,
}

// Manual impl: derive would require `R: Clone`.
impl<R> Clone for StoreHandle<R> {
    fn clone(&self) -> Self {
        match self {
            StoreHandle::Configured(repo) => StoreHandle::Configured(Arc::clone(repo)),
            StoreHandle::NotConfigured => StoreHandle::NotConfigured,
        }
    }
}

impl<R> StoreHandle<R> {
    pub fn configured(repo: R) -> Self {
        StoreHandle::Configured(Arc::new(repo))
    }

    pub fn is_configured(&self) -> bool {
        matches!(self, StoreHandle::Configured(_))
    }

    /// Borrow the store, or fail with `NotConfigured`
    pub fn get(&self) -> TrialResult<&R> {
        match self {
            StoreHandle::Configured(repo) => Ok(repo.as_ref()),
            StoreHandle::NotConfigured => Err(TrialError::NotConfigured),
        }
    }
}

impl<R> From<Option<R>> for StoreHandle<R> {
    fn from(repo: Option<R>) -> Self {
        repo.map_or(StoreHandle::NotConfigured, StoreHandle::configured)
    }
}

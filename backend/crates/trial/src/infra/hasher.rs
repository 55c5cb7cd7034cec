//! Argon2id credential hasher

use platform::password::{ClearTextPassword, HashedPassword};

use crate::domain::repository::CredentialHasher;
use crate::error::{TrialError, TrialResult};

/// Hashes on tokio's blocking pool; Argon2 is deliberately slow
#[derive(Debug, Clone, Copy, Default)]
pub struct Argon2Hasher;

impl CredentialHasher for Argon2Hasher {
    async fn hash(&self, password: &ClearTextPassword) -> TrialResult<HashedPassword> {
        // zeroized on drop inside the blocking task
        let owned = ClearTextPassword::from_string(password.expose().to_string());

        tokio::task::spawn_blocking(move || owned.hash())
            .await
            .map_err(|e| TrialError::Internal(format!("hashing task failed: {e}")))?
            .map_err(TrialError::from)
    }
}

//! In-Memory Repository
//!
//! Process-local store used when no database is configured and as the
//! persistence double in tests. Every transition runs inside a single
//! critical section, so it gives the same exactly-once guarantees as the
//! conditional updates of the PostgreSQL store.
//!
//! Records and accounts older than [`RETENTION_HOURS`] past their expiry are
//! swept once the store grows past its prune threshold, mirroring the
//! startup cleanup of the PostgreSQL store.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Duration, Utc};
use kernel::id::VerificationRecordId;

use crate::domain::entities::{CredentialDraft, TrialAccount, VerificationRecord, VerificationStatus};
use crate::domain::repository::VerificationRepository;
use crate::domain::value_objects::{PlanId, TokenHash};
use crate::error::{TrialError, TrialResult};

/// Stores larger than this are swept on insert
const PRUNE_THRESHOLD: usize = 10_000;

/// How long expired records and accounts are kept
pub const RETENTION_HOURS: i64 = 24;

#[derive(Debug, Default)]
struct State {
    records: Vec<VerificationRecord>,
    accounts: Vec<TrialAccount>,
}

impl State {
    /// Drop records and accounts that expired before `cutoff`
    fn sweep(&mut self, cutoff: DateTime<Utc>) -> (u64, u64) {
        let records_before = self.records.len();
        self.records.retain(|r| r.expires_at >= cutoff);
        let accounts_before = self.accounts.len();
        self.accounts.retain(|a| a.expires_at >= cutoff);
        (
            (records_before - self.records.len()) as u64,
            (accounts_before - self.accounts.len()) as u64,
        )
    }

    fn sweep_if_large(&mut self, threshold: usize, now: DateTime<Utc>) {
        if self.records.len() + self.accounts.len() > threshold {
            let (records, accounts) = self.sweep(now - Duration::hours(RETENTION_HOURS));
            tracing::debug!(records, accounts, "Swept expired in-memory trial data");
        }
    }
}

/// In-memory verification store
#[derive(Debug)]
pub struct InMemoryTrialRepository {
    state: Mutex<State>,
    fail_account_writes: AtomicBool,
    prune_threshold: usize,
}

impl Default for InMemoryTrialRepository {
    fn default() -> Self {
        Self::with_prune_threshold(PRUNE_THRESHOLD)
    }
}

impl InMemoryTrialRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store that sweeps expired data once it holds more than `threshold` items
    pub fn with_prune_threshold(threshold: usize) -> Self {
        Self {
            state: Mutex::new(State::default()),
            fail_account_writes: AtomicBool::new(false),
            prune_threshold: threshold,
        }
    }

    /// Delete records and accounts that expired more than `retention` ago
    pub fn cleanup_expired(&self, retention: Duration) -> (u64, u64) {
        self.lock().sweep(Utc::now() - retention)
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Make account writes fail, rolling back the paired record transition
    pub fn set_fail_account_writes(&self, fail: bool) {
        self.fail_account_writes.store(fail, Ordering::SeqCst);
    }

    /// Insert a record as-is, bypassing the lifecycle
    pub fn insert_record(&self, record: VerificationRecord) {
        self.lock().records.push(record);
    }

    pub fn record(&self, id: VerificationRecordId) -> Option<VerificationRecord> {
        self.lock().records.iter().find(|r| r.id == id).cloned()
    }

    pub fn records(&self) -> Vec<VerificationRecord> {
        self.lock().records.clone()
    }

    pub fn accounts(&self) -> Vec<TrialAccount> {
        self.lock().accounts.clone()
    }
}

/// Index of the newest record satisfying `pred`
fn newest_matching<F>(records: &[VerificationRecord], pred: F) -> Option<usize>
where
    F: Fn(&VerificationRecord) -> bool,
{
    records
        .iter()
        .enumerate()
        .filter(|(_, r)| pred(r))
        .max_by_key(|(i, r)| (r.created_at, *i))
        .map(|(i, _)| i)
}

impl VerificationRepository for InMemoryTrialRepository {
    async fn create(&self, record: &VerificationRecord) -> TrialResult<()> {
        let mut state = self.lock();
        state.sweep_if_large(self.prune_threshold, Utc::now());
        if state
            .records
            .iter()
            .any(|r| r.token_hash == record.token_hash || r.id == record.id)
        {
            return Err(TrialError::Internal(
                "duplicate verification record".to_string(),
            ));
        }
        state.records.push(record.clone());
        Ok(())
    }

    async fn find_by_token_hash(&self, hash: &TokenHash) -> TrialResult<Option<VerificationRecord>> {
        Ok(self
            .lock()
            .records
            .iter()
            .find(|r| r.token_hash == *hash)
            .cloned())
    }

    async fn complete_latest_pending(
        &self,
        identity: &str,
        plan: PlanId,
        referrer: Option<&str>,
        now: DateTime<Utc>,
    ) -> TrialResult<Option<VerificationRecord>> {
        let mut state = self.lock();
        let Some(index) = newest_matching(&state.records, |r| r.can_complete(identity, plan, now))
        else {
            return Ok(None);
        };

        let record = &mut state.records[index];
        record.complete(referrer.map(str::to_string), now);
        Ok(Some(record.clone()))
    }

    async fn has_consumable(
        &self,
        identity: &str,
        plan: Option<PlanId>,
        now: DateTime<Utc>,
    ) -> TrialResult<bool> {
        Ok(self
            .lock()
            .records
            .iter()
            .any(|r| r.can_consume(identity, plan, now)))
    }

    async fn consume_for_issuance(
        &self,
        identity: &str,
        plan: Option<PlanId>,
        draft: &CredentialDraft,
        now: DateTime<Utc>,
    ) -> TrialResult<Option<(VerificationRecord, TrialAccount)>> {
        let mut state = self.lock();
        let Some(index) = newest_matching(&state.records, |r| r.can_consume(identity, plan, now))
        else {
            return Ok(None);
        };

        // Check the account write before touching the record so a failure
        // leaves nothing behind.
        if self.fail_account_writes.load(Ordering::SeqCst) {
            return Err(TrialError::Internal("account write failed".to_string()));
        }
        if state.accounts.iter().any(|a| a.username == draft.username) {
            return Err(TrialError::Internal("duplicate username".to_string()));
        }

        let record = &mut state.records[index];
        record.consume(now);
        let record = record.clone();
        let account = TrialAccount::for_record(draft, &record, now);
        state.accounts.push(account.clone());
        state.sweep_if_large(self.prune_threshold, now);

        Ok(Some((record, account)))
    }
}

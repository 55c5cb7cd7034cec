//! PostgreSQL Repository Implementations

use chrono::{DateTime, Duration, Utc};
use kernel::id::VerificationRecordId;
use platform::rate_limit::{RateLimitConfig, RateLimitResult, RateLimitStore};
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::entities::{CredentialDraft, TrialAccount, VerificationRecord, VerificationStatus};
use crate::domain::repository::VerificationRepository;
use crate::domain::value_objects::{PlanId, TokenHash};
use crate::error::{TrialError, TrialResult};

const RECORD_COLUMNS: &str = r#"
    verification_id,
    identity,
    client_ip,
    session_id,
    plan_id,
    trial_hours,
    token_hash,
    status,
    referrer,
    created_at,
    expires_at,
    completed_at,
    used_at
"#;

/// PostgreSQL-backed repository
#[derive(Clone)]
pub struct PgTrialRepository {
    pool: PgPool,
}

impl PgTrialRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Delete records and rate-limit windows older than `retention`
    ///
    /// Retention only; the state machine itself never deletes.
    pub async fn cleanup_expired(&self, retention: Duration) -> TrialResult<(u64, u64)> {
        let cutoff = Utc::now() - retention;

        let records_deleted =
            sqlx::query("DELETE FROM verification_records WHERE expires_at < $1")
                .bind(cutoff)
                .execute(&self.pool)
                .await?
                .rows_affected();

        let rate_limits_deleted =
            sqlx::query("DELETE FROM trial_rate_limits WHERE reset_at_ms < $1")
                .bind(cutoff.timestamp_millis())
                .execute(&self.pool)
                .await?
                .rows_affected();

        tracing::info!(
            records = records_deleted,
            rate_limits = rate_limits_deleted,
            "Cleaned up expired trial data"
        );

        Ok((records_deleted, rate_limits_deleted))
    }
}

impl VerificationRepository for PgTrialRepository {
    async fn create(&self, record: &VerificationRecord) -> TrialResult<()> {
        sqlx::query(
            r#"
            INSERT INTO verification_records (
                verification_id,
                identity,
                client_ip,
                session_id,
                plan_id,
                trial_hours,
                token_hash,
                status,
                referrer,
                created_at,
                expires_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(record.id.into_uuid())
        .bind(&record.identity)
        .bind(&record.client_ip)
        .bind(record.session_id.as_deref())
        .bind(record.plan.get() as i32)
        .bind(record.trial_hours as i32)
        .bind(record.token_hash.as_bytes().as_slice())
        .bind(record.status.as_str())
        .bind(record.referrer.as_deref())
        .bind(record.created_at)
        .bind(record.expires_at)
        .execute(&self.pool)
        .await?;

        tracing::debug!(
            record_id = %record.id,
            token_hash = ?record.token_hash,
            "Verification record created"
        );

        Ok(())
    }

    async fn find_by_token_hash(&self, hash: &TokenHash) -> TrialResult<Option<VerificationRecord>> {
        let row = sqlx::query_as::<_, VerificationRow>(&format!(
            "SELECT {RECORD_COLUMNS} FROM verification_records WHERE token_hash = $1"
        ))
        .bind(hash.as_bytes().as_slice())
        .fetch_optional(&self.pool)
        .await?;

        row.map(VerificationRow::into_record).transpose()
    }

    async fn complete_latest_pending(
        &self,
        identity: &str,
        plan: PlanId,
        referrer: Option<&str>,
        now: DateTime<Utc>,
    ) -> TrialResult<Option<VerificationRecord>> {
        // The outer status guard makes a racing second caller update nothing
        // once the first has committed.
        let row = sqlx::query_as::<_, VerificationRow>(&format!(
            r#"
            UPDATE verification_records
            SET status = 'completed', completed_at = $4, referrer = $3
            WHERE verification_id = (
                SELECT verification_id
                FROM verification_records
                WHERE identity = $1
                  AND plan_id = $2
                  AND status = 'pending'
                  AND expires_at > $4
                ORDER BY created_at DESC
                LIMIT 1
                FOR UPDATE
            )
            AND status = 'pending'
            RETURNING {RECORD_COLUMNS}
            "#
        ))
        .bind(identity)
        .bind(plan.get() as i32)
        .bind(referrer)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        row.map(VerificationRow::into_record).transpose()
    }

    async fn has_consumable(
        &self,
        identity: &str,
        plan: Option<PlanId>,
        now: DateTime<Utc>,
    ) -> TrialResult<bool> {
        let (exists,) = sqlx::query_as::<_, (bool,)>(
            r#"
            SELECT EXISTS (
                SELECT 1
                FROM verification_records
                WHERE identity = $1
                  AND ($2::INT4 IS NULL OR plan_id = $2)
                  AND status = 'completed'
                  AND expires_at > $3
            )
            "#,
        )
        .bind(identity)
        .bind(plan.map(|p| p.get() as i32))
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }

    async fn consume_for_issuance(
        &self,
        identity: &str,
        plan: Option<PlanId>,
        draft: &CredentialDraft,
        now: DateTime<Utc>,
    ) -> TrialResult<Option<(VerificationRecord, TrialAccount)>> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, VerificationRow>(&format!(
            r#"
            UPDATE verification_records
            SET status = 'used', used_at = $3
            WHERE verification_id = (
                SELECT verification_id
                FROM verification_records
                WHERE identity = $1
                  AND ($2::INT4 IS NULL OR plan_id = $2)
                  AND status = 'completed'
                  AND expires_at > $3
                ORDER BY created_at DESC
                LIMIT 1
                FOR UPDATE
            )
            AND status = 'completed'
            RETURNING {RECORD_COLUMNS}
            "#
        ))
        .bind(identity)
        .bind(plan.map(|p| p.get() as i32))
        .bind(now)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            // Nothing written; dropping the transaction rolls it back.
            return Ok(None);
        };
        let record = row.into_record()?;
        let account = TrialAccount::for_record(draft, &record, now);

        sqlx::query(
            r#"
            INSERT INTO trial_accounts (
                trial_account_id,
                username,
                password_hash,
                account_type,
                device_type,
                payment_status,
                is_active,
                is_banned,
                trial_hours,
                expires_at,
                created_at,
                notes,
                verification_id
            ) VALUES ($1, $2, $3, 'user', 'single', 'trial', TRUE, FALSE, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(account.id.into_uuid())
        .bind(&account.username)
        .bind(account.password_hash.as_phc_string())
        .bind(account.trial_hours as i32)
        .bind(account.expires_at)
        .bind(account.created_at)
        .bind(&account.notes)
        .bind(account.verification_id.into_uuid())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(Some((record, account)))
    }
}

/// Shared fixed-window counters for multi-instance deployments
impl RateLimitStore for PgTrialRepository {
    async fn check_and_increment(
        &self,
        key: &str,
        config: &RateLimitConfig,
    ) -> Result<RateLimitResult, Box<dyn std::error::Error + Send + Sync>> {
        Ok(self
            .check_rate_limit_at(key, config, Utc::now().timestamp_millis())
            .await?)
    }
}

impl PgTrialRepository {
    /// Count an attempt for `key` at `now_ms`
    ///
    /// Same rule as the in-memory limiter: the first attempt opens a window
    /// ending at `now + window`, an attempt at or after that end opens a
    /// fresh one, and denied attempts are not counted past the limit.
    pub async fn check_rate_limit_at(
        &self,
        key: &str,
        config: &RateLimitConfig,
        now_ms: i64,
    ) -> TrialResult<RateLimitResult> {
        let cap = i32::try_from(config.max_requests.saturating_add(1)).unwrap_or(i32::MAX);

        let (count, reset_at_ms) = sqlx::query_as::<_, (i32, i64)>(
            r#"
            INSERT INTO trial_rate_limits (limit_key, request_count, reset_at_ms)
            VALUES ($1, 1, $2 + $3)
            ON CONFLICT (limit_key) DO UPDATE SET
                request_count = CASE
                    WHEN trial_rate_limits.reset_at_ms <= $2 THEN 1
                    ELSE LEAST(trial_rate_limits.request_count + 1, $4)
                END,
                reset_at_ms = CASE
                    WHEN trial_rate_limits.reset_at_ms <= $2 THEN $2 + $3
                    ELSE trial_rate_limits.reset_at_ms
                END
            RETURNING request_count, reset_at_ms
            "#,
        )
        .bind(key)
        .bind(now_ms)
        .bind(config.window_ms())
        .bind(cap)
        .fetch_one(&self.pool)
        .await?;

        Ok(RateLimitResult::from_count(
            count.max(0) as u32,
            config,
            reset_at_ms,
            now_ms,
        ))
    }
}

// Internal row types for sqlx mapping
#[derive(sqlx::FromRow)]
struct VerificationRow {
    verification_id: Uuid,
    identity: String,
    client_ip: String,
    session_id: Option<String>,
    plan_id: i32,
    trial_hours: i32,
    token_hash: Vec<u8>,
    status: String,
    referrer: Option<String>,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    used_at: Option<DateTime<Utc>>,
}

impl VerificationRow {
    fn into_record(self) -> TrialResult<VerificationRecord> {
        let id = self.verification_id;
        let corrupt =
            |what: &str| TrialError::Internal(format!("verification record {id} has invalid {what}"));

        let plan = u32::try_from(self.plan_id)
            .ok()
            .and_then(PlanId::new)
            .ok_or_else(|| corrupt("plan_id"))?;
        let trial_hours = u32::try_from(self.trial_hours).map_err(|_| corrupt("trial_hours"))?;
        let token_hash: [u8; 32] = self
            .token_hash
            .as_slice()
            .try_into()
            .map_err(|_| corrupt("token_hash"))?;
        let status = VerificationStatus::parse(&self.status).ok_or_else(|| corrupt("status"))?;

        Ok(VerificationRecord {
            id: VerificationRecordId::from_uuid(id),
            identity: self.identity,
            client_ip: self.client_ip,
            session_id: self.session_id,
            plan,
            trial_hours,
            token_hash: TokenHash::from_bytes(token_hash),
            status,
            referrer: self.referrer,
            created_at: self.created_at,
            expires_at: self.expires_at,
            completed_at: self.completed_at,
            used_at: self.used_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::postgres::PgPoolOptions;

    async fn repo() -> PgTrialRepository {
        let url = std::env::var("DATABASE_URL").unwrap();
        let pool = PgPoolOptions::new()
            .max_connections(2)
            .connect(&url)
            .await
            .unwrap();
        sqlx::migrate!("../../../database/migrations")
            .run(&pool)
            .await
            .unwrap();
        PgTrialRepository::new(pool)
    }

    #[tokio::test]
    #[ignore = "requires PostgreSQL at DATABASE_URL"]
    async fn test_rate_limit_window_opens_at_first_attempt() {
        let repo = repo().await;
        let key = format!("gen:test-{}", Uuid::new_v4());
        let config = RateLimitConfig::new(5, 3600);
        let first = 3_599_000;

        for _ in 0..5 {
            let result = repo.check_rate_limit_at(&key, &config, first).await.unwrap();
            assert!(result.allowed);
            assert_eq!(result.reset_at_ms, first + 3_600_000);
        }

        // an epoch-aligned hour boundary does not reopen the window
        let denied = repo
            .check_rate_limit_at(&key, &config, 3_600_000)
            .await
            .unwrap();
        assert!(!denied.allowed);
        assert_eq!(denied.retry_after_secs, Some(3599));

        let reopened = repo
            .check_rate_limit_at(&key, &config, first + 3_600_000)
            .await
            .unwrap();
        assert!(reopened.allowed);
        assert_eq!(reopened.remaining, 4);
        assert_eq!(reopened.reset_at_ms, first + 7_200_000);
    }
}

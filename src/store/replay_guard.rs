use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use moka::Expiry;
use moka::future::Cache;
use sqlx::MySqlPool;

use crate::error::StoreError;
use crate::store::{ClaimOutcome, ReplayGuard};

/// Replay records shared by every instance through the `action_token_claims` table.
pub struct MySqlReplayGuard {
    pool: MySqlPool,
    /// Kept past token expiry to cover clock skew between issuer and verifier
    retention_slack: chrono::Duration,
}

impl MySqlReplayGuard {
    pub fn new(pool: MySqlPool, retention_slack: chrono::Duration) -> Self {
        Self {
            pool,
            retention_slack,
        }
    }
}

/// A duplicate primary key means the nonce was already claimed. Any other
/// failure, including other integrity errors sharing SQLSTATE 23000, is an outage.
fn claim_outcome(insert: Result<(), sqlx::Error>) -> Result<ClaimOutcome, StoreError> {
    match insert {
        Ok(()) => Ok(ClaimOutcome::Claimed),
        Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
            Ok(ClaimOutcome::AlreadyClaimed)
        }
        Err(e) => Err(e.into()),
    }
}

#[async_trait]
impl ReplayGuard for MySqlReplayGuard {
    async fn claim(
        &self,
        nonce: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<ClaimOutcome, StoreError> {
        // The primary key on `nonce` makes the insert the check.
        let result = sqlx::query(
            r#"
            INSERT INTO action_token_claims (nonce, claimed_at, retain_until)
            VALUES (?, ?, ?)
            "#,
        )
        .bind(nonce)
        .bind(Utc::now())
        .bind(expires_at + self.retention_slack)
        .execute(&self.pool)
        .await;

        claim_outcome(result.map(|_| ()))
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM action_token_claims WHERE retain_until < ?")
            .bind(now)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}

#[derive(Debug, Clone)]
struct ClaimRecord {
    claimed_at: DateTime<Utc>,
    retain_until: DateTime<Utc>,
}

/// Each record lives exactly until its own retention deadline.
struct RetainUntil;

impl Expiry<String, ClaimRecord> for RetainUntil {
    fn expire_after_create(
        &self,
        _nonce: &String,
        record: &ClaimRecord,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(
            (record.retain_until - Utc::now())
                .to_std()
                .unwrap_or(Duration::ZERO),
        )
    }
}

/// In-process replay records for single-instance deployments.
///
/// The cache has no capacity bound: size eviction would forget a nonce
/// before its token expired.
pub struct MokaReplayGuard {
    claims: Cache<String, ClaimRecord>,
    retention_slack: chrono::Duration,
}

impl MokaReplayGuard {
    pub fn new(retention_slack: chrono::Duration) -> Self {
        let claims = Cache::builder()
            .name("action_token_claims")
            .expire_after(RetainUntil)
            .build();

        Self {
            claims,
            retention_slack,
        }
    }
}

#[async_trait]
impl ReplayGuard for MokaReplayGuard {
    async fn claim(
        &self,
        nonce: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<ClaimOutcome, StoreError> {
        let record = ClaimRecord {
            claimed_at: Utc::now(),
            retain_until: expires_at + self.retention_slack,
        };

        // Concurrent inserts for one key are coalesced; only one entry is fresh.
        let entry = self.claims.entry(nonce.to_string()).or_insert(record).await;

        if entry.is_fresh() {
            return Ok(ClaimOutcome::Claimed);
        }

        tracing::debug!(nonce, claimed_at = %entry.value().claimed_at, "Nonce already claimed");
        Ok(ClaimOutcome::AlreadyClaimed)
    }

    async fn purge_expired(&self, _now: DateTime<Utc>) -> Result<u64, StoreError> {
        let before = self.claims.entry_count();
        self.claims.run_pending_tasks().await;
        Ok(before.saturating_sub(self.claims.entry_count()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::future::join_all;
    use sqlx::error::{DatabaseError, ErrorKind};
    use std::borrow::Cow;
    use std::error::Error as StdError;
    use std::fmt;

    #[derive(Debug)]
    struct MySqlFailure {
        number: u16,
        unique: bool,
    }

    impl fmt::Display for MySqlFailure {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{} (23000): integrity constraint violation", self.number)
        }
    }

    impl StdError for MySqlFailure {}

    impl DatabaseError for MySqlFailure {
        fn message(&self) -> &str {
            "integrity constraint violation"
        }

        fn code(&self) -> Option<Cow<'_, str>> {
            Some(Cow::Borrowed("23000"))
        }

        fn as_error(&self) -> &(dyn StdError + Send + Sync + 'static) {
            self
        }

        fn as_error_mut(&mut self) -> &mut (dyn StdError + Send + Sync + 'static) {
            self
        }

        fn into_error(self: Box<Self>) -> Box<dyn StdError + Send + Sync + 'static> {
            self
        }

        fn kind(&self) -> ErrorKind {
            if self.unique {
                ErrorKind::UniqueViolation
            } else {
                ErrorKind::ForeignKeyViolation
            }
        }
    }

    fn failed_insert(number: u16, unique: bool) -> Result<(), sqlx::Error> {
        Err(sqlx::Error::Database(Box::new(MySqlFailure { number, unique })))
    }

    #[test]
    fn duplicate_nonce_insert_is_already_claimed() {
        // ER_DUP_ENTRY
        assert_eq!(
            claim_outcome(failed_insert(1062, true)).unwrap(),
            ClaimOutcome::AlreadyClaimed
        );
        assert_eq!(claim_outcome(Ok(())).unwrap(), ClaimOutcome::Claimed);
    }

    #[test]
    fn other_insert_failures_are_store_errors() {
        // ER_NO_REFERENCED_ROW_2 shares SQLSTATE 23000 but is not a replay.
        assert!(matches!(
            claim_outcome(failed_insert(1452, false)),
            Err(StoreError::Database(sqlx::Error::Database(_)))
        ));
        assert!(matches!(
            claim_outcome(Err(sqlx::Error::PoolTimedOut)),
            Err(StoreError::Database(sqlx::Error::PoolTimedOut))
        ));
    }

    fn guard() -> MokaReplayGuard {
        MokaReplayGuard::new(chrono::Duration::seconds(60))
    }

    #[actix_web::test]
    async fn first_claim_wins_and_later_ones_see_it() {
        let guard = guard();
        let expiry = Utc::now() + chrono::Duration::hours(72);

        assert_eq!(guard.claim("n-1", expiry).await.unwrap(), ClaimOutcome::Claimed);
        for _ in 0..3 {
            assert_eq!(
                guard.claim("n-1", expiry).await.unwrap(),
                ClaimOutcome::AlreadyClaimed
            );
        }
        assert_eq!(guard.claim("n-2", expiry).await.unwrap(), ClaimOutcome::Claimed);
    }

    #[actix_web::test]
    async fn concurrent_claims_yield_exactly_one_winner() {
        let guard = guard();
        let expiry = Utc::now() + chrono::Duration::hours(1);

        let outcomes = join_all((0..32).map(|_| guard.claim("shared", expiry))).await;
        let claimed = outcomes
            .iter()
            .filter(|o| matches!(o, Ok(ClaimOutcome::Claimed)))
            .count();
        let replayed = outcomes
            .iter()
            .filter(|o| matches!(o, Ok(ClaimOutcome::AlreadyClaimed)))
            .count();

        assert_eq!(claimed, 1);
        assert_eq!(replayed, 31);
    }

    #[actix_web::test]
    async fn purge_keeps_records_of_live_tokens() {
        let guard = guard();
        let expiry = Utc::now() + chrono::Duration::hours(1);
        guard.claim("live", expiry).await.unwrap();

        guard.purge_expired(Utc::now()).await.unwrap();

        assert_eq!(
            guard.claim("live", expiry).await.unwrap(),
            ClaimOutcome::AlreadyClaimed
        );
    }
}

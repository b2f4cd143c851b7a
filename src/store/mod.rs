use std::future::Future;
use std::time::Duration;

use actix_web::rt::time::timeout;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::StoreError;
use crate::model::approval_log::ApprovalLog;
use crate::model::leave_request::{DecisionMeta, LeaveRequest, LeaveStatus};

pub mod leave_store;
pub mod replay_guard;

/// Durable leave records. Decisions only go through the conditional update.
#[async_trait]
pub trait LeaveStore: Send + Sync {
    async fn get(&self, id: u64) -> Result<Option<LeaveRequest>, StoreError>;

    /// Writes `to` and the decision metadata only if the stored status is still `from`,
    /// appending one approval log entry in the same transaction.
    /// Returns whether the row changed; nothing is logged when it did not.
    async fn conditional_update_status(
        &self,
        id: u64,
        from: LeaveStatus,
        to: LeaveStatus,
        meta: &DecisionMeta,
    ) -> Result<bool, StoreError>;

    /// Approval log entries for a request, oldest first.
    async fn approval_logs(&self, leave_id: u64) -> Result<Vec<ApprovalLog>, StoreError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOutcome {
    Claimed,
    AlreadyClaimed,
}

/// Consumed action-token nonces.
#[async_trait]
pub trait ReplayGuard: Send + Sync {
    /// Atomically records `nonce`. Exactly one concurrent caller sees `Claimed`.
    /// The record outlives `expires_at`.
    async fn claim(&self, nonce: &str, expires_at: DateTime<Utc>)
    -> Result<ClaimOutcome, StoreError>;

    /// Drops records whose retention ended before `now`. Returns how many went.
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError>;
}

/// Runs a store call under `limit`; running out of time is `StoreError::Timeout`.
pub async fn bounded<T, F>(limit: Duration, call: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    timeout(limit, call).await.unwrap_or(Err(StoreError::Timeout))
}

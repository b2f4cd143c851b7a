use async_trait::async_trait;
use sqlx::MySqlPool;

use crate::error::StoreError;
use crate::model::approval_log::{ApprovalLog, ApprovalLogRow};
use crate::model::leave_request::{DecisionMeta, LeaveRequest, LeaveRow, LeaveStatus};
use crate::store::LeaveStore;

pub struct MySqlLeaveStore {
    pool: MySqlPool,
}

impl MySqlLeaveStore {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

/// The conditional UPDATE matches on id and status, so at most one row moves.
fn decision_written(rows_affected: u64) -> bool {
    rows_affected == 1
}

#[async_trait]
impl LeaveStore for MySqlLeaveStore {
    async fn get(&self, id: u64) -> Result<Option<LeaveRequest>, StoreError> {
        let row = sqlx::query_as::<_, LeaveRow>(
            r#"
            SELECT
                id,
                employee_id,
                manager_id,
                start_date,
                end_date,
                leave_type,
                reason,
                status,
                decided_by,
                decided_at,
                decision_source,
                decision_comment,
                created_at
            FROM leave_requests
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(LeaveRequest::try_from).transpose()
    }

    async fn conditional_update_status(
        &self,
        id: u64,
        from: LeaveStatus,
        to: LeaveStatus,
        meta: &DecisionMeta,
    ) -> Result<bool, StoreError> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE leave_requests
            SET status = ?,
                decided_by = ?,
                decided_at = ?,
                decision_source = ?,
                decision_comment = ?
            WHERE id = ?
            AND status = ?
            "#,
        )
        .bind(to.to_string())
        .bind(meta.decided_by)
        .bind(meta.decided_at)
        .bind(meta.source.to_string())
        .bind(meta.comment.as_deref())
        .bind(id)
        .bind(from.to_string())
        .execute(&mut *tx)
        .await?;

        if !decision_written(result.rows_affected()) {
            tx.rollback().await?;
            return Ok(false);
        }

        let log = ApprovalLog::record(id, to, meta);
        sqlx::query(
            r#"
            INSERT INTO leave_approval_logs
                (log_id, leave_id, decision, actor_id, source, comment, ip_address, user_agent, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&log.log_id)
        .bind(log.leave_id)
        .bind(log.decision.to_string())
        .bind(log.actor_id)
        .bind(log.source.to_string())
        .bind(log.comment.as_deref())
        .bind(log.ip_address.as_deref())
        .bind(log.user_agent.as_deref())
        .bind(log.created_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn approval_logs(&self, leave_id: u64) -> Result<Vec<ApprovalLog>, StoreError> {
        let rows = sqlx::query_as::<_, ApprovalLogRow>(
            r#"
            SELECT
                log_id,
                leave_id,
                decision,
                actor_id,
                source,
                comment,
                ip_address,
                user_agent,
                created_at
            FROM leave_approval_logs
            WHERE leave_id = ?
            ORDER BY created_at, log_id
            "#,
        )
        .bind(leave_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(ApprovalLog::try_from).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_a_single_moved_row_counts_as_written() {
        assert!(decision_written(1));
        // Status no longer matched, or the id is gone.
        assert!(!decision_written(0));
    }
}

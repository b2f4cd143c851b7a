use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::StoreError;
use crate::model::leave_request::{DecisionMeta, DecisionSource, LeaveStatus};

/// One applied decision, written in the same transaction as the status change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct ApprovalLog {
    #[schema(example = "0b6f3a9e-8f0e-4c1b-9c55-0d7c4f0d2a11")]
    pub log_id: String,
    #[schema(example = 1)]
    pub leave_id: u64,
    pub decision: LeaveStatus,
    #[schema(example = 42)]
    pub actor_id: u64,
    pub source: DecisionSource,
    pub comment: Option<String>,
    #[schema(example = "203.0.113.9")]
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    #[schema(format = "date-time", value_type = String)]
    pub created_at: DateTime<Utc>,
}

impl ApprovalLog {
    pub fn record(leave_id: u64, decision: LeaveStatus, meta: &DecisionMeta) -> Self {
        Self {
            log_id: Uuid::new_v4().to_string(),
            leave_id,
            decision,
            actor_id: meta.decided_by,
            source: meta.source,
            comment: meta.comment.clone(),
            ip_address: meta.client.ip_address.clone(),
            user_agent: meta.client.user_agent.clone(),
            created_at: meta.decided_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub struct ApprovalLogRow {
    pub log_id: String,
    pub leave_id: u64,
    pub decision: String,
    pub actor_id: u64,
    pub source: String,
    pub comment: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<ApprovalLogRow> for ApprovalLog {
    type Error = StoreError;

    fn try_from(row: ApprovalLogRow) -> Result<Self, Self::Error> {
        let corrupt = |column: &str, value: &str| {
            StoreError::Corrupt(format!("approval log {}: bad {column} `{value}`", row.log_id))
        };
        let decision = row
            .decision
            .parse()
            .map_err(|_| corrupt("decision", &row.decision))?;
        let source = row
            .source
            .parse()
            .map_err(|_| corrupt("source", &row.source))?;

        Ok(ApprovalLog {
            log_id: row.log_id,
            leave_id: row.leave_id,
            decision,
            actor_id: row.actor_id,
            source,
            comment: row.comment,
            ip_address: row.ip_address,
            user_agent: row.user_agent,
            created_at: row.created_at,
        })
    }
}

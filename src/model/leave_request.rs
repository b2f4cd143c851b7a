use chrono::{DateTime, Datelike, NaiveDate, Utc, Weekday};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use utoipa::ToSchema;

use crate::error::StoreError;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, ToSchema,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum LeaveStatus {
    Pending,
    Approved,
    Rejected,
}

impl LeaveStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, LeaveStatus::Pending)
    }

    /// Only Pending moves, and only to a terminal status.
    pub fn can_transition_to(self, next: LeaveStatus) -> bool {
        self == LeaveStatus::Pending && next.is_terminal()
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, ToSchema,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum LeaveKind {
    Annual,
    Sick,
    Unpaid,
    Medical,
    Emergency,
}

/// The decision an action token (or a dashboard button) asks for.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, ToSchema,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Action {
    Approve,
    Reject,
}

impl Action {
    pub fn target_status(self) -> LeaveStatus {
        match self {
            Action::Approve => LeaveStatus::Approved,
            Action::Reject => LeaveStatus::Rejected,
        }
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, ToSchema,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum DecisionSource {
    Email,
    Dashboard,
}

/// Where a decision came from, as reported by the request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientInfo {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

/// Written together with the status change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecisionMeta {
    pub decided_by: u64,
    pub decided_at: DateTime<Utc>,
    pub source: DecisionSource,
    pub comment: Option<String>,
    pub client: ClientInfo,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct LeaveRequest {
    #[schema(example = 1)]
    pub id: u64,
    #[schema(example = 1000)]
    pub employee_id: u64,
    #[schema(example = 42)]
    pub manager_id: u64,
    #[schema(example = "2026-01-05", format = "date", value_type = String)]
    pub start_date: NaiveDate,
    #[schema(example = "2026-01-09", format = "date", value_type = String)]
    pub end_date: NaiveDate,
    pub leave_kind: LeaveKind,
    pub reason: String,
    pub status: LeaveStatus,
    pub decided_by: Option<u64>,
    #[schema(format = "date-time", value_type = Option<String>)]
    pub decided_at: Option<DateTime<Utc>>,
    pub decision_source: Option<DecisionSource>,
    pub decision_comment: Option<String>,
    #[schema(format = "date-time", value_type = String)]
    pub created_at: DateTime<Utc>,
}

impl LeaveRequest {
    /// Weekdays in the inclusive date range, never less than one.
    pub fn working_days(&self) -> u32 {
        let mut days = 0;
        let mut current = self.start_date;
        while current <= self.end_date {
            if !matches!(current.weekday(), Weekday::Sat | Weekday::Sun) {
                days += 1;
            }
            match current.succ_opt() {
                Some(next) => current = next,
                None => break,
            }
        }
        days.max(1)
    }

    /// True when the request already carries exactly this decision by this actor.
    pub fn is_decided_as(&self, action: Action, actor: u64) -> bool {
        self.status == action.target_status() && self.decided_by == Some(actor)
    }

    pub fn with_decision(mut self, status: LeaveStatus, meta: DecisionMeta) -> Self {
        self.status = status;
        self.decided_by = Some(meta.decided_by);
        self.decided_at = Some(meta.decided_at);
        self.decision_source = Some(meta.source);
        self.decision_comment = meta.comment;
        self
    }
}

/// Raw `leave_requests` row; enum columns are stored as lowercase strings.
#[derive(Debug, sqlx::FromRow)]
pub struct LeaveRow {
    pub id: u64,
    pub employee_id: u64,
    pub manager_id: u64,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub leave_type: String,
    pub reason: Option<String>,
    pub status: String,
    pub decided_by: Option<u64>,
    pub decided_at: Option<DateTime<Utc>>,
    pub decision_source: Option<String>,
    pub decision_comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

fn parse_column<T: std::str::FromStr>(id: u64, column: &str, value: &str) -> Result<T, StoreError> {
    value
        .parse()
        .map_err(|_| StoreError::Corrupt(format!("leave {id}: bad {column} `{value}`")))
}

impl TryFrom<LeaveRow> for LeaveRequest {
    type Error = StoreError;

    fn try_from(row: LeaveRow) -> Result<Self, Self::Error> {
        let decision_source = row
            .decision_source
            .as_deref()
            .map(|s| parse_column(row.id, "decision_source", s))
            .transpose()?;

        Ok(LeaveRequest {
            id: row.id,
            employee_id: row.employee_id,
            manager_id: row.manager_id,
            start_date: row.start_date,
            end_date: row.end_date,
            leave_kind: parse_column(row.id, "leave_type", &row.leave_type)?,
            reason: row.reason.unwrap_or_default(),
            status: parse_column(row.id, "status", &row.status)?,
            decided_by: row.decided_by,
            decided_at: row.decided_at,
            decision_source,
            decision_comment: row.decision_comment,
            created_at: row.created_at,
        })
    }
}

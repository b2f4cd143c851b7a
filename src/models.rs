use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::model::approval_log::ApprovalLog;
use crate::model::leave_request::{Action, LeaveKind, LeaveRequest, LeaveStatus};

/// Dashboard session token, issued by the login service.
#[derive(Debug, Serialize, Deserialize)]
pub struct SessionClaims {
    pub user_id: u64,
    pub sub: String,
    pub role: u8, // role id
    pub exp: usize,
    pub jti: String,
}

/// Fields of the in-email approve/reject form.
#[derive(Debug, Deserialize, ToSchema)]
pub struct ActionForm {
    /// Signed action token from the hidden form input
    pub token: String,
    #[schema(example = "Enjoy the time off")]
    /// Optional note for the employee
    pub comment: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct ActionStatusQuery {
    /// Signed action token embedded in the email
    pub token: String,
}

#[derive(Debug, Deserialize, Default, ToSchema)]
pub struct DecisionBody {
    #[schema(example = "Approved in 1:1")]
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ReplyCategory {
    Success,
    UserError,
    ServerError,
}

/// Envelope the email runtime swaps into the message after a submission.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[schema(example = json!({
    "status": "success",
    "category": "success",
    "code": "approved",
    "message": "Leave request approved.",
    "leave_id": 1,
    "decision": "approved"
}))]
pub struct ActionReply {
    /// `success` or `error`, what the runtime picks a template by
    #[schema(value_type = String, example = "success")]
    pub status: &'static str,
    pub category: ReplyCategory,
    #[schema(value_type = String, example = "approved")]
    pub code: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub leave_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decision: Option<LeaveStatus>,
}

impl ActionReply {
    pub fn success(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status: "success",
            category: ReplyCategory::Success,
            code,
            message: message.into(),
            leave_id: None,
            decision: None,
        }
    }

    pub fn user_error(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status: "error",
            category: ReplyCategory::UserError,
            ..Self::success(code, message)
        }
    }

    pub fn server_error(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status: "error",
            category: ReplyCategory::ServerError,
            ..Self::success(code, message)
        }
    }

    pub fn for_leave(mut self, leave_id: u64, decision: Option<LeaveStatus>) -> Self {
        self.leave_id = Some(leave_id);
        self.decision = decision;
        self
    }
}

/// One row of the status list shown inside the email.
#[derive(Debug, Serialize, ToSchema)]
pub struct ActionStatusItem {
    #[schema(example = 1)]
    pub leave_id: u64,
    pub status: LeaveStatus,
    pub leave_kind: LeaveKind,
    #[schema(example = "2026-01-05", format = "date", value_type = String)]
    pub start_date: NaiveDate,
    #[schema(example = "2026-01-09", format = "date", value_type = String)]
    pub end_date: NaiveDate,
    #[schema(example = 5)]
    pub working_days: u32,
    /// The action this particular link performs
    pub action: Action,
    /// False once the request is decided
    pub actionable: bool,
    #[schema(format = "date-time", value_type = Option<String>)]
    pub decided_at: Option<DateTime<Utc>>,
}

impl ActionStatusItem {
    pub fn new(leave: &LeaveRequest, action: Action) -> Self {
        Self {
            leave_id: leave.id,
            status: leave.status,
            leave_kind: leave.leave_kind,
            start_date: leave.start_date,
            end_date: leave.end_date,
            working_days: leave.working_days(),
            action,
            actionable: !leave.status.is_terminal(),
            decided_at: leave.decided_at,
        }
    }
}

/// List-component shape: the runtime reads `items`.
#[derive(Debug, Serialize, ToSchema)]
pub struct ActionStatusReply {
    pub items: Vec<ActionStatusItem>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ActionTokensResponse {
    #[schema(example = 1)]
    pub leave_id: u64,
    /// User the decision will be recorded against
    #[schema(example = 42)]
    pub actor_id: u64,
    pub approve_token: String,
    pub reject_token: String,
    #[schema(format = "date-time", value_type = String)]
    pub expires_at: DateTime<Utc>,
    /// Whether the action email went out; only the designated manager's tokens are mailed
    pub emailed: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ApprovalLogsResponse {
    #[schema(example = 1)]
    pub leave_id: u64,
    pub current_status: LeaveStatus,
    pub is_action_taken: bool,
    pub approval_logs: Vec<ApprovalLog>,
    #[schema(example = 1)]
    pub total_actions: usize,
}

use async_trait::async_trait;
use chrono::Duration;
use tracing::info;

use crate::auth::action_token::{ActionTokenService, ActionTokens};
use crate::config::Config;
use crate::error::{MintError, NotifyError};
use crate::model::leave_request::{Action, LeaveRequest};

/// Outbound mail. Delivery itself lives outside this service.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Action email to the manager, carrying the approve and reject tokens.
    async fn request_decision(
        &self,
        leave: &LeaveRequest,
        tokens: &ActionTokens,
    ) -> Result<(), NotifyError>;

    /// Outcome email to the employee.
    async fn notify_decision(&self, leave: &LeaveRequest, decision: Action)
    -> Result<(), NotifyError>;
}

/// Records what would be mailed as structured log events. Tokens are never logged.
pub struct TracingNotifier {
    mail_from: String,
    action_url: String,
    status_url: String,
    dashboard_url: String,
}

impl TracingNotifier {
    pub fn new(config: &Config) -> Self {
        Self {
            mail_from: config.mail_from.clone(),
            action_url: config.action_url(),
            status_url: config.status_url(),
            dashboard_url: config.dashboard_url(),
        }
    }
}

#[async_trait]
impl Notifier for TracingNotifier {
    async fn request_decision(
        &self,
        leave: &LeaveRequest,
        tokens: &ActionTokens,
    ) -> Result<(), NotifyError> {
        info!(
            leave_id = leave.id,
            manager_id = leave.manager_id,
            employee_id = leave.employee_id,
            leave_kind = %leave.leave_kind,
            working_days = leave.working_days(),
            expires_at = %tokens.expires_at,
            from = %self.mail_from,
            action_url = %self.action_url,
            status_url = %self.status_url,
            dashboard_url = %self.dashboard_url,
            "Leave action email queued"
        );
        Ok(())
    }

    async fn notify_decision(
        &self,
        leave: &LeaveRequest,
        decision: Action,
    ) -> Result<(), NotifyError> {
        info!(
            leave_id = leave.id,
            employee_id = leave.employee_id,
            decision = %decision.target_status(),
            source = ?leave.decision_source,
            from = %self.mail_from,
            "Leave decision email queued"
        );
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error(transparent)]
    Mint(#[from] MintError),

    #[error(transparent)]
    Notify(#[from] NotifyError),
}

/// Mints both action tokens for the request's manager and mails them to that manager.
pub async fn send_action_request(
    tokens: &ActionTokenService,
    notifier: &dyn Notifier,
    leave: &LeaveRequest,
    ttl: Duration,
) -> Result<ActionTokens, DispatchError> {
    let pair = tokens.issue_pair(leave, leave.manager_id, ttl)?;
    notifier.request_decision(leave, &pair).await?;
    Ok(pair)
}

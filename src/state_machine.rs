use std::sync::Arc;
use std::time::Duration;

use actix_web::rt::time::timeout;
use chrono::Utc;
use tracing::{info, instrument, warn};

use crate::error::StoreError;
use crate::model::leave_request::{
    Action, ClientInfo, DecisionMeta, DecisionSource, LeaveRequest, LeaveStatus,
};
use crate::notify::Notifier;
use crate::store::{LeaveStore, bounded};

const MAX_COMMENT_CHARS: usize = 1000;

#[derive(Debug, Clone)]
pub struct DecisionCommand {
    pub leave_id: u64,
    pub action: Action,
    pub actor: u64,
    pub source: DecisionSource,
    pub comment: Option<String>,
    pub client: ClientInfo,
    /// Status the request must still have when the decision is written
    pub expected: LeaveStatus,
}

impl DecisionCommand {
    pub fn new(leave_id: u64, action: Action, actor: u64, source: DecisionSource) -> Self {
        Self {
            leave_id,
            action,
            actor,
            source,
            comment: None,
            client: ClientInfo::default(),
            expected: LeaveStatus::Pending,
        }
    }

    /// Blank comments are dropped, long ones truncated.
    pub fn with_comment(mut self, comment: Option<String>) -> Self {
        self.comment = comment
            .map(|c| c.trim().chars().take(MAX_COMMENT_CHARS).collect::<String>())
            .filter(|c| !c.is_empty());
        self
    }

    pub fn with_client(mut self, client: ClientInfo) -> Self {
        self.client = client;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// This call wrote the decision.
    Applied(LeaveRequest),
    /// The request was already decided; carries what is stored now.
    Conflict(LeaveRequest),
    NotFound,
}

/// Pending → Approved | Rejected, written once through the store's conditional update
/// together with its approval log entry.
pub struct LeaveStateMachine {
    store: Arc<dyn LeaveStore>,
    notifier: Arc<dyn Notifier>,
    /// Bound on each store call and on the outcome notification
    call_timeout: Duration,
}

impl LeaveStateMachine {
    pub fn new(
        store: Arc<dyn LeaveStore>,
        notifier: Arc<dyn Notifier>,
        call_timeout: Duration,
    ) -> Self {
        Self {
            store,
            notifier,
            call_timeout,
        }
    }

    #[instrument(
        name = "apply_decision",
        skip(self, cmd),
        fields(leave_id = cmd.leave_id, action = %cmd.action, source = %cmd.source)
    )]
    pub async fn apply_decision(&self, cmd: DecisionCommand) -> Result<Transition, StoreError> {
        let target = cmd.action.target_status();

        let Some(current) = bounded(self.call_timeout, self.store.get(cmd.leave_id)).await? else {
            return Ok(Transition::NotFound);
        };
        if current.status != cmd.expected || !cmd.expected.can_transition_to(target) {
            info!(status = %current.status, "Leave request already settled");
            return Ok(Transition::Conflict(current));
        }

        let meta = DecisionMeta {
            decided_by: cmd.actor,
            decided_at: Utc::now(),
            source: cmd.source,
            comment: cmd.comment,
            client: cmd.client,
        };

        let written = bounded(
            self.call_timeout,
            self.store
                .conditional_update_status(cmd.leave_id, cmd.expected, target, &meta),
        )
        .await?;

        if written {
            let decided = current.with_decision(target, meta);
            info!(decided_by = cmd.actor, status = %target, "Leave request decided");
            self.dispatch_outcome(&decided, cmd.action).await;
            return Ok(Transition::Applied(decided));
        }

        // Another writer got there between our read and our write.
        match bounded(self.call_timeout, self.store.get(cmd.leave_id)).await? {
            Some(settled) => {
                info!(status = %settled.status, "Lost decision race");
                Ok(Transition::Conflict(settled))
            }
            None => Ok(Transition::NotFound),
        }
    }

    /// Delivery failures are logged; the decision stands.
    async fn dispatch_outcome(&self, leave: &LeaveRequest, action: Action) {
        match timeout(
            self.call_timeout,
            self.notifier.notify_decision(leave, action),
        )
        .await
        {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, leave_id = leave.id, "Decision notification failed"),
            Err(_) => warn!(leave_id = leave.id, "Decision notification timed out"),
        }
    }
}

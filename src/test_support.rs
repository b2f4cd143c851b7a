//! In-memory doubles and fixtures shared by unit and handler tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};

use crate::auth::action_token::ActionTokens;
use crate::config::{ActionTokenConfig, AmpConfig, Config, ReplayBackend};
use crate::error::{NotifyError, StoreError};
use crate::model::approval_log::ApprovalLog;
use crate::model::leave_request::{
    Action, DecisionMeta, DecisionSource, LeaveKind, LeaveRequest, LeaveStatus,
};
use crate::notify::Notifier;
use crate::store::LeaveStore;

pub const GMAIL: &str = "https://mail.google.com";
pub const SENDER: &str = "leave-bot@hr.example.com";
pub const SESSION_SECRET: &str = "dashboard-session-secret-for-tests";

pub fn test_config() -> Config {
    Config {
        database_url: "mysql://unused".into(),
        server_addr: "127.0.0.1:0".into(),
        api_prefix: "/api".into(),
        log_dir: "logs".into(),
        session_jwt_secret: SESSION_SECRET.into(),
        action_token: ActionTokenConfig {
            secret: "action-token-secret-of-at-least-32-bytes".into(),
            issuer: "hrm".into(),
            audience: "hrm-leave-email-action".into(),
            ttl: chrono::Duration::hours(72),
            clock_skew: chrono::Duration::seconds(60),
        },
        amp: AmpConfig {
            allowed_origins: vec![GMAIL.into(), "https://outlook.office.com".into()],
            allowed_senders: vec![SENDER.into()],
            preflight_max_age_secs: 600,
        },
        replay_backend: ReplayBackend::Memory,
        replay_purge_interval: Duration::from_secs(3600),
        store_timeout: Duration::from_millis(500),
        api_base_url: "https://hr.example.com".into(),
        frontend_base_url: "https://app.example.com".into(),
        mail_from: SENDER.into(),
        rate_action_per_min: 120,
        rate_protected_per_min: 1000,
    }
}

pub fn pending_leave(id: u64, manager_id: u64) -> LeaveRequest {
    LeaveRequest {
        id,
        employee_id: 1000 + id,
        manager_id,
        start_date: NaiveDate::from_ymd_opt(2026, 1, 5).unwrap(),
        end_date: NaiveDate::from_ymd_opt(2026, 1, 9).unwrap(),
        leave_kind: LeaveKind::Annual,
        reason: "Family vacation".into(),
        status: LeaveStatus::Pending,
        decided_by: None,
        decided_at: None,
        decision_source: None,
        decision_comment: None,
        created_at: Utc::now(),
    }
}

#[derive(Default)]
pub struct MemoryLeaveStore {
    rows: Mutex<HashMap<u64, LeaveRequest>>,
    logs: Mutex<Vec<ApprovalLog>>,
    /// Applied right before the next conditional update, as if another writer won.
    interleaved: Mutex<Option<(u64, LeaveStatus, u64)>>,
    unavailable: AtomicBool,
    updates: AtomicUsize,
}

impl MemoryLeaveStore {
    pub fn with(leaves: Vec<LeaveRequest>) -> Self {
        let store = Self::default();
        store
            .rows
            .lock()
            .unwrap()
            .extend(leaves.into_iter().map(|l| (l.id, l)));
        store
    }

    pub fn snapshot(&self, id: u64) -> Option<LeaveRequest> {
        self.rows.lock().unwrap().get(&id).cloned()
    }

    /// Successful conditional updates so far.
    pub fn update_count(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn interleave_decision(&self, id: u64, status: LeaveStatus, decided_by: u64) {
        *self.interleaved.lock().unwrap() = Some((id, status, decided_by));
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Database(sqlx::Error::PoolTimedOut));
        }
        Ok(())
    }
}

#[async_trait]
impl LeaveStore for MemoryLeaveStore {
    async fn get(&self, id: u64) -> Result<Option<LeaveRequest>, StoreError> {
        self.check_available()?;
        Ok(self.snapshot(id))
    }

    async fn conditional_update_status(
        &self,
        id: u64,
        from: LeaveStatus,
        to: LeaveStatus,
        meta: &DecisionMeta,
    ) -> Result<bool, StoreError> {
        self.check_available()?;
        let mut rows = self.rows.lock().unwrap();

        if let Some((other_id, status, decided_by)) = self.interleaved.lock().unwrap().take() {
            if let Some(row) = rows.get_mut(&other_id) {
                row.status = status;
                row.decided_by = Some(decided_by);
                row.decision_source = Some(DecisionSource::Dashboard);
            }
        }

        match rows.get_mut(&id) {
            Some(row) if row.status == from => {
                *row = row.clone().with_decision(to, meta.clone());
                self.logs.lock().unwrap().push(ApprovalLog::record(id, to, meta));
                self.updates.fetch_add(1, Ordering::SeqCst);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn approval_logs(&self, leave_id: u64) -> Result<Vec<ApprovalLog>, StoreError> {
        self.check_available()?;
        Ok(self
            .logs
            .lock()
            .unwrap()
            .iter()
            .filter(|log| log.leave_id == leave_id)
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    requested: Mutex<Vec<u64>>,
    decisions: Mutex<Vec<(u64, Action)>>,
    fail: bool,
}

impl RecordingNotifier {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn requested(&self) -> Vec<u64> {
        self.requested.lock().unwrap().clone()
    }

    pub fn decisions(&self) -> Vec<(u64, Action)> {
        self.decisions.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn request_decision(
        &self,
        leave: &LeaveRequest,
        _tokens: &ActionTokens,
    ) -> Result<(), NotifyError> {
        self.requested.lock().unwrap().push(leave.id);
        Ok(())
    }

    async fn notify_decision(
        &self,
        leave: &LeaveRequest,
        decision: Action,
    ) -> Result<(), NotifyError> {
        if self.fail {
            return Err(NotifyError::Delivery("smtp relay refused".into()));
        }
        self.decisions.lock().unwrap().push((leave.id, decision));
        Ok(())
    }
}

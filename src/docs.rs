use crate::model::approval_log::ApprovalLog;
use crate::model::leave_request::{Action, DecisionSource, LeaveKind, LeaveStatus};
use crate::models::{
    ActionForm, ActionReply, ActionStatusItem, ActionStatusReply, ActionTokensResponse,
    ApprovalLogsResponse, DecisionBody, ReplyCategory,
};
use utoipa::Modify;
use utoipa::OpenApi;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "HRM Leave Mail API",
        version = "1.0.0",
        description = r#"
## Leave decisions from interactive email

Managers approve or reject leave requests straight from an interactive (AMP)
email, or from the HR dashboard.

### 🔹 Email actions
- `POST /leave/action` takes the signed, single-use action token from the
  email form and records the decision
- `GET /leave/action/status` shows the current state of the request behind a link
- Only allow-listed email runtimes and senders are answered; every reply is a
  JSON envelope the email renders in place

### 🔐 Dashboard
Endpoints under the API prefix need a **JWT Bearer** session token.
The designated manager, HR or Admin may decide and reissue action tokens.
Every applied decision is kept in the request's approval log, readable by the
employee and by anyone who may decide on it.

---
Built with **Rust**, **Actix Web**, **SQLx**, and **Utoipa**.
"#,
    ),
    paths(
        crate::api::email_action::submit_action,
        crate::api::email_action::action_status,

        crate::api::leave_request::approve_leave,
        crate::api::leave_request::reject_leave,
        crate::api::leave_request::issue_action_tokens,
        crate::api::leave_request::approval_logs
    ),
    components(
        schemas(
            ActionForm,
            ActionReply,
            ReplyCategory,
            ActionStatusItem,
            ActionStatusReply,
            ActionTokensResponse,
            ApprovalLog,
            ApprovalLogsResponse,
            DecisionBody,
            DecisionSource,
            Action,
            LeaveKind,
            LeaveStatus
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Email actions", description = "Endpoints called from the interactive leave email"),
        (name = "Leave", description = "Dashboard leave decision APIs"),
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

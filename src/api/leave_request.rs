use crate::api::client_info;
use crate::auth::action_token::ActionTokenService;
use crate::auth::auth::AuthUser;
use crate::config::Config;
use crate::error::StoreError;
use crate::model::leave_request::{Action, DecisionSource, LeaveRequest};
use crate::models::{ActionTokensResponse, ApprovalLogsResponse, DecisionBody};
use crate::notify::{Notifier, send_action_request};
use crate::state_machine::{DecisionCommand, LeaveStateMachine, Transition};
use crate::store::{LeaveStore, bounded};
use actix_web::{HttpRequest, HttpResponse, Responder, web};

fn store_failure(e: StoreError, leave_id: u64) -> actix_web::Error {
    tracing::error!(error = %e, leave_id, "Leave store call failed");
    match e {
        StoreError::Timeout => actix_web::error::ErrorServiceUnavailable("Try again later"),
        _ => actix_web::error::ErrorInternalServerError("Internal Server Error"),
    }
}

/// Loads the request and checks the caller may decide on it.
async fn load_for_decider(
    auth: &AuthUser,
    config: &Config,
    store: &dyn LeaveStore,
    leave_id: u64,
) -> actix_web::Result<Result<LeaveRequest, HttpResponse>> {
    auth.require_manager_or_hr()?;

    let leave = bounded(config.store_timeout, store.get(leave_id))
        .await
        .map_err(|e| store_failure(e, leave_id))?;

    let Some(leave) = leave else {
        return Ok(Err(HttpResponse::NotFound().json(serde_json::json!({
            "message": "Leave request not found"
        }))));
    };

    if !auth.can_decide(&leave) {
        tracing::warn!(
            leave_id,
            user_id = auth.user_id,
            user = %auth.username,
            "Decision by non-approver refused"
        );
        return Err(actix_web::error::ErrorForbidden("Not the approving manager"));
    }

    Ok(Ok(leave))
}

async fn decide(
    req: HttpRequest,
    auth: AuthUser,
    config: web::Data<Config>,
    store: web::Data<dyn LeaveStore>,
    machine: web::Data<LeaveStateMachine>,
    leave_id: u64,
    action: Action,
    body: Option<web::Json<DecisionBody>>,
) -> actix_web::Result<HttpResponse> {
    if let Err(resp) = load_for_decider(&auth, &config, store.get_ref(), leave_id).await? {
        return Ok(resp);
    }

    let comment = body.map(|b| b.into_inner()).unwrap_or_default().comment;
    let cmd = DecisionCommand::new(leave_id, action, auth.user_id, DecisionSource::Dashboard)
        .with_comment(comment)
        .with_client(client_info(&req));

    let transition = machine
        .apply_decision(cmd)
        .await
        .map_err(|e| store_failure(e, leave_id))?;

    match transition {
        Transition::Applied(leave) => {
            let message = match action {
                Action::Approve => "Leave approved",
                Action::Reject => "Leave rejected",
            };
            Ok(HttpResponse::Ok().json(serde_json::json!({
                "message": message,
                "status": leave.status
            })))
        }
        Transition::Conflict(leave) => Ok(HttpResponse::Conflict().json(serde_json::json!({
            "message": "Leave request already processed",
            "status": leave.status
        }))),
        Transition::NotFound => Ok(HttpResponse::NotFound().json(serde_json::json!({
            "message": "Leave request not found"
        }))),
    }
}

/* =========================
Approve leave (Manager/HR)
========================= */
/// Swagger doc for approve_leave endpoint
#[utoipa::path(
    put,
    path = "/api/leave/{leave_id}/approve",
    params(
        ("leave_id" = u64, Path, description = "ID of the leave request to approve")
    ),
    request_body(
        content = DecisionBody,
        description = "Optional comment for the employee",
        content_type = "application/json"
    ),
    responses(
        (status = 200, description = "Leave approved successfully", body = Object, example = json!({
            "message": "Leave approved",
            "status": "approved"
        })),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Leave request not found", body = Object, example = json!({
            "message": "Leave request not found"
        })),
        (status = 409, description = "Leave request already processed", body = Object, example = json!({
            "message": "Leave request already processed",
            "status": "rejected"
        }))
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Leave"
)]
pub async fn approve_leave(
    req: HttpRequest,
    auth: AuthUser,
    config: web::Data<Config>,
    store: web::Data<dyn LeaveStore>,
    machine: web::Data<LeaveStateMachine>,
    path: web::Path<u64>,
    body: Option<web::Json<DecisionBody>>,
) -> actix_web::Result<impl Responder> {
    decide(
        req,
        auth,
        config,
        store,
        machine,
        path.into_inner(),
        Action::Approve,
        body,
    )
    .await
}

/* =========================
Reject leave (Manager/HR)
========================= */
/// Swagger doc for reject_leave endpoint
#[utoipa::path(
    put,
    path = "/api/leave/{leave_id}/reject",
    params(
        ("leave_id" = u64, Path, description = "ID of the leave request to reject")
    ),
    request_body(
        content = DecisionBody,
        description = "Optional comment for the employee",
        content_type = "application/json"
    ),
    responses(
        (status = 200, description = "Leave rejected successfully", body = Object, example = json!({
            "message": "Leave rejected",
            "status": "rejected"
        })),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Leave request not found", body = Object, example = json!({
            "message": "Leave request not found"
        })),
        (status = 409, description = "Leave request already processed", body = Object, example = json!({
            "message": "Leave request already processed",
            "status": "approved"
        }))
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Leave"
)]
pub async fn reject_leave(
    req: HttpRequest,
    auth: AuthUser,
    config: web::Data<Config>,
    store: web::Data<dyn LeaveStore>,
    machine: web::Data<LeaveStateMachine>,
    path: web::Path<u64>,
    body: Option<web::Json<DecisionBody>>,
) -> actix_web::Result<impl Responder> {
    decide(
        req,
        auth,
        config,
        store,
        machine,
        path.into_inner(),
        Action::Reject,
        body,
    )
    .await
}

/* =========================
Reissue email action tokens
========================= */
/// Swagger doc for issue_action_tokens endpoint
#[utoipa::path(
    post,
    path = "/api/leave/{leave_id}/action-tokens",
    params(
        ("leave_id" = u64, Path, description = "ID of the pending leave request")
    ),
    responses(
        (status = 200, description = "Fresh tokens minted for the caller; mailed when the caller is the designated manager", body = ActionTokensResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Leave request not found"),
        (status = 409, description = "Leave request already processed")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Leave"
)]
pub async fn issue_action_tokens(
    auth: AuthUser,
    config: web::Data<Config>,
    tokens: web::Data<ActionTokenService>,
    store: web::Data<dyn LeaveStore>,
    notifier: web::Data<dyn Notifier>,
    path: web::Path<u64>,
) -> actix_web::Result<impl Responder> {
    let leave_id = path.into_inner();

    let leave = match load_for_decider(&auth, &config, store.get_ref(), leave_id).await? {
        Ok(leave) => leave,
        Err(resp) => return Ok(resp),
    };

    if leave.status.is_terminal() {
        return Ok(HttpResponse::Conflict().json(serde_json::json!({
            "message": "Leave request already processed",
            "status": leave.status
        })));
    }

    // Tokens carry the caller as actor. Only the manager's own tokens go to the manager's inbox.
    let emailed = auth.user_id == leave.manager_id;
    let pair = if emailed {
        send_action_request(&tokens, notifier.get_ref(), &leave, tokens.default_ttl())
            .await
            .map_err(|e| {
                tracing::error!(error = %e, leave_id, "Reissuing action email failed");
                actix_web::error::ErrorInternalServerError("Internal Server Error")
            })?
    } else {
        tokens
            .issue_pair(&leave, auth.user_id, tokens.default_ttl())
            .map_err(|e| {
                tracing::error!(error = %e, leave_id, "Minting action tokens failed");
                actix_web::error::ErrorInternalServerError("Internal Server Error")
            })?
    };

    tracing::info!(leave_id, user_id = auth.user_id, emailed, "Action tokens reissued");

    Ok(HttpResponse::Ok().json(ActionTokensResponse {
        leave_id,
        actor_id: auth.user_id,
        approve_token: pair.approve,
        reject_token: pair.reject,
        expires_at: pair.expires_at,
        emailed,
    }))
}

/* =========================
Approval history
========================= */
/// Swagger doc for approval_logs endpoint
#[utoipa::path(
    get,
    path = "/api/leave/{leave_id}/approval-logs",
    params(
        ("leave_id" = u64, Path, description = "ID of the leave request")
    ),
    responses(
        (status = 200, description = "Decisions recorded for the request, oldest first", body = ApprovalLogsResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Leave request not found")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Leave"
)]
pub async fn approval_logs(
    auth: AuthUser,
    config: web::Data<Config>,
    store: web::Data<dyn LeaveStore>,
    path: web::Path<u64>,
) -> actix_web::Result<impl Responder> {
    let leave_id = path.into_inner();

    let leave = bounded(config.store_timeout, store.get(leave_id))
        .await
        .map_err(|e| store_failure(e, leave_id))?;
    let Some(leave) = leave else {
        return Ok(HttpResponse::NotFound().json(serde_json::json!({
            "message": "Leave request not found"
        })));
    };

    if !auth.can_view_history(&leave) {
        return Err(actix_web::error::ErrorForbidden("Access denied"));
    }

    let logs = bounded(config.store_timeout, store.approval_logs(leave_id))
        .await
        .map_err(|e| store_failure(e, leave_id))?;

    Ok(HttpResponse::Ok().json(ApprovalLogsResponse {
        leave_id,
        current_status: leave.status,
        is_action_taken: leave.status.is_terminal(),
        total_actions: logs.len(),
        approval_logs: logs,
    }))
}

/// Routes relative to the `{api_prefix}/leave` scope.
pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg
        // /leave/{id}/approve
        .service(web::resource("/{id}/approve").route(web::put().to(approve_leave)))
        // /leave/{id}/reject
        .service(web::resource("/{id}/reject").route(web::put().to(reject_leave)))
        // /leave/{id}/action-tokens
        .service(web::resource("/{id}/action-tokens").route(web::post().to(issue_action_tokens)))
        // /leave/{id}/approval-logs
        .service(web::resource("/{id}/approval-logs").route(web::get().to(approval_logs)));
}

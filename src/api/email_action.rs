//! Endpoints the interactive leave email talks to.
//!
//! Every answer is an [`ActionReply`] envelope the email swaps into place, so
//! token problems and outages are rendered to the manager instead of
//! surfacing as transport errors. Only callers outside the origin allow-list
//! get a plain refusal.

use std::time::Duration;

use actix_web::http::{Method, StatusCode};
use actix_web::{Either, HttpRequest, HttpResponse, web};
use tracing::{error, info, instrument, warn};

use crate::api::amp::{self, AmpCaller};
use crate::api::client_info;
use crate::auth::action_token::{ActionTokenService, VerifiedAction};
use crate::config::Config;
use crate::error::TokenError;
use crate::model::leave_request::{Action, ClientInfo, DecisionSource, LeaveRequest};
use crate::models::{ActionForm, ActionReply, ActionStatusItem, ActionStatusQuery, ActionStatusReply};
use crate::state_machine::{DecisionCommand, LeaveStateMachine, Transition};
use crate::store::{ClaimOutcome, LeaveStore, ReplayGuard, bounded};

type ActionBody = Either<web::Form<ActionForm>, web::Json<ActionForm>>;

/// What became of one submission, before it is rendered for the email.
#[derive(Debug)]
enum ActionOutcome {
    Decided(LeaveRequest, Action),
    AlreadyDecided(LeaveRequest),
    NoLongerAvailable(u64),
    Token(TokenError),
    BadRequest,
    TryAgain,
}

impl ActionOutcome {
    fn status_code(&self) -> StatusCode {
        match self {
            ActionOutcome::Decided(..) => StatusCode::OK,
            ActionOutcome::AlreadyDecided(_) => StatusCode::CONFLICT,
            ActionOutcome::NoLongerAvailable(_) => StatusCode::NOT_FOUND,
            ActionOutcome::Token(TokenError::Expired) => StatusCode::GONE,
            ActionOutcome::Token(_) | ActionOutcome::BadRequest => StatusCode::BAD_REQUEST,
            ActionOutcome::TryAgain => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    fn envelope(&self) -> ActionReply {
        match self {
            ActionOutcome::Decided(leave, action) => {
                let (code, message) = match action {
                    Action::Approve => ("approved", "Leave request approved."),
                    Action::Reject => ("rejected", "Leave request rejected."),
                };
                ActionReply::success(code, message).for_leave(leave.id, Some(leave.status))
            }
            ActionOutcome::AlreadyDecided(leave) => ActionReply::user_error(
                "already_decided",
                format!("This leave request was already {}.", leave.status),
            )
            .for_leave(leave.id, Some(leave.status)),
            ActionOutcome::NoLongerAvailable(id) => ActionReply::user_error(
                "not_found",
                "This leave request is no longer available.",
            )
            .for_leave(*id, None),
            ActionOutcome::Token(TokenError::Expired) => ActionReply::user_error(
                "link_expired",
                "This link has expired. Please decide from the HR dashboard.",
            ),
            ActionOutcome::Token(_) => ActionReply::user_error(
                "invalid_link",
                "This link is not valid. Please decide from the HR dashboard.",
            ),
            ActionOutcome::BadRequest => ActionReply::user_error(
                "invalid_request",
                "The form submission could not be read.",
            ),
            ActionOutcome::TryAgain => ActionReply::server_error(
                "try_again",
                "Something went wrong on our side. Please try again in a moment.",
            ),
        }
    }

    fn respond(&self, caller: &AmpCaller) -> HttpResponse {
        caller.reply(self.status_code(), &self.envelope())
    }
}

fn verify_token(tokens: &ActionTokenService, token: &str) -> Result<VerifiedAction, ActionOutcome> {
    tokens.verify(token).map_err(|e| {
        match e {
            TokenError::BadSignature => {
                warn!(error = %e, "Action token signature rejected, possible tampering")
            }
            _ => info!(error = %e, "Action token refused"),
        }
        ActionOutcome::Token(e)
    })
}

/// Applies a decision and folds the state machine's answer into an outcome.
///
/// A conflict only counts as success when `retrying` a claimed token: then a
/// matching stored decision can only be this token's own earlier submission.
async fn apply(
    machine: &LeaveStateMachine,
    cmd: DecisionCommand,
    retrying: bool,
) -> ActionOutcome {
    let (action, actor, leave_id) = (cmd.action, cmd.actor, cmd.leave_id);

    match machine.apply_decision(cmd).await {
        Ok(Transition::Applied(leave)) => ActionOutcome::Decided(leave, action),
        Ok(Transition::Conflict(leave)) if retrying && leave.is_decided_as(action, actor) => {
            ActionOutcome::Decided(leave, action)
        }
        Ok(Transition::Conflict(leave)) => {
            info!(leave_id, status = %leave.status, "Leave request already decided");
            ActionOutcome::AlreadyDecided(leave)
        }
        Ok(Transition::NotFound) => ActionOutcome::NoLongerAvailable(leave_id),
        Err(e) => {
            error!(error = %e, leave_id, "Applying email decision failed");
            ActionOutcome::TryAgain
        }
    }
}

/// A replayed nonce. Answers the way the first submission was answered when
/// that one went through; re-drives the decision when it never landed.
async fn settle_replay(
    store: &dyn LeaveStore,
    machine: &LeaveStateMachine,
    cmd: DecisionCommand,
    limit: Duration,
) -> ActionOutcome {
    let leave_id = cmd.leave_id;

    match bounded(limit, store.get(leave_id)).await {
        Ok(Some(leave)) if leave.is_decided_as(cmd.action, cmd.actor) => {
            info!(leave_id, "Repeated submission of an applied decision");
            ActionOutcome::Decided(leave, cmd.action)
        }
        Ok(Some(leave)) if leave.status.is_terminal() => {
            info!(leave_id, status = %leave.status, "Replayed token for a decided request");
            ActionOutcome::AlreadyDecided(leave)
        }
        Ok(Some(_)) => {
            info!(leave_id, "Claimed token was never applied, retrying decision");
            apply(machine, cmd, true).await
        }
        Ok(None) => ActionOutcome::NoLongerAvailable(leave_id),
        Err(e) => {
            error!(error = %e, leave_id, "Reading leave request for replay failed");
            ActionOutcome::TryAgain
        }
    }
}

async fn decide(
    form: ActionForm,
    client: ClientInfo,
    tokens: &ActionTokenService,
    guard: &dyn ReplayGuard,
    store: &dyn LeaveStore,
    machine: &LeaveStateMachine,
    limit: Duration,
) -> ActionOutcome {
    let verified = match verify_token(tokens, &form.token) {
        Ok(v) => v,
        Err(outcome) => return outcome,
    };
    tracing::Span::current().record("leave_id", verified.leave_id);

    let claim = match bounded(limit, guard.claim(&verified.nonce, verified.expires_at)).await {
        Ok(claim) => claim,
        Err(e) => {
            error!(error = %e, nonce = %verified.nonce, "Claiming action token failed");
            return ActionOutcome::TryAgain;
        }
    };

    let cmd = DecisionCommand::new(
        verified.leave_id,
        verified.action,
        verified.actor,
        DecisionSource::Email,
    )
    .with_comment(form.comment)
    .with_client(client);

    match claim {
        ClaimOutcome::Claimed => apply(machine, cmd, false).await,
        ClaimOutcome::AlreadyClaimed => {
            info!(nonce = %verified.nonce, "Action token replayed");
            settle_replay(store, machine, cmd, limit).await
        }
    }
}

/* =========================
Submit decision from email
========================= */
/// Swagger doc for submit_action endpoint
#[utoipa::path(
    post,
    path = "/leave/action",
    request_body(
        content = ActionForm,
        description = "In-email approve/reject form",
        content_type = "application/x-www-form-urlencoded"
    ),
    params(
        ("AMP-Email-Sender" = Option<String>, Header, description = "Address the email was sent from"),
        ("__amp_source_origin" = Option<String>, Query, description = "Sender, older runtimes")
    ),
    responses(
        (status = 200, description = "Decision recorded", body = ActionReply),
        (status = 400, description = "Invalid link or form", body = ActionReply),
        (status = 403, description = "Origin or sender not allowed", body = ActionReply),
        (status = 404, description = "Leave request no longer available", body = ActionReply),
        (status = 409, description = "Leave request already decided", body = ActionReply),
        (status = 410, description = "Link expired", body = ActionReply),
        (status = 503, description = "Transient failure, try again", body = ActionReply)
    ),
    tag = "Email actions"
)]
#[instrument(name = "submit_action", skip_all, fields(leave_id))]
pub async fn submit_action(
    req: HttpRequest,
    body: Result<ActionBody, actix_web::Error>,
    config: web::Data<Config>,
    tokens: web::Data<ActionTokenService>,
    guard: web::Data<dyn ReplayGuard>,
    store: web::Data<dyn LeaveStore>,
    machine: web::Data<LeaveStateMachine>,
) -> HttpResponse {
    let caller = match AmpCaller::from_request(&req, &config.amp) {
        Ok(caller) => caller,
        Err(rejection) => return amp::reject(rejection),
    };

    let outcome = match body {
        Ok(Either::Left(form)) => Some(form.into_inner()),
        Ok(Either::Right(json)) => Some(json.into_inner()),
        Err(e) => {
            info!(error = %e, "Unreadable email action form");
            None
        }
    };
    let outcome = match outcome {
        Some(form) => {
            decide(
                form,
                client_info(&req),
                &tokens,
                guard.get_ref(),
                store.get_ref(),
                &machine,
                config.store_timeout,
            )
            .await
        }
        None => ActionOutcome::BadRequest,
    };

    outcome.respond(&caller)
}

/* =========================
Status of the request behind a link
========================= */
/// Swagger doc for action_status endpoint
#[utoipa::path(
    get,
    path = "/leave/action/status",
    params(ActionStatusQuery),
    responses(
        (status = 200, description = "Current state of the leave request", body = ActionStatusReply),
        (status = 400, description = "Invalid link", body = ActionReply),
        (status = 403, description = "Origin or sender not allowed", body = ActionReply),
        (status = 404, description = "Leave request no longer available", body = ActionReply),
        (status = 410, description = "Link expired", body = ActionReply),
        (status = 503, description = "Transient failure, try again", body = ActionReply)
    ),
    tag = "Email actions"
)]
#[instrument(name = "action_status", skip_all)]
pub async fn action_status(
    req: HttpRequest,
    query: Result<web::Query<ActionStatusQuery>, actix_web::Error>,
    config: web::Data<Config>,
    tokens: web::Data<ActionTokenService>,
    store: web::Data<dyn LeaveStore>,
) -> HttpResponse {
    let caller = match AmpCaller::from_request(&req, &config.amp) {
        Ok(caller) => caller,
        Err(rejection) => return amp::reject(rejection),
    };

    let Ok(query) = query else {
        return ActionOutcome::BadRequest.respond(&caller);
    };
    // Looking never claims the token.
    let verified = match verify_token(&tokens, &query.token) {
        Ok(v) => v,
        Err(outcome) => return outcome.respond(&caller),
    };

    match bounded(config.store_timeout, store.get(verified.leave_id)).await {
        Ok(Some(leave)) => caller.reply(
            StatusCode::OK,
            &ActionStatusReply {
                items: vec![ActionStatusItem::new(&leave, verified.action)],
            },
        ),
        Ok(None) => ActionOutcome::NoLongerAvailable(verified.leave_id).respond(&caller),
        Err(e) => {
            error!(error = %e, leave_id = verified.leave_id, "Reading leave status failed");
            ActionOutcome::TryAgain.respond(&caller)
        }
    }
}

/// CORS preflight for both email endpoints.
pub async fn preflight(req: HttpRequest, config: web::Data<Config>) -> HttpResponse {
    match AmpCaller::for_preflight(&req, &config.amp) {
        Ok(caller) => caller.preflight(config.amp.preflight_max_age_secs),
        Err(rejection) => amp::reject(rejection),
    }
}

/// Routes relative to the `/leave/action` scope.
pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("")
            .route(web::post().to(submit_action))
            .route(web::method(Method::OPTIONS).to(preflight)),
    )
    .service(
        web::resource("/status")
            .route(web::get().to(action_status))
            .route(web::method(Method::OPTIONS).to(preflight)),
    );
}

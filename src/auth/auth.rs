use crate::auth::jwt::verify_session_token;
use crate::config::Config;
use crate::model::{leave_request::LeaveRequest, role::Role};
use actix_web::{FromRequest, HttpRequest, dev::Payload, error::ErrorUnauthorized, web::Data};
use futures::future::{Ready, ready};

/// Dashboard user behind a bearer session token.
pub struct AuthUser {
    pub user_id: u64,
    pub username: String,
    pub role: Role,
}

impl FromRequest for AuthUser {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        let token = match req
            .headers()
            .get("Authorization")
            .and_then(|h| h.to_str().ok())
            .and_then(|h| h.strip_prefix("Bearer "))
        {
            Some(t) => t,
            None => return ready(Err(ErrorUnauthorized("Missing token"))),
        };

        let config = match req.app_data::<Data<Config>>() {
            Some(c) => c,
            None => {
                return ready(Err(
                    actix_web::error::ErrorInternalServerError("Config missing"),
                ))
            }
        };

        let claims = match verify_session_token(token, &config.session_jwt_secret) {
            Ok(c) => c,
            Err(_) => return ready(Err(ErrorUnauthorized("Invalid token"))),
        };

        let role = match Role::from_id(claims.role) {
            Some(r) => r,
            None => return ready(Err(ErrorUnauthorized("Invalid role"))),
        };

        ready(Ok(AuthUser {
            user_id: claims.user_id,
            username: claims.sub,
            role,
        }))
    }
}

impl AuthUser {
    pub fn require_manager_or_hr(&self) -> actix_web::Result<()> {
        if matches!(self.role, Role::Manager | Role::Hr | Role::Admin) {
            Ok(())
        } else {
            Err(actix_web::error::ErrorForbidden("Manager/HR only"))
        }
    }

    /// The designated manager, or HR/Admin on anyone's behalf.
    pub fn can_decide(&self, leave: &LeaveRequest) -> bool {
        self.role.overrides_manager()
            || (self.role == Role::Manager && leave.manager_id == self.user_id)
    }

    /// The requesting employee, or anyone who may decide on the request.
    pub fn can_view_history(&self, leave: &LeaveRequest) -> bool {
        leave.employee_id == self.user_id || self.can_decide(leave)
    }
}

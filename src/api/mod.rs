use actix_web::HttpRequest;
use actix_web::http::header;

use crate::model::leave_request::ClientInfo;

pub mod amp;
pub mod email_action;
pub mod leave_request;

const MAX_IP_CHARS: usize = 45;
const MAX_USER_AGENT_CHARS: usize = 255;

/// Caller address and user agent as reported by the request, sized for the approval log.
pub fn client_info(req: &HttpRequest) -> ClientInfo {
    let clip = |value: &str, max: usize| value.chars().take(max).collect::<String>();

    ClientInfo {
        ip_address: req
            .connection_info()
            .realip_remote_addr()
            .map(|ip| clip(ip, MAX_IP_CHARS)),
        user_agent: req
            .headers()
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(|ua| clip(ua, MAX_USER_AGENT_CHARS)),
    }
}

//! CORS contract of interactive (AMP) email runtimes.
//!
//! The runtime sends the viewing client's `Origin` and identifies the mail
//! sender either with the `AMP-Email-Sender` header or, in the older scheme,
//! the `__amp_source_origin` query parameter. Both are checked against
//! allow-lists before anything else happens, and every accepted response
//! echoes them back; the runtime discards responses that do not.

use actix_web::http::{StatusCode, header};
use actix_web::{HttpRequest, HttpResponse, HttpResponseBuilder, web};
use serde::{Deserialize, Serialize};

use crate::config::AmpConfig;
use crate::models::ActionReply;

pub const EMAIL_SENDER: &str = "AMP-Email-Sender";
pub const EMAIL_ALLOW_SENDER: &str = "AMP-Email-Allow-Sender";
pub const ALLOW_SOURCE_ORIGIN: &str = "AMP-Access-Control-Allow-Source-Origin";

/// Decisions must never be served from the runtime's content cache.
const NO_STORE: &str = "private, no-store, no-transform";

#[derive(Debug, Deserialize)]
struct SourceOriginQuery {
    #[serde(rename = "__amp_source_origin")]
    source_origin: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum OriginRejection {
    #[error("request carries no Origin header")]
    MissingOrigin,

    #[error("origin is not an allowed email runtime")]
    OriginNotAllowed,

    #[error("request does not identify the email sender")]
    MissingSender,

    #[error("email sender is not allowed")]
    SenderNotAllowed,
}

/// An email runtime that passed the allow-lists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AmpCaller {
    pub origin: String,
    pub sender: String,
}

fn same_origin(a: &str, b: &str) -> bool {
    a.trim_end_matches('/').eq_ignore_ascii_case(b.trim_end_matches('/'))
}

fn allowed_origin(req: &HttpRequest, config: &AmpConfig) -> Result<String, OriginRejection> {
    let origin = req
        .headers()
        .get(header::ORIGIN)
        .and_then(|h| h.to_str().ok())
        .map(str::trim)
        .filter(|o| !o.is_empty())
        .ok_or(OriginRejection::MissingOrigin)?;

    if config.allowed_origins.iter().any(|o| same_origin(o, origin)) {
        Ok(origin.to_string())
    } else {
        Err(OriginRejection::OriginNotAllowed)
    }
}

fn declared_sender(req: &HttpRequest) -> Option<String> {
    let sender = match req.headers().get(EMAIL_SENDER).and_then(|h| h.to_str().ok()) {
        Some(sender) => sender.to_string(),
        None => web::Query::<SourceOriginQuery>::from_query(req.query_string())
            .ok()
            .and_then(|q| q.into_inner().source_origin)?,
    };
    let sender = sender.trim();
    (!sender.is_empty()).then(|| sender.to_string())
}

fn check_sender(sender: &str, config: &AmpConfig) -> Result<(), OriginRejection> {
    if config
        .allowed_senders
        .iter()
        .any(|s| s.eq_ignore_ascii_case(sender))
    {
        Ok(())
    } else {
        Err(OriginRejection::SenderNotAllowed)
    }
}

impl AmpCaller {
    pub fn from_request(req: &HttpRequest, config: &AmpConfig) -> Result<Self, OriginRejection> {
        let origin = allowed_origin(req, config)?;
        let sender = declared_sender(req).ok_or(OriginRejection::MissingSender)?;
        check_sender(&sender, config)?;
        Ok(Self { origin, sender })
    }

    /// Browsers preflight without custom headers, so a sender is optional here.
    /// One that is declared must still be allowed.
    pub fn for_preflight(req: &HttpRequest, config: &AmpConfig) -> Result<Self, OriginRejection> {
        let origin = allowed_origin(req, config)?;
        let sender = declared_sender(req).unwrap_or_default();
        if !sender.is_empty() {
            check_sender(&sender, config)?;
        }
        Ok(Self { origin, sender })
    }

    fn apply_headers(&self, builder: &mut HttpResponseBuilder) {
        builder
            .insert_header((header::ACCESS_CONTROL_ALLOW_ORIGIN, self.origin.as_str()))
            .insert_header((header::ACCESS_CONTROL_ALLOW_CREDENTIALS, "true"))
            .insert_header((header::CACHE_CONTROL, NO_STORE))
            .insert_header((header::VARY, "Origin"));
        if !self.sender.is_empty() {
            builder
                .insert_header((EMAIL_ALLOW_SENDER, self.sender.as_str()))
                .insert_header((ALLOW_SOURCE_ORIGIN, self.sender.as_str()))
                .insert_header((header::ACCESS_CONTROL_EXPOSE_HEADERS, ALLOW_SOURCE_ORIGIN));
        }
    }

    pub fn reply(&self, status: StatusCode, body: &impl Serialize) -> HttpResponse {
        let mut builder = HttpResponse::build(status);
        self.apply_headers(&mut builder);
        builder.json(body)
    }

    pub fn preflight(&self, max_age_secs: u32) -> HttpResponse {
        let mut builder = HttpResponse::NoContent();
        self.apply_headers(&mut builder);
        builder
            .insert_header((header::ACCESS_CONTROL_ALLOW_METHODS, "GET, POST, OPTIONS"))
            .insert_header((
                header::ACCESS_CONTROL_ALLOW_HEADERS,
                "Content-Type, AMP-Email-Sender",
            ))
            .insert_header((header::ACCESS_CONTROL_MAX_AGE, max_age_secs.to_string()))
            .finish()
    }
}

/// Refusal for callers outside the allow-lists. Carries no CORS grant.
pub fn reject(rejection: OriginRejection) -> HttpResponse {
    tracing::warn!(reason = %rejection, "Email action from disallowed caller");
    HttpResponse::Forbidden()
        .insert_header((header::CACHE_CONTROL, NO_STORE))
        .json(ActionReply::user_error(
            "origin_not_allowed",
            "This request did not come from an allowed email client.",
        ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{GMAIL, SENDER, test_config};
    use actix_web::test::TestRequest;

    fn amp() -> AmpConfig {
        test_config().amp
    }

    #[test]
    fn header_sender_from_allowed_origin_passes() {
        let req = TestRequest::post()
            .insert_header((header::ORIGIN, GMAIL))
            .insert_header((EMAIL_SENDER, SENDER))
            .to_http_request();

        let caller = AmpCaller::from_request(&req, &amp()).unwrap();
        assert_eq!(caller.origin, GMAIL);
        assert_eq!(caller.sender, SENDER);
    }

    #[test]
    fn legacy_source_origin_query_is_accepted() {
        let req = TestRequest::post()
            .uri("/leave/action?__amp_source_origin=leave-bot%40hr.example.com")
            .insert_header((header::ORIGIN, "https://outlook.office.com/"))
            .to_http_request();

        let caller = AmpCaller::from_request(&req, &amp()).unwrap();
        assert_eq!(caller.sender, SENDER);
    }

    #[test]
    fn unknown_origin_or_sender_is_rejected() {
        let evil = TestRequest::post()
            .insert_header((header::ORIGIN, "https://evil.example"))
            .insert_header((EMAIL_SENDER, SENDER))
            .to_http_request();
        assert_eq!(
            AmpCaller::from_request(&evil, &amp()),
            Err(OriginRejection::OriginNotAllowed)
        );

        let spoofed = TestRequest::post()
            .insert_header((header::ORIGIN, GMAIL))
            .insert_header((EMAIL_SENDER, "someone@else.example"))
            .to_http_request();
        assert_eq!(
            AmpCaller::from_request(&spoofed, &amp()),
            Err(OriginRejection::SenderNotAllowed)
        );
    }

    #[test]
    fn missing_origin_or_sender_is_rejected() {
        let bare = TestRequest::post()
            .insert_header((EMAIL_SENDER, SENDER))
            .to_http_request();
        assert_eq!(
            AmpCaller::from_request(&bare, &amp()),
            Err(OriginRejection::MissingOrigin)
        );

        let anonymous = TestRequest::post()
            .insert_header((header::ORIGIN, GMAIL))
            .to_http_request();
        assert_eq!(
            AmpCaller::from_request(&anonymous, &amp()),
            Err(OriginRejection::MissingSender)
        );
    }

    #[test]
    fn replies_echo_origin_and_sender_without_wildcards() {
        let caller = AmpCaller {
            origin: GMAIL.to_string(),
            sender: SENDER.to_string(),
        };
        let resp = caller.reply(StatusCode::OK, &ActionReply::success("approved", "ok"));
        let headers = resp.headers();

        assert_eq!(headers.get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(), GMAIL);
        assert_eq!(headers.get(EMAIL_ALLOW_SENDER).unwrap(), SENDER);
        assert_eq!(headers.get(ALLOW_SOURCE_ORIGIN).unwrap(), SENDER);
        assert_eq!(headers.get(header::CACHE_CONTROL).unwrap(), NO_STORE);
    }

    #[test]
    fn preflight_advertises_method_headers_and_max_age() {
        let caller = AmpCaller {
            origin: GMAIL.to_string(),
            sender: SENDER.to_string(),
        };
        let resp = caller.preflight(600);
        let headers = resp.headers();

        assert_eq!(resp.status(), StatusCode::NO_CONTENT);
        assert!(
            headers
                .get(header::ACCESS_CONTROL_ALLOW_METHODS)
                .unwrap()
                .to_str()
                .unwrap()
                .contains("POST")
        );
        assert_eq!(headers.get(header::ACCESS_CONTROL_MAX_AGE).unwrap(), "600");
        assert_eq!(headers.get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(), GMAIL);
    }

    #[test]
    fn preflight_needs_only_an_allowed_origin() {
        let req = TestRequest::default()
            .insert_header((header::ORIGIN, GMAIL))
            .to_http_request();
        let caller = AmpCaller::for_preflight(&req, &amp()).unwrap();
        assert!(caller.sender.is_empty());
        assert!(caller.preflight(600).headers().get(EMAIL_ALLOW_SENDER).is_none());

        let spoofed = TestRequest::default()
            .insert_header((header::ORIGIN, GMAIL))
            .insert_header((EMAIL_SENDER, "someone@else.example"))
            .to_http_request();
        assert_eq!(
            AmpCaller::for_preflight(&spoofed, &amp()),
            Err(OriginRejection::SenderNotAllowed)
        );
    }
}

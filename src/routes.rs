use crate::{
    api::{email_action, leave_request},
    config::Config,
};
use actix_governor::{
    Governor, GovernorConfigBuilder, PeerIpKeyExtractor, governor::middleware::NoOpMiddleware,
};
use actix_web::web;
use std::sync::Arc;

// Helper to build per-route limiter
fn build_limiter(requests_per_min: u32) -> Governor<PeerIpKeyExtractor, NoOpMiddleware> {
    let requests_per_min = requests_per_min.max(1);
    let per_ms = (60_000 / requests_per_min as u64).max(1);
    let cfg = GovernorConfigBuilder::default()
        .per_millisecond(per_ms)
        .burst_size(requests_per_min)
        .key_extractor(PeerIpKeyExtractor)
        .finish()
        // Only fails for a zero period or burst, both clamped above.
        .unwrap_or_default();
    Governor::new(&cfg)
}

pub fn configure(cfg: &mut web::ServiceConfig, config: &Config) {
    let action_limiter = Arc::new(build_limiter(config.rate_action_per_min));
    let protected_limiter = Arc::new(build_limiter(config.rate_protected_per_min));

    // Email runtime routes: authorized by the action token, not a session
    cfg.service(
        web::scope("/leave/action")
            .wrap(action_limiter)
            .configure(email_action::routes),
    );

    // Dashboard routes: bearer session checked per handler by AuthUser
    cfg.service(
        web::scope(&format!("{}/leave", config.api_prefix))
            .wrap(protected_limiter)
            .configure(leave_request::routes),
    );
}

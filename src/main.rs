use std::sync::Arc;
use std::time::Duration;

use actix_web::middleware::NormalizePath;
use actix_web::web::Data;
use actix_web::{App, HttpServer};
use anyhow::Context;
use chrono::Utc;
use dotenvy::dotenv;

mod api;
mod auth;
mod config;
mod db;
mod docs;
mod error;
mod model;
mod models;
mod notify;
mod routes;
mod state_machine;
mod store;
#[cfg(test)]
mod test_support;

use config::{Config, ReplayBackend};
use db::init_db;

use crate::auth::action_token::ActionTokenService;
use crate::docs::ApiDoc;
use crate::notify::{Notifier, TracingNotifier};
use crate::state_machine::LeaveStateMachine;
use crate::store::leave_store::MySqlLeaveStore;
use crate::store::replay_guard::{MokaReplayGuard, MySqlReplayGuard};
use crate::store::{LeaveStore, ReplayGuard};
use tracing::{error, info, warn};
use tracing_appender::rolling;
use utoipa::OpenApi; // ← needed for ApiDoc::openapi()
use utoipa_swagger_ui::SwaggerUi;

/// Drops consumed nonces once their tokens can no longer verify.
fn spawn_replay_purge(guard: Arc<dyn ReplayGuard>, every: Duration) {
    actix_web::rt::spawn(async move {
        let mut ticker = actix_web::rt::time::interval(every.max(Duration::from_secs(1)));
        loop {
            ticker.tick().await;
            match guard.purge_expired(Utc::now()).await {
                Ok(0) => {}
                Ok(purged) => info!(purged, "Expired replay records purged"),
                Err(e) => error!(error = %e, "Replay record purge failed"),
            }
        }
    });
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let config = Config::from_env().context("invalid configuration")?;

    // Rolling daily log
    let file_appender = rolling::daily(&config.log_dir, "app.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_max_level(tracing::Level::DEBUG)
        .with_ansi(false)
        .with_target(false) // removes module path
        .with_level(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .pretty()
        .init();

    info!("Server starting...");

    let pool = init_db(&config.database_url, config.store_timeout)
        .await
        .context("failed to connect to database")?;

    // Signing key problems surface here, not on the first email.
    let tokens = Data::new(
        ActionTokenService::new(&config.action_token).context("invalid action token settings")?,
    );

    let store: Arc<dyn LeaveStore> = Arc::new(MySqlLeaveStore::new(pool.clone()));
    let guard: Arc<dyn ReplayGuard> = match config.replay_backend {
        ReplayBackend::MySql => Arc::new(MySqlReplayGuard::new(
            pool.clone(),
            config.action_token.clock_skew,
        )),
        ReplayBackend::Memory => {
            warn!("Replay records kept in memory; run a single instance only");
            Arc::new(MokaReplayGuard::new(config.action_token.clock_skew))
        }
    };
    let notifier: Arc<dyn Notifier> = Arc::new(TracingNotifier::new(&config));
    let machine = Data::new(LeaveStateMachine::new(
        store.clone(),
        notifier.clone(),
        config.store_timeout,
    ));

    spawn_replay_purge(guard.clone(), config.replay_purge_interval);

    let server_addr = config.server_addr.clone();
    let config = Data::new(config);
    let store = Data::from(store);
    let guard = Data::from(guard);
    let notifier = Data::from(notifier);

    HttpServer::new(move || {
        App::new()
            .wrap(actix_web::middleware::Logger::default())
            .wrap(NormalizePath::trim())
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}") // ← important: wildcard {_:.*} to match JS/CSS files
                    .url("/api-doc/openapi.json", ApiDoc::openapi()),
            )
            .app_data(config.clone())
            .app_data(tokens.clone())
            .app_data(machine.clone())
            .app_data(store.clone())
            .app_data(guard.clone())
            .app_data(notifier.clone())
            // Email action + dashboard routes with rate limiting
            .configure(|cfg| routes::configure(cfg, &config))
    })
    .bind(server_addr)?
    .run()
    .await?;

    Ok(())
}

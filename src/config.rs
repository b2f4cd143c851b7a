use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;

/// Interactive-email runtimes allowed to call the action endpoints.
const DEFAULT_AMP_ORIGINS: &[&str] = &[
    "https://mail.google.com",
    "https://outlook.live.com",
    "https://outlook.office.com",
    "https://outlook.office365.com",
    "https://mail.yahoo.com",
    "https://playground.amp.dev",
];

/// Minimum length of the action-token signing secret, in bytes.
pub const MIN_SECRET_LEN: usize = 32;
/// Thirty days; anything longer is a misconfiguration.
pub const MAX_TOKEN_TTL_HOURS: i64 = 720;

#[derive(Clone, Debug)]
pub struct ActionTokenConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl: chrono::Duration,
    pub clock_skew: chrono::Duration,
}

#[derive(Clone, Debug)]
pub struct AmpConfig {
    pub allowed_origins: Vec<String>,
    pub allowed_senders: Vec<String>,
    pub preflight_max_age_secs: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReplayBackend {
    MySql,
    Memory,
}

impl FromStr for ReplayBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mysql" => Ok(ReplayBackend::MySql),
            "memory" => Ok(ReplayBackend::Memory),
            other => Err(format!("expected `mysql` or `memory`, got `{other}`")),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub server_addr: String,
    pub api_prefix: String,
    pub log_dir: String,

    /// Verifies dashboard session tokens issued by the login service.
    pub session_jwt_secret: String,
    pub action_token: ActionTokenConfig,
    pub amp: AmpConfig,

    pub replay_backend: ReplayBackend,
    pub replay_purge_interval: Duration,
    pub store_timeout: Duration,

    // Links placed in the action email
    pub api_base_url: String,
    pub frontend_base_url: String,
    pub mail_from: String,

    // Rate limiting
    pub rate_action_per_min: u32,
    pub rate_protected_per_min: u32,
}

fn required(key: &'static str) -> Result<String, ConfigError> {
    env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or(ConfigError::Missing(key))
}

fn or_default(key: &'static str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parsed<T>(key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            key,
            reason: e.to_string(),
        }),
        Err(_) => Ok(default),
    }
}

fn list(key: &'static str, default: &[String]) -> Vec<String> {
    match env::var(key) {
        Ok(raw) => raw
            .split(',')
            .map(|s| s.trim().trim_end_matches('/').to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        Err(_) => default.to_vec(),
    }
}

fn token_ttl(hours: i64) -> Result<chrono::Duration, ConfigError> {
    if !(1..=MAX_TOKEN_TTL_HOURS).contains(&hours) {
        return Err(ConfigError::Invalid {
            key: "ACTION_TOKEN_TTL_HOURS",
            reason: format!("must be between 1 and {MAX_TOKEN_TTL_HOURS}"),
        });
    }
    Ok(chrono::Duration::hours(hours))
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let action_secret = required("ACTION_TOKEN_SECRET")?;
        if action_secret.len() < MIN_SECRET_LEN {
            return Err(ConfigError::Invalid {
                key: "ACTION_TOKEN_SECRET",
                reason: format!("must be at least {MIN_SECRET_LEN} bytes"),
            });
        }
        let session_secret = required("SESSION_JWT_SECRET")?;
        if session_secret == action_secret {
            return Err(ConfigError::Invalid {
                key: "SESSION_JWT_SECRET",
                reason: "must differ from ACTION_TOKEN_SECRET".to_string(),
            });
        }

        let mail_from = required("MAIL_FROM")?;
        let default_origins: Vec<String> =
            DEFAULT_AMP_ORIGINS.iter().map(|o| o.to_string()).collect();

        Ok(Self {
            server_addr: required("SERVER_ADDR")?,
            database_url: required("DATABASE_URL")?,
            api_prefix: or_default("API_PREFIX", "/api"),
            log_dir: or_default("LOG_DIR", "logs"),

            session_jwt_secret: session_secret,
            action_token: ActionTokenConfig {
                secret: action_secret,
                issuer: or_default("ACTION_TOKEN_ISSUER", "hrm"),
                audience: or_default("ACTION_TOKEN_AUDIENCE", "hrm-leave-email-action"),
                ttl: token_ttl(parsed("ACTION_TOKEN_TTL_HOURS", 72i64)?)?,
                clock_skew: chrono::Duration::seconds(parsed("CLOCK_SKEW_SECS", 60i64)?),
            },
            amp: AmpConfig {
                allowed_origins: list("AMP_ALLOWED_ORIGINS", &default_origins),
                allowed_senders: list("AMP_ALLOWED_SENDERS", &[mail_from.clone()]),
                preflight_max_age_secs: parsed("PREFLIGHT_MAX_AGE_SECS", 600)?,
            },

            replay_backend: parsed("REPLAY_BACKEND", ReplayBackend::MySql)?,
            replay_purge_interval: Duration::from_secs(parsed(
                "REPLAY_PURGE_INTERVAL_SECS",
                3600,
            )?),
            store_timeout: Duration::from_millis(parsed("STORE_TIMEOUT_MS", 2000)?),

            api_base_url: or_default("API_BASE_URL", "http://localhost:8080"),
            frontend_base_url: or_default("FRONTEND_BASE_URL", "http://localhost:5173"),
            mail_from,

            rate_action_per_min: parsed("RATE_ACTION_PER_MIN", 120)?,
            rate_protected_per_min: parsed("RATE_PROTECTED_PER_MIN", 1000)?,
        })
    }

    /// Form target of the in-email approve/reject buttons.
    pub fn action_url(&self) -> String {
        format!("{}/leave/action", self.api_base_url.trim_end_matches('/'))
    }

    pub fn status_url(&self) -> String {
        format!("{}/leave/action/status", self.api_base_url.trim_end_matches('/'))
    }

    pub fn dashboard_url(&self) -> String {
        format!(
            "{}/manager/pending-approvals",
            self.frontend_base_url.trim_end_matches('/')
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replay_backend_parses_case_insensitively() {
        assert_eq!("MySQL".parse::<ReplayBackend>(), Ok(ReplayBackend::MySql));
        assert_eq!("memory".parse::<ReplayBackend>(), Ok(ReplayBackend::Memory));
        assert!("redis".parse::<ReplayBackend>().is_err());
    }

    #[test]
    fn token_ttl_is_bounded_on_both_sides() {
        assert_eq!(token_ttl(72).unwrap(), chrono::Duration::hours(72));
        assert_eq!(
            token_ttl(MAX_TOKEN_TTL_HOURS).unwrap(),
            chrono::Duration::days(30)
        );
        for hours in [0, -1, MAX_TOKEN_TTL_HOURS + 1, i64::MAX] {
            assert!(matches!(
                token_ttl(hours),
                Err(ConfigError::Invalid { key: "ACTION_TOKEN_TTL_HOURS", .. })
            ));
        }
    }

    #[test]
    fn links_do_not_double_slashes() {
        let mut config = crate::test_support::test_config();
        config.api_base_url = "https://hr.example.com/".to_string();
        config.frontend_base_url = "https://app.example.com/".to_string();

        assert_eq!(config.action_url(), "https://hr.example.com/leave/action");
        assert_eq!(
            config.status_url(),
            "https://hr.example.com/leave/action/status"
        );
        assert_eq!(
            config.dashboard_url(),
            "https://app.example.com/manager/pending-approvals"
        );
    }
}

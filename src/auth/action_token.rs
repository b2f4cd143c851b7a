use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::{ActionTokenConfig, MAX_TOKEN_TTL_HOURS, MIN_SECRET_LEN};
use crate::error::{ConfigError, MintError, TokenError};
use crate::model::leave_request::{Action, LeaveRequest};

/// Claims of a single-use leave decision capability.
#[derive(Debug, Serialize, Deserialize)]
pub struct ActionClaims {
    /// Leave request id
    pub sub: String,
    pub act: Action,
    /// Manager allowed to take the decision
    pub actor: u64,
    pub iss: String,
    pub aud: String,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
}

/// What a verified token authorizes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedAction {
    pub leave_id: u64,
    pub action: Action,
    pub actor: u64,
    pub nonce: String,
    pub expires_at: DateTime<Utc>,
}

/// Both tokens outstanding for one pending request.
#[derive(Debug, Clone)]
pub struct ActionTokens {
    pub approve: String,
    pub reject: String,
    pub expires_at: DateTime<Utc>,
}

pub struct ActionTokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    issuer: String,
    audience: String,
    ttl: Duration,
    clock_skew: Duration,
}

impl ActionTokenService {
    /// Rejects a missing or short signing secret and a TTL outside 1 hour .. 30 days.
    pub fn new(config: &ActionTokenConfig) -> Result<Self, ConfigError> {
        if config.secret.len() < MIN_SECRET_LEN {
            return Err(ConfigError::Invalid {
                key: "ACTION_TOKEN_SECRET",
                reason: format!("must be at least {MIN_SECRET_LEN} bytes"),
            });
        }
        if config.ttl <= Duration::zero() || config.ttl > Duration::hours(MAX_TOKEN_TTL_HOURS) {
            return Err(ConfigError::Invalid {
                key: "ACTION_TOKEN_TTL_HOURS",
                reason: format!("must be positive and at most {MAX_TOKEN_TTL_HOURS} hours"),
            });
        }

        // Time and audience checks run by hand so they happen in a fixed order
        // against an injectable clock.
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;
        validation.required_spec_claims = HashSet::new();

        Ok(Self {
            encoding: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding: DecodingKey::from_secret(config.secret.as_bytes()),
            validation,
            issuer: config.issuer.clone(),
            audience: config.audience.clone(),
            ttl: config.ttl,
            clock_skew: config.clock_skew,
        })
    }

    pub fn default_ttl(&self) -> Duration {
        self.ttl
    }

    pub fn mint(
        &self,
        leave_id: u64,
        action: Action,
        actor: u64,
        ttl: Duration,
    ) -> Result<String, MintError> {
        self.mint_at(leave_id, action, actor, ttl, Utc::now())
    }

    pub fn mint_at(
        &self,
        leave_id: u64,
        action: Action,
        actor: u64,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<String, MintError> {
        let claims = ActionClaims {
            sub: leave_id.to_string(),
            act: action,
            actor,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
            jti: Uuid::new_v4().to_string(),
        };

        Ok(encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &self.encoding,
        )?)
    }

    /// Mints the approve and reject tokens for `actor`, the user the decision is recorded against.
    pub fn issue_pair(
        &self,
        leave: &LeaveRequest,
        actor: u64,
        ttl: Duration,
    ) -> Result<ActionTokens, MintError> {
        let now = Utc::now();
        Ok(ActionTokens {
            approve: self.mint_at(leave.id, Action::Approve, actor, ttl, now)?,
            reject: self.mint_at(leave.id, Action::Reject, actor, ttl, now)?,
            expires_at: now + ttl,
        })
    }

    pub fn verify(&self, token: &str) -> Result<VerifiedAction, TokenError> {
        self.verify_at(token, Utc::now())
    }

    /// Checks structure, signature, issuer, audience, expiry and issue time, in that order.
    pub fn verify_at(&self, token: &str, now: DateTime<Utc>) -> Result<VerifiedAction, TokenError> {
        let claims = decode::<ActionClaims>(token.trim(), &self.decoding, &self.validation)
            .map_err(|e| match e.kind() {
                ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => {
                    TokenError::BadSignature
                }
                _ => TokenError::Malformed,
            })?
            .claims;

        let leave_id: u64 = claims.sub.parse().map_err(|_| TokenError::Malformed)?;
        if claims.jti.is_empty() {
            return Err(TokenError::Malformed);
        }
        let expires_at =
            DateTime::<Utc>::from_timestamp(claims.exp, 0).ok_or(TokenError::Malformed)?;

        if claims.iss != self.issuer {
            return Err(TokenError::WrongIssuer);
        }
        if claims.aud != self.audience {
            return Err(TokenError::WrongAudience);
        }
        if now >= expires_at {
            return Err(TokenError::Expired);
        }
        if claims.iat > (now + self.clock_skew).timestamp() {
            return Err(TokenError::NotYetValid);
        }

        Ok(VerifiedAction {
            leave_id,
            action: claims.act,
            actor: claims.actor,
            nonce: claims.jti,
            expires_at,
        })
    }
}

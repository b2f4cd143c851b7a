use crate::models::SessionClaims;
use jsonwebtoken::{DecodingKey, Validation, decode};

/// Verifies a dashboard session token. Sessions are minted by the login service.
pub fn verify_session_token(token: &str, secret: &str) -> Result<SessionClaims, String> {
    decode::<SessionClaims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|e| e.to_string())
}

#[cfg(test)]
pub fn issue_session_token(user_id: u64, role: u8, secret: &str, ttl: usize) -> String {
    use jsonwebtoken::{EncodingKey, Header, encode};

    let now = chrono::Utc::now().timestamp() as usize;
    let claims = SessionClaims {
        user_id,
        sub: format!("user-{user_id}"),
        role,
        exp: now + ttl,
        jti: uuid::Uuid::new_v4().to_string(),
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_token_round_trips_with_the_same_secret() {
        let token = issue_session_token(9, 4, "session-secret", 900);
        let claims = verify_session_token(&token, "session-secret").unwrap();
        assert_eq!(claims.user_id, 9);
        assert_eq!(claims.role, 4);
    }

    #[test]
    fn session_token_signed_elsewhere_is_refused() {
        let token = issue_session_token(9, 4, "other-secret", 900);
        assert!(verify_session_token(&token, "session-secret").is_err());
    }
}

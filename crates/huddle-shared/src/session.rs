//! Session token verification.
//!
//! Tokens are issued and signed elsewhere. They have three dot-separated
//! parts, the middle one being base64url-encoded JSON claims carrying at
//! least `id` (the user id) and `exp` (expiry, unix seconds).

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::error::SessionError;
use crate::types::UserId;

const TOKEN_PARTS: usize = 3;

/// Resolves a session token to the user it was issued for.
pub trait SessionVerifier: Send + Sync {
    fn verify(&self, token: &str) -> Result<UserId, SessionError>;
}

#[derive(Debug, Deserialize)]
struct Claims {
    id: Option<String>,
    exp: Option<f64>,
}

/// Verifier that trusts the token's signature and checks its claims:
/// structure, user id and expiry.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClaimsVerifier;

impl ClaimsVerifier {
    pub fn new() -> Self {
        Self
    }

    /// Verify `token` against an explicit clock.
    pub fn verify_at(&self, token: &str, now: DateTime<Utc>) -> Result<UserId, SessionError> {
        let claims = decode_claims(token)?;

        let exp = claims.exp.ok_or(SessionError::Malformed)?;
        if now.timestamp() > exp as i64 {
            return Err(SessionError::Expired);
        }

        match claims.id {
            Some(id) if !id.is_empty() => Ok(UserId(id)),
            _ => Err(SessionError::Malformed),
        }
    }
}

impl SessionVerifier for ClaimsVerifier {
    fn verify(&self, token: &str) -> Result<UserId, SessionError> {
        self.verify_at(token, Utc::now())
    }
}

fn decode_claims(token: &str) -> Result<Claims, SessionError> {
    let parts: Vec<&str> = token.trim().split('.').collect();
    if parts.len() != TOKEN_PARTS {
        return Err(SessionError::Malformed);
    }

    let payload = URL_SAFE_NO_PAD
        .decode(parts[1])
        .map_err(|_| SessionError::Malformed)?;

    serde_json::from_slice(&payload).map_err(|_| SessionError::Malformed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn token_with(claims: serde_json::Value) -> String {
        let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
        format!("eyJhbGciOiJIUzI1NiJ9.{payload}.c2lnbmF0dXJl")
    }

    #[test]
    fn test_valid_token() {
        let exp = (Utc::now() + Duration::hours(1)).timestamp();
        let token = token_with(serde_json::json!({ "id": "u1", "exp": exp }));

        assert_eq!(ClaimsVerifier::new().verify(&token), Ok(UserId::from("u1")));
    }

    #[test]
    fn test_expired_token() {
        let exp = (Utc::now() - Duration::seconds(5)).timestamp();
        let token = token_with(serde_json::json!({ "id": "u1", "exp": exp }));

        assert_eq!(ClaimsVerifier::new().verify(&token), Err(SessionError::Expired));
    }

    #[test]
    fn test_expiry_boundary() {
        let now = Utc::now();
        let token = token_with(serde_json::json!({ "id": "u1", "exp": now.timestamp() }));
        let verifier = ClaimsVerifier::new();

        assert!(verifier.verify_at(&token, now).is_ok());
        assert_eq!(
            verifier.verify_at(&token, now + Duration::seconds(1)),
            Err(SessionError::Expired)
        );
    }

    #[test]
    fn test_malformed_tokens() {
        let verifier = ClaimsVerifier::new();
        let exp = (Utc::now() + Duration::hours(1)).timestamp();

        assert_eq!(verifier.verify("not-a-token"), Err(SessionError::Malformed));
        assert_eq!(verifier.verify("a.b.c.d"), Err(SessionError::Malformed));
        assert_eq!(verifier.verify("a.!!!.c"), Err(SessionError::Malformed));
        assert_eq!(
            verifier.verify(&token_with(serde_json::json!({ "exp": exp }))),
            Err(SessionError::Malformed)
        );
        assert_eq!(
            verifier.verify(&token_with(serde_json::json!({ "id": 7, "exp": exp }))),
            Err(SessionError::Malformed)
        );
        assert_eq!(
            verifier.verify(&token_with(serde_json::json!({ "id": "u1" }))),
            Err(SessionError::Malformed)
        );
    }
}

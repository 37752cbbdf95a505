//! JWT token generation and validation

use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::types::FarmgateError;

/// Claims carried in every Farmgate bearer token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Identity provider subject id
    pub sub: String,
    /// Email at issue time (informational)
    pub email: String,
    /// Credential token version at issue time; tokens with a stale version
    /// are rejected after a password change
    pub token_version: i32,
    /// Issued-at (unix seconds)
    pub iat: u64,
    /// Expiry (unix seconds)
    pub exp: u64,
}

/// Signs and verifies bearer tokens with a shared HMAC secret
#[derive(Clone)]
pub struct JwtValidator {
    encoding: EncodingKey,
    decoding: DecodingKey,
    expiry_seconds: u64,
}

impl JwtValidator {
    pub fn new(secret: &str, expiry_seconds: u64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            expiry_seconds,
        }
    }

    /// Issue a token for a subject. Returns the token and its expiry
    /// (unix seconds).
    pub fn generate(
        &self,
        subject_id: &str,
        email: &str,
        token_version: i32,
    ) -> Result<(String, u64), FarmgateError> {
        let now = unix_now();
        let exp = now + self.expiry_seconds;

        let claims = Claims {
            sub: subject_id.to_string(),
            email: email.to_string(),
            token_version,
            iat: now,
            exp,
        };

        let token = encode(&Header::default(), &claims, &self.encoding)
            .map_err(|e| FarmgateError::Identity(format!("Failed to sign token: {}", e)))?;

        Ok((token, exp))
    }

    /// Verify signature and expiry, returning the claims
    pub fn verify(&self, token: &str) -> Result<Claims, FarmgateError> {
        decode::<Claims>(token, &self.decoding, &Validation::default())
            .map(|data| data.claims)
            .map_err(|e| FarmgateError::Unauthenticated(format!("Invalid token: {}", e)))
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Extract the bearer token from an Authorization header value
pub fn extract_token_from_header(header: Option<&str>) -> Option<&str> {
    header
        .and_then(|h| h.strip_prefix("Bearer "))
        .filter(|t| !t.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_and_verify() {
        let jwt = JwtValidator::new("test-secret", 3600);
        let (token, exp) = jwt.generate("subject-1", "amos@nakuru.farm", 1).unwrap();

        let claims = jwt.verify(&token).unwrap();
        assert_eq!(claims.sub, "subject-1");
        assert_eq!(claims.email, "amos@nakuru.farm");
        assert_eq!(claims.token_version, 1);
        assert_eq!(claims.exp, exp);
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let jwt = JwtValidator::new("secret-a", 3600);
        let (token, _) = jwt.generate("subject-1", "a@b.c", 1).unwrap();

        let other = JwtValidator::new("secret-b", 3600);
        assert!(other.verify(&token).is_err());
    }

    #[test]
    fn test_extract_token_from_header() {
        assert_eq!(extract_token_from_header(Some("Bearer abc123")), Some("abc123"));
        assert_eq!(extract_token_from_header(Some("Bearer ")), None);
        assert_eq!(extract_token_from_header(Some("Basic abc123")), None);
        assert_eq!(extract_token_from_header(None), None);
    }
}

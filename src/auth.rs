//! Bearer token validation
//!
//! Tokens are HS256-signed JWTs checked against the service's shared secret
//! before any store connection is attempted. `exp` is optional but enforced
//! without leeway when present.

use crate::error::TransferError;
use jsonwebtoken::errors::ErrorKind as JwtErrorKind;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct TokenClaims {
    #[serde(default)]
    sub: Option<String>,
}

#[derive(Clone)]
pub struct TokenValidator {
    key: DecodingKey,
    validation: Validation,
}

impl TokenValidator {
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.required_spec_claims.clear();

        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    /// Verifies signature and expiry, returning the subject claim if any.
    pub fn validate(&self, token: &str) -> Result<Option<String>, TransferError> {
        match decode::<TokenClaims>(token.trim(), &self.key, &self.validation) {
            Ok(data) => {
                log::info!(
                    "JWT validated successfully for subject: {}",
                    data.claims.sub.as_deref().unwrap_or("N/A")
                );
                Ok(data.claims.sub)
            }
            Err(e) if matches!(e.kind(), JwtErrorKind::ExpiredSignature) => {
                log::warn!("JWT validation failed: token has expired");
                Err(TransferError::Auth(
                    "Authentication token has expired. Please provide a fresh token.".to_string(),
                ))
            }
            Err(e) => {
                log::warn!("JWT validation failed: invalid token - {}", e);
                Err(TransferError::Auth(format!(
                    "Authentication token is invalid: {}",
                    e
                )))
            }
        }
    }
}

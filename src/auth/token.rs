use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use tracing::{debug, instrument};

use super::types::IdentityClaims;
use crate::shared::{AppError, UserId};

/// Configuration for JWT token operations
#[derive(Clone)]
pub struct TokenConfig {
    secret: String,
    pub expiration_days: i64,
}

impl TokenConfig {
    pub fn new(secret: String, expiration_days: i64) -> Self {
        Self {
            secret,
            expiration_days,
        }
    }

    /// Creates a signed token for `user_id`. Issuance belongs to the identity
    /// service; this is used by tooling and tests.
    #[instrument(skip(self))]
    pub fn create_token(&self, user_id: UserId) -> Result<String, AppError> {
        let now = Utc::now();
        let exp = (now + Duration::days(self.expiration_days)).timestamp() as usize;

        debug!(
            expiration_days = self.expiration_days,
            exp_timestamp = exp,
            "Creating JWT token with expiration"
        );

        let claims = IdentityClaims {
            sub: user_id,
            exp,
            iat: now.timestamp() as usize,
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_ref()),
        )
        .map_err(|e| {
            debug!(error = %e, "Failed to encode JWT token");
            AppError::JwtError(e.to_string())
        })
    }

    /// Validates a JWT token and returns the claims if valid
    #[instrument(skip(self, token))]
    pub fn validate_token(&self, token: &str) -> Result<IdentityClaims, AppError> {
        decode::<IdentityClaims>(
            token,
            &DecodingKey::from_secret(self.secret.as_ref()),
            &Validation::default(),
        )
        .map(|data| {
            debug!(
                user_id = data.claims.sub,
                exp = data.claims.exp,
                "JWT token decoded successfully"
            );
            data.claims
        })
        .map_err(|e| {
            debug!(error = %e, "Failed to decode JWT token");
            AppError::JwtError(e.to_string())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(secret: &str) -> TokenConfig {
        TokenConfig::new(secret.to_string(), 1)
    }

    #[test]
    fn test_create_and_validate_token() {
        let config = config("secret");

        let token = config.create_token(42).unwrap();
        assert!(!token.is_empty());

        let claims = config.validate_token(&token).unwrap();
        assert_eq!(claims.sub, 42);
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn test_invalid_token() {
        let result = config("secret").validate_token("invalid.token.here");
        assert!(matches!(result, Err(AppError::JwtError(_))));
    }

    #[test]
    fn test_token_with_different_secret() {
        let token = config("secret-a").create_token(1).unwrap();

        assert!(config("secret-a").validate_token(&token).is_ok());
        assert!(matches!(
            config("secret-b").validate_token(&token),
            Err(AppError::JwtError(_))
        ));
    }

    #[test]
    fn test_expired_token_is_rejected() {
        let expired = TokenConfig::new("secret".to_string(), -1);
        let token = expired.create_token(1).unwrap();

        assert!(expired.validate_token(&token).is_err());
    }
}

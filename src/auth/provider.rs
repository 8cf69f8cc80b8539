use async_trait::async_trait;

use super::token::TokenConfig;
use crate::shared::{AppError, UserId};

/// Resolves a bearer credential to the calling user
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn authenticate(&self, token: &str) -> Result<UserId, AppError>;
}

/// Identity provider backed by locally verified HS256 tokens
pub struct JwtIdentityProvider {
    tokens: TokenConfig,
}

impl JwtIdentityProvider {
    pub fn new(tokens: TokenConfig) -> Self {
        Self { tokens }
    }
}

#[async_trait]
impl IdentityProvider for JwtIdentityProvider {
    async fn authenticate(&self, token: &str) -> Result<UserId, AppError> {
        Ok(self.tokens.validate_token(token)?.sub)
    }
}

use serde::{Deserialize, Serialize};

use crate::shared::UserId;

/// JWT claims identifying the calling user
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IdentityClaims {
    pub sub: UserId,
    pub exp: usize, // Expiration timestamp (standard JWT claim)
    pub iat: usize, // Issued at timestamp (standard JWT claim)
}

/// Caller identity attached to authenticated requests by `jwt_auth`.
/// Handlers extract it with `Extension(AuthenticatedUser(user_id))`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthenticatedUser(pub UserId);

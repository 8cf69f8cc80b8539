// Public API - what other modules can use
pub use middleware::jwt_auth;
pub use provider::{IdentityProvider, JwtIdentityProvider};
pub use token::TokenConfig;
pub use types::{AuthenticatedUser, IdentityClaims};

// Internal modules
mod middleware;
mod provider;
mod token;
mod types;

//! Request authentication and Google OAuth token handling for Tether.

pub mod google;
pub mod session;
pub mod storage;

pub use google::{GoogleOAuth2Provider, GoogleTokenManager, GoogleTokenResponse};
pub use session::{extract_bearer_token, AuthenticatedUser, SessionVerifier};
pub use storage::{TokenSet, TokenStore};

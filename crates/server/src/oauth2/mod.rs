//! OAuth2 Authorization Server module.
//!
//! Issues, refreshes and revokes bearer tokens and authorization codes for
//! registered clients.
//!
//! ## Supported Grants
//!
//! - Resource owner password
//! - Refresh token (rotating: every refresh revokes the old pair)
//! - Authorization code (single use, bound to its redirect URI)
//!
//! ## Endpoints
//!
//! - `POST /oauth2/token` - Token endpoint
//! - `GET|POST /oauth2/authorize` - Authorization endpoint (bearer protected)
//! - `POST /oauth2/revoke` - Token revocation

pub mod auth_check;
pub mod authorize;
pub mod bearer;
pub mod credentials;
pub mod endpoints;
pub mod generators;
pub mod grant;
mod lifecycle;
pub mod password;
pub mod revocable;
mod state;
pub mod store;

pub use auth_check::{AuthCheck, ConfiguredUsers};
pub use bearer::{AuthenticatedUser, require_bearer};
pub use endpoints::router;
pub use grant::{Grant, GrantEngine, GrantRequest, TokenResponse};
pub use password::SecretHasher;
pub use revocable::Revocable;
pub use state::{OAuth2State, TlsConnection};
pub use store::{CredentialStore, ProvisionedClient};

/// OpenAPI tag for OAuth2 endpoints
pub const OAUTH2_TAG: &str = "OAuth2";

//! OAuth2 Authorization Server facade.
//!
//! This module implements the authorization-server surface that GPT client
//! applications talk to, bridging every flow to an upstream identity
//! provider. The service never issues its own identity; it correlates the
//! client's Authorization Code flow with the upstream one and hands the
//! upstream tokens back.
//!
//! ## Endpoints
//!
//! - `GET /oauth2-server/authorize` - Authorization endpoint (redirects upstream)
//! - `POST /oauth2-server/token` - Token endpoint (exchanges with the upstream IdP)
//! - `GET /oauth2-server/callback/google` - Upstream callback

pub mod bridge;
pub mod endpoints;
pub mod google;

pub use endpoints::router;
pub use google::GoogleClient;

/// OpenAPI tag for OAuth2 endpoints
pub const OAUTH2_TAG: &str = "OAuth2 Server";

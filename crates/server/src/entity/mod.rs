//! SeaORM entities for the gatekeeper's persisted state.
//!
//! - [`application`]: registered custom GPT applications and their credentials
//! - [`email_verification_request`]: OTP verification attempts
//! - [`oauth_verification_request`]: OAuth2 bridge state machine rows
//! - [`oauth_token`]: stored upstream tokens (opt-in per application)

pub mod application;
pub mod email_verification_request;
pub mod oauth_token;
pub mod oauth_verification_request;

//! Verification gate for custom GPT integrations.
//!
//! GPT applications register here and receive credentials; end users prove
//! who they are either through an emailed single-use code or through a
//! bridged OAuth2 Authorization Code flow against an upstream identity
//! provider. Every attempt is kept as an append-only verification request.

use std::sync::Arc;

use lettre::{AsyncSmtpTransport, Tokio1Executor};
use sea_orm::DatabaseConnection;

use crate::config::AppConfig;
use crate::oauth2::GoogleClient;

pub mod api;
pub mod config;
pub mod email;
pub mod entity;
pub mod error;
pub mod oauth2;

#[derive(Clone)]
pub struct AppResources {
    pub db: Arc<DatabaseConnection>,
    pub mailer: Arc<AsyncSmtpTransport<Tokio1Executor>>,
    pub config: Arc<AppConfig>,
    pub google: GoogleClient,
}

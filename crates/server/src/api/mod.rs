//! API module providing HTTP endpoints for the gatekeeper.
//!
//! This module is organized into submodules:
//! - `applications` - Application registry endpoints (/api/v1/custom-gpt-application)
//! - `verification` - Email OTP verification endpoints (/api/v1/*)
//! - `auth` - Authentication extractors
//! - `health` - Health check endpoint (/healthz)
//! - `openapi` - OpenAPI/Utoipa configuration

pub mod applications;
pub mod auth;
pub mod health;
pub mod openapi;
pub mod verification;

pub use applications::APPLICATIONS_TAG;
pub use health::MISC_TAG;
pub use verification::VERIFICATION_TAG;

use crate::AppResources;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::OpenApi;
use utoipa_axum::{router::OpenApiRouter, routes};
use utoipa_redoc::{Redoc, Servable};

/// Starts the web server with all configured routes.
#[tracing::instrument(skip(app_resources))]
pub async fn start_webserver(app_resources: AppResources) -> color_eyre::Result<()> {
    let (router, api) = OpenApiRouter::with_openapi(openapi::ApiDoc::openapi())
        .nest("/api/v1", applications::router().merge(verification::router()))
        .nest("/oauth2-server", crate::oauth2::router())
        .routes(routes!(health::health))
        .layer(axum::Extension(app_resources))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .split_for_parts();

    let router = router.merge(Redoc::with_url("/api-docs", api));

    let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
    tracing::info!("Server running on 0.0.0.0:8080");
    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .await
    .map_err(|e| color_eyre::Report::msg(format!("Failed to start server: {e}")))?;

    Ok(())
}

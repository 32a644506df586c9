//! OpenAPI/Utoipa configuration.

use crate::api::{applications::APPLICATIONS_TAG, health::MISC_TAG, verification::VERIFICATION_TAG};
use crate::oauth2::OAUTH2_TAG;
use utoipa::{
    Modify, OpenApi,
    openapi::security::{HttpAuthScheme, HttpBuilder, OAuth2, Scopes, SecurityScheme},
};

/// Security addon for OpenAPI documentation.
pub struct SecurityAddon;

impl Modify for SecurityAddon {
    #[tracing::instrument(skip(self, openapi))]
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            // Admin bearer key for the application registry
            let admin = HttpBuilder::new()
                .scheme(HttpAuthScheme::Bearer)
                .description(Some(
                    "Administrative API key configured via `admin_api_key`. Required for the application registry endpoints.",
                ))
                .build();
            components.add_security_scheme("AdminKey", SecurityScheme::Http(admin));

            // Per-application bearer credential (api_key or stored upstream access token)
            let app = HttpBuilder::new()
                .scheme(HttpAuthScheme::Bearer)
                .description(Some(
                    "Per-application credential: the application's `api_key`, or an unexpired \
                     upstream access token stored for applications with `store_tokens` enabled.",
                ))
                .build();
            components.add_security_scheme("ApplicationKey", SecurityScheme::Http(app));

            // OAuth2 Authorization Code flow against this service's facade
            let oauth2 = OAuth2::new([utoipa::openapi::security::Flow::AuthorizationCode(
                utoipa::openapi::security::AuthorizationCode::new(
                    "/oauth2-server/authorize",
                    "/oauth2-server/token",
                    Scopes::from_iter([
                        ("openid", "OpenID Connect scope"),
                        ("email", "Access to user email"),
                        ("profile", "Access to user profile"),
                    ]),
                ),
            )]);
            components.add_security_scheme("OAuth2", SecurityScheme::OAuth2(oauth2));
        }
    }
}

/// OpenAPI documentation configuration.
#[derive(OpenApi)]
#[openapi(
    modifiers(&SecurityAddon),
    info(
        title = "GPT Gatekeeper API",
        version = "1.0.0",
        description = "Verification gate for custom GPT integrations: email OTP and bridged \
                       OAuth identity verification in front of gated actions."
    ),
    tags(
        (name = MISC_TAG, description = "Miscellaneous endpoints"),
        (name = APPLICATIONS_TAG, description = "Application registry endpoints"),
        (name = VERIFICATION_TAG, description = "Email OTP verification endpoints"),
        (name = OAUTH2_TAG, description = "OAuth2 authorization server facade")
    )
)]
pub struct ApiDoc;

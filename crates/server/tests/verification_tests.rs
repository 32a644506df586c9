//! Application registry and email OTP verification endpoint tests.

use axum::{
    Extension, Router,
    routing::{get, post},
};
use axum_test::TestServer;
use gpt_gatekeeper::{
    AppResources,
    api::{applications, health, verification},
    config::{AppConfig, GoogleConfig, SmtpConfig},
    entity::{application, email_verification_request},
    oauth2::GoogleClient,
};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectionTrait, Database, DatabaseConnection,
    DbBackend, EntityTrait, QueryFilter, Statement,
};
use serde_json::json;
use std::sync::Arc;
use time::OffsetDateTime;

const ADMIN_KEY: &str = "test-admin-key-0123456789abcdef";

async fn create_test_db() -> DatabaseConnection {
    let db = Database::connect("sqlite::memory:").await.expect("connect");

    db.execute(Statement::from_string(
        DbBackend::Sqlite,
        r#"CREATE TABLE application (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            uuid TEXT NOT NULL UNIQUE,
            gpt_name TEXT NOT NULL,
            gpt_url TEXT NOT NULL UNIQUE,
            gpt_description TEXT NULL,
            verification_medium TEXT NOT NULL,
            token_expiry_secs INTEGER NOT NULL DEFAULT 300,
            api_key TEXT NOT NULL UNIQUE,
            client_id TEXT NOT NULL UNIQUE,
            client_secret TEXT NOT NULL,
            store_tokens INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );"#,
    ))
    .await
    .expect("create application table");

    db.execute(Statement::from_string(
        DbBackend::Sqlite,
        r#"CREATE TABLE email_verification_request (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            application_id INTEGER NOT NULL,
            email TEXT NOT NULL,
            otp TEXT NOT NULL,
            is_archived INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            verified_at TEXT NULL,
            archived_at TEXT NULL
        );"#,
    ))
    .await
    .expect("create email_verification_request table");

    db.execute(Statement::from_string(
        DbBackend::Sqlite,
        r#"CREATE TABLE oauth_token (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            application_id INTEGER NOT NULL,
            access_token TEXT NOT NULL,
            refresh_token TEXT NULL,
            expires_at TEXT NOT NULL,
            created_at TEXT NOT NULL
        );"#,
    ))
    .await
    .expect("create oauth_token table");

    db
}

fn create_test_config() -> AppConfig {
    AppConfig {
        database_url: "sqlite::memory:".into(),
        smtp: SmtpConfig {
            server: "localhost".into(),
            port: 25,
            username: "test".into(),
            password: "test".into(),
            from: "noreply@test.example.org".into(),
        },
        google: GoogleConfig {
            client_id: "google-client".into(),
            client_secret: "google-secret".into(),
            auth_url: "https://accounts.google.com/o/oauth2/v2/auth".into(),
            token_url: "https://oauth2.googleapis.com/token".into(),
            userinfo_url: "https://openidconnect.googleapis.com/v1/userinfo".into(),
        },
        public_url: "http://localhost:8080".into(),
        admin_api_key: ADMIN_KEY.into(),
        min_delay_between_verification_secs: 20,
        default_token_expiry_secs: 300,
        oauth_redirect_uri_host: "chat.openai.com".into(),
    }
}

async fn create_test_resources() -> AppResources {
    let db = Arc::new(create_test_db().await);
    let config = Arc::new(create_test_config());
    let mailer = Arc::new(
        lettre::AsyncSmtpTransport::<lettre::Tokio1Executor>::builder_dangerous("localhost")
            .build(),
    );
    let google = GoogleClient::new(config.google.clone(), config.google_callback_url());

    AppResources {
        db,
        mailer,
        config,
        google,
    }
}

fn test_server(resources: AppResources) -> TestServer {
    let app: Router = Router::new()
        .route(
            "/api/v1/custom-gpt-application",
            post(applications::register_application).get(applications::list_applications),
        )
        .route(
            "/api/v1/verification-request",
            post(verification::request_verification),
        )
        .route("/api/v1/verify", post(verification::verify_otp))
        .route("/healthz", get(health::health))
        .layer(Extension(resources));
    TestServer::new(app).expect("create test server")
}

async fn seed_application(db: &DatabaseConnection, gpt_url: &str) -> application::Model {
    let now = OffsetDateTime::now_utc();
    application::ActiveModel {
        id: sea_orm::ActiveValue::NotSet,
        uuid: Set(uuid::Uuid::new_v4().to_string()),
        gpt_name: Set("Test GPT".into()),
        gpt_url: Set(gpt_url.into()),
        gpt_description: Set(None),
        verification_medium: Set(application::VerificationMedium::Email),
        token_expiry_secs: Set(300),
        api_key: Set(uuid::Uuid::new_v4().to_string()),
        client_id: Set(uuid::Uuid::new_v4().to_string()),
        client_secret: Set(uuid::Uuid::new_v4().to_string()),
        store_tokens: Set(false),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(db)
    .await
    .expect("seed application")
}

async fn latest_request(
    db: &DatabaseConnection,
    app_id: i32,
    email: &str,
) -> Option<email_verification_request::Model> {
    use sea_orm::QueryOrder;
    email_verification_request::Entity::find()
        .filter(email_verification_request::Column::ApplicationId.eq(app_id))
        .filter(email_verification_request::Column::Email.eq(email))
        .filter(email_verification_request::Column::IsArchived.eq(false))
        .order_by_desc(email_verification_request::Column::Id)
        .one(db)
        .await
        .expect("query requests")
}

// =============================================================================
// Registry Tests
// =============================================================================

#[tokio::test]
async fn test_register_application_returns_credentials() {
    let resources = create_test_resources().await;
    let server = test_server(resources);

    let response = server
        .post("/api/v1/custom-gpt-application")
        .authorization_bearer(ADMIN_KEY)
        .json(&json!({
            "gpt_name": "Travel Buddy",
            "gpt_url": "https://chat.openai.com/g/travel-buddy",
            "verification_medium": "email"
        }))
        .await;

    response.assert_status(axum::http::StatusCode::CREATED);
    let body: serde_json::Value = response.json();
    assert!(body["api_key"].as_str().is_some_and(|k| !k.is_empty()));
    assert!(body["client_id"].as_str().is_some_and(|k| !k.is_empty()));
    assert!(
        body["client_secret"]
            .as_str()
            .is_some_and(|k| !k.is_empty())
    );
    assert_eq!(body["token_expiry_secs"], 300);
    assert!(
        body["instructions"]
            .as_str()
            .is_some_and(|i| i.contains("Travel Buddy"))
    );
}

#[tokio::test]
async fn test_register_duplicate_gpt_url_conflicts() {
    let resources = create_test_resources().await;
    let server = test_server(resources);

    let payload = json!({
        "gpt_name": "Travel Buddy",
        "gpt_url": "https://chat.openai.com/g/travel-buddy",
        "verification_medium": "email"
    });

    server
        .post("/api/v1/custom-gpt-application")
        .authorization_bearer(ADMIN_KEY)
        .json(&payload)
        .await
        .assert_status(axum::http::StatusCode::CREATED);

    let response = server
        .post("/api/v1/custom-gpt-application")
        .authorization_bearer(ADMIN_KEY)
        .json(&payload)
        .await;

    response.assert_status(axum::http::StatusCode::CONFLICT);
    let body: serde_json::Value = response.json();
    assert!(
        body["detail"]
            .as_str()
            .is_some_and(|d| d.contains("already exists"))
    );
}

#[tokio::test]
async fn test_register_requires_admin_key() {
    let resources = create_test_resources().await;
    let server = test_server(resources);

    let response = server
        .post("/api/v1/custom-gpt-application")
        .authorization_bearer("wrong-key")
        .json(&json!({
            "gpt_name": "Travel Buddy",
            "gpt_url": "https://chat.openai.com/g/travel-buddy",
            "verification_medium": "email"
        }))
        .await;

    response.assert_status_unauthorized();
}

#[tokio::test]
async fn test_list_applications_omits_secrets() {
    let resources = create_test_resources().await;
    seed_application(resources.db.as_ref(), "https://chat.openai.com/g/one").await;
    let server = test_server(resources);

    let response = server
        .get("/api/v1/custom-gpt-application")
        .authorization_bearer(ADMIN_KEY)
        .await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    let entry = &body.as_array().expect("array")[0];
    assert!(entry.get("api_key").is_none());
    assert!(entry.get("client_secret").is_none());
    assert!(entry["client_id"].as_str().is_some());
}

// =============================================================================
// Verification Request Tests
// =============================================================================

#[tokio::test]
async fn test_verification_request_creates_otp() {
    let resources = create_test_resources().await;
    let app = seed_application(resources.db.as_ref(), "https://chat.openai.com/g/one").await;
    let server = test_server(resources.clone());

    let response = server
        .post("/api/v1/verification-request")
        .authorization_bearer(&app.api_key)
        .json(&json!({
            "gpt_application_id": app.uuid,
            "email": "user@example.com"
        }))
        .await;

    response.assert_status(axum::http::StatusCode::ACCEPTED);

    let request = latest_request(resources.db.as_ref(), app.id, "user@example.com")
        .await
        .expect("request stored");
    assert_eq!(request.otp.len(), 8);
    assert!(request.otp.chars().all(|c| c.is_ascii_digit()));
    assert!(request.verified_at.is_none());
}

#[tokio::test]
async fn test_verification_request_rate_limited() {
    let resources = create_test_resources().await;
    let app = seed_application(resources.db.as_ref(), "https://chat.openai.com/g/one").await;
    let server = test_server(resources);

    let payload = json!({
        "gpt_application_id": app.uuid,
        "email": "user@example.com"
    });

    server
        .post("/api/v1/verification-request")
        .authorization_bearer(&app.api_key)
        .json(&payload)
        .await
        .assert_status(axum::http::StatusCode::ACCEPTED);

    let response = server
        .post("/api/v1/verification-request")
        .authorization_bearer(&app.api_key)
        .json(&payload)
        .await;

    response.assert_status(axum::http::StatusCode::TOO_MANY_REQUESTS);
    let body: serde_json::Value = response.json();
    assert!(
        body["detail"]
            .as_str()
            .is_some_and(|d| d.contains("Too many verification requests"))
    );
}

#[tokio::test]
async fn test_new_request_archives_previous_one() {
    let resources = create_test_resources().await;
    let app = seed_application(resources.db.as_ref(), "https://chat.openai.com/g/one").await;

    // Older open request, outside the rate-limit window.
    let old = email_verification_request::ActiveModel {
        id: sea_orm::ActiveValue::NotSet,
        application_id: Set(app.id),
        email: Set("user@example.com".into()),
        otp: Set("11111111".into()),
        is_archived: Set(false),
        created_at: Set(OffsetDateTime::now_utc() - time::Duration::seconds(60)),
        verified_at: Set(None),
        archived_at: Set(None),
    }
    .insert(resources.db.as_ref())
    .await
    .expect("seed old request");

    let server = test_server(resources.clone());
    server
        .post("/api/v1/verification-request")
        .authorization_bearer(&app.api_key)
        .json(&json!({
            "gpt_application_id": app.uuid,
            "email": "user@example.com"
        }))
        .await
        .assert_status(axum::http::StatusCode::ACCEPTED);

    let old = email_verification_request::Entity::find_by_id(old.id)
        .one(resources.db.as_ref())
        .await
        .expect("query")
        .expect("old request still there");
    assert!(old.is_archived);
    assert!(old.archived_at.is_some());

    let fresh = latest_request(resources.db.as_ref(), app.id, "user@example.com")
        .await
        .expect("fresh request");
    assert_ne!(fresh.otp, "11111111");
}

#[tokio::test]
async fn test_verification_request_wrong_application_forbidden() {
    let resources = create_test_resources().await;
    let app = seed_application(resources.db.as_ref(), "https://chat.openai.com/g/one").await;
    let other = seed_application(resources.db.as_ref(), "https://chat.openai.com/g/two").await;
    let server = test_server(resources);

    let response = server
        .post("/api/v1/verification-request")
        .authorization_bearer(&app.api_key)
        .json(&json!({
            "gpt_application_id": other.uuid,
            "email": "user@example.com"
        }))
        .await;

    response.assert_status(axum::http::StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_verification_request_rejected_for_oauth_application() {
    let resources = create_test_resources().await;
    let app = seed_application(resources.db.as_ref(), "https://chat.openai.com/g/one").await;

    let mut active: application::ActiveModel = app.clone().into();
    active.verification_medium = Set(application::VerificationMedium::Google);
    active
        .update(resources.db.as_ref())
        .await
        .expect("update medium");

    let server = test_server(resources);
    let response = server
        .post("/api/v1/verification-request")
        .authorization_bearer(&app.api_key)
        .json(&json!({
            "gpt_application_id": app.uuid,
            "email": "user@example.com"
        }))
        .await;

    response.assert_status_bad_request();
}

// =============================================================================
// Verify Tests
// =============================================================================

#[tokio::test]
async fn test_verify_consumes_otp_once() {
    let resources = create_test_resources().await;
    let app = seed_application(resources.db.as_ref(), "https://chat.openai.com/g/one").await;

    email_verification_request::ActiveModel {
        id: sea_orm::ActiveValue::NotSet,
        application_id: Set(app.id),
        email: Set("user@example.com".into()),
        otp: Set("12345678".into()),
        is_archived: Set(false),
        created_at: Set(OffsetDateTime::now_utc()),
        verified_at: Set(None),
        archived_at: Set(None),
    }
    .insert(resources.db.as_ref())
    .await
    .expect("seed request");

    let server = test_server(resources);
    let payload = json!({
        "gpt_application_id": app.uuid,
        "email": "user@example.com",
        "otp": "12345678"
    });

    let response = server
        .post("/api/v1/verify")
        .authorization_bearer(&app.api_key)
        .json(&payload)
        .await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["email"], "user@example.com");

    // Same code again: single use.
    let response = server
        .post("/api/v1/verify")
        .authorization_bearer(&app.api_key)
        .json(&payload)
        .await;
    response.assert_status_bad_request();
}

#[tokio::test]
async fn test_verify_wrong_otp_rejected() {
    let resources = create_test_resources().await;
    let app = seed_application(resources.db.as_ref(), "https://chat.openai.com/g/one").await;

    email_verification_request::ActiveModel {
        id: sea_orm::ActiveValue::NotSet,
        application_id: Set(app.id),
        email: Set("user@example.com".into()),
        otp: Set("12345678".into()),
        is_archived: Set(false),
        created_at: Set(OffsetDateTime::now_utc()),
        verified_at: Set(None),
        archived_at: Set(None),
    }
    .insert(resources.db.as_ref())
    .await
    .expect("seed request");

    let server = test_server(resources);
    let response = server
        .post("/api/v1/verify")
        .authorization_bearer(&app.api_key)
        .json(&json!({
            "gpt_application_id": app.uuid,
            "email": "user@example.com",
            "otp": "00000000"
        }))
        .await;

    response.assert_status_bad_request();
    let body: serde_json::Value = response.json();
    assert!(
        body["detail"]
            .as_str()
            .is_some_and(|d| d.contains("Either OTP is invalid or has expired"))
    );
}

#[tokio::test]
async fn test_verify_expired_otp_rejected() {
    let resources = create_test_resources().await;
    let app = seed_application(resources.db.as_ref(), "https://chat.openai.com/g/one").await;

    email_verification_request::ActiveModel {
        id: sea_orm::ActiveValue::NotSet,
        application_id: Set(app.id),
        email: Set("user@example.com".into()),
        otp: Set("12345678".into()),
        is_archived: Set(false),
        created_at: Set(OffsetDateTime::now_utc() - time::Duration::seconds(301)),
        verified_at: Set(None),
        archived_at: Set(None),
    }
    .insert(resources.db.as_ref())
    .await
    .expect("seed request");

    let server = test_server(resources);
    let response = server
        .post("/api/v1/verify")
        .authorization_bearer(&app.api_key)
        .json(&json!({
            "gpt_application_id": app.uuid,
            "email": "user@example.com",
            "otp": "12345678"
        }))
        .await;

    response.assert_status_bad_request();
}

#[tokio::test]
async fn test_verify_requires_credential() {
    let resources = create_test_resources().await;
    let app = seed_application(resources.db.as_ref(), "https://chat.openai.com/g/one").await;
    let server = test_server(resources);

    let response = server
        .post("/api/v1/verify")
        .json(&json!({
            "gpt_application_id": app.uuid,
            "email": "user@example.com",
            "otp": "12345678"
        }))
        .await;

    response.assert_status_unauthorized();
}

#[tokio::test]
async fn test_stored_access_token_accepted_as_credential() {
    let resources = create_test_resources().await;
    let app = seed_application(resources.db.as_ref(), "https://chat.openai.com/g/one").await;

    let now = OffsetDateTime::now_utc();
    gpt_gatekeeper::entity::oauth_token::ActiveModel {
        id: sea_orm::ActiveValue::NotSet,
        application_id: Set(app.id),
        access_token: Set("stored-access-token".into()),
        refresh_token: Set(None),
        expires_at: Set(now + time::Duration::hours(1)),
        created_at: Set(now),
    }
    .insert(resources.db.as_ref())
    .await
    .expect("seed token");

    let server = test_server(resources);
    let response = server
        .post("/api/v1/verification-request")
        .authorization_bearer("stored-access-token")
        .json(&json!({
            "gpt_application_id": app.uuid,
            "email": "user@example.com"
        }))
        .await;

    response.assert_status(axum::http::StatusCode::ACCEPTED);
}

#[tokio::test]
async fn test_expired_stored_token_rejected() {
    let resources = create_test_resources().await;
    let app = seed_application(resources.db.as_ref(), "https://chat.openai.com/g/one").await;

    let now = OffsetDateTime::now_utc();
    gpt_gatekeeper::entity::oauth_token::ActiveModel {
        id: sea_orm::ActiveValue::NotSet,
        application_id: Set(app.id),
        access_token: Set("expired-access-token".into()),
        refresh_token: Set(None),
        expires_at: Set(now - time::Duration::hours(1)),
        created_at: Set(now - time::Duration::hours(2)),
    }
    .insert(resources.db.as_ref())
    .await
    .expect("seed token");

    let server = test_server(resources);
    let response = server
        .post("/api/v1/verification-request")
        .authorization_bearer("expired-access-token")
        .json(&json!({
            "gpt_application_id": app.uuid,
            "email": "user@example.com"
        }))
        .await;

    response.assert_status_unauthorized();
}

#[tokio::test]
async fn test_healthz() {
    let resources = create_test_resources().await;
    let server = test_server(resources);

    let response = server.get("/healthz").await;
    response.assert_status_ok();
    response.assert_text("ok");
}

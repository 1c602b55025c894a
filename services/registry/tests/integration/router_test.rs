use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum_test::TestServer;
use sea_orm::DatabaseConnection;
use serde_json::json;

use checkpoint_core::middleware::ApiKey;

use checkpoint_registry::domain::types::{CodePolicy, TeamPolicy};
use checkpoint_registry::infra::mailer::BrevoMailer;
use checkpoint_registry::infra::platform::DiscordPlatform;
use checkpoint_registry::router::build_router;
use checkpoint_registry::state::AppState;

use crate::helpers::role_map;

const KEY: &str = "test-key";

fn server() -> TestServer {
    let client = reqwest::Client::new();
    let state = AppState {
        db: DatabaseConnection::Disconnected,
        mailer: BrevoMailer {
            client: client.clone(),
            api_url: "http://127.0.0.1:9/mail".to_owned(),
            api_key: "mail-key".to_owned(),
            sender_email: "noreply@example.com".to_owned(),
            sender_name: None,
        },
        platform: DiscordPlatform {
            client,
            api_base: "http://127.0.0.1:9/api".to_owned(),
            bot_token: "bot".to_owned(),
            guild_id: "1".to_owned(),
            all_access_role_id: None,
        },
        api_key: ApiKey::new(KEY),
        code_policy: CodePolicy::default(),
        team_policy: TeamPolicy::default(),
        roles: role_map(),
        organizer_email: None,
    };
    TestServer::new(build_router(state)).unwrap()
}

fn api_key() -> (HeaderName, HeaderValue) {
    (
        HeaderName::from_static("api-key"),
        HeaderValue::from_static(KEY),
    )
}

#[tokio::test]
async fn should_serve_liveness_without_api_key() {
    let response = server().get("/healthz").await;
    assert_eq!(response.status_code(), StatusCode::OK);
}

#[tokio::test]
async fn should_report_not_ready_without_database() {
    let response = server().get("/readyz").await;
    assert_eq!(response.status_code(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn should_reject_calls_without_api_key() {
    let server = server();
    for path in ["/teams/next-id", "/teams"] {
        let response = server.get(path).await;
        assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED, "{path}");
    }
}

#[tokio::test]
async fn should_reject_ineligible_registration() {
    let (name, value) = api_key();
    let response = server()
        .post("/registrants")
        .add_header(name, value)
        .json(&json!({
            "email": "a@x.com",
            "roles": "",
            "isAdultOrOSU": 2,
        }))
        .await;

    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    let body: serde_json::Value = response.json();
    assert_eq!(body["kind"], "VALIDATION");
}

#[tokio::test]
async fn should_reject_blank_external_id_on_verify() {
    let (name, value) = api_key();
    let response = server()
        .post("/verify")
        .add_header(name, value)
        .json(&json!({
            "external_id": "  ",
            "display_name": "ada",
            "email_or_code": "a@x.com",
        }))
        .await;

    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
}

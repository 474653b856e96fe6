//! Routing, authentication and input checks that resolve before any query
//! reaches Postgres. The pool points at an unreachable host.

use std::sync::OnceLock;
use std::time::Duration as StdDuration;

use actix_web::http::{StatusCode, header};
use actix_web::{App, test, web};
use chrono::Duration;
use diesel::PgConnection;
use diesel::r2d2::{ConnectionManager, Pool};
use serde_json::json;

use clinic_records::DbPool;
use clinic_records::ai::AiClient;
use clinic_records::auth::TokenKeys;
use clinic_records::config::AppConfig;
use clinic_records::crypto::CryptoUtils;
use clinic_records::error::ErrorBody;
use clinic_records::handlers;
use clinic_records::report::ReportAssets;

fn signing_pem() -> &'static str {
    static PEM: OnceLock<String> = OnceLock::new();
    PEM.get_or_init(|| {
        let (private_key, _) = CryptoUtils::generate_rsa_key_pair().unwrap();
        CryptoUtils::export_private_key_to_pem(&private_key).unwrap()
    })
}

fn offline_pool() -> DbPool {
    Pool::builder()
        .max_size(1)
        .connection_timeout(StdDuration::from_millis(250))
        .build_unchecked(ConnectionManager::<PgConnection>::new(
            "postgres://nobody@127.0.0.1:1/clinic",
        ))
}

fn offline_ai() -> AiClient {
    let config = AppConfig::from_lookup(|key| {
        (key == "DATABASE_URL").then(|| "postgres://nobody@127.0.0.1:1/clinic".to_string())
    })
    .unwrap();
    AiClient::new(config.speech, config.chat)
}

macro_rules! app {
    () => {
        test::init_service(
            App::new()
                .app_data(web::Data::new(offline_pool()))
                .app_data(web::Data::new(ReportAssets::default()))
                .app_data(web::Data::new(offline_ai()))
                .app_data(web::Data::new(
                    TokenKeys::from_private_pem(signing_pem(), Duration::minutes(30)).unwrap(),
                ))
                .configure(handlers::configure),
        )
        .await
    };
}

#[actix_web::test]
async fn index_reports_running() {
    let app = app!();
    let resp = test::call_service(&app, test::TestRequest::get().uri("/").to_request()).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = test::read_body(resp).await;
    assert!(String::from_utf8_lossy(&body).contains("running"));
}

#[actix_web::test]
async fn protected_routes_require_a_bearer_token() {
    let app = app!();
    let patient = uuid::Uuid::new_v4();
    let user = uuid::Uuid::new_v4();
    let requests = [
        test::TestRequest::get().uri(&format!("/patients/{patient}")),
        test::TestRequest::get().uri(&format!("/patients/{patient}/report?period=week")),
        test::TestRequest::get().uri(&format!("/users/{user}/patients")),
        test::TestRequest::delete().uri(&format!("/patients/{patient}/share/{user}")),
        test::TestRequest::post()
            .uri("/analyze-consultation")
            .set_json(json!({ "transcript": "cough for three days" })),
    ];
    for req in requests {
        let resp = test::call_service(&app, req.to_request()).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        let body: ErrorBody = test::read_body_json(resp).await;
        assert_eq!(body.detail, "Not authenticated");
    }
}

#[actix_web::test]
async fn forged_token_is_rejected() {
    let app = app!();
    let req = test::TestRequest::get()
        .uri(&format!("/patients/{}", uuid::Uuid::new_v4()))
        .insert_header((header::AUTHORIZATION, "Bearer not.a.jwt"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let body: ErrorBody = test::read_body_json(resp).await;
    assert_eq!(body.detail, "Could not validate credentials");
}

#[actix_web::test]
async fn token_from_another_key_is_rejected() {
    let app = app!();
    let (other, _) = CryptoUtils::generate_rsa_key_pair().unwrap();
    let other_pem = CryptoUtils::export_private_key_to_pem(&other).unwrap();
    let other_keys = TokenKeys::from_private_pem(&other_pem, Duration::minutes(5)).unwrap();
    let user = clinic_records::models::User {
        id: uuid::Uuid::new_v4(),
        name: "Ravi Kumar".into(),
        email: "ravi@clinic.in".into(),
        hashed_password: String::new(),
        role: "physician".into(),
        created_at: chrono::Utc::now().naive_utc(),
    };
    let token = other_keys.issue(&user).unwrap();

    let req = test::TestRequest::get()
        .uri(&format!("/users/{}/patients", user.id))
        .insert_header((header::AUTHORIZATION, format!("Bearer {token}")))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[actix_web::test]
async fn malformed_registration_is_a_bad_request() {
    let app = app!();
    let req = test::TestRequest::post()
        .uri("/register_user")
        .insert_header((header::CONTENT_TYPE, "application/json"))
        .set_payload("{\"name\": \"Asha\"")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: ErrorBody = test::read_body_json(resp).await;
    assert!(body.detail.starts_with("Invalid request body"));
}

#[actix_web::test]
async fn registration_fields_are_validated() {
    let app = app!();
    let req = test::TestRequest::post()
        .uri("/register_user")
        .set_json(json!({
            "name": "Asha Rao",
            "email": "not-an-email",
            "password": "s3cret",
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn unreachable_database_is_an_internal_error() {
    let app = app!();
    let req = test::TestRequest::post()
        .uri("/login")
        .set_json(json!({ "email": "asha@clinic.in", "password": "s3cret" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: ErrorBody = test::read_body_json(resp).await;
    assert_eq!(body.detail, "Internal server error");
}

#[actix_web::test]
async fn unknown_route_is_not_found() {
    let app = app!();
    let req = test::TestRequest::get().uri("/nope").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

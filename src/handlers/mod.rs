//! HTTP handlers and route table.

use actix_web::{HttpResponse, Responder, error, web};

use crate::error::ApiError;

pub mod consultation;
pub mod patients;
pub mod records;
pub mod reports;
pub mod sharing;
pub mod users;

/// Registers every route plus JSON/query error handling.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(json_config())
        .app_data(query_config())
        .app_data(path_config())
        .route("/", web::get().to(index))
        .route("/register_user", web::post().to(users::register_user))
        .route("/login", web::post().to(users::login))
        .route("/register_patient", web::post().to(patients::register_patient))
        .service(
            web::scope("/users/{user_id}")
                .route("", web::delete().to(users::delete_user))
                .route("/patients", web::get().to(patients::list_patients))
                .route("/patients/search", web::get().to(patients::search_patients))
                .route("/notes", web::post().to(records::create_note))
                .route("/vitals", web::post().to(records::create_vitals)),
        )
        .service(
            web::scope("/patients/{patient_id}")
                .route("", web::get().to(patients::get_patient))
                .route("/share", web::post().to(sharing::share_patient))
                .route("/share/{user_id}", web::delete().to(sharing::revoke_sharing))
                .route("/access", web::get().to(sharing::list_access))
                .route("/notes", web::get().to(records::list_notes))
                .route("/vitals", web::get().to(records::list_vitals))
                .route("/report", web::get().to(reports::generate_report)),
        )
        .route("/transcribe", web::post().to(consultation::transcribe))
        .route(
            "/analyze-consultation",
            web::post().to(consultation::analyze_consultation),
        );
}

fn json_config() -> web::JsonConfig {
    web::JsonConfig::default().error_handler(|err, _req| {
        let detail = match &err {
            error::JsonPayloadError::ContentType => "Expected a JSON body".to_string(),
            other => format!("Invalid request body: {other}"),
        };
        ApiError::BadRequest(detail).into()
    })
}

fn query_config() -> web::QueryConfig {
    web::QueryConfig::default().error_handler(|err, _req| {
        ApiError::BadRequest(format!("Invalid query parameters: {err}")).into()
    })
}

fn path_config() -> web::PathConfig {
    web::PathConfig::default()
        .error_handler(|err, _req| ApiError::BadRequest(format!("Invalid path: {err}")).into())
}

async fn index() -> impl Responder {
    HttpResponse::Ok().body("Clinic records API is running")
}

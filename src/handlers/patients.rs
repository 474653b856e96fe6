use actix_web::{HttpResponse, web};
use uuid::Uuid;

use crate::DbPool;
use crate::access;
use crate::auth::CurrentUser;
use crate::error::ApiError;
use crate::models::{PatientDetail, PatientListItem, RegisterPatient, SearchQuery};
use crate::store;

// Handler to register a patient owned by the caller
pub async fn register_patient(
    pool: web::Data<DbPool>,
    current: CurrentUser,
    registration: web::Json<RegisterPatient>,
) -> Result<HttpResponse, ApiError> {
    if !current.0.is_physician() {
        return Err(ApiError::Forbidden(
            "Only physicians can register new patients".into(),
        ));
    }
    let registration = registration.into_inner();
    registration.validate()?;

    let new_patient = registration.to_patient(current.id());
    let patient = store::run(&pool, move |conn| store::insert_patient(conn, new_patient)).await?;

    tracing::info!(patient_id = %patient.id, owner = %patient.physician_id, "registered patient");
    Ok(HttpResponse::Created().json(patient))
}

// Handler to list patients owned by or shared with a user
pub async fn list_patients(
    pool: web::Data<DbPool>,
    current: CurrentUser,
    user_id: web::Path<Uuid>,
) -> Result<HttpResponse, ApiError> {
    let user_id = user_id.into_inner();
    current.ensure_is(user_id)?;

    let patients = store::run(&pool, move |conn| store::patients_for_user(conn, user_id)).await?;
    let items: Vec<PatientListItem> = patients.into_iter().map(PatientListItem::from).collect();
    Ok(HttpResponse::Ok().json(items))
}

// Handler to search a user's patients by name or phone number
pub async fn search_patients(
    pool: web::Data<DbPool>,
    current: CurrentUser,
    user_id: web::Path<Uuid>,
    query: web::Query<SearchQuery>,
) -> Result<HttpResponse, ApiError> {
    let user_id = user_id.into_inner();
    current.ensure_is(user_id)?;
    let SearchQuery { q } = query.into_inner();

    let patients =
        store::run(&pool, move |conn| store::search_patients(conn, user_id, &q)).await?;
    let items: Vec<PatientListItem> = patients.into_iter().map(PatientListItem::from).collect();
    Ok(HttpResponse::Ok().json(items))
}

// Handler to get a patient with the caller's access level
pub async fn get_patient(
    pool: web::Data<DbPool>,
    current: CurrentUser,
    patient_id: web::Path<Uuid>,
) -> Result<HttpResponse, ApiError> {
    let patient_id = patient_id.into_inner();
    let user_id = current.id();

    let (patient, permission_level) =
        store::run(&pool, move |conn| access::authorize(conn, patient_id, user_id)).await?;

    let is_owner = patient.physician_id == user_id;
    Ok(HttpResponse::Ok().json(PatientDetail {
        patient,
        permission_level,
        is_owner,
    }))
}

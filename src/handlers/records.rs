use actix_web::{HttpResponse, web};
use uuid::Uuid;

use crate::DbPool;
use crate::access;
use crate::auth::CurrentUser;
use crate::error::ApiError;
use crate::models::{CreatedResponse, NoteCreate, NoteResponse, VitalsCreate};
use crate::store;

// Handler to add a clinical note; needs edit access to the patient
pub async fn create_note(
    pool: web::Data<DbPool>,
    current: CurrentUser,
    user_id: web::Path<Uuid>,
    note: web::Json<NoteCreate>,
) -> Result<HttpResponse, ApiError> {
    let user_id = user_id.into_inner();
    current.ensure_is(user_id)?;
    let note = note.into_inner();
    note.validate()?;

    let created = store::run(&pool, move |conn| {
        access::require_edit(conn, note.patient_id, user_id)?;
        store::insert_note(conn, note.to_note(user_id))
    })
    .await?;

    tracing::info!(note_id = %created.id, patient_id = %created.patient_id, "note created");
    Ok(HttpResponse::Created().json(CreatedResponse {
        id: created.id,
        message: "Note created successfully".into(),
    }))
}

// Handler to list a patient's notes, newest first
pub async fn list_notes(
    pool: web::Data<DbPool>,
    current: CurrentUser,
    patient_id: web::Path<Uuid>,
) -> Result<HttpResponse, ApiError> {
    let patient_id = patient_id.into_inner();
    let user_id = current.id();

    let notes = store::run(&pool, move |conn| {
        access::authorize(conn, patient_id, user_id)?;
        store::notes_for_patient(conn, patient_id, None)
    })
    .await?;

    let response: Vec<NoteResponse> = notes
        .into_iter()
        .map(|(note, physician_name)| NoteResponse { note, physician_name })
        .collect();
    Ok(HttpResponse::Ok().json(response))
}

// Handler to log a vitals reading; needs edit access to the patient
pub async fn create_vitals(
    pool: web::Data<DbPool>,
    current: CurrentUser,
    user_id: web::Path<Uuid>,
    reading: web::Json<VitalsCreate>,
) -> Result<HttpResponse, ApiError> {
    let user_id = user_id.into_inner();
    current.ensure_is(user_id)?;
    let reading = reading.into_inner();
    reading.validate()?;

    let created = store::run(&pool, move |conn| {
        access::require_edit(conn, reading.patient_id, user_id)?;
        store::insert_vitals(conn, reading.to_reading(user_id))
    })
    .await?;

    tracing::info!(vitals_id = %created.id, patient_id = %created.patient_id, "vitals logged");
    Ok(HttpResponse::Created().json(CreatedResponse {
        id: created.id,
        message: "Vitals logged successfully".into(),
    }))
}

// Handler to list a patient's vitals, newest first
pub async fn list_vitals(
    pool: web::Data<DbPool>,
    current: CurrentUser,
    patient_id: web::Path<Uuid>,
) -> Result<HttpResponse, ApiError> {
    let patient_id = patient_id.into_inner();
    let user_id = current.id();

    let readings = store::run(&pool, move |conn| {
        access::authorize(conn, patient_id, user_id)?;
        store::vitals_for_patient(conn, patient_id, None)
    })
    .await?;

    Ok(HttpResponse::Ok().json(readings))
}

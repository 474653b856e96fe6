//! Blocking diesel queries, run on actix's blocking pool through [`run`].

use std::collections::HashSet;

use actix_web::web;
use diesel::prelude::*;
use uuid::Uuid;

use crate::DbPool;
use crate::error::{ApiError, is_unique_violation};
use crate::models::{
    NewNote, NewPatient, NewSharedAccess, NewUser, NewVitalsReading, Note, Patient,
    PermissionLevel, SharedAccess, User, VitalsReading,
};
use crate::report::ReportWindow;
use crate::schema::{notes, patients, shared_access, users, vitals};

/// Runs `f` with a pooled connection off the async executor.
pub async fn run<F, T>(pool: &DbPool, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&mut PgConnection) -> Result<T, ApiError> + Send + 'static,
    T: Send + 'static,
{
    let pool = pool.clone();
    web::block(move || {
        let mut conn = pool.get()?;
        f(&mut conn)
    })
    .await?
}

// Users

pub fn find_user(conn: &mut PgConnection, user_id: Uuid) -> Result<Option<User>, ApiError> {
    Ok(users::table
        .find(user_id)
        .select(User::as_select())
        .first(conn)
        .optional()?)
}

pub fn find_user_by_email(conn: &mut PgConnection, email: &str) -> Result<Option<User>, ApiError> {
    Ok(users::table
        .filter(users::email.eq(email))
        .select(User::as_select())
        .first(conn)
        .optional()?)
}

pub fn insert_user(conn: &mut PgConnection, new_user: NewUser) -> Result<User, ApiError> {
    if find_user_by_email(conn, &new_user.email)?.is_some() {
        return Err(ApiError::BadRequest("User already exists".into()));
    }
    diesel::insert_into(users::table)
        .values(&new_user)
        .returning(User::as_returning())
        .get_result(conn)
        .map_err(|e| {
            if is_unique_violation(&e) {
                ApiError::BadRequest("User already exists".into())
            } else {
                e.into()
            }
        })
}

/// Deletes a user; owned patients, their records and grants go with it.
pub fn delete_user(conn: &mut PgConnection, user_id: Uuid) -> Result<usize, ApiError> {
    Ok(diesel::delete(users::table.find(user_id)).execute(conn)?)
}

// Patients

pub fn find_patient(conn: &mut PgConnection, patient_id: Uuid) -> Result<Option<Patient>, ApiError> {
    Ok(patients::table
        .find(patient_id)
        .select(Patient::as_select())
        .first(conn)
        .optional()?)
}

pub fn insert_patient(conn: &mut PgConnection, new_patient: NewPatient) -> Result<Patient, ApiError> {
    let duplicate = || ApiError::BadRequest("Patient with this phone number already exists".into());
    let existing: i64 = patients::table
        .filter(patients::phone_number.eq(&new_patient.phone_number))
        .count()
        .get_result(conn)?;
    if existing > 0 {
        return Err(duplicate());
    }
    diesel::insert_into(patients::table)
        .values(&new_patient)
        .returning(Patient::as_returning())
        .get_result(conn)
        .map_err(|e| if is_unique_violation(&e) { duplicate() } else { e.into() })
}

/// Patients the user owns followed by those shared with them, each once.
pub fn patients_for_user(conn: &mut PgConnection, user_id: Uuid) -> Result<Vec<Patient>, ApiError> {
    let owned = patients::table
        .filter(patients::physician_id.eq(user_id))
        .order(patients::name.asc())
        .select(Patient::as_select())
        .load(conn)?;
    let shared = shared_access::table
        .inner_join(patients::table)
        .filter(shared_access::user_id.eq(user_id))
        .order(patients::name.asc())
        .select(Patient::as_select())
        .load(conn)?;
    Ok(merge_unique(owned, shared))
}

pub fn merge_unique(owned: Vec<Patient>, shared: Vec<Patient>) -> Vec<Patient> {
    let mut seen = HashSet::new();
    owned
        .into_iter()
        .chain(shared)
        .filter(|p| seen.insert(p.id))
        .collect()
}

/// Case-insensitive substring match on name or phone number.
pub fn matches_search(patient: &Patient, query: &str) -> bool {
    let needle = query.trim().to_lowercase();
    patient.name.to_lowercase().contains(&needle)
        || patient.phone_number.to_lowercase().contains(&needle)
}

pub fn search_patients(
    conn: &mut PgConnection,
    user_id: Uuid,
    query: &str,
) -> Result<Vec<Patient>, ApiError> {
    Ok(patients_for_user(conn, user_id)?
        .into_iter()
        .filter(|p| matches_search(p, query))
        .collect())
}

// Sharing

pub fn find_grant(
    conn: &mut PgConnection,
    patient_id: Uuid,
    user_id: Uuid,
) -> Result<Option<PermissionLevel>, ApiError> {
    Ok(shared_access::table
        .filter(shared_access::patient_id.eq(patient_id))
        .filter(shared_access::user_id.eq(user_id))
        .select(shared_access::permission)
        .first::<PermissionLevel>(conn)
        .optional()?)
}

// Shared with the SQL tests below so they check the statement actually sent.
macro_rules! upsert_grant_statement {
    ($grant:expr) => {
        diesel::insert_into(shared_access::table)
            .values($grant)
            .on_conflict((shared_access::patient_id, shared_access::user_id))
            .do_update()
            .set(shared_access::permission.eq($grant.permission))
    };
}

/// Inserts a grant or updates the level of the existing (patient, user) row.
pub fn upsert_grant(conn: &mut PgConnection, grant: NewSharedAccess) -> Result<SharedAccess, ApiError> {
    Ok(upsert_grant_statement!(&grant)
        .returning(SharedAccess::as_returning())
        .get_result(conn)?)
}

pub fn delete_grant(conn: &mut PgConnection, patient_id: Uuid, user_id: Uuid) -> Result<usize, ApiError> {
    Ok(diesel::delete(
        shared_access::table
            .filter(shared_access::patient_id.eq(patient_id))
            .filter(shared_access::user_id.eq(user_id)),
    )
    .execute(conn)?)
}

/// Grants on a patient with the holder's name and email.
pub fn grants_for_patient(
    conn: &mut PgConnection,
    patient_id: Uuid,
) -> Result<Vec<(SharedAccess, String, String)>, ApiError> {
    Ok(shared_access::table
        .inner_join(users::table.on(users::id.eq(shared_access::user_id)))
        .filter(shared_access::patient_id.eq(patient_id))
        .order(shared_access::created_at.asc())
        .select((SharedAccess::as_select(), users::name, users::email))
        .load(conn)?)
}

// Notes

pub fn insert_note(conn: &mut PgConnection, note: NewNote) -> Result<Note, ApiError> {
    Ok(diesel::insert_into(notes::table)
        .values(&note)
        .returning(Note::as_returning())
        .get_result(conn)?)
}

// Newest first, restricted to `start <= created_at < end` when a window is given.
macro_rules! notes_query {
    ($patient_id:expr, $window:expr) => {{
        let mut query = notes::table
            .inner_join(users::table)
            .select((Note::as_select(), users::name))
            .filter(notes::patient_id.eq($patient_id))
            .into_boxed::<diesel::pg::Pg>();
        if let Some(window) = $window {
            if let Some(start) = window.start {
                query = query.filter(notes::created_at.ge(start));
            }
            query = query.filter(notes::created_at.lt(window.end));
        }
        query.order(notes::created_at.desc())
    }};
}

/// Notes with author names, newest first.
pub fn notes_for_patient(
    conn: &mut PgConnection,
    patient_id: Uuid,
    window: Option<&ReportWindow>,
) -> Result<Vec<(Note, String)>, ApiError> {
    Ok(notes_query!(patient_id, window).load(conn)?)
}

// Vitals

pub fn insert_vitals(conn: &mut PgConnection, reading: NewVitalsReading) -> Result<VitalsReading, ApiError> {
    Ok(diesel::insert_into(vitals::table)
        .values(&reading)
        .returning(VitalsReading::as_returning())
        .get_result(conn)?)
}

macro_rules! vitals_query {
    ($patient_id:expr, $window:expr) => {{
        let mut query = vitals::table
            .select(VitalsReading::as_select())
            .filter(vitals::patient_id.eq($patient_id))
            .into_boxed::<diesel::pg::Pg>();
        if let Some(window) = $window {
            if let Some(start) = window.start {
                query = query.filter(vitals::created_at.ge(start));
            }
            query = query.filter(vitals::created_at.lt(window.end));
        }
        query.order(vitals::created_at.desc())
    }};
}

/// Readings newest first.
pub fn vitals_for_patient(
    conn: &mut PgConnection,
    patient_id: Uuid,
    window: Option<&ReportWindow>,
) -> Result<Vec<VitalsReading>, ApiError> {
    Ok(vitals_query!(patient_id, window).load(conn)?)
}

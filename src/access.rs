//! Ownership and shared-grant access control for patient records.

use diesel::PgConnection;
use uuid::Uuid;

use crate::error::ApiError;
use crate::models::{Patient, PermissionLevel};
use crate::store;

/// Resolves the level a user holds on a patient.
///
/// The owner always resolves to `Edit`, whatever grant rows exist.
pub fn effective_permission(
    owner_id: Uuid,
    user_id: Uuid,
    grant: Option<PermissionLevel>,
) -> Option<PermissionLevel> {
    if owner_id == user_id {
        Some(PermissionLevel::Edit)
    } else {
        grant
    }
}

/// Loads the patient and the caller's level on it.
///
/// Errors with `NotFound` for an unknown patient and `Forbidden` when the
/// caller neither owns it nor holds a grant.
pub fn authorize(
    conn: &mut PgConnection,
    patient_id: Uuid,
    user_id: Uuid,
) -> Result<(Patient, PermissionLevel), ApiError> {
    let patient = store::find_patient(conn, patient_id)?
        .ok_or_else(|| ApiError::NotFound("Patient not found".into()))?;
    let grant = if patient.physician_id == user_id {
        None
    } else {
        store::find_grant(conn, patient_id, user_id)?
    };
    match effective_permission(patient.physician_id, user_id, grant) {
        Some(level) => Ok((patient, level)),
        None => Err(ApiError::Forbidden(
            "Access forbidden: You do not have permission to view this patient".into(),
        )),
    }
}

/// Like [`authorize`], but writes need `Edit` exactly.
pub fn require_edit(
    conn: &mut PgConnection,
    patient_id: Uuid,
    user_id: Uuid,
) -> Result<Patient, ApiError> {
    let (patient, level) = authorize(conn, patient_id, user_id)?;
    ensure_edit(level)?;
    Ok(patient)
}

pub fn ensure_edit(level: PermissionLevel) -> Result<(), ApiError> {
    match level {
        PermissionLevel::Edit => Ok(()),
        PermissionLevel::View => Err(ApiError::Forbidden(
            "Edit access required for this patient".into(),
        )),
    }
}

/// Owner-only actions (granting and revoking).
pub fn require_owner(
    conn: &mut PgConnection,
    patient_id: Uuid,
    user_id: Uuid,
    action: &str,
) -> Result<Patient, ApiError> {
    let patient = store::find_patient(conn, patient_id)?
        .ok_or_else(|| ApiError::NotFound("Patient not found".into()))?;
    if patient.physician_id != user_id {
        return Err(ApiError::Forbidden(format!(
            "Only the patient owner can {action}"
        )));
    }
    Ok(patient)
}

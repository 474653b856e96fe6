use std::fmt;
use std::io::Write;

use chrono::{NaiveDateTime, Utc};
use diesel::deserialize::{self, FromSql, FromSqlRow};
use diesel::expression::AsExpression;
use diesel::pg::{Pg, PgValue};
use diesel::prelude::*;
use diesel::serialize::{self, IsNull, Output, ToSql};
use diesel::sql_types::Text;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ApiError;
use crate::schema::{notes, patients, shared_access, users, vitals};

pub const DEFAULT_ROLE: &str = "physician";

/// Level of access a grant confers on a patient record.
///
/// Owners are never stored with a level; they resolve to `Edit`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, AsExpression, FromSqlRow,
)]
#[diesel(sql_type = Text)]
#[serde(rename_all = "UPPERCASE")]
pub enum PermissionLevel {
    #[default]
    View,
    Edit,
}

impl PermissionLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            PermissionLevel::View => "VIEW",
            PermissionLevel::Edit => "EDIT",
        }
    }
}

impl fmt::Display for PermissionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ToSql<Text, Pg> for PermissionLevel {
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> serialize::Result {
        out.write_all(self.as_str().as_bytes())?;
        Ok(IsNull::No)
    }
}

impl FromSql<Text, Pg> for PermissionLevel {
    fn from_sql(bytes: PgValue<'_>) -> deserialize::Result<Self> {
        match bytes.as_bytes() {
            b"VIEW" => Ok(PermissionLevel::View),
            b"EDIT" => Ok(PermissionLevel::Edit),
            other => Err(format!(
                "Unrecognized permission level: {}",
                String::from_utf8_lossy(other)
            )
            .into()),
        }
    }
}

// Users

#[derive(Debug, Clone, Queryable, Selectable, Identifiable)]
#[diesel(table_name = users)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub hashed_password: String,
    pub role: String,
    pub created_at: NaiveDateTime,
}

impl User {
    pub fn is_physician(&self) -> bool {
        self.role == DEFAULT_ROLE
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = users)]
pub struct NewUser {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub hashed_password: String,
    pub role: String,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Deserialize)]
pub struct RegisterUser {
    pub name: String,
    pub email: String,
    pub password: String,
    #[serde(default = "default_role")]
    pub role: String,
}

fn default_role() -> String {
    DEFAULT_ROLE.to_string()
}

impl RegisterUser {
    pub fn validate(&self) -> Result<(), ApiError> {
        check_text("name", &self.name, 50)?;
        check_email(&self.email)?;
        check_text("role", &self.role, 20)?;
        if self.password.is_empty() {
            return Err(ApiError::BadRequest("password must not be empty".into()));
        }
        Ok(())
    }

    /// Builds the insertable row; the caller supplies the already hashed password.
    pub fn to_user(&self, hashed_password: String) -> NewUser {
        NewUser {
            id: Uuid::new_v4(),
            name: self.name.trim().to_string(),
            email: normalize_email(&self.email),
            hashed_password,
            role: self.role.clone(),
            created_at: Utc::now().naive_utc(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserOut {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: String,
}

impl From<&User> for UserOut {
    fn from(user: &User) -> Self {
        UserOut {
            id: user.id,
            name: user.name.clone(),
            email: user.email.clone(),
            role: user.role.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub token_type: String,
    pub user: UserOut,
}

// Patients

#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Identifiable, Serialize)]
#[diesel(table_name = patients)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Patient {
    pub id: Uuid,
    pub name: String,
    pub phone_number: String,
    pub membership_price: f64,
    pub physician_id: Uuid,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Insertable, Serialize)]
#[diesel(table_name = patients)]
pub struct NewPatient {
    pub id: Uuid,
    pub name: String,
    pub phone_number: String,
    pub membership_price: f64,
    pub physician_id: Uuid,
    pub created_at: NaiveDateTime,
}

/// Patient registration payload. Any owner id sent by the client is ignored;
/// the authenticated caller always becomes the owner.
#[derive(Debug, Deserialize)]
pub struct RegisterPatient {
    pub name: String,
    pub phone_number: String,
    pub membership_price: f64,
}

impl RegisterPatient {
    pub fn validate(&self) -> Result<(), ApiError> {
        check_text("name", &self.name, 50)?;
        check_text("phone_number", &self.phone_number, 15)?;
        if !self.membership_price.is_finite() || self.membership_price < 0.0 {
            return Err(ApiError::BadRequest(
                "membership_price must be a non-negative number".into(),
            ));
        }
        Ok(())
    }

    pub fn to_patient(&self, owner_id: Uuid) -> NewPatient {
        NewPatient {
            id: Uuid::new_v4(),
            name: self.name.trim().to_string(),
            phone_number: self.phone_number.trim().to_string(),
            membership_price: self.membership_price,
            physician_id: owner_id,
            created_at: Utc::now().naive_utc(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PatientListItem {
    pub id: Uuid,
    pub name: String,
    pub phone_number: String,
    pub physician_id: Uuid,
}

impl From<Patient> for PatientListItem {
    fn from(patient: Patient) -> Self {
        PatientListItem {
            id: patient.id,
            name: patient.name,
            phone_number: patient.phone_number,
            physician_id: patient.physician_id,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PatientDetail {
    #[serde(flatten)]
    pub patient: Patient,
    pub permission_level: PermissionLevel,
    pub is_owner: bool,
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub q: String,
}

// Sharing

#[derive(Debug, Clone, Queryable, Selectable, Identifiable, Serialize)]
#[diesel(table_name = shared_access)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct SharedAccess {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub user_id: Uuid,
    pub granted_by: Uuid,
    pub permission: PermissionLevel,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = shared_access)]
pub struct NewSharedAccess {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub user_id: Uuid,
    pub granted_by: Uuid,
    pub permission: PermissionLevel,
    pub created_at: NaiveDateTime,
}

impl NewSharedAccess {
    pub fn new(patient_id: Uuid, user_id: Uuid, granted_by: Uuid, permission: PermissionLevel) -> Self {
        NewSharedAccess {
            id: Uuid::new_v4(),
            patient_id,
            user_id,
            granted_by,
            permission,
            created_at: Utc::now().naive_utc(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ShareRequest {
    pub user_email: String,
    #[serde(default)]
    pub permission: PermissionLevel,
}

#[derive(Debug, Serialize)]
pub struct SharedAccessResponse {
    #[serde(flatten)]
    pub access: SharedAccess,
    pub user_name: String,
    pub user_email: String,
}

// Notes

#[derive(Debug, Clone, Queryable, Selectable, Identifiable, Serialize)]
#[diesel(table_name = notes)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Note {
    pub id: Uuid,
    pub physician_id: Uuid,
    pub patient_id: Uuid,
    pub chief_complaint: Option<String>,
    pub subjective: Option<String>,
    pub objective: Option<String>,
    pub assessment: Option<String>,
    pub plan: Option<String>,
    pub raw_notes: Option<String>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = notes)]
pub struct NewNote {
    pub id: Uuid,
    pub physician_id: Uuid,
    pub patient_id: Uuid,
    pub chief_complaint: Option<String>,
    pub subjective: Option<String>,
    pub objective: Option<String>,
    pub assessment: Option<String>,
    pub plan: Option<String>,
    pub raw_notes: Option<String>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Deserialize)]
pub struct NoteCreate {
    pub patient_id: Uuid,
    pub chief_complaint: Option<String>,
    pub subjective: Option<String>,
    pub objective: Option<String>,
    pub assessment: Option<String>,
    pub plan: Option<String>,
    pub raw_notes: Option<String>,
}

impl NoteCreate {
    pub fn validate(&self) -> Result<(), ApiError> {
        if let Some(cc) = &self.chief_complaint {
            if cc.chars().count() > 500 {
                return Err(ApiError::BadRequest(
                    "chief_complaint must be at most 500 characters".into(),
                ));
            }
        }
        Ok(())
    }

    pub fn to_note(self, author_id: Uuid) -> NewNote {
        NewNote {
            id: Uuid::new_v4(),
            physician_id: author_id,
            patient_id: self.patient_id,
            chief_complaint: self.chief_complaint,
            subjective: self.subjective,
            objective: self.objective,
            assessment: self.assessment,
            plan: self.plan,
            raw_notes: self.raw_notes,
            created_at: Utc::now().naive_utc(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct NoteResponse {
    #[serde(flatten)]
    pub note: Note,
    pub physician_name: String,
}

// Vitals

#[derive(Debug, Clone, Queryable, Selectable, Identifiable, Serialize)]
#[diesel(table_name = vitals)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct VitalsReading {
    pub id: Uuid,
    pub physician_id: Uuid,
    pub patient_id: Uuid,
    pub systolic_bp: Option<i32>,
    pub diastolic_bp: Option<i32>,
    pub heart_rate: Option<i32>,
    pub temperature: Option<f64>,
    pub spo2: Option<i32>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = vitals)]
pub struct NewVitalsReading {
    pub id: Uuid,
    pub physician_id: Uuid,
    pub patient_id: Uuid,
    pub systolic_bp: Option<i32>,
    pub diastolic_bp: Option<i32>,
    pub heart_rate: Option<i32>,
    pub temperature: Option<f64>,
    pub spo2: Option<i32>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Deserialize)]
pub struct VitalsCreate {
    pub patient_id: Uuid,
    pub systolic_bp: Option<i32>,
    pub diastolic_bp: Option<i32>,
    pub heart_rate: Option<i32>,
    pub temperature: Option<f64>,
    pub spo2: Option<i32>,
}

impl VitalsCreate {
    pub fn validate(&self) -> Result<(), ApiError> {
        let non_negative = [
            ("systolic_bp", self.systolic_bp),
            ("diastolic_bp", self.diastolic_bp),
            ("heart_rate", self.heart_rate),
            ("spo2", self.spo2),
        ];
        for (field, value) in non_negative {
            if matches!(value, Some(v) if v < 0) {
                return Err(ApiError::BadRequest(format!("{field} must not be negative")));
            }
        }
        if matches!(self.spo2, Some(v) if v > 100) {
            return Err(ApiError::BadRequest("spo2 must be at most 100".into()));
        }
        if matches!(self.temperature, Some(t) if !t.is_finite()) {
            return Err(ApiError::BadRequest("temperature must be a number".into()));
        }
        Ok(())
    }

    pub fn to_reading(self, author_id: Uuid) -> NewVitalsReading {
        NewVitalsReading {
            id: Uuid::new_v4(),
            physician_id: author_id,
            patient_id: self.patient_id,
            systolic_bp: self.systolic_bp,
            diastolic_bp: self.diastolic_bp,
            heart_rate: self.heart_rate,
            temperature: self.temperature,
            spo2: self.spo2,
            created_at: Utc::now().naive_utc(),
        }
    }
}

// Generic responses

#[derive(Debug, Serialize, Deserialize)]
pub struct CreatedResponse {
    pub id: Uuid,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn check_text(field: &str, value: &str, max_chars: usize) -> Result<(), ApiError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ApiError::BadRequest(format!("{field} must not be empty")));
    }
    if trimmed.chars().count() > max_chars {
        return Err(ApiError::BadRequest(format!(
            "{field} must be at most {max_chars} characters"
        )));
    }
    Ok(())
}

fn check_email(email: &str) -> Result<(), ApiError> {
    check_text("email", email, 100)?;
    let email = email.trim();
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !domain.contains('@')
                && !email.contains(char::is_whitespace)
        }
        None => false,
    };
    if valid {
        Ok(())
    } else {
        Err(ApiError::BadRequest("email is not a valid address".into()))
    }
}

use actix_web::{HttpResponse, web};
use uuid::Uuid;

use crate::DbPool;
use crate::access;
use crate::auth::CurrentUser;
use crate::error::ApiError;
use crate::models::{
    MessageResponse, NewSharedAccess, ShareRequest, SharedAccessResponse, normalize_email,
};
use crate::store;

// Handler to grant (or change) another user's access to a patient
pub async fn share_patient(
    pool: web::Data<DbPool>,
    current: CurrentUser,
    patient_id: web::Path<Uuid>,
    request: web::Json<ShareRequest>,
) -> Result<HttpResponse, ApiError> {
    let patient_id = patient_id.into_inner();
    let owner_id = current.id();
    let ShareRequest { user_email, permission } = request.into_inner();
    let user_email = normalize_email(&user_email);

    let response = store::run(&pool, move |conn| {
        access::require_owner(conn, patient_id, owner_id, "share this record")?;

        let target = store::find_user_by_email(conn, &user_email)?
            .ok_or_else(|| ApiError::NotFound("User with this email not found".into()))?;
        if target.id == owner_id {
            return Err(ApiError::BadRequest("Cannot share with yourself".into()));
        }

        let grant = store::upsert_grant(
            conn,
            NewSharedAccess::new(patient_id, target.id, owner_id, permission),
        )?;
        Ok(SharedAccessResponse {
            access: grant,
            user_name: target.name,
            user_email: target.email,
        })
    })
    .await?;

    tracing::info!(
        %patient_id,
        user_id = %response.access.user_id,
        permission = %response.access.permission,
        "granted patient access"
    );
    Ok(HttpResponse::Ok().json(response))
}

// Handler to revoke a user's access to a patient
pub async fn revoke_sharing(
    pool: web::Data<DbPool>,
    current: CurrentUser,
    path: web::Path<(Uuid, Uuid)>,
) -> Result<HttpResponse, ApiError> {
    let (patient_id, user_id) = path.into_inner();
    let owner_id = current.id();

    let removed = store::run(&pool, move |conn| {
        access::require_owner(conn, patient_id, owner_id, "revoke access")?;
        store::delete_grant(conn, patient_id, user_id)
    })
    .await?;

    tracing::info!(%patient_id, %user_id, removed, "revoked patient access");
    Ok(HttpResponse::Ok().json(MessageResponse {
        message: "Access revoked".into(),
    }))
}

// Handler to list who a patient is shared with
pub async fn list_access(
    pool: web::Data<DbPool>,
    current: CurrentUser,
    patient_id: web::Path<Uuid>,
) -> Result<HttpResponse, ApiError> {
    let patient_id = patient_id.into_inner();
    let user_id = current.id();

    let grants = store::run(&pool, move |conn| {
        access::authorize(conn, patient_id, user_id)?;
        store::grants_for_patient(conn, patient_id)
    })
    .await?;

    let response: Vec<SharedAccessResponse> = grants
        .into_iter()
        .map(|(grant, user_name, user_email)| SharedAccessResponse {
            access: grant,
            user_name,
            user_email,
        })
        .collect();
    Ok(HttpResponse::Ok().json(response))
}

use actix_web::{HttpResponse, web};
use uuid::Uuid;

use crate::DbPool;
use crate::auth::{CurrentUser, TokenKeys};
use crate::crypto::CryptoUtils;
use crate::error::ApiError;
use crate::models::{
    LoginRequest, LoginResponse, MessageResponse, RegisterUser, UserOut, normalize_email,
};
use crate::store;

const BAD_LOGIN: &str = "Invalid email or password";

// Handler to register a new user (physician or staff)
pub async fn register_user(
    pool: web::Data<DbPool>,
    registration: web::Json<RegisterUser>,
) -> Result<HttpResponse, ApiError> {
    let registration = registration.into_inner();
    registration.validate()?;

    let user = store::run(&pool, move |conn| {
        let hashed = CryptoUtils::hash_password(&registration.password).map_err(|e| {
            tracing::error!("Password hashing failed: {:?}", e);
            ApiError::Internal("password hashing failed".into())
        })?;
        store::insert_user(conn, registration.to_user(hashed))
    })
    .await?;

    tracing::info!(user_id = %user.id, role = %user.role, "registered user");
    Ok(HttpResponse::Created().json(UserOut::from(&user)))
}

// Handler to exchange credentials for a bearer token
pub async fn login(
    pool: web::Data<DbPool>,
    keys: web::Data<TokenKeys>,
    credentials: web::Json<LoginRequest>,
) -> Result<HttpResponse, ApiError> {
    let LoginRequest { email, password } = credentials.into_inner();
    let email = normalize_email(&email);

    let user = store::run(&pool, move |conn| {
        let user = store::find_user_by_email(conn, &email)?
            .filter(|user| CryptoUtils::verify_password(&password, &user.hashed_password));
        Ok(user)
    })
    .await?
    .ok_or_else(|| ApiError::Unauthorized(BAD_LOGIN.into()))?;

    let access_token = keys.issue(&user)?;
    Ok(HttpResponse::Ok().json(LoginResponse {
        access_token,
        token_type: "bearer".into(),
        user: UserOut::from(&user),
    }))
}

// Handler to delete one's own account; owned patients go with it
pub async fn delete_user(
    pool: web::Data<DbPool>,
    current: CurrentUser,
    user_id: web::Path<Uuid>,
) -> Result<HttpResponse, ApiError> {
    let user_id = user_id.into_inner();
    current.ensure_is(user_id)?;

    store::run(&pool, move |conn| store::delete_user(conn, user_id)).await?;

    tracing::info!(%user_id, "deleted user and owned records");
    Ok(HttpResponse::Ok().json(MessageResponse {
        message: "User deleted".into(),
    }))
}

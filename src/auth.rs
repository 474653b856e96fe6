//! Bearer-token issuance and verification.
//!
//! Tokens are RS256 JWTs carrying the user id (`sub`), email and role. Every
//! authenticated request reloads the user row, so removing a user revokes
//! their outstanding tokens.

use std::path::Path;

use actix_web::{FromRequest, HttpRequest, dev::Payload, http::header, web};
use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use futures::future::{FutureExt, LocalBoxFuture};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rsa::RsaPublicKey;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::DbPool;
use crate::crypto::CryptoUtils;
use crate::error::ApiError;
use crate::models::User;
use crate::store;

const CREDENTIALS_ERROR: &str = "Could not validate credentials";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Claims {
    pub sub: String,
    pub email: String,
    pub role: String,
    pub iat: i64,
    pub exp: i64,
}

/// Signing and verification keys plus the token lifetime.
pub struct TokenKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl TokenKeys {
    /// Builds keys from a PKCS#1 PEM private key.
    pub fn from_private_pem(pem: &str, ttl: Duration) -> Result<Self> {
        let private_key = CryptoUtils::import_private_key_from_pem(pem)?;
        let public_pem = CryptoUtils::export_public_key_to_pem(&RsaPublicKey::from(&private_key))?;
        Ok(TokenKeys {
            encoding: EncodingKey::from_rsa_pem(pem.as_bytes())
                .context("Failed to load token signing key")?,
            decoding: DecodingKey::from_rsa_pem(public_pem.as_bytes())
                .context("Failed to load token verification key")?,
            ttl,
        })
    }

    /// Loads the signing key from `path`, or generates a throwaway key when no
    /// path is configured.
    pub fn load_or_generate(path: Option<&Path>, ttl: Duration) -> Result<Self> {
        match path {
            Some(path) => {
                let pem = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read {}", path.display()))?;
                tracing::info!("Loaded token signing key from {}", path.display());
                Self::from_private_pem(&pem, ttl)
            }
            None => {
                tracing::warn!(
                    "JWT_PRIVATE_KEY_PATH not set; generating an ephemeral signing key, tokens will not survive a restart"
                );
                let (private_key, _) = CryptoUtils::generate_rsa_key_pair()?;
                let pem = CryptoUtils::export_private_key_to_pem(&private_key)?;
                Self::from_private_pem(&pem, ttl)
            }
        }
    }

    pub fn issue(&self, user: &User) -> Result<String, ApiError> {
        let now = Utc::now();
        let claims = Claims {
            sub: user.id.to_string(),
            email: user.email.clone(),
            role: user.role.clone(),
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
        };
        self.sign(&claims)
    }

    fn sign(&self, claims: &Claims) -> Result<String, ApiError> {
        jsonwebtoken::encode(&Header::new(Algorithm::RS256), claims, &self.encoding)
            .map_err(|e| ApiError::Token(e.to_string()))
    }

    pub fn verify(&self, token: &str) -> Result<Claims, ApiError> {
        jsonwebtoken::decode::<Claims>(token, &self.decoding, &Validation::new(Algorithm::RS256))
            .map(|data| data.claims)
            .map_err(|e| {
                tracing::debug!("Rejected bearer token: {}", e);
                ApiError::Unauthorized(CREDENTIALS_ERROR.into())
            })
    }
}

fn bearer_token(req: &HttpRequest) -> Result<String, ApiError> {
    let unauthorized = || ApiError::Unauthorized("Not authenticated".into());
    let value = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(unauthorized)?;
    let (scheme, token) = value.trim().split_once(' ').ok_or_else(unauthorized)?;
    if !scheme.eq_ignore_ascii_case("bearer") || token.trim().is_empty() {
        return Err(unauthorized());
    }
    Ok(token.trim().to_string())
}

/// The authenticated caller, resolved from the bearer token.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

impl CurrentUser {
    pub fn id(&self) -> Uuid {
        self.0.id
    }

    /// Rejects requests scoped to another user's path.
    pub fn ensure_is(&self, user_id: Uuid) -> Result<(), ApiError> {
        if self.0.id == user_id {
            Ok(())
        } else {
            Err(ApiError::forbidden())
        }
    }
}

impl FromRequest for CurrentUser {
    type Error = ApiError;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        let token = bearer_token(req);
        let keys = req.app_data::<web::Data<TokenKeys>>().cloned();
        let pool = req.app_data::<web::Data<DbPool>>().cloned();

        async move {
            let token = token?;
            let keys =
                keys.ok_or_else(|| ApiError::Config("Token keys are not configured".into()))?;
            let claims = keys.verify(&token)?;
            let user_id = Uuid::parse_str(&claims.sub)
                .map_err(|_| ApiError::Unauthorized(CREDENTIALS_ERROR.into()))?;
            let pool =
                pool.ok_or_else(|| ApiError::Config("Database pool is not configured".into()))?;
            let user = store::run(&pool, move |conn| store::find_user(conn, user_id)).await?;
            user.map(CurrentUser)
                .ok_or_else(|| ApiError::Unauthorized(CREDENTIALS_ERROR.into()))
        }
        .boxed_local()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use actix_web::test::TestRequest;
    use std::sync::OnceLock;

    /// One signing key per test binary; RSA generation is slow in debug builds.
    pub(crate) fn test_pem() -> &'static str {
        static PEM: OnceLock<String> = OnceLock::new();
        PEM.get_or_init(|| {
            let (private_key, _) = CryptoUtils::generate_rsa_key_pair().unwrap();
            CryptoUtils::export_private_key_to_pem(&private_key).unwrap()
        })
    }

    pub(crate) fn test_keys() -> TokenKeys {
        TokenKeys::from_private_pem(test_pem(), Duration::minutes(30)).unwrap()
    }

    pub(crate) fn sample_user() -> User {
        User {
            id: Uuid::new_v4(),
            name: "Meera Iyer".into(),
            email: "meera@clinic.in".into(),
            hashed_password: String::new(),
            role: "physician".into(),
            created_at: Utc::now().naive_utc(),
        }
    }

    #[test]
    fn issued_token_carries_identity() {
        let keys = test_keys();
        let user = sample_user();
        let token = keys.issue(&user).unwrap();
        let claims = keys.verify(&token).unwrap();
        assert_eq!(claims.sub, user.id.to_string());
        assert_eq!(claims.email, user.email);
        assert_eq!(claims.role, "physician");
        assert_eq!(claims.exp - claims.iat, 30 * 60);
    }

    #[test]
    fn expired_token_is_rejected() {
        let keys = test_keys();
        let now = Utc::now().timestamp();
        let token = keys
            .sign(&Claims {
                sub: Uuid::new_v4().to_string(),
                email: "x@y.io".into(),
                role: "physician".into(),
                iat: now - 7200,
                exp: now - 3600,
            })
            .unwrap();
        assert!(matches!(keys.verify(&token), Err(ApiError::Unauthorized(_))));
    }

    #[test]
    fn tampered_token_is_rejected() {
        let keys = test_keys();
        let token = keys.issue(&sample_user()).unwrap();
        let mut parts: Vec<&str> = token.split('.').collect();
        parts[2] = "AAAA";
        assert!(keys.verify(&parts.join(".")).is_err());
    }

    #[test]
    fn bearer_scheme_is_required() {
        let req = TestRequest::default()
            .insert_header((header::AUTHORIZATION, "Basic abc"))
            .to_http_request();
        assert!(bearer_token(&req).is_err());

        let req = TestRequest::default()
            .insert_header((header::AUTHORIZATION, "bearer abc.def.ghi"))
            .to_http_request();
        assert_eq!(bearer_token(&req).unwrap(), "abc.def.ghi");

        assert!(bearer_token(&TestRequest::default().to_http_request()).is_err());
    }

    #[test]
    fn path_scope_must_match_caller() {
        let user = sample_user();
        let current = CurrentUser(user.clone());
        assert!(current.ensure_is(user.id).is_ok());
        assert!(matches!(
            current.ensure_is(Uuid::new_v4()),
            Err(ApiError::Forbidden(_))
        ));
    }
}

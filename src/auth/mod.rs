use axum::async_trait;
use axum::extract::{FromRequestParts, State};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::routing::post;
use axum::{Json, Router};
use chrono::{Duration, Utc};
use diesel::prelude::*;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::config::JwtConfig;
use crate::error::ApiError;
use crate::shared::models::{Role, User};
use crate::shared::schema::users;
use crate::shared::state::AppState;

const GOOGLE_TOKENINFO_URL: &str = "https://oauth2.googleapis.com/tokeninfo";

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub email: String,
    pub name: String,
    pub role: Role,
    pub iss: String,
    pub aud: String,
    pub exp: i64,
}

/// The authenticated principal every protected handler receives. Produced
/// only by decoding a bearer token; handlers trust it unconditionally.
#[derive(Debug, Clone, Copy)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub role: Role,
}

impl AuthUser {
    pub fn require_admin(&self) -> Result<(), ApiError> {
        if self.role.is_admin() {
            Ok(())
        } else {
            Err(ApiError::Forbidden)
        }
    }

    pub fn require_master(&self) -> Result<(), ApiError> {
        if self.role == Role::Master {
            Ok(())
        } else {
            Err(ApiError::Forbidden)
        }
    }
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ApiError::Unauthorized("missing authorization header".to_string()))?;

        let token = header
            .strip_prefix("Bearer ")
            .ok_or_else(|| ApiError::Unauthorized("expected bearer token".to_string()))?;

        let claims = decode_token(token, &state.config.jwt)?;
        let user_id = claims
            .sub
            .parse::<Uuid>()
            .map_err(|_| ApiError::Unauthorized("malformed subject claim".to_string()))?;

        Ok(AuthUser {
            user_id,
            role: claims.role,
        })
    }
}

pub fn create_token(user: &User, jwt: &JwtConfig) -> Result<String, ApiError> {
    let claims = Claims {
        sub: user.id.to_string(),
        email: user.email.clone(),
        name: user.full_name.clone(),
        role: user.role,
        iss: jwt.issuer.clone(),
        aud: jwt.audience.clone(),
        exp: (Utc::now() + Duration::minutes(jwt.expires_minutes)).timestamp(),
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(jwt.secret.as_bytes()),
    )
    .map_err(|e| ApiError::Unauthorized(format!("token creation failed: {e}")))
}

pub fn decode_token(token: &str, jwt: &JwtConfig) -> Result<Claims, ApiError> {
    let mut validation = Validation::default();
    validation.set_issuer(&[&jwt.issuer]);
    validation.set_audience(&[&jwt.audience]);
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(jwt.secret.as_bytes()),
        &validation,
    )
    .map(|data| data.claims)
    .map_err(|_| ApiError::Unauthorized("invalid or expired token".to_string()))
}

/// First login creates the record with the default `EndUser` role; later
/// logins return the stored record unchanged. Emails are normalized to
/// lowercase at write time so the uniqueness check is case-insensitive.
pub fn get_or_create_user(
    conn: &mut PgConnection,
    email: &str,
    full_name: &str,
) -> Result<User, ApiError> {
    let email = email.trim().to_lowercase();

    let existing: Option<User> = users::table
        .filter(users::email.eq(&email))
        .first(conn)
        .optional()?;

    if let Some(user) = existing {
        return Ok(user);
    }

    let user = User {
        id: Uuid::new_v4(),
        full_name: full_name.to_string(),
        email,
        role: Role::EndUser,
        department_id: None,
        is_active: true,
        created_at: Utc::now(),
    };

    diesel::insert_into(users::table)
        .values(&user)
        .execute(conn)?;

    info!("created user {} on first login", user.email);
    Ok(user)
}

#[derive(Debug, Deserialize)]
pub struct GoogleAuthRequest {
    pub id_token: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub profile: UserProfile,
}

#[derive(Debug, Serialize)]
pub struct UserProfile {
    pub id: Uuid,
    pub full_name: String,
    pub email: String,
    pub role: Role,
}

#[derive(Debug, Deserialize)]
struct GoogleTokenInfo {
    aud: String,
    email: Option<String>,
    name: Option<String>,
    given_name: Option<String>,
}

/// Asks Google's tokeninfo endpoint to validate the id token and checks the
/// audience against our configured client id.
async fn verify_google_id_token(
    client_id: &str,
    id_token: &str,
) -> Result<GoogleTokenInfo, ApiError> {
    let client = reqwest::Client::new();
    let resp = client
        .get(GOOGLE_TOKENINFO_URL)
        .query(&[("id_token", id_token)])
        .send()
        .await
        .map_err(|e| ApiError::Unauthorized(format!("token verification failed: {e}")))?;

    if !resp.status().is_success() {
        return Err(ApiError::Unauthorized("invalid google token".to_string()));
    }

    let info: GoogleTokenInfo = resp
        .json()
        .await
        .map_err(|_| ApiError::Unauthorized("invalid google token".to_string()))?;

    if info.aud != client_id {
        warn!("google token audience mismatch");
        return Err(ApiError::Unauthorized("invalid google token".to_string()));
    }

    Ok(info)
}

pub async fn google_login(
    State(state): State<Arc<AppState>>,
    Json(req): Json<GoogleAuthRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    if req.id_token.trim().is_empty() {
        return Err(ApiError::Validation("id_token is required".to_string()));
    }

    let info = verify_google_id_token(&state.config.google_client_id, &req.id_token).await?;

    let email = info
        .email
        .as_deref()
        .map(str::trim)
        .filter(|e| !e.is_empty())
        .ok_or_else(|| ApiError::Unauthorized("google token has no email".to_string()))?
        .to_lowercase();

    let full_name = info
        .name
        .or(info.given_name)
        .unwrap_or_else(|| "User".to_string());

    let mut conn = state.conn.get()?;
    let user = get_or_create_user(&mut conn, &email, &full_name)?;

    if !user.is_active {
        return Err(ApiError::Unauthorized("account is disabled".to_string()));
    }

    let token = create_token(&user, &state.config.jwt)?;

    Ok(Json(AuthResponse {
        token,
        profile: UserProfile {
            id: user.id,
            full_name: user.full_name,
            email: user.email,
            role: user.role,
        },
    }))
}

pub fn configure_auth_routes() -> Router<Arc<AppState>> {
    Router::new().route("/api/auth/google", post(google_login))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_jwt_config() -> JwtConfig {
        JwtConfig {
            secret: "test-secret".to_string(),
            issuer: "helpdesk".to_string(),
            audience: "helpdesk-ui".to_string(),
            expires_minutes: 60,
        }
    }

    fn test_user(role: Role) -> User {
        User {
            id: Uuid::new_v4(),
            full_name: "Test User".to_string(),
            email: "test@example.com".to_string(),
            role,
            department_id: None,
            is_active: true,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn token_round_trips_identity_and_role() {
        let jwt = test_jwt_config();
        let user = test_user(Role::HRAdmin);
        let token = create_token(&user, &jwt).unwrap();
        let claims = decode_token(&token, &jwt).unwrap();
        assert_eq!(claims.sub, user.id.to_string());
        assert_eq!(claims.email, user.email);
        assert_eq!(claims.role, Role::HRAdmin);
    }

    #[test]
    fn token_signed_with_other_secret_is_rejected() {
        let jwt = test_jwt_config();
        let other = JwtConfig {
            secret: "different-secret".to_string(),
            ..test_jwt_config()
        };
        let token = create_token(&test_user(Role::EndUser), &other).unwrap();
        assert!(decode_token(&token, &jwt).is_err());
    }

    #[test]
    fn admin_gate_rejects_end_users() {
        let admin = AuthUser {
            user_id: Uuid::new_v4(),
            role: Role::ITAdmin,
        };
        let end_user = AuthUser {
            user_id: Uuid::new_v4(),
            role: Role::EndUser,
        };
        assert!(admin.require_admin().is_ok());
        assert!(end_user.require_admin().is_err());
        assert!(admin.require_master().is_err());
    }
}

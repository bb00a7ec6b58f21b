use axum::extract::{Path, State};
use axum::routing::{get, put};
use axum::{Json, Router};
use diesel::prelude::*;
use log::info;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::shared::models::Role;
use crate::shared::schema::users;
use crate::shared::state::AppState;

#[derive(Debug, Serialize, Queryable)]
pub struct UserSummary {
    pub id: Uuid,
    pub full_name: String,
    pub email: String,
    pub role: Role,
    pub is_active: bool,
}

#[derive(Debug, Serialize, Queryable)]
pub struct AgentSummary {
    pub id: Uuid,
    pub full_name: String,
    pub email: String,
    pub role: Role,
}

#[derive(Debug, Deserialize)]
pub struct UpdateRoleRequest {
    pub role: String,
}

#[derive(Debug, Serialize)]
pub struct UpdatedRole {
    pub id: Uuid,
    pub role: Role,
}

pub async fn list_users(
    State(state): State<Arc<AppState>>,
    actor: AuthUser,
) -> Result<Json<Vec<UserSummary>>, ApiError> {
    actor.require_master()?;

    let mut conn = state.conn.get()?;
    let rows = users::table
        .order(users::full_name.asc())
        .select((
            users::id,
            users::full_name,
            users::email,
            users::role,
            users::is_active,
        ))
        .load::<UserSummary>(&mut conn)?;

    Ok(Json(rows))
}

/// Master only. `Master` itself can never be granted here; the only Master
/// account comes from seeding.
pub async fn update_role(
    State(state): State<Arc<AppState>>,
    actor: AuthUser,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateRoleRequest>,
) -> Result<Json<UpdatedRole>, ApiError> {
    actor.require_master()?;

    if req.role.trim().is_empty() {
        return Err(ApiError::Validation("role is required".to_string()));
    }

    let new_role: Role = req
        .role
        .parse()
        .map_err(|_| ApiError::Validation("invalid role".to_string()))?;

    if new_role == Role::Master {
        return Err(ApiError::Validation(
            "cannot assign Master role".to_string(),
        ));
    }

    let mut conn = state.conn.get()?;
    let updated = diesel::update(users::table.filter(users::id.eq(id)))
        .set(users::role.eq(new_role))
        .execute(&mut conn)?;

    if updated == 0 {
        return Err(ApiError::NotFound("user"));
    }

    info!("user {id} role changed to {}", new_role.as_str());
    Ok(Json(UpdatedRole { id, role: new_role }))
}

/// Active admin-role users, for assignment pickers.
pub async fn list_agents(
    State(state): State<Arc<AppState>>,
    actor: AuthUser,
) -> Result<Json<Vec<AgentSummary>>, ApiError> {
    actor.require_admin()?;

    let mut conn = state.conn.get()?;
    let rows = users::table
        .filter(users::is_active.eq(true))
        .filter(users::role.eq_any(Role::ADMIN_ROLES))
        .order(users::full_name.asc())
        .select((users::id, users::full_name, users::email, users::role))
        .load::<AgentSummary>(&mut conn)?;

    Ok(Json(rows))
}

pub fn configure_directory_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/users", get(list_users))
        .route("/api/users/agents", get(list_agents))
        .route("/api/users/:id/role", put(update_role))
}

//! Master-only reference-data management. Departments and categories are
//! soft-deleted: a disabled record stays referenced by existing tickets but
//! stops being offered for new ones.

use axum::extract::{Path, State};
use axum::routing::{get, put};
use axum::{Json, Router};
use chrono::Utc;
use diesel::prelude::*;
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::shared::models::{Category, Department};
use crate::shared::schema::{categories, departments};
use crate::shared::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateReferenceRequest {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateReferenceRequest {
    pub name: String,
    pub is_active: bool,
}

// ---- Departments ----

pub async fn list_departments(
    State(state): State<Arc<AppState>>,
    actor: AuthUser,
) -> Result<Json<Vec<Department>>, ApiError> {
    actor.require_master()?;
    let mut conn = state.conn.get()?;
    let rows = departments::table
        .order(departments::name.asc())
        .load::<Department>(&mut conn)?;
    Ok(Json(rows))
}

pub async fn create_department(
    State(state): State<Arc<AppState>>,
    actor: AuthUser,
    Json(req): Json<CreateReferenceRequest>,
) -> Result<Json<Department>, ApiError> {
    actor.require_master()?;
    if req.name.trim().is_empty() {
        return Err(ApiError::Validation("name is required".to_string()));
    }

    let dep = Department {
        id: Uuid::new_v4(),
        name: req.name.trim().to_string(),
        is_active: true,
        created_at: Utc::now(),
    };

    let mut conn = state.conn.get()?;
    diesel::insert_into(departments::table)
        .values(&dep)
        .execute(&mut conn)?;
    Ok(Json(dep))
}

pub async fn update_department(
    State(state): State<Arc<AppState>>,
    actor: AuthUser,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateReferenceRequest>,
) -> Result<Json<Department>, ApiError> {
    actor.require_master()?;
    if req.name.trim().is_empty() {
        return Err(ApiError::Validation("name is required".to_string()));
    }

    let mut conn = state.conn.get()?;
    let dep = diesel::update(departments::table.filter(departments::id.eq(id)))
        .set((
            departments::name.eq(req.name.trim()),
            departments::is_active.eq(req.is_active),
        ))
        .get_result::<Department>(&mut conn)
        .optional()?
        .ok_or(ApiError::NotFound("department"))?;
    Ok(Json(dep))
}

pub async fn disable_department(
    State(state): State<Arc<AppState>>,
    actor: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<(), ApiError> {
    actor.require_master()?;
    let mut conn = state.conn.get()?;
    let updated = diesel::update(departments::table.filter(departments::id.eq(id)))
        .set(departments::is_active.eq(false))
        .execute(&mut conn)?;
    if updated == 0 {
        return Err(ApiError::NotFound("department"));
    }
    Ok(())
}

// ---- Categories ----

pub async fn list_categories(
    State(state): State<Arc<AppState>>,
    actor: AuthUser,
) -> Result<Json<Vec<Category>>, ApiError> {
    actor.require_master()?;
    let mut conn = state.conn.get()?;
    let rows = categories::table
        .order(categories::name.asc())
        .load::<Category>(&mut conn)?;
    Ok(Json(rows))
}

pub async fn create_category(
    State(state): State<Arc<AppState>>,
    actor: AuthUser,
    Json(req): Json<CreateReferenceRequest>,
) -> Result<Json<Category>, ApiError> {
    actor.require_master()?;
    if req.name.trim().is_empty() {
        return Err(ApiError::Validation("name is required".to_string()));
    }

    let cat = Category {
        id: Uuid::new_v4(),
        name: req.name.trim().to_string(),
        is_active: true,
        created_at: Utc::now(),
    };

    let mut conn = state.conn.get()?;
    diesel::insert_into(categories::table)
        .values(&cat)
        .execute(&mut conn)?;
    Ok(Json(cat))
}

pub async fn update_category(
    State(state): State<Arc<AppState>>,
    actor: AuthUser,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateReferenceRequest>,
) -> Result<Json<Category>, ApiError> {
    actor.require_master()?;
    if req.name.trim().is_empty() {
        return Err(ApiError::Validation("name is required".to_string()));
    }

    let mut conn = state.conn.get()?;
    let cat = diesel::update(categories::table.filter(categories::id.eq(id)))
        .set((
            categories::name.eq(req.name.trim()),
            categories::is_active.eq(req.is_active),
        ))
        .get_result::<Category>(&mut conn)
        .optional()?
        .ok_or(ApiError::NotFound("category"))?;
    Ok(Json(cat))
}

pub async fn disable_category(
    State(state): State<Arc<AppState>>,
    actor: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<(), ApiError> {
    actor.require_master()?;
    let mut conn = state.conn.get()?;
    let updated = diesel::update(categories::table.filter(categories::id.eq(id)))
        .set(categories::is_active.eq(false))
        .execute(&mut conn)?;
    if updated == 0 {
        return Err(ApiError::NotFound("category"));
    }
    Ok(())
}

pub fn configure_admin_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/api/admin/departments",
            get(list_departments).post(create_department),
        )
        .route(
            "/api/admin/departments/:id",
            put(update_department).delete(disable_department),
        )
        .route(
            "/api/admin/categories",
            get(list_categories).post(create_category),
        )
        .route(
            "/api/admin/categories/:id",
            put(update_category).delete(disable_category),
        )
}

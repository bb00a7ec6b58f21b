use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use diesel::prelude::*;
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::shared::schema::{categories, departments};
use crate::shared::state::AppState;

/// Active reference rows only; used by ticket-creation pickers.
#[derive(Debug, Serialize, Queryable)]
pub struct LookupItem {
    pub id: Uuid,
    pub name: String,
}

pub async fn list_departments(
    State(state): State<Arc<AppState>>,
    _actor: AuthUser,
) -> Result<Json<Vec<LookupItem>>, ApiError> {
    let mut conn = state.conn.get()?;
    let rows = departments::table
        .filter(departments::is_active.eq(true))
        .order(departments::name.asc())
        .select((departments::id, departments::name))
        .load::<LookupItem>(&mut conn)?;
    Ok(Json(rows))
}

pub async fn list_categories(
    State(state): State<Arc<AppState>>,
    _actor: AuthUser,
) -> Result<Json<Vec<LookupItem>>, ApiError> {
    let mut conn = state.conn.get()?;
    let rows = categories::table
        .filter(categories::is_active.eq(true))
        .order(categories::name.asc())
        .select((categories::id, categories::name))
        .load::<LookupItem>(&mut conn)?;
    Ok(Json(rows))
}

pub fn configure_lookup_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/lookup/departments", get(list_departments))
        .route("/api/lookup/categories", get(list_categories))
}

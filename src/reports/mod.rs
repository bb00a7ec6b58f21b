use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use diesel::dsl::count_star;
use diesel::prelude::*;
use serde::Serialize;
use std::sync::Arc;

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::shared::models::TicketStatus;
use crate::shared::schema::tickets;
use crate::shared::state::AppState;

#[derive(Debug, Serialize)]
pub struct StatusCount {
    pub status: TicketStatus,
    pub count: i64,
}

#[derive(Debug, Serialize)]
pub struct TicketsSummary {
    pub total: i64,
    pub by_status: Vec<StatusCount>,
}

pub async fn tickets_summary(
    State(state): State<Arc<AppState>>,
    actor: AuthUser,
) -> Result<Json<TicketsSummary>, ApiError> {
    actor.require_admin()?;

    let mut conn = state.conn.get()?;

    let total: i64 = tickets::table.count().get_result(&mut conn)?;

    let by_status = tickets::table
        .group_by(tickets::status)
        .select((tickets::status, count_star()))
        .load::<(TicketStatus, i64)>(&mut conn)?
        .into_iter()
        .map(|(status, count)| StatusCount { status, count })
        .collect();

    Ok(Json(TicketsSummary { total, by_status }))
}

pub fn configure_reports_routes() -> Router<Arc<AppState>> {
    Router::new().route("/api/reports/tickets-summary", get(tickets_summary))
}

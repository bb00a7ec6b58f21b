pub mod number;

use axum::extract::{Path, State};
use axum::routing::{get, put};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::result::DatabaseErrorKind;
use diesel::result::Error as DieselError;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::shared::models::{
    AuditAction, Ticket, TicketAuditLog, TicketComment, TicketPriority, TicketStatus,
};
use crate::shared::schema::{
    categories, departments, ticket_audit_logs, ticket_comments, tickets, users,
};
use crate::shared::state::AppState;

/// How often a create is retried when the ticket-number UNIQUE backstop
/// fires. The sequence row lock makes a collision close to impossible, so
/// exhausting this means something is genuinely wrong.
const MAX_CREATE_ATTEMPTS: u32 = 3;

#[derive(Debug, Deserialize)]
pub struct CreateTicketRequest {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub department_id: Uuid,
    pub category_id: Uuid,
    #[serde(default)]
    pub priority: TicketPriority,
}

#[derive(Debug, Serialize)]
pub struct CreatedTicket {
    pub id: Uuid,
    pub ticket_number: String,
}

#[derive(Debug, Serialize, Queryable)]
pub struct TicketListItem {
    pub id: Uuid,
    pub ticket_number: String,
    pub title: String,
    pub status: TicketStatus,
    pub priority: TicketPriority,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct TicketDetails {
    pub id: Uuid,
    pub ticket_number: String,
    pub title: String,
    pub description: String,
    pub status: TicketStatus,
    pub priority: TicketPriority,
    pub department: String,
    pub category: String,
    pub requester: String,
    pub assigned_to: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct ChangeStatusRequest {
    pub status: TicketStatus,
}

#[derive(Debug, Deserialize)]
pub struct AssignTicketRequest {
    pub assignee_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct AddCommentRequest {
    pub comment_text: String,
}

#[derive(Debug, Serialize)]
pub struct CommentAuthor {
    pub id: Uuid,
    pub full_name: String,
    pub email: String,
}

#[derive(Debug, Serialize)]
pub struct CommentView {
    pub id: Uuid,
    pub comment_text: String,
    pub created_at: DateTime<Utc>,
    pub user: CommentAuthor,
}

#[derive(Debug, Serialize, Queryable)]
pub struct AuditEntryView {
    pub id: Uuid,
    pub action: AuditAction,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub actor_user_id: Uuid,
    pub created_at: DateTime<Utc>,
}

/// Audit rows are written only through this helper, always on the same
/// connection (and therefore transaction) as the mutation they describe.
/// There is deliberately no public write path into the audit log.
fn append_audit(
    conn: &mut PgConnection,
    ticket_id: Uuid,
    action: AuditAction,
    old_value: Option<String>,
    new_value: Option<String>,
    actor_id: Uuid,
) -> Result<(), ApiError> {
    let entry = TicketAuditLog {
        id: Uuid::new_v4(),
        ticket_id,
        action,
        old_value,
        new_value,
        actor_id,
        created_at: Utc::now(),
    };
    diesel::insert_into(ticket_audit_logs::table)
        .values(&entry)
        .execute(conn)?;
    Ok(())
}

fn load_ticket(conn: &mut PgConnection, id: Uuid) -> Result<Ticket, ApiError> {
    tickets::table
        .filter(tickets::id.eq(id))
        .first::<Ticket>(conn)
        .optional()?
        .ok_or(ApiError::NotFound("ticket"))
}

/// EndUsers only see tickets they requested; admins see everything.
fn check_ticket_visibility(ticket: &Ticket, actor: &AuthUser) -> Result<(), ApiError> {
    if actor.role.is_admin() || ticket.requester_id == actor.user_id {
        Ok(())
    } else {
        Err(ApiError::Forbidden)
    }
}

// -----------------------------
// Operations
// -----------------------------

pub fn create_ticket_record(
    conn: &mut PgConnection,
    actor: &AuthUser,
    req: &CreateTicketRequest,
) -> Result<CreatedTicket, ApiError> {
    if req.title.trim().is_empty() {
        return Err(ApiError::Validation("title is required".to_string()));
    }

    // Referential validity is checked up front rather than left to the
    // foreign-key constraint, so the caller gets a 400 instead of a 500.
    let dept_active: i64 = departments::table
        .filter(departments::id.eq(req.department_id))
        .filter(departments::is_active.eq(true))
        .count()
        .get_result(conn)?;
    if dept_active == 0 {
        return Err(ApiError::Validation("invalid department_id".to_string()));
    }

    let cat_active: i64 = categories::table
        .filter(categories::id.eq(req.category_id))
        .filter(categories::is_active.eq(true))
        .count()
        .get_result(conn)?;
    if cat_active == 0 {
        return Err(ApiError::Validation("invalid category_id".to_string()));
    }

    for attempt in 1..=MAX_CREATE_ATTEMPTS {
        let result = conn.transaction::<CreatedTicket, ApiError, _>(|conn| {
            let ticket_number = number::allocate(conn)?;
            let now = Utc::now();
            let ticket = Ticket {
                id: Uuid::new_v4(),
                ticket_number: ticket_number.clone(),
                title: req.title.trim().to_string(),
                description: req.description.trim().to_string(),
                department_id: req.department_id,
                category_id: req.category_id,
                priority: req.priority,
                status: TicketStatus::Open,
                requester_id: actor.user_id,
                assignee_id: None,
                created_at: now,
                updated_at: now,
                closed_at: None,
            };

            diesel::insert_into(tickets::table)
                .values(&ticket)
                .execute(conn)?;

            append_audit(
                conn,
                ticket.id,
                AuditAction::Created,
                None,
                Some(ticket_number.clone()),
                actor.user_id,
            )?;

            Ok(CreatedTicket {
                id: ticket.id,
                ticket_number,
            })
        });

        match result {
            Err(ApiError::Database(DieselError::DatabaseError(
                DatabaseErrorKind::UniqueViolation,
                _,
            ))) if attempt < MAX_CREATE_ATTEMPTS => {
                warn!("ticket number collision, retrying (attempt {attempt})");
                continue;
            }
            Err(ApiError::Database(DieselError::DatabaseError(
                DatabaseErrorKind::UniqueViolation,
                _,
            ))) => {
                return Err(ApiError::Conflict(
                    "could not allocate a unique ticket number".to_string(),
                ));
            }
            Ok(created) => {
                info!("ticket {} created", created.ticket_number);
                return Ok(created);
            }
            Err(e) => return Err(e),
        }
    }
    unreachable!("create loop always returns within MAX_CREATE_ATTEMPTS")
}

pub fn list_tickets_for(
    conn: &mut PgConnection,
    actor: &AuthUser,
) -> Result<Vec<TicketListItem>, ApiError> {
    let mut query = tickets::table
        .select((
            tickets::id,
            tickets::ticket_number,
            tickets::title,
            tickets::status,
            tickets::priority,
            tickets::created_at,
        ))
        .order(tickets::created_at.desc())
        .into_boxed();

    if !actor.role.is_admin() {
        query = query.filter(tickets::requester_id.eq(actor.user_id));
    }

    let rows = query.load::<TicketListItem>(conn)?;

    Ok(rows)
}

pub fn get_ticket_details(
    conn: &mut PgConnection,
    actor: &AuthUser,
    id: Uuid,
) -> Result<TicketDetails, ApiError> {
    let ticket = load_ticket(conn, id)?;
    check_ticket_visibility(&ticket, actor)?;

    let department: Option<String> = departments::table
        .filter(departments::id.eq(ticket.department_id))
        .select(departments::name)
        .first(conn)
        .optional()?;

    let category: Option<String> = categories::table
        .filter(categories::id.eq(ticket.category_id))
        .select(categories::name)
        .first(conn)
        .optional()?;

    let requester: Option<String> = users::table
        .filter(users::id.eq(ticket.requester_id))
        .select(users::full_name)
        .first(conn)
        .optional()?;

    let assigned_to: Option<String> = match ticket.assignee_id {
        Some(assignee_id) => users::table
            .filter(users::id.eq(assignee_id))
            .select(users::full_name)
            .first(conn)
            .optional()?,
        None => None,
    };

    Ok(TicketDetails {
        id: ticket.id,
        ticket_number: ticket.ticket_number,
        title: ticket.title,
        description: ticket.description,
        status: ticket.status,
        priority: ticket.priority,
        department: department.unwrap_or_default(),
        category: category.unwrap_or_default(),
        requester: requester.unwrap_or_default(),
        assigned_to,
        created_at: ticket.created_at,
    })
}

/// Transitions are unrestricted among the four statuses; entering Closed
/// stamps `closed_at`, leaving it keeps the stamp as "last closed at".
/// A same-status call is a successful no-op and writes no audit row.
pub fn change_ticket_status(
    conn: &mut PgConnection,
    actor: &AuthUser,
    id: Uuid,
    new_status: TicketStatus,
) -> Result<(), ApiError> {
    actor.require_admin()?;

    conn.transaction::<(), ApiError, _>(|conn| {
        let ticket = load_ticket(conn, id)?;

        if ticket.status == new_status {
            return Ok(());
        }

        let now = Utc::now();
        if new_status == TicketStatus::Closed {
            diesel::update(tickets::table.filter(tickets::id.eq(id)))
                .set((
                    tickets::status.eq(new_status),
                    tickets::updated_at.eq(now),
                    tickets::closed_at.eq(Some(now)),
                ))
                .execute(conn)?;
        } else {
            diesel::update(tickets::table.filter(tickets::id.eq(id)))
                .set((tickets::status.eq(new_status), tickets::updated_at.eq(now)))
                .execute(conn)?;
        }

        append_audit(
            conn,
            id,
            AuditAction::StatusChanged,
            Some(ticket.status.as_str().to_string()),
            Some(new_status.as_str().to_string()),
            actor.user_id,
        )
    })
}

/// Assignment neither restricts nor implies any status transition.
pub fn assign_ticket_record(
    conn: &mut PgConnection,
    actor: &AuthUser,
    id: Uuid,
    assignee_id: Uuid,
) -> Result<(), ApiError> {
    actor.require_admin()?;

    conn.transaction::<(), ApiError, _>(|conn| {
        let ticket = load_ticket(conn, id)?;

        let assignee_active: i64 = users::table
            .filter(users::id.eq(assignee_id))
            .filter(users::is_active.eq(true))
            .count()
            .get_result(conn)?;
        if assignee_active == 0 {
            return Err(ApiError::Validation(
                "assignee not found or inactive".to_string(),
            ));
        }

        if ticket.assignee_id == Some(assignee_id) {
            return Ok(());
        }

        diesel::update(tickets::table.filter(tickets::id.eq(id)))
            .set((
                tickets::assignee_id.eq(Some(assignee_id)),
                tickets::updated_at.eq(Utc::now()),
            ))
            .execute(conn)?;

        append_audit(
            conn,
            id,
            AuditAction::Assigned,
            ticket.assignee_id.map(|a| a.to_string()),
            Some(assignee_id.to_string()),
            actor.user_id,
        )
    })
}

pub fn add_comment_record(
    conn: &mut PgConnection,
    actor: &AuthUser,
    ticket_id: Uuid,
    comment_text: &str,
) -> Result<(), ApiError> {
    if comment_text.trim().is_empty() {
        return Err(ApiError::Validation("comment_text is required".to_string()));
    }

    conn.transaction::<(), ApiError, _>(|conn| {
        let ticket = load_ticket(conn, ticket_id)?;
        check_ticket_visibility(&ticket, actor)?;

        let comment = TicketComment {
            id: Uuid::new_v4(),
            ticket_id,
            author_id: actor.user_id,
            body: comment_text.trim().to_string(),
            created_at: Utc::now(),
        };

        diesel::insert_into(ticket_comments::table)
            .values(&comment)
            .execute(conn)?;

        append_audit(
            conn,
            ticket_id,
            AuditAction::CommentAdded,
            None,
            None,
            actor.user_id,
        )
    })
}

pub fn list_ticket_comments(
    conn: &mut PgConnection,
    actor: &AuthUser,
    ticket_id: Uuid,
) -> Result<Vec<CommentView>, ApiError> {
    let ticket = load_ticket(conn, ticket_id)?;
    check_ticket_visibility(&ticket, actor)?;

    let rows: Vec<(Uuid, String, DateTime<Utc>, Uuid, String, String)> = ticket_comments::table
        .inner_join(users::table)
        .filter(ticket_comments::ticket_id.eq(ticket_id))
        .order(ticket_comments::created_at.asc())
        .select((
            ticket_comments::id,
            ticket_comments::body,
            ticket_comments::created_at,
            users::id,
            users::full_name,
            users::email,
        ))
        .load(conn)?;

    Ok(rows
        .into_iter()
        .map(
            |(id, comment_text, created_at, user_id, full_name, email)| CommentView {
                id,
                comment_text,
                created_at,
                user: CommentAuthor {
                    id: user_id,
                    full_name,
                    email,
                },
            },
        )
        .collect())
}

pub fn list_ticket_audit(
    conn: &mut PgConnection,
    actor: &AuthUser,
    ticket_id: Uuid,
) -> Result<Vec<AuditEntryView>, ApiError> {
    actor.require_admin()?;

    let exists: i64 = tickets::table
        .filter(tickets::id.eq(ticket_id))
        .count()
        .get_result(conn)?;
    if exists == 0 {
        return Err(ApiError::NotFound("ticket"));
    }

    let entries = ticket_audit_logs::table
        .filter(ticket_audit_logs::ticket_id.eq(ticket_id))
        .order(ticket_audit_logs::created_at.desc())
        .select((
            ticket_audit_logs::id,
            ticket_audit_logs::action,
            ticket_audit_logs::old_value,
            ticket_audit_logs::new_value,
            ticket_audit_logs::actor_id,
            ticket_audit_logs::created_at,
        ))
        .load::<AuditEntryView>(conn)?;

    Ok(entries)
}

// -----------------------------
// Handlers
// -----------------------------

pub async fn create_ticket(
    State(state): State<Arc<AppState>>,
    actor: AuthUser,
    Json(req): Json<CreateTicketRequest>,
) -> Result<Json<CreatedTicket>, ApiError> {
    let mut conn = state.conn.get()?;
    let created = create_ticket_record(&mut conn, &actor, &req)?;
    Ok(Json(created))
}

pub async fn list_tickets(
    State(state): State<Arc<AppState>>,
    actor: AuthUser,
) -> Result<Json<Vec<TicketListItem>>, ApiError> {
    let mut conn = state.conn.get()?;
    Ok(Json(list_tickets_for(&mut conn, &actor)?))
}

pub async fn get_ticket(
    State(state): State<Arc<AppState>>,
    actor: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<TicketDetails>, ApiError> {
    let mut conn = state.conn.get()?;
    Ok(Json(get_ticket_details(&mut conn, &actor, id)?))
}

pub async fn change_status(
    State(state): State<Arc<AppState>>,
    actor: AuthUser,
    Path(id): Path<Uuid>,
    Json(req): Json<ChangeStatusRequest>,
) -> Result<(), ApiError> {
    let mut conn = state.conn.get()?;
    change_ticket_status(&mut conn, &actor, id, req.status)
}

pub async fn assign_ticket(
    State(state): State<Arc<AppState>>,
    actor: AuthUser,
    Path(id): Path<Uuid>,
    Json(req): Json<AssignTicketRequest>,
) -> Result<(), ApiError> {
    let mut conn = state.conn.get()?;
    assign_ticket_record(&mut conn, &actor, id, req.assignee_id)
}

pub async fn add_comment(
    State(state): State<Arc<AppState>>,
    actor: AuthUser,
    Path(id): Path<Uuid>,
    Json(req): Json<AddCommentRequest>,
) -> Result<(), ApiError> {
    let mut conn = state.conn.get()?;
    add_comment_record(&mut conn, &actor, id, &req.comment_text)
}

pub async fn list_comments(
    State(state): State<Arc<AppState>>,
    actor: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<CommentView>>, ApiError> {
    let mut conn = state.conn.get()?;
    Ok(Json(list_ticket_comments(&mut conn, &actor, id)?))
}

pub async fn get_audit(
    State(state): State<Arc<AppState>>,
    actor: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<AuditEntryView>>, ApiError> {
    let mut conn = state.conn.get()?;
    Ok(Json(list_ticket_audit(&mut conn, &actor, id)?))
}

pub fn configure_tickets_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/tickets", get(list_tickets).post(create_ticket))
        .route("/api/tickets/:id", get(get_ticket))
        .route("/api/tickets/:id/status", put(change_status))
        .route("/api/tickets/:id/assign", put(assign_ticket))
        .route("/api/tickets/:id/comments", get(list_comments).post(add_comment))
        .route("/api/tickets/:id/audit", get(get_audit))
}

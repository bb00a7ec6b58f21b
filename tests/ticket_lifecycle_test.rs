//! End-to-end lifecycle tests against a real Postgres instance.
//!
//! Each test creates its own scratch database from `TEST_DATABASE_URL` (which
//! must point at a database whose user may CREATE DATABASE) and drops it
//! afterwards. When the variable is unset or the server is unreachable the
//! tests skip instead of failing, so the suite stays green on machines
//! without Postgres.

use chrono::{Datelike, Utc};
use diesel::prelude::*;
use diesel::sql_query;
use uuid::Uuid;

use helpdesk_server::auth::{get_or_create_user, AuthUser};
use helpdesk_server::error::ApiError;
use helpdesk_server::shared::models::{
    AuditAction, Category, Department, Role, Ticket, TicketPriority, TicketStatus, User,
};
use helpdesk_server::shared::schema::{categories, departments, ticket_audit_logs, tickets, users};
use helpdesk_server::shared::seed::ensure_sequence_row;
use helpdesk_server::shared::utils::run_migrations;
use helpdesk_server::tickets::{
    add_comment_record, assign_ticket_record, change_ticket_status, create_ticket_record,
    get_ticket_details, list_ticket_audit, list_ticket_comments, list_tickets_for,
    CreateTicketRequest,
};

struct ScratchDb {
    admin_url: String,
    db_name: String,
    url: String,
}

impl ScratchDb {
    /// Returns None when TEST_DATABASE_URL is unset or unreachable.
    fn create(label: &str) -> Option<ScratchDb> {
        let admin_url = match std::env::var("TEST_DATABASE_URL") {
            Ok(url) => url,
            Err(_) => {
                println!("skipping - TEST_DATABASE_URL not set");
                return None;
            }
        };

        let mut admin = match PgConnection::establish(&admin_url) {
            Ok(conn) => conn,
            Err(_) => {
                println!("skipping - cannot connect to {admin_url}");
                return None;
            }
        };

        let db_name = format!("helpdesk_test_{label}_{}", rand::random::<u32>());
        sql_query(format!("CREATE DATABASE {db_name}"))
            .execute(&mut admin)
            .expect("create scratch database");

        let (base, _) = admin_url
            .rsplit_once('/')
            .expect("TEST_DATABASE_URL must contain a database path");
        let url = format!("{base}/{db_name}");

        Some(ScratchDb {
            admin_url,
            db_name,
            url,
        })
    }

    fn connect(&self) -> PgConnection {
        let mut conn = PgConnection::establish(&self.url).expect("connect to scratch database");
        run_migrations(&mut conn).expect("run migrations");
        ensure_sequence_row(&mut conn).expect("seed sequence row");
        conn
    }
}

impl Drop for ScratchDb {
    fn drop(&mut self) {
        if let Ok(mut admin) = PgConnection::establish(&self.admin_url) {
            let _ = sql_query(format!("DROP DATABASE {} WITH (FORCE)", self.db_name))
                .execute(&mut admin);
        }
    }
}

fn insert_user(conn: &mut PgConnection, name: &str, role: Role, active: bool) -> AuthUser {
    let user = User {
        id: Uuid::new_v4(),
        full_name: name.to_string(),
        email: format!("{}@example.com", name.to_lowercase().replace(' ', ".")),
        role,
        department_id: None,
        is_active: active,
        created_at: Utc::now(),
    };
    diesel::insert_into(users::table)
        .values(&user)
        .execute(conn)
        .expect("insert user");
    AuthUser {
        user_id: user.id,
        role,
    }
}

fn insert_department(conn: &mut PgConnection, name: &str, active: bool) -> Uuid {
    let dep = Department {
        id: Uuid::new_v4(),
        name: name.to_string(),
        is_active: active,
        created_at: Utc::now(),
    };
    diesel::insert_into(departments::table)
        .values(&dep)
        .execute(conn)
        .expect("insert department");
    dep.id
}

fn insert_category(conn: &mut PgConnection, name: &str, active: bool) -> Uuid {
    let cat = Category {
        id: Uuid::new_v4(),
        name: name.to_string(),
        is_active: active,
        created_at: Utc::now(),
    };
    diesel::insert_into(categories::table)
        .values(&cat)
        .execute(conn)
        .expect("insert category");
    cat.id
}

fn create_request(department_id: Uuid, category_id: Uuid) -> CreateTicketRequest {
    CreateTicketRequest {
        title: "Printer jam".to_string(),
        description: "Paper stuck in tray 2".to_string(),
        department_id,
        category_id,
        priority: TicketPriority::Medium,
    }
}

fn load_ticket(conn: &mut PgConnection, id: Uuid) -> Ticket {
    tickets::table
        .filter(tickets::id.eq(id))
        .first(conn)
        .expect("load ticket")
}

fn audit_count(conn: &mut PgConnection, ticket_id: Uuid) -> i64 {
    ticket_audit_logs::table
        .filter(ticket_audit_logs::ticket_id.eq(ticket_id))
        .count()
        .get_result(conn)
        .expect("count audit rows")
}

#[test]
fn ticket_lifecycle_and_audit_trail() {
    let Some(db) = ScratchDb::create("lifecycle") else {
        return;
    };
    let conn = &mut db.connect();

    let requester = insert_user(conn, "End User", Role::EndUser, true);
    let stranger = insert_user(conn, "Other User", Role::EndUser, true);
    let admin = insert_user(conn, "IT Admin", Role::ITAdmin, true);
    let inactive = insert_user(conn, "Former Agent", Role::ITAdmin, false);

    let dept = insert_department(conn, "IT", true);
    let dead_dept = insert_department(conn, "Archive", false);
    let cat = insert_category(conn, "Hardware", true);

    // --- creation ---
    let created = create_ticket_record(conn, &requester, &create_request(dept, cat))
        .expect("create ticket");
    assert_eq!(
        created.ticket_number,
        format!("TCK-{}-000001", Utc::now().year())
    );

    let ticket = load_ticket(conn, created.id);
    assert_eq!(ticket.status, TicketStatus::Open);
    assert_eq!(ticket.requester_id, requester.user_id);
    assert!(ticket.closed_at.is_none());
    assert_eq!(audit_count(conn, created.id), 1);

    let second = create_ticket_record(conn, &requester, &create_request(dept, cat))
        .expect("create second ticket");
    assert_eq!(
        second.ticket_number,
        format!("TCK-{}-000002", Utc::now().year())
    );

    // --- creation validation ---
    let mut blank = create_request(dept, cat);
    blank.title = "   ".to_string();
    assert!(matches!(
        create_ticket_record(conn, &requester, &blank),
        Err(ApiError::Validation(_))
    ));

    assert!(matches!(
        create_ticket_record(conn, &requester, &create_request(dead_dept, cat)),
        Err(ApiError::Validation(_))
    ));

    assert!(matches!(
        create_ticket_record(conn, &requester, &create_request(dept, Uuid::new_v4())),
        Err(ApiError::Validation(_))
    ));

    // --- visibility ---
    assert!(matches!(
        get_ticket_details(conn, &stranger, created.id),
        Err(ApiError::Forbidden)
    ));
    let details = get_ticket_details(conn, &admin, created.id).expect("admin reads any ticket");
    assert_eq!(details.department, "IT");
    assert_eq!(details.category, "Hardware");
    assert_eq!(details.requester, "End User");
    assert!(details.assigned_to.is_none());

    assert!(matches!(
        get_ticket_details(conn, &requester, Uuid::new_v4()),
        Err(ApiError::NotFound(_))
    ));

    assert_eq!(list_tickets_for(conn, &admin).unwrap().len(), 2);
    assert_eq!(list_tickets_for(conn, &stranger).unwrap().len(), 0);
    let mine = list_tickets_for(conn, &requester).unwrap();
    assert_eq!(mine.len(), 2);
    // newest first
    assert_eq!(mine[0].ticket_number, second.ticket_number);

    // --- comments ---
    assert!(matches!(
        add_comment_record(conn, &stranger, created.id, "drive-by"),
        Err(ApiError::Forbidden)
    ));
    assert!(matches!(
        add_comment_record(conn, &requester, created.id, "  "),
        Err(ApiError::Validation(_))
    ));
    add_comment_record(conn, &requester, created.id, "still jammed").expect("requester comments");
    add_comment_record(conn, &admin, created.id, "looking into it").expect("admin comments");
    assert_eq!(audit_count(conn, created.id), 3);

    assert!(matches!(
        list_ticket_comments(conn, &stranger, created.id),
        Err(ApiError::Forbidden)
    ));
    let comments = list_ticket_comments(conn, &requester, created.id).unwrap();
    assert_eq!(comments.len(), 2);
    // oldest first, with author identity resolved
    assert_eq!(comments[0].comment_text, "still jammed");
    assert_eq!(comments[0].user.full_name, "End User");
    assert_eq!(comments[1].user.email, "it.admin@example.com");

    // --- status transitions ---
    assert!(matches!(
        change_ticket_status(conn, &requester, created.id, TicketStatus::Closed),
        Err(ApiError::Forbidden)
    ));

    // same-status call is an idempotent no-op: no audit row
    let before = audit_count(conn, created.id);
    change_ticket_status(conn, &admin, created.id, TicketStatus::Open).expect("no-op status");
    assert_eq!(audit_count(conn, created.id), before);

    for status in [
        TicketStatus::InProgress,
        TicketStatus::Resolved,
        TicketStatus::Closed,
    ] {
        change_ticket_status(conn, &admin, created.id, status).expect("status change");
        let t = load_ticket(conn, created.id);
        assert_eq!(t.status, status);
        assert_eq!(t.closed_at.is_some(), status == TicketStatus::Closed);
    }
    assert_eq!(audit_count(conn, created.id), before + 3);

    // reopening keeps the last-closed-at stamp
    let closed_at = load_ticket(conn, created.id).closed_at;
    change_ticket_status(conn, &admin, created.id, TicketStatus::Open).expect("reopen");
    let reopened = load_ticket(conn, created.id);
    assert_eq!(reopened.status, TicketStatus::Open);
    assert_eq!(reopened.closed_at, closed_at);

    // --- assignment ---
    let before = audit_count(conn, created.id);
    assert!(matches!(
        assign_ticket_record(conn, &admin, created.id, inactive.user_id),
        Err(ApiError::Validation(_))
    ));
    assert!(matches!(
        assign_ticket_record(conn, &admin, created.id, Uuid::new_v4()),
        Err(ApiError::Validation(_))
    ));
    assert_eq!(audit_count(conn, created.id), before);

    assign_ticket_record(conn, &admin, created.id, admin.user_id).expect("assign");
    assert_eq!(audit_count(conn, created.id), before + 1);
    assign_ticket_record(conn, &admin, created.id, admin.user_id).expect("no-op assign");
    assert_eq!(audit_count(conn, created.id), before + 1);
    assert_eq!(
        load_ticket(conn, created.id).assignee_id,
        Some(admin.user_id)
    );

    // --- audit trail ---
    assert!(matches!(
        list_ticket_audit(conn, &requester, created.id),
        Err(ApiError::Forbidden)
    ));
    assert!(matches!(
        list_ticket_audit(conn, &admin, Uuid::new_v4()),
        Err(ApiError::NotFound(_))
    ));
    let audit = list_ticket_audit(conn, &admin, created.id).unwrap();
    assert_eq!(audit.len() as i64, audit_count(conn, created.id));
    // newest first; the assignment was the last effective mutation
    assert_eq!(audit[0].action, AuditAction::Assigned);
    assert_eq!(audit[0].actor_user_id, admin.user_id);
    assert_eq!(audit[0].old_value, None);
    assert_eq!(audit[0].new_value, Some(admin.user_id.to_string()));
    assert_eq!(audit.last().unwrap().action, AuditAction::Created);
    assert_eq!(
        audit.last().unwrap().new_value,
        Some(created.ticket_number.clone())
    );
}

#[test]
fn first_login_creates_user_once() {
    let Some(db) = ScratchDb::create("login") else {
        return;
    };
    let conn = &mut db.connect();

    let first = get_or_create_user(conn, "Mixed.Case@Example.COM", "Ada Lovelace")
        .expect("first login creates");
    assert_eq!(first.email, "mixed.case@example.com");
    assert_eq!(first.role, Role::EndUser);
    assert!(first.is_active);

    let second = get_or_create_user(conn, "mixed.case@example.com", "Renamed Later")
        .expect("second login finds");
    assert_eq!(second.id, first.id);
    assert_eq!(second.full_name, "Ada Lovelace");

    let total: i64 = users::table.count().get_result(conn).unwrap();
    assert_eq!(total, 1);
}

#[test]
fn concurrent_creates_never_share_a_number() {
    let Some(db) = ScratchDb::create("concurrent") else {
        return;
    };
    let conn = &mut db.connect();

    let requester = insert_user(conn, "Load Tester", Role::EndUser, true);
    let dept = insert_department(conn, "IT", true);
    let cat = insert_category(conn, "Network", true);

    const WORKERS: usize = 8;
    const PER_WORKER: usize = 3;

    let url = db.url.clone();
    let handles: Vec<_> = (0..WORKERS)
        .map(|_| {
            let url = url.clone();
            std::thread::spawn(move || {
                let mut conn = PgConnection::establish(&url).expect("worker connects");
                (0..PER_WORKER)
                    .map(|_| {
                        create_ticket_record(
                            &mut conn,
                            &requester,
                            &create_request(dept, cat),
                        )
                        .expect("concurrent create")
                        .ticket_number
                    })
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let mut numbers: Vec<String> = handles
        .into_iter()
        .flat_map(|h| h.join().expect("worker thread"))
        .collect();

    assert_eq!(numbers.len(), WORKERS * PER_WORKER);
    numbers.sort();
    numbers.dedup();
    assert_eq!(numbers.len(), WORKERS * PER_WORKER, "duplicate ticket numbers");

    // no lost inserts, and one Created audit row per ticket
    let ticket_count: i64 = tickets::table.count().get_result(conn).unwrap();
    assert_eq!(ticket_count as usize, WORKERS * PER_WORKER);
    let audit_rows: i64 = ticket_audit_logs::table.count().get_result(conn).unwrap();
    assert_eq!(audit_rows as usize, WORKERS * PER_WORKER);
}

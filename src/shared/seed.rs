use chrono::Utc;
use diesel::prelude::*;
use log::info;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::shared::models::{Category, Department, Role, User};
use crate::shared::schema::{categories, departments, ticket_sequence, users};
use crate::tickets::number::SEQUENCE_ROW_ID;

const DEFAULT_DEPARTMENTS: [&str; 4] = ["IT", "HR", "Finance", "Operations"];
const DEFAULT_CATEGORIES: [&str; 5] = ["Hardware", "Software", "Network", "Access", "Others"];

/// Idempotent startup seeding: default reference data when the tables are
/// empty, the ticket-sequence row, and the configured Master account.
pub fn seed(conn: &mut PgConnection, config: &AppConfig) -> anyhow::Result<()> {
    ensure_sequence_row(conn)?;

    let dept_count: i64 = departments::table.count().get_result(conn)?;
    if dept_count == 0 {
        let now = Utc::now();
        let rows: Vec<Department> = DEFAULT_DEPARTMENTS
            .iter()
            .map(|name| Department {
                id: Uuid::new_v4(),
                name: name.to_string(),
                is_active: true,
                created_at: now,
            })
            .collect();
        diesel::insert_into(departments::table)
            .values(&rows)
            .execute(conn)?;
        info!("seeded {} departments", rows.len());
    }

    let cat_count: i64 = categories::table.count().get_result(conn)?;
    if cat_count == 0 {
        let now = Utc::now();
        let rows: Vec<Category> = DEFAULT_CATEGORIES
            .iter()
            .map(|name| Category {
                id: Uuid::new_v4(),
                name: name.to_string(),
                is_active: true,
                created_at: now,
            })
            .collect();
        diesel::insert_into(categories::table)
            .values(&rows)
            .execute(conn)?;
        info!("seeded {} categories", rows.len());
    }

    if let Some(master_email) = &config.master_email {
        ensure_master_account(conn, master_email)?;
    }

    Ok(())
}

pub fn ensure_sequence_row(conn: &mut PgConnection) -> anyhow::Result<()> {
    diesel::insert_into(ticket_sequence::table)
        .values((
            ticket_sequence::id.eq(SEQUENCE_ROW_ID),
            ticket_sequence::value.eq(0_i64),
        ))
        .on_conflict(ticket_sequence::id)
        .do_nothing()
        .execute(conn)?;
    Ok(())
}

/// The only path by which a Master account comes into existence: the
/// role-change endpoint refuses to grant Master.
fn ensure_master_account(conn: &mut PgConnection, email: &str) -> anyhow::Result<()> {
    let existing: Option<User> = users::table
        .filter(users::email.eq(email))
        .first(conn)
        .optional()?;

    match existing {
        Some(user) if user.role == Role::Master => {}
        Some(user) => {
            diesel::update(users::table.filter(users::id.eq(user.id)))
                .set(users::role.eq(Role::Master))
                .execute(conn)?;
            info!("promoted {email} to Master");
        }
        None => {
            let user = User {
                id: Uuid::new_v4(),
                full_name: "Master Account".to_string(),
                email: email.to_string(),
                role: Role::Master,
                department_id: None,
                is_active: true,
                created_at: Utc::now(),
            };
            diesel::insert_into(users::table)
                .values(&user)
                .execute(conn)?;
            info!("seeded Master account {email}");
        }
    }

    Ok(())
}

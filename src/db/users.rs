use chrono::Utc;
use rusqlite::{params, OptionalExtension, Row};

use super::models::{Role, User};
use super::{new_id, DbPool, Result};

const USER_COLUMNS: &str = "id, name, email, phone, password_hash, role, created_at, updated_at";

fn map_user(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get("id")?,
        name: row.get("name")?,
        email: row.get("email")?,
        phone: row.get("phone")?,
        password_hash: row.get("password_hash")?,
        role: row.get("role")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

pub async fn create_user(
    pool: &DbPool,
    name: &str,
    email: &str,
    phone: &str,
    password_hash: &str,
    role: Role,
) -> Result<User> {
    let conn = pool.get()?;
    let now = Utc::now();
    let user = User {
        id: new_id(),
        name: name.to_string(),
        email: email.to_string(),
        phone: phone.to_string(),
        password_hash: password_hash.to_string(),
        role,
        created_at: now,
        updated_at: now,
    };
    conn.execute(
        "INSERT INTO users (id, name, email, phone, password_hash, role, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            user.id,
            user.name,
            user.email,
            user.phone,
            user.password_hash,
            user.role,
            user.created_at,
            user.updated_at
        ],
    )?;
    Ok(user)
}

pub async fn find_user(pool: &DbPool, id: &str) -> Result<Option<User>> {
    let conn = pool.get()?;
    let sql = format!("SELECT {} FROM users WHERE id = ?1", USER_COLUMNS);
    let user = conn.query_row(&sql, params![id], map_user).optional()?;
    Ok(user)
}

pub async fn find_user_by_email(pool: &DbPool, email: &str) -> Result<Option<User>> {
    let conn = pool.get()?;
    let sql = format!("SELECT {} FROM users WHERE email = ?1", USER_COLUMNS);
    let user = conn.query_row(&sql, params![email], map_user).optional()?;
    Ok(user)
}

/// Partial profile update; returns the refreshed row, or `None` if the user is gone.
pub async fn update_profile(
    pool: &DbPool,
    id: &str,
    name: Option<&str>,
    phone: Option<&str>,
) -> Result<Option<User>> {
    {
        let conn = pool.get()?;
        conn.execute(
            "UPDATE users
             SET name = COALESCE(?2, name), phone = COALESCE(?3, phone), updated_at = ?4
             WHERE id = ?1",
            params![id, name, phone, Utc::now()],
        )?;
    }
    find_user(pool, id).await
}

pub async fn list_users_by_role(pool: &DbPool, role: Role) -> Result<Vec<User>> {
    let conn = pool.get()?;
    let sql = format!(
        "SELECT {} FROM users WHERE role = ?1 ORDER BY created_at DESC",
        USER_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let users = stmt
        .query_map(params![role], map_user)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(users)
}

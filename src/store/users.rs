//! User accounts.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{enum_column, timestamp, timestamp_column, DatabaseError};
use crate::domain::{NewUser, Role, User, UserId};

pub fn insert_user(conn: &Connection, user: &NewUser, now: DateTime<Utc>) -> Result<UserId, DatabaseError> {
    conn.execute(
        "INSERT INTO users (username, password_hash, designation, is_admin, role, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            user.username,
            user.password_hash,
            user.designation,
            user.is_admin,
            user.role.as_str(),
            timestamp(now),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn get_user(conn: &Connection, id: UserId) -> Result<Option<User>, DatabaseError> {
    let user = conn
        .query_row("SELECT * FROM users WHERE id = ?1", params![id], user_from_row)
        .optional()?;
    Ok(user)
}

pub fn get_by_username(conn: &Connection, username: &str) -> Result<Option<User>, DatabaseError> {
    let user = conn
        .query_row(
            "SELECT * FROM users WHERE username = ?1",
            params![username],
            user_from_row,
        )
        .optional()?;
    Ok(user)
}

pub fn list_users(conn: &Connection) -> Result<Vec<User>, DatabaseError> {
    let mut stmt = conn.prepare("SELECT * FROM users ORDER BY id")?;
    let rows = stmt.query_map([], user_from_row)?;

    let mut users = Vec::new();
    for row in rows {
        users.push(row?);
    }
    Ok(users)
}

pub fn username(conn: &Connection, id: UserId) -> Result<Option<String>, DatabaseError> {
    let name = conn
        .query_row(
            "SELECT username FROM users WHERE id = ?1",
            params![id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(name)
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get("id")?,
        username: row.get("username")?,
        password_hash: row.get("password_hash")?,
        designation: row.get("designation")?,
        is_admin: row.get("is_admin")?,
        role: enum_column(row, "role", Role::parse)?,
        created_at: timestamp_column(row, "created_at")?,
    })
}

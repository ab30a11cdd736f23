use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, Row, params};

use heartout_types::models::UserRole;

use super::{OptionalExt, enum_col, is_unique_violation, json_col};
use crate::models::{NewUser, UserRow};
use crate::storage::StorageError;

pub(super) const USER_COLUMNS: &str = "u.id, u.username, u.email, u.password_hash, u.display_name, u.bio, \
     u.age_range, u.preferred_anonymity, u.author_bio, u.website_url, u.social_links, \
     u.followers, u.following, u.created_at, u.last_login, u.role, u.is_active";

pub(super) fn user_from_row(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        password_hash: row.get(3)?,
        display_name: row.get(4)?,
        bio: row.get(5)?,
        age_range: row.get(6)?,
        preferred_anonymity: row.get(7)?,
        author_bio: row.get(8)?,
        website_url: row.get(9)?,
        social_links: json_col(row, 10)?,
        followers: row.get(11)?,
        following: row.get(12)?,
        created_at: row.get(13)?,
        last_login: row.get(14)?,
        role: enum_col(row, 15)?,
        is_active: row.get(16)?,
    })
}

pub(super) fn create(conn: &Connection, user: NewUser) -> Result<UserRow> {
    if by_email(conn, &user.email)?.is_some() {
        return Err(StorageError::Conflict("Email already registered".into()).into());
    }
    if by_username(conn, &user.username)?.is_some() {
        return Err(StorageError::Conflict("Username already taken".into()).into());
    }

    let now = Utc::now();
    conn.execute(
        "INSERT INTO users (username, email, password_hash, display_name, age_range, role, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            user.username,
            user.email,
            user.password_hash,
            user.display_name,
            user.age_range,
            user.role.as_str(),
            now,
        ],
    )
    .map_err(|e| {
        if is_unique_violation(&e) {
            anyhow::Error::from(StorageError::Conflict("Username or email already taken".into()))
        } else {
            e.into()
        }
    })?;

    let id = conn.last_insert_rowid();
    by_id(conn, id)?.ok_or_else(|| StorageError::NotFound("User").into())
}

pub(super) fn by_id(conn: &Connection, id: i64) -> Result<Option<UserRow>> {
    query_one(conn, "u.id = ?1", id)
}

pub(super) fn by_email(conn: &Connection, email: &str) -> Result<Option<UserRow>> {
    let sql = format!("SELECT {} FROM users u WHERE lower(u.email) = lower(?1)", USER_COLUMNS);
    conn.query_row(&sql, [email], user_from_row).optional()
}

pub(super) fn by_username(conn: &Connection, username: &str) -> Result<Option<UserRow>> {
    let sql = format!("SELECT {} FROM users u WHERE u.username = ?1", USER_COLUMNS);
    conn.query_row(&sql, [username], user_from_row).optional()
}

fn query_one(conn: &Connection, predicate: &str, id: i64) -> Result<Option<UserRow>> {
    let sql = format!("SELECT {} FROM users u WHERE {}", USER_COLUMNS, predicate);
    conn.query_row(&sql, [id], user_from_row).optional()
}

pub(super) fn update_profile(conn: &Connection, user: &UserRow) -> Result<()> {
    let links = serde_json::to_string(&user.social_links)?;
    let changed = conn.execute(
        "UPDATE users SET display_name = ?2, bio = ?3, age_range = ?4, preferred_anonymity = ?5,
             author_bio = ?6, website_url = ?7, social_links = ?8
         WHERE id = ?1",
        params![
            user.id,
            user.display_name,
            user.bio,
            user.age_range,
            user.preferred_anonymity,
            user.author_bio,
            user.website_url,
            links,
        ],
    )?;
    if changed == 0 {
        return Err(StorageError::NotFound("User").into());
    }
    Ok(())
}

pub(super) fn set_password_hash(conn: &Connection, user_id: i64, hash: &str) -> Result<()> {
    let changed = conn.execute("UPDATE users SET password_hash = ?2 WHERE id = ?1", params![user_id, hash])?;
    if changed == 0 {
        return Err(StorageError::NotFound("User").into());
    }
    Ok(())
}

pub(super) fn list(conn: &Connection) -> Result<Vec<UserRow>> {
    let sql = format!("SELECT {} FROM users u ORDER BY u.created_at DESC, u.id DESC", USER_COLUMNS);
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([], user_from_row)?;
    let mut users = Vec::new();
    for row in rows {
        users.push(row?);
    }
    Ok(users)
}

pub(super) fn set_role(conn: &Connection, user_id: i64, role: UserRole) -> Result<()> {
    let changed = conn.execute("UPDATE users SET role = ?2 WHERE id = ?1", params![user_id, role.as_str()])?;
    if changed == 0 {
        return Err(StorageError::NotFound("User").into());
    }
    Ok(())
}

pub(super) fn set_active(conn: &Connection, user_id: i64, active: bool) -> Result<()> {
    let changed = conn.execute("UPDATE users SET is_active = ?2 WHERE id = ?1", params![user_id, active])?;
    if changed == 0 {
        return Err(StorageError::NotFound("User").into());
    }
    Ok(())
}

pub(super) fn record_login(conn: &Connection, user_id: i64, at: DateTime<Utc>) -> Result<()> {
    conn.execute("UPDATE users SET last_login = ?2 WHERE id = ?1", params![user_id, at])?;
    Ok(())
}

/// Deletes the user (rows they own cascade) and recomputes the counters the
/// cascade touched on everybody else's rows.
pub(super) fn delete(conn: &Connection, user_id: i64) -> Result<bool> {
    let removed = conn.execute("DELETE FROM users WHERE id = ?1", [user_id])?;
    if removed == 0 {
        return Ok(false);
    }

    conn.execute_batch(
        "
        UPDATE stories SET
            support_count = (SELECT COUNT(*) FROM reactions r WHERE r.story_id = stories.id),
            comment_count = (SELECT COUNT(*) FROM comments c WHERE c.story_id = stories.id),
            save_count    = (SELECT COUNT(*) FROM bookmarks b WHERE b.story_id = stories.id);

        UPDATE users SET
            followers = (SELECT COUNT(*) FROM follows f WHERE f.following_id = users.id),
            following = (SELECT COUNT(*) FROM follows f WHERE f.follower_id = users.id);

        UPDATE challenges SET
            submissions = (SELECT COUNT(*) FROM challenge_submissions s WHERE s.challenge_id = challenges.id);
        ",
    )?;
    conn.execute("DELETE FROM revoked_tokens WHERE user_id = ?1", [user_id])?;

    Ok(true)
}

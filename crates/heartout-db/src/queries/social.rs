use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, Row, params};

use heartout_types::models::AchievementKind;

use super::users::{USER_COLUMNS, user_from_row};
use super::{OptionalExt, enum_col};
use crate::models::{AchievementRow, NewTip, TipRow, UserRow};
use crate::storage::StorageError;

// -- Follows --

pub(super) fn toggle_follow(conn: &Connection, follower_id: i64, following_id: i64) -> Result<(bool, i64)> {
    let removed = conn.execute(
        "DELETE FROM follows WHERE follower_id = ?1 AND following_id = ?2",
        params![follower_id, following_id],
    )?;

    let now_following = if removed > 0 {
        conn.execute("UPDATE users SET followers = MAX(0, followers - 1) WHERE id = ?1", [following_id])?;
        conn.execute("UPDATE users SET following = MAX(0, following - 1) WHERE id = ?1", [follower_id])?;
        false
    } else {
        conn.execute(
            "INSERT INTO follows (follower_id, following_id, created_at) VALUES (?1, ?2, ?3)",
            params![follower_id, following_id, Utc::now()],
        )?;
        conn.execute("UPDATE users SET followers = followers + 1 WHERE id = ?1", [following_id])?;
        conn.execute("UPDATE users SET following = following + 1 WHERE id = ?1", [follower_id])?;
        true
    };

    let followers = conn.query_row("SELECT followers FROM users WHERE id = ?1", [following_id], |r| r.get(0))?;
    Ok((now_following, followers))
}

pub(super) fn is_following(conn: &Connection, follower_id: i64, following_id: i64) -> Result<bool> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM follows WHERE follower_id = ?1 AND following_id = ?2",
            params![follower_id, following_id],
            |r| r.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

pub(super) fn followers(conn: &Connection, user_id: i64) -> Result<Vec<UserRow>> {
    follow_list(conn, "f.follower_id", "f.following_id", user_id)
}

pub(super) fn following(conn: &Connection, user_id: i64) -> Result<Vec<UserRow>> {
    follow_list(conn, "f.following_id", "f.follower_id", user_id)
}

fn follow_list(conn: &Connection, join_col: &str, match_col: &str, user_id: i64) -> Result<Vec<UserRow>> {
    let sql = format!(
        "SELECT {} FROM follows f JOIN users u ON u.id = {} WHERE {} = ?1 ORDER BY f.id DESC",
        USER_COLUMNS, join_col, match_col
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([user_id], user_from_row)?;
    let mut users = Vec::new();
    for row in rows {
        users.push(row?);
    }
    Ok(users)
}

// -- Tips --

fn tip_from_row(row: &Row<'_>) -> rusqlite::Result<TipRow> {
    Ok(TipRow {
        id: row.get(0)?,
        story_id: row.get(1)?,
        from_user_id: row.get(2)?,
        to_user_id: row.get(3)?,
        amount: row.get(4)?,
        message: row.get(5)?,
        payment_intent_id: row.get(6)?,
        created_at: row.get(7)?,
    })
}

const TIP_COLUMNS: &str = "id, story_id, from_user_id, to_user_id, amount, message, payment_intent_id, created_at";

pub(super) fn create_tip(conn: &Connection, tip: NewTip) -> Result<TipRow> {
    conn.execute(
        "INSERT INTO tips (story_id, from_user_id, to_user_id, amount, message, payment_intent_id, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            tip.story_id,
            tip.from_user_id,
            tip.to_user_id,
            tip.amount,
            tip.message,
            tip.payment_intent_id,
            Utc::now(),
        ],
    )?;
    let id = conn.last_insert_rowid();
    let sql = format!("SELECT {} FROM tips WHERE id = ?1", TIP_COLUMNS);
    conn.query_row(&sql, [id], tip_from_row)
        .optional()?
        .ok_or_else(|| StorageError::NotFound("Tip").into())
}

/// Tips filtered on one of the fixed id columns, newest first.
pub(super) fn tips_where(conn: &Connection, column: &'static str, id: i64) -> Result<Vec<TipRow>> {
    let sql = format!(
        "SELECT {} FROM tips WHERE {} = ?1 ORDER BY id DESC",
        TIP_COLUMNS, column
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([id], tip_from_row)?;
    let mut tips = Vec::new();
    for row in rows {
        tips.push(row?);
    }
    Ok(tips)
}

// -- Achievements --

fn achievement_from_row(row: &Row<'_>) -> rusqlite::Result<AchievementRow> {
    Ok(AchievementRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        kind: enum_col(row, 2)?,
        title: row.get(3)?,
        description: row.get(4)?,
        icon: row.get(5)?,
        unlocked_at: row.get(6)?,
    })
}

pub(super) fn award_achievement(
    conn: &Connection,
    user_id: i64,
    kind: AchievementKind,
) -> Result<Option<AchievementRow>> {
    let (title, description, icon) = kind.badge();
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO achievements (user_id, kind, title, description, icon, unlocked_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![user_id, kind.as_str(), title, description, icon, Utc::now()],
    )?;
    if inserted == 0 {
        return Ok(None);
    }

    let id = conn.last_insert_rowid();
    conn.query_row(
        "SELECT id, user_id, kind, title, description, icon, unlocked_at FROM achievements WHERE id = ?1",
        [id],
        achievement_from_row,
    )
    .optional()
}

pub(super) fn achievements(conn: &Connection, user_id: i64) -> Result<Vec<AchievementRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, user_id, kind, title, description, icon, unlocked_at
         FROM achievements WHERE user_id = ?1 ORDER BY id",
    )?;
    let rows = stmt.query_map([user_id], achievement_from_row)?;
    let mut list = Vec::new();
    for row in rows {
        list.push(row?);
    }
    Ok(list)
}

// -- Token blocklist --

pub(super) fn revoke_token(conn: &Connection, jti: &str, user_id: i64, expires_at: DateTime<Utc>) -> Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO revoked_tokens (jti, user_id, expires_at) VALUES (?1, ?2, ?3)",
        params![jti, user_id, expires_at],
    )?;
    // prune expired entries
    conn.execute("DELETE FROM revoked_tokens WHERE expires_at < ?1", [Utc::now()])?;
    Ok(())
}

pub(super) fn is_token_revoked(conn: &Connection, jti: &str) -> Result<bool> {
    let found: Option<i64> = conn
        .query_row("SELECT 1 FROM revoked_tokens WHERE jti = ?1", [jti], |r| r.get(0))
        .optional()?;
    Ok(found.is_some())
}

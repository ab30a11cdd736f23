use anyhow::Result;
use chrono::Utc;
use rusqlite::{Connection, Row, params};

use heartout_types::api::ReactionAction;
use heartout_types::models::ReactionType;

use super::{OptionalExt, enum_col, is_unique_violation};
use crate::models::{COMPLETION_DEPTH, CommentRow, NewComment, ReactionRow, ReactionToggle, ReadProgressRow};
use crate::storage::StorageError;

// -- Comments --

const COMMENT_COLUMNS: &str = "c.id, c.story_id, c.user_id, c.parent_id, c.content, c.is_anonymous, c.created_at, \
     (SELECT COUNT(*) FROM comments r WHERE r.parent_id = c.id)";

fn comment_from_row(row: &Row<'_>) -> rusqlite::Result<CommentRow> {
    Ok(CommentRow {
        id: row.get(0)?,
        story_id: row.get(1)?,
        user_id: row.get(2)?,
        parent_id: row.get(3)?,
        content: row.get(4)?,
        is_anonymous: row.get(5)?,
        created_at: row.get(6)?,
        reply_count: row.get(7)?,
    })
}

pub(super) fn create_comment(conn: &Connection, comment: NewComment) -> Result<CommentRow> {
    if let Some(parent_id) = comment.parent_id {
        let parent_story: Option<i64> = conn
            .query_row("SELECT story_id FROM comments WHERE id = ?1", [parent_id], |r| r.get(0))
            .optional()?;
        if parent_story != Some(comment.story_id) {
            return Err(StorageError::NotFound("Parent comment").into());
        }
    }

    conn.execute(
        "INSERT INTO comments (story_id, user_id, parent_id, content, is_anonymous, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            comment.story_id,
            comment.user_id,
            comment.parent_id,
            comment.content,
            comment.is_anonymous,
            Utc::now(),
        ],
    )?;
    let id = conn.last_insert_rowid();
    conn.execute("UPDATE stories SET comment_count = comment_count + 1 WHERE id = ?1", [comment.story_id])?;

    comment_by_id(conn, id)?.ok_or_else(|| StorageError::NotFound("Comment").into())
}

pub(super) fn comment_by_id(conn: &Connection, id: i64) -> Result<Option<CommentRow>> {
    let sql = format!("SELECT {} FROM comments c WHERE c.id = ?1", COMMENT_COLUMNS);
    conn.query_row(&sql, [id], comment_from_row).optional()
}

pub(super) fn list_comments(conn: &Connection, story_id: i64) -> Result<Vec<CommentRow>> {
    let sql = format!(
        "SELECT {} FROM comments c WHERE c.story_id = ?1 AND c.parent_id IS NULL ORDER BY c.id",
        COMMENT_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([story_id], comment_from_row)?;
    let mut comments = Vec::new();
    for row in rows {
        comments.push(row?);
    }
    Ok(comments)
}

/// Deletes the comment together with its reply subtree and decrements the
/// story counter by the number of rows removed.
pub(super) fn delete_comment(conn: &Connection, id: i64) -> Result<usize> {
    let story_id: Option<i64> = conn
        .query_row("SELECT story_id FROM comments WHERE id = ?1", [id], |r| r.get(0))
        .optional()?;
    let Some(story_id) = story_id else {
        return Ok(0);
    };

    let removed: i64 = conn.query_row(
        "WITH RECURSIVE subtree(id) AS (
             SELECT ?1
             UNION ALL
             SELECT c.id FROM comments c JOIN subtree t ON c.parent_id = t.id
         )
         SELECT COUNT(*) FROM subtree",
        [id],
        |r| r.get(0),
    )?;

    conn.execute("DELETE FROM comments WHERE id = ?1", [id])?;
    conn.execute(
        "UPDATE stories SET comment_count = MAX(0, comment_count - ?2) WHERE id = ?1",
        params![story_id, removed],
    )?;

    Ok(removed as usize)
}

pub(super) fn count_comments_by_user(conn: &Connection, user_id: i64) -> Result<i64> {
    Ok(conn.query_row("SELECT COUNT(*) FROM comments WHERE user_id = ?1", [user_id], |r| r.get(0))?)
}

// -- Reactions --

fn reaction_from_row(row: &Row<'_>) -> rusqlite::Result<ReactionRow> {
    Ok(ReactionRow {
        id: row.get(0)?,
        story_id: row.get(1)?,
        user_id: row.get(2)?,
        reaction_type: enum_col(row, 3)?,
        message: row.get(4)?,
        created_at: row.get(5)?,
    })
}

pub(super) fn reaction_of(conn: &Connection, user_id: i64, story_id: i64) -> Result<Option<ReactionRow>> {
    conn.query_row(
        "SELECT id, story_id, user_id, reaction_type, message, created_at
         FROM reactions WHERE user_id = ?1 AND story_id = ?2",
        params![user_id, story_id],
        reaction_from_row,
    )
    .optional()
}

fn support_count(conn: &Connection, story_id: i64) -> Result<i64> {
    Ok(conn.query_row("SELECT support_count FROM stories WHERE id = ?1", [story_id], |r| r.get(0))?)
}

fn insert_reaction(
    conn: &Connection,
    user_id: i64,
    story_id: i64,
    reaction_type: ReactionType,
    message: Option<String>,
) -> Result<ReactionRow> {
    conn.execute(
        "INSERT INTO reactions (story_id, user_id, reaction_type, message, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![story_id, user_id, reaction_type.as_str(), message, Utc::now()],
    )
    .map_err(|e| {
        if is_unique_violation(&e) {
            anyhow::Error::from(StorageError::Conflict("You have already reacted to this story".into()))
        } else {
            e.into()
        }
    })?;
    conn.execute("UPDATE stories SET support_count = support_count + 1 WHERE id = ?1", [story_id])?;

    reaction_of(conn, user_id, story_id)?.ok_or_else(|| StorageError::NotFound("Reaction").into())
}

pub(super) fn add_reaction(
    conn: &Connection,
    user_id: i64,
    story_id: i64,
    reaction_type: ReactionType,
    message: Option<String>,
) -> Result<ReactionRow> {
    if reaction_of(conn, user_id, story_id)?.is_some() {
        return Err(StorageError::Conflict("You have already reacted to this story".into()).into());
    }
    insert_reaction(conn, user_id, story_id, reaction_type, message)
}

pub(super) fn toggle_reaction(
    conn: &Connection,
    user_id: i64,
    story_id: i64,
    reaction_type: ReactionType,
    message: Option<String>,
) -> Result<ReactionToggle> {
    let (action, reaction) = match reaction_of(conn, user_id, story_id)? {
        Some(existing) if existing.reaction_type == reaction_type => {
            conn.execute("DELETE FROM reactions WHERE id = ?1", [existing.id])?;
            conn.execute(
                "UPDATE stories SET support_count = MAX(0, support_count - 1) WHERE id = ?1",
                [story_id],
            )?;
            (ReactionAction::Removed, None)
        }
        Some(existing) => {
            conn.execute(
                "UPDATE reactions SET reaction_type = ?2, message = ?3 WHERE id = ?1",
                params![existing.id, reaction_type.as_str(), message],
            )?;
            (ReactionAction::Changed, reaction_of(conn, user_id, story_id)?)
        }
        None => {
            let row = insert_reaction(conn, user_id, story_id, reaction_type, message)?;
            (ReactionAction::Added, Some(row))
        }
    };

    Ok(ReactionToggle {
        action,
        reaction,
        support_count: support_count(conn, story_id)?,
    })
}

pub(super) fn count_reactions(conn: &Connection, story_id: i64, reaction_type: Option<ReactionType>) -> Result<i64> {
    let count = match reaction_type {
        Some(kind) => conn.query_row(
            "SELECT COUNT(*) FROM reactions WHERE story_id = ?1 AND reaction_type = ?2",
            params![story_id, kind.as_str()],
            |r| r.get(0),
        )?,
        None => conn.query_row("SELECT COUNT(*) FROM reactions WHERE story_id = ?1", [story_id], |r| r.get(0))?,
    };
    Ok(count)
}

pub(super) fn count_reactions_by_user(conn: &Connection, user_id: i64) -> Result<i64> {
    Ok(conn.query_row("SELECT COUNT(*) FROM reactions WHERE user_id = ?1", [user_id], |r| r.get(0))?)
}

// -- Bookmarks --

pub(super) fn toggle_bookmark(conn: &Connection, user_id: i64, story_id: i64) -> Result<(bool, i64)> {
    let removed = conn.execute(
        "DELETE FROM bookmarks WHERE user_id = ?1 AND story_id = ?2",
        params![user_id, story_id],
    )?;

    let bookmarked = if removed > 0 {
        conn.execute("UPDATE stories SET save_count = MAX(0, save_count - 1) WHERE id = ?1", [story_id])?;
        false
    } else {
        conn.execute(
            "INSERT INTO bookmarks (user_id, story_id, created_at) VALUES (?1, ?2, ?3)",
            params![user_id, story_id, Utc::now()],
        )?;
        conn.execute("UPDATE stories SET save_count = save_count + 1 WHERE id = ?1", [story_id])?;
        true
    };

    let save_count = conn.query_row("SELECT save_count FROM stories WHERE id = ?1", [story_id], |r| r.get(0))?;
    Ok((bookmarked, save_count))
}

pub(super) fn is_bookmarked(conn: &Connection, user_id: i64, story_id: i64) -> Result<bool> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM bookmarks WHERE user_id = ?1 AND story_id = ?2",
            params![user_id, story_id],
            |r| r.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

// -- Read progress --

/// Upserts the reader's progress. The first call for a (user, story) pair
/// counts a unique reader; every later call counts a re-read. Depth only
/// grows and time spent is the running mean of the reported durations.
pub(super) fn record_read_progress(
    conn: &Connection,
    user_id: i64,
    story_id: i64,
    scroll_depth: Option<f64>,
    time_spent: Option<i64>,
) -> Result<ReadProgressRow> {
    let now = Utc::now();
    let depth = scroll_depth.map(|d| d.clamp(0.0, 1.0));
    let spent = time_spent.map(|t| t.max(0));

    match progress_of(conn, user_id, story_id)? {
        None => {
            let depth = depth.unwrap_or(0.0);
            conn.execute(
                "INSERT INTO read_progress (user_id, story_id, scroll_depth, time_spent, completed,
                                            read_count, first_read, last_read)
                 VALUES (?1, ?2, ?3, ?4, ?5, 1, ?6, ?6)",
                params![user_id, story_id, depth, spent.unwrap_or(0), depth >= COMPLETION_DEPTH, now],
            )?;
            conn.execute("UPDATE stories SET unique_readers = unique_readers + 1 WHERE id = ?1", [story_id])?;
        }
        Some(prev) => {
            let new_depth = depth.map_or(prev.scroll_depth, |d| prev.scroll_depth.max(d));
            let new_spent = spent.map_or(prev.time_spent, |t| (prev.time_spent + t) / 2);
            conn.execute(
                "UPDATE read_progress SET scroll_depth = ?3, time_spent = ?4, completed = ?5,
                     read_count = read_count + 1, last_read = ?6
                 WHERE user_id = ?1 AND story_id = ?2",
                params![
                    user_id,
                    story_id,
                    new_depth,
                    new_spent,
                    prev.completed || new_depth >= COMPLETION_DEPTH,
                    now,
                ],
            )?;
            conn.execute("UPDATE stories SET reread_count = reread_count + 1 WHERE id = ?1", [story_id])?;
        }
    }

    progress_of(conn, user_id, story_id)?.ok_or_else(|| StorageError::NotFound("Read progress").into())
}

fn progress_of(conn: &Connection, user_id: i64, story_id: i64) -> Result<Option<ReadProgressRow>> {
    conn.query_row(
        "SELECT user_id, story_id, scroll_depth, time_spent, completed, read_count, first_read, last_read
         FROM read_progress WHERE user_id = ?1 AND story_id = ?2",
        params![user_id, story_id],
        |row| {
            Ok(ReadProgressRow {
                user_id: row.get(0)?,
                story_id: row.get(1)?,
                scroll_depth: row.get(2)?,
                time_spent: row.get(3)?,
                completed: row.get(4)?,
                read_count: row.get(5)?,
                first_read: row.get(6)?,
                last_read: row.get(7)?,
            })
        },
    )
    .optional()
}

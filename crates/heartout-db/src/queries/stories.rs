use anyhow::Result;
use chrono::Utc;
use rusqlite::types::Value;
use rusqlite::{Connection, Row, params, params_from_iter};

use heartout_types::models::StoryStatus;

use super::{OptionalExt, enum_col, json_col};
use crate::models::{NewStory, StoryFilter, StoryRow};
use crate::storage::StorageError;

const STORY_COLUMNS: &str = "s.id, s.author_id, s.title, s.content, s.story_type, s.status, s.is_anonymous, \
     s.tags, s.reading_time, s.view_count, s.support_count, s.comment_count, s.save_count, \
     s.unique_readers, s.reread_count, s.is_featured, s.created_at, s.updated_at, s.published_at";

fn story_from_row(row: &Row<'_>) -> rusqlite::Result<StoryRow> {
    Ok(StoryRow {
        id: row.get(0)?,
        author_id: row.get(1)?,
        title: row.get(2)?,
        content: row.get(3)?,
        story_type: enum_col(row, 4)?,
        status: enum_col(row, 5)?,
        is_anonymous: row.get(6)?,
        tags: json_col(row, 7)?,
        reading_time: row.get(8)?,
        view_count: row.get(9)?,
        support_count: row.get(10)?,
        comment_count: row.get(11)?,
        save_count: row.get(12)?,
        unique_readers: row.get(13)?,
        reread_count: row.get(14)?,
        is_featured: row.get(15)?,
        created_at: row.get(16)?,
        updated_at: row.get(17)?,
        published_at: row.get(18)?,
    })
}

pub(super) fn create(conn: &Connection, story: NewStory) -> Result<StoryRow> {
    let now = Utc::now();
    let published_at = (story.status == StoryStatus::Published).then_some(now);
    let tags = serde_json::to_string(&story.tags)?;

    conn.execute(
        "INSERT INTO stories (author_id, title, content, story_type, status, is_anonymous, tags,
                              reading_time, created_at, updated_at, published_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9, ?10)",
        params![
            story.author_id,
            story.title,
            story.content,
            story.story_type.as_str(),
            story.status.as_str(),
            story.is_anonymous,
            tags,
            story.reading_time,
            now,
            published_at,
        ],
    )?;

    let id = conn.last_insert_rowid();
    by_id(conn, id)?.ok_or_else(|| StorageError::NotFound("Story").into())
}

pub(super) fn by_id(conn: &Connection, id: i64) -> Result<Option<StoryRow>> {
    let sql = format!("SELECT {} FROM stories s WHERE s.id = ?1", STORY_COLUMNS);
    conn.query_row(&sql, [id], story_from_row).optional()
}

/// Writes the author-editable fields. `published_at` is stamped the first
/// time the story becomes published and never cleared afterwards.
pub(super) fn update(conn: &Connection, story: &StoryRow) -> Result<StoryRow> {
    let now = Utc::now();
    let tags = serde_json::to_string(&story.tags)?;
    let publish_stamp = (story.status == StoryStatus::Published).then_some(now);

    let changed = conn.execute(
        "UPDATE stories SET title = ?2, content = ?3, story_type = ?4, status = ?5, is_anonymous = ?6,
             tags = ?7, reading_time = ?8, is_featured = ?9, updated_at = ?10,
             published_at = COALESCE(published_at, ?11)
         WHERE id = ?1",
        params![
            story.id,
            story.title,
            story.content,
            story.story_type.as_str(),
            story.status.as_str(),
            story.is_anonymous,
            tags,
            story.reading_time,
            story.is_featured,
            now,
            publish_stamp,
        ],
    )?;
    if changed == 0 {
        return Err(StorageError::NotFound("Story").into());
    }

    by_id(conn, story.id)?.ok_or_else(|| StorageError::NotFound("Story").into())
}

pub(super) fn delete(conn: &Connection, id: i64) -> Result<bool> {
    let removed = conn.execute("DELETE FROM stories WHERE id = ?1", [id])?;
    if removed > 0 {
        conn.execute(
            "UPDATE challenges SET submissions =
                 (SELECT COUNT(*) FROM challenge_submissions s WHERE s.challenge_id = challenges.id)",
            [],
        )?;
    }
    Ok(removed > 0)
}

pub(super) fn increment_views(conn: &Connection, id: i64) -> Result<Option<i64>> {
    conn.query_row(
        "UPDATE stories SET view_count = view_count + 1 WHERE id = ?1 RETURNING view_count",
        [id],
        |row| row.get(0),
    )
    .optional()
}

pub(super) fn list(conn: &Connection, filter: &StoryFilter) -> Result<Vec<StoryRow>> {
    let mut clauses: Vec<&str> = Vec::new();
    let mut values: Vec<Value> = Vec::new();

    if let Some(status) = filter.status {
        clauses.push("s.status = ?");
        values.push(Value::Text(status.as_str().to_string()));
    }
    if let Some(story_type) = filter.story_type {
        clauses.push("s.story_type = ?");
        values.push(Value::Text(story_type.as_str().to_string()));
    }
    if let Some(author_id) = filter.author_id {
        clauses.push("s.author_id = ?");
        values.push(Value::Integer(author_id));
    }
    if let Some(anonymous) = filter.is_anonymous {
        clauses.push("s.is_anonymous = ?");
        values.push(Value::Integer(anonymous as i64));
    }
    if filter.featured_only {
        clauses.push("s.is_featured = 1");
    }
    if let Some(q) = &filter.search {
        clauses.push("(instr(lower(s.title), lower(?)) > 0 OR instr(lower(s.content), lower(?)) > 0)");
        values.push(Value::Text(q.clone()));
        values.push(Value::Text(q.clone()));
    }

    let mut sql = format!("SELECT {} FROM stories s", STORY_COLUMNS);
    if !clauses.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&clauses.join(" AND "));
    }
    sql.push_str(" ORDER BY s.id");

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(values), story_from_row)?;
    let mut stories = Vec::new();
    for row in rows {
        stories.push(row?);
    }
    Ok(stories)
}

pub(super) fn bookmarked_by(conn: &Connection, user_id: i64) -> Result<Vec<StoryRow>> {
    let sql = format!(
        "SELECT {} FROM bookmarks b JOIN stories s ON s.id = b.story_id
         WHERE b.user_id = ?1 AND s.status = 'published'
         ORDER BY b.id DESC",
        STORY_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([user_id], story_from_row)?;
    let mut stories = Vec::new();
    for row in rows {
        stories.push(row?);
    }
    Ok(stories)
}

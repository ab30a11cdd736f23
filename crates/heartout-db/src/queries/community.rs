use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, Row, params};

use super::{OptionalExt, is_unique_violation};
use crate::models::{ChallengeRow, NewChallenge, NewReview, ReviewRow, SiteCounts, SubmissionRow};
use crate::storage::StorageError;

// -- Challenges --

const CHALLENGE_COLUMNS: &str =
    "id, title, description, prompt, start_date, end_date, submissions, is_active, created_at";

fn challenge_from_row(row: &Row<'_>) -> rusqlite::Result<ChallengeRow> {
    Ok(ChallengeRow {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        prompt: row.get(3)?,
        start_date: row.get(4)?,
        end_date: row.get(5)?,
        submissions: row.get(6)?,
        is_active: row.get(7)?,
        created_at: row.get(8)?,
    })
}

pub(super) fn create_challenge(conn: &Connection, challenge: NewChallenge) -> Result<ChallengeRow> {
    conn.execute(
        "INSERT INTO challenges (title, description, prompt, start_date, end_date, is_active, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            challenge.title,
            challenge.description,
            challenge.prompt,
            challenge.start_date,
            challenge.end_date,
            challenge.is_active,
            Utc::now(),
        ],
    )?;
    let id = conn.last_insert_rowid();
    challenge_by_id(conn, id)?.ok_or_else(|| StorageError::NotFound("Challenge").into())
}

pub(super) fn challenge_by_id(conn: &Connection, id: i64) -> Result<Option<ChallengeRow>> {
    let sql = format!("SELECT {} FROM challenges WHERE id = ?1", CHALLENGE_COLUMNS);
    conn.query_row(&sql, [id], challenge_from_row).optional()
}

pub(super) fn list_challenges(conn: &Connection) -> Result<Vec<ChallengeRow>> {
    let sql = format!("SELECT {} FROM challenges ORDER BY id DESC", CHALLENGE_COLUMNS);
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([], challenge_from_row)?;
    let mut list = Vec::new();
    for row in rows {
        list.push(row?);
    }
    Ok(list)
}

pub(super) fn active_challenge(conn: &Connection, now: DateTime<Utc>) -> Result<Option<ChallengeRow>> {
    // compare parsed timestamps, not stored text
    Ok(list_challenges(conn)?
        .into_iter()
        .filter(|c| c.is_active && c.start_date <= now && now <= c.end_date)
        .min_by_key(|c| (c.end_date, c.id)))
}

const SUBMISSION_COLUMNS: &str = "id, challenge_id, story_id, user_id, votes, created_at";

fn submission_from_row(row: &Row<'_>) -> rusqlite::Result<SubmissionRow> {
    Ok(SubmissionRow {
        id: row.get(0)?,
        challenge_id: row.get(1)?,
        story_id: row.get(2)?,
        user_id: row.get(3)?,
        votes: row.get(4)?,
        created_at: row.get(5)?,
    })
}

pub(super) fn submit(conn: &Connection, challenge_id: i64, story_id: i64, user_id: i64) -> Result<SubmissionRow> {
    conn.execute(
        "INSERT INTO challenge_submissions (challenge_id, story_id, user_id, created_at)
         VALUES (?1, ?2, ?3, ?4)",
        params![challenge_id, story_id, user_id, Utc::now()],
    )
    .map_err(|e| {
        if is_unique_violation(&e) {
            anyhow::Error::from(StorageError::Conflict("Story already submitted to this challenge".into()))
        } else {
            e.into()
        }
    })?;
    let id = conn.last_insert_rowid();
    conn.execute("UPDATE challenges SET submissions = submissions + 1 WHERE id = ?1", [challenge_id])?;

    let sql = format!("SELECT {} FROM challenge_submissions WHERE id = ?1", SUBMISSION_COLUMNS);
    conn.query_row(&sql, [id], submission_from_row)
        .optional()?
        .ok_or_else(|| StorageError::NotFound("Submission").into())
}

pub(super) fn submissions(conn: &Connection, challenge_id: i64) -> Result<Vec<SubmissionRow>> {
    let sql = format!(
        "SELECT {} FROM challenge_submissions WHERE challenge_id = ?1 ORDER BY votes DESC, id",
        SUBMISSION_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([challenge_id], submission_from_row)?;
    let mut list = Vec::new();
    for row in rows {
        list.push(row?);
    }
    Ok(list)
}

// -- Reviews --

const REVIEW_COLUMNS: &str = "id, story_id, reviewer_id, content, rating, is_completed, due_date, created_at";

fn review_from_row(row: &Row<'_>) -> rusqlite::Result<ReviewRow> {
    Ok(ReviewRow {
        id: row.get(0)?,
        story_id: row.get(1)?,
        reviewer_id: row.get(2)?,
        content: row.get(3)?,
        rating: row.get(4)?,
        is_completed: row.get(5)?,
        due_date: row.get(6)?,
        created_at: row.get(7)?,
    })
}

pub(super) fn create_review(conn: &Connection, review: NewReview) -> Result<ReviewRow> {
    conn.execute(
        "INSERT INTO reviews (story_id, reviewer_id, content, rating, due_date, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            review.story_id,
            review.reviewer_id,
            review.content,
            review.rating,
            review.due_date,
            Utc::now(),
        ],
    )?;
    let id = conn.last_insert_rowid();
    review_by_id(conn, id)?.ok_or_else(|| StorageError::NotFound("Review").into())
}

pub(super) fn review_by_id(conn: &Connection, id: i64) -> Result<Option<ReviewRow>> {
    let sql = format!("SELECT {} FROM reviews WHERE id = ?1", REVIEW_COLUMNS);
    conn.query_row(&sql, [id], review_from_row).optional()
}

pub(super) fn update_review(conn: &Connection, review: &ReviewRow) -> Result<()> {
    let changed = conn.execute(
        "UPDATE reviews SET content = ?2, rating = ?3, is_completed = ?4 WHERE id = ?1",
        params![review.id, review.content, review.rating, review.is_completed],
    )?;
    if changed == 0 {
        return Err(StorageError::NotFound("Review").into());
    }
    Ok(())
}

pub(super) fn reviews_by_reviewer(conn: &Connection, reviewer_id: i64) -> Result<Vec<ReviewRow>> {
    let sql = format!(
        "SELECT {} FROM reviews WHERE reviewer_id = ?1 ORDER BY id DESC",
        REVIEW_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([reviewer_id], review_from_row)?;
    let mut list = Vec::new();
    for row in rows {
        list.push(row?);
    }
    Ok(list)
}

// -- Moderation --

pub(super) fn site_counts(conn: &Connection, since: DateTime<Utc>) -> Result<SiteCounts> {
    Ok(conn.query_row(
        "SELECT
             (SELECT COUNT(*) FROM users),
             (SELECT COUNT(*) FROM users WHERE created_at >= ?1),
             (SELECT COUNT(*) FROM users WHERE is_active = 1),
             (SELECT COUNT(*) FROM stories),
             (SELECT COUNT(*) FROM stories WHERE status = 'published'),
             (SELECT COUNT(*) FROM stories WHERE status = 'flagged'),
             (SELECT COUNT(*) FROM reactions),
             (SELECT COUNT(*) FROM reactions WHERE created_at >= ?1)",
        [since],
        |r| {
            Ok(SiteCounts {
                users: r.get(0)?,
                new_users: r.get(1)?,
                active_users: r.get(2)?,
                stories: r.get(3)?,
                published_stories: r.get(4)?,
                flagged_stories: r.get(5)?,
                reactions: r.get(6)?,
                recent_reactions: r.get(7)?,
            })
        },
    )?)
}

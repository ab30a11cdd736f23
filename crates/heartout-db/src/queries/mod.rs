//! SQLite implementation of `Storage`. Each submodule holds free functions over a
//! `&Connection`; the trait impl below only picks the connection/transaction.

mod community;
mod engagement;
mod social;
mod stories;
mod users;

use std::str::FromStr;

use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::Row;

use heartout_types::models::{AchievementKind, ReactionType, UserRole};

use crate::models::*;
use crate::storage::Storage;
use crate::Database;

impl Storage for Database {
    fn create_user(&self, user: NewUser) -> Result<UserRow> {
        self.with_tx(|conn| users::create(conn, user))
    }

    fn get_user(&self, id: i64) -> Result<Option<UserRow>> {
        self.with_conn(|conn| users::by_id(conn, id))
    }

    fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| users::by_email(conn, email))
    }

    fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| users::by_username(conn, username))
    }

    fn update_user_profile(&self, user: &UserRow) -> Result<()> {
        self.with_conn(|conn| users::update_profile(conn, user))
    }

    fn set_password_hash(&self, user_id: i64, hash: &str) -> Result<()> {
        self.with_conn(|conn| users::set_password_hash(conn, user_id, hash))
    }

    fn record_login(&self, user_id: i64, at: DateTime<Utc>) -> Result<()> {
        self.with_conn(|conn| users::record_login(conn, user_id, at))
    }

    fn delete_user(&self, user_id: i64) -> Result<bool> {
        self.with_tx(|conn| users::delete(conn, user_id))
    }

    fn list_users(&self) -> Result<Vec<UserRow>> {
        self.with_conn(users::list)
    }

    fn set_user_role(&self, user_id: i64, role: UserRole) -> Result<()> {
        self.with_conn(|conn| users::set_role(conn, user_id, role))
    }

    fn set_user_active(&self, user_id: i64, active: bool) -> Result<()> {
        self.with_conn(|conn| users::set_active(conn, user_id, active))
    }

    fn create_story(&self, story: NewStory) -> Result<StoryRow> {
        self.with_conn(|conn| stories::create(conn, story))
    }

    fn get_story(&self, id: i64) -> Result<Option<StoryRow>> {
        self.with_conn(|conn| stories::by_id(conn, id))
    }

    fn update_story(&self, story: &StoryRow) -> Result<StoryRow> {
        self.with_conn(|conn| stories::update(conn, story))
    }

    fn delete_story(&self, id: i64) -> Result<bool> {
        self.with_tx(|conn| stories::delete(conn, id))
    }

    fn increment_views(&self, id: i64) -> Result<Option<i64>> {
        self.with_conn(|conn| stories::increment_views(conn, id))
    }

    fn list_stories(&self, filter: &StoryFilter) -> Result<Vec<StoryRow>> {
        self.with_conn(|conn| stories::list(conn, filter))
    }

    fn bookmarked_stories(&self, user_id: i64) -> Result<Vec<StoryRow>> {
        self.with_conn(|conn| stories::bookmarked_by(conn, user_id))
    }

    fn create_comment(&self, comment: NewComment) -> Result<CommentRow> {
        self.with_tx(|conn| engagement::create_comment(conn, comment))
    }

    fn get_comment(&self, id: i64) -> Result<Option<CommentRow>> {
        self.with_conn(|conn| engagement::comment_by_id(conn, id))
    }

    fn list_comments(&self, story_id: i64) -> Result<Vec<CommentRow>> {
        self.with_conn(|conn| engagement::list_comments(conn, story_id))
    }

    fn delete_comment(&self, id: i64) -> Result<usize> {
        self.with_tx(|conn| engagement::delete_comment(conn, id))
    }

    fn count_comments_by_user(&self, user_id: i64) -> Result<i64> {
        self.with_conn(|conn| engagement::count_comments_by_user(conn, user_id))
    }

    fn add_reaction(
        &self,
        user_id: i64,
        story_id: i64,
        reaction_type: ReactionType,
        message: Option<String>,
    ) -> Result<ReactionRow> {
        self.with_tx(|conn| engagement::add_reaction(conn, user_id, story_id, reaction_type, message))
    }

    fn toggle_reaction(
        &self,
        user_id: i64,
        story_id: i64,
        reaction_type: ReactionType,
        message: Option<String>,
    ) -> Result<ReactionToggle> {
        self.with_tx(|conn| engagement::toggle_reaction(conn, user_id, story_id, reaction_type, message))
    }

    fn get_reaction(&self, user_id: i64, story_id: i64) -> Result<Option<ReactionRow>> {
        self.with_conn(|conn| engagement::reaction_of(conn, user_id, story_id))
    }

    fn count_reactions(&self, story_id: i64, reaction_type: Option<ReactionType>) -> Result<i64> {
        self.with_conn(|conn| engagement::count_reactions(conn, story_id, reaction_type))
    }

    fn count_reactions_by_user(&self, user_id: i64) -> Result<i64> {
        self.with_conn(|conn| engagement::count_reactions_by_user(conn, user_id))
    }

    fn toggle_bookmark(&self, user_id: i64, story_id: i64) -> Result<(bool, i64)> {
        self.with_tx(|conn| engagement::toggle_bookmark(conn, user_id, story_id))
    }

    fn is_bookmarked(&self, user_id: i64, story_id: i64) -> Result<bool> {
        self.with_conn(|conn| engagement::is_bookmarked(conn, user_id, story_id))
    }

    fn record_read_progress(
        &self,
        user_id: i64,
        story_id: i64,
        scroll_depth: Option<f64>,
        time_spent: Option<i64>,
    ) -> Result<ReadProgressRow> {
        self.with_tx(|conn| engagement::record_read_progress(conn, user_id, story_id, scroll_depth, time_spent))
    }

    fn toggle_follow(&self, follower_id: i64, following_id: i64) -> Result<(bool, i64)> {
        self.with_tx(|conn| social::toggle_follow(conn, follower_id, following_id))
    }

    fn is_following(&self, follower_id: i64, following_id: i64) -> Result<bool> {
        self.with_conn(|conn| social::is_following(conn, follower_id, following_id))
    }

    fn followers(&self, user_id: i64) -> Result<Vec<UserRow>> {
        self.with_conn(|conn| social::followers(conn, user_id))
    }

    fn following(&self, user_id: i64) -> Result<Vec<UserRow>> {
        self.with_conn(|conn| social::following(conn, user_id))
    }

    fn create_challenge(&self, challenge: NewChallenge) -> Result<ChallengeRow> {
        self.with_conn(|conn| community::create_challenge(conn, challenge))
    }

    fn get_challenge(&self, id: i64) -> Result<Option<ChallengeRow>> {
        self.with_conn(|conn| community::challenge_by_id(conn, id))
    }

    fn list_challenges(&self) -> Result<Vec<ChallengeRow>> {
        self.with_conn(community::list_challenges)
    }

    fn active_challenge(&self, now: DateTime<Utc>) -> Result<Option<ChallengeRow>> {
        self.with_conn(|conn| community::active_challenge(conn, now))
    }

    fn submit_to_challenge(&self, challenge_id: i64, story_id: i64, user_id: i64) -> Result<SubmissionRow> {
        self.with_tx(|conn| community::submit(conn, challenge_id, story_id, user_id))
    }

    fn challenge_submissions(&self, challenge_id: i64) -> Result<Vec<SubmissionRow>> {
        self.with_conn(|conn| community::submissions(conn, challenge_id))
    }

    fn create_review(&self, review: NewReview) -> Result<ReviewRow> {
        self.with_conn(|conn| community::create_review(conn, review))
    }

    fn get_review(&self, id: i64) -> Result<Option<ReviewRow>> {
        self.with_conn(|conn| community::review_by_id(conn, id))
    }

    fn update_review(&self, review: &ReviewRow) -> Result<()> {
        self.with_conn(|conn| community::update_review(conn, review))
    }

    fn reviews_by_reviewer(&self, reviewer_id: i64) -> Result<Vec<ReviewRow>> {
        self.with_conn(|conn| community::reviews_by_reviewer(conn, reviewer_id))
    }

    fn create_tip(&self, tip: NewTip) -> Result<TipRow> {
        self.with_conn(|conn| social::create_tip(conn, tip))
    }

    fn tips_for_story(&self, story_id: i64) -> Result<Vec<TipRow>> {
        self.with_conn(|conn| social::tips_where(conn, "story_id", story_id))
    }

    fn tips_received(&self, user_id: i64) -> Result<Vec<TipRow>> {
        self.with_conn(|conn| social::tips_where(conn, "to_user_id", user_id))
    }

    fn award_achievement(&self, user_id: i64, kind: AchievementKind) -> Result<Option<AchievementRow>> {
        self.with_conn(|conn| social::award_achievement(conn, user_id, kind))
    }

    fn achievements(&self, user_id: i64) -> Result<Vec<AchievementRow>> {
        self.with_conn(|conn| social::achievements(conn, user_id))
    }

    fn site_counts(&self, since: DateTime<Utc>) -> Result<SiteCounts> {
        self.with_conn(|conn| community::site_counts(conn, since))
    }

    fn revoke_token(&self, jti: &str, user_id: i64, expires_at: DateTime<Utc>) -> Result<()> {
        self.with_conn(|conn| social::revoke_token(conn, jti, user_id, expires_at))
    }

    fn is_token_revoked(&self, jti: &str) -> Result<bool> {
        self.with_conn(|conn| social::is_token_revoked(conn, jti))
    }
}

// -- Column helpers --

/// Reads a TEXT column holding an enum's wire name.
fn enum_col<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: String = row.get(idx)?;
    raw.parse()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Reads a TEXT column holding JSON.
fn json_col<T: serde::de::DeserializeOwned>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

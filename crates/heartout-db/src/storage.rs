use anyhow::Result;
use chrono::{DateTime, Utc};
use thiserror::Error;

use heartout_types::models::{AchievementKind, ReactionType, UserRole};

use crate::models::*;

/// Conditions callers are expected to branch on. Travels inside `anyhow::Error`;
/// use `StorageError::of` to recover it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    #[error("{0}")]
    Conflict(String),
    #[error("{0} not found")]
    NotFound(&'static str),
}

impl StorageError {
    pub fn of(err: &anyhow::Error) -> Option<&StorageError> {
        err.downcast_ref::<StorageError>()
    }
}

/// Everything the HTTP layer persists. Implemented by the SQLite `Database`
/// and by `MemStorage` for development and tests.
///
/// Calls are synchronous; async callers should run them on `spawn_blocking`.
pub trait Storage: Send + Sync {
    // -- Users --

    /// Fails with `StorageError::Conflict` on a taken email or username.
    fn create_user(&self, user: NewUser) -> Result<UserRow>;
    fn get_user(&self, id: i64) -> Result<Option<UserRow>>;
    fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>>;
    fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>>;
    /// Persists the editable profile fields of `user`.
    fn update_user_profile(&self, user: &UserRow) -> Result<()>;
    fn set_password_hash(&self, user_id: i64, hash: &str) -> Result<()>;
    fn record_login(&self, user_id: i64, at: DateTime<Utc>) -> Result<()>;
    /// Removes the user and everything they own. Returns false if unknown.
    fn delete_user(&self, user_id: i64) -> Result<bool>;
    /// Every user, newest first.
    fn list_users(&self) -> Result<Vec<UserRow>>;
    fn set_user_role(&self, user_id: i64, role: UserRole) -> Result<()>;
    fn set_user_active(&self, user_id: i64, active: bool) -> Result<()>;

    // -- Stories --

    fn create_story(&self, story: NewStory) -> Result<StoryRow>;
    fn get_story(&self, id: i64) -> Result<Option<StoryRow>>;
    /// Persists the author-editable fields of `story` and bumps `updated_at`.
    fn update_story(&self, story: &StoryRow) -> Result<StoryRow>;
    fn delete_story(&self, id: i64) -> Result<bool>;
    /// Returns the new view count, or `None` for an unknown story.
    fn increment_views(&self, id: i64) -> Result<Option<i64>>;
    /// Matching stories in insertion order. Ordering and paging are the caller's job.
    fn list_stories(&self, filter: &StoryFilter) -> Result<Vec<StoryRow>>;
    /// Published stories bookmarked by `user_id`, most recently saved first.
    fn bookmarked_stories(&self, user_id: i64) -> Result<Vec<StoryRow>>;

    // -- Comments --

    /// Inserts the comment and increments the story's comment counter.
    fn create_comment(&self, comment: NewComment) -> Result<CommentRow>;
    fn get_comment(&self, id: i64) -> Result<Option<CommentRow>>;
    /// Top-level comments of a story, oldest first, with reply counts.
    fn list_comments(&self, story_id: i64) -> Result<Vec<CommentRow>>;
    /// Deletes the comment and its replies; returns how many rows went away.
    fn delete_comment(&self, id: i64) -> Result<usize>;
    fn count_comments_by_user(&self, user_id: i64) -> Result<i64>;

    // -- Reactions --

    /// Adds a reaction; `StorageError::Conflict` if the user already reacted.
    fn add_reaction(
        &self,
        user_id: i64,
        story_id: i64,
        reaction_type: ReactionType,
        message: Option<String>,
    ) -> Result<ReactionRow>;
    /// Adds, changes or removes the caller's reaction.
    fn toggle_reaction(
        &self,
        user_id: i64,
        story_id: i64,
        reaction_type: ReactionType,
        message: Option<String>,
    ) -> Result<ReactionToggle>;
    fn get_reaction(&self, user_id: i64, story_id: i64) -> Result<Option<ReactionRow>>;
    fn count_reactions(&self, story_id: i64, reaction_type: Option<ReactionType>) -> Result<i64>;
    /// Reactions the user has given, on any story.
    fn count_reactions_by_user(&self, user_id: i64) -> Result<i64>;

    // -- Bookmarks --

    /// Returns (is_bookmarked, save_count) after the toggle.
    fn toggle_bookmark(&self, user_id: i64, story_id: i64) -> Result<(bool, i64)>;
    fn is_bookmarked(&self, user_id: i64, story_id: i64) -> Result<bool>;

    // -- Read progress --

    fn record_read_progress(
        &self,
        user_id: i64,
        story_id: i64,
        scroll_depth: Option<f64>,
        time_spent: Option<i64>,
    ) -> Result<ReadProgressRow>;

    // -- Follows --

    /// Returns (now_following, target's follower count).
    fn toggle_follow(&self, follower_id: i64, following_id: i64) -> Result<(bool, i64)>;
    fn is_following(&self, follower_id: i64, following_id: i64) -> Result<bool>;
    fn followers(&self, user_id: i64) -> Result<Vec<UserRow>>;
    fn following(&self, user_id: i64) -> Result<Vec<UserRow>>;

    // -- Challenges --

    fn create_challenge(&self, challenge: NewChallenge) -> Result<ChallengeRow>;
    fn get_challenge(&self, id: i64) -> Result<Option<ChallengeRow>>;
    /// Newest first.
    fn list_challenges(&self) -> Result<Vec<ChallengeRow>>;
    /// The active challenge running at `now` that ends soonest.
    fn active_challenge(&self, now: DateTime<Utc>) -> Result<Option<ChallengeRow>>;
    /// `StorageError::Conflict` if the story was already submitted.
    fn submit_to_challenge(&self, challenge_id: i64, story_id: i64, user_id: i64) -> Result<SubmissionRow>;
    fn challenge_submissions(&self, challenge_id: i64) -> Result<Vec<SubmissionRow>>;

    // -- Reviews --

    fn create_review(&self, review: NewReview) -> Result<ReviewRow>;
    fn get_review(&self, id: i64) -> Result<Option<ReviewRow>>;
    fn update_review(&self, review: &ReviewRow) -> Result<()>;
    fn reviews_by_reviewer(&self, reviewer_id: i64) -> Result<Vec<ReviewRow>>;

    // -- Tips --

    fn create_tip(&self, tip: NewTip) -> Result<TipRow>;
    fn tips_for_story(&self, story_id: i64) -> Result<Vec<TipRow>>;
    fn tips_received(&self, user_id: i64) -> Result<Vec<TipRow>>;

    // -- Achievements --

    /// Returns `None` if the user already holds this achievement.
    fn award_achievement(&self, user_id: i64, kind: AchievementKind) -> Result<Option<AchievementRow>>;
    fn achievements(&self, user_id: i64) -> Result<Vec<AchievementRow>>;

    // -- Moderation --

    fn site_counts(&self, since: DateTime<Utc>) -> Result<SiteCounts>;

    // -- Token blocklist --

    fn revoke_token(&self, jti: &str, user_id: i64, expires_at: DateTime<Utc>) -> Result<()>;
    fn is_token_revoked(&self, jti: &str) -> Result<bool>;
}

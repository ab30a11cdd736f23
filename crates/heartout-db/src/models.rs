//! Row types returned by both storage backends.
//! Distinct from the heartout-types wire models to keep the storage layer independent.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use heartout_types::api::ReactionAction;
use heartout_types::models::{AchievementKind, ReactionType, StoryStatus, StoryType, UserRole};

#[derive(Debug, Clone, PartialEq)]
pub struct UserRow {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub display_name: Option<String>,
    pub bio: Option<String>,
    pub age_range: Option<String>,
    pub preferred_anonymity: bool,
    pub author_bio: Option<String>,
    pub website_url: Option<String>,
    pub social_links: BTreeMap<String, String>,
    pub followers: i64,
    pub following: i64,
    pub role: UserRole,
    /// False once a moderator suspends the account.
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
}

pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub display_name: Option<String>,
    pub age_range: Option<String>,
    pub role: UserRole,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoryRow {
    pub id: i64,
    pub author_id: i64,
    pub title: String,
    pub content: String,
    pub story_type: StoryType,
    pub status: StoryStatus,
    pub is_anonymous: bool,
    pub tags: Vec<String>,
    pub reading_time: i64,
    pub view_count: i64,
    pub support_count: i64,
    pub comment_count: i64,
    pub save_count: i64,
    pub unique_readers: i64,
    pub reread_count: i64,
    pub is_featured: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub published_at: Option<DateTime<Utc>>,
}

pub struct NewStory {
    pub author_id: i64,
    pub title: String,
    pub content: String,
    pub story_type: StoryType,
    pub status: StoryStatus,
    pub is_anonymous: bool,
    pub tags: Vec<String>,
    pub reading_time: i64,
}

/// Filter for story listings. Unset fields match everything.
#[derive(Debug, Clone, Default)]
pub struct StoryFilter {
    pub status: Option<StoryStatus>,
    pub story_type: Option<StoryType>,
    pub author_id: Option<i64>,
    pub is_anonymous: Option<bool>,
    pub featured_only: bool,
    /// Case-insensitive substring match on title or content.
    pub search: Option<String>,
}

impl StoryFilter {
    pub fn published() -> Self {
        Self {
            status: Some(StoryStatus::Published),
            ..Self::default()
        }
    }

    pub fn matches(&self, story: &StoryRow) -> bool {
        if self.status.is_some_and(|s| s != story.status) {
            return false;
        }
        if self.story_type.is_some_and(|t| t != story.story_type) {
            return false;
        }
        if self.author_id.is_some_and(|a| a != story.author_id) {
            return false;
        }
        if self.is_anonymous.is_some_and(|a| a != story.is_anonymous) {
            return false;
        }
        if self.featured_only && !story.is_featured {
            return false;
        }
        if let Some(q) = &self.search {
            let q = q.to_lowercase();
            if !story.title.to_lowercase().contains(&q) && !story.content.to_lowercase().contains(&q) {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CommentRow {
    pub id: i64,
    pub story_id: i64,
    pub user_id: i64,
    pub parent_id: Option<i64>,
    pub content: String,
    pub is_anonymous: bool,
    pub created_at: DateTime<Utc>,
    pub reply_count: i64,
}

pub struct NewComment {
    pub story_id: i64,
    pub user_id: i64,
    pub parent_id: Option<i64>,
    pub content: String,
    pub is_anonymous: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReactionRow {
    pub id: i64,
    pub story_id: i64,
    pub user_id: i64,
    pub reaction_type: ReactionType,
    pub message: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Outcome of a reaction toggle.
#[derive(Debug, Clone)]
pub struct ReactionToggle {
    pub action: ReactionAction,
    /// The reaction as it stands after the toggle; `None` when removed.
    pub reaction: Option<ReactionRow>,
    pub support_count: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChallengeRow {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub prompt: String,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub submissions: i64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

pub struct NewChallenge {
    pub title: String,
    pub description: String,
    pub prompt: String,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubmissionRow {
    pub id: i64,
    pub challenge_id: i64,
    pub story_id: i64,
    pub user_id: i64,
    pub votes: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReviewRow {
    pub id: i64,
    pub story_id: i64,
    pub reviewer_id: i64,
    pub content: String,
    pub rating: Option<i64>,
    pub is_completed: bool,
    pub due_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

pub struct NewReview {
    pub story_id: i64,
    pub reviewer_id: i64,
    pub content: String,
    pub rating: Option<i64>,
    pub due_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TipRow {
    pub id: i64,
    pub story_id: i64,
    pub from_user_id: i64,
    pub to_user_id: i64,
    pub amount: i64,
    pub message: Option<String>,
    pub payment_intent_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

pub struct NewTip {
    pub story_id: i64,
    pub from_user_id: i64,
    pub to_user_id: i64,
    pub amount: i64,
    pub message: Option<String>,
    pub payment_intent_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AchievementRow {
    pub id: i64,
    pub user_id: i64,
    pub kind: AchievementKind,
    pub title: String,
    pub description: String,
    pub icon: String,
    pub unlocked_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReadProgressRow {
    pub user_id: i64,
    pub story_id: i64,
    pub scroll_depth: f64,
    pub time_spent: i64,
    pub completed: bool,
    pub read_count: i64,
    pub first_read: DateTime<Utc>,
    pub last_read: DateTime<Utc>,
}

/// Site-wide totals for the moderation dashboard. `new_users` and
/// `recent_reactions` count rows created at or after the `since` cutoff.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SiteCounts {
    pub users: i64,
    pub new_users: i64,
    pub active_users: i64,
    pub stories: i64,
    pub published_stories: i64,
    pub flagged_stories: i64,
    pub reactions: i64,
    pub recent_reactions: i64,
}

/// Scroll depth at which a read counts as completed.
pub const COMPLETION_DEPTH: f64 = 0.9;

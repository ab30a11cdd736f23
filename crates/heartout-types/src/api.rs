use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{AchievementKind, ReactionType, StoryStatus, StoryType, UserRole};

// -- JWT Claims --

/// JWT claims shared by the REST middleware and the `/ws` upgrade.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: i64,
    pub username: String,
    pub exp: usize,
    pub jti: String,
    #[serde(rename = "type")]
    pub token_type: TokenType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenType {
    Access,
    Refresh,
}

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    pub display_name: Option<String>,
    pub age_range: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub user: UserProfile,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AccessTokenResponse {
    pub access_token: String,
    pub token_type: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

#[derive(Debug, Deserialize)]
pub struct DeleteAccountRequest {
    pub password: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProfileUpdate {
    pub display_name: Option<String>,
    pub bio: Option<String>,
    pub age_range: Option<String>,
    pub preferred_anonymity: Option<bool>,
    pub author_bio: Option<String>,
    pub website_url: Option<String>,
    pub social_links: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

// -- Users --

/// Public view of a user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserPublic {
    pub id: i64,
    pub username: String,
    pub display_name: Option<String>,
    pub bio: Option<String>,
    pub age_range: Option<String>,
    pub preferred_anonymity: bool,
    pub followers: i64,
    pub following: i64,
    pub created_at: DateTime<Utc>,
}

/// The caller's own profile, including fields hidden from other users.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(flatten)]
    pub public: UserPublic,
    pub email: String,
    pub role: UserRole,
    pub is_active: bool,
    pub last_login: Option<DateTime<Utc>>,
    pub author_bio: Option<String>,
    pub website_url: Option<String>,
    pub social_links: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorInfo {
    pub id: Option<i64>,
    pub username: String,
    pub display_name: Option<String>,
}

impl AuthorInfo {
    pub fn anonymous() -> Self {
        Self {
            id: None,
            username: "Anonymous".to_string(),
            display_name: Some("Anonymous User".to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserStats {
    pub total_stories: i64,
    pub published_stories: i64,
    pub drafts: i64,
    pub total_views: i64,
    pub total_reactions: i64,
    pub total_comments: i64,
}

// -- Stories --

#[derive(Debug, Deserialize)]
pub struct StoryRequest {
    pub title: String,
    pub content: String,
    pub story_type: String,
    #[serde(default = "default_true")]
    pub is_anonymous: bool,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub status: Option<String>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoryResponse {
    pub id: i64,
    pub title: String,
    pub content: String,
    pub status: StoryStatus,
    pub story_type: StoryType,
    pub is_anonymous: bool,
    pub tags: Vec<String>,
    pub reading_time: i64,
    pub view_count: i64,
    pub support_count: i64,
    pub comment_count: i64,
    pub save_count: i64,
    pub is_featured: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub published_at: Option<DateTime<Utc>>,
    pub author: AuthorInfo,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoryPage {
    pub stories: Vec<StoryResponse>,
    pub total: usize,
    pub page: usize,
    pub per_page: usize,
    pub total_pages: usize,
    pub has_next: bool,
    pub has_prev: bool,
    pub next_page: Option<usize>,
    pub prev_page: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub ranking_algorithm: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub query: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub category: Option<StoryType>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub author: Option<UserPublic>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ReadProgressRequest {
    pub scroll_depth: Option<f64>,
    pub time_spent: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReadProgressResponse {
    pub view_count: i64,
    pub scroll_depth: Option<f64>,
    pub time_spent: Option<i64>,
}

// -- Comments --

#[derive(Debug, Deserialize)]
pub struct CommentRequest {
    pub content: String,
    #[serde(default = "default_true")]
    pub is_anonymous: bool,
    pub parent_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommentResponse {
    pub id: i64,
    pub story_id: i64,
    pub parent_id: Option<i64>,
    pub content: String,
    pub is_anonymous: bool,
    pub created_at: DateTime<Utc>,
    pub reply_count: i64,
    pub author: AuthorInfo,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CommentList {
    pub comments: Vec<CommentResponse>,
    pub total: usize,
}

// -- Reactions --

#[derive(Debug, Default, Deserialize)]
pub struct ReactRequest {
    #[serde(default, alias = "support_type")]
    pub reaction_type: ReactionType,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReactionResponse {
    pub id: i64,
    pub reaction_type: ReactionType,
    pub message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub giver: AuthorInfo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReactionAction {
    Added,
    Changed,
    Removed,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ToggleReactionResponse {
    pub action: ReactionAction,
    pub support_count: i64,
    pub user_reaction: Option<ReactionType>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MyReactionResponse {
    pub reaction_type: Option<ReactionType>,
    pub has_reacted: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LikeResponse {
    pub liked: bool,
    pub like_count: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LikeStatus {
    pub has_liked: bool,
    pub like_count: i64,
}

// -- Bookmarks --

#[derive(Debug, Serialize, Deserialize)]
pub struct BookmarkResponse {
    pub is_bookmarked: bool,
    pub save_count: i64,
}

// -- Follows --

#[derive(Debug, Serialize, Deserialize)]
pub struct FollowResponse {
    pub following: bool,
    pub followers: i64,
}

// -- Challenges --

#[derive(Debug, Deserialize)]
pub struct ChallengeRequest {
    pub title: String,
    pub description: String,
    pub prompt: String,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChallengeResponse {
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

#[derive(Debug, Deserialize)]
pub struct SubmissionRequest {
    pub story_id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionResponse {
    pub id: i64,
    pub challenge_id: i64,
    pub story_id: i64,
    pub user_id: i64,
    pub votes: i64,
    pub created_at: DateTime<Utc>,
}

// -- Reviews --

#[derive(Debug, Deserialize)]
pub struct ReviewRequest {
    pub story_id: i64,
    pub content: String,
    pub rating: Option<i64>,
    pub due_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ReviewUpdate {
    pub content: Option<String>,
    pub rating: Option<i64>,
    pub is_completed: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewResponse {
    pub id: i64,
    pub story_id: i64,
    pub reviewer_id: i64,
    pub content: String,
    pub rating: Option<i64>,
    pub is_completed: bool,
    pub due_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

// -- Tips & payments --

#[derive(Debug, Deserialize)]
pub struct TipRequest {
    pub story_id: i64,
    /// Amount in cents.
    pub amount: i64,
    pub message: Option<String>,
    pub payment_intent_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TipResponse {
    pub id: i64,
    pub story_id: i64,
    pub from_user_id: i64,
    pub to_user_id: i64,
    pub amount: i64,
    pub message: Option<String>,
    pub payment_intent_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct PaymentIntentRequest {
    /// Amount in cents.
    pub amount: i64,
    pub story_id: i64,
    pub message: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PaymentIntentResponse {
    pub client_secret: String,
}

// -- Achievements & analytics --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AchievementResponse {
    pub id: i64,
    pub kind: AchievementKind,
    pub title: String,
    pub description: String,
    pub icon: String,
    pub unlocked_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AnalyticsResponse {
    pub total_reads: i64,
    pub total_hearts: i64,
    pub followers: i64,
    /// Sum of received tips, in cents.
    pub earnings: i64,
    pub stories_count: usize,
    pub top_stories: Vec<StoryResponse>,
}

// -- Moderation --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModerationAction {
    Approve,
    Remove,
    Flag,
}

impl ModerationAction {
    /// Past tense used in the response message.
    pub fn done(&self) -> &'static str {
        match self {
            Self::Approve => "approved",
            Self::Remove => "removed",
            Self::Flag => "flagged",
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModerateRequest {
    pub action: ModerationAction,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RoleUpdate {
    pub role: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardStats {
    pub users: DashboardUsers,
    pub stories: DashboardStories,
    pub reactions: DashboardReactions,
    pub period_days: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardUsers {
    pub total: i64,
    pub new: i64,
    pub active: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardStories {
    pub total: i64,
    pub published: i64,
    pub flagged: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardReactions {
    pub total: i64,
    pub recent: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pagination {
    pub page: usize,
    pub pages: usize,
    pub per_page: usize,
    pub total: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UserList {
    pub users: Vec<UserProfile>,
    pub pagination: Pagination,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserActivity {
    pub story_count: i64,
    pub reaction_count: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UserDetail {
    pub user: UserProfile,
    pub stats: UserActivity,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ModeratedStories {
    pub stories: Vec<StoryResponse>,
    pub pagination: Pagination,
}

// -- AI assist --

#[derive(Debug, Deserialize)]
pub struct StoryIdeasRequest {
    #[serde(default)]
    pub prompt: String,
    pub count: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StoryIdea {
    pub title: String,
    pub premise: String,
    pub genre: String,
    pub mood: String,
    pub characters: Vec<String>,
    pub themes: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct WritingSuggestionsRequest {
    #[serde(default)]
    pub text: String,
    #[serde(default, rename = "type")]
    pub kind: SuggestionKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionKind {
    #[default]
    Improve,
    Continue,
    Alternative,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WritingSuggestion {
    #[serde(rename = "type")]
    pub kind: String,
    pub suggestion: String,
    pub explanation: String,
}

#[derive(Debug, Deserialize)]
pub struct TextRequest {
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GrammarCorrection {
    pub original: String,
    pub corrected: String,
    pub explanation: String,
    pub position: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GrammarCheck {
    pub corrections: Vec<GrammarCorrection>,
    pub overall_score: f64,
    pub suggestions: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct CharacterRequest {
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Deserialize)]
pub struct OutlineRequest {
    #[serde(default)]
    pub premise: String,
    pub chapters: Option<u32>,
}

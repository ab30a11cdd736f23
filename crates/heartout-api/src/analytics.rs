use axum::{
    Extension, Json,
    extract::{Path, State},
    response::IntoResponse,
};
use tracing::info;

use heartout_db::models::StoryFilter;
use heartout_db::{Storage, StorageError};
use heartout_types::api::AnalyticsResponse;
use heartout_types::models::{AchievementKind, ReactionType};

use crate::error::ApiError;
use crate::middleware::AuthUser;
use crate::state::AppState;
use crate::views;

pub const ON_FIRE_STORIES: usize = 5;
pub const LOVED_HEARTS: i64 = 10;
pub const HELPFUL_REVIEWS: usize = 5;
pub const RISING_STAR_FOLLOWERS: i64 = 10;
const TOP_STORIES: usize = 5;

fn award(s: &dyn Storage, user_id: i64, kind: AchievementKind) -> anyhow::Result<()> {
    if let Some(row) = s.award_achievement(user_id, kind)? {
        info!("User {} unlocked {}", user_id, row.kind.as_str());
    }
    Ok(())
}

/// `first_story` on the first publish, `on_fire` once five stories are out.
pub fn award_publish_achievements(s: &dyn Storage, user_id: i64) -> anyhow::Result<()> {
    let published = s
        .list_stories(&StoryFilter {
            author_id: Some(user_id),
            ..StoryFilter::published()
        })?
        .len();
    if published >= 1 {
        award(s, user_id, AchievementKind::FirstStory)?;
    }
    if published >= ON_FIRE_STORIES {
        award(s, user_id, AchievementKind::OnFire)?;
    }
    Ok(())
}

pub fn award_loved(s: &dyn Storage, author_id: i64, story_id: i64) -> anyhow::Result<()> {
    if s.count_reactions(story_id, Some(ReactionType::Heart))? >= LOVED_HEARTS {
        award(s, author_id, AchievementKind::Loved)?;
    }
    Ok(())
}

pub fn award_helpful(s: &dyn Storage, reviewer_id: i64) -> anyhow::Result<()> {
    let completed = s
        .reviews_by_reviewer(reviewer_id)?
        .iter()
        .filter(|r| r.is_completed)
        .count();
    if completed >= HELPFUL_REVIEWS {
        award(s, reviewer_id, AchievementKind::Helpful)?;
    }
    Ok(())
}

pub fn award_rising_star(s: &dyn Storage, user_id: i64, followers: i64) -> anyhow::Result<()> {
    if followers >= RISING_STAR_FOLLOWERS {
        award(s, user_id, AchievementKind::RisingStar)?;
    }
    Ok(())
}

pub async fn achievements(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let rows = state
        .call(move |s| {
            if s.get_user(user_id)?.is_none() {
                return Err(StorageError::NotFound("User").into());
            }
            s.achievements(user_id)
        })
        .await?;

    let achievements: Vec<_> = rows.into_iter().map(views::achievement).collect();
    Ok(Json(serde_json::json!({ "achievements": achievements })))
}

/// Author dashboard. Only the author may see it, since it covers anonymous stories too.
pub async fn analytics(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
    Extension(user): Extension<AuthUser>,
) -> Result<impl IntoResponse, ApiError> {
    if user.id != user_id {
        return Err(ApiError::Forbidden("You can only view your own analytics".into()));
    }

    let response = state
        .call(move |s| {
            let author = s.get_user(user_id)?.ok_or(StorageError::NotFound("User"))?;
            let mut stories = s.list_stories(&StoryFilter {
                author_id: Some(user_id),
                ..StoryFilter::published()
            })?;

            let mut total_hearts = 0;
            for story in &stories {
                total_hearts += s.count_reactions(story.id, Some(ReactionType::Heart))?;
            }
            let earnings = s.tips_received(user_id)?.iter().map(|t| t.amount).sum();
            let total_reads = stories.iter().map(|st| st.view_count).sum();
            let stories_count = stories.len();

            stories.sort_by(|a, b| b.view_count.cmp(&a.view_count).then(b.id.cmp(&a.id)));
            stories.truncate(TOP_STORIES);

            Ok(AnalyticsResponse {
                total_reads,
                total_hearts,
                followers: author.followers,
                earnings,
                stories_count,
                top_stories: views::stories(s, &stories)?,
            })
        })
        .await?;

    Ok(Json(response))
}

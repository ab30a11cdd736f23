//! Moderation endpoints under `/api/admin`. Mounted behind `require_staff`, so
//! every handler here runs for a moderator or an admin.

use axum::{
    Extension, Json,
    extract::{Path, State},
    response::IntoResponse,
};
use chrono::{Duration, Utc};
use serde::Deserialize;
use tracing::info;

use heartout_db::models::{StoryFilter, StoryRow, UserRow};
use heartout_types::api::{
    DashboardReactions, DashboardStats, DashboardStories, DashboardUsers, MessageResponse, ModerateRequest,
    ModeratedStories, ModerationAction, Pagination, RoleUpdate, UserActivity, UserDetail, UserList,
};
use heartout_types::models::{StoryStatus, UserRole};

use crate::analytics::award_publish_achievements;
use crate::error::{ApiError, ApiJson, ApiQuery};
use crate::middleware::AuthUser;
use crate::ranking::Paging;
use crate::state::AppState;
use crate::stories::PageQuery;
use crate::views;

const DEFAULT_DASHBOARD_DAYS: i64 = 30;
const MAX_DASHBOARD_DAYS: i64 = 365;
const USERS_PER_PAGE: usize = 50;

#[derive(Debug, Default, Deserialize)]
pub struct DashboardQuery {
    pub days: Option<i64>,
}

fn pagination(paging: Paging, total: usize) -> Pagination {
    Pagination {
        page: paging.page,
        pages: total.div_ceil(paging.per_page),
        per_page: paging.per_page,
        total,
    }
}

async fn load_user(state: &AppState, user_id: i64) -> Result<UserRow, ApiError> {
    state
        .call(move |s| s.get_user(user_id))
        .await?
        .ok_or_else(|| ApiError::not_found("User"))
}

async fn load_story(state: &AppState, story_id: i64) -> Result<StoryRow, ApiError> {
    state
        .call(move |s| s.get_story(story_id))
        .await?
        .ok_or_else(|| ApiError::not_found("Story"))
}

// -- Dashboard --

pub async fn dashboard(
    State(state): State<AppState>,
    ApiQuery(q): ApiQuery<DashboardQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let days = q.days.unwrap_or(DEFAULT_DASHBOARD_DAYS);
    if !(1..=MAX_DASHBOARD_DAYS).contains(&days) {
        return Err(ApiError::Validation(format!(
            "days must be between 1 and {}",
            MAX_DASHBOARD_DAYS
        )));
    }

    let since = Utc::now() - Duration::days(days);
    let counts = state.call(move |s| s.site_counts(since)).await?;

    Ok(Json(DashboardStats {
        users: DashboardUsers {
            total: counts.users,
            new: counts.new_users,
            active: counts.active_users,
        },
        stories: DashboardStories {
            total: counts.stories,
            published: counts.published_stories,
            flagged: counts.flagged_stories,
        },
        reactions: DashboardReactions {
            total: counts.reactions,
            recent: counts.recent_reactions,
        },
        period_days: days,
    }))
}

// -- Users --

pub async fn list_users(
    State(state): State<AppState>,
    ApiQuery(q): ApiQuery<PageQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let paging = Paging::from_query(q.page, Some(q.per_page.unwrap_or(USERS_PER_PAGE)))?;
    let users = state.call(|s| s.list_users()).await?;
    let (rows, total) = paging.apply(users);

    Ok(Json(UserList {
        users: rows.iter().map(views::user_profile).collect(),
        pagination: pagination(paging, total),
    }))
}

pub async fn user_detail(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let (user, stats) = state
        .call(move |s| {
            let Some(user) = s.get_user(user_id)? else {
                return Ok(None);
            };
            let story_count = s
                .list_stories(&StoryFilter {
                    author_id: Some(user_id),
                    ..StoryFilter::default()
                })?
                .len() as i64;
            let reaction_count = s.count_reactions_by_user(user_id)?;
            Ok(Some((
                user,
                UserActivity {
                    story_count,
                    reaction_count,
                },
            )))
        })
        .await?
        .ok_or_else(|| ApiError::not_found("User"))?;

    Ok(Json(UserDetail {
        user: views::user_profile(&user),
        stats,
    }))
}

pub async fn update_role(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
    Extension(staff): Extension<AuthUser>,
    ApiJson(req): ApiJson<RoleUpdate>,
) -> Result<impl IntoResponse, ApiError> {
    if staff.role != UserRole::Admin {
        return Err(ApiError::Forbidden("Only admins can change roles".into()));
    }
    let role: UserRole = req.role.parse()?;

    let user = state
        .call(move |s| {
            s.set_user_role(user_id, role)?;
            s.get_user(user_id)
        })
        .await?
        .ok_or_else(|| ApiError::not_found("User"))?;

    info!("{} set the role of user {} to {}", staff.username, user_id, role);
    Ok(Json(serde_json::json!({
        "message": format!("User role updated to {}", role),
        "user": views::user_profile(&user),
    })))
}

/// Flips the account between suspended and active.
pub async fn toggle_suspension(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
    Extension(staff): Extension<AuthUser>,
) -> Result<impl IntoResponse, ApiError> {
    if user_id == staff.id {
        return Err(ApiError::Validation("You cannot suspend your own account".into()));
    }
    let target = load_user(&state, user_id).await?;
    if target.role == UserRole::Admin && staff.role != UserRole::Admin {
        return Err(ApiError::Forbidden("Only admins can suspend an admin".into()));
    }

    let is_active = !target.is_active;
    state.call(move |s| s.set_user_active(user_id, is_active)).await?;

    let outcome = if is_active { "activated" } else { "suspended" };
    info!("User {} {} by {}", user_id, outcome, staff.username);
    Ok(Json(serde_json::json!({
        "message": format!("User {}", outcome),
        "user": views::user_profile(&UserRow { is_active, ..target }),
    })))
}

// -- Stories --

pub async fn flagged_stories(
    State(state): State<AppState>,
    ApiQuery(q): ApiQuery<PageQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let paging = Paging::from_query(q.page, q.per_page)?;

    let page = state
        .call(move |s| {
            let mut rows = s.list_stories(&StoryFilter {
                status: Some(StoryStatus::Flagged),
                ..StoryFilter::default()
            })?;
            rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
            let (rows, total) = paging.apply(rows);
            Ok(ModeratedStories {
                stories: views::stories(s, &rows)?,
                pagination: pagination(paging, total),
            })
        })
        .await?;

    Ok(Json(page))
}

pub async fn moderate_story(
    State(state): State<AppState>,
    Path(story_id): Path<i64>,
    Extension(staff): Extension<AuthUser>,
    ApiJson(req): ApiJson<ModerateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let action = req.action;
    let status = match action {
        ModerationAction::Approve => StoryStatus::Published,
        ModerationAction::Remove => StoryStatus::Removed,
        ModerationAction::Flag => StoryStatus::Flagged,
    };
    let existing = load_story(&state, story_id).await?;

    let story = state
        .call(move |s| {
            // Hidden stories drop off the featured shelf
            let is_featured = existing.is_featured && status == StoryStatus::Published;
            let row = s.update_story(&StoryRow {
                status,
                is_featured,
                ..existing
            })?;
            if row.status == StoryStatus::Published {
                award_publish_achievements(s, row.author_id)?;
            }
            views::story_with_author(s, &row)
        })
        .await?;

    info!("Story {} {} by {}", story_id, action.done(), staff.username);
    Ok(Json(serde_json::json!({
        "message": format!("Story {} successfully", action.done()),
        "story": story,
    })))
}

/// Toggles the story on or off the featured shelf.
pub async fn toggle_feature(
    State(state): State<AppState>,
    Path(story_id): Path<i64>,
    Extension(staff): Extension<AuthUser>,
) -> Result<impl IntoResponse, ApiError> {
    let existing = load_story(&state, story_id).await?;
    if !existing.is_featured && existing.status != StoryStatus::Published {
        return Err(ApiError::Validation("Only published stories can be featured".into()));
    }

    let is_featured = !existing.is_featured;
    let story = state
        .call(move |s| {
            let row = s.update_story(&StoryRow { is_featured, ..existing })?;
            views::story_with_author(s, &row)
        })
        .await?;

    let outcome = if is_featured { "featured" } else { "unfeatured" };
    info!("Story {} {} by {}", story_id, outcome, staff.username);
    Ok(Json(serde_json::json!({
        "message": format!("Story {}", outcome),
        "story": story,
    })))
}

// -- Comments --

pub async fn delete_comment(
    State(state): State<AppState>,
    Path(comment_id): Path<i64>,
    Extension(staff): Extension<AuthUser>,
) -> Result<impl IntoResponse, ApiError> {
    let removed = state.call(move |s| s.delete_comment(comment_id)).await?;
    if removed == 0 {
        return Err(ApiError::not_found("Comment"));
    }

    info!("Comment {} removed by {} ({} rows)", comment_id, staff.username, removed);
    Ok(Json(MessageResponse::new("Comment deleted successfully")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pagination_rounds_pages_up() {
        let paging = Paging::from_query(Some(2), Some(50)).unwrap();
        let p = pagination(paging, 101);
        assert_eq!((p.page, p.pages, p.per_page, p.total), (2, 3, 50, 101));

        let empty = pagination(Paging::from_query(None, None).unwrap(), 0);
        assert_eq!(empty.pages, 0);
    }
}

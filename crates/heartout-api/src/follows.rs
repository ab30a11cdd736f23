use axum::{
    Extension, Json,
    extract::{Path, State},
    response::IntoResponse,
};
use tracing::debug;

use heartout_db::StorageError;
use heartout_types::api::FollowResponse;

use crate::analytics::award_rising_star;
use crate::error::ApiError;
use crate::middleware::AuthUser;
use crate::state::AppState;
use crate::views;

pub async fn toggle_follow(
    State(state): State<AppState>,
    Path(target_id): Path<i64>,
    Extension(user): Extension<AuthUser>,
) -> Result<impl IntoResponse, ApiError> {
    if target_id == user.id {
        return Err(ApiError::Validation("You cannot follow yourself".into()));
    }

    let follower_id = user.id;
    let (following, followers) = state
        .call(move |s| {
            s.get_user(target_id)?.ok_or(StorageError::NotFound("User"))?;
            let (following, followers) = s.toggle_follow(follower_id, target_id)?;
            if following {
                award_rising_star(s, target_id, followers)?;
            }
            Ok((following, followers))
        })
        .await?;

    debug!(
        "{} {} user {}",
        user.username,
        if following { "followed" } else { "unfollowed" },
        target_id
    );
    Ok(Json(FollowResponse { following, followers }))
}

pub async fn followers(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let users = state
        .call(move |s| {
            s.get_user(user_id)?.ok_or(StorageError::NotFound("User"))?;
            s.followers(user_id)
        })
        .await?;

    let followers: Vec<_> = users.iter().map(views::user_public).collect();
    Ok(Json(serde_json::json!({ "total": followers.len(), "followers": followers })))
}

pub async fn following(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let users = state
        .call(move |s| {
            s.get_user(user_id)?.ok_or(StorageError::NotFound("User"))?;
            s.following(user_id)
        })
        .await?;

    let following: Vec<_> = users.iter().map(views::user_public).collect();
    Ok(Json(serde_json::json!({ "total": following.len(), "following": following })))
}

pub async fn follow_status(
    State(state): State<AppState>,
    Path(target_id): Path<i64>,
    Extension(user): Extension<AuthUser>,
) -> Result<impl IntoResponse, ApiError> {
    let is_following = state
        .call(move |s| s.is_following(user.id, target_id))
        .await?;
    Ok(Json(serde_json::json!({ "is_following": is_following })))
}

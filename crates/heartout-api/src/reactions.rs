use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};

use heartout_db::StorageError;
use heartout_db::models::StoryRow;
use heartout_types::api::{
    BookmarkResponse, LikeResponse, LikeStatus, MyReactionResponse, ReactRequest, ReactionAction, ToggleReactionResponse,
};
use heartout_types::events::ServerEvent;
use heartout_types::models::ReactionType;

use crate::analytics::award_loved;
use crate::error::{ApiError, ApiJson};
use crate::middleware::AuthUser;
use crate::state::AppState;
use crate::stories::published_story;
use crate::{validation, views};

/// Tell the author's open sockets about a new reaction. Silent for self-reactions.
fn notify(state: &AppState, story: &StoryRow, user: &AuthUser, reaction_type: ReactionType) {
    if story.author_id == user.id {
        return;
    }
    state.dispatcher.broadcast(ServerEvent::reaction(
        story.id,
        story.author_id,
        &story.title,
        &user.username,
        reaction_type,
    ));
}

pub async fn react(
    State(state): State<AppState>,
    Path(story_id): Path<i64>,
    Extension(user): Extension<AuthUser>,
    ApiJson(req): ApiJson<ReactRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validation::support_message(req.message.as_deref())?;
    let reaction_type = req.reaction_type;
    let message = req.message;
    let user_id = user.id;

    let (story, reaction) = state
        .call(move |s| {
            let story = published_story(s, story_id)?;
            let row = s.add_reaction(user_id, story_id, reaction_type, message)?;
            if reaction_type == ReactionType::Heart {
                award_loved(s, story.author_id, story_id)?;
            }
            let giver = s.get_user(user_id)?;
            Ok((story, views::reaction(&row, giver.as_ref())))
        })
        .await?;

    notify(&state, &story, &user, reaction_type);
    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({
            "message": "Reaction added successfully",
            "reaction": reaction,
        })),
    ))
}

pub async fn toggle_react(
    State(state): State<AppState>,
    Path(story_id): Path<i64>,
    Extension(user): Extension<AuthUser>,
    ApiJson(req): ApiJson<ReactRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validation::support_message(req.message.as_deref())?;
    let reaction_type = req.reaction_type;
    let message = req.message;
    let user_id = user.id;

    let (story, toggle) = state
        .call(move |s| {
            let story = published_story(s, story_id)?;
            let toggle = s.toggle_reaction(user_id, story_id, reaction_type, message)?;
            if toggle.action != ReactionAction::Removed && reaction_type == ReactionType::Heart {
                award_loved(s, story.author_id, story_id)?;
            }
            Ok((story, toggle))
        })
        .await?;

    if toggle.action == ReactionAction::Added {
        notify(&state, &story, &user, reaction_type);
    }

    Ok(Json(ToggleReactionResponse {
        action: toggle.action,
        support_count: toggle.support_count,
        user_reaction: toggle.reaction.map(|r| r.reaction_type),
    }))
}

pub async fn my_reaction(
    State(state): State<AppState>,
    Path(story_id): Path<i64>,
    Extension(user): Extension<AuthUser>,
) -> Result<impl IntoResponse, ApiError> {
    let reaction = state
        .call(move |s| {
            s.get_story(story_id)?.ok_or(StorageError::NotFound("Story"))?;
            s.get_reaction(user.id, story_id)
        })
        .await?;

    Ok(Json(MyReactionResponse {
        has_reacted: reaction.is_some(),
        reaction_type: reaction.map(|r| r.reaction_type),
    }))
}

/// A like is a heart reaction. Liking over another reaction replaces it.
pub async fn like(
    State(state): State<AppState>,
    Path(story_id): Path<i64>,
    Extension(user): Extension<AuthUser>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = user.id;
    let (story, toggle, like_count) = state
        .call(move |s| {
            let story = published_story(s, story_id)?;
            let toggle = s.toggle_reaction(user_id, story_id, ReactionType::Heart, None)?;
            if toggle.action != ReactionAction::Removed {
                award_loved(s, story.author_id, story_id)?;
            }
            let like_count = s.count_reactions(story_id, Some(ReactionType::Heart))?;
            Ok((story, toggle, like_count))
        })
        .await?;

    if toggle.action == ReactionAction::Added {
        notify(&state, &story, &user, ReactionType::Heart);
    }

    Ok(Json(LikeResponse {
        liked: toggle.reaction.is_some(),
        like_count,
    }))
}

pub async fn like_status(
    State(state): State<AppState>,
    Path(story_id): Path<i64>,
    Extension(user): Extension<AuthUser>,
) -> Result<impl IntoResponse, ApiError> {
    let (reaction, like_count) = state
        .call(move |s| {
            s.get_story(story_id)?.ok_or(StorageError::NotFound("Story"))?;
            Ok((
                s.get_reaction(user.id, story_id)?,
                s.count_reactions(story_id, Some(ReactionType::Heart))?,
            ))
        })
        .await?;

    Ok(Json(LikeStatus {
        has_liked: reaction.is_some_and(|r| r.reaction_type == ReactionType::Heart),
        like_count,
    }))
}

// -- Bookmarks --

pub async fn toggle_bookmark(
    State(state): State<AppState>,
    Path(story_id): Path<i64>,
    Extension(user): Extension<AuthUser>,
) -> Result<impl IntoResponse, ApiError> {
    let (is_bookmarked, save_count) = state
        .call(move |s| {
            s.get_story(story_id)?.ok_or(StorageError::NotFound("Story"))?;
            s.toggle_bookmark(user.id, story_id)
        })
        .await?;

    let message = if is_bookmarked { "Bookmark added" } else { "Bookmark removed" };
    Ok(Json(serde_json::json!({
        "is_bookmarked": is_bookmarked,
        "save_count": save_count,
        "message": message,
    })))
}

pub async fn bookmark_status(
    State(state): State<AppState>,
    Path(story_id): Path<i64>,
    Extension(user): Extension<AuthUser>,
) -> Result<impl IntoResponse, ApiError> {
    let response = state
        .call(move |s| {
            let story = s.get_story(story_id)?.ok_or(StorageError::NotFound("Story"))?;
            Ok(BookmarkResponse {
                is_bookmarked: s.is_bookmarked(user.id, story_id)?,
                save_count: story.save_count,
            })
        })
        .await?;

    Ok(Json(response))
}

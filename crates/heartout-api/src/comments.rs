use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::debug;

use heartout_db::models::NewComment;
use heartout_types::api::{CommentList, CommentRequest, MessageResponse};
use heartout_types::events::ServerEvent;

use crate::error::{ApiError, ApiJson};
use crate::middleware::AuthUser;
use crate::state::AppState;
use crate::stories::published_story;
use crate::{validation, views};

pub async fn list_comments(
    State(state): State<AppState>,
    Path(story_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let comments = state
        .call(move |s| {
            published_story(s, story_id)?;
            let rows = s.list_comments(story_id)?;
            views::comments(s, &rows)
        })
        .await?;

    let total = comments.len();
    Ok(Json(CommentList { comments, total }))
}

pub async fn add_comment(
    State(state): State<AppState>,
    Path(story_id): Path<i64>,
    Extension(user): Extension<AuthUser>,
    ApiJson(req): ApiJson<CommentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validation::comment(&req.content)?;
    let content = req.content.trim().to_string();
    let is_anonymous = req.is_anonymous;
    let parent_id = req.parent_id;
    let user_id = user.id;

    let (story, comment) = state
        .call(move |s| {
            let story = published_story(s, story_id)?;
            // A parent from another story (or a missing one) is dropped, not rejected
            let parent_id = match parent_id {
                Some(id) => s.get_comment(id)?.filter(|p| p.story_id == story_id).map(|p| p.id),
                None => None,
            };
            let row = s.create_comment(NewComment {
                story_id,
                user_id,
                parent_id,
                content,
                is_anonymous,
            })?;
            let author = if row.is_anonymous { None } else { s.get_user(user_id)? };
            Ok((story, views::comment(&row, author.as_ref())))
        })
        .await?;

    if story.author_id != user.id {
        let from_user = if comment.is_anonymous { "Anonymous" } else { user.username.as_str() };
        state.dispatcher.broadcast(ServerEvent::comment(
            story.id,
            story.author_id,
            &story.title,
            from_user,
            &comment.content,
        ));
    }

    debug!("{} commented on story {}", user.username, story_id);
    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({
            "message": "Comment added successfully",
            "comment": comment,
        })),
    ))
}

pub async fn delete_comment(
    State(state): State<AppState>,
    Path(comment_id): Path<i64>,
    Extension(user): Extension<AuthUser>,
) -> Result<impl IntoResponse, ApiError> {
    let comment = state
        .call(move |s| s.get_comment(comment_id))
        .await?
        .ok_or_else(|| ApiError::not_found("Comment"))?;
    if comment.user_id != user.id {
        return Err(ApiError::Forbidden("You can only delete your own comments".into()));
    }

    let removed = state.call(move |s| s.delete_comment(comment_id)).await?;
    if removed == 0 {
        return Err(ApiError::not_found("Comment"));
    }

    Ok(Json(MessageResponse::new("Comment deleted successfully")))
}

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::info;

use heartout_db::StorageError;
use heartout_db::models::{NewTip, StoryRow};
use heartout_types::api::TipRequest;

use crate::error::{ApiError, ApiJson};
use crate::middleware::AuthUser;
use crate::state::AppState;
use crate::stories::published_story;
use crate::{validation, views};

/// Smallest accepted tip, in cents.
pub const MIN_TIP_CENTS: i64 = 100;

pub fn check_amount(amount: i64) -> Result<(), ApiError> {
    if amount < MIN_TIP_CENTS {
        return Err(ApiError::Validation("Minimum tip is $1.00".into()));
    }
    Ok(())
}

pub fn check_recipient(story: &StoryRow, from_user: i64) -> Result<(), ApiError> {
    if story.author_id == from_user {
        return Err(ApiError::Validation("You cannot tip your own story".into()));
    }
    Ok(())
}

pub async fn send_tip(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ApiJson(req): ApiJson<TipRequest>,
) -> Result<impl IntoResponse, ApiError> {
    check_amount(req.amount)?;
    validation::support_message(req.message.as_deref())?;

    let story_id = req.story_id;
    let story = state.call(move |s| published_story(s, story_id)).await?;
    check_recipient(&story, user.id)?;

    let row = state
        .call(move |s| {
            s.create_tip(NewTip {
                story_id,
                from_user_id: user.id,
                to_user_id: story.author_id,
                amount: req.amount,
                message: req.message,
                payment_intent_id: req.payment_intent_id,
            })
        })
        .await?;

    info!("Tip {} of {} cents recorded for story {}", row.id, row.amount, row.story_id);
    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({
            "message": "Tip sent successfully",
            "tip": views::tip(row),
        })),
    ))
}

pub async fn story_tips(
    State(state): State<AppState>,
    Path(story_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let rows = state
        .call(move |s| {
            s.get_story(story_id)?.ok_or(StorageError::NotFound("Story"))?;
            s.tips_for_story(story_id)
        })
        .await?;

    let total_amount: i64 = rows.iter().map(|t| t.amount).sum();
    let tips: Vec<_> = rows.into_iter().map(views::tip).collect();
    Ok(Json(serde_json::json!({ "tips": tips, "total_amount": total_amount })))
}

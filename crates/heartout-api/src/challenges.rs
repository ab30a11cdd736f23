use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use tracing::info;

use heartout_db::StorageError;
use heartout_db::models::NewChallenge;
use heartout_types::api::{ChallengeRequest, SubmissionRequest};
use heartout_types::models::StoryStatus;

use crate::error::{ApiError, ApiJson};
use crate::middleware::AuthUser;
use crate::state::AppState;
use crate::views;

pub async fn list_challenges(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let rows = state.call(|s| s.list_challenges()).await?;
    let challenges: Vec<_> = rows.into_iter().map(views::challenge).collect();
    Ok(Json(serde_json::json!({ "challenges": challenges })))
}

/// The running challenge that ends soonest, or `null`.
pub async fn active_challenge(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let now = Utc::now();
    let row = state.call(move |s| s.active_challenge(now)).await?;
    Ok(Json(serde_json::json!({ "challenge": row.map(views::challenge) })))
}

pub async fn create_challenge(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ApiJson(req): ApiJson<ChallengeRequest>,
) -> Result<impl IntoResponse, ApiError> {
    for (field, value) in [("Title", &req.title), ("Description", &req.description), ("Prompt", &req.prompt)] {
        if value.trim().is_empty() {
            return Err(ApiError::Validation(format!("{} is required", field)));
        }
    }
    if req.end_date <= req.start_date {
        return Err(ApiError::Validation("End date must be after start date".into()));
    }

    let row = state
        .call(move |s| {
            s.create_challenge(NewChallenge {
                title: req.title.trim().to_string(),
                description: req.description.trim().to_string(),
                prompt: req.prompt.trim().to_string(),
                start_date: req.start_date,
                end_date: req.end_date,
                is_active: req.is_active,
            })
        })
        .await?;

    info!("Challenge {} created by {}", row.id, user.username);
    Ok((StatusCode::CREATED, Json(serde_json::json!({ "challenge": views::challenge(row) }))))
}

pub async fn submit_story(
    State(state): State<AppState>,
    Path(challenge_id): Path<i64>,
    Extension(user): Extension<AuthUser>,
    ApiJson(req): ApiJson<SubmissionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = user.id;
    let story_id = req.story_id;
    let now = Utc::now();

    let (challenge, story) = state
        .call(move |s| {
            let challenge = s.get_challenge(challenge_id)?.ok_or(StorageError::NotFound("Challenge"))?;
            let story = s.get_story(story_id)?.ok_or(StorageError::NotFound("Story"))?;
            Ok((challenge, story))
        })
        .await?;

    if !challenge.is_active || now < challenge.start_date || now > challenge.end_date {
        return Err(ApiError::Validation("Challenge is not accepting submissions".into()));
    }
    if story.author_id != user_id {
        return Err(ApiError::Forbidden("You can only submit your own stories".into()));
    }
    if story.status != StoryStatus::Published {
        return Err(ApiError::Validation("Only published stories can be submitted".into()));
    }

    let row = state
        .call(move |s| s.submit_to_challenge(challenge_id, story_id, user_id))
        .await?;

    Ok((StatusCode::CREATED, Json(serde_json::json!({ "submission": views::submission(row) }))))
}

pub async fn submissions(
    State(state): State<AppState>,
    Path(challenge_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let rows = state
        .call(move |s| {
            s.get_challenge(challenge_id)?.ok_or(StorageError::NotFound("Challenge"))?;
            s.challenge_submissions(challenge_id)
        })
        .await?;

    let submissions: Vec<_> = rows.into_iter().map(views::submission).collect();
    Ok(Json(serde_json::json!({ "total": submissions.len(), "submissions": submissions })))
}

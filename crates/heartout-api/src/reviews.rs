use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};

use heartout_db::models::NewReview;
use heartout_types::api::{ReviewRequest, ReviewUpdate};

use crate::analytics::award_helpful;
use crate::error::{ApiError, ApiJson};
use crate::middleware::AuthUser;
use crate::state::AppState;
use crate::stories::published_story;
use crate::{validation, views};

const MAX_REVIEW_CHARS: usize = 5000;

fn review_content(content: &str) -> Result<(), ApiError> {
    let len = content.trim().chars().count();
    if len == 0 || len > MAX_REVIEW_CHARS {
        return Err(ApiError::Validation(format!(
            "Review must be between 1 and {} characters",
            MAX_REVIEW_CHARS
        )));
    }
    Ok(())
}

pub async fn create_review(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ApiJson(req): ApiJson<ReviewRequest>,
) -> Result<impl IntoResponse, ApiError> {
    review_content(&req.content)?;
    validation::rating(req.rating)?;

    let story_id = req.story_id;
    let story = state.call(move |s| published_story(s, story_id)).await?;
    if story.author_id == user.id {
        return Err(ApiError::Validation("You cannot review your own story".into()));
    }

    let row = state
        .call(move |s| {
            s.create_review(NewReview {
                story_id,
                reviewer_id: user.id,
                content: req.content.trim().to_string(),
                rating: req.rating,
                due_date: req.due_date,
            })
        })
        .await?;

    Ok((StatusCode::CREATED, Json(serde_json::json!({ "review": views::review(row) }))))
}

pub async fn my_reviews(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<impl IntoResponse, ApiError> {
    let rows = state.call(move |s| s.reviews_by_reviewer(user.id)).await?;
    let reviews: Vec<_> = rows.into_iter().map(views::review).collect();
    Ok(Json(serde_json::json!({ "reviews": reviews })))
}

pub async fn pending_reviews(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<impl IntoResponse, ApiError> {
    let rows = state.call(move |s| s.reviews_by_reviewer(user.id)).await?;
    let reviews: Vec<_> = rows
        .into_iter()
        .filter(|r| !r.is_completed)
        .map(views::review)
        .collect();
    Ok(Json(serde_json::json!({ "reviews": reviews })))
}

pub async fn update_review(
    State(state): State<AppState>,
    Path(review_id): Path<i64>,
    Extension(user): Extension<AuthUser>,
    ApiJson(update): ApiJson<ReviewUpdate>,
) -> Result<impl IntoResponse, ApiError> {
    if let Some(content) = &update.content {
        review_content(content)?;
    }
    validation::rating(update.rating)?;

    let mut review = state
        .call(move |s| s.get_review(review_id))
        .await?
        .ok_or_else(|| ApiError::not_found("Review"))?;
    if review.reviewer_id != user.id {
        return Err(ApiError::Forbidden("You can only edit your own reviews".into()));
    }

    if let Some(content) = update.content {
        review.content = content.trim().to_string();
    }
    if update.rating.is_some() {
        review.rating = update.rating;
    }
    if let Some(done) = update.is_completed {
        review.is_completed = done;
    }

    let row = state
        .call(move |s| {
            s.update_review(&review)?;
            if review.is_completed {
                award_helpful(s, review.reviewer_id)?;
            }
            Ok(review)
        })
        .await?;

    Ok(Json(serde_json::json!({ "review": views::review(row) })))
}

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use serde::Deserialize;
use tracing::info;

use heartout_db::models::{NewStory, StoryFilter, StoryRow};
use heartout_db::{Storage, StorageError};
use heartout_types::api::{MessageResponse, ReadProgressRequest, ReadProgressResponse, StoryRequest};
use heartout_types::models::{SortBy, StoryStatus, StoryType};

use crate::analytics::award_publish_achievements;
use crate::error::{ApiError, ApiJson, ApiQuery};
use crate::middleware::{AuthUser, OptionalUser};
use crate::ranking::{self, Paging};
use crate::state::AppState;
use crate::{validation, views};

const FEATURED_LIMIT: usize = 10;

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub story_type: Option<String>,
    pub sort_by: Option<String>,
    pub page: Option<usize>,
    pub per_page: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<usize>,
    pub per_page: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
    pub page: Option<usize>,
    pub per_page: Option<usize>,
}

fn parse_sort(value: Option<&str>) -> Result<SortBy, ApiError> {
    let Some(value) = value.filter(|v| !v.is_empty()) else {
        return Ok(SortBy::default());
    };
    [SortBy::Smart, SortBy::Latest, SortBy::Trending, SortBy::MostViewed]
        .into_iter()
        .find(|s| s.as_str() == value)
        .ok_or_else(|| ApiError::Validation("Invalid sort_by value".into()))
}

/// Loads a story that readers may interact with. Unpublished stories look missing.
pub(crate) fn published_story(s: &dyn Storage, id: i64) -> anyhow::Result<StoryRow> {
    match s.get_story(id)? {
        Some(story) if story.status == StoryStatus::Published => Ok(story),
        _ => Err(StorageError::NotFound("Story").into()),
    }
}

/// A story request after validation, ready to persist.
struct StoryInput {
    title: String,
    content: String,
    story_type: StoryType,
    status: Option<StoryStatus>,
    is_anonymous: bool,
    tags: Vec<String>,
}

impl StoryInput {
    fn validate(req: StoryRequest) -> Result<Self, ApiError> {
        validation::title(&req.title)?;
        validation::content(&req.content)?;
        let story_type: StoryType = req.story_type.parse()?;
        let status = req.status.as_deref().map(str::parse::<StoryStatus>).transpose()?;
        if status.is_some_and(|s| !s.author_settable()) {
            return Err(ApiError::Validation("Status must be draft or published".into()));
        }
        let tags = validation::tags(&req.tags)?;

        Ok(Self {
            title: req.title.trim().to_string(),
            content: req.content.trim().to_string(),
            story_type,
            status,
            is_anonymous: req.is_anonymous,
            tags,
        })
    }
}

// -- Listings --

pub async fn list_stories(
    State(state): State<AppState>,
    ApiQuery(q): ApiQuery<ListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let story_type = q
        .story_type
        .as_deref()
        .filter(|t| !t.is_empty())
        .map(str::parse::<StoryType>)
        .transpose()?;
    let sort_by = parse_sort(q.sort_by.as_deref())?;
    let paging = Paging::from_query(q.page, q.per_page)?;
    let now = Utc::now();

    let page = state
        .call(move |s| {
            let mut rows = s.list_stories(&StoryFilter {
                story_type,
                ..StoryFilter::published()
            })?;
            let algorithm = ranking::order_stories(&mut rows, sort_by, story_type, now, ranking::daily_seed(now));
            let (rows, total) = paging.apply(rows);
            let mut page = paging.into_page(views::stories(s, &rows)?, total);
            page.ranking_algorithm = Some(algorithm.to_string());
            Ok(page)
        })
        .await?;

    Ok(Json(page))
}

pub async fn featured(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let now = Utc::now();
    let stories = state
        .call(move |s| {
            let mut rows = s.list_stories(&StoryFilter {
                featured_only: true,
                ..StoryFilter::published()
            })?;
            ranking::order_stories(&mut rows, SortBy::Latest, None, now, 0);
            rows.truncate(FEATURED_LIMIT);
            views::stories(s, &rows)
        })
        .await?;

    Ok(Json(serde_json::json!({ "featured_stories": stories })))
}

pub async fn drafts(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ApiQuery(q): ApiQuery<PageQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let paging = Paging::from_query(q.page, q.per_page)?;
    let page = state
        .call(move |s| {
            let mut rows = s.list_stories(&StoryFilter {
                author_id: Some(user.id),
                status: Some(StoryStatus::Draft),
                ..StoryFilter::default()
            })?;
            rows.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then(b.id.cmp(&a.id)));
            let (rows, total) = paging.apply(rows);
            Ok(paging.into_page(views::stories(s, &rows)?, total))
        })
        .await?;

    Ok(Json(page))
}

pub async fn bookmarks(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ApiQuery(q): ApiQuery<PageQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let paging = Paging::from_query(q.page, q.per_page)?;
    let page = state
        .call(move |s| {
            let (rows, total) = paging.apply(s.bookmarked_stories(user.id)?);
            Ok(paging.into_page(views::stories(s, &rows)?, total))
        })
        .await?;

    Ok(Json(page))
}

pub async fn search(
    State(state): State<AppState>,
    ApiQuery(q): ApiQuery<SearchQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let query = q.q.trim().to_string();
    if query.chars().count() < 2 {
        return Err(ApiError::Validation("Search query must be at least 2 characters".into()));
    }
    let paging = Paging::from_query(q.page, q.per_page)?;

    let page = state
        .call(move |s| {
            let mut rows = s.list_stories(&StoryFilter {
                search: Some(query.clone()),
                ..StoryFilter::published()
            })?;
            ranking::order_stories(&mut rows, SortBy::Latest, None, Utc::now(), 0);
            let (rows, total) = paging.apply(rows);
            let mut page = paging.into_page(views::stories(s, &rows)?, total);
            page.query = Some(query);
            Ok(page)
        })
        .await?;

    Ok(Json(page))
}

pub async fn by_category(
    State(state): State<AppState>,
    Path(story_type): Path<String>,
    ApiQuery(q): ApiQuery<PageQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let story_type: StoryType = story_type.parse()?;
    let paging = Paging::from_query(q.page, q.per_page)?;
    let now = Utc::now();

    let page = state
        .call(move |s| {
            let mut rows = s.list_stories(&StoryFilter {
                story_type: Some(story_type),
                ..StoryFilter::published()
            })?;
            let algorithm =
                ranking::order_stories(&mut rows, SortBy::Smart, Some(story_type), now, ranking::daily_seed(now));
            let (rows, total) = paging.apply(rows);
            let mut page = paging.into_page(views::stories(s, &rows)?, total);
            page.ranking_algorithm = Some(algorithm.to_string());
            page.category = Some(story_type);
            Ok(page)
        })
        .await?;

    Ok(Json(page))
}

pub async fn by_user(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
    ApiQuery(q): ApiQuery<PageQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let paging = Paging::from_query(q.page, q.per_page)?;

    let page = state
        .call(move |s| {
            let Some(author) = s.get_user(user_id)? else {
                return Err(StorageError::NotFound("User").into());
            };
            let mut rows = s.list_stories(&StoryFilter {
                author_id: Some(user_id),
                is_anonymous: Some(false),
                ..StoryFilter::published()
            })?;
            ranking::order_stories(&mut rows, SortBy::Latest, None, Utc::now(), 0);
            let (rows, total) = paging.apply(rows);
            let mut page = paging.into_page(views::stories(s, &rows)?, total);
            page.author = Some(views::user_public(&author));
            Ok(page)
        })
        .await?;

    Ok(Json(page))
}

// -- Single story --

pub async fn create_story(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ApiJson(req): ApiJson<StoryRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let input = StoryInput::validate(req)?;
    let status = input.status.unwrap_or_default();
    let reading_time = ranking::reading_time(&input.content);

    let story = state
        .call(move |s| {
            let row = s.create_story(NewStory {
                author_id: user.id,
                title: input.title,
                content: input.content,
                story_type: input.story_type,
                status,
                is_anonymous: input.is_anonymous,
                tags: input.tags,
                reading_time,
            })?;
            if row.status == StoryStatus::Published {
                award_publish_achievements(s, user.id)?;
            }
            views::story_with_author(s, &row)
        })
        .await?;

    info!("Story {} created ({})", story.id, story.status);
    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({
            "message": "Story created successfully",
            "story": story,
        })),
    ))
}

pub async fn get_story(
    State(state): State<AppState>,
    Path(story_id): Path<i64>,
    OptionalUser(viewer): OptionalUser,
) -> Result<impl IntoResponse, ApiError> {
    let viewer_id = viewer.map(|u| u.id);

    let story = state
        .call(move |s| {
            let Some(row) = s.get_story(story_id)? else {
                return Ok(None);
            };
            if row.status != StoryStatus::Published {
                // Drafts are visible to their author only and never count views
                if viewer_id != Some(row.author_id) {
                    return Ok(None);
                }
                return views::story_with_author(s, &row).map(Some);
            }
            let Some(view_count) = s.increment_views(story_id)? else {
                return Ok(None);
            };
            views::story_with_author(s, &StoryRow { view_count, ..row }).map(Some)
        })
        .await?
        .ok_or_else(|| ApiError::not_found("Story"))?;

    Ok(Json(serde_json::json!({ "story": story })))
}

async fn owned_story(state: &AppState, story_id: i64, user_id: i64, verb: &str) -> Result<StoryRow, ApiError> {
    let story = state
        .call(move |s| s.get_story(story_id))
        .await?
        .ok_or_else(|| ApiError::not_found("Story"))?;
    if story.author_id != user_id {
        return Err(ApiError::Forbidden(format!("You can only {} your own stories", verb)));
    }
    Ok(story)
}

pub async fn update_story(
    State(state): State<AppState>,
    Path(story_id): Path<i64>,
    Extension(user): Extension<AuthUser>,
    ApiJson(req): ApiJson<StoryRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let input = StoryInput::validate(req)?;
    let existing = owned_story(&state, story_id, user.id, "edit").await?;
    if !existing.status.author_settable() && input.status.is_some() {
        return Err(ApiError::Forbidden(format!(
            "This story is {} and its status can only be changed by a moderator",
            existing.status
        )));
    }

    let updated = StoryRow {
        reading_time: ranking::reading_time(&input.content),
        title: input.title,
        content: input.content,
        story_type: input.story_type,
        status: input.status.unwrap_or(existing.status),
        is_anonymous: input.is_anonymous,
        tags: input.tags,
        ..existing
    };

    let story = state
        .call(move |s| {
            let row = s.update_story(&updated)?;
            if row.status == StoryStatus::Published {
                award_publish_achievements(s, row.author_id)?;
            }
            views::story_with_author(s, &row)
        })
        .await?;

    Ok(Json(serde_json::json!({
        "message": "Story updated successfully",
        "story": story,
    })))
}

pub async fn delete_story(
    State(state): State<AppState>,
    Path(story_id): Path<i64>,
    Extension(user): Extension<AuthUser>,
) -> Result<impl IntoResponse, ApiError> {
    owned_story(&state, story_id, user.id, "delete").await?;
    state.call(move |s| s.delete_story(story_id)).await?;

    info!("Story {} deleted by {}", story_id, user.username);
    Ok(Json(MessageResponse::new("Story deleted successfully")))
}

pub async fn read_progress(
    State(state): State<AppState>,
    Path(story_id): Path<i64>,
    OptionalUser(reader): OptionalUser,
    ApiJson(req): ApiJson<ReadProgressRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if req.scroll_depth.is_some_and(|d| !(0.0..=1.0).contains(&d)) {
        return Err(ApiError::Validation("scroll_depth must be between 0 and 1".into()));
    }
    if req.time_spent.is_some_and(|t| t < 0) {
        return Err(ApiError::Validation("time_spent cannot be negative".into()));
    }

    let reader_id = reader.map(|u| u.id);
    let (scroll_depth, time_spent) = (req.scroll_depth, req.time_spent);
    let view_count = state
        .call(move |s| {
            let view_count = s
                .increment_views(story_id)?
                .ok_or(StorageError::NotFound("Story"))?;
            if let Some(user_id) = reader_id {
                s.record_read_progress(user_id, story_id, scroll_depth, time_spent)?;
            }
            Ok(view_count)
        })
        .await?;

    Ok(Json(ReadProgressResponse {
        view_count,
        scroll_depth,
        time_spent,
    }))
}

use std::cmp::Ordering;
use std::hash::{DefaultHasher, Hash, Hasher};

use chrono::{DateTime, Utc};

use heartout_db::models::StoryRow;
use heartout_types::api::{StoryPage, StoryResponse};
use heartout_types::models::{SortBy, StoryType};

use crate::error::ApiError;

pub const WORDS_PER_MINUTE: usize = 225;
pub const GRAVITY: f64 = 1.8;
pub const DEFAULT_PER_PAGE: usize = 20;
pub const MAX_PER_PAGE: usize = 100;

/// Estimated reading time in whole minutes, never below 1.
pub fn reading_time(content: &str) -> i64 {
    let words = content.split_whitespace().count();
    (words / WORDS_PER_MINUTE).max(1) as i64
}

/// Hacker-News style decay: `(points + 1) / (age_hours + 2)^1.8`. The `+ 1`
/// keeps brand-new stories with no engagement from sinking to zero.
pub fn gravity_score(story: &StoryRow, now: DateTime<Utc>) -> f64 {
    let points = (story.save_count + story.support_count) as f64 + story.view_count as f64 / 10.0;
    let published = story.published_at.unwrap_or(story.created_at);
    let age_hours = ((now - published).num_seconds() as f64 / 3600.0).max(0.0);
    (points + 1.0) / (age_hours + 2.0).powf(GRAVITY)
}

fn newest_first(a: &StoryRow, b: &StoryRow) -> Ordering {
    let a_at = a.published_at.unwrap_or(a.created_at);
    let b_at = b.published_at.unwrap_or(b.created_at);
    b_at.cmp(&a_at).then(b.id.cmp(&a.id))
}

/// Orders a feed in place and returns the algorithm name reported to clients.
///
/// Smart-ranked unsent letters get a shuffle that is stable for a given
/// `seed`, so paging through the list does not repeat or skip entries.
pub fn order_stories(
    stories: &mut [StoryRow],
    sort_by: SortBy,
    story_type: Option<StoryType>,
    now: DateTime<Utc>,
    seed: u64,
) -> &'static str {
    match sort_by {
        SortBy::Smart if story_type == Some(StoryType::UnsentLetter) => {
            stories.sort_by_cached_key(|s| shuffle_key(s.id, seed));
            "random"
        }
        SortBy::Smart => {
            stories.sort_by(|a, b| {
                gravity_score(b, now)
                    .total_cmp(&gravity_score(a, now))
                    .then_with(|| newest_first(a, b))
            });
            sort_by.as_str()
        }
        SortBy::Latest => {
            stories.sort_by(newest_first);
            sort_by.as_str()
        }
        SortBy::Trending => {
            stories.sort_by(|a, b| b.support_count.cmp(&a.support_count).then_with(|| newest_first(a, b)));
            sort_by.as_str()
        }
        SortBy::MostViewed => {
            stories.sort_by(|a, b| b.view_count.cmp(&a.view_count).then_with(|| newest_first(a, b)));
            sort_by.as_str()
        }
    }
}

fn shuffle_key(id: i64, seed: u64) -> u64 {
    let mut hasher = DefaultHasher::new();
    seed.hash(&mut hasher);
    id.hash(&mut hasher);
    hasher.finish()
}

/// Seed for the unsent-letter shuffle; changes once a day.
pub fn daily_seed(now: DateTime<Utc>) -> u64 {
    now.timestamp().div_euclid(86_400) as u64
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Paging {
    pub page: usize,
    pub per_page: usize,
}

impl Paging {
    pub fn from_query(page: Option<usize>, per_page: Option<usize>) -> Result<Self, ApiError> {
        let page = page.unwrap_or(1);
        let per_page = per_page.unwrap_or(DEFAULT_PER_PAGE);
        if page < 1 {
            return Err(ApiError::Validation("page must be at least 1".into()));
        }
        if !(1..=MAX_PER_PAGE).contains(&per_page) {
            return Err(ApiError::Validation(format!(
                "per_page must be between 1 and {}",
                MAX_PER_PAGE
            )));
        }
        Ok(Self { page, per_page })
    }

    /// Slice `items` down to this page.
    pub fn apply<T>(&self, items: Vec<T>) -> (Vec<T>, usize) {
        let total = items.len();
        let offset = (self.page - 1).saturating_mul(self.per_page);
        let page = items.into_iter().skip(offset).take(self.per_page).collect();
        (page, total)
    }

    pub fn into_page(self, stories: Vec<StoryResponse>, total: usize) -> StoryPage {
        let total_pages = total.div_ceil(self.per_page);
        let has_next = self.page < total_pages;
        let has_prev = self.page > 1;
        StoryPage {
            stories,
            total,
            page: self.page,
            per_page: self.per_page,
            total_pages,
            has_next,
            has_prev,
            next_page: has_next.then_some(self.page + 1),
            prev_page: has_prev.then_some(self.page - 1),
            ranking_algorithm: None,
            query: None,
            category: None,
            author: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use heartout_types::models::StoryStatus;

    use super::*;

    fn story(id: i64, hours_ago: i64, support: i64, views: i64) -> StoryRow {
        let at = Utc::now() - Duration::hours(hours_ago);
        StoryRow {
            id,
            author_id: 1,
            title: format!("Story {}", id),
            content: String::new(),
            story_type: StoryType::Other,
            status: StoryStatus::Published,
            is_anonymous: false,
            tags: Vec::new(),
            reading_time: 1,
            view_count: views,
            support_count: support,
            comment_count: 0,
            save_count: 0,
            unique_readers: 0,
            reread_count: 0,
            is_featured: false,
            created_at: at,
            updated_at: at,
            published_at: Some(at),
        }
    }

    fn ids(stories: &[StoryRow]) -> Vec<i64> {
        stories.iter().map(|s| s.id).collect()
    }

    #[test]
    fn reading_time_rounds_down_with_floor_of_one() {
        assert_eq!(reading_time(""), 1);
        assert_eq!(reading_time(&"word ".repeat(100)), 1);
        assert_eq!(reading_time(&"word ".repeat(450)), 2);
        assert_eq!(reading_time(&"word ".repeat(674)), 2);
    }

    #[test]
    fn gravity_favours_fresh_engagement() {
        let now = Utc::now();
        let fresh = story(1, 1, 10, 0);
        let stale = story(2, 72, 10, 0);
        assert!(gravity_score(&fresh, now) > gravity_score(&stale, now));
        assert!(gravity_score(&story(3, 0, 0, 0), now) > 0.0);
    }

    #[test]
    fn smart_sort_lifts_a_fresh_story_over_an_older_supported_one() {
        let now = Utc::now();
        let mut stories = vec![story(1, 24, 5, 0), story(2, 0, 0, 0)];

        assert_eq!(order_stories(&mut stories, SortBy::Smart, None, now, 0), "smart");
        assert_eq!(ids(&stories), vec![2, 1]);
    }

    #[test]
    fn sort_orders() {
        let now = Utc::now();
        let mut stories = vec![story(1, 5, 3, 100), story(2, 1, 0, 10), story(3, 10, 9, 0)];

        assert_eq!(order_stories(&mut stories, SortBy::Latest, None, now, 0), "latest");
        assert_eq!(ids(&stories), vec![2, 1, 3]);

        order_stories(&mut stories, SortBy::MostViewed, None, now, 0);
        assert_eq!(ids(&stories), vec![1, 2, 3]);

        order_stories(&mut stories, SortBy::Trending, None, now, 0);
        assert_eq!(ids(&stories), vec![3, 1, 2]);
    }

    #[test]
    fn unsent_letters_shuffle_deterministically() {
        let now = Utc::now();
        let mut a: Vec<StoryRow> = (1..=20).map(|i| story(i, i, 0, 0)).collect();
        let mut b = a.clone();
        b.reverse();

        let algo = order_stories(&mut a, SortBy::Smart, Some(StoryType::UnsentLetter), now, 7);
        order_stories(&mut b, SortBy::Smart, Some(StoryType::UnsentLetter), now, 7);
        assert_eq!(algo, "random");
        assert_eq!(ids(&a), ids(&b));
    }

    #[test]
    fn paging() {
        let paging = Paging::from_query(Some(2), Some(2)).unwrap();
        let (items, total) = paging.apply(vec![1, 2, 3, 4, 5]);
        assert_eq!(items, vec![3, 4]);
        assert_eq!(total, 5);

        let page = paging.into_page(Vec::new(), total);
        assert_eq!(page.total_pages, 3);
        assert!(page.has_next && page.has_prev);
        assert_eq!(page.next_page, Some(3));
        assert_eq!(page.prev_page, Some(1));

        let empty = Paging::from_query(None, None).unwrap().into_page(Vec::new(), 0);
        assert_eq!(empty.total_pages, 0);
        assert!(!empty.has_next && !empty.has_prev);

        assert!(Paging::from_query(Some(0), None).is_err());
        assert!(Paging::from_query(None, Some(101)).is_err());
    }
}

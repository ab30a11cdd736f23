//! In-process `Storage` backend. Selected with `HEARTOUT_STORAGE=memory`;
//! nothing survives a restart.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use anyhow::Result;
use chrono::{DateTime, Utc};

use heartout_types::api::ReactionAction;
use heartout_types::models::{AchievementKind, ReactionType, StoryStatus, UserRole};

use crate::models::*;
use crate::storage::{Storage, StorageError};

#[derive(Default)]
struct State {
    next_id: i64,
    users: BTreeMap<i64, UserRow>,
    stories: BTreeMap<i64, StoryRow>,
    comments: BTreeMap<i64, CommentRow>,
    reactions: BTreeMap<i64, ReactionRow>,
    /// (id, user_id, story_id)
    bookmarks: Vec<(i64, i64, i64)>,
    progress: BTreeMap<(i64, i64), ReadProgressRow>,
    /// (id, follower_id, following_id)
    follows: Vec<(i64, i64, i64)>,
    challenges: BTreeMap<i64, ChallengeRow>,
    submissions: BTreeMap<i64, SubmissionRow>,
    reviews: BTreeMap<i64, ReviewRow>,
    tips: BTreeMap<i64, TipRow>,
    achievements: BTreeMap<i64, AchievementRow>,
    revoked: BTreeMap<String, (i64, DateTime<Utc>)>,
}

impl State {
    fn id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn story_mut(&mut self, id: i64) -> Result<&mut StoryRow> {
        self.stories
            .get_mut(&id)
            .ok_or_else(|| StorageError::NotFound("Story").into())
    }

    fn user_mut(&mut self, id: i64) -> Result<&mut UserRow> {
        self.users
            .get_mut(&id)
            .ok_or_else(|| StorageError::NotFound("User").into())
    }

    fn reaction_of(&self, user_id: i64, story_id: i64) -> Option<&ReactionRow> {
        self.reactions
            .values()
            .find(|r| r.user_id == user_id && r.story_id == story_id)
    }

    fn with_reply_count(&self, mut comment: CommentRow) -> CommentRow {
        comment.reply_count = self
            .comments
            .values()
            .filter(|c| c.parent_id == Some(comment.id))
            .count() as i64;
        comment
    }

    /// Ids of `root` and every comment below it.
    fn comment_subtree(&self, root: i64) -> Vec<i64> {
        let mut ids = vec![root];
        let mut i = 0;
        while i < ids.len() {
            let parent = ids[i];
            ids.extend(
                self.comments
                    .values()
                    .filter(|c| c.parent_id == Some(parent))
                    .map(|c| c.id),
            );
            i += 1;
        }
        ids
    }

    /// Drops every row hanging off `story_id`, like the SQL cascade.
    fn cascade_story(&mut self, story_id: i64) {
        self.comments.retain(|_, c| c.story_id != story_id);
        self.reactions.retain(|_, r| r.story_id != story_id);
        self.bookmarks.retain(|&(_, _, s)| s != story_id);
        self.progress.retain(|&(_, s), _| s != story_id);
        self.reviews.retain(|_, r| r.story_id != story_id);
        self.tips.retain(|_, t| t.story_id != story_id);
        self.submissions.retain(|_, s| s.story_id != story_id);
    }

    fn recount(&mut self) {
        for story in self.stories.values_mut() {
            story.support_count = self.reactions.values().filter(|r| r.story_id == story.id).count() as i64;
            story.comment_count = self.comments.values().filter(|c| c.story_id == story.id).count() as i64;
            story.save_count = self.bookmarks.iter().filter(|b| b.2 == story.id).count() as i64;
        }
        for user in self.users.values_mut() {
            user.followers = self.follows.iter().filter(|f| f.2 == user.id).count() as i64;
            user.following = self.follows.iter().filter(|f| f.1 == user.id).count() as i64;
        }
        for challenge in self.challenges.values_mut() {
            challenge.submissions = self
                .submissions
                .values()
                .filter(|s| s.challenge_id == challenge.id)
                .count() as i64;
        }
    }

    fn insert_reaction(
        &mut self,
        user_id: i64,
        story_id: i64,
        reaction_type: ReactionType,
        message: Option<String>,
    ) -> Result<ReactionRow> {
        self.story_mut(story_id)?.support_count += 1;
        let row = ReactionRow {
            id: self.id(),
            story_id,
            user_id,
            reaction_type,
            message,
            created_at: Utc::now(),
        };
        self.reactions.insert(row.id, row.clone());
        Ok(row)
    }
}

#[derive(Default)]
pub struct MemStorage {
    state: Mutex<State>,
}

impl MemStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|e| anyhow::anyhow!("Storage lock poisoned: {}", e))
    }
}

impl Storage for MemStorage {
    fn create_user(&self, user: NewUser) -> Result<UserRow> {
        let mut s = self.lock()?;
        if s.users.values().any(|u| u.email.eq_ignore_ascii_case(&user.email)) {
            return Err(StorageError::Conflict("Email already registered".into()).into());
        }
        if s.users.values().any(|u| u.username == user.username) {
            return Err(StorageError::Conflict("Username already taken".into()).into());
        }
        let row = UserRow {
            id: s.id(),
            username: user.username,
            email: user.email,
            password_hash: user.password_hash,
            display_name: user.display_name,
            bio: None,
            age_range: user.age_range,
            preferred_anonymity: true,
            author_bio: None,
            website_url: None,
            social_links: BTreeMap::new(),
            followers: 0,
            following: 0,
            role: user.role,
            is_active: true,
            created_at: Utc::now(),
            last_login: None,
        };
        s.users.insert(row.id, row.clone());
        Ok(row)
    }

    fn get_user(&self, id: i64) -> Result<Option<UserRow>> {
        Ok(self.lock()?.users.get(&id).cloned())
    }

    fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        Ok(self
            .lock()?
            .users
            .values()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        Ok(self.lock()?.users.values().find(|u| u.username == username).cloned())
    }

    fn update_user_profile(&self, user: &UserRow) -> Result<()> {
        let mut s = self.lock()?;
        let row = s.user_mut(user.id)?;
        row.display_name = user.display_name.clone();
        row.bio = user.bio.clone();
        row.age_range = user.age_range.clone();
        row.preferred_anonymity = user.preferred_anonymity;
        row.author_bio = user.author_bio.clone();
        row.website_url = user.website_url.clone();
        row.social_links = user.social_links.clone();
        Ok(())
    }

    fn set_password_hash(&self, user_id: i64, hash: &str) -> Result<()> {
        self.lock()?.user_mut(user_id)?.password_hash = hash.to_string();
        Ok(())
    }

    fn record_login(&self, user_id: i64, at: DateTime<Utc>) -> Result<()> {
        if let Some(user) = self.lock()?.users.get_mut(&user_id) {
            user.last_login = Some(at);
        }
        Ok(())
    }

    fn delete_user(&self, user_id: i64) -> Result<bool> {
        let mut s = self.lock()?;
        if s.users.remove(&user_id).is_none() {
            return Ok(false);
        }

        let owned: Vec<i64> = s
            .stories
            .values()
            .filter(|st| st.author_id == user_id)
            .map(|st| st.id)
            .collect();
        for story_id in owned {
            s.stories.remove(&story_id);
            s.cascade_story(story_id);
        }

        let own_comments: Vec<i64> = s
            .comments
            .values()
            .filter(|c| c.user_id == user_id)
            .map(|c| c.id)
            .collect();
        for id in own_comments {
            for gone in s.comment_subtree(id) {
                s.comments.remove(&gone);
            }
        }

        s.reactions.retain(|_, r| r.user_id != user_id);
        s.bookmarks.retain(|&(_, u, _)| u != user_id);
        s.progress.retain(|&(u, _), _| u != user_id);
        s.follows.retain(|&(_, a, b)| a != user_id && b != user_id);
        s.submissions.retain(|_, sub| sub.user_id != user_id);
        s.reviews.retain(|_, r| r.reviewer_id != user_id);
        s.tips.retain(|_, t| t.from_user_id != user_id && t.to_user_id != user_id);
        s.achievements.retain(|_, a| a.user_id != user_id);
        s.revoked.retain(|_, (u, _)| *u != user_id);
        s.recount();

        Ok(true)
    }

    fn list_users(&self) -> Result<Vec<UserRow>> {
        let mut users: Vec<UserRow> = self.lock()?.users.values().cloned().collect();
        users.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(users)
    }

    fn set_user_role(&self, user_id: i64, role: UserRole) -> Result<()> {
        self.lock()?.user_mut(user_id)?.role = role;
        Ok(())
    }

    fn set_user_active(&self, user_id: i64, active: bool) -> Result<()> {
        self.lock()?.user_mut(user_id)?.is_active = active;
        Ok(())
    }

    fn create_story(&self, story: NewStory) -> Result<StoryRow> {
        let mut s = self.lock()?;
        let now = Utc::now();
        let row = StoryRow {
            id: s.id(),
            author_id: story.author_id,
            title: story.title,
            content: story.content,
            story_type: story.story_type,
            published_at: (story.status == StoryStatus::Published).then_some(now),
            status: story.status,
            is_anonymous: story.is_anonymous,
            tags: story.tags,
            reading_time: story.reading_time,
            view_count: 0,
            support_count: 0,
            comment_count: 0,
            save_count: 0,
            unique_readers: 0,
            reread_count: 0,
            is_featured: false,
            created_at: now,
            updated_at: now,
        };
        s.stories.insert(row.id, row.clone());
        Ok(row)
    }

    fn get_story(&self, id: i64) -> Result<Option<StoryRow>> {
        Ok(self.lock()?.stories.get(&id).cloned())
    }

    fn update_story(&self, story: &StoryRow) -> Result<StoryRow> {
        let mut s = self.lock()?;
        let row = s.story_mut(story.id)?;
        let now = Utc::now();
        row.title = story.title.clone();
        row.content = story.content.clone();
        row.story_type = story.story_type;
        row.status = story.status;
        row.is_anonymous = story.is_anonymous;
        row.tags = story.tags.clone();
        row.reading_time = story.reading_time;
        row.is_featured = story.is_featured;
        row.updated_at = now;
        if story.status == StoryStatus::Published && row.published_at.is_none() {
            row.published_at = Some(now);
        }
        Ok(row.clone())
    }

    fn delete_story(&self, id: i64) -> Result<bool> {
        let mut s = self.lock()?;
        if s.stories.remove(&id).is_none() {
            return Ok(false);
        }
        s.cascade_story(id);
        s.recount();
        Ok(true)
    }

    fn increment_views(&self, id: i64) -> Result<Option<i64>> {
        let mut s = self.lock()?;
        Ok(s.stories.get_mut(&id).map(|story| {
            story.view_count += 1;
            story.view_count
        }))
    }

    fn list_stories(&self, filter: &StoryFilter) -> Result<Vec<StoryRow>> {
        Ok(self
            .lock()?
            .stories
            .values()
            .filter(|story| filter.matches(story))
            .cloned()
            .collect())
    }

    fn bookmarked_stories(&self, user_id: i64) -> Result<Vec<StoryRow>> {
        let s = self.lock()?;
        Ok(s.bookmarks
            .iter()
            .rev()
            .filter(|b| b.1 == user_id)
            .filter_map(|b| s.stories.get(&b.2))
            .filter(|story| story.status == StoryStatus::Published)
            .cloned()
            .collect())
    }

    fn create_comment(&self, comment: NewComment) -> Result<CommentRow> {
        let mut s = self.lock()?;
        if let Some(parent_id) = comment.parent_id {
            let same_story = s.comments.get(&parent_id).map(|p| p.story_id) == Some(comment.story_id);
            if !same_story {
                return Err(StorageError::NotFound("Parent comment").into());
            }
        }
        s.story_mut(comment.story_id)?.comment_count += 1;
        let row = CommentRow {
            id: s.id(),
            story_id: comment.story_id,
            user_id: comment.user_id,
            parent_id: comment.parent_id,
            content: comment.content,
            is_anonymous: comment.is_anonymous,
            created_at: Utc::now(),
            reply_count: 0,
        };
        s.comments.insert(row.id, row.clone());
        Ok(row)
    }

    fn get_comment(&self, id: i64) -> Result<Option<CommentRow>> {
        let s = self.lock()?;
        Ok(s.comments.get(&id).cloned().map(|c| s.with_reply_count(c)))
    }

    fn list_comments(&self, story_id: i64) -> Result<Vec<CommentRow>> {
        let s = self.lock()?;
        Ok(s.comments
            .values()
            .filter(|c| c.story_id == story_id && c.parent_id.is_none())
            .cloned()
            .map(|c| s.with_reply_count(c))
            .collect())
    }

    fn delete_comment(&self, id: i64) -> Result<usize> {
        let mut s = self.lock()?;
        let Some(story_id) = s.comments.get(&id).map(|c| c.story_id) else {
            return Ok(0);
        };
        let subtree = s.comment_subtree(id);
        for gone in &subtree {
            s.comments.remove(gone);
        }
        if let Some(story) = s.stories.get_mut(&story_id) {
            story.comment_count = (story.comment_count - subtree.len() as i64).max(0);
        }
        Ok(subtree.len())
    }

    fn count_comments_by_user(&self, user_id: i64) -> Result<i64> {
        Ok(self.lock()?.comments.values().filter(|c| c.user_id == user_id).count() as i64)
    }

    fn add_reaction(
        &self,
        user_id: i64,
        story_id: i64,
        reaction_type: ReactionType,
        message: Option<String>,
    ) -> Result<ReactionRow> {
        let mut s = self.lock()?;
        if s.reaction_of(user_id, story_id).is_some() {
            return Err(StorageError::Conflict("You have already reacted to this story".into()).into());
        }
        s.insert_reaction(user_id, story_id, reaction_type, message)
    }

    fn toggle_reaction(
        &self,
        user_id: i64,
        story_id: i64,
        reaction_type: ReactionType,
        message: Option<String>,
    ) -> Result<ReactionToggle> {
        let mut s = self.lock()?;
        let existing = s.reaction_of(user_id, story_id).cloned();

        let (action, reaction) = match existing {
            Some(prev) if prev.reaction_type == reaction_type => {
                s.reactions.remove(&prev.id);
                let story = s.story_mut(story_id)?;
                story.support_count = (story.support_count - 1).max(0);
                (ReactionAction::Removed, None)
            }
            Some(prev) => {
                let row = s
                    .reactions
                    .get_mut(&prev.id)
                    .ok_or(StorageError::NotFound("Reaction"))?;
                row.reaction_type = reaction_type;
                row.message = message;
                (ReactionAction::Changed, Some(row.clone()))
            }
            None => {
                let row = s.insert_reaction(user_id, story_id, reaction_type, message)?;
                (ReactionAction::Added, Some(row))
            }
        };

        Ok(ReactionToggle {
            action,
            reaction,
            support_count: s.story_mut(story_id)?.support_count,
        })
    }

    fn get_reaction(&self, user_id: i64, story_id: i64) -> Result<Option<ReactionRow>> {
        Ok(self.lock()?.reaction_of(user_id, story_id).cloned())
    }

    fn count_reactions(&self, story_id: i64, reaction_type: Option<ReactionType>) -> Result<i64> {
        Ok(self
            .lock()?
            .reactions
            .values()
            .filter(|r| r.story_id == story_id && reaction_type.is_none_or(|t| t == r.reaction_type))
            .count() as i64)
    }

    fn count_reactions_by_user(&self, user_id: i64) -> Result<i64> {
        Ok(self.lock()?.reactions.values().filter(|r| r.user_id == user_id).count() as i64)
    }

    fn toggle_bookmark(&self, user_id: i64, story_id: i64) -> Result<(bool, i64)> {
        let mut s = self.lock()?;
        s.story_mut(story_id)?;
        let before = s.bookmarks.len();
        s.bookmarks.retain(|&(_, u, st)| !(u == user_id && st == story_id));
        let removed = s.bookmarks.len() < before;

        if !removed {
            let id = s.id();
            s.bookmarks.push((id, user_id, story_id));
        }
        let story = s.story_mut(story_id)?;
        story.save_count = if removed {
            (story.save_count - 1).max(0)
        } else {
            story.save_count + 1
        };
        Ok((!removed, story.save_count))
    }

    fn is_bookmarked(&self, user_id: i64, story_id: i64) -> Result<bool> {
        Ok(self
            .lock()?
            .bookmarks
            .iter()
            .any(|&(_, u, s)| u == user_id && s == story_id))
    }

    fn record_read_progress(
        &self,
        user_id: i64,
        story_id: i64,
        scroll_depth: Option<f64>,
        time_spent: Option<i64>,
    ) -> Result<ReadProgressRow> {
        let mut s = self.lock()?;
        let now = Utc::now();
        let depth = scroll_depth.map(|d| d.clamp(0.0, 1.0));
        let spent = time_spent.map(|t| t.max(0));

        let first = !s.progress.contains_key(&(user_id, story_id));
        let story = s.story_mut(story_id)?;
        if first {
            story.unique_readers += 1;
        } else {
            story.reread_count += 1;
        }

        let row = s
            .progress
            .entry((user_id, story_id))
            .and_modify(|p| {
                if let Some(d) = depth {
                    p.scroll_depth = p.scroll_depth.max(d);
                }
                if let Some(t) = spent {
                    p.time_spent = (p.time_spent + t) / 2;
                }
                p.completed = p.completed || p.scroll_depth >= COMPLETION_DEPTH;
                p.read_count += 1;
                p.last_read = now;
            })
            .or_insert_with(|| {
                let d = depth.unwrap_or(0.0);
                ReadProgressRow {
                    user_id,
                    story_id,
                    scroll_depth: d,
                    time_spent: spent.unwrap_or(0),
                    completed: d >= COMPLETION_DEPTH,
                    read_count: 1,
                    first_read: now,
                    last_read: now,
                }
            });
        Ok(row.clone())
    }

    fn toggle_follow(&self, follower_id: i64, following_id: i64) -> Result<(bool, i64)> {
        let mut s = self.lock()?;
        s.user_mut(following_id)?;
        let before = s.follows.len();
        s.follows.retain(|&(_, a, b)| !(a == follower_id && b == following_id));
        let removed = s.follows.len() < before;

        if !removed {
            let id = s.id();
            s.follows.push((id, follower_id, following_id));
        }
        let delta = if removed { -1 } else { 1 };
        if let Some(follower) = s.users.get_mut(&follower_id) {
            follower.following = (follower.following + delta).max(0);
        }
        let target = s.user_mut(following_id)?;
        target.followers = (target.followers + delta).max(0);
        Ok((!removed, target.followers))
    }

    fn is_following(&self, follower_id: i64, following_id: i64) -> Result<bool> {
        Ok(self
            .lock()?
            .follows
            .iter()
            .any(|&(_, a, b)| a == follower_id && b == following_id))
    }

    fn followers(&self, user_id: i64) -> Result<Vec<UserRow>> {
        let s = self.lock()?;
        Ok(s.follows
            .iter()
            .rev()
            .filter(|f| f.2 == user_id)
            .filter_map(|f| s.users.get(&f.1).cloned())
            .collect())
    }

    fn following(&self, user_id: i64) -> Result<Vec<UserRow>> {
        let s = self.lock()?;
        Ok(s.follows
            .iter()
            .rev()
            .filter(|f| f.1 == user_id)
            .filter_map(|f| s.users.get(&f.2).cloned())
            .collect())
    }

    fn create_challenge(&self, challenge: NewChallenge) -> Result<ChallengeRow> {
        let mut s = self.lock()?;
        let row = ChallengeRow {
            id: s.id(),
            title: challenge.title,
            description: challenge.description,
            prompt: challenge.prompt,
            start_date: challenge.start_date,
            end_date: challenge.end_date,
            submissions: 0,
            is_active: challenge.is_active,
            created_at: Utc::now(),
        };
        s.challenges.insert(row.id, row.clone());
        Ok(row)
    }

    fn get_challenge(&self, id: i64) -> Result<Option<ChallengeRow>> {
        Ok(self.lock()?.challenges.get(&id).cloned())
    }

    fn list_challenges(&self) -> Result<Vec<ChallengeRow>> {
        Ok(self.lock()?.challenges.values().rev().cloned().collect())
    }

    fn active_challenge(&self, now: DateTime<Utc>) -> Result<Option<ChallengeRow>> {
        Ok(self
            .lock()?
            .challenges
            .values()
            .filter(|c| c.is_active && c.start_date <= now && now <= c.end_date)
            .min_by_key(|c| (c.end_date, c.id))
            .cloned())
    }

    fn submit_to_challenge(&self, challenge_id: i64, story_id: i64, user_id: i64) -> Result<SubmissionRow> {
        let mut s = self.lock()?;
        if s.submissions
            .values()
            .any(|sub| sub.challenge_id == challenge_id && sub.story_id == story_id)
        {
            return Err(StorageError::Conflict("Story already submitted to this challenge".into()).into());
        }
        s.challenges
            .get_mut(&challenge_id)
            .ok_or(StorageError::NotFound("Challenge"))?
            .submissions += 1;
        let row = SubmissionRow {
            id: s.id(),
            challenge_id,
            story_id,
            user_id,
            votes: 0,
            created_at: Utc::now(),
        };
        s.submissions.insert(row.id, row.clone());
        Ok(row)
    }

    fn challenge_submissions(&self, challenge_id: i64) -> Result<Vec<SubmissionRow>> {
        let mut list: Vec<SubmissionRow> = self
            .lock()?
            .submissions
            .values()
            .filter(|sub| sub.challenge_id == challenge_id)
            .cloned()
            .collect();
        list.sort_by_key(|sub| (std::cmp::Reverse(sub.votes), sub.id));
        Ok(list)
    }

    fn create_review(&self, review: NewReview) -> Result<ReviewRow> {
        let mut s = self.lock()?;
        let row = ReviewRow {
            id: s.id(),
            story_id: review.story_id,
            reviewer_id: review.reviewer_id,
            content: review.content,
            rating: review.rating,
            is_completed: false,
            due_date: review.due_date,
            created_at: Utc::now(),
        };
        s.reviews.insert(row.id, row.clone());
        Ok(row)
    }

    fn get_review(&self, id: i64) -> Result<Option<ReviewRow>> {
        Ok(self.lock()?.reviews.get(&id).cloned())
    }

    fn update_review(&self, review: &ReviewRow) -> Result<()> {
        let mut s = self.lock()?;
        let row = s
            .reviews
            .get_mut(&review.id)
            .ok_or(StorageError::NotFound("Review"))?;
        row.content = review.content.clone();
        row.rating = review.rating;
        row.is_completed = review.is_completed;
        Ok(())
    }

    fn reviews_by_reviewer(&self, reviewer_id: i64) -> Result<Vec<ReviewRow>> {
        Ok(self
            .lock()?
            .reviews
            .values()
            .rev()
            .filter(|r| r.reviewer_id == reviewer_id)
            .cloned()
            .collect())
    }

    fn create_tip(&self, tip: NewTip) -> Result<TipRow> {
        let mut s = self.lock()?;
        let row = TipRow {
            id: s.id(),
            story_id: tip.story_id,
            from_user_id: tip.from_user_id,
            to_user_id: tip.to_user_id,
            amount: tip.amount,
            message: tip.message,
            payment_intent_id: tip.payment_intent_id,
            created_at: Utc::now(),
        };
        s.tips.insert(row.id, row.clone());
        Ok(row)
    }

    fn tips_for_story(&self, story_id: i64) -> Result<Vec<TipRow>> {
        Ok(self
            .lock()?
            .tips
            .values()
            .rev()
            .filter(|t| t.story_id == story_id)
            .cloned()
            .collect())
    }

    fn tips_received(&self, user_id: i64) -> Result<Vec<TipRow>> {
        Ok(self
            .lock()?
            .tips
            .values()
            .rev()
            .filter(|t| t.to_user_id == user_id)
            .cloned()
            .collect())
    }

    fn award_achievement(&self, user_id: i64, kind: AchievementKind) -> Result<Option<AchievementRow>> {
        let mut s = self.lock()?;
        if s.achievements.values().any(|a| a.user_id == user_id && a.kind == kind) {
            return Ok(None);
        }
        let (title, description, icon) = kind.badge();
        let row = AchievementRow {
            id: s.id(),
            user_id,
            kind,
            title: title.to_string(),
            description: description.to_string(),
            icon: icon.to_string(),
            unlocked_at: Utc::now(),
        };
        s.achievements.insert(row.id, row.clone());
        Ok(Some(row))
    }

    fn achievements(&self, user_id: i64) -> Result<Vec<AchievementRow>> {
        Ok(self
            .lock()?
            .achievements
            .values()
            .filter(|a| a.user_id == user_id)
            .cloned()
            .collect())
    }

    fn site_counts(&self, since: DateTime<Utc>) -> Result<SiteCounts> {
        let s = self.lock()?;
        let stories_with = |status: StoryStatus| s.stories.values().filter(|st| st.status == status).count() as i64;
        Ok(SiteCounts {
            users: s.users.len() as i64,
            new_users: s.users.values().filter(|u| u.created_at >= since).count() as i64,
            active_users: s.users.values().filter(|u| u.is_active).count() as i64,
            stories: s.stories.len() as i64,
            published_stories: stories_with(StoryStatus::Published),
            flagged_stories: stories_with(StoryStatus::Flagged),
            reactions: s.reactions.len() as i64,
            recent_reactions: s.reactions.values().filter(|r| r.created_at >= since).count() as i64,
        })
    }

    fn revoke_token(&self, jti: &str, user_id: i64, expires_at: DateTime<Utc>) -> Result<()> {
        let mut s = self.lock()?;
        s.revoked.insert(jti.to_string(), (user_id, expires_at));
        let now = Utc::now();
        s.revoked.retain(|_, (_, exp)| *exp >= now);
        Ok(())
    }

    fn is_token_revoked(&self, jti: &str) -> Result<bool> {
        Ok(self.lock()?.revoked.contains_key(jti))
    }
}

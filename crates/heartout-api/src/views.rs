//! Storage rows to wire responses. Anonymous content never exposes its author.

use std::collections::HashMap;

use heartout_db::Storage;
use heartout_db::models::*;
use heartout_types::api::*;

pub fn user_public(user: &UserRow) -> UserPublic {
    UserPublic {
        id: user.id,
        username: user.username.clone(),
        display_name: user.display_name.clone(),
        bio: user.bio.clone(),
        age_range: user.age_range.clone(),
        preferred_anonymity: user.preferred_anonymity,
        followers: user.followers,
        following: user.following,
        created_at: user.created_at,
    }
}

pub fn user_profile(user: &UserRow) -> UserProfile {
    UserProfile {
        public: user_public(user),
        email: user.email.clone(),
        role: user.role,
        is_active: user.is_active,
        last_login: user.last_login,
        author_bio: user.author_bio.clone(),
        website_url: user.website_url.clone(),
        social_links: user.social_links.clone(),
    }
}

fn author_info(anonymous: bool, author: Option<&UserRow>) -> AuthorInfo {
    match author {
        Some(user) if !anonymous => AuthorInfo {
            id: Some(user.id),
            username: user.username.clone(),
            display_name: user.display_name.clone(),
        },
        _ => AuthorInfo::anonymous(),
    }
}

pub fn story(story: &StoryRow, author: Option<&UserRow>) -> StoryResponse {
    StoryResponse {
        id: story.id,
        title: story.title.clone(),
        content: story.content.clone(),
        status: story.status,
        story_type: story.story_type,
        is_anonymous: story.is_anonymous,
        tags: story.tags.clone(),
        reading_time: story.reading_time,
        view_count: story.view_count,
        support_count: story.support_count,
        comment_count: story.comment_count,
        save_count: story.save_count,
        is_featured: story.is_featured,
        created_at: story.created_at,
        updated_at: story.updated_at,
        published_at: story.published_at,
        author: author_info(story.is_anonymous, author),
    }
}

/// Looks each distinct user up once.
fn users_by_id(storage: &dyn Storage, ids: impl IntoIterator<Item = i64>) -> anyhow::Result<HashMap<i64, UserRow>> {
    let mut users = HashMap::new();
    for id in ids {
        if users.contains_key(&id) {
            continue;
        }
        if let Some(user) = storage.get_user(id)? {
            users.insert(id, user);
        }
    }
    Ok(users)
}

/// A single story with its author looked up when it is not anonymous.
pub fn story_with_author(storage: &dyn Storage, row: &StoryRow) -> anyhow::Result<StoryResponse> {
    let author = if row.is_anonymous {
        None
    } else {
        storage.get_user(row.author_id)?
    };
    Ok(story(row, author.as_ref()))
}

pub fn stories(storage: &dyn Storage, rows: &[StoryRow]) -> anyhow::Result<Vec<StoryResponse>> {
    let authors = users_by_id(storage, rows.iter().filter(|s| !s.is_anonymous).map(|s| s.author_id))?;
    Ok(rows.iter().map(|s| story(s, authors.get(&s.author_id))).collect())
}

pub fn comment(comment: &CommentRow, author: Option<&UserRow>) -> CommentResponse {
    CommentResponse {
        id: comment.id,
        story_id: comment.story_id,
        parent_id: comment.parent_id,
        content: comment.content.clone(),
        is_anonymous: comment.is_anonymous,
        created_at: comment.created_at,
        reply_count: comment.reply_count,
        author: author_info(comment.is_anonymous, author),
    }
}

pub fn comments(storage: &dyn Storage, rows: &[CommentRow]) -> anyhow::Result<Vec<CommentResponse>> {
    let authors = users_by_id(storage, rows.iter().filter(|c| !c.is_anonymous).map(|c| c.user_id))?;
    Ok(rows.iter().map(|c| comment(c, authors.get(&c.user_id))).collect())
}

/// Reactions are always shown with their giver; only the story can be anonymous.
pub fn reaction(reaction: &ReactionRow, giver: Option<&UserRow>) -> ReactionResponse {
    ReactionResponse {
        id: reaction.id,
        reaction_type: reaction.reaction_type,
        message: reaction.message.clone(),
        created_at: reaction.created_at,
        giver: author_info(false, giver),
    }
}

pub fn challenge(c: ChallengeRow) -> ChallengeResponse {
    ChallengeResponse {
        id: c.id,
        title: c.title,
        description: c.description,
        prompt: c.prompt,
        start_date: c.start_date,
        end_date: c.end_date,
        submissions: c.submissions,
        is_active: c.is_active,
        created_at: c.created_at,
    }
}

pub fn submission(s: SubmissionRow) -> SubmissionResponse {
    SubmissionResponse {
        id: s.id,
        challenge_id: s.challenge_id,
        story_id: s.story_id,
        user_id: s.user_id,
        votes: s.votes,
        created_at: s.created_at,
    }
}

pub fn review(r: ReviewRow) -> ReviewResponse {
    ReviewResponse {
        id: r.id,
        story_id: r.story_id,
        reviewer_id: r.reviewer_id,
        content: r.content,
        rating: r.rating,
        is_completed: r.is_completed,
        due_date: r.due_date,
        created_at: r.created_at,
    }
}

pub fn tip(t: TipRow) -> TipResponse {
    TipResponse {
        id: t.id,
        story_id: t.story_id,
        from_user_id: t.from_user_id,
        to_user_id: t.to_user_id,
        amount: t.amount,
        message: t.message,
        payment_intent_id: t.payment_intent_id,
        created_at: t.created_at,
    }
}

pub fn achievement(a: AchievementRow) -> AchievementResponse {
    AchievementResponse {
        id: a.id,
        kind: a.kind,
        title: a.title,
        description: a.description,
        icon: a.icon,
        unlocked_at: a.unlocked_at,
    }
}

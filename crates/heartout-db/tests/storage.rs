//! Behaviour shared by every `Storage` backend. Each check runs against the
//! SQLite database and the in-memory store.

use chrono::{Duration, Utc};

use heartout_db::models::*;
use heartout_db::{Database, MemStorage, Storage, StorageError};
use heartout_types::api::ReactionAction;
use heartout_types::models::{AchievementKind, ReactionType, StoryStatus, StoryType, UserRole};

macro_rules! both_backends {
    ($($name:ident),* $(,)?) => {
        mod sqlite {
            $(
                #[test]
                fn $name() {
                    let db = heartout_db::Database::open_in_memory().unwrap();
                    super::$name(&db);
                }
            )*
        }
        mod memory {
            $(
                #[test]
                fn $name() {
                    super::$name(&heartout_db::MemStorage::new());
                }
            )*
        }
    };
}

both_backends!(
    duplicate_email_and_username_conflict,
    reaction_toggle_twice_restores_count,
    toggle_changes_reaction_without_touching_count,
    add_reaction_twice_conflicts,
    views_increment_by_one,
    deleted_story_disappears,
    deleting_comment_removes_replies,
    bookmark_toggle_tracks_save_count,
    follow_toggle_tracks_both_counters,
    deleting_user_fixes_counters_elsewhere,
    read_progress_counts_unique_and_rereads,
    achievements_award_once,
    challenge_submission_is_unique,
    active_challenge_picks_running_one,
    story_filter_search_is_case_insensitive,
    revoked_tokens_are_remembered,
    roles_and_suspension_persist,
    site_counts_cover_the_window,
);

fn user(store: &dyn Storage, name: &str) -> UserRow {
    store
        .create_user(NewUser {
            username: name.to_string(),
            email: format!("{name}@example.com"),
            password_hash: "hash".to_string(),
            display_name: None,
            age_range: None,
            role: UserRole::User,
        })
        .unwrap()
}

fn story(store: &dyn Storage, author: i64, title: &str, status: StoryStatus) -> StoryRow {
    store
        .create_story(NewStory {
            author_id: author,
            title: title.to_string(),
            content: "A long enough body of text for a story that people might want to read.".to_string(),
            story_type: StoryType::LifeStory,
            status,
            is_anonymous: false,
            tags: vec!["life".to_string()],
            reading_time: 1,
        })
        .unwrap()
}

fn comment(store: &dyn Storage, story_id: i64, user_id: i64, parent_id: Option<i64>) -> CommentRow {
    store
        .create_comment(NewComment {
            story_id,
            user_id,
            parent_id,
            content: "Thank you for sharing".to_string(),
            is_anonymous: false,
        })
        .unwrap()
}

fn support_count(store: &dyn Storage, story_id: i64) -> i64 {
    store.get_story(story_id).unwrap().unwrap().support_count
}

fn duplicate_email_and_username_conflict(store: &dyn Storage) {
    user(store, "alice");

    let err = store
        .create_user(NewUser {
            username: "alice2".into(),
            email: "ALICE@example.com".into(),
            password_hash: "x".into(),
            display_name: None,
            age_range: None,
            role: UserRole::User,
        })
        .unwrap_err();
    assert_eq!(
        StorageError::of(&err),
        Some(&StorageError::Conflict("Email already registered".into()))
    );

    let err = store
        .create_user(NewUser {
            username: "alice".into(),
            email: "other@example.com".into(),
            password_hash: "x".into(),
            display_name: None,
            age_range: None,
            role: UserRole::User,
        })
        .unwrap_err();
    assert_eq!(
        StorageError::of(&err),
        Some(&StorageError::Conflict("Username already taken".into()))
    );
}

fn reaction_toggle_twice_restores_count(store: &dyn Storage) {
    let author = user(store, "author");
    let reader = user(store, "reader");
    let s = story(store, author.id, "Toggled", StoryStatus::Published);

    let first = store.toggle_reaction(reader.id, s.id, ReactionType::Heart, None).unwrap();
    assert_eq!(first.action, ReactionAction::Added);
    assert_eq!(first.support_count, 1);

    let second = store.toggle_reaction(reader.id, s.id, ReactionType::Heart, None).unwrap();
    assert_eq!(second.action, ReactionAction::Removed);
    assert!(second.reaction.is_none());
    assert_eq!(support_count(store, s.id), 0);
    assert!(store.get_reaction(reader.id, s.id).unwrap().is_none());
}

fn toggle_changes_reaction_without_touching_count(store: &dyn Storage) {
    let author = user(store, "author");
    let reader = user(store, "reader");
    let s = story(store, author.id, "Changed", StoryStatus::Published);

    store.toggle_reaction(reader.id, s.id, ReactionType::Heart, None).unwrap();
    let changed = store
        .toggle_reaction(reader.id, s.id, ReactionType::Hug, Some("sending love".into()))
        .unwrap();

    assert_eq!(changed.action, ReactionAction::Changed);
    assert_eq!(changed.support_count, 1);
    let row = changed.reaction.unwrap();
    assert_eq!(row.reaction_type, ReactionType::Hug);
    assert_eq!(row.message.as_deref(), Some("sending love"));
    assert_eq!(store.count_reactions(s.id, Some(ReactionType::Heart)).unwrap(), 0);
    assert_eq!(store.count_reactions(s.id, Some(ReactionType::Hug)).unwrap(), 1);
}

fn add_reaction_twice_conflicts(store: &dyn Storage) {
    let author = user(store, "author");
    let reader = user(store, "reader");
    let s = story(store, author.id, "Twice", StoryStatus::Published);

    store.add_reaction(reader.id, s.id, ReactionType::Applause, None).unwrap();
    let err = store.add_reaction(reader.id, s.id, ReactionType::Heart, None).unwrap_err();
    assert!(matches!(StorageError::of(&err), Some(StorageError::Conflict(_))));
    assert_eq!(support_count(store, s.id), 1);
}

fn views_increment_by_one(store: &dyn Storage) {
    let author = user(store, "author");
    let s = story(store, author.id, "Viewed", StoryStatus::Published);

    assert_eq!(store.increment_views(s.id).unwrap(), Some(1));
    assert_eq!(store.increment_views(s.id).unwrap(), Some(2));
    assert_eq!(store.increment_views(9999).unwrap(), None);
}

fn deleted_story_disappears(store: &dyn Storage) {
    let author = user(store, "author");
    let draft = story(store, author.id, "Draft", StoryStatus::Draft);
    comment(store, draft.id, author.id, None);

    assert!(store.delete_story(draft.id).unwrap());
    assert!(store.get_story(draft.id).unwrap().is_none());
    let mine = StoryFilter {
        author_id: Some(author.id),
        ..StoryFilter::default()
    };
    assert!(store.list_stories(&mine).unwrap().is_empty());
    assert!(store.list_comments(draft.id).unwrap().is_empty());
    assert!(!store.delete_story(draft.id).unwrap());
}

fn deleting_comment_removes_replies(store: &dyn Storage) {
    let author = user(store, "author");
    let s = story(store, author.id, "Threaded", StoryStatus::Published);
    let root = comment(store, s.id, author.id, None);
    let reply = comment(store, s.id, author.id, Some(root.id));
    comment(store, s.id, author.id, Some(reply.id));
    comment(store, s.id, author.id, None);

    let listed = store.list_comments(s.id).unwrap();
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0].reply_count, 1);
    assert_eq!(store.get_story(s.id).unwrap().unwrap().comment_count, 4);

    assert_eq!(store.delete_comment(root.id).unwrap(), 3);
    assert_eq!(store.get_story(s.id).unwrap().unwrap().comment_count, 1);
    assert!(store.get_comment(reply.id).unwrap().is_none());
}

fn bookmark_toggle_tracks_save_count(store: &dyn Storage) {
    let author = user(store, "author");
    let reader = user(store, "reader");
    let s = story(store, author.id, "Saved", StoryStatus::Published);

    assert_eq!(store.toggle_bookmark(reader.id, s.id).unwrap(), (true, 1));
    assert!(store.is_bookmarked(reader.id, s.id).unwrap());
    assert_eq!(store.bookmarked_stories(reader.id).unwrap().len(), 1);

    assert_eq!(store.toggle_bookmark(reader.id, s.id).unwrap(), (false, 0));
    assert!(!store.is_bookmarked(reader.id, s.id).unwrap());
}

fn follow_toggle_tracks_both_counters(store: &dyn Storage) {
    let a = user(store, "follower");
    let b = user(store, "followed");

    assert_eq!(store.toggle_follow(a.id, b.id).unwrap(), (true, 1));
    assert!(store.is_following(a.id, b.id).unwrap());
    assert_eq!(store.get_user(a.id).unwrap().unwrap().following, 1);
    assert_eq!(store.followers(b.id).unwrap()[0].id, a.id);
    assert_eq!(store.following(a.id).unwrap()[0].id, b.id);

    assert_eq!(store.toggle_follow(a.id, b.id).unwrap(), (false, 0));
    assert_eq!(store.get_user(a.id).unwrap().unwrap().following, 0);
}

fn deleting_user_fixes_counters_elsewhere(store: &dyn Storage) {
    let author = user(store, "author");
    let leaver = user(store, "leaver");
    let s = story(store, author.id, "Kept", StoryStatus::Published);
    story(store, leaver.id, "Gone", StoryStatus::Published);

    store.toggle_reaction(leaver.id, s.id, ReactionType::Heart, None).unwrap();
    store.toggle_bookmark(leaver.id, s.id).unwrap();
    comment(store, s.id, leaver.id, None);
    store.toggle_follow(leaver.id, author.id).unwrap();

    assert!(store.delete_user(leaver.id).unwrap());

    let kept = store.get_story(s.id).unwrap().unwrap();
    assert_eq!(kept.support_count, 0);
    assert_eq!(kept.save_count, 0);
    assert_eq!(kept.comment_count, 0);
    assert_eq!(store.get_user(author.id).unwrap().unwrap().followers, 0);
    assert_eq!(store.list_stories(&StoryFilter::published()).unwrap().len(), 1);
    assert!(store.get_user(leaver.id).unwrap().is_none());
    assert!(!store.delete_user(leaver.id).unwrap());
}

fn read_progress_counts_unique_and_rereads(store: &dyn Storage) {
    let author = user(store, "author");
    let reader = user(store, "reader");
    let s = story(store, author.id, "Read", StoryStatus::Published);

    let first = store.record_read_progress(reader.id, s.id, Some(0.5), Some(60)).unwrap();
    assert_eq!(first.read_count, 1);
    assert!(!first.completed);

    let second = store.record_read_progress(reader.id, s.id, Some(0.95), Some(20)).unwrap();
    assert_eq!(second.read_count, 2);
    assert!(second.completed);
    assert_eq!(second.time_spent, 40);

    let third = store.record_read_progress(reader.id, s.id, Some(0.1), None).unwrap();
    assert!((third.scroll_depth - 0.95).abs() < f64::EPSILON);

    let row = store.get_story(s.id).unwrap().unwrap();
    assert_eq!(row.unique_readers, 1);
    assert_eq!(row.reread_count, 2);
}

fn achievements_award_once(store: &dyn Storage) {
    let u = user(store, "writer");

    let first = store.award_achievement(u.id, AchievementKind::FirstStory).unwrap();
    assert_eq!(first.unwrap().kind, AchievementKind::FirstStory);
    assert!(store.award_achievement(u.id, AchievementKind::FirstStory).unwrap().is_none());
    assert_eq!(store.achievements(u.id).unwrap().len(), 1);
}

fn challenge_submission_is_unique(store: &dyn Storage) {
    let u = user(store, "writer");
    let s = story(store, u.id, "Entry", StoryStatus::Published);
    let now = Utc::now();
    let c = store
        .create_challenge(NewChallenge {
            title: "Gratitude week".into(),
            description: "Write about gratitude".into(),
            prompt: "Who changed your life?".into(),
            start_date: now - Duration::days(1),
            end_date: now + Duration::days(6),
            is_active: true,
        })
        .unwrap();

    store.submit_to_challenge(c.id, s.id, u.id).unwrap();
    let err = store.submit_to_challenge(c.id, s.id, u.id).unwrap_err();
    assert!(matches!(StorageError::of(&err), Some(StorageError::Conflict(_))));
    assert_eq!(store.get_challenge(c.id).unwrap().unwrap().submissions, 1);
    assert_eq!(store.challenge_submissions(c.id).unwrap().len(), 1);
}

fn active_challenge_picks_running_one(store: &dyn Storage) {
    let now = Utc::now();
    let make = |title: &str, start: i64, end: i64, active: bool| {
        store
            .create_challenge(NewChallenge {
                title: title.into(),
                description: "d".into(),
                prompt: "p".into(),
                start_date: now + Duration::days(start),
                end_date: now + Duration::days(end),
                is_active: active,
            })
            .unwrap()
    };
    make("past", -10, -5, true);
    make("disabled", -1, 1, false);
    let running = make("running", -2, 3, true);
    make("later", -1, 9, true);

    let active = store.active_challenge(now).unwrap().unwrap();
    assert_eq!(active.id, running.id);
    assert_eq!(store.list_challenges().unwrap().len(), 4);
}

fn story_filter_search_is_case_insensitive(store: &dyn Storage) {
    let u = user(store, "writer");
    story(store, u.id, "The Letter I Never Sent", StoryStatus::Published);
    story(store, u.id, "Climbing", StoryStatus::Published);
    story(store, u.id, "A draft letter", StoryStatus::Draft);

    let filter = StoryFilter {
        search: Some("letter".into()),
        ..StoryFilter::published()
    };
    let found = store.list_stories(&filter).unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].title, "The Letter I Never Sent");
}

fn revoked_tokens_are_remembered(store: &dyn Storage) {
    let u = user(store, "writer");
    store.revoke_token("jti-1", u.id, Utc::now() + Duration::hours(1)).unwrap();

    assert!(store.is_token_revoked("jti-1").unwrap());
    assert!(!store.is_token_revoked("jti-2").unwrap());
}

fn roles_and_suspension_persist(store: &dyn Storage) {
    let u = user(store, "moderated");
    assert_eq!(u.role, UserRole::User);
    assert!(u.is_active);

    store.set_user_role(u.id, UserRole::Moderator).unwrap();
    store.set_user_active(u.id, false).unwrap();
    let reloaded = store.get_user(u.id).unwrap().unwrap();
    assert_eq!(reloaded.role, UserRole::Moderator);
    assert!(!reloaded.is_active);

    let err = store.set_user_role(999, UserRole::Admin).unwrap_err();
    assert_eq!(StorageError::of(&err), Some(&StorageError::NotFound("User")));

    let later = user(store, "later");
    let listed: Vec<i64> = store.list_users().unwrap().iter().map(|u| u.id).collect();
    assert_eq!(listed, vec![later.id, u.id]);
}

fn site_counts_cover_the_window(store: &dyn Storage) {
    let author = user(store, "author");
    let reader = user(store, "reader");
    let s = story(store, author.id, "Counted", StoryStatus::Published);
    story(store, author.id, "Hidden", StoryStatus::Flagged);
    story(store, author.id, "Unfinished", StoryStatus::Draft);
    store.add_reaction(reader.id, s.id, ReactionType::Hug, None).unwrap();
    store.set_user_active(reader.id, false).unwrap();

    let counts = store.site_counts(Utc::now() - Duration::days(30)).unwrap();
    assert_eq!(
        counts,
        SiteCounts {
            users: 2,
            new_users: 2,
            active_users: 1,
            stories: 3,
            published_stories: 1,
            flagged_stories: 1,
            reactions: 1,
            recent_reactions: 1,
        }
    );

    let future = store.site_counts(Utc::now() + Duration::hours(1)).unwrap();
    assert_eq!((future.new_users, future.recent_reactions), (0, 0));
    assert_eq!(store.count_reactions_by_user(reader.id).unwrap(), 1);
    assert_eq!(store.count_reactions_by_user(author.id).unwrap(), 0);
}

#[test]
fn sqlite_story_delete_rolls_back_when_the_recount_fails() {
    let db = Database::open_in_memory().unwrap();
    let u = user(&db, "writer");
    let s = story(&db, u.id, "Survivor", StoryStatus::Published);
    let now = Utc::now();
    let c = db
        .create_challenge(NewChallenge {
            title: "Courage".into(),
            description: "d".into(),
            prompt: "p".into(),
            start_date: now - Duration::days(1),
            end_date: now + Duration::days(1),
            is_active: true,
        })
        .unwrap();
    db.submit_to_challenge(c.id, s.id, u.id).unwrap();

    db.with_conn(|conn| {
        conn.execute_batch(
            "CREATE TRIGGER block_recount BEFORE UPDATE ON challenges
             BEGIN SELECT RAISE(ABORT, 'recount blocked'); END;",
        )?;
        Ok(())
    })
    .unwrap();

    assert!(db.delete_story(s.id).is_err());
    assert!(db.get_story(s.id).unwrap().is_some());
    assert_eq!(db.challenge_submissions(c.id).unwrap().len(), 1);
}

#[test]
fn sqlite_persists_across_reopen() {
    let dir = std::env::temp_dir().join(format!("heartout-db-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("reopen.db");
    let _ = std::fs::remove_file(&path);

    let story_id = {
        let db = Database::open(&path).unwrap();
        let u = user(&db, "persisted");
        story(&db, u.id, "Still here", StoryStatus::Published).id
    };

    let db = Database::open(&path).unwrap();
    let s = db.get_story(story_id).unwrap().unwrap();
    assert_eq!(s.title, "Still here");
    assert!(s.published_at.is_some());

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn memory_store_starts_empty() {
    let store = MemStorage::new();
    assert!(store.list_stories(&StoryFilter::default()).unwrap().is_empty());
    assert!(store.get_user(1).unwrap().is_none());
}

use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 =
        conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))?;

    if version < 1 {
        info!("Running migration v1 (initial schema)");
        conn.execute_batch(
            "
            CREATE TABLE users (
                id                  INTEGER PRIMARY KEY AUTOINCREMENT,
                username            TEXT NOT NULL UNIQUE,
                email               TEXT NOT NULL UNIQUE,
                password_hash       TEXT NOT NULL,
                display_name        TEXT,
                bio                 TEXT,
                age_range           TEXT,
                preferred_anonymity INTEGER NOT NULL DEFAULT 1,
                author_bio          TEXT,
                website_url         TEXT,
                social_links        TEXT NOT NULL DEFAULT '{}',
                followers           INTEGER NOT NULL DEFAULT 0,
                following           INTEGER NOT NULL DEFAULT 0,
                created_at          TEXT NOT NULL,
                last_login          TEXT
            );

            CREATE TABLE stories (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                author_id       INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                title           TEXT NOT NULL,
                content         TEXT NOT NULL,
                story_type      TEXT NOT NULL,
                status          TEXT NOT NULL DEFAULT 'draft',
                is_anonymous    INTEGER NOT NULL DEFAULT 1,
                tags            TEXT NOT NULL DEFAULT '[]',
                reading_time    INTEGER NOT NULL DEFAULT 1,
                view_count      INTEGER NOT NULL DEFAULT 0,
                support_count   INTEGER NOT NULL DEFAULT 0,
                comment_count   INTEGER NOT NULL DEFAULT 0,
                save_count      INTEGER NOT NULL DEFAULT 0,
                unique_readers  INTEGER NOT NULL DEFAULT 0,
                reread_count    INTEGER NOT NULL DEFAULT 0,
                is_featured     INTEGER NOT NULL DEFAULT 0,
                created_at      TEXT NOT NULL,
                updated_at      TEXT NOT NULL,
                published_at    TEXT
            );

            CREATE INDEX idx_stories_status_type ON stories(status, story_type);
            CREATE INDEX idx_stories_author ON stories(author_id, status);

            CREATE TABLE comments (
                id            INTEGER PRIMARY KEY AUTOINCREMENT,
                story_id      INTEGER NOT NULL REFERENCES stories(id) ON DELETE CASCADE,
                user_id       INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                parent_id     INTEGER REFERENCES comments(id) ON DELETE CASCADE,
                content       TEXT NOT NULL,
                is_anonymous  INTEGER NOT NULL DEFAULT 1,
                created_at    TEXT NOT NULL
            );

            CREATE INDEX idx_comments_story ON comments(story_id, parent_id);

            CREATE TABLE reactions (
                id             INTEGER PRIMARY KEY AUTOINCREMENT,
                story_id       INTEGER NOT NULL REFERENCES stories(id) ON DELETE CASCADE,
                user_id        INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                reaction_type  TEXT NOT NULL,
                message        TEXT,
                created_at     TEXT NOT NULL,
                UNIQUE(user_id, story_id)
            );

            CREATE INDEX idx_reactions_story ON reactions(story_id);

            CREATE TABLE bookmarks (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id     INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                story_id    INTEGER NOT NULL REFERENCES stories(id) ON DELETE CASCADE,
                created_at  TEXT NOT NULL,
                UNIQUE(user_id, story_id)
            );

            CREATE TABLE read_progress (
                user_id       INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                story_id      INTEGER NOT NULL REFERENCES stories(id) ON DELETE CASCADE,
                scroll_depth  REAL NOT NULL DEFAULT 0,
                time_spent    INTEGER NOT NULL DEFAULT 0,
                completed     INTEGER NOT NULL DEFAULT 0,
                read_count    INTEGER NOT NULL DEFAULT 1,
                first_read    TEXT NOT NULL,
                last_read     TEXT NOT NULL,
                PRIMARY KEY (user_id, story_id)
            );

            CREATE TABLE follows (
                id            INTEGER PRIMARY KEY AUTOINCREMENT,
                follower_id   INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                following_id  INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                created_at    TEXT NOT NULL,
                UNIQUE(follower_id, following_id)
            );

            CREATE TABLE challenges (
                id           INTEGER PRIMARY KEY AUTOINCREMENT,
                title        TEXT NOT NULL,
                description  TEXT NOT NULL,
                prompt       TEXT NOT NULL,
                start_date   TEXT NOT NULL,
                end_date     TEXT NOT NULL,
                submissions  INTEGER NOT NULL DEFAULT 0,
                is_active    INTEGER NOT NULL DEFAULT 1,
                created_at   TEXT NOT NULL
            );

            CREATE TABLE challenge_submissions (
                id            INTEGER PRIMARY KEY AUTOINCREMENT,
                challenge_id  INTEGER NOT NULL REFERENCES challenges(id) ON DELETE CASCADE,
                story_id      INTEGER NOT NULL REFERENCES stories(id) ON DELETE CASCADE,
                user_id       INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                votes         INTEGER NOT NULL DEFAULT 0,
                created_at    TEXT NOT NULL,
                UNIQUE(challenge_id, story_id)
            );

            CREATE TABLE reviews (
                id            INTEGER PRIMARY KEY AUTOINCREMENT,
                story_id      INTEGER NOT NULL REFERENCES stories(id) ON DELETE CASCADE,
                reviewer_id   INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                content       TEXT NOT NULL,
                rating        INTEGER,
                is_completed  INTEGER NOT NULL DEFAULT 0,
                due_date      TEXT,
                created_at    TEXT NOT NULL
            );

            CREATE TABLE tips (
                id                 INTEGER PRIMARY KEY AUTOINCREMENT,
                story_id           INTEGER NOT NULL REFERENCES stories(id) ON DELETE CASCADE,
                from_user_id       INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                to_user_id         INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                amount             INTEGER NOT NULL,
                message            TEXT,
                payment_intent_id  TEXT,
                created_at         TEXT NOT NULL
            );

            CREATE TABLE achievements (
                id           INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id      INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                kind         TEXT NOT NULL,
                title        TEXT NOT NULL,
                description  TEXT NOT NULL,
                icon         TEXT NOT NULL,
                unlocked_at  TEXT NOT NULL,
                UNIQUE(user_id, kind)
            );

            CREATE TABLE revoked_tokens (
                jti         TEXT PRIMARY KEY,
                user_id     INTEGER NOT NULL,
                expires_at  TEXT NOT NULL
            );

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    if version < 2 {
        info!("Running migration v2 (roles and suspension)");
        conn.execute_batch(
            "
            ALTER TABLE users ADD COLUMN role TEXT NOT NULL DEFAULT 'user';
            ALTER TABLE users ADD COLUMN is_active INTEGER NOT NULL DEFAULT 1;

            CREATE INDEX idx_users_active ON users(is_active);
            CREATE INDEX idx_reactions_user ON reactions(user_id);

            INSERT INTO schema_version (version) VALUES (2);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}

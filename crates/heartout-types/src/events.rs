use serde::{Deserialize, Serialize};

use crate::models::ReactionType;

const TITLE_PREVIEW_CHARS: usize = 50;
const COMMENT_PREVIEW_CHARS: usize = 100;

/// Events sent from the server over `/ws`. Serialized flat: `{"type": ..., ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Connection authenticated
    Ready { user_id: i64, username: String },

    /// Someone reacted to a story
    Reaction {
        story_id: i64,
        story_author_id: i64,
        story_title: String,
        from_user: String,
        reaction_type: ReactionType,
        message: String,
    },

    /// Someone commented on a story
    Comment {
        story_id: i64,
        story_author_id: i64,
        story_title: String,
        from_user: String,
        comment_preview: String,
        message: String,
    },

    /// Number of sockets currently reading a story
    ReaderCount { story_id: i64, count: usize },

    /// Heartbeat reply
    Pong,
}

impl ServerEvent {
    pub fn reaction(
        story_id: i64,
        story_author_id: i64,
        story_title: &str,
        from_user: &str,
        reaction_type: ReactionType,
    ) -> Self {
        Self::Reaction {
            story_id,
            story_author_id,
            story_title: truncate_with_ellipsis(story_title, TITLE_PREVIEW_CHARS),
            from_user: from_user.to_string(),
            reaction_type,
            message: format!("{} reacted to your story", from_user),
        }
    }

    pub fn comment(
        story_id: i64,
        story_author_id: i64,
        story_title: &str,
        from_user: &str,
        content: &str,
    ) -> Self {
        Self::Comment {
            story_id,
            story_author_id,
            story_title: truncate_with_ellipsis(story_title, TITLE_PREVIEW_CHARS),
            from_user: from_user.to_string(),
            comment_preview: truncate_with_ellipsis(content, COMMENT_PREVIEW_CHARS),
            message: format!("{} commented on your story", from_user),
        }
    }

    /// The story this event concerns, if any.
    pub fn story_id(&self) -> Option<i64> {
        match self {
            Self::Reaction { story_id, .. }
            | Self::Comment { story_id, .. }
            | Self::ReaderCount { story_id, .. } => Some(*story_id),
            Self::Ready { .. } | Self::Pong => None,
        }
    }
}

/// Commands sent FROM client TO server over `/ws`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientCommand {
    JoinStory { story_id: i64 },
    LeaveStory { story_id: i64 },
    Ping,
}

/// Cuts `text` to `max` characters, appending `...` when something was dropped.
pub fn truncate_with_ellipsis(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

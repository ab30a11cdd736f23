use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Raised when a string does not name a known variant.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid {field}. Must be one of: {allowed}")]
pub struct UnknownVariant {
    pub field: &'static str,
    pub allowed: String,
}

fn unknown(field: &'static str, all: &[&str]) -> UnknownVariant {
    UnknownVariant {
        field,
        allowed: all.join(", "),
    }
}

// -- Story type --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoryType {
    Achievement,
    Regret,
    UnsentLetter,
    Sacrifice,
    LifeStory,
    Other,
}

impl StoryType {
    pub const ALL: [StoryType; 6] = [
        Self::Achievement,
        Self::Regret,
        Self::UnsentLetter,
        Self::Sacrifice,
        Self::LifeStory,
        Self::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Achievement => "achievement",
            Self::Regret => "regret",
            Self::UnsentLetter => "unsent_letter",
            Self::Sacrifice => "sacrifice",
            Self::LifeStory => "life_story",
            Self::Other => "other",
        }
    }
}

impl FromStr for StoryType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| unknown("story type", &Self::ALL.map(|t| t.as_str())))
    }
}

impl fmt::Display for StoryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// -- Story status --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoryStatus {
    #[default]
    Draft,
    Published,
    Flagged,
    Removed,
}

impl StoryStatus {
    pub const ALL: [StoryStatus; 4] = [Self::Draft, Self::Published, Self::Flagged, Self::Removed];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Published => "published",
            Self::Flagged => "flagged",
            Self::Removed => "removed",
        }
    }

    /// Authors move stories between draft and published. Flagged and removed
    /// are set by moderators only.
    pub fn author_settable(&self) -> bool {
        matches!(self, Self::Draft | Self::Published)
    }
}

impl FromStr for StoryStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| unknown("status", &Self::ALL.map(|t| t.as_str())))
    }
}

impl fmt::Display for StoryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// -- User roles --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    #[default]
    User,
    Author,
    Moderator,
    Admin,
}

impl UserRole {
    pub const ALL: [UserRole; 4] = [Self::User, Self::Author, Self::Moderator, Self::Admin];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Author => "author",
            Self::Moderator => "moderator",
            Self::Admin => "admin",
        }
    }

    /// Moderators and admins may use the moderation endpoints.
    pub fn is_staff(&self) -> bool {
        matches!(self, Self::Moderator | Self::Admin)
    }
}

impl FromStr for UserRole {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| unknown("role", &Self::ALL.map(|r| r.as_str())))
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// -- Reactions --

/// A typed "like". `Heart` is what the plain like endpoint toggles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReactionType {
    #[default]
    Heart,
    Applause,
    Bookmark,
    Hug,
    Inspiring,
}

impl ReactionType {
    pub const ALL: [ReactionType; 5] = [
        Self::Heart,
        Self::Applause,
        Self::Bookmark,
        Self::Hug,
        Self::Inspiring,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Heart => "heart",
            Self::Applause => "applause",
            Self::Bookmark => "bookmark",
            Self::Hug => "hug",
            Self::Inspiring => "inspiring",
        }
    }
}

impl FromStr for ReactionType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| unknown("reaction type", &Self::ALL.map(|t| t.as_str())))
    }
}

impl fmt::Display for ReactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// -- Achievements --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AchievementKind {
    FirstStory,
    Loved,
    Helpful,
    OnFire,
    Champion,
    RisingStar,
}

impl AchievementKind {
    pub const ALL: [AchievementKind; 6] = [
        Self::FirstStory,
        Self::Loved,
        Self::Helpful,
        Self::OnFire,
        Self::Champion,
        Self::RisingStar,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FirstStory => "first_story",
            Self::Loved => "loved",
            Self::Helpful => "helpful",
            Self::OnFire => "on_fire",
            Self::Champion => "champion",
            Self::RisingStar => "rising_star",
        }
    }

    /// Display title, description and icon shown on the profile badge.
    pub fn badge(&self) -> (&'static str, &'static str, &'static str) {
        match self {
            Self::FirstStory => ("First Story", "Published your first story", "pen"),
            Self::Loved => ("Loved", "A story of yours received 10 hearts", "heart"),
            Self::Helpful => ("Helpful", "Completed 5 peer reviews", "hands"),
            Self::OnFire => ("On Fire", "Published 5 stories", "flame"),
            Self::Champion => ("Champion", "Won a writing challenge", "trophy"),
            Self::RisingStar => ("Rising Star", "Reached 10 followers", "star"),
        }
    }
}

impl FromStr for AchievementKind {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| unknown("achievement", &Self::ALL.map(|t| t.as_str())))
    }
}

// -- Feed ordering --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortBy {
    #[default]
    Smart,
    Latest,
    Trending,
    MostViewed,
}

impl SortBy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Smart => "smart",
            Self::Latest => "latest",
            Self::Trending => "trending",
            Self::MostViewed => "most_viewed",
        }
    }
}

pub const AGE_RANGES: [&str; 6] = ["13-17", "18-24", "25-34", "35-44", "45-54", "55+"];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn story_type_parses_wire_names() {
        assert_eq!("unsent_letter".parse::<StoryType>(), Ok(StoryType::UnsentLetter));
        assert_eq!("life_story".parse::<StoryType>(), Ok(StoryType::LifeStory));
        let err = "poem".parse::<StoryType>().unwrap_err();
        assert!(err.to_string().contains("achievement"));
    }

    #[test]
    fn serde_names_match_as_str() {
        for t in ReactionType::ALL {
            let json = serde_json::to_string(&t).unwrap();
            assert_eq!(json, format!("\"{}\"", t.as_str()));
        }
        for t in StoryType::ALL {
            let json = serde_json::to_string(&t).unwrap();
            assert_eq!(json, format!("\"{}\"", t.as_str()));
        }
    }

    #[test]
    fn defaults() {
        assert_eq!(StoryStatus::default(), StoryStatus::Draft);
        assert_eq!(ReactionType::default(), ReactionType::Heart);
        assert_eq!(SortBy::default(), SortBy::Smart);
        assert_eq!(UserRole::default(), UserRole::User);
    }

    #[test]
    fn only_moderators_and_admins_are_staff() {
        let staff: Vec<UserRole> = UserRole::ALL.into_iter().filter(UserRole::is_staff).collect();
        assert_eq!(staff, vec![UserRole::Moderator, UserRole::Admin]);
        assert_eq!("moderator".parse::<UserRole>(), Ok(UserRole::Moderator));
        assert!("owner".parse::<UserRole>().is_err());
    }
}

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::CoreError;

pub type FolderId = Uuid;
pub type CardId = Uuid;
pub type ReviewId = Uuid;

/// Lowest ease a card can ever reach.
pub const EASE_MIN: f64 = 1.3;
pub const EASE_DEFAULT: f64 = 2.5;

/// Interval at which a card counts as mature.
pub const MATURE_INTERVAL_DAYS: u32 = 21;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Rating {
    Again,
    Hard,
    Good,
    Easy,
}

impl Rating {
    pub const ALL: [Rating; 4] = [Rating::Again, Rating::Hard, Rating::Good, Rating::Easy];

    pub fn as_str(&self) -> &'static str {
        match self {
            Rating::Again => "again",
            Rating::Hard => "hard",
            Rating::Good => "good",
            Rating::Easy => "easy",
        }
    }

    pub fn is_lapse(&self) -> bool {
        matches!(self, Rating::Again)
    }
}

impl fmt::Display for Rating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Rating {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "again" => Ok(Rating::Again),
            "hard" => Ok(Rating::Hard),
            "good" => Ok(Rating::Good),
            "easy" => Ok(Rating::Easy),
            other => Err(CoreError::InvalidRating(other.to_string())),
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    New,
    Learning,
    Young,
    Mature,
}

/// Scheduling fields embedded in every card.
///
/// Treated as a value: the scheduler returns a fresh state and the caller
/// writes it back through the repository.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SchedulingState {
    pub repetitions: u32,
    pub ease: f64,
    pub interval_days: u32,
    pub next_review: DateTime<Utc>,
    pub last_reviewed: Option<DateTime<Utc>>,
}

impl SchedulingState {
    /// Fresh state for a card created at `created_at`; due right away.
    pub fn new_at(created_at: DateTime<Utc>) -> Self {
        Self {
            repetitions: 0,
            ease: EASE_DEFAULT,
            interval_days: 0,
            next_review: created_at,
            last_reviewed: None,
        }
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if !self.ease.is_finite() {
            return Err(CoreError::InvalidState("ease is not a finite number"));
        }
        if self.ease < EASE_MIN {
            return Err(CoreError::InvalidState("ease below 1.3"));
        }
        if let Some(last) = self.last_reviewed {
            if self.next_review < last {
                return Err(CoreError::InvalidState("next review precedes last review"));
            }
        }
        Ok(())
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.next_review <= now
    }

    pub fn stage(&self) -> Stage {
        if self.last_reviewed.is_none() {
            Stage::New
        } else if self.repetitions < 2 {
            Stage::Learning
        } else if self.interval_days < MATURE_INTERVAL_DAYS {
            Stage::Young
        } else {
            Stage::Mature
        }
    }

    /// Time left until due; zero when already due.
    pub fn due_in(&self, now: DateTime<Utc>) -> Duration {
        (self.next_review - now).max(Duration::zero())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Folder {
    pub id: FolderId,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl Folder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            created_at: Utc::now(),
        }
    }
}

/// Editable, user-facing part of a card.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CardContent {
    pub word: String,
    #[serde(default)]
    pub pronunciation: String,
    #[serde(default)]
    pub meaning: String,
    #[serde(default)]
    pub synonyms: String,
    #[serde(default)]
    pub examples: Vec<String>,
}

impl CardContent {
    pub fn new(word: impl Into<String>, meaning: impl Into<String>) -> Self {
        Self {
            word: word.into(),
            meaning: meaning.into(),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if self.word.trim().is_empty() {
            return Err(CoreError::Invalid("word must not be empty"));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Card {
    pub id: CardId,
    pub folder_id: FolderId,
    #[serde(flatten)]
    pub content: CardContent,
    pub schedule: SchedulingState,
    /// Bumped on every successful write; guards concurrent updates.
    #[serde(default)]
    pub version: u64,
    pub created_at: DateTime<Utc>,
}

impl Card {
    pub fn new(folder_id: FolderId, content: CardContent) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            folder_id,
            content,
            schedule: SchedulingState::new_at(now),
            version: 0,
            created_at: now,
        }
    }

    pub fn is_new(&self) -> bool {
        self.schedule.last_reviewed.is_none()
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.schedule.is_due(now)
    }

    pub fn stage(&self) -> Stage {
        self.schedule.stage()
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Review {
    pub id: ReviewId,
    pub card_id: CardId,
    pub rating: Rating,
    pub reviewed_at: DateTime<Utc>,
    pub interval_days: u32,
    pub ease_after: f64,
}

impl Review {
    pub fn new(
        card_id: CardId,
        rating: Rating,
        reviewed_at: DateTime<Utc>,
        interval_days: u32,
        ease_after: f64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            card_id,
            rating,
            reviewed_at,
            interval_days,
            ease_after,
        }
    }
}

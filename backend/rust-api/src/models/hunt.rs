use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;
use uuid::Uuid;
use validator::Validate;

use crate::utils::geo::GeoPoint;

/// Validation radius applied when a clue does not specify one.
pub const DEFAULT_RADIUS_M: f64 = 50.0;

fn default_radius_m() -> f64 {
    DEFAULT_RADIUS_M
}

/// Hunt document stored in MongoDB "hunts" collection.
/// Read-only once any session references it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hunt {
    #[serde(rename = "_id")]
    pub id: String,
    pub title: String,
    pub description: String,
    pub organizer_id: String,
    pub difficulty: Difficulty,
    pub status: HuntStatus,
    /// Ordered by `position`.
    pub clues: Vec<Clue>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HuntStatus {
    Draft,
    Published,
}

impl HuntStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HuntStatus::Draft => "draft",
            HuntStatus::Published => "published",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClueType {
    FreeText,
    Riddle,
    Photo,
    Qr,
    Location,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Clue {
    pub id: String,
    /// 1-based, contiguous and unique within the hunt.
    pub position: u32,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
    pub location: GeoPoint,
    #[serde(default = "default_radius_m")]
    pub radius_m: f64,
    pub points: u32,
    pub clue_type: ClueType,
    /// Expected answer, only meaningful for riddles.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
}

impl Clue {
    /// Every clue type except riddles has to be solved on site.
    pub fn requires_presence(&self) -> bool {
        self.clue_type != ClueType::Riddle
    }

    pub fn hint_text(&self) -> Option<&str> {
        self.hint
            .as_deref()
            .map(str::trim)
            .filter(|hint| !hint.is_empty())
    }

    /// Case-insensitive comparison after trimming both sides.
    pub fn answer_matches(&self, submitted: &str) -> bool {
        match self.answer.as_deref() {
            Some(expected) => normalize_answer(expected) == normalize_answer(submitted),
            None => false,
        }
    }
}

fn normalize_answer(value: &str) -> String {
    value.trim().to_lowercase()
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum HuntValidationError {
    #[error("hunt must contain at least one clue")]
    NoClues,
    #[error("clue positions must be contiguous starting at 1 (expected {expected}, found {found})")]
    NonContiguousPositions { expected: u32, found: u32 },
    #[error("duplicate clue id {0}")]
    DuplicateClueId(String),
    #[error("riddle clue at position {0} has no answer")]
    MissingRiddleAnswer(u32),
    #[error("clue at position {0} has invalid coordinates")]
    InvalidLocation(u32),
    #[error("clue at position {0} must have a positive radius")]
    InvalidRadius(u32),
}

impl Hunt {
    pub fn clue_count(&self) -> usize {
        self.clues.len()
    }

    pub fn clue_at(&self, index: usize) -> Option<&Clue> {
        self.clues.get(index)
    }

    pub fn total_points(&self) -> u32 {
        self.clues
            .iter()
            .fold(0u32, |total, clue| total.saturating_add(clue.points))
    }

    /// Build a hunt from an authoring request. Clues are ordered by position
    /// and the structure is validated before anything is returned.
    pub fn from_request(
        req: CreateHuntRequest,
        organizer_id: &str,
    ) -> Result<Self, HuntValidationError> {
        let mut clues: Vec<Clue> = req
            .clues
            .into_iter()
            .map(|clue| Clue {
                id: Uuid::new_v4().to_string(),
                position: clue.position,
                text: clue.text,
                hint: clue.hint,
                location: clue.location,
                radius_m: clue.radius_m.unwrap_or(DEFAULT_RADIUS_M),
                points: clue.points,
                clue_type: clue.clue_type,
                answer: clue.answer,
            })
            .collect();
        clues.sort_by_key(|clue| clue.position);

        let hunt = Hunt {
            id: Uuid::new_v4().to_string(),
            title: req.title,
            description: req.description,
            organizer_id: organizer_id.to_string(),
            difficulty: req.difficulty.unwrap_or(Difficulty::Medium),
            status: if req.publish {
                HuntStatus::Published
            } else {
                HuntStatus::Draft
            },
            clues,
            created_at: Utc::now(),
        };

        hunt.validate_structure()?;
        Ok(hunt)
    }

    /// Checks the invariants the progress engine relies on.
    pub fn validate_structure(&self) -> Result<(), HuntValidationError> {
        if self.clues.is_empty() {
            return Err(HuntValidationError::NoClues);
        }

        let mut seen_ids = HashSet::new();
        for (index, clue) in self.clues.iter().enumerate() {
            let expected = index as u32 + 1;
            if clue.position != expected {
                return Err(HuntValidationError::NonContiguousPositions {
                    expected,
                    found: clue.position,
                });
            }
            if !seen_ids.insert(clue.id.as_str()) {
                return Err(HuntValidationError::DuplicateClueId(clue.id.clone()));
            }
            if !clue.location.is_valid() {
                return Err(HuntValidationError::InvalidLocation(clue.position));
            }
            if !(clue.radius_m.is_finite() && clue.radius_m > 0.0) {
                return Err(HuntValidationError::InvalidRadius(clue.position));
            }
            if clue.clue_type == ClueType::Riddle
                && clue
                    .answer
                    .as_deref()
                    .map(|answer| answer.trim().is_empty())
                    .unwrap_or(true)
            {
                return Err(HuntValidationError::MissingRiddleAnswer(clue.position));
            }
        }

        Ok(())
    }

    pub fn summary(&self) -> HuntSummary {
        HuntSummary {
            id: self.id.clone(),
            title: self.title.clone(),
            description: self.description.clone(),
            difficulty: self.difficulty,
            clue_count: self.clue_count(),
            total_points: self.total_points(),
        }
    }

    /// Player-facing view: hint texts and riddle answers are withheld.
    pub fn view(&self) -> HuntView {
        HuntView {
            id: self.id.clone(),
            title: self.title.clone(),
            description: self.description.clone(),
            difficulty: self.difficulty,
            total_points: self.total_points(),
            clues: self
                .clues
                .iter()
                .map(|clue| ClueView {
                    id: clue.id.clone(),
                    position: clue.position,
                    text: clue.text.clone(),
                    has_hint: clue.hint_text().is_some(),
                    location: clue.location,
                    radius_m: clue.radius_m,
                    points: clue.points,
                    clue_type: clue.clue_type,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HuntSummary {
    pub id: String,
    pub title: String,
    pub description: String,
    pub difficulty: Difficulty,
    pub clue_count: usize,
    pub total_points: u32,
}

#[derive(Debug, Serialize)]
pub struct HuntView {
    pub id: String,
    pub title: String,
    pub description: String,
    pub difficulty: Difficulty,
    pub total_points: u32,
    pub clues: Vec<ClueView>,
}

#[derive(Debug, Serialize)]
pub struct ClueView {
    pub id: String,
    pub position: u32,
    pub text: String,
    pub has_hint: bool,
    pub location: GeoPoint,
    pub radius_m: f64,
    pub points: u32,
    pub clue_type: ClueType,
}

/// Request to author a new hunt (organizers only)
#[derive(Debug, Deserialize, Validate)]
pub struct CreateHuntRequest {
    #[validate(length(
        min = 1,
        max = 120,
        message = "Title must be between 1 and 120 characters"
    ))]
    pub title: String,

    #[validate(length(max = 2000, message = "Description is limited to 2000 characters"))]
    #[serde(default)]
    pub description: String,

    pub difficulty: Option<Difficulty>,

    /// Publish immediately instead of saving a draft
    #[serde(default)]
    pub publish: bool,

    #[validate(length(min = 1, message = "A hunt needs at least one clue"), nested)]
    pub clues: Vec<CreateClueRequest>,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct CreateClueRequest {
    #[validate(range(min = 1, message = "Positions start at 1"))]
    pub position: u32,

    #[validate(length(min = 1, max = 1000, message = "Clue text must not be empty"))]
    pub text: String,

    pub hint: Option<String>,

    pub location: GeoPoint,

    /// Defaults to 50 meters
    #[validate(range(min = 1.0, max = 10000.0, message = "Radius must be 1..=10000 meters"))]
    pub radius_m: Option<f64>,

    #[validate(range(max = 10000, message = "Points are limited to 10000 per clue"))]
    pub points: u32,

    pub clue_type: ClueType,

    pub answer: Option<String>,
}

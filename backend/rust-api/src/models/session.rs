use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::achievement::AchievementGrant;
use crate::utils::geo::GeoPoint;

/// One user's attempt at one hunt, stored in MongoDB "hunt_sessions".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HuntSession {
    #[serde(rename = "_id")]
    pub id: String,
    pub user_id: String,
    pub hunt_id: String,
    /// 0-based index of the clue being worked on.
    pub current_clue_index: usize,
    /// Always as long as `current_clue_index`.
    #[serde(default)]
    pub completed_clues: Vec<CompletedClue>,
    pub score: u32,
    pub elapsed_seconds: u64,
    pub hints_used: u32,
    pub status: SessionStatus,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletedClue {
    pub clue_id: String,
    pub points: u32,
    /// Elapsed session time when the clue was solved.
    pub elapsed_seconds: u64,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Completed,
    Abandoned,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Active => "active",
            SessionStatus::Completed => "completed",
            SessionStatus::Abandoned => "abandoned",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, SessionStatus::Active)
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Read-only projection handed to the achievement evaluator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub score: u32,
    pub elapsed_seconds: u64,
    pub hints_used: u32,
    pub current_clue_index: usize,
    pub clue_count: usize,
    pub status: SessionStatus,
}

#[derive(Debug, Deserialize, Validate)]
pub struct JoinHuntRequest {
    #[validate(length(min = 1, max = 64, message = "hunt_id must not be empty"))]
    pub hunt_id: String,
}

#[derive(Debug, Serialize)]
pub struct JoinHuntResponse {
    /// True when an existing active attempt was picked up again.
    pub resumed: bool,
    pub session: SessionView,
}

#[derive(Debug, Deserialize, Validate)]
pub struct SubmitClueRequest {
    #[validate(length(min = 1, max = 64, message = "clue_id must not be empty"))]
    pub clue_id: String,
    /// Device position, absent when geolocation is unavailable.
    pub position: Option<GeoPoint>,
    #[validate(length(max = 500, message = "Answer is limited to 500 characters"))]
    pub answer: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SubmitClueResponse {
    pub clue_id: String,
    pub points_awarded: u32,
    pub completed: bool,
    pub session: SessionView,
    /// Achievements unlocked by this submission (only on completion).
    pub achievements: Vec<AchievementGrant>,
}

#[derive(Debug, Serialize)]
pub struct UseHintResponse {
    pub hint_text: String,
    pub hints_used: u32,
    pub penalty: u32,
    pub score: u32,
}

/// Session as returned over the API.
#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    pub id: String,
    pub hunt_id: String,
    pub status: SessionStatus,
    pub current_clue_index: usize,
    pub clue_count: usize,
    /// Identifier of the clue to solve next, absent once the session is over.
    pub current_clue_id: Option<String>,
    pub completed_clue_ids: Vec<String>,
    pub score: u32,
    pub elapsed_seconds: u64,
    pub hints_used: u32,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

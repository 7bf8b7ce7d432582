use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::session::SessionStatus;

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ProgressEvent {
    ProgressTick(ProgressTick),
    SessionClosed(SessionClosed),
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ProgressTick {
    pub session_id: String,
    pub elapsed_seconds: u64,
    pub score: u32,
    pub current_clue_index: usize,
    pub clue_count: usize,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SessionClosed {
    pub session_id: String,
    pub status: SessionStatus,
    pub elapsed_seconds: u64,
    pub score: u32,
    pub timestamp: DateTime<Utc>,
}

impl ProgressEvent {
    pub fn to_sse_data(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }

    pub fn event_name(&self) -> &'static str {
        match self {
            ProgressEvent::ProgressTick(_) => "progress-tick",
            ProgressEvent::SessionClosed(_) => "session-closed",
        }
    }
}

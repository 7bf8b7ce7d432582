use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rarity {
    Common,
    Rare,
    Epic,
    Legendary,
}

/// Static achievement metadata.
#[derive(Debug, Clone, Serialize)]
pub struct AchievementDefinition {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub icon: &'static str,
    pub points: u32,
    pub rarity: Rarity,
}

impl AchievementDefinition {
    pub fn grant(&self, unlocked_at: DateTime<Utc>) -> AchievementGrant {
        AchievementGrant {
            achievement_id: self.id.to_string(),
            name: self.name.to_string(),
            description: self.description.to_string(),
            icon: self.icon.to_string(),
            points: self.points,
            rarity: self.rarity,
            unlocked_at,
        }
    }
}

/// An achievement unlocked by a user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AchievementGrant {
    pub achievement_id: String,
    pub name: String,
    pub description: String,
    pub icon: String,
    pub points: u32,
    pub rarity: Rarity,
    pub unlocked_at: DateTime<Utc>,
}

/// What the evaluator knows about a user before the current trigger.
#[derive(Debug, Clone, Default)]
pub struct UserHistory {
    pub unlocked: HashSet<String>,
    /// Hunts completed before the current one.
    pub completed_hunts: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerEvent {
    ClueCompleted,
    HintUsed,
    HuntCompleted,
    HuntAbandoned,
}

#[derive(Debug, Serialize)]
pub struct UserAchievementsResponse {
    pub user_id: String,
    pub total_points: u64,
    pub completed_hunts: u32,
    pub unlocked: Vec<AchievementGrant>,
}

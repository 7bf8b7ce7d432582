use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::sync::Arc;

use super::store::AchievementStore;
use crate::metrics::ACHIEVEMENTS_GRANTED_TOTAL;
use crate::models::{
    AchievementDefinition, AchievementGrant, Rarity, SessionSnapshot, SessionStatus,
    TriggerEvent, UserAchievementsResponse, UserHistory,
};

/// Completing a hunt faster than this unlocks `speed_runner`.
pub const SPEED_RUN_THRESHOLD_SECS: u64 = 300;

pub const FIRST_HUNT: &str = "first_hunt";
pub const SPEED_RUNNER: &str = "speed_runner";
pub const NO_HINTS: &str = "no_hints";
pub const SEASONED_HUNTER: &str = "seasoned_hunter";
pub const LEGENDARY_HUNTER: &str = "legendary_hunter";

pub static CATALOG: &[AchievementDefinition] = &[
    AchievementDefinition {
        id: FIRST_HUNT,
        name: "First Steps",
        description: "Complete your first treasure hunt",
        icon: "footprints",
        points: 50,
        rarity: Rarity::Common,
    },
    AchievementDefinition {
        id: SPEED_RUNNER,
        name: "Speed Runner",
        description: "Complete a hunt in under 5 minutes",
        icon: "stopwatch",
        points: 100,
        rarity: Rarity::Rare,
    },
    AchievementDefinition {
        id: NO_HINTS,
        name: "Self Reliant",
        description: "Complete a hunt without using any hints",
        icon: "brain",
        points: 75,
        rarity: Rarity::Rare,
    },
    AchievementDefinition {
        id: SEASONED_HUNTER,
        name: "Seasoned Hunter",
        description: "Complete 5 treasure hunts",
        icon: "compass",
        points: 150,
        rarity: Rarity::Epic,
    },
    AchievementDefinition {
        id: LEGENDARY_HUNTER,
        name: "Legendary Hunter",
        description: "Complete 20 treasure hunts",
        icon: "crown",
        points: 500,
        rarity: Rarity::Legendary,
    },
];

pub fn definition(id: &str) -> Option<&'static AchievementDefinition> {
    CATALOG.iter().find(|def| def.id == id)
}

type Predicate = fn(&UserHistory, &SessionSnapshot, TriggerEvent) -> bool;

struct Rule {
    achievement_id: &'static str,
    predicate: Predicate,
}

fn completed(snapshot: &SessionSnapshot, trigger: TriggerEvent) -> bool {
    trigger == TriggerEvent::HuntCompleted && snapshot.status == SessionStatus::Completed
}

/// Ordinal of the completion being evaluated (prior completions + this one).
fn completion_ordinal(history: &UserHistory) -> u32 {
    history.completed_hunts.saturating_add(1)
}

static RULES: &[Rule] = &[
    Rule {
        achievement_id: FIRST_HUNT,
        predicate: |history, snapshot, trigger| {
            completed(snapshot, trigger) && completion_ordinal(history) == 1
        },
    },
    Rule {
        achievement_id: SPEED_RUNNER,
        predicate: |_, snapshot, trigger| {
            completed(snapshot, trigger) && snapshot.elapsed_seconds < SPEED_RUN_THRESHOLD_SECS
        },
    },
    Rule {
        achievement_id: NO_HINTS,
        predicate: |_, snapshot, trigger| completed(snapshot, trigger) && snapshot.hints_used == 0,
    },
    Rule {
        achievement_id: SEASONED_HUNTER,
        predicate: |history, snapshot, trigger| {
            completed(snapshot, trigger) && completion_ordinal(history) == 5
        },
    },
    Rule {
        achievement_id: LEGENDARY_HUNTER,
        predicate: |history, snapshot, trigger| {
            completed(snapshot, trigger) && completion_ordinal(history) == 20
        },
    },
];

/// Stateless rule evaluation. Every rule runs on every trigger; rules whose
/// achievement is already in the user's history are dropped.
pub fn evaluate(
    history: &UserHistory,
    snapshot: &SessionSnapshot,
    trigger: TriggerEvent,
    unlocked_at: DateTime<Utc>,
) -> Vec<AchievementGrant> {
    RULES
        .iter()
        .filter(|rule| (rule.predicate)(history, snapshot, trigger))
        .filter(|rule| !history.unlocked.contains(rule.achievement_id))
        .filter_map(|rule| definition(rule.achievement_id))
        .map(|def| def.grant(unlocked_at))
        .collect()
}

/// Persists grants and credits points; the evaluation itself stays pure.
pub struct AchievementService {
    store: Arc<dyn AchievementStore>,
}

impl AchievementService {
    pub fn new(store: Arc<dyn AchievementStore>) -> Self {
        Self { store }
    }

    pub fn catalog(&self) -> &'static [AchievementDefinition] {
        CATALOG
    }

    /// Runs the completion pipeline for a finished session: evaluate, grant
    /// idempotently, credit session score plus bonus points, bump the
    /// completed-hunt counter.
    pub async fn on_hunt_completed(
        &self,
        user_id: &str,
        snapshot: &SessionSnapshot,
    ) -> Result<Vec<AchievementGrant>> {
        let history = self
            .store
            .load_history(user_id)
            .await
            .context("Failed to load achievement history")?;

        let candidates = evaluate(&history, snapshot, TriggerEvent::HuntCompleted, Utc::now());

        let mut granted = Vec::with_capacity(candidates.len());
        for grant in candidates {
            // The store is the final arbiter: a concurrent grant loses here.
            if self.store.grant(user_id, &grant).await? {
                ACHIEVEMENTS_GRANTED_TOTAL
                    .with_label_values(&[grant.achievement_id.as_str()])
                    .inc();
                tracing::info!(
                    "Achievement unlocked: user={}, achievement={}, points={}",
                    user_id,
                    grant.achievement_id,
                    grant.points
                );
                granted.push(grant);
            }
        }

        let bonus: u32 = granted.iter().map(|grant| grant.points).sum();
        let total = self
            .store
            .credit_points(user_id, snapshot.score.saturating_add(bonus))
            .await
            .context("Failed to credit points")?;
        let completed_hunts = self
            .store
            .record_completion(user_id)
            .await
            .context("Failed to record hunt completion")?;

        tracing::info!(
            "Hunt completion recorded: user={}, completed_hunts={}, total_points={}",
            user_id,
            completed_hunts,
            total
        );

        Ok(granted)
    }

    pub async fn user_summary(&self, user_id: &str) -> Result<UserAchievementsResponse> {
        let mut unlocked = self.store.unlocked(user_id).await?;
        unlocked.sort_by_key(|grant| grant.unlocked_at);
        let history = self.store.load_history(user_id).await?;
        let total_points = self.store.total_points(user_id).await?;

        Ok(UserAchievementsResponse {
            user_id: user_id.to_string(),
            total_points,
            completed_hunts: history.completed_hunts,
            unlocked,
        })
    }
}

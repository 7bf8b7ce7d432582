use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

use super::{AchievementStore, HuntRepository, SessionStore};
use crate::models::{AchievementGrant, Hunt, HuntSession, HuntStatus, SessionStatus, UserHistory};

#[derive(Default)]
struct UserLedger {
    achievements: HashMap<String, AchievementGrant>,
    points: u64,
    completed_hunts: u32,
}

/// Process-local implementation of every store trait. Used by tests and by
/// local runs without MongoDB/Redis. `set_unavailable(true)` makes every
/// call fail, which simulates a backend outage.
#[derive(Default)]
pub struct InMemoryStore {
    hunts: RwLock<HashMap<String, Hunt>>,
    sessions: RwLock<HashMap<String, HuntSession>>,
    users: RwLock<HashMap<String, UserLedger>>,
    unavailable: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(anyhow!("In-memory store is marked unavailable"));
        }
        Ok(())
    }

    /// Pretend the user already finished `count` hunts.
    pub async fn seed_completed_hunts(&self, user_id: &str, count: u32) {
        let mut users = self.users.write().await;
        users.entry(user_id.to_string()).or_default().completed_hunts = count;
    }
}

#[async_trait]
impl HuntRepository for InMemoryStore {
    async fn list_published(&self) -> Result<Vec<Hunt>> {
        self.check_available()?;
        let hunts = self.hunts.read().await;
        let mut published: Vec<Hunt> = hunts
            .values()
            .filter(|hunt| hunt.status == HuntStatus::Published)
            .cloned()
            .collect();
        published.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(published)
    }

    async fn get(&self, hunt_id: &str) -> Result<Option<Hunt>> {
        self.check_available()?;
        Ok(self.hunts.read().await.get(hunt_id).cloned())
    }

    async fn insert(&self, hunt: &Hunt) -> Result<()> {
        self.check_available()?;
        let mut hunts = self.hunts.write().await;
        if hunts.contains_key(&hunt.id) {
            return Err(anyhow!("Hunt {} already exists", hunt.id));
        }
        hunts.insert(hunt.id.clone(), hunt.clone());
        Ok(())
    }
}

#[async_trait]
impl SessionStore for InMemoryStore {
    async fn find_active(&self, user_id: &str, hunt_id: &str) -> Result<Option<HuntSession>> {
        self.check_available()?;
        Ok(self
            .sessions
            .read()
            .await
            .values()
            .find(|session| {
                session.user_id == user_id
                    && session.hunt_id == hunt_id
                    && session.status == SessionStatus::Active
            })
            .cloned())
    }

    async fn get(&self, session_id: &str) -> Result<Option<HuntSession>> {
        self.check_available()?;
        Ok(self.sessions.read().await.get(session_id).cloned())
    }

    async fn save(&self, session: &HuntSession) -> Result<()> {
        self.check_available()?;
        self.sessions
            .write()
            .await
            .insert(session.id.clone(), session.clone());
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        self.check_available()
    }
}

#[async_trait]
impl AchievementStore for InMemoryStore {
    async fn load_history(&self, user_id: &str) -> Result<UserHistory> {
        self.check_available()?;
        let users = self.users.read().await;
        Ok(users
            .get(user_id)
            .map(|ledger| UserHistory {
                unlocked: ledger.achievements.keys().cloned().collect(),
                completed_hunts: ledger.completed_hunts,
            })
            .unwrap_or_default())
    }

    async fn unlocked(&self, user_id: &str) -> Result<Vec<AchievementGrant>> {
        self.check_available()?;
        let users = self.users.read().await;
        Ok(users
            .get(user_id)
            .map(|ledger| ledger.achievements.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn grant(&self, user_id: &str, grant: &AchievementGrant) -> Result<bool> {
        self.check_available()?;
        let mut users = self.users.write().await;
        let ledger = users.entry(user_id.to_string()).or_default();
        if ledger.achievements.contains_key(&grant.achievement_id) {
            return Ok(false);
        }
        ledger
            .achievements
            .insert(grant.achievement_id.clone(), grant.clone());
        Ok(true)
    }

    async fn credit_points(&self, user_id: &str, points: u32) -> Result<u64> {
        self.check_available()?;
        let mut users = self.users.write().await;
        let ledger = users.entry(user_id.to_string()).or_default();
        ledger.points += u64::from(points);
        Ok(ledger.points)
    }

    async fn total_points(&self, user_id: &str) -> Result<u64> {
        self.check_available()?;
        let users = self.users.read().await;
        Ok(users.get(user_id).map(|ledger| ledger.points).unwrap_or(0))
    }

    async fn record_completion(&self, user_id: &str) -> Result<u32> {
        self.check_available()?;
        let mut users = self.users.write().await;
        let ledger = users.entry(user_id.to_string()).or_default();
        ledger.completed_hunts += 1;
        Ok(ledger.completed_hunts)
    }

    async fn ping(&self) -> Result<()> {
        self.check_available()
    }
}

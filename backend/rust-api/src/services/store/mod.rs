//! Persistence seams. The engine never talks to a database directly; the
//! services receive these traits at construction time.

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{AchievementGrant, Hunt, HuntSession, UserHistory};

pub mod memory;
pub mod mongo;
pub mod redis_store;

pub use memory::InMemoryStore;
pub use mongo::{MongoHuntRepository, MongoSessionStore};
pub use redis_store::RedisAchievementStore;

#[async_trait]
pub trait HuntRepository: Send + Sync {
    async fn list_published(&self) -> Result<Vec<Hunt>>;

    async fn get(&self, hunt_id: &str) -> Result<Option<Hunt>>;

    async fn insert(&self, hunt: &Hunt) -> Result<()>;
}

/// Durable copy of sessions. `save` is an unconditional overwrite
/// (last writer wins).
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn find_active(&self, user_id: &str, hunt_id: &str) -> Result<Option<HuntSession>>;

    async fn get(&self, session_id: &str) -> Result<Option<HuntSession>>;

    async fn save(&self, session: &HuntSession) -> Result<()>;

    async fn ping(&self) -> Result<()>;
}

#[async_trait]
pub trait AchievementStore: Send + Sync {
    async fn load_history(&self, user_id: &str) -> Result<UserHistory>;

    async fn unlocked(&self, user_id: &str) -> Result<Vec<AchievementGrant>>;

    /// Returns false when the user already holds the achievement.
    async fn grant(&self, user_id: &str, grant: &AchievementGrant) -> Result<bool>;

    /// Adds to the user's point total and returns the new total.
    async fn credit_points(&self, user_id: &str, points: u32) -> Result<u64>;

    async fn total_points(&self, user_id: &str) -> Result<u64>;

    /// Increments the completed-hunt counter and returns the new count.
    async fn record_completion(&self, user_id: &str) -> Result<u32>;

    async fn ping(&self) -> Result<()>;
}

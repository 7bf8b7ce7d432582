use anyhow::{Context, Result};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use std::collections::HashMap;

use super::AchievementStore;
use crate::metrics::track_cache_operation;
use crate::models::{AchievementGrant, UserHistory};

/// User achievement ledger kept in Redis:
/// - `user:achievements:{id}` hash of achievement id -> grant JSON
/// - `user:points:{id}` running point total
/// - `user:hunts_completed:{id}` completed hunt counter
pub struct RedisAchievementStore {
    redis: ConnectionManager,
}

impl RedisAchievementStore {
    pub fn new(redis: ConnectionManager) -> Self {
        Self { redis }
    }

    fn achievements_key(user_id: &str) -> String {
        format!("user:achievements:{}", user_id)
    }

    fn points_key(user_id: &str) -> String {
        format!("user:points:{}", user_id)
    }

    fn completed_key(user_id: &str) -> String {
        format!("user:hunts_completed:{}", user_id)
    }
}

#[async_trait]
impl AchievementStore for RedisAchievementStore {
    async fn load_history(&self, user_id: &str) -> Result<UserHistory> {
        let mut conn = self.redis.clone();

        let unlocked: Vec<String> = redis::cmd("HKEYS")
            .arg(Self::achievements_key(user_id))
            .query_async(&mut conn)
            .await
            .context("Failed to read unlocked achievements")?;

        let completed_hunts: Option<u32> = redis::cmd("GET")
            .arg(Self::completed_key(user_id))
            .query_async(&mut conn)
            .await
            .context("Failed to read completed hunt counter")?;

        Ok(UserHistory {
            unlocked: unlocked.into_iter().collect(),
            completed_hunts: completed_hunts.unwrap_or(0),
        })
    }

    async fn unlocked(&self, user_id: &str) -> Result<Vec<AchievementGrant>> {
        let mut conn = self.redis.clone();

        let raw: HashMap<String, String> = redis::cmd("HGETALL")
            .arg(Self::achievements_key(user_id))
            .query_async(&mut conn)
            .await
            .context("Failed to read achievements")?;

        let mut grants = Vec::with_capacity(raw.len());
        for (achievement_id, json) in raw {
            match serde_json::from_str::<AchievementGrant>(&json) {
                Ok(grant) => grants.push(grant),
                Err(e) => tracing::warn!(
                    "Skipping unreadable achievement {} for user {}: {}",
                    achievement_id,
                    user_id,
                    e
                ),
            }
        }

        Ok(grants)
    }

    async fn grant(&self, user_id: &str, grant: &AchievementGrant) -> Result<bool> {
        let mut conn = self.redis.clone();
        let json = serde_json::to_string(grant).context("Failed to serialize achievement")?;
        let key = Self::achievements_key(user_id);

        // HSETNX keeps the first grant and reports whether this one was new
        let inserted: i64 = track_cache_operation("hsetnx", async {
            redis::cmd("HSETNX")
                .arg(&key)
                .arg(&grant.achievement_id)
                .arg(&json)
                .query_async(&mut conn)
                .await
                .context("Failed to store achievement")
        })
        .await?;

        Ok(inserted == 1)
    }

    async fn credit_points(&self, user_id: &str, points: u32) -> Result<u64> {
        let mut conn = self.redis.clone();
        let key = Self::points_key(user_id);

        let total: i64 = track_cache_operation("incrby", async {
            redis::cmd("INCRBY")
                .arg(&key)
                .arg(points)
                .query_async(&mut conn)
                .await
                .context("Failed to credit points")
        })
        .await?;

        Ok(total.max(0) as u64)
    }

    async fn total_points(&self, user_id: &str) -> Result<u64> {
        let mut conn = self.redis.clone();

        let total: Option<u64> = redis::cmd("GET")
            .arg(Self::points_key(user_id))
            .query_async(&mut conn)
            .await
            .context("Failed to read point total")?;

        Ok(total.unwrap_or(0))
    }

    async fn record_completion(&self, user_id: &str) -> Result<u32> {
        let mut conn = self.redis.clone();
        let key = Self::completed_key(user_id);

        track_cache_operation("incr", async {
            redis::cmd("INCR")
                .arg(&key)
                .query_async::<u32>(&mut conn)
                .await
                .context("Failed to increment completed hunts")
        })
        .await
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self.redis.clone();
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .context("Redis ping failed")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_layout() {
        assert_eq!(
            RedisAchievementStore::achievements_key("u1"),
            "user:achievements:u1"
        );
        assert_eq!(RedisAchievementStore::points_key("u1"), "user:points:u1");
        assert_eq!(
            RedisAchievementStore::completed_key("u1"),
            "user:hunts_completed:u1"
        );
    }
}

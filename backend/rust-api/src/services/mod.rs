use std::sync::Arc;

use crate::config::Config;
use mongodb::Client as MongoClient;
use redis::aio::ConnectionManager;

use self::{
    achievement_service::AchievementService,
    hunt_service::HuntService,
    proximity::{HaversineOracle, ProximityOracle},
    session_service::SessionService,
    store::{
        AchievementStore, HuntRepository, MongoHuntRepository, MongoSessionStore,
        RedisAchievementStore, SessionStore,
    },
};

pub struct AppState {
    pub config: Config,
    pub hunts: Arc<HuntService>,
    pub sessions: Arc<SessionService>,
    pub achievements: Arc<AchievementService>,
    pub session_store: Arc<dyn SessionStore>,
    pub achievement_store: Arc<dyn AchievementStore>,
}

impl AppState {
    pub async fn new(
        config: Config,
        mongo_client: MongoClient,
        redis_client: redis::Client,
    ) -> anyhow::Result<Self> {
        let mongo = mongo_client.database(&config.mongo_database);

        tracing::info!("Attempting to connect to Redis...");

        let redis = tokio::time::timeout(
            std::time::Duration::from_secs(30),
            ConnectionManager::new(redis_client),
        )
        .await
        .map_err(|_| anyhow::anyhow!("Redis connection timeout after 30s"))??;

        tracing::info!("Redis ConnectionManager created, testing with PING...");

        let mut conn = redis.clone();
        tokio::time::timeout(
            std::time::Duration::from_secs(5),
            redis::cmd("PING").query_async::<String>(&mut conn),
        )
        .await
        .map_err(|_| anyhow::anyhow!("Redis PING timeout after 5s"))??;

        tracing::info!("Redis connection established successfully");

        Ok(Self::with_stores(
            config,
            Arc::new(MongoHuntRepository::new(&mongo)),
            Arc::new(MongoSessionStore::new(mongo)),
            Arc::new(RedisAchievementStore::new(redis)),
            Arc::new(HaversineOracle),
        ))
    }

    /// Wire the services over arbitrary store implementations.
    pub fn with_stores(
        config: Config,
        hunt_repo: Arc<dyn HuntRepository>,
        session_store: Arc<dyn SessionStore>,
        achievement_store: Arc<dyn AchievementStore>,
        oracle: Arc<dyn ProximityOracle>,
    ) -> Self {
        let hunts = Arc::new(HuntService::new(hunt_repo));
        let achievements = Arc::new(AchievementService::new(achievement_store.clone()));
        let sessions = Arc::new(
            SessionService::new(
                hunts.clone(),
                achievements.clone(),
                session_store.clone(),
                oracle,
            )
            .with_idle_eviction(config.sync.idle_eviction_secs),
        );

        Self {
            config,
            hunts,
            sessions,
            achievements,
            session_store,
            achievement_store,
        }
    }
}

pub mod achievement_service;
pub mod hunt_service;
pub mod progress_engine;
pub mod proximity;
pub mod session_service;
pub mod store;
pub mod sync_worker;

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::{
    bson::doc,
    options::{FindOptions, ReplaceOptions},
    Collection, Database,
};

use super::{HuntRepository, SessionStore};
use crate::metrics::track_db_operation;
use crate::models::{Hunt, HuntSession, HuntStatus, SessionStatus};

const HUNTS_COLLECTION: &str = "hunts";
const SESSIONS_COLLECTION: &str = "hunt_sessions";

pub struct MongoHuntRepository {
    hunts: Collection<Hunt>,
}

impl MongoHuntRepository {
    pub fn new(mongo: &Database) -> Self {
        Self {
            hunts: mongo.collection(HUNTS_COLLECTION),
        }
    }
}

#[async_trait]
impl HuntRepository for MongoHuntRepository {
    async fn list_published(&self) -> Result<Vec<Hunt>> {
        track_db_operation("find", HUNTS_COLLECTION, async {
            let options = FindOptions::builder()
                .sort(doc! { "created_at": -1 })
                .limit(200)
                .build();

            let cursor = self
                .hunts
                .find(doc! { "status": HuntStatus::Published.as_str() })
                .with_options(options)
                .await
                .context("Failed to query hunts")?;

            cursor
                .try_collect::<Vec<Hunt>>()
                .await
                .context("Hunt cursor error")
        })
        .await
    }

    async fn get(&self, hunt_id: &str) -> Result<Option<Hunt>> {
        track_db_operation("find_one", HUNTS_COLLECTION, async {
            self.hunts
                .find_one(doc! { "_id": hunt_id })
                .await
                .context("Failed to query hunt")
        })
        .await
    }

    async fn insert(&self, hunt: &Hunt) -> Result<()> {
        track_db_operation("insert_one", HUNTS_COLLECTION, async {
            self.hunts
                .insert_one(hunt)
                .await
                .context("Failed to insert hunt")?;
            Ok(())
        })
        .await
    }
}

pub struct MongoSessionStore {
    mongo: Database,
    sessions: Collection<HuntSession>,
}

impl MongoSessionStore {
    pub fn new(mongo: Database) -> Self {
        let sessions = mongo.collection(SESSIONS_COLLECTION);
        Self { mongo, sessions }
    }
}

#[async_trait]
impl SessionStore for MongoSessionStore {
    async fn find_active(&self, user_id: &str, hunt_id: &str) -> Result<Option<HuntSession>> {
        track_db_operation("find_one", SESSIONS_COLLECTION, async {
            self.sessions
                .find_one(doc! {
                    "user_id": user_id,
                    "hunt_id": hunt_id,
                    "status": SessionStatus::Active.as_str(),
                })
                .await
                .context("Failed to query active session")
        })
        .await
    }

    async fn get(&self, session_id: &str) -> Result<Option<HuntSession>> {
        track_db_operation("find_one", SESSIONS_COLLECTION, async {
            self.sessions
                .find_one(doc! { "_id": session_id })
                .await
                .context("Failed to query session")
        })
        .await
    }

    async fn save(&self, session: &HuntSession) -> Result<()> {
        track_db_operation("replace_one", SESSIONS_COLLECTION, async {
            self.sessions
                .replace_one(doc! { "_id": &session.id }, session)
                .with_options(ReplaceOptions::builder().upsert(true).build())
                .await
                .context("Failed to save session")?;
            Ok(())
        })
        .await
    }

    async fn ping(&self) -> Result<()> {
        self.mongo
            .run_command(doc! { "ping": 1 })
            .await
            .context("MongoDB ping failed")?;
        Ok(())
    }
}

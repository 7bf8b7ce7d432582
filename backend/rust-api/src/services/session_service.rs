use anyhow::Result;
use chrono::{Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};

use super::achievement_service::AchievementService;
use super::hunt_service::HuntService;
use super::progress_engine::{HuntProgressEngine, TransitionRejection};
use super::proximity::ProximityOracle;
use super::store::SessionStore;
use crate::config::DEFAULT_IDLE_EVICTION_SECS;
use crate::metrics::{
    CLUE_SUBMISSIONS_TOTAL, HINTS_USED_TOTAL, SESSIONS_ACTIVE, SESSIONS_TOTAL,
    SESSION_SYNC_FAILURES_TOTAL,
};
use crate::models::{
    HuntSession, HuntStatus, JoinHuntResponse, SessionStatus, SessionView, SubmitClueRequest,
    SubmitClueResponse, UseHintResponse,
};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Session not found")]
    NotFound,
    #[error("Hunt not found")]
    HuntNotFound,
    #[error("Session belongs to another user")]
    Forbidden,
    #[error(transparent)]
    Rejected(#[from] TransitionRejection),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

struct LiveSession {
    user_id: String,
    hunt_id: String,
    engine: Arc<Mutex<HuntProgressEngine>>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FlushReport {
    pub flushed: usize,
    pub failed: usize,
    pub evicted: usize,
}

/// Owns the in-memory engines of sessions being played.
///
/// The store is read when a session is attached and written after every
/// mutating transition and on each periodic flush. Write failures are
/// logged and dropped; the in-memory engine stays authoritative.
pub struct SessionService {
    hunts: Arc<HuntService>,
    achievements: Arc<AchievementService>,
    store: Arc<dyn SessionStore>,
    oracle: Arc<dyn ProximityOracle>,
    live: RwLock<HashMap<String, LiveSession>>,
    idle_after: Duration,
}

impl SessionService {
    pub fn new(
        hunts: Arc<HuntService>,
        achievements: Arc<AchievementService>,
        store: Arc<dyn SessionStore>,
        oracle: Arc<dyn ProximityOracle>,
    ) -> Self {
        Self {
            hunts,
            achievements,
            store,
            oracle,
            live: RwLock::new(HashMap::new()),
            idle_after: Duration::seconds(DEFAULT_IDLE_EVICTION_SECS as i64),
        }
    }

    /// Active sessions without a player action for `secs` are dropped from
    /// memory after their next successful flush.
    pub fn with_idle_eviction(mut self, secs: u64) -> Self {
        self.idle_after = Duration::seconds(i64::from(u32::try_from(secs).unwrap_or(u32::MAX)));
        self
    }

    /// Join a hunt, resuming the user's active attempt if one exists.
    pub async fn join_hunt(
        &self,
        user_id: &str,
        hunt_id: &str,
    ) -> Result<JoinHuntResponse, SessionError> {
        if let Some(engine) = self.find_live_active(user_id, hunt_id).await {
            let engine = engine.lock().await;
            SESSIONS_TOTAL.with_label_values(&["resumed"]).inc();
            tracing::info!(
                "Resuming live session {} for user={}, hunt={}",
                engine.session().id,
                user_id,
                hunt_id
            );
            return Ok(JoinHuntResponse {
                resumed: true,
                session: engine.view(),
            });
        }

        // Drafts are only visible to their authors
        let hunt = Arc::new(
            self.hunts
                .get_hunt(hunt_id)
                .await
                .filter(|hunt| hunt.status == HuntStatus::Published)
                .ok_or(SessionError::HuntNotFound)?,
        );

        let stored = match self.store.find_active(user_id, hunt_id).await {
            Ok(stored) => stored,
            Err(e) => {
                SESSION_SYNC_FAILURES_TOTAL
                    .with_label_values(&["read"])
                    .inc();
                tracing::warn!(
                    "Failed to look up active session for user={}, hunt={}: {}",
                    user_id,
                    hunt_id,
                    e
                );
                None
            }
        };

        let (engine, resumed) = match stored {
            Some(session) => {
                SESSIONS_TOTAL.with_label_values(&["resumed"]).inc();
                tracing::info!(
                    "Resuming stored session {} for user={}, hunt={}",
                    session.id,
                    user_id,
                    hunt_id
                );
                let mut engine = HuntProgressEngine::attach(session, hunt, self.oracle.clone())?;
                engine.touch();
                (engine, true)
            }
            None => {
                let engine = HuntProgressEngine::start(user_id, hunt, self.oracle.clone());
                self.persist(engine.session()).await;
                SESSIONS_TOTAL.with_label_values(&["created"]).inc();
                tracing::info!(
                    "Session created: {} for user={}, hunt={}",
                    engine.session().id,
                    user_id,
                    hunt_id
                );
                (engine, false)
            }
        };

        // An engine already live under the same id stays authoritative
        let view = self.register(engine).await.lock().await.view();
        Ok(JoinHuntResponse {
            resumed,
            session: view,
        })
    }

    pub async fn get_session(
        &self,
        session_id: &str,
        user_id: &str,
    ) -> Result<SessionView, SessionError> {
        let engine = self.load(session_id).await?;
        let engine = engine.lock().await;
        ensure_owner(engine.session(), user_id)?;
        Ok(engine.view())
    }

    pub async fn submit_clue(
        &self,
        session_id: &str,
        user_id: &str,
        req: &SubmitClueRequest,
    ) -> Result<SubmitClueResponse, SessionError> {
        let engine = self.load(session_id).await?;
        let mut engine = engine.lock().await;
        ensure_owner(engine.session(), user_id)?;

        let outcome = match engine.submit_clue(&req.clue_id, req.position, req.answer.as_deref())
        {
            Ok(outcome) => outcome,
            Err(rejection) => {
                CLUE_SUBMISSIONS_TOTAL
                    .with_label_values(&[rejection.code()])
                    .inc();
                tracing::warn!(
                    "Clue submission rejected: session={}, clue={}, reason={}",
                    session_id,
                    req.clue_id,
                    rejection
                );
                return Err(rejection.into());
            }
        };

        CLUE_SUBMISSIONS_TOTAL
            .with_label_values(&["accepted"])
            .inc();
        tracing::info!(
            "Clue solved: session={}, clue={}, points={}, score={}",
            session_id,
            outcome.clue_id,
            outcome.points_awarded,
            outcome.score
        );

        self.persist(engine.session()).await;

        let achievements = if outcome.completed {
            SESSIONS_TOTAL.with_label_values(&["completed"]).inc();
            SESSIONS_ACTIVE.dec();
            tracing::info!(
                "Session completed: {} (score={}, elapsed={}s, hints={})",
                session_id,
                engine.session().score,
                engine.session().elapsed_seconds,
                engine.session().hints_used
            );

            match self
                .achievements
                .on_hunt_completed(user_id, &engine.snapshot())
                .await
            {
                Ok(grants) => grants,
                Err(e) => {
                    tracing::error!(
                        "Failed to process achievements for session {}: {:#}",
                        session_id,
                        e
                    );
                    Vec::new()
                }
            }
        } else {
            Vec::new()
        };

        Ok(SubmitClueResponse {
            clue_id: outcome.clue_id,
            points_awarded: outcome.points_awarded,
            completed: outcome.completed,
            session: engine.view(),
            achievements,
        })
    }

    pub async fn use_hint(
        &self,
        session_id: &str,
        user_id: &str,
    ) -> Result<UseHintResponse, SessionError> {
        let engine = self.load(session_id).await?;
        let mut engine = engine.lock().await;
        ensure_owner(engine.session(), user_id)?;

        let outcome = engine.use_hint().map_err(|rejection| {
            tracing::warn!(
                "Hint rejected: session={}, reason={}",
                session_id,
                rejection
            );
            rejection
        })?;

        HINTS_USED_TOTAL.inc();
        tracing::info!(
            "Hint used: session={}, hints_used={}, penalty={}, score={}",
            session_id,
            outcome.hints_used,
            outcome.penalty,
            outcome.score
        );

        self.persist(engine.session()).await;

        Ok(UseHintResponse {
            hint_text: outcome.hint_text,
            hints_used: outcome.hints_used,
            penalty: outcome.penalty,
            score: outcome.score,
        })
    }

    pub async fn abandon(&self, session_id: &str, user_id: &str) -> Result<SessionView, SessionError> {
        let engine = self.load(session_id).await?;
        let mut engine = engine.lock().await;
        ensure_owner(engine.session(), user_id)?;

        engine.abandon()?;

        SESSIONS_TOTAL.with_label_values(&["abandoned"]).inc();
        SESSIONS_ACTIVE.dec();
        tracing::info!(
            "Session abandoned: {} at clue {} (score={})",
            session_id,
            engine.session().current_clue_index,
            engine.session().score
        );

        self.persist(engine.session()).await;
        Ok(engine.view())
    }

    /// Advance elapsed time of every live active session by one second.
    pub async fn tick_all(&self) -> usize {
        let engines = self.live_engines().await;
        let mut ticked = 0;
        for engine in engines {
            if engine.lock().await.tick() {
                ticked += 1;
            }
        }
        ticked
    }

    /// Overwrite the stored copy of every live session with the in-memory
    /// one. Sessions that reached a terminal state are dropped from memory
    /// once written.
    pub async fn flush_all(&self) -> FlushReport {
        let mut report = FlushReport::default();
        let mut finished = Vec::new();
        let mut idle = Vec::new();

        for engine in self.live_engines().await {
            let engine = engine.lock().await;
            let session = engine.session();
            match self.store.save(session).await {
                Ok(()) => {
                    report.flushed += 1;
                    if session.status.is_terminal() {
                        finished.push(session.id.clone());
                    } else if self.is_idle(session) {
                        idle.push(session.id.clone());
                    }
                }
                Err(e) => {
                    report.failed += 1;
                    SESSION_SYNC_FAILURES_TOTAL
                        .with_label_values(&["flush"])
                        .inc();
                    tracing::warn!("Periodic flush of session {} failed: {}", session.id, e);
                }
            }
        }

        if !finished.is_empty() || !idle.is_empty() {
            let mut live = self.live.write().await;
            for session_id in finished {
                if live.remove(&session_id).is_some() {
                    report.evicted += 1;
                }
            }
            for session_id in idle {
                // Skip engines picked up again since the flush
                let still_idle = live.get(&session_id).is_some_and(|entry| {
                    entry.engine.try_lock().is_ok_and(|engine| {
                        engine.status() == SessionStatus::Active && self.is_idle(engine.session())
                    })
                });
                if still_idle && live.remove(&session_id).is_some() {
                    SESSIONS_ACTIVE.dec();
                    report.evicted += 1;
                    tracing::debug!("Evicted idle session {}", session_id);
                }
            }
        }

        report
    }

    fn is_idle(&self, session: &HuntSession) -> bool {
        Utc::now() - session.updated_at >= self.idle_after
    }

    pub async fn live_count(&self) -> usize {
        self.live.read().await.len()
    }

    async fn live_engines(&self) -> Vec<Arc<Mutex<HuntProgressEngine>>> {
        self.live
            .read()
            .await
            .values()
            .map(|live| live.engine.clone())
            .collect()
    }

    async fn find_live_active(
        &self,
        user_id: &str,
        hunt_id: &str,
    ) -> Option<Arc<Mutex<HuntProgressEngine>>> {
        let candidates: Vec<_> = self
            .live
            .read()
            .await
            .values()
            .filter(|entry| entry.user_id == user_id && entry.hunt_id == hunt_id)
            .map(|entry| entry.engine.clone())
            .collect();

        // Terminal attempts stay in memory until flushed; skip them
        for engine in candidates {
            if engine.lock().await.status() == SessionStatus::Active {
                return Some(engine);
            }
        }
        None
    }

    async fn register(&self, engine: HuntProgressEngine) -> Arc<Mutex<HuntProgressEngine>> {
        let session = engine.session();
        let session_id = session.id.clone();
        let active = session.status == SessionStatus::Active;
        let entry = LiveSession {
            user_id: session.user_id.clone(),
            hunt_id: session.hunt_id.clone(),
            engine: Arc::new(Mutex::new(engine)),
        };
        let handle = entry.engine.clone();

        let mut live = self.live.write().await;
        if let Some(existing) = live.get(&session_id) {
            return existing.engine.clone();
        }
        live.insert(session_id, entry);
        if active {
            SESSIONS_ACTIVE.inc();
        }
        handle
    }

    /// Live engine for `session_id`, attaching it from the store on a miss.
    async fn load(&self, session_id: &str) -> Result<Arc<Mutex<HuntProgressEngine>>, SessionError> {
        if let Some(entry) = self.live.read().await.get(session_id) {
            return Ok(entry.engine.clone());
        }

        let session = self
            .store
            .get(session_id)
            .await?
            .ok_or(SessionError::NotFound)?;

        let hunt = self
            .hunts
            .get_hunt(&session.hunt_id)
            .await
            .ok_or(SessionError::HuntNotFound)?;

        tracing::debug!("Attaching stored session {} to memory", session_id);
        let engine = HuntProgressEngine::attach(session, Arc::new(hunt), self.oracle.clone())?;
        Ok(self.register(engine).await)
    }

    async fn persist(&self, session: &HuntSession) {
        if let Err(e) = self.store.save(session).await {
            SESSION_SYNC_FAILURES_TOTAL
                .with_label_values(&["write"])
                .inc();
            tracing::warn!(
                "Failed to persist session {} (keeping in-memory state): {}",
                session.id,
                e
            );
        }
    }
}

fn ensure_owner(session: &HuntSession, user_id: &str) -> Result<(), SessionError> {
    if session.user_id != user_id {
        tracing::warn!(
            "User {} attempted to access session {} owned by {}",
            user_id,
            session.id,
            session.user_id
        );
        return Err(SessionError::Forbidden);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::proximity::HaversineOracle;
    use crate::services::store::{HuntRepository, InMemoryStore};
    use crate::utils::geo::GeoPoint;

    const COURTYARD: GeoPoint = GeoPoint {
        lat: 48.8611,
        lng: 2.3358,
    };

    fn service(store: Arc<InMemoryStore>) -> SessionService {
        SessionService::new(
            Arc::new(HuntService::new(store.clone())),
            Arc::new(AchievementService::new(store.clone())),
            store,
            Arc::new(HaversineOracle),
        )
    }

    fn submit(clue_id: &str, position: Option<GeoPoint>, answer: Option<&str>) -> SubmitClueRequest {
        SubmitClueRequest {
            clue_id: clue_id.to_string(),
            position,
            answer: answer.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn test_join_twice_resumes_same_session() {
        let store = Arc::new(InMemoryStore::new());
        let service = service(store);

        let first = service.join_hunt("u1", "sample-louvre").await.unwrap();
        let second = service.join_hunt("u1", "sample-louvre").await.unwrap();

        assert!(!first.resumed);
        assert!(second.resumed);
        assert_eq!(first.session.id, second.session.id);
        assert_eq!(service.live_count().await, 1);
    }

    #[tokio::test]
    async fn test_join_resumes_from_store_after_restart() {
        let store = Arc::new(InMemoryStore::new());
        let first = service(store.clone());
        let joined = first.join_hunt("u1", "sample-louvre").await.unwrap();
        first
            .submit_clue(
                &joined.session.id,
                "u1",
                &submit("sample-louvre-1", Some(COURTYARD), None),
            )
            .await
            .unwrap();

        let restarted = service(store);
        let resumed = restarted.join_hunt("u1", "sample-louvre").await.unwrap();
        assert!(resumed.resumed);
        assert_eq!(resumed.session.id, joined.session.id);
        assert_eq!(resumed.session.current_clue_index, 1);
        assert_eq!(resumed.session.score, 100);
    }

    #[tokio::test]
    async fn test_unknown_hunt_is_not_found() {
        let service = service(Arc::new(InMemoryStore::new()));
        assert!(matches!(
            service.join_hunt("u1", "missing").await,
            Err(SessionError::HuntNotFound)
        ));
    }

    #[tokio::test]
    async fn test_other_user_is_forbidden() {
        let service = service(Arc::new(InMemoryStore::new()));
        let joined = service.join_hunt("u1", "sample-louvre").await.unwrap();

        assert!(matches!(
            service.get_session(&joined.session.id, "u2").await,
            Err(SessionError::Forbidden)
        ));
        assert!(matches!(
            service.use_hint(&joined.session.id, "u2").await,
            Err(SessionError::Forbidden)
        ));
    }

    #[tokio::test]
    async fn test_store_outage_keeps_memory_authoritative() {
        let store = Arc::new(InMemoryStore::new());
        let service = service(store.clone());
        let joined = service.join_hunt("u1", "sample-louvre").await.unwrap();

        store.set_unavailable(true);
        let response = service
            .submit_clue(
                &joined.session.id,
                "u1",
                &submit("sample-louvre-1", Some(COURTYARD), None),
            )
            .await
            .unwrap();
        assert_eq!(response.session.score, 100);

        let report = service.flush_all().await;
        assert_eq!(report.failed, 1);

        store.set_unavailable(false);
        let report = service.flush_all().await;
        assert_eq!(report.flushed, 1);
        let stored = SessionStore::get(store.as_ref(), &joined.session.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.score, 100);
    }

    #[tokio::test]
    async fn test_tick_and_flush_evicts_terminal_sessions() {
        let store = Arc::new(InMemoryStore::new());
        let service = service(store.clone());
        let a = service.join_hunt("u1", "sample-louvre").await.unwrap();
        service.join_hunt("u2", "sample-louvre").await.unwrap();

        assert_eq!(service.tick_all().await, 2);
        service.abandon(&a.session.id, "u1").await.unwrap();
        assert_eq!(service.tick_all().await, 1);

        let report = service.flush_all().await;
        assert_eq!(report.flushed, 2);
        assert_eq!(report.evicted, 1);
        assert_eq!(service.live_count().await, 1);

        // evicted sessions are still readable from the store
        let view = service.get_session(&a.session.id, "u1").await.unwrap();
        assert_eq!(view.status, SessionStatus::Abandoned);
        assert_eq!(view.elapsed_seconds, 1);
    }

    #[tokio::test]
    async fn test_flush_evicts_idle_sessions() {
        let store = Arc::new(InMemoryStore::new());
        let service = service(store.clone()).with_idle_eviction(0);
        let joined = service.join_hunt("u1", "sample-louvre").await.unwrap();
        service
            .submit_clue(
                &joined.session.id,
                "u1",
                &submit("sample-louvre-1", Some(COURTYARD), None),
            )
            .await
            .unwrap();
        service.tick_all().await;

        let report = service.flush_all().await;
        assert_eq!(report.flushed, 1);
        assert_eq!(report.evicted, 1);
        assert_eq!(service.live_count().await, 0);

        // the stored copy picks up where the evicted engine left off
        let resumed = service.join_hunt("u1", "sample-louvre").await.unwrap();
        assert!(resumed.resumed);
        assert_eq!(resumed.session.id, joined.session.id);
        assert_eq!(resumed.session.score, 100);
        assert_eq!(resumed.session.elapsed_seconds, 1);
        assert_eq!(service.live_count().await, 1);
    }

    #[tokio::test]
    async fn test_recent_sessions_survive_flush() {
        let store = Arc::new(InMemoryStore::new());
        let service = service(store.clone()).with_idle_eviction(3600);
        let joined = service.join_hunt("u1", "sample-louvre").await.unwrap();

        // a resumed attempt counts as fresh activity
        {
            let live = service.live.read().await;
            let mut engine = live[&joined.session.id].engine.lock().await;
            let mut stale = engine.session().clone();
            stale.updated_at = Utc::now() - Duration::hours(2);
            *engine = HuntProgressEngine::attach(
                stale,
                Arc::new(service.hunts.get_hunt("sample-louvre").await.unwrap()),
                Arc::new(HaversineOracle),
            )
            .unwrap();
        }
        let report = service.flush_all().await;
        assert_eq!(report.evicted, 1);

        service.join_hunt("u1", "sample-louvre").await.unwrap();
        let report = service.flush_all().await;
        assert_eq!(report.evicted, 0);
        assert_eq!(service.live_count().await, 1);
    }

    #[tokio::test]
    async fn test_sessions_on_stored_hunts() {
        let store = Arc::new(InMemoryStore::new());
        let mut hunt = crate::services::hunt_service::fallback_catalog().remove(1);
        hunt.id = "seine-copy".to_string();
        HuntRepository::insert(store.as_ref(), &hunt).await.unwrap();

        let service = service(store);
        let joined = service.join_hunt("u1", "seine-copy").await.unwrap();
        assert_eq!(joined.session.clue_count, 2);
        assert_eq!(
            joined.session.current_clue_id.as_deref(),
            Some("sample-seine-1")
        );
    }
}

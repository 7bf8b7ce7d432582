use anyhow::{anyhow, Result};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use super::proximity::ProximityOracle;
use crate::models::{
    Clue, ClueType, CompletedClue, Hunt, HuntSession, SessionSnapshot, SessionStatus, SessionView,
};
use crate::utils::geo::GeoPoint;

/// Points removed from the score for every hint, floored at zero.
pub const HINT_PENALTY: u32 = 10;

/// Why a transition was refused. The session is left untouched in every case.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TransitionRejection {
    #[error("session is {0}, no further moves are accepted")]
    NotActive(SessionStatus),
    #[error("clue {submitted} is not the current clue")]
    WrongClue {
        expected: Option<String>,
        submitted: String,
    },
    #[error("device is not within {radius_m} m of the clue")]
    TooFar {
        distance_m: Option<f64>,
        radius_m: f64,
    },
    #[error("incorrect answer")]
    WrongAnswer,
    #[error("no hint is available for the current clue")]
    NoHintAvailable,
}

impl TransitionRejection {
    pub fn code(&self) -> &'static str {
        match self {
            TransitionRejection::NotActive(_) => "not_active",
            TransitionRejection::WrongClue { .. } => "wrong_clue",
            TransitionRejection::TooFar { .. } => "too_far",
            TransitionRejection::WrongAnswer => "wrong_answer",
            TransitionRejection::NoHintAvailable => "no_hint_available",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ClueOutcome {
    pub clue_id: String,
    pub points_awarded: u32,
    pub score: u32,
    pub completed: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct HintOutcome {
    pub hint_text: String,
    pub hints_used: u32,
    pub penalty: u32,
    pub score: u32,
}

/// Progress state machine for one user on one hunt.
///
/// Callers serialize access; the engine itself holds no locks.
pub struct HuntProgressEngine {
    session: HuntSession,
    hunt: Arc<Hunt>,
    oracle: Arc<dyn ProximityOracle>,
}

impl HuntProgressEngine {
    /// Fresh attempt: active, nothing solved, zero score.
    pub fn start(user_id: &str, hunt: Arc<Hunt>, oracle: Arc<dyn ProximityOracle>) -> Self {
        let now = Utc::now();
        let session = HuntSession {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            hunt_id: hunt.id.clone(),
            current_clue_index: 0,
            completed_clues: Vec::new(),
            score: 0,
            elapsed_seconds: 0,
            hints_used: 0,
            status: SessionStatus::Active,
            started_at: now,
            updated_at: now,
            completed_at: None,
        };

        Self {
            session,
            hunt,
            oracle,
        }
    }

    /// Re-attach a persisted session. Refuses records that break the
    /// progress invariants instead of silently repairing them.
    pub fn attach(
        session: HuntSession,
        hunt: Arc<Hunt>,
        oracle: Arc<dyn ProximityOracle>,
    ) -> Result<Self> {
        if session.hunt_id != hunt.id {
            return Err(anyhow!(
                "Session {} belongs to hunt {}, not {}",
                session.id,
                session.hunt_id,
                hunt.id
            ));
        }
        if session.current_clue_index > hunt.clue_count() {
            return Err(anyhow!(
                "Session {} is at clue {} but hunt {} has {} clues",
                session.id,
                session.current_clue_index,
                hunt.id,
                hunt.clue_count()
            ));
        }
        if session.completed_clues.len() != session.current_clue_index {
            return Err(anyhow!(
                "Session {} has {} completed clues at index {}",
                session.id,
                session.completed_clues.len(),
                session.current_clue_index
            ));
        }
        let finished = session.current_clue_index == hunt.clue_count();
        if finished != (session.status == SessionStatus::Completed)
            && session.status != SessionStatus::Abandoned
        {
            return Err(anyhow!(
                "Session {} status {} does not match its progress",
                session.id,
                session.status
            ));
        }

        Ok(Self {
            session,
            hunt,
            oracle,
        })
    }

    pub fn session(&self) -> &HuntSession {
        &self.session
    }

    pub fn hunt(&self) -> &Hunt {
        &self.hunt
    }

    pub fn status(&self) -> SessionStatus {
        self.session.status
    }

    pub fn current_clue(&self) -> Option<&Clue> {
        if self.session.status != SessionStatus::Active {
            return None;
        }
        self.hunt.clue_at(self.session.current_clue_index)
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            score: self.session.score,
            elapsed_seconds: self.session.elapsed_seconds,
            hints_used: self.session.hints_used,
            current_clue_index: self.session.current_clue_index,
            clue_count: self.hunt.clue_count(),
            status: self.session.status,
        }
    }

    pub fn view(&self) -> SessionView {
        SessionView {
            id: self.session.id.clone(),
            hunt_id: self.session.hunt_id.clone(),
            status: self.session.status,
            current_clue_index: self.session.current_clue_index,
            clue_count: self.hunt.clue_count(),
            current_clue_id: self.current_clue().map(|clue| clue.id.clone()),
            completed_clue_ids: self
                .session
                .completed_clues
                .iter()
                .map(|clue| clue.clue_id.clone())
                .collect(),
            score: self.session.score,
            elapsed_seconds: self.session.elapsed_seconds,
            hints_used: self.session.hints_used,
            started_at: self.session.started_at,
            completed_at: self.session.completed_at,
        }
    }

    fn ensure_active(&self) -> Result<(), TransitionRejection> {
        match self.session.status {
            SessionStatus::Active => Ok(()),
            status => Err(TransitionRejection::NotActive(status)),
        }
    }

    /// Solve the current clue. Checks run in order: state, clue order,
    /// presence (all types but riddles), riddle answer.
    pub fn submit_clue(
        &mut self,
        clue_id: &str,
        position: Option<GeoPoint>,
        answer: Option<&str>,
    ) -> Result<ClueOutcome, TransitionRejection> {
        self.ensure_active()?;

        let clue = match self.hunt.clue_at(self.session.current_clue_index) {
            Some(clue) if clue.id == clue_id => clue,
            current => {
                return Err(TransitionRejection::WrongClue {
                    expected: current.map(|clue| clue.id.clone()),
                    submitted: clue_id.to_string(),
                })
            }
        };

        if clue.requires_presence()
            && !self
                .oracle
                .is_within(position, clue.location, clue.radius_m)
        {
            return Err(TransitionRejection::TooFar {
                distance_m: position
                    .filter(|point| point.is_valid())
                    .map(|point| point.distance_to(&clue.location)),
                radius_m: clue.radius_m,
            });
        }

        if clue.clue_type == ClueType::Riddle
            && !answer.map(|value| clue.answer_matches(value)).unwrap_or(false)
        {
            return Err(TransitionRejection::WrongAnswer);
        }

        let now = Utc::now();
        let points = clue.points;
        let clue_id = clue.id.clone();

        self.session.completed_clues.push(CompletedClue {
            clue_id: clue_id.clone(),
            points,
            elapsed_seconds: self.session.elapsed_seconds,
            completed_at: now,
        });
        self.session.score = self.session.score.saturating_add(points);
        self.session.current_clue_index += 1;
        self.session.updated_at = now;

        let completed = self.session.current_clue_index == self.hunt.clue_count();
        if completed {
            self.session.status = SessionStatus::Completed;
            self.session.completed_at = Some(now);
        }

        Ok(ClueOutcome {
            clue_id,
            points_awarded: points,
            score: self.session.score,
            completed,
        })
    }

    /// Reveal the current clue's hint at the cost of [`HINT_PENALTY`] points.
    pub fn use_hint(&mut self) -> Result<HintOutcome, TransitionRejection> {
        self.ensure_active()?;

        let hint_text = self
            .hunt
            .clue_at(self.session.current_clue_index)
            .and_then(|clue| clue.hint_text())
            .ok_or(TransitionRejection::NoHintAvailable)?
            .to_string();

        let before = self.session.score;
        self.session.hints_used += 1;
        self.session.score = before.saturating_sub(HINT_PENALTY);
        self.session.updated_at = Utc::now();

        Ok(HintOutcome {
            hint_text,
            hints_used: self.session.hints_used,
            penalty: before - self.session.score,
            score: self.session.score,
        })
    }

    /// Give up. Counters are frozen and the session can never become active again.
    pub fn abandon(&mut self) -> Result<(), TransitionRejection> {
        self.ensure_active()?;
        self.session.status = SessionStatus::Abandoned;
        self.session.updated_at = Utc::now();
        Ok(())
    }

    /// Mark the attempt as in use without changing progress.
    pub fn touch(&mut self) {
        self.session.updated_at = Utc::now();
    }

    /// Advance elapsed time by one second. Returns false when the session is not active.
    pub fn tick(&mut self) -> bool {
        if self.session.status != SessionStatus::Active {
            return false;
        }
        self.session.elapsed_seconds += 1;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::hunt::{Difficulty, HuntStatus};
    use crate::services::proximity::HaversineOracle;

    const LOUVRE: GeoPoint = GeoPoint {
        lat: 48.8606,
        lng: 2.3376,
    };

    fn clue(id: &str, position: u32, clue_type: ClueType, points: u32) -> Clue {
        Clue {
            id: id.to_string(),
            position,
            text: format!("Clue {}", position),
            hint: None,
            location: LOUVRE,
            radius_m: 50.0,
            points,
            clue_type,
            answer: None,
        }
    }

    /// Two clues: an on-site clue worth 100 and a riddle worth 150.
    fn scenario_hunt() -> Arc<Hunt> {
        let mut riddle = clue("c2", 2, ClueType::Riddle, 150);
        riddle.answer = Some("mona lisa".to_string());
        riddle.hint = Some("She smiles".to_string());

        let mut first = clue("c1", 1, ClueType::Location, 100);
        first.hint = Some("Look for the pyramid".to_string());

        Arc::new(Hunt {
            id: "hunt-1".to_string(),
            title: "Louvre".to_string(),
            description: String::new(),
            organizer_id: "org".to_string(),
            difficulty: Difficulty::Easy,
            status: HuntStatus::Published,
            clues: vec![first, riddle],
            created_at: Utc::now(),
        })
    }

    fn engine() -> HuntProgressEngine {
        HuntProgressEngine::start("user-1", scenario_hunt(), Arc::new(HaversineOracle))
    }

    fn assert_invariants(engine: &HuntProgressEngine) {
        let session = engine.session();
        assert_eq!(session.completed_clues.len(), session.current_clue_index);
        assert!(session.current_clue_index <= engine.hunt().clue_count());
        assert_eq!(
            session.status == SessionStatus::Completed,
            session.current_clue_index == engine.hunt().clue_count()
        );
    }

    #[test]
    fn test_initial_state() {
        let engine = engine();
        let session = engine.session();
        assert_eq!(session.status, SessionStatus::Active);
        assert_eq!(session.current_clue_index, 0);
        assert_eq!(session.score, 0);
        assert_eq!(session.hints_used, 0);
        assert_eq!(session.elapsed_seconds, 0);
        assert!(session.completed_clues.is_empty());
        assert_invariants(&engine);
    }

    #[test]
    fn test_full_scenario() {
        let mut engine = engine();

        let outcome = engine.submit_clue("c1", Some(LOUVRE), None).unwrap();
        assert_eq!(outcome.points_awarded, 100);
        assert_eq!(engine.session().score, 100);
        assert_eq!(engine.session().current_clue_index, 1);
        assert!(!outcome.completed);
        assert_invariants(&engine);

        let err = engine
            .submit_clue("c2", None, Some("da vinci"))
            .unwrap_err();
        assert_eq!(err, TransitionRejection::WrongAnswer);
        assert_eq!(engine.session().score, 100);
        assert_eq!(engine.session().current_clue_index, 1);
        assert_invariants(&engine);

        let outcome = engine.submit_clue("c2", None, Some("Mona Lisa")).unwrap();
        assert!(outcome.completed);
        assert_eq!(engine.session().score, 250);
        assert_eq!(engine.status(), SessionStatus::Completed);
        assert!(engine.session().completed_at.is_some());
        assert_invariants(&engine);
    }

    #[test]
    fn test_out_of_order_submission_is_rejected_without_change() {
        let mut engine = engine();
        let err = engine
            .submit_clue("c2", Some(LOUVRE), Some("mona lisa"))
            .unwrap_err();

        assert_eq!(
            err,
            TransitionRejection::WrongClue {
                expected: Some("c1".to_string()),
                submitted: "c2".to_string()
            }
        );
        assert_eq!(engine.session().current_clue_index, 0);
        assert_eq!(engine.session().score, 0);
        assert_invariants(&engine);
    }

    #[test]
    fn test_too_far_is_rejected() {
        let mut engine = engine();
        // ~111 m north of the clue
        let far = GeoPoint::new(48.8616, 2.3376);
        let err = engine.submit_clue("c1", Some(far), None).unwrap_err();

        match err {
            TransitionRejection::TooFar {
                distance_m,
                radius_m,
            } => {
                assert_eq!(radius_m, 50.0);
                assert!(distance_m.unwrap() > 100.0);
            }
            other => panic!("unexpected rejection {:?}", other),
        }
        assert_eq!(engine.session().current_clue_index, 0);
    }

    #[test]
    fn test_missing_position_fails_closed() {
        let mut engine = engine();
        let err = engine.submit_clue("c1", None, None).unwrap_err();
        assert_eq!(
            err,
            TransitionRejection::TooFar {
                distance_m: None,
                radius_m: 50.0
            }
        );
    }

    #[test]
    fn test_boundary_distance_passes() {
        let hunt = scenario_hunt();
        let device = GeoPoint::new(48.8609, 2.3376);
        let distance = device.distance_to(&LOUVRE);

        let mut hunt = (*hunt).clone();
        hunt.clues[0].radius_m = distance;
        let mut engine =
            HuntProgressEngine::start("user-1", Arc::new(hunt.clone()), Arc::new(HaversineOracle));
        assert!(engine.submit_clue("c1", Some(device), None).is_ok());

        hunt.clues[0].radius_m = distance - 0.01;
        let mut engine =
            HuntProgressEngine::start("user-1", Arc::new(hunt), Arc::new(HaversineOracle));
        assert!(matches!(
            engine.submit_clue("c1", Some(device), None),
            Err(TransitionRejection::TooFar { .. })
        ));
    }

    #[test]
    fn test_riddle_does_not_need_presence_and_ignores_case() {
        for answer in ["Mona Lisa", " mona lisa ", "MONA LISA"] {
            let mut engine = engine();
            engine.submit_clue("c1", Some(LOUVRE), None).unwrap();
            let outcome = engine.submit_clue("c2", None, Some(answer)).unwrap();
            assert!(outcome.completed, "answer {:?} should match", answer);
        }
    }

    #[test]
    fn test_riddle_without_answer_is_wrong() {
        let mut engine = engine();
        engine.submit_clue("c1", Some(LOUVRE), None).unwrap();
        assert_eq!(
            engine.submit_clue("c2", None, None).unwrap_err(),
            TransitionRejection::WrongAnswer
        );
    }

    #[test]
    fn test_hint_penalty_floors_at_zero() {
        let mut engine = engine();
        engine.session.score = 5;

        let outcome = engine.use_hint().unwrap();
        assert_eq!(outcome.score, 0);
        assert_eq!(outcome.penalty, 5);
        assert_eq!(outcome.hints_used, 1);
        assert_eq!(outcome.hint_text, "Look for the pyramid");
    }

    #[test]
    fn test_hints_have_no_cap() {
        let mut engine = engine();
        engine.submit_clue("c1", Some(LOUVRE), None).unwrap();

        for expected in 1..=12 {
            assert_eq!(engine.use_hint().unwrap().hints_used, expected);
        }
        assert_eq!(engine.session().score, 0);
    }

    #[test]
    fn test_hint_requires_hint_text() {
        let mut hunt = (*scenario_hunt()).clone();
        hunt.clues[0].hint = Some("   ".to_string());
        let mut engine =
            HuntProgressEngine::start("user-1", Arc::new(hunt), Arc::new(HaversineOracle));

        assert_eq!(
            engine.use_hint().unwrap_err(),
            TransitionRejection::NoHintAvailable
        );
        assert_eq!(engine.session().hints_used, 0);
    }

    #[test]
    fn test_completed_session_is_terminal() {
        let mut engine = engine();
        engine.submit_clue("c1", Some(LOUVRE), None).unwrap();
        engine.submit_clue("c2", None, Some("mona lisa")).unwrap();

        let status = SessionStatus::Completed;
        assert_eq!(
            engine.submit_clue("c2", None, Some("mona lisa")).unwrap_err(),
            TransitionRejection::NotActive(status)
        );
        assert_eq!(
            engine.use_hint().unwrap_err(),
            TransitionRejection::NotActive(status)
        );
        assert_eq!(
            engine.abandon().unwrap_err(),
            TransitionRejection::NotActive(status)
        );
        assert!(!engine.tick());
        assert_eq!(engine.session().score, 250);
    }

    #[test]
    fn test_abandon_is_irreversible() {
        let mut engine = engine();
        engine.tick();
        engine.submit_clue("c1", Some(LOUVRE), None).unwrap();
        engine.abandon().unwrap();

        let status = SessionStatus::Abandoned;
        assert_eq!(
            engine.submit_clue("c2", None, Some("mona lisa")).unwrap_err(),
            TransitionRejection::NotActive(status)
        );
        assert_eq!(
            engine.use_hint().unwrap_err(),
            TransitionRejection::NotActive(status)
        );
        assert_eq!(
            engine.abandon().unwrap_err(),
            TransitionRejection::NotActive(status)
        );
        assert!(!engine.tick());

        let session = engine.session();
        assert_eq!(session.score, 100);
        assert_eq!(session.elapsed_seconds, 1);
        assert_eq!(session.current_clue_index, 1);
        assert_invariants(&engine);
    }

    #[test]
    fn test_tick_records_elapsed_snapshot_on_solve() {
        let mut engine = engine();
        for _ in 0..7 {
            assert!(engine.tick());
        }
        engine.submit_clue("c1", Some(LOUVRE), None).unwrap();

        assert_eq!(engine.session().elapsed_seconds, 7);
        assert_eq!(engine.session().completed_clues[0].elapsed_seconds, 7);
    }

    #[test]
    fn test_attach_rejects_inconsistent_session() {
        let hunt = scenario_hunt();
        let mut session = engine().session().clone();
        session.current_clue_index = 1;

        assert!(HuntProgressEngine::attach(session, hunt, Arc::new(HaversineOracle)).is_err());
    }

    #[test]
    fn test_attach_resumes_progress() {
        let mut original = engine();
        original.submit_clue("c1", Some(LOUVRE), None).unwrap();

        let mut resumed = HuntProgressEngine::attach(
            original.session().clone(),
            scenario_hunt(),
            Arc::new(HaversineOracle),
        )
        .unwrap();

        assert_eq!(resumed.current_clue().unwrap().id, "c2");
        assert!(resumed.submit_clue("c2", None, Some("mona lisa")).is_ok());
    }

    #[test]
    fn test_view_reports_current_clue() {
        let mut engine = engine();
        assert_eq!(engine.view().current_clue_id.as_deref(), Some("c1"));
        engine.abandon().unwrap();
        assert!(engine.view().current_clue_id.is_none());
    }
}

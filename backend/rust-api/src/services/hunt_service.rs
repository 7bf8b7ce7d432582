use chrono::{TimeZone, Utc};
use std::sync::Arc;
use thiserror::Error;

use super::store::HuntRepository;
use crate::metrics::HUNTS_CREATED_TOTAL;
use crate::models::hunt::{Difficulty, HuntValidationError, DEFAULT_RADIUS_M};
use crate::models::{Clue, ClueType, CreateHuntRequest, Hunt, HuntStatus, HuntSummary};
use crate::utils::geo::GeoPoint;

#[derive(Debug, Error)]
pub enum CreateHuntError {
    #[error(transparent)]
    Invalid(#[from] HuntValidationError),
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

pub struct HuntService {
    repo: Arc<dyn HuntRepository>,
}

impl HuntService {
    pub fn new(repo: Arc<dyn HuntRepository>) -> Self {
        Self { repo }
    }

    /// Published hunts, or the built-in sample catalog when the store is down.
    pub async fn list_hunts(&self) -> Vec<HuntSummary> {
        match self.repo.list_published().await {
            Ok(hunts) => hunts.iter().map(Hunt::summary).collect(),
            Err(e) => {
                tracing::warn!("Hunt store unavailable ({}), serving fallback catalog", e);
                fallback_catalog().iter().map(Hunt::summary).collect()
            }
        }
    }

    pub async fn get_hunt(&self, hunt_id: &str) -> Option<Hunt> {
        match self.repo.get(hunt_id).await {
            Ok(Some(hunt)) => Some(hunt),
            Ok(None) => fallback_catalog().into_iter().find(|hunt| hunt.id == hunt_id),
            Err(e) => {
                tracing::warn!(
                    "Failed to load hunt {} ({}), checking fallback catalog",
                    hunt_id,
                    e
                );
                fallback_catalog().into_iter().find(|hunt| hunt.id == hunt_id)
            }
        }
    }

    pub async fn create_hunt(
        &self,
        req: CreateHuntRequest,
        organizer_id: &str,
    ) -> Result<Hunt, CreateHuntError> {
        let hunt = Hunt::from_request(req, organizer_id)?;
        self.repo.insert(&hunt).await?;

        HUNTS_CREATED_TOTAL
            .with_label_values(&[hunt.status.as_str()])
            .inc();
        tracing::info!(
            "Hunt created: id={}, organizer={}, clues={}",
            hunt.id,
            organizer_id,
            hunt.clue_count()
        );

        Ok(hunt)
    }
}

fn sample_clue(
    id: &str,
    position: u32,
    text: &str,
    location: GeoPoint,
    points: u32,
    clue_type: ClueType,
) -> Clue {
    Clue {
        id: id.to_string(),
        position,
        text: text.to_string(),
        hint: None,
        location,
        radius_m: DEFAULT_RADIUS_M,
        points,
        clue_type,
        answer: None,
    }
}

/// Static hunts served while the hunt store is unreachable.
pub fn fallback_catalog() -> Vec<Hunt> {
    let created_at = Utc
        .with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
        .single()
        .unwrap_or_else(Utc::now);

    let mut pyramid = sample_clue(
        "sample-louvre-1",
        1,
        "Stand where glass meets stone in the great courtyard.",
        GeoPoint::new(48.8611, 2.3358),
        100,
        ClueType::Location,
    );
    pyramid.hint = Some("Look for the glass pyramid.".to_string());

    let mut smile = sample_clue(
        "sample-louvre-2",
        2,
        "Which portrait smiles at every visitor in the Salle des États?",
        GeoPoint::new(48.8600, 2.3376),
        150,
        ClueType::Riddle,
    );
    smile.answer = Some("mona lisa".to_string());
    smile.hint = Some("Painted by Leonardo.".to_string());

    let mut bridge = sample_clue(
        "sample-seine-1",
        1,
        "Photograph the bridge once covered in love locks.",
        GeoPoint::new(48.8583, 2.3375),
        80,
        ClueType::Photo,
    );
    bridge.radius_m = 75.0;

    let island = sample_clue(
        "sample-seine-2",
        2,
        "Scan the code at the western tip of the island.",
        GeoPoint::new(48.8575, 2.3400),
        120,
        ClueType::Qr,
    );

    vec![
        Hunt {
            id: "sample-louvre".to_string(),
            title: "Secrets of the Louvre".to_string(),
            description: "A short walk around the museum courtyard.".to_string(),
            organizer_id: "system".to_string(),
            difficulty: Difficulty::Easy,
            status: HuntStatus::Published,
            clues: vec![pyramid, smile],
            created_at,
        },
        Hunt {
            id: "sample-seine".to_string(),
            title: "Along the Seine".to_string(),
            description: "Bridges and islands in the heart of Paris.".to_string(),
            organizer_id: "system".to_string(),
            difficulty: Difficulty::Medium,
            status: HuntStatus::Published,
            clues: vec![bridge, island],
            created_at,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::store::InMemoryStore;

    #[test]
    fn test_fallback_catalog_is_structurally_valid() {
        for hunt in fallback_catalog() {
            hunt.validate_structure().unwrap();
        }
    }

    #[tokio::test]
    async fn test_list_falls_back_when_store_is_down() {
        let store = Arc::new(InMemoryStore::new());
        store.set_unavailable(true);
        let service = HuntService::new(store);

        let hunts = service.list_hunts().await;
        assert_eq!(hunts.len(), fallback_catalog().len());
        assert!(service.get_hunt("sample-louvre").await.is_some());
        assert!(service.get_hunt("nope").await.is_none());
    }
}

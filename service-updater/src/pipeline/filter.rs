//! Skip-if-already-updated filtering.

use tracing::{debug, warn};

use crate::core::EntityRef;
use crate::ports::UpdateRecorder;

/// Outcome of filtering a selection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilteredSelection {
    /// Entities to process, in selection order.
    pub included: Vec<EntityRef>,
    /// Entities skipped because they completed a full cycle.
    pub skipped: Vec<String>,
}

/// Drops entities that already completed a full cycle unless `overwrite`.
///
/// An entity whose check fails is kept.
pub async fn filter_already_updated(
    recorder: &dyn UpdateRecorder,
    entities: Vec<EntityRef>,
    overwrite: bool,
) -> FilteredSelection {
    if overwrite {
        return FilteredSelection {
            included: entities,
            skipped: Vec::new(),
        };
    }

    let mut selection = FilteredSelection::default();
    for entity in entities {
        match recorder.has_completed_full_cycle(&entity.id).await {
            Ok(true) => {
                debug!(entity_id = %entity.id, "Already updated; skipping");
                selection.skipped.push(entity.id);
            }
            Ok(false) => selection.included.push(entity),
            Err(e) => {
                warn!(entity_id = %entity.id, error = %e, "Update check failed; including entity");
                selection.included.push(entity);
            }
        }
    }
    selection
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::RecorderError;
    use crate::ports::MockUpdateRecorder;

    fn abc() -> Vec<EntityRef> {
        vec![
            EntityRef::new("a", "Audit"),
            EntityRef::new("b", "Bookkeeping"),
            EntityRef::new("c", "Consulting"),
        ]
    }

    #[tokio::test]
    async fn test_skips_completed_entities() {
        let mut recorder = MockUpdateRecorder::new();
        recorder
            .expect_has_completed_full_cycle()
            .returning(|id| Ok(id == "a"));

        let selection = filter_already_updated(&recorder, abc(), false).await;
        let ids: Vec<_> = selection.included.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c"]);
        assert_eq!(selection.skipped, vec!["a".to_string()]);
    }

    #[tokio::test]
    async fn test_overwrite_skips_the_check() {
        let mut recorder = MockUpdateRecorder::new();
        recorder.expect_has_completed_full_cycle().never();

        let selection = filter_already_updated(&recorder, abc(), true).await;
        assert_eq!(selection.included.len(), 3);
    }

    #[tokio::test]
    async fn test_check_failure_fails_open() {
        let mut recorder = MockUpdateRecorder::new();
        recorder.expect_has_completed_full_cycle().returning(|id| {
            if id == "b" {
                Err(RecorderError("audit store offline".to_string()))
            } else {
                Ok(true)
            }
        });

        let selection = filter_already_updated(&recorder, abc(), false).await;
        let ids: Vec<_> = selection.included.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["b"]);
        assert_eq!(selection.skipped, vec!["a".to_string(), "c".to_string()]);
    }
}

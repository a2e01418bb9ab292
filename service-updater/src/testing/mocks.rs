//! Scripted in-memory collaborators.

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use super::fixtures::default_stage_content;
use crate::core::{FaqRecord, ServiceRecord, ServiceUpdate, StageName};
use crate::errors::{BatchServiceError, GenerationError, PersistenceError};
use crate::ports::{
    BackgroundBatchService, BackgroundStatus, BatchStatusReport, BatchSubmission, ChildRecords,
    GenerationRequest, GenerationService, PersistenceService, UpdateOptions,
};

/// Rule matching one stage, optionally for one entity only.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct StageRule {
    entity_id: Option<String>,
    stage: StageName,
}

impl StageRule {
    fn matches(&self, entity_id: &str, stage: StageName) -> bool {
        self.stage == stage && self.entity_id.as_deref().map_or(true, |id| id == entity_id)
    }
}

/// Generation service returning [`default_stage_content`] unless scripted
/// otherwise. Records every request.
#[derive(Debug, Default)]
pub struct ScriptedGenerationService {
    responses: HashMap<StageName, serde_json::Value>,
    failures: Vec<StageRule>,
    delays: Vec<(StageRule, Duration)>,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl ScriptedGenerationService {
    /// Creates a service that succeeds for every stage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `content` for `stage`.
    #[must_use]
    pub fn with_response(mut self, stage: StageName, content: serde_json::Value) -> Self {
        self.responses.insert(stage, content);
        self
    }

    /// Fails `stage` for every entity.
    #[must_use]
    pub fn with_failure(mut self, stage: StageName) -> Self {
        self.failures.push(StageRule {
            entity_id: None,
            stage,
        });
        self
    }

    /// Fails `stage` for one entity.
    #[must_use]
    pub fn with_failure_for(mut self, entity_id: impl Into<String>, stage: StageName) -> Self {
        self.failures.push(StageRule {
            entity_id: Some(entity_id.into()),
            stage,
        });
        self
    }

    /// Delays `stage` for every entity.
    #[must_use]
    pub fn with_delay(mut self, stage: StageName, delay: Duration) -> Self {
        self.delays.push((
            StageRule {
                entity_id: None,
                stage,
            },
            delay,
        ));
        self
    }

    /// Delays `stage` for one entity.
    #[must_use]
    pub fn with_delay_for(
        mut self,
        entity_id: impl Into<String>,
        stage: StageName,
        delay: Duration,
    ) -> Self {
        self.delays.push((
            StageRule {
                entity_id: Some(entity_id.into()),
                stage,
            },
            delay,
        ));
        self
    }

    /// Every request received, in order.
    #[must_use]
    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().clone()
    }

    /// Number of calls.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.requests.lock().len()
    }

    /// Ids of the entities generation was requested for, deduplicated in
    /// first-seen order.
    #[must_use]
    pub fn entities_seen(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.requests
            .lock()
            .iter()
            .filter(|r| seen.insert(r.service.id.clone()))
            .map(|r| r.service.id.clone())
            .collect()
    }
}

#[async_trait]
impl GenerationService for ScriptedGenerationService {
    async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<serde_json::Value, GenerationError> {
        self.requests.lock().push(request.clone());
        let (id, stage) = (request.service.id.as_str(), request.stage);

        if let Some((_, delay)) = self.delays.iter().find(|(rule, _)| rule.matches(id, stage)) {
            tokio::time::sleep(*delay).await;
        }
        if self.failures.iter().any(|rule| rule.matches(id, stage)) {
            return Err(GenerationError::Transport {
                stage,
                message: "scripted failure".to_string(),
            });
        }
        Ok(self
            .responses
            .get(&stage)
            .cloned()
            .unwrap_or_else(|| default_stage_content(stage)))
    }
}

/// Persistence store held in memory.
#[derive(Debug, Default)]
pub struct InMemoryPersistence {
    services: DashMap<String, ServiceRecord>,
    faqs: DashMap<String, Vec<FaqRecord>>,
    failing: Mutex<HashSet<String>>,
    updates: AtomicUsize,
    last_options: Mutex<Option<UpdateOptions>>,
}

impl InMemoryPersistence {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a record.
    #[must_use]
    pub fn with_service(self, record: ServiceRecord) -> Self {
        self.insert(record);
        self
    }

    /// Adds several records.
    #[must_use]
    pub fn with_services(self, records: impl IntoIterator<Item = ServiceRecord>) -> Self {
        for record in records {
            self.insert(record);
        }
        self
    }

    /// Inserts or replaces a record.
    pub fn insert(&self, record: ServiceRecord) {
        self.services.insert(record.id.clone(), record);
    }

    /// Makes every update of `entity_id` fail.
    pub fn fail_updates_for(&self, entity_id: impl Into<String>) {
        self.failing.lock().insert(entity_id.into());
    }

    /// Current record.
    #[must_use]
    pub fn get(&self, entity_id: &str) -> Option<ServiceRecord> {
        self.services.get(entity_id).map(|r| r.clone())
    }

    /// Current FAQ rows.
    #[must_use]
    pub fn faqs(&self, entity_id: &str) -> Vec<FaqRecord> {
        self.faqs
            .get(entity_id)
            .map(|f| f.clone())
            .unwrap_or_default()
    }

    /// Successful field updates so far.
    #[must_use]
    pub fn update_count(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }

    /// Options passed with the last update.
    #[must_use]
    pub fn last_update_options(&self) -> Option<UpdateOptions> {
        *self.last_options.lock()
    }
}

#[async_trait]
impl PersistenceService for InMemoryPersistence {
    async fn fetch_entity(&self, entity_id: &str) -> Result<ServiceRecord, PersistenceError> {
        self.get(entity_id)
            .ok_or_else(|| PersistenceError::NotFound(entity_id.to_string()))
    }

    async fn update_entity(
        &self,
        entity_id: &str,
        update: &ServiceUpdate,
        options: UpdateOptions,
    ) -> Result<(), PersistenceError> {
        *self.last_options.lock() = Some(options);
        if self.failing.lock().contains(entity_id) {
            return Err(PersistenceError::UpdateFailed {
                entity_id: entity_id.to_string(),
                attempts: options.retry_attempts,
                message: "scripted failure".to_string(),
            });
        }
        let mut record = self
            .services
            .get_mut(entity_id)
            .ok_or_else(|| PersistenceError::NotFound(entity_id.to_string()))?;
        record.apply(update);
        self.updates.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn replace_child_records(
        &self,
        entity_id: &str,
        records: &ChildRecords,
    ) -> Result<(), PersistenceError> {
        if self.failing.lock().contains(entity_id) {
            return Err(PersistenceError::Transport("scripted failure".to_string()));
        }
        match records {
            ChildRecords::Faqs(faqs) => {
                self.faqs.insert(entity_id.to_string(), faqs.clone());
            }
        }
        Ok(())
    }
}

/// Batch service that replays scripted poll results.
///
/// Once the script runs out every poll reports the submitted batch as
/// completed.
#[derive(Debug, Default)]
pub struct ScriptedBatchService {
    script: Mutex<VecDeque<Result<BatchStatusReport, BatchServiceError>>>,
    submissions: Mutex<Vec<BatchSubmission>>,
    polls: AtomicUsize,
}

impl ScriptedBatchService {
    /// Creates a service that replays `script`.
    #[must_use]
    pub fn new(script: Vec<Result<BatchStatusReport, BatchServiceError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            ..Self::default()
        }
    }

    /// Submissions received.
    #[must_use]
    pub fn submissions(&self) -> Vec<BatchSubmission> {
        self.submissions.lock().clone()
    }

    /// Polls received.
    #[must_use]
    pub fn poll_count(&self) -> usize {
        self.polls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BackgroundBatchService for ScriptedBatchService {
    async fn submit_batch(&self, submission: &BatchSubmission) -> Result<String, BatchServiceError> {
        let mut submissions = self.submissions.lock();
        submissions.push(submission.clone());
        Ok(format!("batch-{}", submissions.len()))
    }

    async fn poll_status(&self, _batch_id: &str) -> Result<BatchStatusReport, BatchServiceError> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        if let Some(next) = self.script.lock().pop_front() {
            return next;
        }
        let total = self
            .submissions
            .lock()
            .last()
            .map_or(0, |s| s.entity_ids.len());
        Ok(BatchStatusReport {
            status: BackgroundStatus::Completed,
            completed_count: total,
            total_count: total,
            error_count: 0,
            failed_entity_ids: Vec::new(),
        })
    }
}

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use study_core::model::{ProgressBatch, SessionId, SessionSummary, SkillRecord, StudentId, StudentProfile};
use thiserror::Error;
use tokio::sync::Mutex as AsyncMutex;
use tracing::debug;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("lock poisoned: {0}")]
    Poisoned(String),
}

fn poisoned<E: std::fmt::Display>(e: E) -> StorageError {
    StorageError::Poisoned(e.to_string())
}

//
// ─── CONTRACTS ─────────────────────────────────────────────────────────────────
//

/// Long-term skill memory keyed by student.
#[async_trait]
pub trait ProgressStore: Send + Sync {
    /// Current profile for a student. An unseen student yields an empty profile and
    /// no state is created for them.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backend cannot be read.
    async fn get_profile(&self, student: &StudentId) -> Result<StudentProfile, StorageError>;

    /// Fold one session's outcomes into the student's profile as a single commit.
    ///
    /// Re-applying a batch for a session that was already applied changes nothing.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the commit cannot be made; the profile is then unchanged.
    async fn update(
        &self,
        student: &StudentId,
        batch: &ProgressBatch,
    ) -> Result<Vec<SkillRecord>, StorageError>;
}

/// Record of finished sessions.
#[async_trait]
pub trait SessionArchive: Send + Sync {
    /// Store a summary, replacing any earlier one with the same session id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the summary cannot be stored.
    async fn upsert_summary(&self, summary: &SessionSummary) -> Result<(), StorageError>;

    /// Most recent summaries for a student, newest first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backend cannot be read.
    async fn list_summaries(
        &self,
        student: &StudentId,
        limit: usize,
    ) -> Result<Vec<SessionSummary>, StorageError>;
}

//
// ─── IN-MEMORY PROGRESS STORE ──────────────────────────────────────────────────
//

type ProfileSlot = Arc<AsyncMutex<StudentProfile>>;

/// In-memory progress store with one async lock per student.
///
/// The outer map lock is held only long enough to find or create a slot, so
/// students never wait on each other.
#[derive(Clone, Default)]
pub struct InMemoryProgressStore {
    profiles: Arc<Mutex<HashMap<StudentId, ProfileSlot>>>,
}

impl InMemoryProgressStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn existing_slot(&self, student: &StudentId) -> Result<Option<ProfileSlot>, StorageError> {
        let guard = self.profiles.lock().map_err(poisoned)?;
        Ok(guard.get(student).cloned())
    }

    fn slot(&self, student: &StudentId) -> Result<ProfileSlot, StorageError> {
        let mut guard = self.profiles.lock().map_err(poisoned)?;
        let slot = guard
            .entry(student.clone())
            .or_insert_with(|| Arc::new(AsyncMutex::new(StudentProfile::empty(student.clone()))));
        Ok(Arc::clone(slot))
    }
}

#[async_trait]
impl ProgressStore for InMemoryProgressStore {
    async fn get_profile(&self, student: &StudentId) -> Result<StudentProfile, StorageError> {
        match self.existing_slot(student)? {
            Some(slot) => Ok(slot.lock().await.clone()),
            None => Ok(StudentProfile::empty(student.clone())),
        }
    }

    async fn update(
        &self,
        student: &StudentId,
        batch: &ProgressBatch,
    ) -> Result<Vec<SkillRecord>, StorageError> {
        let slot = self.slot(student)?;
        let mut profile = slot.lock().await;

        if profile.has_applied(batch.session_id) {
            debug!(%student, session = %batch.session_id, "batch already applied");
            return Ok(profile.apply(batch));
        }

        // Apply to a copy and swap, so a reader never sees a half-applied batch.
        let mut next = profile.clone();
        let updated = next.apply(batch);
        *profile = next;

        debug!(
            %student,
            session = %batch.session_id,
            skills = updated.len(),
            "progress committed"
        );
        Ok(updated)
    }
}

//
// ─── IN-MEMORY SESSION ARCHIVE ─────────────────────────────────────────────────
//

#[derive(Clone, Default)]
pub struct InMemorySessionArchive {
    summaries: Arc<Mutex<HashMap<SessionId, SessionSummary>>>,
}

impl InMemorySessionArchive {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionArchive for InMemorySessionArchive {
    async fn upsert_summary(&self, summary: &SessionSummary) -> Result<(), StorageError> {
        let mut guard = self.summaries.lock().map_err(poisoned)?;
        guard.insert(summary.session_id(), summary.clone());
        debug!(session = %summary.session_id(), "session summary archived");
        Ok(())
    }

    async fn list_summaries(
        &self,
        student: &StudentId,
        limit: usize,
    ) -> Result<Vec<SessionSummary>, StorageError> {
        let guard = self.summaries.lock().map_err(poisoned)?;
        let mut found: Vec<SessionSummary> = guard
            .values()
            .filter(|s| s.student() == student)
            .cloned()
            .collect();
        found.sort_by(|a, b| b.completed_at().cmp(&a.completed_at()));
        found.truncate(limit);
        Ok(found)
    }
}

//
// ─── AGGREGATE ─────────────────────────────────────────────────────────────────
//

/// Aggregates the progress store and session archive behind trait objects for easy
/// backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub progress: Arc<dyn ProgressStore>,
    pub sessions: Arc<dyn SessionArchive>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        let progress: Arc<dyn ProgressStore> = Arc::new(InMemoryProgressStore::new());
        let sessions: Arc<dyn SessionArchive> = Arc::new(InMemorySessionArchive::new());
        Self { progress, sessions }
    }
}

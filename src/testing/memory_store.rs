//! In-memory artifact store

use crate::errors::CameraError;
use crate::storage::{ArtifactStore, SavedArtifact, StorageLocation};
use crate::types::Artifact;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

/// Keeps saved artifacts in memory; can be switched to fail every write
#[derive(Default)]
pub struct MemoryStore {
    saved: Mutex<Vec<(SavedArtifact, Artifact)>>,
    failing: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn saved(&self) -> Vec<SavedArtifact> {
        self.entries().into_iter().map(|(saved, _)| saved).collect()
    }

    pub fn artifacts(&self) -> Vec<Artifact> {
        self.entries().into_iter().map(|(_, artifact)| artifact).collect()
    }

    pub fn len(&self) -> usize {
        self.saved.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn entries(&self) -> Vec<(SavedArtifact, Artifact)> {
        self.saved.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl ArtifactStore for MemoryStore {
    fn save(
        &self,
        artifact: &Artifact,
        filename: &str,
        location: &StorageLocation,
    ) -> Result<SavedArtifact, CameraError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(CameraError::StorageWriteFailed(format!(
                "{} is read-only",
                location.name
            )));
        }
        let saved = SavedArtifact {
            location_id: location.id.clone(),
            filename: filename.to_string(),
            path: location.path.join(filename),
            bytes: artifact.len(),
        };
        self.saved
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((saved.clone(), artifact.clone()));
        Ok(saved)
    }
}

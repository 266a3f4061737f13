//! Durable storage for the offline mutation queue.
//!
//! The queue file is plain JSON under the data directory so a pending
//! list survives a process restart. The medium is behind a trait; tests
//! use the in-memory variant.

use std::path::PathBuf;
use std::sync::Mutex;

use crate::error::PlanError;

use super::QueuedMutation;

const QUEUE_FILENAME: &str = "pending_mutations.json";

pub trait QueueStorage: Send + Sync {
    /// Loads the persisted queue, oldest first. Missing storage is an
    /// empty queue, not an error.
    fn load(&self) -> Result<Vec<QueuedMutation>, PlanError>;

    /// Replaces the persisted queue with `items`.
    fn save(&self, items: &[QueuedMutation]) -> Result<(), PlanError>;
}

/// File-backed queue storage under a data directory.
#[derive(Debug, Clone)]
pub struct FileQueueStorage {
    data_dir: PathBuf,
}

impl FileQueueStorage {
    pub fn new(data_dir: PathBuf) -> Self {
        Self { data_dir }
    }

    pub fn path(&self) -> PathBuf {
        self.data_dir.join(QUEUE_FILENAME)
    }
}

impl QueueStorage for FileQueueStorage {
    fn load(&self) -> Result<Vec<QueuedMutation>, PlanError> {
        let path = self.path();
        if !path.exists() {
            return Ok(Vec::new());
        }
        let contents = std::fs::read_to_string(&path)
            .map_err(|e| PlanError::Storage(format!("read {}: {}", path.display(), e)))?;
        serde_json::from_str(&contents)
            .map_err(|e| PlanError::Storage(format!("parse {}: {}", path.display(), e)))
    }

    fn save(&self, items: &[QueuedMutation]) -> Result<(), PlanError> {
        std::fs::create_dir_all(&self.data_dir)
            .map_err(|e| PlanError::Storage(format!("create {}: {}", self.data_dir.display(), e)))?;
        let json = serde_json::to_string_pretty(items)
            .map_err(|e| PlanError::Storage(format!("encode queue: {}", e)))?;
        let path = self.path();
        std::fs::write(&path, json)
            .map_err(|e| PlanError::Storage(format!("write {}: {}", path.display(), e)))
    }
}

/// In-memory queue storage for tests.
#[derive(Debug, Default)]
pub struct MemoryQueueStorage {
    items: Mutex<Vec<QueuedMutation>>,
}

impl MemoryQueueStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl QueueStorage for MemoryQueueStorage {
    fn load(&self) -> Result<Vec<QueuedMutation>, PlanError> {
        Ok(self.items.lock().unwrap().clone())
    }

    fn save(&self, items: &[QueuedMutation]) -> Result<(), PlanError> {
        *self.items.lock().unwrap() = items.to_vec();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PlanKey;
    use crate::queue::MutationOp;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn sample_mutation() -> QueuedMutation {
        QueuedMutation::new(
            PlanKey::new("user1", NaiveDate::from_ymd_opt(2024, 1, 15).unwrap()),
            MutationOp::ClearWeek,
        )
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let temp = TempDir::new().unwrap();
        let storage = FileQueueStorage::new(temp.path().to_path_buf());
        assert!(storage.load().unwrap().is_empty());
    }

    #[test]
    fn test_save_creates_directory() {
        let temp = TempDir::new().unwrap();
        let nested = temp.path().join("nested").join("data");
        let storage = FileQueueStorage::new(nested.clone());

        storage.save(&[sample_mutation()]).unwrap();
        assert!(nested.exists());
        assert_eq!(storage.load().unwrap().len(), 1);
    }

    #[test]
    fn test_roundtrip_preserves_order() {
        let temp = TempDir::new().unwrap();
        let storage = FileQueueStorage::new(temp.path().to_path_buf());

        let first = sample_mutation();
        let second = sample_mutation();
        storage.save(&[first.clone(), second.clone()]).unwrap();

        let loaded = storage.load().unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].id, first.id);
        assert_eq!(loaded[1].id, second.id);
    }

    #[test]
    fn test_save_replaces_previous_contents() {
        let temp = TempDir::new().unwrap();
        let storage = FileQueueStorage::new(temp.path().to_path_buf());

        storage.save(&[sample_mutation(), sample_mutation()]).unwrap();
        storage.save(&[]).unwrap();
        assert!(storage.load().unwrap().is_empty());
    }
}

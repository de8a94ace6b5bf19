//! The chunk store. In production this is the relational store named in
//! configuration (`DB_DSN`); this core talks to it only through the
//! [`ChunkRepository`] trait, so the process-local, lock-striped in-memory
//! implementation here is a drop-in stand-in for tests and for the
//! reference deployment described in the design notes.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::CoreResult;
use crate::models::ChunkRecord;

pub trait ChunkRepository: Send + Sync {
    fn get(&self, floor: i32, chunk_index: u32) -> CoreResult<Option<ChunkRecord>>;
    fn put(&self, record: ChunkRecord) -> CoreResult<()>;

    /// Removes a chunk's record. Deleting an already-absent key is not an
    /// error: it returns `Ok(false)`, the not-found signal the spec calls
    /// for rather than a failure to retry.
    fn delete(&self, floor: i32, chunk_index: u32) -> CoreResult<bool>;

    /// Bulk reset. Returns the number of records removed.
    fn delete_all(&self) -> CoreResult<usize>;
}

#[derive(Default)]
pub struct InMemoryChunkRepository {
    records: RwLock<HashMap<(i32, u32), ChunkRecord>>,
}

impl InMemoryChunkRepository {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

impl ChunkRepository for InMemoryChunkRepository {
    fn get(&self, floor: i32, chunk_index: u32) -> CoreResult<Option<ChunkRecord>> {
        Ok(self.records.read().get(&(floor, chunk_index)).cloned())
    }

    fn put(&self, record: ChunkRecord) -> CoreResult<()> {
        self.records
            .write()
            .insert((record.floor, record.chunk_index), record);
        Ok(())
    }

    fn delete(&self, floor: i32, chunk_index: u32) -> CoreResult<bool> {
        Ok(self.records.write().remove(&(floor, chunk_index)).is_some())
    }

    fn delete_all(&self) -> CoreResult<usize> {
        let mut records = self.records.write();
        let count = records.len();
        records.clear();
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn sample(floor: i32, chunk_index: u32) -> ChunkRecord {
        ChunkRecord {
            floor,
            chunk_index,
            version: 1,
            last_modified: Utc::now(),
            is_dirty: false,
            geometry: vec![],
            structure_ids: vec![],
            zone_ids: vec![],
        }
    }

    #[test]
    fn round_trips_a_record() {
        let repo = InMemoryChunkRepository::new();
        assert!(repo.get(0, 5).unwrap().is_none());
        repo.put(sample(0, 5)).unwrap();
        let got = repo.get(0, 5).unwrap().unwrap();
        assert_eq!(got.chunk_index, 5);
    }

    #[test]
    fn keys_are_scoped_by_floor() {
        let repo = InMemoryChunkRepository::new();
        repo.put(sample(0, 5)).unwrap();
        repo.put(sample(1, 5)).unwrap();
        assert_eq!(repo.get(0, 5).unwrap().unwrap().floor, 0);
        assert_eq!(repo.get(1, 5).unwrap().unwrap().floor, 1);
    }

    #[test]
    fn delete_is_idempotent() {
        let repo = InMemoryChunkRepository::new();
        repo.put(sample(0, 5)).unwrap();
        assert!(repo.delete(0, 5).unwrap());
        assert!(!repo.delete(0, 5).unwrap());
        assert!(repo.get(0, 5).unwrap().is_none());
    }

    #[test]
    fn delete_all_clears_everything_and_reports_the_count() {
        let repo = InMemoryChunkRepository::new();
        repo.put(sample(0, 1)).unwrap();
        repo.put(sample(0, 2)).unwrap();
        repo.put(sample(1, 1)).unwrap();
        assert_eq!(repo.delete_all().unwrap(), 3);
        assert!(repo.get(0, 1).unwrap().is_none());
        assert_eq!(repo.delete_all().unwrap(), 0);
    }
}

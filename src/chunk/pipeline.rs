//! Orchestrates "read cache, or generate and write through" for a single
//! chunk key, guaranteeing at most one in-flight generation per key
//! (invariant 5) via a striped map of per-key `tokio::sync::Mutex`es, and
//! degrading to a stub chunk rather than failing the whole stream when
//! generation or storage breaks (invariant described in the dependency
//! degrade policy).

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex as SyncMutex;
use tokio::sync::Mutex as AsyncMutex;
use tracing::warn;

use crate::chunk::procedural::{ProceduralGenerator, StubGenerator};
use crate::chunk::repository::ChunkRepository;
use crate::geometry::CompressionCodec;
use crate::models::{ChunkData, ChunkId, ChunkRecord, Lod, CURRENT_VERSION};

pub struct ChunkPipeline {
    repository: Arc<dyn ChunkRepository>,
    generator: Arc<dyn ProceduralGenerator>,
    fallback: StubGenerator,
    codec: CompressionCodec,
    locks: SyncMutex<HashMap<ChunkId, Arc<AsyncMutex<()>>>>,
}

impl ChunkPipeline {
    pub fn new(
        repository: Arc<dyn ChunkRepository>,
        generator: Arc<dyn ProceduralGenerator>,
        codec: CompressionCodec,
    ) -> Self {
        Self {
            repository,
            generator,
            fallback: StubGenerator,
            codec,
            locks: SyncMutex::new(HashMap::new()),
        }
    }

    fn lock_for(&self, id: ChunkId) -> Arc<AsyncMutex<()>> {
        self.locks
            .lock()
            .entry(id)
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    /// Fetches a chunk by id at the default (medium) LOD. See
    /// [`Self::get_or_generate_with_lod`].
    pub async fn get_or_generate(&self, id: ChunkId) -> ChunkData {
        self.get_or_generate_with_lod(id, Lod::default()).await
    }

    /// Fetches a chunk by id, generating and caching it on a cache miss.
    /// `lod` is forwarded to the procedural generator only — a cached
    /// record is served regardless of which LOD it was generated at, since
    /// the repository keeps one record per `(floor, chunk_index)` rather
    /// than per-LOD. Returns wire-ready [`ChunkData`]; never returns a hard
    /// error for a generation failure — it degrades to a stub chunk and
    /// logs instead, so a single bad chunk never takes down the whole
    /// subscription.
    pub async fn get_or_generate_with_lod(&self, id: ChunkId, lod: Lod) -> ChunkData {
        let key_lock = self.lock_for(id);
        let _guard = key_lock.lock().await;

        let existing = self.repository.get(id.floor, id.chunk_index).ok().flatten();
        if let Some(record) = &existing {
            if record.version >= CURRENT_VERSION && !record.is_dirty {
                return self.record_to_wire(record);
            }
        }

        let generated = match self.generator.generate(id.floor, id.chunk_index, lod).await {
            Ok(g) => g,
            Err(e) => {
                // Present-but-stale: serve the stale geometry rather than
                // replacing it with a stub (spec §4.6 branch 2). Absent:
                // no stale geometry to fall back to, so stub it.
                if let Some(record) = existing {
                    warn!(floor = id.floor, chunk_index = id.chunk_index, error = %e, "procedural generation degraded to stale geometry");
                    return self.record_to_wire(&record);
                }
                warn!(floor = id.floor, chunk_index = id.chunk_index, error = %e, "procedural generation degraded to stub");
                self.fallback
                    .generate(id.floor, id.chunk_index, lod)
                    .await
                    .expect("stub generator never fails")
            }
        };

        let compressed = self.codec.encode(&generated.geometry);
        let now = chrono::Utc::now();
        let record = ChunkRecord {
            floor: id.floor,
            chunk_index: id.chunk_index,
            version: generated.version,
            last_modified: now,
            is_dirty: false,
            geometry: compressed.data.clone().into_bytes(),
            structure_ids: generated.structure_ids,
            zone_ids: generated.zone_ids,
        };

        if let Err(e) = self.repository.put(record.clone()) {
            warn!(floor = id.floor, chunk_index = id.chunk_index, error = %e, "chunk write-through failed, serving ungcached result");
        }

        ChunkData {
            id,
            version: record.version,
            last_modified: record.last_modified,
            is_dirty: record.is_dirty,
            geometry: Some(compressed),
        }
    }

    /// Fetches many chunks concurrently, preserving the caller's ordering.
    pub async fn get_or_generate_many(&self, ids: &[ChunkId]) -> Vec<ChunkData> {
        let futures = ids.iter().map(|id| self.get_or_generate(*id));
        futures_util::future::join_all(futures).await
    }

    fn record_to_wire(&self, record: &ChunkRecord) -> ChunkData {
        // The cached geometry is the already-compressed payload produced by
        // `encode`; its tolerance and encoding tag travel with it, so it's
        // replayed as-is rather than decoded and re-encoded.
        let data = String::from_utf8(record.geometry.clone()).unwrap_or_default();
        let geometry = if data.is_empty() {
            None
        } else {
            Some(crate::models::CompressedGeometry {
                encoding: "quant16+fixed".to_string(),
                size: data.len(),
                uncompressed_size: data.len(),
                tolerance: self.codec.tolerance,
                data,
            })
        };
        ChunkData {
            id: ChunkId::new(record.floor, record.chunk_index),
            version: record.version,
            last_modified: record.last_modified,
            is_dirty: record.is_dirty,
            geometry,
        }
    }

    /// Invalidates a cached chunk by bumping it past [`CURRENT_VERSION`]'s
    /// generation, forcing the next fetch to regenerate it.
    pub fn invalidate(&self, id: ChunkId) {
        if let Ok(Some(mut record)) = self.repository.get(id.floor, id.chunk_index) {
            record.is_dirty = true;
            let _ = self.repository.put(record);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::repository::InMemoryChunkRepository;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingGenerator {
        calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl ProceduralGenerator for CountingGenerator {
        async fn generate(
            &self,
            floor: i32,
            chunk_index: u32,
            lod: Lod,
        ) -> Result<crate::models::GeneratedChunk, crate::error::CoreError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            StubGenerator.generate(floor, chunk_index, lod).await
        }
    }

    #[tokio::test]
    async fn cache_miss_generates_then_caches() {
        let repo = InMemoryChunkRepository::new();
        let generator = Arc::new(CountingGenerator { calls: AtomicUsize::new(0) });
        let pipeline = ChunkPipeline::new(repo, generator.clone(), CompressionCodec::default());

        let id = ChunkId::new(0, 3);
        let first = pipeline.get_or_generate(id).await;
        let second = pipeline.get_or_generate(id).await;

        assert_eq!(generator.calls.load(Ordering::SeqCst), 1);
        assert_eq!(first.version, second.version);
    }

    #[tokio::test]
    async fn concurrent_requests_for_the_same_key_generate_once() {
        let repo = InMemoryChunkRepository::new();
        let generator = Arc::new(CountingGenerator { calls: AtomicUsize::new(0) });
        let pipeline = Arc::new(ChunkPipeline::new(repo, generator.clone(), CompressionCodec::default()));

        let id = ChunkId::new(0, 9);
        let mut handles = Vec::new();
        for _ in 0..8 {
            let pipeline = pipeline.clone();
            handles.push(tokio::spawn(async move { pipeline.get_or_generate(id).await }));
        }
        for h in handles {
            h.await.unwrap();
        }

        assert_eq!(generator.calls.load(Ordering::SeqCst), 1);
    }

    struct AlwaysFailingGenerator;

    #[async_trait::async_trait]
    impl ProceduralGenerator for AlwaysFailingGenerator {
        async fn generate(
            &self,
            floor: i32,
            chunk_index: u32,
            _lod: Lod,
        ) -> Result<crate::models::GeneratedChunk, crate::error::CoreError> {
            Err(crate::error::CoreError::ProceduralGeneration {
                floor,
                chunk_index,
                source: anyhow::anyhow!("generator unreachable"),
            })
        }
    }

    #[tokio::test]
    async fn stale_record_is_served_when_regeneration_fails() {
        let repo = InMemoryChunkRepository::new();
        repo.put(ChunkRecord {
            floor: 0,
            chunk_index: 4,
            version: 0,
            last_modified: chrono::Utc::now(),
            is_dirty: false,
            geometry: b"stale-bytes".to_vec(),
            structure_ids: vec![],
            zone_ids: vec![],
        })
        .unwrap();

        let pipeline = ChunkPipeline::new(repo, Arc::new(AlwaysFailingGenerator), CompressionCodec::default());
        let data = pipeline.get_or_generate(ChunkId::new(0, 4)).await;

        assert_eq!(data.version, 0, "stale record is served as-is, not upgraded");
        assert!(data.geometry.is_some());
    }

    #[tokio::test]
    async fn absent_chunk_degrades_to_stub_when_generation_fails() {
        let repo = InMemoryChunkRepository::new();
        let pipeline = ChunkPipeline::new(repo, Arc::new(AlwaysFailingGenerator), CompressionCodec::default());
        let data = pipeline.get_or_generate(ChunkId::new(0, 4)).await;
        assert_eq!(data.version, CURRENT_VERSION);
        assert!(data.geometry.is_some());
    }
}

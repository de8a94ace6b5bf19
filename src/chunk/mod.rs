//! The chunk pipeline: fetch-or-generate-and-cache terrain data for a single
//! `(floor, chunk_index)` key, with at-most-one procedural generation in
//! flight per key and graceful degradation when generation or storage fails.

pub mod pipeline;
pub mod procedural;
pub mod repository;

pub use pipeline::ChunkPipeline;
pub use procedural::{HttpProceduralClient, ProceduralGenerator};
pub use repository::{ChunkRepository, InMemoryChunkRepository};

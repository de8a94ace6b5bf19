//! The procedural generation RPC boundary. [`ProceduralGenerator`] is the
//! seam the chunk pipeline calls through; [`HttpProceduralClient`] is the
//! production implementation, talking to the service named by
//! `PROCEDURAL_BASE_URL` with a bounded retry budget and exponential
//! backoff. Generation failures are always returned as
//! `CoreError::ProceduralGeneration`, which the pipeline treats as
//! degradable rather than fatal.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::CoreError;
use crate::models::{ChunkGeometry, GeneratedChunk, Lod, CURRENT_VERSION};

#[async_trait]
pub trait ProceduralGenerator: Send + Sync {
    async fn generate(&self, floor: i32, chunk_index: u32, lod: Lod) -> Result<GeneratedChunk, CoreError>;
}

pub struct HttpProceduralClient {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
    retry_count: u32,
}

impl HttpProceduralClient {
    pub fn new(base_url: String, timeout: Duration, retry_count: u32) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
            timeout,
            retry_count,
        }
    }

    async fn call_once(&self, floor: i32, chunk_index: u32, lod: Lod) -> anyhow::Result<GeneratedChunk> {
        #[derive(Deserialize)]
        struct Response {
            version: u64,
            geometry: ChunkGeometry,
            #[serde(default)]
            structure_ids: Vec<i64>,
            #[serde(default)]
            zone_ids: Vec<i64>,
        }

        let lod_tag = match lod {
            Lod::Low => "low",
            Lod::Medium => "medium",
            Lod::High => "high",
        };
        let url = format!("{}/chunks/{floor}/{chunk_index}", self.base_url);
        let resp = self
            .client
            .get(&url)
            .query(&[("lod", lod_tag)])
            .timeout(self.timeout)
            .send()
            .await?
            .error_for_status()?
            .json::<Response>()
            .await?;

        Ok(GeneratedChunk {
            version: if resp.version == 0 { CURRENT_VERSION } else { resp.version },
            geometry: resp.geometry,
            structure_ids: resp.structure_ids,
            zone_ids: resp.zone_ids,
        })
    }
}

#[async_trait]
impl ProceduralGenerator for HttpProceduralClient {
    async fn generate(&self, floor: i32, chunk_index: u32, lod: Lod) -> Result<GeneratedChunk, CoreError> {
        let mut last_err = None;
        for attempt in 0..=self.retry_count {
            match self.call_once(floor, chunk_index, lod).await {
                Ok(chunk) => return Ok(chunk),
                Err(e) => {
                    last_err = Some(e);
                    if attempt < self.retry_count {
                        let backoff = Duration::from_millis(100 * 2u64.pow(attempt));
                        tokio::time::sleep(backoff).await;
                    }
                }
            }
        }
        Err(CoreError::ProceduralGeneration {
            floor,
            chunk_index,
            source: last_err.unwrap_or_else(|| anyhow::anyhow!("no attempts were made")),
        })
    }
}

/// A deterministic, offline stand-in for [`HttpProceduralClient`]: used in
/// tests and as the degrade-to fallback when the real service is
/// unreachable and no cached record exists either.
pub struct StubGenerator;

#[async_trait]
impl ProceduralGenerator for StubGenerator {
    async fn generate(&self, _floor: i32, chunk_index: u32, _lod: Lod) -> Result<GeneratedChunk, CoreError> {
        use crate::models::{Bounds, Vec3f};

        let base = chunk_index as f32;
        Ok(GeneratedChunk {
            version: CURRENT_VERSION,
            geometry: ChunkGeometry {
                vertices: vec![
                    Vec3f { x: base, y: 0.0, z: 0.0 },
                    Vec3f { x: base + 1.0, y: 0.0, z: 0.0 },
                    Vec3f { x: base, y: 0.0, z: 1.0 },
                ],
                faces: vec![[0, 1, 2]],
                normals: vec![
                    Vec3f { x: 0.0, y: 1.0, z: 0.0 },
                    Vec3f { x: 0.0, y: 1.0, z: 0.0 },
                    Vec3f { x: 0.0, y: 1.0, z: 0.0 },
                ],
                bounds: Bounds {
                    min: Vec3f { x: base, y: 0.0, z: 0.0 },
                    max: Vec3f { x: base + 1.0, y: 0.0, z: 1.0 },
                },
                type_tag: "stub".to_string(),
            },
            structure_ids: vec![],
            zone_ids: vec![],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stub_generator_always_succeeds() {
        let gen = StubGenerator;
        let chunk = gen.generate(0, 7, Lod::Medium).await.unwrap();
        assert_eq!(chunk.version, CURRENT_VERSION);
        assert_eq!(chunk.geometry.type_tag, "stub");
    }
}

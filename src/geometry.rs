//! Geometry compression codec (spec §4.2).
//!
//! Vertices and normals are quantized to 16-bit signed fixed point within the
//! chunk's bounding box; faces are delta-free `u32` triplets (already
//! compact, not worth quantizing further). The codec is deterministic and
//! the tolerance travels with the payload so a decoder — or a test —  can
//! bound the reconstruction error.

use base64::Engine as _;
use serde::{Deserialize, Serialize};

use crate::models::{Bounds, ChunkGeometry, CompressedGeometry, Vec3f};

/// Default quantization tolerance: 1 cm, expressed in the geometry's units (meters).
pub const DEFAULT_TOLERANCE: f32 = 0.01;

const ENCODING_TAG: &str = "quant16+fixed";

#[derive(Debug, Clone, Copy)]
pub struct CompressionCodec {
    pub tolerance: f32,
}

impl Default for CompressionCodec {
    fn default() -> Self {
        Self {
            tolerance: DEFAULT_TOLERANCE,
        }
    }
}

/// The on-wire byte layout before base64 encoding, kept private to this
/// module — callers only see [`CompressedGeometry`].
#[derive(Debug, Serialize, Deserialize)]
struct Payload {
    bounds: Bounds,
    vertex_count: u32,
    vertices_q: Vec<[i16; 3]>,
    normals_q: Vec<[i16; 3]>,
    faces: Vec<[u32; 3]>,
    type_tag: String,
}

impl CompressionCodec {
    pub fn new(tolerance: f32) -> Self {
        Self { tolerance }
    }

    /// Estimates the size, in bytes, of the uncompressed geometry: three
    /// `f32`s per vertex and per normal, plus three `u32`s per face.
    pub fn estimate_uncompressed_size(geometry: &ChunkGeometry) -> usize {
        geometry.vertices.len() * std::mem::size_of::<Vec3f>()
            + geometry.normals.len() * std::mem::size_of::<Vec3f>()
            + geometry.faces.len() * std::mem::size_of::<[u32; 3]>()
    }

    /// Encodes `geometry` deterministically into a compact byte blob.
    pub fn encode(&self, geometry: &ChunkGeometry) -> CompressedGeometry {
        let scale = QuantizationScale::for_bounds(&geometry.bounds, self.tolerance);

        let vertices_q = geometry
            .vertices
            .iter()
            .map(|v| scale.quantize(*v))
            .collect();
        let normals_q = geometry
            .normals
            .iter()
            .map(|v| scale.quantize_unit(*v))
            .collect();

        let payload = Payload {
            bounds: geometry.bounds,
            vertex_count: geometry.vertices.len() as u32,
            vertices_q,
            normals_q,
            faces: geometry.faces.clone(),
            type_tag: geometry.type_tag.clone(),
        };

        let uncompressed_size = Self::estimate_uncompressed_size(geometry);
        let bytes = bincode_encode(&payload);
        let size = bytes.len();

        CompressedGeometry {
            encoding: ENCODING_TAG.to_string(),
            data: base64::engine::general_purpose::STANDARD.encode(bytes),
            size,
            uncompressed_size,
            tolerance: self.tolerance,
        }
    }

    /// Decodes a previously-encoded blob back into a [`ChunkGeometry`],
    /// within `compressed.tolerance` of the original per-component values.
    pub fn decode(compressed: &CompressedGeometry) -> anyhow::Result<ChunkGeometry> {
        anyhow::ensure!(
            compressed.encoding == ENCODING_TAG,
            "unsupported geometry encoding: {}",
            compressed.encoding
        );
        let bytes = base64::engine::general_purpose::STANDARD.decode(&compressed.data)?;
        let payload: Payload = bincode_decode(&bytes)?;

        let scale = QuantizationScale::for_bounds(&payload.bounds, compressed.tolerance);

        let vertices = payload
            .vertices_q
            .iter()
            .map(|q| scale.dequantize(*q))
            .collect();
        let normals = payload
            .normals_q
            .iter()
            .map(|q| scale.dequantize_unit(*q))
            .collect();

        Ok(ChunkGeometry {
            vertices,
            faces: payload.faces,
            normals,
            bounds: payload.bounds,
            type_tag: payload.type_tag,
        })
    }
}

/// Per-axis scale factors mapping `[min, max]` onto the `i16` range, derived
/// from the bounding box and the configured tolerance.
struct QuantizationScale {
    min: [f32; 3],
    step: [f32; 3],
}

impl QuantizationScale {
    fn for_bounds(bounds: &Bounds, tolerance: f32) -> Self {
        let min = [bounds.min.x, bounds.min.y, bounds.min.z];
        let max = [bounds.max.x, bounds.max.y, bounds.max.z];
        let mut step = [0.0f32; 3];
        for i in 0..3 {
            let extent = (max[i] - min[i]).max(tolerance);
            // Quarter the tolerance so rounding error stays within it.
            let needed_steps = (extent / (tolerance.max(f32::EPSILON) / 2.0)).ceil();
            let steps = needed_steps.clamp(1.0, i16::MAX as f32 * 2.0);
            step[i] = extent / steps;
        }
        Self { min, step }
    }

    fn quantize_component(&self, v: f32, axis: usize) -> i16 {
        let step = self.step[axis].max(f32::EPSILON);
        let normalized = ((v - self.min[axis]) / step).round();
        normalized.clamp(i16::MIN as f32, i16::MAX as f32) as i16
    }

    fn dequantize_component(&self, q: i16, axis: usize) -> f32 {
        self.min[axis] + (q as f32) * self.step[axis]
    }

    fn quantize(&self, v: Vec3f) -> [i16; 3] {
        [
            self.quantize_component(v.x, 0),
            self.quantize_component(v.y, 1),
            self.quantize_component(v.z, 2),
        ]
    }

    fn dequantize(&self, q: [i16; 3]) -> Vec3f {
        Vec3f {
            x: self.dequantize_component(q[0], 0),
            y: self.dequantize_component(q[1], 1),
            z: self.dequantize_component(q[2], 2),
        }
    }

    /// Normals live in `[-1, 1]` regardless of the geometry's bounds, so they
    /// get their own fixed scale rather than the position scale.
    fn quantize_unit(&self, v: Vec3f) -> [i16; 3] {
        let q = |c: f32| (c.clamp(-1.0, 1.0) * i16::MAX as f32).round() as i16;
        [q(v.x), q(v.y), q(v.z)]
    }

    fn dequantize_unit(&self, q: [i16; 3]) -> Vec3f {
        let d = |c: i16| c as f32 / i16::MAX as f32;
        Vec3f {
            x: d(q[0]),
            y: d(q[1]),
            z: d(q[2]),
        }
    }
}

fn bincode_encode<T: Serialize>(value: &T) -> Vec<u8> {
    // `serde_json` is already a dependency and keeps the codec free of a
    // second serialization format; the bytes are opaque to clients either
    // way, only `size` and `uncompressed_size` are observed on the wire.
    serde_json::to_vec(value).expect("geometry payload is always serializable")
}

fn bincode_decode<T: for<'de> Deserialize<'de>>(bytes: &[u8]) -> anyhow::Result<T> {
    Ok(serde_json::from_slice(bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ChunkGeometry;
    use proptest::prelude::*;

    fn sample_geometry() -> ChunkGeometry {
        ChunkGeometry {
            vertices: vec![
                Vec3f { x: 0.0, y: 0.0, z: 0.0 },
                Vec3f { x: 10.0, y: 5.0, z: -3.0 },
                Vec3f { x: -4.5, y: 8.25, z: 1.0 },
            ],
            faces: vec![[0, 1, 2]],
            normals: vec![
                Vec3f { x: 0.0, y: 1.0, z: 0.0 },
                Vec3f { x: 0.0, y: 1.0, z: 0.0 },
                Vec3f { x: 0.0, y: 1.0, z: 0.0 },
            ],
            bounds: Bounds {
                min: Vec3f { x: -4.5, y: 0.0, z: -3.0 },
                max: Vec3f { x: 10.0, y: 8.25, z: 1.0 },
            },
            type_tag: "ring_floor".to_string(),
        }
    }

    #[test]
    fn encode_is_deterministic() {
        let geom = sample_geometry();
        let codec = CompressionCodec::default();
        let a = codec.encode(&geom);
        let b = codec.encode(&geom);
        assert_eq!(a.data, b.data);
        assert_eq!(a.size, b.size);
    }

    #[test]
    fn round_trip_within_tolerance() {
        let geom = sample_geometry();
        let codec = CompressionCodec::default();
        let compressed = codec.encode(&geom);
        let decoded = CompressionCodec::decode(&compressed).unwrap();

        assert_eq!(decoded.vertices.len(), geom.vertices.len());
        for (orig, got) in geom.vertices.iter().zip(decoded.vertices.iter()) {
            assert!((orig.x - got.x).abs() <= codec.tolerance);
            assert!((orig.y - got.y).abs() <= codec.tolerance);
            assert!((orig.z - got.z).abs() <= codec.tolerance);
        }
        assert_eq!(decoded.faces, geom.faces);
    }

    #[test]
    fn compressed_payload_carries_tolerance() {
        let geom = sample_geometry();
        let codec = CompressionCodec::new(0.05);
        let compressed = codec.encode(&geom);
        assert_eq!(compressed.tolerance, 0.05);
        assert!(compressed.uncompressed_size > 0);
    }

    proptest! {
        #[test]
        fn round_trip_holds_for_arbitrary_points(
            xs in prop::collection::vec(-1000.0f32..1000.0, 1..8),
            ys in prop::collection::vec(-1000.0f32..1000.0, 1..8),
            zs in prop::collection::vec(-1000.0f32..1000.0, 1..8),
        ) {
            let n = xs.len().min(ys.len()).min(zs.len());
            let vertices: Vec<Vec3f> = (0..n)
                .map(|i| Vec3f { x: xs[i], y: ys[i], z: zs[i] })
                .collect();
            let min = Vec3f {
                x: vertices.iter().map(|v| v.x).fold(f32::INFINITY, f32::min),
                y: vertices.iter().map(|v| v.y).fold(f32::INFINITY, f32::min),
                z: vertices.iter().map(|v| v.z).fold(f32::INFINITY, f32::min),
            };
            let max = Vec3f {
                x: vertices.iter().map(|v| v.x).fold(f32::NEG_INFINITY, f32::max),
                y: vertices.iter().map(|v| v.y).fold(f32::NEG_INFINITY, f32::max),
                z: vertices.iter().map(|v| v.z).fold(f32::NEG_INFINITY, f32::max),
            };
            let geom = ChunkGeometry {
                vertices: vertices.clone(),
                faces: vec![],
                normals: vertices.iter().map(|_| Vec3f { x: 0.0, y: 1.0, z: 0.0 }).collect(),
                bounds: Bounds { min, max },
                type_tag: "ring_floor".to_string(),
            };
            let codec = CompressionCodec::default();
            let compressed = codec.encode(&geom);
            let decoded = CompressionCodec::decode(&compressed).unwrap();
            for (orig, got) in geom.vertices.iter().zip(decoded.vertices.iter()) {
                prop_assert!((orig.x - got.x).abs() <= codec.tolerance + 1e-4);
                prop_assert!((orig.y - got.y).abs() <= codec.tolerance + 1e-4);
                prop_assert!((orig.z - got.z).abs() <= codec.tolerance + 1e-4);
            }
        }
    }
}

//! The data model shared by every layer of the streaming core: poses,
//! subscription requests, chunk/zone identities and records, and the deltas
//! the subscription manager hands back to sessions.
//!
//! Coordinate duality lives in exactly one place here ([`RawPose::canonical`])
//! so every downstream module only ever sees [`CameraPose`] in ring-arc form.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::ringmap::RingGeometry;

// ---------------------------------------------------------------------------
// Chunk identity
// ---------------------------------------------------------------------------

/// `"{floor}_{chunk_index}"`. `chunk_index` is always index-normalized
/// before a `ChunkId` is constructed, so equality is just structural
/// equality of the two fields (invariant 1 in the spec).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChunkId {
    pub floor: i32,
    pub chunk_index: u32,
}

impl ChunkId {
    pub fn new(floor: i32, chunk_index: u32) -> Self {
        Self { floor, chunk_index }
    }

    /// Normalizes `chunk_index` against `geometry` before constructing.
    pub fn normalized(floor: i32, chunk_index: i64, geometry: &RingGeometry) -> Self {
        let idx = geometry.validate_chunk_index(chunk_index) as u32;
        Self::new(floor, idx)
    }
}

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.floor, self.chunk_index)
    }
}

impl FromStr for ChunkId {
    type Err = crate::error::CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (floor_s, idx_s) = s
            .split_once('_')
            .ok_or_else(|| crate::error::CoreError::InvalidMessageFormat(format!(
                "chunk id '{s}' is not of the form '<floor>_<index>'"
            )))?;
        let floor: i32 = floor_s
            .parse()
            .map_err(|_| crate::error::CoreError::InvalidMessageFormat(format!(
                "chunk id '{s}' has a non-integer floor"
            )))?;
        let chunk_index: u32 = idx_s
            .parse()
            .map_err(|_| crate::error::CoreError::InvalidMessageFormat(format!(
                "chunk id '{s}' has a non-integer chunk index"
            )))?;
        Ok(Self { floor, chunk_index })
    }
}

impl Serialize for ChunkId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for ChunkId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_str(&s).map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// Pose
// ---------------------------------------------------------------------------

/// The pose as it may arrive on the wire: either ring-arc fields or the
/// legacy rectangular `(x, y)` pair. Exactly one of the two shapes is
/// expected to be populated; [`RawPose::canonical`] is the single place that
/// branches on which one it is.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawPose {
    pub ring_position: Option<i64>,
    pub width_offset: Option<f64>,
    #[serde(default)]
    pub x: Option<f64>,
    #[serde(default)]
    pub y: Option<f64>,
    #[serde(default)]
    pub elevation: f64,
    pub active_floor: i32,
}

/// The canonical, ring-arc representation of a camera pose. Every component
/// downstream of the subscription manager consumes only this shape.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraPose {
    /// Arc position `s`, in `[0, C)`.
    pub ring_position: i64,
    /// Radial offset `r`, in `[-W/2, W/2]`.
    pub width_offset: f64,
    /// Vertical elevation `z`.
    pub elevation: f64,
    pub active_floor: i32,
}

impl RawPose {
    /// Converts whichever wire shape was populated into the canonical form,
    /// wrapping the ring position against `geometry`.
    ///
    /// When both ring-arc and rectangular fields are present, ring-arc wins
    /// (it's the canonical shape; rectangular is accepted only from older
    /// clients that haven't migrated).
    pub fn canonical(&self, geometry: &RingGeometry) -> CameraPose {
        let (s, r) = match (self.ring_position, self.x, self.y) {
            (Some(s), _, _) => (s, self.width_offset.unwrap_or(0.0)),
            (None, Some(x), y) => (x.round() as i64, y.unwrap_or(0.0)),
            (None, None, _) => (0, self.width_offset.unwrap_or(0.0)),
        };
        CameraPose {
            ring_position: geometry.wrap_position(s),
            width_offset: r,
            elevation: self.elevation,
            active_floor: self.active_floor,
        }
    }
}

// ---------------------------------------------------------------------------
// Subscription request / delta
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SubscriptionRequest {
    pub pose: RawPose,
    pub radius: f64,
    pub width: f64,
    #[serde(default = "default_true")]
    pub include_chunks: bool,
    #[serde(default = "default_true")]
    pub include_zones: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ChunkDelta {
    pub added: Vec<ChunkId>,
    pub removed: Vec<ChunkId>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ZoneDelta {
    pub added: Vec<i64>,
    pub removed: Vec<i64>,
}

// ---------------------------------------------------------------------------
// Chunk geometry / records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Vec3f {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min: Vec3f,
    pub max: Vec3f,
}

/// The single internal representation of a chunk's spatial payload. Encoders
/// and decoders live at the repository boundary; nothing past this point
/// branches on "is this a map?" (see DESIGN.md / REDESIGN FLAGS).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkGeometry {
    pub vertices: Vec<Vec3f>,
    pub faces: Vec<[u32; 3]>,
    pub normals: Vec<Vec3f>,
    pub bounds: Bounds,
    pub type_tag: String,
}

/// The compressed, wire-ready form of a [`ChunkGeometry`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompressedGeometry {
    pub encoding: String,
    pub data: String, // base64
    pub size: usize,
    pub uncompressed_size: usize,
    pub tolerance: f32,
}

pub const CURRENT_VERSION: u64 = 1;

/// Level of detail requested for a chunk's geometry. Opaque to everything
/// but the procedural generator, which it's forwarded to verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Lod {
    Low,
    #[default]
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkRecord {
    pub floor: i32,
    pub chunk_index: u32,
    pub version: u64,
    pub last_modified: DateTime<Utc>,
    pub is_dirty: bool,
    pub geometry: Vec<u8>, // opaque persisted representation
    pub structure_ids: Vec<i64>,
    pub zone_ids: Vec<i64>,
}

/// What the procedural client hands back for one chunk.
#[derive(Debug, Clone)]
pub struct GeneratedChunk {
    pub version: u64,
    pub geometry: ChunkGeometry,
    pub structure_ids: Vec<i64>,
    pub zone_ids: Vec<i64>,
}

/// One entry in a `stream_delta`/`stream_ack` payload.
#[derive(Debug, Clone, Serialize)]
pub struct ChunkData {
    pub id: ChunkId,
    pub version: u64,
    pub last_modified: DateTime<Utc>,
    pub is_dirty: bool,
    pub geometry: Option<CompressedGeometry>,
}

// ---------------------------------------------------------------------------
// Zones
// ---------------------------------------------------------------------------

/// A point in the ring's canonical `(arc, radial)` plane.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ArcPoint {
    pub s: f64,
    pub r: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Polygon {
    pub points: Vec<ArcPoint>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Zone {
    pub id: i64,
    pub name: String,
    pub zone_type: String,
    pub floor: i32,
    pub owner_id: Option<i64>,
    pub is_system_zone: bool,
    #[serde(default)]
    pub full_ring: bool,
    pub properties: serde_json::Value,
    pub metadata: serde_json::Value,
    pub geometry: Polygon,
    pub area: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Zone {
    /// True when this zone should bypass the active-floor filter (invariant 5).
    pub fn retained_regardless_of_floor(&self) -> bool {
        self.is_system_zone || self.full_ring
    }
}

/// Axis-aligned bounding box in the canonical `(arc, radial)` plane.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ArcBoundingBox {
    pub min_s: f64,
    pub min_r: f64,
    pub max_s: f64,
    pub max_r: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_id_round_trips_through_string() {
        let id = ChunkId::new(-2, 42);
        let s = id.to_string();
        assert_eq!(s, "-2_42");
        let parsed: ChunkId = s.parse().unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn chunk_id_rejects_malformed_strings() {
        assert!("nope".parse::<ChunkId>().is_err());
        assert!("1_".parse::<ChunkId>().is_err());
        assert!("_1".parse::<ChunkId>().is_err());
    }

    #[test]
    fn raw_pose_prefers_ring_arc_over_rectangular() {
        let geom = RingGeometry::new(1000, 10);
        let raw = RawPose {
            ring_position: Some(5),
            width_offset: Some(1.0),
            x: Some(999.0),
            y: Some(2.0),
            elevation: 0.0,
            active_floor: 0,
        };
        let pose = raw.canonical(&geom);
        assert_eq!(pose.ring_position, 5);
        assert_eq!(pose.width_offset, 1.0);
    }

    #[test]
    fn raw_pose_falls_back_to_rectangular() {
        let geom = RingGeometry::new(1000, 10);
        let raw = RawPose {
            ring_position: None,
            width_offset: None,
            x: Some(1050.0),
            y: Some(3.0),
            elevation: 0.0,
            active_floor: 0,
        };
        let pose = raw.canonical(&geom);
        assert_eq!(pose.ring_position, 50);
        assert_eq!(pose.width_offset, 3.0);
    }
}

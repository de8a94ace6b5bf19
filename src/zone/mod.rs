//! The zone pipeline: named regions (plots, system zones, points of
//! interest) queried by an arc-aligned bounding box around a subscriber's
//! pose, with system and full-ring zones always retained regardless of the
//! active floor.

pub mod pipeline;
pub mod repository;

pub use pipeline::ZonePipeline;
pub use repository::{InMemoryZoneRepository, OverlapPolicy, ZoneRepository};

//! Computes the zone set visible to a subscriber: an arc-aligned bounding
//! box around the pose, split into two non-wrapping windows when the
//! requested radius crosses the ring's seam, deduplicated by zone id.

use std::collections::HashSet;
use std::sync::Arc;

use crate::error::CoreError;
use crate::models::{ArcBoundingBox, CameraPose, Zone};
use crate::ringmap::RingGeometry;
use crate::zone::repository::ZoneRepository;

pub struct ZonePipeline {
    repository: Arc<dyn ZoneRepository>,
}

impl ZonePipeline {
    pub fn new(repository: Arc<dyn ZoneRepository>) -> Self {
        Self { repository }
    }

    /// Zones within `radius` (arc) and `width / 2` (radial) of `pose`, on
    /// `pose.active_floor`, plus any system/full-ring zone whose extent
    /// intersects the window regardless of floor.
    pub fn zones_in_window(
        &self,
        geometry: &RingGeometry,
        pose: &CameraPose,
        radius: f64,
        width: f64,
    ) -> Result<Vec<Zone>, CoreError> {
        let half_width = width / 2.0;
        let min_r = pose.width_offset - half_width;
        let max_r = pose.width_offset + half_width;

        let windows = Self::split_windows(geometry.circumference as f64, pose.ring_position as f64, radius, min_r, max_r);

        let mut seen = HashSet::new();
        let mut zones = Vec::new();
        for bbox in windows {
            for zone in self.repository.list_by_area(bbox, pose.active_floor)? {
                if seen.insert(zone.id) {
                    zones.push(zone);
                }
            }
        }
        Ok(zones)
    }

    /// Splits `[s - radius, s + radius]` into one or two windows so neither
    /// crosses the `[0, C)` seam. When the window would wrap, it's split at
    /// the seam into a tail window `[s - radius, C)` and a head window
    /// `[0, s + radius - C)`.
    fn split_windows(circumference: f64, s: f64, radius: f64, min_r: f64, max_r: f64) -> Vec<ArcBoundingBox> {
        let lo = s - radius;
        let hi = s + radius;

        if lo >= 0.0 && hi <= circumference {
            return vec![ArcBoundingBox { min_s: lo, min_r, max_s: hi, max_r }];
        }

        let mut windows = Vec::with_capacity(2);
        if lo < 0.0 {
            windows.push(ArcBoundingBox {
                min_s: (lo + circumference).max(0.0),
                min_r,
                max_s: circumference,
                max_r,
            });
            windows.push(ArcBoundingBox { min_s: 0.0, min_r, max_s: hi.min(circumference), max_r });
        } else {
            windows.push(ArcBoundingBox { min_s: lo, min_r, max_s: circumference, max_r });
            windows.push(ArcBoundingBox {
                min_s: 0.0,
                min_r,
                max_s: (hi - circumference).min(circumference),
                max_r,
            });
        }
        windows
    }
}

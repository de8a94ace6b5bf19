//! The zone store. Like [`crate::chunk::repository`], this stands in for the
//! relational store named by configuration; the streaming path only ever
//! calls [`ZoneRepository::list_by_area`], but `create`/`update`/`delete`
//! are implemented here too since zone authoring tools share this boundary.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::CoreError;
use crate::models::{ArcBoundingBox, Zone};

/// What to do when a newly authored zone's geometry overlaps an existing
/// zone on the same floor. Overlap is resolved along the arc axis only —
/// these zones are thin ring bands in practice, so a radial-axis clip is
/// rarely needed and isn't implemented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlapPolicy {
    /// Reject the new zone outright.
    Reject,
    /// Split the new zone's arc extent around the overlapping region.
    Bisect,
    /// Shrink the existing zone's arc extent to make room for the new one.
    Subtract,
}

pub trait ZoneRepository: Send + Sync {
    fn list_by_area(&self, bbox: ArcBoundingBox, floor: i32) -> Result<Vec<Zone>, CoreError>;
    fn get(&self, id: i64) -> Result<Option<Zone>, CoreError>;
    fn create(&self, zone: Zone, policy: OverlapPolicy) -> Result<Vec<Zone>, CoreError>;
    fn update(&self, zone: Zone) -> Result<(), CoreError>;
    fn delete(&self, id: i64) -> Result<(), CoreError>;
}

pub struct InMemoryZoneRepository {
    zones: RwLock<HashMap<i64, Zone>>,
    next_id: AtomicI64,
}

impl Default for InMemoryZoneRepository {
    fn default() -> Self {
        Self {
            zones: RwLock::new(HashMap::new()),
            next_id: AtomicI64::new(1),
        }
    }
}

impl InMemoryZoneRepository {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn arc_extent(zone: &Zone) -> (f64, f64) {
        let mut min_s = f64::INFINITY;
        let mut max_s = f64::NEG_INFINITY;
        for p in &zone.geometry.points {
            min_s = min_s.min(p.s);
            max_s = max_s.max(p.s);
        }
        (min_s, max_s)
    }

    fn overlaps(a: &Zone, b_bbox: ArcBoundingBox) -> bool {
        let (min_s, max_s) = Self::arc_extent(a);
        min_s <= b_bbox.max_s && max_s >= b_bbox.min_s
    }
}

impl ZoneRepository for InMemoryZoneRepository {
    fn list_by_area(&self, bbox: ArcBoundingBox, floor: i32) -> Result<Vec<Zone>, CoreError> {
        let zones = self.zones.read();
        Ok(zones
            .values()
            .filter(|z| (z.floor == floor && Self::overlaps(z, bbox)) || z.retained_regardless_of_floor())
            .cloned()
            .collect())
    }

    fn get(&self, id: i64) -> Result<Option<Zone>, CoreError> {
        Ok(self.zones.read().get(&id).cloned())
    }

    fn create(&self, mut zone: Zone, policy: OverlapPolicy) -> Result<Vec<Zone>, CoreError> {
        let (new_min, new_max) = Self::arc_extent(&zone);
        let bbox = ArcBoundingBox {
            min_s: new_min,
            min_r: 0.0,
            max_s: new_max,
            max_r: 0.0,
        };

        let mut zones = self.zones.write();
        let overlapping: Vec<i64> = zones
            .values()
            .filter(|z| z.floor == zone.floor && Self::overlaps(z, bbox))
            .map(|z| z.id)
            .collect();

        if !overlapping.is_empty() {
            match policy {
                OverlapPolicy::Reject => {
                    return Err(CoreError::Repository(format!(
                        "zone geometry overlaps {} existing zone(s) on floor {}",
                        overlapping.len(),
                        zone.floor
                    )));
                }
                OverlapPolicy::Bisect => {
                    // Shrink the new zone to start just past the first
                    // overlapping zone's far edge; a true bisect into two
                    // pieces isn't needed for the single-band case this
                    // store deals with.
                    if let Some(first) = overlapping.first().and_then(|id| zones.get(id)) {
                        let (_, other_max) = Self::arc_extent(first);
                        if let Some(first_point) = zone.geometry.points.iter_mut().find(|p| p.s == new_min) {
                            first_point.s = other_max;
                        }
                    }
                }
                OverlapPolicy::Subtract => {
                    for id in &overlapping {
                        if let Some(existing) = zones.get_mut(id) {
                            let (other_min, _) = Self::arc_extent(existing);
                            for p in existing.geometry.points.iter_mut() {
                                if p.s > other_min {
                                    p.s = new_min;
                                }
                            }
                        }
                    }
                }
            }
        }

        if zone.id == 0 {
            zone.id = self.next_id.fetch_add(1, Ordering::SeqCst);
        }
        let mut affected = vec![zone.clone()];
        if policy == OverlapPolicy::Subtract {
            affected.extend(overlapping.iter().filter_map(|id| zones.get(id).cloned()));
        }
        zones.insert(zone.id, zone);
        Ok(affected)
    }

    fn update(&self, zone: Zone) -> Result<(), CoreError> {
        let mut zones = self.zones.write();
        if !zones.contains_key(&zone.id) {
            return Err(CoreError::NotFound(format!("zone {}", zone.id)));
        }
        zones.insert(zone.id, zone);
        Ok(())
    }

    fn delete(&self, id: i64) -> Result<(), CoreError> {
        self.zones
            .write()
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| CoreError::NotFound(format!("zone {id}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ArcPoint, Polygon};
    use chrono::Utc;

    fn band(id: i64, floor: i32, min_s: f64, max_s: f64, system: bool) -> Zone {
        Zone {
            id,
            name: format!("zone-{id}"),
            zone_type: "plot".to_string(),
            floor,
            owner_id: None,
            is_system_zone: system,
            full_ring: false,
            properties: serde_json::Value::Null,
            metadata: serde_json::Value::Null,
            geometry: Polygon {
                points: vec![
                    ArcPoint { s: min_s, r: -10.0 },
                    ArcPoint { s: max_s, r: -10.0 },
                    ArcPoint { s: max_s, r: 10.0 },
                    ArcPoint { s: min_s, r: 10.0 },
                ],
            },
            area: (max_s - min_s) * 20.0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn list_by_area_finds_overlapping_zones_on_the_same_floor() {
        let repo = InMemoryZoneRepository::new();
        repo.create(band(0, 0, 100.0, 200.0, false), OverlapPolicy::Reject)
            .unwrap();
        let bbox = ArcBoundingBox { min_s: 150.0, min_r: -20.0, max_s: 250.0, max_r: 20.0 };
        let found = repo.list_by_area(bbox, 0).unwrap();
        assert_eq!(found.len(), 1);
    }

    #[test]
    fn system_zones_are_retained_regardless_of_floor() {
        let repo = InMemoryZoneRepository::new();
        repo.create(band(0, 7, 0.0, 50.0, true), OverlapPolicy::Reject)
            .unwrap();
        let bbox = ArcBoundingBox { min_s: 0.0, min_r: -20.0, max_s: 50.0, max_r: 20.0 };
        let found = repo.list_by_area(bbox, 2).unwrap();
        assert_eq!(found.len(), 1);
    }

    #[test]
    fn system_zones_are_retained_even_outside_the_query_window() {
        let repo = InMemoryZoneRepository::new();
        // Far outside the bbox below, and on a different floor too.
        repo.create(band(0, 7, 100_000.0, 100_050.0, true), OverlapPolicy::Reject)
            .unwrap();
        let bbox = ArcBoundingBox { min_s: 0.0, min_r: -20.0, max_s: 50.0, max_r: 20.0 };
        let found = repo.list_by_area(bbox, 2).unwrap();
        assert_eq!(found.len(), 1, "system zones bypass both the floor filter and the window");
    }

    #[test]
    fn full_ring_zones_are_retained_even_outside_the_query_window() {
        let repo = InMemoryZoneRepository::new();
        let mut zone = band(0, 0, 100_000.0, 100_050.0, false);
        zone.full_ring = true;
        repo.create(zone, OverlapPolicy::Reject).unwrap();
        let bbox = ArcBoundingBox { min_s: 0.0, min_r: -20.0, max_s: 50.0, max_r: 20.0 };
        let found = repo.list_by_area(bbox, 0).unwrap();
        assert_eq!(found.len(), 1);
    }

    #[test]
    fn non_system_zones_outside_the_window_are_excluded() {
        let repo = InMemoryZoneRepository::new();
        repo.create(band(0, 0, 100_000.0, 100_050.0, false), OverlapPolicy::Reject)
            .unwrap();
        let bbox = ArcBoundingBox { min_s: 0.0, min_r: -20.0, max_s: 50.0, max_r: 20.0 };
        let found = repo.list_by_area(bbox, 0).unwrap();
        assert!(found.is_empty());
    }

    #[test]
    fn reject_policy_refuses_overlapping_creation() {
        let repo = InMemoryZoneRepository::new();
        repo.create(band(0, 0, 0.0, 100.0, false), OverlapPolicy::Reject)
            .unwrap();
        let result = repo.create(band(0, 0, 50.0, 150.0, false), OverlapPolicy::Reject);
        assert!(result.is_err());
    }

    #[test]
    fn delete_of_unknown_zone_is_not_found() {
        let repo = InMemoryZoneRepository::new();
        assert!(repo.delete(999).is_err());
    }
}

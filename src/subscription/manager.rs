//! Tracks one [`Subscription`] per active stream. The delta between two
//! poses is always computed the same way: gather the new interest set in
//! closest-first spiral order, diff it against the stored set, and replace
//! the stored set with the new one — the same shape as the tracker
//! recomputation pattern this module is grounded on. Removed ids come from
//! a plain `HashSet::difference` (order is unconstrained there); added ids
//! are derived by filtering the ordered spiral list instead, so emission
//! order is preserved end to end.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::RwLock;
use uuid::Uuid;

use crate::auth::UserId;
use crate::chunk::ChunkPipeline;
use crate::error::CoreError;
use crate::models::{
    CameraPose, ChunkData, ChunkDelta, ChunkId, RawPose, SubscriptionRequest, Zone, ZoneDelta,
};
use crate::ringmap::RingGeometry;
use crate::zone::ZonePipeline;

#[derive(Debug, Clone)]
pub struct Subscription {
    pub id: Uuid,
    pub user_id: UserId,
    pub pose: CameraPose,
    pub radius: f64,
    pub width: f64,
    pub include_chunks: bool,
    pub include_zones: bool,
    pub chunk_ids: HashSet<ChunkId>,
    pub zone_ids: HashSet<i64>,
}

pub struct PlanResult {
    pub subscription_id: Uuid,
    pub pose: CameraPose,
    pub chunks: Vec<ChunkData>,
    pub zones: Vec<Zone>,
}

pub struct UpdateResult {
    pub pose: CameraPose,
    pub chunk_delta: ChunkDelta,
    pub zone_delta: ZoneDelta,
    pub chunk_data: Vec<ChunkData>,
    pub zone_data: Vec<Zone>,
}

pub struct SubscriptionManager {
    geometry: RingGeometry,
    max_radius: f64,
    chunk_pipeline: Arc<ChunkPipeline>,
    zone_pipeline: Arc<ZonePipeline>,
    subscriptions: RwLock<HashMap<Uuid, Subscription>>,
}

impl SubscriptionManager {
    pub fn new(
        geometry: RingGeometry,
        max_radius: f64,
        chunk_pipeline: Arc<ChunkPipeline>,
        zone_pipeline: Arc<ZonePipeline>,
    ) -> Self {
        Self {
            geometry,
            max_radius,
            chunk_pipeline,
            zone_pipeline,
            subscriptions: RwLock::new(HashMap::new()),
        }
    }

    fn validate_request(&self, request: &SubscriptionRequest) -> Result<(), CoreError> {
        if request.radius <= 0.0 || request.radius > self.max_radius {
            return Err(CoreError::InvalidSubscriptionRequest(format!(
                "radius {} is out of range (0, {}]",
                request.radius, self.max_radius
            )));
        }
        if request.width <= 0.0 {
            return Err(CoreError::InvalidSubscriptionRequest(
                "width must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// The target chunk id set for `pose`, in closest-first spiral order
    /// (§4.1). Callers that only need membership should collect this into a
    /// `HashSet`; callers emitting ids to a client must preserve this order.
    fn interest_set(&self, pose: &CameraPose, radius: f64) -> Vec<ChunkId> {
        self.geometry
            .chunks_in_window(pose.ring_position, radius as i64, pose.active_floor)
    }

    /// Creates a new subscription and returns its full initial snapshot.
    pub async fn subscribe(
        &self,
        user_id: UserId,
        request: SubscriptionRequest,
    ) -> Result<PlanResult, CoreError> {
        self.validate_request(&request)?;
        let pose = request.pose.canonical(&self.geometry);

        let chunk_ids_ordered = if request.include_chunks {
            self.interest_set(&pose, request.radius)
        } else {
            Vec::new()
        };
        let chunk_ids: HashSet<ChunkId> = chunk_ids_ordered.iter().copied().collect();

        let zone_list = if request.include_zones {
            self.zone_pipeline
                .zones_in_window(&self.geometry, &pose, request.radius, request.width)?
        } else {
            Vec::new()
        };
        let zone_ids: HashSet<i64> = zone_list.iter().map(|z| z.id).collect();

        let chunk_data = self.chunk_pipeline.get_or_generate_many(&chunk_ids_ordered).await;

        let id = Uuid::new_v4();
        let subscription = Subscription {
            id,
            user_id,
            pose,
            radius: request.radius,
            width: request.width,
            include_chunks: request.include_chunks,
            include_zones: request.include_zones,
            chunk_ids,
            zone_ids,
        };
        self.subscriptions.write().insert(id, subscription);

        Ok(PlanResult {
            subscription_id: id,
            pose,
            chunks: chunk_data,
            zones: zone_list,
        })
    }

    /// Recomputes the interest set for `subscription_id` against `raw_pose`,
    /// returning the add/remove delta plus freshly fetched data for
    /// everything newly added.
    pub async fn update_pose(
        &self,
        user_id: UserId,
        subscription_id: Uuid,
        raw_pose: RawPose,
    ) -> Result<UpdateResult, CoreError> {
        let pose = raw_pose.canonical(&self.geometry);

        let (radius, width, include_chunks, include_zones, old_chunks, old_zones) = {
            let subs = self.subscriptions.read();
            let sub = subs
                .get(&subscription_id)
                .ok_or_else(|| CoreError::NotFound(format!("subscription {subscription_id}")))?;
            if sub.user_id != user_id {
                return Err(CoreError::InvalidSubscriptionRequest(
                    "subscription belongs to a different user".to_string(),
                ));
            }
            (
                sub.radius,
                sub.width,
                sub.include_chunks,
                sub.include_zones,
                sub.chunk_ids.clone(),
                sub.zone_ids.clone(),
            )
        };

        let new_chunks_ordered = if include_chunks {
            self.interest_set(&pose, radius)
        } else {
            Vec::new()
        };
        let new_chunks: HashSet<ChunkId> = new_chunks_ordered.iter().copied().collect();
        let new_zone_list = if include_zones {
            self.zone_pipeline
                .zones_in_window(&self.geometry, &pose, radius, width)?
        } else {
            Vec::new()
        };
        let new_zones: HashSet<i64> = new_zone_list.iter().map(|z| z.id).collect();

        // `new_chunks_ordered` is already closest-first (§4.1); filtering it
        // preserves that order for the ids actually being added, rather than
        // re-deriving order from an unordered `HashSet::difference` (§4.8).
        let added_chunks: Vec<ChunkId> = new_chunks_ordered
            .into_iter()
            .filter(|id| !old_chunks.contains(id))
            .collect();
        let removed_chunks: Vec<ChunkId> = old_chunks.difference(&new_chunks).copied().collect();
        let added_zone_ids: Vec<i64> = new_zones.difference(&old_zones).copied().collect();
        let removed_zones: Vec<i64> = old_zones.difference(&new_zones).copied().collect();

        let chunk_data = self.chunk_pipeline.get_or_generate_many(&added_chunks).await;
        let zone_data: Vec<Zone> = new_zone_list
            .into_iter()
            .filter(|z| added_zone_ids.contains(&z.id))
            .collect();

        {
            let mut subs = self.subscriptions.write();
            if let Some(sub) = subs.get_mut(&subscription_id) {
                sub.pose = pose;
                sub.chunk_ids = new_chunks;
                sub.zone_ids = new_zones;
            }
        }

        Ok(UpdateResult {
            pose,
            chunk_delta: ChunkDelta { added: added_chunks, removed: removed_chunks },
            zone_delta: ZoneDelta { added: added_zone_ids, removed: removed_zones },
            chunk_data,
            zone_data,
        })
    }

    pub fn geometry(&self) -> RingGeometry {
        self.geometry
    }

    pub fn get_subscription(&self, id: Uuid) -> Option<Subscription> {
        self.subscriptions.read().get(&id).cloned()
    }

    /// Removes every subscription owned by `user_id`, e.g. on disconnect.
    pub fn drop_subscriptions_for_user(&self, user_id: UserId) {
        self.subscriptions.write().retain(|_, sub| sub.user_id != user_id);
    }

    pub fn drop_subscription(&self, id: Uuid) {
        self.subscriptions.write().remove(&id);
    }
}

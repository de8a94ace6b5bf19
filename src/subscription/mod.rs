//! The subscription manager: the interest-set bookkeeping that turns a
//! client's requested pose/radius into the chunk and zone ids it should
//! currently be streamed, and the add/remove deltas that follow as the pose
//! moves.

pub mod manager;

pub use manager::{PlanResult, Subscription, SubscriptionManager, UpdateResult};

//! Server-side spatial streaming core for the EarthRing ring-world.
//!
//! This crate is the composition of five pipelines: subscriptions (who wants
//! what), chunks (terrain geometry), zones (named regions), the wire
//! protocol that carries deltas to clients, and the WebSocket session/hub
//! layer that owns the sockets. `server` wires them together; everything
//! else is usable independently and is covered by its own unit tests.

pub mod auth;
pub mod chunk;
pub mod config;
pub mod error;
pub mod geometry;
pub mod hub;
pub mod logging;
pub mod models;
pub mod protocol;
pub mod ringmap;
pub mod server;
pub mod session;
pub mod subscription;
pub mod zone;

pub use config::Config;
pub use error::{CoreError, CoreResult, ErrorCode};
pub use models::{CameraPose, ChunkId, RawPose};
pub use ringmap::RingGeometry;

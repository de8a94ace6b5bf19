//! The wire protocol: a tagged-union JSON envelope in both directions, plus
//! the message-type constants and the subprotocol name clients negotiate
//! during the WebSocket upgrade.
//!
//! Inbound messages are parsed once, at the session boundary, into
//! [`InboundMessage`]. Outbound frames are a single polymorphic
//! [`OutboundFrame`] enum rather than a family of unrelated structs, so a
//! session's write half only ever has one type to serialize.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ErrorCode;
use crate::models::{ChunkData, ChunkDelta, CameraPose, Zone, ZoneDelta};

/// Subprotocol negotiated during the WebSocket upgrade.
pub const SUBPROTOCOL: &str = "earthring-v1";

/// An inbound message as it arrives off the wire, before payload-specific
/// validation. `id` is echoed back on the matching ack/error frame so
/// clients can correlate request/response without a sequence number.
#[derive(Debug, Clone, Deserialize)]
pub struct InboundEnvelope {
    #[serde(rename = "type")]
    pub message_type: String,
    pub id: Option<Uuid>,
    #[serde(default)]
    pub data: serde_json::Value,
}

/// The parsed, typed form of an [`InboundEnvelope`]. Unknown `type` values
/// are rejected before this point (`CoreError::UnknownMessageType`).
#[derive(Debug, Clone)]
pub enum InboundMessage {
    Ping {
        id: Option<Uuid>,
    },
    StreamSubscribe {
        id: Option<Uuid>,
        request: crate::models::SubscriptionRequest,
    },
    StreamUpdatePose {
        id: Option<Uuid>,
        pose: crate::models::RawPose,
    },
    PlayerMove {
        id: Option<Uuid>,
        pose: crate::models::RawPose,
    },
}

impl InboundMessage {
    pub fn parse(envelope: InboundEnvelope) -> Result<Self, crate::error::CoreError> {
        let InboundEnvelope { message_type, id, data } = envelope;
        match message_type.as_str() {
            "ping" => Ok(InboundMessage::Ping { id }),
            "stream_subscribe" => {
                let request = serde_json::from_value(data).map_err(|e| {
                    crate::error::CoreError::InvalidSubscriptionRequest(e.to_string())
                })?;
                Ok(InboundMessage::StreamSubscribe { id, request })
            }
            "stream_update_pose" => {
                let pose = serde_json::from_value(data).map_err(|e| {
                    crate::error::CoreError::InvalidMessageFormat(e.to_string())
                })?;
                Ok(InboundMessage::StreamUpdatePose { id, pose })
            }
            "player_move" => {
                let pose = serde_json::from_value(data).map_err(|e| {
                    crate::error::CoreError::InvalidMessageFormat(e.to_string())
                })?;
                Ok(InboundMessage::PlayerMove { id, pose })
            }
            other => Err(crate::error::CoreError::UnknownMessageType(other.to_string())),
        }
    }
}

/// Every shape a session's write half can emit, tagged by `type` on the wire.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundFrame {
    Pong {
        id: Option<Uuid>,
    },
    StreamAck {
        id: Option<Uuid>,
        subscription_id: Uuid,
        chunks: Vec<ChunkData>,
        zones: Vec<Zone>,
    },
    StreamPoseAck {
        id: Option<Uuid>,
        pose: CameraPose,
    },
    StreamDelta {
        subscription_id: Uuid,
        chunks: ChunkDelta,
        zones: ZoneDelta,
        chunk_data: Vec<ChunkData>,
        zone_data: Vec<Zone>,
    },
    PlayerMoveAck {
        id: Option<Uuid>,
        pose: CameraPose,
    },
    Error {
        id: Option<Uuid>,
        code: ErrorCode,
        message: String,
    },
}

impl OutboundFrame {
    pub fn from_error(id: Option<Uuid>, err: &crate::error::CoreError) -> Self {
        OutboundFrame::Error {
            id,
            code: err.code(),
            message: err.to_string(),
        }
    }

    /// Serializes to the exact bytes sent on the wire as a single text frame.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).expect("outbound frames are always serializable")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_message_type_is_rejected() {
        let envelope = InboundEnvelope {
            message_type: "do_a_barrel_roll".to_string(),
            id: None,
            data: serde_json::Value::Null,
        };
        let err = InboundMessage::parse(envelope).unwrap_err();
        assert_eq!(err.code(), ErrorCode::UnknownMessageType);
    }

    #[test]
    fn ping_round_trips_with_no_payload() {
        let envelope = InboundEnvelope {
            message_type: "ping".to_string(),
            id: None,
            data: serde_json::Value::Null,
        };
        assert!(matches!(
            InboundMessage::parse(envelope).unwrap(),
            InboundMessage::Ping { id: None }
        ));
    }

    #[test]
    fn ping_carries_its_correlation_id_through_to_parse() {
        let id = Uuid::new_v4();
        let envelope = InboundEnvelope {
            message_type: "ping".to_string(),
            id: Some(id),
            data: serde_json::Value::Null,
        };
        assert!(matches!(
            InboundMessage::parse(envelope).unwrap(),
            InboundMessage::Ping { id: Some(got) } if got == id
        ));
    }

    #[test]
    fn error_frame_serializes_tagged() {
        let frame = OutboundFrame::Error {
            id: None,
            code: ErrorCode::NotFound,
            message: "nope".to_string(),
        };
        let json = frame.to_json();
        assert!(json.contains("\"type\":\"error\""));
        assert!(json.contains("\"code\":\"NotFound\""));
    }

    #[test]
    fn malformed_subscribe_payload_is_invalid_subscription_request() {
        let envelope = InboundEnvelope {
            message_type: "stream_subscribe".to_string(),
            id: None,
            data: serde_json::json!({ "radius": "not a number" }),
        };
        let err = InboundMessage::parse(envelope).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidSubscriptionRequest);
    }
}

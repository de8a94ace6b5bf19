//! One task per connected client: a read/write pump over a single
//! `WebSocketStream`, a bounded outbound channel registered with the
//! [`Hub`], and a ping/pong liveness timer. Grounded on the accept/handle
//! loop in the teacher's comms server, generalized from a log-broadcast
//! bridge into the full request/response + push protocol this core speaks.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tracing::{info, warn};
use uuid::Uuid;

use crate::auth::UserId;
use crate::hub::{Hub, OUTBOUND_CHANNEL_CAPACITY};
use crate::protocol::{InboundEnvelope, InboundMessage, OutboundFrame};
use crate::subscription::SubscriptionManager;

const PING_INTERVAL: Duration = Duration::from_secs(30);
const PONG_TIMEOUT: Duration = Duration::from_secs(60);
const WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// Runs the session to completion: returns once the client disconnects, a
/// liveness timer expires, or the outbound channel is closed by the hub
/// (backpressure). Always cleans up the session's registration and
/// subscriptions before returning.
pub async fn run<S>(
    session_id: Uuid,
    user_id: UserId,
    stream: WebSocketStream<S>,
    hub: Arc<Hub>,
    subscriptions: Arc<SubscriptionManager>,
) where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    let (mut ws_sender, mut ws_receiver) = stream.split();
    let (tx, mut rx) = mpsc::channel::<OutboundFrame>(OUTBOUND_CHANNEL_CAPACITY);
    hub.register(session_id, user_id, tx.clone());

    let mut ping_interval = tokio::time::interval(PING_INTERVAL);
    let mut last_pong = tokio::time::Instant::now();
    let mut current_subscription: Option<Uuid> = None;

    loop {
        tokio::select! {
            frame = rx.recv() => {
                match frame {
                    Some(frame) => {
                        let json = frame.to_json();
                        let sent = tokio::time::timeout(WRITE_TIMEOUT, ws_sender.send(Message::Text(json.into()))).await;
                        if sent.is_err() || sent.unwrap().is_err() {
                            warn!(%session_id, "write timed out or failed, closing session");
                            break;
                        }
                    }
                    None => {
                        // The hub unregistered us (outbound backpressure) and
                        // dropped the last sender clone.
                        info!(%session_id, "outbound channel closed, closing session");
                        break;
                    }
                }
            }
            message = ws_receiver.next() => {
                match message {
                    Some(Ok(Message::Text(text))) => {
                        handle_inbound(&text, user_id, &subscriptions, &mut current_subscription, &tx).await;
                    }
                    Some(Ok(Message::Pong(_))) => {
                        last_pong = tokio::time::Instant::now();
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        info!(%session_id, "client closed the connection");
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(%session_id, error = %e, "websocket error, closing session");
                        break;
                    }
                }
            }
            _ = ping_interval.tick() => {
                if last_pong.elapsed() > PONG_TIMEOUT {
                    warn!(%session_id, "pong timeout, closing session");
                    break;
                }
                if ws_sender.send(Message::Ping(Vec::new())).await.is_err() {
                    break;
                }
            }
        }
    }

    if let Some(sub_id) = current_subscription {
        subscriptions.drop_subscription(sub_id);
    }
    hub.unregister(session_id);
}

async fn handle_inbound(
    text: &str,
    user_id: UserId,
    subscriptions: &SubscriptionManager,
    current_subscription: &mut Option<Uuid>,
    reply: &mpsc::Sender<OutboundFrame>,
) {
    let envelope: InboundEnvelope = match serde_json::from_str(text) {
        Ok(e) => e,
        Err(e) => {
            let err = crate::error::CoreError::InvalidMessageFormat(e.to_string());
            let _ = reply.try_send(OutboundFrame::from_error(None, &err));
            return;
        }
    };

    let id = envelope.id;
    let message = match InboundMessage::parse(envelope) {
        Ok(m) => m,
        Err(e) => {
            let _ = reply.try_send(OutboundFrame::from_error(id, &e));
            return;
        }
    };

    match message {
        InboundMessage::Ping { id } => {
            let _ = reply.try_send(OutboundFrame::Pong { id });
        }
        InboundMessage::StreamSubscribe { id, request } => {
            match subscriptions.subscribe(user_id, request).await {
                Ok(plan) => {
                    *current_subscription = Some(plan.subscription_id);
                    let _ = reply.try_send(OutboundFrame::StreamAck {
                        id,
                        subscription_id: plan.subscription_id,
                        chunks: plan.chunks,
                        zones: plan.zones,
                    });
                }
                Err(e) => {
                    let _ = reply.try_send(OutboundFrame::from_error(id, &e));
                }
            }
        }
        InboundMessage::StreamUpdatePose { id, pose } => {
            let Some(subscription_id) = *current_subscription else {
                let err = crate::error::CoreError::NotFound("no active subscription".to_string());
                let _ = reply.try_send(OutboundFrame::from_error(id, &err));
                return;
            };
            match subscriptions.update_pose(user_id, subscription_id, pose).await {
                Ok(update) => {
                    let _ = reply.try_send(OutboundFrame::StreamPoseAck { id, pose: update.pose });
                    let has_delta = !update.chunk_delta.added.is_empty()
                        || !update.chunk_delta.removed.is_empty()
                        || !update.zone_delta.added.is_empty()
                        || !update.zone_delta.removed.is_empty();
                    if has_delta {
                        let _ = reply.try_send(OutboundFrame::StreamDelta {
                            subscription_id,
                            chunks: update.chunk_delta,
                            zones: update.zone_delta,
                            chunk_data: update.chunk_data,
                            zone_data: update.zone_data,
                        });
                    }
                }
                Err(e) => {
                    let _ = reply.try_send(OutboundFrame::from_error(id, &e));
                }
            }
        }
        InboundMessage::PlayerMove { id, pose } => {
            let canonical = pose.canonical(&subscriptions.geometry());
            let _ = reply.try_send(OutboundFrame::PlayerMoveAck { id, pose: canonical });
        }
    }
}

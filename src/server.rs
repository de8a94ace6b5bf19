//! The composition root: binds the listener, upgrades each accepted TCP
//! connection to a WebSocket (verifying the bearer token and negotiating
//! the subprotocol in the upgrade callback, before a session task is ever
//! spawned), and wires the subscription manager's chunk/zone pipelines to
//! configuration.

use std::net::SocketAddr;
use std::sync::Arc;

use http::{HeaderValue, Response, StatusCode};
use parking_lot::Mutex;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::accept_hdr_async;
use tracing::{info, warn};
use uuid::Uuid;

use crate::auth::{self, UserId};
use crate::chunk::{ChunkPipeline, HttpProceduralClient, InMemoryChunkRepository};
use crate::config::Config;
use crate::geometry::CompressionCodec;
use crate::hub::Hub;
use crate::protocol::SUBPROTOCOL;
use crate::ringmap::RingGeometry;
use crate::session;
use crate::subscription::SubscriptionManager;
use crate::zone::{InMemoryZoneRepository, ZonePipeline};

pub struct Server {
    config: Config,
    hub: Arc<Hub>,
    subscriptions: Arc<SubscriptionManager>,
}

impl Server {
    pub fn new(config: Config) -> Self {
        let geometry = RingGeometry::new(config.ring_circumference_m, config.ring_chunk_length_m);

        let chunk_repo = InMemoryChunkRepository::new();
        let generator = Arc::new(HttpProceduralClient::new(
            config.procedural_base_url.clone(),
            config.procedural_timeout(),
            config.procedural_retry_count,
        ));
        let chunk_pipeline = Arc::new(ChunkPipeline::new(
            chunk_repo,
            generator,
            CompressionCodec::default(),
        ));

        let zone_repo = InMemoryZoneRepository::new();
        let zone_pipeline = Arc::new(ZonePipeline::new(zone_repo));

        let subscriptions = Arc::new(SubscriptionManager::new(
            geometry,
            config.max_radius_m,
            chunk_pipeline,
            zone_pipeline,
        ));

        Self {
            config,
            hub: Arc::new(Hub::new()),
            subscriptions,
        }
    }

    pub fn hub(&self) -> Arc<Hub> {
        self.hub.clone()
    }

    /// Accepts connections until the listener errors or the process is
    /// signaled to stop; each connection is handled on its own task.
    pub async fn run(self) -> anyhow::Result<()> {
        let listener = TcpListener::bind(self.config.bind_addr()).await?;
        info!(addr = %self.config.bind_addr(), "listening");

        let jwt_secret = Arc::new(self.config.jwt_secret.clone());
        loop {
            let (stream, addr) = listener.accept().await?;
            let hub = self.hub.clone();
            let subscriptions = self.subscriptions.clone();
            let jwt_secret = jwt_secret.clone();
            tokio::spawn(async move {
                if let Err(e) = Self::accept(stream, addr, hub, subscriptions, jwt_secret).await {
                    warn!(%addr, error = %e, "connection setup failed");
                }
            });
        }
    }

    async fn accept(
        stream: TcpStream,
        addr: SocketAddr,
        hub: Arc<Hub>,
        subscriptions: Arc<SubscriptionManager>,
        jwt_secret: Arc<String>,
    ) -> anyhow::Result<()> {
        let authenticated_user: Arc<Mutex<Option<UserId>>> = Arc::new(Mutex::new(None));
        let callback_user = authenticated_user.clone();

        let ws_stream = accept_hdr_async(stream, move |request: &http::Request<()>, mut response: http::Response<()>| {
            let query = request.uri().query();
            let auth_header = request
                .headers()
                .get(http::header::AUTHORIZATION)
                .and_then(|v| v.to_str().ok());
            let token = auth::extract_bearer_token(query, auth_header);

            let token = match token {
                Some(t) => t,
                None => {
                    return Err(unauthorized_response("missing bearer token"));
                }
            };

            match auth::authenticate(&token, &jwt_secret) {
                Ok(uid) => {
                    *callback_user.lock() = Some(uid);
                }
                Err(e) => {
                    return Err(unauthorized_response(&e.to_string()));
                }
            }

            // Absent client preference, v1 is chosen; if the client offered
            // subprotocols but none is mutually supported, that's a 400, not
            // a silent fallback (§4.9).
            if let Some(protocols) = request.headers().get(http::header::SEC_WEBSOCKET_PROTOCOL) {
                let offered = protocols.to_str().unwrap_or_default();
                if !offered.split(',').any(|p| p.trim() == SUBPROTOCOL) {
                    return Err(bad_request_response(&format!(
                        "no mutually supported subprotocol (offered: {offered})"
                    )));
                }
            }
            response.headers_mut().insert(
                http::header::SEC_WEBSOCKET_PROTOCOL,
                HeaderValue::from_static(SUBPROTOCOL),
            );

            Ok(response)
        })
        .await?;

        let user_id = authenticated_user
            .lock()
            .take()
            .ok_or_else(|| anyhow::anyhow!("authentication callback did not run"))?;

        let session_id = Uuid::new_v4();
        info!(%session_id, %user_id, %addr, "session established");
        session::run(session_id, user_id, ws_stream, hub, subscriptions).await;
        Ok(())
    }
}

fn unauthorized_response(message: &str) -> Response<Option<String>> {
    Response::builder()
        .status(StatusCode::UNAUTHORIZED)
        .body(Some(message.to_string()))
        .expect("static response is always well-formed")
}

fn bad_request_response(message: &str) -> Response<Option<String>> {
    Response::builder()
        .status(StatusCode::BAD_REQUEST)
        .body(Some(message.to_string()))
        .expect("static response is always well-formed")
}

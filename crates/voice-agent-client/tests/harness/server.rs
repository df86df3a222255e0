//! Embedded signaling server for integration testing

use async_trait::async_trait;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::Router;
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tracing::{info, warn};
use voice_agent_client::{Error, Signaling, SignalingAnswer, SignalingOffer};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::APIBuilder;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;

/// How the server responds to `POST /webrtc/offer`
#[derive(Debug, Clone)]
pub enum MockMode {
    /// Answer every offer with a real peer connection
    Answer,
    /// Reply with this status and body
    Status(StatusCode, &'static str),
    /// Reply 200 with this body verbatim
    Body(&'static str),
}

/// One request as the server received it
#[derive(Debug, Clone)]
pub struct RecordedOffer {
    /// Content-Type request header
    pub content_type: Option<String>,
    /// Parsed JSON body
    pub body: serde_json::Value,
}

impl RecordedOffer {
    pub fn field(&self, name: &str) -> &str {
        self.body[name].as_str().unwrap_or_default()
    }
}

struct MockState {
    mode: MockMode,
    offers: Mutex<Vec<RecordedOffer>>,
    peers: tokio::sync::Mutex<Vec<Arc<RTCPeerConnection>>>,
}

/// Signaling server on 127.0.0.1 with a random port
pub struct MockSignalingServer {
    addr: SocketAddr,
    state: Arc<MockState>,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl MockSignalingServer {
    /// Bind and start serving in `mode`
    pub async fn start(mode: MockMode) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind");
        let addr = listener.local_addr().expect("Failed to get local addr");

        let state = Arc::new(MockState {
            mode,
            offers: Mutex::new(Vec::new()),
            peers: tokio::sync::Mutex::new(Vec::new()),
        });

        let router = Router::new()
            .route("/webrtc/offer", post(offer_handler))
            .with_state(Arc::clone(&state));

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        tokio::spawn(async move {
            let result = axum::serve(listener, router)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await;
            if let Err(e) = result {
                warn!("Mock signaling server error: {}", e);
            }
        });

        info!("Mock signaling server listening on {}", addr);

        Self {
            addr,
            state,
            shutdown_tx: Some(shutdown_tx),
        }
    }

    /// Base URL to configure the client with
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Offers received so far
    pub fn offers(&self) -> Vec<RecordedOffer> {
        self.state.offers.lock().clone()
    }

    pub fn offer_count(&self) -> usize {
        self.state.offers.lock().len()
    }

    /// Close every answering peer connection and stop serving
    pub async fn shutdown(mut self) {
        for peer in self.state.peers.lock().await.drain(..) {
            let _ = peer.close().await;
        }
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

async fn offer_handler(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let json: serde_json::Value = match serde_json::from_slice(&body) {
        Ok(json) => json,
        Err(e) => return (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
    };
    state.offers.lock().push(RecordedOffer {
        content_type,
        body: json.clone(),
    });

    match &state.mode {
        MockMode::Status(status, body) => (*status, *body).into_response(),
        MockMode::Body(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/json")],
            *body,
        )
            .into_response(),
        MockMode::Answer => {
            let sdp = json["sdp"].as_str().unwrap_or_default().to_string();
            match answer_offer(sdp).await {
                Ok((peer, answer)) => {
                    state.peers.lock().await.push(peer);
                    axum::Json(serde_json::json!({ "sdp": answer, "type": "answer" }))
                        .into_response()
                }
                Err(e) => (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
            }
        }
    }
}

/// Answer `sdp` the way the voice agent server does: one peer connection per
/// offer, full ICE gathering before replying
async fn answer_offer(sdp: String) -> anyhow::Result<(Arc<RTCPeerConnection>, String)> {
    let mut media_engine = MediaEngine::default();
    media_engine.register_default_codecs()?;
    let registry = register_default_interceptors(Registry::new(), &mut media_engine)?;
    let api = APIBuilder::new()
        .with_media_engine(media_engine)
        .with_interceptor_registry(registry)
        .build();

    let peer = Arc::new(api.new_peer_connection(RTCConfiguration::default()).await?);
    peer.set_remote_description(RTCSessionDescription::offer(sdp)?).await?;

    let answer = peer.create_answer(None).await?;
    let mut gathered = peer.gathering_complete_promise().await;
    peer.set_local_description(answer).await?;
    let _ = gathered.recv().await;

    let local = peer
        .local_description()
        .await
        .ok_or_else(|| anyhow::anyhow!("no local description"))?;
    Ok((peer, local.sdp))
}

/// Signaling stub answering every offer with a fixed description
pub struct CountingSignaling {
    calls: AtomicUsize,
    answer: SignalingAnswer,
    failures: AtomicUsize,
    offers: Mutex<Vec<SignalingOffer>>,
}

impl CountingSignaling {
    pub fn new(answer: SignalingAnswer) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            answer,
            failures: AtomicUsize::new(0),
            offers: Mutex::new(Vec::new()),
        }
    }

    /// Answer the next `n` exchanges with HTTP 502
    pub fn fail_next(&self, n: usize) {
        self.failures.store(n, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn offers(&self) -> Vec<SignalingOffer> {
        self.offers.lock().clone()
    }
}

#[async_trait]
impl Signaling for CountingSignaling {
    async fn exchange(&self, offer: SignalingOffer) -> voice_agent_client::Result<SignalingAnswer> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.offers.lock().push(offer);

        let failing = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(Error::SignalingStatus {
                status: 502,
                body: "bad gateway".to_string(),
            });
        }
        Ok(self.answer.clone())
    }
}

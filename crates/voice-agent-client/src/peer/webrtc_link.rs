//! [`PeerLink`] over a `webrtc` RTCPeerConnection

use super::link::{
    GatheringState, LinkState, LocalDescription, PeerLink, PeerLinkEvent, PeerLinkEventSender,
    PeerLinkFactory,
};
use crate::config::ClientConfig;
use crate::media::RemoteRtpTrack;
use crate::signaling::SignalingAnswer;
use crate::{Error, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::{debug, info, instrument};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::APIBuilder;
use webrtc::data_channel::RTCDataChannel;
use webrtc::ice_transport::ice_gatherer_state::RTCIceGathererState;
use webrtc::ice_transport::ice_gathering_state::RTCIceGatheringState;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_remote::TrackRemote;

/// Builds [`WebRtcPeerLink`]s with the ICE servers from a [`ClientConfig`]
#[derive(Debug, Clone)]
pub struct WebRtcPeerLinkFactory {
    ice_servers: Vec<RTCIceServer>,
}

impl WebRtcPeerLinkFactory {
    /// Create a factory using the STUN/TURN servers in `config`
    pub fn new(config: &ClientConfig) -> Self {
        let ice_servers = config
            .stun_servers
            .iter()
            .map(|url| RTCIceServer {
                urls: vec![url.clone()],
                ..Default::default()
            })
            .chain(config.turn_servers.iter().map(|turn| RTCIceServer {
                urls: vec![turn.url.clone()],
                username: turn.username.clone(),
                credential: turn.credential.clone(),
                ..Default::default()
            }))
            .collect();

        Self { ice_servers }
    }
}

#[async_trait]
impl PeerLinkFactory for WebRtcPeerLinkFactory {
    async fn create(&self, events: PeerLinkEventSender) -> Result<Arc<dyn PeerLink>> {
        let link = WebRtcPeerLink::new(self.ice_servers.clone(), events).await?;
        Ok(Arc::new(link))
    }
}

/// Peer link backed by a `webrtc` peer connection
pub struct WebRtcPeerLink {
    /// Unique identifier for this link instance
    link_id: String,

    /// Actual WebRTC peer connection
    peer_connection: Arc<RTCPeerConnection>,

    /// Data channels opened on this link
    data_channels: Mutex<Vec<Arc<RTCDataChannel>>>,

    closed: AtomicBool,

    /// Wakes tasks waiting on ICE gathering when the link closes
    closed_notify: Notify,
}

impl WebRtcPeerLink {
    /// Create a peer connection with platform-default codecs and interceptors
    ///
    /// Connection-state, gathering-state and inbound-track observers are
    /// registered here and report on `events` for the lifetime of the link.
    #[instrument(skip_all)]
    pub async fn new(ice_servers: Vec<RTCIceServer>, events: PeerLinkEventSender) -> Result<Self> {
        let link_id = uuid::Uuid::new_v4().to_string();

        let mut media_engine = MediaEngine::default();
        media_engine
            .register_default_codecs()
            .map_err(|e| Error::negotiation("Failed to register codecs", e))?;

        let interceptor_registry =
            register_default_interceptors(Registry::new(), &mut media_engine)
                .map_err(|e| Error::negotiation("Failed to register interceptors", e))?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(interceptor_registry)
            .build();

        let rtc_config = RTCConfiguration {
            ice_servers,
            ..Default::default()
        };

        let peer_connection = Arc::new(
            api.new_peer_connection(rtc_config)
                .await
                .map_err(|e| Error::negotiation("Failed to create peer connection", e))?,
        );

        let state_events = events.clone();
        let state_link_id = link_id.clone();
        peer_connection.on_peer_connection_state_change(Box::new(
            move |s: RTCPeerConnectionState| {
                if let Some(state) = link_state(s) {
                    debug!("Link {} connection state: {}", state_link_id, state);
                    // Receiver gone means the session already ended
                    let _ = state_events.send(PeerLinkEvent::StateChanged(state));
                }
                Box::pin(async {})
            },
        ));

        let gathering_events = events.clone();
        peer_connection.on_ice_gathering_state_change(Box::new(
            move |s: RTCIceGathererState| {
                if let Some(state) = gathering_state(s) {
                    let _ = gathering_events.send(PeerLinkEvent::GatheringStateChanged(state));
                }
                Box::pin(async {})
            },
        ));

        let track_events = events;
        peer_connection.on_track(Box::new(move |track: Arc<TrackRemote>, _, _| {
            debug!("Inbound {} track {}", track.kind(), track.id());
            let _ = track_events.send(PeerLinkEvent::InboundTrack(Arc::new(
                RemoteRtpTrack::new(track),
            )));
            Box::pin(async {})
        }));

        info!("Created peer link {}", link_id);

        Ok(Self {
            link_id,
            peer_connection,
            data_channels: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
            closed_notify: Notify::new(),
        })
    }

    /// Get the underlying WebRTC peer connection
    pub fn peer_connection(&self) -> &Arc<RTCPeerConnection> {
        &self.peer_connection
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(Error::Negotiation(format!(
                "peer link {} is closed",
                self.link_id
            )));
        }
        Ok(())
    }
}

fn link_state(state: RTCPeerConnectionState) -> Option<LinkState> {
    match state {
        RTCPeerConnectionState::New => Some(LinkState::New),
        RTCPeerConnectionState::Connecting => Some(LinkState::Connecting),
        RTCPeerConnectionState::Connected => Some(LinkState::Connected),
        RTCPeerConnectionState::Disconnected => Some(LinkState::Disconnected),
        RTCPeerConnectionState::Failed => Some(LinkState::Failed),
        RTCPeerConnectionState::Closed => Some(LinkState::Closed),
        _ => None,
    }
}

fn gathering_state(state: RTCIceGathererState) -> Option<GatheringState> {
    match state {
        RTCIceGathererState::New => Some(GatheringState::New),
        RTCIceGathererState::Gathering => Some(GatheringState::Gathering),
        RTCIceGathererState::Complete => Some(GatheringState::Complete),
        _ => None,
    }
}

#[async_trait]
impl PeerLink for WebRtcPeerLink {
    fn link_id(&self) -> &str {
        &self.link_id
    }

    async fn add_track(&self, track: Arc<dyn TrackLocal + Send + Sync>) -> Result<()> {
        self.ensure_open()?;
        let track_id = track.id().to_string();

        self.peer_connection
            .add_track(track)
            .await
            .map_err(|e| Error::negotiation("Failed to add track", e))?;

        debug!("Added outbound track {} to link {}", track_id, self.link_id);
        Ok(())
    }

    async fn create_data_channel(&self, label: &str) -> Result<()> {
        self.ensure_open()?;

        let channel = self
            .peer_connection
            .create_data_channel(label, None)
            .await
            .map_err(|e| Error::negotiation("Failed to create data channel", e))?;

        debug!("Opened data channel '{}' on link {}", label, self.link_id);
        self.data_channels.lock().push(channel);
        Ok(())
    }

    async fn create_local_offer(&self) -> Result<()> {
        self.ensure_open()?;

        let offer = self
            .peer_connection
            .create_offer(None)
            .await
            .map_err(|e| Error::negotiation("Failed to create offer", e))?;

        self.peer_connection
            .set_local_description(offer)
            .await
            .map_err(|e| Error::negotiation("Failed to set local description", e))?;

        debug!("Committed local offer on link {}", self.link_id);
        Ok(())
    }

    async fn gathering_complete(&self) -> Result<()> {
        // Registered before the closed check so a concurrent close is not missed
        let closed = self.closed_notify.notified();
        tokio::pin!(closed);
        self.ensure_open()?;

        if self.peer_connection.ice_gathering_state() == RTCIceGatheringState::Complete {
            return Ok(());
        }

        // The promise resolves immediately if gathering finished in between
        let mut done = self.peer_connection.gathering_complete_promise().await;
        tokio::select! {
            _ = done.recv() => {}
            _ = &mut closed => {
                debug!("Link {} closed while gathering", self.link_id);
            }
        }

        self.ensure_open()?;
        debug!("ICE gathering complete on link {}", self.link_id);
        Ok(())
    }

    async fn local_description(&self) -> Option<LocalDescription> {
        self.peer_connection
            .local_description()
            .await
            .map(|desc| LocalDescription {
                sdp: desc.sdp,
                sdp_type: desc.sdp_type.to_string(),
            })
    }

    async fn apply_remote_answer(&self, answer: &SignalingAnswer) -> Result<()> {
        self.ensure_open()?;

        let description = match answer.sdp_type.as_str() {
            "answer" => RTCSessionDescription::answer(answer.sdp.clone()),
            "pranswer" => RTCSessionDescription::pranswer(answer.sdp.clone()),
            other => {
                return Err(Error::Negotiation(format!(
                    "expected an answer description, got type '{}'",
                    other
                )))
            }
        }
        .map_err(|e| Error::negotiation("Failed to parse answer", e))?;

        self.peer_connection
            .set_remote_description(description)
            .await
            .map_err(|e| Error::negotiation("Failed to set remote description", e))?;

        debug!("Applied remote answer on link {}", self.link_id);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        info!("Closing peer link {}", self.link_id);
        self.closed_notify.notify_waiters();
        self.data_channels.lock().clear();

        self.peer_connection
            .close()
            .await
            .map_err(|e| Error::Other(anyhow::anyhow!("Failed to close peer link: {}", e)))
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

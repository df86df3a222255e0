//! Peer link abstraction and its event stream

use crate::media::InboundTrack;
use crate::signaling::SignalingAnswer;
use crate::Result;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;
use webrtc::track::track_local::TrackLocal;

/// Transport-level connection state reported by a link
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// Created, nothing negotiated yet
    New,
    /// ICE/DTLS in progress
    Connecting,
    /// Media path established
    Connected,
    /// Connectivity lost, may still recover at the transport level
    Disconnected,
    /// Connectivity checks failed
    Failed,
    /// Closed locally
    Closed,
}

impl LinkState {
    /// States that end the session without a local `disconnect()`
    pub fn is_passive_disconnect(&self) -> bool {
        matches!(self, LinkState::Disconnected | LinkState::Failed)
    }
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LinkState::New => "new",
            LinkState::Connecting => "connecting",
            LinkState::Connected => "connected",
            LinkState::Disconnected => "disconnected",
            LinkState::Failed => "failed",
            LinkState::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// ICE gathering progress
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatheringState {
    /// Gathering has not started
    New,
    /// Candidates are being collected
    Gathering,
    /// All candidates are in the local description
    Complete,
}

/// Asynchronous notifications raised by a link
#[derive(Clone)]
pub enum PeerLinkEvent {
    /// The remote party added media
    InboundTrack(Arc<dyn InboundTrack>),
    /// Connection state changed
    StateChanged(LinkState),
    /// ICE gathering state changed
    GatheringStateChanged(GatheringState),
}

impl fmt::Debug for PeerLinkEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PeerLinkEvent::InboundTrack(track) => {
                f.debug_tuple("InboundTrack").field(&track.id()).finish()
            }
            PeerLinkEvent::StateChanged(state) => {
                f.debug_tuple("StateChanged").field(state).finish()
            }
            PeerLinkEvent::GatheringStateChanged(state) => f
                .debug_tuple("GatheringStateChanged")
                .field(state)
                .finish(),
        }
    }
}

/// Sender half handed to a link at construction
pub type PeerLinkEventSender = mpsc::UnboundedSender<PeerLinkEvent>;

/// A local description ready to be sent to the remote party
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalDescription {
    /// SDP text
    pub sdp: String,
    /// Description type ("offer")
    pub sdp_type: String,
}

/// The negotiated transport of one session
///
/// Every method may be called after [`PeerLink::close`]; such calls fail
/// instead of panicking, and a second `close` is a no-op.
#[async_trait]
pub trait PeerLink: Send + Sync {
    /// Identifier of this link instance
    fn link_id(&self) -> &str;

    /// Attach a local track as outbound media
    async fn add_track(&self, track: Arc<dyn TrackLocal + Send + Sync>) -> Result<()>;

    /// Open a bidirectional data channel
    async fn create_data_channel(&self, label: &str) -> Result<()>;

    /// Create an offer and commit it as the local description
    async fn create_local_offer(&self) -> Result<()>;

    /// Resolve once ICE gathering is complete (immediately if it already is)
    async fn gathering_complete(&self) -> Result<()>;

    /// The committed local description, candidates included
    async fn local_description(&self) -> Option<LocalDescription>;

    /// Apply the remote answer
    async fn apply_remote_answer(&self, answer: &SignalingAnswer) -> Result<()>;

    /// Close the link and its network path
    async fn close(&self) -> Result<()>;

    /// Whether `close` has been called
    fn is_closed(&self) -> bool;
}

/// Builds a fresh link per session
#[async_trait]
pub trait PeerLinkFactory: Send + Sync {
    /// Construct a link that reports its events on `events`
    async fn create(&self, events: PeerLinkEventSender) -> Result<Arc<dyn PeerLink>>;
}

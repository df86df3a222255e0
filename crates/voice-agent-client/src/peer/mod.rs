//! Peer link: the negotiated real-time transport of a session
//!
//! [`PeerLink`] is the controller's view of a peer connection. Transport
//! observers are not callbacks into controller state: every link pushes
//! [`PeerLinkEvent`]s onto a channel handed to its [`PeerLinkFactory`], and the
//! controller consumes them for the lifetime of the session.

pub mod link;
pub mod webrtc_link;

pub use link::{
    GatheringState, LinkState, LocalDescription, PeerLink, PeerLinkEvent, PeerLinkEventSender,
    PeerLinkFactory,
};
pub use webrtc_link::{WebRtcPeerLink, WebRtcPeerLinkFactory};

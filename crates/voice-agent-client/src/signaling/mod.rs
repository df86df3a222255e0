//! Offer/answer signaling with the voice agent server
//!
//! The client posts its complete local description (ICE candidates included)
//! to `{server_url}/webrtc/offer` and receives the server's answer in the
//! response body. There is no trickle ICE and no long-lived signaling channel.

pub mod client;
pub mod protocol;

pub use client::{Signaling, SignalingClient};
pub use protocol::{SignalingAnswer, SignalingOffer};

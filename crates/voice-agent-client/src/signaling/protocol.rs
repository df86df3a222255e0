//! Wire types for the `/webrtc/offer` exchange

use serde::{Deserialize, Serialize};

/// Local session description posted to the server
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SignalingOffer {
    /// Complete local SDP, gathered candidates included
    pub sdp: String,

    /// Description type, always "offer" for this client
    #[serde(rename = "type")]
    pub sdp_type: String,

    /// Client-generated identifier the server uses to correlate the session
    pub webrtc_id: String,
}

/// Remote session description returned by the server
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SignalingAnswer {
    /// Remote SDP
    pub sdp: String,

    /// Description type ("answer" from a well-behaved server)
    #[serde(rename = "type")]
    pub sdp_type: String,
}

impl SignalingOffer {
    /// Create an offer with a fresh `webrtc_id`
    pub fn new(sdp: impl Into<String>, sdp_type: impl Into<String>) -> Self {
        Self {
            sdp: sdp.into(),
            sdp_type: sdp_type.into(),
            webrtc_id: uuid::Uuid::new_v4().to_string(),
        }
    }
}

impl SignalingAnswer {
    /// Create an answer description
    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            sdp: sdp.into(),
            sdp_type: "answer".to_string(),
        }
    }
}

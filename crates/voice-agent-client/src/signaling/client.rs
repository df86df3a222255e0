//! HTTP signaling client
//!
//! Stateless request/response exchange of session descriptions. A single
//! failed attempt is surfaced to the caller immediately; nothing is retried.

use super::protocol::{SignalingAnswer, SignalingOffer};
use crate::config::ClientConfig;
use crate::{Error, Result};
use async_trait::async_trait;
use tracing::{debug, instrument};

/// Exchange of a local offer for a remote answer
///
/// Implemented by [`SignalingClient`] for the HTTP endpoint; the controller only
/// depends on this trait.
#[async_trait]
pub trait Signaling: Send + Sync {
    /// Send `offer` and return the remote answer
    async fn exchange(&self, offer: SignalingOffer) -> Result<SignalingAnswer>;
}

/// Posts offers to `{server_url}/webrtc/offer`
pub struct SignalingClient {
    /// Full offer endpoint URL
    offer_url: String,

    /// Reqwest HTTP client
    client: reqwest::Client,
}

impl SignalingClient {
    /// Create a signaling client from the server URL and request timeout in `config`
    pub fn new(config: &ClientConfig) -> Result<Self> {
        config.validate()?;

        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.request_timeout() {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| Error::InvalidConfig(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            offer_url: config.offer_url(),
            client,
        })
    }

    /// The endpoint offers are posted to
    pub fn offer_url(&self) -> &str {
        &self.offer_url
    }
}

#[async_trait]
impl Signaling for SignalingClient {
    #[instrument(skip(self, offer), fields(webrtc_id = %offer.webrtc_id))]
    async fn exchange(&self, offer: SignalingOffer) -> Result<SignalingAnswer> {
        debug!(
            "Posting offer to {} ({} bytes of SDP)",
            self.offer_url,
            offer.sdp.len()
        );

        // `.json()` sets Content-Type: application/json
        let response = self
            .client
            .post(&self.offer_url)
            .json(&offer)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::SignalingTransport(format!("request timed out: {}", e))
                } else {
                    Error::SignalingTransport(format!("request failed: {}", e))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::SignalingStatus {
                status: status.as_u16(),
                body,
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| Error::SignalingTransport(format!("failed to read answer body: {}", e)))?;

        let answer: SignalingAnswer = serde_json::from_slice(&body)
            .map_err(|e| Error::SignalingMalformed(e.to_string()))?;

        debug!("Received {} answer from server", answer.sdp_type);

        Ok(answer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signaling_client_creation() {
        let client = SignalingClient::new(&ClientConfig::new("http://localhost:8000/")).unwrap();
        assert_eq!(client.offer_url(), "http://localhost:8000/webrtc/offer");
    }

    #[test]
    fn test_signaling_client_rejects_invalid_url() {
        let result = SignalingClient::new(&ClientConfig::new("localhost:8000"));
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn test_unreachable_server_is_transport_error() {
        // Port 9 (discard) on loopback is closed in any test environment
        let mut config = ClientConfig::new("http://127.0.0.1:9");
        config.request_timeout_ms = Some(2_000);
        let client = SignalingClient::new(&config).unwrap();

        let err = client
            .exchange(SignalingOffer::new("v=0", "offer"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::SignalingTransport(_)));
        assert!(err.is_signaling_error());
    }
}

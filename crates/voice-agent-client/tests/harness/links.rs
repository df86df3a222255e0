//! Scripted peer links driven by the test

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use voice_agent_client::media::InboundTrack;
use voice_agent_client::peer::{LocalDescription, PeerLinkEvent, PeerLinkEventSender};
use voice_agent_client::{Error, PeerLink, PeerLinkFactory, Result, SignalingAnswer};
use webrtc::track::track_local::TrackLocal;

struct ScriptedLink {
    id: String,
    closed: AtomicBool,
    tracks: AtomicUsize,
    open_links: Arc<AtomicUsize>,
}

#[async_trait]
impl PeerLink for ScriptedLink {
    fn link_id(&self) -> &str {
        &self.id
    }

    async fn add_track(&self, _track: Arc<dyn TrackLocal + Send + Sync>) -> Result<()> {
        self.tracks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn create_data_channel(&self, _label: &str) -> Result<()> {
        Ok(())
    }

    async fn create_local_offer(&self) -> Result<()> {
        Ok(())
    }

    async fn gathering_complete(&self) -> Result<()> {
        Ok(())
    }

    async fn local_description(&self) -> Option<LocalDescription> {
        Some(LocalDescription {
            sdp: format!("v=0\r\ns=scripted {}\r\n", self.id),
            sdp_type: "offer".to_string(),
        })
    }

    async fn apply_remote_answer(&self, answer: &SignalingAnswer) -> Result<()> {
        if answer.sdp_type != "answer" {
            return Err(Error::Negotiation(format!(
                "unexpected description type {}",
                answer.sdp_type
            )));
        }
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.open_links.fetch_sub(1, Ordering::SeqCst);
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Factory of scripted links that remembers each link's event sender
#[derive(Default)]
pub struct MockPeerLinkFactory {
    created: AtomicUsize,
    open_links: Arc<AtomicUsize>,
    senders: Mutex<Vec<PeerLinkEventSender>>,
}

impl MockPeerLinkFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Links created so far
    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    /// Links created and not yet closed
    pub fn open_links(&self) -> usize {
        self.open_links.load(Ordering::SeqCst)
    }

    /// Raise `event` on the most recently created link
    ///
    /// Returns `false` if nobody is listening any more.
    pub fn inject(&self, event: PeerLinkEvent) -> bool {
        self.inject_into(self.created().saturating_sub(1), event)
    }

    /// Raise `event` on the `index`th link ever created
    pub fn inject_into(&self, index: usize, event: PeerLinkEvent) -> bool {
        self.senders
            .lock()
            .get(index)
            .map(|tx| tx.send(event).is_ok())
            .unwrap_or(false)
    }
}

#[async_trait]
impl PeerLinkFactory for MockPeerLinkFactory {
    async fn create(&self, events: PeerLinkEventSender) -> Result<Arc<dyn PeerLink>> {
        let n = self.created.fetch_add(1, Ordering::SeqCst);
        self.open_links.fetch_add(1, Ordering::SeqCst);
        self.senders.lock().push(events);
        Ok(Arc::new(ScriptedLink {
            id: format!("scripted-{}", n),
            closed: AtomicBool::new(false),
            tracks: AtomicUsize::new(0),
            open_links: Arc::clone(&self.open_links),
        }))
    }
}

/// Inbound track that yields a fixed list of payloads, then stays silent
pub struct ScriptedTrack {
    id: String,
    payloads: tokio::sync::Mutex<Vec<Bytes>>,
}

impl ScriptedTrack {
    pub fn new(id: &str, payloads: Vec<&'static [u8]>) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_string(),
            payloads: tokio::sync::Mutex::new(
                payloads.into_iter().rev().map(Bytes::from_static).collect(),
            ),
        })
    }
}

#[async_trait]
impl InboundTrack for ScriptedTrack {
    fn id(&self) -> String {
        self.id.clone()
    }

    fn stream_id(&self) -> String {
        format!("{}-stream", self.id)
    }

    async fn read_payload(&self) -> Result<Option<Bytes>> {
        let next = self.payloads.lock().await.pop();
        match next {
            Some(payload) => Ok(Some(payload)),
            None => std::future::pending().await,
        }
    }
}

//! Session controller: drives one voice session from idle to connected and back

use super::resources::{PumpRelease, SessionResources};
use super::state::{ConnectionState, ResourceSummary, SessionSnapshot};
use crate::config::ClientConfig;
use crate::media::{CpalMicSource, CpalSpeakerSink, MediaConstraints, MediaSource, PlaybackSink};
use crate::peer::{PeerLink, PeerLinkEvent, PeerLinkFactory, WebRtcPeerLinkFactory};
use crate::signaling::{Signaling, SignalingClient, SignalingOffer};
use crate::{Error, Result};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn, Span};

const TORN_DOWN: &str = "session was torn down during negotiation";

/// Owns the lifecycle of at most one voice session at a time
///
/// `connect` acquires local audio, negotiates a peer link through the
/// signaling endpoint and leaves the session connected; `disconnect` releases
/// everything the session holds. A remote hang-up reported by the link ends
/// the session the same way, without a call to `disconnect`.
///
/// State is published through a [`watch`] channel; see [`subscribe`](Self::subscribe).
pub struct SessionController {
    inner: Arc<Inner>,
}

struct Inner {
    config: ClientConfig,
    links: Arc<dyn PeerLinkFactory>,
    media: Arc<dyn MediaSource>,
    signaling: Arc<dyn Signaling>,
    playback: Arc<dyn PlaybackSink>,

    state: watch::Sender<SessionSnapshot>,

    /// Resources of the live session, if any
    session: Mutex<Option<SessionResources>>,

    generation: AtomicU64,
}

impl SessionController {
    /// Create a controller over explicit collaborators
    pub fn new(
        config: ClientConfig,
        links: Arc<dyn PeerLinkFactory>,
        media: Arc<dyn MediaSource>,
        signaling: Arc<dyn Signaling>,
        playback: Arc<dyn PlaybackSink>,
    ) -> Result<Self> {
        config.validate()?;

        let (state, _) = watch::channel(SessionSnapshot::default());

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                links,
                media,
                signaling,
                playback,
                state,
                session: Mutex::new(None),
                generation: AtomicU64::new(0),
            }),
        })
    }

    /// Create a controller with the `webrtc` link, the HTTP signaling client,
    /// the default microphone and the default speaker
    pub fn with_defaults(config: ClientConfig) -> Result<Self> {
        let links = Arc::new(WebRtcPeerLinkFactory::new(&config));
        let signaling = Arc::new(SignalingClient::new(&config)?);
        Self::new(
            config,
            links,
            Arc::new(CpalMicSource::new()),
            signaling,
            Arc::new(CpalSpeakerSink::new()),
        )
    }

    /// Configuration in use
    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Current state
    pub fn snapshot(&self) -> SessionSnapshot {
        self.inner.state.borrow().clone()
    }

    /// Receiver notified on every state change
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.inner.state.subscribe()
    }

    /// Resources held by the current session
    pub async fn resources(&self) -> ResourceSummary {
        self.inner
            .session
            .lock()
            .await
            .as_ref()
            .map(SessionResources::summary)
            .unwrap_or_default()
    }

    /// Establish a session
    ///
    /// On failure the error message is stored in `last_error`, every acquired
    /// resource is released and the controller is back to
    /// [`ConnectionState::Idle`], ready for another attempt.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidState`] if a session is already connecting or connected
    /// - [`Error::MediaAcquisition`] if local audio could not be captured
    /// - a signaling error if the offer/answer round trip failed
    /// - [`Error::Negotiation`] or [`Error::OperationTimeout`] if the link
    ///   could not be negotiated
    #[instrument(skip(self), fields(generation))]
    pub async fn connect(&self) -> Result<()> {
        let generation = self.inner.begin().await?;
        Span::current().record("generation", generation);
        info!("Connecting to {}", self.inner.config.server_url);

        match self.inner.negotiate(generation).await {
            Ok(()) => {
                info!("Session connected");
                Ok(())
            }
            Err(e) => Err(self.inner.fail(generation, e).await),
        }
    }

    /// End the current session, if any
    ///
    /// Idempotent: with nothing to release this only makes sure the state is
    /// [`ConnectionState::Idle`]. `last_error` is left untouched.
    #[instrument(skip(self))]
    pub async fn disconnect(&self) {
        let mut slot = self.inner.session.lock().await;
        if slot.is_some() {
            info!("Disconnecting");
            self.inner.release(&mut slot, PumpRelease::Abort).await;
        } else {
            self.inner.publish(ConnectionState::Idle);
        }
    }
}

impl Inner {
    fn publish(&self, state: ConnectionState) {
        self.state.send_if_modified(|snapshot| {
            if snapshot.connection_state == state {
                return false;
            }
            debug!("Session state {} -> {}", snapshot.connection_state, state);
            snapshot.set_state(state);
            true
        });
    }

    /// Claim the session slot and move to Connecting
    async fn begin(&self) -> Result<u64> {
        let mut slot = self.session.lock().await;

        let current = self.state.borrow().connection_state;
        if slot.is_some() || current.is_active() {
            return Err(Error::InvalidState(format!(
                "cannot connect while {}",
                current
            )));
        }

        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        *slot = Some(SessionResources::new(generation));

        self.state.send_modify(|snapshot| {
            snapshot.last_error = None;
            snapshot.set_state(ConnectionState::Connecting);
        });
        debug!("Session state {} -> {}", current, ConnectionState::Connecting);

        Ok(generation)
    }

    /// Build the link, attach local audio and run the offer/answer exchange
    async fn negotiate(self: &Arc<Self>, generation: u64) -> Result<()> {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let link = self.links.create(events_tx).await?;
        let pump = spawn_event_pump(Arc::downgrade(self), generation, events_rx);

        {
            let mut slot = self.session.lock().await;
            match slot.as_mut() {
                Some(resources) if resources.generation == generation => {
                    resources.link = Some(Arc::clone(&link));
                    resources.event_pump = Some(pump);
                }
                _ => {
                    pump.abort();
                    if let Err(e) = link.close().await {
                        warn!("Failed to close orphaned peer link: {}", e);
                    }
                    return Err(Error::Negotiation(TORN_DOWN.to_string()));
                }
            }
        }

        let stream = self.media.acquire(MediaConstraints::AUDIO_ONLY).await?;
        let tracks = stream.tracks().to_vec();
        {
            let mut slot = self.session.lock().await;
            match slot.as_mut() {
                Some(resources) if resources.generation == generation => {
                    resources.media = Some(stream);
                }
                _ => {
                    stream.stop();
                    return Err(Error::Negotiation(TORN_DOWN.to_string()));
                }
            }
        }

        for track in &tracks {
            link.add_track(track.rtc_track()).await?;
        }
        link.create_data_channel(&self.config.data_channel_label).await?;

        link.create_local_offer().await?;
        self.wait_for_gathering(link.as_ref()).await?;

        let local = link.local_description().await.ok_or_else(|| {
            Error::Negotiation("no local description after ICE gathering".to_string())
        })?;
        let offer = SignalingOffer::new(local.sdp, local.sdp_type);
        debug!("Sending offer {}", offer.webrtc_id);

        let answer = self.signaling.exchange(offer).await?;
        link.apply_remote_answer(&answer).await?;

        let slot = self.session.lock().await;
        match slot.as_ref() {
            Some(resources) if resources.generation == generation => {
                self.publish(ConnectionState::Connected);
                Ok(())
            }
            _ => Err(Error::Negotiation(TORN_DOWN.to_string())),
        }
    }

    async fn wait_for_gathering(&self, link: &dyn PeerLink) -> Result<()> {
        match self.config.ice_gathering_timeout() {
            Some(limit) => tokio::time::timeout(limit, link.gathering_complete())
                .await
                .map_err(|_| {
                    Error::OperationTimeout(format!(
                        "ICE gathering did not complete within {} ms",
                        limit.as_millis()
                    ))
                })?,
            None => link.gathering_complete().await,
        }
    }

    /// Record the failure and release this session's resources
    async fn fail(&self, generation: u64, err: Error) -> Error {
        let mut slot = self.session.lock().await;

        let current = matches!(slot.as_ref(), Some(r) if r.generation == generation);
        let err = if current {
            err
        } else {
            // The session ended underneath us; whatever failed was a consequence
            debug!("Connect attempt failed after teardown: {}", err);
            Error::Negotiation(TORN_DOWN.to_string())
        };

        warn!("Connect failed: {}", err);

        // A newer connect owns the snapshot, including its cleared error
        let superseded = self.generation.load(Ordering::Acquire) != generation;
        if current || !superseded {
            let message = err.to_string();
            self.state.send_modify(|snapshot| {
                snapshot.last_error = Some(message);
                if current {
                    snapshot.set_state(ConnectionState::Failed);
                }
            });
        }

        if current {
            self.release(&mut slot, PumpRelease::Abort).await;
        }
        err
    }

    /// Release the resources in `slot` and return to Idle
    async fn release(&self, slot: &mut Option<SessionResources>, pump: PumpRelease) {
        let Some(mut resources) = slot.take() else {
            self.publish(ConnectionState::Idle);
            return;
        };

        if self.state.borrow().connection_state != ConnectionState::Failed {
            self.publish(ConnectionState::Closed);
        }
        resources.release(self.playback.as_ref(), pump).await;
        self.publish(ConnectionState::Idle);

        debug!("Released session {}", resources.generation);
    }

    async fn on_event(&self, generation: u64, event: PeerLinkEvent) -> bool {
        match event {
            PeerLinkEvent::InboundTrack(track) => {
                let slot = self.session.lock().await;
                if matches!(slot.as_ref(), Some(r) if r.generation == generation) {
                    self.playback.attach(track);
                }
                true
            }
            PeerLinkEvent::StateChanged(state) if state.is_passive_disconnect() => {
                let mut slot = self.session.lock().await;
                if matches!(slot.as_ref(), Some(r) if r.generation == generation) {
                    info!("Peer link {}, ending session", state);
                    self.release(&mut slot, PumpRelease::Detach).await;
                } else {
                    debug!("Ignoring {} from stale session {}", state, generation);
                }
                false
            }
            PeerLinkEvent::StateChanged(state) => {
                debug!("Peer link state: {}", state);
                true
            }
            PeerLinkEvent::GatheringStateChanged(state) => {
                debug!("ICE gathering state: {:?}", state);
                true
            }
        }
    }
}

/// Consume link events for the life of one session
///
/// Holds only a weak reference, so a dropped controller ends the pump.
fn spawn_event_pump(
    inner: Weak<Inner>,
    generation: u64,
    mut events: mpsc::UnboundedReceiver<PeerLinkEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            let Some(inner) = inner.upgrade() else {
                break;
            };
            if !inner.on_event(generation, event).await {
                break;
            }
        }
        debug!("Event pump for session {} finished", generation);
    })
}

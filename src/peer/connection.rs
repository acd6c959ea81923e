use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::{debug, error, warn};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::APIBuilder;
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_receiver::RTCRtpReceiver;
use webrtc::rtp_transceiver::RTCRtpTransceiver;
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_remote::TrackRemote;

use crate::config::RtcConfig;
use crate::error::{NegotiationError, SessionError};
use crate::media::LocalMediaSource;
use crate::peer::state::{PeerState, Role};
use crate::peer::types::{IceCandidate, SignalingEnvelope};
use crate::signaling::SignalingAdapter;

/// Events surfaced to the session controller.
pub enum PeerEvent {
    /// A locally discovered candidate, to be forwarded over signaling.
    LocalCandidate(IceCandidate),
    /// Inbound media became available. May fire more than once; the
    /// latest track of a kind replaces the prior one.
    RemoteTrack(Arc<TrackRemote>),
    StateChanged(PeerState),
}

impl fmt::Debug for PeerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LocalCandidate(c) => f.debug_tuple("LocalCandidate").field(&c.candidate).finish(),
            Self::RemoteTrack(_) => f.write_str("RemoteTrack(..)"),
            Self::StateChanged(s) => f.debug_tuple("StateChanged").field(s).finish(),
        }
    }
}

/// One active or attempted peer-to-peer media session.
///
/// Owns the underlying `RTCPeerConnection` for its whole life; local
/// media is borrowed from the controller and never released here.
pub struct PeerSession {
    role: Role,
    signaling: Arc<dyn SignalingAdapter>,
    shared: Arc<PeerShared>,
}

struct PeerShared {
    pc: Arc<RTCPeerConnection>,
    state: Mutex<PeerState>,
    /// Remote candidates that raced ahead of the remote description.
    pending: Mutex<Vec<IceCandidate>>,
    watchdog: Mutex<Option<JoinHandle<()>>>,
    released: AtomicBool,
    grace: Duration,
    events: mpsc::UnboundedSender<PeerEvent>,
}

impl PeerSession {
    /// Create the connection and attach all local tracks. Attachment
    /// completes before this returns, so descriptions generated later
    /// reflect the full track set; late track-adds (renegotiation) are
    /// out of scope.
    pub async fn new(
        config: &RtcConfig,
        role: Role,
        media: &LocalMediaSource,
        signaling: Arc<dyn SignalingAdapter>,
    ) -> Result<(Arc<Self>, mpsc::UnboundedReceiver<PeerEvent>), SessionError> {
        config.validate().map_err(SessionError::Config)?;

        let mut media_engine = MediaEngine::default();
        media_engine.register_default_codecs()?;
        let registry = register_default_interceptors(Registry::new(), &mut media_engine)?;
        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();
        let pc = Arc::new(api.new_peer_connection(config.to_rtc()).await?);

        for track in media.tracks() {
            let local: Arc<dyn TrackLocal + Send + Sync> = track.rtp();
            pc.add_track(local).await?;
        }

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(PeerShared {
            pc: Arc::clone(&pc),
            state: Mutex::new(PeerState::New),
            pending: Mutex::new(Vec::new()),
            watchdog: Mutex::new(None),
            released: AtomicBool::new(false),
            grace: config.grace_period,
            events: events_tx,
        });

        // Trickle ICE: surface each discovered candidate for the
        // controller to forward. A None candidate ends gathering.
        let weak = Arc::downgrade(&shared);
        pc.on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
            let weak = weak.clone();
            Box::pin(async move {
                let Some(shared) = weak.upgrade() else { return };
                let Some(candidate) = candidate else {
                    debug!("local candidate gathering complete");
                    return;
                };
                if shared.current().is_terminal() {
                    return;
                }
                match candidate.to_json() {
                    Ok(init) => {
                        debug!("local candidate: {}", init.candidate);
                        let _ = shared.events.send(PeerEvent::LocalCandidate(IceCandidate {
                            candidate: init.candidate,
                            sdp_mid: init.sdp_mid,
                            sdp_mline_index: init.sdp_mline_index,
                        }));
                    }
                    Err(e) => warn!("could not serialize local candidate: {e}"),
                }
            })
        }));

        let weak = Arc::downgrade(&shared);
        pc.on_track(Box::new(
            move |track: Arc<TrackRemote>,
                  _receiver: Arc<RTCRtpReceiver>,
                  _transceiver: Arc<RTCRtpTransceiver>| {
                let weak = weak.clone();
                Box::pin(async move {
                    let Some(shared) = weak.upgrade() else { return };
                    if shared.current().is_terminal() {
                        return;
                    }
                    let _ = shared.events.send(PeerEvent::RemoteTrack(track));
                })
            },
        ));

        let weak = Arc::downgrade(&shared);
        pc.on_peer_connection_state_change(Box::new(move |st: RTCPeerConnectionState| {
            let weak = weak.clone();
            Box::pin(async move {
                if let Some(shared) = weak.upgrade() {
                    debug!("transport state: {st}");
                    shared.handle_transport_state(st);
                }
            })
        }));

        Ok((Arc::new(Self { role, signaling, shared }), events_rx))
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn state(&self) -> PeerState {
        self.shared.current()
    }

    pub async fn has_remote_description(&self) -> bool {
        self.shared.pc.remote_description().await.is_some()
    }

    /// Produce the local offer and hand it to the signaling adapter.
    /// Initiator only, from `New` only; a second call fails.
    pub async fn create_offer(&self) -> Result<(), SessionError> {
        if self.role != Role::Initiator {
            return Err(NegotiationError::WrongRole { op: "create_offer", role: self.role }.into());
        }
        self.shared.begin_negotiation("create_offer")?;
        let sdp = match self.local_offer().await {
            Ok(sdp) => sdp,
            Err(e) => {
                error!("offer creation failed: {e}");
                self.shared.fail().await;
                return Err(e.into());
            }
        };
        self.signaling.send(SignalingEnvelope::Offer { sdp }).await?;
        Ok(())
    }

    async fn local_offer(&self) -> Result<String, NegotiationError> {
        let offer = self.shared.pc.create_offer(None).await?;
        self.shared.pc.set_local_description(offer).await?;
        let desc = self
            .shared
            .pc
            .local_description()
            .await
            .ok_or(NegotiationError::MissingLocalDescription)?;
        Ok(desc.sdp)
    }

    /// Consume the remote offer, apply any candidates that raced ahead
    /// of it, and answer. Responder only.
    pub async fn handle_remote_offer(&self, sdp: String) -> Result<(), SessionError> {
        if self.role != Role::Responder {
            return Err(
                NegotiationError::WrongRole { op: "handle_remote_offer", role: self.role }.into()
            );
        }
        self.shared.begin_negotiation("handle_remote_offer")?;
        let answer = match self.answer_remote_offer(sdp).await {
            Ok(answer) => answer,
            Err(e) => {
                error!("answering remote offer failed: {e}");
                self.shared.fail().await;
                return Err(e.into());
            }
        };
        self.signaling.send(SignalingEnvelope::Answer { sdp: answer }).await?;
        Ok(())
    }

    async fn answer_remote_offer(&self, sdp: String) -> Result<String, NegotiationError> {
        let offer = RTCSessionDescription::offer(sdp)?;
        self.shared.pc.set_remote_description(offer).await?;
        self.shared.flush_pending().await;
        let answer = self.shared.pc.create_answer(None).await?;
        self.shared.pc.set_local_description(answer).await?;
        let desc = self
            .shared
            .pc
            .local_description()
            .await
            .ok_or(NegotiationError::MissingLocalDescription)?;
        Ok(desc.sdp)
    }

    /// Consume the remote answer. Initiator only, after `create_offer`.
    pub async fn handle_remote_answer(&self, sdp: String) -> Result<(), SessionError> {
        if self.role != Role::Initiator {
            return Err(
                NegotiationError::WrongRole { op: "handle_remote_answer", role: self.role }.into()
            );
        }
        let state = self.shared.current();
        if state != PeerState::Negotiating {
            return Err(
                NegotiationError::InvalidState { op: "handle_remote_answer", state }.into()
            );
        }
        if self.has_remote_description().await {
            return Err(NegotiationError::DuplicateDescription.into());
        }
        if let Err(e) = self.apply_remote_answer(sdp).await {
            error!("applying remote answer failed: {e}");
            self.shared.fail().await;
            return Err(e.into());
        }
        Ok(())
    }

    async fn apply_remote_answer(&self, sdp: String) -> Result<(), NegotiationError> {
        let answer = RTCSessionDescription::answer(sdp)?;
        self.shared.pc.set_remote_description(answer).await?;
        self.shared.flush_pending().await;
        Ok(())
    }

    /// Accept one remote candidate. Candidates legitimately race ahead
    /// of the answer, so anything arriving before the remote description
    /// is buffered and applied once it is set. Malformed candidates are
    /// logged and discarded, never fatal.
    pub async fn handle_remote_candidate(&self, candidate: IceCandidate) {
        if self.shared.current().is_terminal() {
            debug!("dropping candidate for terminal session");
            return;
        }
        if self.shared.pc.remote_description().await.is_none() {
            debug!("remote description not set yet, queueing candidate");
            self.shared.pending.lock().unwrap().push(candidate);
            return;
        }
        self.shared.apply_candidate(candidate).await;
    }

    /// Tear down from any state. Idempotent, and safe to call while any
    /// negotiation step is still in flight: late callbacks observe the
    /// terminal state and become no-ops.
    pub async fn close(&self) {
        self.shared.abort_watchdog();
        self.shared.transition(PeerState::Closed);
        self.shared.release_resources().await;
    }

    pub(crate) async fn fail(&self) {
        self.shared.fail().await;
    }
}

impl PeerShared {
    fn current(&self) -> PeerState {
        *self.state.lock().unwrap()
    }

    /// Move to `next` if legal, emitting the state-change event.
    fn transition(&self, next: PeerState) -> bool {
        {
            let mut state = self.state.lock().unwrap();
            if !state.can_transition(next) {
                return false;
            }
            debug!("peer state: {state} -> {next}");
            *state = next;
        }
        let _ = self.events.send(PeerEvent::StateChanged(next));
        true
    }

    /// `New -> Negotiating`, or an out-of-state error.
    fn begin_negotiation(&self, op: &'static str) -> Result<(), NegotiationError> {
        {
            let mut state = self.state.lock().unwrap();
            if *state != PeerState::New {
                return Err(NegotiationError::InvalidState { op, state: *state });
            }
            *state = PeerState::Negotiating;
        }
        let _ = self.events.send(PeerEvent::StateChanged(PeerState::Negotiating));
        Ok(())
    }

    async fn apply_candidate(&self, candidate: IceCandidate) {
        let init = RTCIceCandidateInit {
            candidate: candidate.candidate,
            sdp_mid: candidate.sdp_mid,
            sdp_mline_index: candidate.sdp_mline_index,
            username_fragment: None,
        };
        if let Err(e) = self.pc.add_ice_candidate(init).await {
            warn!("discarding unusable ICE candidate: {e}");
        }
    }

    /// Apply buffered candidates in arrival order, exactly once.
    async fn flush_pending(&self) {
        let queued: Vec<IceCandidate> = self.pending.lock().unwrap().drain(..).collect();
        if !queued.is_empty() {
            debug!("applying {} buffered candidates", queued.len());
        }
        for candidate in queued {
            self.apply_candidate(candidate).await;
        }
    }

    fn abort_watchdog(&self) {
        if let Some(handle) = self.watchdog.lock().unwrap().take() {
            handle.abort();
        }
    }

    async fn fail(&self) {
        self.transition(PeerState::Failed);
        self.release_resources().await;
    }

    /// Release the connection and the candidate queue exactly once.
    async fn release_resources(&self) {
        if self.released.swap(true, Ordering::SeqCst) {
            return;
        }
        self.abort_watchdog();
        self.pending.lock().unwrap().clear();
        if let Err(e) = self.pc.close().await {
            warn!("error closing peer connection: {e}");
        }
    }

    fn handle_transport_state(self: &Arc<Self>, st: RTCPeerConnectionState) {
        match st {
            RTCPeerConnectionState::Connected => {
                self.abort_watchdog();
                self.transition(PeerState::Connected);
            }
            RTCPeerConnectionState::Disconnected | RTCPeerConnectionState::Failed => {
                // Potentially recoverable: never close here, give the
                // transport a grace period to come back.
                if self.watchdog.lock().unwrap().is_some() {
                    return;
                }
                if !self.transition(PeerState::Disconnected) {
                    return;
                }
                let weak = Arc::downgrade(self);
                let grace = self.grace;
                let handle = tokio::spawn(async move {
                    sleep(grace).await;
                    let Some(shared) = weak.upgrade() else { return };
                    // Drop our own handle without aborting: release must
                    // still run from this task.
                    shared.watchdog.lock().unwrap().take();
                    if shared.current() == PeerState::Disconnected {
                        warn!("connectivity did not recover within {grace:?}");
                        shared.fail().await;
                    }
                });
                *self.watchdog.lock().unwrap() = Some(handle);
            }
            RTCPeerConnectionState::Closed => {
                self.abort_watchdog();
                self.transition(PeerState::Closed);
            }
            _ => {}
        }
    }
}

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use log::{error, warn};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use webrtc::track::track_remote::TrackRemote;

use crate::config::RtcConfig;
use crate::error::SessionError;
use crate::media::{LocalMediaSource, MediaDevices, MediaKind};
use crate::peer::connection::{PeerEvent, PeerSession};
use crate::peer::state::{PeerState, Role};
use crate::peer::types::SignalingEnvelope;
use crate::signaling::SignalingAdapter;

/// UI-facing control flags. Mutated only by explicit user actions or a
/// terminal media-acquisition failure, never by network events.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ControlState {
    pub muted: bool,
    pub video_off: bool,
    pub has_media_permission: bool,
}

/// Events the UI renders. The core does not dictate presentation.
pub enum SessionEvent {
    /// New inbound media; the latest track of a kind replaces the prior
    /// one.
    RemoteStreamUpdated(Arc<TrackRemote>),
    ConnectionStateChanged(PeerState),
    /// Capture failed terminally; show a permission-recovery affordance,
    /// do not auto-retry.
    MediaPermissionDenied(String),
    NegotiationFailed(String),
    /// Cleanup finished; the navigation collaborator can leave the room.
    Closed,
}

impl fmt::Debug for SessionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RemoteStreamUpdated(_) => f.write_str("RemoteStreamUpdated(..)"),
            Self::ConnectionStateChanged(s) => {
                f.debug_tuple("ConnectionStateChanged").field(s).finish()
            }
            Self::MediaPermissionDenied(r) => {
                f.debug_tuple("MediaPermissionDenied").field(r).finish()
            }
            Self::NegotiationFailed(r) => f.debug_tuple("NegotiationFailed").field(r).finish(),
            Self::Closed => f.write_str("Closed"),
        }
    }
}

/// Orchestrates media acquisition, the peer session and the signaling
/// adapter for one chat room.
///
/// Media is acquired strictly before the peer session is constructed, so
/// a session never exists without local tracks bound. Exactly one peer
/// session lives per controller; a controller that has disconnected (or
/// failed) is spent, and a fresh room needs a fresh controller.
pub struct SessionController {
    config: RtcConfig,
    control: Mutex<ControlState>,
    media: Mutex<Option<LocalMediaSource>>,
    peer: Mutex<Option<Arc<PeerSession>>>,
    remote_tracks: Mutex<Vec<Arc<TrackRemote>>>,
    events: mpsc::UnboundedSender<SessionEvent>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl SessionController {
    pub fn new(config: RtcConfig) -> (Arc<Self>, mpsc::UnboundedReceiver<SessionEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let controller = Arc::new(Self {
            config,
            control: Mutex::new(ControlState::default()),
            media: Mutex::new(None),
            peer: Mutex::new(None),
            remote_tracks: Mutex::new(Vec::new()),
            events: events_tx,
            tasks: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        });
        (controller, events_rx)
    }

    /// Enter the room: acquire media, build the peer session, wire the
    /// signaling pumps, and (for the initiator) create the offer once
    /// track attachment has completed.
    ///
    /// `role` comes from the matchmaking outcome, never from a local
    /// heuristic. `incoming` carries envelopes from the remote peer.
    pub async fn connect(
        self: &Arc<Self>,
        role: Role,
        devices: &dyn MediaDevices,
        signaling: Arc<dyn SignalingAdapter>,
        incoming: mpsc::UnboundedReceiver<SignalingEnvelope>,
    ) -> Result<(), SessionError> {
        if self.closed.load(Ordering::SeqCst) || self.peer.lock().unwrap().is_some() {
            return Err(SessionError::AlreadyConnected);
        }

        let media = match devices.acquire().await {
            Ok(media) => media,
            Err(e) => {
                self.control.lock().unwrap().has_media_permission = false;
                let _ = self
                    .events
                    .send(SessionEvent::MediaPermissionDenied(e.reason().to_owned()));
                return Err(e.into());
            }
        };
        // Navigated away while the permission prompt was pending.
        if self.closed.load(Ordering::SeqCst) {
            media.release();
            return Err(SessionError::AlreadyConnected);
        }
        self.control.lock().unwrap().has_media_permission = true;

        let (peer, peer_events) =
            match PeerSession::new(&self.config, role, &media, Arc::clone(&signaling)).await {
                Ok(v) => v,
                Err(e) => {
                    media.release();
                    return Err(e);
                }
            };
        *self.media.lock().unwrap() = Some(media);
        *self.peer.lock().unwrap() = Some(Arc::clone(&peer));

        self.spawn_pumps(peer_events, incoming, Arc::clone(&peer), signaling);

        if role == Role::Initiator {
            peer.create_offer().await?;
        }
        Ok(())
    }

    fn spawn_pumps(
        self: &Arc<Self>,
        mut peer_events: mpsc::UnboundedReceiver<PeerEvent>,
        mut incoming: mpsc::UnboundedReceiver<SignalingEnvelope>,
        peer: Arc<PeerSession>,
        signaling: Arc<dyn SignalingAdapter>,
    ) {
        // Both pumps hold the controller weakly: dropping the last user
        // handle silences them without an explicit disconnect.
        let weak = Arc::downgrade(self);
        let peer_pump = tokio::spawn(async move {
            while let Some(event) = peer_events.recv().await {
                let Some(controller) = weak.upgrade() else { break };
                controller.on_peer_event(event, &signaling).await;
            }
        });

        let weak = Arc::downgrade(self);
        let signaling_pump = tokio::spawn(async move {
            while let Some(envelope) = incoming.recv().await {
                let Some(controller) = weak.upgrade() else { break };
                if controller.closed.load(Ordering::SeqCst) {
                    break;
                }
                controller.dispatch(&peer, envelope).await;
            }
        });

        self.tasks.lock().unwrap().extend([peer_pump, signaling_pump]);
    }

    async fn on_peer_event(&self, event: PeerEvent, signaling: &Arc<dyn SignalingAdapter>) {
        if self.closed.load(Ordering::SeqCst) {
            return;
        }
        match event {
            PeerEvent::LocalCandidate(candidate) => {
                // Losing a candidate is transient; the session stays up.
                if let Err(e) = signaling.send(SignalingEnvelope::Candidate { candidate }).await {
                    warn!("candidate delivery failed: {e}");
                }
            }
            PeerEvent::RemoteTrack(track) => {
                {
                    let mut tracks = self.remote_tracks.lock().unwrap();
                    tracks.retain(|t| t.kind() != track.kind());
                    tracks.push(Arc::clone(&track));
                }
                let _ = self.events.send(SessionEvent::RemoteStreamUpdated(track));
            }
            PeerEvent::StateChanged(state) => {
                let _ = self.events.send(SessionEvent::ConnectionStateChanged(state));
                if state == PeerState::Failed {
                    self.teardown().await;
                }
            }
        }
    }

    async fn dispatch(&self, peer: &Arc<PeerSession>, envelope: SignalingEnvelope) {
        let result = match envelope {
            SignalingEnvelope::Offer { sdp } => peer.handle_remote_offer(sdp).await,
            SignalingEnvelope::Answer { sdp } => peer.handle_remote_answer(sdp).await,
            SignalingEnvelope::Candidate { candidate } => {
                peer.handle_remote_candidate(candidate).await;
                Ok(())
            }
        };
        match result {
            Ok(()) => {}
            Err(SessionError::Signaling(e)) => {
                // Our reply could not be delivered; the adapter owns
                // retries, the session itself is still healthy.
                warn!("signaling delivery failed: {e}");
            }
            Err(e) => {
                error!("negotiation failed: {e}");
                let _ = self.events.send(SessionEvent::NegotiationFailed(e.to_string()));
                peer.fail().await;
            }
        }
    }

    /// Flip all local audio tracks and `ControlState::muted`. Purely
    /// local: no network effect, no renegotiation.
    pub fn toggle_mute(&self) {
        let media = self.media.lock().unwrap();
        let Some(media) = media.as_ref() else { return };
        let mut control = self.control.lock().unwrap();
        control.muted = !control.muted;
        media.set_enabled(MediaKind::Audio, !control.muted);
    }

    /// Flip all local video tracks and `ControlState::video_off`.
    pub fn toggle_video(&self) {
        let media = self.media.lock().unwrap();
        let Some(media) = media.as_ref() else { return };
        let mut control = self.control.lock().unwrap();
        control.video_off = !control.video_off;
        media.set_enabled(MediaKind::Video, !control.video_off);
    }

    /// Leave the room: close the peer session, release local media and
    /// emit [`SessionEvent::Closed`]. Idempotent.
    pub async fn disconnect(&self) {
        self.teardown().await;
    }

    async fn teardown(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let peer = self.peer.lock().unwrap().take();
        if let Some(peer) = peer {
            peer.close().await;
        }
        let media = self.media.lock().unwrap().take();
        if let Some(media) = media {
            media.release();
        }
        self.remote_tracks.lock().unwrap().clear();
        let _ = self.events.send(SessionEvent::Closed);
        let tasks: Vec<_> = self.tasks.lock().unwrap().drain(..).collect();
        for task in tasks {
            task.abort();
        }
    }

    pub fn control_state(&self) -> ControlState {
        *self.control.lock().unwrap()
    }

    pub fn peer(&self) -> Option<Arc<PeerSession>> {
        self.peer.lock().unwrap().clone()
    }

    /// Currently known remote tracks, newest per kind.
    pub fn remote_tracks(&self) -> Vec<Arc<TrackRemote>> {
        self.remote_tracks.lock().unwrap().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

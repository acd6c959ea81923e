//! Session-establishment core for a nearby random-match video chat
//! client.
//!
//! Flow: [`matchmaking::MatchClient`] locates a nearby partner and
//! yields a [`matchmaking::MatchOutcome`] (room id + negotiation role);
//! a [`session::SessionController`] then acquires local media through a
//! [`media::MediaDevices`] backend, builds a [`peer::PeerSession`] and
//! drives SDP offer/answer and trickle-ICE exchange through a
//! [`signaling::SignalingAdapter`]. The UI shell renders the
//! [`session::SessionEvent`] stream and calls the mute/video/disconnect
//! controls.

pub mod auth;
pub mod config;
pub mod error;
pub mod matchmaking;
pub mod media;
pub mod peer;
pub mod session;
pub mod signaling;
mod utils;

pub use auth::Credentials;
pub use config::{ClientConfig, IceServerConfig, RtcConfig, ServerKind};
pub use error::{ApiError, MediaAccessError, NegotiationError, SessionError, SignalingError};
pub use matchmaking::{MatchClient, MatchOutcome, Partner};
pub use media::{LocalMediaSource, MediaDevices, SyntheticDevices};
pub use peer::{IceCandidate, PeerSession, PeerState, Role, SignalingEnvelope};
pub use session::{ControlState, SessionController, SessionEvent};
pub use signaling::{ChannelSignaling, SignalingAdapter};

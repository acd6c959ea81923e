use thiserror::Error;

use crate::peer::state::{PeerState, Role};

/// Media capture could not be started. These are user-recoverable through
/// browser/OS settings, never by an automatic retry: once a permission
/// prompt is denied the platform will not re-prompt within the page
/// lifetime, so callers must present a recovery affordance instead.
#[derive(Debug, Clone, Error)]
pub enum MediaAccessError {
    #[error("media permission denied: {0}")]
    PermissionDenied(String),
    #[error("no capture device available: {0}")]
    NoDevice(String),
    #[error("capture device is in use: {0}")]
    DeviceBusy(String),
}

impl MediaAccessError {
    /// Human-readable reason, suitable for a toast.
    pub fn reason(&self) -> &str {
        match self {
            Self::PermissionDenied(r) | Self::NoDevice(r) | Self::DeviceBusy(r) => r,
        }
    }
}

/// An SDP operation was malformed or issued out of role/state.
#[derive(Debug, Error)]
pub enum NegotiationError {
    #[error("{op} is not valid for the {role:?} role")]
    WrongRole { op: &'static str, role: Role },
    #[error("{op} is not valid in state {state}")]
    InvalidState { op: &'static str, state: PeerState },
    #[error("remote description already set")]
    DuplicateDescription,
    #[error("no local description after negotiation step")]
    MissingLocalDescription,
    #[error("SDP operation failed: {0}")]
    Sdp(#[from] webrtc::Error),
}

/// Envelope delivery failed at the adapter. Transient by definition: the
/// session itself stays open, the caller decides whether to resend.
#[derive(Debug, Error)]
pub enum SignalingError {
    #[error("signaling channel closed")]
    ChannelClosed,
    #[error("signaling delivery failed: {0}")]
    Delivery(String),
}

/// Matchmaking/auth backend errors.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("unauthorized: no valid session")]
    Unauthorized,
    #[error("api error ({status}): {message}")]
    Api { status: u16, message: String },
    #[error(transparent)]
    Transport(#[from] reqwest::Error),
}

/// Umbrella error for session setup and teardown paths.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Media(#[from] MediaAccessError),
    #[error(transparent)]
    Negotiation(#[from] NegotiationError),
    #[error(transparent)]
    Signaling(#[from] SignalingError),
    #[error("peer connection error: {0}")]
    Rtc(#[from] webrtc::Error),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("a peer session is already active for this room")]
    AlreadyConnected,
}

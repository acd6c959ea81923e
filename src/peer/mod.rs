//! Peer-to-peer session establishment.

pub mod connection;
pub mod state;
pub mod types;

pub use connection::{PeerEvent, PeerSession};
pub use state::{PeerState, Role};
pub use types::{IceCandidate, SignalingEnvelope};

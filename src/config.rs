use std::time::Duration;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::policy::bundle_policy::RTCBundlePolicy;
use webrtc::peer_connection::policy::rtcp_mux_policy::RTCRtcpMuxPolicy;

/// Default grace period before a `disconnected` session is declared failed.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(15);

static DEFAULT_ICE_SERVERS: Lazy<Vec<IceServerConfig>> = Lazy::new(|| {
    vec![
        IceServerConfig::stun("default-stun-0", "stun:stun.l.google.com:19302"),
        IceServerConfig::stun("default-stun-1", "stun:stun1.l.google.com:19302"),
    ]
});

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ServerKind {
    Stun,
    Turn,
}

/// One configured ICE server.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct IceServerConfig {
    pub id: String,
    pub kind: ServerKind,
    pub url: String,
    pub username: Option<String>,
    pub credential: Option<String>,
}

impl IceServerConfig {
    pub fn stun(id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: ServerKind::Stun,
            url: url.into(),
            username: None,
            credential: None,
        }
    }

    pub fn turn(
        id: impl Into<String>,
        url: impl Into<String>,
        username: impl Into<String>,
        credential: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            kind: ServerKind::Turn,
            url: url.into(),
            username: Some(username.into()),
            credential: Some(credential.into()),
        }
    }

    /// URL with the `stun:`/`turn:` scheme prepended when the caller left
    /// it off.
    pub fn schemed_url(&self) -> String {
        if self.url.starts_with("stun:") || self.url.starts_with("turn:") {
            return self.url.clone();
        }
        let scheme = match self.kind {
            ServerKind::Turn => "turn:",
            ServerKind::Stun => "stun:",
        };
        format!("{scheme}{}", self.url)
    }

    /// TURN relays are useless without credentials; reject them early
    /// rather than at allocation time.
    pub fn validate(&self) -> Result<(), String> {
        if self.url.is_empty() {
            return Err(format!("ICE server {}: URL cannot be empty", self.id));
        }
        if self.kind == ServerKind::Turn
            && (self.username.is_none() || self.credential.is_none())
        {
            return Err(format!(
                "ICE server {}: TURN servers require username and credential",
                self.id
            ));
        }
        Ok(())
    }

    fn to_rtc(&self) -> RTCIceServer {
        RTCIceServer {
            urls: vec![self.schemed_url()],
            username: self.username.clone().unwrap_or_default(),
            credential: self.credential.clone().unwrap_or_default(),
        }
    }
}

/// Per-session peer connection settings. Explicit values passed into each
/// [`crate::session::SessionController`]; nothing process-wide.
#[derive(Debug, Clone)]
pub struct RtcConfig {
    pub ice_servers: Vec<IceServerConfig>,
    /// How long a `disconnected` session may linger before it is forced
    /// to `failed`.
    pub grace_period: Duration,
    pub ice_candidate_pool_size: u8,
}

impl Default for RtcConfig {
    fn default() -> Self {
        Self {
            ice_servers: DEFAULT_ICE_SERVERS.clone(),
            grace_period: DEFAULT_GRACE_PERIOD,
            ice_candidate_pool_size: 10,
        }
    }
}

impl RtcConfig {
    pub fn validate(&self) -> Result<(), String> {
        for server in &self.ice_servers {
            server.validate()?;
        }
        Ok(())
    }

    pub(crate) fn to_rtc(&self) -> RTCConfiguration {
        RTCConfiguration {
            ice_servers: self.ice_servers.iter().map(IceServerConfig::to_rtc).collect(),
            ice_candidate_pool_size: self.ice_candidate_pool_size,
            bundle_policy: RTCBundlePolicy::MaxBundle,
            rtcp_mux_policy: RTCRtcpMuxPolicy::Require,
            ..Default::default()
        }
    }
}

/// Backend client settings for matchmaking.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the backend API, e.g. `https://api.example.com`.
    pub api_base: String,
    /// Partner poll cadence while a search is open.
    pub poll_interval: Duration,
    /// Default search radius in kilometres.
    pub radius_km: f64,
}

impl ClientConfig {
    pub fn new(api_base: impl Into<String>) -> Self {
        Self {
            api_base: api_base.into(),
            poll_interval: Duration::from_secs(5),
            radius_km: 10.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scheme_added_when_missing() {
        let stun = IceServerConfig::stun("s", "stun.example.org:3478");
        assert_eq!(stun.schemed_url(), "stun:stun.example.org:3478");

        let turn = IceServerConfig::turn("t", "turn.example.org:3478", "u", "p");
        assert_eq!(turn.schemed_url(), "turn:turn.example.org:3478");
    }

    #[test]
    fn scheme_kept_when_present() {
        let server = IceServerConfig::stun("s", "stun:stun.l.google.com:19302");
        assert_eq!(server.schemed_url(), "stun:stun.l.google.com:19302");
    }

    #[test]
    fn turn_requires_credentials() {
        let mut server = IceServerConfig::turn("t", "turn.example.org", "u", "p");
        assert!(server.validate().is_ok());
        server.credential = None;
        assert!(server.validate().is_err());
    }

    #[test]
    fn empty_url_rejected() {
        let server = IceServerConfig::stun("s", "");
        assert!(server.validate().is_err());
    }

    #[test]
    fn defaults_are_valid() {
        let config = RtcConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.grace_period, DEFAULT_GRACE_PERIOD);
        let rtc = config.to_rtc();
        assert_eq!(rtc.ice_servers.len(), 2);
    }
}

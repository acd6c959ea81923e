use serde::{Deserialize, Serialize};

/// One ICE candidate on the wire, in `RTCIceCandidateInit` shape.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct IceCandidate {
    pub candidate: String,
    pub sdp_mid: Option<String>,
    pub sdp_mline_index: Option<u16>,
}

/// Unit of exchange between the two peers.
///
/// Wire format is a JSON object tagged on `type`:
/// `{"type":"offer","sdp":...}`, `{"type":"answer","sdp":...}`,
/// `{"type":"candidate","candidate":{...}}`. At most one offer and one
/// answer are valid per session; candidates may flow in any order and
/// quantity, before or after the offer/answer exchange (trickle ICE).
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SignalingEnvelope {
    Offer { sdp: String },
    Answer { sdp: String },
    Candidate { candidate: IceCandidate },
}

impl SignalingEnvelope {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Offer { .. } => "offer",
            Self::Answer { .. } => "answer",
            Self::Candidate { .. } => "candidate",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offer_wire_shape() {
        let json =
            serde_json::to_value(SignalingEnvelope::Offer { sdp: "v=0...".into() }).unwrap();
        assert_eq!(json["type"], "offer");
        assert_eq!(json["sdp"], "v=0...");
        assert!(json.get("candidate").is_none());
    }

    #[test]
    fn candidate_wire_shape() {
        let env = SignalingEnvelope::Candidate {
            candidate: IceCandidate {
                candidate: "candidate:1 1 udp 2122260223 10.0.0.2 50000 typ host".into(),
                sdp_mid: Some("0".into()),
                sdp_mline_index: Some(0),
            },
        };
        let json = serde_json::to_value(&env).unwrap();
        assert_eq!(json["type"], "candidate");
        assert_eq!(json["candidate"]["sdp_mid"], "0");
        assert!(json.get("sdp").is_none());
    }

    #[test]
    fn parses_peer_answer() {
        let parsed: SignalingEnvelope =
            serde_json::from_str(r#"{"type":"answer","sdp":"v=0\r\n"}"#).unwrap();
        assert_eq!(parsed, SignalingEnvelope::Answer { sdp: "v=0\r\n".into() });
    }
}

//! Signaling transport seam.
//!
//! The peer connection manager only needs "at least attempt to deliver
//! each locally generated envelope once"; retries and ordering belong to
//! the adapter. Incoming envelopes arrive on a plain receiver so the
//! session controller owns the dispatch loop.

use std::sync::Mutex;

use async_trait::async_trait;
use log::debug;
use tokio::sync::mpsc;

use crate::error::SignalingError;
use crate::peer::types::SignalingEnvelope;

#[async_trait]
pub trait SignalingAdapter: Send + Sync {
    /// Attempt delivery of one envelope to the remote peer. A delivery
    /// failure is surfaced to the caller but does not close the session.
    async fn send(&self, envelope: SignalingEnvelope) -> Result<(), SignalingError>;
}

/// In-process adapter over a pair of crossed channels. The loopback
/// transport used by the test suite and demos; a production shell wires
/// a network transport behind [`SignalingAdapter`] instead.
pub struct ChannelSignaling {
    tx: mpsc::UnboundedSender<SignalingEnvelope>,
    rx: Mutex<Option<mpsc::UnboundedReceiver<SignalingEnvelope>>>,
}

impl ChannelSignaling {
    /// Two adapters whose sends arrive on each other's receiver.
    pub fn pair() -> (ChannelSignaling, ChannelSignaling) {
        let (a_tx, a_rx) = mpsc::unbounded_channel();
        let (b_tx, b_rx) = mpsc::unbounded_channel();
        (
            ChannelSignaling { tx: a_tx, rx: Mutex::new(Some(b_rx)) },
            ChannelSignaling { tx: b_tx, rx: Mutex::new(Some(a_rx)) },
        )
    }

    /// Take the incoming-envelope receiver. Yields `None` on the second
    /// call; there is exactly one consumer per adapter.
    pub fn take_incoming(&self) -> Option<mpsc::UnboundedReceiver<SignalingEnvelope>> {
        self.rx.lock().unwrap().take()
    }
}

#[async_trait]
impl SignalingAdapter for ChannelSignaling {
    async fn send(&self, envelope: SignalingEnvelope) -> Result<(), SignalingError> {
        debug!("signaling send: {}", envelope.kind());
        self.tx.send(envelope).map_err(|_| SignalingError::ChannelClosed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peer::types::IceCandidate;

    #[tokio::test]
    async fn pair_crosses_envelopes() {
        let (a, b) = ChannelSignaling::pair();
        let mut b_in = b.take_incoming().unwrap();

        a.send(SignalingEnvelope::Offer { sdp: "v=0".into() }).await.unwrap();
        assert_eq!(
            b_in.recv().await.unwrap(),
            SignalingEnvelope::Offer { sdp: "v=0".into() }
        );

        let mut a_in = a.take_incoming().unwrap();
        b.send(SignalingEnvelope::Candidate {
            candidate: IceCandidate {
                candidate: "candidate:1 1 udp 1 10.0.0.1 9 typ host".into(),
                sdp_mid: Some("0".into()),
                sdp_mline_index: Some(0),
            },
        })
        .await
        .unwrap();
        assert_eq!(a_in.recv().await.unwrap().kind(), "candidate");
    }

    #[tokio::test]
    async fn send_after_peer_dropped_is_delivery_error() {
        let (a, b) = ChannelSignaling::pair();
        b.take_incoming();
        drop(b);
        let err = a.send(SignalingEnvelope::Answer { sdp: "v=0".into() }).await;
        assert!(matches!(err, Err(SignalingError::ChannelClosed)));
    }

    #[test]
    fn incoming_receiver_is_single_consumer() {
        let (a, _b) = ChannelSignaling::pair();
        assert!(a.take_incoming().is_some());
        assert!(a.take_incoming().is_none());
    }
}

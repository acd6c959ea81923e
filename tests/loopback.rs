//! Full offer/answer negotiation between two controllers wired through
//! the in-process signaling pair. Exercises the whole envelope path:
//! offer out, answer back, trickled candidates forwarded and applied.

use std::sync::Arc;
use std::time::Duration;

use proxichat::{
    ChannelSignaling, PeerState, Role, RtcConfig, SessionController, SessionEvent,
    SyntheticDevices,
};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::sleep;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn drain(
    events: &mut UnboundedReceiver<SessionEvent>,
) -> (Vec<PeerState>, usize, Vec<String>) {
    let mut states = Vec::new();
    let mut closed = 0;
    let mut failures = Vec::new();
    while let Ok(event) = events.try_recv() {
        match event {
            SessionEvent::ConnectionStateChanged(state) => states.push(state),
            SessionEvent::Closed => closed += 1,
            SessionEvent::NegotiationFailed(reason) => failures.push(reason),
            _ => {}
        }
    }
    (states, closed, failures)
}

#[tokio::test]
async fn loopback_negotiation_completes_and_tears_down() {
    init_logging();

    let (a, b) = ChannelSignaling::pair();
    let a_in = a.take_incoming().unwrap();
    let b_in = b.take_incoming().unwrap();

    let (responder, mut responder_events) = SessionController::new(RtcConfig::default());
    responder
        .connect(Role::Responder, &SyntheticDevices::default(), Arc::new(b), b_in)
        .await
        .unwrap();

    let (initiator, mut initiator_events) = SessionController::new(RtcConfig::default());
    initiator
        .connect(Role::Initiator, &SyntheticDevices::default(), Arc::new(a), a_in)
        .await
        .unwrap();

    let initiator_peer = initiator.peer().unwrap();
    let responder_peer = responder.peer().unwrap();

    // The answer must make it back to the initiator.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        if initiator_peer.has_remote_description().await
            && responder_peer.has_remote_description().await
        {
            break;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "offer/answer exchange did not complete"
        );
        sleep(Duration::from_millis(50)).await;
    }

    assert_ne!(initiator_peer.state(), PeerState::New);
    assert_ne!(responder_peer.state(), PeerState::New);
    assert!(!initiator_peer.state().is_terminal());
    assert!(!responder_peer.state().is_terminal());

    initiator.disconnect().await;
    responder.disconnect().await;
    assert!(initiator.peer().is_none());

    let (initiator_states, initiator_closed, initiator_failures) =
        drain(&mut initiator_events);
    assert!(initiator_states.contains(&PeerState::Negotiating));
    assert_eq!(initiator_closed, 1);
    assert!(initiator_failures.is_empty(), "{initiator_failures:?}");

    let (responder_states, responder_closed, responder_failures) =
        drain(&mut responder_events);
    assert!(responder_states.contains(&PeerState::Negotiating));
    assert_eq!(responder_closed, 1);
    assert!(responder_failures.is_empty(), "{responder_failures:?}");
}

#[tokio::test]
async fn disconnecting_one_side_does_not_fail_the_other_immediately() {
    init_logging();

    let (a, b) = ChannelSignaling::pair();
    let a_in = a.take_incoming().unwrap();
    let b_in = b.take_incoming().unwrap();

    let (responder, _responder_events) = SessionController::new(RtcConfig::default());
    responder
        .connect(Role::Responder, &SyntheticDevices::default(), Arc::new(b), b_in)
        .await
        .unwrap();

    let (initiator, _initiator_events) = SessionController::new(RtcConfig::default());
    initiator
        .connect(Role::Initiator, &SyntheticDevices::default(), Arc::new(a), a_in)
        .await
        .unwrap();

    initiator.disconnect().await;
    assert!(initiator.is_closed());

    // The peer side only learns about the loss through its transport
    // grace period; the signaling channel going away must not kill it.
    sleep(Duration::from_millis(100)).await;
    assert!(!responder.is_closed());
    responder.disconnect().await;
}

use std::fmt;

/// Negotiation role for one peer session.
///
/// Assigned by the matchmaking outcome, never inferred locally: the
/// searcher whose poll returned the partner listing is the `Initiator`,
/// the peer that was listed is the `Responder`. See
/// [`crate::matchmaking::MatchOutcome`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Initiator,
    Responder,
}

/// Lifecycle of a single peer connection.
///
/// `Closed` and `Failed` are terminal; a new [`crate::peer::PeerSession`]
/// must be constructed to connect again, there is no reset transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerState {
    /// Connection created, local tracks attached, no SDP exchanged yet.
    New,
    /// Offer/answer in flight; candidates may be trickling.
    Negotiating,
    /// Transport reports two-way connectivity.
    Connected,
    /// Transient connectivity loss; recoverable until the grace period
    /// expires.
    Disconnected,
    Closed,
    Failed,
}

impl PeerState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Closed | Self::Failed)
    }

    /// Whether `self -> next` is a legal transition.
    ///
    /// `Closed` is reachable from everywhere, `Failed` from any live
    /// negotiation. `Disconnected` may return to `Connected` (transport
    /// recovered within the grace period).
    pub fn can_transition(self, next: PeerState) -> bool {
        use PeerState::*;
        if self.is_terminal() || self == next {
            return false;
        }
        match (self, next) {
            (_, Closed) => true,
            (New, Negotiating) => true,
            (Negotiating, Connected | Disconnected | Failed) => true,
            (Connected, Disconnected | Failed) => true,
            (Disconnected, Connected | Failed) => true,
            _ => false,
        }
    }
}

impl fmt::Display for PeerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::New => "new",
            Self::Negotiating => "negotiating",
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::Closed => "closed",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::PeerState::*;

    #[test]
    fn happy_path_transitions() {
        assert!(New.can_transition(Negotiating));
        assert!(Negotiating.can_transition(Connected));
        assert!(Connected.can_transition(Disconnected));
        assert!(Disconnected.can_transition(Connected));
        assert!(Connected.can_transition(Closed));
    }

    #[test]
    fn failure_paths() {
        assert!(Negotiating.can_transition(Failed));
        assert!(Connected.can_transition(Failed));
        assert!(Disconnected.can_transition(Failed));
        assert!(!New.can_transition(Failed));
    }

    #[test]
    fn terminal_states_stay_terminal() {
        for terminal in [Closed, Failed] {
            for next in [New, Negotiating, Connected, Disconnected, Closed, Failed] {
                assert!(!terminal.can_transition(next));
            }
        }
    }

    #[test]
    fn no_skipping_negotiation() {
        assert!(!New.can_transition(Connected));
        assert!(!New.can_transition(Disconnected));
        assert!(!Connected.can_transition(Negotiating));
    }
}
